//! Per-invocation temporary workspace.
//!
//! A [`Workspace`] owns a freshly created directory and removes it when it is
//! destroyed or dropped, whichever comes first. Removal problems are logged
//! and never surface as errors.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::obs;

/// Exclusively owned temporary directory for one invocation.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a uniquely named directory under the configured root.
    pub fn create(config: &SandboxConfig) -> SandboxResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&config.workspace_prefix);

        let dir = match &config.workspace_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| {
            SandboxError::configuration(format!("cannot create workspace directory: {e}"))
        })?;

        let path = dir.path().to_path_buf();
        debug!(event = "workspace.created", workspace = %path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of an entry inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    pub fn is_destroyed(&self) -> bool {
        self.dir.is_none()
    }

    /// Recursively remove the workspace. Calling this more than once is a no-op.
    pub fn destroy(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => debug!(event = "workspace.removed", workspace = %self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => obs::emit_cleanup_failed(&self.path, &e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.destroy();
    }
}
