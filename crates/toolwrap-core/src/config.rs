//! Sandbox configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SandboxError, SandboxResult};

/// Default cap on captured stderr bytes (16 MiB).
pub const DEFAULT_STDERR_CAP_BYTES: usize = 16 * 1024 * 1024;

/// Default prefix for workspace directory names.
pub const DEFAULT_WORKSPACE_PREFIX: &str = "toolwrap-";

pub const ENV_WORKSPACE_ROOT: &str = "TOOLWRAP_WORKSPACE_ROOT";
pub const ENV_TIMEOUT_SECS: &str = "TOOLWRAP_TIMEOUT_SECS";
pub const ENV_STDERR_CAP_BYTES: &str = "TOOLWRAP_STDERR_CAP_BYTES";

/// Configuration shared by every invocation run with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Parent directory for workspaces (platform temp dir when `None`).
    pub workspace_root: Option<PathBuf>,
    /// Prefix for generated workspace directory names.
    pub workspace_prefix: String,
    /// Wall-clock limit for the tool process in milliseconds (0 = none).
    pub timeout_ms: u64,
    /// Maximum number of stderr bytes retained for diagnostics.
    pub stderr_cap_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            workspace_prefix: DEFAULT_WORKSPACE_PREFIX.to_string(),
            timeout_ms: 0,
            stderr_cap_bytes: DEFAULT_STDERR_CAP_BYTES,
        }
    }
}

impl SandboxConfig {
    /// Defaults overlaid with `TOOLWRAP_*` environment variables.
    pub fn from_env() -> SandboxResult<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup. Empty values are ignored.
    pub fn overlay<F>(mut self, lookup: F) -> SandboxResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = get(ENV_WORKSPACE_ROOT) {
            self.workspace_root = Some(PathBuf::from(root));
        }
        if let Some(secs) = get(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                SandboxError::configuration(format!(
                    "{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {secs:?}"
                ))
            })?;
            self.timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(cap) = get(ENV_STDERR_CAP_BYTES) {
            self.stderr_cap_bytes = cap.trim().parse().map_err(|_| {
                SandboxError::configuration(format!(
                    "{ENV_STDERR_CAP_BYTES} must be a byte count, got {cap:?}"
                ))
            })?;
        }
        Ok(self)
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_millis(timeout);
        self
    }

    /// Timeout as a `Duration`, `None` when unlimited.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
