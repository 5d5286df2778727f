//! Input staging: project caller files into the workspace under the names the
//! tool expects.
//!
//! Tools often infer behaviour from a file's extension, so each input is
//! presented under a synthetic name. Linking is tried before copying so that
//! large inputs are not duplicated.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};
use crate::workspace::Workspace;

/// One caller-supplied input and the name it must carry inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub source: PathBuf,
    /// Single file name, including the tool-required extension.
    pub staged_name: String,
}

impl InputSpec {
    pub fn new(source: impl Into<PathBuf>, staged_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            staged_name: staged_name.into(),
        }
    }
}

/// How an input was projected into the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingMethod {
    Symlink,
    HardLink,
    Copy,
}

/// A staged input inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInput {
    pub path: PathBuf,
    pub method: StagingMethod,
}

/// Stage a single input. Never modifies the source.
pub fn stage(workspace: &Workspace, spec: &InputSpec) -> SandboxResult<StagedInput> {
    check_staged_name(spec)?;
    let source = check_source(&spec.source)?;
    let target = workspace.join(&spec.staged_name);

    if target.symlink_metadata().is_ok() {
        return Err(SandboxError::staging(
            &spec.source,
            format!("staged name {} is already in use", spec.staged_name),
        ));
    }

    let method = link_or_copy(&source, &target)
        .map_err(|e| SandboxError::staging(&spec.source, e))?;

    debug!(
        event = "input.staged",
        source = %spec.source.display(),
        staged = %target.display(),
        method = ?method,
    );
    Ok(StagedInput {
        path: target,
        method,
    })
}

/// Stage every input, preserving declaration order.
pub fn stage_all(workspace: &Workspace, specs: &[InputSpec]) -> SandboxResult<Vec<StagedInput>> {
    specs.iter().map(|spec| stage(workspace, spec)).collect()
}

fn check_staged_name(spec: &InputSpec) -> SandboxResult<()> {
    let mut components = Path::new(&spec.staged_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(SandboxError::staging(
            &spec.source,
            format!(
                "staged name {:?} must be a single file name",
                spec.staged_name
            ),
        )),
    }
}

/// Returns the canonical source path once it is known to be a readable file.
fn check_source(source: &Path) -> SandboxResult<PathBuf> {
    let canonical = source
        .canonicalize()
        .map_err(|e| SandboxError::staging(source, e))?;
    let metadata = canonical
        .metadata()
        .map_err(|e| SandboxError::staging(source, e))?;
    if !metadata.is_file() {
        return Err(SandboxError::staging(source, "not a regular file"));
    }
    File::open(&canonical).map_err(|e| SandboxError::staging(source, e))?;
    Ok(canonical)
}

fn link_or_copy(source: &Path, target: &Path) -> std::io::Result<StagingMethod> {
    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(source, target).is_ok() {
            return Ok(StagingMethod::Symlink);
        }
    }
    if std::fs::hard_link(source, target).is_ok() {
        return Ok(StagingMethod::HardLink);
    }
    std::fs::copy(source, target)?;
    Ok(StagingMethod::Copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;

    fn setup() -> (tempfile::TempDir, Workspace) {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(&SandboxConfig::default().with_workspace_root(root.path()))
            .unwrap();
        (root, ws)
    }

    #[test]
    fn test_stage_presents_source_under_new_name() {
        let (root, ws) = setup();
        let source = root.path().join("dataset_42.dat");
        std::fs::write(&source, b"chr1\tsrc\texon\n").unwrap();

        let staged = stage(&ws, &InputSpec::new(&source, "input1.gtf")).unwrap();
        assert_eq!(staged.path, ws.join("input1.gtf"));
        assert_eq!(std::fs::read(&staged.path).unwrap(), b"chr1\tsrc\texon\n");
        #[cfg(unix)]
        assert_eq!(staged.method, StagingMethod::Symlink);
    }

    #[test]
    fn test_stage_does_not_touch_source() {
        let (root, ws) = setup();
        let source = root.path().join("in.gtf");
        std::fs::write(&source, b"original").unwrap();
        stage(&ws, &InputSpec::new(&source, "input1.gtf")).unwrap();
        assert_eq!(std::fs::read(&source).unwrap(), b"original");
        assert!(source.symlink_metadata().unwrap().file_type().is_file());
    }

    #[test]
    fn test_indirect_source_path_is_canonicalised() {
        let (root, ws) = setup();
        let nested = root.path().join("a");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(root.path().join("in.gtf"), b"x").unwrap();
        let indirect = nested.join("..").join("in.gtf");

        let staged = stage(&ws, &InputSpec::new(indirect, "input1.gtf")).unwrap();
        assert_eq!(std::fs::read(staged.path).unwrap(), b"x");
    }

    #[test]
    fn test_missing_source_is_staging_error() {
        let (root, ws) = setup();
        let err = stage(&ws, &InputSpec::new(root.path().join("nope.gtf"), "input1.gtf"))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Staging { .. }));
    }

    #[test]
    fn test_directory_source_is_rejected() {
        let (root, ws) = setup();
        let err = stage(&ws, &InputSpec::new(root.path(), "input1.gtf")).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_staged_name_must_be_single_component() {
        let (root, ws) = setup();
        let source = root.path().join("in.gtf");
        std::fs::write(&source, b"x").unwrap();
        for bad in ["../escape.gtf", "sub/input.gtf", "..", "", "/abs.gtf"] {
            let err = stage(&ws, &InputSpec::new(&source, bad)).unwrap_err();
            assert!(
                matches!(err, SandboxError::Staging { .. }),
                "expected staging error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_duplicate_staged_name_is_rejected() {
        let (root, ws) = setup();
        let source = root.path().join("in.gtf");
        std::fs::write(&source, b"x").unwrap();
        stage(&ws, &InputSpec::new(&source, "input1.gtf")).unwrap();
        let err = stage(&ws, &InputSpec::new(&source, "input1.gtf")).unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn test_stage_all_preserves_order() {
        let (root, ws) = setup();
        let a = root.path().join("a.dat");
        let b = root.path().join("b.dat");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let staged = stage_all(
            &ws,
            &[
                InputSpec::new(&a, "input1.gtf"),
                InputSpec::new(&b, "input2.gtf"),
            ],
        )
        .unwrap();
        assert_eq!(staged[0].path, ws.join("input1.gtf"));
        assert_eq!(staged[1].path, ws.join("input2.gtf"));
    }
}
