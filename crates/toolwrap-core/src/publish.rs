//! Result publication: copy workspace artifacts to caller destinations.
//!
//! Every copy is written to a temp file beside the destination and then
//! renamed into place, so a destination is either absent or complete.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{SandboxError, SandboxResult};
use crate::obs;
use crate::workspace::Workspace;

/// Whether an artifact must exist after the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    /// Skipped silently when the tool did not produce it.
    Optional,
}

/// Workspace-relative artifact name and where it must be copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMapping {
    pub artifact: String,
    pub destination: PathBuf,
    pub requirement: Requirement,
}

impl OutputMapping {
    pub fn required(artifact: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            destination: destination.into(),
            requirement: Requirement::Required,
        }
    }

    pub fn optional(artifact: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            destination: destination.into(),
            requirement: Requirement::Optional,
        }
    }
}

/// A copied artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub artifact: String,
    pub destination: PathBuf,
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the published content.
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub published: Vec<PublishedArtifact>,
    /// Optional artifacts the tool did not produce.
    pub skipped: Vec<String>,
}

/// Copy every mapping out of the workspace, in order.
///
/// Stops at the first required artifact that is missing or cannot be copied;
/// artifacts copied before that point stay in place.
pub fn publish(workspace: &Workspace, mappings: &[OutputMapping]) -> SandboxResult<PublishReport> {
    let mut report = PublishReport::default();

    for mapping in mappings {
        let source = workspace.join(&mapping.artifact);
        if !source.is_file() {
            match mapping.requirement {
                Requirement::Optional => {
                    obs::emit_artifact_skipped(&mapping.artifact);
                    report.skipped.push(mapping.artifact.clone());
                    continue;
                }
                Requirement::Required => {
                    return Err(SandboxError::publication(
                        &mapping.artifact,
                        &mapping.destination,
                        "artifact was not produced by the tool",
                    ));
                }
            }
        }

        let (bytes, sha256) = copy_atomic(&source, &mapping.destination).map_err(|e| {
            SandboxError::publication(&mapping.artifact, &mapping.destination, e)
        })?;
        obs::emit_artifact_published(&mapping.artifact, &mapping.destination, bytes);
        report.published.push(PublishedArtifact {
            artifact: mapping.artifact.clone(),
            destination: mapping.destination.clone(),
            bytes,
            sha256,
        });
    }

    Ok(report)
}

/// Whole-file copy through a temp file in the destination directory.
fn copy_atomic(source: &Path, destination: &Path) -> io::Result<(u64, String)> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut input = File::open(source)?;
    let permissions = input.metadata()?.permissions();
    let mut tmp = NamedTempFile::new_in(&parent)?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 256 * 1024];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        tmp.write_all(&buf[..n])?;
        total += n as u64;
    }
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(destination).map_err(|e| e.error)?;

    Ok((total, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;

    fn setup() -> (tempfile::TempDir, Workspace, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(&SandboxConfig::default().with_workspace_root(root.path()))
            .unwrap();
        let out = root.path().join("out");
        fs::create_dir(&out).unwrap();
        (root, ws, out)
    }

    #[test]
    fn test_publish_copies_required_artifacts() {
        let (_root, ws, out) = setup();
        fs::write(ws.join("cc_output"), b"accuracy").unwrap();
        fs::write(ws.join("input1.tmap"), b"tmap").unwrap();

        let report = publish(
            &ws,
            &[
                OutputMapping::required("cc_output", out.join("accuracy.txt")),
                OutputMapping::required("input1.tmap", out.join("tmap.txt")),
            ],
        )
        .unwrap();

        assert_eq!(report.published.len(), 2);
        assert!(report.skipped.is_empty());
        assert_eq!(fs::read(out.join("accuracy.txt")).unwrap(), b"accuracy");
        assert_eq!(fs::read(out.join("tmap.txt")).unwrap(), b"tmap");
        assert_eq!(report.published[0].bytes, 8);
        assert_eq!(report.published[0].sha256.len(), 64);
    }

    #[test]
    fn test_destination_is_a_real_file_not_a_link() {
        let (_root, ws, out) = setup();
        fs::write(ws.join("cc_output"), b"accuracy").unwrap();
        publish(&ws, &[OutputMapping::required("cc_output", out.join("a"))]).unwrap();
        let meta = out.join("a").symlink_metadata().unwrap();
        assert!(meta.file_type().is_file());
    }

    #[test]
    fn test_missing_optional_is_skipped() {
        let (_root, ws, out) = setup();
        fs::write(ws.join("cc_output"), b"accuracy").unwrap();

        let report = publish(
            &ws,
            &[
                OutputMapping::required("cc_output", out.join("a")),
                OutputMapping::optional("cc_output.tracking", out.join("t")),
            ],
        )
        .unwrap();
        assert_eq!(report.skipped, vec!["cc_output.tracking".to_string()]);
        assert!(!out.join("t").exists());
    }

    #[test]
    fn test_missing_required_aborts_remaining_copies() {
        let (_root, ws, out) = setup();
        fs::write(ws.join("cc_output"), b"accuracy").unwrap();
        fs::write(ws.join("input1.refmap"), b"refmap").unwrap();

        let err = publish(
            &ws,
            &[
                OutputMapping::required("cc_output", out.join("a")),
                OutputMapping::required("input1.tmap", out.join("tmap")),
                OutputMapping::required("input1.refmap", out.join("refmap")),
            ],
        )
        .unwrap_err();

        match err {
            SandboxError::Publication { artifact, .. } => assert_eq!(artifact, "input1.tmap"),
            other => panic!("expected Publication, got {other:?}"),
        }
        assert!(out.join("a").exists());
        assert!(!out.join("tmap").exists());
        assert!(!out.join("refmap").exists());
    }

    #[test]
    fn test_unwritable_destination_is_publication_error() {
        let (_root, ws, out) = setup();
        fs::write(ws.join("cc_output"), b"accuracy").unwrap();
        let err = publish(
            &ws,
            &[OutputMapping::required(
                "cc_output",
                out.join("no-such-dir").join("a"),
            )],
        )
        .unwrap_err();
        assert!(matches!(err, SandboxError::Publication { .. }));
    }

    #[test]
    fn test_publish_overwrites_existing_destination() {
        let (_root, ws, out) = setup();
        fs::write(ws.join("cc_output"), b"new").unwrap();
        fs::write(out.join("a"), b"stale contents").unwrap();
        publish(&ws, &[OutputMapping::required("cc_output", out.join("a"))]).unwrap();
        assert_eq!(fs::read(out.join("a")).unwrap(), b"new");
    }

    #[test]
    fn test_digest_matches_content() {
        let (_root, ws, out) = setup();
        fs::write(ws.join("cc_output"), b"abc").unwrap();
        let report =
            publish(&ws, &[OutputMapping::required("cc_output", out.join("a"))]).unwrap();
        assert_eq!(
            report.published[0].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
