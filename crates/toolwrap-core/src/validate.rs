//! Exit-status and output sanity checks.
//!
//! Some tools exit 0 after producing nothing useful, so a clean exit is
//! re-checked against the primary output artifact and every other required
//! artifact the tool left behind.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{SandboxError, SandboxResult};
use crate::publish::{OutputMapping, Requirement};
use crate::runner::ProcessOutcome;
use crate::workspace::Workspace;

/// Message used when the primary output is missing or blank.
pub const EMPTY_OUTPUT_MESSAGE: &str =
    "The main output file is empty, there may be an error with your input file or settings.";

/// Fail unless the process exited 0 and `primary_output` has content.
pub fn validate(outcome: &ProcessOutcome, primary_output: &Path) -> SandboxResult<()> {
    if !outcome.success() {
        return Err(SandboxError::Execution {
            exit_code: outcome.exit_code,
            message: failure_message(outcome),
        });
    }

    let has_content = has_non_whitespace(primary_output).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SandboxError::Execution {
                exit_code: outcome.exit_code,
                message: EMPTY_OUTPUT_MESSAGE.to_string(),
            }
        } else {
            SandboxError::Execution {
                exit_code: outcome.exit_code,
                message: format!(
                    "cannot read main output file {}: {e}",
                    primary_output.display()
                ),
            }
        }
    })?;
    if !has_content {
        return Err(SandboxError::Execution {
            exit_code: outcome.exit_code,
            message: EMPTY_OUTPUT_MESSAGE.to_string(),
        });
    }
    Ok(())
}

/// Fail if a required artifact exists but holds only whitespace.
///
/// Missing artifacts are left for publication to report.
pub fn validate_required_outputs(
    outcome: &ProcessOutcome,
    workspace: &Workspace,
    mappings: &[OutputMapping],
) -> SandboxResult<()> {
    let required = mappings
        .iter()
        .filter(|m| m.requirement == Requirement::Required);
    for mapping in required {
        let source = workspace.join(&mapping.artifact);
        if !source.is_file() {
            continue;
        }
        let has_content = has_non_whitespace(&source).map_err(|e| SandboxError::Execution {
            exit_code: outcome.exit_code,
            message: format!("cannot read output file {}: {e}", mapping.artifact),
        })?;
        if !has_content {
            return Err(SandboxError::Execution {
                exit_code: outcome.exit_code,
                message: format!(
                    "The output file {} is empty, there may be an error with your input file or settings.",
                    mapping.artifact
                ),
            });
        }
    }
    Ok(())
}

fn failure_message(outcome: &ProcessOutcome) -> String {
    let diagnostics = outcome.stderr.text();
    let diagnostics = diagnostics.trim();
    if !diagnostics.is_empty() {
        return diagnostics.to_string();
    }
    match (outcome.exit_code, outcome.signal) {
        (Some(code), _) => format!("tool exited with status {code}"),
        (None, Some(signal)) => format!("tool was terminated by signal {signal}"),
        (None, None) => "tool terminated abnormally".to_string(),
    }
}

/// Whether the file contains at least one non-whitespace byte, read in chunks.
pub fn has_non_whitespace(path: &Path) -> std::io::Result<bool> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(false),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if buf[..n].iter().any(|b| !is_space(*b)) {
            return Ok(true);
        }
    }
}

// ASCII whitespace including vertical tab.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{drain_bounded, CapturedOutput};

    async fn outcome(exit_code: Option<i32>, stderr: &[u8]) -> ProcessOutcome {
        ProcessOutcome {
            exit_code,
            signal: None,
            stderr: drain_bounded(stderr, 1024).await,
            duration_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cc_output");
        std::fs::write(&out, b"plenty of output").unwrap();

        let err = validate(&outcome(Some(1), b"Error: bad GTF line 12\n").await, &out)
            .unwrap_err();
        match err {
            SandboxError::Execution { exit_code, message } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(message, "Error: bad GTF line 12");
            }
            other => panic!("expected Execution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr_names_status() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate(&outcome(Some(4), b"").await, &dir.path().join("x"))
            .unwrap_err();
        assert!(err.to_string().contains("status 4"));
    }

    #[test]
    fn test_signal_without_stderr_names_signal() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ProcessOutcome {
            exit_code: None,
            signal: Some(9),
            stderr: CapturedOutput::default(),
            duration_ms: 1,
        };
        let err = validate(&outcome, &dir.path().join("x")).unwrap_err();
        assert!(err.to_string().contains("signal 9"));
    }

    #[tokio::test]
    async fn test_zero_exit_with_content_passes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cc_output");
        std::fs::write(&out, b"\n\n  Sensitivity | Specificity\n").unwrap();
        validate(&outcome(Some(0), b"warnings are fine").await, &out).unwrap();
    }

    #[tokio::test]
    async fn test_zero_exit_with_blank_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cc_output");
        std::fs::write(&out, b" \n\t\r\n\x0b\x0c").unwrap();
        let err = validate(&outcome(Some(0), b"").await, &out).unwrap_err();
        assert!(matches!(err, SandboxError::Execution { .. }));
        assert_eq!(err.to_string(), EMPTY_OUTPUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_zero_exit_with_missing_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate(&outcome(Some(0), b"").await, &dir.path().join("cc_output"))
            .unwrap_err();
        assert_eq!(err.to_string(), EMPTY_OUTPUT_MESSAGE);
    }

    fn workspace_in(root: &Path) -> Workspace {
        Workspace::create(&crate::config::SandboxConfig::default().with_workspace_root(root))
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_required_side_output_fails() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace_in(root.path());
        std::fs::write(ws.join("cc_output"), b"accuracy").unwrap();
        std::fs::write(ws.join("input1.tmap"), b"").unwrap();
        let mappings = [
            OutputMapping::required("cc_output", root.path().join("a")),
            OutputMapping::required("input1.tmap", root.path().join("t")),
        ];

        let err = validate_required_outputs(&outcome(Some(0), b"").await, &ws, &mappings)
            .unwrap_err();
        assert!(matches!(err, SandboxError::Execution { exit_code: Some(0), .. }));
        assert!(err.to_string().contains("input1.tmap is empty"));
    }

    #[tokio::test]
    async fn test_empty_optional_and_missing_required_pass_through() {
        let root = tempfile::tempdir().unwrap();
        let ws = workspace_in(root.path());
        std::fs::write(ws.join("cc_output"), b"accuracy").unwrap();
        std::fs::write(ws.join("cc_output.tracking"), b"\n").unwrap();
        let mappings = [
            OutputMapping::required("cc_output", root.path().join("a")),
            OutputMapping::optional("cc_output.tracking", root.path().join("t")),
            OutputMapping::required("input1.tmap", root.path().join("m")),
        ];

        validate_required_outputs(&outcome(Some(0), b"").await, &ws, &mappings).unwrap();
    }

    #[test]
    fn test_content_after_large_whitespace_prefix_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        let mut data = vec![b' '; 200 * 1024];
        data.push(b'x');
        std::fs::write(&path, data).unwrap();
        assert!(has_non_whitespace(&path).unwrap());
    }
}
