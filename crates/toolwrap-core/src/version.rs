//! Best-effort tool version probe.
//!
//! Many tools print their version banner when run without arguments, often
//! together with a usage message and a non-zero exit status.

use std::process::Stdio;
use std::time::Duration;

use regex::RegexBuilder;
use tokio::process::Command;
use tracing::debug;

use crate::runner::drain_bounded;

/// Per-stream capture limit while probing.
const PROBE_CAPTURE_BYTES: usize = 64 * 1024;

/// Default probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `program` with no arguments and return the first output line that
/// contains `marker` (case-insensitive), trimmed. Returns `None` on any failure.
pub async fn probe_version(program: &str, marker: &str, timeout: Duration) -> Option<String> {
    let spawned = Command::new(program)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            debug!(event = "version.probe_failed", program = %program, error = %e);
            return None;
        }
    };

    let stdout = child.stdout.take()?;
    let stderr = child.stderr.take()?;

    let probe = async {
        let (out, err) = tokio::join!(
            drain_bounded(stdout, PROBE_CAPTURE_BYTES),
            drain_bounded(stderr, PROBE_CAPTURE_BYTES),
        );
        let _ = child.wait().await;
        (out, err)
    };
    let (out, err) = match tokio::time::timeout(timeout, probe).await {
        Ok(streams) => streams,
        Err(_) => {
            debug!(event = "version.probe_timed_out", program = %program);
            return None;
        }
    };

    let mut combined = String::from_utf8_lossy(out.bytes()).into_owned();
    combined.push('\n');
    combined.push_str(&String::from_utf8_lossy(err.bytes()));
    find_version_line(&combined, marker)
}

/// First trimmed line of `text` containing `marker`, ignoring case.
pub fn find_version_line(text: &str, marker: &str) -> Option<String> {
    let pattern = RegexBuilder::new(&regex::escape(marker))
        .case_insensitive(true)
        .build()
        .ok()?;
    text.lines()
        .find(|line| pattern.is_match(line))
        .map(|line| line.trim().to_string())
}
