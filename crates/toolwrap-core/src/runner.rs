//! External process execution with bounded stderr capture.
//!
//! stderr is drained by a dedicated task while the child runs, so a verbose
//! tool can never block on a full pipe. Only the first `stderr_cap` bytes are
//! retained; everything after that is counted and discarded.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::CommandLine;
use crate::config::{duration_millis, SandboxConfig};
use crate::error::{SandboxError, SandboxResult};
use crate::obs;

/// Size of each read from a captured stream (1 MiB).
pub const STDERR_CHUNK_SIZE: usize = 1024 * 1024;

/// Bytes captured from a child stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    bytes: Vec<u8>,
    total_bytes: u64,
    truncated: bool,
}

impl CapturedOutput {
    /// Retained bytes (at most the configured cap).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes the child wrote, retained or not.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    /// Retained bytes as text, with a marker when output was cut off.
    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            let dropped = self.total_bytes - self.bytes.len() as u64;
            text.push_str(&format!("\n[... {dropped} more bytes truncated]"));
        }
        text
    }
}

/// Appends chunks up to a fixed cap.
#[derive(Debug)]
struct BoundedAccumulator {
    cap: usize,
    out: CapturedOutput,
}

impl BoundedAccumulator {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            out: CapturedOutput::default(),
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.out.total_bytes += chunk.len() as u64;
        let room = self.cap.saturating_sub(self.out.bytes.len());
        if chunk.len() > room {
            self.out.truncated = true;
        }
        let take = chunk.len().min(room);
        self.out.bytes.extend_from_slice(&chunk[..take]);
    }

    fn finish(self) -> CapturedOutput {
        self.out
    }
}

/// Read `reader` to end-of-stream, retaining at most `cap` bytes.
///
/// A read error ends the capture early; what was read so far is returned.
pub async fn drain_bounded<R>(mut reader: R, cap: usize) -> CapturedOutput
where
    R: AsyncRead + Unpin,
{
    let mut acc = BoundedAccumulator::new(cap);
    let mut chunk = vec![0u8; STDERR_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => acc.push(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(event = "stream.read_error", error = %e);
                break;
            }
        }
    }
    acc.finish()
}

/// Limits applied to a single process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Kill the child after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub stderr_cap: usize,
}

impl From<&SandboxConfig> for RunLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            timeout: config.timeout(),
            stderr_cap: config.stderr_cap_bytes,
        }
    }
}

/// How the child finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stderr: CapturedOutput,
    pub duration_ms: u64,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

enum Interrupt {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

/// Runs one command in a working directory.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    limits: RunLimits,
}

impl ProcessRunner {
    pub fn new(limits: RunLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    /// Launch `command` with `working_dir` as its cwd and wait for it.
    ///
    /// A non-zero exit is a normal outcome. Errors are reserved for launch
    /// failures, cancellation and timeouts; in the latter two the child is
    /// killed and reaped before returning.
    pub async fn run(
        &self,
        command: &CommandLine,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> SandboxResult<ProcessOutcome> {
        let start = Instant::now();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Launch {
                program: command.program_name(),
                source,
            })?;
        debug!(event = "process.spawned", pid = ?child.id(), command = %command);

        let stderr = child.stderr.take().ok_or_else(|| SandboxError::Execution {
            exit_code: None,
            message: "failed to capture stderr of the tool".to_string(),
        })?;
        let mut reader = tokio::spawn(drain_bounded(stderr, self.limits.stderr_cap));

        let interrupt = tokio::select! {
            biased;
            _ = cancel.cancelled() => Interrupt::Cancelled,
            _ = deadline(start, self.limits.timeout) => {
                Interrupt::TimedOut(self.limits.timeout.unwrap_or_default())
            }
            status = child.wait() => Interrupt::Exited(status),
        };

        let status = match interrupt {
            Interrupt::Exited(status) => status?,
            Interrupt::Cancelled => {
                terminate(&mut child, &reader).await;
                return Err(SandboxError::Cancelled);
            }
            Interrupt::TimedOut(limit) => {
                terminate(&mut child, &reader).await;
                return Err(SandboxError::TimedOut {
                    limit_ms: duration_millis(limit),
                });
            }
        };

        // A grandchild may still hold the pipe open; the same deadline applies.
        let stderr = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                reader.abort();
                return Err(SandboxError::Cancelled);
            }
            _ = deadline(start, self.limits.timeout) => {
                reader.abort();
                return Err(SandboxError::TimedOut {
                    limit_ms: duration_millis(self.limits.timeout.unwrap_or_default()),
                });
            }
            joined = &mut reader => joined.unwrap_or_else(|e| {
                warn!(event = "stream.reader_failed", error = %e);
                CapturedOutput::default()
            }),
        };

        let outcome = ProcessOutcome {
            exit_code: status.code(),
            signal: exit_signal(&status),
            stderr,
            duration_ms: duration_millis(start.elapsed()),
        };
        obs::emit_process_exited(
            outcome.exit_code,
            outcome.signal,
            outcome.duration_ms,
            outcome.stderr.total_bytes(),
        );
        Ok(outcome)
    }
}

/// Resolves `timeout` after `start`, or never.
async fn deadline(start: Instant, timeout: Option<Duration>) {
    match timeout.and_then(|limit| start.checked_add(limit)) {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending::<()>().await,
    }
}

async fn terminate(child: &mut Child, reader: &JoinHandle<CapturedOutput>) {
    if let Err(e) = child.start_kill() {
        debug!(event = "process.kill_failed", error = %e);
    }
    if let Err(e) = child.wait().await {
        warn!(event = "process.reap_failed", error = %e);
    }
    reader.abort();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
