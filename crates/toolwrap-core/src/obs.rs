//! Structured observability hooks for the invocation lifecycle.
//!
//! Events are emitted at `info!` level (warnings for cleanup problems) with
//! an `event` field so they can be filtered in JSON log pipelines.

use std::path::Path;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::FailureKind;
use crate::invocation::InvocationState;

/// Span tagged with the invocation id.
///
/// Attach it with `tracing::Instrument` rather than entering it, so the
/// instrumented future stays `Send` across awaits.
pub fn invocation_span(invocation_id: &Uuid, tool: &str) -> tracing::Span {
    tracing::info_span!("toolwrap.invocation", invocation_id = %invocation_id, tool = %tool)
}

pub fn emit_invocation_started(invocation_id: &Uuid, inputs: usize, outputs: usize) {
    info!(
        event = "invocation.started",
        invocation_id = %invocation_id,
        inputs = inputs,
        outputs = outputs,
    );
}

/// Emit event: state machine transition.
pub fn emit_state_changed(from: InvocationState, to: InvocationState) {
    debug!(event = "invocation.state", from = %from, to = %to);
}

/// Emit event: child process exited (or was killed by a signal).
pub fn emit_process_exited(
    exit_code: Option<i32>,
    signal: Option<i32>,
    duration_ms: u64,
    stderr_bytes: u64,
) {
    info!(
        event = "process.exited",
        exit_code = ?exit_code,
        signal = ?signal,
        duration_ms = duration_ms,
        stderr_bytes = stderr_bytes,
    );
}

pub fn emit_artifact_published(artifact: &str, destination: &Path, bytes: u64) {
    info!(
        event = "artifact.published",
        artifact = %artifact,
        destination = %destination.display(),
        bytes = bytes,
    );
}

pub fn emit_artifact_skipped(artifact: &str) {
    debug!(event = "artifact.skipped", artifact = %artifact);
}

pub fn emit_invocation_finished(invocation_id: &Uuid, duration_ms: u64, success: bool) {
    info!(
        event = "invocation.finished",
        invocation_id = %invocation_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: invocation failed (warning level).
pub fn emit_invocation_failed(
    invocation_id: &Uuid,
    kind: FailureKind,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "invocation.failed",
        invocation_id = %invocation_id,
        kind = %kind,
        error = %error,
    );
}

/// Emit event: workspace removal failed (warning level, never escalated).
pub fn emit_cleanup_failed(workspace: &Path, error: &dyn std::fmt::Display) {
    warn!(
        event = "workspace.cleanup_failed",
        workspace = %workspace.display(),
        error = %error,
    );
}
