//! One end-to-end tool invocation.
//!
//! `Created -> Staged -> Executed -> Validated -> Published -> Completed`,
//! with `Failed` reachable from every state. The workspace is torn down on
//! the way into either terminal state, and also when the future running the
//! invocation is dropped.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::command::{self, CommandTemplate};
use crate::config::{duration_millis, SandboxConfig};
use crate::error::{SandboxError, SandboxResult};
use crate::obs;
use crate::publish::{self, OutputMapping, PublishReport};
use crate::reference::ReferenceRequest;
use crate::runner::{ProcessRunner, RunLimits};
use crate::staging::{self, InputSpec};
use crate::validate;
use crate::workspace::Workspace;

/// Name under which a caller-supplied reference override is staged.
pub const REFERENCE_STAGED_NAME: &str = "ref.fa";

/// Lifecycle of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    Created,
    Staged,
    Executed,
    Validated,
    Published,
    Completed,
    Failed,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Created => "created",
            InvocationState::Staged => "staged",
            InvocationState::Executed => "executed",
            InvocationState::Validated => "validated",
            InvocationState::Published => "published",
            InvocationState::Completed => "completed",
            InvocationState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Completed | InvocationState::Failed)
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to run a tool once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Label used in logs.
    pub tool: String,
    pub inputs: Vec<InputSpec>,
    pub reference: Option<ReferenceRequest>,
    pub template: CommandTemplate,
    pub outputs: Vec<OutputMapping>,
    /// Workspace-relative artifact checked for content after a clean exit.
    pub primary_output: String,
}

impl Invocation {
    /// New invocation whose primary output is the template's output prefix.
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            tool: template.program.clone(),
            primary_output: template.output_prefix.clone(),
            inputs: Vec::new(),
            reference: None,
            template,
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, spec: InputSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn reference(mut self, request: ReferenceRequest) -> Self {
        self.reference = Some(request);
        self
    }

    pub fn output(mut self, mapping: OutputMapping) -> Self {
        self.outputs.push(mapping);
        self
    }

    pub fn primary_output(mut self, artifact: impl Into<String>) -> Self {
        self.primary_output = artifact.into();
        self
    }
}

/// Summary of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationReport {
    pub id: Uuid,
    pub tool: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    /// Bytes the tool wrote to stderr (diagnostics are not kept on success).
    pub stderr_bytes: u64,
    pub publish: PublishReport,
}

struct StateTracker {
    current: InvocationState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            current: InvocationState::Created,
        }
    }

    fn advance(&mut self, next: InvocationState) {
        debug_assert!(!self.current.is_terminal(), "invocation already finished");
        obs::emit_state_changed(self.current, next);
        self.current = next;
    }
}

struct PipelineOutput {
    exit_code: Option<i32>,
    stderr_bytes: u64,
    publish: PublishReport,
}

/// Run an invocation to completion.
///
/// Cancelling `cancel` kills the tool if it is running and fails the
/// invocation with [`SandboxError::Cancelled`]; the workspace is still removed.
pub async fn execute(
    invocation: &Invocation,
    config: &SandboxConfig,
    cancel: CancellationToken,
) -> SandboxResult<InvocationReport> {
    let id = Uuid::new_v4();
    let span = obs::invocation_span(&id, &invocation.tool);
    run(id, invocation, config, cancel).instrument(span).await
}

async fn run(
    id: Uuid,
    invocation: &Invocation,
    config: &SandboxConfig,
    cancel: CancellationToken,
) -> SandboxResult<InvocationReport> {
    let started_at = Utc::now();
    let start = Instant::now();
    obs::emit_invocation_started(&id, invocation.inputs.len(), invocation.outputs.len());

    let mut tracker = StateTracker::new();
    let result = async {
        let mut workspace = Workspace::create(config)?;
        let result = drive(&mut tracker, &workspace, invocation, config, &cancel).await;
        workspace.destroy();
        result
    }
    .await;

    let duration_ms = duration_millis(start.elapsed());
    match &result {
        Ok(_) => tracker.advance(InvocationState::Completed),
        Err(e) => {
            tracker.advance(InvocationState::Failed);
            obs::emit_invocation_failed(&id, e.kind(), e);
        }
    }
    obs::emit_invocation_finished(&id, duration_ms, result.is_ok());

    let output = result?;
    Ok(InvocationReport {
        id,
        tool: invocation.tool.clone(),
        started_at,
        finished_at: Utc::now(),
        duration_ms,
        exit_code: output.exit_code,
        stderr_bytes: output.stderr_bytes,
        publish: output.publish,
    })
}

async fn drive(
    tracker: &mut StateTracker,
    workspace: &Workspace,
    invocation: &Invocation,
    config: &SandboxConfig,
    cancel: &CancellationToken,
) -> SandboxResult<PipelineOutput> {
    let reference = resolve_reference(workspace, invocation.reference.as_ref())?;
    let staged = staging::stage_all(workspace, &invocation.inputs)?;
    tracker.advance(InvocationState::Staged);

    let command = command::build(&invocation.template, reference.as_deref(), &staged)?;
    let runner = ProcessRunner::new(RunLimits::from(config));
    let outcome = runner.run(&command, workspace.path(), cancel).await?;
    tracker.advance(InvocationState::Executed);

    validate::validate(&outcome, &workspace.join(&invocation.primary_output))?;
    validate::validate_required_outputs(&outcome, workspace, &invocation.outputs)?;
    tracker.advance(InvocationState::Validated);

    if cancel.is_cancelled() {
        return Err(SandboxError::Cancelled);
    }
    let publish = publish::publish(workspace, &invocation.outputs)?;
    tracker.advance(InvocationState::Published);

    Ok(PipelineOutput {
        exit_code: outcome.exit_code,
        stderr_bytes: outcome.stderr.total_bytes(),
        publish,
    })
}

/// Path handed to the tool for the reference, if one was requested.
fn resolve_reference(
    workspace: &Workspace,
    request: Option<&ReferenceRequest>,
) -> SandboxResult<Option<PathBuf>> {
    let Some(request) = request else {
        return Ok(None);
    };
    let looked_up = request.lookup()?;
    match &request.override_file {
        // Staged so that any index the tool builds lands in the workspace.
        Some(file) => {
            let staged = staging::stage(workspace, &InputSpec::new(file, REFERENCE_STAGED_NAME))?;
            Ok(Some(staged.path))
        }
        None => Ok(looked_up),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::pointer_table_path;

    #[test]
    fn test_state_names() {
        assert_eq!(InvocationState::Created.to_string(), "created");
        assert_eq!(InvocationState::Failed.to_string(), "failed");
        assert!(InvocationState::Completed.is_terminal());
        assert!(!InvocationState::Published.is_terminal());
    }

    #[test]
    fn test_builder_defaults_primary_output_to_prefix() {
        let inv = Invocation::new(CommandTemplate::new("cuffcompare", "-o", "cc_output"));
        assert_eq!(inv.tool, "cuffcompare");
        assert_eq!(inv.primary_output, "cc_output");
        let inv = inv.primary_output("cc_output.stats");
        assert_eq!(inv.primary_output, "cc_output.stats");
    }

    #[test]
    fn test_resolve_reference_prefers_override() {
        let root = tempfile::tempdir().unwrap();
        let index = root.path().join("index");
        std::fs::create_dir(&index).unwrap();
        std::fs::write(pointer_table_path(&index), "index\thg19\t/data/hg19.fa\n").unwrap();
        let history_ref = root.path().join("dataset_7.dat");
        std::fs::write(&history_ref, b">chr1\nACGT\n").unwrap();

        let ws = Workspace::create(&SandboxConfig::default().with_workspace_root(root.path()))
            .unwrap();
        let request = ReferenceRequest::new(&index, "hg19").with_override(&history_ref);
        let path = resolve_reference(&ws, Some(&request)).unwrap().unwrap();
        assert_eq!(path, ws.join(REFERENCE_STAGED_NAME));
    }

    #[test]
    fn test_resolve_reference_uses_table() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(pointer_table_path(root.path()), "index\thg19\t/data/hg19.fa\n").unwrap();
        let ws = Workspace::create(&SandboxConfig::default().with_workspace_root(root.path()))
            .unwrap();
        let request = ReferenceRequest::new(root.path(), "hg19");
        let path = resolve_reference(&ws, Some(&request)).unwrap();
        assert_eq!(path, Some(PathBuf::from("/data/hg19.fa")));
    }

    #[test]
    fn test_resolve_reference_none_requested() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(&SandboxConfig::default().with_workspace_root(root.path()))
            .unwrap();
        assert!(resolve_reference(&ws, None).unwrap().is_none());
    }
}
