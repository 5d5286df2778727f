//! toolwrap core: sandboxed execution of external command-line tools.
//!
//! One [`Invocation`] runs through a private workspace:
//!
//! - [`workspace`]: create and always tear down a temporary directory
//! - [`reference`]: pointer-table lookup for auxiliary reference files
//! - [`staging`]: link-or-copy inputs under tool-expected names
//! - [`command`]: discrete argument vectors, never shell strings
//! - [`runner`]: run the process, drain stderr into a bounded buffer
//! - [`validate`]: exit status and primary-output sanity checks
//! - [`publish`]: copy artifacts to caller destinations
//! - [`invocation`]: the pipeline tying these together
//!
//! Tool profiles such as [`cuffcompare`] translate tool-specific options into
//! an [`Invocation`].

pub mod command;
pub mod config;
pub mod cuffcompare;
pub mod error;
pub mod invocation;
pub mod obs;
pub mod publish;
pub mod reference;
pub mod runner;
pub mod staging;
pub mod telemetry;
pub mod validate;
pub mod version;
pub mod workspace;

pub use command::{CommandLine, CommandTemplate, OptionValue, ToolOption};
pub use config::SandboxConfig;
pub use cuffcompare::{CuffcompareOutputs, CuffcompareRequest};
pub use error::{FailureKind, SandboxError, SandboxResult};
pub use invocation::{execute, Invocation, InvocationReport, InvocationState};
pub use publish::{OutputMapping, PublishReport, PublishedArtifact, Requirement};
pub use reference::{pointer_table_path, resolve, ReferenceRequest};
pub use runner::{CapturedOutput, ProcessOutcome, ProcessRunner, RunLimits};
pub use staging::{InputSpec, StagedInput, StagingMethod};
pub use telemetry::init_tracing;
pub use version::probe_version;
pub use workspace::Workspace;

/// Re-exported so callers can cancel invocations without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;

/// toolwrap version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
