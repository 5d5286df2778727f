//! Error taxonomy for the tool execution sandbox.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Errors produced while running one invocation.
///
/// Every variant is fatal for the invocation that produced it. Workspace
/// cleanup failures are deliberately absent: they are logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Missing or unusable configuration (pointer table, destinations, limits).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to stage input {}: {reason}", source_path.display())]
    Staging { source_path: PathBuf, reason: String },

    /// The executable could not be found or started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit, death by signal, or an empty primary output.
    #[error("{message}")]
    Execution {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("failed to publish {artifact} to {}: {reason}", destination.display())]
    Publication {
        artifact: String,
        destination: PathBuf,
        reason: String,
    },

    #[error("invocation cancelled")]
    Cancelled,

    #[error("tool timed out after {limit_ms}ms")]
    TimedOut { limit_ms: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse category of a [`SandboxError`], stable for logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    Staging,
    Launch,
    Execution,
    Publication,
    Cancelled,
    TimedOut,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Staging => "staging",
            FailureKind::Launch => "launch",
            FailureKind::Execution => "execution",
            FailureKind::Publication => "publication",
            FailureKind::Cancelled => "cancelled",
            FailureKind::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SandboxError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SandboxError::Configuration(message.into())
    }

    pub fn staging(source_path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        SandboxError::Staging {
            source_path: source_path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn publication(
        artifact: impl Into<String>,
        destination: impl Into<PathBuf>,
        reason: impl std::fmt::Display,
    ) -> Self {
        SandboxError::Publication {
            artifact: artifact.into(),
            destination: destination.into(),
            reason: reason.to_string(),
        }
    }

    /// Category of this error. Stray I/O errors count as execution failures.
    pub fn kind(&self) -> FailureKind {
        match self {
            SandboxError::Configuration(_) => FailureKind::Configuration,
            SandboxError::Staging { .. } => FailureKind::Staging,
            SandboxError::Launch { .. } => FailureKind::Launch,
            SandboxError::Execution { .. } | SandboxError::Io(_) => FailureKind::Execution,
            SandboxError::Publication { .. } => FailureKind::Publication,
            SandboxError::Cancelled => FailureKind::Cancelled,
            SandboxError::TimedOut { .. } => FailureKind::TimedOut,
        }
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
