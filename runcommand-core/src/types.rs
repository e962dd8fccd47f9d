use std::path::PathBuf;

use thiserror::Error;

// Re-export Result type for convenience
pub type Result<T> = std::result::Result<T, HandlerError>;

/// Errors surfaced by the run-command pipeline
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to save sequence number to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read sequence number from {path}: {source}")]
    SequenceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sequence number {content:?} in {path}")]
    SequenceParse { path: PathBuf, content: String },

    #[error("failed to decode script: {0}")]
    Decode(String),

    #[error("failed to decompress script: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("failed to download {uri}: {reason}")]
    Download { uri: String, reason: String },

    #[error("failed to write {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to execute command: {0}")]
    Execution(String),

    #[error("invalid handler settings: {0}")]
    InvalidSettings(String),
}

impl HandlerError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a single command-line invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The sequence number was already processed
    Skipped { seq_no: u64 },
    Completed(Option<ExecutionResult>),
}

/// Result of running the user script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}
