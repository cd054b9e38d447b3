//! Error types for the vigil scheduler and supervisor.

use crate::worker::WorkerError;

/// Top-level error type for scheduling and supervision.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Persisted state document error (read, parse, write).
    #[error("state error: {0}")]
    State(String),

    /// Another invocation holds a lock we needed.
    #[error("lock error: {0}")]
    Lock(String),

    /// Messaging collaborator error (fallback path).
    #[error("messaging error: {0}")]
    Messaging(String),

    /// Audit log error.
    #[error("audit error: {0}")]
    Audit(String),

    /// Worker process error that escaped local recovery.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VigilError>;
