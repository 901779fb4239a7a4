//! Pipeline error types.

use thiserror::Error;

/// Errors raised while supervising the capture process or consuming its records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangefeedError {
    /// No capture binary exists for this CPU architecture
    #[error("Unsupported platform for PostgreSQL replication: {arch}")]
    UnsupportedPlatform { arch: String },

    /// Capture binary could not be executed
    #[error("Failed to spawn capture process: {0}")]
    SpawnError(String),

    /// Capture process is gone
    #[error("Capture process {pid} exited abnormally")]
    ChildExited { pid: u32 },

    /// Record is not a well-formed wire record
    #[error("Malformed record: {0}")]
    ParseError(String),

    /// Change or commit for a transaction that was never begun
    #[error("Unknown transaction {0}")]
    UnknownTransaction(i64),

    /// Begin for a transaction that already has a live buffer
    #[error("Transaction {0} already has a live buffer")]
    DuplicateTransaction(i64),

    /// Action outside begin/insert/update/delete/commit
    #[error("Unsupported action '{0}'")]
    UnsupportedAction(String),

    /// No registered entity type for the entity kind
    #[error("No entity registered for '{0}'")]
    UnresolvedEntityKind(String),

    /// Spilled record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error on a spill file or directory
    #[error("I/O error: {0}")]
    IoError(String),

    /// Disk full while spilling
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIoError(String),

    /// Signal disposition could not be read, restored or delivered
    #[error("Signal error: {0}")]
    SignalError(String),
}

impl ChangefeedError {
    /// Returns `true` when the error must stop the whole pipeline.
    ///
    /// Record-level errors are recoverable: the record is logged and dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChangefeedError::UnsupportedPlatform { .. }
                | ChangefeedError::SpawnError(_)
                | ChangefeedError::ChildExited { .. }
                | ChangefeedError::DuplicateTransaction(_)
                | ChangefeedError::SignalError(_)
        )
    }
}
