//! Error types for the EDGERT runtime core.

use thiserror::Error;

/// Result type for runtime operations
pub type RtResult<T> = Result<T, RtError>;

/// Error kinds surfaced by the runtime core.
///
/// `PermissionDenied` is special-cased by the task engine: failing to apply
/// real-time scheduling parameters is logged and the thread continues with
/// default scheduling. Every other kind is propagated to the caller.
#[derive(Error, Debug)]
pub enum RtError {
    /// Name already taken in a registry (labels, tasks)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Lookup failed (labels, tasks, client connect)
    #[error("not found: {0}")]
    NotFound(String),

    /// Buffer length does not match the registered label size
    #[error("label {id} size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch {
        id: u32,
        expected: usize,
        got: usize,
    },

    /// Real-time scheduling parameters could not be applied
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Non-blocking channel operation found the queue full/empty
    #[error("operation would block")]
    WouldBlock,

    /// Channel payload exceeds the configured maximum
    #[error("message too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: usize },

    /// Transport failure; the channel fast-fails until re-connect
    #[error("channel broken: {0}")]
    BrokenChannel(String),

    /// Registration-time validation failure
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// OS thread creation failed; the offending task is omitted from the run
    #[error("thread spawn failed for {0}")]
    ThreadSpawn(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
