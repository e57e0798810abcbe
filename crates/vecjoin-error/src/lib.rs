//! Error type shared by every vecjoin crate.
//!
//! Three kinds of failure matter to callers of the hash join:
//! - [`VecJoinError::MemoryLimitExceeded`] is recoverable. A spill controller
//!   reacts to it by exporting the buffered build rows.
//! - [`VecJoinError::Cancelled`] and [`VecJoinError::DeadlineExceeded`] abort
//!   the current pull. Batches returned earlier stay valid.
//! - [`VecJoinError::Internal`] means an invariant was broken and the
//!   operation must not continue.
//!
//! End-of-stream is never reported through this type.

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, VecJoinError>;

/// Primary error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VecJoinError {
    /// A bounded memory account refused a charge.
    #[error(
        "memory limit exceeded in account '{account}': requested {requested} bytes \
         with {used} of {limit} bytes in use"
    )]
    MemoryLimitExceeded {
        account: String,
        requested: usize,
        used: usize,
        limit: usize,
    },

    /// The cancellation flag of the context was raised.
    #[error("query cancelled")]
    Cancelled,

    /// The context deadline passed.
    #[error("query deadline exceeded by {overrun_ms} ms")]
    DeadlineExceeded { overrun_ms: u64 },

    /// Construction-time validation failure.
    #[error("invalid hash join specification: {0}")]
    InvalidSpec(String),

    /// A column batch was malformed or misused.
    #[error("batch format error: {0}")]
    BatchFormat(String),

    /// Typed copy between columns of different vector types.
    #[error("column type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Broken invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VecJoinError {
    /// Build an [`VecJoinError::Internal`] from any message.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Build a [`VecJoinError::BatchFormat`] from any message.
    #[must_use]
    pub fn batch_format(msg: impl Into<String>) -> Self {
        Self::BatchFormat(msg.into())
    }

    /// Build a [`VecJoinError::InvalidSpec`] from any message.
    #[must_use]
    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    /// Whether this is the recoverable out-of-budget condition.
    #[must_use]
    pub const fn is_memory_limit(&self) -> bool {
        matches!(self, Self::MemoryLimitExceeded { .. })
    }

    /// Whether the error came from the cancellation context.
    #[must_use]
    pub const fn is_interrupt(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded { .. })
    }

    /// Whether the caller may recover from this error without discarding
    /// output already returned.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        self.is_memory_limit() || self.is_interrupt()
    }
}
