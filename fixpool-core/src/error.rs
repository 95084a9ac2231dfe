use thiserror::Error;

/// Errors reported by pool construction, growth and locking.
///
/// Running out of free chunks is not an error: `alloc` returns `None`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Backing allocator could not supply {bytes} bytes")]
    AllocationFailure { bytes: usize },

    #[error("Pool lock failure: {0}")]
    LockFailure(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PoolError::InvalidArgument(msg.into())
    }
}
