//! Pool configuration errors

use thiserror::Error;

/// Errors raised when building a pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The preallocation count exceeds the capacity
    #[error("minimum size {min} cannot be greater than maximum size {max}")]
    InvalidCapacity {
        /// Requested minimum
        min: usize,
        /// Requested maximum
        max: usize,
    },
}
