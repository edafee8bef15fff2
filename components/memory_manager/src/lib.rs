//! Memory Manager - object pools for primitive stack items
//!
//! This component provides:
//! - [`LimitedObjectPool`], a bounded single-threaded pool
//! - [`SharedObjectPool`], a thread-shared pool with a checkout gate
//! - [`ObjectFactory`], the per-engine bundle of boolean, integer and
//!   byte-string pools

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod factory;
pub mod pool;
pub mod shared_pool;

// Re-export main types
pub use error::PoolError;
pub use factory::{ObjectFactory, PoolStats};
pub use pool::{LimitedObjectPool, Poolable};
pub use shared_pool::{PooledItem, SharedObjectPool};
