//! Single-threaded bounded object pool.
//!
//! A pool preallocates `min` instances. [`LimitedObjectPool::get`] reuses an
//! available instance when there is one; [`LimitedObjectPool::give_back`]
//! keeps returned instances only while fewer than `max` are waiting.

use std::collections::VecDeque;

use core_types::{ByteString, Integer, VmResult};
use num_bigint::BigInt;

use crate::error::PoolError;

/// A value that can be reinitialized in place.
pub trait Poolable: Default {
    /// Input used to reinitialize an instance.
    type Value<'a>;

    /// Reinitialize with `value`.
    fn set_value(&mut self, value: Self::Value<'_>) -> VmResult<()>;

    /// Return to the default state before going back to a pool.
    fn reset(&mut self);
}

impl Poolable for bool {
    type Value<'a> = bool;

    fn set_value(&mut self, value: Self::Value<'_>) -> VmResult<()> {
        *self = value;
        Ok(())
    }

    fn reset(&mut self) {
        *self = false;
    }
}

impl Poolable for Integer {
    type Value<'a> = BigInt;

    fn set_value(&mut self, value: Self::Value<'_>) -> VmResult<()> {
        Integer::set_value(self, value)
    }

    fn reset(&mut self) {
        *self = Integer::default();
    }
}

impl Poolable for ByteString {
    type Value<'a> = &'a [u8];

    fn set_value(&mut self, value: Self::Value<'_>) -> VmResult<()> {
        self.set_bytes(value);
        Ok(())
    }

    fn reset(&mut self) {
        self.set_bytes(&[]);
    }
}

/// Bounded pool of reusable instances.
#[derive(Debug)]
pub struct LimitedObjectPool<T: Poolable> {
    available: VecDeque<T>,
    min_size: usize,
    max_size: usize,
}

impl<T: Poolable> LimitedObjectPool<T> {
    /// Create a pool holding `min_size` fresh instances.
    pub fn new(max_size: usize, min_size: usize) -> Result<Self, PoolError> {
        if min_size > max_size {
            return Err(PoolError::InvalidCapacity {
                min: min_size,
                max: max_size,
            });
        }
        let available = std::iter::repeat_with(T::default).take(min_size).collect();
        Ok(Self {
            available,
            min_size,
            max_size,
        })
    }

    /// Like [`LimitedObjectPool::new`], lowering `min_size` to `max_size` if needed.
    pub fn clamped(max_size: usize, min_size: usize) -> Self {
        let min_size = min_size.min(max_size);
        Self {
            available: std::iter::repeat_with(T::default).take(min_size).collect(),
            min_size,
            max_size,
        }
    }

    /// Take an instance initialized with `value`.
    pub fn get(&mut self, value: T::Value<'_>) -> VmResult<T> {
        let mut item = self.available.pop_front().unwrap_or_default();
        if let Err(error) = item.set_value(value) {
            self.give_back(item);
            return Err(error);
        }
        Ok(item)
    }

    /// Return an instance; dropped if the pool is full.
    pub fn give_back(&mut self, mut item: T) {
        if self.available.len() >= self.max_size {
            return;
        }
        item.reset();
        self.available.push_back(item);
    }

    /// Instances waiting for reuse.
    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Preallocation count.
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Most instances kept waiting.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
