//! Thread-shared object pool.
//!
//! Instances wait in a lock-free queue. A counting gate bounds how many
//! instances are checked out at once: [`SharedObjectPool::acquire`] blocks
//! while the bound is reached, [`SharedObjectPool::try_acquire`] does not.
//! Checked-out instances return to the pool when their guard drops.
//!
//! The pool shares instances between threads; it does not make an engine
//! safe to drive from more than one thread.

use std::ops::{Deref, DerefMut};

use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use core_types::VmResult;

use crate::error::PoolError;
use crate::pool::Poolable;

/// Counting gate over checked-out instances
#[derive(Debug)]
struct Gate {
    checked_out: Mutex<usize>,
    released: Condvar,
    max: usize,
}

impl Gate {
    fn enter(&self) {
        let mut checked_out = self.checked_out.lock();
        while *checked_out >= self.max {
            self.released.wait(&mut checked_out);
        }
        *checked_out += 1;
    }

    fn try_enter(&self) -> bool {
        let mut checked_out = self.checked_out.lock();
        if *checked_out >= self.max {
            return false;
        }
        *checked_out += 1;
        true
    }

    fn leave(&self) {
        let mut checked_out = self.checked_out.lock();
        *checked_out = checked_out.saturating_sub(1);
        self.released.notify_one();
    }
}

/// Object pool safe to share between threads.
#[derive(Debug)]
pub struct SharedObjectPool<T: Poolable> {
    available: SegQueue<T>,
    gate: Gate,
}

impl<T: Poolable> SharedObjectPool<T> {
    /// Create a pool allowing `max_size` concurrent checkouts.
    pub fn new(max_size: usize) -> Result<Self, PoolError> {
        if max_size == 0 {
            return Err(PoolError::InvalidCapacity { min: 1, max: 0 });
        }
        Ok(Self {
            available: SegQueue::new(),
            gate: Gate {
                checked_out: Mutex::new(0),
                released: Condvar::new(),
                max: max_size,
            },
        })
    }

    /// Check out an instance initialized with `value`, waiting for a free slot.
    pub fn acquire(&self, value: T::Value<'_>) -> VmResult<PooledItem<'_, T>> {
        self.gate.enter();
        self.checkout(value)
    }

    /// Check out an instance if a slot is free right now.
    pub fn try_acquire(&self, value: T::Value<'_>) -> VmResult<Option<PooledItem<'_, T>>> {
        if !self.gate.try_enter() {
            return Ok(None);
        }
        self.checkout(value).map(Some)
    }

    fn checkout(&self, value: T::Value<'_>) -> VmResult<PooledItem<'_, T>> {
        let mut item = self.available.pop().unwrap_or_default();
        if let Err(err) = item.set_value(value) {
            self.gate.leave();
            return Err(err);
        }
        Ok(PooledItem {
            pool: self,
            item,
            detached: false,
        })
    }

    fn give_back(&self, mut item: T) {
        if self.available.len() < self.gate.max {
            item.reset();
            self.available.push(item);
        }
        self.gate.leave();
    }

    /// Instances currently checked out.
    pub fn checked_out(&self) -> usize {
        *self.gate.checked_out.lock()
    }

    /// Instances waiting for reuse.
    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Bound on concurrent checkouts.
    pub fn max_size(&self) -> usize {
        self.gate.max
    }
}

/// A checked-out instance; returns to its pool on drop.
pub struct PooledItem<'a, T: Poolable> {
    pool: &'a SharedObjectPool<T>,
    item: T,
    detached: bool,
}

impl<'a, T: Poolable> PooledItem<'a, T> {
    /// Keep the instance instead of returning it; frees the checkout slot.
    pub fn into_inner(mut self) -> T {
        self.detached = true;
        std::mem::take(&mut self.item)
    }
}

impl<'a, T: Poolable> Deref for PooledItem<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<'a, T: Poolable> DerefMut for PooledItem<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.item
    }
}

impl<'a, T: Poolable> Drop for PooledItem<'a, T> {
    fn drop(&mut self) {
        if self.detached {
            self.pool.gate.leave();
        } else {
            self.pool.give_back(std::mem::take(&mut self.item));
        }
    }
}
