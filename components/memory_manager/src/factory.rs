//! Pooled construction of primitive stack items.
//!
//! Each engine owns one [`ObjectFactory`]. Popped primitives are handed back
//! with [`ObjectFactory::recycle`] and reused by later pushes. Pooled and
//! freshly allocated items are indistinguishable to scripts.

use core_types::{ByteString, ExecutionEngineLimits, Integer, StackItem, VmResult};
use num_bigint::BigInt;

use crate::pool::LimitedObjectPool;

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Booleans waiting for reuse
    pub booleans: usize,
    /// Integers waiting for reuse
    pub integers: usize,
    /// Byte strings waiting for reuse
    pub byte_strings: usize,
}

/// Boolean, integer and byte-string pools for one engine
#[derive(Debug)]
pub struct ObjectFactory {
    booleans: LimitedObjectPool<bool>,
    integers: LimitedObjectPool<Integer>,
    byte_strings: LimitedObjectPool<ByteString>,
}

impl ObjectFactory {
    /// Booleans preallocated per factory
    pub const BOOLEAN_MIN_SIZE: usize = 2;
    /// Integers preallocated per factory
    pub const INTEGER_MIN_SIZE: usize = 500;
    /// Byte strings preallocated per factory
    pub const BYTE_STRING_MIN_SIZE: usize = 500;

    /// Pools capped at `limits.max_stack_size` waiting instances.
    pub fn new(limits: &ExecutionEngineLimits) -> Self {
        let max = limits.max_stack_size as usize;
        Self {
            booleans: LimitedObjectPool::clamped(max, Self::BOOLEAN_MIN_SIZE),
            integers: LimitedObjectPool::clamped(max, Self::INTEGER_MIN_SIZE),
            byte_strings: LimitedObjectPool::clamped(max, Self::BYTE_STRING_MIN_SIZE),
        }
    }

    /// A boolean item.
    pub fn boolean(&mut self, value: bool) -> StackItem {
        StackItem::Boolean(self.booleans.get(value).unwrap_or(value))
    }

    /// An integer item; fails if `value` is wider than 32 bytes.
    pub fn integer(&mut self, value: BigInt) -> VmResult<StackItem> {
        Ok(StackItem::Integer(self.integers.get(value)?))
    }

    /// A byte-string item holding a copy of `value`.
    pub fn byte_string(&mut self, value: &[u8]) -> StackItem {
        let item = self
            .byte_strings
            .get(value)
            .unwrap_or_else(|_| ByteString::new(value));
        StackItem::ByteString(item)
    }

    /// Hand a no-longer-used item back to its pool.
    ///
    /// Items of other types are simply dropped.
    pub fn recycle(&mut self, item: StackItem) {
        match item {
            StackItem::Boolean(b) => self.booleans.give_back(b),
            StackItem::Integer(i) => self.integers.give_back(i),
            StackItem::ByteString(s) => self.byte_strings.give_back(s),
            _ => {}
        }
    }

    /// Current pool occupancy.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            booleans: self.booleans.available(),
            integers: self.integers.available(),
            byte_strings: self.byte_strings.available(),
        }
    }
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self::new(&ExecutionEngineLimits::default())
    }
}
