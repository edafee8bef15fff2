//! Evaluation stack
//!
//! Every push and pop is reported to the engine's [`ReferenceCounter`].
//! Indexes passed to [`EvaluationStack::peek`], [`EvaluationStack::insert`]
//! and [`EvaluationStack::remove`] count from the top, 0 being the top item.

use std::fmt;

use core_types::{ReferenceCounter, StackItem, VmError, VmResult};

/// Operand stack of one or more execution contexts
pub struct EvaluationStack {
    items: Vec<StackItem>,
    reference_counter: ReferenceCounter,
}

impl EvaluationStack {
    /// Create an empty stack counted by `reference_counter`
    pub fn new(reference_counter: ReferenceCounter) -> Self {
        Self {
            items: Vec::new(),
            reference_counter,
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the stack holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Push an item on top
    pub fn push(&mut self, item: StackItem) {
        self.reference_counter.add_stack_reference(&item, 1);
        self.items.push(item);
    }

    /// Item `index` positions below the top
    pub fn peek(&self, index: usize) -> VmResult<StackItem> {
        let position = self.position(index)?;
        Ok(self.items[position].clone())
    }

    /// Remove and return the top item
    pub fn pop(&mut self) -> VmResult<StackItem> {
        self.remove(0)
    }

    /// Insert `item` so that it ends up `index` positions below the top
    pub fn insert(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        if index > self.items.len() {
            return Err(VmError::StackUnderflow);
        }
        self.reference_counter.add_stack_reference(&item, 1);
        let position = self.items.len() - index;
        self.items.insert(position, item);
        Ok(())
    }

    /// Remove and return the item `index` positions below the top
    pub fn remove(&mut self, index: usize) -> VmResult<StackItem> {
        let position = self.position(index)?;
        let item = self.items.remove(position);
        self.reference_counter.remove_stack_reference(&item);
        Ok(item)
    }

    /// Reverse the order of the top `n` items
    pub fn reverse(&mut self, n: i64) -> VmResult<()> {
        if n < 0 || n > self.items.len() as i64 {
            return Err(VmError::OutOfRange(n));
        }
        if n <= 1 {
            return Ok(());
        }
        let start = self.items.len() - n as usize;
        self.items[start..].reverse();
        Ok(())
    }

    /// Remove every item
    pub fn clear(&mut self) {
        for item in self.items.drain(..) {
            self.reference_counter.remove_stack_reference(&item);
        }
    }

    /// Move every item onto `destination`, keeping their order
    ///
    /// Both stacks share one counter, so the references move with the items.
    pub fn move_to(&mut self, destination: &mut EvaluationStack) {
        destination.items.append(&mut self.items);
    }

    /// Items from bottom to top
    pub fn iter(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter()
    }

    /// Copy of the items from bottom to top
    pub fn to_vec(&self) -> Vec<StackItem> {
        self.items.clone()
    }

    fn position(&self, index: usize) -> VmResult<usize> {
        if index >= self.items.len() {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.items.len() - index - 1)
    }
}

impl fmt::Debug for EvaluationStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter().rev()).finish()
    }
}
