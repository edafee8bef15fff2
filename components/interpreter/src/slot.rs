//! Fixed-size variable slots

use std::fmt;

use core_types::{ReferenceCounter, StackItem, VmError, VmResult};

/// Indexed storage for static fields, locals or arguments
///
/// Each stored item holds one stack reference.
pub struct Slot {
    items: Vec<StackItem>,
    reference_counter: ReferenceCounter,
}

impl Slot {
    /// A slot of `count` nulls
    pub fn new(count: usize, reference_counter: ReferenceCounter) -> Self {
        reference_counter.add_stack_reference(&StackItem::Null, count);
        Self {
            items: vec![StackItem::Null; count],
            reference_counter,
        }
    }

    /// A slot holding `items`
    pub fn with_items(items: Vec<StackItem>, reference_counter: ReferenceCounter) -> Self {
        for item in &items {
            reference_counter.add_stack_reference(item, 1);
        }
        Self {
            items,
            reference_counter,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the slot has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> VmResult<StackItem> {
        self.items
            .get(index)
            .cloned()
            .ok_or(VmError::SlotIndexOutOfRange {
                index,
                size: self.items.len(),
            })
    }

    /// Replace the item at `index`
    pub fn set(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        let size = self.items.len();
        let entry = self
            .items
            .get_mut(index)
            .ok_or(VmError::SlotIndexOutOfRange { index, size })?;
        self.reference_counter.remove_stack_reference(entry);
        self.reference_counter.add_stack_reference(&item, 1);
        *entry = item;
        Ok(())
    }

    /// Release the references held by every entry
    ///
    /// The slot is empty afterwards, so a second call does nothing.
    pub fn clear_references(&mut self) {
        for item in self.items.drain(..) {
            self.reference_counter.remove_stack_reference(&item);
        }
    }

    /// Entries in index order
    pub fn iter(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
