//! Reference counting for resource limits.
//!
//! The counter keeps a running total of references held by evaluation
//! stacks, slots and containers. Compound items are tracked individually so
//! that unreachable ones (including cycles) can be released at the
//! post-instruction checkpoint, [`ReferenceCounter::check_zero_referred`].
//!
//! Released compounds that nothing outside the released set still holds
//! have their contents cleared, so cycles among them are freed.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compound::CompoundRef;
use crate::stack_item::StackItem;

/// Identity of a compound item.
///
/// Ids increase monotonically, so ordered collections keyed by id iterate
/// in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

impl ItemId {
    pub(crate) fn next() -> Self {
        ItemId(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct Tracked {
    item: CompoundRef,
    stack_references: usize,
    object_references: BTreeMap<ItemId, usize>,
}

impl Tracked {
    fn new(item: CompoundRef) -> Self {
        Self {
            item,
            stack_references: 0,
            object_references: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct CounterState {
    tracked: BTreeMap<ItemId, Tracked>,
    zero_referred: BTreeSet<ItemId>,
    references_count: usize,
}

impl CounterState {
    fn track(&mut self, item: &CompoundRef) -> &mut Tracked {
        self.tracked
            .entry(item.id())
            .or_insert_with(|| Tracked::new(item.clone()))
    }
}

/// Shared handle to one reference-counting scope.
///
/// Clones refer to the same scope.
#[derive(Clone, Default)]
pub struct ReferenceCounter {
    state: Rc<RefCell<CounterState>>,
}

/// Non-owning link from a compound item back to its scope.
#[derive(Clone)]
pub(crate) struct CounterLink(Weak<RefCell<CounterState>>);

impl CounterLink {
    pub(crate) fn upgrade(&self) -> Option<ReferenceCounter> {
        self.0.upgrade().map(|state| ReferenceCounter { state })
    }
}

impl ReferenceCounter {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn link(&self) -> CounterLink {
        CounterLink(Rc::downgrade(&self.state))
    }

    /// True if both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &ReferenceCounter) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Current total of references.
    pub fn count(&self) -> usize {
        self.state.borrow().references_count
    }

    /// Number of compound items currently tracked.
    pub fn tracked_len(&self) -> usize {
        self.state.borrow().tracked.len()
    }

    /// Record `count` stack or slot references to `item`.
    pub fn add_stack_reference(&self, item: &StackItem, count: usize) {
        let mut state = self.state.borrow_mut();
        state.references_count += count;
        if let Some(compound) = item.compound_ref() {
            let id = compound.id();
            state.track(&compound).stack_references += count;
            state.zero_referred.remove(&id);
        }
    }

    /// Drop one stack or slot reference to `item`.
    pub fn remove_stack_reference(&self, item: &StackItem) {
        let mut state = self.state.borrow_mut();
        state.references_count = state.references_count.saturating_sub(1);
        if let Some(compound) = item.compound_ref() {
            let id = compound.id();
            let entry = state.track(&compound);
            entry.stack_references = entry.stack_references.saturating_sub(1);
            if entry.stack_references == 0 {
                state.zero_referred.insert(id);
            }
        }
    }

    /// Record that `parent` now holds `item`.
    pub fn add_reference(&self, item: &StackItem, parent: ItemId) {
        let mut state = self.state.borrow_mut();
        state.references_count += 1;
        if let Some(compound) = item.compound_ref() {
            *state
                .track(&compound)
                .object_references
                .entry(parent)
                .or_insert(0) += 1;
        }
    }

    /// Record that `parent` no longer holds `item`.
    pub fn remove_reference(&self, item: &StackItem, parent: ItemId) {
        let mut state = self.state.borrow_mut();
        state.references_count = state.references_count.saturating_sub(1);
        if let Some(compound) = item.compound_ref() {
            let id = compound.id();
            let entry = state.track(&compound);
            if let Some(refs) = entry.object_references.get_mut(&parent) {
                *refs -= 1;
                if *refs == 0 {
                    entry.object_references.remove(&parent);
                }
            }
            if entry.stack_references == 0 {
                state.zero_referred.insert(id);
            }
        }
    }

    /// Register a freshly created compound that nothing references yet.
    pub fn add_zero_referred(&self, item: &StackItem) {
        if let Some(compound) = item.compound_ref() {
            let mut state = self.state.borrow_mut();
            let id = compound.id();
            state.track(&compound);
            state.zero_referred.insert(id);
        }
    }

    /// Release compounds unreachable from any stack or slot.
    ///
    /// Does nothing unless some item lost its last stack reference, or was
    /// created, since the previous call. Returns the reference total.
    pub fn check_zero_referred(&self) -> usize {
        let mut state = self.state.borrow_mut();
        if state.zero_referred.is_empty() {
            return state.references_count;
        }
        state.zero_referred.clear();

        let mut reachable = BTreeSet::new();
        let mut pending: Vec<ItemId> = state
            .tracked
            .iter()
            .filter(|(_, entry)| entry.stack_references > 0)
            .map(|(id, _)| *id)
            .collect();
        while let Some(id) = pending.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let Some(entry) = state.tracked.get(&id) else {
                continue;
            };
            for child in entry.item.compound_children() {
                let child_id = child.id();
                let linked = state
                    .tracked
                    .get(&child_id)
                    .map_or(false, |c| c.object_references.contains_key(&id));
                if linked && !reachable.contains(&child_id) {
                    pending.push(child_id);
                }
            }
        }

        let unreachable: Vec<ItemId> = state
            .tracked
            .keys()
            .filter(|id| !reachable.contains(id))
            .copied()
            .collect();
        let mut released = Vec::with_capacity(unreachable.len());
        for id in unreachable {
            let Some(entry) = state.tracked.remove(&id) else {
                continue;
            };
            state.references_count = state
                .references_count
                .saturating_sub(entry.item.sub_items_count());
            for child in entry.item.compound_children() {
                if let Some(child_entry) = state.tracked.get_mut(&child.id()) {
                    child_entry.object_references.remove(&id);
                }
            }
            released.push(entry.item);
        }
        let count = state.references_count;
        drop(state);
        break_released_cycles(released);
        count
    }
}

/// Empty released compounds that are held only by other released compounds.
///
/// A compound is still in use when it has more strong handles than
/// `released` and its released parents account for. Those, and everything
/// they reach, keep their contents; the rest are cleared so that cycles
/// among them are freed.
fn break_released_cycles(released: Vec<CompoundRef>) {
    if released.is_empty() {
        return;
    }
    let index: BTreeMap<ItemId, usize> = released
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id(), i))
        .collect();
    let children: Vec<Vec<usize>> = released
        .iter()
        .map(|item| {
            item.compound_children()
                .iter()
                .filter_map(|child| index.get(&child.id()).copied())
                .collect()
        })
        .collect();

    let mut internal = vec![0usize; released.len()];
    for &child in children.iter().flatten() {
        internal[child] += 1;
    }
    let mut in_use: Vec<bool> = released
        .iter()
        .zip(&internal)
        .map(|(item, &held)| item.strong_count() > held + 1)
        .collect();
    let mut pending: Vec<usize> = (0..released.len()).filter(|&i| in_use[i]).collect();
    while let Some(i) = pending.pop() {
        for &child in &children[i] {
            if !in_use[child] {
                in_use[child] = true;
                pending.push(child);
            }
        }
    }

    let contents: Vec<Vec<StackItem>> = released
        .iter()
        .zip(&in_use)
        .filter(|(_, &used)| !used)
        .map(|(item, _)| item.take_contents())
        .collect();
    drop(contents);
}

impl fmt::Debug for ReferenceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ReferenceCounter")
            .field("references_count", &state.references_count)
            .field("tracked", &state.tracked.len())
            .field("zero_referred", &state.zero_referred.len())
            .finish()
    }
}
