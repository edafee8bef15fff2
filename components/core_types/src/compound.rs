//! Compound stack items: [`Array`], [`Struct`] and [`Map`].
//!
//! Compounds have reference identity; clones of a handle share contents.
//! A compound created with a [`ReferenceCounter`] reports every insertion
//! and removal to it.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{VmError, VmResult};
use crate::limits::ExecutionEngineLimits;
use crate::primitive::MapKey;
use crate::reference_counter::{CounterLink, ItemId, ReferenceCounter};
use crate::stack_item::StackItem;

pub(crate) struct CompoundCell<T> {
    id: ItemId,
    counter: Option<CounterLink>,
    data: RefCell<T>,
}

impl<T: Default> CompoundCell<T> {
    fn new(counter: Option<&ReferenceCounter>) -> Rc<Self> {
        Rc::new(Self {
            id: ItemId::next(),
            counter: counter.map(ReferenceCounter::link),
            data: RefCell::new(T::default()),
        })
    }

    fn counter(&self) -> Option<ReferenceCounter> {
        self.counter.as_ref().and_then(CounterLink::upgrade)
    }
}

/// Ordered list with reference identity.
#[derive(Clone)]
pub struct Array {
    cell: Rc<CompoundCell<Vec<StackItem>>>,
}

impl Array {
    /// Create an empty array in `counter`'s scope.
    pub fn new(counter: Option<&ReferenceCounter>) -> Self {
        let array = Self {
            cell: CompoundCell::new(counter),
        };
        if let Some(counter) = counter {
            counter.add_zero_referred(&StackItem::Array(array.clone()));
        }
        array
    }

    /// Create an array holding `items`.
    pub fn with_items(
        counter: Option<&ReferenceCounter>,
        items: impl IntoIterator<Item = StackItem>,
    ) -> Self {
        let array = Self::new(counter);
        for item in items {
            array.push(item);
        }
        array
    }

    /// Identity of this array.
    pub fn id(&self) -> ItemId {
        self.cell.id
    }

    /// The counting scope, if still alive.
    pub fn counter(&self) -> Option<ReferenceCounter> {
        self.cell.counter()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.cell.data.borrow().len()
    }

    /// True if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`.
    pub fn get(&self, index: usize) -> Option<StackItem> {
        self.cell.data.borrow().get(index).cloned()
    }

    /// Borrow the elements.
    pub fn borrow(&self) -> Ref<'_, [StackItem]> {
        Ref::map(self.cell.data.borrow(), |items| items.as_slice())
    }

    /// Copy out the element handles.
    pub fn items(&self) -> Vec<StackItem> {
        self.cell.data.borrow().clone()
    }

    /// Append an element.
    pub fn push(&self, item: StackItem) {
        if let Some(counter) = self.counter() {
            counter.add_reference(&item, self.id());
        }
        self.cell.data.borrow_mut().push(item);
    }

    /// Replace the element at `index`.
    pub fn set(&self, index: usize, item: StackItem) -> VmResult<()> {
        let old = {
            let mut items = self.cell.data.borrow_mut();
            let slot = items
                .get_mut(index)
                .ok_or(VmError::IndexOutOfRange(index as i64))?;
            std::mem::replace(slot, item.clone())
        };
        if let Some(counter) = self.counter() {
            counter.remove_reference(&old, self.id());
            counter.add_reference(&item, self.id());
        }
        Ok(())
    }

    /// Remove and return the element at `index`.
    pub fn remove(&self, index: usize) -> Option<StackItem> {
        let removed = {
            let mut items = self.cell.data.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        if let Some(counter) = self.counter() {
            counter.remove_reference(&removed, self.id());
        }
        Some(removed)
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<StackItem> {
        let removed = self.cell.data.borrow_mut().pop()?;
        if let Some(counter) = self.counter() {
            counter.remove_reference(&removed, self.id());
        }
        Some(removed)
    }

    /// Remove all elements.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.cell.data.borrow_mut());
        if let Some(counter) = self.counter() {
            for item in &removed {
                counter.remove_reference(item, self.id());
            }
        }
    }

    /// Reverse the elements in place.
    pub fn reverse(&self) {
        self.cell.data.borrow_mut().reverse();
    }

    /// True if both handles refer to the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> std::rc::Weak<CompoundCell<Vec<StackItem>>> {
        Rc::downgrade(&self.cell)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}

/// Ordered list with value semantics.
///
/// A struct is deep-copied wherever it is stored into another compound, so
/// two containers never alias the same struct.
#[derive(Clone)]
pub struct Struct(Array);

impl Struct {
    /// Create an empty struct in `counter`'s scope.
    pub fn new(counter: Option<&ReferenceCounter>) -> Self {
        let array = Array {
            cell: CompoundCell::new(counter),
        };
        let item = Self(array);
        if let Some(counter) = counter {
            counter.add_zero_referred(&StackItem::Struct(item.clone()));
        }
        item
    }

    /// Create a struct holding `items`.
    pub fn with_items(
        counter: Option<&ReferenceCounter>,
        items: impl IntoIterator<Item = StackItem>,
    ) -> Self {
        let item = Self::new(counter);
        for element in items {
            item.push(element);
        }
        item
    }

    /// True if both handles refer to the same struct.
    pub fn ptr_eq(&self, other: &Struct) -> bool {
        self.0.ptr_eq(&other.0)
    }

    pub(crate) fn as_array(&self) -> &Array {
        &self.0
    }

    /// Deep copy, breadth first.
    ///
    /// Nested structs are copied; other compounds are shared. Fails once the
    /// copy would touch `max_stack_size - 1` elements.
    pub fn clone_with_limits(&self, limits: &ExecutionEngineLimits) -> VmResult<Struct> {
        let counter = self.counter();
        let mut budget = limits.max_stack_size as i64 - 1;
        let result = Struct::new(counter.as_ref());
        let mut queue = VecDeque::from([(result.clone(), self.clone())]);
        while let Some((target, source)) = queue.pop_front() {
            for item in source.items() {
                budget -= 1;
                if budget < 0 {
                    return Err(VmError::CloneLimitExceeded);
                }
                match item {
                    StackItem::Struct(nested) => {
                        let copy = Struct::new(counter.as_ref());
                        target.push(StackItem::Struct(copy.clone()));
                        queue.push_back((copy, nested));
                    }
                    other => target.push(other),
                }
            }
        }
        Ok(result)
    }
}

impl Deref for Struct {
    type Target = Array;

    fn deref(&self) -> &Array {
        &self.0
    }
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Struct")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}

/// Insertion-ordered dictionary keyed by primitive values.
#[derive(Clone)]
pub struct Map {
    cell: Rc<CompoundCell<IndexMap<MapKey, StackItem>>>,
}

impl Map {
    /// Create an empty map in `counter`'s scope.
    pub fn new(counter: Option<&ReferenceCounter>) -> Self {
        let map = Self {
            cell: CompoundCell::new(counter),
        };
        if let Some(counter) = counter {
            counter.add_zero_referred(&StackItem::Map(map.clone()));
        }
        map
    }

    /// Identity of this map.
    pub fn id(&self) -> ItemId {
        self.cell.id
    }

    /// The counting scope, if still alive.
    pub fn counter(&self) -> Option<ReferenceCounter> {
        self.cell.counter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.cell.data.borrow().len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &MapKey) -> Option<StackItem> {
        self.cell.data.borrow().get(key).cloned()
    }

    /// True if `key` is present.
    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.cell.data.borrow().contains_key(key)
    }

    /// Insert or replace the value under `key`.
    ///
    /// A new key keeps insertion order; replacing keeps the key's position.
    pub fn insert(&self, key: MapKey, value: StackItem) -> VmResult<()> {
        if key.size() > MapKey::MAX_SIZE {
            return Err(VmError::MapKeyTooLarge(key.size()));
        }
        let key_item = self.counter().map(|_| key.to_item());
        let old = self.cell.data.borrow_mut().insert(key, value.clone());
        if let Some(counter) = self.counter() {
            match &old {
                Some(old) => counter.remove_reference(old, self.id()),
                None => {
                    if let Some(key_item) = &key_item {
                        counter.add_reference(key_item, self.id());
                    }
                }
            }
            counter.add_reference(&value, self.id());
        }
        Ok(())
    }

    /// Remove the entry under `key`, keeping the order of the others.
    pub fn remove(&self, key: &MapKey) -> Option<StackItem> {
        let value = self.cell.data.borrow_mut().shift_remove(key)?;
        if let Some(counter) = self.counter() {
            counter.remove_reference(&key.to_item(), self.id());
            counter.remove_reference(&value, self.id());
        }
        Some(value)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.cell.data.borrow_mut());
        if let Some(counter) = self.counter() {
            for (key, value) in &removed {
                counter.remove_reference(&key.to_item(), self.id());
                counter.remove_reference(value, self.id());
            }
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<MapKey> {
        self.cell.data.borrow().keys().cloned().collect()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<StackItem> {
        self.cell.data.borrow().values().cloned().collect()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> Vec<(MapKey, StackItem)> {
        self.cell
            .data
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// True if both handles refer to the same map.
    pub fn ptr_eq(&self, other: &Map) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}

/// Strong handle the reference counter keeps for tracked compounds.
#[derive(Clone)]
pub(crate) enum CompoundRef {
    List(Array),
    Map(Map),
}

impl CompoundRef {
    pub(crate) fn id(&self) -> ItemId {
        match self {
            CompoundRef::List(array) => array.id(),
            CompoundRef::Map(map) => map.id(),
        }
    }

    /// Elements counted against the scope: list items, or keys plus values.
    pub(crate) fn sub_items_count(&self) -> usize {
        match self {
            CompoundRef::List(array) => array.len(),
            CompoundRef::Map(map) => map.len() * 2,
        }
    }

    /// Live strong handles to the underlying storage.
    pub(crate) fn strong_count(&self) -> usize {
        match self {
            CompoundRef::List(array) => Rc::strong_count(&array.cell),
            CompoundRef::Map(map) => Rc::strong_count(&map.cell),
        }
    }

    /// Move the contents out without reporting the removals to the counter.
    pub(crate) fn take_contents(&self) -> Vec<StackItem> {
        match self {
            CompoundRef::List(array) => std::mem::take(&mut *array.cell.data.borrow_mut()),
            CompoundRef::Map(map) => std::mem::take(&mut *map.cell.data.borrow_mut())
                .into_values()
                .collect(),
        }
    }

    pub(crate) fn compound_children(&self) -> Vec<CompoundRef> {
        match self {
            CompoundRef::List(array) => array
                .borrow()
                .iter()
                .filter_map(StackItem::compound_ref)
                .collect(),
            CompoundRef::Map(map) => map
                .cell
                .data
                .borrow()
                .values()
                .filter_map(StackItem::compound_ref)
                .collect(),
        }
    }
}
