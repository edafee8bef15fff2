//! Mutable byte buffers.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// Fixed-size mutable byte sequence with reference identity.
///
/// Clones share the same bytes.
#[derive(Clone, Default)]
pub struct Buffer {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl Buffer {
    /// A zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0u8; size])
    }

    /// A buffer holding `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(bytes.into())),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    /// True if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the bytes.
    pub fn borrow(&self) -> Ref<'_, [u8]> {
        Ref::map(self.bytes.borrow(), |bytes| bytes.as_slice())
    }

    /// Copy out the bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }

    /// Byte at `index`.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.borrow().get(index).copied()
    }

    /// Overwrite the byte at `index`; false if out of range.
    pub fn set(&self, index: usize, value: u8) -> bool {
        match self.bytes.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Copy `src` into the buffer at `offset`; false if it does not fit.
    pub fn copy_from(&self, offset: usize, src: &[u8]) -> bool {
        let mut bytes = self.bytes.borrow_mut();
        match offset
            .checked_add(src.len())
            .and_then(|end| bytes.get_mut(offset..end))
        {
            Some(dst) => {
                dst.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    /// Reverse the bytes in place.
    pub fn reverse(&self) {
        self.bytes.borrow_mut().reverse();
    }

    /// True if both handles share the same bytes.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Rc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Buffer").field(&self.bytes.borrow()).finish()
    }
}
