//! Primitive stack values.
//!
//! [`Integer`] and [`ByteString`] are immutable values. [`MapKey`] is the
//! subset of items that may key a map.

use std::fmt;

use bytecode_system::StackItemType;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::error::{VmError, VmResult};
use crate::stack_item::StackItem;

/// Arbitrary-precision integer whose two's-complement encoding fits in
/// [`Integer::MAX_SIZE`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Integer {
    value: BigInt,
}

/// Bytes of the minimal little-endian two's-complement encoding; zero is empty.
pub(crate) fn encoded_size(value: &BigInt) -> usize {
    if value.is_zero() {
        0
    } else {
        value.to_signed_bytes_le().len()
    }
}

impl Integer {
    /// Largest encoded size in bytes.
    pub const MAX_SIZE: usize = 32;

    /// Wrap a value, rejecting values wider than [`Integer::MAX_SIZE`].
    pub fn new(value: BigInt) -> VmResult<Self> {
        let size = encoded_size(&value);
        if size > Self::MAX_SIZE {
            return Err(VmError::IntegerTooLarge(size));
        }
        Ok(Self { value })
    }

    /// Replace the value in place, with the same size check as [`Integer::new`].
    pub fn set_value(&mut self, value: BigInt) -> VmResult<()> {
        *self = Self::new(value)?;
        Ok(())
    }

    /// The value.
    pub fn value(&self) -> &BigInt {
        &self.value
    }

    /// Consume into the value.
    pub fn into_value(self) -> BigInt {
        self.value
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        encoded_size(&self.value)
    }

    /// Minimal little-endian two's-complement bytes; empty for zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.value.is_zero() {
            Vec::new()
        } else {
            self.value.to_signed_bytes_le()
        }
    }
}

macro_rules! integer_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Integer {
                fn from(value: $t) -> Self {
                    Self { value: BigInt::from(value) }
                }
            }
        )*
    };
}

integer_from!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, usize, isize);

impl TryFrom<BigInt> for Integer {
    type Error = VmError;

    fn try_from(value: BigInt) -> VmResult<Self> {
        Integer::new(value)
    }
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

/// Immutable byte sequence.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ByteString(Vec<u8>);

impl ByteString {
    /// Wrap bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace the contents, reusing the allocation.
    pub fn set_bytes(&mut self, bytes: &[u8]) {
        self.0.clear();
        self.0.extend_from_slice(bytes);
    }

    /// Lossy UTF-8 view.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteString(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ByteString {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for ByteString {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

/// A map key: a primitive item compared by type and value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// Boolean key
    Boolean(bool),
    /// Integer key
    Integer(Integer),
    /// Byte string key
    ByteString(ByteString),
}

impl MapKey {
    /// Largest key size in bytes.
    pub const MAX_SIZE: usize = 64;

    /// Size of the key as a primitive item.
    pub fn size(&self) -> usize {
        match self {
            MapKey::Boolean(_) => 1,
            MapKey::Integer(i) => i.size(),
            MapKey::ByteString(s) => s.len(),
        }
    }

    /// The key as a stack item.
    pub fn to_item(&self) -> StackItem {
        match self {
            MapKey::Boolean(b) => StackItem::Boolean(*b),
            MapKey::Integer(i) => StackItem::Integer(i.clone()),
            MapKey::ByteString(s) => StackItem::ByteString(s.clone()),
        }
    }
}

impl TryFrom<&StackItem> for MapKey {
    type Error = VmError;

    fn try_from(item: &StackItem) -> VmResult<Self> {
        let key = match item {
            StackItem::Boolean(b) => MapKey::Boolean(*b),
            StackItem::Integer(i) => MapKey::Integer(i.clone()),
            StackItem::ByteString(s) => MapKey::ByteString(s.clone()),
            other => return Err(VmError::invalid_type("primitive", other.item_type())),
        };
        if key.size() > Self::MAX_SIZE {
            return Err(VmError::MapKeyTooLarge(key.size()));
        }
        Ok(key)
    }
}

impl TryFrom<StackItem> for MapKey {
    type Error = VmError;

    fn try_from(item: StackItem) -> VmResult<Self> {
        MapKey::try_from(&item)
    }
}

impl From<MapKey> for StackItem {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Boolean(b) => StackItem::Boolean(b),
            MapKey::Integer(i) => StackItem::Integer(i),
            MapKey::ByteString(s) => StackItem::ByteString(s),
        }
    }
}

impl MapKey {
    /// Type tag of the key.
    pub fn item_type(&self) -> StackItemType {
        match self {
            MapKey::Boolean(_) => StackItemType::Boolean,
            MapKey::Integer(_) => StackItemType::Integer,
            MapKey::ByteString(_) => StackItemType::ByteString,
        }
    }
}
