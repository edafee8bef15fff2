//! Stack item type tags
//!
//! The tags appear as operands of `NEWARRAY_T`, `ISTYPE` and `CONVERT`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag of a stack item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum StackItemType {
    /// Wildcard; never the type of a concrete item except null
    Any = 0x00,
    /// Position inside a script
    Pointer = 0x10,
    /// Boolean
    Boolean = 0x20,
    /// Arbitrary-precision integer
    Integer = 0x21,
    /// Immutable bytes
    ByteString = 0x28,
    /// Mutable bytes
    Buffer = 0x30,
    /// Ordered list with reference identity
    Array = 0x40,
    /// Ordered list with value semantics
    Struct = 0x41,
    /// Insertion-ordered dictionary
    Map = 0x48,
    /// Opaque host object
    InteropInterface = 0x60,
}

impl StackItemType {
    /// Look up a type by its tag byte
    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => StackItemType::Any,
            0x10 => StackItemType::Pointer,
            0x20 => StackItemType::Boolean,
            0x21 => StackItemType::Integer,
            0x28 => StackItemType::ByteString,
            0x30 => StackItemType::Buffer,
            0x40 => StackItemType::Array,
            0x41 => StackItemType::Struct,
            0x48 => StackItemType::Map,
            0x60 => StackItemType::InteropInterface,
            _ => return None,
        })
    }

    /// Boolean, Integer and ByteString
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            StackItemType::Boolean | StackItemType::Integer | StackItemType::ByteString
        )
    }

    /// Array, Struct and Map
    pub fn is_compound(self) -> bool {
        matches!(
            self,
            StackItemType::Array | StackItemType::Struct | StackItemType::Map
        )
    }
}

impl fmt::Display for StackItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
