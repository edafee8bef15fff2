//! The [`StackItem`] value type.
//!
//! Coercions (`get_boolean`, `get_integer`, `get_span`), conversion
//! (`convert_to`) and equality (`equals`) follow fixed rules shared by every
//! conforming VM, so they are spelled out per variant here.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use bytecode_system::{Script, StackItemType};
use num_bigint::BigInt;
use num_traits::Zero;

use crate::buffer::Buffer;
use crate::compound::{Array, CompoundRef, Map, Struct};
use crate::error::{VmError, VmResult};
use crate::limits::ExecutionEngineLimits;
use crate::primitive::{ByteString, Integer};

/// A position inside a specific script.
#[derive(Clone)]
pub struct Pointer {
    script: Script,
    position: usize,
}

impl Pointer {
    /// Point at `position` in `script`.
    pub fn new(script: Script, position: usize) -> Self {
        Self { script, position }
    }

    /// The script pointed into.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Offset in the script.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointer")
            .field("script", &self.script)
            .field("position", &self.position)
            .finish()
    }
}

/// Opaque host object passed through the VM untouched.
#[derive(Clone)]
pub struct InteropInterface(Rc<dyn Any>);

impl InteropInterface {
    /// Wrap a host value.
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Borrow the host value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// True if both handles wrap the same object.
    pub fn ptr_eq(&self, other: &InteropInterface) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for InteropInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InteropInterface")
    }
}

/// A VM value.
#[derive(Clone, Default)]
pub enum StackItem {
    /// Absence of a value
    #[default]
    Null,
    /// Boolean
    Boolean(bool),
    /// Integer of at most 32 encoded bytes
    Integer(Integer),
    /// Immutable bytes
    ByteString(ByteString),
    /// Mutable bytes with identity
    Buffer(Buffer),
    /// Script position
    Pointer(Pointer),
    /// List with identity
    Array(Array),
    /// List with value semantics
    Struct(Struct),
    /// Dictionary with identity
    Map(Map),
    /// Host object
    InteropInterface(InteropInterface),
}

impl StackItem {
    /// The type tag; `Any` for null.
    pub fn item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Pointer(_) => StackItemType::Pointer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    /// True for null.
    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// True for Boolean, Integer and ByteString.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::ByteString(_)
        )
    }

    /// Truthiness.
    ///
    /// Byte strings longer than an integer cannot be coerced.
    pub fn get_boolean(&self) -> VmResult<bool> {
        match self {
            StackItem::Null => Ok(false),
            StackItem::Boolean(b) => Ok(*b),
            StackItem::Integer(i) => Ok(!i.value().is_zero()),
            StackItem::ByteString(s) => {
                if s.len() > Integer::MAX_SIZE {
                    return Err(VmError::InvalidCast {
                        from: StackItemType::ByteString,
                        to: StackItemType::Boolean,
                    });
                }
                Ok(s.as_bytes().iter().any(|b| *b != 0))
            }
            _ => Ok(true),
        }
    }

    /// Integer value of a primitive item.
    pub fn get_integer(&self) -> VmResult<BigInt> {
        match self {
            StackItem::Boolean(b) => Ok(BigInt::from(*b as u8)),
            StackItem::Integer(i) => Ok(i.value().clone()),
            StackItem::ByteString(s) => {
                if s.len() > Integer::MAX_SIZE {
                    return Err(VmError::IntegerTooLarge(s.len()));
                }
                Ok(BigInt::from_signed_bytes_le(s.as_bytes()))
            }
            other => Err(VmError::invalid_type("Integer", other.item_type())),
        }
    }

    /// Byte view of a primitive item or buffer.
    pub fn get_span(&self) -> VmResult<Cow<'_, [u8]>> {
        match self {
            StackItem::Boolean(b) => Ok(Cow::Owned(vec![*b as u8])),
            StackItem::Integer(i) => Ok(Cow::Owned(i.to_bytes())),
            StackItem::ByteString(s) => Ok(Cow::Borrowed(s.as_bytes())),
            StackItem::Buffer(b) => Ok(Cow::Owned(b.to_vec())),
            other => Err(VmError::invalid_type("ByteString", other.item_type())),
        }
    }

    /// Bytes decoded as UTF-8, replacing invalid sequences.
    pub fn get_string(&self) -> VmResult<String> {
        Ok(String::from_utf8_lossy(&self.get_span()?).into_owned())
    }

    /// Convert to another item type.
    ///
    /// Converting to the item's own type returns the item itself, so
    /// compounds keep their identity.
    pub fn convert_to(&self, ty: StackItemType) -> VmResult<StackItem> {
        let cast_error = || VmError::InvalidCast {
            from: self.item_type(),
            to: ty,
        };
        if let StackItem::Null = self {
            return match ty {
                StackItemType::Any => Err(cast_error()),
                _ => Ok(StackItem::Null),
            };
        }
        if ty == self.item_type() {
            return Ok(self.clone());
        }
        if ty == StackItemType::Boolean {
            return Ok(StackItem::Boolean(self.get_boolean()?));
        }
        match self {
            StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::ByteString(_) => match ty {
                StackItemType::Integer => Ok(StackItem::Integer(Integer::new(self.get_integer()?)?)),
                StackItemType::ByteString => {
                    Ok(StackItem::ByteString(ByteString::new(self.get_span()?.into_owned())))
                }
                StackItemType::Buffer => Ok(StackItem::Buffer(Buffer::from_bytes(
                    self.get_span()?.into_owned(),
                ))),
                _ => Err(cast_error()),
            },
            StackItem::Buffer(buffer) => match ty {
                StackItemType::Integer => {
                    if buffer.len() > Integer::MAX_SIZE {
                        return Err(VmError::IntegerTooLarge(buffer.len()));
                    }
                    let value = BigInt::from_signed_bytes_le(&buffer.borrow());
                    Ok(StackItem::Integer(Integer::new(value)?))
                }
                StackItemType::ByteString => Ok(StackItem::ByteString(ByteString::new(buffer.to_vec()))),
                _ => Err(cast_error()),
            },
            StackItem::Array(array) if ty == StackItemType::Struct => Ok(StackItem::Struct(
                Struct::with_items(array.counter().as_ref(), array.items()),
            )),
            StackItem::Struct(item) if ty == StackItemType::Array => Ok(StackItem::Array(
                Array::with_items(item.counter().as_ref(), item.items()),
            )),
            _ => Err(cast_error()),
        }
    }

    /// VM equality.
    ///
    /// Primitives compare by type and value, structs structurally, and all
    /// other items by identity. Byte comparisons draw on a budget of
    /// `max_comparable_size` bytes.
    pub fn equals(&self, other: &StackItem, limits: &ExecutionEngineLimits) -> VmResult<bool> {
        match (self, other) {
            (StackItem::Null, StackItem::Null) => Ok(true),
            (StackItem::Boolean(a), StackItem::Boolean(b)) => Ok(a == b),
            (StackItem::Integer(a), StackItem::Integer(b)) => Ok(a == b),
            (StackItem::ByteString(a), _) => {
                let mut budget = limits.max_comparable_size;
                byte_string_equals(a, other, &mut budget)
            }
            (StackItem::Buffer(a), StackItem::Buffer(b)) => Ok(a.ptr_eq(b)),
            (StackItem::Pointer(a), StackItem::Pointer(b)) => {
                Ok(a.script.ptr_eq(&b.script) && a.position == b.position)
            }
            (StackItem::Array(a), StackItem::Array(b)) => Ok(a.ptr_eq(b)),
            (StackItem::Struct(a), _) => struct_equals(a, other, limits),
            (StackItem::Map(a), StackItem::Map(b)) => Ok(a.ptr_eq(b)),
            (StackItem::InteropInterface(a), StackItem::InteropInterface(b)) => Ok(a.ptr_eq(b)),
            _ => Ok(false),
        }
    }

    pub(crate) fn compound_ref(&self) -> Option<CompoundRef> {
        match self {
            StackItem::Array(array) => Some(CompoundRef::List(array.clone())),
            StackItem::Struct(item) => Some(CompoundRef::List(item.as_array().clone())),
            StackItem::Map(map) => Some(CompoundRef::Map(map.clone())),
            _ => None,
        }
    }
}

fn byte_string_equals(a: &ByteString, other: &StackItem, budget: &mut u32) -> VmResult<bool> {
    if *budget == 0 || a.len() > *budget as usize {
        return Err(VmError::ComparableSizeExceeded);
    }
    let StackItem::ByteString(b) = other else {
        *budget = budget.saturating_sub(1);
        return Ok(false);
    };
    if b.len() > *budget as usize {
        return Err(VmError::ComparableSizeExceeded);
    }
    let compared = a.len().max(b.len()).max(1) as u32;
    *budget = budget.saturating_sub(compared);
    Ok(a == b)
}

fn struct_equals(a: &Struct, other: &StackItem, limits: &ExecutionEngineLimits) -> VmResult<bool> {
    let StackItem::Struct(b) = other else {
        return Ok(false);
    };
    let mut left = vec![StackItem::Struct(a.clone())];
    let mut right = vec![StackItem::Struct(b.clone())];
    let mut count = limits.max_stack_size;
    let mut budget = limits.max_comparable_size;
    while let (Some(x), Some(y)) = (left.pop(), right.pop()) {
        if count == 0 {
            return Err(VmError::ComparableSizeExceeded);
        }
        count -= 1;
        if let StackItem::ByteString(s) = &x {
            if !byte_string_equals(s, &y, &mut budget)? {
                return Ok(false);
            }
            continue;
        }
        if budget == 0 {
            return Err(VmError::ComparableSizeExceeded);
        }
        budget -= 1;
        match (&x, &y) {
            (StackItem::Struct(sx), StackItem::Struct(sy)) => {
                if sx.ptr_eq(sy) {
                    continue;
                }
                if sx.len() != sy.len() {
                    return Ok(false);
                }
                left.extend(sx.items());
                right.extend(sy.items());
            }
            (StackItem::Struct(_), _) => return Ok(false),
            _ => {
                if !x.equals(&y, limits)? {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, &ExecutionEngineLimits::default())
            .unwrap_or(false)
    }
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackItem::Null => f.write_str("Null"),
            StackItem::Boolean(b) => write!(f, "Boolean({b})"),
            StackItem::Integer(i) => write!(f, "Integer({i})"),
            StackItem::ByteString(s) => fmt::Debug::fmt(s, f),
            StackItem::Buffer(b) => fmt::Debug::fmt(b, f),
            StackItem::Pointer(p) => fmt::Debug::fmt(p, f),
            StackItem::Array(a) => fmt::Debug::fmt(a, f),
            StackItem::Struct(s) => fmt::Debug::fmt(s, f),
            StackItem::Map(m) => fmt::Debug::fmt(m, f),
            StackItem::InteropInterface(i) => fmt::Debug::fmt(i, f),
        }
    }
}

impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        StackItem::Boolean(value)
    }
}

macro_rules! stack_item_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for StackItem {
                fn from(value: $t) -> Self {
                    StackItem::Integer(Integer::from(value))
                }
            }
        )*
    };
}

stack_item_from_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, usize, isize);

impl TryFrom<BigInt> for StackItem {
    type Error = VmError;

    fn try_from(value: BigInt) -> VmResult<Self> {
        Ok(StackItem::Integer(Integer::new(value)?))
    }
}

impl From<Integer> for StackItem {
    fn from(value: Integer) -> Self {
        StackItem::Integer(value)
    }
}

impl From<ByteString> for StackItem {
    fn from(value: ByteString) -> Self {
        StackItem::ByteString(value)
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(value: Vec<u8>) -> Self {
        StackItem::ByteString(ByteString::new(value))
    }
}

impl From<&[u8]> for StackItem {
    fn from(value: &[u8]) -> Self {
        StackItem::ByteString(ByteString::from(value))
    }
}

impl From<&str> for StackItem {
    fn from(value: &str) -> Self {
        StackItem::ByteString(ByteString::from(value))
    }
}

impl From<String> for StackItem {
    fn from(value: String) -> Self {
        StackItem::ByteString(ByteString::new(value.into_bytes()))
    }
}

impl From<Buffer> for StackItem {
    fn from(value: Buffer) -> Self {
        StackItem::Buffer(value)
    }
}

impl From<Pointer> for StackItem {
    fn from(value: Pointer) -> Self {
        StackItem::Pointer(value)
    }
}

impl From<Array> for StackItem {
    fn from(value: Array) -> Self {
        StackItem::Array(value)
    }
}

impl From<Struct> for StackItem {
    fn from(value: Struct) -> Self {
        StackItem::Struct(value)
    }
}

impl From<Map> for StackItem {
    fn from(value: Map) -> Self {
        StackItem::Map(value)
    }
}

impl From<InteropInterface> for StackItem {
    fn from(value: InteropInterface) -> Self {
        StackItem::InteropInterface(value)
    }
}
