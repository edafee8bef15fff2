//! Core VM value types and error handling.
//!
//! This crate provides the foundational types for the VM: the stack item
//! type system, execution limits, reference counting and the error type.
//!
//! # Overview
//!
//! - [`StackItem`] - Tagged representation of VM values
//! - [`Array`], [`Struct`], [`Map`] - Compound items with identity
//! - [`ReferenceCounter`] - Reference bookkeeping for resource limits
//! - [`ExecutionEngineLimits`] - Configurable resource limits
//! - [`VmError`] - Catchable and fatal execution errors
//!
//! # Examples
//!
//! ```
//! use core_types::{Array, ExecutionEngineLimits, ReferenceCounter, StackItem};
//!
//! let counter = ReferenceCounter::new();
//! let array = Array::new(Some(&counter));
//! array.push(StackItem::from(42));
//! assert_eq!(counter.count(), 1);
//!
//! let limits = ExecutionEngineLimits::default();
//! let a = StackItem::from("abc");
//! assert!(a.equals(&StackItem::from("abc"), &limits).unwrap());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod buffer;
mod compound;
mod error;
mod limits;
mod primitive;
mod reference_counter;
mod stack_item;

pub use buffer::Buffer;
pub use bytecode_system::StackItemType;
pub use compound::{Array, Map, Struct};
pub use error::{VmError, VmResult};
pub use limits::ExecutionEngineLimits;
pub use primitive::{ByteString, Integer, MapKey};
pub use reference_counter::{ItemId, ReferenceCounter};
pub use stack_item::{InteropInterface, Pointer, StackItem};
