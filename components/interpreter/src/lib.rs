//! Execution engine for the stack VM
//!
//! This crate provides the interpreter proper:
//! - [`ExecutionEngine`], the fetch-execute loop with its invocation stack
//! - [`ExecutionContext`], one activation record per loaded script or call
//! - Try/catch/finally handling with catchable and fatal errors
//! - [`InteropHost`], the hooks through which a host serves `SYSCALL` and
//!   `CALLT`
//! - [`Debugger`], breakpoints and stepping
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, ScriptBuilder};
//! use core_types::StackItem;
//! use interpreter::{ExecutionEngine, VMState};
//!
//! let mut sb = ScriptBuilder::new();
//! sb.emit_push_int(6).emit_push_int(7).emit(Opcode::Mul);
//!
//! let mut engine = ExecutionEngine::new();
//! engine.load_script(sb.to_script(), -1, 0).unwrap();
//!
//! assert_eq!(engine.execute(), VMState::Halt);
//! assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(42)]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod debugger;
mod dispatch;
pub mod evaluation_stack;
pub mod exception_handling;
pub mod host;
pub mod numeric;
pub mod slot;
pub mod vm;

// Re-export main types at crate root
pub use context::{ExecutionContext, SlotKind};
pub use debugger::Debugger;
pub use evaluation_stack::EvaluationStack;
pub use exception_handling::{ExceptionHandlingContext, ExceptionHandlingState};
pub use host::InteropHost;
pub use slot::Slot;
pub use vm::{ExecutionEngine, VMState};
