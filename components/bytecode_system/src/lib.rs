//! Bytecode system for the VM
//!
//! This crate defines the instruction set and the containers that hold it.
//!
//! # Features
//!
//! - One-byte opcode table with fixed or length-prefixed operands
//! - Lazy instruction decoding with a per-script cache
//! - Optional strict validation of whole scripts
//! - A builder that picks the shortest encodings
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, ScriptBuilder};
//!
//! let mut sb = ScriptBuilder::new();
//! sb.emit_push_int(1).emit_push_int(2).emit(Opcode::Add).emit(Opcode::Ret);
//!
//! let script = sb.to_script();
//! let add = script.get_instruction(2).unwrap();
//! assert_eq!(add.opcode(), Opcode::Add);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod instruction;
pub mod item_type;
pub mod opcode;
pub mod script;
pub mod script_builder;

// Re-export main types at crate root
pub use error::{BytecodeError, BytecodeResult};
pub use instruction::Instruction;
pub use item_type::StackItemType;
pub use opcode::{Opcode, OperandSize};
pub use script::Script;
pub use script_builder::ScriptBuilder;
