//! Script assembly
//!
//! [`ScriptBuilder`] appends encoded instructions to a byte buffer, picking
//! the shortest encoding for pushed integers and data.

use num_bigint::BigInt;

use crate::opcode::{Opcode, OperandSize};
use crate::script::Script;

/// Incremental script writer
#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length in bytes; the position of the next instruction
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if nothing has been emitted
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Emit an opcode without operand
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.bytes.push(opcode.byte());
        self
    }

    /// Emit an opcode followed by raw operand bytes
    pub fn emit_with_operand(&mut self, opcode: Opcode, operand: &[u8]) -> &mut Self {
        self.bytes.push(opcode.byte());
        self.bytes.extend_from_slice(operand);
        self
    }

    /// Push an integer with the shortest encoding
    pub fn emit_push_int(&mut self, value: impl Into<BigInt>) -> &mut Self {
        let value = value.into();
        if value >= BigInt::from(-1) && value <= BigInt::from(16) {
            let small = i8::try_from(&value).unwrap_or_default();
            self.bytes.push((Opcode::Push0.byte() as i8 + small) as u8);
            return self;
        }
        let bytes = value.to_signed_bytes_le();
        let (opcode, width) = match bytes.len() {
            0..=1 => (Opcode::PushInt8, 1),
            2 => (Opcode::PushInt16, 2),
            3..=4 => (Opcode::PushInt32, 4),
            5..=8 => (Opcode::PushInt64, 8),
            9..=16 => (Opcode::PushInt128, 16),
            _ => (Opcode::PushInt256, 32),
        };
        let pad = if value < BigInt::from(0) { 0xFF } else { 0x00 };
        let mut operand = bytes;
        operand.resize(width, pad);
        self.emit_with_operand(opcode, &operand)
    }

    /// Push a boolean
    pub fn emit_push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { Opcode::PushT } else { Opcode::PushF })
    }

    /// Push null
    pub fn emit_push_null(&mut self) -> &mut Self {
        self.emit(Opcode::PushNull)
    }

    /// Push bytes with the smallest `PUSHDATA` prefix that fits
    pub fn emit_push_bytes(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        if len <= u8::MAX as usize {
            self.bytes.push(Opcode::PushData1.byte());
            self.bytes.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.bytes.push(Opcode::PushData2.byte());
            self.bytes.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.bytes.push(Opcode::PushData4.byte());
            self.bytes.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    /// Push a UTF-8 string as bytes
    pub fn emit_push_str(&mut self, value: &str) -> &mut Self {
        self.emit_push_bytes(value.as_bytes())
    }

    /// Emit a jump, call, `PUSHA` or `ENDTRY` with a relative offset
    ///
    /// The offset is encoded with the width the opcode takes. Short forms
    /// truncate the offset to a single byte.
    pub fn emit_jump(&mut self, opcode: Opcode, offset: i32) -> &mut Self {
        match opcode.operand_size() {
            OperandSize::Fixed(1) => self.emit_with_operand(opcode, &[offset as i8 as u8]),
            _ => self.emit_with_operand(opcode, &offset.to_le_bytes()),
        }
    }

    /// Emit `CALL_L` with a relative offset
    pub fn emit_call(&mut self, offset: i32) -> &mut Self {
        self.emit_jump(Opcode::CallL, offset)
    }

    /// Emit `TRY_L` with catch and finally offsets (0 for absent)
    pub fn emit_try(&mut self, catch_offset: i32, finally_offset: i32) -> &mut Self {
        let mut operand = [0u8; 8];
        operand[..4].copy_from_slice(&catch_offset.to_le_bytes());
        operand[4..].copy_from_slice(&finally_offset.to_le_bytes());
        self.emit_with_operand(Opcode::TryL, &operand)
    }

    /// Emit `SYSCALL` with a method id
    pub fn emit_syscall(&mut self, method: u32) -> &mut Self {
        self.emit_with_operand(Opcode::Syscall, &method.to_le_bytes())
    }

    /// Bytes written so far
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Wrap the bytes in a [`Script`]
    pub fn to_script(&self) -> Script {
        Script::new(self.to_bytes())
    }
}
