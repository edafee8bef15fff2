//! Decoded instructions
//!
//! An [`Instruction`] is an opcode plus its raw operand bytes. Operand
//! accessors read little-endian values at fixed offsets and return zero
//! when the operand is shorter than the value requested.

use crate::error::{BytecodeError, BytecodeResult};
use crate::opcode::{Opcode, OperandSize};

/// A single decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    operand: Box<[u8]>,
    size: usize,
}

impl Instruction {
    /// The synthetic `RET` returned for positions past the end of a script
    pub fn ret() -> Self {
        Self {
            opcode: Opcode::Ret,
            operand: Box::default(),
            size: 1,
        }
    }

    /// Decode the instruction starting at `position`
    pub fn decode(script: &[u8], position: usize) -> BytecodeResult<Self> {
        let byte = *script
            .get(position)
            .ok_or(BytecodeError::PositionOutOfRange(position))?;
        let opcode = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode {
            opcode: byte,
            position,
        })?;
        let truncated = || BytecodeError::Truncated { position };

        let start = position + 1;
        let (data_start, length) = match opcode.operand_size() {
            OperandSize::Fixed(n) => (start, n),
            OperandSize::Prefixed(prefix) => {
                let bytes = script.get(start..start + prefix).ok_or_else(truncated)?;
                let length = match prefix {
                    1 => bytes[0] as usize,
                    2 => u16::from_le_bytes([bytes[0], bytes[1]]) as usize,
                    _ => {
                        let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                        usize::try_from(value).map_err(|_| BytecodeError::OperandTooLarge {
                            position,
                            length: value as u32 as usize,
                            max: i32::MAX as usize,
                        })?
                    }
                };
                (start + prefix, length)
            }
        };
        let end = data_start.checked_add(length).ok_or_else(truncated)?;
        let operand = script.get(data_start..end).ok_or_else(truncated)?;

        Ok(Self {
            opcode,
            operand: operand.into(),
            size: end - position,
        })
    }

    /// The opcode
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Operand bytes, without any length prefix
    pub fn operand(&self) -> &[u8] {
        &self.operand
    }

    /// Encoded size in bytes, including the opcode and any length prefix
    pub fn size(&self) -> usize {
        self.size
    }

    fn bytes<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(slice) = self.operand.get(offset..offset + N) {
            out.copy_from_slice(slice);
        }
        out
    }

    /// First operand byte as `i8`
    pub fn token_i8(&self) -> i8 {
        i8::from_le_bytes(self.bytes(0))
    }

    /// Second operand byte as `i8`
    pub fn token_i8_1(&self) -> i8 {
        i8::from_le_bytes(self.bytes(1))
    }

    /// First operand byte as `u8`
    pub fn token_u8(&self) -> u8 {
        self.bytes::<1>(0)[0]
    }

    /// Second operand byte as `u8`
    pub fn token_u8_1(&self) -> u8 {
        self.bytes::<1>(1)[0]
    }

    /// First two operand bytes as `u16`
    pub fn token_u16(&self) -> u16 {
        u16::from_le_bytes(self.bytes(0))
    }

    /// First four operand bytes as `i32`
    pub fn token_i32(&self) -> i32 {
        i32::from_le_bytes(self.bytes(0))
    }

    /// Operand bytes 4..8 as `i32`
    pub fn token_i32_1(&self) -> i32 {
        i32::from_le_bytes(self.bytes(4))
    }

    /// First four operand bytes as `u32`
    pub fn token_u32(&self) -> u32 {
        u32::from_le_bytes(self.bytes(0))
    }

    /// Relative offset carried by a jump, call, `PUSHA` or `ENDTRY`
    ///
    /// Short forms carry an `i8`, long forms an `i32`.
    pub fn offset(&self) -> i32 {
        match self.operand.len() {
            1 => self.token_i8() as i32,
            _ => self.token_i32(),
        }
    }

    /// Catch and finally offsets of `TRY`/`TRY_L`
    pub fn try_offsets(&self) -> (i32, i32) {
        match self.opcode {
            Opcode::Try => (self.token_i8() as i32, self.token_i8_1() as i32),
            _ => (self.token_i32(), self.token_i32_1()),
        }
    }
}
