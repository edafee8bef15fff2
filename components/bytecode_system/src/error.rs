//! Decoding errors

use thiserror::Error;

/// Errors raised while decoding or validating a script
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// The byte at `position` is not a defined opcode
    #[error("invalid opcode {opcode:#04x} at position {position}")]
    InvalidOpcode {
        /// Offending byte
        opcode: u8,
        /// Offset into the script
        position: usize,
    },

    /// The instruction at `position` runs past the end of the script
    #[error("instruction at position {position} is truncated")]
    Truncated {
        /// Offset of the instruction
        position: usize,
    },

    /// A data operand declares more bytes than allowed
    #[error("operand of {length} bytes at position {position} exceeds the maximum of {max}")]
    OperandTooLarge {
        /// Offset of the instruction
        position: usize,
        /// Declared length
        length: usize,
        /// Limit in force
        max: usize,
    },

    /// The requested position is outside the script
    #[error("position {0} is outside the script")]
    PositionOutOfRange(usize),

    /// Strict validation rejected the script
    #[error("bad script at position {position}: {reason}")]
    BadScript {
        /// Offset of the offending instruction
        position: usize,
        /// What was wrong
        reason: String,
    },
}

/// Result alias for decoding
pub type BytecodeResult<T> = Result<T, BytecodeError>;
