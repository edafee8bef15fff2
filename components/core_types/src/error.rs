//! VM error types.
//!
//! Every instruction handler returns [`VmResult`]. Errors come in two tiers:
//! catchable errors are turned into a thrown VM value and may be handled by a
//! `TRY` region; all other errors end execution in `FAULT`.

use bytecode_system::{BytecodeError, StackItemType};
use thiserror::Error;

/// An error raised while executing a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    // Catchable
    /// An operand had the wrong type for the operation.
    #[error("invalid type: expected {expected}, found {found}")]
    InvalidType {
        /// What the operation accepts
        expected: &'static str,
        /// What it got
        found: StackItemType,
    },

    /// A conversion between item types is not defined.
    #[error("cannot convert {from} to {to}")]
    InvalidCast {
        /// Source type
        from: StackItemType,
        /// Target type
        to: StackItemType,
    },

    /// An element index is outside its container.
    #[error("the value {0} is out of range")]
    IndexOutOfRange(i64),

    /// A map lookup missed.
    #[error("key not found in map")]
    KeyNotFound,

    /// Division or modulus by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Any other arithmetic failure.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    // Fatal
    /// An integer would need more than 32 bytes.
    #[error("integer of {0} bytes exceeds the maximum size of 32 bytes")]
    IntegerTooLarge(usize),

    /// An integer operand does not fit a 32-bit index or count.
    #[error("the value {0} is not a valid 32-bit integer")]
    IntegerOverflow(String),

    /// An item would exceed `max_item_size`.
    #[error("item size {size} is out of range [0, {max}]")]
    ItemTooLarge {
        /// Requested size
        size: i64,
        /// Limit in force
        max: u32,
    },

    /// A shift or exponent is out of range.
    #[error("shift {shift} is out of range [0, {max}]")]
    InvalidShift {
        /// Requested shift
        shift: i64,
        /// Limit in force
        max: u32,
    },

    /// A count, index or operand value is out of range.
    #[error("the value {0} is out of range")]
    OutOfRange(i64),

    /// An item was requested from a stack that does not have it.
    #[error("stack underflow")]
    StackUnderflow,

    /// Too many references are alive.
    #[error("max stack size exceeded: {0}")]
    StackOverflow(usize),

    /// Too many nested contexts.
    #[error("max invocation stack size exceeded: {0}")]
    InvocationStackOverflow(usize),

    /// Too many nested try regions.
    #[error("max try nesting depth exceeded: {0}")]
    TryNestingTooDeep(usize),

    /// A clone would exceed the item limits.
    #[error("beyond clone limits")]
    CloneLimitExceeded,

    /// A comparison would touch too many bytes or items.
    #[error("the operand exceeds the maximum comparable size")]
    ComparableSizeExceeded,

    /// A map key is larger than allowed.
    #[error("map key of {0} bytes exceeds the maximum size of 64 bytes")]
    MapKeyTooLarge(usize),

    /// A jump target is outside the script.
    #[error("jump out of range for position {0}")]
    InvalidJump(i64),

    /// A pointer address is outside the script.
    #[error("bad pointer address: {0}")]
    InvalidPointer(i64),

    /// A pointer was used with a different script.
    #[error("pointers can't be shared between scripts")]
    PointerScriptMismatch,

    /// A slot opcode ran twice in one context.
    #[error("{0} cannot be executed twice")]
    SlotAlreadyInitialized(&'static str),

    /// A slot was accessed before initialization.
    #[error("slot has not been initialized")]
    SlotNotInitialized,

    /// A slot index is outside the slot.
    #[error("slot index {index} out of range for slot of size {size}")]
    SlotIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Slot size
        size: usize,
    },

    /// An instruction operand is not acceptable.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// The evaluation stack size does not match the expected return count.
    #[error("return value count mismatch: expected {expected}, found {found}")]
    ReturnCountMismatch {
        /// Declared return count
        expected: i32,
        /// Items on the stack
        found: usize,
    },

    /// `ENDTRY`/`ENDFINALLY` outside a try region.
    #[error("the corresponding TRY block cannot be found")]
    TryBlockNotFound,

    /// `ENDTRY` inside a finally block.
    #[error("ENDTRY cannot be executed in a FINALLY block")]
    EndTryInFinally,

    /// `TRY` with neither catch nor finally.
    #[error("catch and finally offsets cannot both be zero")]
    InvalidTryOffsets,

    /// No host handler for a syscall.
    #[error("syscall not found: {0:#010x}")]
    SyscallNotFound(u32),

    /// No host handler for a method token.
    #[error("token not found: {0}")]
    TokenNotFound(u16),

    /// `ABORT` was executed.
    #[error("ABORT is executed")]
    Abort,

    /// `ABORTMSG` was executed.
    #[error("ABORTMSG is executed. Reason: {0}")]
    AbortMsg(String),

    /// `ASSERT` saw false.
    #[error("ASSERT is executed with false result")]
    AssertFailed,

    /// `ASSERTMSG` saw false.
    #[error("ASSERTMSG is executed with false result. Reason: {0}")]
    AssertMsgFailed(String),

    /// A thrown value reached the bottom of the invocation stack.
    #[error("an unhandled exception was thrown: {0}")]
    UnhandledException(String),

    /// The operation is not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The script could not be decoded.
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    /// A host-reported failure.
    #[error("host error: {0}")]
    Host(String),
}

impl VmError {
    /// True if the error may be caught by a `TRY` region.
    pub fn is_catchable(&self) -> bool {
        matches!(
            self,
            VmError::InvalidType { .. }
                | VmError::InvalidCast { .. }
                | VmError::IndexOutOfRange(_)
                | VmError::KeyNotFound
                | VmError::DivisionByZero
                | VmError::Arithmetic(_)
        )
    }

    /// Shorthand for [`VmError::InvalidType`].
    pub fn invalid_type(expected: &'static str, found: StackItemType) -> Self {
        VmError::InvalidType { expected, found }
    }
}

/// Result type for VM operations.
pub type VmResult<T> = Result<T, VmError>;
