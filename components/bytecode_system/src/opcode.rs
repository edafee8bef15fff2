//! Opcode table
//!
//! Every instruction starts with a one-byte opcode. The opcode decides how
//! many operand bytes follow: either a fixed count, or a little-endian length
//! prefix followed by that many data bytes (the `PUSHDATA` family).

use std::fmt;

use self::OperandSize::{Fixed, Prefixed};

/// Operand layout of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandSize {
    /// Exactly this many operand bytes follow the opcode
    Fixed(usize),
    /// A little-endian length prefix of this many bytes, then the data
    Prefixed(usize),
}

macro_rules! opcodes {
    ($( $name:ident = $byte:literal, $mnemonic:literal, $operand:expr, $doc:literal; )*) => {
        /// VM opcodes
        ///
        /// Discriminants are the wire bytes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                #[doc = $doc]
                $name = $byte,
            )*
        }

        impl Opcode {
            /// Every defined opcode, in byte order
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Look up an opcode by its wire byte
            pub const fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Canonical upper-case mnemonic, e.g. `PUSHINT8`
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Operand layout following the opcode byte
            pub const fn operand_size(self) -> OperandSize {
                match self {
                    $(Opcode::$name => $operand,)*
                }
            }
        }
    };
}

opcodes! {
    // Constants
    PushInt8 = 0x00, "PUSHINT8", Fixed(1), "Pushes a 1-byte signed integer.";
    PushInt16 = 0x01, "PUSHINT16", Fixed(2), "Pushes a 2-byte signed integer.";
    PushInt32 = 0x02, "PUSHINT32", Fixed(4), "Pushes a 4-byte signed integer.";
    PushInt64 = 0x03, "PUSHINT64", Fixed(8), "Pushes an 8-byte signed integer.";
    PushInt128 = 0x04, "PUSHINT128", Fixed(16), "Pushes a 16-byte signed integer.";
    PushInt256 = 0x05, "PUSHINT256", Fixed(32), "Pushes a 32-byte signed integer.";
    PushT = 0x08, "PUSHT", Fixed(0), "Pushes boolean true.";
    PushF = 0x09, "PUSHF", Fixed(0), "Pushes boolean false.";
    PushA = 0x0A, "PUSHA", Fixed(4), "Pushes a pointer at a relative offset.";
    PushNull = 0x0B, "PUSHNULL", Fixed(0), "Pushes null.";
    PushData1 = 0x0C, "PUSHDATA1", Prefixed(1), "Pushes data with a 1-byte length prefix.";
    PushData2 = 0x0D, "PUSHDATA2", Prefixed(2), "Pushes data with a 2-byte length prefix.";
    PushData4 = 0x0E, "PUSHDATA4", Prefixed(4), "Pushes data with a 4-byte length prefix.";
    PushM1 = 0x0F, "PUSHM1", Fixed(0), "Pushes -1.";
    Push0 = 0x10, "PUSH0", Fixed(0), "Pushes 0.";
    Push1 = 0x11, "PUSH1", Fixed(0), "Pushes 1.";
    Push2 = 0x12, "PUSH2", Fixed(0), "Pushes 2.";
    Push3 = 0x13, "PUSH3", Fixed(0), "Pushes 3.";
    Push4 = 0x14, "PUSH4", Fixed(0), "Pushes 4.";
    Push5 = 0x15, "PUSH5", Fixed(0), "Pushes 5.";
    Push6 = 0x16, "PUSH6", Fixed(0), "Pushes 6.";
    Push7 = 0x17, "PUSH7", Fixed(0), "Pushes 7.";
    Push8 = 0x18, "PUSH8", Fixed(0), "Pushes 8.";
    Push9 = 0x19, "PUSH9", Fixed(0), "Pushes 9.";
    Push10 = 0x1A, "PUSH10", Fixed(0), "Pushes 10.";
    Push11 = 0x1B, "PUSH11", Fixed(0), "Pushes 11.";
    Push12 = 0x1C, "PUSH12", Fixed(0), "Pushes 12.";
    Push13 = 0x1D, "PUSH13", Fixed(0), "Pushes 13.";
    Push14 = 0x1E, "PUSH14", Fixed(0), "Pushes 14.";
    Push15 = 0x1F, "PUSH15", Fixed(0), "Pushes 15.";
    Push16 = 0x20, "PUSH16", Fixed(0), "Pushes 16.";

    // Flow control
    Nop = 0x21, "NOP", Fixed(0), "Does nothing.";
    Jmp = 0x22, "JMP", Fixed(1), "Unconditional jump, 1-byte offset.";
    JmpL = 0x23, "JMP_L", Fixed(4), "Unconditional jump, 4-byte offset.";
    JmpIf = 0x24, "JMPIF", Fixed(1), "Jumps if the popped value is true.";
    JmpIfL = 0x25, "JMPIF_L", Fixed(4), "Jumps if the popped value is true, 4-byte offset.";
    JmpIfNot = 0x26, "JMPIFNOT", Fixed(1), "Jumps if the popped value is false.";
    JmpIfNotL = 0x27, "JMPIFNOT_L", Fixed(4), "Jumps if the popped value is false, 4-byte offset.";
    JmpEq = 0x28, "JMPEQ", Fixed(1), "Jumps if the two popped integers are equal.";
    JmpEqL = 0x29, "JMPEQ_L", Fixed(4), "Jumps if the two popped integers are equal, 4-byte offset.";
    JmpNe = 0x2A, "JMPNE", Fixed(1), "Jumps if the two popped integers differ.";
    JmpNeL = 0x2B, "JMPNE_L", Fixed(4), "Jumps if the two popped integers differ, 4-byte offset.";
    JmpGt = 0x2C, "JMPGT", Fixed(1), "Jumps if a > b.";
    JmpGtL = 0x2D, "JMPGT_L", Fixed(4), "Jumps if a > b, 4-byte offset.";
    JmpGe = 0x2E, "JMPGE", Fixed(1), "Jumps if a >= b.";
    JmpGeL = 0x2F, "JMPGE_L", Fixed(4), "Jumps if a >= b, 4-byte offset.";
    JmpLt = 0x30, "JMPLT", Fixed(1), "Jumps if a < b.";
    JmpLtL = 0x31, "JMPLT_L", Fixed(4), "Jumps if a < b, 4-byte offset.";
    JmpLe = 0x32, "JMPLE", Fixed(1), "Jumps if a <= b.";
    JmpLeL = 0x33, "JMPLE_L", Fixed(4), "Jumps if a <= b, 4-byte offset.";
    Call = 0x34, "CALL", Fixed(1), "Calls a function at a relative offset.";
    CallL = 0x35, "CALL_L", Fixed(4), "Calls a function at a 4-byte relative offset.";
    CallA = 0x36, "CALLA", Fixed(0), "Calls the function at the popped pointer.";
    CallT = 0x37, "CALLT", Fixed(2), "Calls a host-resolved method token.";
    Abort = 0x38, "ABORT", Fixed(0), "Faults unconditionally.";
    Assert = 0x39, "ASSERT", Fixed(0), "Faults if the popped value is false.";
    Throw = 0x3A, "THROW", Fixed(0), "Throws the popped value.";
    Try = 0x3B, "TRY", Fixed(2), "Opens a try region with 1-byte catch and finally offsets.";
    TryL = 0x3C, "TRY_L", Fixed(8), "Opens a try region with 4-byte catch and finally offsets.";
    EndTry = 0x3D, "ENDTRY", Fixed(1), "Leaves a try or catch block.";
    EndTryL = 0x3E, "ENDTRY_L", Fixed(4), "Leaves a try or catch block, 4-byte offset.";
    EndFinally = 0x3F, "ENDFINALLY", Fixed(0), "Leaves a finally block.";
    Ret = 0x40, "RET", Fixed(0), "Returns from the current context.";
    Syscall = 0x41, "SYSCALL", Fixed(4), "Calls a host service by id.";

    // Stack
    Depth = 0x43, "DEPTH", Fixed(0), "Pushes the stack depth.";
    Drop = 0x45, "DROP", Fixed(0), "Removes the top item.";
    Nip = 0x46, "NIP", Fixed(0), "Removes the second item.";
    XDrop = 0x48, "XDROP", Fixed(0), "Removes the item n back.";
    Clear = 0x49, "CLEAR", Fixed(0), "Clears the stack.";
    Dup = 0x4A, "DUP", Fixed(0), "Duplicates the top item.";
    Over = 0x4B, "OVER", Fixed(0), "Copies the second item to the top.";
    Pick = 0x4D, "PICK", Fixed(0), "Copies the item n back to the top.";
    Tuck = 0x4E, "TUCK", Fixed(0), "Copies the top item below the second item.";
    Swap = 0x50, "SWAP", Fixed(0), "Swaps the top two items.";
    Rot = 0x51, "ROT", Fixed(0), "Moves the third item to the top.";
    Roll = 0x52, "ROLL", Fixed(0), "Moves the item n back to the top.";
    Reverse3 = 0x53, "REVERSE3", Fixed(0), "Reverses the top three items.";
    Reverse4 = 0x54, "REVERSE4", Fixed(0), "Reverses the top four items.";
    ReverseN = 0x55, "REVERSEN", Fixed(0), "Reverses the top n items.";

    // Slots
    InitSSlot = 0x56, "INITSSLOT", Fixed(1), "Initializes the static field slot.";
    InitSlot = 0x57, "INITSLOT", Fixed(2), "Initializes the local and argument slots.";
    LdSFld0 = 0x58, "LDSFLD0", Fixed(0), "Loads static field 0.";
    LdSFld1 = 0x59, "LDSFLD1", Fixed(0), "Loads static field 1.";
    LdSFld2 = 0x5A, "LDSFLD2", Fixed(0), "Loads static field 2.";
    LdSFld3 = 0x5B, "LDSFLD3", Fixed(0), "Loads static field 3.";
    LdSFld4 = 0x5C, "LDSFLD4", Fixed(0), "Loads static field 4.";
    LdSFld5 = 0x5D, "LDSFLD5", Fixed(0), "Loads static field 5.";
    LdSFld6 = 0x5E, "LDSFLD6", Fixed(0), "Loads static field 6.";
    LdSFld = 0x5F, "LDSFLD", Fixed(1), "Loads the static field at the operand index.";
    StSFld0 = 0x60, "STSFLD0", Fixed(0), "Stores static field 0.";
    StSFld1 = 0x61, "STSFLD1", Fixed(0), "Stores static field 1.";
    StSFld2 = 0x62, "STSFLD2", Fixed(0), "Stores static field 2.";
    StSFld3 = 0x63, "STSFLD3", Fixed(0), "Stores static field 3.";
    StSFld4 = 0x64, "STSFLD4", Fixed(0), "Stores static field 4.";
    StSFld5 = 0x65, "STSFLD5", Fixed(0), "Stores static field 5.";
    StSFld6 = 0x66, "STSFLD6", Fixed(0), "Stores static field 6.";
    StSFld = 0x67, "STSFLD", Fixed(1), "Stores the static field at the operand index.";
    LdLoc0 = 0x68, "LDLOC0", Fixed(0), "Loads local 0.";
    LdLoc1 = 0x69, "LDLOC1", Fixed(0), "Loads local 1.";
    LdLoc2 = 0x6A, "LDLOC2", Fixed(0), "Loads local 2.";
    LdLoc3 = 0x6B, "LDLOC3", Fixed(0), "Loads local 3.";
    LdLoc4 = 0x6C, "LDLOC4", Fixed(0), "Loads local 4.";
    LdLoc5 = 0x6D, "LDLOC5", Fixed(0), "Loads local 5.";
    LdLoc6 = 0x6E, "LDLOC6", Fixed(0), "Loads local 6.";
    LdLoc = 0x6F, "LDLOC", Fixed(1), "Loads the local at the operand index.";
    StLoc0 = 0x70, "STLOC0", Fixed(0), "Stores local 0.";
    StLoc1 = 0x71, "STLOC1", Fixed(0), "Stores local 1.";
    StLoc2 = 0x72, "STLOC2", Fixed(0), "Stores local 2.";
    StLoc3 = 0x73, "STLOC3", Fixed(0), "Stores local 3.";
    StLoc4 = 0x74, "STLOC4", Fixed(0), "Stores local 4.";
    StLoc5 = 0x75, "STLOC5", Fixed(0), "Stores local 5.";
    StLoc6 = 0x76, "STLOC6", Fixed(0), "Stores local 6.";
    StLoc = 0x77, "STLOC", Fixed(1), "Stores the local at the operand index.";
    LdArg0 = 0x78, "LDARG0", Fixed(0), "Loads argument 0.";
    LdArg1 = 0x79, "LDARG1", Fixed(0), "Loads argument 1.";
    LdArg2 = 0x7A, "LDARG2", Fixed(0), "Loads argument 2.";
    LdArg3 = 0x7B, "LDARG3", Fixed(0), "Loads argument 3.";
    LdArg4 = 0x7C, "LDARG4", Fixed(0), "Loads argument 4.";
    LdArg5 = 0x7D, "LDARG5", Fixed(0), "Loads argument 5.";
    LdArg6 = 0x7E, "LDARG6", Fixed(0), "Loads argument 6.";
    LdArg = 0x7F, "LDARG", Fixed(1), "Loads the argument at the operand index.";
    StArg0 = 0x80, "STARG0", Fixed(0), "Stores argument 0.";
    StArg1 = 0x81, "STARG1", Fixed(0), "Stores argument 1.";
    StArg2 = 0x82, "STARG2", Fixed(0), "Stores argument 2.";
    StArg3 = 0x83, "STARG3", Fixed(0), "Stores argument 3.";
    StArg4 = 0x84, "STARG4", Fixed(0), "Stores argument 4.";
    StArg5 = 0x85, "STARG5", Fixed(0), "Stores argument 5.";
    StArg6 = 0x86, "STARG6", Fixed(0), "Stores argument 6.";
    StArg = 0x87, "STARG", Fixed(1), "Stores the argument at the operand index.";

    // Splice
    NewBuffer = 0x88, "NEWBUFFER", Fixed(0), "Creates a zeroed buffer.";
    MemCpy = 0x89, "MEMCPY", Fixed(0), "Copies bytes into a buffer.";
    Cat = 0x8B, "CAT", Fixed(0), "Concatenates two byte strings.";
    SubStr = 0x8C, "SUBSTR", Fixed(0), "Takes a byte range.";
    Left = 0x8D, "LEFT", Fixed(0), "Takes a prefix.";
    Right = 0x8E, "RIGHT", Fixed(0), "Takes a suffix.";

    // Bitwise logic
    Invert = 0x90, "INVERT", Fixed(0), "Bitwise not.";
    And = 0x91, "AND", Fixed(0), "Bitwise and.";
    Or = 0x92, "OR", Fixed(0), "Bitwise or.";
    Xor = 0x93, "XOR", Fixed(0), "Bitwise exclusive or.";
    Equal = 0x97, "EQUAL", Fixed(0), "Pushes whether two items are equal.";
    NotEqual = 0x98, "NOTEQUAL", Fixed(0), "Pushes whether two items differ.";

    // Arithmetic
    Sign = 0x99, "SIGN", Fixed(0), "Pushes the sign of an integer.";
    Abs = 0x9A, "ABS", Fixed(0), "Absolute value.";
    Negate = 0x9B, "NEGATE", Fixed(0), "Negation.";
    Inc = 0x9C, "INC", Fixed(0), "Adds one.";
    Dec = 0x9D, "DEC", Fixed(0), "Subtracts one.";
    Add = 0x9E, "ADD", Fixed(0), "Addition.";
    Sub = 0x9F, "SUB", Fixed(0), "Subtraction.";
    Mul = 0xA0, "MUL", Fixed(0), "Multiplication.";
    Div = 0xA1, "DIV", Fixed(0), "Truncating division.";
    Mod = 0xA2, "MOD", Fixed(0), "Remainder of truncating division.";
    Pow = 0xA3, "POW", Fixed(0), "Exponentiation.";
    Sqrt = 0xA4, "SQRT", Fixed(0), "Integer square root.";
    ModMul = 0xA5, "MODMUL", Fixed(0), "Modular multiplication.";
    ModPow = 0xA6, "MODPOW", Fixed(0), "Modular exponentiation, or inverse when the exponent is -1.";
    Shl = 0xA8, "SHL", Fixed(0), "Left shift.";
    Shr = 0xA9, "SHR", Fixed(0), "Arithmetic right shift.";
    Not = 0xAA, "NOT", Fixed(0), "Boolean not.";
    BoolAnd = 0xAB, "BOOLAND", Fixed(0), "Boolean and.";
    BoolOr = 0xAC, "BOOLOR", Fixed(0), "Boolean or.";
    Nz = 0xB1, "NZ", Fixed(0), "Pushes whether an integer is non-zero.";
    NumEqual = 0xB3, "NUMEQUAL", Fixed(0), "Numeric equality.";
    NumNotEqual = 0xB4, "NUMNOTEQUAL", Fixed(0), "Numeric inequality.";
    Lt = 0xB5, "LT", Fixed(0), "Less than.";
    Le = 0xB6, "LE", Fixed(0), "Less than or equal.";
    Gt = 0xB7, "GT", Fixed(0), "Greater than.";
    Ge = 0xB8, "GE", Fixed(0), "Greater than or equal.";
    Min = 0xB9, "MIN", Fixed(0), "Minimum of two integers.";
    Max = 0xBA, "MAX", Fixed(0), "Maximum of two integers.";
    Within = 0xBB, "WITHIN", Fixed(0), "Pushes whether a <= x < b.";

    // Compound types
    PackMap = 0xBE, "PACKMAP", Fixed(0), "Packs n key/value pairs into a map.";
    PackStruct = 0xBF, "PACKSTRUCT", Fixed(0), "Packs n items into a struct.";
    Pack = 0xC0, "PACK", Fixed(0), "Packs n items into an array.";
    Unpack = 0xC1, "UNPACK", Fixed(0), "Unpacks a compound onto the stack.";
    NewArray0 = 0xC2, "NEWARRAY0", Fixed(0), "Creates an empty array.";
    NewArray = 0xC3, "NEWARRAY", Fixed(0), "Creates an array of n nulls.";
    NewArrayT = 0xC4, "NEWARRAY_T", Fixed(1), "Creates an array of n typed defaults.";
    NewStruct0 = 0xC5, "NEWSTRUCT0", Fixed(0), "Creates an empty struct.";
    NewStruct = 0xC6, "NEWSTRUCT", Fixed(0), "Creates a struct of n nulls.";
    NewMap = 0xC8, "NEWMAP", Fixed(0), "Creates an empty map.";
    Size = 0xCA, "SIZE", Fixed(0), "Pushes the size of an item.";
    HasKey = 0xCB, "HASKEY", Fixed(0), "Pushes whether a key or index exists.";
    Keys = 0xCC, "KEYS", Fixed(0), "Pushes the keys of a map.";
    Values = 0xCD, "VALUES", Fixed(0), "Pushes the values of a compound.";
    PickItem = 0xCE, "PICKITEM", Fixed(0), "Reads an element.";
    Append = 0xCF, "APPEND", Fixed(0), "Appends to an array.";
    SetItem = 0xD0, "SETITEM", Fixed(0), "Writes an element.";
    ReverseItems = 0xD1, "REVERSEITEMS", Fixed(0), "Reverses an array or buffer in place.";
    Remove = 0xD2, "REMOVE", Fixed(0), "Removes an element.";
    ClearItems = 0xD3, "CLEARITEMS", Fixed(0), "Removes all elements.";
    PopItem = 0xD4, "POPITEM", Fixed(0), "Removes and pushes the last array element.";

    // Types
    IsNull = 0xD8, "ISNULL", Fixed(0), "Pushes whether the item is null.";
    IsType = 0xD9, "ISTYPE", Fixed(1), "Pushes whether the item has the operand type.";
    Convert = 0xDB, "CONVERT", Fixed(1), "Converts the item to the operand type.";

    // Extensions
    AbortMsg = 0xE0, "ABORTMSG", Fixed(0), "Faults with the popped message.";
    AssertMsg = 0xE1, "ASSERTMSG", Fixed(0), "Faults with the popped message if the condition is false.";
}

impl Opcode {
    /// The wire byte
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// True for jumps, calls and try-region openers whose operands are offsets
    pub fn has_offset_operand(self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::JmpL
                | Opcode::JmpIf
                | Opcode::JmpIfL
                | Opcode::JmpIfNot
                | Opcode::JmpIfNotL
                | Opcode::JmpEq
                | Opcode::JmpEqL
                | Opcode::JmpNe
                | Opcode::JmpNeL
                | Opcode::JmpGt
                | Opcode::JmpGtL
                | Opcode::JmpGe
                | Opcode::JmpGeL
                | Opcode::JmpLt
                | Opcode::JmpLtL
                | Opcode::JmpLe
                | Opcode::JmpLeL
                | Opcode::Call
                | Opcode::CallL
                | Opcode::PushA
                | Opcode::EndTry
                | Opcode::EndTryL
                | Opcode::Try
                | Opcode::TryL
        )
    }

    /// True for the `PUSHDATA` family
    pub fn is_push_data(self) -> bool {
        matches!(self, Opcode::PushData1 | Opcode::PushData2 | Opcode::PushData4)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_byte(byte).ok_or(byte)
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
