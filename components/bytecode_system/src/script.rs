//! Immutable scripts
//!
//! A [`Script`] owns the bytecode of one program. Clones share the same
//! bytes, and two handles refer to the same script only when they were cloned
//! from one another ([`Script::ptr_eq`]). Decoded instructions are cached per
//! position, so each offset is decoded at most once per script.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{BytecodeError, BytecodeResult};
use crate::instruction::Instruction;
use crate::item_type::StackItemType;
use crate::opcode::Opcode;

struct ScriptInner {
    bytes: Box<[u8]>,
    instructions: RwLock<HashMap<usize, Arc<Instruction>>>,
    ret: Arc<Instruction>,
}

/// Bytecode of a single program
#[derive(Clone)]
pub struct Script {
    inner: Arc<ScriptInner>,
}

impl Script {
    /// Wrap bytes without validation
    ///
    /// Malformed instructions surface when execution reaches them.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(ScriptInner {
                bytes: bytes.into().into_boxed_slice(),
                instructions: RwLock::new(HashMap::new()),
                ret: Arc::new(Instruction::ret()),
            }),
        }
    }

    /// Wrap bytes after validating every instruction
    ///
    /// Checks that all instructions decode, that data operands fit within
    /// `max_item_size`, that every jump, call, pointer and try target lands
    /// on an instruction boundary, and that type operands are defined.
    pub fn new_strict(bytes: impl Into<Vec<u8>>, max_item_size: usize) -> BytecodeResult<Self> {
        let script = Self::new(bytes);
        script.validate(max_item_size)?;
        Ok(script)
    }

    fn validate(&self, max_item_size: usize) -> BytecodeResult<()> {
        let bytes = &self.inner.bytes;
        let mut decoded = Vec::new();
        let mut position = 0;
        while position < bytes.len() {
            let instruction = Instruction::decode(bytes, position)?;
            if instruction.opcode().is_push_data() && instruction.operand().len() > max_item_size {
                return Err(BytecodeError::OperandTooLarge {
                    position,
                    length: instruction.operand().len(),
                    max: max_item_size,
                });
            }
            let size = instruction.size();
            decoded.push((position, instruction));
            position += size;
        }

        let boundaries: std::collections::HashSet<usize> =
            decoded.iter().map(|(position, _)| *position).collect();
        let bad = |position: usize, reason: String| BytecodeError::BadScript { position, reason };
        let check_target = |position: usize, offset: i32| -> BytecodeResult<()> {
            let target = position as i64 + offset as i64;
            if target < 0 || !boundaries.contains(&(target as usize)) {
                return Err(bad(position, format!("invalid target {target}")));
            }
            Ok(())
        };

        for (position, instruction) in &decoded {
            let position = *position;
            let opcode = instruction.opcode();
            match opcode {
                Opcode::Try | Opcode::TryL => {
                    let (catch, finally) = instruction.try_offsets();
                    if catch != 0 {
                        check_target(position, catch)?;
                    }
                    if finally != 0 {
                        check_target(position, finally)?;
                    }
                }
                Opcode::NewArrayT | Opcode::IsType | Opcode::Convert => {
                    let tag = instruction.token_u8();
                    let ty = StackItemType::from_byte(tag)
                        .ok_or_else(|| bad(position, format!("undefined type {tag:#04x}")))?;
                    if opcode == Opcode::IsType && ty == StackItemType::Any {
                        return Err(bad(position, format!("{opcode} cannot use type Any")));
                    }
                }
                op if op.has_offset_operand() => check_target(position, instruction.offset())?,
                _ => {}
            }
        }

        let mut cache = self.inner.instructions.write();
        for (position, instruction) in decoded {
            cache.insert(position, Arc::new(instruction));
        }
        Ok(())
    }

    /// Script length in bytes
    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    /// True if the script has no bytes
    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// Raw bytecode
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    /// Instruction at `position`, or a synthetic `RET` past the end
    pub fn get_instruction(&self, position: usize) -> BytecodeResult<Arc<Instruction>> {
        if position >= self.len() {
            return Ok(Arc::clone(&self.inner.ret));
        }
        if let Some(instruction) = self.inner.instructions.read().get(&position) {
            return Ok(Arc::clone(instruction));
        }
        let instruction = Arc::new(Instruction::decode(&self.inner.bytes, position)?);
        self.inner
            .instructions
            .write()
            .insert(position, Arc::clone(&instruction));
        Ok(instruction)
    }

    /// True if both handles refer to the same script
    pub fn ptr_eq(&self, other: &Script) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script::new(bytes)
    }
}

impl From<&[u8]> for Script {
    fn from(bytes: &[u8]) -> Self {
        Script::new(bytes.to_vec())
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("len", &self.len())
            .field("at", &Arc::as_ptr(&self.inner))
            .finish()
    }
}
