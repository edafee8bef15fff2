//! Instruction dispatch
//!
//! Handles individual opcode execution. Control flow that spans contexts
//! (calls, returns, try regions) is delegated to the engine in [`crate::vm`].

use std::cell::RefMut;
use std::cmp::Ordering;
use std::iter;

use bytecode_system::{Instruction, Opcode, StackItemType};
use core_types::{Array, Buffer, Map, MapKey, Pointer, StackItem, Struct, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

use crate::context::SlotKind;
use crate::evaluation_stack::EvaluationStack;
use crate::numeric;
use crate::vm::ExecutionEngine;

impl ExecutionEngine {
    /// Execute a single decoded instruction against the current context
    pub(crate) fn execute_instruction(&mut self, instruction: &Instruction) -> VmResult<()> {
        let op = instruction.opcode();
        match op {
            // Constants
            Opcode::PushInt8
            | Opcode::PushInt16
            | Opcode::PushInt32
            | Opcode::PushInt64
            | Opcode::PushInt128
            | Opcode::PushInt256 => {
                self.push_integer(BigInt::from_signed_bytes_le(instruction.operand()))
            }
            Opcode::PushT => self.push_boolean(true),
            Opcode::PushF => self.push_boolean(false),
            Opcode::PushA => {
                let context = self.context()?;
                let position = context.instruction_pointer() as i64 + instruction.token_i32() as i64;
                if position < 0 || position > context.script().len() as i64 {
                    return Err(VmError::InvalidPointer(position));
                }
                let pointer = Pointer::new(context.script().clone(), position as usize);
                self.push(StackItem::Pointer(pointer))
            }
            Opcode::PushNull => self.push(StackItem::Null),
            Opcode::PushData1 | Opcode::PushData2 | Opcode::PushData4 => {
                self.limits()
                    .assert_max_item_size(instruction.operand().len() as i64)?;
                self.push_bytes(instruction.operand())
            }
            Opcode::PushM1
            | Opcode::Push0
            | Opcode::Push1
            | Opcode::Push2
            | Opcode::Push3
            | Opcode::Push4
            | Opcode::Push5
            | Opcode::Push6
            | Opcode::Push7
            | Opcode::Push8
            | Opcode::Push9
            | Opcode::Push10
            | Opcode::Push11
            | Opcode::Push12
            | Opcode::Push13
            | Opcode::Push14
            | Opcode::Push15
            | Opcode::Push16 => {
                let value = op.byte() as i32 - Opcode::Push0.byte() as i32;
                self.push_integer(BigInt::from(value))
            }

            // Flow control
            Opcode::Nop => Ok(()),
            Opcode::Jmp | Opcode::JmpL => self.execute_jump_offset(instruction.offset()),
            Opcode::JmpIf | Opcode::JmpIfL => {
                if self.pop_boolean()? {
                    self.execute_jump_offset(instruction.offset())?;
                }
                Ok(())
            }
            Opcode::JmpIfNot | Opcode::JmpIfNotL => {
                if !self.pop_boolean()? {
                    self.execute_jump_offset(instruction.offset())?;
                }
                Ok(())
            }
            Opcode::JmpEq
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
            | Opcode::JmpLeL => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                let ordering = x1.cmp(&x2);
                let taken = match op {
                    Opcode::JmpEq | Opcode::JmpEqL => ordering == Ordering::Equal,
                    Opcode::JmpNe | Opcode::JmpNeL => ordering != Ordering::Equal,
                    Opcode::JmpGt | Opcode::JmpGtL => ordering == Ordering::Greater,
                    Opcode::JmpGe | Opcode::JmpGeL => ordering != Ordering::Less,
                    Opcode::JmpLt | Opcode::JmpLtL => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                };
                if taken {
                    self.execute_jump_offset(instruction.offset())?;
                }
                Ok(())
            }
            Opcode::Call | Opcode::CallL => self.execute_call_offset(instruction.offset()),
            Opcode::CallA => {
                let pointer = match self.pop()? {
                    StackItem::Pointer(pointer) => pointer,
                    other => return Err(VmError::invalid_type("Pointer", other.item_type())),
                };
                if !pointer.script().ptr_eq(self.context()?.script()) {
                    return Err(VmError::PointerScriptMismatch);
                }
                self.execute_call(pointer.position() as i64)
            }
            Opcode::CallT => {
                let token = instruction.token_u16();
                tracing::trace!(target: "vm::dispatch", token, "CALLT");
                self.load_token(token)
            }
            Opcode::Abort => Err(VmError::Abort),
            Opcode::Assert => {
                if self.pop_boolean()? {
                    Ok(())
                } else {
                    Err(VmError::AssertFailed)
                }
            }
            Opcode::Throw => {
                let exception = self.pop()?;
                self.execute_throw(exception)
            }
            Opcode::Try | Opcode::TryL => {
                let (catch_offset, finally_offset) = instruction.try_offsets();
                self.execute_try(catch_offset, finally_offset)
            }
            Opcode::EndTry | Opcode::EndTryL => self.execute_end_try(instruction.offset()),
            Opcode::EndFinally => self.execute_end_finally(),
            Opcode::Ret => self.execute_ret(),
            Opcode::Syscall => {
                let method = instruction.token_u32();
                tracing::trace!(target: "vm::dispatch", method, "SYSCALL");
                self.on_syscall(method)
            }

            // Stack
            Opcode::Depth => {
                let depth = self.stack()?.len();
                self.push_integer(BigInt::from(depth))
            }
            Opcode::Drop => self.pop().map(drop),
            Opcode::Nip => self.stack()?.remove(1).map(drop),
            Opcode::XDrop => {
                let n = self.pop_count()?;
                self.stack()?.remove(n).map(drop)
            }
            Opcode::Clear => {
                self.stack()?.clear();
                Ok(())
            }
            Opcode::Dup => self.copy_to_top(0),
            Opcode::Over => self.copy_to_top(1),
            Opcode::Pick => {
                let n = self.pop_count()?;
                self.copy_to_top(n)
            }
            Opcode::Tuck => {
                let mut stack = self.stack()?;
                let top = stack.peek(0)?;
                stack.insert(2, top)
            }
            Opcode::Swap => self.move_to_top(1),
            Opcode::Rot => self.move_to_top(2),
            Opcode::Roll => {
                let n = self.pop_count()?;
                if n == 0 {
                    return Ok(());
                }
                self.move_to_top(n)
            }
            Opcode::Reverse3 => self.stack()?.reverse(3),
            Opcode::Reverse4 => self.stack()?.reverse(4),
            Opcode::ReverseN => {
                let n = self.pop_i32()?;
                self.stack()?.reverse(n as i64)
            }

            // Slots
            Opcode::InitSSlot => {
                let count = instruction.token_u8();
                if count == 0 {
                    return Err(VmError::InvalidOperand(format!("{op} with count 0")));
                }
                self.context()?.init_static_fields(count as usize)
            }
            Opcode::InitSlot => {
                if instruction.token_u16() == 0 {
                    return Err(VmError::InvalidOperand(format!("{op} with count 0")));
                }
                if self.context()?.has_slots() {
                    return Err(VmError::SlotAlreadyInitialized("INITSLOT"));
                }
                let mut arguments = Vec::with_capacity(instruction.token_u8_1() as usize);
                for _ in 0..instruction.token_u8_1() {
                    arguments.push(self.pop()?);
                }
                self.context_mut()?
                    .init_slots(instruction.token_u8() as usize, arguments)
            }
            Opcode::LdSFld0
            | Opcode::LdSFld1
            | Opcode::LdSFld2
            | Opcode::LdSFld3
            | Opcode::LdSFld4
            | Opcode::LdSFld5
            | Opcode::LdSFld6 => self.load_slot(SlotKind::Static, op, Opcode::LdSFld0),
            Opcode::LdSFld => self.load_slot_at(SlotKind::Static, instruction.token_u8()),
            Opcode::StSFld0
            | Opcode::StSFld1
            | Opcode::StSFld2
            | Opcode::StSFld3
            | Opcode::StSFld4
            | Opcode::StSFld5
            | Opcode::StSFld6 => self.store_slot(SlotKind::Static, op, Opcode::StSFld0),
            Opcode::StSFld => self.store_slot_at(SlotKind::Static, instruction.token_u8()),
            Opcode::LdLoc0
            | Opcode::LdLoc1
            | Opcode::LdLoc2
            | Opcode::LdLoc3
            | Opcode::LdLoc4
            | Opcode::LdLoc5
            | Opcode::LdLoc6 => self.load_slot(SlotKind::Local, op, Opcode::LdLoc0),
            Opcode::LdLoc => self.load_slot_at(SlotKind::Local, instruction.token_u8()),
            Opcode::StLoc0
            | Opcode::StLoc1
            | Opcode::StLoc2
            | Opcode::StLoc3
            | Opcode::StLoc4
            | Opcode::StLoc5
            | Opcode::StLoc6 => self.store_slot(SlotKind::Local, op, Opcode::StLoc0),
            Opcode::StLoc => self.store_slot_at(SlotKind::Local, instruction.token_u8()),
            Opcode::LdArg0
            | Opcode::LdArg1
            | Opcode::LdArg2
            | Opcode::LdArg3
            | Opcode::LdArg4
            | Opcode::LdArg5
            | Opcode::LdArg6 => self.load_slot(SlotKind::Argument, op, Opcode::LdArg0),
            Opcode::LdArg => self.load_slot_at(SlotKind::Argument, instruction.token_u8()),
            Opcode::StArg0
            | Opcode::StArg1
            | Opcode::StArg2
            | Opcode::StArg3
            | Opcode::StArg4
            | Opcode::StArg5
            | Opcode::StArg6 => self.store_slot(SlotKind::Argument, op, Opcode::StArg0),
            Opcode::StArg => self.store_slot_at(SlotKind::Argument, instruction.token_u8()),

            // Splice
            Opcode::NewBuffer => {
                let length = self.pop_i32()?;
                self.limits().assert_max_item_size(length as i64)?;
                self.push(StackItem::Buffer(Buffer::new(length as usize)))
            }
            Opcode::MemCpy => self.mem_cpy(),
            Opcode::Cat => {
                let x2 = self.pop_bytes()?;
                let mut x1 = self.pop_bytes()?;
                self.limits()
                    .assert_max_item_size((x1.len() + x2.len()) as i64)?;
                x1.extend_from_slice(&x2);
                self.push(StackItem::Buffer(Buffer::from_bytes(x1)))
            }
            Opcode::SubStr => {
                let count = self.pop_count()?;
                let index = self.pop_count()?;
                let x = self.pop_bytes()?;
                if index + count > x.len() {
                    return Err(VmError::OutOfRange((index + count) as i64));
                }
                self.push(StackItem::Buffer(Buffer::from_bytes(&x[index..index + count])))
            }
            Opcode::Left => {
                let count = self.pop_count()?;
                let x = self.pop_bytes()?;
                if count > x.len() {
                    return Err(VmError::OutOfRange(count as i64));
                }
                self.push(StackItem::Buffer(Buffer::from_bytes(&x[..count])))
            }
            Opcode::Right => {
                let count = self.pop_count()?;
                let x = self.pop_bytes()?;
                if count > x.len() {
                    return Err(VmError::OutOfRange(count as i64));
                }
                self.push(StackItem::Buffer(Buffer::from_bytes(&x[x.len() - count..])))
            }

            // Bitwise logic
            Opcode::Invert => {
                let x = self.pop_integer()?;
                self.push_integer(!x)
            }
            Opcode::And | Opcode::Or | Opcode::Xor => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                let result = match op {
                    Opcode::And => x1 & x2,
                    Opcode::Or => x1 | x2,
                    _ => x1 ^ x2,
                };
                self.push_integer(result)
            }
            Opcode::Equal | Opcode::NotEqual => {
                let x2 = self.pop()?;
                let x1 = self.pop()?;
                let equal = x1.equals(&x2, self.limits())?;
                self.push_boolean(equal == (op == Opcode::Equal))
            }

            // Arithmetic
            Opcode::Sign => {
                let x = self.pop_integer()?;
                self.push_integer(x.signum())
            }
            Opcode::Abs => {
                let x = self.pop_integer()?;
                self.push_integer(x.abs())
            }
            Opcode::Negate => {
                let x = self.pop_integer()?;
                self.push_integer(-x)
            }
            Opcode::Inc => {
                let x = self.pop_integer()?;
                self.push_integer(x + BigInt::one())
            }
            Opcode::Dec => {
                let x = self.pop_integer()?;
                self.push_integer(x - BigInt::one())
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Min
            | Opcode::Max => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                let result = match op {
                    Opcode::Add => x1 + x2,
                    Opcode::Sub => x1 - x2,
                    Opcode::Mul => x1 * x2,
                    Opcode::Div => numeric::div(&x1, &x2)?,
                    Opcode::Mod => numeric::rem(&x1, &x2)?,
                    Opcode::Min => x1.min(x2),
                    _ => x1.max(x2),
                };
                self.push_integer(result)
            }
            Opcode::Pow => {
                let exponent = self.pop_i32()?;
                self.limits().assert_shift(exponent as i64)?;
                let value = self.pop_integer()?;
                self.push_integer(value.pow(exponent as u32))
            }
            Opcode::Sqrt => {
                let x = self.pop_integer()?;
                self.push_integer(numeric::sqrt(&x)?)
            }
            Opcode::ModMul => {
                let modulus = self.pop_integer()?;
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                self.push_integer(numeric::mod_mul(&x1, &x2, &modulus)?)
            }
            Opcode::ModPow => {
                let modulus = self.pop_integer()?;
                let exponent = self.pop_integer()?;
                let value = self.pop_integer()?;
                self.push_integer(numeric::mod_pow(&value, &exponent, &modulus)?)
            }
            Opcode::Shl | Opcode::Shr => {
                let shift = self.pop_i32()?;
                self.limits().assert_shift(shift as i64)?;
                if shift == 0 {
                    return Ok(());
                }
                let x = self.pop_integer()?;
                let result = if op == Opcode::Shl {
                    x << shift as usize
                } else {
                    x >> shift as usize
                };
                self.push_integer(result)
            }
            Opcode::Not => {
                let x = self.pop_boolean()?;
                self.push_boolean(!x)
            }
            Opcode::BoolAnd | Opcode::BoolOr => {
                let x2 = self.pop_boolean()?;
                let x1 = self.pop_boolean()?;
                let result = if op == Opcode::BoolAnd { x1 && x2 } else { x1 || x2 };
                self.push_boolean(result)
            }
            Opcode::Nz => {
                let x = self.pop_integer()?;
                self.push_boolean(!x.is_zero())
            }
            Opcode::NumEqual | Opcode::NumNotEqual => {
                let x2 = self.pop_integer()?;
                let x1 = self.pop_integer()?;
                self.push_boolean((x1 == x2) == (op == Opcode::NumEqual))
            }
            Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                let x2 = self.pop()?;
                let x1 = self.pop()?;
                if x1.is_null() || x2.is_null() {
                    return self.push_boolean(false);
                }
                let ordering = x1.get_integer()?.cmp(&x2.get_integer()?);
                self.factory.recycle(x1);
                self.factory.recycle(x2);
                let result = match op {
                    Opcode::Lt => ordering == Ordering::Less,
                    Opcode::Le => ordering != Ordering::Greater,
                    Opcode::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                self.push_boolean(result)
            }
            Opcode::Within => {
                let b = self.pop_integer()?;
                let a = self.pop_integer()?;
                let x = self.pop_integer()?;
                self.push_boolean(a <= x && x < b)
            }

            // Compound types
            Opcode::PackMap => self.pack_map(),
            Opcode::PackStruct | Opcode::Pack => {
                let size = self.pop_i32()?;
                if size < 0 || size as usize > self.stack()?.len() {
                    return Err(VmError::OutOfRange(size as i64));
                }
                let mut items = Vec::with_capacity(size as usize);
                for _ in 0..size {
                    items.push(self.pop()?);
                }
                let counter = self.reference_counter().clone();
                let packed = if op == Opcode::Pack {
                    StackItem::Array(Array::with_items(Some(&counter), items))
                } else {
                    StackItem::Struct(Struct::with_items(Some(&counter), items))
                };
                self.push(packed)
            }
            Opcode::Unpack => self.unpack(),
            Opcode::NewArray0 => {
                let array = Array::new(Some(self.reference_counter()));
                self.push(StackItem::Array(array))
            }
            Opcode::NewArray | Opcode::NewArrayT => {
                let n = self.pop_new_size()?;
                let default = if op == Opcode::NewArrayT {
                    let ty = Self::operand_type(instruction)?;
                    match ty {
                        StackItemType::Boolean => StackItem::Boolean(false),
                        StackItemType::Integer => StackItem::from(0),
                        StackItemType::ByteString => StackItem::from(Vec::<u8>::new()),
                        _ => StackItem::Null,
                    }
                } else {
                    StackItem::Null
                };
                let array =
                    Array::with_items(Some(self.reference_counter()), iter::repeat(default).take(n));
                self.push(StackItem::Array(array))
            }
            Opcode::NewStruct0 => {
                let item = Struct::new(Some(self.reference_counter()));
                self.push(StackItem::Struct(item))
            }
            Opcode::NewStruct => {
                let n = self.pop_new_size()?;
                let item = Struct::with_items(
                    Some(self.reference_counter()),
                    iter::repeat(StackItem::Null).take(n),
                );
                self.push(StackItem::Struct(item))
            }
            Opcode::NewMap => {
                let map = Map::new(Some(self.reference_counter()));
                self.push(StackItem::Map(map))
            }
            Opcode::Size => {
                let x = self.pop()?;
                let size = match &x {
                    StackItem::Array(array) => array.len(),
                    StackItem::Struct(item) => item.len(),
                    StackItem::Map(map) => map.len(),
                    StackItem::Boolean(_) => 1,
                    StackItem::Integer(value) => value.size(),
                    StackItem::ByteString(bytes) => bytes.len(),
                    StackItem::Buffer(buffer) => buffer.len(),
                    other => return Err(VmError::invalid_type("sized item", other.item_type())),
                };
                self.factory.recycle(x);
                self.push_integer(BigInt::from(size))
            }
            Opcode::HasKey => self.has_key(),
            Opcode::Keys => {
                let map = match self.pop()? {
                    StackItem::Map(map) => map,
                    other => return Err(VmError::invalid_type("Map", other.item_type())),
                };
                let keys = map.keys().iter().map(MapKey::to_item).collect::<Vec<_>>();
                let array = Array::with_items(Some(self.reference_counter()), keys);
                self.push(StackItem::Array(array))
            }
            Opcode::Values => {
                let x = self.pop()?;
                let values = match &x {
                    StackItem::Array(array) => array.items(),
                    StackItem::Struct(item) => item.items(),
                    StackItem::Map(map) => map.values(),
                    other => return Err(VmError::invalid_type("compound", other.item_type())),
                };
                let counter = self.reference_counter().clone();
                let array = Array::new(Some(&counter));
                for value in values {
                    array.push(self.detach_struct(value)?);
                }
                self.push(StackItem::Array(array))
            }
            Opcode::PickItem => self.pick_item(),
            Opcode::Append => {
                let item = self.pop()?;
                let item = self.detach_struct(item)?;
                let target = self.pop()?;
                match &target {
                    StackItem::Array(array) => array.push(item),
                    StackItem::Struct(value) => value.push(item),
                    other => return Err(VmError::invalid_type("Array", other.item_type())),
                }
                Ok(())
            }
            Opcode::SetItem => self.set_item(),
            Opcode::ReverseItems => {
                let x = self.pop()?;
                match &x {
                    StackItem::Array(array) => array.reverse(),
                    StackItem::Struct(item) => item.reverse(),
                    StackItem::Buffer(buffer) => buffer.reverse(),
                    other => return Err(VmError::invalid_type("Array or Buffer", other.item_type())),
                }
                Ok(())
            }
            Opcode::Remove => {
                let key = self.pop()?;
                let x = self.pop()?;
                match &x {
                    StackItem::Array(array) => remove_at(array, &key),
                    StackItem::Struct(item) => remove_at(item, &key),
                    StackItem::Map(map) => {
                        map.remove(&MapKey::try_from(&key)?);
                        Ok(())
                    }
                    other => Err(VmError::invalid_type("compound", other.item_type())),
                }
            }
            Opcode::ClearItems => {
                let x = self.pop()?;
                match &x {
                    StackItem::Array(array) => array.clear(),
                    StackItem::Struct(item) => item.clear(),
                    StackItem::Map(map) => map.clear(),
                    other => return Err(VmError::invalid_type("compound", other.item_type())),
                }
                Ok(())
            }
            Opcode::PopItem => {
                let x = self.pop()?;
                let array: &Array = match &x {
                    StackItem::Array(array) => array,
                    StackItem::Struct(item) => &**item,
                    other => return Err(VmError::invalid_type("Array", other.item_type())),
                };
                let last = array
                    .len()
                    .checked_sub(1)
                    .ok_or(VmError::OutOfRange(-1))?;
                let item = array.get(last).ok_or(VmError::OutOfRange(last as i64))?;
                self.push(item)?;
                array.remove(last);
                Ok(())
            }

            // Types
            Opcode::IsNull => {
                let x = self.pop()?;
                self.push_boolean(x.is_null())
            }
            Opcode::IsType => {
                let ty = Self::operand_type(instruction)?;
                if ty == StackItemType::Any {
                    return Err(VmError::InvalidOperand(format!("{op} with type Any")));
                }
                let x = self.pop()?;
                self.push_boolean(x.item_type() == ty)
            }
            Opcode::Convert => {
                let ty = Self::operand_type(instruction)?;
                let x = self.pop()?;
                let converted = x.convert_to(ty)?;
                self.push(converted)
            }

            // Extensions
            Opcode::AbortMsg => {
                let message = self.pop()?.get_string()?;
                Err(VmError::AbortMsg(message))
            }
            Opcode::AssertMsg => {
                let message = self.pop()?.get_string()?;
                if self.pop_boolean()? {
                    Ok(())
                } else {
                    Err(VmError::AssertMsgFailed(message))
                }
            }
        }
    }

    fn stack(&self) -> VmResult<RefMut<'_, EvaluationStack>> {
        Ok(self.context()?.evaluation_stack_mut())
    }

    /// Pop a non-negative count or index
    fn pop_count(&mut self) -> VmResult<usize> {
        let n = self.pop_i32()?;
        usize::try_from(n).map_err(|_| VmError::OutOfRange(n as i64))
    }

    /// Pop the element count of a new array or struct
    fn pop_new_size(&mut self) -> VmResult<usize> {
        let n = self.pop_i32()?;
        if n < 0 || n as i64 > self.limits().max_stack_size as i64 {
            return Err(VmError::OutOfRange(n as i64));
        }
        Ok(n as usize)
    }

    fn operand_type(instruction: &Instruction) -> VmResult<StackItemType> {
        let byte = instruction.token_u8();
        StackItemType::from_byte(byte).ok_or_else(|| {
            VmError::InvalidOperand(format!("{} with type {byte:#04x}", instruction.opcode()))
        })
    }

    fn copy_to_top(&mut self, index: usize) -> VmResult<()> {
        let item = self.peek(index)?;
        self.push(item)
    }

    fn move_to_top(&mut self, index: usize) -> VmResult<()> {
        let mut stack = self.stack()?;
        let item = stack.remove(index)?;
        stack.push(item);
        Ok(())
    }

    fn load_slot(&mut self, kind: SlotKind, op: Opcode, base: Opcode) -> VmResult<()> {
        self.load_slot_at(kind, op.byte() - base.byte())
    }

    fn load_slot_at(&mut self, kind: SlotKind, index: u8) -> VmResult<()> {
        let item = self.context()?.load_slot(kind, index as usize)?;
        self.push(item)
    }

    fn store_slot(&mut self, kind: SlotKind, op: Opcode, base: Opcode) -> VmResult<()> {
        self.store_slot_at(kind, op.byte() - base.byte())
    }

    fn store_slot_at(&mut self, kind: SlotKind, index: u8) -> VmResult<()> {
        let item = self.pop()?;
        self.context_mut()?.store_slot(kind, index as usize, item)
    }

    /// Deep-copy a struct about to be stored inside another compound
    fn detach_struct(&self, item: StackItem) -> VmResult<StackItem> {
        match item {
            StackItem::Struct(value) => Ok(StackItem::Struct(value.clone_with_limits(self.limits())?)),
            other => Ok(other),
        }
    }

    fn mem_cpy(&mut self) -> VmResult<()> {
        let count = self.pop_count()?;
        let source_index = self.pop_count()?;
        let source = self.pop_bytes()?;
        if source_index + count > source.len() {
            return Err(VmError::OutOfRange((source_index + count) as i64));
        }
        let destination_index = self.pop_count()?;
        let buffer = match self.pop()? {
            StackItem::Buffer(buffer) => buffer,
            other => return Err(VmError::invalid_type("Buffer", other.item_type())),
        };
        if destination_index + count > buffer.len() {
            return Err(VmError::OutOfRange((destination_index + count) as i64));
        }
        buffer.copy_from(
            destination_index,
            &source[source_index..source_index + count],
        );
        Ok(())
    }

    fn pack_map(&mut self) -> VmResult<()> {
        let size = self.pop_i32()?;
        if size < 0 || size as usize * 2 > self.stack()?.len() {
            return Err(VmError::OutOfRange(size as i64));
        }
        let map = Map::new(Some(self.reference_counter()));
        for _ in 0..size {
            let key = self.pop()?;
            let key = MapKey::try_from(&key)?;
            let value = self.pop()?;
            map.insert(key, value)?;
        }
        self.push(StackItem::Map(map))
    }

    fn unpack(&mut self) -> VmResult<()> {
        let x = self.pop()?;
        let count = match &x {
            StackItem::Map(map) => {
                let entries = map.entries();
                for (key, value) in entries.iter().rev() {
                    self.push(value.clone())?;
                    self.push(key.to_item())?;
                }
                entries.len()
            }
            StackItem::Array(array) => self.push_reversed(array.items())?,
            StackItem::Struct(item) => self.push_reversed(item.items())?,
            other => return Err(VmError::invalid_type("compound", other.item_type())),
        };
        self.push_integer(BigInt::from(count))
    }

    fn push_reversed(&mut self, items: Vec<StackItem>) -> VmResult<usize> {
        let count = items.len();
        for item in items.into_iter().rev() {
            self.push(item)?;
        }
        Ok(count)
    }

    fn has_key(&mut self) -> VmResult<()> {
        let key = self.pop()?;
        if !key.is_primitive() {
            return Err(VmError::invalid_type("primitive", key.item_type()));
        }
        let x = self.pop()?;
        let length = match &x {
            StackItem::Map(map) => {
                let found = map.contains_key(&MapKey::try_from(&key)?);
                return self.push_boolean(found);
            }
            StackItem::Array(array) => array.len(),
            StackItem::Struct(item) => item.len(),
            StackItem::Buffer(buffer) => buffer.len(),
            StackItem::ByteString(bytes) => bytes.len(),
            other => return Err(VmError::invalid_type("compound or bytes", other.item_type())),
        };
        let index = numeric::to_i32(&key.get_integer()?)?;
        if index < 0 {
            return Err(VmError::OutOfRange(index as i64));
        }
        self.push_boolean((index as usize) < length)
    }

    fn pick_item(&mut self) -> VmResult<()> {
        let key = self.pop()?;
        let x = self.pop()?;
        let item = match &x {
            StackItem::Array(array) => element_at(array, &key)?,
            StackItem::Struct(item) => element_at(item, &key)?,
            StackItem::Map(map) => map
                .get(&MapKey::try_from(&key)?)
                .ok_or(VmError::KeyNotFound)?,
            StackItem::Boolean(_)
            | StackItem::Integer(_)
            | StackItem::ByteString(_)
            | StackItem::Buffer(_) => {
                let bytes = x.get_span()?;
                let index = numeric::to_i32(&key.get_integer()?)?;
                let byte = usize::try_from(index)
                    .ok()
                    .and_then(|i| bytes.get(i).copied())
                    .ok_or(VmError::IndexOutOfRange(index as i64))?;
                return self.push_integer(BigInt::from(byte));
            }
            other => return Err(VmError::invalid_type("compound or bytes", other.item_type())),
        };
        self.push(item)
    }

    fn set_item(&mut self) -> VmResult<()> {
        let value = self.pop()?;
        let value = self.detach_struct(value)?;
        let key = self.pop()?;
        let x = self.pop()?;
        match &x {
            StackItem::Array(array) => {
                let index = element_index(array, &key)?;
                array.set(index, value)
            }
            StackItem::Struct(item) => {
                let index = element_index(item, &key)?;
                item.set(index, value)
            }
            StackItem::Map(map) => map.insert(MapKey::try_from(&key)?, value),
            StackItem::Buffer(buffer) => {
                let index = numeric::to_i32(&key.get_integer()?)?;
                let index = usize::try_from(index)
                    .ok()
                    .filter(|i| *i < buffer.len())
                    .ok_or(VmError::IndexOutOfRange(index as i64))?;
                if !value.is_primitive() {
                    return Err(VmError::InvalidOperation(format!(
                        "only primitive values can be stored in a buffer, found {}",
                        value.item_type()
                    )));
                }
                let byte = value.get_integer()?;
                if byte < BigInt::from(i8::MIN) || byte > BigInt::from(u8::MAX) {
                    return Err(VmError::IntegerOverflow(byte.to_string()));
                }
                let byte = numeric::to_i32(&byte)? as u8;
                buffer.set(index, byte);
                Ok(())
            }
            other => Err(VmError::invalid_type("compound or Buffer", other.item_type())),
        }
    }
}

/// Index of an existing element, or a catchable range error
fn element_index(array: &Array, key: &StackItem) -> VmResult<usize> {
    let index = numeric::to_i32(&key.get_integer()?)?;
    usize::try_from(index)
        .ok()
        .filter(|i| *i < array.len())
        .ok_or(VmError::IndexOutOfRange(index as i64))
}

fn element_at(array: &Array, key: &StackItem) -> VmResult<StackItem> {
    let index = element_index(array, key)?;
    array.get(index).ok_or(VmError::IndexOutOfRange(index as i64))
}

fn remove_at(array: &Array, key: &StackItem) -> VmResult<()> {
    let index = numeric::to_i32(&key.get_integer()?)?;
    match usize::try_from(index) {
        Ok(i) if i < array.len() => {
            array.remove(i);
            Ok(())
        }
        _ => Err(VmError::OutOfRange(index as i64)),
    }
}
