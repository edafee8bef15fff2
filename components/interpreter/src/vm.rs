//! Execution engine
//!
//! [`ExecutionEngine`] owns the invocation stack and runs the
//! fetch-execute loop one instruction at a time. Instruction handlers live in
//! [`crate::dispatch`]; this module holds the loop, calls and returns, the
//! try/catch/finally state machine and the stack helpers hosts use from
//! syscalls.
//!
//! Errors come in two tiers. A catchable [`VmError`] is thrown into the
//! script as a byte string when the limits allow it; anything else moves the
//! engine to [`VMState::Fault`].
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Opcode, ScriptBuilder};
//! use core_types::StackItem;
//! use interpreter::{ExecutionEngine, VMState};
//!
//! let mut sb = ScriptBuilder::new();
//! sb.emit(Opcode::Push1).emit(Opcode::Push2).emit(Opcode::Add);
//!
//! let mut engine = ExecutionEngine::new();
//! engine.load_script(sb.to_script(), -1, 0).unwrap();
//! assert_eq!(engine.execute(), VMState::Halt);
//! assert_eq!(engine.result_stack().peek(0).unwrap(), StackItem::from(3));
//! ```

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use bytecode_system::{Instruction, Script};
use core_types::{ExecutionEngineLimits, ReferenceCounter, StackItem, VmError, VmResult};
use memory_manager::ObjectFactory;
use num_bigint::BigInt;

use crate::context::ExecutionContext;
use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::ExceptionHandlingState;
use crate::host::InteropHost;
use crate::numeric;

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VMState {
    /// Running
    None,
    /// Finished normally
    Halt,
    /// Stopped by an error
    Fault,
    /// Paused, waiting to be resumed
    Break,
}

impl fmt::Display for VMState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VMState::None => "NONE",
            VMState::Halt => "HALT",
            VMState::Fault => "FAULT",
            VMState::Break => "BREAK",
        };
        f.write_str(name)
    }
}

/// Stack-based script interpreter
///
/// An engine is single-threaded. Scripts may be shared between engines.
pub struct ExecutionEngine {
    state: VMState,
    pub(crate) is_jumping: bool,
    limits: ExecutionEngineLimits,
    reference_counter: ReferenceCounter,
    pub(crate) invocation_stack: Vec<ExecutionContext>,
    result_stack: Rc<RefCell<EvaluationStack>>,
    uncaught_exception: Option<StackItem>,
    fault_error: Option<VmError>,
    fault_position: Option<usize>,
    pub(crate) factory: ObjectFactory,
    host: Option<Box<dyn InteropHost>>,
}

impl ExecutionEngine {
    /// Engine with default limits and no host
    pub fn new() -> Self {
        Self::with_limits(ExecutionEngineLimits::default())
    }

    /// Engine with the given limits and no host
    pub fn with_limits(limits: ExecutionEngineLimits) -> Self {
        let reference_counter = ReferenceCounter::new();
        Self {
            state: VMState::Break,
            is_jumping: false,
            limits,
            result_stack: Rc::new(RefCell::new(EvaluationStack::new(
                reference_counter.clone(),
            ))),
            reference_counter,
            invocation_stack: Vec::new(),
            uncaught_exception: None,
            fault_error: None,
            fault_position: None,
            factory: ObjectFactory::new(&limits),
            host: None,
        }
    }

    /// Engine with the given limits, dispatching syscalls and tokens to `host`
    pub fn with_host(limits: ExecutionEngineLimits, host: Box<dyn InteropHost>) -> Self {
        let mut engine = Self::with_limits(limits);
        engine.host = Some(host);
        engine
    }

    /// Current state
    pub fn state(&self) -> VMState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: VMState) {
        if self.state == state {
            return;
        }
        let from = std::mem::replace(&mut self.state, state);
        tracing::debug!(target: "vm::engine", %from, to = %state, "state changed");
        if let Some(host) = self.host.as_mut() {
            host.on_state_changed(from, state);
        }
    }

    /// Limits fixed at construction
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// The reference counter shared by every stack and slot of this engine
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// Active contexts, entry first
    pub fn invocation_stack(&self) -> &[ExecutionContext] {
        &self.invocation_stack
    }

    /// The innermost context
    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.last()
    }

    /// Mutable access to the innermost context
    pub fn current_context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.invocation_stack.last_mut()
    }

    /// The context loaded first
    pub fn entry_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.first()
    }

    /// Items returned by the entry context
    pub fn result_stack(&self) -> Ref<'_, EvaluationStack> {
        self.result_stack.borrow()
    }

    /// The thrown item that is still propagating, or that faulted the engine
    pub fn uncaught_exception(&self) -> Option<&StackItem> {
        self.uncaught_exception.as_ref()
    }

    /// The error that faulted the engine
    pub fn fault_error(&self) -> Option<&VmError> {
        self.fault_error.as_ref()
    }

    /// Instruction pointer of the innermost context when the fault occurred
    pub fn fault_position(&self) -> Option<usize> {
        self.fault_position
    }

    /// Pool occupancy of the engine's object factory
    pub fn pool_stats(&self) -> memory_manager::PoolStats {
        self.factory.stats()
    }

    pub(crate) fn context(&self) -> VmResult<&ExecutionContext> {
        self.invocation_stack
            .last()
            .ok_or_else(|| VmError::InvalidOperation("no current context".into()))
    }

    pub(crate) fn context_mut(&mut self) -> VmResult<&mut ExecutionContext> {
        self.invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::InvalidOperation("no current context".into()))
    }

    /// Context for `script` that is not loaded yet
    pub fn create_context(
        &self,
        script: Script,
        rv_count: i32,
        initial_position: usize,
    ) -> ExecutionContext {
        let mut context = ExecutionContext::new(script, rv_count, self.reference_counter.clone());
        context.set_instruction_pointer(initial_position);
        context
    }

    /// Push `context` onto the invocation stack
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size as usize {
            return Err(VmError::InvocationStackOverflow(self.invocation_stack.len()));
        }
        self.invocation_stack.push(context);
        tracing::debug!(target: "vm::engine", depth = self.invocation_stack.len(), "context loaded");
        Ok(())
    }

    /// Create a context for `script` and load it
    pub fn load_script(
        &mut self,
        script: Script,
        rv_count: i32,
        initial_position: usize,
    ) -> VmResult<&mut ExecutionContext> {
        let context = self.create_context(script, rv_count, initial_position);
        self.load_context(context)?;
        self.context_mut()
    }

    pub(crate) fn context_unloaded(&mut self, mut context: ExecutionContext) {
        let shares_statics = self
            .invocation_stack
            .last()
            .map_or(false, |current| current.shares_state_with(&context));
        if !shares_statics {
            context.clear_static_references();
        }
        context.clear_slot_references();
        tracing::debug!(target: "vm::engine", depth = self.invocation_stack.len(), "context unloaded");
    }

    fn unload_all(&mut self) {
        while let Some(context) = self.invocation_stack.pop() {
            self.context_unloaded(context);
        }
    }

    /// Drop every context without running pending finally blocks
    pub fn dispose(&mut self) {
        self.unload_all();
    }

    /// Run until the engine halts or faults
    pub fn execute(&mut self) -> VMState {
        if self.state == VMState::Break {
            self.set_state(VMState::None);
        }
        while self.state != VMState::Halt && self.state != VMState::Fault {
            self.execute_next();
        }
        self.state
    }

    /// Execute one instruction
    ///
    /// Halts if no context is left.
    pub fn execute_next(&mut self) {
        if self.invocation_stack.is_empty() {
            self.set_state(VMState::Halt);
            return;
        }
        if let Err(error) = self.step() {
            self.on_fault(error);
        }
    }

    fn step(&mut self) -> VmResult<()> {
        self.is_jumping = false;
        let index = self.invocation_stack.len() - 1;
        let (instruction, ip) = {
            let context = self.context()?;
            (context.current_instruction()?, context.instruction_pointer())
        };
        tracing::trace!(target: "vm::engine", ip, opcode = %instruction.opcode(), "execute");

        self.pre_execute_instruction(&instruction)?;
        match self.execute_instruction(&instruction) {
            Err(error) if error.is_catchable() && self.limits.catch_engine_exceptions => {
                let message = self.factory.byte_string(error.to_string().as_bytes());
                self.execute_throw(message)?;
            }
            result => result?,
        }
        self.post_execute_instruction(&instruction)?;

        if !self.is_jumping {
            if let Some(context) = self.invocation_stack.get_mut(index) {
                context.move_next(instruction.size());
            }
        }
        self.is_jumping = false;
        Ok(())
    }

    fn pre_execute_instruction(&mut self, instruction: &Instruction) -> VmResult<()> {
        match self.host.take() {
            Some(mut host) => {
                let result = host.pre_execute_instruction(self, instruction);
                self.host = Some(host);
                result
            }
            None => Ok(()),
        }
    }

    fn post_execute_instruction(&mut self, instruction: &Instruction) -> VmResult<()> {
        let references = self.reference_counter.check_zero_referred();
        if references > self.limits.max_stack_size as usize {
            return Err(VmError::StackOverflow(references));
        }
        match self.host.take() {
            Some(mut host) => {
                let result = host.post_execute_instruction(self, instruction);
                self.host = Some(host);
                result
            }
            None => Ok(()),
        }
    }

    fn on_fault(&mut self, error: VmError) {
        let position = self.current_context().map(ExecutionContext::instruction_pointer);
        tracing::warn!(target: "vm::engine", %error, ip = ?position, "execution faulted");
        self.fault_error = Some(error);
        self.fault_position = position;
        self.unload_all();
        self.set_state(VMState::Fault);
    }

    pub(crate) fn on_syscall(&mut self, method: u32) -> VmResult<()> {
        match self.host.take() {
            Some(mut host) => {
                let result = host.on_syscall(self, method);
                self.host = Some(host);
                result
            }
            None => Err(VmError::SyscallNotFound(method)),
        }
    }

    pub(crate) fn load_token(&mut self, token: u16) -> VmResult<()> {
        let context = match self.host.take() {
            Some(mut host) => {
                let result = host.load_token(self, token);
                self.host = Some(host);
                result?
            }
            None => return Err(VmError::TokenNotFound(token)),
        };
        self.load_context(context)
    }

    // Control flow

    fn resolve(&self, offset: i32) -> VmResult<i64> {
        Ok(self.context()?.instruction_pointer() as i64 + offset as i64)
    }

    pub(crate) fn execute_jump(&mut self, position: i64) -> VmResult<()> {
        let context = self.context_mut()?;
        if position < 0 || position >= context.script().len() as i64 {
            return Err(VmError::InvalidJump(position));
        }
        context.set_instruction_pointer(position as usize);
        self.is_jumping = true;
        Ok(())
    }

    pub(crate) fn execute_jump_offset(&mut self, offset: i32) -> VmResult<()> {
        let position = self.resolve(offset)?;
        self.execute_jump(position)
    }

    pub(crate) fn execute_call(&mut self, position: i64) -> VmResult<()> {
        let current = self.context()?;
        if position < 0 || position >= current.script().len() as i64 {
            return Err(VmError::InvalidJump(position));
        }
        let context = current.clone_at(position as usize);
        self.load_context(context)
    }

    pub(crate) fn execute_call_offset(&mut self, offset: i32) -> VmResult<()> {
        let position = self.resolve(offset)?;
        self.execute_call(position)
    }

    pub(crate) fn execute_ret(&mut self) -> VmResult<()> {
        let popped = self
            .invocation_stack
            .pop()
            .ok_or_else(|| VmError::InvalidOperation("no current context".into()))?;
        let destination = match self.invocation_stack.last() {
            Some(caller) => Rc::clone(caller.evaluation_stack_handle()),
            None => Rc::clone(&self.result_stack),
        };
        if !Rc::ptr_eq(popped.evaluation_stack_handle(), &destination) {
            let found = popped.evaluation_stack().len();
            if popped.rv_count() >= 0 && found != popped.rv_count() as usize {
                let expected = popped.rv_count();
                self.context_unloaded(popped);
                return Err(VmError::ReturnCountMismatch { expected, found });
            }
            popped
                .evaluation_stack_mut()
                .move_to(&mut destination.borrow_mut());
        }
        if self.invocation_stack.is_empty() {
            self.set_state(VMState::Halt);
        }
        self.context_unloaded(popped);
        self.is_jumping = true;
        Ok(())
    }

    // Exceptions

    pub(crate) fn execute_try(&mut self, catch_offset: i32, finally_offset: i32) -> VmResult<()> {
        if catch_offset == 0 && finally_offset == 0 {
            return Err(VmError::InvalidTryOffsets);
        }
        let max_depth = self.limits.max_try_nesting_depth as usize;
        let context = self.context_mut()?;
        let ip = context.instruction_pointer() as i64;
        let pointer = |offset: i32| if offset == 0 { -1 } else { ip + offset as i64 };
        let region = crate::exception_handling::ExceptionHandlingContext::new(
            pointer(catch_offset),
            pointer(finally_offset),
        );
        context.push_try(region, max_depth)
    }

    pub(crate) fn execute_end_try(&mut self, end_offset: i32) -> VmResult<()> {
        let context = self.context_mut()?;
        let end_pointer = context.instruction_pointer() as i64 + end_offset as i64;
        let current = context
            .try_stack_mut()
            .and_then(|stack| stack.last_mut())
            .ok_or(VmError::TryBlockNotFound)?;
        if current.state() == ExceptionHandlingState::Finally {
            return Err(VmError::EndTryInFinally);
        }
        let target = if current.has_finally() {
            current.set_state(ExceptionHandlingState::Finally);
            current.set_end_pointer(end_pointer);
            current.finally_pointer()
        } else {
            if let Some(stack) = context.try_stack_mut() {
                stack.pop();
            }
            end_pointer
        };
        context.set_instruction_pointer(to_position(target)?);
        self.is_jumping = true;
        Ok(())
    }

    pub(crate) fn execute_end_finally(&mut self) -> VmResult<()> {
        let context = self.context_mut()?;
        let current = context
            .try_stack_mut()
            .and_then(|stack| stack.pop())
            .ok_or(VmError::TryBlockNotFound)?;
        if self.uncaught_exception.is_none() {
            let position = to_position(current.end_pointer())?;
            self.context_mut()?.set_instruction_pointer(position);
        } else {
            self.handle_exception()?;
        }
        self.is_jumping = true;
        Ok(())
    }

    /// Throw `exception` into the running script
    pub fn execute_throw(&mut self, exception: StackItem) -> VmResult<()> {
        self.uncaught_exception = Some(exception);
        self.handle_exception()
    }

    fn handle_exception(&mut self) -> VmResult<()> {
        let mut handler = None;
        for depth in (0..self.invocation_stack.len()).rev() {
            let Some(try_stack) = self.invocation_stack[depth].try_stack_mut() else {
                continue;
            };
            while let Some(region) = try_stack.last() {
                if region.is_finished() {
                    try_stack.pop();
                    continue;
                }
                handler = Some(depth);
                break;
            }
            if handler.is_some() {
                break;
            }
        }

        let Some(depth) = handler else {
            let description = self
                .uncaught_exception
                .as_ref()
                .map(describe_exception)
                .unwrap_or_default();
            return Err(VmError::UnhandledException(description));
        };
        while self.invocation_stack.len() > depth + 1 {
            if let Some(context) = self.invocation_stack.pop() {
                self.context_unloaded(context);
            }
        }

        let context = self.context_mut()?;
        let region = context
            .try_stack_mut()
            .and_then(|stack| stack.last_mut())
            .ok_or(VmError::TryBlockNotFound)?;
        let catching = region.state() == ExceptionHandlingState::Try && region.has_catch();
        let target = if catching {
            region.set_state(ExceptionHandlingState::Catch);
            region.catch_pointer()
        } else {
            region.set_state(ExceptionHandlingState::Finally);
            region.finally_pointer()
        };
        context.set_instruction_pointer(to_position(target)?);
        if catching {
            tracing::debug!(target: "vm::engine", catch = target, "exception caught");
            if let Some(exception) = self.uncaught_exception.take() {
                self.push(exception)?;
            }
        } else {
            tracing::debug!(target: "vm::engine", finally = target, "exception entering finally");
        }
        self.is_jumping = true;
        Ok(())
    }

    // Stack helpers

    /// Push onto the current evaluation stack
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        self.context()?.evaluation_stack_mut().push(item);
        Ok(())
    }

    /// Pop from the current evaluation stack
    pub fn pop(&mut self) -> VmResult<StackItem> {
        self.context()?.evaluation_stack_mut().pop()
    }

    /// Item `index` positions below the top of the current evaluation stack
    pub fn peek(&self, index: usize) -> VmResult<StackItem> {
        self.context()?.evaluation_stack().peek(index)
    }

    /// Push a pooled integer
    pub fn push_integer(&mut self, value: BigInt) -> VmResult<()> {
        let item = self.factory.integer(value)?;
        self.push(item)
    }

    /// Push a pooled boolean
    pub fn push_boolean(&mut self, value: bool) -> VmResult<()> {
        let item = self.factory.boolean(value);
        self.push(item)
    }

    /// Push a pooled byte string
    pub fn push_bytes(&mut self, value: &[u8]) -> VmResult<()> {
        let item = self.factory.byte_string(value);
        self.push(item)
    }

    /// Pop an integer, recycling the popped item
    pub fn pop_integer(&mut self) -> VmResult<BigInt> {
        let item = self.pop()?;
        let value = item.get_integer();
        self.factory.recycle(item);
        value
    }

    /// Pop a boolean, recycling the popped item
    pub fn pop_boolean(&mut self) -> VmResult<bool> {
        let item = self.pop()?;
        let value = item.get_boolean();
        self.factory.recycle(item);
        value
    }

    pub(crate) fn pop_i32(&mut self) -> VmResult<i32> {
        numeric::to_i32(&self.pop_integer()?)
    }

    pub(crate) fn pop_bytes(&mut self) -> VmResult<Vec<u8>> {
        let item = self.pop()?;
        let bytes = item.get_span().map(|span| span.into_owned());
        self.factory.recycle(item);
        bytes
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("state", &self.state)
            .field("invocation_depth", &self.invocation_stack.len())
            .field("result_stack", &self.result_stack.borrow())
            .field("references", &self.reference_counter.count())
            .field("fault_error", &self.fault_error)
            .field("has_host", &self.host.is_some())
            .finish()
    }
}

fn to_position(pointer: i64) -> VmResult<usize> {
    usize::try_from(pointer).map_err(|_| VmError::InvalidJump(pointer))
}

fn describe_exception(item: &StackItem) -> String {
    if item.is_primitive() {
        if let Ok(text) = item.get_string() {
            return text;
        }
    }
    item.item_type().to_string()
}
