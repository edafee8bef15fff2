//! Execution contexts
//!
//! One [`ExecutionContext`] is created per loaded script and per `CALL`.
//! Contexts created by `CALL`, `CALL_L` and `CALLA` share the script, the
//! evaluation stack, the static fields and the host states of their caller.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use bytecode_system::{Instruction, Script};
use core_types::{ReferenceCounter, StackItem, VmError, VmResult};

use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::ExceptionHandlingContext;
use crate::slot::Slot;

/// Which slot of a context a load or store addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Static fields, shared by contexts of the same script
    Static,
    /// Local variables
    Local,
    /// Arguments
    Argument,
}

struct SharedStates {
    script: Script,
    evaluation_stack: Rc<RefCell<EvaluationStack>>,
    static_fields: RefCell<Option<Slot>>,
    states: RefCell<HashMap<TypeId, Box<dyn Any>>>,
}

/// Activation record of a running script
pub struct ExecutionContext {
    shared: Rc<SharedStates>,
    instruction_pointer: usize,
    rv_count: i32,
    local_variables: Option<Slot>,
    arguments: Option<Slot>,
    try_stack: Option<Vec<ExceptionHandlingContext>>,
    reference_counter: ReferenceCounter,
}

impl ExecutionContext {
    /// Fresh context with its own evaluation stack and static fields
    ///
    /// `rv_count` is the number of items the context must leave on its stack
    /// when it returns; -1 accepts any number.
    pub fn new(script: Script, rv_count: i32, reference_counter: ReferenceCounter) -> Self {
        Self {
            shared: Rc::new(SharedStates {
                script,
                evaluation_stack: Rc::new(RefCell::new(EvaluationStack::new(
                    reference_counter.clone(),
                ))),
                static_fields: RefCell::new(None),
                states: RefCell::new(HashMap::new()),
            }),
            instruction_pointer: 0,
            rv_count,
            local_variables: None,
            arguments: None,
            try_stack: None,
            reference_counter,
        }
    }

    /// Context sharing this one's script, stack, statics and states,
    /// starting at `position` and returning nothing
    pub fn clone_at(&self, position: usize) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            instruction_pointer: position,
            rv_count: 0,
            local_variables: None,
            arguments: None,
            try_stack: None,
            reference_counter: self.reference_counter.clone(),
        }
    }

    /// The script being executed
    pub fn script(&self) -> &Script {
        &self.shared.script
    }

    /// Offset of the current instruction
    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// Move the instruction pointer
    pub fn set_instruction_pointer(&mut self, position: usize) {
        self.instruction_pointer = position;
    }

    pub(crate) fn move_next(&mut self, size: usize) {
        self.instruction_pointer += size;
    }

    /// Number of items expected on return, or -1
    pub fn rv_count(&self) -> i32 {
        self.rv_count
    }

    /// The instruction at the instruction pointer
    ///
    /// Past the end of the script this is a synthetic `RET`.
    pub fn current_instruction(&self) -> VmResult<Arc<Instruction>> {
        Ok(self.shared.script.get_instruction(self.instruction_pointer)?)
    }

    /// The instruction following the current one
    pub fn next_instruction(&self) -> VmResult<Arc<Instruction>> {
        let current = self.current_instruction()?;
        Ok(self
            .shared
            .script
            .get_instruction(self.instruction_pointer + current.size())?)
    }

    /// Borrow the evaluation stack
    pub fn evaluation_stack(&self) -> Ref<'_, EvaluationStack> {
        self.shared.evaluation_stack.borrow()
    }

    /// Mutably borrow the evaluation stack
    pub fn evaluation_stack_mut(&self) -> RefMut<'_, EvaluationStack> {
        self.shared.evaluation_stack.borrow_mut()
    }

    pub(crate) fn evaluation_stack_handle(&self) -> &Rc<RefCell<EvaluationStack>> {
        &self.shared.evaluation_stack
    }

    /// Borrow the static fields
    pub fn static_fields(&self) -> Ref<'_, Option<Slot>> {
        self.shared.static_fields.borrow()
    }

    /// Local variables, once `INITSLOT` has run
    pub fn local_variables(&self) -> Option<&Slot> {
        self.local_variables.as_ref()
    }

    /// Arguments, once `INITSLOT` has run
    pub fn arguments(&self) -> Option<&Slot> {
        self.arguments.as_ref()
    }

    /// Active try regions, innermost last
    pub fn try_stack(&self) -> &[ExceptionHandlingContext] {
        self.try_stack.as_deref().unwrap_or(&[])
    }

    /// The try stack, if a TRY has ever run in this context
    pub(crate) fn try_stack_mut(&mut self) -> Option<&mut Vec<ExceptionHandlingContext>> {
        self.try_stack.as_mut()
    }

    /// Push a try region
    ///
    /// The first region of a context is always accepted; later ones are
    /// bounded by `max_depth`.
    pub(crate) fn push_try(
        &mut self,
        region: ExceptionHandlingContext,
        max_depth: usize,
    ) -> VmResult<()> {
        let Some(stack) = self.try_stack.as_mut() else {
            self.try_stack = Some(vec![region]);
            return Ok(());
        };
        if stack.len() >= max_depth {
            return Err(VmError::TryNestingTooDeep(stack.len()));
        }
        stack.push(region);
        Ok(())
    }

    /// True if both contexts were cloned from one another
    pub fn shares_state_with(&self, other: &ExecutionContext) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Host state of type `T` attached to this context, created on first use
    ///
    /// Contexts cloned by `CALL` see the same value. `None` only if the
    /// state is already borrowed.
    pub fn state<T: Any + Default>(&self) -> Option<RefMut<'_, T>> {
        let states = self.shared.states.try_borrow_mut().ok()?;
        RefMut::filter_map(states, |states| {
            states
                .entry(TypeId::of::<T>())
                .or_insert_with(|| Box::new(T::default()) as Box<dyn Any>)
                .downcast_mut::<T>()
        })
        .ok()
    }

    pub(crate) fn init_static_fields(&self, count: usize) -> VmResult<()> {
        let mut statics = self.shared.static_fields.borrow_mut();
        if statics.is_some() {
            return Err(VmError::SlotAlreadyInitialized("INITSSLOT"));
        }
        *statics = Some(Slot::new(count, self.reference_counter.clone()));
        Ok(())
    }

    pub(crate) fn init_slots(&mut self, locals: usize, arguments: Vec<StackItem>) -> VmResult<()> {
        if self.local_variables.is_some() || self.arguments.is_some() {
            return Err(VmError::SlotAlreadyInitialized("INITSLOT"));
        }
        if locals > 0 {
            self.local_variables = Some(Slot::new(locals, self.reference_counter.clone()));
        }
        if !arguments.is_empty() {
            self.arguments = Some(Slot::with_items(arguments, self.reference_counter.clone()));
        }
        Ok(())
    }

    pub(crate) fn has_slots(&self) -> bool {
        self.local_variables.is_some() || self.arguments.is_some()
    }

    /// Read entry `index` of a slot
    pub fn load_slot(&self, kind: SlotKind, index: usize) -> VmResult<StackItem> {
        match kind {
            SlotKind::Static => self
                .shared
                .static_fields
                .borrow()
                .as_ref()
                .ok_or(VmError::SlotNotInitialized)?
                .get(index),
            SlotKind::Local => self
                .local_variables
                .as_ref()
                .ok_or(VmError::SlotNotInitialized)?
                .get(index),
            SlotKind::Argument => self
                .arguments
                .as_ref()
                .ok_or(VmError::SlotNotInitialized)?
                .get(index),
        }
    }

    /// Overwrite entry `index` of a slot
    pub fn store_slot(&mut self, kind: SlotKind, index: usize, item: StackItem) -> VmResult<()> {
        match kind {
            SlotKind::Static => self
                .shared
                .static_fields
                .borrow_mut()
                .as_mut()
                .ok_or(VmError::SlotNotInitialized)?
                .set(index, item),
            SlotKind::Local => self
                .local_variables
                .as_mut()
                .ok_or(VmError::SlotNotInitialized)?
                .set(index, item),
            SlotKind::Argument => self
                .arguments
                .as_mut()
                .ok_or(VmError::SlotNotInitialized)?
                .set(index, item),
        }
    }

    pub(crate) fn clear_static_references(&self) {
        if let Some(statics) = self.shared.static_fields.borrow_mut().as_mut() {
            statics.clear_references();
        }
    }

    pub(crate) fn clear_slot_references(&mut self) {
        if let Some(locals) = self.local_variables.as_mut() {
            locals.clear_references();
        }
        if let Some(arguments) = self.arguments.as_mut() {
            arguments.clear_references();
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("script", &self.shared.script)
            .field("instruction_pointer", &self.instruction_pointer)
            .field("rv_count", &self.rv_count)
            .field("stack_depth", &self.shared.evaluation_stack.borrow().len())
            .field("try_depth", &self.try_stack().len())
            .finish()
    }
}
