//! Contract tests verifying the interpreter API.
//!
//! These pin down what a host can rely on: states, hooks, result stack and
//! fault reporting.

use std::cell::RefCell;
use std::rc::Rc;

use bytecode_system::{Instruction, Opcode, Script, ScriptBuilder};
use core_types::{ExecutionEngineLimits, StackItem, VmError, VmResult};
use interpreter::{ExecutionContext, ExecutionEngine, InteropHost, SlotKind, VMState};
use num_bigint::BigInt;

#[derive(Default)]
struct Observed {
    transitions: Vec<(VMState, VMState)>,
    instructions: usize,
}

struct TestHost {
    observed: Rc<RefCell<Observed>>,
    token_script: Script,
    step_budget: Option<usize>,
}

impl TestHost {
    fn new() -> (Self, Rc<RefCell<Observed>>) {
        let observed = Rc::new(RefCell::new(Observed::default()));
        let mut sb = ScriptBuilder::new();
        sb.emit(Opcode::Push5);
        let host = Self {
            observed: Rc::clone(&observed),
            token_script: sb.to_script(),
            step_budget: None,
        };
        (host, observed)
    }
}

impl InteropHost for TestHost {
    fn on_syscall(&mut self, engine: &mut ExecutionEngine, method: u32) -> VmResult<()> {
        match method {
            1 => engine.push_integer(BigInt::from(42)),
            2 => {
                let x = engine.pop_integer()?;
                engine.push_integer(x * 2)
            }
            _ => Err(VmError::SyscallNotFound(method)),
        }
    }

    fn load_token(&mut self, engine: &mut ExecutionEngine, token: u16) -> VmResult<ExecutionContext> {
        if token != 0 {
            return Err(VmError::TokenNotFound(token));
        }
        Ok(engine.create_context(self.token_script.clone(), 1, 0))
    }

    fn on_state_changed(&mut self, from: VMState, to: VMState) {
        self.observed.borrow_mut().transitions.push((from, to));
    }

    fn pre_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        let mut observed = self.observed.borrow_mut();
        observed.instructions += 1;
        match self.step_budget {
            Some(budget) if observed.instructions > budget => {
                Err(VmError::Host("step budget exhausted".into()))
            }
            _ => Ok(()),
        }
    }
}

fn engine_with(sb: &ScriptBuilder) -> ExecutionEngine {
    let mut engine = ExecutionEngine::new();
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    engine
}

/// A new engine starts in BREAK with nothing loaded
#[test]
fn contract_new_engine_is_idle() {
    let engine = ExecutionEngine::new();
    assert_eq!(engine.state(), VMState::Break);
    assert!(engine.invocation_stack().is_empty());
    assert!(engine.result_stack().is_empty());
    assert!(engine.fault_error().is_none());
    assert_eq!(engine.limits(), &ExecutionEngineLimits::default());
}

/// load_script places the instruction pointer at the initial position
#[test]
fn contract_load_script_initial_position() {
    let mut engine = ExecutionEngine::new();
    let context = engine.load_script(Script::new(vec![0x11, 0x12]), -1, 1).unwrap();
    assert_eq!(context.instruction_pointer(), 1);
    assert_eq!(engine.execute(), VMState::Halt);
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(2)]);
}

/// The entry context is the first loaded, the current context the last
#[test]
fn contract_entry_and_current_context() {
    let mut engine = ExecutionEngine::new();
    let first = Script::new(vec![0x11]);
    let second = Script::new(vec![0x12]);
    engine.load_script(first.clone(), -1, 0).unwrap();
    engine.load_script(second.clone(), -1, 0).unwrap();
    assert!(engine.entry_context().unwrap().script().ptr_eq(&first));
    assert!(engine.current_context().unwrap().script().ptr_eq(&second));
}

/// Items of the entry context land on the result stack in push order
#[test]
fn contract_result_stack_order() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1).emit(Opcode::Push2).emit(Opcode::Push3).emit(Opcode::Ret);
    let mut engine = engine_with(&sb);
    assert_eq!(engine.execute(), VMState::Halt);
    let result = engine.result_stack();
    assert_eq!(result.peek(0).unwrap(), StackItem::from(3));
    assert_eq!(result.peek(2).unwrap(), StackItem::from(1));
}

/// Host syscalls see the engine's stack helpers
#[test]
fn contract_syscall_reaches_host() {
    let (host, _) = TestHost::new();
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    let mut sb = ScriptBuilder::new();
    sb.emit_syscall(1).emit_syscall(2);
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(84)]);
}

/// Unknown syscalls fault with the host's error
#[test]
fn contract_unknown_syscall_is_fatal() {
    let (host, _) = TestHost::new();
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    let mut sb = ScriptBuilder::new();
    sb.emit_syscall(9);
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    assert_eq!(engine.fault_error(), Some(&VmError::SyscallNotFound(9)));
}

/// CALLT loads the context resolved by the host
#[test]
fn contract_callt_loads_host_context() {
    let (host, _) = TestHost::new();
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    let mut sb = ScriptBuilder::new();
    sb.emit_with_operand(Opcode::CallT, &0u16.to_le_bytes())
        .emit(Opcode::Push1)
        .emit(Opcode::Add);
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(6)]);
}

/// State changes are reported to the host in order
#[test]
fn contract_state_changes_notify_host() {
    let (host, observed) = TestHost::new();
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    engine.load_script(Script::new(vec![0x11]), -1, 0).unwrap();
    engine.execute();
    assert_eq!(
        observed.borrow().transitions,
        vec![(VMState::Break, VMState::None), (VMState::None, VMState::Halt)]
    );
}

/// A failing pre-instruction hook faults the engine
#[test]
fn contract_pre_hook_can_bound_steps() {
    let (mut host, observed) = TestHost::new();
    host.step_budget = Some(10);
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    // an endless loop: 0: NOP, 1: JMP -1
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Nop).emit_jump(Opcode::Jmp, -1);
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    assert_eq!(observed.borrow().instructions, 11);
    assert_eq!(
        engine.fault_error(),
        Some(&VmError::Host("step budget exhausted".into()))
    );
}

/// Faults leave no contexts behind and report the faulting position
#[test]
fn contract_fault_unwinds_invocation_stack() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1).emit(Opcode::Push2).emit(Opcode::Abort);
    let mut engine = engine_with(&sb);
    assert_eq!(engine.execute(), VMState::Fault);
    assert!(engine.invocation_stack().is_empty());
    assert_eq!(engine.fault_position(), Some(2));
    assert_eq!(engine.fault_error(), Some(&VmError::Abort));
}

/// A thrown item that nobody catches stays available after the fault
#[test]
fn contract_uncaught_exception_is_kept() {
    let mut sb = ScriptBuilder::new();
    sb.emit_push_str("oops").emit(Opcode::Throw);
    let mut engine = engine_with(&sb);
    assert_eq!(engine.execute(), VMState::Fault);
    assert_eq!(engine.uncaught_exception(), Some(&StackItem::from("oops")));
    assert_eq!(
        engine.fault_error(),
        Some(&VmError::UnhandledException("oops".into()))
    );
}

/// Limits are fixed at construction
#[test]
fn contract_limits_are_enforced() {
    let limits = ExecutionEngineLimits {
        max_stack_size: 4,
        ..Default::default()
    };
    let mut engine = ExecutionEngine::with_limits(limits);
    let mut sb = ScriptBuilder::new();
    for _ in 0..5 {
        sb.emit(Opcode::Push1);
    }
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    assert_eq!(engine.fault_error(), Some(&VmError::StackOverflow(5)));
    assert_eq!(engine.limits().max_stack_size, 4);
}

/// Push then pop restores the reference count
#[test]
fn contract_push_pop_reference_count() {
    let mut engine = ExecutionEngine::new();
    engine.load_script(Script::new(vec![0x21]), -1, 0).unwrap();
    let before = engine.reference_counter().count();
    engine.push(StackItem::from(7)).unwrap();
    assert_eq!(engine.reference_counter().count(), before + 1);
    assert_eq!(engine.pop().unwrap(), StackItem::from(7));
    assert_eq!(engine.reference_counter().count(), before);
}

/// Host state attached to a context is created on first use
#[test]
fn contract_context_state_defaults() {
    #[derive(Default)]
    struct Gas(u64);

    let mut engine = ExecutionEngine::new();
    let context = engine.load_script(Script::new(vec![0x21]), -1, 0).unwrap();
    assert_eq!(context.state::<Gas>().unwrap().0, 0);
    context.state::<Gas>().unwrap().0 = 30;
    assert_eq!(engine.current_context().unwrap().state::<Gas>().unwrap().0, 30);
}

/// Slots are reachable through the context API
#[test]
fn contract_slots_readable_from_host() {
    let mut sb = ScriptBuilder::new();
    sb.emit_with_operand(Opcode::InitSSlot, &[2])
        .emit(Opcode::Push4)
        .emit(Opcode::StSFld1)
        .emit(Opcode::Nop);
    let mut engine = engine_with(&sb);
    for _ in 0..3 {
        engine.execute_next();
    }
    let context = engine.current_context().unwrap();
    assert_eq!(context.load_slot(SlotKind::Static, 1).unwrap(), StackItem::from(4));
    assert_eq!(context.static_fields().as_ref().unwrap().len(), 2);
}

/// dispose drops every context without running finally blocks
#[test]
fn contract_dispose_is_abrupt() {
    let mut sb = ScriptBuilder::new();
    // TRY with only a finally block at +10
    sb.emit_try(0, 10).emit(Opcode::Push1);
    let mut engine = engine_with(&sb);
    engine.execute_next();
    engine.dispose();
    assert!(engine.invocation_stack().is_empty());
    assert!(engine.result_stack().is_empty());
}

/// Catching can be switched off through the limits
#[test]
fn contract_catch_engine_exceptions_off() {
    let limits = ExecutionEngineLimits {
        catch_engine_exceptions: false,
        ..Default::default()
    };
    let mut engine = ExecutionEngine::with_limits(limits);
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::NewMap).emit(Opcode::Push1).emit(Opcode::PickItem);
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    assert_eq!(engine.fault_error(), Some(&VmError::KeyNotFound));
}

/// Limits deserialize with defaults for missing fields
#[test]
fn contract_limits_from_json() {
    let limits: ExecutionEngineLimits =
        serde_json::from_str(r#"{ "max_stack_size": 16 }"#).unwrap();
    let engine = ExecutionEngine::with_limits(limits);
    assert_eq!(engine.limits().max_stack_size, 16);
    assert_eq!(engine.limits().max_shift, 256);
}
