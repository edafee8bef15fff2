//! Integration tests for the interpreter
//!
//! Whole scripts run end to end: calls, exceptions across frames, the
//! reference limit, debugger stepping and a host serving syscalls.

use std::cell::RefCell;
use std::rc::Rc;

use bytecode_system::{Opcode, Script, ScriptBuilder};
use core_types::{ExecutionEngineLimits, StackItem, VmError, VmResult};
use interpreter::{Debugger, ExecutionEngine, InteropHost, VMState};
use proptest::prelude::*;

fn run_with(limits: ExecutionEngineLimits, script: Script) -> ExecutionEngine {
    let mut engine = ExecutionEngine::with_limits(limits);
    engine.load_script(script, -1, 0).unwrap();
    engine.execute();
    engine
}

fn run(sb: &ScriptBuilder) -> ExecutionEngine {
    run_with(ExecutionEngineLimits::default(), sb.to_script())
}

fn halted(sb: &ScriptBuilder) -> Vec<StackItem> {
    let engine = run(sb);
    assert_eq!(engine.state(), VMState::Halt, "fault: {:?}", engine.fault_error());
    let items = engine.result_stack().to_vec();
    items
}

// ============================================================================
// Basic execution
// ============================================================================

#[test]
fn test_add_and_return() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1).emit(Opcode::Push2).emit(Opcode::Add).emit(Opcode::Ret);
    assert_eq!(halted(&sb), vec![StackItem::from(3)]);
}

#[test]
fn test_negative_array_size_faults() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::PushM1).emit(Opcode::NewArray).emit(Opcode::Ret);
    let engine = run(&sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert_eq!(engine.fault_error(), Some(&VmError::OutOfRange(-1)));
}

#[test]
fn test_abort_in_callee_clears_invocation_stack() {
    // 0: CALL_L +6, 5: RET, 6: ABORT
    let mut sb = ScriptBuilder::new();
    sb.emit_call(6).emit(Opcode::Ret).emit(Opcode::Abort);
    let engine = run(&sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert!(engine.invocation_stack().is_empty());
    assert_eq!(engine.fault_position(), Some(6));
}

#[test]
fn test_call_shares_evaluation_stack() {
    // 0: PUSH2, 1: CALL_L +6, 6: RET, 7: PUSH3 ADD RET
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push2)
        .emit_call(6)
        .emit(Opcode::Ret)
        .emit(Opcode::Push3)
        .emit(Opcode::Add)
        .emit(Opcode::Ret);
    assert_eq!(halted(&sb), vec![StackItem::from(5)]);
}

#[test]
fn test_loop_with_counter() {
    // sum = 0; for i in (1..=10).rev() { sum += i }
    let mut sb = ScriptBuilder::new();
    sb.emit_with_operand(Opcode::InitSlot, &[2, 0]) // 0
        .emit(Opcode::Push0) // 3
        .emit(Opcode::StLoc0) // 4
        .emit(Opcode::Push10) // 5
        .emit(Opcode::StLoc1) // 6
        .emit(Opcode::LdLoc0) // 7
        .emit(Opcode::LdLoc1) // 8
        .emit(Opcode::Add) // 9
        .emit(Opcode::StLoc0) // 10
        .emit(Opcode::LdLoc1) // 11
        .emit(Opcode::Dec) // 12
        .emit(Opcode::Dup) // 13
        .emit(Opcode::StLoc1) // 14
        .emit_jump(Opcode::JmpIf, -8) // 15 -> 7
        .emit(Opcode::LdLoc0);
    assert_eq!(halted(&sb), vec![StackItem::from(55)]);
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_try_catch_finally_counters() {
    let mut sb = ScriptBuilder::new();
    sb.emit_with_operand(Opcode::InitSSlot, &[2]) // 0
        .emit(Opcode::Push0) // 2
        .emit(Opcode::StSFld0) // 3
        .emit(Opcode::Push0) // 4
        .emit(Opcode::StSFld1) // 5
        .emit_try(11, 17) // 6: catch 17, finally 23
        .emit(Opcode::Push1) // 15
        .emit(Opcode::Throw) // 16
        .emit(Opcode::Drop) // 17: catch
        .emit(Opcode::LdSFld0) // 18
        .emit(Opcode::Inc) // 19
        .emit(Opcode::StSFld0) // 20
        .emit_jump(Opcode::EndTry, 6) // 21 -> 27
        .emit(Opcode::LdSFld1) // 23: finally
        .emit(Opcode::Inc) // 24
        .emit(Opcode::StSFld1) // 25
        .emit(Opcode::EndFinally) // 26
        .emit(Opcode::LdSFld0) // 27
        .emit(Opcode::LdSFld1) // 28
        .emit(Opcode::Ret);
    assert_eq!(halted(&sb), vec![StackItem::from(1), StackItem::from(1)]);
}

#[test]
fn test_finally_runs_without_exception() {
    let mut sb = ScriptBuilder::new();
    sb.emit_try(0, 13) // 0: finally 13
        .emit(Opcode::Push1) // 9
        .emit_jump(Opcode::EndTry, 6) // 10 -> 16
        .emit(Opcode::Nop) // 12
        .emit(Opcode::Push2) // 13: finally
        .emit(Opcode::EndFinally) // 14
        .emit(Opcode::Nop) // 15
        .emit(Opcode::Push3); // 16
    assert_eq!(
        halted(&sb),
        vec![StackItem::from(1), StackItem::from(2), StackItem::from(3)]
    );
}

#[test]
fn test_end_finally_rethrows_to_outer_catch() {
    let mut sb = ScriptBuilder::new();
    sb.emit_try(22, 0) // 0: outer, catch 22
        .emit_try(0, 11) // 9: inner, finally 20
        .emit(Opcode::Push3) // 18
        .emit(Opcode::Throw) // 19
        .emit(Opcode::Push5) // 20: inner finally
        .emit(Opcode::EndFinally) // 21
        .emit_jump(Opcode::EndTry, 2) // 22: outer catch -> 24
        .emit(Opcode::Ret); // 24
    assert_eq!(halted(&sb), vec![StackItem::from(5), StackItem::from(3)]);
}

#[test]
fn test_exception_unwinds_call_frames() {
    let mut sb = ScriptBuilder::new();
    sb.emit_try(16, 0) // 0: catch 16
        .emit_call(12) // 9 -> 21
        .emit_jump(Opcode::EndTry, 6) // 14 -> 20
        .emit(Opcode::Drop) // 16: catch
        .emit(Opcode::Push9) // 17
        .emit_jump(Opcode::EndTry, 2) // 18 -> 20
        .emit(Opcode::Ret) // 20
        .emit(Opcode::Push7) // 21: callee
        .emit(Opcode::Throw); // 22
    assert_eq!(halted(&sb), vec![StackItem::from(9)]);
}

#[test]
fn test_catchable_error_is_thrown_into_script() {
    let mut sb = ScriptBuilder::new();
    sb.emit_try(12, 0) // 0: catch 12
        .emit(Opcode::Push1) // 9
        .emit(Opcode::Push0) // 10
        .emit(Opcode::Div) // 11
        .emit_jump(Opcode::EndTry, 2) // 12 -> 14
        .emit(Opcode::Ret); // 14
    let result = halted(&sb);
    assert_eq!(result.last(), Some(&StackItem::from("division by zero")));
}

#[test]
fn test_fatal_error_ignores_handlers() {
    let mut sb = ScriptBuilder::new();
    sb.emit_try(10, 0) // 0: catch 10
        .emit(Opcode::Abort) // 9
        .emit(Opcode::Push1); // 10
    let engine = run(&sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert_eq!(engine.fault_error(), Some(&VmError::Abort));
}

#[test]
fn test_throw_in_catch_propagates() {
    let mut sb = ScriptBuilder::new();
    sb.emit_try(11, 0) // 0: catch 11
        .emit(Opcode::Push1) // 9
        .emit(Opcode::Throw) // 10
        .emit(Opcode::Push2) // 11: catch
        .emit(Opcode::Throw); // 12
    let engine = run(&sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert_eq!(engine.uncaught_exception(), Some(&StackItem::from(2)));
}

// ============================================================================
// Compound types and references
// ============================================================================

#[test]
fn test_allocation_loop_stays_under_stack_limit() {
    let limits = ExecutionEngineLimits {
        max_stack_size: 4,
        ..Default::default()
    };
    let mut sb = ScriptBuilder::new();
    sb.emit_push_int(100) // 0
        .emit(Opcode::NewArray0) // 2
        .emit(Opcode::Drop) // 3
        .emit(Opcode::Dec) // 4
        .emit(Opcode::Dup) // 5
        .emit_jump(Opcode::JmpIf, -4); // 6 -> 2
    let engine = run_with(limits, sb.to_script());
    assert_eq!(engine.state(), VMState::Halt, "fault: {:?}", engine.fault_error());
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(0)]);
}

#[test]
fn test_struct_in_array_is_a_copy() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1)
        .emit(Opcode::Push1)
        .emit(Opcode::PackStruct) // [s]
        .emit(Opcode::NewArray0) // [s, a]
        .emit(Opcode::Dup)
        .emit(Opcode::Push2)
        .emit(Opcode::Pick) // [s, a, a, s]
        .emit(Opcode::Append) // [s, a]
        .emit(Opcode::Over)
        .emit(Opcode::Push0)
        .emit(Opcode::Push9)
        .emit(Opcode::SetItem) // s[0] = 9
        .emit(Opcode::Push0)
        .emit(Opcode::PickItem)
        .emit(Opcode::Push0)
        .emit(Opcode::PickItem) // [s, a[0][0]]
        .emit(Opcode::Swap)
        .emit(Opcode::Push0)
        .emit(Opcode::PickItem);
    assert_eq!(halted(&sb), vec![StackItem::from(1), StackItem::from(9)]);
}

#[test]
fn test_pack_then_unpack_restores_order() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1)
        .emit(Opcode::Push2)
        .emit(Opcode::Push3)
        .emit(Opcode::Push3)
        .emit(Opcode::Pack)
        .emit(Opcode::Unpack);
    assert_eq!(
        halted(&sb),
        vec![
            StackItem::from(1),
            StackItem::from(2),
            StackItem::from(3),
            StackItem::from(3)
        ]
    );
}

#[test]
fn test_pack_puts_top_first() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1)
        .emit(Opcode::Push2)
        .emit(Opcode::Push3)
        .emit(Opcode::Push3)
        .emit(Opcode::Pack)
        .emit(Opcode::Push0)
        .emit(Opcode::PickItem);
    assert_eq!(halted(&sb), vec![StackItem::from(3)]);
}

#[test]
fn test_self_referencing_array_is_released() {
    let limits = ExecutionEngineLimits {
        max_stack_size: 8,
        ..Default::default()
    };
    // Each pass builds an array holding itself, then drops it.
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push10) // 0
        .emit(Opcode::NewArray0) // 1
        .emit(Opcode::Dup) // 2
        .emit(Opcode::Dup) // 3
        .emit(Opcode::Append) // 4
        .emit(Opcode::Drop) // 5
        .emit(Opcode::Dec) // 6
        .emit(Opcode::Dup) // 7
        .emit_jump(Opcode::JmpIf, -7); // 8 -> 1
    let engine = run_with(limits, sb.to_script());
    assert_eq!(engine.state(), VMState::Halt, "fault: {:?}", engine.fault_error());
}

// ============================================================================
// Debugger
// ============================================================================

#[test]
fn test_step_over_runs_call_to_completion() {
    // 0: CALL_L +6, 5: RET, 6: PUSH1, 7: RET
    let mut sb = ScriptBuilder::new();
    sb.emit_call(6)
        .emit(Opcode::Ret)
        .emit(Opcode::Push1)
        .emit(Opcode::Ret);
    let mut engine = ExecutionEngine::new();
    engine.load_script(sb.to_script(), -1, 0).unwrap();

    let mut debugger = Debugger::new(&mut engine);
    assert_eq!(debugger.step_over(), VMState::Break);
    let context = debugger.engine().current_context().unwrap();
    assert_eq!(context.instruction_pointer(), 5);
    assert_eq!(context.evaluation_stack().len(), 1);
    assert_eq!(debugger.engine().invocation_stack().len(), 1);

    assert_eq!(debugger.execute(), VMState::Halt);
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(1)]);
}

#[test]
fn test_step_out_returns_to_caller() {
    let mut sb = ScriptBuilder::new();
    sb.emit_call(6)
        .emit(Opcode::Ret)
        .emit(Opcode::Push1)
        .emit(Opcode::Push2)
        .emit(Opcode::Ret);
    let mut engine = ExecutionEngine::new();
    engine.load_script(sb.to_script(), -1, 0).unwrap();

    let mut debugger = Debugger::new(&mut engine);
    assert_eq!(debugger.step_into(), VMState::Break);
    assert_eq!(debugger.engine().invocation_stack().len(), 2);
    assert_eq!(debugger.step_out(), VMState::Break);
    assert_eq!(debugger.engine().invocation_stack().len(), 1);
    assert_eq!(
        debugger.engine().current_context().unwrap().instruction_pointer(),
        5
    );
}

// ============================================================================
// Host
// ============================================================================

struct NotifyHost {
    notifications: Rc<RefCell<Vec<StackItem>>>,
}

impl InteropHost for NotifyHost {
    fn on_syscall(&mut self, engine: &mut ExecutionEngine, method: u32) -> VmResult<()> {
        match method {
            0x01 => {
                let item = engine.pop()?;
                self.notifications.borrow_mut().push(item);
                Ok(())
            }
            0x02 => engine.push_bytes(b"block"),
            _ => Err(VmError::SyscallNotFound(method)),
        }
    }
}

#[test]
fn test_host_syscalls_exchange_values() {
    let notifications = Rc::new(RefCell::new(Vec::new()));
    let host = NotifyHost {
        notifications: Rc::clone(&notifications),
    };
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    let mut sb = ScriptBuilder::new();
    sb.emit_push_int(7)
        .emit_syscall(0x01)
        .emit_syscall(0x02)
        .emit(Opcode::Dup)
        .emit_syscall(0x01);
    engine.load_script(sb.to_script(), -1, 0).unwrap();

    assert_eq!(engine.execute(), VMState::Halt);
    assert_eq!(
        *notifications.borrow(),
        vec![StackItem::from(7), StackItem::from("block")]
    );
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from("block")]);
}

// ============================================================================
// Determinism
// ============================================================================

const SAFE_OPCODES: &[Opcode] = &[
    Opcode::Push0,
    Opcode::Push1,
    Opcode::Push2,
    Opcode::Push7,
    Opcode::Push16,
    Opcode::PushM1,
    Opcode::PushNull,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::Dup,
    Opcode::Swap,
    Opcode::Drop,
    Opcode::Over,
    Opcode::Inc,
    Opcode::Negate,
    Opcode::IsNull,
    Opcode::Size,
];

fn outcome(script: &Script) -> (VMState, Option<VmError>, Vec<StackItem>) {
    let engine = run_with(ExecutionEngineLimits::default(), script.clone());
    let out = (
        engine.state(),
        engine.fault_error().cloned(),
        engine.result_stack().to_vec(),
    );
    out
}

proptest! {
    #[test]
    fn prop_execution_is_deterministic(
        picks in proptest::collection::vec(0..SAFE_OPCODES.len(), 0..40)
    ) {
        let mut sb = ScriptBuilder::new();
        for pick in picks {
            sb.emit(SAFE_OPCODES[pick]);
        }
        let script = sb.to_script();
        prop_assert_eq!(outcome(&script), outcome(&script));
    }

    #[test]
    fn prop_add_matches_integer_addition(a in any::<i64>(), b in any::<i64>()) {
        let mut sb = ScriptBuilder::new();
        sb.emit_push_int(a).emit_push_int(b).emit(Opcode::Add);
        let engine = run(&sb);
        prop_assert_eq!(engine.state(), VMState::Halt);
        prop_assert_eq!(
            engine.result_stack().to_vec(),
            vec![StackItem::from(a as i128 + b as i128)]
        );
    }
}
