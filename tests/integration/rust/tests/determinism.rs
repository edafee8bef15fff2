//! Determinism Integration Tests
//!
//! The same script on two engines must take the same steps and end in the
//! same state. Arbitrary bytes must fault cleanly rather than panic.

use std::cell::RefCell;
use std::rc::Rc;

use bytecode_system::{Instruction, Opcode, Script, ScriptBuilder, StackItemType};
use core_types::{ExecutionEngineLimits, StackItem, VmError, VmResult};
use interpreter::{Debugger, ExecutionEngine, InteropHost, VMState};
use proptest::prelude::*;

const STEP_BUDGET: usize = 5_000;

/// Records every executed position and stops runaway scripts
struct TraceHost {
    trace: Rc<RefCell<Vec<(usize, Opcode)>>>,
}

impl InteropHost for TraceHost {
    fn pre_execute_instruction(
        &mut self,
        engine: &mut ExecutionEngine,
        instruction: &Instruction,
    ) -> VmResult<()> {
        let mut trace = self.trace.borrow_mut();
        if trace.len() >= STEP_BUDGET {
            return Err(VmError::Host("step budget exhausted".into()));
        }
        let ip = engine
            .current_context()
            .map_or(0, |context| context.instruction_pointer());
        trace.push((ip, instruction.opcode()));
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
enum Summary {
    Primitive(StackItemType, Vec<u8>),
    Other(StackItemType),
}

fn summarize(item: &StackItem) -> Summary {
    match item.get_span() {
        Ok(span) if item.is_primitive() => Summary::Primitive(item.item_type(), span.into_owned()),
        _ => Summary::Other(item.item_type()),
    }
}

#[derive(Debug, PartialEq)]
struct Outcome {
    state: VMState,
    error: Option<VmError>,
    position: Option<usize>,
    results: Vec<Summary>,
    trace: Vec<(usize, Opcode)>,
}

fn outcome(script: &Script) -> Outcome {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let host = TraceHost {
        trace: Rc::clone(&trace),
    };
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    let state = match engine.load_script(script.clone(), -1, 0) {
        Ok(_) => engine.execute(),
        Err(_) => VMState::Fault,
    };
    let results = engine.result_stack().iter().map(summarize).collect();
    let trace = trace.borrow().clone();
    Outcome {
        state,
        error: engine.fault_error().cloned(),
        position: engine.fault_position(),
        results,
        trace,
    }
}

/// Test: A fixed script produces identical traces on two engines
#[test]
fn test_fixed_script_is_deterministic() {
    let mut sb = ScriptBuilder::new();
    sb.emit_push_int(5) // 0
        .emit(Opcode::NewArray0) // 1
        .emit(Opcode::Over) // 2
        .emit(Opcode::Append) // 3
        .emit(Opcode::Dec) // 4
        .emit(Opcode::Dup) // 5
        .emit_jump(Opcode::JmpIf, -5); // 6 -> 1
    let script = sb.to_script();

    let first = outcome(&script);
    assert_eq!(first.state, VMState::Halt, "fault: {:?}", first.error);
    assert_eq!(first, outcome(&script));
}

/// Test: Stepping through the debugger follows the same path as execute
#[test]
fn test_debugger_matches_execute() {
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push3)
        .emit_call(6)
        .emit(Opcode::Ret)
        .emit(Opcode::Dup)
        .emit(Opcode::Mul)
        .emit(Opcode::Ret);
    let script = sb.to_script();
    let expected = outcome(&script);

    let trace = Rc::new(RefCell::new(Vec::new()));
    let host = TraceHost {
        trace: Rc::clone(&trace),
    };
    let mut engine = ExecutionEngine::with_host(ExecutionEngineLimits::default(), Box::new(host));
    engine.load_script(script, -1, 0).unwrap();
    let mut debugger = Debugger::new(&mut engine);
    while debugger.step_into() == VMState::Break {}

    assert_eq!(engine.state(), expected.state);
    assert_eq!(*trace.borrow(), expected.trace);
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(9)]);
}

fn opcode_strategy() -> impl Strategy<Value = Opcode> {
    prop::sample::select(vec![
        Opcode::Push0,
        Opcode::Push1,
        Opcode::Push3,
        Opcode::PushM1,
        Opcode::PushNull,
        Opcode::PushT,
        Opcode::Dup,
        Opcode::Swap,
        Opcode::Over,
        Opcode::Drop,
        Opcode::Add,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Inc,
        Opcode::Not,
        Opcode::Pack,
        Opcode::Unpack,
        Opcode::NewArray0,
        Opcode::NewMap,
        Opcode::Append,
        Opcode::Size,
        Opcode::Equal,
    ])
}

proptest! {
    #[test]
    fn prop_generated_scripts_are_deterministic(
        ops in proptest::collection::vec(opcode_strategy(), 0..60)
    ) {
        let mut sb = ScriptBuilder::new();
        for op in ops {
            sb.emit(op);
        }
        let script = sb.to_script();
        prop_assert_eq!(outcome(&script), outcome(&script));
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let script = Script::new(bytes);
        let first = outcome(&script);
        prop_assert!(matches!(first.state, VMState::Halt | VMState::Fault));
        prop_assert!(first.trace.len() <= STEP_BUDGET);
        prop_assert_eq!(first, outcome(&script));
    }
}
