//! Memory Manager and Interpreter Integration Tests
//!
//! Tests the integration between memory_manager, core_types' reference
//! counting and the interpreter. Verifies that pools stay bounded and that
//! compound items are released once unreachable.

use bytecode_system::{Opcode, ScriptBuilder};
use core_types::{ExecutionEngineLimits, Integer, StackItem};
use interpreter::{ExecutionEngine, VMState};
use memory_manager::{ObjectFactory, SharedObjectPool};
use num_bigint::BigInt;

fn run_with(limits: ExecutionEngineLimits, sb: &ScriptBuilder) -> ExecutionEngine {
    let mut engine = ExecutionEngine::with_limits(limits);
    engine.load_script(sb.to_script(), -1, 0).expect("load failed");
    engine.execute();
    engine
}

/// Test: Arithmetic in a loop never grows the pools past the stack limit
#[test]
fn test_pools_stay_bounded() {
    let limits = ExecutionEngineLimits {
        max_stack_size: 16,
        ..Default::default()
    };
    let mut sb = ScriptBuilder::new();
    sb.emit_push_int(200) // 0
        .emit(Opcode::Push3) // 3
        .emit(Opcode::Push4) // 4
        .emit(Opcode::Mul) // 5
        .emit(Opcode::Drop) // 6
        .emit(Opcode::Dec) // 7
        .emit(Opcode::Dup) // 8
        .emit_jump(Opcode::JmpIf, -6); // 9 -> 3
    let engine = run_with(limits, &sb);

    assert_eq!(engine.state(), VMState::Halt, "fault: {:?}", engine.fault_error());
    let stats = engine.pool_stats();
    assert!(stats.integers <= 16);
    assert!(stats.booleans <= 16);
    assert!(stats.byte_strings <= 16);
}

/// Test: Compounds dropped from the stack are no longer tracked
#[test]
fn test_dropped_compounds_are_released() {
    let mut sb = ScriptBuilder::new();
    sb.emit_push_int(50) // 0
        .emit(Opcode::NewMap) // 2
        .emit(Opcode::Dup) // 3
        .emit(Opcode::Push1) // 4
        .emit(Opcode::NewArray0) // 5
        .emit(Opcode::SetItem) // 6
        .emit(Opcode::Drop) // 7
        .emit(Opcode::Dec) // 8
        .emit(Opcode::Dup) // 9
        .emit_jump(Opcode::JmpIf, -8); // 10 -> 2
    let engine = run_with(ExecutionEngineLimits::default(), &sb);

    assert_eq!(engine.state(), VMState::Halt, "fault: {:?}", engine.fault_error());
    assert_eq!(engine.reference_counter().tracked_len(), 0);
}

/// Test: Self-appended arrays dropped in a loop leave nothing tracked
#[test]
fn test_self_cycles_released_in_loop() {
    let limits = ExecutionEngineLimits {
        max_stack_size: 8,
        ..Default::default()
    };
    let mut sb = ScriptBuilder::new();
    sb.emit_push_int(20) // 0
        .emit(Opcode::NewArray0) // 2
        .emit(Opcode::Dup) // 3
        .emit(Opcode::Dup) // 4
        .emit(Opcode::Append) // 5
        .emit(Opcode::Drop) // 6
        .emit(Opcode::Dec) // 7
        .emit(Opcode::Dup) // 8
        .emit_jump(Opcode::JmpIf, -7); // 9 -> 2
    let engine = run_with(limits, &sb);

    assert_eq!(engine.state(), VMState::Halt, "fault: {:?}", engine.fault_error());
    assert_eq!(engine.result_stack().to_vec(), vec![StackItem::from(0)]);
    assert_eq!(engine.reference_counter().tracked_len(), 0);
}

/// Test: Items held in static fields stay tracked until the context unloads
#[test]
fn test_static_fields_keep_compounds_alive() {
    let mut sb = ScriptBuilder::new();
    sb.emit_with_operand(Opcode::InitSSlot, &[1])
        .emit(Opcode::NewArray0)
        .emit(Opcode::StSFld0)
        .emit(Opcode::Nop);
    let mut engine = ExecutionEngine::new();
    engine.load_script(sb.to_script(), -1, 0).unwrap();
    for _ in 0..3 {
        engine.execute_next();
    }
    assert_eq!(engine.reference_counter().tracked_len(), 1);
    assert_eq!(engine.reference_counter().count(), 1);

    assert_eq!(engine.execute(), VMState::Halt);
    assert_eq!(engine.reference_counter().count(), 0);
}

/// Test: A standalone factory hands out values matching its input
#[test]
fn test_factory_round_trip() {
    let mut factory = ObjectFactory::new(&ExecutionEngineLimits::default());
    let item = factory.integer(BigInt::from(12345)).unwrap();
    assert_eq!(item, StackItem::from(12345));
    factory.recycle(item);

    let reused = factory.integer(BigInt::from(-1)).unwrap();
    assert_eq!(reused, StackItem::from(-1));
    assert_eq!(factory.byte_string(b"abc"), StackItem::from("abc"));
    assert_eq!(factory.boolean(true), StackItem::from(true));
}

/// Test: Integers exceeding 32 bytes are refused by the factory
#[test]
fn test_factory_rejects_oversized_integer() {
    let mut factory = ObjectFactory::default();
    let huge = BigInt::from(1) << 256;
    assert!(factory.integer(huge).is_err());
}

/// Test: A shared pool serves several threads and gets every instance back
#[test]
fn test_shared_pool_across_threads() {
    let pool = SharedObjectPool::<Integer>::new(2).unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let pool = &pool;
            scope.spawn(move || {
                for i in 0..25 {
                    let value = BigInt::from(t * 100 + i);
                    let item = pool.acquire(value.clone()).unwrap();
                    assert_eq!(item.value(), &value);
                }
            });
        }
    });

    assert_eq!(pool.checked_out(), 0);
    assert!(pool.available() <= pool.max_size());
}
