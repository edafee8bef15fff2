//! Configuration Integration Tests
//!
//! Limits are loaded the way a host would load them, from JSON, and then
//! enforced by a running engine.

use bytecode_system::{Opcode, ScriptBuilder};
use core_types::{ExecutionEngineLimits, VmError};
use interpreter::{ExecutionEngine, VMState};

fn limits_from(json: &str) -> ExecutionEngineLimits {
    serde_json::from_str(json).expect("limits should parse")
}

fn run(limits: ExecutionEngineLimits, sb: &ScriptBuilder) -> ExecutionEngine {
    let mut engine = ExecutionEngine::with_limits(limits);
    engine.load_script(sb.to_script(), -1, 0).expect("load failed");
    engine.execute();
    engine
}

/// Test: An empty object yields the default limits
#[test]
fn test_empty_config_is_default() {
    assert_eq!(limits_from("{}"), ExecutionEngineLimits::default());
}

/// Test: Limits survive a serialize/deserialize cycle
#[test]
fn test_limits_json_round_trip() {
    let limits = ExecutionEngineLimits {
        max_shift: 64,
        catch_engine_exceptions: false,
        ..Default::default()
    };
    let json = serde_json::to_string(&limits).unwrap();
    assert!(json.contains("\"max_shift\":64"));
    assert_eq!(limits_from(&json), limits);
}

/// Test: Configured max_shift bounds SHL
#[test]
fn test_configured_max_shift() {
    let limits = limits_from(r#"{ "max_shift": 8 }"#);
    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1).emit(Opcode::Push9).emit(Opcode::Shl);
    let engine = run(limits, &sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert_eq!(
        engine.fault_error(),
        Some(&VmError::InvalidShift { shift: 9, max: 8 })
    );

    let mut sb = ScriptBuilder::new();
    sb.emit(Opcode::Push1).emit(Opcode::Push8).emit(Opcode::Shl);
    let engine = run(limits, &sb);
    assert_eq!(engine.state(), VMState::Halt);
}

/// Test: Configured max_item_size bounds concatenation
#[test]
fn test_configured_max_item_size() {
    let limits = limits_from(r#"{ "max_item_size": 4 }"#);
    let mut sb = ScriptBuilder::new();
    sb.emit_push_bytes(b"abc")
        .emit_push_bytes(b"de")
        .emit(Opcode::Cat);
    let engine = run(limits, &sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert_eq!(
        engine.fault_error(),
        Some(&VmError::ItemTooLarge { size: 5, max: 4 })
    );
}

/// Test: Configured invocation depth bounds recursion
#[test]
fn test_configured_invocation_depth() {
    let limits = limits_from(r#"{ "max_invocation_stack_size": 8 }"#);
    // 0: CALL_L +0 calls itself forever
    let mut sb = ScriptBuilder::new();
    sb.emit_call(0);
    let engine = run(limits, &sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert_eq!(
        engine.fault_error(),
        Some(&VmError::InvocationStackOverflow(8))
    );
}

/// Test: Configured try nesting depth bounds TRY
#[test]
fn test_configured_try_depth() {
    let limits = limits_from(r#"{ "max_try_nesting_depth": 2 }"#);
    let mut sb = ScriptBuilder::new();
    for _ in 0..3 {
        sb.emit_try(0, 100);
    }
    let engine = run(limits, &sb);
    assert_eq!(engine.fault_error(), Some(&VmError::TryNestingTooDeep(2)));
}

/// Test: Disabling catch turns catchable errors into faults
#[test]
fn test_configured_catch_switch() {
    let mut sb = ScriptBuilder::new();
    sb.emit_try(12, 0) // 0: catch 12
        .emit(Opcode::Push1) // 9
        .emit(Opcode::Push0) // 10
        .emit(Opcode::Mod) // 11
        .emit(Opcode::Push5); // 12

    let engine = run(limits_from("{}"), &sb);
    assert_eq!(engine.state(), VMState::Halt);

    let engine = run(limits_from(r#"{ "catch_engine_exceptions": false }"#), &sb);
    assert_eq!(engine.state(), VMState::Fault);
    assert_eq!(engine.fault_error(), Some(&VmError::DivisionByZero));
}

/// Test: A mistyped field fails to parse
#[test]
fn test_wrong_field_type_is_rejected() {
    let result: Result<ExecutionEngineLimits, _> =
        serde_json::from_str(r#"{ "max_stack_size": "large" }"#);
    assert!(result.is_err());
}
