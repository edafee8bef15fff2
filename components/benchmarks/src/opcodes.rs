//! Opcode micro-benchmarks
//!
//! Each benchmark repeats a short, stack-neutral body inside a counted loop,
//! so the measured time is dominated by the opcodes under test.

use bytecode_system::{Opcode, Script, ScriptBuilder};
use core_types::ExecutionEngineLimits;

use crate::runner::{Benchmark, BenchmarkResult, BenchmarkSuite};

/// Loop iterations per benchmark
pub const ITERATIONS: u32 = 10_000;

/// Build `prelude`, then run `body` `iterations` times
///
/// The loop counter lives in local 0, so `body` must leave the evaluation
/// stack as it found it.
pub fn counted_loop(
    iterations: u32,
    prelude: impl FnOnce(&mut ScriptBuilder),
    body: impl FnOnce(&mut ScriptBuilder),
) -> Script {
    let mut sb = ScriptBuilder::new();
    prelude(&mut sb);
    sb.emit_with_operand(Opcode::InitSlot, &[1, 0])
        .emit_push_int(iterations)
        .emit(Opcode::StLoc0);

    let start = sb.len();
    body(&mut sb);
    sb.emit(Opcode::LdLoc0)
        .emit(Opcode::Dec)
        .emit(Opcode::Dup)
        .emit(Opcode::StLoc0);
    let jump = sb.len();
    sb.emit_jump(Opcode::JmpIfL, start as i32 - jump as i32);
    sb.to_script()
}

fn no_prelude(_: &mut ScriptBuilder) {}

/// Create all opcode benchmarks
pub fn create_benchmarks() -> Vec<Benchmark> {
    vec![
        Benchmark {
            name: "arithmetic_loop".to_string(),
            description: "MUL, ADD and MOD on small integers".to_string(),
            script: counted_loop(ITERATIONS, no_prelude, |sb| {
                sb.emit(Opcode::Push7)
                    .emit(Opcode::Push3)
                    .emit(Opcode::Mul)
                    .emit(Opcode::Push2)
                    .emit(Opcode::Add)
                    .emit(Opcode::Push5)
                    .emit(Opcode::Mod)
                    .emit(Opcode::Drop);
            }),
        },
        Benchmark {
            name: "pack".to_string(),
            description: "PACK three integers into an array".to_string(),
            script: counted_loop(ITERATIONS, no_prelude, |sb| {
                sb.emit(Opcode::Push1)
                    .emit(Opcode::Push2)
                    .emit(Opcode::Push3)
                    .emit(Opcode::Push3)
                    .emit(Opcode::Pack)
                    .emit(Opcode::Drop);
            }),
        },
        Benchmark {
            name: "newstruct".to_string(),
            description: "NEWSTRUCT with four null fields".to_string(),
            script: counted_loop(ITERATIONS, no_prelude, |sb| {
                sb.emit(Opcode::Push4)
                    .emit(Opcode::NewStruct)
                    .emit(Opcode::Drop);
            }),
        },
        Benchmark {
            name: "static_field_load".to_string(),
            description: "LDSFLD0 from an initialized static slot".to_string(),
            script: counted_loop(
                ITERATIONS,
                |sb| {
                    sb.emit_with_operand(Opcode::InitSSlot, &[1])
                        .emit(Opcode::Push1)
                        .emit(Opcode::StSFld0);
                },
                |sb| {
                    sb.emit(Opcode::LdSFld0).emit(Opcode::Drop);
                },
            ),
        },
        Benchmark {
            name: "isnull".to_string(),
            description: "ISNULL on a null".to_string(),
            script: counted_loop(ITERATIONS, no_prelude, |sb| {
                sb.emit(Opcode::PushNull)
                    .emit(Opcode::IsNull)
                    .emit(Opcode::Drop);
            }),
        },
    ]
}

/// Create the opcode benchmark suite
pub fn create_suite() -> BenchmarkSuite {
    let mut suite = BenchmarkSuite::new("Opcodes".to_string());
    for bench in create_benchmarks() {
        suite.add(bench);
    }
    suite
}

/// Run all opcode benchmarks with default limits
pub fn run_all() -> Vec<BenchmarkResult> {
    create_suite().run(ExecutionEngineLimits::default())
}
