//! Benchmark runner and result types
//!
//! Provides infrastructure for running benchmark scripts and collecting results.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use bytecode_system::{Instruction, Script};
use core_types::{ExecutionEngineLimits, VmResult};
use interpreter::{ExecutionEngine, InteropHost, VMState};
use serde::{Deserialize, Serialize};

/// A single benchmark script
#[derive(Debug, Clone)]
pub struct Benchmark {
    /// Name of the benchmark
    pub name: String,
    /// Description of what the benchmark exercises
    pub description: String,
    /// Script to execute
    pub script: Script,
}

/// Result of running a benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Name of the benchmark
    pub name: String,
    /// Description of the benchmark
    pub description: String,
    /// Duration in milliseconds
    pub duration_ms: f64,
    /// Instructions executed
    pub instructions: u64,
    /// Instructions per second (absent for zero-length runs)
    pub ops_per_sec: Option<f64>,
    /// Whether the script halted
    pub success: bool,
    /// Fault description if it did not
    pub error: Option<String>,
}

struct InstructionCounter(Rc<Cell<u64>>);

impl InteropHost for InstructionCounter {
    fn pre_execute_instruction(
        &mut self,
        _engine: &mut ExecutionEngine,
        _instruction: &Instruction,
    ) -> VmResult<()> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

impl Benchmark {
    /// Run this benchmark on a fresh engine with `limits`
    pub fn run(&self, limits: ExecutionEngineLimits) -> BenchmarkResult {
        let counter = Rc::new(Cell::new(0));
        let host = InstructionCounter(Rc::clone(&counter));
        let mut engine = ExecutionEngine::with_host(limits, Box::new(host));

        let start = Instant::now();
        let state = match engine.load_script(self.script.clone(), -1, 0) {
            Ok(_) => engine.execute(),
            Err(_) => VMState::Fault,
        };
        let duration = start.elapsed();

        let instructions = counter.get();
        let seconds = duration.as_secs_f64();
        BenchmarkResult {
            name: self.name.clone(),
            description: self.description.clone(),
            duration_ms: seconds * 1000.0,
            instructions,
            ops_per_sec: (seconds > 0.0).then(|| instructions as f64 / seconds),
            success: state == VMState::Halt,
            error: engine.fault_error().map(ToString::to_string),
        }
    }

    /// Run this benchmark `iterations` times and average the duration
    pub fn run_multiple(&self, limits: ExecutionEngineLimits, iterations: usize) -> BenchmarkResult {
        let mut total_duration_ms = 0.0;
        let mut result = self.run(limits);
        if !result.success || iterations <= 1 {
            return result;
        }
        total_duration_ms += result.duration_ms;

        for _ in 1..iterations {
            let next = self.run(limits);
            if !next.success {
                return next;
            }
            total_duration_ms += next.duration_ms;
            result = next;
        }

        result.duration_ms = total_duration_ms / iterations as f64;
        result.ops_per_sec = (result.duration_ms > 0.0)
            .then(|| result.instructions as f64 / (result.duration_ms / 1000.0));
        result
    }
}

/// Suite of benchmarks
pub struct BenchmarkSuite {
    /// Name of the suite
    pub name: String,
    /// Benchmarks in this suite
    pub benchmarks: Vec<Benchmark>,
}

impl BenchmarkSuite {
    /// Create a new benchmark suite
    pub fn new(name: String) -> Self {
        Self {
            name,
            benchmarks: Vec::new(),
        }
    }

    /// Add a benchmark to this suite
    pub fn add(&mut self, benchmark: Benchmark) {
        self.benchmarks.push(benchmark);
    }

    /// Run all benchmarks in this suite
    pub fn run(&self, limits: ExecutionEngineLimits) -> Vec<BenchmarkResult> {
        self.benchmarks.iter().map(|b| b.run(limits)).collect()
    }

    /// Run all benchmarks multiple times and average
    pub fn run_multiple(
        &self,
        limits: ExecutionEngineLimits,
        iterations: usize,
    ) -> Vec<BenchmarkResult> {
        self.benchmarks
            .iter()
            .map(|b| b.run_multiple(limits, iterations))
            .collect()
    }
}

/// Format benchmark results as a human-readable table
pub fn format_results(results: &[BenchmarkResult]) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n{:<30} {:>13} {:>12} {:<6}\n",
        "Benchmark", "Duration (ms)", "Instructions", "Status"
    ));
    output.push_str(&format!("{}\n", "=".repeat(65)));

    for result in results {
        let status = if result.success { "HALT" } else { "FAULT" };
        output.push_str(&format!(
            "{:<30} {:>13.2} {:>12} {:<6}\n",
            result.name, result.duration_ms, result.instructions, status
        ));

        if let Some(error) = &result.error {
            output.push_str(&format!("  Error: {}\n", error));
        }
    }

    output
}

/// Format benchmark results as JSON
pub fn format_results_json(results: &[BenchmarkResult]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(results)
}
