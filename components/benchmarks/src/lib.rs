//! Benchmark infrastructure for the stack VM
//!
//! This crate provides benchmarking tools to measure the performance of the
//! execution engine. It includes:
//!
//! - Opcode micro-benchmarks run inside counted loops
//! - Benchmark runner with timing, instruction counts and result formatting
//!
//! # Examples
//!
//! ```rust,no_run
//! use benchmarks::opcodes;
//!
//! let results = opcodes::run_all();
//! for result in results {
//!     println!("{}: {:.2}ms", result.name, result.duration_ms);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod opcodes;
pub mod runner;

pub use runner::{Benchmark, BenchmarkResult, BenchmarkSuite};
