//! VM benchmark CLI
//!
//! Runs the opcode benchmarks and prints a table or JSON.

use benchmarks::{opcodes, runner};
use core_types::ExecutionEngineLimits;
use std::process;

fn print_usage() {
    println!("Stack VM Benchmark Tool");
    println!();
    println!("Usage:");
    println!("  vm-bench                  Run opcode benchmarks");
    println!("  vm-bench --json           Output results as JSON");
    println!("  vm-bench --runs <n>       Average over n runs");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut json_output = false;
    let mut runs = 1usize;

    // Parse arguments
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => {
                json_output = true;
            }
            "--runs" => {
                i += 1;
                runs = match args.get(i).and_then(|n| n.parse().ok()) {
                    Some(n) if n > 0 => n,
                    _ => {
                        eprintln!("Error: --runs expects a positive number");
                        process::exit(1);
                    }
                };
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => {
                eprintln!("Error: Unknown argument '{}'", other);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    if !json_output {
        println!("Running opcode benchmarks...\n");
    }
    let suite = opcodes::create_suite();
    let results = suite.run_multiple(ExecutionEngineLimits::default(), runs);

    // Output results
    if json_output {
        match runner::format_results_json(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error formatting JSON: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!("{}", runner::format_results(&results));

        // Summary statistics
        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let total_time: f64 = results.iter().map(|r| r.duration_ms).sum();
        let total_instructions: u64 = results.iter().map(|r| r.instructions).sum();

        println!("\nSummary:");
        println!("  Total benchmarks: {}", results.len());
        println!("  Successful: {}", successful);
        println!("  Failed: {}", failed);
        println!("  Instructions: {}", total_instructions);
        println!("  Total time: {:.2} ms", total_time);

        if failed > 0 {
            process::exit(1);
        }
    }
}
