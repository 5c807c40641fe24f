use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use regvm::asm::{assemble, parse_immediate};
use regvm::bench::{BenchConfig, run_bench};
use regvm::isa::{Instruction, RegisterIndex, Word};
use regvm::machine::{Machine, RunConfig, RunReport};
use regvm::program::Program;
use regvm::programs::{FIBONACCI_REGISTERS, MUL2_REGISTERS, fibonacci_program, mul2_program};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "regvm", about = "Register-based bytecode interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program: `.rvm` files are binary, anything else is assembly.
    Run {
        path: PathBuf,

        /// Register file size (defaults to what the program needs, capped at 65536).
        #[arg(long)]
        registers: Option<usize>,

        /// Max instructions to execute before giving up.
        #[arg(long)]
        step_limit: Option<u64>,

        /// JSON file with run settings; flags take precedence.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed a register before the run, e.g. `--set r2=10`.
        #[arg(long = "set", value_parser = parse_assignment)]
        assignments: Vec<(RegisterIndex, Word)>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Compute the Nth Fibonacci number on the machine.
    Fib { n: Word },
    /// Multiply two numbers by repeated addition on the machine.
    Mul { a: Word, b: Word },
    /// Assemble a source file into the binary format.
    Asm { source: PathBuf, output: PathBuf },
    /// Print a program listing.
    Disasm { path: PathBuf },
    /// Run many sample programs in parallel and report throughput.
    Bench {
        #[arg(long, default_value_t = 1 << 12)]
        jobs: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Largest operand drawn for each job.
        #[arg(long, default_value_t = 1000)]
        max_operand: Word,

        #[arg(long, default_value_t = 1 << 20)]
        step_limit: u64,
    },
}

/// Parse an `rI=V` register assignment.
fn parse_assignment(s: &str) -> Result<(RegisterIndex, Word), String> {
    let (reg, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid assignment '{s}', expected rI=V (e.g. r2=10)"))?;
    let index = reg
        .strip_prefix(['r', 'R'])
        .and_then(|n| n.parse::<RegisterIndex>().ok())
        .ok_or_else(|| format!("Invalid register '{reg}'"))?;
    let value = parse_immediate(value).map_err(|e| e.to_string())?;
    Ok((index, value))
}

/// Unwrap or report the error and exit with status 1.
fn or_exit<T, E: std::fmt::Display>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{context}: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            path,
            registers,
            step_limit,
            config,
            assignments,
            json,
        } => {
            let mut run_config = match config {
                Some(file) => load_config(&file),
                None => RunConfig::default(),
            };
            if step_limit.is_some() {
                run_config.step_limit = step_limit;
            }
            let program = load_program(&path);
            let registers = registers.unwrap_or_else(|| program.default_register_count());
            let mut vm = Machine::new(registers);
            vm.load_program(program);
            for (index, value) in assignments {
                or_exit(vm.write(index, value), "Invalid --set");
            }
            let report = execute(&mut vm, &run_config);
            if json {
                println!("{}", or_exit(serde_json::to_string(&report), "JSON"));
            } else {
                println!("{}", report.value);
            }
        }
        Command::Fib { n } => run_sample(fibonacci_program(n), FIBONACCI_REGISTERS),
        Command::Mul { a, b } => run_sample(mul2_program(a, b), MUL2_REGISTERS),
        Command::Asm { source, output } => {
            let text = or_exit(std::fs::read_to_string(&source), &source.display().to_string());
            let program = or_exit(assemble(&text), &source.display().to_string());
            or_exit(
                std::fs::write(&output, or_exit(program.to_bytes(), "Encode failed")),
                &output.display().to_string(),
            );
            eprintln!(
                "Wrote {} instructions, {} strings to {}",
                program.len(),
                program.strings().len(),
                output.display()
            );
        }
        Command::Disasm { path } => print!("{}", load_program(&path).disassemble()),
        Command::Bench {
            jobs,
            seed,
            max_operand,
            step_limit,
        } => print_bench(&BenchConfig {
            jobs,
            seed,
            max_operand,
            step_limit: Some(step_limit),
        }),
    }
}

fn load_config(path: &Path) -> RunConfig {
    let text = or_exit(std::fs::read_to_string(path), &path.display().to_string());
    or_exit(serde_json::from_str(&text), &path.display().to_string())
}

fn load_program(path: &Path) -> Program {
    let name = path.display().to_string();
    if path.extension().is_some_and(|ext| ext == "rvm") {
        let bytes = or_exit(std::fs::read(path), &name);
        or_exit(Program::from_bytes(&bytes), &name)
    } else {
        let text = or_exit(std::fs::read_to_string(path), &name);
        or_exit(assemble(&text), &name)
    }
}

/// Run with program output on stdout, flushed before the result is printed.
fn execute(vm: &mut Machine, config: &RunConfig) -> RunReport {
    let stdout = std::io::stdout();
    or_exit(vm.run_flushed(config, &mut stdout.lock()), "Execution failed")
}

fn run_sample(program: impl IntoIterator<Item = Instruction>, registers: usize) {
    let mut vm = Machine::new(registers);
    or_exit(vm.load(program), "Load failed");
    let report = execute(&mut vm, &RunConfig::default());
    println!("{}", report.value);
    eprintln!("({} steps)", report.steps);
}

fn print_bench(config: &BenchConfig) {
    let report = run_bench(config);
    let secs = report.elapsed.as_secs_f64();
    let jobs_per_sec = report.jobs as f64 / secs;
    let steps_per_sec = report.steps as f64 / secs;

    eprintln!("Benchmark results:");
    eprintln!("  Jobs:              {}", report.jobs);
    eprintln!("  Total steps:       {}", report.steps);
    eprintln!("  Mismatches:        {}", report.mismatches);
    eprintln!("  Elapsed:           {:.2?}", report.elapsed);
    eprintln!("  Jobs/sec:          {jobs_per_sec:.1}");
    eprintln!("  Steps/sec:         {steps_per_sec:.0}");

    if report.mismatches > 0 {
        std::process::exit(1);
    }
}
