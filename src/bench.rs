//! Throughput benchmark: many independent machines running the canned
//! programs in parallel, each result checked against native arithmetic.

use std::time::{Duration, Instant};

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use tracing::warn;

use crate::isa::Word;
use crate::machine::{Machine, RunConfig};
use crate::programs::{FIBONACCI_REGISTERS, MUL2_REGISTERS, fibonacci_program, mul2_program};

#[derive(Clone, Copy, Debug)]
pub struct BenchConfig {
    /// Number of programs to run.
    pub jobs: usize,
    pub seed: u64,
    /// Upper bound (inclusive) for drawn operands.
    pub max_operand: Word,
    /// Per-job step limit.
    pub step_limit: Option<u64>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            jobs: 1 << 12,
            seed: 0,
            max_operand: 1000,
            step_limit: Some(1 << 20),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BenchReport {
    pub jobs: usize,
    /// Instructions executed across all jobs.
    pub steps: u64,
    /// Jobs whose result differed from native arithmetic or that errored.
    pub mismatches: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Job {
    Mul { a: Word, b: Word },
    Fib { n: Word },
}

impl Job {
    fn expected(self) -> Word {
        match self {
            Job::Mul { a, b } => a.wrapping_mul(b),
            Job::Fib { n } => {
                let (mut x, mut y): (Word, Word) = (0, 1);
                for _ in 0..n {
                    (x, y) = (y, x.wrapping_add(y));
                }
                x
            }
        }
    }

    /// Runs the job on a fresh machine, returning steps taken and whether the
    /// result matched.
    fn execute(self, config: &RunConfig) -> (u64, bool) {
        let mut vm = match self {
            Job::Mul { .. } => Machine::new(MUL2_REGISTERS),
            Job::Fib { .. } => Machine::new(FIBONACCI_REGISTERS),
        };
        let loaded = match self {
            Job::Mul { a, b } => vm.load(mul2_program(a, b)),
            Job::Fib { n } => vm.load(fibonacci_program(n)),
        };
        let result = loaded.and_then(|()| vm.run_with(config, &mut std::io::sink()));
        match result {
            Ok(report) => (report.steps, report.value == self.expected()),
            Err(e) => {
                warn!(job = ?self, error = %e, "bench job failed");
                (0, false)
            }
        }
    }
}

/// Draws the job list sequentially from the seed.
fn draw_jobs(config: &BenchConfig) -> Vec<Job> {
    let mut rng = SmallRng::seed_from_u64(config.seed);
    (0..config.jobs)
        .map(|i| {
            if i % 2 == 0 {
                Job::Mul {
                    a: rng.gen_range(0..=config.max_operand),
                    b: rng.gen_range(0..=config.max_operand),
                }
            } else {
                Job::Fib {
                    n: rng.gen_range(0..=config.max_operand),
                }
            }
        })
        .collect()
}

/// Phase 1 (sequential): draw operands from the seeded RNG.
/// Phase 2 (parallel): run every job on its own machine via rayon.
pub fn run_bench(config: &BenchConfig) -> BenchReport {
    let jobs = draw_jobs(config);
    let run_config = RunConfig {
        step_limit: config.step_limit,
    };

    let start = Instant::now();
    let (steps, mismatches) = jobs
        .par_iter()
        .map(|job| {
            let (steps, ok) = job.execute(&run_config);
            (steps, usize::from(!ok))
        })
        .reduce(|| (0, 0), |(s1, m1), (s2, m2)| (s1 + s2, m1 + m2));

    BenchReport {
        jobs: jobs.len(),
        steps,
        mismatches,
        elapsed: start.elapsed(),
    }
}
