//! The register machine and its fetch/dispatch loop.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace};

use crate::error::MachineError;
use crate::handlers::{self, ExecState, Flow};
use crate::isa::{Instruction, Opcode, RegisterIndex, SignedWord, Word};
use crate::program::Program;
use crate::registers::RegisterFile;

/// Per-run execution limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum number of instructions to execute. `None` runs until halt,
    /// which never comes for a program stuck in a loop.
    #[serde(default)]
    pub step_limit: Option<u64>,
}

impl RunConfig {
    pub const fn bounded(step_limit: u64) -> Self {
        Self {
            step_limit: Some(step_limit),
        }
    }
}

/// Result of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Value produced by the halting `ret`/`retc`.
    pub value: Word,
    /// Instructions executed, including the halting one.
    pub steps: u64,
}

/// A register machine: one register file and one loaded program.
///
/// The program counter only exists for the duration of a run. Registers keep
/// their values between runs so a host can seed inputs before `run` and read
/// outputs afterwards.
#[derive(Clone, Debug)]
pub struct Machine {
    registers: RegisterFile,
    program: Program,
}

impl Machine {
    /// Creates a machine with `register_count` zeroed registers and the
    /// default `ret r0` program.
    pub fn new(register_count: usize) -> Self {
        Self {
            registers: RegisterFile::new(register_count),
            program: Program::default(),
        }
    }

    /// Replaces the program with `instructions` and an empty string pool.
    ///
    /// An empty sequence is rejected with [`MachineError::EmptyProgram`] and
    /// the current program is kept.
    pub fn load<I>(&mut self, instructions: I) -> Result<(), MachineError>
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.load_program(Program::new(instructions)?);
        Ok(())
    }

    /// Replaces the program, string pool included.
    pub fn load_program(&mut self, program: Program) {
        debug!(
            instructions = program.len(),
            strings = program.strings().len(),
            "program loaded"
        );
        self.program = program;
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn registers(&self) -> &[Word] {
        self.registers.as_slice()
    }

    pub fn read(&self, index: RegisterIndex) -> Result<Word, MachineError> {
        self.registers.get(index)
    }

    pub fn write(&mut self, index: RegisterIndex, value: Word) -> Result<(), MachineError> {
        self.registers.set(index, value)
    }

    /// Zeroes every register. The program is left in place.
    pub fn reset_registers(&mut self) {
        self.registers.clear();
    }

    /// Runs the loaded program from the first instruction with no step
    /// limit, writing `print` output to stdout. Returns the halt value.
    pub fn run(&mut self) -> Result<Word, MachineError> {
        let stdout = io::stdout();
        let report = self.run_flushed(&RunConfig::default(), &mut stdout.lock())?;
        Ok(report.value)
    }

    /// [`run_with`](Self::run_with), then flushes `out` whether or not the
    /// run succeeded. A run error takes precedence over a flush error.
    pub fn run_flushed<W: Write>(
        &mut self,
        config: &RunConfig,
        out: &mut W,
    ) -> Result<RunReport, MachineError> {
        let result = self.run_with(config, out);
        let flushed = out.flush();
        let report = result?;
        flushed?;
        Ok(report)
    }

    /// Runs the loaded program from the first instruction under `config`,
    /// writing `print` output to `out`.
    pub fn run_with<W: Write>(
        &mut self,
        config: &RunConfig,
        out: &mut W,
    ) -> Result<RunReport, MachineError> {
        let instructions = self.program.instructions();
        let span = debug_span!("run", instructions = instructions.len());
        let _enter = span.enter();

        let mut state = ExecState {
            registers: &mut self.registers,
            strings: self.program.strings(),
            out,
        };
        let mut pc: usize = 0;
        let mut steps: u64 = 0;

        loop {
            if let Some(limit) = config.step_limit {
                if steps >= limit {
                    debug!(limit, pc, "step limit reached");
                    return Err(MachineError::StepLimitExceeded { limit });
                }
            }
            steps += 1;

            // `pc` is in range: it starts at 0 of a non-empty program and
            // every advance is bounds-checked.
            let instruction = instructions[pc];
            trace!(pc, %instruction, "dispatch");

            let flow = handlers::dispatch(
                &mut state,
                instruction.opcode,
                instruction.lhs,
                instruction.rhs,
            )?;
            match flow {
                Flow::Advance(offset) => pc = advance(pc, offset, instructions.len())?,
                Flow::Halt => {
                    let value = halt_value(state.registers, instruction)?;
                    debug!(value, steps, pc, "halted");
                    return Ok(RunReport { value, steps });
                }
            }
        }
    }
}

/// Applies a signed displacement to `pc`, rejecting targets outside the
/// program.
fn advance(pc: usize, offset: SignedWord, len: usize) -> Result<usize, MachineError> {
    isize::try_from(offset)
        .ok()
        .and_then(|offset| pc.checked_add_signed(offset))
        .filter(|&next| next < len)
        .ok_or(MachineError::ProgramCounterOutOfBounds { pc, offset, len })
}

/// Derives the run result from the instruction that halted the loop.
fn halt_value(registers: &RegisterFile, instruction: Instruction) -> Result<Word, MachineError> {
    match instruction.opcode {
        Opcode::Ret => registers.get_word_index(instruction.rhs),
        Opcode::Retc => Ok(instruction.rhs),
        opcode => Err(MachineError::UnexpectedHaltOpcode { opcode }),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::isa::Opcode;
    use proptest::prelude::*;

    fn arb_instruction() -> impl Strategy<Value = Instruction> {
        (0..Opcode::COUNT, 0usize..6, prop_oneof![0u64..8, any::<u64>()]).prop_map(
            |(tag, lhs, rhs)| Instruction::new(Opcode::ALL[tag], lhs, rhs),
        )
    }

    proptest! {
        #[test]
        fn never_panics_and_respects_step_limit(
            program in prop::collection::vec(arb_instruction(), 1..32),
            limit in 1u64..500
        ) {
            let mut vm = Machine::new(4);
            vm.load(program).unwrap();
            match vm.run_with(&RunConfig::bounded(limit), &mut Vec::new()) {
                Ok(report) => prop_assert!(report.steps <= limit),
                Err(MachineError::StepLimitExceeded { limit: l }) => prop_assert_eq!(l, limit),
                Err(_) => {}
            }
            prop_assert_eq!(vm.register_count(), 4);
        }

        #[test]
        fn retc_returns_literal(value in any::<Word>(), seeded in any::<Word>()) {
            let mut vm = Machine::new(1);
            vm.write(0, seeded).unwrap();
            vm.load([Instruction::new(Opcode::Retc, 0, value)]).unwrap();
            prop_assert_eq!(vm.run_with(&RunConfig::default(), &mut Vec::new()).unwrap().value, value);
        }
    }
}
