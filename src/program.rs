use tracing::warn;

use crate::error::MachineError;
use crate::isa::{Instruction, build};

/// Largest register file [`Program::default_register_count`] will ask for.
pub const MAX_DERIVED_REGISTERS: usize = 1 << 16;

/// A loadable program: a non-empty instruction sequence plus the string pool
/// addressed by `print`/`printc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    strings: Vec<String>,
}

impl Program {
    /// Builds a program with an empty string pool.
    ///
    /// Returns [`MachineError::EmptyProgram`] if `instructions` is empty.
    pub fn new<I>(instructions: I) -> Result<Self, MachineError>
    where
        I: IntoIterator<Item = Instruction>,
    {
        Self::with_strings(instructions, Vec::new())
    }

    pub fn with_strings<I>(instructions: I, strings: Vec<String>) -> Result<Self, MachineError>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let instructions: Vec<Instruction> = instructions.into_iter().collect();
        if instructions.is_empty() {
            return Err(MachineError::EmptyProgram);
        }
        Ok(Self {
            instructions,
            strings,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Smallest register file that every `lhs` and register-operand `rhs`
    /// in the program fits into.
    pub fn registers_required(&self) -> usize {
        use crate::isa::{OperandKind, Shape};
        self.instructions
            .iter()
            .flat_map(|instr| {
                let lhs = (instr.opcode.shape() == Shape::Binary).then_some(instr.lhs);
                let rhs = (instr.opcode.operand_kind() == OperandKind::Register)
                    .then(|| usize::try_from(instr.rhs).unwrap_or(usize::MAX));
                lhs.into_iter().chain(rhs)
            })
            .map(|index| index.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Register file size to run with when the host does not choose one:
    /// [`registers_required`](Self::registers_required), at least 1 and at
    /// most [`MAX_DERIVED_REGISTERS`]. Accesses beyond the cap fail at run
    /// time with [`MachineError::RegisterOutOfBounds`].
    pub fn default_register_count(&self) -> usize {
        let required = self.registers_required();
        if required > MAX_DERIVED_REGISTERS {
            warn!(
                required,
                cap = MAX_DERIVED_REGISTERS,
                "program names registers beyond the default cap"
            );
        }
        required.clamp(1, MAX_DERIVED_REGISTERS)
    }

    /// Pretty-print a listing of the program for human inspection.
    ///
    /// String-pool entries come first as `.string` directives and the
    /// assembler skips the `NNNN:` prefixes, so the listing assembles back to
    /// the same program.
    pub fn disassemble(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (i, s) in self.strings.iter().enumerate() {
            let _ = writeln!(out, "; string {i}");
            let _ = writeln!(out, ".string {s:?}");
        }
        for (pc, instr) in self.instructions.iter().enumerate() {
            let _ = writeln!(out, "{pc:04}: {instr}");
        }
        out
    }
}

/// The program every machine starts with: `ret r0`.
impl Default for Program {
    fn default() -> Self {
        Self {
            instructions: vec![build::ret(0)],
            strings: Vec::new(),
        }
    }
}
