use crate::error::MachineError;
use crate::isa::{RegisterIndex, Word};

/// Fixed-size register file. Every register starts at zero and the length
/// never changes after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    regs: Vec<Word>,
}

impl RegisterFile {
    pub fn new(count: usize) -> Self {
        Self {
            regs: vec![0; count],
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.regs
    }

    /// Returns the value in register `index`.
    ///
    /// Returns [`MachineError::RegisterOutOfBounds`] if `index` is out of range.
    pub fn get(&self, index: RegisterIndex) -> Result<Word, MachineError> {
        self.regs
            .get(index)
            .copied()
            .ok_or(MachineError::RegisterOutOfBounds {
                index: index as Word,
                count: self.regs.len(),
            })
    }

    /// Stores `value` into register `index`.
    ///
    /// Returns [`MachineError::RegisterOutOfBounds`] if `index` is out of range.
    pub fn set(&mut self, index: RegisterIndex, value: Word) -> Result<(), MachineError> {
        *self.slot(index)? = value;
        Ok(())
    }

    /// Mutable access to register `index`, for read-modify-write handlers.
    pub fn slot(&mut self, index: RegisterIndex) -> Result<&mut Word, MachineError> {
        let count = self.regs.len();
        self.regs
            .get_mut(index)
            .ok_or(MachineError::RegisterOutOfBounds {
                index: index as Word,
                count,
            })
    }

    /// Reads the register named by an instruction's `rhs` word.
    ///
    /// Words that do not fit a `usize` are reported as out of bounds with
    /// their original value.
    pub fn get_word_index(&self, index: Word) -> Result<Word, MachineError> {
        let idx = RegisterIndex::try_from(index).map_err(|_| MachineError::RegisterOutOfBounds {
            index,
            count: self.regs.len(),
        })?;
        self.get(idx)
    }

    /// Zeroes every register.
    pub fn clear(&mut self) {
        self.regs.fill(0);
    }
}
