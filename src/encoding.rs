//! Binary program format.
//!
//! Instruction: 1 byte opcode tag, `lhs` as u64 LE, `rhs` as u64 LE.
//!
//! Program:
//! - Magic `RVM\x01`
//! - u32 LE string count, then each string as u32 LE length + UTF-8 bytes
//! - u32 LE instruction count, then the instructions
//!
//! Counts and lengths that do not fit a u32 are rejected when encoding.

use crate::error::{DecodeError, EncodeError};
use crate::isa::{Instruction, Opcode, RegisterIndex};
use crate::program::Program;

pub const MAGIC: [u8; 4] = *b"RVM\x01";

/// Encoded size of one instruction.
pub const INSTRUCTION_SIZE: usize = 17;

impl Instruction {
    pub fn to_bytes(&self) -> [u8; INSTRUCTION_SIZE] {
        let mut out = [0u8; INSTRUCTION_SIZE];
        out[0] = self.opcode as u8;
        out[1..9].copy_from_slice(&(self.lhs as u64).to_le_bytes());
        out[9..17].copy_from_slice(&self.rhs.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; INSTRUCTION_SIZE]) -> Result<Self, DecodeError> {
        Reader::new(bytes).instruction()
    }
}

impl Program {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let strings_len: usize = self.strings().iter().map(|s| 4 + s.len()).sum();
        let mut out =
            Vec::with_capacity(MAGIC.len() + 8 + strings_len + self.len() * INSTRUCTION_SIZE);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&length_prefix("string pool", self.strings().len())?);
        for s in self.strings() {
            out.extend_from_slice(&length_prefix("string", s.len())?);
            out.extend_from_slice(s.as_bytes());
        }
        out.extend_from_slice(&length_prefix("instruction list", self.len())?);
        for instr in self.instructions() {
            out.extend_from_slice(&instr.to_bytes());
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);
        if reader.read_exact(MAGIC.len())? != MAGIC {
            return Err(DecodeError::BadMagic);
        }

        let string_count = reader.u32()? as usize;
        let mut strings = Vec::new();
        for index in 0..string_count {
            let len = reader.u32()? as usize;
            let raw = reader.read_exact(len)?;
            let s = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8 { index })?;
            strings.push(s.to_owned());
        }

        let count = reader.u32()? as usize;
        let mut instructions = Vec::new();
        for _ in 0..count {
            instructions.push(reader.instruction()?);
        }

        let trailing = reader.remaining();
        if trailing != 0 {
            return Err(DecodeError::TrailingBytes { count: trailing });
        }
        Program::with_strings(instructions, strings).map_err(|_| DecodeError::EmptyProgram)
    }
}

fn length_prefix(what: &'static str, len: usize) -> Result<[u8; 4], EncodeError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| EncodeError::TooLong { what, len })
}

/// Cursor over an input buffer.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Reads exactly `count` bytes and advances past them.
    fn read_exact(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        let data: &'a [u8] = self.data;
        let start = self.pos;
        let slice = start
            .checked_add(count)
            .and_then(|end| data.get(start..end))
            .ok_or(DecodeError::UnexpectedEnd {
                offset: start,
                needed: count - self.remaining().min(count),
            })?;
        self.pos += count;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn instruction(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.pos;
        let [tag] = self.array::<1>()?;
        let opcode =
            Opcode::try_from(tag).map_err(|opcode| DecodeError::InvalidOpcode { opcode, offset })?;
        let lhs = self.u64()?;
        let lhs = RegisterIndex::try_from(lhs)
            .map_err(|_| DecodeError::RegisterIndexOverflow { value: lhs })?;
        let rhs = self.u64()?;
        Ok(Instruction::new(opcode, lhs, rhs))
    }
}
