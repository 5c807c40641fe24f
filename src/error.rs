use std::io;

use thiserror::Error;

use crate::isa::{Opcode, SignedWord, Word};

/// Errors that terminate a [`Machine::run`](crate::machine::Machine::run) or
/// reject a register access.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("register r{index} out of bounds ({count} registers)")]
    RegisterOutOfBounds { index: Word, count: usize },
    #[error("program counter {pc} advanced by {offset} leaves the program ({len} instructions)")]
    ProgramCounterOutOfBounds {
        pc: usize,
        offset: SignedWord,
        len: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("execution halted on non-halting opcode {opcode}")]
    UnexpectedHaltOpcode { opcode: Opcode },
    #[error("step limit exceeded (limit {limit})")]
    StepLimitExceeded { limit: u64 },
    #[error("string {index} out of bounds ({count} strings in pool)")]
    StringOutOfBounds { index: Word, count: usize },
    #[error("failed to write program output: {0}")]
    Output(#[from] io::Error),
    #[error("cannot load an empty program")]
    EmptyProgram,
}

/// Errors raised while decoding the binary program format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing RVM magic header")]
    BadMagic,
    #[error("unexpected end of input at byte {offset} ({needed} more bytes needed)")]
    UnexpectedEnd { offset: usize, needed: usize },
    #[error("invalid opcode {opcode:#04x} at byte {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("register index {value} does not fit this platform")]
    RegisterIndexOverflow { value: u64 },
    #[error("string {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },
    #[error("{count} trailing bytes after program")]
    TrailingBytes { count: usize },
    #[error("program contains no instructions")]
    EmptyProgram,
}

/// Errors raised while encoding a program to the binary format.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{what} length {len} exceeds the format's u32 limit")]
    TooLong { what: &'static str, len: usize },
}

/// Errors raised by the assembler, tagged with a 1-based source line.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct AsmError {
    pub line: usize,
    pub kind: AsmErrorKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmErrorKind {
    #[error("unknown mnemonic {0:?}")]
    UnknownMnemonic(String),
    #[error("{mnemonic} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        mnemonic: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("expected register, got {0:?}")]
    ExpectedRegister(String),
    #[error("invalid immediate {0:?}")]
    InvalidImmediate(String),
    #[error("unknown directive {0:?}")]
    UnknownDirective(String),
    #[error("malformed string literal")]
    MalformedString,
    #[error("program contains no instructions")]
    EmptyProgram,
}
