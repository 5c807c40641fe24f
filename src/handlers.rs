//! One handler per opcode, and the table that dispatches to them.
//!
//! A handler receives the instruction's raw `lhs`/`rhs` fields and returns a
//! [`Flow`]: how far to move the program counter, or halt. Handlers never
//! touch the program counter themselves.

use std::io::Write;

use crate::error::MachineError;
use crate::isa::{Opcode, RegisterIndex, SignedWord, Word};
use crate::registers::RegisterFile;

/// Control-flow outcome of one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Move the program counter by this many slots (negative moves back).
    Advance(SignedWord),
    /// Stop; the engine derives the result from the halting instruction.
    Halt,
}

const NEXT: Flow = Flow::Advance(1);
const SKIP: Flow = Flow::Advance(2);

/// Everything a handler may read or mutate.
pub struct ExecState<'a> {
    pub registers: &'a mut RegisterFile,
    pub strings: &'a [String],
    pub out: &'a mut dyn Write,
}

pub type Handler = fn(&mut ExecState<'_>, RegisterIndex, Word) -> Result<Flow, MachineError>;

/// Opcode-indexed handler table. Entry `i` handles the opcode with tag `i`.
pub static DISPATCH_TABLE: [Handler; Opcode::COUNT] = [
    add, addc, div, divc, eq, eqc, jmp, jmpc, modulo, modc, mul, mulc, nop, print, printc, ret,
    retc, set, setc,
];

#[inline(always)]
pub fn dispatch(
    state: &mut ExecState<'_>,
    opcode: Opcode,
    lhs: RegisterIndex,
    rhs: Word,
) -> Result<Flow, MachineError> {
    DISPATCH_TABLE[opcode as usize](state, lhs, rhs)
}

/// `reg[lhs] = f(reg[lhs], x)`.
#[inline(always)]
fn update(
    state: &mut ExecState<'_>,
    lhs: RegisterIndex,
    x: Word,
    f: fn(Word, Word) -> Option<Word>,
) -> Result<Flow, MachineError> {
    let slot = state.registers.slot(lhs)?;
    *slot = f(*slot, x).ok_or(MachineError::DivisionByZero)?;
    Ok(NEXT)
}

fn wrapping_add(a: Word, b: Word) -> Option<Word> {
    Some(a.wrapping_add(b))
}

fn wrapping_mul(a: Word, b: Word) -> Option<Word> {
    Some(a.wrapping_mul(b))
}

fn add(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let x = state.registers.get_word_index(rhs)?;
    update(state, lhs, x, wrapping_add)
}

fn addc(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    update(state, lhs, rhs, wrapping_add)
}

fn div(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let x = state.registers.get_word_index(rhs)?;
    update(state, lhs, x, Word::checked_div)
}

fn divc(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    update(state, lhs, rhs, Word::checked_div)
}

fn modulo(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let x = state.registers.get_word_index(rhs)?;
    update(state, lhs, x, Word::checked_rem)
}

fn modc(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    update(state, lhs, rhs, Word::checked_rem)
}

fn mul(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let x = state.registers.get_word_index(rhs)?;
    update(state, lhs, x, wrapping_mul)
}

fn mulc(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    update(state, lhs, rhs, wrapping_mul)
}

fn set(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let x = state.registers.get_word_index(rhs)?;
    state.registers.set(lhs, x)?;
    Ok(NEXT)
}

fn setc(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    state.registers.set(lhs, rhs)?;
    Ok(NEXT)
}

/// Compare-and-skip: fall through on equality, skip one slot otherwise.
#[inline(always)]
fn compare(state: &ExecState<'_>, lhs: RegisterIndex, x: Word) -> Result<Flow, MachineError> {
    if state.registers.get(lhs)? == x {
        Ok(NEXT)
    } else {
        Ok(SKIP)
    }
}

fn eq(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let x = state.registers.get_word_index(rhs)?;
    compare(state, lhs, x)
}

fn eqc(state: &mut ExecState<'_>, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    compare(state, lhs, rhs)
}

/// A negative displacement `d` moves back `|d|` slots from the jump itself;
/// a non-negative one skips `d` slots past the natural successor.
#[inline(always)]
fn relative_jump(displacement: Word) -> Flow {
    let d = displacement as SignedWord;
    if d < 0 {
        Flow::Advance(d)
    } else {
        // Saturating: a displacement of i64::MAX is out of range either way.
        Flow::Advance(d.saturating_add(1))
    }
}

fn jmp(state: &mut ExecState<'_>, _lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let d = state.registers.get_word_index(rhs)?;
    Ok(relative_jump(d))
}

fn jmpc(_state: &mut ExecState<'_>, _lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    Ok(relative_jump(rhs))
}

fn nop(_state: &mut ExecState<'_>, _lhs: RegisterIndex, _rhs: Word) -> Result<Flow, MachineError> {
    Ok(NEXT)
}

/// Writes string-pool entry `index` to the output sink.
fn emit(state: &mut ExecState<'_>, index: Word) -> Result<Flow, MachineError> {
    let text = usize::try_from(index)
        .ok()
        .and_then(|i| state.strings.get(i))
        .ok_or(MachineError::StringOutOfBounds {
            index,
            count: state.strings.len(),
        })?;
    state.out.write_all(text.as_bytes())?;
    Ok(NEXT)
}

fn print(state: &mut ExecState<'_>, _lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    let index = state.registers.get_word_index(rhs)?;
    emit(state, index)
}

fn printc(state: &mut ExecState<'_>, _lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
    emit(state, rhs)
}

// The result is computed by the engine once the loop has stopped.
fn ret(_state: &mut ExecState<'_>, _lhs: RegisterIndex, _rhs: Word) -> Result<Flow, MachineError> {
    Ok(Flow::Halt)
}

fn retc(_state: &mut ExecState<'_>, _lhs: RegisterIndex, _rhs: Word) -> Result<Flow, MachineError> {
    Ok(Flow::Halt)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        registers: RegisterFile,
        strings: Vec<String>,
        out: Vec<u8>,
    }

    impl Fixture {
        fn new(values: &[Word]) -> Self {
            let mut registers = RegisterFile::new(values.len());
            for (i, &v) in values.iter().enumerate() {
                registers.set(i, v).unwrap();
            }
            Self {
                registers,
                strings: vec!["hello".to_string(), ", world\n".to_string()],
                out: Vec::new(),
            }
        }

        fn exec(&mut self, opcode: Opcode, lhs: RegisterIndex, rhs: Word) -> Result<Flow, MachineError> {
            let mut state = ExecState {
                registers: &mut self.registers,
                strings: &self.strings,
                out: &mut self.out,
            };
            dispatch(&mut state, opcode, lhs, rhs)
        }

        fn reg(&self, index: RegisterIndex) -> Word {
            self.registers.get(index).unwrap()
        }
    }

    #[test]
    fn test_add_register_and_immediate() {
        let mut fx = Fixture::new(&[10, 32]);
        assert_eq!(fx.exec(Opcode::Add, 0, 1).unwrap(), Flow::Advance(1));
        assert_eq!(fx.reg(0), 42);
        assert_eq!(fx.exec(Opcode::Addc, 0, 8).unwrap(), Flow::Advance(1));
        assert_eq!(fx.reg(0), 50);
        assert_eq!(fx.reg(1), 32);
    }

    #[test]
    fn test_add_wraps() {
        let mut fx = Fixture::new(&[Word::MAX]);
        fx.exec(Opcode::Addc, 0, 2).unwrap();
        assert_eq!(fx.reg(0), 1);
    }

    #[test]
    fn test_mul_wraps() {
        let mut fx = Fixture::new(&[1 << 63, 2]);
        fx.exec(Opcode::Mul, 0, 1).unwrap();
        assert_eq!(fx.reg(0), 0);
    }

    #[test]
    fn test_div_and_mod() {
        let mut fx = Fixture::new(&[17, 5]);
        fx.exec(Opcode::Mod, 0, 1).unwrap();
        assert_eq!(fx.reg(0), 2);
        fx.exec(Opcode::Setc, 0, 17).unwrap();
        fx.exec(Opcode::Div, 0, 1).unwrap();
        assert_eq!(fx.reg(0), 3);
        fx.exec(Opcode::Divc, 0, 2).unwrap();
        assert_eq!(fx.reg(0), 1);
        fx.exec(Opcode::Setc, 0, 9).unwrap();
        fx.exec(Opcode::Modc, 0, 4).unwrap();
        assert_eq!(fx.reg(0), 1);
    }

    #[test]
    fn test_division_by_zero_leaves_register() {
        let mut fx = Fixture::new(&[7, 0]);
        for (op, rhs) in [
            (Opcode::Div, 1),
            (Opcode::Divc, 0),
            (Opcode::Mod, 1),
            (Opcode::Modc, 0),
        ] {
            assert!(matches!(
                fx.exec(op, 0, rhs),
                Err(MachineError::DivisionByZero)
            ));
            assert_eq!(fx.reg(0), 7);
        }
    }

    #[test]
    fn test_set_and_setc() {
        let mut fx = Fixture::new(&[0, 123]);
        fx.exec(Opcode::Set, 0, 1).unwrap();
        assert_eq!(fx.reg(0), 123);
        fx.exec(Opcode::Setc, 1, 7).unwrap();
        assert_eq!(fx.reg(1), 7);
    }

    #[test]
    fn test_eq_skips_on_mismatch() {
        let mut fx = Fixture::new(&[3, 3, 4]);
        assert_eq!(fx.exec(Opcode::Eq, 0, 1).unwrap(), Flow::Advance(1));
        assert_eq!(fx.exec(Opcode::Eq, 0, 2).unwrap(), Flow::Advance(2));
        assert_eq!(fx.exec(Opcode::Eqc, 0, 3).unwrap(), Flow::Advance(1));
        assert_eq!(fx.exec(Opcode::Eqc, 0, 4).unwrap(), Flow::Advance(2));
    }

    #[test]
    fn test_jump_displacements() {
        let mut fx = Fixture::new(&[0, 5, (-3i64) as Word]);
        assert_eq!(fx.exec(Opcode::Jmpc, 0, 0).unwrap(), Flow::Advance(1));
        assert_eq!(fx.exec(Opcode::Jmpc, 0, 4).unwrap(), Flow::Advance(5));
        assert_eq!(
            fx.exec(Opcode::Jmpc, 0, (-2i64) as Word).unwrap(),
            Flow::Advance(-2)
        );
        assert_eq!(fx.exec(Opcode::Jmp, 0, 1).unwrap(), Flow::Advance(6));
        assert_eq!(fx.exec(Opcode::Jmp, 0, 2).unwrap(), Flow::Advance(-3));
    }

    #[test]
    fn test_jump_max_displacement_saturates() {
        let mut fx = Fixture::new(&[]);
        assert_eq!(
            fx.exec(Opcode::Jmpc, 0, i64::MAX as Word).unwrap(),
            Flow::Advance(i64::MAX)
        );
    }

    #[test]
    fn test_ret_family_halts_without_side_effects() {
        let mut fx = Fixture::new(&[9]);
        assert_eq!(fx.exec(Opcode::Ret, 0, 0).unwrap(), Flow::Halt);
        assert_eq!(fx.exec(Opcode::Retc, 0, 1234).unwrap(), Flow::Halt);
        assert_eq!(fx.reg(0), 9);
    }

    #[test]
    fn test_nop() {
        let mut fx = Fixture::new(&[1]);
        assert_eq!(fx.exec(Opcode::Nop, 77, 88).unwrap(), Flow::Advance(1));
        assert_eq!(fx.reg(0), 1);
    }

    #[test]
    fn test_print_from_pool() {
        let mut fx = Fixture::new(&[1]);
        fx.exec(Opcode::Printc, 0, 0).unwrap();
        fx.exec(Opcode::Print, 0, 0).unwrap();
        assert_eq!(String::from_utf8(fx.out.clone()).unwrap(), "hello, world\n");
    }

    #[test]
    fn test_print_unknown_string() {
        let mut fx = Fixture::new(&[]);
        assert!(matches!(
            fx.exec(Opcode::Printc, 0, 2),
            Err(MachineError::StringOutOfBounds { index: 2, count: 2 })
        ));
        assert!(fx.out.is_empty());
    }

    #[test]
    fn test_register_operand_out_of_bounds() {
        let mut fx = Fixture::new(&[1, 2]);
        assert!(matches!(
            fx.exec(Opcode::Add, 0, 2),
            Err(MachineError::RegisterOutOfBounds { index: 2, count: 2 })
        ));
        assert!(matches!(
            fx.exec(Opcode::Addc, 5, 1),
            Err(MachineError::RegisterOutOfBounds { index: 5, count: 2 })
        ));
        assert!(matches!(
            fx.exec(Opcode::Jmp, 0, Word::MAX),
            Err(MachineError::RegisterOutOfBounds { .. })
        ));
    }
}
