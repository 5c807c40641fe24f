//! Canned programs with their parameters bound in as immediates.

use crate::isa::build::*;
use crate::isa::{Instruction, Word};

/// Registers used by [`fibonacci_program`].
pub const FIBONACCI_REGISTERS: usize = 4;

/// Registers used by [`mul2_program`].
pub const MUL2_REGISTERS: usize = 3;

// `addc r, DEC` subtracts one: the instruction set has no subtraction.
const DEC: Word = Word::MAX;

/// Iterative Fibonacci: returns F(n) with F(0) = 0, F(1) = 1, wrapping on
/// overflow.
///
/// r0/r1 hold the current pair, r2 counts down from `n`, r3 is scratch.
pub fn fibonacci_program(n: Word) -> [Instruction; 12] {
    [
        setc(0, 0),
        setc(1, 1),
        setc(2, n),
        // loop:
        eqc(2, 0),
        jmpc(6), // -> done
        set(3, 0),
        add(3, 1),
        set(0, 1),
        set(1, 3),
        addc(2, DEC),
        jmpc(-7), // -> loop
        // done:
        ret(0),
    ]
}

/// Multiplies `a` by `b` through `b` repeated additions of `a`.
///
/// r0 accumulates, r1 holds `a`, r2 counts down from `b`.
pub fn mul2_program(a: Word, b: Word) -> Vec<Instruction> {
    vec![
        setc(0, 0),
        setc(1, a),
        setc(2, b),
        // loop:
        eqc(2, 0),
        jmpc(3), // -> done
        add(0, 1),
        addc(2, DEC),
        jmpc(-4), // -> loop
        // done:
        ret(0),
    ]
}
