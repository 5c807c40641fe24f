use std::fmt;

/// The machine's unsigned value type: register contents, immediates, and
/// string-pool indices.
pub type Word = u64;

/// Two's complement view of a [`Word`], used for jump displacements.
pub type SignedWord = i64;

/// Index into the register file.
pub type RegisterIndex = usize;

/// The 19 operations understood by the machine.
///
/// Opcodes come in pairs that share a handler shape and differ only in how
/// the `rhs` field is read: the plain form treats it as a register index, the
/// `c` form ("constant") uses it as a literal. The discriminants are the
/// stable tags used by the binary encoding and the dispatch table.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Add = 0,
    Addc = 1,
    Div = 2,
    Divc = 3,
    Eq = 4,
    Eqc = 5,
    Jmp = 6,
    Jmpc = 7,
    Mod = 8,
    Modc = 9,
    Mul = 10,
    Mulc = 11,
    Nop = 12,
    Print = 13,
    Printc = 14,
    Ret = 15,
    Retc = 16,
    Set = 17,
    Setc = 18,
}

/// How an instruction's `rhs` field is resolved at execution time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// `rhs` names a register whose current value is the operand.
    Register,
    /// `rhs` is the operand itself.
    Immediate,
}

/// Which fields an opcode reads. Drives the assembler and disassembler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// `op rL, x`: destination register plus operand.
    Binary,
    /// `op x`: operand only; `lhs` is ignored.
    Unary,
    /// `op`: no operands.
    Nullary,
}

impl Opcode {
    /// Number of opcodes, and the length of the dispatch table.
    pub const COUNT: usize = 19;

    /// All opcodes in tag order.
    pub const ALL: [Opcode; Opcode::COUNT] = [
        Opcode::Add,
        Opcode::Addc,
        Opcode::Div,
        Opcode::Divc,
        Opcode::Eq,
        Opcode::Eqc,
        Opcode::Jmp,
        Opcode::Jmpc,
        Opcode::Mod,
        Opcode::Modc,
        Opcode::Mul,
        Opcode::Mulc,
        Opcode::Nop,
        Opcode::Print,
        Opcode::Printc,
        Opcode::Ret,
        Opcode::Retc,
        Opcode::Set,
        Opcode::Setc,
    ];

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Addc => "addc",
            Opcode::Div => "div",
            Opcode::Divc => "divc",
            Opcode::Eq => "eq",
            Opcode::Eqc => "eqc",
            Opcode::Jmp => "jmp",
            Opcode::Jmpc => "jmpc",
            Opcode::Mod => "mod",
            Opcode::Modc => "modc",
            Opcode::Mul => "mul",
            Opcode::Mulc => "mulc",
            Opcode::Nop => "nop",
            Opcode::Print => "print",
            Opcode::Printc => "printc",
            Opcode::Ret => "ret",
            Opcode::Retc => "retc",
            Opcode::Set => "set",
            Opcode::Setc => "setc",
        }
    }

    /// Looks up an opcode by its (case-insensitive) mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        Opcode::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }

    pub const fn operand_kind(self) -> OperandKind {
        match self {
            Opcode::Add
            | Opcode::Div
            | Opcode::Eq
            | Opcode::Jmp
            | Opcode::Mod
            | Opcode::Mul
            | Opcode::Print
            | Opcode::Ret
            | Opcode::Set => OperandKind::Register,
            _ => OperandKind::Immediate,
        }
    }

    pub const fn shape(self) -> Shape {
        match self {
            Opcode::Jmp
            | Opcode::Jmpc
            | Opcode::Print
            | Opcode::Printc
            | Opcode::Ret
            | Opcode::Retc => Shape::Unary,
            Opcode::Nop => Shape::Nullary,
            _ => Shape::Binary,
        }
    }

    /// True for the two opcodes that end execution.
    pub const fn is_halt(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Retc)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Opcode::ALL.get(tag as usize).copied().ok_or(tag)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A single instruction: an opcode and its two operand fields.
///
/// `lhs` is always a register index (unused by unary and nullary opcodes).
/// `rhs` is a register index or a literal depending on
/// [`Opcode::operand_kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub lhs: RegisterIndex,
    pub rhs: Word,
}

impl Instruction {
    pub const fn new(opcode: Opcode, lhs: RegisterIndex, rhs: Word) -> Self {
        Self { opcode, lhs, rhs }
    }
}

/// Renders in assembler syntax, e.g. `addc r0 5`, `jmpc -3`, `ret r1`.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode;
        let rhs = match (op, op.operand_kind()) {
            (_, OperandKind::Register) => format!("r{}", self.rhs),
            (Opcode::Jmpc, _) => (self.rhs as SignedWord).to_string(),
            _ => self.rhs.to_string(),
        };
        match op.shape() {
            Shape::Binary => write!(f, "{op} r{} {rhs}", self.lhs),
            Shape::Unary => write!(f, "{op} {rhs}"),
            Shape::Nullary => write!(f, "{op}"),
        }
    }
}

/// Constructors named after the opcodes they build.
///
/// Register-operand forms take the source register as `rhs`; `c` forms take
/// the literal.
pub mod build {
    use super::{Instruction, Opcode, RegisterIndex, SignedWord, Word};

    pub const fn add(lhs: RegisterIndex, rhs: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Add, lhs, rhs as Word)
    }

    pub const fn addc(lhs: RegisterIndex, value: Word) -> Instruction {
        Instruction::new(Opcode::Addc, lhs, value)
    }

    pub const fn div(lhs: RegisterIndex, rhs: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Div, lhs, rhs as Word)
    }

    pub const fn divc(lhs: RegisterIndex, value: Word) -> Instruction {
        Instruction::new(Opcode::Divc, lhs, value)
    }

    pub const fn eq(lhs: RegisterIndex, rhs: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Eq, lhs, rhs as Word)
    }

    pub const fn eqc(lhs: RegisterIndex, value: Word) -> Instruction {
        Instruction::new(Opcode::Eqc, lhs, value)
    }

    pub const fn jmp(displacement: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Jmp, 0, displacement as Word)
    }

    pub const fn jmpc(displacement: SignedWord) -> Instruction {
        Instruction::new(Opcode::Jmpc, 0, displacement as Word)
    }

    pub const fn r#mod(lhs: RegisterIndex, rhs: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Mod, lhs, rhs as Word)
    }

    pub const fn modc(lhs: RegisterIndex, value: Word) -> Instruction {
        Instruction::new(Opcode::Modc, lhs, value)
    }

    pub const fn mul(lhs: RegisterIndex, rhs: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Mul, lhs, rhs as Word)
    }

    pub const fn mulc(lhs: RegisterIndex, value: Word) -> Instruction {
        Instruction::new(Opcode::Mulc, lhs, value)
    }

    pub const fn nop() -> Instruction {
        Instruction::new(Opcode::Nop, 0, 0)
    }

    pub const fn print(string: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Print, 0, string as Word)
    }

    pub const fn printc(string: Word) -> Instruction {
        Instruction::new(Opcode::Printc, 0, string)
    }

    pub const fn ret(result: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Ret, 0, result as Word)
    }

    pub const fn retc(value: Word) -> Instruction {
        Instruction::new(Opcode::Retc, 0, value)
    }

    pub const fn set(lhs: RegisterIndex, rhs: RegisterIndex) -> Instruction {
        Instruction::new(Opcode::Set, lhs, rhs as Word)
    }

    pub const fn setc(lhs: RegisterIndex, value: Word) -> Instruction {
        Instruction::new(Opcode::Setc, lhs, value)
    }
}
