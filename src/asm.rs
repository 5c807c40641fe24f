//! Text assembler.
//!
//! One instruction per line, `;` starts a comment, operands are separated by
//! commas or whitespace:
//!
//! ```text
//! .string "hello\n"     ; pool entry 0
//!     setc r0, 10
//!     printc 0
//!     jmpc -2
//!     ret r0
//! ```
//!
//! Registers are written `rN`. Immediates are decimal, negative decimal
//! (stored as two's complement) or `0x` hex. A leading `NNNN:` address token
//! is ignored, so [`Program::disassemble`] output assembles unchanged.

use crate::error::{AsmError, AsmErrorKind};
use crate::isa::{Instruction, Opcode, OperandKind, RegisterIndex, Shape, SignedWord, Word};
use crate::program::Program;

pub fn assemble(source: &str) -> Result<Program, AsmError> {
    let mut instructions = Vec::new();
    let mut strings = Vec::new();

    for (i, raw) in source.lines().enumerate() {
        let line = i + 1;
        let at = |kind: AsmErrorKind| AsmError { line, kind };
        let text = raw.trim();

        if let Some(directive) = text.strip_prefix('.') {
            let (name, rest) = directive
                .split_once(char::is_whitespace)
                .unwrap_or((directive, ""));
            match name {
                "string" => strings.push(parse_string_directive(rest).map_err(at)?),
                _ => return Err(at(AsmErrorKind::UnknownDirective(name.to_string()))),
            }
            continue;
        }

        let code = text.split_once(';').map_or(text, |(code, _)| code);
        let mut tokens: Vec<&str> = code
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.first().is_some_and(|t| is_address(t)) {
            tokens.remove(0);
        }
        let Some((&mnemonic, operands)) = tokens.split_first() else {
            continue;
        };
        instructions.push(parse_instruction(mnemonic, operands).map_err(at)?);
    }

    Program::with_strings(instructions, strings).map_err(|_| AsmError {
        line: source.lines().count(),
        kind: AsmErrorKind::EmptyProgram,
    })
}

fn is_address(token: &str) -> bool {
    token
        .strip_suffix(':')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_instruction(mnemonic: &str, operands: &[&str]) -> Result<Instruction, AsmErrorKind> {
    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| AsmErrorKind::UnknownMnemonic(mnemonic.to_string()))?;
    let (lhs, rhs) = match (opcode.shape(), operands) {
        (Shape::Nullary, []) => (0, 0),
        (Shape::Unary, [rhs]) => (0, parse_operand(opcode, rhs)?),
        (Shape::Binary, [lhs, rhs]) => (parse_lhs(lhs)?, parse_operand(opcode, rhs)?),
        (shape, _) => {
            return Err(AsmErrorKind::ArityMismatch {
                mnemonic: opcode.mnemonic(),
                expected: match shape {
                    Shape::Binary => 2,
                    Shape::Unary => 1,
                    Shape::Nullary => 0,
                },
                actual: operands.len(),
            });
        }
    };
    Ok(Instruction::new(opcode, lhs, rhs))
}

fn parse_lhs(token: &str) -> Result<RegisterIndex, AsmErrorKind> {
    let index = parse_register(token)?;
    RegisterIndex::try_from(index).map_err(|_| AsmErrorKind::ExpectedRegister(token.to_string()))
}

fn parse_operand(opcode: Opcode, token: &str) -> Result<Word, AsmErrorKind> {
    match opcode.operand_kind() {
        OperandKind::Register => parse_register(token),
        OperandKind::Immediate => parse_immediate(token),
    }
}

fn parse_register(token: &str) -> Result<Word, AsmErrorKind> {
    token
        .strip_prefix(['r', 'R'])
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| AsmErrorKind::ExpectedRegister(token.to_string()))
}

/// Parses an immediate operand: `42`, `-3` (two's complement) or `0xff`.
pub fn parse_immediate(token: &str) -> Result<Word, AsmErrorKind> {
    let invalid = || AsmErrorKind::InvalidImmediate(token.to_string());
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return Word::from_str_radix(hex, 16).map_err(|_| invalid());
    }
    if token.starts_with('-') {
        return token
            .parse::<SignedWord>()
            .map(|v| v as Word)
            .map_err(|_| invalid());
    }
    token.parse::<Word>().map_err(|_| invalid())
}

/// Parses `"..."` followed by an optional comment.
fn parse_string_directive(rest: &str) -> Result<String, AsmErrorKind> {
    let body = rest
        .trim_start()
        .strip_prefix('"')
        .ok_or(AsmErrorKind::MalformedString)?;

    let mut out = String::new();
    let mut chars = body.char_indices();
    let tail = loop {
        let (i, c) = chars.next().ok_or(AsmErrorKind::MalformedString)?;
        match c {
            '"' => break &body[i + 1..],
            '\\' => out.push(unescape(&mut chars)?),
            c => out.push(c),
        }
    };

    let tail = tail.trim_start();
    if tail.is_empty() || tail.starts_with(';') {
        Ok(out)
    } else {
        Err(AsmErrorKind::MalformedString)
    }
}

fn unescape(chars: &mut std::str::CharIndices<'_>) -> Result<char, AsmErrorKind> {
    let (_, c) = chars.next().ok_or(AsmErrorKind::MalformedString)?;
    Ok(match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        '\\' | '"' | '\'' => c,
        'u' => {
            if chars.next().map(|(_, c)| c) != Some('{') {
                return Err(AsmErrorKind::MalformedString);
            }
            let mut hex = String::new();
            loop {
                match chars.next() {
                    Some((_, '}')) => break,
                    Some((_, c)) if c.is_ascii_hexdigit() && hex.len() < 6 => hex.push(c),
                    _ => return Err(AsmErrorKind::MalformedString),
                }
            }
            u32::from_str_radix(&hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or(AsmErrorKind::MalformedString)?
        }
        _ => return Err(AsmErrorKind::MalformedString),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::build::*;
    use crate::machine::{Machine, RunConfig};
    use crate::programs::{fibonacci_program, mul2_program};

    fn err_kind(source: &str) -> AsmErrorKind {
        assemble(source).unwrap_err().kind
    }

    #[test]
    fn test_assemble_basic() {
        let program = assemble(
            "
            ; count down from three
            setc r0, 3
            addc r0 -1   ; decrement
            eqc r0, 0
            jmpc -3
            ret r0
            ",
        )
        .unwrap();
        assert_eq!(
            program.instructions(),
            &[setc(0, 3), addc(0, Word::MAX), eqc(0, 0), jmpc(-3), ret(0)]
        );
    }

    #[test]
    fn test_mnemonics_case_insensitive() {
        let program = assemble("NOP\nRetC 0x2A").unwrap();
        assert_eq!(program.instructions(), &[nop(), retc(42)]);
    }

    #[test]
    fn test_disassembly_reassembles() {
        for program in [
            Program::new(fibonacci_program(20)).unwrap(),
            Program::new(mul2_program(3, 4)).unwrap(),
            Program::with_strings(
                [printc(1), print(2), jmp(0), divc(1, 3), r#mod(2, 1), retc(0)],
                vec![
                    "tab\there".to_string(),
                    "quote \" and \\ and ; semicolon".to_string(),
                    "bell\u{7}".to_string(),
                ],
            )
            .unwrap(),
        ] {
            assert_eq!(assemble(&program.disassemble()), Ok(program));
        }
    }

    #[test]
    fn test_assembled_program_runs() {
        let source = "
            .string \"hi\\n\"
            printc 0
            setc r1, 6
            mulc r1, 7
            ret r1
        ";
        let mut vm = Machine::new(2);
        vm.load_program(assemble(source).unwrap());
        let mut out = Vec::new();
        let report = vm.run_with(&RunConfig::default(), &mut out).unwrap();
        assert_eq!(report.value, 42);
        assert_eq!(out, b"hi\n");
    }

    #[test]
    fn test_string_escapes() {
        let program = assemble(".string \"a\\u{e9}\\0\\'\" ; note\nnop").unwrap();
        assert_eq!(program.strings(), &["a\u{e9}\0'".to_string()]);
    }

    #[test]
    fn test_errors_carry_line() {
        let err = assemble("nop\nbogus r0").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, AsmErrorKind::UnknownMnemonic("bogus".into()));
    }

    #[test]
    fn test_arity_mismatch() {
        assert_eq!(
            err_kind("addc r0"),
            AsmErrorKind::ArityMismatch {
                mnemonic: "addc",
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(
            err_kind("nop r1"),
            AsmErrorKind::ArityMismatch {
                mnemonic: "nop",
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn test_operand_errors() {
        assert_eq!(err_kind("add r0, 5"), AsmErrorKind::ExpectedRegister("5".into()));
        assert_eq!(err_kind("setc x, 5"), AsmErrorKind::ExpectedRegister("x".into()));
        assert_eq!(err_kind("setc r0, r1"), AsmErrorKind::InvalidImmediate("r1".into()));
        assert_eq!(err_kind("retc 0xzz"), AsmErrorKind::InvalidImmediate("0xzz".into()));
    }

    #[test]
    fn test_directive_errors() {
        assert_eq!(err_kind(".word 3"), AsmErrorKind::UnknownDirective("word".into()));
        assert_eq!(err_kind(".string \"open"), AsmErrorKind::MalformedString);
        assert_eq!(err_kind(".string bare"), AsmErrorKind::MalformedString);
        assert_eq!(err_kind(".string \"x\" junk"), AsmErrorKind::MalformedString);
        assert_eq!(err_kind(".string \"\\q\""), AsmErrorKind::MalformedString);
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(err_kind("; nothing\n\n"), AsmErrorKind::EmptyProgram);
        assert_eq!(err_kind(".string \"only data\""), AsmErrorKind::EmptyProgram);
    }

    #[test]
    fn test_parse_immediate() {
        assert_eq!(parse_immediate("0"), Ok(0));
        assert_eq!(parse_immediate("-1"), Ok(Word::MAX));
        assert_eq!(parse_immediate("0XFF"), Ok(255));
        assert_eq!(parse_immediate("18446744073709551615"), Ok(Word::MAX));
        assert!(parse_immediate("18446744073709551616").is_err());
        assert!(parse_immediate("").is_err());
    }
}
