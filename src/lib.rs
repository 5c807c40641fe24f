//! A small register-based bytecode interpreter.

pub mod isa;
pub mod error;
pub mod registers;
pub mod program;
pub mod handlers;
pub mod machine;
pub mod programs;
pub mod encoding;
pub mod asm;
pub mod bench;
