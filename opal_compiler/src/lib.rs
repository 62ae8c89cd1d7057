//! Front-end and bytecode model for the Opal VM.
//!
//! The pipeline is: source text → [`lexer`] token stream → [`parser`]
//! AST → [`lower`] stack bytecode. The [`bytecode`] module defines the
//! instruction set, the operand codec, and the program/function tables;
//! [`analysis`] computes the per-function maximum operand-stack height
//! the JIT uses to size native frames.

pub mod analysis;
pub mod ast;
pub mod bytecode;
pub mod lexer;
pub mod lower;
pub mod parser;

pub use bytecode::{CodeBuf, Function, Opcode, Program};

use opal_core::OpalResult;

/// Compile source text into a ready-to-run [`Program`].
pub fn compile(source: &str) -> OpalResult<Program> {
    let tokens = lexer::Lexer::new(source).lex()?;
    let module = parser::Parser::new(tokens).parse_module()?;
    lower::lower_module(&module)
}
