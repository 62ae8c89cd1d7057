//! Bytecode model: instruction set, operand codec, and program tables.
//!
//! The instruction stream is a flat byte buffer: 1 opcode byte followed
//! by 0, 4, 8, or 12 bytes of little-endian inline immediates. Jump
//! targets are absolute byte offsets into the buffer, patched during
//! emission.

pub mod builder;
pub mod instruction;

pub use builder::{CodeBuf, Function, Program};
pub use instruction::Opcode;
