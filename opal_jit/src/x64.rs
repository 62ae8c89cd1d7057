//! x86-64 backend modules.
//!
//! - `registers`: GPR/XMM definitions with hardware encodings
//! - `encoder`: low-level instruction encoding (REX/ModRM/SIB)
//! - `assembler`: code emission with labels and rel32 relocation
//! - `memory`: executable memory allocation

pub mod assembler;
pub mod encoder;
pub mod memory;
pub mod registers;

pub use assembler::{Assembler, Label};
pub use encoder::Cond;
pub use memory::ExecutableBuffer;
pub use registers::{Gpr, Xmm};
