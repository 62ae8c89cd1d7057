//! Per-function template JIT for Opal bytecode.
//!
//! Compilation is two linear passes: a dataflow pass that decodes the
//! function and computes operand-stack liveness (`liveness`), then an
//! emission pass that maps every bytecode instruction to a fixed native
//! sequence under one register discipline (`compiler`). The `x64`
//! module is the backend: register definitions, instruction encoder,
//! label-aware assembler, and executable memory.

pub mod compiler;
pub mod liveness;
pub mod x64;

pub use compiler::{CompiledFn, JitCompiler, JitContext, RuntimeHooks};
