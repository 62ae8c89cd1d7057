//! The Opal virtual machine.
//!
//! Owns a compiled [`Program`](opal_compiler::Program) and executes it
//! in mixed mode: every function is handed to the template JIT before
//! `main` runs, and the interpreter drives the parts that stay in
//! bytecode (all of them under `--no-jit`). Runtime intrinsics live in
//! [`runtime`], both as safe `Result`-returning functions for the
//! interpreter and as C-ABI shims for native code.

pub mod frame;
pub mod interp;
pub mod runtime;
pub mod vm;

pub use vm::{Vm, VmConfig};
