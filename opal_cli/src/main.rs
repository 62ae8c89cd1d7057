//! Opal: a small imperative language on a mixed-mode VM.
//!
//! The driver wires the pipeline: read source, compile to bytecode,
//! pre-compile every function with the template JIT (unless disabled),
//! and call `main`. Runtime errors, including those unwound out of
//! native frames, are caught here and printed as `Error: <msg>`.

mod args;

use opal_core::{OpalError, OpalResult};
use opal_vm::{Vm, VmConfig};
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match args::parse(&raw) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(2);
        }
    };

    let source = match std::fs::read_to_string(&parsed.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: cannot open {}: {e}", parsed.file);
            return ExitCode::from(1);
        }
    };

    let config = VmConfig {
        jit_enabled: parsed.jit_enabled,
        gc_threshold: parsed.gc_threshold,
    };

    match execute(&source, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Compile and run `main`; the program's return value is discarded.
fn execute(source: &str, config: VmConfig) -> OpalResult<()> {
    let prog = opal_compiler::compile(source)?;
    let mut vm = Vm::new(prog, config);

    // Intrinsic errors raised inside JIT'd code arrive as panics with
    // an OpalError payload; fold them into the ordinary error path.
    match std::panic::catch_unwind(AssertUnwindSafe(|| vm.run("main"))) {
        Ok(result) => {
            result?;
            Ok(())
        }
        Err(payload) => match payload.downcast::<OpalError>() {
            Ok(err) => Err(*err),
            Err(other) => std::panic::resume_unwind(other),
        },
    }
}
