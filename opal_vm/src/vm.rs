//! VM state and the run entry point.

use crate::frame::Frame;
use crate::interp;
use crate::runtime;
use opal_compiler::Program;
use opal_core::{OpalError, OpalResult};
use opal_gc::{Heap, RootStacks, DEFAULT_GC_THRESHOLD};
use opal_jit::JitCompiler;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// Runtime configuration, built by the driver from CLI flags.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Compile every function to native code before running `main`.
    pub jit_enabled: bool,
    /// Allocations between collections.
    pub gc_threshold: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            jit_enabled: true,
            gc_threshold: DEFAULT_GC_THRESHOLD,
        }
    }
}

impl VmConfig {
    /// Interpreter-only configuration (`--no-jit`).
    #[must_use]
    pub fn interpreter_only() -> Self {
        VmConfig {
            jit_enabled: false,
            ..Default::default()
        }
    }
}

/// The Opal virtual machine.
pub struct Vm {
    pub(crate) prog: Program,
    /// The interpreter's operand stack; always a GC root.
    pub(crate) estack: Vec<i64>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) heap: Heap,
    pub(crate) roots: RootStacks,
    pub(crate) jit: Option<JitCompiler>,
    pub(crate) rng: StdRng,
    /// Set on the first `time_ms()` call.
    pub(crate) time_origin: Option<Instant>,
}

impl Vm {
    /// Create a VM over a compiled program.
    #[must_use]
    pub fn new(prog: Program, config: VmConfig) -> Self {
        let jit = config
            .jit_enabled
            .then(|| JitCompiler::new(runtime::hooks()));
        Vm {
            prog,
            estack: Vec::new(),
            frames: Vec::new(),
            heap: Heap::new(config.gc_threshold),
            roots: RootStacks::new(),
            jit,
            rng: StdRng::from_entropy(),
            time_origin: None,
        }
    }

    /// The program being executed.
    #[inline]
    pub fn program(&self) -> &Program {
        &self.prog
    }

    /// The array heap (exposed for tests and diagnostics).
    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Run the named entry function and return its result word.
    ///
    /// When the JIT is enabled, every function in the program is
    /// compiled first; a function the JIT cannot produce stays on the
    /// interpreter.
    pub fn run(&mut self, entry: &str) -> OpalResult<i64> {
        let entry_id = self
            .prog
            .func_id(entry)
            .ok_or_else(|| OpalError::resolution(format!("entry function '{entry}' not found")))?;

        if let Some(jit) = self.jit.as_mut() {
            for fid in 0..self.prog.funcs.len() as u32 {
                // Failure leaves the function to the interpreter.
                let _ = jit.compile_function(&self.prog, fid);
            }
        }

        self.estack.clear();
        self.frames.clear();
        self.push_frame(entry_id, None)?;
        let start = self.prog.funcs[entry_id as usize].entry;
        interp::run(self, start)
    }

    /// Push a frame for `fid`; the top `arity` words become parameters
    /// and the remaining locals are zero-initialised.
    pub(crate) fn push_frame(&mut self, fid: u32, ret_ip: Option<usize>) -> OpalResult<()> {
        let func = &self.prog.funcs[fid as usize];
        if self.estack.len() < func.arity as usize {
            return Err(OpalError::stack(format!(
                "CALL: not enough arguments for function {}",
                func.name
            )));
        }

        let bp = self.estack.len() - func.arity as usize;
        for _ in func.arity..func.nlocals {
            self.estack.push(0);
        }

        self.frames.push(Frame {
            func_id: fid,
            ret_ip,
            bp,
            nlocals: func.nlocals,
        });
        Ok(())
    }

    /// Pop the current frame, preserving the return value on top.
    pub(crate) fn pop_frame(&mut self) -> OpalResult<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| OpalError::stack("RET: no frame"))?;
        let ret = self
            .estack
            .pop()
            .ok_or_else(|| OpalError::stack("RET: empty stack"))?;
        self.estack.truncate(frame.bp);
        self.estack.push(ret);
        Ok(())
    }
}
