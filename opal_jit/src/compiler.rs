//! Per-function template compilation.
//!
//! One emission pass over the decoded instructions, one fixed native
//! sequence per opcode, under a register discipline that is stable for
//! the whole function:
//!
//! - `r15`: context pointer (the [`JitContext`] argument)
//! - `rbx`: locals base, loaded once in the prologue
//! - `r12`: operand-stack base, loaded once in the prologue
//! - `r13`: operand-stack index, zero at entry
//!
//! All four are callee-saved, so calls into runtime intrinsics preserve
//! them. Before any call that can trigger a collection, the current
//! stack index is written to `JitContext::stack_size`; the collector
//! reads live counts only through that field, which makes the single
//! store the whole root-publication protocol.

use crate::liveness::{self, JitInstr};
use crate::x64::{Assembler, Cond, ExecutableBuffer, Gpr, Label, Xmm};
use opal_compiler::bytecode::{Opcode, Program};
use opal_core::{OpalError, OpalResult};
use rustc_hash::FxHashMap;
use std::ffi::c_void;

/// The context a native frame executes against. Field order is ABI:
/// emitted code addresses these by fixed offset.
#[repr(C)]
pub struct JitContext {
    /// Locals slab, `nlocals` words.
    pub locals: *mut i64,
    /// Operand stack, `max_stack` words.
    pub stack: *mut i64,
    /// Live prefix of `stack`; published before GC-triggering calls.
    pub stack_size: usize,
    /// The owning VM, passed through to intrinsics.
    pub vm: *mut c_void,
}

const CTX_LOCALS: i32 = 0;
const CTX_STACK: i32 = 8;
const CTX_STACK_SIZE: i32 = 16;
const CTX_VM: i32 = 24;

/// Signature of compiled functions.
pub type CompiledFn = unsafe extern "C-unwind" fn(*mut JitContext) -> i64;

/// Entry addresses of the runtime intrinsics the templates call.
///
/// Addresses rather than function types keep this crate independent of
/// the VM that implements them; the VM fills the table from its
/// `extern "C-unwind"` shims.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeHooks {
    /// `fn(vm, fid: u32, args: *const i64, argc: u32) -> i64`
    pub call_function: u64,
    /// `fn(vm, size: i64) -> i64`
    pub array_new: u64,
    /// `fn(vm, handle: i64, idx: i64) -> i64`
    pub array_get: u64,
    /// `fn(vm, handle: i64, idx: i64, val: i64)`
    pub array_set: u64,
    /// `fn(vm, handle: i64) -> i64`
    pub array_len: u64,
    /// `fn(v: i64)`
    pub print: u64,
    /// `fn(bits: i64)`
    pub print_f: u64,
    /// `fn(vm, handle: i64, len: i64)`
    pub print_big: u64,
    /// `fn(vm) -> i64`
    pub time_ms: u64,
    /// `fn(vm) -> i64`
    pub rand: u64,
    /// `fn(vm, opcode: u32) -> !`; raises the division-by-zero error.
    pub div_zero: u64,
}

struct CompiledEntry {
    // Keeps the mapping alive for as long as the entry pointer is used.
    _buf: ExecutableBuffer,
    entry: CompiledFn,
}

/// The template JIT compiler: per-function codegen plus the table of
/// finished functions.
pub struct JitCompiler {
    hooks: RuntimeHooks,
    compiled: FxHashMap<u32, CompiledEntry>,
}

// Register roles, named once.
const CTX: Gpr = Gpr::R15;
const LOCALS: Gpr = Gpr::Rbx;
const STACK: Gpr = Gpr::R12;
const SIDX: Gpr = Gpr::R13;

impl JitCompiler {
    /// Create a compiler over the given intrinsic table.
    #[must_use]
    pub fn new(hooks: RuntimeHooks) -> Self {
        JitCompiler {
            hooks,
            compiled: FxHashMap::default(),
        }
    }

    /// Whether a function has been compiled.
    #[inline]
    pub fn is_compiled(&self, fid: u32) -> bool {
        self.compiled.contains_key(&fid)
    }

    /// Number of compiled functions.
    #[inline]
    pub fn compiled_count(&self) -> usize {
        self.compiled.len()
    }

    /// Entry point of a compiled function.
    #[inline]
    pub fn compiled_fn(&self, fid: u32) -> Option<CompiledFn> {
        self.compiled.get(&fid).map(|e| e.entry)
    }

    /// Compile one function of `prog` and record its entry point.
    pub fn compile_function(&mut self, prog: &Program, fid: u32) -> OpalResult<()> {
        let func = prog
            .funcs
            .get(fid as usize)
            .ok_or_else(|| OpalError::internal(format!("no function with id {fid}")))?;

        let mut fc = liveness::decode_function(&prog.code, func).ok_or_else(|| {
            OpalError::internal(format!("undecodable bytecode in '{}'", func.name))
        })?;
        liveness::analyze(&mut fc, func.end);

        let mut asm = Assembler::new();

        // One label per branch target.
        let mut labels: FxHashMap<usize, Label> = FxHashMap::default();
        for ins in &fc.instrs {
            if ins.has_jump && !labels.contains_key(&ins.jmp_target) {
                let l = asm.create_label();
                labels.insert(ins.jmp_target, l);
            }
        }

        self.emit_prologue(&mut asm);
        for ins in &fc.instrs {
            if let Some(&l) = labels.get(&ins.ip) {
                asm.bind_label(l);
            }
            self.emit_instruction(&mut asm, ins, &labels);
        }

        let code = asm.finalize()?;
        let buf = ExecutableBuffer::from_code(&code)?;
        // Safety: the buffer holds code emitted for exactly this
        // signature and is finalised before any call.
        let entry: CompiledFn = unsafe { buf.as_fn() };
        self.compiled.insert(fid, CompiledEntry { _buf: buf, entry });
        Ok(())
    }

    /// Save callee-saved registers, load the bases, zero the index.
    fn emit_prologue(&self, asm: &mut Assembler) {
        asm.push(Gpr::Rbp);
        asm.mov_rr(Gpr::Rbp, Gpr::Rsp);
        asm.push(Gpr::Rbx);
        asm.push(Gpr::R12);
        asm.push(Gpr::R13);
        asm.push(Gpr::R14);
        asm.push(Gpr::R15);
        // Keep rsp 16-byte aligned at every intrinsic call site.
        asm.sub_ri(Gpr::Rsp, 8);

        asm.mov_rr(CTX, Gpr::Rdi);
        asm.load(LOCALS, CTX, CTX_LOCALS);
        asm.load(STACK, CTX, CTX_STACK);
        asm.xor_rr(SIDX, SIDX);
    }

    /// Restore registers and return; the value is already in rax.
    fn emit_epilogue(&self, asm: &mut Assembler) {
        asm.add_ri(Gpr::Rsp, 8);
        asm.pop(Gpr::R15);
        asm.pop(Gpr::R14);
        asm.pop(Gpr::R13);
        asm.pop(Gpr::R12);
        asm.pop(Gpr::Rbx);
        asm.pop(Gpr::Rbp);
        asm.ret();
    }

    fn emit_instruction(
        &self,
        asm: &mut Assembler,
        ins: &JitInstr,
        labels: &FxHashMap<usize, Label>,
    ) {
        let need_value = ins.produce > 0 && ins.result_live;
        let need_exec = ins.side_effect || need_value;

        if !need_exec {
            // Dead value: skip the work, keep the stack shape. The slot
            // is zeroed so the collector never sees a stale word below
            // a published stack size.
            if ins.produce > 0 {
                adjust_stack(asm, -(ins.consume as i32));
                asm.store_indexed_imm(STACK, SIDX, 0);
                adjust_stack(asm, ins.produce as i32);
            } else {
                adjust_stack(asm, ins.produce as i32 - ins.consume as i32);
            }
            return;
        }

        match ins.op {
            Opcode::Nop => {}

            Opcode::Iconst | Opcode::Fconst => {
                asm.mov_ri64(Gpr::Rax, ins.imm64);
                self.push_rax(asm);
            }

            Opcode::Load => {
                asm.load(Gpr::Rax, LOCALS, ins.imm0 as i32 * 8);
                self.push_rax(asm);
            }

            Opcode::Store => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rax, STACK, SIDX);
                asm.store(LOCALS, ins.imm0 as i32 * 8, Gpr::Rax);
            }

            Opcode::Iadd => self.int_binop(asm, |a| a.add_rr(Gpr::Rax, Gpr::Rdx)),
            Opcode::Isub => self.int_binop(asm, |a| a.sub_rr(Gpr::Rax, Gpr::Rdx)),
            Opcode::Imul => self.int_binop(asm, |a| a.imul_rr(Gpr::Rax, Gpr::Rdx)),

            Opcode::Idiv | Opcode::Imod => self.divide(asm, ins.op, need_value),

            Opcode::I2f => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rax, STACK, SIDX);
                asm.cvtsi2sd(Xmm::Xmm0, Gpr::Rax);
                asm.movq_r_x(Gpr::Rax, Xmm::Xmm0);
                self.push_rax(asm);
            }

            Opcode::F2i => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rax, STACK, SIDX);
                asm.movq_x_r(Xmm::Xmm0, Gpr::Rax);
                asm.cvttsd2si(Gpr::Rax, Xmm::Xmm0);
                self.push_rax(asm);
            }

            Opcode::Fadd => self.float_binop(asm, |a| a.addsd(Xmm::Xmm0, Xmm::Xmm1)),
            Opcode::Fsub => self.float_binop(asm, |a| a.subsd(Xmm::Xmm0, Xmm::Xmm1)),
            Opcode::Fmul => self.float_binop(asm, |a| a.mulsd(Xmm::Xmm0, Xmm::Xmm1)),
            Opcode::Fdiv => self.float_binop(asm, |a| a.divsd(Xmm::Xmm0, Xmm::Xmm1)),

            Opcode::Fsqrt => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rax, STACK, SIDX);
                asm.movq_x_r(Xmm::Xmm0, Gpr::Rax);
                asm.sqrtsd(Xmm::Xmm0, Xmm::Xmm0);
                asm.movq_r_x(Gpr::Rax, Xmm::Xmm0);
                self.push_rax(asm);
            }

            Opcode::CmpLe => self.int_compare(asm, Cond::Le),
            Opcode::CmpLt => self.int_compare(asm, Cond::L),
            Opcode::CmpGe => self.int_compare(asm, Cond::Ge),
            Opcode::CmpGt => self.int_compare(asm, Cond::G),
            Opcode::CmpEq => self.int_compare(asm, Cond::E),
            Opcode::CmpNe => self.int_compare(asm, Cond::Ne),

            Opcode::FcmpLe | Opcode::FcmpLt | Opcode::FcmpGe | Opcode::FcmpGt
            | Opcode::FcmpEq | Opcode::FcmpNe => self.float_compare(asm, ins.op),

            Opcode::Jmp => {
                asm.jmp(labels[&ins.jmp_target]);
            }

            Opcode::JmpIfFalse => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rax, STACK, SIDX);
                asm.test_rr(Gpr::Rax, Gpr::Rax);
                asm.jcc(Cond::E, labels[&ins.jmp_target]);
            }

            Opcode::Pop => {
                asm.dec(SIDX);
            }

            Opcode::Print | Opcode::PrintF => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rdi, STACK, SIDX);
                let hook = if ins.op == Opcode::Print {
                    self.hooks.print
                } else {
                    self.hooks.print_f
                };
                self.call_hook(asm, hook);
            }

            Opcode::PrintBig => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rdx, STACK, SIDX); // len
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rsi, STACK, SIDX); // handle
                asm.load(Gpr::Rdi, CTX, CTX_VM);
                self.call_hook(asm, self.hooks.print_big);
            }

            Opcode::Call => {
                let argc = ins.imm1;
                // args pointer = stack base + (index - argc) * 8
                asm.mov_rr(Gpr::Rdx, SIDX);
                asm.sub_ri(Gpr::Rdx, argc as i32);
                asm.shl_ri(Gpr::Rdx, 3);
                asm.add_rr(Gpr::Rdx, STACK);

                // Publish the live stack so a collection inside the
                // callee sees our operands.
                asm.store(CTX, CTX_STACK_SIZE, SIDX);

                asm.load(Gpr::Rdi, CTX, CTX_VM);
                asm.mov_ri32(Gpr::Rsi, ins.imm0);
                asm.mov_ri32(Gpr::Rcx, argc);
                self.call_hook(asm, self.hooks.call_function);

                asm.sub_ri(SIDX, argc as i32);
                self.push_result(asm, need_value);
            }

            Opcode::ArrayNew => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rsi, STACK, SIDX);
                asm.store(CTX, CTX_STACK_SIZE, SIDX);
                asm.load(Gpr::Rdi, CTX, CTX_VM);
                self.call_hook(asm, self.hooks.array_new);
                self.push_result(asm, need_value);
            }

            Opcode::ArrayGet => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rdx, STACK, SIDX); // idx
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rsi, STACK, SIDX); // handle
                asm.load(Gpr::Rdi, CTX, CTX_VM);
                self.call_hook(asm, self.hooks.array_get);
                self.push_result(asm, need_value);
            }

            Opcode::ArraySet => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rcx, STACK, SIDX); // val
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rdx, STACK, SIDX); // idx
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rsi, STACK, SIDX); // handle
                asm.load(Gpr::Rdi, CTX, CTX_VM);
                self.call_hook(asm, self.hooks.array_set);
            }

            Opcode::ArrayLen => {
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rsi, STACK, SIDX);
                asm.load(Gpr::Rdi, CTX, CTX_VM);
                self.call_hook(asm, self.hooks.array_len);
                self.push_result(asm, need_value);
            }

            Opcode::TimeMs => {
                asm.load(Gpr::Rdi, CTX, CTX_VM);
                self.call_hook(asm, self.hooks.time_ms);
                self.push_result(asm, need_value);
            }

            Opcode::Rand => {
                asm.load(Gpr::Rdi, CTX, CTX_VM);
                self.call_hook(asm, self.hooks.rand);
                self.push_result(asm, need_value);
            }

            Opcode::Ret | Opcode::Halt => {
                let empty = asm.create_label();
                let restore = asm.create_label();

                asm.test_rr(SIDX, SIDX);
                asm.jcc(Cond::E, empty);
                asm.dec(SIDX);
                asm.load_indexed(Gpr::Rax, STACK, SIDX);
                asm.jmp(restore);

                asm.bind_label(empty);
                asm.xor_rr(Gpr::Rax, Gpr::Rax);

                asm.bind_label(restore);
                self.emit_epilogue(asm);
            }
        }
    }

    /// Store rax at the stack top and bump the index.
    fn push_rax(&self, asm: &mut Assembler) {
        asm.store_indexed(STACK, SIDX, Gpr::Rax);
        asm.inc(SIDX);
    }

    /// Push a call result, or zero when the value is dead.
    fn push_result(&self, asm: &mut Assembler, need_value: bool) {
        if need_value {
            asm.store_indexed(STACK, SIDX, Gpr::Rax);
        } else {
            asm.store_indexed_imm(STACK, SIDX, 0);
        }
        asm.inc(SIDX);
    }

    /// Pop rdx then rax, run `op`, push rax.
    fn int_binop(&self, asm: &mut Assembler, op: impl FnOnce(&mut Assembler)) {
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rdx, STACK, SIDX);
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rax, STACK, SIDX);
        op(asm);
        self.push_rax(asm);
    }

    /// Signed compare of the top two words → 0/1.
    fn int_compare(&self, asm: &mut Assembler, cond: Cond) {
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rdx, STACK, SIDX);
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rax, STACK, SIDX);
        asm.cmp_rr(Gpr::Rax, Gpr::Rdx);
        asm.setcc(cond, Gpr::Rax);
        asm.movzx_r64_r8(Gpr::Rax, Gpr::Rax);
        self.push_rax(asm);
    }

    /// Pop both doubles through xmm0/xmm1, run `op`, push the result.
    fn float_binop(&self, asm: &mut Assembler, op: impl FnOnce(&mut Assembler)) {
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rdx, STACK, SIDX);
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rax, STACK, SIDX);
        asm.movq_x_r(Xmm::Xmm0, Gpr::Rax);
        asm.movq_x_r(Xmm::Xmm1, Gpr::Rdx);
        op(asm);
        asm.movq_r_x(Gpr::Rax, Xmm::Xmm0);
        self.push_rax(asm);
    }

    /// Ordered double compare → 0/1, false on NaN except FCMPNE.
    ///
    /// `ucomisd` raises CF/ZF/PF together on unordered input, so the
    /// less-than family compares with swapped operands and tests the
    /// "above" conditions (false on NaN), while equality combines ZF
    /// with the parity flag.
    fn float_compare(&self, asm: &mut Assembler, op: Opcode) {
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rdx, STACK, SIDX);
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rax, STACK, SIDX);
        asm.movq_x_r(Xmm::Xmm0, Gpr::Rax);
        asm.movq_x_r(Xmm::Xmm1, Gpr::Rdx);

        match op {
            Opcode::FcmpLt => {
                asm.ucomisd(Xmm::Xmm1, Xmm::Xmm0);
                asm.setcc(Cond::A, Gpr::Rax);
            }
            Opcode::FcmpLe => {
                asm.ucomisd(Xmm::Xmm1, Xmm::Xmm0);
                asm.setcc(Cond::Ae, Gpr::Rax);
            }
            Opcode::FcmpGt => {
                asm.ucomisd(Xmm::Xmm0, Xmm::Xmm1);
                asm.setcc(Cond::A, Gpr::Rax);
            }
            Opcode::FcmpGe => {
                asm.ucomisd(Xmm::Xmm0, Xmm::Xmm1);
                asm.setcc(Cond::Ae, Gpr::Rax);
            }
            Opcode::FcmpEq => {
                asm.ucomisd(Xmm::Xmm0, Xmm::Xmm1);
                asm.setcc(Cond::E, Gpr::Rax);
                asm.setcc(Cond::Np, Gpr::Rdx);
                asm.and_r8(Gpr::Rax, Gpr::Rdx);
            }
            Opcode::FcmpNe => {
                asm.ucomisd(Xmm::Xmm0, Xmm::Xmm1);
                asm.setcc(Cond::Ne, Gpr::Rax);
                asm.setcc(Cond::P, Gpr::Rdx);
                asm.or_r8(Gpr::Rax, Gpr::Rdx);
            }
            _ => unreachable!("not a float compare"),
        }
        asm.movzx_r64_r8(Gpr::Rax, Gpr::Rax);
        self.push_rax(asm);
    }

    /// IDIV/IMOD with a zero-divisor branch to the runtime error and an
    /// inline short-circuit of the MIN/-1 pair, which hardware `idiv`
    /// would fault on.
    fn divide(&self, asm: &mut Assembler, op: Opcode, need_value: bool) {
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rcx, STACK, SIDX); // divisor
        asm.dec(SIDX);
        asm.load_indexed(Gpr::Rax, STACK, SIDX); // dividend

        let nonzero = asm.create_label();
        let do_div = asm.create_label();
        let store = asm.create_label();

        asm.test_rr(Gpr::Rcx, Gpr::Rcx);
        asm.jcc(Cond::Ne, nonzero);
        asm.load(Gpr::Rdi, CTX, CTX_VM);
        asm.mov_ri32(Gpr::Rsi, op as u8 as u32);
        self.call_hook(asm, self.hooks.div_zero);

        asm.bind_label(nonzero);
        asm.cmp_ri(Gpr::Rcx, -1);
        asm.jcc(Cond::Ne, do_div);
        asm.mov_ri64(Gpr::Rdx, i64::MIN);
        asm.cmp_rr(Gpr::Rax, Gpr::Rdx);
        asm.jcc(Cond::Ne, do_div);
        // Wrapped: quotient stays MIN in rax, remainder is zero.
        asm.xor_rr(Gpr::Rdx, Gpr::Rdx);
        asm.jmp(store);

        asm.bind_label(do_div);
        asm.cqo();
        asm.idiv(Gpr::Rcx);

        asm.bind_label(store);
        if need_value {
            let result = if op == Opcode::Idiv { Gpr::Rax } else { Gpr::Rdx };
            asm.store_indexed(STACK, SIDX, result);
        } else {
            asm.store_indexed_imm(STACK, SIDX, 0);
        }
        asm.inc(SIDX);
    }

    /// Load a hook address and call through it.
    fn call_hook(&self, asm: &mut Assembler, hook: u64) {
        asm.mov_ri64(Gpr::Rax, hook as i64);
        asm.call_reg(Gpr::Rax);
    }
}

fn adjust_stack(asm: &mut Assembler, delta: i32) {
    match delta {
        0 => {}
        1 => asm.inc(SIDX),
        -1 => asm.dec(SIDX),
        d if d > 0 => asm.add_ri(SIDX, d),
        d => asm.sub_ri(SIDX, -d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_compiler::compile;

    fn dummy_hooks() -> RuntimeHooks {
        RuntimeHooks {
            call_function: 0,
            array_new: 0,
            array_get: 0,
            array_set: 0,
            array_len: 0,
            print: 0,
            print_f: 0,
            print_big: 0,
            time_ms: 0,
            rand: 0,
            div_zero: 0,
        }
    }

    #[test]
    fn test_context_field_offsets_are_abi() {
        assert_eq!(std::mem::offset_of!(JitContext, locals), CTX_LOCALS as usize);
        assert_eq!(std::mem::offset_of!(JitContext, stack), CTX_STACK as usize);
        assert_eq!(
            std::mem::offset_of!(JitContext, stack_size),
            CTX_STACK_SIZE as usize
        );
        assert_eq!(std::mem::offset_of!(JitContext, vm), CTX_VM as usize);
    }

    #[test]
    fn test_compiles_every_function() {
        let prog = compile(
            "fn add(a, b) { return a + b; }\n\
             fn main() { print(add(1, 2)); }",
        )
        .unwrap();
        let mut jit = JitCompiler::new(dummy_hooks());
        for f in &prog.funcs {
            jit.compile_function(&prog, f.id).unwrap();
            assert!(jit.is_compiled(f.id));
        }
        assert_eq!(jit.compiled_count(), 2);
    }

    #[cfg(target_arch = "x86_64")]
    mod exec {
        use super::*;

        fn run_compiled(src: &str, func: &str, args: &[i64]) -> i64 {
            let prog = compile(src).unwrap();
            let fid = prog.func_id(func).unwrap();
            let mut jit = JitCompiler::new(dummy_hooks());
            jit.compile_function(&prog, fid).unwrap();

            let f = &prog.funcs[fid as usize];
            let mut locals = vec![0i64; f.nlocals.max(1) as usize];
            locals[..args.len()].copy_from_slice(args);
            let mut stack = vec![0i64; f.max_stack.max(16) as usize];

            let mut ctx = JitContext {
                locals: locals.as_mut_ptr(),
                stack: stack.as_mut_ptr(),
                stack_size: 0,
                vm: std::ptr::null_mut(),
            };
            let entry = jit.compiled_fn(fid).unwrap();
            unsafe { entry(&mut ctx) }
        }

        #[test]
        fn test_exec_arithmetic() {
            let src = "fn f(a, b) { return a + b * 3; } fn main() { }";
            assert_eq!(run_compiled(src, "f", &[5, 4]), 17);
        }

        #[test]
        fn test_exec_compare_and_branch() {
            let src = "fn max(a, b) { if (a > b) { return a; } return b; } fn main() { }";
            assert_eq!(run_compiled(src, "max", &[3, 9]), 9);
            assert_eq!(run_compiled(src, "max", &[10, 9]), 10);
        }

        #[test]
        fn test_exec_loop() {
            let src = "fn sum(n) { let s = 0; let i = 1; while (i <= n) { s = s + i; i = i + 1; } return s; } fn main() { }";
            assert_eq!(run_compiled(src, "sum", &[100]), 5050);
        }

        #[test]
        fn test_exec_float_math() {
            let src = "fn f(n) { let x = 1.5; let y = x * 2.0 + 0.25; return y > 3.0; } fn main() { }";
            assert_eq!(run_compiled(src, "f", &[0]), 1);
        }

        #[test]
        fn test_exec_min_div_minus_one_wraps() {
            let src = "fn f(a, b) { return a / b; } fn main() { }";
            assert_eq!(run_compiled(src, "f", &[i64::MIN, -1]), i64::MIN);
            let src = "fn f(a, b) { return a % b; } fn main() { }";
            assert_eq!(run_compiled(src, "f", &[i64::MIN, -1]), 0);
            assert_eq!(run_compiled(src, "f", &[17, 5]), 2);
        }

        #[test]
        fn test_exec_dead_value_elided_result_matches() {
            // The discarded compare must not disturb the live value.
            let src = "fn f(a) { 1 < 2; return a + 1; } fn main() { }";
            assert_eq!(run_compiled(src, "f", &[41]), 42);
        }
    }
}
