//! AST → bytecode lowering.
//!
//! One pass per function over the statement tree, appending to the
//! shared code buffer. The pass tracks, per local slot, whether the
//! slot currently holds a double; that attribute picks the integer or
//! floating opcode variant for every operator and for `print`. It is
//! deliberately kept separate from the slot index; type information
//! never leaks into operand encoding.
//!
//! Loops push a context carrying break/continue patch lists; `break`
//! and `continue` emit a `JMP` with a placeholder target that the loop
//! epilogue patches.

use crate::analysis::compute_max_stack;
use crate::ast::{BinOp, Expr, FuncDecl, Module, Stmt};
use crate::bytecode::{Opcode, Program};
use opal_core::{OpalError, OpalResult};
use rustc_hash::FxHashMap;

/// Lower a parsed module into an executable [`Program`].
///
/// All functions are registered first so calls can resolve forward
/// references; bodies are emitted in declaration order.
pub fn lower_module(module: &Module) -> OpalResult<Program> {
    let mut prog = Program::new();

    for f in &module.funcs {
        if prog.func_id(&f.name).is_some() {
            return Err(OpalError::resolution(format!(
                "duplicate function '{}'",
                f.name
            )));
        }
        prog.add_func(&f.name, f.params.len() as u32);
    }

    for f in &module.funcs {
        lower_func(&mut prog, f)?;
    }

    Ok(prog)
}

fn lower_func(prog: &mut Program, decl: &FuncDecl) -> OpalResult<()> {
    let fid = prog
        .func_id(&decl.name)
        .ok_or_else(|| OpalError::internal("function vanished between passes"))?;

    let entry = prog.code.pc();

    let mut fl = FuncLowerer {
        prog: &mut *prog,
        slots: FxHashMap::default(),
        floats: Vec::new(),
        next_local: 0,
        loops: Vec::new(),
    };
    for p in &decl.params {
        fl.bind(p);
    }

    for stmt in &decl.body {
        fl.stmt(stmt)?;
    }

    // Implicit `return 0` for bodies that fall off the end.
    fl.prog.code.emit_op(Opcode::Iconst);
    fl.prog.code.emit_i64(0);
    fl.prog.code.emit_op(Opcode::Ret);

    let nlocals = fl.next_local;
    let end = prog.code.pc();

    let func = &mut prog.funcs[fid as usize];
    func.entry = entry;
    func.end = end;
    func.nlocals = nlocals;

    let max_stack = compute_max_stack(&prog.code, &prog.funcs[fid as usize]);
    prog.funcs[fid as usize].max_stack = max_stack;
    Ok(())
}

/// Break/continue patch positions for one enclosing loop.
#[derive(Default)]
struct LoopCtx {
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
}

struct FuncLowerer<'p> {
    prog: &'p mut Program,
    /// name → slot index.
    slots: FxHashMap<String, u32>,
    /// Per-slot "currently holds a double" flag, indexed by slot.
    floats: Vec<bool>,
    next_local: u32,
    loops: Vec<LoopCtx>,
}

impl FuncLowerer<'_> {
    fn bind(&mut self, name: &str) -> u32 {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = self.next_local;
        self.next_local += 1;
        self.slots.insert(name.to_string(), slot);
        self.floats.push(false);
        slot
    }

    fn set_float(&mut self, slot: u32, is_float: bool) {
        self.floats[slot as usize] = is_float;
    }

    /// Static float-ness of an expression under the current slot flags.
    fn is_float(&self, e: &Expr) -> bool {
        match e {
            Expr::Float(_) => true,
            Expr::Int(_) => false,
            Expr::Var { name, .. } => self
                .slots
                .get(name)
                .is_some_and(|&slot| self.floats[slot as usize]),
            Expr::Call { callee, .. } => callee == "sqrt",
            Expr::Bin { op, lhs, rhs } => match op {
                BinOp::Le
                | BinOp::Lt
                | BinOp::Ge
                | BinOp::Gt
                | BinOp::Eq
                | BinOp::Ne
                | BinOp::Mod => false,
                _ => self.is_float(lhs) || self.is_float(rhs),
            },
            Expr::Index { .. } => false,
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expr(&mut self, e: &Expr) -> OpalResult<()> {
        match e {
            Expr::Int(v) => {
                self.prog.code.emit_op(Opcode::Iconst);
                self.prog.code.emit_i64(*v);
            }
            Expr::Float(bits) => {
                self.prog.code.emit_op(Opcode::Fconst);
                self.prog.code.emit_i64(*bits);
            }
            Expr::Var { name, .. } => {
                let slot = *self.slots.get(name).ok_or_else(|| {
                    OpalError::resolution(format!("unknown variable: {name}"))
                })?;
                self.prog.code.emit_op(Opcode::Load);
                self.prog.code.emit_u32(slot);
            }
            Expr::Bin { op, lhs, rhs } => {
                let float = self.is_float(lhs) || self.is_float(rhs);
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.prog.code.emit_op(bin_opcode(*op, float));
            }
            Expr::Call { callee, args, .. } => self.call(callee, args)?,
            Expr::Index { array, index } => {
                self.expr(array)?;
                self.expr(index)?;
                self.prog.code.emit_op(Opcode::ArrayGet);
            }
        }
        Ok(())
    }

    fn call(&mut self, callee: &str, args: &[Expr]) -> OpalResult<()> {
        match callee {
            "print" => {
                check_argc(callee, args, 1)?;
                let float = self.is_float(&args[0]);
                self.expr(&args[0])?;
                self.prog
                    .code
                    .emit_op(if float { Opcode::PrintF } else { Opcode::Print });
                // print is statement-valued: leave a 0 so an enclosing
                // expression statement has something to POP.
                self.prog.code.emit_op(Opcode::Iconst);
                self.prog.code.emit_i64(0);
            }
            "print_big" => {
                check_argc(callee, args, 2)?;
                self.expr(&args[0])?;
                self.expr(&args[1])?;
                self.prog.code.emit_op(Opcode::PrintBig);
                self.prog.code.emit_op(Opcode::Iconst);
                self.prog.code.emit_i64(0);
            }
            "array" => {
                check_argc(callee, args, 1)?;
                self.expr(&args[0])?;
                self.prog.code.emit_op(Opcode::ArrayNew);
            }
            "len" => {
                check_argc(callee, args, 1)?;
                self.expr(&args[0])?;
                self.prog.code.emit_op(Opcode::ArrayLen);
            }
            "time_ms" | "now" => {
                check_argc(callee, args, 0)?;
                self.prog.code.emit_op(Opcode::TimeMs);
            }
            "rand" => {
                check_argc(callee, args, 0)?;
                self.prog.code.emit_op(Opcode::Rand);
            }
            "sqrt" => {
                check_argc(callee, args, 1)?;
                self.expr(&args[0])?;
                self.prog.code.emit_op(Opcode::Fsqrt);
            }
            _ => {
                let fid = self.prog.func_id(callee).ok_or_else(|| {
                    OpalError::resolution(format!("unknown function: {callee}"))
                })?;
                let arity = self.prog.funcs[fid as usize].arity;
                if args.len() as u32 != arity {
                    return Err(OpalError::resolution(format!(
                        "function '{callee}' expects {arity} args, got {}",
                        args.len()
                    )));
                }
                for a in args {
                    self.expr(a)?;
                }
                self.prog.code.emit_op(Opcode::Call);
                self.prog.code.emit_u32(fid);
                self.prog.code.emit_u32(args.len() as u32);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn stmt(&mut self, s: &Stmt) -> OpalResult<()> {
        match s {
            Stmt::Let { name, init, .. } => {
                let slot = self.bind(name);
                match init {
                    Some(e) => {
                        let float = self.is_float(e);
                        self.set_float(slot, float);
                        self.expr(e)?;
                    }
                    None => {
                        self.set_float(slot, false);
                        self.prog.code.emit_op(Opcode::Iconst);
                        self.prog.code.emit_i64(0);
                    }
                }
                self.prog.code.emit_op(Opcode::Store);
                self.prog.code.emit_u32(slot);
            }
            Stmt::Assign { name, value, .. } => {
                let slot = *self.slots.get(name).ok_or_else(|| {
                    OpalError::resolution(format!("assign to unknown variable: {name}"))
                })?;
                let float = self.is_float(value);
                self.set_float(slot, float);
                self.expr(value)?;
                self.prog.code.emit_op(Opcode::Store);
                self.prog.code.emit_u32(slot);
            }
            Stmt::IndexAssign {
                array,
                index,
                value,
            } => {
                self.expr(array)?;
                self.expr(index)?;
                self.expr(value)?;
                self.prog.code.emit_op(Opcode::ArraySet);
            }
            Stmt::If {
                cond,
                then_blk,
                else_blk,
            } => {
                self.expr(cond)?;
                self.prog.code.emit_op(Opcode::JmpIfFalse);
                let jz = self.prog.code.pc();
                self.prog.code.emit_u32(0);

                for s in then_blk {
                    self.stmt(s)?;
                }

                match else_blk {
                    Some(else_blk) => {
                        self.prog.code.emit_op(Opcode::Jmp);
                        let jend = self.prog.code.pc();
                        self.prog.code.emit_u32(0);

                        let else_addr = self.prog.code.pc();
                        self.prog.code.patch_u32(jz, else_addr as u32);

                        for s in else_blk {
                            self.stmt(s)?;
                        }

                        let end_addr = self.prog.code.pc();
                        self.prog.code.patch_u32(jend, end_addr as u32);
                    }
                    None => {
                        let end_addr = self.prog.code.pc();
                        self.prog.code.patch_u32(jz, end_addr as u32);
                    }
                }
            }
            Stmt::While { cond, body } => {
                self.loops.push(LoopCtx::default());

                let loop_start = self.prog.code.pc();
                self.expr(cond)?;
                self.prog.code.emit_op(Opcode::JmpIfFalse);
                let jz = self.prog.code.pc();
                self.prog.code.emit_u32(0);

                for s in body {
                    self.stmt(s)?;
                }

                self.finish_loop(loop_start, jz, None)?;
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.stmt(init)?;
                }

                self.loops.push(LoopCtx::default());

                let loop_start = self.prog.code.pc();
                match cond {
                    Some(cond) => self.expr(cond)?,
                    None => {
                        self.prog.code.emit_op(Opcode::Iconst);
                        self.prog.code.emit_i64(1);
                    }
                }
                self.prog.code.emit_op(Opcode::JmpIfFalse);
                let jz = self.prog.code.pc();
                self.prog.code.emit_u32(0);

                for s in body {
                    self.stmt(s)?;
                }

                self.finish_loop(loop_start, jz, step.as_deref())?;
            }
            Stmt::Return(value) => {
                self.expr(value)?;
                self.prog.code.emit_op(Opcode::Ret);
            }
            Stmt::Break { .. } => {
                self.prog.code.emit_op(Opcode::Jmp);
                let at = self.prog.code.pc();
                self.prog.code.emit_u32(0);
                self.loops
                    .last_mut()
                    .ok_or_else(|| OpalError::resolution("break outside of loop"))?
                    .break_patches
                    .push(at);
            }
            Stmt::Continue { .. } => {
                self.prog.code.emit_op(Opcode::Jmp);
                let at = self.prog.code.pc();
                self.prog.code.emit_u32(0);
                self.loops
                    .last_mut()
                    .ok_or_else(|| OpalError::resolution("continue outside of loop"))?
                    .continue_patches
                    .push(at);
            }
            Stmt::Expr(e) => {
                self.expr(e)?;
                self.prog.code.emit_op(Opcode::Pop);
            }
        }
        Ok(())
    }

    /// Shared loop epilogue: patch continues to the step (or back edge),
    /// emit the back edge, then patch the exit and breaks.
    fn finish_loop(
        &mut self,
        loop_start: usize,
        jz: usize,
        step: Option<&Stmt>,
    ) -> OpalResult<()> {
        let continue_target = self.prog.code.pc();
        let ctx = self
            .loops
            .pop()
            .ok_or_else(|| OpalError::internal("loop context underflow"))?;

        for at in &ctx.continue_patches {
            self.prog.code.patch_u32(*at, continue_target as u32);
        }

        if let Some(step) = step {
            self.stmt(step)?;
        }

        self.prog.code.emit_op(Opcode::Jmp);
        self.prog.code.emit_u32(loop_start as u32);

        let loop_end = self.prog.code.pc();
        self.prog.code.patch_u32(jz, loop_end as u32);
        for at in &ctx.break_patches {
            self.prog.code.patch_u32(*at, loop_end as u32);
        }
        Ok(())
    }
}

fn bin_opcode(op: BinOp, float: bool) -> Opcode {
    match (op, float) {
        (BinOp::Add, false) => Opcode::Iadd,
        (BinOp::Add, true) => Opcode::Fadd,
        (BinOp::Sub, false) => Opcode::Isub,
        (BinOp::Sub, true) => Opcode::Fsub,
        (BinOp::Mul, false) => Opcode::Imul,
        (BinOp::Mul, true) => Opcode::Fmul,
        (BinOp::Div, false) => Opcode::Idiv,
        (BinOp::Div, true) => Opcode::Fdiv,
        // Modulo is integer-only.
        (BinOp::Mod, _) => Opcode::Imod,
        (BinOp::Le, false) => Opcode::CmpLe,
        (BinOp::Le, true) => Opcode::FcmpLe,
        (BinOp::Lt, false) => Opcode::CmpLt,
        (BinOp::Lt, true) => Opcode::FcmpLt,
        (BinOp::Ge, false) => Opcode::CmpGe,
        (BinOp::Ge, true) => Opcode::FcmpGe,
        (BinOp::Gt, false) => Opcode::CmpGt,
        (BinOp::Gt, true) => Opcode::FcmpGt,
        (BinOp::Eq, false) => Opcode::CmpEq,
        (BinOp::Eq, true) => Opcode::FcmpEq,
        (BinOp::Ne, false) => Opcode::CmpNe,
        (BinOp::Ne, true) => Opcode::FcmpNe,
    }
}

fn check_argc(callee: &str, args: &[Expr], want: usize) -> OpalResult<()> {
    if args.len() == want {
        Ok(())
    } else {
        Err(OpalError::resolution(format!(
            "{callee} expects {want} arg{}",
            if want == 1 { "" } else { "s" }
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn ops_of(prog: &Program, fid: u32) -> Vec<Opcode> {
        let f = &prog.funcs[fid as usize];
        let mut out = Vec::new();
        let mut ip = f.entry;
        while ip < f.end {
            let op = prog.code.opcode_at(ip).unwrap();
            out.push(op);
            ip += 1 + op.operand_width();
        }
        out
    }

    #[test]
    fn test_lower_arithmetic_picks_int_opcodes() {
        let prog = compile("fn main() { print(2 + 3 * 4); }").unwrap();
        let ops = ops_of(&prog, 0);
        assert_eq!(
            ops,
            vec![
                Opcode::Iconst,
                Opcode::Iconst,
                Opcode::Iconst,
                Opcode::Imul,
                Opcode::Iadd,
                Opcode::Print,
                Opcode::Iconst,
                Opcode::Pop,
                Opcode::Iconst,
                Opcode::Ret,
            ]
        );
    }

    #[test]
    fn test_float_contagion_in_binops() {
        let prog = compile("fn main() { let x = 1.5; let y = x + 1; print(y); }").unwrap();
        let ops = ops_of(&prog, 0);
        assert!(ops.contains(&Opcode::Fadd));
        assert!(ops.contains(&Opcode::PrintF));
        assert!(!ops.contains(&Opcode::Iadd));
    }

    #[test]
    fn test_sqrt_is_float_typed() {
        let prog = compile("fn main() { let x = sqrt(2.0); print(x); }").unwrap();
        let ops = ops_of(&prog, 0);
        assert!(ops.contains(&Opcode::Fsqrt));
        assert!(ops.contains(&Opcode::PrintF));
    }

    #[test]
    fn test_compares_produce_integers() {
        let prog = compile("fn main() { let x = 1.5 < 2.5; let y = x + 1; print(y); }").unwrap();
        let ops = ops_of(&prog, 0);
        assert!(ops.contains(&Opcode::FcmpLt));
        // x holds a 0/1 integer, so the add stays integral.
        assert!(ops.contains(&Opcode::Iadd));
    }

    #[test]
    fn test_functions_end_with_ret() {
        let prog = compile("fn main() { }").unwrap();
        let ops = ops_of(&prog, 0);
        assert_eq!(ops, vec![Opcode::Iconst, Opcode::Ret]);
    }

    #[test]
    fn test_call_resolves_forward_reference() {
        let prog = compile("fn main() { helper(1); } fn helper(x) { print(x); }").unwrap();
        let ops = ops_of(&prog, 0);
        assert!(ops.contains(&Opcode::Call));
    }

    #[test]
    fn test_unknown_variable_is_resolution_error() {
        let err = compile("fn main() { print(x); }").unwrap_err();
        assert!(err.to_string().contains("unknown variable: x"));
    }

    #[test]
    fn test_unknown_function_is_resolution_error() {
        let err = compile("fn main() { nope(); }").unwrap_err();
        assert!(err.to_string().contains("unknown function: nope"));
    }

    #[test]
    fn test_wrong_arity_is_resolution_error() {
        let err = compile("fn f(a, b) { } fn main() { f(1); }").unwrap_err();
        assert!(err.to_string().contains("expects 2 args, got 1"));
    }

    #[test]
    fn test_break_outside_loop_errors() {
        let err = compile("fn main() { break; }").unwrap_err();
        assert!(err.to_string().contains("break outside of loop"));
    }

    #[test]
    fn test_loop_jumps_stay_inside_function() {
        let prog = compile(
            "fn main() { let i = 0; while (i < 5) { if (i == 3) { break; } i = i + 1; } }",
        )
        .unwrap();
        let f = &prog.funcs[0];
        let mut ip = f.entry;
        while ip < f.end {
            let op = prog.code.opcode_at(ip).unwrap();
            if matches!(op, Opcode::Jmp | Opcode::JmpIfFalse) {
                let target = prog.code.read_u32(ip + 1) as usize;
                assert!(target >= f.entry && target < f.end);
            }
            ip += 1 + op.operand_width();
        }
    }

    #[test]
    fn test_max_stack_is_recorded() {
        let prog = compile("fn main() { print(1 + 2 + 3 + 4); }").unwrap();
        assert!(prog.funcs[0].max_stack >= 8);
    }
}
