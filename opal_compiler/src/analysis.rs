//! Per-function maximum operand-stack height.
//!
//! A worklist traversal from the function entry, propagating the stack
//! height through fallthrough and jump edges. Heights merge with max:
//! this pass only sizes native stacks, and the fixed headroom absorbs
//! any slack. The JIT runs its own strict-equality variant before it
//! will trust liveness information.

use crate::bytecode::{CodeBuf, Function, Opcode};
use std::collections::VecDeque;

/// Headroom added on top of the observed maximum, covering the scratch
/// words intrinsic call sequences may touch above the logical top.
pub const STACK_HEADROOM: u32 = 8;

/// Compute `max_stack` for one function: the highest operand-stack
/// height reachable at any instruction, plus [`STACK_HEADROOM`].
pub fn compute_max_stack(code: &CodeBuf, func: &Function) -> u32 {
    let bytes = code.bytes();
    let mut height = vec![i32::MIN; bytes.len()];
    let mut work = VecDeque::new();

    if func.entry >= func.end {
        return STACK_HEADROOM;
    }

    height[func.entry] = 0;
    work.push_back(func.entry);

    let mut best = 0i32;

    while let Some(ip) = work.pop_front() {
        if ip < func.entry || ip >= func.end {
            continue;
        }
        let h = height[ip];
        if h < 0 {
            continue;
        }

        let Some(op) = code.opcode_at(ip) else {
            continue;
        };
        let operand_at = ip + 1;
        let next_ip = operand_at + op.operand_width();

        let mut argc = 0u32;
        let mut jmp_target = None;
        match op {
            Opcode::Jmp | Opcode::JmpIfFalse => {
                jmp_target = Some(code.read_u32(operand_at) as usize);
            }
            Opcode::Call => {
                argc = code.read_u32(operand_at + 4);
            }
            _ => {}
        }

        let mut h2 = h + op.stack_effect(argc);
        if h2 < 0 {
            h2 = 0;
        }
        if h2 > best {
            best = h2;
        }

        let is_end = matches!(op, Opcode::Ret | Opcode::Halt);
        let has_fallthrough = !is_end && op != Opcode::Jmp;

        if has_fallthrough && next_ip < func.end && height[next_ip] < h2 {
            height[next_ip] = h2;
            work.push_back(next_ip);
        }
        if !is_end {
            if let Some(target) = jmp_target {
                if target < bytes.len() && height[target] < h2 {
                    height[target] = h2;
                    work.push_back(target);
                }
            }
        }
    }

    best as u32 + STACK_HEADROOM
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Program;

    fn with_func(build: impl FnOnce(&mut CodeBuf)) -> (CodeBuf, Function) {
        let mut prog = Program::new();
        prog.add_func("t", 0);
        let entry = prog.code.pc();
        build(&mut prog.code);
        let end = prog.code.pc();
        let mut func = prog.funcs[0].clone();
        func.entry = entry;
        func.end = end;
        (prog.code, func)
    }

    #[test]
    fn test_straight_line_height() {
        // ICONST ICONST IADD RET → peak height 2.
        let (code, func) = with_func(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(1);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(2);
            c.emit_op(Opcode::Iadd);
            c.emit_op(Opcode::Ret);
        });
        assert_eq!(compute_max_stack(&code, &func), 2 + STACK_HEADROOM);
    }

    #[test]
    fn test_call_effect_uses_argc() {
        // Three args pushed, CALL pops them and pushes one result.
        let (code, func) = with_func(|c| {
            for v in [1, 2, 3] {
                c.emit_op(Opcode::Iconst);
                c.emit_i64(v);
            }
            c.emit_op(Opcode::Call);
            c.emit_u32(0);
            c.emit_u32(3);
            c.emit_op(Opcode::Ret);
        });
        assert_eq!(compute_max_stack(&code, &func), 3 + STACK_HEADROOM);
    }

    #[test]
    fn test_branches_merge_with_max() {
        // Diamond: both sides leave height 1; the peak is inside the
        // condition evaluation.
        let (code, func) = with_func(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(1);
            c.emit_op(Opcode::JmpIfFalse);
            let jz = c.pc();
            c.emit_u32(0);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(10);
            c.emit_op(Opcode::Ret);
            let else_at = c.pc();
            c.patch_u32(jz, else_at as u32);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(20);
            c.emit_op(Opcode::Ret);
        });
        assert_eq!(compute_max_stack(&code, &func), 1 + STACK_HEADROOM);
    }

    #[test]
    fn test_loop_reaches_fixpoint() {
        let source =
            "fn main() { let i = 0; while (i < 10) { i = i + 1; } print(i); }";
        let prog = crate::compile(source).unwrap();
        let f = &prog.funcs[0];
        // Deterministic heights: re-running the analysis agrees.
        assert_eq!(compute_max_stack(&prog.code, f), f.max_stack);
        assert!(f.max_stack >= 2 + STACK_HEADROOM);
    }

    #[test]
    fn test_empty_function_gets_headroom_only() {
        let (code, mut func) = with_func(|_| {});
        func.end = func.entry;
        assert_eq!(compute_max_stack(&code, &func), STACK_HEADROOM);
    }
}
