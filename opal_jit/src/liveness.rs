//! Pre-emission dataflow: decode, stack heights, and value liveness.
//!
//! The height pass walks the CFG from the entry requiring every merge
//! point to agree on the operand-stack height. When heights disagree,
//! an underflow shows up, or a jump lands inside an instruction, the
//! whole analysis is discarded and every result is treated as live;
//! emission still works, only dead-store elimination is lost.
//!
//! With heights in hand, a backward fixpoint computes which stack slots
//! are live into and out of every instruction. A producing instruction
//! whose results are all dead and which has no side effect can then be
//! elided by the emitter.

use opal_compiler::bytecode::{CodeBuf, Function, Opcode};
use rustc_hash::FxHashMap;

/// One decoded bytecode instruction plus its analysis results.
#[derive(Debug, Clone)]
pub struct JitInstr {
    /// Byte offset of the opcode.
    pub ip: usize,
    pub op: Opcode,
    /// 64-bit immediate (ICONST/FCONST).
    pub imm64: i64,
    /// First 32-bit immediate (slot, jump target, or callee id).
    pub imm0: u32,
    /// Second 32-bit immediate (CALL argc).
    pub imm1: u32,
    /// Byte offset of the following instruction.
    pub next_ip: usize,
    pub jmp_target: usize,
    pub has_jump: bool,
    pub has_fallthrough: bool,
    pub is_end: bool,
    pub consume: u32,
    pub produce: u32,
    pub side_effect: bool,
    pub uses_inputs: bool,
    /// Operand-stack height before this instruction; -1 if unreachable
    /// or unknown.
    pub height_before: i32,
    /// Whether any produced slot is consumed downstream.
    pub result_live: bool,
}

impl JitInstr {
    #[inline]
    fn height_after(&self) -> i32 {
        self.height_before + self.produce as i32 - self.consume as i32
    }
}

/// A decoded function body with its offset index.
pub struct FunctionCode {
    pub instrs: Vec<JitInstr>,
    /// Byte offset → instruction index.
    pub ip_index: FxHashMap<usize, usize>,
}

/// Decode the bytecode of one function. Returns `None` if a byte does
/// not decode to a known opcode.
pub fn decode_function(code: &CodeBuf, func: &Function) -> Option<FunctionCode> {
    let mut instrs = Vec::new();
    let mut ip_index = FxHashMap::default();

    let mut ip = func.entry;
    while ip < func.end {
        let op = code.opcode_at(ip)?;
        let operand_at = ip + 1;
        let next_ip = operand_at + op.operand_width();

        let mut ins = JitInstr {
            ip,
            op,
            imm64: 0,
            imm0: 0,
            imm1: 0,
            next_ip,
            jmp_target: 0,
            has_jump: false,
            has_fallthrough: !matches!(op, Opcode::Jmp | Opcode::Ret | Opcode::Halt),
            is_end: matches!(op, Opcode::Ret | Opcode::Halt),
            consume: 0,
            produce: op.produces(),
            side_effect: op.has_side_effect(),
            uses_inputs: op.uses_inputs(),
            height_before: -1,
            result_live: true,
        };

        match op {
            Opcode::Iconst | Opcode::Fconst => ins.imm64 = code.read_i64(operand_at),
            Opcode::Load | Opcode::Store => ins.imm0 = code.read_u32(operand_at),
            Opcode::Jmp | Opcode::JmpIfFalse => {
                ins.imm0 = code.read_u32(operand_at);
                ins.jmp_target = ins.imm0 as usize;
                ins.has_jump = true;
            }
            Opcode::Call => {
                ins.imm0 = code.read_u32(operand_at);
                ins.imm1 = code.read_u32(operand_at + 4);
            }
            _ => {}
        }
        ins.consume = op.consumes(ins.imm1);

        ip_index.insert(ip, instrs.len());
        instrs.push(ins);
        ip = next_ip;
    }

    Some(FunctionCode { instrs, ip_index })
}

/// Run height and liveness analysis over a decoded function.
///
/// Returns whether dead-store elimination may be trusted. On `false`,
/// every `result_live` is set, which the emitter honours by keeping all
/// value-producing work.
pub fn analyze(fc: &mut FunctionCode, func_end: usize) -> bool {
    let enabled = compute_heights(fc, func_end) && compute_liveness(fc);
    if !enabled {
        for ins in &mut fc.instrs {
            ins.result_live = true;
        }
    }
    enabled
}

fn compute_heights(fc: &mut FunctionCode, func_end: usize) -> bool {
    if fc.instrs.is_empty() {
        return false;
    }

    let mut work = std::collections::VecDeque::new();
    fc.instrs[0].height_before = 0;
    work.push_back(0usize);

    while let Some(idx) = work.pop_front() {
        let h = fc.instrs[idx].height_before;
        if h < 0 {
            continue;
        }
        if h < fc.instrs[idx].consume as i32 {
            return false;
        }
        let h2 = fc.instrs[idx].height_after();

        let mut succ_ips: [Option<usize>; 2] = [None, None];
        if !fc.instrs[idx].is_end {
            if fc.instrs[idx].has_fallthrough {
                succ_ips[0] = Some(fc.instrs[idx].next_ip);
            }
            if fc.instrs[idx].has_jump {
                succ_ips[1] = Some(fc.instrs[idx].jmp_target);
            }
        }

        for succ_ip in succ_ips.into_iter().flatten() {
            if succ_ip >= func_end {
                continue;
            }
            let Some(&t) = fc.ip_index.get(&succ_ip) else {
                // A branch into the middle of an instruction.
                return false;
            };
            if fc.instrs[t].height_before == -1 {
                fc.instrs[t].height_before = h2;
                work.push_back(t);
            } else if fc.instrs[t].height_before != h2 {
                return false;
            }
        }
    }
    true
}

fn compute_liveness(fc: &mut FunctionCode) -> bool {
    let n = fc.instrs.len();
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        if fc.instrs[i].height_before < 0 || fc.instrs[i].is_end {
            continue;
        }
        let mut targets = Vec::new();
        if fc.instrs[i].has_fallthrough {
            targets.push(fc.instrs[i].next_ip);
        }
        if fc.instrs[i].has_jump {
            targets.push(fc.instrs[i].jmp_target);
        }
        for t_ip in targets {
            let Some(&t) = fc.ip_index.get(&t_ip) else {
                continue;
            };
            if fc.instrs[t].height_before < 0 {
                continue;
            }
            if fc.instrs[i].height_after() != fc.instrs[t].height_before {
                return false;
            }
            succs[i].push(t);
            preds[t].push(i);
        }
    }

    let mut live_in: Vec<Vec<bool>> = Vec::with_capacity(n);
    let mut live_out: Vec<Vec<bool>> = Vec::with_capacity(n);
    for ins in &fc.instrs {
        if ins.height_before >= 0 {
            live_in.push(vec![false; ins.height_before as usize]);
            live_out.push(vec![false; ins.height_after() as usize]);
        } else {
            live_in.push(Vec::new());
            live_out.push(Vec::new());
        }
    }

    let mut work: std::collections::VecDeque<usize> =
        (0..n).filter(|&i| fc.instrs[i].height_before >= 0).collect();

    while let Some(i) = work.pop_front() {
        let ins = &fc.instrs[i];

        let mut new_out = vec![false; ins.height_after() as usize];
        for &s in &succs[i] {
            for (k, slot) in new_out.iter_mut().enumerate() {
                if live_in[s].get(k).copied().unwrap_or(false) {
                    *slot = true;
                }
            }
        }
        live_out[i] = new_out;

        let hb = ins.height_before as usize;
        let mut new_in = vec![false; hb];
        if ins.op == Opcode::Halt {
            // The word under HALT is the program's return value.
            if hb > 0 {
                new_in[hb - 1] = true;
            }
        } else {
            let c = ins.consume as usize;
            let p = ins.produce as usize;
            let base = hb - c;
            new_in[..base].copy_from_slice(&live_out[i][..base]);
            let result_live = (0..p).any(|k| live_out[i][base + k]);
            let needed = ins.side_effect || result_live;
            if needed && ins.uses_inputs {
                for slot in new_in.iter_mut().skip(base).take(c) {
                    *slot = true;
                }
            }
        }

        if new_in != live_in[i] {
            live_in[i] = new_in;
            for &p in &preds[i] {
                work.push_back(p);
            }
        }
    }

    for i in 0..n {
        let ins = &mut fc.instrs[i];
        if ins.height_before < 0 || ins.produce == 0 {
            ins.result_live = false;
            continue;
        }
        let base = (ins.height_before - ins.consume as i32) as usize;
        ins.result_live = (0..ins.produce as usize).any(|k| live_out[i][base + k]);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_compiler::bytecode::Program;

    fn decode_and_analyze(build: impl FnOnce(&mut CodeBuf)) -> (FunctionCode, bool) {
        let mut prog = Program::new();
        prog.add_func("t", 0);
        let entry = prog.code.pc();
        build(&mut prog.code);
        let end = prog.code.pc();
        prog.funcs[0].entry = entry;
        prog.funcs[0].end = end;

        let mut fc = decode_function(&prog.code, &prog.funcs[0]).unwrap();
        let enabled = analyze(&mut fc, end);
        (fc, enabled)
    }

    #[test]
    fn test_dead_const_detected() {
        // ICONST 1; POP; ICONST 0; RET: the first const is dead.
        let (fc, enabled) = decode_and_analyze(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(1);
            c.emit_op(Opcode::Pop);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(0);
            c.emit_op(Opcode::Ret);
        });
        assert!(enabled);
        assert!(!fc.instrs[0].result_live);
        // The returned const is consumed by RET.
        assert!(fc.instrs[2].result_live);
    }

    #[test]
    fn test_ret_value_is_live() {
        let (fc, enabled) = decode_and_analyze(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(1);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(2);
            c.emit_op(Opcode::Iadd);
            c.emit_op(Opcode::Ret);
        });
        assert!(enabled);
        assert!(fc.instrs[0].result_live);
        assert!(fc.instrs[1].result_live);
        assert!(fc.instrs[2].result_live);
    }

    #[test]
    fn test_halt_top_is_live() {
        let (fc, enabled) = decode_and_analyze(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(7);
            c.emit_op(Opcode::Halt);
        });
        assert!(enabled);
        assert!(fc.instrs[0].result_live);
    }

    #[test]
    fn test_discarded_alloc_keeps_side_effect_not_value() {
        // ICONST 3; ARRAY_NEW; POP; ICONST 0; RET
        let (fc, enabled) = decode_and_analyze(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(3);
            c.emit_op(Opcode::ArrayNew);
            c.emit_op(Opcode::Pop);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(0);
            c.emit_op(Opcode::Ret);
        });
        assert!(enabled);
        let alloc = &fc.instrs[1];
        assert!(alloc.side_effect);
        assert!(!alloc.result_live);
        // Its size input stays live because the op executes.
        assert!(fc.instrs[0].result_live);
    }

    #[test]
    fn test_branch_heights_must_agree() {
        // One arm pushes an extra word: merge disagrees, analysis off.
        let (fc, enabled) = decode_and_analyze(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(1);
            c.emit_op(Opcode::JmpIfFalse);
            let jz = c.pc();
            c.emit_u32(0);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(1);
            // Falls through to the merge with height 1; the jump edge
            // arrives with height 0.
            let merge = c.pc();
            c.patch_u32(jz, merge as u32);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(0);
            c.emit_op(Opcode::Ret);
        });
        assert!(!enabled);
        assert!(fc.instrs.iter().all(|i| i.result_live));
    }

    #[test]
    fn test_underflow_disables_analysis() {
        let (fc, enabled) = decode_and_analyze(|c| {
            c.emit_op(Opcode::Pop);
            c.emit_op(Opcode::Iconst);
            c.emit_i64(0);
            c.emit_op(Opcode::Ret);
        });
        assert!(!enabled);
        assert!(fc.instrs.iter().all(|i| i.result_live));
    }

    #[test]
    fn test_loop_heights_deterministic() {
        let prog = opal_compiler::compile(
            "fn main() { let i = 0; while (i < 10) { i = i + 1; } print(i); }",
        )
        .unwrap();
        let func = &prog.funcs[0];
        let mut fc = decode_function(&prog.code, func).unwrap();
        assert!(analyze(&mut fc, func.end));
        for ins in &fc.instrs {
            if ins.height_before >= 0 {
                assert!(ins.height_after() >= 0);
            }
        }
    }

    #[test]
    fn test_decode_reads_call_immediates() {
        let (fc, _) = decode_and_analyze(|c| {
            c.emit_op(Opcode::Iconst);
            c.emit_i64(5);
            c.emit_op(Opcode::Call);
            c.emit_u32(0);
            c.emit_u32(1);
            c.emit_op(Opcode::Ret);
        });
        let call = &fc.instrs[1];
        assert_eq!(call.imm0, 0);
        assert_eq!(call.imm1, 1);
        assert_eq!(call.consume, 1);
        assert_eq!(call.produce, 1);
    }
}
