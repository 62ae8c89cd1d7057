//! The bytecode interpreter.
//!
//! Reference semantics for every opcode. Calls to JIT-compiled callees
//! leave through the runtime trampoline so native and interpreted
//! frames share one call graph; everything else is a straight dispatch
//! loop over the code buffer.

use crate::runtime;
use crate::vm::Vm;
use opal_compiler::Opcode;
use opal_core::{f64_bits, f64_from_bits, OpalError, OpalResult};

fn pop(vm: &mut Vm, op: Opcode) -> OpalResult<i64> {
    vm.estack
        .pop()
        .ok_or_else(|| OpalError::stack(format!("{}: stack underflow", op.name())))
}

fn pop2(vm: &mut Vm, op: Opcode) -> OpalResult<(i64, i64)> {
    let b = pop(vm, op)?;
    let a = pop(vm, op)?;
    Ok((a, b))
}

fn pop2f(vm: &mut Vm, op: Opcode) -> OpalResult<(f64, f64)> {
    let (a, b) = pop2(vm, op)?;
    Ok((f64_from_bits(a), f64_from_bits(b)))
}

/// Interpret from `start_ip` until the entry frame returns or a HALT
/// executes; yields the result word.
pub fn run(vm: &mut Vm, start_ip: usize) -> OpalResult<i64> {
    let mut ip = start_ip;

    loop {
        let op = vm
            .prog
            .code
            .opcode_at(ip)
            .ok_or_else(|| OpalError::internal(format!("unknown opcode at {ip}")))?;
        ip += 1;

        match op {
            Opcode::Nop => {}

            Opcode::Iconst | Opcode::Fconst => {
                let v = vm.prog.code.read_i64(ip);
                ip += 8;
                vm.estack.push(v);
            }

            Opcode::Load => {
                let slot = vm.prog.code.read_u32(ip) as usize;
                ip += 4;
                let frame = vm
                    .frames
                    .last()
                    .ok_or_else(|| OpalError::stack("LOAD: no frame"))?;
                let idx = frame.bp + slot;
                if idx >= vm.estack.len() {
                    return Err(OpalError::stack("LOAD: slot out of bounds"));
                }
                let v = vm.estack[idx];
                vm.estack.push(v);
            }

            Opcode::Store => {
                let slot = vm.prog.code.read_u32(ip) as usize;
                ip += 4;
                let v = pop(vm, op)?;
                let frame = vm
                    .frames
                    .last()
                    .ok_or_else(|| OpalError::stack("STORE: no frame"))?;
                let idx = frame.bp + slot;
                if idx >= vm.estack.len() {
                    return Err(OpalError::stack("STORE: slot out of bounds"));
                }
                vm.estack[idx] = v;
            }

            Opcode::Iadd => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push(a.wrapping_add(b));
            }
            Opcode::Isub => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push(a.wrapping_sub(b));
            }
            Opcode::Imul => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push(a.wrapping_mul(b));
            }
            Opcode::Idiv => {
                let (a, b) = pop2(vm, op)?;
                if b == 0 {
                    return Err(OpalError::division_by_zero(op.name()));
                }
                vm.estack.push(a.wrapping_div(b));
            }
            Opcode::Imod => {
                let (a, b) = pop2(vm, op)?;
                if b == 0 {
                    return Err(OpalError::division_by_zero(op.name()));
                }
                vm.estack.push(a.wrapping_rem(b));
            }

            Opcode::CmpLe => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push((a <= b) as i64);
            }
            Opcode::CmpLt => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push((a < b) as i64);
            }
            Opcode::CmpGe => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push((a >= b) as i64);
            }
            Opcode::CmpGt => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push((a > b) as i64);
            }
            Opcode::CmpEq => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push((a == b) as i64);
            }
            Opcode::CmpNe => {
                let (a, b) = pop2(vm, op)?;
                vm.estack.push((a != b) as i64);
            }

            Opcode::I2f => {
                let a = pop(vm, op)?;
                vm.estack.push(f64_bits(a as f64));
            }
            Opcode::F2i => {
                let bits = pop(vm, op)?;
                vm.estack.push(f64_from_bits(bits) as i64);
            }

            Opcode::Fadd => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push(f64_bits(a + b));
            }
            Opcode::Fsub => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push(f64_bits(a - b));
            }
            Opcode::Fmul => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push(f64_bits(a * b));
            }
            Opcode::Fdiv => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push(f64_bits(a / b));
            }
            Opcode::Fsqrt => {
                let bits = pop(vm, op)?;
                vm.estack.push(runtime::sqrt_bits(bits));
            }

            Opcode::FcmpLe => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push((a <= b) as i64);
            }
            Opcode::FcmpLt => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push((a < b) as i64);
            }
            Opcode::FcmpGe => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push((a >= b) as i64);
            }
            Opcode::FcmpGt => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push((a > b) as i64);
            }
            Opcode::FcmpEq => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push((a == b) as i64);
            }
            Opcode::FcmpNe => {
                let (a, b) = pop2f(vm, op)?;
                vm.estack.push((a != b) as i64);
            }

            Opcode::Pop => {
                pop(vm, op)?;
            }

            Opcode::Print => {
                let v = pop(vm, op)?;
                runtime::print_int(v);
            }
            Opcode::PrintF => {
                let bits = pop(vm, op)?;
                runtime::print_f_bits(bits);
            }
            Opcode::PrintBig => {
                let (handle, len) = pop2(vm, op)?;
                runtime::print_big(vm, handle, len)?;
            }

            Opcode::ArrayNew => {
                let size = pop(vm, op)?;
                let handle = runtime::array_new(vm, size)?;
                vm.estack.push(handle);
            }
            Opcode::ArrayGet => {
                let (handle, idx) = pop2(vm, op)?;
                let v = runtime::array_get(vm, handle, idx)?;
                vm.estack.push(v);
            }
            Opcode::ArraySet => {
                let v = pop(vm, op)?;
                let (handle, idx) = pop2(vm, op)?;
                runtime::array_set(vm, handle, idx, v)?;
            }
            Opcode::ArrayLen => {
                let handle = pop(vm, op)?;
                let len = runtime::array_len(vm, handle)?;
                vm.estack.push(len);
            }

            Opcode::TimeMs => {
                let ms = runtime::time_ms(vm);
                vm.estack.push(ms);
            }
            Opcode::Rand => {
                let r = runtime::rand_i64(vm);
                vm.estack.push(r);
            }

            Opcode::Jmp => {
                ip = vm.prog.code.read_u32(ip) as usize;
            }
            Opcode::JmpIfFalse => {
                let target = vm.prog.code.read_u32(ip) as usize;
                ip += 4;
                let cond = pop(vm, op)?;
                if cond == 0 {
                    ip = target;
                }
            }

            Opcode::Call => {
                let fid = vm.prog.code.read_u32(ip);
                ip += 4;
                let argc = vm.prog.code.read_u32(ip) as usize;
                ip += 4;

                if vm.jit.as_ref().is_some_and(|j| j.is_compiled(fid)) {
                    if vm.estack.len() < argc {
                        return Err(OpalError::stack("CALL: not enough arguments"));
                    }
                    let args_at = vm.estack.len() - argc;
                    let args: Vec<i64> = vm.estack[args_at..].to_vec();
                    let result = runtime::call_function(vm, fid, &args)?;
                    vm.estack.truncate(args_at);
                    vm.estack.push(result);
                } else {
                    vm.push_frame(fid, Some(ip))?;
                    ip = vm.prog.funcs[fid as usize].entry;
                }
            }

            Opcode::Ret => {
                let ret_to = vm
                    .frames
                    .last()
                    .ok_or_else(|| OpalError::stack("RET: no frame"))?
                    .ret_ip;
                vm.pop_frame()?;
                match ret_to {
                    Some(at) => ip = at,
                    None => return Ok(vm.estack.last().copied().unwrap_or(0)),
                }
            }

            Opcode::Halt => {
                return Ok(vm.estack.last().copied().unwrap_or(0));
            }
        }
    }
}
