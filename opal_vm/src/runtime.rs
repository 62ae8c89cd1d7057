//! Runtime intrinsics.
//!
//! Every intrinsic exists twice: a safe `Result`-returning function the
//! interpreter calls directly, and an `extern "C-unwind"` shim for
//! JIT'd code that takes the VM as a raw pointer and converts an error
//! into a panic carrying the [`OpalError`] payload. The driver catches
//! that panic at the top level, so both execution modes surface errors
//! through one path.
//!
//! `call_function` is the trampoline of the mixed-mode design: it
//! builds a native frame (locals slab + operand stack), registers both
//! as GC roots, and enters compiled code. The operand stack's live
//! count is the `JitContext::stack_size` field the generated code
//! publishes before any call that can reach the collector.

use crate::vm::Vm;
use opal_compiler::Opcode;
use opal_core::{f64_from_bits, OpalError, OpalResult};
use opal_jit::{CompiledFn, JitContext, RuntimeHooks};
use rand::RngCore;
use std::ffi::c_void;
use std::time::Instant;

/// Base-10⁹ limbs per printed block.
const BIG_LIMB_DIGITS: usize = 9;

// =============================================================================
// Arrays
// =============================================================================

/// Allocate a zeroed array, collecting first when the threshold is due.
pub fn array_new(vm: &mut Vm, size: i64) -> OpalResult<i64> {
    if size < 0 {
        return Err(OpalError::memory("ARRAY_NEW: negative size"));
    }

    if vm.heap.should_collect() {
        opal_gc::collect(&mut vm.heap, &vm.estack, &vm.roots);
        vm.heap.reset_alloc_count();
    }

    Ok(vm.heap.alloc(size as usize))
}

pub fn array_get(vm: &Vm, handle: i64, idx: i64) -> OpalResult<i64> {
    if !vm.heap.is_handle(handle) {
        return Err(OpalError::memory("ARRAY_GET: invalid array handle"));
    }
    let len = vm.heap.len_of(handle);
    if idx < 0 || idx as usize >= len {
        return Err(OpalError::memory("ARRAY_GET: index out of bounds"));
    }
    Ok(vm.heap.get(handle, idx as usize))
}

pub fn array_set(vm: &mut Vm, handle: i64, idx: i64, value: i64) -> OpalResult<()> {
    if !vm.heap.is_handle(handle) {
        return Err(OpalError::memory("ARRAY_SET: invalid array handle"));
    }
    let len = vm.heap.len_of(handle);
    if idx < 0 || idx as usize >= len {
        return Err(OpalError::memory("ARRAY_SET: index out of bounds"));
    }
    vm.heap.set(handle, idx as usize, value);
    Ok(())
}

pub fn array_len(vm: &Vm, handle: i64) -> OpalResult<i64> {
    if !vm.heap.is_handle(handle) {
        return Err(OpalError::memory("ARRAY_LEN: invalid array handle"));
    }
    Ok(vm.heap.len_of(handle) as i64)
}

// =============================================================================
// Printing
// =============================================================================

pub fn print_int(v: i64) {
    println!("{v}");
}

pub fn print_f_bits(bits: i64) {
    println!("{}", format_float(f64_from_bits(bits)));
}

/// Format a double with 17 significant digits in the host's default
/// notation: fixed with trailing zeros trimmed, scientific once the
/// exponent leaves [-4, 17).
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let sci = format!("{x:.16e}");
    let epos = sci.find('e').unwrap_or(sci.len() - 1);
    let exp: i32 = sci[epos + 1..].parse().unwrap_or(0);

    if !(-4..17).contains(&exp) {
        let mantissa = trim_zeros(&sci[..epos]);
        format!("{}e{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
    } else {
        let frac_digits = (16 - exp).max(0) as usize;
        trim_zeros(&format!("{x:.frac_digits$}"))
    }
}

fn trim_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Print the low `len` limbs of a base-10⁹ number, most significant
/// limb first and unpadded, lower limbs zero-padded to nine digits.
pub fn print_big(vm: &Vm, handle: i64, len: i64) -> OpalResult<()> {
    println!("{}", format_big(vm, handle, len)?);
    Ok(())
}

pub fn format_big(vm: &Vm, handle: i64, len: i64) -> OpalResult<String> {
    if !vm.heap.is_handle(handle) {
        return Err(OpalError::memory("PRINT_BIG: invalid array handle"));
    }
    if len < 0 {
        return Err(OpalError::memory("PRINT_BIG: negative len"));
    }
    let limbs = vm.heap.data_of(handle);
    if len as usize > limbs.len() {
        return Err(OpalError::memory("PRINT_BIG: len out of bounds"));
    }
    if len == 0 {
        return Ok("0".to_string());
    }

    let mut i = len as usize - 1;
    while i > 0 && limbs[i] == 0 {
        i -= 1;
    }

    let mut out = limbs[i].to_string();
    while i > 0 {
        i -= 1;
        out.push_str(&format!("{:0width$}", limbs[i], width = BIG_LIMB_DIGITS));
    }
    Ok(out)
}

// =============================================================================
// Time, randomness, math
// =============================================================================

/// Monotonic milliseconds since the first call.
pub fn time_ms(vm: &mut Vm) -> i64 {
    let origin = *vm.time_origin.get_or_insert_with(Instant::now);
    origin.elapsed().as_millis() as i64
}

/// Nonnegative 63-bit pseudo-random integer.
pub fn rand_i64(vm: &mut Vm) -> i64 {
    (vm.rng.next_u64() & 0x7FFF_FFFF_FFFF_FFFF) as i64
}

pub fn sqrt_bits(bits: i64) -> i64 {
    f64_from_bits(bits).sqrt().to_bits() as i64
}

// =============================================================================
// The trampoline
// =============================================================================

/// Dispatch a call from running code into a JIT-compiled callee.
///
/// The callee must be compiled: the VM compiles every function before
/// `main` runs, so an uncompiled callee here is an internal bug, not a
/// user error.
pub fn call_function(vm: &mut Vm, fid: u32, args: &[i64]) -> OpalResult<i64> {
    let func = vm
        .prog
        .funcs
        .get(fid as usize)
        .ok_or_else(|| OpalError::internal("CALL: invalid function id"))?;

    let entry: CompiledFn = vm
        .jit
        .as_ref()
        .and_then(|j| j.compiled_fn(fid))
        .ok_or_else(|| {
            OpalError::internal(format!(
                "call_function: '{}' is not JIT-compiled; all functions are pre-compiled",
                func.name
            ))
        })?;

    let nlocals = func.nlocals as usize;
    let arity = func.arity as usize;
    let mut locals = vec![0i64; nlocals.max(1)];
    for (slot, &arg) in locals.iter_mut().zip(args.iter().take(arity)) {
        *slot = arg;
    }

    let cap = if func.max_stack != 0 {
        func.max_stack as usize
    } else {
        1024
    };
    let mut stack = vec![0i64; cap];

    let mut ctx = JitContext {
        locals: locals.as_mut_ptr(),
        stack: stack.as_mut_ptr(),
        stack_size: 0,
        vm: vm as *mut Vm as *mut c_void,
    };
    let locals_live = nlocals;

    // Safety: both slabs and their live counts outlive the native call
    // below, and the registrations are popped before they drop.
    unsafe {
        vm.roots.register(locals.as_ptr(), &locals_live);
        vm.roots.register(stack.as_ptr(), &ctx.stack_size);
    }

    // Safety: `entry` was compiled for exactly this context layout.
    let result = unsafe { entry(&mut ctx) };

    vm.roots.pop();
    vm.roots.pop();

    Ok(result)
}

// =============================================================================
// C-ABI shims for JIT'd code
// =============================================================================

/// The intrinsic address table handed to the JIT compiler.
pub fn hooks() -> RuntimeHooks {
    RuntimeHooks {
        call_function: rt_call_function as usize as u64,
        array_new: rt_array_new as usize as u64,
        array_get: rt_array_get as usize as u64,
        array_set: rt_array_set as usize as u64,
        array_len: rt_array_len as usize as u64,
        print: rt_print as usize as u64,
        print_f: rt_print_f as usize as u64,
        print_big: rt_print_big as usize as u64,
        time_ms: rt_time_ms as usize as u64,
        rand: rt_rand as usize as u64,
        div_zero: rt_div_zero as usize as u64,
    }
}

fn raise(err: OpalError) -> ! {
    std::panic::panic_any(err)
}

unsafe extern "C-unwind" fn rt_call_function(
    vm: *mut c_void,
    fid: u32,
    args: *const i64,
    argc: u32,
) -> i64 {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    let args = unsafe { std::slice::from_raw_parts(args, argc as usize) };
    match call_function(vm, fid, args) {
        Ok(v) => v,
        Err(e) => raise(e),
    }
}

unsafe extern "C-unwind" fn rt_array_new(vm: *mut c_void, size: i64) -> i64 {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    match array_new(vm, size) {
        Ok(v) => v,
        Err(e) => raise(e),
    }
}

unsafe extern "C-unwind" fn rt_array_get(vm: *mut c_void, handle: i64, idx: i64) -> i64 {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    match array_get(vm, handle, idx) {
        Ok(v) => v,
        Err(e) => raise(e),
    }
}

unsafe extern "C-unwind" fn rt_array_set(vm: *mut c_void, handle: i64, idx: i64, val: i64) {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    if let Err(e) = array_set(vm, handle, idx, val) {
        raise(e);
    }
}

unsafe extern "C-unwind" fn rt_array_len(vm: *mut c_void, handle: i64) -> i64 {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    match array_len(vm, handle) {
        Ok(v) => v,
        Err(e) => raise(e),
    }
}

unsafe extern "C-unwind" fn rt_print(v: i64) {
    print_int(v);
}

unsafe extern "C-unwind" fn rt_print_f(bits: i64) {
    print_f_bits(bits);
}

unsafe extern "C-unwind" fn rt_print_big(vm: *mut c_void, handle: i64, len: i64) {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    if let Err(e) = print_big(vm, handle, len) {
        raise(e);
    }
}

unsafe extern "C-unwind" fn rt_time_ms(vm: *mut c_void) -> i64 {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    time_ms(vm)
}

unsafe extern "C-unwind" fn rt_rand(vm: *mut c_void) -> i64 {
    let vm = unsafe { &mut *(vm as *mut Vm) };
    rand_i64(vm)
}

unsafe extern "C-unwind" fn rt_div_zero(_vm: *mut c_void, opcode: u32) -> ! {
    let name = Opcode::from_u8(opcode as u8).map_or("IDIV", Opcode::name);
    raise(OpalError::division_by_zero(name))
}
