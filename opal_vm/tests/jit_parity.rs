//! Interpreter/JIT equivalence.
//!
//! The same source runs once interpreter-only and once with every
//! function pre-compiled; both must return the same word. Calls from
//! `main` enter native code through the trampoline, so these tests
//! exercise the full root-registration protocol as well.

#![cfg(target_arch = "x86_64")]

use opal_compiler::compile;
use opal_vm::{Vm, VmConfig};

fn parity(src: &str) -> i64 {
    let interp = {
        let prog = compile(src).unwrap();
        Vm::new(prog, VmConfig::interpreter_only()).run("main").unwrap()
    };
    let jit = {
        let prog = compile(src).unwrap();
        Vm::new(prog, VmConfig::default()).run("main").unwrap()
    };
    assert_eq!(interp, jit, "interpreter and JIT disagree");
    interp
}

fn parity_with_gc(src: &str, gc_threshold: usize) -> i64 {
    let interp = {
        let prog = compile(src).unwrap();
        let mut vm = Vm::new(
            prog,
            VmConfig {
                jit_enabled: false,
                gc_threshold,
            },
        );
        vm.run("main").unwrap()
    };
    let jit = {
        let prog = compile(src).unwrap();
        let mut vm = Vm::new(
            prog,
            VmConfig {
                jit_enabled: true,
                gc_threshold,
            },
        );
        vm.run("main").unwrap()
    };
    assert_eq!(interp, jit, "interpreter and JIT disagree under GC");
    interp
}

#[test]
fn test_parity_arithmetic() {
    let src = "fn calc(a, b) { return (a + b * 3 - 4) / 2 % 10; }\n\
               fn main() { return calc(10, 7); }";
    assert_eq!(parity(src), 3);
}

#[test]
fn test_parity_factorial() {
    let src = "fn fact(n) { if (n <= 1) { return 1; } return n * fact(n - 1); }\n\
               fn main() { return fact(12); }";
    assert_eq!(parity(src), 479001600);
}

#[test]
fn test_parity_loops() {
    let src = "fn sum_to(n) {\n\
                 let s = 0;\n\
                 for (let i = 1; i <= n; i = i + 1) { s = s + i; }\n\
                 return s;\n\
               }\n\
               fn main() { return sum_to(1000); }";
    assert_eq!(parity(src), 500500);
}

#[test]
fn test_parity_break_continue() {
    let src = "fn f() {\n\
                 let acc = 0;\n\
                 let i = 0;\n\
                 while (1) {\n\
                   i = i + 1;\n\
                   if (i > 20) { break; }\n\
                   if (i % 3 != 0) { continue; }\n\
                   acc = acc + i;\n\
                 }\n\
                 return acc;\n\
               }\n\
               fn main() { return f(); }";
    // 3+6+9+12+15+18
    assert_eq!(parity(src), 63);
}

#[test]
fn test_parity_floats() {
    let src = "fn f() {\n\
                 let x = sqrt(2.0);\n\
                 let y = x * x;\n\
                 let d = y - 2.0;\n\
                 if (d < 0.0) { d = 0.0 - d; }\n\
                 return d < 0.0000001;\n\
               }\n\
               fn main() { return f(); }";
    assert_eq!(parity(src), 1);
}

#[test]
fn test_parity_nan_compares() {
    let src = "fn f() {\n\
                 let nan = 0.0 / 0.0;\n\
                 let r = 0;\n\
                 if (nan <= nan) { r = r + 1; }\n\
                 if (nan < nan) { r = r + 2; }\n\
                 if (nan >= nan) { r = r + 4; }\n\
                 if (nan > nan) { r = r + 8; }\n\
                 if (nan == nan) { r = r + 16; }\n\
                 if (nan != nan) { r = r + 32; }\n\
                 return r;\n\
               }\n\
               fn main() { return f(); }";
    assert_eq!(parity(src), 32);
}

#[test]
fn test_parity_division_edges() {
    let src = "fn f(a, b) { return a / b * 1000 + a % b; }\n\
               fn main() { return f(-17, 5); }";
    assert_eq!(parity(src), -3002);

    let src = "fn f() { let m = -9223372036854775807 - 1; return m / -1 + m % -1; }\n\
               fn main() { return f(); }";
    assert_eq!(parity(src), i64::MIN);
}

#[test]
fn test_parity_arrays_under_gc() {
    let src = "fn build(n) {\n\
                 let a = array(n);\n\
                 let i = 0;\n\
                 while (i < n) { a[i] = i * 3; i = i + 1; }\n\
                 return a;\n\
               }\n\
               fn churn(n) {\n\
                 let i = 0;\n\
                 while (i < n) { let t = array(7); i = i + 1; }\n\
                 return 0;\n\
               }\n\
               fn f() {\n\
                 let a = build(10);\n\
                 churn(200);\n\
                 let s = 0;\n\
                 let i = 0;\n\
                 while (i < len(a)) { s = s + a[i]; i = i + 1; }\n\
                 return s;\n\
               }\n\
               fn main() { return f(); }";
    // Collections fire inside native frames; the operand stacks and
    // locals slabs registered by the trampoline keep `a` alive.
    assert_eq!(parity_with_gc(src, 3), 135);
}

#[test]
fn test_parity_nested_arrays_rooted_from_native_frames() {
    let src = "fn f() {\n\
                 let outer = array(1);\n\
                 let inner = array(1);\n\
                 inner[0] = 4321;\n\
                 outer[0] = inner;\n\
                 inner = 0;\n\
                 let i = 0;\n\
                 while (i < 100) { let t = array(5); i = i + 1; }\n\
                 let back = outer[0];\n\
                 return back[0];\n\
               }\n\
               fn main() { return f(); }";
    assert_eq!(parity_with_gc(src, 2), 4321);
}

#[test]
fn test_parity_dead_stores_with_side_effects() {
    // The discarded expression results must still run their effects:
    // the array write happens through an expression statement whose
    // value is popped.
    let src = "fn f() {\n\
                 let x = array(3);\n\
                 x[0] = 7;\n\
                 1 + 2;\n\
                 x[0];\n\
                 return x[0];\n\
               }\n\
               fn main() { return f(); }";
    assert_eq!(parity(src), 7);
}

#[test]
fn test_parity_mutual_recursion() {
    let src = "fn is_even(n) { if (n == 0) { return 1; } return is_odd(n - 1); }\n\
               fn is_odd(n) { if (n == 0) { return 0; } return is_even(n - 1); }\n\
               fn main() { return is_even(64); }";
    assert_eq!(parity(src), 1);
}

#[test]
fn test_parity_deep_native_recursion() {
    let src = "fn down(n) { if (n == 0) { return 0; } return down(n - 1) + 1; }\n\
               fn main() { return down(150); }";
    assert_eq!(parity(src), 150);
}
