//! Opcode definitions and per-opcode static metadata.
//!
//! The metadata here is shared by the interpreter, the stack-height
//! analyser, and the JIT's liveness pass, so the three can never drift
//! apart on what an instruction consumes, produces, or observes.

/// One byte of opcode. Typed arithmetic comes in integer and floating
/// variants; loads and stores are untyped word moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    /// Push a 64-bit integer immediate.
    Iconst,
    /// Push a double immediate (as its bit pattern).
    Fconst,
    /// Push `locals[slot]`.
    Load,
    /// Pop into `locals[slot]`.
    Store,

    Iadd,
    Isub,
    Imul,
    Idiv,
    Imod,

    CmpLe,
    CmpLt,
    CmpGe,
    CmpGt,
    CmpEq,
    CmpNe,

    /// Integer → double (value conversion).
    I2f,
    /// Double → integer (truncates toward zero).
    F2i,

    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Fsqrt,

    FcmpLe,
    FcmpLt,
    FcmpGe,
    FcmpGt,
    FcmpEq,
    FcmpNe,

    Pop,
    Print,
    PrintF,
    PrintBig,

    ArrayNew,
    ArrayGet,
    ArraySet,
    ArrayLen,

    TimeMs,
    Rand,

    Jmp,
    JmpIfFalse,
    Call,
    Ret,
    Halt,
}

impl Opcode {
    /// Decode an opcode byte.
    #[inline]
    pub const fn from_u8(byte: u8) -> Option<Opcode> {
        if byte <= Opcode::Halt as u8 {
            // Safety: repr(u8), contiguous from 0 to Halt.
            Some(unsafe { std::mem::transmute::<u8, Opcode>(byte) })
        } else {
            None
        }
    }

    /// Mnemonic used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Iconst => "ICONST",
            Opcode::Fconst => "FCONST",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Iadd => "IADD",
            Opcode::Isub => "ISUB",
            Opcode::Imul => "IMUL",
            Opcode::Idiv => "IDIV",
            Opcode::Imod => "IMOD",
            Opcode::CmpLe => "CMPLE",
            Opcode::CmpLt => "CMPLT",
            Opcode::CmpGe => "CMPGE",
            Opcode::CmpGt => "CMPGT",
            Opcode::CmpEq => "CMPEQ",
            Opcode::CmpNe => "CMPNE",
            Opcode::I2f => "I2F",
            Opcode::F2i => "F2I",
            Opcode::Fadd => "FADD",
            Opcode::Fsub => "FSUB",
            Opcode::Fmul => "FMUL",
            Opcode::Fdiv => "FDIV",
            Opcode::Fsqrt => "FSQRT",
            Opcode::FcmpLe => "FCMPLE",
            Opcode::FcmpLt => "FCMPLT",
            Opcode::FcmpGe => "FCMPGE",
            Opcode::FcmpGt => "FCMPGT",
            Opcode::FcmpEq => "FCMPEQ",
            Opcode::FcmpNe => "FCMPNE",
            Opcode::Pop => "POP",
            Opcode::Print => "PRINT",
            Opcode::PrintF => "PRINT_F",
            Opcode::PrintBig => "PRINT_BIG",
            Opcode::ArrayNew => "ARRAY_NEW",
            Opcode::ArrayGet => "ARRAY_GET",
            Opcode::ArraySet => "ARRAY_SET",
            Opcode::ArrayLen => "ARRAY_LEN",
            Opcode::TimeMs => "TIME_MS",
            Opcode::Rand => "RAND",
            Opcode::Jmp => "JMP",
            Opcode::JmpIfFalse => "JMP_IF_FALSE",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Halt => "HALT",
        }
    }

    /// Number of inline immediate bytes following the opcode byte.
    #[inline]
    pub const fn operand_width(self) -> usize {
        match self {
            Opcode::Iconst | Opcode::Fconst => 8,
            Opcode::Load | Opcode::Store | Opcode::Jmp | Opcode::JmpIfFalse => 4,
            Opcode::Call => 8,
            _ => 0,
        }
    }

    /// Operand-stack words consumed. For `Call` this is the argument
    /// count, which lives in the instruction's immediate.
    #[inline]
    pub const fn consumes(self, argc: u32) -> u32 {
        match self {
            Opcode::Store
            | Opcode::I2f
            | Opcode::F2i
            | Opcode::Fsqrt
            | Opcode::Pop
            | Opcode::Print
            | Opcode::PrintF
            | Opcode::ArrayNew
            | Opcode::ArrayLen
            | Opcode::JmpIfFalse
            | Opcode::Ret => 1,
            Opcode::Iadd
            | Opcode::Isub
            | Opcode::Imul
            | Opcode::Idiv
            | Opcode::Imod
            | Opcode::CmpLe
            | Opcode::CmpLt
            | Opcode::CmpGe
            | Opcode::CmpGt
            | Opcode::CmpEq
            | Opcode::CmpNe
            | Opcode::Fadd
            | Opcode::Fsub
            | Opcode::Fmul
            | Opcode::Fdiv
            | Opcode::FcmpLe
            | Opcode::FcmpLt
            | Opcode::FcmpGe
            | Opcode::FcmpGt
            | Opcode::FcmpEq
            | Opcode::FcmpNe
            | Opcode::PrintBig
            | Opcode::ArrayGet => 2,
            Opcode::ArraySet => 3,
            Opcode::Call => argc,
            _ => 0,
        }
    }

    /// Operand-stack words produced.
    #[inline]
    pub const fn produces(self) -> u32 {
        match self {
            Opcode::Iconst
            | Opcode::Fconst
            | Opcode::Load
            | Opcode::Iadd
            | Opcode::Isub
            | Opcode::Imul
            | Opcode::Idiv
            | Opcode::Imod
            | Opcode::CmpLe
            | Opcode::CmpLt
            | Opcode::CmpGe
            | Opcode::CmpGt
            | Opcode::CmpEq
            | Opcode::CmpNe
            | Opcode::I2f
            | Opcode::F2i
            | Opcode::Fadd
            | Opcode::Fsub
            | Opcode::Fmul
            | Opcode::Fdiv
            | Opcode::Fsqrt
            | Opcode::FcmpLe
            | Opcode::FcmpLt
            | Opcode::FcmpGe
            | Opcode::FcmpGt
            | Opcode::FcmpEq
            | Opcode::FcmpNe
            | Opcode::ArrayNew
            | Opcode::ArrayGet
            | Opcode::ArrayLen
            | Opcode::TimeMs
            | Opcode::Rand
            | Opcode::Call => 1,
            _ => 0,
        }
    }

    /// Net stack effect, as used by the stack-height analyser.
    #[inline]
    pub const fn stack_effect(self, argc: u32) -> i32 {
        self.produces() as i32 - self.consumes(argc) as i32
    }

    /// Whether the instruction must execute even when its result is
    /// dead: it observes or mutates state outside the operand stack, or
    /// it can fail.
    #[inline]
    pub const fn has_side_effect(self) -> bool {
        matches!(
            self,
            Opcode::Store
                | Opcode::Idiv
                | Opcode::Imod
                | Opcode::Print
                | Opcode::PrintF
                | Opcode::PrintBig
                | Opcode::ArrayNew
                | Opcode::ArrayGet
                | Opcode::ArraySet
                | Opcode::ArrayLen
                | Opcode::TimeMs
                | Opcode::Rand
                | Opcode::Jmp
                | Opcode::JmpIfFalse
                | Opcode::Call
                | Opcode::Ret
                | Opcode::Halt
        )
    }

    /// Whether the instruction reads the values it pops. `POP` and
    /// friends only move the stack index, so their inputs stay dead.
    #[inline]
    pub const fn uses_inputs(self) -> bool {
        !matches!(
            self,
            Opcode::Nop
                | Opcode::Iconst
                | Opcode::Fconst
                | Opcode::Load
                | Opcode::Pop
                | Opcode::TimeMs
                | Opcode::Rand
                | Opcode::Jmp
                | Opcode::Halt
        )
    }

    /// Whether control never falls through to the next instruction.
    #[inline]
    pub const fn is_terminator(self) -> bool {
        matches!(self, Opcode::Ret | Opcode::Halt | Opcode::Jmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_opcodes() {
        for byte in 0..=Opcode::Halt as u8 {
            let op = Opcode::from_u8(byte).unwrap();
            assert_eq!(op as u8, byte);
        }
        assert!(Opcode::from_u8(Opcode::Halt as u8 + 1).is_none());
        assert!(Opcode::from_u8(0xFF).is_none());
    }

    #[test]
    fn test_stack_effects_match_table() {
        assert_eq!(Opcode::Iconst.stack_effect(0), 1);
        assert_eq!(Opcode::Load.stack_effect(0), 1);
        assert_eq!(Opcode::Store.stack_effect(0), -1);
        assert_eq!(Opcode::Iadd.stack_effect(0), -1);
        assert_eq!(Opcode::I2f.stack_effect(0), 0);
        assert_eq!(Opcode::Fsqrt.stack_effect(0), 0);
        assert_eq!(Opcode::ArrayNew.stack_effect(0), 0);
        assert_eq!(Opcode::ArraySet.stack_effect(0), -3);
        assert_eq!(Opcode::PrintBig.stack_effect(0), -2);
        assert_eq!(Opcode::TimeMs.stack_effect(0), 1);
        assert_eq!(Opcode::Call.stack_effect(3), -2);
        assert_eq!(Opcode::Call.stack_effect(0), 1);
        assert_eq!(Opcode::Ret.stack_effect(0), -1);
        assert_eq!(Opcode::Halt.stack_effect(0), 0);
    }

    #[test]
    fn test_operand_widths() {
        assert_eq!(Opcode::Iconst.operand_width(), 8);
        assert_eq!(Opcode::Fconst.operand_width(), 8);
        assert_eq!(Opcode::Load.operand_width(), 4);
        assert_eq!(Opcode::Jmp.operand_width(), 4);
        assert_eq!(Opcode::Call.operand_width(), 8);
        assert_eq!(Opcode::Iadd.operand_width(), 0);
    }

    #[test]
    fn test_side_effect_set() {
        // Every op the GC or stdout can observe must be side-effecting.
        for op in [
            Opcode::Idiv,
            Opcode::Imod,
            Opcode::Call,
            Opcode::ArrayNew,
            Opcode::ArrayGet,
            Opcode::ArraySet,
            Opcode::ArrayLen,
            Opcode::Print,
            Opcode::PrintF,
            Opcode::PrintBig,
            Opcode::TimeMs,
            Opcode::Rand,
        ] {
            assert!(op.has_side_effect(), "{} must be side-effecting", op.name());
        }
        for op in [Opcode::Iadd, Opcode::Fsqrt, Opcode::Pop, Opcode::Load] {
            assert!(!op.has_side_effect(), "{} must be pure", op.name());
        }
    }

    #[test]
    fn test_pop_does_not_use_inputs() {
        assert!(!Opcode::Pop.uses_inputs());
        assert!(Opcode::Print.uses_inputs());
        assert!(Opcode::JmpIfFalse.uses_inputs());
    }
}
