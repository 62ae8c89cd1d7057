//! x86-64 register definitions.

/// General-purpose 64-bit registers with their hardware encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Gpr {
    /// Full 4-bit hardware encoding.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Low three encoding bits (the ModRM/SIB field value).
    #[inline]
    pub const fn low(self) -> u8 {
        self as u8 & 0x7
    }

    /// Whether the register needs a REX extension bit.
    #[inline]
    pub const fn is_ext(self) -> bool {
        self as u8 >= 8
    }
}

/// SSE registers. The templates only use the volatile low pair, but the
/// encoder accepts the full file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Xmm {
    Xmm0 = 0,
    Xmm1 = 1,
    Xmm2 = 2,
    Xmm3 = 3,
    Xmm4 = 4,
    Xmm5 = 5,
    Xmm6 = 6,
    Xmm7 = 7,
}

impl Xmm {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn low(self) -> u8 {
        self as u8 & 0x7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpr_encodings() {
        assert_eq!(Gpr::Rax.code(), 0);
        assert_eq!(Gpr::Rsp.code(), 4);
        assert_eq!(Gpr::R8.code(), 8);
        assert_eq!(Gpr::R15.code(), 15);
        assert_eq!(Gpr::R13.low(), 5);
        assert!(Gpr::R12.is_ext());
        assert!(!Gpr::Rdi.is_ext());
    }
}
