//! High-level x86-64 assembler with label support.
//!
//! Branches are emitted with a zero rel32 placeholder and recorded as
//! relocations; `finalize` resolves every displacement once all labels
//! are bound.

use super::encoder::{self, Cond, Mem};
use super::registers::{Gpr, Xmm};
use opal_core::{OpalError, OpalResult};

/// A label representing a position in the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// A pending rel32 displacement.
#[derive(Debug, Clone, Copy)]
struct Relocation {
    /// Offset of the four displacement bytes.
    disp_at: u32,
    label: Label,
}

/// The x86-64 assembler.
pub struct Assembler {
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    relocations: Vec<Relocation>,
}

impl Assembler {
    /// Create a new assembler.
    #[must_use]
    pub fn new() -> Self {
        Assembler {
            code: Vec::with_capacity(256),
            labels: Vec::new(),
            relocations: Vec::new(),
        }
    }

    /// Current code offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Create a new unbound label.
    pub fn create_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(None);
        Label(id)
    }

    /// Bind a label to the current position.
    pub fn bind_label(&mut self, label: Label) {
        self.labels[label.id() as usize] = Some(self.offset() as u32);
    }

    /// Resolve all relocations and return the finished code.
    pub fn finalize(mut self) -> OpalResult<Vec<u8>> {
        for reloc in &self.relocations {
            let target = self.labels[reloc.label.id() as usize].ok_or_else(|| {
                OpalError::internal(format!("unbound jit label {}", reloc.label.id()))
            })?;
            let disp_at = reloc.disp_at as usize;
            // rel32 is measured from the end of the displacement field.
            let rel = target as i64 - (disp_at as i64 + 4);
            let rel = i32::try_from(rel)
                .map_err(|_| OpalError::internal("jit branch displacement overflow"))?;
            self.code[disp_at..disp_at + 4].copy_from_slice(&rel.to_le_bytes());
        }
        Ok(self.code)
    }

    // =========================================================================
    // Moves
    // =========================================================================

    pub fn mov_rr(&mut self, dst: Gpr, src: Gpr) {
        encoder::mov_rr(&mut self.code, dst, src);
    }

    pub fn mov_ri64(&mut self, dst: Gpr, imm: i64) {
        encoder::mov_ri64(&mut self.code, dst, imm);
    }

    pub fn mov_ri32(&mut self, dst: Gpr, imm: u32) {
        encoder::mov_ri32(&mut self.code, dst, imm);
    }

    /// Load from `[base + disp]`.
    pub fn load(&mut self, dst: Gpr, base: Gpr, disp: i32) {
        encoder::mov_load(&mut self.code, dst, Mem::base_disp(base, disp));
    }

    /// Store to `[base + disp]`.
    pub fn store(&mut self, base: Gpr, disp: i32, src: Gpr) {
        encoder::mov_store(&mut self.code, Mem::base_disp(base, disp), src);
    }

    /// Load from `[base + index*8]`.
    pub fn load_indexed(&mut self, dst: Gpr, base: Gpr, index: Gpr) {
        encoder::mov_load(&mut self.code, dst, Mem::base_index8(base, index));
    }

    /// Store to `[base + index*8]`.
    pub fn store_indexed(&mut self, base: Gpr, index: Gpr, src: Gpr) {
        encoder::mov_store(&mut self.code, Mem::base_index8(base, index), src);
    }

    /// Store an immediate to `[base + index*8]`.
    pub fn store_indexed_imm(&mut self, base: Gpr, index: Gpr, imm: i32) {
        encoder::mov_store_imm32(&mut self.code, Mem::base_index8(base, index), imm);
    }

    // =========================================================================
    // Integer ALU
    // =========================================================================

    pub fn add_rr(&mut self, dst: Gpr, src: Gpr) {
        encoder::add_rr(&mut self.code, dst, src);
    }

    pub fn sub_rr(&mut self, dst: Gpr, src: Gpr) {
        encoder::sub_rr(&mut self.code, dst, src);
    }

    pub fn imul_rr(&mut self, dst: Gpr, src: Gpr) {
        encoder::imul_rr(&mut self.code, dst, src);
    }

    pub fn cmp_rr(&mut self, lhs: Gpr, rhs: Gpr) {
        encoder::cmp_rr(&mut self.code, lhs, rhs);
    }

    pub fn test_rr(&mut self, lhs: Gpr, rhs: Gpr) {
        encoder::test_rr(&mut self.code, lhs, rhs);
    }

    pub fn xor_rr(&mut self, dst: Gpr, src: Gpr) {
        encoder::xor_rr(&mut self.code, dst, src);
    }

    pub fn add_ri(&mut self, dst: Gpr, imm: i32) {
        encoder::add_ri(&mut self.code, dst, imm);
    }

    pub fn sub_ri(&mut self, dst: Gpr, imm: i32) {
        encoder::sub_ri(&mut self.code, dst, imm);
    }

    pub fn cmp_ri(&mut self, lhs: Gpr, imm: i32) {
        encoder::cmp_ri(&mut self.code, lhs, imm);
    }

    pub fn inc(&mut self, r: Gpr) {
        encoder::inc_r(&mut self.code, r);
    }

    pub fn dec(&mut self, r: Gpr) {
        encoder::dec_r(&mut self.code, r);
    }

    pub fn shl_ri(&mut self, r: Gpr, imm: u8) {
        encoder::shl_ri(&mut self.code, r, imm);
    }

    pub fn cqo(&mut self) {
        encoder::cqo(&mut self.code);
    }

    pub fn idiv(&mut self, r: Gpr) {
        encoder::idiv_r(&mut self.code, r);
    }

    pub fn setcc(&mut self, cond: Cond, dst: Gpr) {
        encoder::setcc(&mut self.code, cond, dst);
    }

    pub fn and_r8(&mut self, dst: Gpr, src: Gpr) {
        encoder::and_r8(&mut self.code, dst, src);
    }

    pub fn or_r8(&mut self, dst: Gpr, src: Gpr) {
        encoder::or_r8(&mut self.code, dst, src);
    }

    pub fn movzx_r64_r8(&mut self, dst: Gpr, src: Gpr) {
        encoder::movzx_r64_r8(&mut self.code, dst, src);
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    pub fn jmp(&mut self, target: Label) {
        let disp_at = encoder::jmp_rel32(&mut self.code) as u32;
        self.relocations.push(Relocation {
            disp_at,
            label: target,
        });
    }

    pub fn jcc(&mut self, cond: Cond, target: Label) {
        let disp_at = encoder::jcc_rel32(&mut self.code, cond) as u32;
        self.relocations.push(Relocation {
            disp_at,
            label: target,
        });
    }

    pub fn call_reg(&mut self, r: Gpr) {
        encoder::call_r(&mut self.code, r);
    }

    pub fn push(&mut self, r: Gpr) {
        encoder::push_r(&mut self.code, r);
    }

    pub fn pop(&mut self, r: Gpr) {
        encoder::pop_r(&mut self.code, r);
    }

    pub fn ret(&mut self) {
        encoder::ret(&mut self.code);
    }

    pub fn nop(&mut self) {
        encoder::nop(&mut self.code);
    }

    // =========================================================================
    // Scalar double
    // =========================================================================

    pub fn movq_x_r(&mut self, dst: Xmm, src: Gpr) {
        encoder::movq_x_r(&mut self.code, dst, src);
    }

    pub fn movq_r_x(&mut self, dst: Gpr, src: Xmm) {
        encoder::movq_r_x(&mut self.code, dst, src);
    }

    pub fn addsd(&mut self, dst: Xmm, src: Xmm) {
        encoder::addsd(&mut self.code, dst, src);
    }

    pub fn subsd(&mut self, dst: Xmm, src: Xmm) {
        encoder::subsd(&mut self.code, dst, src);
    }

    pub fn mulsd(&mut self, dst: Xmm, src: Xmm) {
        encoder::mulsd(&mut self.code, dst, src);
    }

    pub fn divsd(&mut self, dst: Xmm, src: Xmm) {
        encoder::divsd(&mut self.code, dst, src);
    }

    pub fn sqrtsd(&mut self, dst: Xmm, src: Xmm) {
        encoder::sqrtsd(&mut self.code, dst, src);
    }

    pub fn ucomisd(&mut self, lhs: Xmm, rhs: Xmm) {
        encoder::ucomisd(&mut self.code, lhs, rhs);
    }

    pub fn cvtsi2sd(&mut self, dst: Xmm, src: Gpr) {
        encoder::cvtsi2sd(&mut self.code, dst, src);
    }

    pub fn cvttsd2si(&mut self, dst: Gpr, src: Xmm) {
        encoder::cvttsd2si(&mut self.code, dst, src);
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}
