//! Code buffer and program tables.
//!
//! `CodeBuf` is an append-only byte vector with a four-byte patch
//! primitive: forward jumps emit a placeholder, record the operand
//! position, and patch it once the target offset is known.

use super::instruction::Opcode;
use rustc_hash::FxHashMap;

/// Append-only bytecode buffer with little-endian operand encoding.
#[derive(Debug, Clone, Default)]
pub struct CodeBuf {
    bytes: Vec<u8>,
}

impl CodeBuf {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current emission offset.
    #[inline]
    pub fn pc(&self) -> usize {
        self.bytes.len()
    }

    /// Total buffer length.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been emitted yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw byte view, for the interpreter and the JIT decoder.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append an opcode byte.
    #[inline]
    pub fn emit_op(&mut self, op: Opcode) {
        self.bytes.push(op as u8);
    }

    /// Append a 64-bit immediate.
    #[inline]
    pub fn emit_i64(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a 32-bit immediate.
    #[inline]
    pub fn emit_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Overwrite four bytes at a previously recorded position.
    pub fn patch_u32(&mut self, at: usize, v: u32) {
        self.bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Read a 64-bit immediate at `at`.
    #[inline]
    pub fn read_i64(&self, at: usize) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[at..at + 8]);
        i64::from_le_bytes(buf)
    }

    /// Read a 32-bit immediate at `at`.
    #[inline]
    pub fn read_u32(&self, at: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[at..at + 4]);
        u32::from_le_bytes(buf)
    }

    /// Read the opcode byte at `at`, if it decodes.
    #[inline]
    pub fn opcode_at(&self, at: usize) -> Option<Opcode> {
        self.bytes.get(at).copied().and_then(Opcode::from_u8)
    }
}

/// One function's metadata in the program table.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub id: u32,
    pub arity: u32,
    /// Locals count, including parameters (`nlocals >= arity`).
    pub nlocals: u32,
    /// First byte of the function's code.
    pub entry: usize,
    /// One past the last byte of the function's code.
    pub end: usize,
    /// Upper bound on operand-stack height, plus headroom. Zero until
    /// the analyser has run.
    pub max_stack: u32,
}

/// A complete compiled program: code plus the function table. Immutable
/// once the front-end hands it to the VM.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub code: CodeBuf,
    pub funcs: Vec<Function>,
    name2id: FxHashMap<String, u32>,
}

impl Program {
    /// Create an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function and return its id. Names must be unique.
    pub fn add_func(&mut self, name: &str, arity: u32) -> u32 {
        let id = self.funcs.len() as u32;
        self.funcs.push(Function {
            name: name.to_string(),
            id,
            arity,
            nlocals: arity,
            entry: 0,
            end: 0,
            max_stack: 0,
        });
        self.name2id.insert(name.to_string(), id);
        id
    }

    /// Look up a function id by name.
    #[inline]
    pub fn func_id(&self, name: &str) -> Option<u32> {
        self.name2id.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_codec_round_trip() {
        let mut code = CodeBuf::new();
        for v in [0i64, 1, -1, i64::MIN, i64::MAX, 0x0102_0304_0506_0708] {
            let at = code.pc();
            code.emit_i64(v);
            assert_eq!(code.read_i64(at), v);
        }
        for v in [0u32, 1, u32::MAX, 0xDEAD_BEEF] {
            let at = code.pc();
            code.emit_u32(v);
            assert_eq!(code.read_u32(at), v);
        }
    }

    #[test]
    fn test_forward_jump_patch() {
        let mut code = CodeBuf::new();
        code.emit_op(Opcode::Jmp);
        let at = code.pc();
        code.emit_u32(0);
        code.emit_op(Opcode::Nop);
        let target = code.pc();
        code.patch_u32(at, target as u32);

        assert_eq!(code.opcode_at(0), Some(Opcode::Jmp));
        assert_eq!(code.read_u32(at) as usize, target);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut code = CodeBuf::new();
        code.emit_u32(0x0102_0304);
        assert_eq!(code.bytes(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_program_function_table() {
        let mut prog = Program::new();
        let a = prog.add_func("a", 2);
        let b = prog.add_func("b", 0);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(prog.func_id("a"), Some(0));
        assert_eq!(prog.func_id("b"), Some(1));
        assert_eq!(prog.func_id("missing"), None);
        assert_eq!(prog.funcs[0].nlocals, 2);
    }
}
