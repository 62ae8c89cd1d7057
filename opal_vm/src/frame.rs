//! Interpreter call frames.

/// One in-flight bytecode invocation.
///
/// The frame's locals are the operand-stack slots `[bp, bp+nlocals)`;
/// parameters occupy the prefix and the rest are zeroed on entry.
/// Values the function pushes live above `bp + nlocals`.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub func_id: u32,
    /// Where to resume in the caller; `None` for the entry invocation,
    /// whose RET leaves the run loop.
    pub ret_ip: Option<usize>,
    /// Base index into the operand stack.
    pub bp: usize,
    pub nlocals: u32,
}
