//! Error types and result definitions for Opal.
//!
//! One enum covers every phase: lexing/parsing, name resolution during
//! lowering, and runtime failures in the interpreter, intrinsics, and
//! JIT. All errors are fatal to the current program run; the driver
//! prints them as `Error: <msg>` and exits.

use crate::span::Span;
use thiserror::Error;

/// The unified result type used throughout Opal.
pub type OpalResult<T> = Result<T, OpalError>;

/// Every error condition the pipeline or the VM can raise.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpalError {
    /// Malformed source text (lexer or parser).
    #[error("syntax error: {message} at {span}")]
    Syntax {
        /// Error description.
        message: String,
        /// Source location.
        span: Span,
    },

    /// Name/arity problems found while lowering the AST.
    #[error("{message}")]
    Resolution {
        /// Error description.
        message: String,
    },

    /// Division or modulo by zero.
    #[error("{opcode}: division by zero")]
    DivisionByZero {
        /// Mnemonic of the failing instruction.
        opcode: &'static str,
    },

    /// Array misuse: negative size, bad index, or a word that is not a
    /// valid handle.
    #[error("{message}")]
    Memory {
        /// Error description.
        message: String,
    },

    /// Operand-stack underflow or a RET with no frame. These indicate a
    /// bug in the front-end or the JIT, never a user error.
    #[error("{message}")]
    Stack {
        /// Error description.
        message: String,
    },

    /// Broken internal invariant (uncompiled callee reached at runtime,
    /// JIT finalization failure).
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl OpalError {
    /// Create a syntax error with location.
    #[must_use]
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    /// Create a resolution error.
    #[must_use]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Create a division-by-zero error for the given instruction.
    #[must_use]
    pub fn division_by_zero(opcode: &'static str) -> Self {
        Self::DivisionByZero { opcode }
    }

    /// Create a memory error.
    #[must_use]
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create a stack-invariant error.
    #[must_use]
    pub fn stack(message: impl Into<String>) -> Self {
        Self::Stack {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = OpalError::syntax("unexpected token", Span::new(2, 7));
        assert_eq!(e.to_string(), "syntax error: unexpected token at line 2, col 7");

        let e = OpalError::division_by_zero("IDIV");
        assert_eq!(e.to_string(), "IDIV: division by zero");

        let e = OpalError::internal("boom");
        assert_eq!(e.to_string(), "internal error: boom");
    }
}
