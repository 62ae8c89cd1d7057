//! Core types shared by every Opal crate.
//!
//! This crate is dependency-light on purpose: it defines the 64-bit word
//! model (including the array-handle encoding), source spans, and the
//! unified error type. Everything else in the workspace builds on these.

pub mod error;
pub mod span;
pub mod value;

pub use error::{OpalError, OpalResult};
pub use span::Span;
pub use value::{f64_bits, f64_from_bits, handle_to_id, id_to_handle, is_handle};
