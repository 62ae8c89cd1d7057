//! Heap arrays and their collector.
//!
//! The heap is a flat table of dynamically sized arrays addressed by
//! handle words (see `opal_core::value`). Collection is stop-the-world
//! mark-and-sweep with explicit root enumeration: the interpreter's
//! operand stack plus any number of registered root stacks, each a
//! (base pointer, live-count pointer) pair so native frames can grow
//! and shrink without re-registering.

pub mod collector;
pub mod heap;
pub mod roots;

pub use collector::{collect, CollectStats};
pub use heap::{Array, Heap, DEFAULT_GC_THRESHOLD};
pub use roots::RootStacks;
