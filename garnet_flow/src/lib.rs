//! Control-flow analysis for the Garnet decompiler
//!
//! Splits an instruction stream into basic blocks, wires the graph edges,
//! computes dominators by iterative dataflow, discovers natural loops, and
//! identifies the structured regions (`if`, `while`, `switch`, `try`) that
//! the emitter turns back into source constructs.

pub mod block;
pub mod cfg;
pub mod dominators;
pub mod structure;

pub use block::*;
pub use cfg::*;
pub use dominators::*;
pub use structure::*;
