//! Type inference for the Garnet decompiler
//!
//! A finite lattice of stack-machine types and a dataflow engine that
//! propagates them across the CFG to a fixed point, so expression and local
//! types are known when the emitter runs.

pub mod inference;
pub mod types;

pub use inference::*;
pub use types::*;
