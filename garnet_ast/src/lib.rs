//! Reconstructed syntax tree for the Garnet decompiler
//!
//! The tree the expression rebuilder produces and the emitter prints.
//! Children are owned exclusively by their parents; there are no back
//! pointers, so traversal and in-place rewriting need no bookkeeping.

pub mod ast;
pub mod visitor;

pub use ast::*;
pub use visitor::*;
