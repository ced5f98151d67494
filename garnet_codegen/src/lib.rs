//! AST optimization and source emission for the Garnet decompiler
//!
//! The optimizer runs a bounded multi-pass rewrite (constant folding,
//! algebraic identities, cast cleanup, dead-code elimination) and the
//! emitter pretty-prints the tree as Java-like source, pseudocode, or a
//! JSON dump of the AST.

pub mod emitter;
pub mod optimizer;

pub use emitter::*;
pub use optimizer::*;
