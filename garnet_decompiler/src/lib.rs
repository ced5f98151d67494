//! The Garnet decompilation pipeline
//!
//! `Decompiler` drives one class through the full pipeline: container
//! decode, bytecode parsing, CFG construction, type inference, abstract
//! interpretation of the operand stack back into expressions, structuring,
//! optimization, and emission. The `ExpressionRebuilder` here is the heart
//! of the system.

pub mod decompiler;
pub mod rebuilder;

pub use decompiler::*;
pub use rebuilder::*;
