//! Class-file container decoding for the Garnet decompiler
//!
//! This crate turns raw class-file bytes into typed records:
//! - A bounds-checked big-endian cursor (`ClassReader`)
//! - The tagged constant pool with cross-reference validation
//! - Class, field, and method records with access flags
//! - The two-stage attribute parser (generic envelope, then typed refinement)
//! - Field and method descriptor parsing

pub mod attributes;
pub mod class;
pub mod constant_pool;
pub mod descriptor;
pub mod reader;

pub use attributes::*;
pub use class::*;
pub use constant_pool::*;
pub use descriptor::*;
pub use reader::*;
