//! Bytecode decoding for the Garnet decompiler
//!
//! Maps the raw `code[]` bytes of a method onto a linear instruction stream:
//! the full opcode table with fixed operand widths, typed operand payloads,
//! and the three variable-length decodings (`tableswitch`, `lookupswitch`,
//! and the `wide` prefix).

pub mod instruction;
pub mod opcode;
pub mod parser;
pub mod stack;

pub use instruction::*;
pub use opcode::*;
pub use parser::*;
pub use stack::{apply_shuffle, is_shuffle};
