//! Decoded instruction records

use crate::opcode::Opcode;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Typed operand payload of one instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operands {
    None,
    /// `bipush` immediate
    Byte(i8),
    /// `sipush` immediate
    Short(i16),
    /// Local-variable slot (compact forms and `wide` are normalized here)
    Local(u16),
    /// Constant-pool index (`ldc` family, field/method refs, type refs)
    Pool(u16),
    /// Signed branch offset relative to the branch opcode's own pc
    Branch(i32),
    /// Local increment: slot plus signed delta
    Iinc { index: u16, delta: i16 },
    /// `newarray` primitive element-type code
    NewArrayType(u8),
    /// `invokeinterface` / `invokedynamic`: pool index plus count byte
    Invoke { pool_index: u16, count: u8 },
    /// `multianewarray`: component type plus dimension count
    MultiANewArray { pool_index: u16, dimensions: u8 },
    TableSwitch {
        default: i32,
        low: i32,
        high: i32,
        offsets: Vec<i32>,
    },
    LookupSwitch {
        default: i32,
        /// `(match_value, jump_offset)` pairs in source order
        pairs: Vec<(i32, i32)>,
    },
}

/// One decoded instruction of a method body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Byte offset from the start of the method's code
    pub pc: u32,
    pub operands: Operands,
    /// Total encoded size in bytes, opcode included
    pub length: u32,
}

impl Instruction {
    /// Absolute target pc of a branch instruction, if this is one
    pub fn branch_target(&self) -> Option<u32> {
        match self.operands {
            Operands::Branch(offset) => Some((self.pc as i64 + offset as i64) as u32),
            _ => None,
        }
    }

    /// All absolute pcs control may transfer to from this instruction,
    /// fall-through excluded. Switches list the default target first.
    pub fn jump_targets(&self) -> SmallVec<[u32; 4]> {
        let base = self.pc as i64;
        match &self.operands {
            Operands::Branch(offset) => SmallVec::from_slice(&[(base + *offset as i64) as u32]),
            Operands::TableSwitch { default, offsets, .. } => {
                let mut targets = SmallVec::new();
                targets.push((base + *default as i64) as u32);
                for offset in offsets {
                    targets.push((base + *offset as i64) as u32);
                }
                targets
            }
            Operands::LookupSwitch { default, pairs } => {
                let mut targets = SmallVec::new();
                targets.push((base + *default as i64) as u32);
                for (_, offset) in pairs {
                    targets.push((base + *offset as i64) as u32);
                }
                targets
            }
            _ => SmallVec::new(),
        }
    }

    /// The pc of the instruction that follows this one
    pub fn next_pc(&self) -> u32 {
        self.pc + self.length
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:5}: {}", self.pc, self.opcode.mnemonic())?;
        match &self.operands {
            Operands::None => Ok(()),
            Operands::Byte(v) => write!(f, " {}", v),
            Operands::Short(v) => write!(f, " {}", v),
            Operands::Local(slot) => write!(f, " {}", slot),
            Operands::Pool(index) => write!(f, " #{}", index),
            Operands::Branch(offset) => {
                write!(f, " {} (-> {})", offset, (self.pc as i64 + *offset as i64))
            }
            Operands::Iinc { index, delta } => write!(f, " {} by {}", index, delta),
            Operands::NewArrayType(code) => write!(f, " type {}", code),
            Operands::Invoke { pool_index, count } => write!(f, " #{} count {}", pool_index, count),
            Operands::MultiANewArray { pool_index, dimensions } => {
                write!(f, " #{} dims {}", pool_index, dimensions)
            }
            Operands::TableSwitch { low, high, .. } => write!(f, " [{}..{}]", low, high),
            Operands::LookupSwitch { pairs, .. } => write!(f, " ({} pairs)", pairs.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_target_is_relative_to_own_pc() {
        let inst = Instruction {
            opcode: Opcode::Goto,
            pc: 10,
            operands: Operands::Branch(-4),
            length: 3,
        };
        assert_eq!(inst.branch_target(), Some(6));
        assert_eq!(inst.next_pc(), 13);
    }

    #[test]
    fn test_switch_targets_include_default_first() {
        let inst = Instruction {
            opcode: Opcode::TableSwitch,
            pc: 0,
            operands: Operands::TableSwitch {
                default: 20,
                low: 0,
                high: 1,
                offsets: vec![8, 12],
            },
            length: 28,
        };
        let targets = inst.jump_targets();
        assert_eq!(targets.as_slice(), &[20, 8, 12]);
    }

    #[test]
    fn test_display() {
        let inst = Instruction {
            opcode: Opcode::Bipush,
            pc: 3,
            operands: Operands::Byte(-7),
            length: 2,
        };
        assert_eq!(inst.to_string(), "    3: bipush -7");
    }
}
