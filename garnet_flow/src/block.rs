//! Basic block records

use garnet_bytecode::Instruction;
use smallvec::SmallVec;

pub type BlockId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The unique block starting at pc 0
    Entry,
    Normal,
    /// Terminated by a return or throw
    Exit,
    /// Entry point of an exception handler
    Handler,
}

/// A maximal single-entry single-exit run of instructions
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    /// pc of the first instruction
    pub start_pc: u32,
    /// pc of the last instruction (inclusive)
    pub end_pc: u32,
    pub instructions: Vec<Instruction>,
    pub predecessors: SmallVec<[BlockId; 4]>,
    pub successors: SmallVec<[BlockId; 4]>,
    /// Handler blocks whose protected range covers this block
    pub handlers: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// The terminator if the block ends in one; a block may also simply
    /// fall through to its successor
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.opcode.ends_block())
    }

    pub fn is_exit(&self) -> bool {
        self.last_instruction()
            .map(|i| i.opcode.is_return() || i.opcode.is_throw())
            .unwrap_or(false)
    }
}

/// One exception-handler range, with its catch type already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRange {
    pub start_pc: u32,
    /// Exclusive end of the protected range
    pub end_pc: u32,
    pub handler_pc: u32,
    /// `None` for catch-all entries (`finally`)
    pub catch_type: Option<String>,
}

impl HandlerRange {
    pub fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}
