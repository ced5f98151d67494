//! Structured-region identification
//!
//! Walks the CFG in pc order under dominator guidance and produces a region
//! tree: `if`/`if-else`, `while`/`do-while`, `switch`, and `try`/`catch`
//! regions, with residual jumps left in place for anything irreducible.
//! The analyzer never fails; unmatched control flow degrades to `Jump`
//! entries that the emitter renders as labeled gotos.

use crate::block::{BlockId, HandlerRange};
use crate::cfg::Cfg;
use crate::dominators::Dominators;
use garnet_bytecode::Operands;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// Condition tested at the header
    While,
    /// Condition tested at the latch
    DoWhile,
    /// No conditional exit found
    Endless,
}

/// One arm of a structured switch
#[derive(Debug, Clone)]
pub struct SwitchArm {
    /// Selector values steering into this arm; empty for the default arm
    pub values: Vec<i32>,
    pub body: Vec<ControlStructure>,
    pub falls_through: bool,
}

/// One catch arm of a structured try
#[derive(Debug, Clone)]
pub struct HandlerArm {
    pub handler: BlockId,
    pub catch_type: Option<String>,
    pub body: Vec<ControlStructure>,
}

/// A node of the region tree
#[derive(Debug, Clone)]
pub enum ControlStructure {
    /// Straight-line statements of one block
    Basic { block: BlockId },
    /// Conditional region. When `negate` is set the source condition is the
    /// negation of the branch condition (the then-arm is the fall-through).
    If {
        header: BlockId,
        negate: bool,
        then_body: Vec<ControlStructure>,
        else_body: Vec<ControlStructure>,
    },
    Loop {
        kind: LoopKind,
        header: BlockId,
        latch: BlockId,
        body: Vec<ControlStructure>,
    },
    Switch {
        header: BlockId,
        arms: Vec<SwitchArm>,
    },
    Try {
        body: Vec<ControlStructure>,
        handlers: Vec<HandlerArm>,
    },
    /// Residual unconditional transfer; rendered as a labeled goto
    Jump { target_pc: u32 },
}

/// Identifies structured regions over a CFG
pub struct StructureAnalyzer<'a> {
    cfg: &'a Cfg,
    dominators: &'a Dominators,
    /// index in pc order, by block id
    index_of: HashMap<BlockId, usize>,
    /// headers of loops currently being structured
    active_loops: HashSet<BlockId>,
    /// latch blocks of loops currently being structured; their conditional
    /// back-branch is the loop condition, not an if
    active_latches: HashSet<BlockId>,
    /// try ranges already consumed, keyed by (start_pc, end_pc)
    consumed_tries: HashSet<(u32, u32)>,
    /// handler-arm blocks already placed inside a try region
    consumed_blocks: HashSet<BlockId>,
    structures: usize,
}

impl<'a> StructureAnalyzer<'a> {
    pub fn new(cfg: &'a Cfg, dominators: &'a Dominators) -> Self {
        let index_of = cfg
            .order()
            .iter()
            .enumerate()
            .map(|(i, &b)| (b, i))
            .collect();
        Self {
            cfg,
            dominators,
            index_of,
            active_loops: HashSet::new(),
            active_latches: HashSet::new(),
            consumed_tries: HashSet::new(),
            consumed_blocks: HashSet::new(),
            structures: 0,
        }
    }

    /// Number of structured regions recognized so far
    pub fn structures_identified(&self) -> usize {
        self.structures
    }

    /// Structure the whole method
    pub fn analyze(&mut self) -> Vec<ControlStructure> {
        self.analyze_range(0, self.cfg.order().len())
    }

    fn block_at_index(&self, index: usize) -> BlockId {
        self.cfg.order()[index]
    }

    fn index_of_pc(&self, pc: u32) -> Option<usize> {
        let id = self.cfg.block_at(pc)?;
        self.index_of.get(&id).copied()
    }

    fn analyze_range(&mut self, start: usize, end: usize) -> Vec<ControlStructure> {
        let mut out = Vec::new();
        let mut i = start;
        while i < end {
            let block_id = self.block_at_index(i);

            // Handler arms already placed inside a try region
            if self.consumed_blocks.contains(&block_id) {
                i += 1;
                continue;
            }

            if let Some((structure, next)) = self.try_structure(block_id, i, end) {
                out.push(structure);
                i = next;
                continue;
            }
            if let Some((structure, next)) = self.loop_structure(block_id, i, end) {
                out.push(structure);
                i = next;
                continue;
            }

            let block = self.cfg.block(block_id);
            match block.terminator() {
                Some(term) if term.opcode.is_conditional_branch() => {
                    let (structure, next) = self.if_structure(block_id, i, end);
                    out.push(structure);
                    i = next;
                }
                Some(term) if term.opcode.is_switch() => {
                    let (structure, next) = self.switch_structure(block_id, i, end);
                    out.push(structure);
                    i = next;
                }
                Some(term) if term.opcode.is_unconditional_jump() => {
                    out.push(ControlStructure::Basic { block: block_id });
                    if let Some(target) = term.branch_target() {
                        // A jump to the instruction right after this range's
                        // last block is the natural continuation; keep it as
                        // residue only when it goes elsewhere
                        out.push(ControlStructure::Jump { target_pc: target });
                    }
                    i += 1;
                }
                _ => {
                    out.push(ControlStructure::Basic { block: block_id });
                    i += 1;
                }
            }
        }
        out
    }

    /// Recognize a try region starting at this block
    fn try_structure(
        &mut self,
        block_id: BlockId,
        index: usize,
        end: usize,
    ) -> Option<(ControlStructure, usize)> {
        let start_pc = self.cfg.block(block_id).start_pc;
        let ranges: Vec<HandlerRange> = self
            .cfg
            .handler_ranges
            .iter()
            .filter(|h| h.start_pc == start_pc && !self.consumed_tries.contains(&(h.start_pc, h.end_pc)))
            .cloned()
            .collect();
        let first = ranges.first()?.clone();
        self.consumed_tries.insert((first.start_pc, first.end_pc));

        // Arms covering the same protected range (multi-catch / finally)
        let arms: Vec<HandlerRange> = ranges
            .into_iter()
            .filter(|h| h.end_pc == first.end_pc)
            .collect();

        // Protected body: blocks with start_pc in [start_pc, end_pc)
        let mut body_end = index;
        while body_end < end {
            let b = self.cfg.block(self.block_at_index(body_end));
            if b.start_pc >= first.end_pc {
                break;
            }
            body_end += 1;
        }
        let mut body = self.analyze_range(index, body_end);

        // The join is where the protected body jumps past the handlers
        let join_pc = trailing_jump_target(&body);
        if let Some(join) = join_pc {
            strip_trailing_jump(&mut body, join);
        }

        let mut handler_pcs: Vec<u32> = arms.iter().map(|h| h.handler_pc).collect();
        handler_pcs.sort_unstable();

        let mut handlers = Vec::new();
        for arm in &arms {
            let Some(arm_start) = self.index_of_pc(arm.handler_pc) else { continue };
            // An arm extends to the next handler, to the join, or to the
            // end of the enclosing range
            let next_handler_pc = handler_pcs.iter().copied().find(|&pc| pc > arm.handler_pc);
            let mut arm_end = arm_start;
            while arm_end < end {
                let pc = self.cfg.block(self.block_at_index(arm_end)).start_pc;
                if next_handler_pc.is_some_and(|next| pc >= next)
                    || join_pc.is_some_and(|join| pc >= join)
                {
                    break;
                }
                arm_end += 1;
            }
            let handler_id = self.block_at_index(arm_start);
            let arm_end = arm_end.max(arm_start + 1);
            let mut body = self.analyze_range(arm_start, arm_end);
            if let Some(join) = join_pc {
                strip_trailing_jump(&mut body, join);
            }
            // Keep the arm's blocks out of the normal statement flow
            for arm_index in arm_start..arm_end {
                self.consumed_blocks.insert(self.block_at_index(arm_index));
            }
            handlers.push(HandlerArm {
                handler: handler_id,
                catch_type: arm.catch_type.clone(),
                body,
            });
        }

        // Resume right after the protected body; the code between it and
        // the handlers is the normal continuation, and the handler arms are
        // skipped via `consumed_blocks`
        self.structures += 1;
        Some((ControlStructure::Try { body, handlers }, body_end.max(index + 1)))
    }

    /// Recognize a loop headed at this block
    fn loop_structure(
        &mut self,
        block_id: BlockId,
        index: usize,
        end: usize,
    ) -> Option<(ControlStructure, usize)> {
        if self.active_loops.contains(&block_id) {
            return None;
        }
        let back_edges = self.dominators.back_edges(self.cfg);
        let latches: Vec<BlockId> = back_edges
            .iter()
            .filter(|&&(_, header)| header == block_id)
            .map(|&(latch, _)| latch)
            .filter(|latch| self.index_of.get(latch).is_some_and(|&li| li < end))
            .collect();
        if latches.is_empty() {
            return None;
        }

        // The body is the union of the natural loops of every back edge
        let mut body_set: HashSet<BlockId> = HashSet::new();
        let mut last_latch = block_id;
        let mut last_latch_index = index;
        for &latch in &latches {
            body_set.extend(self.dominators.natural_loop(self.cfg, block_id, latch));
            let latch_index = self.index_of[&latch];
            if latch_index >= last_latch_index {
                last_latch_index = latch_index;
                last_latch = latch;
            }
        }
        let body_end = (last_latch_index + 1).min(end);

        let header = self.cfg.block(block_id);
        let header_exits = header
            .terminator()
            .filter(|t| t.opcode.is_conditional_branch())
            .map(|t| {
                t.branch_target()
                    .and_then(|pc| self.cfg.block_at(pc))
                    .is_some_and(|target| !body_set.contains(&target))
                    || header
                        .successors
                        .iter()
                        .any(|succ| !body_set.contains(succ))
            })
            .unwrap_or(false);
        let latch_block = self.cfg.block(last_latch);
        let latch_conditional = latch_block
            .terminator()
            .is_some_and(|t| t.opcode.is_conditional_branch());

        // A single-block loop runs its statements before the test, so it is
        // a do-while even though the header carries the condition
        let kind = if last_latch == block_id && latch_conditional {
            LoopKind::DoWhile
        } else if header_exits {
            LoopKind::While
        } else if latch_conditional {
            LoopKind::DoWhile
        } else {
            LoopKind::Endless
        };

        self.active_loops.insert(block_id);
        if kind == LoopKind::DoWhile {
            self.active_latches.insert(last_latch);
        }
        let mut body = match kind {
            // The header evaluates the condition; its statements stay with
            // the loop header, the body starts at the next block
            LoopKind::While => self.analyze_range(index + 1, body_end),
            // The whole region including the header is the body; the latch
            // carries the condition
            LoopKind::DoWhile | LoopKind::Endless => self.analyze_range(index, body_end),
        };
        self.active_loops.remove(&block_id);
        self.active_latches.remove(&last_latch);
        // The latch's jump back to the header is the loop edge itself
        strip_trailing_jump(&mut body, header.start_pc);

        self.structures += 1;
        Some((
            ControlStructure::Loop { kind, header: block_id, latch: last_latch, body },
            body_end,
        ))
    }

    /// Recognize an if / if-else region headed at this block
    fn if_structure(&mut self, block_id: BlockId, index: usize, end: usize) -> (ControlStructure, usize) {
        let block = self.cfg.block(block_id);
        let Some(term) = block.terminator() else {
            return (ControlStructure::Basic { block: block_id }, index + 1);
        };
        let target_pc = term.branch_target().unwrap_or(0);
        let target_index = self.index_of_pc(target_pc);

        match target_index {
            Some(t_idx) if t_idx > index && t_idx <= end => {
                // Fall-through arm: blocks between the header and the target
                let fall_range = (index + 1, t_idx);

                // Classic else shape: the fall-through arm ends with a
                // forward goto over the branch-target arm
                let fall_last = self.block_at_index(t_idx.saturating_sub(1));
                let join_pc = self
                    .cfg
                    .block(fall_last)
                    .terminator()
                    .filter(|t| t.opcode.is_unconditional_jump())
                    .and_then(|t| t.branch_target())
                    .filter(|&join| join > target_pc);

                if let Some(join) = join_pc {
                    let join_idx = self.index_of_pc(join).unwrap_or(end).min(end);
                    let mut then_body = self.analyze_range(fall_range.0, fall_range.1);
                    strip_trailing_jump(&mut then_body, join);
                    let else_body = self.analyze_range(t_idx, join_idx);
                    self.structures += 1;
                    return (
                        ControlStructure::If {
                            header: block_id,
                            negate: true,
                            then_body,
                            else_body,
                        },
                        join_idx,
                    );
                }

                // Both arms terminate: render branch-taken as the then-arm
                let fall_terminates = fall_range.1 > fall_range.0
                    && self.cfg.block(fall_last).is_exit();
                if fall_terminates {
                    let target_id = self.block_at_index(t_idx);
                    let mut k = t_idx;
                    while k < end {
                        let candidate = self.block_at_index(k);
                        if !self.dominators.dominates(target_id, candidate) {
                            break;
                        }
                        k += 1;
                    }
                    if k > t_idx {
                        let else_body = self.analyze_range(fall_range.0, fall_range.1);
                        let then_body = self.analyze_range(t_idx, k);
                        self.structures += 1;
                        return (
                            ControlStructure::If {
                                header: block_id,
                                negate: false,
                                then_body,
                                else_body,
                            },
                            k,
                        );
                    }
                }

                // Plain if-then: the branch skips over the fall-through arm
                let then_body = self.analyze_range(fall_range.0, fall_range.1);
                self.structures += 1;
                (
                    ControlStructure::If {
                        header: block_id,
                        negate: true,
                        then_body,
                        else_body: Vec::new(),
                    },
                    t_idx,
                )
            }
            _ => {
                // A do-while latch's back-branch is the loop condition; it
                // is consumed by the enclosing loop structure
                if self.active_latches.contains(&block_id) {
                    return (ControlStructure::Basic { block: block_id }, index + 1);
                }
                // Other backward or out-of-range branches degrade to a
                // guarded residual jump
                self.structures += 1;
                (
                    ControlStructure::If {
                        header: block_id,
                        negate: false,
                        then_body: vec![ControlStructure::Jump { target_pc }],
                        else_body: Vec::new(),
                    },
                    index + 1,
                )
            }
        }
    }

    /// Recognize a switch region headed at this block
    fn switch_structure(
        &mut self,
        block_id: BlockId,
        index: usize,
        end: usize,
    ) -> (ControlStructure, usize) {
        let block = self.cfg.block(block_id);
        let Some(term) = block.terminator() else {
            return (ControlStructure::Basic { block: block_id }, index + 1);
        };
        let base = term.pc as i64;

        // (selector values, absolute target) in source order
        let mut cases: Vec<(Vec<i32>, u32)> = Vec::new();
        let default_pc;
        match &term.operands {
            Operands::TableSwitch { default, low, offsets, .. } => {
                default_pc = (base + *default as i64) as u32;
                for (k, offset) in offsets.iter().enumerate() {
                    let value = low + k as i32;
                    let target = (base + *offset as i64) as u32;
                    push_case(&mut cases, value, target);
                }
            }
            Operands::LookupSwitch { default, pairs } => {
                default_pc = (base + *default as i64) as u32;
                for (value, offset) in pairs {
                    let target = (base + *offset as i64) as u32;
                    push_case(&mut cases, *value, target);
                }
            }
            _ => {
                return (ControlStructure::Basic { block: block_id }, index + 1);
            }
        }

        // Arm boundaries in pc order; the default participates like an arm
        let mut boundaries: Vec<u32> = cases.iter().map(|(_, pc)| *pc).collect();
        boundaries.push(default_pc);
        boundaries.sort_unstable();
        boundaries.dedup();

        // The switch ends at the largest break target found in any arm, or
        // after the last arm's range otherwise
        let last_boundary_idx = boundaries
            .last()
            .and_then(|&pc| self.index_of_pc(pc))
            .unwrap_or(index + 1);
        let mut switch_end = last_boundary_idx;
        while switch_end < end {
            let b = self.cfg.block(self.block_at_index(switch_end));
            let leaves = b.terminator().is_some_and(|t| {
                t.opcode.is_return() || t.opcode.is_throw() || t.opcode.is_unconditional_jump()
            });
            switch_end += 1;
            if leaves {
                break;
            }
        }

        let arm_range = |analyzer: &mut Self, from_pc: u32| -> Vec<ControlStructure> {
            let Some(from) = analyzer.index_of_pc(from_pc) else { return Vec::new() };
            let next_pc = boundaries.iter().copied().find(|&pc| pc > from_pc);
            let to = next_pc
                .and_then(|pc| analyzer.index_of_pc(pc))
                .unwrap_or(switch_end)
                .min(switch_end);
            analyzer.analyze_range(from, to.max(from))
        };

        let mut arms = Vec::new();
        for (values, target) in &cases {
            let body = arm_range(self, *target);
            let falls_through = !self.region_transfers(&body);
            arms.push(SwitchArm { values: values.clone(), body, falls_through });
        }
        // When every case arm breaks to the default target, the "default"
        // is really the code after the switch, not an arm of it
        let default_shares_case = cases.iter().any(|(_, pc)| *pc == default_pc);
        let default_is_exit = !default_shares_case
            && boundaries.last() == Some(&default_pc)
            && arms
                .iter()
                .any(|arm| trailing_jump_target(&arm.body) == Some(default_pc));
        let mut switch_end = switch_end;
        if default_is_exit {
            if let Some(d) = self.index_of_pc(default_pc) {
                switch_end = d;
            }
            for arm in &mut arms {
                strip_trailing_jump(&mut arm.body, default_pc);
                arm.falls_through = false;
            }
        } else if !default_shares_case
            && self.index_of_pc(default_pc).is_some_and(|d| d < switch_end)
        {
            let body = arm_range(self, default_pc);
            if !body.is_empty() {
                let falls_through = !self.region_transfers(&body);
                arms.push(SwitchArm { values: Vec::new(), body, falls_through });
            }
        }

        self.structures += 1;
        (ControlStructure::Switch { header: block_id, arms }, switch_end.max(index + 1))
    }

    /// Whether a region ends by leaving its enclosing construct (return,
    /// throw, or jump) rather than falling through
    fn region_transfers(&self, body: &[ControlStructure]) -> bool {
        match body.last() {
            Some(ControlStructure::Jump { .. }) => true,
            Some(ControlStructure::Basic { block }) => {
                self.cfg.block(*block).terminator().is_some_and(|t| {
                    t.opcode.is_return() || t.opcode.is_throw() || t.opcode.is_unconditional_jump()
                })
            }
            Some(ControlStructure::If { then_body, else_body, .. }) => {
                !else_body.is_empty()
                    && self.region_transfers(then_body)
                    && self.region_transfers(else_body)
            }
            _ => false,
        }
    }
}

fn push_case(cases: &mut Vec<(Vec<i32>, u32)>, value: i32, target: u32) {
    if let Some((values, _)) = cases.iter_mut().find(|(_, pc)| *pc == target) {
        values.push(value);
    } else {
        cases.push((vec![value], target));
    }
}

/// The target of a trailing residual jump, if the region ends in one
fn trailing_jump_target(body: &[ControlStructure]) -> Option<u32> {
    match body.last()? {
        ControlStructure::Jump { target_pc } => Some(*target_pc),
        _ => None,
    }
}

/// Remove a trailing `Jump` to `join`; it is the structural else-skip
fn strip_trailing_jump(body: &mut Vec<ControlStructure>, join: u32) {
    if matches!(body.last(), Some(ControlStructure::Jump { target_pc }) if *target_pc == join) {
        body.pop();
    }
}
