//! Dominator computation and natural-loop discovery
//!
//! Iterative dataflow over reverse post-order, run to a fixed point.
//! Handler blocks are not reachable along normal edges; they are grafted
//! under the entry block so every block has a defined dominator.

use crate::block::BlockId;
use crate::cfg::Cfg;
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct Dominators {
    /// Immediate dominator of each block; the entry maps to itself
    idom: HashMap<BlockId, BlockId>,
    /// Reverse post-order over the forward graph, entry first
    rpo: Vec<BlockId>,
}

impl Dominators {
    pub fn compute(cfg: &Cfg) -> Self {
        let rpo = reverse_post_order(cfg);
        let rpo_index: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(cfg.entry, cfg.entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let preds = &cfg.block(block).predecessors;
                let mut new_idom: Option<BlockId> = None;
                for &pred in preds {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_index, pred, current),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        // Blocks unreachable along normal edges (handler regions) hang off
        // the entry so dominance queries stay total.
        let mut dominators = Self { idom, rpo };
        for &block in cfg.order() {
            if !dominators.idom.contains_key(&block) {
                dominators.idom.insert(block, cfg.entry);
                dominators.rpo.push(block);
            }
        }
        dominators
    }

    /// Immediate dominator; `None` for the entry block
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        let idom = *self.idom.get(&block)?;
        if idom == block {
            None
        } else {
            Some(idom)
        }
    }

    /// Whether `a` dominates `b` (reflexive)
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    /// Edges `latch -> header` where the header dominates the latch; each
    /// marks a natural loop
    pub fn back_edges(&self, cfg: &Cfg) -> Vec<(BlockId, BlockId)> {
        let mut edges = Vec::new();
        for &block in &self.rpo {
            for &succ in &cfg.block(block).successors {
                if self.dominates(succ, block) {
                    edges.push((block, succ));
                }
            }
        }
        edges
    }

    /// The body of the natural loop of `latch -> header`: all blocks that
    /// reach the latch in the reverse graph without crossing the header,
    /// plus the header itself
    pub fn natural_loop(&self, cfg: &Cfg, header: BlockId, latch: BlockId) -> HashSet<BlockId> {
        let mut body: HashSet<BlockId> = HashSet::new();
        body.insert(header);
        if latch == header {
            return body;
        }
        let mut worklist = vec![latch];
        body.insert(latch);
        while let Some(block) = worklist.pop() {
            for &pred in &cfg.block(block).predecessors {
                if body.insert(pred) {
                    worklist.push(pred);
                }
            }
        }
        body
    }
}

fn reverse_post_order(cfg: &Cfg) -> Vec<BlockId> {
    let mut visited: HashSet<BlockId> = HashSet::new();
    let mut postorder = Vec::new();
    // Iterative DFS with an explicit edge cursor to avoid recursion depth
    // limits on long methods
    let mut stack: Vec<(BlockId, usize)> = vec![(cfg.entry, 0)];
    visited.insert(cfg.entry);
    while let Some(&mut (block, ref mut cursor)) = stack.last_mut() {
        let successors = &cfg.block(block).successors;
        if *cursor < successors.len() {
            let next = successors[*cursor];
            *cursor += 1;
            if visited.insert(next) {
                stack.push((next, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }
    postorder.reverse();
    postorder
}

fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_index.get(&a) > rpo_index.get(&b) {
            a = idom[&a];
        }
        while rpo_index.get(&b) > rpo_index.get(&a) {
            b = idom[&b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::CfgBuilder;
    use garnet_bytecode::BytecodeParser;

    fn build(code: &[u8]) -> Cfg {
        let instructions = BytecodeParser::new(code).parse().unwrap();
        CfgBuilder::build(&instructions, &[]).unwrap()
    }

    #[test]
    fn test_diamond_dominance() {
        // diamond: entry branches to two return blocks
        let code = [0x1a, 0x99, 0x00, 0x05, 0x05, 0xac, 0x04, 0xac];
        let cfg = build(&code);
        let dom = Dominators::compute(&cfg);

        let b1 = cfg.block_at(4).unwrap();
        let b2 = cfg.block_at(6).unwrap();
        assert!(dom.dominates(cfg.entry, b1));
        assert!(dom.dominates(cfg.entry, b2));
        assert!(!dom.dominates(b1, b2));
        assert_eq!(dom.idom(b1), Some(cfg.entry));
        assert_eq!(dom.idom(b2), Some(cfg.entry));
        assert_eq!(dom.idom(cfg.entry), None);
    }

    #[test]
    fn test_back_edge_detection() {
        // header at pc 1, the latch goto jumps back to it
        let code = [0x1a, 0x99, 0x00, 0x09, 0x84, 0x00, 0xff, 0xa7, 0xff, 0xfa, 0xb1];
        let cfg = build(&code);
        let dom = Dominators::compute(&cfg);

        let header = cfg.block_at(1).unwrap();
        let latch = cfg.block_at(4).unwrap();
        let back_edges = dom.back_edges(&cfg);
        assert_eq!(back_edges, vec![(latch, header)]);
    }

    #[test]
    fn test_natural_loop_body() {
        let code = [0x1a, 0x99, 0x00, 0x09, 0x84, 0x00, 0xff, 0xa7, 0xff, 0xfa, 0xb1];
        let cfg = build(&code);
        let dom = Dominators::compute(&cfg);

        let header = cfg.block_at(1).unwrap();
        let latch = cfg.block_at(4).unwrap();
        let body = dom.natural_loop(&cfg, header, latch);
        assert_eq!(body.len(), 2);
        assert!(body.contains(&header));
        assert!(body.contains(&latch));
        // The exit block after the loop is not part of the body
        let exit = cfg.block_at(10).unwrap();
        assert!(!body.contains(&exit));
    }

    #[test]
    fn test_self_loop() {
        // pc 0: nop / pc 1: goto -0? A block jumping to itself:
        // pc 0: iload_0 / pc 1: ifne -1 (-> 0) / pc 4: return
        let code = [0x1a, 0x9a, 0xff, 0xff, 0xb1];
        let cfg = build(&code);
        let dom = Dominators::compute(&cfg);
        let back_edges = dom.back_edges(&cfg);
        assert_eq!(back_edges.len(), 1);
        let (latch, header) = back_edges[0];
        assert_eq!(latch, header);
        assert_eq!(dom.natural_loop(&cfg, header, latch).len(), 1);
    }
}
