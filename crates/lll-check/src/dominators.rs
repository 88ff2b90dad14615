//! Dominator analysis.
//!
//! Builds the control-flow graph for one function from its blocks'
//! terminator targets and hands it to `petgraph`'s dominator computation.
//! The dominance frontier is then derived from the immediate-dominator tree
//! by the standard Cooper/Harvey/Kennedy definition.

use std::collections::{HashMap, HashSet};

use petgraph::graphmap::DiGraphMap;

use lll_core::{CoreResult, NodeId, Program};

pub struct DominatorInfo {
    entry: NodeId,
    /// Immediate dominator of every reachable block except the entry.
    idom: HashMap<NodeId, NodeId>,
    frontier: HashMap<NodeId, HashSet<NodeId>>,
}

impl DominatorInfo {
    pub fn compute(program: &Program, function: NodeId) -> CoreResult<Self> {
        let func = program.node(function)?.as_function().expect("function node");
        let entry = func.entry.expect("function has an entry block");

        let mut graph: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for &block_id in &func.blocks {
            graph.add_node(block_id);
        }
        for &block_id in &func.blocks {
            let block = program.node(block_id)?.as_block().expect("block node");
            if let Some(term_id) = block.terminator() {
                let term = program.node(term_id)?.as_instruction().expect("terminator");
                for target in term.op.targets() {
                    graph.add_edge(block_id, target, ());
                }
            }
        }

        let dominators = petgraph::algo::dominators::simple_fast(&graph, entry);
        // `idom(entry) = entry` by convention, so walking the tree upward
        // always terminates instead of requiring a special case at the root.
        let mut idom = HashMap::new();
        idom.insert(entry, entry);
        for &block_id in &func.blocks {
            if block_id == entry {
                continue;
            }
            if let Some(parent) = dominators.immediate_dominator(block_id) {
                idom.insert(block_id, parent);
            }
        }

        let mut predecessors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (from, to, _) in graph.all_edges() {
            predecessors.entry(to).or_default().push(from);
        }

        // Cooper/Harvey/Kennedy dominance frontier: for each block `b` with
        // at least two predecessors, walk each predecessor `p` up the
        // dominator tree until reaching `idom(b)`, adding `b` to each
        // visited block's frontier.
        let mut frontier: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for &block_id in &func.blocks {
            frontier.entry(block_id).or_default();
        }
        for &block_id in &func.blocks {
            let preds = match predecessors.get(&block_id) {
                Some(p) if p.len() >= 2 => p,
                _ => continue,
            };
            let block_idom = idom.get(&block_id).copied();
            for &pred in preds {
                let mut runner = pred;
                loop {
                    if Some(runner) == block_idom {
                        break;
                    }
                    frontier.entry(runner).or_default().insert(block_id);
                    match idom.get(&runner) {
                        Some(&next) => runner = next,
                        None => break,
                    }
                }
            }
        }

        Ok(DominatorInfo {
            entry,
            idom,
            frontier,
        })
    }

    pub fn idom(&self, block: NodeId) -> Option<NodeId> {
        self.idom.get(&block).copied()
    }

    pub fn frontier(&self, block: NodeId) -> HashSet<NodeId> {
        self.frontier.get(&block).cloned().unwrap_or_default()
    }

    /// Iterated dominance frontier of a block set, used by mem2reg.
    pub fn iterated_frontier(&self, blocks: &HashSet<NodeId>) -> HashSet<NodeId> {
        let mut result = HashSet::new();
        let mut worklist: Vec<NodeId> = blocks.iter().copied().collect();
        while let Some(b) = worklist.pop() {
            for f in self.frontier(b) {
                if result.insert(f) {
                    worklist.push(f);
                }
            }
        }
        result
    }

    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        self.dominates(a, b)
    }

    /// `a` dominates `b` iff `a` appears on `b`'s walk up the immediate
    /// dominator tree to the entry (inclusive of both ends). Unreachable
    /// blocks (absent from the idom map) are dominated only by themselves.
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let mut runner = b;
        loop {
            let parent = match self.idom(runner) {
                Some(p) => p,
                None => return false,
            };
            if parent == runner {
                // Reached the entry's self-loop without finding `a`.
                return false;
            }
            if parent == a {
                return true;
            }
            runner = parent;
        }
    }

    pub fn common_dominator(&self, a: NodeId, b: NodeId) -> NodeId {
        let mut chain_a = HashSet::new();
        let mut runner = a;
        chain_a.insert(runner);
        while let Some(parent) = self.idom(runner) {
            if parent == runner {
                break;
            }
            chain_a.insert(parent);
            runner = parent;
        }
        let mut runner = b;
        if chain_a.contains(&runner) {
            return runner;
        }
        loop {
            match self.idom(runner) {
                Some(parent) if parent != runner => {
                    if chain_a.contains(&parent) {
                        return parent;
                    }
                    runner = parent;
                }
                _ => return self.entry,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lll_core::{Op, TypeId};

    /// if/else diamond: entry -> (then, else) -> join
    fn diamond() -> (Program, NodeId) {
        let mut program = Program::new();
        let func = program.declare_function("main", vec![], TypeId::VOID);
        let entry = program.add_block(func, None).unwrap();
        let then_b = program.add_block(func, None).unwrap();
        let else_b = program.add_block(func, None).unwrap();
        let join = program.add_block(func, None).unwrap();

        let cond = program.const_bool(true);
        program
            .add_instruction(
                entry,
                Op::Branch {
                    cond,
                    if_true: then_b,
                    if_false: else_b,
                },
                TypeId::VOID,
            )
            .unwrap();
        program
            .add_instruction(then_b, Op::Jump { target: join }, TypeId::VOID)
            .unwrap();
        program
            .add_instruction(else_b, Op::Jump { target: join }, TypeId::VOID)
            .unwrap();
        program
            .add_instruction(join, Op::Exit, TypeId::VOID)
            .unwrap();
        (program, func)
    }

    #[test]
    fn entry_dominates_everything() {
        let (program, func) = diamond();
        let info = DominatorInfo::compute(&program, func).unwrap();
        let entry = program.node(func).unwrap().as_function().unwrap().entry.unwrap();
        for &b in &program.node(func).unwrap().as_function().unwrap().blocks {
            assert!(info.dominates(entry, b));
        }
    }

    #[test]
    fn join_block_frontier_is_empty_and_idom_is_entry() {
        let (program, func) = diamond();
        let info = DominatorInfo::compute(&program, func).unwrap();
        let blocks = &program.node(func).unwrap().as_function().unwrap().blocks;
        let (entry, then_b, _else_b, join) = (blocks[0], blocks[1], blocks[2], blocks[3]);
        assert_eq!(info.idom(join), Some(entry));
        assert!(info.frontier(then_b).contains(&join));
    }

    #[test]
    fn then_does_not_dominate_join() {
        let (program, func) = diamond();
        let info = DominatorInfo::compute(&program, func).unwrap();
        let blocks = &program.node(func).unwrap().as_function().unwrap().blocks;
        let (then_b, join) = (blocks[1], blocks[3]);
        assert!(!info.dominates(then_b, join));
    }
}
