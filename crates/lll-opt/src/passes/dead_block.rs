//! Dead-block elimination (per-function).

use std::collections::{HashSet, VecDeque};

use lll_check::DominatorInfo;
use lll_core::{NodeId, Op, Program};

use super::{Pass, PassKind};

pub struct DeadBlockElimination;

impl Pass for DeadBlockElimination {
    fn name(&self) -> &'static str {
        "dead-block-elimination"
    }

    fn kind(&self) -> PassKind {
        PassKind::Function
    }

    fn run_function(&self, program: &mut Program, function: NodeId, _dom: &DominatorInfo) -> bool {
        let func = program.node(function).unwrap().as_function().unwrap().clone();
        let entry = func.entry.expect("function has an entry block");

        let mut reachable: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        reachable.insert(entry);
        queue.push_back(entry);
        while let Some(block) = queue.pop_front() {
            let Some(term) = program.node(block).unwrap().as_block().unwrap().terminator() else {
                continue;
            };
            for target in program.node(term).unwrap().as_instruction().unwrap().op.targets() {
                if reachable.insert(target) {
                    queue.push_back(target);
                }
            }
        }

        let dead: Vec<NodeId> = func.blocks.iter().copied().filter(|b| !reachable.contains(b)).collect();
        if dead.is_empty() {
            return false;
        }

        // Scrub phi sources that key on a dead block before deleting it,
        // otherwise a still-live phi is left holding a dangling operand.
        for &block in &func.blocks {
            if !program.contains(block) {
                continue;
            }
            let instrs = program.node(block).unwrap().as_block().unwrap().instructions.clone();
            for instr in instrs {
                let stale: Vec<NodeId> = match &program.node(instr).unwrap().as_instruction().unwrap().op {
                    Op::Phi { sources, .. } => sources.keys().copied().filter(|k| dead.contains(k)).collect(),
                    _ => continue,
                };
                if stale.is_empty() {
                    continue;
                }
                program
                    .mutate_op(instr, |op| {
                        if let Op::Phi { sources, .. } = op {
                            for key in &stale {
                                sources.shift_remove(key);
                            }
                        }
                    })
                    .expect("phi exists");
            }
        }

        for block in dead {
            program.delete_block(block).expect("block exists");
        }
        true
    }
}
