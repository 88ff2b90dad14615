//! Dead-instruction elimination (per-function).
//!
//! Roots the reachable set at every impure instruction (`Store`, `Eat`,
//! `Blur`, `Call`, per [`lll_core::Op::is_pure`]) and walks the operand
//! graph backward; anything pure left unreached is deleted. Block
//! terminators are always kept live (control flow is structural, not
//! operand-driven reachability).

use std::collections::{HashSet, VecDeque};

use lll_check::DominatorInfo;
use lll_core::{NodeId, Program};

use super::{Pass, PassKind};

pub struct DeadInstructionElimination;

impl Pass for DeadInstructionElimination {
    fn name(&self) -> &'static str {
        "dead-instruction-elimination"
    }

    fn kind(&self) -> PassKind {
        PassKind::Function
    }

    fn run_function(&self, program: &mut Program, function: NodeId, _dom: &DominatorInfo) -> bool {
        let func = program.node(function).unwrap().as_function().unwrap().clone();

        let mut reachable: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for &block in &func.blocks {
            for &instr in &program.node(block).unwrap().as_block().unwrap().instructions {
                let op = &program.node(instr).unwrap().as_instruction().unwrap().op;
                let keep = op.is_terminator() || !op.is_pure();
                if keep && reachable.insert(instr) {
                    queue.push_back(instr);
                }
            }
        }

        while let Some(instr) = queue.pop_front() {
            for operand in program.node(instr).unwrap().operands() {
                if matches!(program.node(operand).ok().and_then(|n| n.as_instruction()), Some(_)) && reachable.insert(operand) {
                    queue.push_back(operand);
                }
            }
        }

        let mut changed = false;
        for &block in &func.blocks {
            let instrs = program.node(block).unwrap().as_block().unwrap().instructions.clone();
            for instr in instrs {
                if !reachable.contains(&instr) {
                    program.delete_instruction(instr).expect("instruction exists");
                    changed = true;
                }
            }
        }
        changed
    }
}
