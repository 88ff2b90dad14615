//! Dead-function elimination (program-level).

use std::collections::{HashSet, VecDeque};

use lll_core::Program;
use tracing::debug;

use super::{Pass, PassKind};

pub struct DeadFunctionElimination;

impl Pass for DeadFunctionElimination {
    fn name(&self) -> &'static str {
        "dead-function-elimination"
    }

    fn kind(&self) -> PassKind {
        PassKind::Program
    }

    fn run_program(&self, program: &mut Program) -> bool {
        let Some(entry) = program.entry else {
            return false;
        };

        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        reachable.insert(entry);
        queue.push_back(entry);

        while let Some(function) = queue.pop_front() {
            let Ok(func) = program.node(function).map(|n| n.as_function().cloned()) else {
                continue;
            };
            let Some(func) = func else { continue };
            for block in &func.blocks {
                let Ok(instrs) = program.node(*block).map(|n| n.as_block().map(|b| b.instructions.clone())) else {
                    continue;
                };
                let Some(instrs) = instrs else { continue };
                for instr in instrs {
                    let Ok(operands) = program.node(instr).map(|n| n.operands()) else {
                        continue;
                    };
                    for operand in operands {
                        if program.functions.contains(&operand) && reachable.insert(operand) {
                            queue.push_back(operand);
                        }
                    }
                }
            }
        }

        let dead: Vec<_> = program
            .functions
            .iter()
            .copied()
            .filter(|f| !reachable.contains(f))
            .collect();

        for function in &dead {
            debug!(function = %function, "deleting dead function");
            program.delete_function(*function).expect("function node exists");
        }

        !dead.is_empty()
    }
}
