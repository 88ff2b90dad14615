//! Block simplification (per-function): drops empty forwarding blocks and
//! splices single-predecessor blocks into their predecessor.

use std::collections::HashMap;

use lll_check::DominatorInfo;
use lll_core::{NodeId, Op, Program};

use super::{Pass, PassKind};

pub struct BlockSimplification;

impl Pass for BlockSimplification {
    fn name(&self) -> &'static str {
        "block-simplification"
    }

    fn kind(&self) -> PassKind {
        PassKind::Function
    }

    fn run_function(&self, program: &mut Program, function: NodeId, _dom: &DominatorInfo) -> bool {
        let entry = program
            .node(function)
            .unwrap()
            .as_function()
            .unwrap()
            .entry
            .expect("function has an entry block");
        let mut changed = false;

        let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
        for b in blocks {
            if b == entry || !program.contains(b) {
                continue;
            }
            let instructions = program.node(b).unwrap().as_block().unwrap().instructions.clone();
            if instructions.len() != 1 {
                continue;
            }
            let term = instructions[0];
            let target = match &program.node(term).unwrap().as_instruction().unwrap().op {
                Op::Jump { target } if *target != b => *target,
                _ => continue,
            };
            retarget_users(program, b, target);
            program.delete_block(b).expect("block exists");
            changed = true;
        }

        let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
        let predecessors = predecessor_map(program, &blocks);
        for b in blocks {
            if b == entry || !program.contains(b) {
                continue;
            }
            let Some(preds) = predecessors.get(&b) else { continue };
            if preds.len() != 1 {
                continue;
            }
            let p = preds[0];
            if p == b {
                continue;
            }
            let Some(p_term) = program.node(p).unwrap().as_block().unwrap().terminator() else {
                continue;
            };
            let jumps_to_b = matches!(
                &program.node(p_term).unwrap().as_instruction().unwrap().op,
                Op::Jump { target } if *target == b
            );
            if !jumps_to_b {
                continue;
            }
            splice(program, p, b);
            changed = true;
        }

        changed
    }
}

/// Rewrites every user of `from` (a block) to reference `to` instead. Blocks
/// are non-replaceable in `Program::replace_with` (renaming a value is
/// different from renaming a predecessor label), so this walks `from`'s
/// users directly.
fn retarget_users(program: &mut Program, from: NodeId, to: NodeId) {
    let users: Vec<NodeId> = program.node(from).unwrap().users.iter().copied().collect();
    for user in users {
        program.replace_operand(user, from, to).expect("user exists");
    }
}

fn predecessor_map(program: &Program, blocks: &[NodeId]) -> HashMap<NodeId, Vec<NodeId>> {
    let mut preds: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &b in blocks {
        preds.entry(b).or_default();
    }
    for &b in blocks {
        if let Some(term) = program.node(b).unwrap().as_block().unwrap().terminator() {
            for target in program.node(term).unwrap().as_instruction().unwrap().op.targets() {
                preds.entry(target).or_default().push(b);
            }
        }
    }
    preds
}

fn splice(program: &mut Program, p: NodeId, b: NodeId) {
    let old_term = program.node(p).unwrap().as_block().unwrap().terminator().expect("p has a terminator");
    let b_instructions = program.node(b).unwrap().as_block().unwrap().instructions.clone();

    for &instr in &b_instructions {
        program.node_mut(instr).unwrap().as_instruction_mut().unwrap().block = p;
    }
    {
        let pb = program.node_mut(p).unwrap().as_block_mut().unwrap();
        pb.instructions.pop();
        pb.instructions.extend(b_instructions);
    }
    program.node_mut(b).unwrap().as_block_mut().unwrap().instructions.clear();

    // Retargets every remaining user of `b` to `p` in one pass -- this
    // covers both `old_term` (now pointless) and any phi elsewhere that
    // keyed a source on `b`, since `Op::replace_operand` rewrites `Phi`
    // block keys as well as plain value operands.
    retarget_users(program, b, p);
    program.delete_node(old_term).expect("old terminator exists");

    program.delete_block(b).expect("block is now empty and detached");
}
