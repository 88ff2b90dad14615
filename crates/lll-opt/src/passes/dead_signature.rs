//! Dead-signature elimination (program-level).
//!
//! For every function whose only users are direct `Call`s, drops unused
//! parameters and, when nothing observes the result, the return value too.
//! Parameter binding is purely positional (`lll-check`'s interpreter zips
//! `func.params` against `Call.args` in list order), so dropping the same
//! positions from both sides keeps everything consistent without needing
//! to touch the kept parameter nodes' stale `index` field. Dropped
//! parameter nodes are deleted from the arena outright, since by
//! construction nothing still references them.

use lll_core::{NodeId, Op, Program, TypeId};
use tracing::debug;

use super::{Pass, PassKind};

pub struct DeadSignatureElimination;

impl Pass for DeadSignatureElimination {
    fn name(&self) -> &'static str {
        "dead-signature-elimination"
    }

    fn kind(&self) -> PassKind {
        PassKind::Program
    }

    fn run_program(&self, program: &mut Program) -> bool {
        let mut changed = false;
        for function in program.functions.clone() {
            if trim_signature(program, function) {
                changed = true;
            }
        }
        changed
    }
}

fn trim_signature(program: &mut Program, function: NodeId) -> bool {
    let Ok(node) = program.node(function) else { return false };
    let Some(func) = node.as_function() else { return false };

    let call_sites: Vec<NodeId> = node.users.iter().copied().collect();
    let all_calls_target_us = call_sites.iter().all(|&c| {
        program
            .node(c)
            .ok()
            .and_then(|n| n.as_instruction())
            .map(|i| matches!(&i.op, Op::Call { target, .. } if *target == function))
            .unwrap_or(false)
    });
    if !all_calls_target_us {
        return false;
    }

    let params = func.params.clone();
    let return_type = func.return_type;
    let used_params: Vec<bool> = params
        .iter()
        .map(|&p| program.node(p).map(|n| !n.users.is_empty()).unwrap_or(false))
        .collect();
    let any_result_used = call_sites
        .iter()
        .any(|&c| program.node(c).map(|n| !n.users.is_empty()).unwrap_or(false));
    let used_return = return_type == TypeId::VOID || any_result_used;

    if used_params.iter().all(|&used| used) && used_return {
        return false;
    }

    debug!(function = %function, "trimming unused parameters/return value");

    let kept_indices: Vec<usize> = used_params
        .iter()
        .enumerate()
        .filter(|(_, &used)| used)
        .map(|(i, _)| i)
        .collect();

    if !used_return {
        let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
        for block in blocks {
            let instrs = program.node(block).unwrap().as_block().unwrap().instructions.clone();
            for instr in instrs {
                let is_return = matches!(
                    program.node(instr).unwrap().as_instruction().unwrap().op,
                    Op::Return { .. }
                );
                if is_return {
                    let void = program.void();
                    program
                        .mutate_op(instr, |op| {
                            if let Op::Return { value } = op {
                                *value = void;
                            }
                        })
                        .expect("return instruction exists");
                }
            }
        }
        program.node_mut(function).unwrap().as_function_mut().unwrap().return_type = TypeId::VOID;
    }

    let dropped_params: Vec<NodeId> = params
        .iter()
        .enumerate()
        .filter(|(i, _)| !kept_indices.contains(i))
        .map(|(_, &p)| p)
        .collect();

    {
        let func = program.node_mut(function).unwrap().as_function_mut().unwrap();
        func.params = kept_indices.iter().map(|&i| params[i]).collect();
    }

    for param in dropped_params {
        program.delete_node(param).expect("unused parameter node exists");
    }

    for &call in &call_sites {
        program
            .mutate_op(call, |op| {
                if let Op::Call { args, .. } = op {
                    *args = kept_indices.iter().map(|&i| args[i]).collect();
                }
            })
            .expect("call instruction exists");
        if !used_return {
            program.node_mut(call).unwrap().ty = TypeId::VOID;
        }
    }

    true
}
