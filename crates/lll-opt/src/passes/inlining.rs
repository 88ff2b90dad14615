//! Function inlining (program-level).

use std::collections::HashMap;

use indexmap::IndexMap;
use lll_core::{NodeId, Op, Program, TypeId};
use tracing::debug;

use super::{Pass, PassKind};

pub struct FunctionInlining {
    pub threshold: usize,
}

impl Pass for FunctionInlining {
    fn name(&self) -> &'static str {
        "function-inlining"
    }

    fn kind(&self) -> PassKind {
        PassKind::Program
    }

    fn run_program(&self, program: &mut Program) -> bool {
        let mut changed = false;
        for function in program.functions.clone() {
            if !program.contains(function) {
                continue;
            }
            if !should_inline(program, function, self.threshold) {
                continue;
            }
            let call_sites = call_sites_targeting(program, function);
            debug!(function = %function, sites = call_sites.len(), "inlining");
            for call in call_sites {
                if !program.contains(call) {
                    continue;
                }
                let caller_block = program.node(call).unwrap().as_instruction().unwrap().block;
                let caller_fn = program.node(caller_block).unwrap().as_block().unwrap().function;
                inline_call(program, call, function, caller_fn);
                changed = true;
            }
            let no_users = program.node(function).map(|n| n.users.is_empty()).unwrap_or(true);
            if no_users && program.contains(function) {
                program.delete_function(function).expect("function exists");
            }
        }
        changed
    }
}

fn call_sites_targeting(program: &Program, function: NodeId) -> Vec<NodeId> {
    program
        .node(function)
        .map(|n| n.users.iter().copied().collect())
        .unwrap_or_default()
}

fn should_inline(program: &Program, function: NodeId, threshold: usize) -> bool {
    let Ok(node) = program.node(function) else { return false };
    let Some(func) = node.as_function() else { return false };
    let call_sites = call_sites_targeting(program, function);
    if call_sites.is_empty() {
        return false;
    }
    let all_direct_calls = call_sites.iter().all(|&c| is_call_to(program, c, function));
    if !all_direct_calls {
        return false;
    }
    let self_recursive = func.blocks.iter().any(|&b| {
        let Ok(bn) = program.node(b) else { return false };
        let Some(bb) = bn.as_block() else { return false };
        bb.instructions.iter().any(|&i| is_call_to(program, i, function))
    });
    if self_recursive {
        return false;
    }
    call_sites.len() == 1 || instruction_count(program, function) < threshold
}

fn is_call_to(program: &Program, instr: NodeId, function: NodeId) -> bool {
    match program.node(instr).ok().and_then(|n| n.as_instruction()) {
        Some(i) => matches!(&i.op, Op::Call { target, .. } if *target == function),
        None => false,
    }
}

fn instruction_count(program: &Program, function: NodeId) -> usize {
    let Ok(node) = program.node(function) else { return 0 };
    let Some(func) = node.as_function() else { return 0 };
    func.blocks
        .iter()
        .filter_map(|&b| program.node(b).ok())
        .filter_map(|n| n.as_block())
        .map(|b| b.instructions.len())
        .sum()
}

/// Inlines one call site: clones the callee's blocks into the caller,
/// splits the call's block at the call, threads returns into a merge phi
/// at the head of the continuation block, and rewires any phi that used to
/// treat the call's block as a predecessor to use the continuation instead.
fn inline_call(program: &mut Program, call_instr: NodeId, callee: NodeId, caller: NodeId) {
    let before_block = program.node(call_instr).unwrap().as_instruction().unwrap().block;
    let args = match &program.node(call_instr).unwrap().as_instruction().unwrap().op {
        Op::Call { args, .. } => args.clone(),
        _ => panic!("inline_call target is not a Call"),
    };
    let callee_func = program.node(callee).unwrap().as_function().unwrap().clone();
    let return_type = callee_func.return_type;

    let mut value_map: HashMap<NodeId, NodeId> = HashMap::new();
    for (param, arg) in callee_func.params.iter().zip(args.iter()) {
        value_map.insert(*param, *arg);
    }

    let mut block_map: HashMap<NodeId, NodeId> = HashMap::new();
    for &old_block in &callee_func.blocks {
        let name = program.node(old_block).unwrap().as_block().unwrap().name.clone();
        let new_block = program.add_block(caller, name).expect("caller exists");
        block_map.insert(old_block, new_block);
    }

    let mut instr_map: HashMap<NodeId, NodeId> = HashMap::new();
    for &old_block in &callee_func.blocks {
        let new_block = block_map[&old_block];
        let old_instrs = program.node(old_block).unwrap().as_block().unwrap().instructions.clone();
        for old_instr in old_instrs {
            let (op, ty) = {
                let n = program.node(old_instr).unwrap();
                (n.as_instruction().unwrap().op.clone(), n.ty)
            };
            let new_instr = program.add_instruction(new_block, op, ty).expect("block exists");
            instr_map.insert(old_instr, new_instr);
        }
    }

    for (&old_instr, &new_instr) in instr_map.clone().iter() {
        let old_operands = program.node(old_instr).unwrap().operands();
        let mut seen = std::collections::HashSet::new();
        for old_op in old_operands {
            if !seen.insert(old_op) {
                continue;
            }
            let new_op = value_map
                .get(&old_op)
                .or_else(|| instr_map.get(&old_op))
                .or_else(|| block_map.get(&old_op))
                .copied()
                .unwrap_or(old_op);
            if new_op != old_op {
                program.replace_operand(new_instr, old_op, new_op).expect("instruction exists");
            }
        }
    }

    let after_block = program.add_block(caller, None).expect("caller exists");
    let tail: Vec<NodeId> = {
        let b = program.node(before_block).unwrap().as_block().unwrap();
        let pos = b.instructions.iter().position(|&i| i == call_instr).expect("call in its block");
        b.instructions[pos + 1..].to_vec()
    };
    for &instr in &tail {
        program.node_mut(instr).unwrap().as_instruction_mut().unwrap().block = after_block;
    }
    {
        let b = program.node_mut(before_block).unwrap().as_block_mut().unwrap();
        let pos = b.instructions.iter().position(|&i| i == call_instr).unwrap();
        b.instructions.truncate(pos);
    }
    program.node_mut(after_block).unwrap().as_block_mut().unwrap().instructions = tail;

    let new_entry = block_map[&callee_func.entry.expect("callee has an entry")];
    program
        .add_instruction(before_block, Op::Jump { target: new_entry }, TypeId::VOID)
        .expect("before_block exists");

    let mut phi_sources: IndexMap<NodeId, NodeId> = IndexMap::new();
    for &old_block in &callee_func.blocks {
        let Some(&old_term) = program.node(old_block).unwrap().as_block().unwrap().instructions.last() else {
            continue;
        };
        let is_return = matches!(
            program.node(old_term).unwrap().as_instruction().unwrap().op,
            Op::Return { .. }
        );
        if !is_return {
            continue;
        }
        let new_term = instr_map[&old_term];
        let new_block = block_map[&old_block];
        let value = match &program.node(new_term).unwrap().as_instruction().unwrap().op {
            Op::Return { value } => *value,
            _ => unreachable!(),
        };
        phi_sources.insert(new_block, value);
        program
            .mutate_op(new_term, |op| *op = Op::Jump { target: after_block })
            .expect("return instruction exists");
    }

    let replacement = if return_type == TypeId::VOID {
        program.void()
    } else {
        let phi = insert_at_head(program, after_block, Op::Phi { ty: return_type, sources: IndexMap::new() }, return_type);
        program
            .mutate_op(phi, |op| {
                if let Op::Phi { sources, .. } = op {
                    *sources = phi_sources;
                }
            })
            .expect("phi instruction exists");
        phi
    };

    retarget_phi_predecessor(program, caller, before_block, after_block);

    program.replace_with(call_instr, replacement).expect("call instruction is replaceable");
    program.delete_instruction(call_instr).expect("call instruction exists");
}

fn insert_at_head(program: &mut Program, block: NodeId, op: Op, ty: TypeId) -> NodeId {
    let id = program.add_instruction(block, op, ty).expect("block exists");
    let b = program.node_mut(block).unwrap().as_block_mut().unwrap();
    b.instructions.retain(|&i| i != id);
    b.instructions.insert(0, id);
    id
}

fn retarget_phi_predecessor(program: &mut Program, function: NodeId, old_pred: NodeId, new_pred: NodeId) {
    let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
    for block in blocks {
        let instrs = program.node(block).unwrap().as_block().unwrap().instructions.clone();
        for instr in instrs {
            let has_old_pred = matches!(
                &program.node(instr).unwrap().as_instruction().unwrap().op,
                Op::Phi { sources, .. } if sources.contains_key(&old_pred)
            );
            if has_old_pred {
                program
                    .mutate_op(instr, |op| {
                        if let Op::Phi { sources, .. } = op {
                            if let Some(value) = sources.shift_remove(&old_pred) {
                                sources.insert(new_pred, value);
                            }
                        }
                    })
                    .expect("phi instruction exists");
            }
        }
    }
}
