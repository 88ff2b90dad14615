//! Constant folding (per-function): a lighter, local counterpart to SCCP.
//! Visits every instruction once per invocation; the driver's fixed-point
//! loop re-invokes until nothing more folds.

use lll_check::interpreter::value::wrap;
use lll_check::DominatorInfo;
use lll_core::{BinOp, NodeId, Op, Program, UnOp};

use super::{Pass, PassKind};

pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn kind(&self) -> PassKind {
        PassKind::Function
    }

    fn run_function(&self, program: &mut Program, function: NodeId, _dom: &DominatorInfo) -> bool {
        let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
        let mut changed = false;
        for block in blocks {
            let instrs = program.node(block).ok().and_then(|n| n.as_block()).map(|b| b.instructions.clone());
            let Some(instrs) = instrs else { continue };
            for instr in instrs {
                if !program.contains(instr) {
                    continue;
                }
                if fold_one(program, instr) {
                    changed = true;
                }
            }
        }
        changed
    }
}

fn const_int(program: &Program, id: NodeId) -> Option<(u32, i64)> {
    let node = program.node(id).ok()?;
    match &node.kind {
        lll_core::NodeKind::Constant(lll_core::ConstValue::Integer { width, value }) => Some((*width, *value)),
        _ => None,
    }
}

fn fold_one(program: &mut Program, instr: NodeId) -> bool {
    let op = program.node(instr).unwrap().as_instruction().unwrap().op.clone();
    match op {
        Op::BinaryOp { op, l, r } => fold_binary(program, instr, op, l, r),
        Op::UnaryOp { op, v } => fold_unary(program, instr, op, v),
        Op::Branch { cond, if_true, if_false } => fold_branch(program, instr, cond, if_true, if_false),
        Op::Phi { sources, .. } => fold_phi(program, instr, &sources),
        Op::GetSubValueStruct { target, index } => fold_get_struct(program, instr, target, index),
        Op::GetSubValueArray { target, index } => fold_get_array(program, instr, target, index),
        _ => false,
    }
}

fn fold_binary(program: &mut Program, instr: NodeId, op: BinOp, l: NodeId, r: NodeId) -> bool {
    let Some((lw, lv)) = const_int(program, l) else { return false };
    let Some((_, rv)) = const_int(program, r) else { return false };
    let raw: i128 = match op {
        BinOp::Add => lv as i128 + rv as i128,
        BinOp::Sub => lv as i128 - rv as i128,
        BinOp::Mul => lv as i128 * rv as i128,
        BinOp::SDiv => {
            if rv == 0 {
                return false;
            }
            lv as i128 / rv as i128
        }
        BinOp::SRem => {
            if rv == 0 {
                return false;
            }
            lv as i128 % rv as i128
        }
        BinOp::And => (lv & rv) as i128,
        BinOp::Or => (lv | rv) as i128,
        BinOp::Xor => (lv ^ rv) as i128,
        BinOp::Shl => (lv << rv) as i128,
        BinOp::Shr => (lv >> rv) as i128,
        BinOp::Eq => return replace_with_bool(program, instr, lv == rv),
        BinOp::Ne => return replace_with_bool(program, instr, lv != rv),
        BinOp::Lt => return replace_with_bool(program, instr, lv < rv),
        BinOp::Le => return replace_with_bool(program, instr, lv <= rv),
        BinOp::Gt => return replace_with_bool(program, instr, lv > rv),
        BinOp::Ge => return replace_with_bool(program, instr, lv >= rv),
    };
    let folded = wrap(lw, raw);
    let replacement = program.const_int(lw, folded);
    replace_instr(program, instr, replacement)
}

fn fold_unary(program: &mut Program, instr: NodeId, op: UnOp, v: NodeId) -> bool {
    let Some((w, value)) = const_int(program, v) else { return false };
    let raw: i128 = match op {
        UnOp::Neg => -(value as i128),
        UnOp::Not => !(value as i128),
    };
    let folded = wrap(w, raw);
    let replacement = program.const_int(w, folded);
    replace_instr(program, instr, replacement)
}

fn replace_with_bool(program: &mut Program, instr: NodeId, value: bool) -> bool {
    let replacement = program.const_bool(value);
    replace_instr(program, instr, replacement)
}

fn fold_branch(program: &mut Program, instr: NodeId, cond: NodeId, if_true: NodeId, if_false: NodeId) -> bool {
    let target = if if_true == if_false {
        Some(if_true)
    } else {
        const_int(program, cond).map(|(_, v)| if v != 0 { if_true } else { if_false })
    };
    let Some(target) = target else { return false };
    program
        .mutate_op(instr, |op| *op = Op::Jump { target })
        .expect("branch instruction exists");
    true
}

fn fold_phi(program: &mut Program, instr: NodeId, sources: &indexmap::IndexMap<NodeId, NodeId>) -> bool {
    if sources.is_empty() {
        return false;
    }
    let mut distinct: Vec<NodeId> = Vec::new();
    for &value in sources.values() {
        if !distinct.contains(&value) {
            distinct.push(value);
        }
    }
    if distinct.len() != 1 || distinct[0] == instr {
        return false;
    }
    replace_instr(program, instr, distinct[0])
}

fn fold_get_struct(program: &mut Program, instr: NodeId, target: NodeId, index: u32) -> bool {
    let Ok(node) = program.node(target) else { return false };
    let Some(i) = node.as_instruction() else { return false };
    let Op::AggregateValue { values, .. } = &i.op else { return false };
    let Some(&value) = values.get(index as usize) else { return false };
    replace_instr(program, instr, value)
}

fn fold_get_array(program: &mut Program, instr: NodeId, target: NodeId, index: NodeId) -> bool {
    let Some((_, index_value)) = const_int(program, index) else { return false };
    if index_value < 0 {
        return false;
    }
    let Ok(node) = program.node(target) else { return false };
    let Some(i) = node.as_instruction() else { return false };
    let Op::AggregateValue { values, .. } = &i.op else { return false };
    let Some(&value) = values.get(index_value as usize) else { return false };
    replace_instr(program, instr, value)
}

fn replace_instr(program: &mut Program, instr: NodeId, replacement: NodeId) -> bool {
    if instr == replacement {
        return false;
    }
    program.replace_with(instr, replacement).expect("instruction is replaceable");
    program.delete_instruction(instr).expect("instruction exists");
    true
}
