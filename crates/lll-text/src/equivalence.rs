//! `programEquals`: structural comparison of two programs that
//! is independent of their respective `TypeInterner`s and `NodeId` spaces.
//! Two programs are equal when every function/block/instruction lines up
//! positionally and every operand resolves to the same structural position
//! (or, for constants/undef/void, the same content) in both programs.

use std::collections::HashMap;

use lll_core::{ConstValue, NodeId, NodeKind, Op, Program};

use crate::printer::render_type;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Function(usize),
    Block(usize, usize),
    Instr(usize, usize, usize),
    Param(usize, usize),
    ConstInt(u32, i64),
    Undef(String),
    Void,
}

struct Index {
    lookup: HashMap<NodeId, Key>,
}

fn build_index(program: &Program) -> Index {
    let mut lookup = HashMap::new();
    for (fi, &fid) in program.functions.iter().enumerate() {
        lookup.insert(fid, Key::Function(fi));
        let func = program.node(fid).unwrap().as_function().unwrap();
        for (pi, &pid) in func.params.iter().enumerate() {
            lookup.insert(pid, Key::Param(fi, pi));
        }
        for (bi, &bid) in func.blocks.iter().enumerate() {
            lookup.insert(bid, Key::Block(fi, bi));
            let block = program.node(bid).unwrap().as_block().unwrap();
            for (ii, &iid) in block.instructions.iter().enumerate() {
                lookup.insert(iid, Key::Instr(fi, bi, ii));
            }
        }
    }
    Index { lookup }
}

fn key_of(program: &Program, index: &Index, id: NodeId) -> Option<Key> {
    if let Some(k) = index.lookup.get(&id) {
        return Some(k.clone());
    }
    let node = program.node(id).ok()?;
    match &node.kind {
        NodeKind::Constant(ConstValue::Integer { width, value }) => Some(Key::ConstInt(*width, *value)),
        NodeKind::Undefined => Some(Key::Undef(render_type(program, node.ty))),
        NodeKind::Void => Some(Key::Void),
        _ => None,
    }
}

/// Structural program equality. Ignores
/// debug-only names (block names, raw `NodeId` values) and compares types
/// by their rendered shape rather than by interned id.
pub fn program_equals(a: &Program, b: &Program) -> bool {
    if a.functions.len() != b.functions.len() {
        return false;
    }
    let idx_a = build_index(a);
    let idx_b = build_index(b);

    for (&fa, &fb) in a.functions.iter().zip(b.functions.iter()) {
        let func_a = a.node(fa).unwrap().as_function().unwrap();
        let func_b = b.node(fb).unwrap().as_function().unwrap();
        if func_a.name != func_b.name {
            return false;
        }
        if func_a.params.len() != func_b.params.len() {
            return false;
        }
        if render_type(a, func_a.return_type) != render_type(b, func_b.return_type) {
            return false;
        }
        if func_a.blocks.len() != func_b.blocks.len() {
            return false;
        }
        for (&ba, &bb) in func_a.blocks.iter().zip(func_b.blocks.iter()) {
            let block_a = a.node(ba).unwrap().as_block().unwrap();
            let block_b = b.node(bb).unwrap().as_block().unwrap();
            if block_a.instructions.len() != block_b.instructions.len() {
                return false;
            }
            for (&ia, &ib) in block_a.instructions.iter().zip(block_b.instructions.iter()) {
                if !instr_equals(a, &idx_a, ia, b, &idx_b, ib) {
                    return false;
                }
            }
        }
    }

    match (a.entry, b.entry) {
        (Some(ea), Some(eb)) => key_of(a, &idx_a, ea) == key_of(b, &idx_b, eb),
        (None, None) => true,
        _ => false,
    }
}

fn instr_equals(a: &Program, idx_a: &Index, ia: NodeId, b: &Program, idx_b: &Index, ib: NodeId) -> bool {
    let node_a = a.node(ia).unwrap();
    let node_b = b.node(ib).unwrap();
    if render_type(a, node_a.ty) != render_type(b, node_b.ty) {
        return false;
    }
    let op_a = &node_a.as_instruction().unwrap().op;
    let op_b = &node_b.as_instruction().unwrap().op;
    ops_equal(a, idx_a, op_a, b, idx_b, op_b)
}

fn ops_equal(a: &Program, idx_a: &Index, op_a: &Op, b: &Program, idx_b: &Index, op_b: &Op) -> bool {
    let eq = |x: NodeId, y: NodeId| key_of(a, idx_a, x) == key_of(b, idx_b, y);
    match (op_a, op_b) {
        (Op::Alloc { inner: ia }, Op::Alloc { inner: ib }) => render_type(a, *ia) == render_type(b, *ib),
        (Op::Store { pointer: pa, value: va }, Op::Store { pointer: pb, value: vb }) => eq(*pa, *pb) && eq(*va, *vb),
        (Op::Load { pointer: pa }, Op::Load { pointer: pb }) => eq(*pa, *pb),
        (Op::BinaryOp { op: oa, l: la, r: ra }, Op::BinaryOp { op: ob, l: lb, r: rb }) => {
            oa == ob && eq(*la, *lb) && eq(*ra, *rb)
        }
        (Op::UnaryOp { op: oa, v: va }, Op::UnaryOp { op: ob, v: vb }) => oa == ob && eq(*va, *vb),
        (Op::Phi { ty: ta, sources: sa }, Op::Phi { ty: tb, sources: sb }) => {
            render_type(a, *ta) == render_type(b, *tb)
                && sa.len() == sb.len()
                && sa.iter().zip(sb.iter()).all(|((ka, va), (kb, vb))| eq(*ka, *kb) && eq(*va, *vb))
        }
        (Op::Eat { args: aa }, Op::Eat { args: ab }) => {
            aa.len() == ab.len() && aa.iter().zip(ab).all(|(&x, &y)| eq(x, y))
        }
        (Op::Blur { v: va }, Op::Blur { v: vb }) => eq(*va, *vb),
        (Op::Call { target: ta, args: aa }, Op::Call { target: tb, args: ab }) => {
            eq(*ta, *tb) && aa.len() == ab.len() && aa.iter().zip(ab).all(|(&x, &y)| eq(x, y))
        }
        (Op::GetSubValueStruct { target: ta, index: ia2 }, Op::GetSubValueStruct { target: tb, index: ib2 }) => {
            eq(*ta, *tb) && ia2 == ib2
        }
        (Op::GetSubValueArray { target: ta, index: ia2 }, Op::GetSubValueArray { target: tb, index: ib2 }) => {
            eq(*ta, *tb) && eq(*ia2, *ib2)
        }
        (Op::GetSubPointerStruct { target: ta, index: ia2 }, Op::GetSubPointerStruct { target: tb, index: ib2 }) => {
            eq(*ta, *tb) && ia2 == ib2
        }
        (Op::GetSubPointerArray { target: ta, index: ia2 }, Op::GetSubPointerArray { target: tb, index: ib2 }) => {
            eq(*ta, *tb) && eq(*ia2, *ib2)
        }
        (Op::AggregateValue { ty: ta, values: va }, Op::AggregateValue { ty: tb, values: vb }) => {
            render_type(a, *ta) == render_type(b, *tb)
                && va.len() == vb.len()
                && va.iter().zip(vb).all(|(&x, &y)| eq(x, y))
        }
        (
            Op::Branch { cond: ca, if_true: ta, if_false: fa },
            Op::Branch { cond: cb, if_true: tb, if_false: fb },
        ) => eq(*ca, *cb) && eq(*ta, *tb) && eq(*fa, *fb),
        (Op::Jump { target: ta }, Op::Jump { target: tb }) => eq(*ta, *tb),
        (Op::Exit, Op::Exit) => true,
        (Op::Return { value: va }, Op::Return { value: vb }) => eq(*va, *vb),
        _ => false,
    }
}
