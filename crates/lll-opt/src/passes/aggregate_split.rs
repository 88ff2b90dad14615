//! Aggregate splitting (per-function): replaces an `Alloc` of a
//! `Struct`/fixed-size `Array` whose every use has a statically-known field
//! index with one `Alloc` per element, eliminating the aggregate entirely
//! when nothing needs it as a single value.

use lll_check::DominatorInfo;
use lll_core::{NodeId, Op, Program, Type, TypeId};

use super::{Pass, PassKind};

pub struct AggregateSplitting;

impl Pass for AggregateSplitting {
    fn name(&self) -> &'static str {
        "aggregate-splitting"
    }

    fn kind(&self) -> PassKind {
        PassKind::Function
    }

    fn run_function(&self, program: &mut Program, function: NodeId, _dom: &DominatorInfo) -> bool {
        let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
        let mut changed = false;
        for block in blocks {
            if !program.contains(block) {
                continue;
            }
            let instrs = program.node(block).unwrap().as_block().unwrap().instructions.clone();
            for instr in instrs {
                if !program.contains(instr) {
                    continue;
                }
                if try_split(program, block, instr) {
                    changed = true;
                }
            }
        }
        changed
    }
}

fn element_types(program: &Program, ty: TypeId) -> Option<Vec<TypeId>> {
    match program.types.try_get(ty)? {
        Type::Struct(_, fields) => Some(fields.clone()),
        Type::Array(inner, size) => Some(vec![*inner; *size as usize]),
        _ => None,
    }
}

fn const_index(program: &Program, id: NodeId) -> Option<usize> {
    match &program.node(id).ok()?.kind {
        lll_core::NodeKind::Constant(lll_core::ConstValue::Integer { value, .. }) if *value >= 0 => {
            Some(*value as usize)
        }
        _ => None,
    }
}

fn try_split(program: &mut Program, block: NodeId, alloc: NodeId) -> bool {
    let inner = match &program.node(alloc).unwrap().as_instruction().unwrap().op {
        Op::Alloc { inner } => *inner,
        _ => return false,
    };
    let Some(elem_types) = element_types(program, inner) else { return false };

    let users: Vec<NodeId> = program.node(alloc).unwrap().users.iter().copied().collect();
    let mut splittable = true;
    for &user in &users {
        let Ok(node) = program.node(user) else { continue };
        let Some(i) = node.as_instruction() else { continue };
        let ok = match &i.op {
            Op::Load { pointer } => *pointer == alloc,
            Op::Store { pointer, value } => *pointer == alloc && *value != alloc,
            Op::GetSubPointerStruct { target, .. } => *target == alloc,
            Op::GetSubPointerArray { target, index } => *target == alloc && const_index(program, *index).is_some(),
            _ => false,
        };
        if !ok {
            splittable = false;
            break;
        }
    }
    if !splittable {
        return false;
    }

    let splits: Vec<NodeId> = create_split_allocs(program, block, alloc, &elem_types);

    for user in users {
        if !program.contains(user) {
            continue;
        }
        let op = program.node(user).unwrap().as_instruction().unwrap().op.clone();
        let user_block = program.node(user).unwrap().as_instruction().unwrap().block;
        match op {
            Op::Load { .. } => rewrite_load(program, user_block, user, inner, &elem_types, &splits),
            Op::Store { value, .. } => rewrite_store(program, user_block, user, value, inner, &elem_types, &splits),
            Op::GetSubPointerStruct { index, .. } => {
                let target = splits[index as usize];
                program.replace_with(user, target).expect("replaceable");
                program.delete_instruction(user).expect("exists");
            }
            Op::GetSubPointerArray { index, .. } => {
                let i = const_index(program, index).expect("checked splittable");
                let target = splits[i];
                program.replace_with(user, target).expect("replaceable");
                program.delete_instruction(user).expect("exists");
            }
            _ => unreachable!("checked splittable above"),
        }
    }

    program.delete_instruction(alloc).expect("alloc exists");
    true
}

fn create_split_allocs(program: &mut Program, block: NodeId, alloc: NodeId, elem_types: &[TypeId]) -> Vec<NodeId> {
    let mut cursor = alloc;
    let mut splits = Vec::with_capacity(elem_types.len());
    for &elem_ty in elem_types {
        let ptr_ty = program.types.pointer(elem_ty);
        let id = insert_after(program, block, cursor, Op::Alloc { inner: elem_ty }, ptr_ty);
        splits.push(id);
        cursor = id;
    }
    splits
}

fn rewrite_load(
    program: &mut Program,
    block: NodeId,
    load: NodeId,
    aggregate_ty: TypeId,
    elem_types: &[TypeId],
    splits: &[NodeId],
) {
    let mut new_ids = Vec::with_capacity(elem_types.len() + 1);
    let mut loaded = Vec::with_capacity(elem_types.len());
    for (i, &elem_ty) in elem_types.iter().enumerate() {
        let id = program
            .add_instruction(block, Op::Load { pointer: splits[i] }, elem_ty)
            .expect("block exists");
        new_ids.push(id);
        loaded.push(id);
    }
    let aggregate = program
        .add_instruction(
            block,
            Op::AggregateValue { ty: aggregate_ty, values: loaded },
            aggregate_ty,
        )
        .expect("block exists");
    new_ids.push(aggregate);

    insert_sequence_before(program, block, load, &new_ids);
    program.replace_with(load, aggregate).expect("replaceable");
    program.delete_instruction(load).expect("load exists");
}

fn rewrite_store(
    program: &mut Program,
    block: NodeId,
    store: NodeId,
    value: NodeId,
    aggregate_ty: TypeId,
    elem_types: &[TypeId],
    splits: &[NodeId],
) {
    let mut new_ids = Vec::with_capacity(elem_types.len() * 2);
    let is_struct = matches!(program.types.try_get(aggregate_ty), Some(Type::Struct(_, _)));
    for (i, &elem_ty) in elem_types.iter().enumerate() {
        let projected = if is_struct {
            program
                .add_instruction(block, Op::GetSubValueStruct { target: value, index: i as u32 }, elem_ty)
                .expect("block exists")
        } else {
            let index = program.const_int(32, i as i64);
            program
                .add_instruction(block, Op::GetSubValueArray { target: value, index }, elem_ty)
                .expect("block exists")
        };
        new_ids.push(projected);
        let store_id = program
            .add_instruction(block, Op::Store { pointer: splits[i], value: projected }, TypeId::VOID)
            .expect("block exists");
        new_ids.push(store_id);
    }
    insert_sequence_before(program, block, store, &new_ids);
    program.delete_instruction(store).expect("store exists");
}

fn insert_after(program: &mut Program, block: NodeId, after: NodeId, op: Op, ty: TypeId) -> NodeId {
    let id = program.add_instruction(block, op, ty).expect("block exists");
    let b = program.node_mut(block).unwrap().as_block_mut().unwrap();
    b.instructions.retain(|&i| i != id);
    let pos = b.instructions.iter().position(|&i| i == after).expect("anchor in block");
    b.instructions.insert(pos + 1, id);
    id
}

fn insert_sequence_before(program: &mut Program, block: NodeId, anchor: NodeId, ids: &[NodeId]) {
    let b = program.node_mut(block).unwrap().as_block_mut().unwrap();
    b.instructions.retain(|i| !ids.contains(i));
    let pos = b.instructions.iter().position(|&i| i == anchor).expect("anchor in block");
    for (offset, &id) in ids.iter().enumerate() {
        b.instructions.insert(pos + offset, id);
    }
}
