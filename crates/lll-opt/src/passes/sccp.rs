//! Sparse conditional constant propagation (per-function).
//!
//! A three-valued lattice `Unknown ⊑ Known(c) ⊑ Variable` over every
//! instruction and parameter, plus a set of executable flow edges. Only
//! values reached along an executable edge are merged into a Phi; a
//! `Branch` on a known condition marks only the taken edge executable.

use std::collections::{HashSet, VecDeque};

use lll_check::DominatorInfo;
use lll_core::{BinOp, NodeId, Op, Program, UnOp};

use super::{Pass, PassKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lattice {
    Unknown,
    Known(u32, i64),
    Variable,
}

impl Lattice {
    fn join(self, other: Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Unknown, x) | (x, Lattice::Unknown) => x,
            (Lattice::Known(w1, v1), Lattice::Known(w2, v2)) if w1 == w2 && v1 == v2 => Lattice::Known(w1, v1),
            _ => Lattice::Variable,
        }
    }
}

pub struct SparseConditionalConstantPropagation;

impl Pass for SparseConditionalConstantPropagation {
    fn name(&self) -> &'static str {
        "sccp"
    }

    fn kind(&self) -> PassKind {
        PassKind::Function
    }

    fn run_function(&self, program: &mut Program, function: NodeId, _dom: &DominatorInfo) -> bool {
        let Solution {
            values,
            executable_edges,
        } = solve(program, function);
        apply(program, function, &values, &executable_edges)
    }
}

struct Solution {
    values: std::collections::HashMap<NodeId, Lattice>,
    executable_edges: HashSet<(NodeId, NodeId)>,
}

/// `None` is used as the sentinel "from" block for the initial entry edge
/// (there is no real predecessor of the entry block).
fn solve(program: &Program, function: NodeId) -> Solution {
    let func = program.node(function).unwrap().as_function().unwrap().clone();
    let entry = func.entry.expect("function has an entry block");

    let mut values: std::collections::HashMap<NodeId, Lattice> = std::collections::HashMap::new();
    for &p in &func.params {
        values.insert(p, Lattice::Variable);
    }
    for &b in &func.blocks {
        for &i in &program.node(b).unwrap().as_block().unwrap().instructions {
            values.insert(i, Lattice::Unknown);
        }
    }

    let mut executable_edges: HashSet<(NodeId, NodeId)> = HashSet::new();
    let mut executable_blocks: HashSet<NodeId> = HashSet::new();
    let mut block_queue: VecDeque<NodeId> = VecDeque::new();
    let mut instr_queue: VecDeque<NodeId> = VecDeque::new();

    executable_blocks.insert(entry);
    block_queue.push_back(entry);

    while block_queue.front().is_some() || instr_queue.front().is_some() {
        while let Some(block) = block_queue.pop_front() {
            let instrs = program.node(block).unwrap().as_block().unwrap().instructions.clone();
            for instr in instrs {
                instr_queue.push_back(instr);
            }
        }
        while let Some(instr) = instr_queue.pop_front() {
            let block = program.node(instr).unwrap().as_instruction().unwrap().block;
            if !executable_blocks.contains(&block) {
                continue;
            }
            let op = program.node(instr).unwrap().as_instruction().unwrap().op.clone();
            let old = values[&instr];
            let new = eval(program, &values, &executable_edges, block, &op);
            if new != old {
                values.insert(instr, new);
                for &user in &program.node(instr).unwrap().users {
                    instr_queue.push_back(user);
                }
            }
            if let Op::Branch { cond, if_true, if_false } = &op {
                let cond_value = lookup(&values, *cond);
                let mut mark = |target: NodeId| {
                    if executable_edges.insert((block, target)) && executable_blocks.insert(target) {
                        block_queue.push_back(target);
                    }
                };
                match cond_value {
                    Lattice::Known(_, 0) => mark(*if_false),
                    Lattice::Known(_, _) => mark(*if_true),
                    Lattice::Variable => {
                        mark(*if_true);
                        mark(*if_false);
                    }
                    Lattice::Unknown => {}
                }
            } else if let Op::Jump { target } = &op {
                if executable_edges.insert((block, *target)) && executable_blocks.insert(*target) {
                    block_queue.push_back(*target);
                }
            }
        }
    }

    Solution {
        values,
        executable_edges,
    }
}

fn lookup(values: &std::collections::HashMap<NodeId, Lattice>, id: NodeId) -> Lattice {
    values.get(&id).copied().unwrap_or(Lattice::Variable)
}

fn const_lattice(program: &Program, id: NodeId) -> Option<Lattice> {
    match &program.node(id).ok()?.kind {
        lll_core::NodeKind::Constant(lll_core::ConstValue::Integer { width, value }) => {
            Some(Lattice::Known(*width, *value))
        }
        lll_core::NodeKind::Parameter { .. } => Some(Lattice::Variable),
        _ => None,
    }
}

fn operand_lattice(
    program: &Program,
    values: &std::collections::HashMap<NodeId, Lattice>,
    id: NodeId,
) -> Lattice {
    if let Some(l) = const_lattice(program, id) {
        return l;
    }
    lookup(values, id)
}

fn eval(
    program: &Program,
    values: &std::collections::HashMap<NodeId, Lattice>,
    executable_edges: &HashSet<(NodeId, NodeId)>,
    block: NodeId,
    op: &Op,
) -> Lattice {
    match op {
        Op::BinaryOp { op, l, r } => {
            let lv = operand_lattice(program, values, *l);
            let rv = operand_lattice(program, values, *r);
            combine_binary(*op, lv, rv)
        }
        Op::UnaryOp { op, v } => combine_unary(*op, operand_lattice(program, values, *v)),
        Op::Phi { sources, .. } => {
            let mut acc = Lattice::Unknown;
            for (&pred, &value) in sources {
                if executable_edges.contains(&(pred, block)) {
                    acc = acc.join(operand_lattice(program, values, value));
                }
            }
            acc
        }
        Op::Load { .. } | Op::Call { .. } | Op::Blur { .. } | Op::GetSubValueArray { .. } => Lattice::Variable,
        Op::GetSubValueStruct { target, .. } => operand_lattice(program, values, *target),
        // `Alloc` and everything else (Store, Eat, pointer projections, aggregate
        // construction, terminators) either produces a non-integer value or
        // no value at all; `apply` only acts on `Known`/`Unknown`, so pin
        // these to `Variable` to leave them alone once reached.
        _ => Lattice::Variable,
    }
}

fn combine_binary(op: BinOp, l: Lattice, r: Lattice) -> Lattice {
    let (Lattice::Known(lw, lv), Lattice::Known(_, rv)) = (l, r) else {
        if l == Lattice::Variable || r == Lattice::Variable {
            return Lattice::Variable;
        }
        return Lattice::Unknown;
    };
    let width = if op.is_comparison() { 1 } else { lw };
    let raw: i128 = match op {
        BinOp::Add => lv as i128 + rv as i128,
        BinOp::Sub => lv as i128 - rv as i128,
        BinOp::Mul => lv as i128 * rv as i128,
        BinOp::SDiv => {
            if rv == 0 {
                return Lattice::Variable;
            }
            lv as i128 / rv as i128
        }
        BinOp::SRem => {
            if rv == 0 {
                return Lattice::Variable;
            }
            lv as i128 % rv as i128
        }
        BinOp::And => (lv & rv) as i128,
        BinOp::Or => (lv | rv) as i128,
        BinOp::Xor => (lv ^ rv) as i128,
        BinOp::Shl => (lv << rv) as i128,
        BinOp::Shr => (lv >> rv) as i128,
        BinOp::Eq => (lv == rv) as i128,
        BinOp::Ne => (lv != rv) as i128,
        BinOp::Lt => (lv < rv) as i128,
        BinOp::Le => (lv <= rv) as i128,
        BinOp::Gt => (lv > rv) as i128,
        BinOp::Ge => (lv >= rv) as i128,
    };
    Lattice::Known(width, lll_check::interpreter::value::wrap(width, raw))
}

fn combine_unary(op: UnOp, v: Lattice) -> Lattice {
    let Lattice::Known(w, value) = v else {
        return v;
    };
    let raw: i128 = match op {
        UnOp::Neg => -(value as i128),
        UnOp::Not => !(value as i128),
    };
    Lattice::Known(w, lll_check::interpreter::value::wrap(w, raw))
}

fn apply(
    program: &mut Program,
    function: NodeId,
    values: &std::collections::HashMap<NodeId, Lattice>,
    executable_edges: &HashSet<(NodeId, NodeId)>,
) -> bool {
    let mut changed = false;
    let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
    for block in blocks {
        let instrs = program.node(block).unwrap().as_block().unwrap().instructions.clone();
        for instr in instrs {
            if !program.contains(instr) {
                continue;
            }
            let is_terminator = program.node(instr).unwrap().as_instruction().unwrap().op.is_terminator();
            if is_terminator {
                if let Op::Branch { cond, if_true, if_false } = &program.node(instr).unwrap().as_instruction().unwrap().op.clone() {
                    let taken = match (executable_edges.contains(&(block, *if_true)), executable_edges.contains(&(block, *if_false))) {
                        (true, false) => Some(*if_true),
                        (false, true) => Some(*if_false),
                        _ => None,
                    };
                    if let Some(target) = taken {
                        program.mutate_op(instr, |op| *op = Op::Jump { target }).expect("branch exists");
                        changed = true;
                    }
                }
                continue;
            }
            let ty = program.node(instr).unwrap().ty;
            match lookup(values, instr) {
                Lattice::Known(width, v) => {
                    let replacement = program.const_int(width, v);
                    if replacement != instr {
                        program.replace_with(instr, replacement).expect("replaceable");
                        program.delete_instruction(instr).expect("exists");
                        changed = true;
                    }
                }
                Lattice::Unknown => {
                    let replacement = program.undef(ty);
                    program.replace_with(instr, replacement).expect("replaceable");
                    program.delete_instruction(instr).expect("exists");
                    changed = true;
                }
                Lattice::Variable => {}
            }
        }
    }
    changed
}
