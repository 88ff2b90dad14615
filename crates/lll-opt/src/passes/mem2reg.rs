//! Alloc-to-phi promotion, a.k.a. mem2reg (per-function).
//!
//! A candidate is an entry-block `Alloc` used only as a `Load`/`Store`
//! pointer (never stored as a value, i.e. it never escapes). Phis go at the
//! iterated dominance frontier of its store sites; each load resolves to
//! either a same-block preceding store or, walking up the dominator tree, a
//! phi or the entry value (`Undef`).

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use lll_check::DominatorInfo;
use lll_core::{NodeId, Op, Program, TypeId};
use tracing::debug;

use super::{Pass, PassKind};

pub struct AllocToPhi;

impl Pass for AllocToPhi {
    fn name(&self) -> &'static str {
        "alloc-to-phi"
    }

    fn kind(&self) -> PassKind {
        PassKind::Function
    }

    fn run_function(&self, program: &mut Program, function: NodeId, dom: &DominatorInfo) -> bool {
        let entry = match program.node(function).ok().and_then(|n| n.as_function()).and_then(|f| f.entry) {
            Some(e) => e,
            None => return false,
        };
        let candidates = candidate_allocs(program, entry);
        if candidates.is_empty() {
            return false;
        }

        let blocks = program.node(function).unwrap().as_function().unwrap().blocks.clone();
        let predecessors = predecessor_map(program, &blocks);

        for alloc in candidates {
            debug!(alloc = %alloc, function = %function, "promoting alloc to phi");
            promote(program, entry, alloc, dom, &blocks, &predecessors);
        }
        true
    }
}

fn candidate_allocs(program: &Program, entry: NodeId) -> Vec<NodeId> {
    let instrs = program.node(entry).unwrap().as_block().unwrap().instructions.clone();
    instrs
        .into_iter()
        .filter(|&candidate| {
            let Ok(node) = program.node(candidate) else { return false };
            let is_alloc = matches!(
                node.as_instruction().map(|ins| &ins.op),
                Some(Op::Alloc { .. })
            );
            if !is_alloc {
                return false;
            }
            node.users.iter().all(|&user| is_non_escaping_use(program, user, candidate))
        })
        .collect()
}

fn is_non_escaping_use(program: &Program, user: NodeId, alloc: NodeId) -> bool {
    match program.node(user).ok().and_then(|n| n.as_instruction()).map(|i| &i.op) {
        Some(Op::Load { pointer }) => *pointer == alloc,
        Some(Op::Store { pointer, value }) => *pointer == alloc && *value != alloc,
        _ => false,
    }
}

fn predecessor_map(program: &Program, blocks: &[NodeId]) -> HashMap<NodeId, Vec<NodeId>> {
    let mut preds: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &b in blocks {
        preds.entry(b).or_default();
    }
    for &b in blocks {
        let term = program.node(b).unwrap().as_block().unwrap().terminator();
        if let Some(t) = term {
            for target in program.node(t).unwrap().as_instruction().unwrap().op.targets() {
                preds.entry(target).or_default().push(b);
            }
        }
    }
    preds
}

struct Resolver<'a> {
    program: &'a Program,
    dom: &'a DominatorInfo,
    alloc: NodeId,
    entry: NodeId,
    phi_at: &'a HashMap<NodeId, NodeId>,
    undef: NodeId,
    entry_memo: HashMap<NodeId, NodeId>,
    exit_memo: HashMap<NodeId, NodeId>,
}

impl<'a> Resolver<'a> {
    fn entry_value(&mut self, block: NodeId) -> NodeId {
        if let Some(&v) = self.entry_memo.get(&block) {
            return v;
        }
        let value = if let Some(&phi) = self.phi_at.get(&block) {
            phi
        } else if block == self.entry {
            self.undef
        } else {
            let idom = self.dom.idom(block).expect("reachable block has an idom");
            self.exit_value(idom)
        };
        self.entry_memo.insert(block, value);
        value
    }

    fn exit_value(&mut self, block: NodeId) -> NodeId {
        if let Some(&v) = self.exit_memo.get(&block) {
            return v;
        }
        let mut value = self.entry_value(block);
        let instrs = self.program.node(block).unwrap().as_block().unwrap().instructions.clone();
        for instr in instrs {
            if let Op::Store { pointer, value: v } = &self.program.node(instr).unwrap().as_instruction().unwrap().op {
                if *pointer == self.alloc {
                    value = *v;
                }
            }
        }
        self.exit_memo.insert(block, value);
        value
    }

    /// Value visible to an instruction at position `upto` (exclusive) of
    /// `block`'s instruction list.
    fn value_before(&mut self, block: NodeId, upto: usize) -> NodeId {
        let mut value = self.entry_value(block);
        let instrs = self.program.node(block).unwrap().as_block().unwrap().instructions.clone();
        for instr in instrs.iter().take(upto) {
            if let Op::Store { pointer, value: v } = &self.program.node(*instr).unwrap().as_instruction().unwrap().op {
                if *pointer == self.alloc {
                    value = *v;
                }
            }
        }
        value
    }
}

fn promote(
    program: &mut Program,
    entry: NodeId,
    alloc: NodeId,
    dom: &DominatorInfo,
    blocks: &[NodeId],
    predecessors: &HashMap<NodeId, Vec<NodeId>>,
) {
    let inner = match program.node(alloc).unwrap().as_instruction().unwrap().op {
        Op::Alloc { inner } => inner,
        _ => unreachable!(),
    };

    let def_blocks: HashSet<NodeId> = blocks
        .iter()
        .copied()
        .filter(|&b| {
            program
                .node(b)
                .unwrap()
                .as_block()
                .unwrap()
                .instructions
                .iter()
                .any(|&i| stores_to(program, i, alloc))
        })
        .collect();

    let phi_blocks = dom.iterated_frontier(&def_blocks);
    let mut phi_at: HashMap<NodeId, NodeId> = HashMap::new();
    for &block in &phi_blocks {
        let phi = insert_at_head(program, block, Op::Phi { ty: inner, sources: IndexMap::new() }, inner);
        phi_at.insert(block, phi);
    }

    let undef = program.undef(inner);

    let mut loads_to_replace: Vec<(NodeId, NodeId)> = Vec::new();
    let mut stores_to_delete: Vec<NodeId> = Vec::new();
    {
        let mut resolver = Resolver {
            program: &*program,
            dom,
            alloc,
            entry,
            phi_at: &phi_at,
            undef,
            entry_memo: HashMap::new(),
            exit_memo: HashMap::new(),
        };
        for &block in blocks {
            let instrs = resolver.program.node(block).unwrap().as_block().unwrap().instructions.clone();
            for (index, &instr) in instrs.iter().enumerate() {
                let op = &resolver.program.node(instr).unwrap().as_instruction().unwrap().op;
                match op {
                    Op::Load { pointer } if *pointer == alloc => {
                        let value = resolver.value_before(block, index);
                        loads_to_replace.push((instr, value));
                    }
                    Op::Store { pointer, .. } if *pointer == alloc => {
                        stores_to_delete.push(instr);
                    }
                    _ => {}
                }
            }
        }
    }

    for (load, value) in loads_to_replace {
        program.replace_with(load, value).expect("load is replaceable");
        program.delete_instruction(load).expect("load exists");
    }
    for store in stores_to_delete {
        program.delete_instruction(store).expect("store exists");
    }

    for (&block, &phi) in &phi_at {
        let preds = predecessors.get(&block).cloned().unwrap_or_default();
        let mut resolver = Resolver {
            program: &*program,
            dom,
            alloc,
            entry,
            phi_at: &phi_at,
            undef,
            entry_memo: HashMap::new(),
            exit_memo: HashMap::new(),
        };
        let sources: IndexMap<NodeId, NodeId> = preds.iter().map(|&p| (p, resolver.exit_value(p))).collect();
        program
            .mutate_op(phi, |op| {
                if let Op::Phi { sources: s, .. } = op {
                    *s = sources;
                }
            })
            .expect("phi exists");
    }

    program.delete_instruction(alloc).expect("alloc exists");
}

fn stores_to(program: &Program, instr: NodeId, alloc: NodeId) -> bool {
    matches!(
        &program.node(instr).unwrap().as_instruction().unwrap().op,
        Op::Store { pointer, .. } if *pointer == alloc
    )
}

fn insert_at_head(program: &mut Program, block: NodeId, op: Op, ty: TypeId) -> NodeId {
    let id = program.add_instruction(block, op, ty).expect("block exists");
    let b = program.node_mut(block).unwrap().as_block_mut().unwrap();
    b.instructions.retain(|&i| i != id);
    b.instructions.insert(0, id);
    id
}
