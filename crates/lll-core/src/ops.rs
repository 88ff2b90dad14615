//! The instruction catalog: concrete instruction kinds, their operand
//! shapes, purity, and terminator targets.
//!
//! Each [`Op`] variant carries its operands directly as [`NodeId`]s.
//! [`Op::operands`] enumerates every operand position in catalog order
//! (used to build and rebuild `users` bookkeeping); [`Op::replace_operand`]
//! substitutes one operand value for another everywhere it appears and
//! reports how many positions changed. Type rules need the type interner
//! and struct layout to resolve, so they live in `lll-check`'s verifier
//! alongside the rest of typechecking, keeping instruction shape and
//! type-rule resolution in separate crates.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "neg",
            UnOp::Not => "not",
        }
    }
}

/// One instruction kind from the catalog. Disjoint into `BasicInstruction`s
/// (everything except the last four) and `Terminator`s (`Branch`, `Jump`,
/// `Exit`, `Return`); [`Op::is_terminator`] draws the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Alloc {
        inner: TypeId,
    },
    Store {
        pointer: NodeId,
        value: NodeId,
    },
    Load {
        pointer: NodeId,
    },
    BinaryOp {
        op: BinOp,
        l: NodeId,
        r: NodeId,
    },
    UnaryOp {
        op: UnOp,
        v: NodeId,
    },
    /// Keyed by predecessor block. Iteration order follows insertion order,
    /// which lowering and mem2reg both populate in the function's block
    /// order, pinning multiple-predecessor order to block-list order for
    /// determinism.
    Phi {
        ty: TypeId,
        sources: IndexMap<NodeId, NodeId>,
    },
    Eat {
        args: Vec<NodeId>,
    },
    Blur {
        v: NodeId,
    },
    Call {
        target: NodeId,
        args: Vec<NodeId>,
    },
    GetSubValueStruct {
        target: NodeId,
        index: u32,
    },
    GetSubValueArray {
        target: NodeId,
        index: NodeId,
    },
    GetSubPointerStruct {
        target: NodeId,
        index: u32,
    },
    GetSubPointerArray {
        target: NodeId,
        index: NodeId,
    },
    AggregateValue {
        ty: TypeId,
        values: Vec<NodeId>,
    },
    Branch {
        cond: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    },
    Jump {
        target: NodeId,
    },
    Exit,
    Return {
        value: NodeId,
    },
}

impl Op {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Branch { .. } | Op::Jump { .. } | Op::Exit | Op::Return { .. }
        )
    }

    /// "Pure" instructions may be freely deleted when unused.
    pub fn is_pure(&self) -> bool {
        !matches!(
            self,
            Op::Store { .. } | Op::Eat { .. } | Op::Blur { .. } | Op::Call { .. }
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Alloc { .. } => "alloc",
            Op::Store { .. } => "store",
            Op::Load { .. } => "load",
            Op::BinaryOp { .. } => "binop",
            Op::UnaryOp { .. } => "unop",
            Op::Phi { .. } => "phi",
            Op::Eat { .. } => "eat",
            Op::Blur { .. } => "blur",
            Op::Call { .. } => "call",
            Op::GetSubValueStruct { .. } => "get_sub_value.struct",
            Op::GetSubValueArray { .. } => "get_sub_value.array",
            Op::GetSubPointerStruct { .. } => "get_sub_pointer.struct",
            Op::GetSubPointerArray { .. } => "get_sub_pointer.array",
            Op::AggregateValue { .. } => "aggregate_value",
            Op::Branch { .. } => "branch",
            Op::Jump { .. } => "jump",
            Op::Exit => "exit",
            Op::Return { .. } => "return",
        }
    }

    /// Every operand position, in a fixed catalog order. For `Phi`, block
    /// keys are included as operands (they are themselves `Node`s) followed
    /// by their source values, block then value, in iteration order.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Op::Alloc { .. } | Op::Exit => Vec::new(),
            Op::Store { pointer, value } => vec![*pointer, *value],
            Op::Load { pointer } => vec![*pointer],
            Op::BinaryOp { l, r, .. } => vec![*l, *r],
            Op::UnaryOp { v, .. } => vec![*v],
            Op::Phi { sources, .. } => {
                let mut out = Vec::with_capacity(sources.len() * 2);
                for (block, value) in sources {
                    out.push(*block);
                    out.push(*value);
                }
                out
            }
            Op::Eat { args } => args.clone(),
            Op::Blur { v } => vec![*v],
            Op::Call { target, args } => {
                let mut out = vec![*target];
                out.extend(args);
                out
            }
            Op::GetSubValueStruct { target, .. } => vec![*target],
            Op::GetSubValueArray { target, index } => vec![*target, *index],
            Op::GetSubPointerStruct { target, .. } => vec![*target],
            Op::GetSubPointerArray { target, index } => vec![*target, *index],
            Op::AggregateValue { values, .. } => values.clone(),
            Op::Branch {
                cond,
                if_true,
                if_false,
            } => vec![*cond, *if_true, *if_false],
            Op::Jump { target } => vec![*target],
            Op::Return { value } => vec![*value],
        }
    }

    /// Terminator successor blocks. Empty for non-terminators.
    pub fn targets(&self) -> Vec<NodeId> {
        match self {
            Op::Jump { target } => vec![*target],
            Op::Branch {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            _ => Vec::new(),
        }
    }

    /// Substitutes every operand reference `from -> to`, returning the
    /// number of positions changed. Block keys in a `Phi`'s source map are
    /// replaced too (a predecessor being renamed by block-simplification).
    pub fn replace_operand(&mut self, from: NodeId, to: NodeId) -> usize {
        let mut count = 0;
        let mut bump = |slot: &mut NodeId| {
            if *slot == from {
                *slot = to;
                count += 1;
            }
        };
        match self {
            Op::Alloc { .. } | Op::Exit => {}
            Op::Store { pointer, value } => {
                bump(pointer);
                bump(value);
            }
            Op::Load { pointer } => bump(pointer),
            Op::BinaryOp { l, r, .. } => {
                bump(l);
                bump(r);
            }
            Op::UnaryOp { v, .. } => bump(v),
            Op::Phi { sources, .. } => {
                let mut rebuilt = IndexMap::with_capacity(sources.len());
                for (block, value) in sources.drain(..) {
                    let new_block = if block == from {
                        count += 1;
                        to
                    } else {
                        block
                    };
                    let new_value = if value == from {
                        count += 1;
                        to
                    } else {
                        value
                    };
                    rebuilt.insert(new_block, new_value);
                }
                *sources = rebuilt;
            }
            Op::Eat { args } => {
                for a in args.iter_mut() {
                    bump(a);
                }
            }
            Op::Blur { v } => bump(v),
            Op::Call { target, args } => {
                bump(target);
                for a in args.iter_mut() {
                    bump(a);
                }
            }
            Op::GetSubValueStruct { target, .. } => bump(target),
            Op::GetSubValueArray { target, index } => {
                bump(target);
                bump(index);
            }
            Op::GetSubPointerStruct { target, .. } => bump(target),
            Op::GetSubPointerArray { target, index } => {
                bump(target);
                bump(index);
            }
            Op::AggregateValue { values, .. } => {
                for v in values.iter_mut() {
                    bump(v);
                }
            }
            Op::Branch {
                cond,
                if_true,
                if_false,
            } => {
                bump(cond);
                bump(if_true);
                bump(if_false);
            }
            Op::Jump { target } => bump(target),
            Op::Return { value } => bump(value),
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operands_cover_all_positions() {
        let op = Op::BinaryOp {
            op: BinOp::Add,
            l: NodeId(1),
            r: NodeId(2),
        };
        assert_eq!(op.operands(), vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn phi_operands_interleave_block_and_value() {
        let mut sources = IndexMap::new();
        sources.insert(NodeId(10), NodeId(20));
        sources.insert(NodeId(11), NodeId(21));
        let op = Op::Phi {
            ty: TypeId::BOOL,
            sources,
        };
        assert_eq!(
            op.operands(),
            vec![NodeId(10), NodeId(20), NodeId(11), NodeId(21)]
        );
    }

    #[test]
    fn replace_operand_counts_positions() {
        let mut op = Op::Eat {
            args: vec![NodeId(1), NodeId(1), NodeId(2)],
        };
        let delta = op.replace_operand(NodeId(1), NodeId(3));
        assert_eq!(delta, 2);
        assert_eq!(op.operands(), vec![NodeId(3), NodeId(3), NodeId(2)]);
    }

    #[test]
    fn targets_for_each_terminator() {
        assert_eq!(Op::Exit.targets(), Vec::<NodeId>::new());
        assert_eq!(
            Op::Return { value: NodeId(1) }.targets(),
            Vec::<NodeId>::new()
        );
        assert_eq!(Op::Jump { target: NodeId(5) }.targets(), vec![NodeId(5)]);
        assert_eq!(
            Op::Branch {
                cond: NodeId(0),
                if_true: NodeId(1),
                if_false: NodeId(2)
            }
            .targets(),
            vec![NodeId(1), NodeId(2)]
        );
    }

    #[test]
    fn purity_matches_catalog() {
        assert!(Op::Alloc {
            inner: TypeId::BOOL
        }
        .is_pure());
        assert!(!Op::Store {
            pointer: NodeId(0),
            value: NodeId(1)
        }
        .is_pure());
        assert!(!Op::Eat { args: vec![] }.is_pure());
        assert!(!Op::Blur { v: NodeId(0) }.is_pure());
        assert!(!Op::Call {
            target: NodeId(0),
            args: vec![]
        }
        .is_pure());
    }

    #[test]
    fn is_terminator_matches_catalog() {
        assert!(Op::Exit.is_terminator());
        assert!(Op::Jump { target: NodeId(0) }.is_terminator());
        assert!(!Op::Load { pointer: NodeId(0) }.is_terminator());
    }
}
