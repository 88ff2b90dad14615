//! Node kinds that populate a [`crate::program::Program`]'s arena.
//!
//! Every element -- functions, blocks, instructions, parameters, constants,
//! the undefined value, and the void value -- is a [`Node`]. A node is
//! simultaneously a *value* (it carries a [`TypeId`] and a `users` set) and,
//! for instructions, a *user* (it carries operands through its [`Op`]).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::ops::Op;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstValue {
    Integer { width: u32, value: i64 },
}

/// A function: a name, ordered typed parameters, a return type, an ordered
/// list of blocks, and a designated entry block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<NodeId>,
    pub return_type: TypeId,
    pub blocks: Vec<NodeId>,
    /// `None` only transiently, between `declare_function` and the first
    /// `add_block` call that establishes the entry block.
    pub entry: Option<NodeId>,
}

impl Function {
    pub fn is_parameterless_void(&self) -> bool {
        self.params.is_empty() && self.return_type == TypeId::VOID
    }
}

/// A basic block: an optional name, an ordered instruction list (terminator
/// last), and the owning function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub name: Option<String>,
    pub instructions: Vec<NodeId>,
    pub function: NodeId,
}

impl BasicBlock {
    pub fn terminator(&self) -> Option<NodeId> {
        self.instructions.last().copied()
    }

    pub fn non_terminators(&self) -> &[NodeId] {
        let len = self.instructions.len();
        if len == 0 {
            &self.instructions
        } else {
            &self.instructions[..len - 1]
        }
    }
}

/// An instruction node: one `Op` plus the block it lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,
    pub block: NodeId,
}

/// Disjoint node kinds. A `Node` is always exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Function(Function),
    BasicBlock(BasicBlock),
    Instruction(Instruction),
    /// Parameter `index` of its owning function.
    Parameter { function: NodeId, index: u32 },
    Constant(ConstValue),
    Undefined,
    /// The single canonical void value.
    Void,
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Function(_) => "function",
            NodeKind::BasicBlock(_) => "block",
            NodeKind::Instruction(_) => "instruction",
            NodeKind::Parameter { .. } => "parameter",
            NodeKind::Constant(_) => "constant",
            NodeKind::Undefined => "undefined",
            NodeKind::Void => "void",
        }
    }

    /// Constants, basic blocks, undefined values, and the void value are
    /// declared non-replaceable: `replaceWith` on them is a misuse that the
    /// program layer rejects before touching the graph.
    pub fn is_replaceable(&self) -> bool {
        !matches!(
            self,
            NodeKind::Constant(_) | NodeKind::BasicBlock(_) | NodeKind::Undefined | NodeKind::Void
        )
    }
}

/// A node's storage slot: its kind, its value type, and the set of nodes
/// that reference it as an operand. `None` marks a tombstoned (deleted)
/// slot; its id is never reissued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub ty: TypeId,
    pub users: HashSet<NodeId>,
}

impl Node {
    pub fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            NodeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut Function> {
        match &mut self.kind {
            NodeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BasicBlock> {
        match &self.kind {
            NodeKind::BasicBlock(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BasicBlock> {
        match &mut self.kind {
            NodeKind::BasicBlock(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            NodeKind::Instruction(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_instruction_mut(&mut self) -> Option<&mut Instruction> {
        match &mut self.kind {
            NodeKind::Instruction(i) => Some(i),
            _ => None,
        }
    }

    /// This node's operands, if it is a user (an instruction). Non-user
    /// nodes (functions, blocks, parameters, constants) have none here --
    /// a function's ownership of its blocks is structural, not an operand
    /// edge.
    pub fn operands(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Instruction(i) => i.op.operands(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_replaceable_kinds() {
        assert!(!NodeKind::Void.is_replaceable());
        assert!(!NodeKind::Undefined.is_replaceable());
        assert!(!NodeKind::Constant(ConstValue::Integer { width: 32, value: 1 }).is_replaceable());
    }

    #[test]
    fn replaceable_kinds() {
        let instr = NodeKind::Instruction(Instruction {
            op: Op::Exit,
            block: NodeId(0),
        });
        assert!(instr.is_replaceable());
    }

    #[test]
    fn block_splits_terminator_from_body() {
        let block = BasicBlock {
            name: None,
            instructions: vec![NodeId(1), NodeId(2), NodeId(3)],
            function: NodeId(0),
        };
        assert_eq!(block.non_terminators(), &[NodeId(1), NodeId(2)]);
        assert_eq!(block.terminator(), Some(NodeId(3)));
    }
}
