//! The node graph arena and the `Program`/`Function`/`BasicBlock` ownership
//! hierarchy.
//!
//! `Program` is a single flat arena of [`Node`]s addressed by [`NodeId`],
//! chosen over a petgraph-backed graph because operand slots need
//! finer-grained bookkeeping (multiset use-counts collapsing into a `users`
//! set, map-shaped Phi operands) than a generic edge list provides, and
//! operand graphs can be cyclic (a Phi feeding back into its own loop).
//! Every mutation that changes a node's operands goes through
//! [`Program::mutate_op`], which keeps `users` consistent by diffing the
//! operand list before and after.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::{BasicBlock, ConstValue, Function, Instruction, Node, NodeKind};
use crate::ops::Op;
use crate::types::{TypeId, TypeInterner};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    nodes: Vec<Option<Node>>,
    pub functions: Vec<NodeId>,
    pub entry: Option<NodeId>,
    pub types: TypeInterner,
    void_id: NodeId,
    undef_cache: HashMap<TypeId, NodeId>,
    const_cache: HashMap<(TypeId, i64), NodeId>,
}

impl Program {
    pub fn new() -> Self {
        let types = TypeInterner::new();
        let mut program = Program {
            nodes: Vec::new(),
            functions: Vec::new(),
            entry: None,
            types,
            void_id: NodeId(0),
            undef_cache: HashMap::new(),
            const_cache: HashMap::new(),
        };
        let void_id = program.alloc_node(NodeKind::Void, TypeId::VOID);
        program.void_id = void_id;
        program
    }

    fn alloc_node(&mut self, kind: NodeKind, ty: TypeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node {
            id,
            kind,
            ty,
            users: HashSet::new(),
        }));
        id
    }

    pub fn node(&self, id: NodeId) -> CoreResult<&Node> {
        self.nodes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .ok_or(CoreError::NodeNotFound { id })
    }

    pub fn node_mut(&mut self, id: NodeId) -> CoreResult<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
            .ok_or(CoreError::NodeNotFound { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    /// Every live node id, in allocation order. Convenient for the verifier
    /// and for DCE-style reachability scans.
    pub fn all_node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId(i as u32)))
    }

    pub fn void(&self) -> NodeId {
        self.void_id
    }

    pub fn undef(&mut self, ty: TypeId) -> NodeId {
        if let Some(id) = self.undef_cache.get(&ty) {
            return *id;
        }
        let id = self.alloc_node(NodeKind::Undefined, ty);
        self.undef_cache.insert(ty, id);
        id
    }

    pub fn const_int(&mut self, width: u32, value: i64) -> NodeId {
        let ty = self.types.integer(width);
        if let Some(id) = self.const_cache.get(&(ty, value)) {
            return *id;
        }
        let id = self.alloc_node(NodeKind::Constant(ConstValue::Integer { width, value }), ty);
        self.const_cache.insert((ty, value), id);
        id
    }

    pub fn const_bool(&mut self, value: bool) -> NodeId {
        self.const_int(1, value as i64)
    }

    // -- Function / block / parameter construction --------------------------

    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        param_types: Vec<TypeId>,
        return_type: TypeId,
    ) -> NodeId {
        let func_id = NodeId(self.nodes.len() as u32);
        // Reserve the slot before allocating parameters so parameter
        // `function` back-pointers can reference it.
        self.nodes.push(None);
        let mut params = Vec::with_capacity(param_types.len());
        for (index, pty) in param_types.into_iter().enumerate() {
            let pid = self.alloc_node(
                NodeKind::Parameter {
                    function: func_id,
                    index: index as u32,
                },
                pty,
            );
            params.push(pid);
        }
        self.nodes[func_id.index()] = Some(Node {
            id: func_id,
            kind: NodeKind::Function(Function {
                name: name.into(),
                params,
                return_type,
                blocks: Vec::new(),
                entry: None,
            }),
            ty: TypeId::VOID,
            users: HashSet::new(),
        });
        self.functions.push(func_id);
        func_id
    }

    pub fn add_block(&mut self, function: NodeId, name: Option<String>) -> CoreResult<NodeId> {
        let block_id = self.alloc_node(
            NodeKind::BasicBlock(BasicBlock {
                name,
                instructions: Vec::new(),
                function,
            }),
            TypeId::BLOCK,
        );
        let func = self
            .node_mut(function)?
            .as_function_mut()
            .ok_or(CoreError::WrongNodeKind {
                id: function,
                expected: "function",
                actual: "other",
            })?;
        func.blocks.push(block_id);
        if func.entry.is_none() {
            func.entry = Some(block_id);
        }
        Ok(block_id)
    }

    /// Appends an instruction to `block`, wiring `users` for every operand
    /// the instruction's `op` references.
    pub fn add_instruction(&mut self, block: NodeId, op: Op, ty: TypeId) -> CoreResult<NodeId> {
        let operands = op.operands();
        let id = self.alloc_node(NodeKind::Instruction(Instruction { op, block }), ty);
        for operand in unique(&operands) {
            self.link(id, operand)?;
        }
        self.node_mut(block)?
            .as_block_mut()
            .ok_or(CoreError::WrongNodeKind {
                id: block,
                expected: "block",
                actual: "other",
            })?
            .instructions
            .push(id);
        Ok(id)
    }

    fn link(&mut self, user: NodeId, operand: NodeId) -> CoreResult<()> {
        self.node_mut(operand)?.users.insert(user);
        Ok(())
    }

    fn unlink(&mut self, user: NodeId, operand: NodeId) -> CoreResult<()> {
        self.node_mut(operand)?.users.remove(&user);
        Ok(())
    }

    /// Applies `f` to `user`'s `Op`, then resyncs `users` bookkeeping by
    /// diffing the operand set before and after. This is the single path
    /// through which instruction operands are ever mutated.
    pub fn mutate_op<T>(
        &mut self,
        user: NodeId,
        f: impl FnOnce(&mut Op) -> T,
    ) -> CoreResult<T> {
        let before = self.node(user)?.operands();
        let result = {
            let node = self.node_mut(user)?;
            let instr = node.as_instruction_mut().ok_or(CoreError::WrongNodeKind {
                id: user,
                expected: "instruction",
                actual: "other",
            })?;
            f(&mut instr.op)
        };
        let after = self.node(user)?.operands();
        self.resync(user, &before, &after)?;
        Ok(result)
    }

    fn resync(&mut self, user: NodeId, before: &[NodeId], after: &[NodeId]) -> CoreResult<()> {
        let before_set: HashSet<NodeId> = before.iter().copied().collect();
        let after_set: HashSet<NodeId> = after.iter().copied().collect();
        for removed in before_set.difference(&after_set) {
            self.unlink(user, *removed)?;
        }
        for added in after_set.difference(&before_set) {
            self.link(user, *added)?;
        }
        Ok(())
    }

    /// Replaces `from` with `to` in a single user's operand list. See
    /// [`Program::replace_with`] for the program-wide version.
    pub fn replace_operand(&mut self, user: NodeId, from: NodeId, to: NodeId) -> CoreResult<usize> {
        self.mutate_op(user, |op| op.replace_operand(from, to))
    }

    /// Rewrites every user of `from` to reference `to` instead, then asserts
    /// `from.users` is empty. Constants, blocks, undefined values, and the
    /// void value reject this.
    pub fn replace_with(&mut self, from: NodeId, to: NodeId) -> CoreResult<()> {
        let kind_ok = self.node(from)?.kind.is_replaceable();
        if !kind_ok {
            return Err(CoreError::WrongNodeKind {
                id: from,
                expected: "replaceable value",
                actual: self.node(from)?.kind.kind_name(),
            });
        }
        let users: Vec<NodeId> = self.node(from)?.users.iter().copied().collect();
        for user in users {
            self.replace_operand(user, from, to)?;
        }
        debug_assert!(self.node(from)?.users.is_empty());
        Ok(())
    }

    /// Shallow delete: removes `node` as a user of its own operands, but
    /// does not touch whatever (still) references `node` itself. Callers
    /// must ensure `node.users` is already empty.
    pub fn delete_node(&mut self, node: NodeId) -> CoreResult<()> {
        let operands = self.node(node)?.operands();
        for operand in unique(&operands) {
            self.unlink(node, operand)?;
        }
        if let Some(slot) = self.nodes.get_mut(node.index()) {
            *slot = None;
        }
        Ok(())
    }

    /// Deep delete of an instruction: detaches it from its owning block's
    /// instruction list, then shallow-deletes it.
    pub fn delete_instruction(&mut self, instr: NodeId) -> CoreResult<()> {
        let block = self.node(instr)?.as_instruction().ok_or(CoreError::WrongNodeKind {
            id: instr,
            expected: "instruction",
            actual: "other",
        })?.block;
        if let Some(b) = self.node_mut(block)?.as_block_mut() {
            b.instructions.retain(|&i| i != instr);
        }
        self.delete_node(instr)
    }

    /// Deep delete of a block: deep-deletes every instruction bottom-up,
    /// detaches the block from its function, then shallow-deletes the
    /// block itself.
    pub fn delete_block(&mut self, block: NodeId) -> CoreResult<()> {
        let (function, instrs) = {
            let b = self.node(block)?.as_block().ok_or(CoreError::WrongNodeKind {
                id: block,
                expected: "block",
                actual: "other",
            })?;
            (b.function, b.instructions.clone())
        };
        for instr in instrs.into_iter().rev() {
            self.delete_instruction(instr)?;
        }
        if let Some(f) = self.node_mut(function)?.as_function_mut() {
            f.blocks.retain(|&b| b != block);
        }
        self.delete_node(block)
    }

    /// Deep delete of a function: deep-deletes every block, removes the
    /// function from the program's function list, then shallow-deletes the
    /// function node and its parameters.
    pub fn delete_function(&mut self, function: NodeId) -> CoreResult<()> {
        let (blocks, params) = {
            let f = self
                .node(function)?
                .as_function()
                .ok_or(CoreError::WrongNodeKind {
                    id: function,
                    expected: "function",
                    actual: "other",
                })?;
            (f.blocks.clone(), f.params.clone())
        };
        for block in blocks {
            self.delete_block(block)?;
        }
        self.functions.retain(|&f| f != function);
        self.delete_node(function)?;
        for param in params {
            self.delete_node(param)?;
        }
        Ok(())
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

fn unique(ids: &[NodeId]) -> impl Iterator<Item = NodeId> + '_ {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(move |id| seen.insert(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::BinOp;

    fn simple_program() -> (Program, NodeId, NodeId) {
        let mut program = Program::new();
        let i32_ty = program.types.integer(32);
        let func = program.declare_function("main", vec![], TypeId::VOID);
        let block = program.add_block(func, None).unwrap();
        let c1 = program.const_int(32, 1);
        let c2 = program.const_int(32, 2);
        let add = program
            .add_instruction(
                block,
                Op::BinaryOp {
                    op: BinOp::Add,
                    l: c1,
                    r: c2,
                },
                i32_ty,
            )
            .unwrap();
        (program, block, add)
    }

    #[test]
    fn add_instruction_links_users() {
        let (program, _block, add) = simple_program();
        let c1 = program.const_cache[&(program.types.integer(32), 1)];
        assert!(program.node(c1).unwrap().users.contains(&add));
    }

    #[test]
    fn mutate_op_resyncs_users() {
        let (mut program, block, add) = simple_program();
        let c1 = program.const_int(32, 1);
        let c3 = program.const_int(32, 3);
        program.replace_operand(add, c1, c3).unwrap();
        assert!(!program.node(c1).unwrap().users.contains(&add));
        assert!(program.node(c3).unwrap().users.contains(&add));
        let _ = block;
    }

    #[test]
    fn repeated_operand_collapses_into_one_user_entry() {
        let mut program = Program::new();
        let func = program.declare_function("f", vec![], TypeId::VOID);
        let block = program.add_block(func, None).unwrap();
        let c1 = program.const_int(32, 9);
        let eat = program
            .add_instruction(block, Op::Eat { args: vec![c1, c1] }, TypeId::VOID)
            .unwrap();
        assert_eq!(program.node(c1).unwrap().users.len(), 1);
        assert!(program.node(c1).unwrap().users.contains(&eat));
    }

    #[test]
    fn delete_instruction_clears_users_and_block_list() {
        let (mut program, block, add) = simple_program();
        let c1 = program.const_int(32, 1);
        program.delete_instruction(add).unwrap();
        assert!(!program.node(c1).unwrap().users.contains(&add));
        assert!(!program.node(block).unwrap().as_block().unwrap().instructions.contains(&add));
        assert!(!program.contains(add));
    }

    #[test]
    fn replace_with_rewrites_all_users_and_empties_set() {
        let mut program = Program::new();
        let i32_ty = program.types.integer(32);
        let func = program.declare_function("f", vec![], TypeId::VOID);
        let block = program.add_block(func, None).unwrap();
        let c1 = program.const_int(32, 1);
        let c2 = program.const_int(32, 2);
        let a = program
            .add_instruction(
                block,
                Op::BinaryOp {
                    op: BinOp::Add,
                    l: c1,
                    r: c1,
                },
                i32_ty,
            )
            .unwrap();
        program.replace_with(c1, c2).unwrap();
        assert!(program.node(c1).unwrap().users.is_empty());
        assert!(program.node(c2).unwrap().users.contains(&a));
    }

    #[test]
    fn replace_with_rejects_non_replaceable_undefined() {
        let mut program = Program::new();
        let undef = program.undef(TypeId::VOID);
        let other = program.undef(TypeId::BLOCK);
        assert!(program.replace_with(undef, other).is_err());
    }

    #[test]
    fn undef_and_const_are_cached() {
        let mut program = Program::new();
        let u1 = program.undef(TypeId::VOID);
        let u2 = program.undef(TypeId::VOID);
        assert_eq!(u1, u2);
        let c1 = program.const_int(32, 5);
        let c2 = program.const_int(32, 5);
        assert_eq!(c1, c2);
    }

    proptest::proptest! {
        /// Whatever sequence of additions and deletions referencing a shared
        /// operand runs, its `users` set always names exactly the still-live
        /// instructions whose operand list mentions it.
        #[test]
        fn users_set_matches_live_referencing_instructions(steps in proptest::collection::vec(0u8..3, 1..40)) {
            let mut program = Program::new();
            let i32_ty = program.types.integer(32);
            let func = program.declare_function("f", vec![], TypeId::VOID);
            let block = program.add_block(func, None).unwrap();
            let shared = program.const_int(32, 7);
            let mut referencing = Vec::new();

            for step in steps {
                match step {
                    0 => {
                        let other = program.const_int(32, 1);
                        let id = program
                            .add_instruction(block, Op::BinaryOp { op: BinOp::Add, l: shared, r: other }, i32_ty)
                            .unwrap();
                        referencing.push(id);
                    }
                    1 => {
                        if let Some(id) = referencing.pop() {
                            program.delete_instruction(id).unwrap();
                        }
                    }
                    _ => {
                        let a = program.const_int(32, 2);
                        let b = program.const_int(32, 3);
                        program
                            .add_instruction(block, Op::BinaryOp { op: BinOp::Add, l: a, r: b }, i32_ty)
                            .unwrap();
                    }
                }
            }

            let expected: HashSet<NodeId> = referencing.into_iter().collect();
            let actual = program.node(shared).unwrap().users.clone();
            proptest::prop_assert_eq!(actual, expected);
        }
    }
}
