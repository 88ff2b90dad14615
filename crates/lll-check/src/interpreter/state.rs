//! Interpreter state machine with step-by-step execution.
//!
//! Execution is block-at-a-time: each step advances one instruction within
//! the active frame's current block. Terminators switch the active block,
//! pop the frame back to its caller, or end the run. `Call` suspends the
//! instruction by pushing a new frame; the caller's program counter only
//! advances once that frame returns.

use std::collections::HashMap;

use lll_core::{BinOp, CoreError, Function, NodeId, NodeKind, Op, Program, Type, TypeId, UnOp};

use super::value::{PointerValue, Value};
use crate::error::RuntimeError;

fn internal(e: CoreError) -> RuntimeError {
    RuntimeError::Internal {
        reason: e.to_string(),
    }
}

/// Execution state of the interpreter state machine.
#[derive(Debug, Clone)]
pub enum ExecutionState {
    Running,
    Completed { result: Value },
    Error { error: RuntimeError },
}

/// One function invocation on the interpreter's call stack.
#[derive(Debug)]
pub struct CallFrame {
    pub function: NodeId,
    pub values: HashMap<NodeId, Value>,
    pub block: NodeId,
    pub pc: usize,
    /// The block control entered this frame's current block from, consulted
    /// by `Phi`. `None` only in the entry block of the outermost frame.
    pub predecessor: Option<NodeId>,
    /// The `Call` instruction (in the caller's frame) awaiting this frame's
    /// return value. `None` for the outermost frame.
    pub return_slot: Option<NodeId>,
}

#[derive(Debug, Clone, Copy)]
pub struct InterpreterConfig {
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_call_depth: 1024,
        }
    }
}

/// Recursively builds the zero-initialized value of `ty` for `Alloc`.
fn default_value(ty: TypeId, types: &lll_core::TypeInterner) -> Value {
    match types.get(ty) {
        Type::Void => Value::Void,
        Type::Block => Value::Void,
        Type::Integer(width) => Value::Integer {
            width: *width,
            value: 0,
        },
        Type::Pointer(_) | Type::Function(..) => Value::Undefined(ty),
        Type::Struct(_, fields) => Value::Aggregate {
            ty,
            elements: fields.iter().map(|f| default_value(*f, types)).collect(),
        },
        Type::Array(inner, size) => Value::Aggregate {
            ty,
            elements: (0..*size).map(|_| default_value(*inner, types)).collect(),
        },
    }
}

fn min_for_width(width: u32) -> i64 {
    if width >= 64 {
        i64::MIN
    } else {
        -(1i64 << (width - 1))
    }
}

pub struct Interpreter<'p> {
    program: &'p Program,
    config: InterpreterConfig,
    state: ExecutionState,
    frames: Vec<CallFrame>,
    heap: Vec<Value>,
    /// Every value an `Eat` forced, in execution order. Comparing this
    /// sequence before and after optimization is how semantic
    /// preservation gets checked.
    observations: Vec<Value>,
}

impl<'p> Interpreter<'p> {
    pub fn new(
        program: &'p Program,
        entry: NodeId,
        args: Vec<Value>,
        config: InterpreterConfig,
    ) -> Result<Self, RuntimeError> {
        let mut interp = Interpreter {
            program,
            config,
            state: ExecutionState::Running,
            frames: Vec::new(),
            heap: Vec::new(),
            observations: Vec::new(),
        };
        interp.push_frame(entry, args, None)?;
        Ok(interp)
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn observations(&self) -> &[Value] {
        &self.observations
    }

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("interpreter always has an active frame while running")
    }

    fn current_frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("interpreter always has an active frame while running")
    }

    fn function(&self, id: NodeId) -> Result<&Function, RuntimeError> {
        self.program
            .node(id)
            .map_err(internal)?
            .as_function()
            .ok_or_else(|| RuntimeError::Internal {
                reason: format!("{id} is not a function"),
            })
    }

    fn push_frame(
        &mut self,
        target: NodeId,
        args: Vec<Value>,
        return_slot: Option<NodeId>,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::RecursionLimitExceeded { target });
        }
        let func = self.function(target)?;
        let entry = func.entry.ok_or_else(|| RuntimeError::Internal {
            reason: format!("function {target} has no entry block"),
        })?;
        let mut values = HashMap::with_capacity(func.params.len());
        for (param, arg) in func.params.iter().zip(args) {
            values.insert(*param, arg);
        }
        self.frames.push(CallFrame {
            function: target,
            values,
            block: entry,
            pc: 0,
            predecessor: None,
            return_slot,
        });
        Ok(())
    }

    fn pop_frame(&mut self, result: Value) -> Result<(), RuntimeError> {
        let finished = self.frames.pop().expect("pop_frame called with an active frame");
        match finished.return_slot {
            None => {
                self.state = ExecutionState::Completed { result };
            }
            Some(call_instr) => {
                let caller = self.frames.last_mut().ok_or_else(|| RuntimeError::Internal {
                    reason: "returned past the outermost frame".to_string(),
                })?;
                caller.values.insert(call_instr, result);
                caller.pc += 1;
            }
        }
        Ok(())
    }

    fn goto(&mut self, target: NodeId) {
        let frame = self.current_frame_mut();
        frame.predecessor = Some(frame.block);
        frame.block = target;
        frame.pc = 0;
    }

    /// Resolves an operand to its runtime value: either a value already
    /// computed in the active frame, or a program-level constant/undef/void.
    fn resolve(&self, id: NodeId) -> Result<Value, RuntimeError> {
        if let Some(v) = self.current_frame().values.get(&id) {
            return Ok(v.clone());
        }
        let node = self.program.node(id).map_err(internal)?;
        match &node.kind {
            NodeKind::Constant(lll_core::ConstValue::Integer { width, value }) => Ok(Value::Integer {
                width: *width,
                value: *value,
            }),
            NodeKind::Undefined => Ok(Value::Undefined(node.ty)),
            NodeKind::Void => Ok(Value::Void),
            other => Err(RuntimeError::Internal {
                reason: format!("{id} ({}) has no runtime value", other.kind_name()),
            }),
        }
    }

    /// Executes exactly one instruction in the active frame and yields.
    /// A no-op once the run has `Completed` or `Error`red.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        if matches!(self.state, ExecutionState::Completed { .. } | ExecutionState::Error { .. }) {
            return Ok(());
        }
        match self.step_inner() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ExecutionState::Error { error: e.clone() };
                Err(e)
            }
        }
    }

    fn step_inner(&mut self) -> Result<(), RuntimeError> {
        let frame = self.current_frame();
        let (block_id, pc) = (frame.block, frame.pc);
        let block = self
            .program
            .node(block_id)
            .map_err(internal)?
            .as_block()
            .expect("frame.block always names a block node");
        let instr_id = block.instructions[pc];
        let op = self
            .program
            .node(instr_id)
            .map_err(internal)?
            .as_instruction()
            .expect("block instruction list only holds instructions")
            .op
            .clone();

        match &op {
            Op::Jump { target } => self.goto(*target),
            Op::Branch { cond, if_true, if_false } => {
                let cond_value = self.resolve(*cond)?;
                let taken = cond_value
                    .as_bool()
                    .ok_or(RuntimeError::BranchConditionOutOfRange { instr: instr_id })?;
                self.goto(if taken { *if_true } else { *if_false });
            }
            Op::Exit => {
                self.state = ExecutionState::Completed { result: Value::Void };
            }
            Op::Return { value } => {
                let result = self.resolve(*value)?;
                self.pop_frame(result)?;
            }
            Op::Call { target, args } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for a in args {
                    arg_values.push(self.resolve(*a)?);
                }
                self.push_frame(*target, arg_values, Some(instr_id))?;
            }
            _ => {
                let value = self.evaluate(instr_id, &op)?;
                let frame = self.current_frame_mut();
                frame.values.insert(instr_id, value);
                frame.pc += 1;
            }
        }
        Ok(())
    }

    /// Runs to completion or a trap. Requires `step`-worthy progress on
    /// every call; loops forever only on a non-terminating program, since
    /// the interpreter is the reference semantics.
    pub fn run_to_end(&mut self) -> Result<Value, RuntimeError> {
        loop {
            match &self.state {
                ExecutionState::Completed { result } => return Ok(result.clone()),
                ExecutionState::Error { error } => return Err(error.clone()),
                ExecutionState::Running => self.step()?,
            }
        }
    }

    fn evaluate(&mut self, instr_id: NodeId, op: &Op) -> Result<Value, RuntimeError> {
        match op {
            Op::Phi { sources, .. } => {
                let predecessor = self.current_frame().predecessor.ok_or_else(|| RuntimeError::Internal {
                    reason: format!("phi {instr_id} reached with no predecessor block"),
                })?;
                let source = sources
                    .get(&predecessor)
                    .copied()
                    .ok_or(RuntimeError::MissingPhiSource {
                        phi: instr_id,
                        predecessor,
                    })?;
                self.resolve(source)
            }
            Op::BinaryOp { op, l, r } => self.eval_binary(instr_id, *op, *l, *r),
            Op::UnaryOp { op, v } => self.eval_unary(*op, *v),
            Op::Alloc { inner } => Ok(self.eval_alloc(*inner)),
            Op::Store { pointer, value } => self.eval_store(instr_id, *pointer, *value),
            Op::Load { pointer } => self.eval_load(instr_id, *pointer),
            Op::Eat { args } => self.eval_eat(args),
            Op::Blur { v } => self.resolve(*v),
            Op::GetSubValueStruct { target, index } => self.eval_get_sub_value_struct(*target, *index),
            Op::GetSubValueArray { target, index } => {
                self.eval_get_sub_value_array(instr_id, *target, *index)
            }
            Op::GetSubPointerStruct { target, index } => {
                self.eval_get_sub_pointer(instr_id, *target, *index as i64)
            }
            Op::GetSubPointerArray { target, index } => {
                let (_, idx) = self
                    .resolve(*index)?
                    .as_integer()
                    .ok_or_else(|| RuntimeError::Internal {
                        reason: format!("GetSubPointerArray index at {instr_id} is not an integer"),
                    })?;
                self.eval_get_sub_pointer(instr_id, *target, idx)
            }
            Op::AggregateValue { ty, values } => self.eval_aggregate(*ty, values),
            Op::Call { .. }
            | Op::Branch { .. }
            | Op::Jump { .. }
            | Op::Exit
            | Op::Return { .. } => unreachable!("terminators and calls are handled in step_inner"),
        }
    }

    fn eval_binary(&self, instr_id: NodeId, op: BinOp, l: NodeId, r: NodeId) -> Result<Value, RuntimeError> {
        let (width, a) = self.resolve(l)?.as_integer().ok_or_else(|| RuntimeError::Internal {
            reason: format!("binary operand at {instr_id} is not an integer"),
        })?;
        let (_, b) = self.resolve(r)?.as_integer().ok_or_else(|| RuntimeError::Internal {
            reason: format!("binary operand at {instr_id} is not an integer"),
        })?;
        let (a128, b128) = (a as i128, b as i128);
        use super::value::wrap;
        let result = match op {
            BinOp::Add => Value::Integer { width, value: wrap(width, a128 + b128) },
            BinOp::Sub => Value::Integer { width, value: wrap(width, a128 - b128) },
            BinOp::Mul => Value::Integer { width, value: wrap(width, a128 * b128) },
            BinOp::SDiv => {
                if b == 0 {
                    return Err(RuntimeError::DivideByZero { instr: instr_id });
                }
                if a == min_for_width(width) && b == -1 {
                    return Err(RuntimeError::SignedOverflow { instr: instr_id });
                }
                Value::Integer { width, value: wrap(width, a128 / b128) }
            }
            BinOp::SRem => {
                if b == 0 {
                    return Err(RuntimeError::DivideByZero { instr: instr_id });
                }
                if a == min_for_width(width) && b == -1 {
                    Value::Integer { width, value: 0 }
                } else {
                    Value::Integer { width, value: wrap(width, a128 % b128) }
                }
            }
            BinOp::And => Value::Integer { width, value: wrap(width, a128 & b128) },
            BinOp::Or => Value::Integer { width, value: wrap(width, a128 | b128) },
            BinOp::Xor => Value::Integer { width, value: wrap(width, a128 ^ b128) },
            BinOp::Shl => Value::Integer { width, value: wrap(width, a128 << (b128 as u32 & 63)) },
            BinOp::Shr => Value::Integer { width, value: wrap(width, a128 >> (b128 as u32 & 63)) },
            BinOp::Eq => Value::bool(a == b),
            BinOp::Ne => Value::bool(a != b),
            BinOp::Lt => Value::bool(a < b),
            BinOp::Le => Value::bool(a <= b),
            BinOp::Gt => Value::bool(a > b),
            BinOp::Ge => Value::bool(a >= b),
        };
        Ok(result)
    }

    fn eval_unary(&self, op: UnOp, v: NodeId) -> Result<Value, RuntimeError> {
        let (width, value) = self.resolve(v)?.as_integer().ok_or_else(|| RuntimeError::Internal {
            reason: format!("unary operand {v} is not an integer"),
        })?;
        use super::value::wrap;
        let value128 = value as i128;
        let result = match op {
            UnOp::Neg => wrap(width, -value128),
            UnOp::Not => wrap(width, !value128),
        };
        Ok(Value::Integer { width, value: result })
    }

    fn eval_alloc(&mut self, inner: TypeId) -> Value {
        let initial = default_value(inner, &self.program.types);
        let cell = self.heap.len() as u32;
        self.heap.push(initial);
        Value::Pointer(PointerValue::root(cell))
    }

    fn eval_get_sub_pointer(
        &self,
        instr_id: NodeId,
        target: NodeId,
        index: i64,
    ) -> Result<Value, RuntimeError> {
        let pointer = self.resolve(target)?;
        let pointer = pointer.as_pointer().ok_or(RuntimeError::NullPointerAccess { instr: instr_id })?;
        Ok(Value::Pointer(pointer.child(index as u32)))
    }

    fn eval_get_sub_value_struct(&self, target: NodeId, index: u32) -> Result<Value, RuntimeError> {
        let aggregate = self.resolve(target)?;
        match aggregate {
            Value::Aggregate { elements, .. } => Ok(elements[index as usize].clone()),
            _ => Err(RuntimeError::Internal {
                reason: format!("GetSubValue.Struct target {target} is not an aggregate"),
            }),
        }
    }

    fn eval_get_sub_value_array(
        &self,
        instr_id: NodeId,
        target: NodeId,
        index: NodeId,
    ) -> Result<Value, RuntimeError> {
        let aggregate = self.resolve(target)?;
        let (_, idx) = self.resolve(index)?.as_integer().ok_or_else(|| RuntimeError::Internal {
            reason: format!("GetSubValue.Array index at {instr_id} is not an integer"),
        })?;
        match aggregate {
            Value::Aggregate { elements, .. } => {
                if idx < 0 || idx as usize >= elements.len() {
                    return Err(RuntimeError::OutOfBoundsAccess {
                        instr: instr_id,
                        index: idx,
                        len: elements.len(),
                    });
                }
                Ok(elements[idx as usize].clone())
            }
            _ => Err(RuntimeError::Internal {
                reason: format!("GetSubValue.Array target {target} is not an aggregate"),
            }),
        }
    }

    fn eval_aggregate(&self, ty: TypeId, values: &[NodeId]) -> Result<Value, RuntimeError> {
        let mut elements = Vec::with_capacity(values.len());
        for v in values {
            elements.push(self.resolve(*v)?);
        }
        Ok(Value::Aggregate { ty, elements })
    }

    fn eval_eat(&mut self, args: &[NodeId]) -> Result<Value, RuntimeError> {
        for a in args {
            let value = self.resolve(*a)?;
            self.observations.push(value);
        }
        Ok(Value::Void)
    }

    fn eval_store(&mut self, instr_id: NodeId, pointer: NodeId, value: NodeId) -> Result<Value, RuntimeError> {
        let pointer = self.resolve(pointer)?;
        let pointer = pointer.as_pointer().ok_or(RuntimeError::NullPointerAccess { instr: instr_id })?.clone();
        let value = self.resolve(value)?;
        let cell = self
            .heap
            .get_mut(pointer.cell as usize)
            .ok_or(RuntimeError::NullPointerAccess { instr: instr_id })?;
        set_at_path(cell, &pointer.path, value, instr_id)?;
        Ok(Value::Void)
    }

    fn eval_load(&self, instr_id: NodeId, pointer: NodeId) -> Result<Value, RuntimeError> {
        let pointer = self.resolve(pointer)?;
        let pointer = pointer.as_pointer().ok_or(RuntimeError::NullPointerAccess { instr: instr_id })?;
        let cell = self
            .heap
            .get(pointer.cell as usize)
            .ok_or(RuntimeError::NullPointerAccess { instr: instr_id })?;
        get_at_path(cell, &pointer.path, instr_id).map(|v| v.clone())
    }
}

fn get_at_path<'v>(root: &'v Value, path: &[u32], instr_id: NodeId) -> Result<&'v Value, RuntimeError> {
    let mut current = root;
    for &index in path {
        match current {
            Value::Aggregate { elements, .. } => {
                current = elements.get(index as usize).ok_or(RuntimeError::OutOfBoundsAccess {
                    instr: instr_id,
                    index: index as i64,
                    len: elements.len(),
                })?;
            }
            _ => {
                return Err(RuntimeError::Internal {
                    reason: "pointer path descends into a non-aggregate value".to_string(),
                })
            }
        }
    }
    Ok(current)
}

fn set_at_path(root: &mut Value, path: &[u32], new_value: Value, instr_id: NodeId) -> Result<(), RuntimeError> {
    if path.is_empty() {
        *root = new_value;
        return Ok(());
    }
    let (&index, rest) = path.split_first().expect("non-empty path");
    match root {
        Value::Aggregate { elements, .. } => {
            let len = elements.len();
            let slot = elements.get_mut(index as usize).ok_or(RuntimeError::OutOfBoundsAccess {
                instr: instr_id,
                index: index as i64,
                len,
            })?;
            set_at_path(slot, rest, new_value, instr_id)
        }
        _ => Err(RuntimeError::Internal {
            reason: "pointer path descends into a non-aggregate value".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `fun main() { var x: i32 = 0; while (x < 10) { x = x + 1; } eat(x); }`
    /// expressed directly at the IR level as a phi-based loop: running to
    /// completion observes `[10]`.
    fn counting_loop() -> (Program, NodeId) {
        let mut program = Program::new();
        let i32_ty = program.types.integer(32);
        let func = program.declare_function("main", vec![], TypeId::VOID);
        let entry = program.add_block(func, None).unwrap();
        let header = program.add_block(func, None).unwrap();
        let body = program.add_block(func, None).unwrap();
        let exit_block = program.add_block(func, None).unwrap();

        program
            .add_instruction(entry, Op::Jump { target: header }, TypeId::VOID)
            .unwrap();

        let zero = program.const_int(32, 0);
        let ten = program.const_int(32, 10);
        let one = program.const_int(32, 1);

        let phi = program
            .add_instruction(
                header,
                Op::Phi {
                    ty: i32_ty,
                    sources: indexmap::IndexMap::new(),
                },
                i32_ty,
            )
            .unwrap();
        let cond = program
            .add_instruction(
                header,
                Op::BinaryOp { op: BinOp::Lt, l: phi, r: ten },
                TypeId::BOOL,
            )
            .unwrap();
        program
            .add_instruction(
                header,
                Op::Branch { cond, if_true: body, if_false: exit_block },
                TypeId::VOID,
            )
            .unwrap();

        let next = program
            .add_instruction(body, Op::BinaryOp { op: BinOp::Add, l: phi, r: one }, i32_ty)
            .unwrap();
        program
            .add_instruction(body, Op::Jump { target: header }, TypeId::VOID)
            .unwrap();

        program
            .mutate_op(phi, |op| {
                if let Op::Phi { sources, .. } = op {
                    sources.insert(entry, zero);
                    sources.insert(body, next);
                }
            })
            .unwrap();

        program
            .add_instruction(exit_block, Op::Eat { args: vec![phi] }, TypeId::VOID)
            .unwrap();
        program.add_instruction(exit_block, Op::Exit, TypeId::VOID).unwrap();

        (program, func)
    }

    #[test]
    fn counting_loop_observes_ten() {
        let (program, func) = counting_loop();
        let mut interp = Interpreter::new(&program, func, vec![], InterpreterConfig::default()).unwrap();
        interp.run_to_end().unwrap();
        assert_eq!(
            interp.observations(),
            &[Value::Integer { width: 32, value: 10 }]
        );
    }

    #[test]
    fn division_by_zero_traps() {
        let mut program = Program::new();
        let i32_ty = program.types.integer(32);
        let func = program.declare_function("main", vec![], i32_ty);
        let block = program.add_block(func, None).unwrap();
        let zero = program.const_int(32, 0);
        let one = program.const_int(32, 1);
        let div = program
            .add_instruction(block, Op::BinaryOp { op: BinOp::SDiv, l: one, r: zero }, i32_ty)
            .unwrap();
        program.add_instruction(block, Op::Return { value: div }, TypeId::VOID).unwrap();

        let mut interp = Interpreter::new(&program, func, vec![], InterpreterConfig::default()).unwrap();
        let err = interp.run_to_end().unwrap_err();
        assert!(matches!(err, RuntimeError::DivideByZero { .. }));
    }

    #[test]
    fn min_int_div_by_neg_one_traps() {
        let mut program = Program::new();
        let i32_ty = program.types.integer(32);
        let func = program.declare_function("main", vec![], i32_ty);
        let block = program.add_block(func, None).unwrap();
        let min = program.const_int(32, i32::MIN as i64);
        let neg_one = program.const_int(32, -1);
        let div = program
            .add_instruction(block, Op::BinaryOp { op: BinOp::SDiv, l: min, r: neg_one }, i32_ty)
            .unwrap();
        program.add_instruction(block, Op::Return { value: div }, TypeId::VOID).unwrap();

        let mut interp = Interpreter::new(&program, func, vec![], InterpreterConfig::default()).unwrap();
        let err = interp.run_to_end().unwrap_err();
        assert!(matches!(err, RuntimeError::SignedOverflow { .. }));
    }

    #[test]
    fn alloc_store_load_roundtrips() {
        let mut program = Program::new();
        let i32_ty = program.types.integer(32);
        let func = program.declare_function("main", vec![], i32_ty);
        let block = program.add_block(func, None).unwrap();
        let pointer_ty = program.types.pointer(i32_ty);
        let alloc = program.add_instruction(block, Op::Alloc { inner: i32_ty }, pointer_ty).unwrap();
        let forty_two = program.const_int(32, 42);
        program
            .add_instruction(block, Op::Store { pointer: alloc, value: forty_two }, TypeId::VOID)
            .unwrap();
        let loaded = program.add_instruction(block, Op::Load { pointer: alloc }, i32_ty).unwrap();
        program.add_instruction(block, Op::Return { value: loaded }, TypeId::VOID).unwrap();

        let mut interp = Interpreter::new(&program, func, vec![], InterpreterConfig::default()).unwrap();
        let result = interp.run_to_end().unwrap();
        assert_eq!(result, Value::Integer { width: 32, value: 42 });
    }

    #[test]
    fn call_binds_arguments_and_returns() {
        let mut program = Program::new();
        let i32_ty = program.types.integer(32);
        let add = program.declare_function("add", vec![i32_ty, i32_ty], i32_ty);
        let add_block = program.add_block(add, None).unwrap();
        let add_params = program.node(add).unwrap().as_function().unwrap().params.clone();
        let sum = program
            .add_instruction(
                add_block,
                Op::BinaryOp { op: BinOp::Add, l: add_params[0], r: add_params[1] },
                i32_ty,
            )
            .unwrap();
        program.add_instruction(add_block, Op::Return { value: sum }, TypeId::VOID).unwrap();

        let main = program.declare_function("main", vec![], i32_ty);
        let main_block = program.add_block(main, None).unwrap();
        let one = program.const_int(32, 1);
        let two = program.const_int(32, 2);
        let call = program
            .add_instruction(main_block, Op::Call { target: add, args: vec![one, two] }, i32_ty)
            .unwrap();
        program.add_instruction(main_block, Op::Return { value: call }, TypeId::VOID).unwrap();

        let mut interp = Interpreter::new(&program, main, vec![], InterpreterConfig::default()).unwrap();
        let result = interp.run_to_end().unwrap();
        assert_eq!(result, Value::Integer { width: 32, value: 3 });
    }
}
