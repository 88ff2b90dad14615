//! AST-to-IR lowering: a single left-to-right recursive traversal that
//! builds IR blocks as it walks statements and expressions.

use std::collections::HashMap;

use lll_core::{BinOp, NodeId, Op, Program as LllProgram, Type, TypeId, UnOp};
use tracing::{debug, trace, warn};

use crate::ast::{
    Assignment, BinaryOpType, CodeBlock, Declaration, Expression, Function as AstFunction,
    IfStatement, Program as AstProgram, SourcePosition, Statement, Struct as AstStruct,
    TopLevel, TypeAnnotation, UnaryOpType, WhileStatement,
};
use crate::error::LowerError;

pub type LowerResult<T> = Result<T, LowerError>;

#[derive(Debug, Clone)]
struct FunctionInfo {
    id: NodeId,
    param_types: Vec<TypeId>,
    return_type: TypeId,
}

#[derive(Debug, Clone)]
struct StructInfo {
    type_id: TypeId,
    fields: Vec<(String, TypeId)>,
    methods: HashMap<String, FunctionInfo>,
}

#[derive(Debug, Clone, Copy)]
enum Binding {
    /// A stack slot: `ptr` has type `Pointer(ty)`.
    Slot { ptr: NodeId, ty: TypeId, mutable: bool },
    /// An immediate SSA value already in scope (parameters).
    Value { value: NodeId, ty: TypeId },
}

struct LoopRecord {
    continue_target: NodeId,
    break_target: NodeId,
}

struct FnCtx {
    function: NodeId,
    entry: NodeId,
    /// `None` marks unreachable fall-through.
    current_block: Option<NodeId>,
    scopes: Vec<HashMap<String, Binding>>,
    loops: Vec<LoopRecord>,
    return_type: TypeId,
    this_ptr: Option<(NodeId, TypeId)>,
}

/// Lowers a whole AST program into an IR [`LllProgram`]. On success the
/// program's `entry` is set to the `main` function if one was declared.
pub fn lower_program(ast: &AstProgram) -> LowerResult<LllProgram> {
    let lowerer = Lowerer {
        program: LllProgram::new(),
        functions: HashMap::new(),
        structs: HashMap::new(),
    };
    lowerer.run(ast).map_err(|e| {
        warn!(error = %e, "lowering failed");
        e
    })
}

struct Lowerer {
    program: LllProgram,
    functions: HashMap<String, FunctionInfo>,
    structs: HashMap<String, StructInfo>,
}

impl Lowerer {
    fn run(mut self, ast: &AstProgram) -> LowerResult<LllProgram> {
        for top in &ast.toplevels {
            if let TopLevel::Struct(s) = top {
                self.declare_struct(s)?;
            }
        }
        for top in &ast.toplevels {
            match top {
                TopLevel::Function(f) => self.declare_function(f, None)?,
                TopLevel::Struct(s) => {
                    let info = self.structs.get(&s.name).expect("struct pre-declared").clone();
                    for method in &s.methods {
                        self.declare_function(method, Some((s.name.as_str(), info.type_id)))?;
                    }
                }
            }
        }
        for top in &ast.toplevels {
            match top {
                TopLevel::Function(f) => self.lower_function(f, None)?,
                TopLevel::Struct(s) => {
                    let info = self.structs.get(&s.name).expect("struct pre-declared").clone();
                    for method in &s.methods {
                        self.lower_function(method, Some((s.name.as_str(), info.type_id)))?;
                    }
                }
            }
        }
        if let Some(main) = self.functions.get("main") {
            self.program.entry = Some(main.id);
        }
        Ok(self.program)
    }

    fn declare_struct(&mut self, s: &AstStruct) -> LowerResult<()> {
        let mut fields = Vec::with_capacity(s.properties.len());
        for prop in &s.properties {
            let ty = self.resolve_type(&prop.ty, s.pos)?;
            fields.push((prop.name.clone(), ty));
        }
        let field_types: Vec<TypeId> = fields.iter().map(|(_, t)| *t).collect();
        let type_id = self.program.types.struct_type(s.name.clone(), field_types);
        self.structs.insert(
            s.name.clone(),
            StructInfo {
                type_id,
                fields,
                methods: HashMap::new(),
            },
        );
        Ok(())
    }

    fn declare_function(
        &mut self,
        f: &AstFunction,
        method_of: Option<(&str, TypeId)>,
    ) -> LowerResult<()> {
        let mut param_types = Vec::with_capacity(f.params.len() + 1);
        if let Some((_, struct_ty)) = method_of {
            param_types.push(self.program.types.pointer(struct_ty));
        }
        for p in &f.params {
            param_types.push(self.resolve_type(&p.ty, f.pos)?);
        }
        let return_type = match &f.ret_type {
            Some(t) => self.resolve_type(t, f.pos)?,
            None => TypeId::VOID,
        };
        let id = self
            .program
            .declare_function(qualified_name(method_of, &f.name), param_types.clone(), return_type);
        let info = FunctionInfo {
            id,
            param_types,
            return_type,
        };
        match method_of {
            Some((struct_name, _)) => {
                self.structs
                    .get_mut(struct_name)
                    .expect("struct pre-declared")
                    .methods
                    .insert(f.name.clone(), info);
            }
            None => {
                if self.functions.insert(f.name.clone(), info).is_some() {
                    return Err(LowerError::DuplicateDeclaration {
                        name: f.name.clone(),
                        pos: f.pos,
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve_type(&mut self, ann: &TypeAnnotation, pos: SourcePosition) -> LowerResult<TypeId> {
        match ann {
            TypeAnnotation::Simple(name) => match name.as_str() {
                "void" => Ok(TypeId::VOID),
                "bool" => Ok(self.program.types.bool()),
                "i1" => Ok(self.program.types.integer(1)),
                "i8" => Ok(self.program.types.integer(8)),
                "i16" => Ok(self.program.types.integer(16)),
                "i32" => Ok(self.program.types.integer(32)),
                "i64" => Ok(self.program.types.integer(64)),
                other => self
                    .structs
                    .get(other)
                    .map(|s| s.type_id)
                    .ok_or_else(|| LowerError::IllegalType {
                        name: other.to_string(),
                        pos,
                    }),
            },
            TypeAnnotation::Function(params, ret) => {
                let mut param_ids = Vec::with_capacity(params.len());
                for p in params {
                    param_ids.push(self.resolve_type(p, pos)?);
                }
                let ret_id = self.resolve_type(ret, pos)?;
                Ok(self.program.types.function(param_ids, ret_id))
            }
            TypeAnnotation::Array(inner, size) => {
                let inner_id = self.resolve_type(inner, pos)?;
                Ok(self.program.types.array(inner_id, *size))
            }
        }
    }

    fn lower_function(
        &mut self,
        f: &AstFunction,
        method_of: Option<(&str, TypeId)>,
    ) -> LowerResult<()> {
        let info = match method_of {
            Some((struct_name, _)) => self.structs[struct_name].methods[&f.name].clone(),
            None => self.functions[&f.name].clone(),
        };
        let entry = self
            .program
            .add_block(info.id, Some("entry".to_string()))
            .expect("function node exists");
        let mut fn_ctx = FnCtx {
            function: info.id,
            entry,
            current_block: Some(entry),
            scopes: vec![HashMap::new()],
            loops: Vec::new(),
            return_type: info.return_type,
            this_ptr: None,
        };

        let params = self
            .program
            .node(info.id)
            .expect("function node exists")
            .as_function()
            .expect("is a function")
            .params
            .clone();

        let param_offset = if let Some((_, struct_ty)) = method_of {
            fn_ctx.this_ptr = Some((params[0], struct_ty));
            1
        } else {
            0
        };
        for (i, p) in f.params.iter().enumerate() {
            let node_param = params[i + param_offset];
            let ty = info.param_types[i + param_offset];
            fn_ctx
                .scopes
                .last_mut()
                .unwrap()
                .insert(p.name.clone(), Binding::Value { value: node_param, ty });
        }

        self.lower_block(&mut fn_ctx, &f.body)?;

        if fn_ctx.current_block.is_some() {
            if info.return_type == TypeId::VOID {
                let v = self.program.void();
                self.terminate(&mut fn_ctx, Op::Return { value: v });
            } else {
                return Err(LowerError::MissingReturn {
                    name: f.name.clone(),
                    pos: f.pos,
                });
            }
        }
        Ok(())
    }

    fn lower_block(&mut self, fn_ctx: &mut FnCtx, block: &CodeBlock) -> LowerResult<()> {
        fn_ctx.scopes.push(HashMap::new());
        for stmt in &block.statements {
            if fn_ctx.current_block.is_none() {
                break;
            }
            self.lower_statement(fn_ctx, stmt)?;
        }
        fn_ctx.scopes.pop();
        Ok(())
    }

    fn lower_statement(&mut self, fn_ctx: &mut FnCtx, stmt: &Statement) -> LowerResult<()> {
        trace!(kind = statement_kind(stmt), "lowering statement");
        match stmt {
            Statement::Declaration(d) => self.lower_declaration(fn_ctx, d),
            Statement::Assignment(a) => self.lower_assignment(fn_ctx, a),
            Statement::If(i) => self.lower_if(fn_ctx, i),
            Statement::While(w) => self.lower_while(fn_ctx, w),
            Statement::Return(r) => {
                let value = match &r.value {
                    Some(e) => {
                        let (v, ty) = self.lower_rvalue(fn_ctx, e)?;
                        if ty != fn_ctx.return_type {
                            return Err(LowerError::TypeMismatch {
                                expected: self.program.types.display(fn_ctx.return_type),
                                actual: self.program.types.display(ty),
                                pos: r.pos,
                            });
                        }
                        v
                    }
                    None => {
                        if fn_ctx.return_type != TypeId::VOID {
                            return Err(LowerError::TypeMismatch {
                                expected: self.program.types.display(fn_ctx.return_type),
                                actual: "void".to_string(),
                                pos: r.pos,
                            });
                        }
                        self.program.void()
                    }
                };
                self.terminate(fn_ctx, Op::Return { value });
                Ok(())
            }
            Statement::Break(pos) => {
                let target = fn_ctx
                    .loops
                    .last()
                    .ok_or(LowerError::BreakOutsideLoop { pos: *pos })?
                    .break_target;
                self.terminate(fn_ctx, Op::Jump { target });
                Ok(())
            }
            Statement::Continue(pos) => {
                let target = fn_ctx
                    .loops
                    .last()
                    .ok_or(LowerError::ContinueOutsideLoop { pos: *pos })?
                    .continue_target;
                self.terminate(fn_ctx, Op::Jump { target });
                Ok(())
            }
            Statement::Expression(e) => {
                self.lower_rvalue(fn_ctx, e)?;
                Ok(())
            }
        }
    }

    fn lower_declaration(&mut self, fn_ctx: &mut FnCtx, d: &Declaration) -> LowerResult<()> {
        if fn_ctx
            .scopes
            .last()
            .expect("at least one scope")
            .contains_key(&d.identifier)
        {
            return Err(LowerError::DuplicateDeclaration {
                name: d.identifier.clone(),
                pos: d.pos,
            });
        }
        let value = match &d.value {
            Some(e) => Some(self.lower_rvalue(fn_ctx, e)?),
            None => None,
        };
        let ty = match (&d.ty, &value) {
            (Some(ann), _) => self.resolve_type(ann, d.pos)?,
            (None, Some((_, vty))) => *vty,
            (None, None) => {
                return Err(LowerError::MissingTypeDeclaration {
                    name: d.identifier.clone(),
                    pos: d.pos,
                })
            }
        };
        if let Some((_, vty)) = value {
            if vty != ty {
                return Err(LowerError::TypeMismatch {
                    expected: self.program.types.display(ty),
                    actual: self.program.types.display(vty),
                    pos: d.pos,
                });
            }
        }
        let ptr_ty = self.program.types.pointer(ty);
        let current = fn_ctx.current_block.expect("declaration in a live block");
        let alloc = self
            .program
            .add_instruction(current, Op::Alloc { inner: ty }, ptr_ty)
            .expect("current block exists");
        self.hoist_to_entry(fn_ctx, alloc, current);

        let init = match value {
            Some((v, _)) => v,
            None => self.program.undef(ty),
        };
        let current = fn_ctx.current_block.expect("declaration in a live block");
        self.program
            .add_instruction(current, Op::Store { pointer: alloc, value: init }, TypeId::VOID)
            .expect("current block exists");

        fn_ctx.scopes.last_mut().unwrap().insert(
            d.identifier.clone(),
            Binding::Slot {
                ptr: alloc,
                ty,
                mutable: d.mutable,
            },
        );
        Ok(())
    }

    /// Moves a just-created `Alloc` from wherever it was appended into the
    /// function's entry block, ahead of its terminator, so every stack slot
    /// dominates all of its uses.
    fn hoist_to_entry(&mut self, fn_ctx: &FnCtx, alloc: NodeId, from_block: NodeId) {
        if from_block == fn_ctx.entry {
            return;
        }
        {
            let block = self
                .program
                .node_mut(from_block)
                .expect("block exists")
                .as_block_mut()
                .expect("is a block");
            block.instructions.retain(|&i| i != alloc);
        }
        {
            let entry_block = self
                .program
                .node_mut(fn_ctx.entry)
                .expect("entry exists")
                .as_block_mut()
                .expect("is a block");
            let has_terminator = entry_block
                .instructions
                .last()
                .map(|&t| {
                    self.program
                        .node(t)
                        .expect("instruction exists")
                        .as_instruction()
                        .expect("is an instruction")
                        .op
                        .is_terminator()
                })
                .unwrap_or(false);
            let insert_at = if has_terminator {
                entry_block.instructions.len() - 1
            } else {
                entry_block.instructions.len()
            };
            entry_block.instructions.insert(insert_at, alloc);
        }
        self.program
            .node_mut(alloc)
            .expect("alloc exists")
            .as_instruction_mut()
            .expect("is an instruction")
            .block = fn_ctx.entry;
    }

    fn lower_assignment(&mut self, fn_ctx: &mut FnCtx, a: &Assignment) -> LowerResult<()> {
        let (ptr, ty, mutable, name) = self.lower_lvalue(fn_ctx, &a.target)?;
        if !mutable {
            return Err(LowerError::AssignToImmutable {
                name: name.unwrap_or_default(),
                pos: a.pos,
            });
        }
        let (value, vty) = self.lower_rvalue(fn_ctx, &a.value)?;
        if vty != ty {
            return Err(LowerError::TypeMismatch {
                expected: self.program.types.display(ty),
                actual: self.program.types.display(vty),
                pos: a.pos,
            });
        }
        let current = fn_ctx.current_block.expect("assignment in a live block");
        self.program
            .add_instruction(current, Op::Store { pointer: ptr, value }, TypeId::VOID)
            .expect("current block exists");
        Ok(())
    }

    fn lower_if(&mut self, fn_ctx: &mut FnCtx, i: &IfStatement) -> LowerResult<()> {
        let (cond, cond_ty) = self.lower_rvalue(fn_ctx, &i.condition)?;
        if cond_ty != self.program.types.bool() {
            return Err(LowerError::TypeMismatch {
                expected: "bool".to_string(),
                actual: self.program.types.display(cond_ty),
                pos: i.pos,
            });
        }
        let then_b = self.program.add_block(fn_ctx.function, None).expect("function exists");
        let else_b = self.program.add_block(fn_ctx.function, None).expect("function exists");
        self.terminate(fn_ctx, Op::Branch { cond, if_true: then_b, if_false: else_b });

        fn_ctx.current_block = Some(then_b);
        self.lower_block(fn_ctx, &i.then_branch)?;
        let then_end = fn_ctx.current_block;

        fn_ctx.current_block = Some(else_b);
        if let Some(else_branch) = &i.else_branch {
            self.lower_block(fn_ctx, else_branch)?;
        }
        let else_end = fn_ctx.current_block;

        match (then_end, else_end) {
            (None, None) => fn_ctx.current_block = None,
            _ => {
                let end_b = self.program.add_block(fn_ctx.function, None).expect("function exists");
                if let Some(b) = then_end {
                    self.jump_from(b, end_b);
                }
                if let Some(b) = else_end {
                    self.jump_from(b, end_b);
                }
                fn_ctx.current_block = Some(end_b);
            }
        }
        Ok(())
    }

    fn lower_while(&mut self, fn_ctx: &mut FnCtx, w: &WhileStatement) -> LowerResult<()> {
        let header = self.program.add_block(fn_ctx.function, None).expect("function exists");
        let body = self.program.add_block(fn_ctx.function, None).expect("function exists");
        let end = self.program.add_block(fn_ctx.function, None).expect("function exists");

        self.terminate(fn_ctx, Op::Jump { target: header });

        fn_ctx.current_block = Some(header);
        let (cond, cond_ty) = self.lower_rvalue(fn_ctx, &w.condition)?;
        if cond_ty != self.program.types.bool() {
            return Err(LowerError::TypeMismatch {
                expected: "bool".to_string(),
                actual: self.program.types.display(cond_ty),
                pos: w.pos,
            });
        }
        self.terminate(fn_ctx, Op::Branch { cond, if_true: body, if_false: end });

        fn_ctx.loops.push(LoopRecord {
            continue_target: header,
            break_target: end,
        });
        fn_ctx.current_block = Some(body);
        self.lower_block(fn_ctx, &w.body)?;
        if let Some(b) = fn_ctx.current_block {
            self.jump_from(b, header);
        }
        fn_ctx.loops.pop();

        fn_ctx.current_block = Some(end);
        Ok(())
    }

    /// Terminates `fn_ctx`'s current block with `op` and marks the frame
    /// unreachable afterward; callers that need control to continue (e.g.
    /// branching into a fresh block) reset `current_block` themselves.
    fn terminate(&mut self, fn_ctx: &mut FnCtx, op: Op) {
        let current = fn_ctx.current_block.expect("terminate called on a live block");
        self.program
            .add_instruction(current, op, TypeId::VOID)
            .expect("current block exists");
        fn_ctx.current_block = None;
    }

    fn jump_from(&mut self, block: NodeId, target: NodeId) {
        self.program
            .add_instruction(block, Op::Jump { target }, TypeId::VOID)
            .expect("block exists");
    }

    /// Resolves `expr` to a pointer: `(pointer, pointee_type, mutable, name)`.
    /// `name` is populated only for plain identifiers, for error messages.
    fn lower_lvalue(
        &mut self,
        fn_ctx: &mut FnCtx,
        expr: &Expression,
    ) -> LowerResult<(NodeId, TypeId, bool, Option<String>)> {
        match expr {
            Expression::Identifier { name, pos } => {
                for scope in fn_ctx.scopes.iter().rev() {
                    if let Some(Binding::Slot { ptr, ty, mutable }) = scope.get(name) {
                        return Ok((*ptr, *ty, *mutable, Some(name.clone())));
                    }
                    if scope.contains_key(name) {
                        return Err(LowerError::IllegalAssignTarget { pos: *pos });
                    }
                }
                Err(LowerError::UnknownIdentifier {
                    name: name.clone(),
                    pos: *pos,
                })
            }
            Expression::This { pos } => fn_ctx
                .this_ptr
                .map(|(ptr, ty)| (ptr, ty, true, None))
                .ok_or(LowerError::NotInObjectScope { pos: *pos }),
            Expression::DotIndex { target, name, pos } => {
                let (base_ptr, base_ty, _, _) = self.lower_lvalue(fn_ctx, target)?;
                let (_, fields) = self.struct_fields(base_ty, *pos)?;
                let index = fields
                    .iter()
                    .position(|(fname, _)| fname == name)
                    .ok_or_else(|| LowerError::IllegalDotIndexTarget { pos: *pos })?;
                let field_ty = fields[index].1;
                let current = fn_ctx.current_block.expect("dot-index in a live block");
                let ptr_ty = self.program.types.pointer(field_ty);
                let ptr = self
                    .program
                    .add_instruction(
                        current,
                        Op::GetSubPointerStruct {
                            target: base_ptr,
                            index: index as u32,
                        },
                        ptr_ty,
                    )
                    .expect("current block exists");
                Ok((ptr, field_ty, true, None))
            }
            Expression::ArrayIndex { target, index, pos } => {
                let (base_ptr, base_ty, _, _) = self.lower_lvalue(fn_ctx, target)?;
                let inner = match self.program.types.try_get(base_ty) {
                    Some(Type::Array(inner, _)) => *inner,
                    _ => return Err(LowerError::IllegalDotIndexTarget { pos: *pos }),
                };
                let (index_value, index_ty) = self.lower_rvalue(fn_ctx, index)?;
                if !matches!(self.program.types.try_get(index_ty), Some(Type::Integer(_))) {
                    return Err(LowerError::TypeMismatch {
                        expected: "integer".to_string(),
                        actual: self.program.types.display(index_ty),
                        pos: *pos,
                    });
                }
                let current = fn_ctx.current_block.expect("array-index in a live block");
                let ptr_ty = self.program.types.pointer(inner);
                let ptr = self
                    .program
                    .add_instruction(
                        current,
                        Op::GetSubPointerArray {
                            target: base_ptr,
                            index: index_value,
                        },
                        ptr_ty,
                    )
                    .expect("current block exists");
                Ok((ptr, inner, true, None))
            }
            other => Err(LowerError::IllegalAssignTarget { pos: other.pos() }),
        }
    }

    fn struct_fields(
        &self,
        ty: TypeId,
        pos: SourcePosition,
    ) -> LowerResult<(String, Vec<(String, TypeId)>)> {
        match self.program.types.try_get(ty) {
            Some(Type::Struct(name, _)) => {
                let info = self
                    .structs
                    .get(name)
                    .unwrap_or_else(|| panic!("struct type {name} not registered"));
                Ok((name.clone(), info.fields.clone()))
            }
            _ => Err(LowerError::IllegalDotIndexTarget { pos }),
        }
    }

    fn lower_rvalue(&mut self, fn_ctx: &mut FnCtx, expr: &Expression) -> LowerResult<(NodeId, TypeId)> {
        match expr {
            Expression::Number { value, .. } => {
                let i32_ty = self.program.types.integer(32);
                Ok((self.program.const_int(32, *value), i32_ty))
            }
            Expression::Boolean { value, .. } => {
                let bool_ty = self.program.types.bool();
                Ok((self.program.const_bool(*value), bool_ty))
            }
            Expression::Identifier { name, pos } => {
                for scope in fn_ctx.scopes.iter().rev() {
                    match scope.get(name) {
                        Some(Binding::Value { value, ty }) => return Ok((*value, *ty)),
                        Some(Binding::Slot { ptr, ty, .. }) => {
                            let current = fn_ctx.current_block.expect("identifier use in a live block");
                            let loaded = self
                                .program
                                .add_instruction(current, Op::Load { pointer: *ptr }, *ty)
                                .expect("current block exists");
                            return Ok((loaded, *ty));
                        }
                        None => {}
                    }
                }
                if let Some(info) = self.functions.get(name) {
                    let fn_ty = self.program.types.function(info.param_types.clone(), info.return_type);
                    return Ok((info.id, fn_ty));
                }
                Err(LowerError::UnknownIdentifier {
                    name: name.clone(),
                    pos: *pos,
                })
            }
            Expression::This { pos } => {
                let (ptr, ty, _, _) = self.lower_lvalue(fn_ctx, &Expression::This { pos: *pos })?;
                let current = fn_ctx.current_block.expect("this use in a live block");
                let loaded = self
                    .program
                    .add_instruction(current, Op::Load { pointer: ptr }, ty)
                    .expect("current block exists");
                Ok((loaded, ty))
            }
            Expression::DotIndex { .. } | Expression::ArrayIndex { .. } => {
                let (ptr, ty, _, _) = self.lower_lvalue(fn_ctx, expr)?;
                let current = fn_ctx.current_block.expect("member access in a live block");
                let loaded = self
                    .program
                    .add_instruction(current, Op::Load { pointer: ptr }, ty)
                    .expect("current block exists");
                Ok((loaded, ty))
            }
            Expression::UnaryOp { op, v, pos } => {
                let (value, ty) = self.lower_rvalue(fn_ctx, v)?;
                if !matches!(self.program.types.try_get(ty), Some(Type::Integer(_))) {
                    return Err(LowerError::TypeMismatch {
                        expected: "integer".to_string(),
                        actual: self.program.types.display(ty),
                        pos: *pos,
                    });
                }
                let op = match op {
                    UnaryOpType::Neg => UnOp::Neg,
                    UnaryOpType::Not => UnOp::Not,
                };
                let current = fn_ctx.current_block.expect("unary op in a live block");
                let id = self
                    .program
                    .add_instruction(current, Op::UnaryOp { op, v: value }, ty)
                    .expect("current block exists");
                Ok((id, ty))
            }
            Expression::BinaryOp { op, l, r, pos } => {
                let (lval, lty) = self.lower_rvalue(fn_ctx, l)?;
                let (rval, rty) = self.lower_rvalue(fn_ctx, r)?;
                if lty != rty || !matches!(self.program.types.try_get(lty), Some(Type::Integer(_))) {
                    return Err(LowerError::TypeMismatch {
                        expected: self.program.types.display(lty),
                        actual: self.program.types.display(rty),
                        pos: *pos,
                    });
                }
                let bin_op = map_binary_op(*op);
                let result_ty = if bin_op.is_comparison() {
                    self.program.types.bool()
                } else {
                    lty
                };
                let current = fn_ctx.current_block.expect("binary op in a live block");
                let id = self
                    .program
                    .add_instruction(current, Op::BinaryOp { op: bin_op, l: lval, r: rval }, result_ty)
                    .expect("current block exists");
                Ok((id, result_ty))
            }
            Expression::ArrayInitializer { values, pos } => {
                let mut element_ids = Vec::with_capacity(values.len());
                let mut element_ty = None;
                for v in values {
                    let (id, ty) = self.lower_rvalue(fn_ctx, v)?;
                    match element_ty {
                        None => element_ty = Some(ty),
                        Some(expected) if expected != ty => {
                            return Err(LowerError::TypeMismatch {
                                expected: self.program.types.display(expected),
                                actual: self.program.types.display(ty),
                                pos: *pos,
                            })
                        }
                        _ => {}
                    }
                    element_ids.push(id);
                }
                let inner = element_ty.unwrap_or(TypeId::VOID);
                let array_ty = self.program.types.array(inner, element_ids.len() as u32);
                let current = fn_ctx.current_block.expect("array initializer in a live block");
                let id = self
                    .program
                    .add_instruction(current, Op::AggregateValue { ty: array_ty, values: element_ids }, array_ty)
                    .expect("current block exists");
                Ok((id, array_ty))
            }
            Expression::Call { target, args, pos } => self.lower_call(fn_ctx, target, args, *pos),
        }
    }

    fn lower_call(
        &mut self,
        fn_ctx: &mut FnCtx,
        target: &Expression,
        args: &[Expression],
        pos: SourcePosition,
    ) -> LowerResult<(NodeId, TypeId)> {
        if let Expression::Identifier { name, .. } = target {
            match name.as_str() {
                "eat" => {
                    let mut arg_ids = Vec::with_capacity(args.len());
                    for a in args {
                        arg_ids.push(self.lower_rvalue(fn_ctx, a)?.0);
                    }
                    let current = fn_ctx.current_block.expect("call in a live block");
                    let id = self
                        .program
                        .add_instruction(current, Op::Eat { args: arg_ids }, TypeId::VOID)
                        .expect("current block exists");
                    return Ok((id, TypeId::VOID));
                }
                "blur" => {
                    if args.len() != 1 {
                        return Err(LowerError::ArgumentMismatch {
                            expected: 1,
                            actual: args.len(),
                            pos,
                        });
                    }
                    let (value, ty) = self.lower_rvalue(fn_ctx, &args[0])?;
                    let current = fn_ctx.current_block.expect("call in a live block");
                    let id = self
                        .program
                        .add_instruction(current, Op::Blur { v: value }, ty)
                        .expect("current block exists");
                    return Ok((id, ty));
                }
                _ => {}
            }

            if let Some(info) = self.structs.get(name).cloned() {
                if info.fields.len() != args.len() {
                    return Err(LowerError::ArgumentMismatch {
                        expected: info.fields.len(),
                        actual: args.len(),
                        pos,
                    });
                }
                let mut values = Vec::with_capacity(args.len());
                for (arg, (_, field_ty)) in args.iter().zip(&info.fields) {
                    let (v, vty) = self.lower_rvalue(fn_ctx, arg)?;
                    if vty != *field_ty {
                        return Err(LowerError::TypeMismatch {
                            expected: self.program.types.display(*field_ty),
                            actual: self.program.types.display(vty),
                            pos,
                        });
                    }
                    values.push(v);
                }
                let current = fn_ctx.current_block.expect("call in a live block");
                let id = self
                    .program
                    .add_instruction(
                        current,
                        Op::AggregateValue { ty: info.type_id, values },
                        info.type_id,
                    )
                    .expect("current block exists");
                return Ok((id, info.type_id));
            }

            if let Some(info) = self.functions.get(name).cloned() {
                return self.lower_call_to(fn_ctx, info, args, None, pos);
            }

            return Err(LowerError::UnknownIdentifier {
                name: name.clone(),
                pos,
            });
        }

        if let Expression::DotIndex { target: obj, name: method, .. } = target {
            let (obj_ptr, obj_ty, _, _) = self.lower_lvalue(fn_ctx, obj)?;
            let (struct_name, _) = self.struct_fields(obj_ty, pos)?;
            let info = self
                .structs
                .get(&struct_name)
                .and_then(|s| s.methods.get(method))
                .cloned()
                .ok_or(LowerError::IllegalCallTarget { pos })?;
            return self.lower_call_to(fn_ctx, info, args, Some(obj_ptr), pos);
        }

        Err(LowerError::IllegalCallTarget { pos })
    }

    fn lower_call_to(
        &mut self,
        fn_ctx: &mut FnCtx,
        info: FunctionInfo,
        args: &[Expression],
        this_arg: Option<NodeId>,
        pos: SourcePosition,
    ) -> LowerResult<(NodeId, TypeId)> {
        let expected = info.param_types.len() - this_arg.map_or(0, |_| 1);
        if expected != args.len() {
            return Err(LowerError::ArgumentMismatch {
                expected,
                actual: args.len(),
                pos,
            });
        }
        let mut arg_ids = Vec::with_capacity(info.param_types.len());
        arg_ids.extend(this_arg);
        let param_offset = this_arg.map_or(0, |_| 1);
        for (arg, expected_ty) in args.iter().zip(&info.param_types[param_offset..]) {
            let (v, vty) = self.lower_rvalue(fn_ctx, arg)?;
            if vty != *expected_ty {
                return Err(LowerError::TypeMismatch {
                    expected: self.program.types.display(*expected_ty),
                    actual: self.program.types.display(vty),
                    pos,
                });
            }
            arg_ids.push(v);
        }
        let current = fn_ctx.current_block.expect("call in a live block");
        debug!(callee = %info.id, "lowering call");
        let id = self
            .program
            .add_instruction(current, Op::Call { target: info.id, args: arg_ids }, info.return_type)
            .expect("current block exists");
        Ok((id, info.return_type))
    }
}

fn statement_kind(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Declaration(_) => "declaration",
        Statement::Assignment(_) => "assignment",
        Statement::If(_) => "if",
        Statement::While(_) => "while",
        Statement::Return(_) => "return",
        Statement::Break(_) => "break",
        Statement::Continue(_) => "continue",
        Statement::Expression(_) => "expression",
    }
}

fn map_binary_op(op: BinaryOpType) -> BinOp {
    match op {
        BinaryOpType::Add => BinOp::Add,
        BinaryOpType::Sub => BinOp::Sub,
        BinaryOpType::Mul => BinOp::Mul,
        BinaryOpType::Div => BinOp::SDiv,
        BinaryOpType::Rem => BinOp::SRem,
        BinaryOpType::And | BinaryOpType::LogicalAnd => BinOp::And,
        BinaryOpType::Or | BinaryOpType::LogicalOr => BinOp::Or,
        BinaryOpType::Xor => BinOp::Xor,
        BinaryOpType::Shl => BinOp::Shl,
        BinaryOpType::Shr => BinOp::Shr,
        BinaryOpType::Eq => BinOp::Eq,
        BinaryOpType::Ne => BinOp::Ne,
        BinaryOpType::Lt => BinOp::Lt,
        BinaryOpType::Le => BinOp::Le,
        BinaryOpType::Gt => BinOp::Gt,
        BinaryOpType::Ge => BinOp::Ge,
    }
}

fn qualified_name(method_of: Option<(&str, TypeId)>, name: &str) -> String {
    match method_of {
        Some((struct_name, _)) => format!("{struct_name}.{name}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn pos() -> SourcePosition {
        SourcePosition::default()
    }

    fn number(v: i64) -> Expression {
        Expression::Number { value: v, pos: pos() }
    }

    fn ident(name: &str) -> Expression {
        Expression::Identifier { name: name.to_string(), pos: pos() }
    }

    /// `fun main() { var x: i32 = 2; var y: i32 = x * 3 + 4; eat(y); }`
    fn constant_fold_source() -> AstProgram {
        AstProgram {
            toplevels: vec![TopLevel::Function(AstFunction {
                name: "main".to_string(),
                params: vec![],
                ret_type: None,
                pos: pos(),
                body: CodeBlock {
                    statements: vec![
                        Statement::Declaration(Declaration {
                            identifier: "x".to_string(),
                            mutable: false,
                            ty: Some(TypeAnnotation::Simple("i32".to_string())),
                            value: Some(number(2)),
                            pos: pos(),
                        }),
                        Statement::Declaration(Declaration {
                            identifier: "y".to_string(),
                            mutable: false,
                            ty: Some(TypeAnnotation::Simple("i32".to_string())),
                            value: Some(Expression::BinaryOp {
                                op: BinaryOpType::Add,
                                l: Box::new(Expression::BinaryOp {
                                    op: BinaryOpType::Mul,
                                    l: Box::new(ident("x")),
                                    r: Box::new(number(3)),
                                    pos: pos(),
                                }),
                                r: Box::new(number(4)),
                                pos: pos(),
                            }),
                            pos: pos(),
                        }),
                        Statement::Expression(Expression::Call {
                            target: Box::new(ident("eat")),
                            args: vec![ident("y")],
                            pos: pos(),
                        }),
                    ],
                },
            })],
        }
    }

    #[test]
    fn lowers_constant_fold_scenario_without_error() {
        let program = lower_program(&constant_fold_source()).unwrap();
        assert!(program.entry.is_some());
        let main = program.entry.unwrap();
        let func = program.node(main).unwrap().as_function().unwrap();
        assert_eq!(func.blocks.len(), 1);
    }

    #[test]
    fn unknown_identifier_reports_position() {
        let ast = AstProgram {
            toplevels: vec![TopLevel::Function(AstFunction {
                name: "main".to_string(),
                params: vec![],
                ret_type: None,
                pos: pos(),
                body: CodeBlock {
                    statements: vec![Statement::Expression(Expression::Call {
                        target: Box::new(ident("eat")),
                        args: vec![ident("missing")],
                        pos: pos(),
                    })],
                },
            })],
        };
        let err = lower_program(&ast).unwrap_err();
        assert!(matches!(err, LowerError::UnknownIdentifier { .. }));
    }

    #[test]
    fn assigning_to_val_is_rejected() {
        let ast = AstProgram {
            toplevels: vec![TopLevel::Function(AstFunction {
                name: "main".to_string(),
                params: vec![],
                ret_type: None,
                pos: pos(),
                body: CodeBlock {
                    statements: vec![
                        Statement::Declaration(Declaration {
                            identifier: "x".to_string(),
                            mutable: false,
                            ty: Some(TypeAnnotation::Simple("i32".to_string())),
                            value: Some(number(1)),
                            pos: pos(),
                        }),
                        Statement::Assignment(Assignment {
                            target: ident("x"),
                            value: number(2),
                            pos: pos(),
                        }),
                    ],
                },
            })],
        };
        let err = lower_program(&ast).unwrap_err();
        assert!(matches!(err, LowerError::AssignToImmutable { .. }));
    }
}
