//! Renders a [`Program`] to the textual IR. Every distinct struct
//! type reachable from any node's type is declared up front, in dependency
//! order, followed by an optional `entry` directive and then each function
//! in the program's own order.

use std::collections::HashSet;

use lll_core::{ConstValue, NameEnv, NodeId, NodeKind, Op, Program, Type, TypeId};

pub fn print(program: &Program) -> String {
    let names = NameEnv::build(program);
    let mut out = String::new();

    let struct_order = collect_struct_order(program);
    for ty in &struct_order {
        if let Type::Struct(name, fields) = program.types.get(*ty) {
            let fields_text = fields
                .iter()
                .map(|f| render_type(program, *f))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("struct {name} {{ {fields_text} }}\n"));
        }
    }
    if !struct_order.is_empty() {
        out.push('\n');
    }

    if let Some(entry) = program.entry {
        if let Some(func) = program.node(entry).ok().and_then(|n| n.as_function()) {
            out.push_str(&format!("entry @{}\n\n", func.name));
        }
    }

    for (idx, &func_id) in program.functions.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        print_function(&mut out, program, &names, func_id);
    }

    out
}

/// Renders a type the same way `TypeInterner::display` does, except arrays
/// use `array<T, N>` instead of `[T; N]` -- the text grammar reserves `;` as
/// the instruction terminator, so `[T; N]` would be ambiguous to parse.
pub fn render_type(program: &Program, ty: TypeId) -> String {
    match program.types.get(ty) {
        Type::Void => "void".to_string(),
        Type::Block => "block".to_string(),
        Type::Integer(1) => "bool".to_string(),
        Type::Integer(w) => format!("i{w}"),
        Type::Pointer(inner) => format!("ptr<{}>", render_type(program, *inner)),
        Type::Array(inner, size) => format!("array<{}, {size}>", render_type(program, *inner)),
        Type::Function(params, ret) => {
            let ps = params
                .iter()
                .map(|p| render_type(program, *p))
                .collect::<Vec<_>>()
                .join(", ");
            format!("fn({ps}) -> {}", render_type(program, *ret))
        }
        Type::Struct(name, _) => name.clone(),
    }
}

fn collect_struct_order(program: &Program) -> Vec<TypeId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for id in program.all_node_ids() {
        let ty = program.node(id).unwrap().ty;
        visit_type(program, ty, &mut seen, &mut order);
    }
    order
}

fn visit_type(program: &Program, ty: TypeId, seen: &mut HashSet<TypeId>, order: &mut Vec<TypeId>) {
    if !seen.insert(ty) {
        return;
    }
    match program.types.get(ty) {
        Type::Pointer(inner) => visit_type(program, *inner, seen, order),
        Type::Array(inner, _) => visit_type(program, *inner, seen, order),
        Type::Function(params, ret) => {
            for p in params.iter().copied() {
                visit_type(program, p, seen, order);
            }
            visit_type(program, *ret, seen, order);
        }
        Type::Struct(_, fields) => {
            for f in fields.iter().copied() {
                visit_type(program, f, seen, order);
            }
            order.push(ty);
        }
        _ => {}
    }
}

fn print_function(out: &mut String, program: &Program, names: &NameEnv, func_id: NodeId) {
    let func = program.node(func_id).unwrap().as_function().unwrap();
    let params_text = func
        .params
        .iter()
        .map(|p| render_type(program, program.node(*p).unwrap().ty))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!(
        "fn {}({params_text}) -> {} {{\n",
        func.name,
        render_type(program, func.return_type)
    ));
    for &block_id in &func.blocks {
        let block = program.node(block_id).unwrap().as_block().unwrap();
        out.push_str(&format!("{}:\n", names.name(block_id)));
        for &instr_id in &block.instructions {
            print_instruction(out, program, names, instr_id);
        }
    }
    out.push_str("}\n");
}

fn print_instruction(out: &mut String, program: &Program, names: &NameEnv, instr_id: NodeId) {
    let node = program.node(instr_id).unwrap();
    let ty = node.ty;
    let op = &node.as_instruction().unwrap().op;
    let has_result = !op.is_terminator() && ty != TypeId::VOID;

    out.push_str("  ");
    if has_result {
        out.push_str(&names.name(instr_id));
        out.push_str(" = ");
    }
    out.push_str(&render_op(program, names, op));
    if has_result {
        out.push_str(" : ");
        out.push_str(&render_type(program, ty));
    }
    out.push_str(";\n");
}

fn render_op(program: &Program, names: &NameEnv, op: &Op) -> String {
    match op {
        Op::Alloc { inner } => format!("alloc {}", render_type(program, *inner)),
        Op::Store { pointer, value } => format!(
            "store {}, {}",
            operand_text(program, names, *pointer),
            operand_text(program, names, *value)
        ),
        Op::Load { pointer } => format!("load {}", operand_text(program, names, *pointer)),
        Op::BinaryOp { op, l, r } => format!(
            "binop {} {}, {}",
            op.symbol(),
            operand_text(program, names, *l),
            operand_text(program, names, *r)
        ),
        Op::UnaryOp { op, v } => format!("unop {} {}", op.symbol(), operand_text(program, names, *v)),
        Op::Phi { sources, .. } => {
            let pairs = sources
                .iter()
                .map(|(b, v)| format!("{} => {}", names.name(*b), operand_text(program, names, *v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("phi [{pairs}]")
        }
        Op::Eat { args } => format!(
            "eat {}",
            args.iter()
                .map(|a| operand_text(program, names, *a))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Op::Blur { v } => format!("blur {}", operand_text(program, names, *v)),
        Op::Call { target, args } => format!(
            "call @{}({})",
            names.name(*target),
            args.iter()
                .map(|a| operand_text(program, names, *a))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Op::GetSubValueStruct { target, index } => {
            format!("get_sub_value.struct {}, {index}", operand_text(program, names, *target))
        }
        Op::GetSubValueArray { target, index } => format!(
            "get_sub_value.array {}, {}",
            operand_text(program, names, *target),
            operand_text(program, names, *index)
        ),
        Op::GetSubPointerStruct { target, index } => {
            format!("get_sub_pointer.struct {}, {index}", operand_text(program, names, *target))
        }
        Op::GetSubPointerArray { target, index } => format!(
            "get_sub_pointer.array {}, {}",
            operand_text(program, names, *target),
            operand_text(program, names, *index)
        ),
        Op::AggregateValue { ty, values } => format!(
            "aggregate_value {}({})",
            render_type(program, *ty),
            values
                .iter()
                .map(|v| operand_text(program, names, *v))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Op::Branch { cond, if_true, if_false } => format!(
            "branch {}, {}, {}",
            operand_text(program, names, *cond),
            names.name(*if_true),
            names.name(*if_false)
        ),
        Op::Jump { target } => format!("jump {}", names.name(*target)),
        Op::Exit => "exit".to_string(),
        Op::Return { value } => format!("return {}", operand_text(program, names, *value)),
    }
}

fn operand_text(program: &Program, names: &NameEnv, id: NodeId) -> String {
    let node = program.node(id).unwrap();
    match &node.kind {
        NodeKind::Function(_) => format!("@{}", names.name(id)),
        NodeKind::BasicBlock(_) => names.name(id),
        NodeKind::Parameter { .. } => format!("%{}", names.name(id)),
        NodeKind::Instruction(_) => names.name(id),
        NodeKind::Constant(ConstValue::Integer { width, value }) => {
            if *width == 1 {
                if *value != 0 { "true".to_string() } else { "false".to_string() }
            } else {
                format!("{value}i{width}")
            }
        }
        NodeKind::Undefined => format!("undef<{}>", render_type(program, node.ty)),
        NodeKind::Void => "void".to_string(),
    }
}
