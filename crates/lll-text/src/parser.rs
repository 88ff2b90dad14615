//! Recursive-descent parser for the textual IR, built to be the exact
//! inverse of `printer::print`.
//!
//! Two passes over the token stream are needed: the first registers every
//! struct and function signature (so a `call @later_fn` or a field of a
//! later-declared struct resolves), the second parses function bodies. A
//! third, local pass per function pre-creates its blocks before any
//! instruction is parsed, so a forward `jump`/`branch` target resolves
//! immediately. The only reference that can point at something not yet
//! built even after all that is a `phi` source on a loop back edge; those
//! are resolved once the whole function has been parsed.

use std::collections::HashMap;

use indexmap::IndexMap;
use lll_core::{BinOp, NodeId, Op, Program, TypeId, UnOp};
use tracing::{trace, warn};

use crate::error::TextError;
use crate::lexer::{lex, Tok};

const MNEMONICS: &[&str] = &[
    "alloc",
    "store",
    "load",
    "binop",
    "unop",
    "phi",
    "eat",
    "blur",
    "call",
    "get_sub_value.struct",
    "get_sub_value.array",
    "get_sub_pointer.struct",
    "get_sub_pointer.array",
    "aggregate_value",
    "branch",
    "jump",
    "exit",
    "return",
];

enum PhiSourceValue {
    Known(NodeId),
    Forward(String),
}

pub fn parse(text: &str) -> Result<Program, TextError> {
    trace!(bytes = text.len(), "parsing textual IR");
    match parse_inner(text) {
        Ok(program) => Ok(program),
        Err(e) => {
            warn!(error = %e, "parse failed");
            Err(e)
        }
    }
}

fn parse_inner(text: &str) -> Result<Program, TextError> {
    let (toks, lines) = lex(text)?;
    let mut program = Program::new();

    let (structs, functions, entry_name) = scan_headers(&mut program, &toks, &lines)?;
    parse_bodies(&mut program, &toks, &lines, &structs, &functions)?;

    if let Some(name) = entry_name {
        let id = *functions
            .get(&name)
            .ok_or_else(|| TextError::UndeclaredName { line: 0, name: name.clone() })?;
        program.entry = Some(id);
    }

    Ok(program)
}

fn line_at(lines: &[usize], pos: usize) -> usize {
    lines.get(pos).copied().unwrap_or_else(|| lines.last().copied().unwrap_or(1))
}

fn expect_sym(toks: &[Tok], pos: &mut usize, want: Tok, lines: &[usize]) -> Result<(), TextError> {
    match toks.get(*pos) {
        Some(t) if *t == want => {
            *pos += 1;
            Ok(())
        }
        other => Err(TextError::Expected {
            line: line_at(lines, *pos),
            expected: format!("{want:?}"),
            found: format!("{other:?}"),
        }),
    }
}

fn expect_ident_any(toks: &[Tok], pos: &mut usize, lines: &[usize]) -> Result<String, TextError> {
    match toks.get(*pos).cloned() {
        Some(Tok::Ident(s)) => {
            *pos += 1;
            Ok(s)
        }
        other => Err(TextError::Expected {
            line: line_at(lines, *pos),
            expected: "identifier".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn expect_uint(toks: &[Tok], pos: &mut usize, lines: &[usize]) -> Result<u32, TextError> {
    match toks.get(*pos).cloned() {
        Some(Tok::IntLit { value, width: None }) if value >= 0 => {
            *pos += 1;
            Ok(value as u32)
        }
        other => Err(TextError::Expected {
            line: line_at(lines, *pos),
            expected: "integer".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn read_name_after_percent(toks: &[Tok], pos: &mut usize, lines: &[usize]) -> Result<String, TextError> {
    match toks.get(*pos).cloned() {
        Some(Tok::IntLit { value, width: None }) if value >= 0 => {
            *pos += 1;
            Ok(value.to_string())
        }
        Some(Tok::Ident(s)) => {
            *pos += 1;
            Ok(s)
        }
        other => Err(TextError::Expected {
            line: line_at(lines, *pos),
            expected: "name after '%'".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn parse_type(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<TypeId, TextError> {
    match toks.get(*pos).cloned() {
        Some(Tok::Ident(name)) => {
            *pos += 1;
            match name.as_str() {
                "void" => Ok(TypeId::VOID),
                "bool" => Ok(TypeId::BOOL),
                "ptr" => {
                    expect_sym(toks, pos, Tok::LAngle, lines)?;
                    let inner = parse_type(program, structs, toks, pos, lines)?;
                    expect_sym(toks, pos, Tok::RAngle, lines)?;
                    Ok(program.types.pointer(inner))
                }
                "array" => {
                    expect_sym(toks, pos, Tok::LAngle, lines)?;
                    let inner = parse_type(program, structs, toks, pos, lines)?;
                    expect_sym(toks, pos, Tok::Comma, lines)?;
                    let size = expect_uint(toks, pos, lines)?;
                    expect_sym(toks, pos, Tok::RAngle, lines)?;
                    Ok(program.types.array(inner, size))
                }
                "fn" => {
                    expect_sym(toks, pos, Tok::LParen, lines)?;
                    let mut params = Vec::new();
                    if !matches!(toks.get(*pos), Some(Tok::RParen)) {
                        loop {
                            params.push(parse_type(program, structs, toks, pos, lines)?);
                            if matches!(toks.get(*pos), Some(Tok::Comma)) {
                                *pos += 1;
                                continue;
                            }
                            break;
                        }
                    }
                    expect_sym(toks, pos, Tok::RParen, lines)?;
                    expect_sym(toks, pos, Tok::Arrow, lines)?;
                    let ret = parse_type(program, structs, toks, pos, lines)?;
                    Ok(program.types.function(params, ret))
                }
                _ if name.len() > 1 && name.starts_with('i') && name[1..].bytes().all(|b| b.is_ascii_digit()) => {
                    let width: u32 = name[1..]
                        .parse()
                        .map_err(|_| TextError::InvalidInteger { line: line_at(lines, *pos), text: name.clone() })?;
                    Ok(program.types.integer(width))
                }
                _ => structs
                    .get(&name)
                    .copied()
                    .ok_or_else(|| TextError::UnknownType { line: line_at(lines, *pos), name: name.clone() }),
            }
        }
        other => Err(TextError::Expected {
            line: line_at(lines, *pos),
            expected: "type".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn parse_struct_body(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<(String, Vec<TypeId>), TextError> {
    let name = expect_ident_any(toks, pos, lines)?;
    expect_sym(toks, pos, Tok::LBrace, lines)?;
    let mut fields = Vec::new();
    if !matches!(toks.get(*pos), Some(Tok::RBrace)) {
        loop {
            fields.push(parse_type(program, structs, toks, pos, lines)?);
            if matches!(toks.get(*pos), Some(Tok::Comma)) {
                *pos += 1;
                continue;
            }
            break;
        }
    }
    expect_sym(toks, pos, Tok::RBrace, lines)?;
    Ok((name, fields))
}

/// Parses `fn NAME ( T, ... ) -> RET {`, consuming the opening brace.
fn parse_fn_signature_after_keyword(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<(String, Vec<TypeId>, TypeId), TextError> {
    let name = expect_ident_any(toks, pos, lines)?;
    expect_sym(toks, pos, Tok::LParen, lines)?;
    let mut params = Vec::new();
    if !matches!(toks.get(*pos), Some(Tok::RParen)) {
        loop {
            params.push(parse_type(program, structs, toks, pos, lines)?);
            if matches!(toks.get(*pos), Some(Tok::Comma)) {
                *pos += 1;
                continue;
            }
            break;
        }
    }
    expect_sym(toks, pos, Tok::RParen, lines)?;
    expect_sym(toks, pos, Tok::Arrow, lines)?;
    let ret = parse_type(program, structs, toks, pos, lines)?;
    expect_sym(toks, pos, Tok::LBrace, lines)?;
    Ok((name, params, ret))
}

type HeaderResult = (HashMap<String, TypeId>, HashMap<String, NodeId>, Option<String>);

fn scan_headers(program: &mut Program, toks: &[Tok], lines: &[usize]) -> Result<HeaderResult, TextError> {
    let mut structs = HashMap::new();
    let mut functions = HashMap::new();
    let mut entry_name = None;
    let mut i = 0;

    while i < toks.len() {
        match toks[i].clone() {
            Tok::Ident(kw) if kw == "struct" => {
                i += 1;
                let (name, fields) = parse_struct_body(program, &structs, toks, &mut i, lines)?;
                if structs.contains_key(&name) {
                    return Err(TextError::DuplicateName { line: line_at(lines, i), name });
                }
                let id = program.types.struct_type(name.clone(), fields);
                structs.insert(name, id);
            }
            Tok::Ident(kw) if kw == "entry" => {
                i += 1;
                expect_sym(toks, &mut i, Tok::At, lines)?;
                entry_name = Some(expect_ident_any(toks, &mut i, lines)?);
            }
            Tok::Ident(kw) if kw == "fn" => {
                i += 1;
                let (name, params, ret) = parse_fn_signature_after_keyword(program, &structs, toks, &mut i, lines)?;
                if functions.contains_key(&name) {
                    return Err(TextError::DuplicateName { line: line_at(lines, i), name });
                }
                let id = program.declare_function(name.clone(), params, ret);
                functions.insert(name, id);
                // function bodies never contain a nested `{`/`}` (aggregate_value
                // uses parens, phi uses brackets), so the next `}` is this one.
                while !matches!(toks.get(i), Some(Tok::RBrace)) {
                    if toks.get(i).is_none() {
                        return Err(TextError::UnexpectedEof { line: line_at(lines, i), expected: "}".to_string() });
                    }
                    i += 1;
                }
                i += 1;
            }
            other => {
                return Err(TextError::Expected {
                    line: line_at(lines, i),
                    expected: "struct, entry, or fn".to_string(),
                    found: format!("{other:?}"),
                })
            }
        }
    }

    Ok((structs, functions, entry_name))
}

fn parse_bodies(
    program: &mut Program,
    toks: &[Tok],
    lines: &[usize],
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
) -> Result<(), TextError> {
    let mut i = 0;
    while i < toks.len() {
        match toks[i].clone() {
            Tok::Ident(kw) if kw == "struct" => {
                i += 1;
                expect_ident_any(toks, &mut i, lines)?;
                expect_sym(toks, &mut i, Tok::LBrace, lines)?;
                while !matches!(toks.get(i), Some(Tok::RBrace)) {
                    if toks.get(i).is_none() {
                        return Err(TextError::UnexpectedEof { line: line_at(lines, i), expected: "}".to_string() });
                    }
                    i += 1;
                }
                i += 1;
            }
            Tok::Ident(kw) if kw == "entry" => {
                i += 1;
                expect_sym(toks, &mut i, Tok::At, lines)?;
                expect_ident_any(toks, &mut i, lines)?;
            }
            Tok::Ident(kw) if kw == "fn" => {
                i += 1;
                let (name, _params, _ret) = parse_fn_signature_after_keyword(program, structs, toks, &mut i, lines)?;
                let func_id = *functions.get(&name).expect("pre-scanned in scan_headers");
                parse_function_body(program, func_id, structs, functions, toks, &mut i, lines)?;
            }
            other => {
                return Err(TextError::Expected {
                    line: line_at(lines, i),
                    expected: "struct, entry, or fn".to_string(),
                    found: format!("{other:?}"),
                })
            }
        }
    }
    Ok(())
}

/// `pos` starts right after the function's opening `{`. Consumes through the
/// matching `}`.
fn parse_function_body(
    program: &mut Program,
    func_id: NodeId,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<(), TextError> {
    let body_start = *pos;
    let mut scan_pos = body_start;
    let block_names = prescan_blocks(program, func_id, toks, lines, &mut scan_pos)?;
    // scan_pos now sits on the function's closing `}`.

    let params = program.node(func_id)?.as_function().expect("function node").params.clone();
    let mut values: HashMap<String, NodeId> = HashMap::new();
    for (i, p) in params.iter().enumerate() {
        values.insert(format!("arg{i}"), *p);
    }

    let mut current_block: Option<NodeId> = None;
    let mut deferred_phis: Vec<(NodeId, Vec<(NodeId, PhiSourceValue)>)> = Vec::new();

    *pos = body_start;
    while *pos < scan_pos {
        if let (Some(Tok::Ident(name)), Some(Tok::Colon)) = (toks.get(*pos), toks.get(*pos + 1)) {
            if !MNEMONICS.contains(&name.as_str()) {
                let id = *block_names.get(name).expect("prescanned");
                current_block = Some(id);
                *pos += 2;
                continue;
            }
        }
        let block = current_block.ok_or_else(|| TextError::Expected {
            line: line_at(lines, *pos),
            expected: "block header".to_string(),
            found: "instruction before any block".to_string(),
        })?;
        parse_statement(
            program,
            structs,
            functions,
            &mut values,
            &block_names,
            &mut deferred_phis,
            block,
            toks,
            pos,
            lines,
        )?;
    }

    for (phi_id, raw) in deferred_phis {
        let mut sources = IndexMap::new();
        for (block_id, pv) in raw {
            let value_id = match pv {
                PhiSourceValue::Known(id) => id,
                PhiSourceValue::Forward(key) => *values
                    .get(&key)
                    .ok_or_else(|| TextError::UndeclaredName { line: 0, name: format!("%{key}") })?,
            };
            sources.insert(block_id, value_id);
        }
        program.mutate_op(phi_id, |op| {
            if let Op::Phi { sources: s, .. } = op {
                *s = sources;
            }
        })?;
    }

    *pos = scan_pos;
    expect_sym(toks, pos, Tok::RBrace, lines)?;
    Ok(())
}

/// Scans forward from `pos` (just inside a function's `{`) creating a block
/// for every header line found, leaving `pos` on the function's `}`.
fn prescan_blocks(
    program: &mut Program,
    func_id: NodeId,
    toks: &[Tok],
    lines: &[usize],
    pos: &mut usize,
) -> Result<HashMap<String, NodeId>, TextError> {
    let mut names = HashMap::new();
    loop {
        match toks.get(*pos) {
            Some(Tok::RBrace) => break,
            Some(Tok::Ident(x)) if matches!(toks.get(*pos + 1), Some(Tok::Colon)) && !MNEMONICS.contains(&x.as_str()) => {
                let id = program.add_block(func_id, Some(x.clone()))?;
                names.insert(x.clone(), id);
                *pos += 2;
            }
            Some(_) => {
                while !matches!(toks.get(*pos), Some(Tok::Semi) | None) {
                    *pos += 1;
                }
                if matches!(toks.get(*pos), Some(Tok::Semi)) {
                    *pos += 1;
                }
            }
            None => return Err(TextError::UnexpectedEof { line: line_at(lines, *pos), expected: "}".to_string() }),
        }
    }
    Ok(names)
}

fn parse_block_ref(
    block_names: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<NodeId, TextError> {
    let name = expect_ident_any(toks, pos, lines)?;
    block_names
        .get(&name)
        .copied()
        .ok_or_else(|| TextError::UndeclaredName { line: line_at(lines, *pos), name })
}

fn parse_operand(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    values: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<NodeId, TextError> {
    if matches!(toks.get(*pos), Some(Tok::Percent)) {
        *pos += 1;
        let key = read_name_after_percent(toks, pos, lines)?;
        return values
            .get(&key)
            .copied()
            .ok_or_else(|| TextError::UndeclaredName { line: line_at(lines, *pos), name: format!("%{key}") });
    }
    parse_nonpercent_operand(program, structs, functions, toks, pos, lines)
}

fn parse_phi_value(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    values: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<PhiSourceValue, TextError> {
    if matches!(toks.get(*pos), Some(Tok::Percent)) {
        *pos += 1;
        let key = read_name_after_percent(toks, pos, lines)?;
        return Ok(match values.get(&key) {
            Some(id) => PhiSourceValue::Known(*id),
            None => PhiSourceValue::Forward(key),
        });
    }
    Ok(PhiSourceValue::Known(parse_nonpercent_operand(program, structs, functions, toks, pos, lines)?))
}

fn parse_nonpercent_operand(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<NodeId, TextError> {
    match toks.get(*pos).cloned() {
        Some(Tok::At) => {
            *pos += 1;
            let name = expect_ident_any(toks, pos, lines)?;
            functions
                .get(&name)
                .copied()
                .ok_or_else(|| TextError::UndeclaredName { line: line_at(lines, *pos), name })
        }
        Some(Tok::Ident(kw)) if kw == "true" => {
            *pos += 1;
            Ok(program.const_bool(true))
        }
        Some(Tok::Ident(kw)) if kw == "false" => {
            *pos += 1;
            Ok(program.const_bool(false))
        }
        Some(Tok::Ident(kw)) if kw == "void" => {
            *pos += 1;
            Ok(program.void())
        }
        Some(Tok::Ident(kw)) if kw == "undef" => {
            *pos += 1;
            expect_sym(toks, pos, Tok::LAngle, lines)?;
            let ty = parse_type(program, structs, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::RAngle, lines)?;
            Ok(program.undef(ty))
        }
        Some(Tok::IntLit { value, width: Some(w) }) => {
            *pos += 1;
            Ok(program.const_int(w, value))
        }
        other => Err(TextError::Expected {
            line: line_at(lines, *pos),
            expected: "operand".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn parse_operand_list_until_semi(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    values: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<Vec<NodeId>, TextError> {
    let mut out = Vec::new();
    if matches!(toks.get(*pos), Some(Tok::Semi)) {
        return Ok(out);
    }
    loop {
        out.push(parse_operand(program, structs, functions, values, toks, pos, lines)?);
        if matches!(toks.get(*pos), Some(Tok::Comma)) {
            *pos += 1;
            continue;
        }
        break;
    }
    Ok(out)
}

fn parse_operand_list_until_rparen(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    values: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<Vec<NodeId>, TextError> {
    let mut out = Vec::new();
    if matches!(toks.get(*pos), Some(Tok::RParen)) {
        return Ok(out);
    }
    loop {
        out.push(parse_operand(program, structs, functions, values, toks, pos, lines)?);
        if matches!(toks.get(*pos), Some(Tok::Comma)) {
            *pos += 1;
            continue;
        }
        break;
    }
    Ok(out)
}

fn parse_binop(name: &str, line: usize) -> Result<BinOp, TextError> {
    Ok(match name {
        "add" => BinOp::Add,
        "sub" => BinOp::Sub,
        "mul" => BinOp::Mul,
        "sdiv" => BinOp::SDiv,
        "srem" => BinOp::SRem,
        "and" => BinOp::And,
        "or" => BinOp::Or,
        "xor" => BinOp::Xor,
        "shl" => BinOp::Shl,
        "shr" => BinOp::Shr,
        "eq" => BinOp::Eq,
        "ne" => BinOp::Ne,
        "lt" => BinOp::Lt,
        "le" => BinOp::Le,
        "gt" => BinOp::Gt,
        "ge" => BinOp::Ge,
        other => return Err(TextError::UnknownMnemonic { line, name: other.to_string() }),
    })
}

fn parse_unop(name: &str, line: usize) -> Result<UnOp, TextError> {
    Ok(match name {
        "neg" => UnOp::Neg,
        "not" => UnOp::Not,
        other => return Err(TextError::UnknownMnemonic { line, name: other.to_string() }),
    })
}

#[allow(clippy::too_many_arguments)]
fn parse_nonphi_op(
    mnemonic: &str,
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    values: &HashMap<String, NodeId>,
    block_names: &HashMap<String, NodeId>,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
    mnemonic_line: usize,
) -> Result<Op, TextError> {
    match mnemonic {
        "alloc" => {
            let inner = parse_type(program, structs, toks, pos, lines)?;
            Ok(Op::Alloc { inner })
        }
        "store" => {
            let pointer = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let value = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::Store { pointer, value })
        }
        "load" => {
            let pointer = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::Load { pointer })
        }
        "binop" => {
            let sym = expect_ident_any(toks, pos, lines)?;
            let op = parse_binop(&sym, mnemonic_line)?;
            let l = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let r = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::BinaryOp { op, l, r })
        }
        "unop" => {
            let sym = expect_ident_any(toks, pos, lines)?;
            let op = parse_unop(&sym, mnemonic_line)?;
            let v = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::UnaryOp { op, v })
        }
        "eat" => {
            let args = parse_operand_list_until_semi(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::Eat { args })
        }
        "blur" => {
            let v = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::Blur { v })
        }
        "call" => {
            expect_sym(toks, pos, Tok::At, lines)?;
            let name = expect_ident_any(toks, pos, lines)?;
            let target = *functions
                .get(&name)
                .ok_or_else(|| TextError::UndeclaredName { line: mnemonic_line, name })?;
            expect_sym(toks, pos, Tok::LParen, lines)?;
            let args = parse_operand_list_until_rparen(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::RParen, lines)?;
            Ok(Op::Call { target, args })
        }
        "get_sub_value.struct" => {
            let target = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let index = expect_uint(toks, pos, lines)?;
            Ok(Op::GetSubValueStruct { target, index })
        }
        "get_sub_value.array" => {
            let target = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let index = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::GetSubValueArray { target, index })
        }
        "get_sub_pointer.struct" => {
            let target = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let index = expect_uint(toks, pos, lines)?;
            Ok(Op::GetSubPointerStruct { target, index })
        }
        "get_sub_pointer.array" => {
            let target = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let index = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::GetSubPointerArray { target, index })
        }
        "aggregate_value" => {
            let ty = parse_type(program, structs, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::LParen, lines)?;
            let vals = parse_operand_list_until_rparen(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::RParen, lines)?;
            Ok(Op::AggregateValue { ty, values: vals })
        }
        "branch" => {
            let cond = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let if_true = parse_block_ref(block_names, toks, pos, lines)?;
            expect_sym(toks, pos, Tok::Comma, lines)?;
            let if_false = parse_block_ref(block_names, toks, pos, lines)?;
            Ok(Op::Branch { cond, if_true, if_false })
        }
        "jump" => {
            let target = parse_block_ref(block_names, toks, pos, lines)?;
            Ok(Op::Jump { target })
        }
        "exit" => Ok(Op::Exit),
        "return" => {
            let value = parse_operand(program, structs, functions, values, toks, pos, lines)?;
            Ok(Op::Return { value })
        }
        other => Err(TextError::UnknownMnemonic { line: mnemonic_line, name: other.to_string() }),
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_statement(
    program: &mut Program,
    structs: &HashMap<String, TypeId>,
    functions: &HashMap<String, NodeId>,
    values: &mut HashMap<String, NodeId>,
    block_names: &HashMap<String, NodeId>,
    deferred_phis: &mut Vec<(NodeId, Vec<(NodeId, PhiSourceValue)>)>,
    current_block: NodeId,
    toks: &[Tok],
    pos: &mut usize,
    lines: &[usize],
) -> Result<(), TextError> {
    let result_name = if matches!(toks.get(*pos), Some(Tok::Percent)) {
        *pos += 1;
        let name = read_name_after_percent(toks, pos, lines)?;
        expect_sym(toks, pos, Tok::Eq, lines)?;
        Some(name)
    } else {
        None
    };

    let mnemonic_line = line_at(lines, *pos);
    let mnemonic = expect_ident_any(toks, pos, lines)?;

    if mnemonic == "phi" {
        let name = result_name.ok_or_else(|| TextError::Expected {
            line: mnemonic_line,
            expected: "'%name =' before phi".to_string(),
            found: "phi".to_string(),
        })?;
        expect_sym(toks, pos, Tok::LBracket, lines)?;
        let mut raw: Vec<(String, PhiSourceValue)> = Vec::new();
        if !matches!(toks.get(*pos), Some(Tok::RBracket)) {
            loop {
                let bname = expect_ident_any(toks, pos, lines)?;
                expect_sym(toks, pos, Tok::FatArrow, lines)?;
                let pv = parse_phi_value(program, structs, functions, values, toks, pos, lines)?;
                raw.push((bname, pv));
                if matches!(toks.get(*pos), Some(Tok::Comma)) {
                    *pos += 1;
                    continue;
                }
                break;
            }
        }
        expect_sym(toks, pos, Tok::RBracket, lines)?;
        expect_sym(toks, pos, Tok::Colon, lines)?;
        let ty = parse_type(program, structs, toks, pos, lines)?;
        let id = program.add_instruction(current_block, Op::Phi { ty, sources: IndexMap::new() }, ty)?;
        values.insert(name, id);

        let mut resolved = Vec::with_capacity(raw.len());
        for (bname, pv) in raw {
            let bid = *block_names
                .get(&bname)
                .ok_or_else(|| TextError::UndeclaredName { line: mnemonic_line, name: bname.clone() })?;
            resolved.push((bid, pv));
        }
        deferred_phis.push((id, resolved));
        expect_sym(toks, pos, Tok::Semi, lines)?;
        return Ok(());
    }

    let op = parse_nonphi_op(
        &mnemonic,
        program,
        structs,
        functions,
        values,
        block_names,
        toks,
        pos,
        lines,
        mnemonic_line,
    )?;

    let ty = if result_name.is_some() {
        expect_sym(toks, pos, Tok::Colon, lines)?;
        parse_type(program, structs, toks, pos, lines)?
    } else {
        TypeId::VOID
    };

    let id = program.add_instruction(current_block, op, ty)?;
    if let Some(name) = result_name {
        values.insert(name, id);
    }
    expect_sym(toks, pos, Tok::Semi, lines)?;
    Ok(())
}
