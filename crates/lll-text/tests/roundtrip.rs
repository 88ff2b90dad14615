use lll_check::verify;
use lll_core::{BinOp, Op, Program, TypeId};
use lll_text::{parse, print, program_equals};

fn assert_roundtrip(program: &Program) {
    let text = print(program);
    let parsed = parse(&text).unwrap_or_else(|e| panic!("parse failed: {e}\n--- text ---\n{text}"));
    verify(&parsed).unwrap_or_else(|errs| panic!("parsed program fails verification: {errs:?}\n--- text ---\n{text}"));
    assert!(
        program_equals(program, &parsed),
        "round-tripped program differs\n--- original ---\n{}\n--- reprinted ---\n{}",
        text,
        print(&parsed)
    );
}

#[test]
fn roundtrips_straight_line_arithmetic() {
    let mut program = Program::new();
    let i32 = program.types.integer(32);
    let func = program.declare_function("add_one", vec![i32], i32);
    let entry = program.add_block(func, None).unwrap();
    let arg0 = program.node(func).unwrap().as_function().unwrap().params[0];
    let one = program.const_int(32, 1);
    let sum = program
        .add_instruction(entry, Op::BinaryOp { op: BinOp::Add, l: arg0, r: one }, i32)
        .unwrap();
    program.add_instruction(entry, Op::Return { value: sum }, TypeId::VOID).unwrap();
    program.entry = Some(func);

    verify(&program).expect("hand-built program is valid");
    assert_roundtrip(&program);
}

#[test]
fn roundtrips_branching_function_with_phi() {
    let mut program = Program::new();
    let i32 = program.types.integer(32);
    let bool_ty = TypeId::BOOL;
    let func = program.declare_function("abs", vec![i32], i32);
    let arg0 = program.node(func).unwrap().as_function().unwrap().params[0];

    let entry = program.add_block(func, None).unwrap();
    let then_blk = program.add_block(func, None).unwrap();
    let else_blk = program.add_block(func, None).unwrap();
    let join = program.add_block(func, None).unwrap();

    let zero = program.const_int(32, 0);
    let cond = program
        .add_instruction(entry, Op::BinaryOp { op: BinOp::Lt, l: arg0, r: zero }, bool_ty)
        .unwrap();
    program
        .add_instruction(entry, Op::Branch { cond, if_true: then_blk, if_false: else_blk }, TypeId::VOID)
        .unwrap();

    let negated = program
        .add_instruction(then_blk, Op::UnaryOp { op: lll_core::UnOp::Neg, v: arg0 }, i32)
        .unwrap();
    program.add_instruction(then_blk, Op::Jump { target: join }, TypeId::VOID).unwrap();

    program.add_instruction(else_blk, Op::Jump { target: join }, TypeId::VOID).unwrap();

    let mut sources = indexmap::IndexMap::new();
    sources.insert(then_blk, negated);
    sources.insert(else_blk, arg0);
    let phi = program.add_instruction(join, Op::Phi { ty: i32, sources }, i32).unwrap();
    program.add_instruction(join, Op::Return { value: phi }, TypeId::VOID).unwrap();
    program.entry = Some(func);

    verify(&program).expect("hand-built program is valid");
    assert_roundtrip(&program);
}

#[test]
fn roundtrips_struct_aggregate() {
    let mut program = Program::new();
    let i32 = program.types.integer(32);
    let point = program.types.struct_type("Point", vec![i32, i32]);
    let ptr_point = program.types.pointer(point);

    let func = program.declare_function("make_origin", vec![], point);
    let entry = program.add_block(func, None).unwrap();

    let slot = program.add_instruction(entry, Op::Alloc { inner: point }, ptr_point).unwrap();
    let zero = program.const_int(32, 0);
    let value = program
        .add_instruction(entry, Op::AggregateValue { ty: point, values: vec![zero, zero] }, point)
        .unwrap();
    program.add_instruction(entry, Op::Store { pointer: slot, value }, TypeId::VOID).unwrap();
    let loaded = program.add_instruction(entry, Op::Load { pointer: slot }, point).unwrap();
    program.add_instruction(entry, Op::Return { value: loaded }, TypeId::VOID).unwrap();
    program.entry = Some(func);

    verify(&program).expect("hand-built program is valid");
    assert_roundtrip(&program);
}

#[test]
fn roundtrips_call_between_functions() {
    let mut program = Program::new();
    let i32 = program.types.integer(32);

    let callee = program.declare_function("double", vec![i32], i32);
    let callee_entry = program.add_block(callee, None).unwrap();
    let callee_arg = program.node(callee).unwrap().as_function().unwrap().params[0];
    let doubled = program
        .add_instruction(callee_entry, Op::BinaryOp { op: BinOp::Mul, l: callee_arg, r: callee_arg }, i32)
        .unwrap();
    program.add_instruction(callee_entry, Op::Return { value: doubled }, TypeId::VOID).unwrap();

    let caller = program.declare_function("quadruple", vec![i32], i32);
    let caller_entry = program.add_block(caller, None).unwrap();
    let caller_arg = program.node(caller).unwrap().as_function().unwrap().params[0];
    let first = program
        .add_instruction(caller_entry, Op::Call { target: callee, args: vec![caller_arg] }, i32)
        .unwrap();
    let second = program
        .add_instruction(caller_entry, Op::Call { target: callee, args: vec![first] }, i32)
        .unwrap();
    program.add_instruction(caller_entry, Op::Return { value: second }, TypeId::VOID).unwrap();
    program.entry = Some(caller);

    verify(&program).expect("hand-built program is valid");
    assert_roundtrip(&program);
}

#[test]
fn parser_rejects_garbage() {
    let err = parse("fn broken(i32) -> i32 { bb0: return %0; }").unwrap_err();
    let _ = format!("{err}");
}
