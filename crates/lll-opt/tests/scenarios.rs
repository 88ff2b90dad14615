//! One end-to-end scenario per named case: build IR directly with
//! `lll-core`'s builder API, run the default pipeline, and check the
//! result structurally and/or by interpreting it.

use lll_check::{verify, Interpreter, InterpreterConfig, Value};
use lll_core::{BinOp, ConstValue, NodeId, NodeKind, Op, Program, TypeId};
use lll_opt::{Driver, DriverConfig};

fn all_ops(program: &Program, function: NodeId) -> Vec<Op> {
    let func = program.node(function).unwrap().as_function().unwrap().clone();
    func.blocks
        .iter()
        .flat_map(|&b| program.node(b).unwrap().as_block().unwrap().instructions.clone())
        .map(|id| program.node(id).unwrap().as_instruction().unwrap().op.clone())
        .collect()
}

fn any_op(program: &Program, function: NodeId, pred: impl Fn(&Op) -> bool) -> bool {
    all_ops(program, function).iter().any(pred)
}

fn const_int_value(program: &Program, id: NodeId) -> (u32, i64) {
    match &program.node(id).unwrap().kind {
        NodeKind::Constant(ConstValue::Integer { width, value }) => (*width, *value),
        other => panic!("expected integer constant, got {other:?}"),
    }
}

/// `(2 * 3) + 4` folds to the single constant `10`, leaving one `Eat`.
#[test]
fn constant_fold_collapses_arithmetic_to_one_eat() {
    let mut program = Program::new();
    let i32_ty = program.types.integer(32);
    let main = program.declare_function("main", vec![], TypeId::VOID);
    let entry = program.add_block(main, None).unwrap();
    program.entry = Some(main);

    let c2 = program.const_int(32, 2);
    let c3 = program.const_int(32, 3);
    let mul = program
        .add_instruction(entry, Op::BinaryOp { op: BinOp::Mul, l: c2, r: c3 }, i32_ty)
        .unwrap();
    let c4 = program.const_int(32, 4);
    let sum = program
        .add_instruction(entry, Op::BinaryOp { op: BinOp::Add, l: mul, r: c4 }, i32_ty)
        .unwrap();
    program.add_instruction(entry, Op::Eat { args: vec![sum] }, TypeId::VOID).unwrap();
    program.add_instruction(entry, Op::Exit, TypeId::VOID).unwrap();

    verify(&program).unwrap();
    Driver::new(DriverConfig::standard(10)).run(&mut program).unwrap();
    verify(&program).unwrap();

    let ops = all_ops(&program, main);
    let eats: Vec<&Op> = ops.iter().filter(|op| matches!(op, Op::Eat { .. })).collect();
    assert_eq!(eats.len(), 1);
    match eats[0] {
        Op::Eat { args } => {
            assert_eq!(args.len(), 1);
            assert_eq!(const_int_value(&program, args[0]), (32, 10));
        }
        _ => unreachable!(),
    }
}

/// A counting loop built with an explicit `Alloc`/`Store`/`Load` promotes
/// to a phi in mem2reg; SCCP cannot statically resolve the loop's trip
/// count, so the phi and the branch both survive to the end of the
/// pipeline, and the interpreter still observes the same value a manual
/// phi-based loop would (`lll-check`'s own `counting_loop` fixture).
#[test]
fn mem2reg_promotes_loop_counter_to_phi() {
    let mut program = Program::new();
    let i32_ty = program.types.integer(32);
    let ptr_ty = program.types.pointer(i32_ty);
    let main = program.declare_function("main", vec![], TypeId::VOID);
    let entry = program.add_block(main, None).unwrap();
    let header = program.add_block(main, None).unwrap();
    let body = program.add_block(main, None).unwrap();
    let exit_block = program.add_block(main, None).unwrap();
    program.entry = Some(main);

    let alloc = program.add_instruction(entry, Op::Alloc { inner: i32_ty }, ptr_ty).unwrap();
    let zero = program.const_int(32, 0);
    program.add_instruction(entry, Op::Store { pointer: alloc, value: zero }, TypeId::VOID).unwrap();
    program.add_instruction(entry, Op::Jump { target: header }, TypeId::VOID).unwrap();

    let load_cond = program.add_instruction(header, Op::Load { pointer: alloc }, i32_ty).unwrap();
    let ten = program.const_int(32, 10);
    let cond = program
        .add_instruction(header, Op::BinaryOp { op: BinOp::Lt, l: load_cond, r: ten }, TypeId::BOOL)
        .unwrap();
    program
        .add_instruction(header, Op::Branch { cond, if_true: body, if_false: exit_block }, TypeId::VOID)
        .unwrap();

    let load_body = program.add_instruction(body, Op::Load { pointer: alloc }, i32_ty).unwrap();
    let one = program.const_int(32, 1);
    let next = program
        .add_instruction(body, Op::BinaryOp { op: BinOp::Add, l: load_body, r: one }, i32_ty)
        .unwrap();
    program.add_instruction(body, Op::Store { pointer: alloc, value: next }, TypeId::VOID).unwrap();
    program.add_instruction(body, Op::Jump { target: header }, TypeId::VOID).unwrap();

    let load_exit = program.add_instruction(exit_block, Op::Load { pointer: alloc }, i32_ty).unwrap();
    program.add_instruction(exit_block, Op::Eat { args: vec![load_exit] }, TypeId::VOID).unwrap();
    program.add_instruction(exit_block, Op::Exit, TypeId::VOID).unwrap();

    verify(&program).unwrap();
    Driver::new(DriverConfig::standard(10)).run(&mut program).unwrap();
    verify(&program).unwrap();

    assert!(!any_op(&program, main, |op| matches!(op, Op::Alloc { .. })));
    assert!(any_op(&program, main, |op| matches!(op, Op::Phi { .. })));
    assert!(any_op(&program, main, |op| matches!(op, Op::Branch { .. })));

    let mut interp = Interpreter::new(&program, main, vec![], InterpreterConfig::default()).unwrap();
    interp.run_to_end().unwrap();
    assert_eq!(interp.observations(), &[Value::Integer { width: 32, value: 10 }]);
}

/// A single call site to a small function always inlines; once inlined,
/// the callee has no remaining users and is deleted outright.
#[test]
fn single_call_site_inlines_and_deletes_callee() {
    let mut program = Program::new();
    let i32_ty = program.types.integer(32);

    let add_one = program.declare_function("add_one", vec![i32_ty], i32_ty);
    let add_one_entry = program.add_block(add_one, None).unwrap();
    let param_x = program.node(add_one).unwrap().as_function().unwrap().params[0];
    let one = program.const_int(32, 1);
    let sum = program
        .add_instruction(add_one_entry, Op::BinaryOp { op: BinOp::Add, l: param_x, r: one }, i32_ty)
        .unwrap();
    program.add_instruction(add_one_entry, Op::Return { value: sum }, TypeId::VOID).unwrap();

    let main = program.declare_function("main", vec![], TypeId::VOID);
    let main_entry = program.add_block(main, None).unwrap();
    program.entry = Some(main);

    let five = program.const_int(32, 5);
    let call = program.add_instruction(main_entry, Op::Call { target: add_one, args: vec![five] }, i32_ty).unwrap();
    program.add_instruction(main_entry, Op::Eat { args: vec![call] }, TypeId::VOID).unwrap();
    program.add_instruction(main_entry, Op::Exit, TypeId::VOID).unwrap();

    verify(&program).unwrap();
    Driver::new(DriverConfig::standard(10)).run(&mut program).unwrap();
    verify(&program).unwrap();

    assert!(!program.contains(add_one));
    assert!(!any_op(&program, main, |op| matches!(op, Op::Call { .. })));

    let mut interp = Interpreter::new(&program, main, vec![], InterpreterConfig::default()).unwrap();
    interp.run_to_end().unwrap();
    assert_eq!(interp.observations(), &[Value::Integer { width: 32, value: 6 }]);
}

/// Two call sites, each passing an unused second parameter: the parameter
/// is dropped from the signature and from every call's argument list, but
/// the `Blur` expression built for that argument is impure and survives
/// dead-instruction elimination as an orphaned instruction. Padding `f`
/// with nine observable-but-unrelated `Eat`s of its first parameter keeps
/// its instruction count at the inlining threshold, so inlining never
/// fires and dead-signature elimination's effect stays visible.
#[test]
fn dead_signature_elimination_drops_unused_parameter() {
    let mut program = Program::new();
    let i32_ty = program.types.integer(32);

    let f = program.declare_function("f", vec![i32_ty, i32_ty], i32_ty);
    let f_entry = program.add_block(f, None).unwrap();
    let param_a = program.node(f).unwrap().as_function().unwrap().params[0];
    for _ in 0..9 {
        program.add_instruction(f_entry, Op::Eat { args: vec![param_a] }, TypeId::VOID).unwrap();
    }
    program.add_instruction(f_entry, Op::Return { value: param_a }, TypeId::VOID).unwrap();

    let main = program.declare_function("main", vec![], TypeId::VOID);
    let main_entry = program.add_block(main, None).unwrap();
    program.entry = Some(main);

    let two = program.const_int(32, 2);
    let blur1 = program.add_instruction(main_entry, Op::Blur { v: two }, i32_ty).unwrap();
    let ten = program.const_int(32, 10);
    let call1 = program.add_instruction(main_entry, Op::Call { target: f, args: vec![ten, blur1] }, i32_ty).unwrap();
    program.add_instruction(main_entry, Op::Eat { args: vec![call1] }, TypeId::VOID).unwrap();

    let twenty = program.const_int(32, 20);
    let blur2 = program.add_instruction(main_entry, Op::Blur { v: twenty }, i32_ty).unwrap();
    let thirty = program.const_int(32, 30);
    let call2 = program.add_instruction(main_entry, Op::Call { target: f, args: vec![thirty, blur2] }, i32_ty).unwrap();
    program.add_instruction(main_entry, Op::Eat { args: vec![call2] }, TypeId::VOID).unwrap();
    program.add_instruction(main_entry, Op::Exit, TypeId::VOID).unwrap();

    verify(&program).unwrap();
    Driver::new(DriverConfig::standard(10)).run(&mut program).unwrap();
    verify(&program).unwrap();

    assert_eq!(program.node(f).unwrap().as_function().unwrap().params.len(), 1);
    for call in [call1, call2] {
        match &program.node(call).unwrap().as_instruction().unwrap().op {
            Op::Call { args, .. } => assert_eq!(args.len(), 1),
            other => panic!("expected Call, got {other:?}"),
        }
    }
    for blur in [blur1, blur2] {
        assert!(program.contains(blur));
        assert!(matches!(program.node(blur).unwrap().as_instruction().unwrap().op, Op::Blur { .. }));
    }

    let mut interp = Interpreter::new(&program, main, vec![], InterpreterConfig::default()).unwrap();
    interp.run_to_end().unwrap();
    let observations = interp.observations();
    assert_eq!(observations.len(), 20);
    let tens = observations.iter().filter(|v| **v == Value::Integer { width: 32, value: 10 }).count();
    let thirties = observations.iter().filter(|v| **v == Value::Integer { width: 32, value: 30 }).count();
    assert_eq!(tens, 10);
    assert_eq!(thirties, 10);
}

/// `if (true) { eat(1) } else { eat(2) }` folds the branch to a jump and
/// drops the unreachable `else` arm entirely, leaving a single `Eat(1)`.
#[test]
fn branch_folding_eliminates_dead_arm() {
    let mut program = Program::new();
    let main = program.declare_function("main", vec![], TypeId::VOID);
    let entry = program.add_block(main, None).unwrap();
    let if_true = program.add_block(main, None).unwrap();
    let if_false = program.add_block(main, None).unwrap();
    let merge = program.add_block(main, None).unwrap();
    program.entry = Some(main);

    let cond = program.const_bool(true);
    program.add_instruction(entry, Op::Branch { cond, if_true, if_false }, TypeId::VOID).unwrap();

    let one = program.const_int(32, 1);
    program.add_instruction(if_true, Op::Eat { args: vec![one] }, TypeId::VOID).unwrap();
    program.add_instruction(if_true, Op::Jump { target: merge }, TypeId::VOID).unwrap();

    let two = program.const_int(32, 2);
    program.add_instruction(if_false, Op::Eat { args: vec![two] }, TypeId::VOID).unwrap();
    program.add_instruction(if_false, Op::Jump { target: merge }, TypeId::VOID).unwrap();

    program.add_instruction(merge, Op::Exit, TypeId::VOID).unwrap();

    verify(&program).unwrap();
    Driver::new(DriverConfig::standard(10)).run(&mut program).unwrap();
    verify(&program).unwrap();

    let ops = all_ops(&program, main);
    assert!(!ops.iter().any(|op| matches!(op, Op::Branch { .. })));
    let eats: Vec<&Op> = ops.iter().filter(|op| matches!(op, Op::Eat { .. })).collect();
    assert_eq!(eats.len(), 1);
    match eats[0] {
        Op::Eat { args } => {
            assert_eq!(args.len(), 1);
            assert_eq!(const_int_value(&program, args[0]), (32, 1));
        }
        _ => unreachable!(),
    }

    let mut interp = Interpreter::new(&program, main, vec![], InterpreterConfig::default()).unwrap();
    interp.run_to_end().unwrap();
    assert_eq!(interp.observations(), &[Value::Integer { width: 32, value: 1 }]);
}

/// A two-field struct allocation, written and read field-by-field through
/// `GetSubPointerStruct`, splits into two scalar allocs and then promotes
/// away entirely: no `Alloc` and no aggregate-shaped op survives.
#[test]
fn aggregate_splitting_then_mem2reg_removes_struct_alloc() {
    let mut program = Program::new();
    let i32_ty = program.types.integer(32);
    let struct_ty = program.types.struct_type("Pair", vec![i32_ty, i32_ty]);
    let ptr_struct_ty = program.types.pointer(struct_ty);
    let ptr_i32_ty = program.types.pointer(i32_ty);

    let main = program.declare_function("main", vec![], TypeId::VOID);
    let entry = program.add_block(main, None).unwrap();
    program.entry = Some(main);

    let alloc = program.add_instruction(entry, Op::Alloc { inner: struct_ty }, ptr_struct_ty).unwrap();
    let p0 = program.add_instruction(entry, Op::GetSubPointerStruct { target: alloc, index: 0 }, ptr_i32_ty).unwrap();
    let ten = program.const_int(32, 10);
    program.add_instruction(entry, Op::Store { pointer: p0, value: ten }, TypeId::VOID).unwrap();
    let p1 = program.add_instruction(entry, Op::GetSubPointerStruct { target: alloc, index: 1 }, ptr_i32_ty).unwrap();
    let twenty = program.const_int(32, 20);
    program.add_instruction(entry, Op::Store { pointer: p1, value: twenty }, TypeId::VOID).unwrap();
    let v0 = program.add_instruction(entry, Op::Load { pointer: p0 }, i32_ty).unwrap();
    let v1 = program.add_instruction(entry, Op::Load { pointer: p1 }, i32_ty).unwrap();
    let sum = program.add_instruction(entry, Op::BinaryOp { op: BinOp::Add, l: v0, r: v1 }, i32_ty).unwrap();
    program.add_instruction(entry, Op::Eat { args: vec![sum] }, TypeId::VOID).unwrap();
    program.add_instruction(entry, Op::Exit, TypeId::VOID).unwrap();

    verify(&program).unwrap();
    Driver::new(DriverConfig::standard(10)).run(&mut program).unwrap();
    verify(&program).unwrap();

    let ops = all_ops(&program, main);
    assert!(!ops.iter().any(|op| matches!(op, Op::Alloc { .. })));
    assert!(!ops
        .iter()
        .any(|op| matches!(op, Op::GetSubPointerStruct { .. } | Op::GetSubValueStruct { .. } | Op::AggregateValue { .. })));

    let mut interp = Interpreter::new(&program, main, vec![], InterpreterConfig::default()).unwrap();
    interp.run_to_end().unwrap();
    assert_eq!(interp.observations(), &[Value::Integer { width: 32, value: 30 }]);
}
