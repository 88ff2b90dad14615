//! End-to-end check that lowered programs pass structural verification.

use lll_check::verify;
use lll_lower::ast::*;
use lll_lower::lower_program;

fn pos() -> SourcePosition {
    SourcePosition::default()
}

fn number(value: i64) -> Expression {
    Expression::Number { value, pos: pos() }
}

fn ident(name: &str) -> Expression {
    Expression::Identifier { name: name.to_string(), pos: pos() }
}

/// `fun main() -> i32 { var acc: i32 = 0; var i: i32 = 0; while (i < 10) {
///   acc = acc + i; i = i + 1; } return acc; }`
fn counting_loop() -> Program {
    Program {
        toplevels: vec![TopLevel::Function(Function {
            name: "main".to_string(),
            params: vec![],
            ret_type: Some(TypeAnnotation::Simple("i32".to_string())),
            pos: pos(),
            body: CodeBlock {
                statements: vec![
                    Statement::Declaration(Declaration {
                        identifier: "acc".to_string(),
                        mutable: true,
                        ty: Some(TypeAnnotation::Simple("i32".to_string())),
                        value: Some(number(0)),
                        pos: pos(),
                    }),
                    Statement::Declaration(Declaration {
                        identifier: "i".to_string(),
                        mutable: true,
                        ty: Some(TypeAnnotation::Simple("i32".to_string())),
                        value: Some(number(0)),
                        pos: pos(),
                    }),
                    Statement::While(WhileStatement {
                        condition: Expression::BinaryOp {
                            op: BinaryOpType::Lt,
                            l: Box::new(ident("i")),
                            r: Box::new(number(10)),
                            pos: pos(),
                        },
                        body: CodeBlock {
                            statements: vec![
                                Statement::Assignment(Assignment {
                                    target: ident("acc"),
                                    value: Expression::BinaryOp {
                                        op: BinaryOpType::Add,
                                        l: Box::new(ident("acc")),
                                        r: Box::new(ident("i")),
                                        pos: pos(),
                                    },
                                    pos: pos(),
                                }),
                                Statement::Assignment(Assignment {
                                    target: ident("i"),
                                    value: Expression::BinaryOp {
                                        op: BinaryOpType::Add,
                                        l: Box::new(ident("i")),
                                        r: Box::new(number(1)),
                                        pos: pos(),
                                    },
                                    pos: pos(),
                                }),
                            ],
                        },
                        pos: pos(),
                    }),
                    Statement::Return(ReturnStatement {
                        value: Some(ident("acc")),
                        pos: pos(),
                    }),
                ],
            },
        })],
    }
}

/// `struct Point { x: i32, y: i32 }` with a `sum` method, constructed and
/// called from `main`.
fn struct_with_method() -> Program {
    Program {
        toplevels: vec![
            TopLevel::Struct(Struct {
                name: "Point".to_string(),
                properties: vec![
                    Param { name: "x".to_string(), ty: TypeAnnotation::Simple("i32".to_string()) },
                    Param { name: "y".to_string(), ty: TypeAnnotation::Simple("i32".to_string()) },
                ],
                methods: vec![Function {
                    name: "sum".to_string(),
                    params: vec![],
                    ret_type: Some(TypeAnnotation::Simple("i32".to_string())),
                    pos: pos(),
                    body: CodeBlock {
                        statements: vec![Statement::Return(ReturnStatement {
                            value: Some(Expression::BinaryOp {
                                op: BinaryOpType::Add,
                                l: Box::new(Expression::DotIndex {
                                    target: Box::new(Expression::This { pos: pos() }),
                                    name: "x".to_string(),
                                    pos: pos(),
                                }),
                                r: Box::new(Expression::DotIndex {
                                    target: Box::new(Expression::This { pos: pos() }),
                                    name: "y".to_string(),
                                    pos: pos(),
                                }),
                                pos: pos(),
                            }),
                            pos: pos(),
                        })],
                    },
                }],
                pos: pos(),
            }),
            TopLevel::Function(Function {
                name: "main".to_string(),
                params: vec![],
                ret_type: Some(TypeAnnotation::Simple("i32".to_string())),
                pos: pos(),
                body: CodeBlock {
                    statements: vec![
                        Statement::Declaration(Declaration {
                            identifier: "p".to_string(),
                            mutable: false,
                            ty: Some(TypeAnnotation::Simple("Point".to_string())),
                            value: Some(Expression::Call {
                                target: Box::new(ident("Point")),
                                args: vec![number(3), number(4)],
                                pos: pos(),
                            }),
                            pos: pos(),
                        }),
                        Statement::Return(ReturnStatement {
                            value: Some(Expression::Call {
                                target: Box::new(Expression::DotIndex {
                                    target: Box::new(ident("p")),
                                    name: "sum".to_string(),
                                    pos: pos(),
                                }),
                                args: vec![],
                                pos: pos(),
                            }),
                            pos: pos(),
                        }),
                    ],
                },
            }),
        ],
    }
}

#[test]
fn counting_loop_lowers_to_a_verified_program() {
    let program = lower_program(&counting_loop()).expect("lowering succeeds");
    verify(&program).expect("lowered program passes structural verification");
}

#[test]
fn struct_with_method_lowers_to_a_verified_program() {
    let program = lower_program(&struct_with_method()).expect("lowering succeeds");
    verify(&program).expect("lowered program passes structural verification");
}
