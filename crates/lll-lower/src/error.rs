//! Front-end lowering errors: structured, carry a [`SourcePosition`],
//! surface to the user verbatim, and abort compilation.

use thiserror::Error;

use crate::ast::SourcePosition;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("{pos:?}: unknown identifier `{name}`")]
    UnknownIdentifier { name: String, pos: SourcePosition },

    #[error("{pos:?}: `{name}` is already declared in this scope")]
    DuplicateDeclaration { name: String, pos: SourcePosition },

    #[error("{pos:?}: cannot assign to immutable binding `{name}`")]
    AssignToImmutable { name: String, pos: SourcePosition },

    #[error("{pos:?}: illegal assignment target")]
    IllegalAssignTarget { pos: SourcePosition },

    #[error("{pos:?}: declaration of `{name}` needs a type annotation or an initializer")]
    MissingTypeDeclaration { name: String, pos: SourcePosition },

    #[error("{pos:?}: unknown type `{name}`")]
    IllegalType { name: String, pos: SourcePosition },

    #[error("{pos:?}: type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        pos: SourcePosition,
    },

    #[error("{pos:?}: call expects {expected} argument(s), got {actual}")]
    ArgumentMismatch {
        expected: usize,
        actual: usize,
        pos: SourcePosition,
    },

    #[error("{pos:?}: illegal call target")]
    IllegalCallTarget { pos: SourcePosition },

    #[error("{pos:?}: illegal dot-index target")]
    IllegalDotIndexTarget { pos: SourcePosition },

    #[error("{pos:?}: function `{name}` does not return on every path")]
    MissingReturn { name: String, pos: SourcePosition },

    #[error("{pos:?}: `this` used outside of a method body")]
    NotInObjectScope { pos: SourcePosition },

    #[error("{pos:?}: `break` used outside of a loop")]
    BreakOutsideLoop { pos: SourcePosition },

    #[error("{pos:?}: `continue` used outside of a loop")]
    ContinueOutsideLoop { pos: SourcePosition },
}
