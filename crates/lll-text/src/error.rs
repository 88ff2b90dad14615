//! Errors surfaced while parsing the textual IR. These are bugs in
//! the text, not in the compiler, so they carry a line number rather than
//! a `SourcePosition` (there is no front-end AST behind this text).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextError {
    #[error("line {line}: unexpected end of input, expected {expected}")]
    UnexpectedEof { line: usize, expected: String },

    #[error("line {line}: expected {expected}, found `{found}`")]
    Expected {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("line {line}: unknown type `{name}`")]
    UnknownType { line: usize, name: String },

    #[error("line {line}: unknown mnemonic `{name}`")]
    UnknownMnemonic { line: usize, name: String },

    #[error("line {line}: reference to undeclared name `{name}`")]
    UndeclaredName { line: usize, name: String },

    #[error("line {line}: `{name}` is declared twice")]
    DuplicateName { line: usize, name: String },

    #[error("line {line}: invalid integer literal `{text}`")]
    InvalidInteger { line: usize, text: String },

    #[error("program-level error: {0}")]
    Core(#[from] lll_core::CoreError),
}
