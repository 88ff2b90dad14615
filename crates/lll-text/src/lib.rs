//! Textual form of the IR: a printer and parser pair satisfying
//! `parse(print(p))` being program-equal to `p` for any verified `p`.

mod equivalence;
mod error;
mod lexer;
mod parser;
mod printer;

pub use equivalence::program_equals;
pub use error::TextError;
pub use parser::parse;
pub use printer::{print, render_type};
