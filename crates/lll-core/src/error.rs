//! Core error types for lll-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! arena/type-interner misuse that `lll-core` itself can detect. Verifier
//! invariants, lowering errors, and runtime errors live in their own
//! crates (`lll-check`, `lll-lower`) per their own error families.

use thiserror::Error;

use crate::id::NodeId;
use crate::types::TypeId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("node not found: {id}")]
    NodeNotFound { id: NodeId },

    #[error("node {id} is a {actual}, expected a {expected}")]
    WrongNodeKind {
        id: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("duplicate function name: '{name}'")]
    DuplicateFunctionName { name: String },

    #[error("type not found: TypeId({id})")]
    TypeNotFound { id: TypeId },

    #[error("node {id} has already been deleted")]
    NodeDeleted { id: NodeId },
}
