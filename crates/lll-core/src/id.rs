//! Universal node identifier.
//!
//! Every element of a [`crate::program::Program`] -- functions, blocks,
//! instructions, parameters, constants, the undefined value, and the void
//! value -- lives in one flat arena and is addressed by a single `NodeId`.
//! Ids are never reused within a program: once allocated, an id stays
//! associated with the same (possibly later tombstoned) slot.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        assert_eq!(NodeId(7).to_string(), "%7");
    }

    #[test]
    fn ordering_matches_value() {
        assert!(NodeId(1) < NodeId(2));
    }

    #[test]
    fn serde_roundtrip() {
        let id = NodeId(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
