pub mod error;
pub mod id;
pub mod naming;
pub mod node;
pub mod ops;
pub mod program;
pub mod types;

pub use error::CoreError;
pub use id::NodeId;
pub use naming::NameEnv;
pub use node::{BasicBlock, ConstValue, Function, Instruction, Node, NodeKind};
pub use ops::{BinOp, Op, UnOp};
pub use program::{CoreResult, Program};
pub use types::{Type, TypeId, TypeInterner};
