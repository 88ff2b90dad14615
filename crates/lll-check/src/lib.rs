//! Structural verification, dominator analysis, and the reference
//! interpreter for the IR defined in `lll-core`.

pub mod dominators;
pub mod error;
pub mod interpreter;
pub mod verify;

pub use dominators::DominatorInfo;
pub use error::{RuntimeError, VerifyError};
pub use interpreter::{CallFrame, ExecutionState, Interpreter, InterpreterConfig, PointerValue, Value};
pub use verify::verify;
