//! Reference interpreter for the IR.
//!
//! Executes verified IR directly, with no lowering to a host machine model.
//! Each function invocation gets its own [`CallFrame`]: a value map from
//! instruction node to its computed [`Value`], the block currently
//! executing, and a program counter into that block's instruction list.
//!
//! [`Interpreter::step`] executes exactly one instruction and yields, so a
//! debugger can inspect [`Interpreter::state`] between steps.
//! [`Interpreter::run_to_end`] drives `step` until the run completes or
//! traps.

pub mod state;
pub mod value;

pub use state::{CallFrame, ExecutionState, Interpreter, InterpreterConfig};
pub use value::{PointerValue, Value};
