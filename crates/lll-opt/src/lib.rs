//! The optimization pipeline: an ordered, fixed-point driver over ten
//! passes transforming a verified [`lll_core::Program`] in place.

mod driver;
mod passes;

pub use driver::{Driver, DriverConfig};
pub use passes::{
    default_pipeline, AggregateSplitting, AllocToPhi, BlockSimplification, ConstantFolding,
    DeadBlockElimination, DeadFunctionElimination, DeadInstructionElimination, DeadSignatureElimination,
    FunctionInlining, Pass, PassKind, SparseConditionalConstantPropagation,
};
