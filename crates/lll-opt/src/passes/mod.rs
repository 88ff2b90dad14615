//! The nine optimization passes plus the `Pass` seam the driver dispatches
//! through.

mod aggregate_split;
mod block_simplify;
mod constant_fold;
mod dead_block;
mod dead_function;
mod dead_instruction;
mod dead_signature;
mod inlining;
mod mem2reg;
mod sccp;

pub use aggregate_split::AggregateSplitting;
pub use block_simplify::BlockSimplification;
pub use constant_fold::ConstantFolding;
pub use dead_block::DeadBlockElimination;
pub use dead_function::DeadFunctionElimination;
pub use dead_instruction::DeadInstructionElimination;
pub use dead_signature::DeadSignatureElimination;
pub use inlining::FunctionInlining;
pub use mem2reg::AllocToPhi;
pub use sccp::SparseConditionalConstantPropagation;

use lll_check::DominatorInfo;
use lll_core::{NodeId, Program};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Program,
    Function,
}

/// One optimization pass. A pass is either whole-program (sees the full
/// `Program`, e.g. to delete a function) or per-function (sees one
/// function's dominator info, kept fresh by the driver, which recomputes it
/// only after a pass reports a structural change to that function).
pub trait Pass {
    fn name(&self) -> &'static str;
    fn kind(&self) -> PassKind;

    fn run_program(&self, _program: &mut Program) -> bool {
        false
    }

    fn run_function(&self, _program: &mut Program, _function: NodeId, _dom: &DominatorInfo) -> bool {
        false
    }
}

/// Default pass order: dead-function elim -> dead-signature elim ->
/// inlining -> aggregate splitting -> alloc-to-phi -> constant folding/SCCP
/// -> dead-instruction elim -> block simplify -> dead-block elim.
pub fn default_pipeline(inline_threshold: usize) -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(DeadFunctionElimination),
        Box::new(DeadSignatureElimination),
        Box::new(FunctionInlining { threshold: inline_threshold }),
        Box::new(AggregateSplitting),
        Box::new(AllocToPhi),
        Box::new(ConstantFolding),
        Box::new(SparseConditionalConstantPropagation),
        Box::new(DeadInstructionElimination),
        Box::new(BlockSimplification),
        Box::new(DeadBlockElimination),
    ]
}
