//! The optimization driver: an ordered pass list run to a fixed point,
//! with optional post-pass verification and dominator-info memoization.

use std::collections::HashMap;

use lll_check::{verify, DominatorInfo};
use lll_core::{NodeId, Program};
use tracing::{debug, info};

use crate::passes::{default_pipeline, Pass, PassKind};

/// Parameters for [`Driver::run`]: explicit config, not global state.
pub struct DriverConfig {
    pub passes: Vec<Box<dyn Pass>>,
    /// Loop until no pass reports a change. `false` runs the list exactly
    /// once, mainly useful for pass-by-pass test assertions.
    pub repeat: bool,
    /// Verify structural invariants after every pass that reports a change.
    /// Defaults to debug builds only.
    pub verify_after_each_pass: bool,
}

impl DriverConfig {
    /// The default pipeline: dead-function elim -> dead-signature elim ->
    /// inlining -> aggregate splitting -> alloc-to-phi -> constant
    /// folding/SCCP -> dead-instruction elim -> block simplify ->
    /// dead-block elim.
    pub fn standard(inline_threshold: usize) -> Self {
        DriverConfig {
            passes: default_pipeline(inline_threshold),
            repeat: true,
            verify_after_each_pass: cfg!(debug_assertions),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::standard(10)
    }
}

pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Driver { config }
    }

    /// Runs the configured pass list to a fixed point. On a verification
    /// failure after some pass, returns immediately with the failing
    /// invariants; the program is left in whatever (invalid) state that
    /// pass produced, for post-mortem inspection.
    pub fn run(&self, program: &mut Program) -> Result<(), Vec<lll_check::VerifyError>> {
        let mut dom_cache: HashMap<NodeId, DominatorInfo> = HashMap::new();
        loop {
            let mut changed_this_round = false;
            for pass in &self.config.passes {
                let changed = self.run_pass(pass.as_ref(), program, &mut dom_cache);
                if changed {
                    changed_this_round = true;
                    debug!(pass = pass.name(), "pass made changes");
                    if self.config.verify_after_each_pass {
                        verify(program)?;
                    }
                }
            }
            if !changed_this_round || !self.config.repeat {
                break;
            }
        }
        info!(
            instructions = instruction_count(program),
            "optimization pipeline reached a fixed point"
        );
        Ok(())
    }

    /// Runs one pass over `program`. For function-scoped passes, consults
    /// `dom_cache` instead of recomputing dominance for every pass
    /// invocation, and evicts a function's entry only when some pass
    /// reports a change to it -- dominance is only ever invalidated by a
    /// structural change, never by which pass ran last.
    fn run_pass(
        &self,
        pass: &dyn Pass,
        program: &mut Program,
        dom_cache: &mut HashMap<NodeId, DominatorInfo>,
    ) -> bool {
        match pass.kind() {
            PassKind::Program => pass.run_program(program),
            PassKind::Function => {
                let mut any = false;
                let functions: Vec<NodeId> = program.functions.clone();
                for function in functions {
                    if !program.contains(function) {
                        dom_cache.remove(&function);
                        continue;
                    }
                    if !dom_cache.contains_key(&function) {
                        match DominatorInfo::compute(program, function) {
                            Ok(dom) => {
                                dom_cache.insert(function, dom);
                            }
                            Err(_) => continue,
                        }
                    }
                    let dom = dom_cache.get(&function).expect("just inserted or present");
                    if pass.run_function(program, function, dom) {
                        any = true;
                        dom_cache.remove(&function);
                    }
                }
                any
            }
        }
    }
}

fn instruction_count(program: &Program) -> usize {
    program
        .functions
        .iter()
        .filter_map(|&f| program.node(f).ok())
        .filter_map(|n| n.as_function())
        .flat_map(|f| f.blocks.iter())
        .filter_map(|&b| program.node(b).ok())
        .filter_map(|n| n.as_block())
        .map(|b| b.instructions.len())
        .sum()
}
