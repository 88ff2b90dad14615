//! Name environment & text form.
//!
//! Provides deterministic names for printing: block names are reserved in
//! definition order, then instruction names in appearance order, so
//! printing the same (unmutated) program twice produces identical text.
//! Used by verifier error messages and by `lll-text`'s printer.

use std::collections::HashMap;

use crate::id::NodeId;
use crate::program::Program;

pub struct NameEnv {
    names: HashMap<NodeId, String>,
}

impl NameEnv {
    /// Builds a fresh naming for `program`: functions by their own name,
    /// blocks in definition order (`bb0`, `bb1`, ... unless explicitly
    /// named), and instructions in appearance order (`%0`, `%1`, ...),
    /// scoped per function so two functions can each have a `%0`.
    pub fn build(program: &Program) -> Self {
        let mut names = HashMap::new();
        for &func_id in &program.functions {
            let func = match program.node(func_id).ok().and_then(|n| n.as_function()) {
                Some(f) => f,
                None => continue,
            };
            names.insert(func_id, func.name.clone());
            for (param_index, &param_id) in func.params.iter().enumerate() {
                names.insert(param_id, format!("arg{param_index}"));
            }
            let mut instr_counter = 0u32;
            for (block_index, &block_id) in func.blocks.iter().enumerate() {
                let block = program.node(block_id).ok().and_then(|n| n.as_block());
                let block_name = block
                    .and_then(|b| b.name.clone())
                    .unwrap_or_else(|| format!("bb{block_index}"));
                names.insert(block_id, block_name);
                if let Some(block) = block {
                    for &instr_id in &block.instructions {
                        names.insert(instr_id, format!("%{instr_counter}"));
                        instr_counter += 1;
                    }
                }
            }
        }
        NameEnv { names }
    }

    pub fn name(&self, id: NodeId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("%{}", id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Op;
    use crate::types::TypeId;

    #[test]
    fn naming_is_stable_across_rebuilds() {
        let mut program = Program::new();
        let func = program.declare_function("main", vec![], TypeId::VOID);
        let block = program.add_block(func, None).unwrap();
        program
            .add_instruction(block, Op::Exit, TypeId::VOID)
            .unwrap();

        let names1 = NameEnv::build(&program);
        let names2 = NameEnv::build(&program);
        assert_eq!(names1.name(block), names2.name(block));
        assert_eq!(names1.name(func), "main");
        assert_eq!(names1.name(block), "bb0");
    }

    #[test]
    fn instructions_named_in_appearance_order() {
        let mut program = Program::new();
        let func = program.declare_function("main", vec![], TypeId::VOID);
        let block = program.add_block(func, None).unwrap();
        let c1 = program.const_int(32, 1);
        let eat = program
            .add_instruction(block, Op::Eat { args: vec![c1] }, TypeId::VOID)
            .unwrap();
        let exit = program.add_instruction(block, Op::Exit, TypeId::VOID).unwrap();

        let names = NameEnv::build(&program);
        assert_eq!(names.name(eat), "%0");
        assert_eq!(names.name(exit), "%1");
    }
}
