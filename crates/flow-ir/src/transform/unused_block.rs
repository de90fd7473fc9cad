//! Removal of blocks unreachable from the entry block.

use std::collections::HashSet;

use crate::ir::{ConstantTable, IrHandler};
use crate::transform::HandlerPass;

/// Drops blocks with no path from entry out of the emission order.
///
/// Mandatory at every optimisation level: the code generator emits exactly
/// the ordered blocks, and stale unreachable blocks would still occupy
/// shadow-stack positions.
pub struct UnusedBlockPass;

impl HandlerPass for UnusedBlockPass {
    fn name(&self) -> &'static str {
        "UnusedBlock"
    }

    fn run(&self, handler: &mut IrHandler, _constants: &mut ConstantTable) -> bool {
        let mut reachable = HashSet::new();
        let mut worklist = vec![handler.entry()];
        while let Some(id) = worklist.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(term) = &handler.block(id).terminator {
                worklist.extend(term.successors());
            }
        }

        let before = handler.order.len();
        handler.order.retain(|id| reachable.contains(id));
        handler.order.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::IrProgram;

    #[test]
    fn unreachable_blocks_are_dropped() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        b.create_ret(false);
        let dead = b.create_block("dead");
        b.set_insert_point(dead);
        b.create_ret(true);

        let handler = program.handler_mut("main").unwrap();
        assert_eq!(handler.order.len(), 2);
        assert!(UnusedBlockPass.run(handler, &mut ConstantTable::new()));
        assert_eq!(handler.order.len(), 1);
        assert!(!UnusedBlockPass.run(handler, &mut ConstantTable::new()));
    }
}
