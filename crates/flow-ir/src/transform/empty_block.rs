//! Removal of forwarding-only blocks.

use crate::ir::{ConstantTable, InstrKind, IrHandler, Terminator};
use crate::transform::HandlerPass;

/// Drops blocks whose only content is an unconditional `Br`, rewiring
/// every predecessor edge to the branch target.
pub struct EmptyBlockElimination;

impl HandlerPass for EmptyBlockElimination {
    fn name(&self) -> &'static str {
        "EmptyBlockElimination"
    }

    fn run(&self, handler: &mut IrHandler, _constants: &mut ConstantTable) -> bool {
        let mut changed = false;
        loop {
            let Some((empty, target)) = find_empty_block(handler) else {
                break;
            };
            for id in handler.order.clone() {
                if let Some(term) = &mut handler.block_mut(id).terminator {
                    term.retarget(empty, target);
                }
            }
            handler.order.retain(|id| *id != empty);
            changed = true;
        }
        changed
    }
}

fn find_empty_block(handler: &IrHandler) -> Option<(crate::ir::BlockId, crate::ir::BlockId)> {
    for id in &handler.order {
        if *id == handler.entry() {
            continue;
        }
        let block = handler.block(*id);
        if !block.instrs.is_empty() {
            continue;
        }
        let Some(Terminator::Br { target }) = &block.terminator else {
            continue;
        };
        if target == id {
            continue;
        }
        // A phi in the target distinguishes predecessors; rewiring edges
        // would corrupt its arms.
        if handler
            .block(*target)
            .instrs
            .first()
            .is_some_and(|i| matches!(i.kind, InstrKind::Phi { .. }))
        {
            continue;
        }
        return Some((*id, *target));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::{IrProgram, Terminator};

    #[test]
    fn forwarding_block_is_bypassed() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let hop = b.create_block("hop");
        let tail = b.create_block("tail");
        let cond = b.const_bool(true);
        b.create_cond_br(cond, hop, tail);
        b.set_insert_point(hop);
        b.create_br(tail);
        b.set_insert_point(tail);
        b.create_ret(false);

        let handler = program.handler_mut("main").unwrap();
        assert!(EmptyBlockElimination.run(handler, &mut ConstantTable::new()));
        assert_eq!(handler.order.len(), 2);
        let entry = handler.block(handler.entry());
        let Some(Terminator::CondBr {
            then_block,
            else_block,
            ..
        }) = &entry.terminator
        else {
            panic!("expected condbr");
        };
        assert_eq!(then_block, else_block);
    }
}
