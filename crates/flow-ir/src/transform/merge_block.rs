//! Concatenation of straight-line block pairs.

use crate::ir::{ConstantTable, InstrKind, IrHandler, Terminator};
use crate::transform::HandlerPass;

/// Merges `a -> b` when `a` ends in an unconditional branch to `b` and `b`
/// has no other predecessor. `b`'s instructions move into `a` and `a`
/// takes over `b`'s terminator.
pub struct MergeBlockPass;

impl HandlerPass for MergeBlockPass {
    fn name(&self) -> &'static str {
        "MergeBlock"
    }

    fn run(&self, handler: &mut IrHandler, _constants: &mut ConstantTable) -> bool {
        let mut changed = false;
        loop {
            let Some((a, b)) = find_merge_pair(handler) else {
                break;
            };
            let mut moved = std::mem::take(&mut handler.block_mut(b).instrs);
            let term = handler.block_mut(b).terminator.take();
            let block_a = handler.block_mut(a);
            block_a.instrs.append(&mut moved);
            block_a.terminator = term;
            handler.order.retain(|id| *id != b);
            changed = true;
        }
        changed
    }
}

fn find_merge_pair(handler: &IrHandler) -> Option<(crate::ir::BlockId, crate::ir::BlockId)> {
    let preds = handler.predecessors();
    for id in &handler.order {
        let block = handler.block(*id);
        let Some(Terminator::Br { target }) = &block.terminator else {
            continue;
        };
        if target == id || *target == handler.entry() {
            continue;
        }
        let Some(target_preds) = preds.get(target) else {
            continue;
        };
        if target_preds.len() != 1 {
            continue;
        }
        // Keep phi semantics intact; phi arms name predecessor blocks.
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
    use crate::ir::IrProgram;
    use flow_core::{FlowType, SourceSpan};

    #[test]
    fn straight_line_blocks_collapse() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let mid = b.create_block("mid");
        let tail = b.create_block("tail");
        b.create_br(mid);
        b.set_insert_point(mid);
        let value = b.const_int(1);
        let var = b.create_alloca(FlowType::Number, SourceSpan::zero());
        b.create_store(var, value, SourceSpan::zero());
        b.create_br(tail);
        b.set_insert_point(tail);
        b.create_ret(false);

        let handler = program.handler_mut("main").unwrap();
        assert!(MergeBlockPass.run(handler, &mut ConstantTable::new()));
        // everything folds into the entry block
        assert_eq!(handler.order.len(), 1);
        let entry = handler.block(handler.entry());
        assert!(matches!(entry.terminator, Some(Terminator::Ret { .. })));
    }
}
