//! Peephole instruction elimination.
//!
//! Local rewrites, iterated by the pass manager:
//!
//! - pure unary/binary/cast instructions over constants fold to constants
//! - conditional branches on a known boolean become unconditional
//! - a match with no cases becomes a jump to its else block
//! - a load observing a constant store earlier in the same block forwards
//!   the constant
//! - stores to variables that are never loaded, and pure instructions
//!   whose results are never used, are removed

use std::collections::HashMap;

use crate::ir::{
    Constant, ConstantTable, InstrKind, IrHandler, Operand, Terminator, VReg,
};
use crate::transform::HandlerPass;

pub struct InstructionElimination;

impl HandlerPass for InstructionElimination {
    fn name(&self) -> &'static str {
        "InstructionElimination"
    }

    fn run(&self, handler: &mut IrHandler, constants: &mut ConstantTable) -> bool {
        let mut changed = false;
        changed |= fold_const_instrs(handler, constants);
        changed |= fold_const_branches(handler, constants);
        changed |= forward_stores(handler);
        changed |= drop_dead_stores(handler);
        changed |= drop_dead_pure(handler);
        changed
    }
}

/// Fold pure unary/binary instructions whose operands are all constants.
///
/// Division and remainder by a constant zero are left in place; the code
/// generator reports them as link errors.
fn fold_const_instrs(handler: &mut IrHandler, constants: &mut ConstantTable) -> bool {
    let mut subst: HashMap<VReg, Operand> = HashMap::new();

    for id in handler.order.clone() {
        for index in 0..handler.block(id).instrs.len() {
            let instr = &handler.block(id).instrs[index];
            let Some(dst) = instr.dst else { continue };
            let folded = match &instr.kind {
                InstrKind::Unary { op, value } => value
                    .as_const()
                    .and_then(|v| eval_unary(*op, constants.get(v))),
                InstrKind::Binary { op, lhs, rhs } => match (lhs.as_const(), rhs.as_const()) {
                    (Some(l), Some(r)) => {
                        let (l, r) = (constants.get(l).clone(), constants.get(r).clone());
                        eval_binary(*op, &l, &r)
                    }
                    _ => None,
                },
                InstrKind::Cast { target, value } => value
                    .as_const()
                    .and_then(|v| eval_cast(*target, constants.get(v))),
                _ => None,
            };
            if let Some(constant) = folded {
                let operand = Operand::Const(constants.intern(constant));
                subst.insert(dst, operand);
                let instr = &mut handler.block_mut(id).instrs[index];
                instr.kind = InstrKind::Nop;
                instr.dst = None;
            }
        }
    }

    if subst.is_empty() {
        return false;
    }
    for id in handler.order.clone() {
        let block = handler.block_mut(id);
        for instr in &mut block.instrs {
            instr.substitute(&|reg| subst.get(&reg).copied());
        }
        if let Some(term) = &mut block.terminator {
            term.substitute(&|reg| subst.get(&reg).copied());
        }
    }
    sweep_nops(handler);
    true
}

fn eval_unary(op: crate::ir::UnaryIrOp, value: &Constant) -> Option<Constant> {
    use crate::ir::UnaryIrOp::*;
    match (op, value) {
        (INeg, Constant::Int(n)) => Some(Constant::Int(n.wrapping_neg())),
        (INot, Constant::Int(n)) => Some(Constant::Int(!n)),
        (BNot, Constant::Bool(b)) => Some(Constant::Bool(!b)),
        (SLen, Constant::Str(s)) => Some(Constant::Int(s.len() as i64)),
        (SIsEmpty, Constant::Str(s)) => Some(Constant::Bool(s.is_empty())),
        _ => None,
    }
}

fn eval_binary(op: crate::ir::BinaryIrOp, lhs: &Constant, rhs: &Constant) -> Option<Constant> {
    use crate::ir::BinaryIrOp::*;
    match (lhs, rhs) {
        (Constant::Int(a), Constant::Int(b)) => {
            let (a, b) = (*a, *b);
            let int = |n: i64| Some(Constant::Int(n));
            let boolean = |v: bool| Some(Constant::Bool(v));
            match op {
                IAdd => int(a.wrapping_add(b)),
                ISub => int(a.wrapping_sub(b)),
                IMul => int(a.wrapping_mul(b)),
                IDiv if b != 0 => int(a.wrapping_div(b)),
                IRem if b != 0 => int(a.wrapping_rem(b)),
                IPow => int(if b < 0 { 0 } else { a.wrapping_pow(b as u32) }),
                IAnd => int(a & b),
                IOr => int(a | b),
                IXor => int(a ^ b),
                IShl => int(a.wrapping_shl(b as u32)),
                IShr => int(a.wrapping_shr(b as u32)),
                ICmpEQ => boolean(a == b),
                ICmpNE => boolean(a != b),
                ICmpLE => boolean(a <= b),
                ICmpGE => boolean(a >= b),
                ICmpLT => boolean(a < b),
                ICmpGT => boolean(a > b),
                _ => None,
            }
        }
        (Constant::Bool(a), Constant::Bool(b)) => match op {
            BAnd => Some(Constant::Bool(*a && *b)),
            BOr => Some(Constant::Bool(*a || *b)),
            BXor => Some(Constant::Bool(a != b)),
            _ => None,
        },
        (Constant::Str(a), Constant::Str(b)) => match op {
            SAdd => Some(Constant::Str(format!("{a}{b}"))),
            SCmpEQ => Some(Constant::Bool(a == b)),
            SCmpNE => Some(Constant::Bool(a != b)),
            SCmpLE => Some(Constant::Bool(a <= b)),
            SCmpGE => Some(Constant::Bool(a >= b)),
            SCmpLT => Some(Constant::Bool(a < b)),
            SCmpGT => Some(Constant::Bool(a > b)),
            SCmpBeg => Some(Constant::Bool(a.starts_with(b.as_str()))),
            SCmpEnd => Some(Constant::Bool(a.ends_with(b.as_str()))),
            SIn => Some(Constant::Bool(b.contains(a.as_str()))),
            _ => None,
        },
        (Constant::Ip(a), Constant::Ip(b)) => match op {
            PCmpEQ => Some(Constant::Bool(a == b)),
            PCmpNE => Some(Constant::Bool(a != b)),
            _ => None,
        },
        (Constant::Ip(a), Constant::Cidr(b)) => match op {
            PInCidr => Some(Constant::Bool(b.contains(a))),
            _ => None,
        },
        _ => None,
    }
}

fn eval_cast(target: flow_core::FlowType, value: &Constant) -> Option<Constant> {
    use flow_core::FlowType;
    match (target, value) {
        (FlowType::String, Constant::Int(n)) => Some(Constant::Str(n.to_string())),
        (FlowType::String, Constant::Ip(ip)) => Some(Constant::Str(ip.to_string())),
        (FlowType::String, Constant::Cidr(c)) => Some(Constant::Str(c.to_string())),
        (FlowType::String, Constant::Regex(p)) => Some(Constant::Str(p.clone())),
        (FlowType::Number, Constant::Str(s)) => {
            Some(Constant::Int(s.trim().parse::<i64>().unwrap_or(0)))
        }
        _ => None,
    }
}

/// `CondBr` on a constant condition, and empty `Match`.
fn fold_const_branches(handler: &mut IrHandler, constants: &ConstantTable) -> bool {
    let mut changed = false;
    for id in handler.order.clone() {
        let block = handler.block_mut(id);
        let replacement = match &block.terminator {
            Some(Terminator::CondBr {
                cond: Operand::Const(c),
                then_block,
                else_block,
            }) => match constants.get(*c) {
                Constant::Bool(true) => Some(Terminator::Br {
                    target: *then_block,
                }),
                Constant::Bool(false) => Some(Terminator::Br {
                    target: *else_block,
                }),
                _ => None,
            },
            Some(Terminator::Match {
                cases, else_block, ..
            }) if cases.is_empty() => Some(Terminator::Br {
                target: *else_block,
            }),
            _ => None,
        };
        if let Some(term) = replacement {
            block.terminator = Some(term);
            changed = true;
        }
    }
    changed
}

/// Forward constant `Store` values into `Load`s of the same variable later
/// in the same block. Native calls cannot touch Flow locals, so only
/// another store invalidates the tracked value.
///
/// Register values are never forwarded: that would give the stored value a
/// second consumer, and the code generator materializes each register for
/// exactly one.
fn forward_stores(handler: &mut IrHandler) -> bool {
    let mut subst: HashMap<VReg, Operand> = HashMap::new();

    for id in handler.order.clone() {
        let mut known: HashMap<VReg, Operand> = HashMap::new();
        let block = handler.block_mut(id);
        for instr in &mut block.instrs {
            match &instr.kind {
                InstrKind::Store { var, value } => match value {
                    Operand::Const(_) => {
                        known.insert(*var, *value);
                    }
                    Operand::Reg(_) => {
                        known.remove(var);
                    }
                },
                InstrKind::Load { var } => {
                    if let (Some(value), Some(dst)) = (known.get(var), instr.dst) {
                        subst.insert(dst, *value);
                        instr.kind = InstrKind::Nop;
                        instr.dst = None;
                    }
                }
                _ => {}
            }
        }
    }

    if subst.is_empty() {
        return false;
    }

    // Chase substitution chains (a load forwarded to another load's dst).
    let resolve = |reg: VReg| -> Option<Operand> {
        let mut result = *subst.get(&reg)?;
        while let Operand::Reg(next) = result {
            match subst.get(&next) {
                Some(found) => result = *found,
                None => break,
            }
        }
        Some(result)
    };

    for id in handler.order.clone() {
        let block = handler.block_mut(id);
        for instr in &mut block.instrs {
            instr.substitute(&resolve);
        }
        if let Some(term) = &mut block.terminator {
            term.substitute(&resolve);
        }
    }
    sweep_nops(handler);
    true
}

/// Remove stores to variables that are never loaded, then the allocas.
fn drop_dead_stores(handler: &mut IrHandler) -> bool {
    let mut loaded: HashMap<VReg, usize> = HashMap::new();
    let mut allocas: Vec<VReg> = Vec::new();
    for id in &handler.order {
        for instr in &handler.block(*id).instrs {
            match &instr.kind {
                InstrKind::Load { var } => *loaded.entry(*var).or_default() += 1,
                InstrKind::Alloca => {
                    if let Some(dst) = instr.dst {
                        allocas.push(dst);
                    }
                }
                _ => {}
            }
        }
    }

    let dead: Vec<VReg> = allocas
        .into_iter()
        .filter(|var| !loaded.contains_key(var))
        .collect();
    if dead.is_empty() {
        return false;
    }

    let mut changed = false;
    for id in handler.order.clone() {
        let block = handler.block_mut(id);
        for instr in &mut block.instrs {
            let remove = match &instr.kind {
                InstrKind::Store { var, .. } => dead.contains(var),
                InstrKind::Alloca => instr.dst.is_some_and(|d| dead.contains(&d)),
                _ => false,
            };
            if remove {
                instr.kind = InstrKind::Nop;
                instr.dst = None;
                changed = true;
            }
        }
    }
    if changed {
        sweep_nops(handler);
    }
    changed
}

/// Remove side-effect-free instructions whose result is never used.
fn drop_dead_pure(handler: &mut IrHandler) -> bool {
    let mut used: HashMap<VReg, usize> = HashMap::new();
    for id in &handler.order {
        let block = handler.block(*id);
        for instr in &block.instrs {
            for operand in instr.operands() {
                if let Operand::Reg(reg) = operand {
                    *used.entry(reg).or_default() += 1;
                }
            }
        }
        if let Some(term) = &block.terminator {
            for operand in term.operands() {
                if let Operand::Reg(reg) = operand {
                    *used.entry(reg).or_default() += 1;
                }
            }
        }
    }

    let mut changed = false;
    for id in handler.order.clone() {
        let block = handler.block_mut(id);
        for instr in &mut block.instrs {
            let dead = instr
                .dst
                .is_some_and(|dst| !used.contains_key(&dst))
                && !instr.has_side_effect()
                && !matches!(instr.kind, InstrKind::Nop);
            if dead {
                instr.kind = InstrKind::Nop;
                instr.dst = None;
                changed = true;
            }
        }
    }
    if changed {
        sweep_nops(handler);
    }
    changed
}

fn sweep_nops(handler: &mut IrHandler) {
    for id in handler.order.clone() {
        handler
            .block_mut(id)
            .instrs
            .retain(|i| !matches!(i.kind, InstrKind::Nop));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::{BinaryIrOp, IrProgram};
    use flow_core::{FlowType, SourceSpan};

    #[test]
    fn const_condbr_becomes_br() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let then_block = b.create_block("then");
        let else_block = b.create_block("else");
        let cond = b.const_bool(false);
        b.create_cond_br(cond, then_block, else_block);
        b.set_insert_point(then_block);
        b.create_ret(true);
        b.set_insert_point(else_block);
        b.create_ret(false);

        assert!(InstructionElimination.run(&mut program.handlers[0], &mut program.constants));
        let handler = &program.handlers[0];
        let entry = handler.block(handler.entry());
        assert!(
            matches!(entry.terminator, Some(Terminator::Br { target }) if target == else_block)
        );
    }

    #[test]
    fn store_forwards_into_load() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let span = SourceSpan::zero();
        let log = b.native(
            flow_core::Signature::new("log", FlowType::Void, vec![FlowType::Number]),
            false,
        );
        let var = b.create_alloca(FlowType::Number, span);
        let one = b.const_int(1);
        b.create_store(var, one, span);
        let loaded = b.create_load(var, FlowType::Number, span);
        let two = b.const_int(2);
        let sum = b.create_binary(BinaryIrOp::IAdd, loaded, two, FlowType::Number, span);
        b.create_call(log, vec![sum], FlowType::Void, span);
        b.create_ret(false);

        assert!(InstructionElimination.run(&mut program.handlers[0], &mut program.constants));
        let handler = &program.handlers[0];
        let entry = handler.block(handler.entry());
        // the load of `var` was forwarded, so the store and alloca died and
        // the IAdd now reads two constants
        let add = entry
            .instrs
            .iter()
            .find(|i| matches!(i.kind, InstrKind::Binary { .. }))
            .unwrap();
        assert!(add
            .operands()
            .iter()
            .all(|op| matches!(op, Operand::Const(_))));
        assert!(!entry
            .instrs
            .iter()
            .any(|i| matches!(i.kind, InstrKind::Alloca | InstrKind::Store { .. })));
    }

    #[test]
    fn dead_alloca_and_stores_are_removed() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let span = SourceSpan::zero();
        let var = b.create_alloca(FlowType::Number, span);
        let one = b.const_int(1);
        b.create_store(var, one, span);
        b.create_ret(false);

        assert!(InstructionElimination.run(&mut program.handlers[0], &mut program.constants));
        let handler = &program.handlers[0];
        let entry = handler.block(handler.entry());
        assert!(entry.instrs.is_empty(), "{:?}", entry.instrs);
    }

    #[test]
    fn empty_match_becomes_jump_to_else() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let else_block = b.create_block("else");
        let subject = b.const_str("x");
        b.create_match(flow_core::MatchClass::Same, subject, Vec::new(), else_block);
        b.set_insert_point(else_block);
        b.create_ret(false);

        assert!(InstructionElimination.run(&mut program.handlers[0], &mut program.constants));
        let handler = &program.handlers[0];
        let entry = handler.block(handler.entry());
        assert!(
            matches!(entry.terminator, Some(Terminator::Br { target }) if target == else_block)
        );
    }
}
