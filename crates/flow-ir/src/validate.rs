//! IR well-formedness checks.
//!
//! Run after generation and after the pass pipeline in debug paths and
//! tests. Checks the structural invariants the code generator relies on:
//! every live block is terminated, jump targets are live, registers are
//! defined before use, phis sit at block heads, and `Ret` carries a
//! constant boolean.

use std::collections::HashSet;

use crate::ir::{
    Constant, ConstId, InstrKind, IrHandler, IrProgram, Operand, Terminator, VReg,
};

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingTerminator { handler: String, block: String },
    DeadJumpTarget { handler: String, block: String },
    UndefinedRegister { handler: String, reg: VReg },
    RedefinedRegister { handler: String, reg: VReg },
    MisplacedPhi { handler: String, block: String },
    NonConstantRet { handler: String },
    NonBooleanRet { handler: String },
    BadNativeArity { handler: String, native: u32 },
    BadConstant { handler: String, id: ConstId },
}

/// Validate every handler of the program.
pub fn validate(program: &IrProgram) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for handler in &program.handlers {
        validate_handler(program, handler, &mut errors);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_handler(program: &IrProgram, handler: &IrHandler, errors: &mut Vec<ValidationError>) {
    let live: HashSet<_> = handler.order.iter().copied().collect();
    let mut defined: HashSet<VReg> = HashSet::new();

    // Definitions are collected in emission order; Flow's CFG is a DAG
    // emitted in control-flow order, so a use before its emission-order
    // definition is always a genuine violation.
    for block in handler.ordered_blocks() {
        for (index, instr) in block.instrs.iter().enumerate() {
            if matches!(instr.kind, InstrKind::Phi { .. }) && index != 0 {
                errors.push(ValidationError::MisplacedPhi {
                    handler: handler.name.clone(),
                    block: block.label.clone(),
                });
            }

            for operand in instr.operands() {
                if let Operand::Reg(reg) = operand {
                    if !defined.contains(&reg) && !is_alloca(handler, reg) {
                        errors.push(ValidationError::UndefinedRegister {
                            handler: handler.name.clone(),
                            reg,
                        });
                    }
                }
            }

            if let Some(dst) = instr.dst {
                if !defined.insert(dst) {
                    errors.push(ValidationError::RedefinedRegister {
                        handler: handler.name.clone(),
                        reg: dst,
                    });
                }
            }

            if let InstrKind::Call { native, args } | InstrKind::HandlerCall { native, args } =
                &instr.kind
            {
                let reference = program.native(*native);
                if reference.signature.arity() != args.len() {
                    errors.push(ValidationError::BadNativeArity {
                        handler: handler.name.clone(),
                        native: native.0,
                    });
                }
            }
        }

        match &block.terminator {
            None => errors.push(ValidationError::MissingTerminator {
                handler: handler.name.clone(),
                block: block.label.clone(),
            }),
            Some(term) => {
                for succ in term.successors() {
                    if !live.contains(&succ) {
                        errors.push(ValidationError::DeadJumpTarget {
                            handler: handler.name.clone(),
                            block: block.label.clone(),
                        });
                    }
                }
                for operand in term.operands() {
                    if let Operand::Reg(reg) = operand {
                        if !defined.contains(&reg) {
                            errors.push(ValidationError::UndefinedRegister {
                                handler: handler.name.clone(),
                                reg,
                            });
                        }
                    }
                }
                if let Terminator::Ret { value } = term {
                    match value {
                        Operand::Const(id) => {
                            if !matches!(program.constants.get(*id), Constant::Bool(_)) {
                                errors.push(ValidationError::NonBooleanRet {
                                    handler: handler.name.clone(),
                                });
                            }
                        }
                        Operand::Reg(_) => errors.push(ValidationError::NonConstantRet {
                            handler: handler.name.clone(),
                        }),
                    }
                }
                if let Terminator::Match { cases, .. } = term {
                    for (label, _) in cases {
                        if !matches!(
                            program.constants.get(*label),
                            Constant::Str(_) | Constant::Regex(_)
                        ) {
                            errors.push(ValidationError::BadConstant {
                                handler: handler.name.clone(),
                                id: *label,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Allocas may be referenced (as variable slots) from blocks emitted
/// before their hoisted definition is reached in iteration order; they all
/// live in the entry block, which dominates everything.
fn is_alloca(handler: &IrHandler, reg: VReg) -> bool {
    handler
        .block(handler.entry())
        .instrs
        .iter()
        .any(|i| matches!(i.kind, InstrKind::Alloca) && i.dst == Some(reg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::IrProgram;

    #[test]
    fn valid_minimal_handler() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        b.create_ret(false);
        assert!(validate(&program).is_ok());
    }

    #[test]
    fn missing_terminator_is_flagged() {
        let mut program = IrProgram::new();
        let _ = IrBuilder::new_handler(&mut program, "main");
        let errors = validate(&program).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::MissingTerminator { .. }
        ));
    }

    #[test]
    fn ret_must_be_constant_boolean() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let value = b.const_int(1);
        let insert = b.insert_point();
        b.handler_mut().block_mut(insert).terminator =
            Some(crate::ir::Terminator::Ret { value });
        let errors = validate(&program).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::NonBooleanRet { .. })));
    }

    #[test]
    fn jump_to_removed_block_is_flagged() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let dead = b.create_block("dead");
        b.create_br(dead);
        b.set_insert_point(dead);
        b.create_ret(false);
        let handler = program.handler_mut("main").unwrap();
        handler.order.retain(|id| *id != dead);
        let errors = validate(&program).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DeadJumpTarget { .. })));
    }
}
