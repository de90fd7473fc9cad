//! Native-call verification and constant folding.
//!
//! Every `Call`/`HandlerCall` must resolve to a registered callback of the
//! right kind; a miss is a `LinkError` at the call site. Callbacks that
//! registered a verifier hook get consulted when all of a call's operands
//! are compile-time constants: the hook can accept the call, reject it
//! with a message, or fold it into a constant (e.g. `sys.env("PATH")`
//! becomes the captured environment value).

use tracing::debug;

use flow_core::Report;
use flow_ir::{Constant, InstrKind, IrProgram, Operand, VReg};
use flow_vm::{Runtime, VerifyOutcome};

/// Verify all native call sites of `program` against `runtime`.
pub fn verify_native_calls(program: &mut IrProgram, runtime: &Runtime, report: &mut Report) {
    // Split borrows: handlers are rewritten while constants are read and
    // extended.
    let IrProgram {
        constants,
        handlers,
        natives,
        ..
    } = program;

    for handler in handlers.iter_mut() {
        // (dst, replacement constant) collected first, substituted after.
        let mut folds: Vec<(VReg, Constant)> = Vec::new();

        for &block_id in &handler.order {
            for instr in &handler.block(block_id).instrs {
                let (native, args, is_handler_call) = match &instr.kind {
                    InstrKind::Call { native, args } => (*native, args, false),
                    InstrKind::HandlerCall { native, args } => (*native, args, true),
                    _ => continue,
                };
                let reference = &natives[native.0 as usize];
                let signature = &reference.signature;

                let Some((_, callback)) =
                    runtime.find_callback(signature.name(), signature.params())
                else {
                    report.link_error(
                        instr.span,
                        format!("unknown native '{}'", signature.name()),
                    );
                    continue;
                };
                if callback.is_handler() != is_handler_call {
                    report.link_error(
                        instr.span,
                        format!(
                            "native '{}' registered as a {} but called as a {}",
                            signature.name(),
                            kind_name(callback.is_handler()),
                            kind_name(is_handler_call),
                        ),
                    );
                    continue;
                }

                // Verifier hooks only see fully constant call sites.
                let const_args: Option<Vec<Constant>> = args
                    .iter()
                    .map(|a| a.as_const().map(|id| constants.get(id).clone()))
                    .collect();
                let Some(const_args) = const_args else {
                    continue;
                };
                match callback.verify(&const_args) {
                    None | Some(VerifyOutcome::Accept) => {}
                    Some(VerifyOutcome::Reject(message)) => {
                        report.link_error(instr.span, message);
                    }
                    Some(VerifyOutcome::Fold(constant)) => {
                        if constant.type_of() != instr.ty {
                            report.link_error(
                                instr.span,
                                format!(
                                    "verifier for '{}' folded to {}, expected {}",
                                    signature.name(),
                                    constant.type_of(),
                                    instr.ty
                                ),
                            );
                        } else if let Some(dst) = instr.dst {
                            debug!(native = signature.name(), "constant-folded call");
                            folds.push((dst, constant));
                        }
                    }
                }
            }
        }

        if folds.is_empty() {
            continue;
        }

        // Replace each folded call with its constant: drop the call
        // instruction and rewrite every use of its result.
        let resolved: Vec<(VReg, Operand)> = folds
            .into_iter()
            .map(|(dst, constant)| (dst, Operand::Const(constants.intern(constant))))
            .collect();
        let subst = |reg: VReg| -> Option<Operand> {
            resolved
                .iter()
                .find(|(dst, _)| *dst == reg)
                .map(|(_, operand)| *operand)
        };

        for &block_id in &handler.order.clone() {
            let block = handler.block_mut(block_id);
            block.instrs.retain(|instr| {
                !matches!(instr.kind, InstrKind::Call { .. })
                    || instr
                        .dst
                        .map(|dst| subst(dst).is_none())
                        .unwrap_or(true)
            });
            for instr in &mut block.instrs {
                instr.substitute(&subst);
            }
            if let Some(term) = &mut block.terminator {
                term.substitute(&subst);
            }
        }
    }
}

fn kind_name(is_handler: bool) -> &'static str {
    if is_handler {
        "handler"
    } else {
        "function"
    }
}
