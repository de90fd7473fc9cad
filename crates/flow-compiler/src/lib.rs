//! The Flow compile pipeline.
//!
//! Source text goes through the full toolchain in one call:
//!
//! ```text
//! parse → IR generation → verify/fold native calls → passes → codegen → link
//! ```
//!
//! All phases write into one [`Report`]; compilation succeeded iff the
//! report carries no error-kind message, in which case a linked
//! [`Program`] is returned.

pub mod codegen;
pub mod verify;

use tracing::{debug, info};

use flow_core::{Report, SourceBuffer, SourceSpan};
use flow_ir::{generate_ir, validate, PassManager};
use flow_lang::parse_unit;
use flow_vm::{Program, Runtime};

pub use codegen::generate;
pub use verify::verify_native_calls;

/// Knobs for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// 0 disables everything but mandatory block cleanup.
    pub optimize: u8,
    /// Require `setup` and `main` handlers to be declared; the daemon
    /// needs both, conformance fixtures often only declare one.
    pub require_entrypoints: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: 1,
            require_entrypoints: false,
        }
    }
}

/// Compile one Flow unit against the host runtime.
pub fn compile(
    buffer: &SourceBuffer,
    runtime: &Runtime,
    options: &CompileOptions,
) -> (Option<Program>, Report) {
    let (unit, mut report) = parse_unit(buffer, runtime);
    if report.has_errors() {
        return (None, report);
    }

    if options.require_entrypoints {
        for entry in ["setup", "main"] {
            if unit.handler(entry).is_none() {
                report.type_error(
                    SourceSpan::zero(),
                    format!("unit must declare handler '{entry}'"),
                );
            }
        }
        if report.has_errors() {
            return (None, report);
        }
    }

    let mut ir = generate_ir(&unit, &mut report);
    if report.has_errors() {
        return (None, report);
    }

    verify_native_calls(&mut ir, runtime, &mut report);
    if report.has_errors() {
        return (None, report);
    }

    PassManager::standard(options.optimize).run(&mut ir);
    if let Err(errors) = validate(&ir) {
        for error in errors {
            report.type_error(SourceSpan::zero(), format!("internal: {error:?}"));
        }
        return (None, report);
    }
    debug!(handlers = ir.handlers.len(), "IR ready for code generation");

    let pool = generate(&ir, &mut report);
    if report.has_errors() {
        return (None, report);
    }

    match Program::link(pool, runtime) {
        Ok(program) => {
            info!(unit = buffer.name(), "compiled flow unit");
            (Some(program), report)
        }
        Err(error) => {
            report.link_error(SourceSpan::zero(), error.to_string());
            (None, report)
        }
    }
}
