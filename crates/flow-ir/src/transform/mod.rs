//! Optimisation passes and the pass manager.
//!
//! Passes operate per handler and run to a fixed point. `UnusedBlock` is
//! mandatory (the code generator assumes every ordered block is reachable);
//! the remaining passes are enabled at optimisation level ≥ 1.

mod empty_block;
mod instr_elim;
mod merge_block;
mod unused_block;

pub use empty_block::EmptyBlockElimination;
pub use instr_elim::InstructionElimination;
pub use merge_block::MergeBlockPass;
pub use unused_block::UnusedBlockPass;

use tracing::debug;

use crate::ir::{ConstantTable, IrHandler, IrProgram};

/// One rewrite over a single handler.
pub trait HandlerPass {
    fn name(&self) -> &'static str;

    /// Apply the pass once; returns whether anything changed.
    fn run(&self, handler: &mut IrHandler, constants: &mut ConstantTable) -> bool;
}

/// Ordered pass list, applied per handler until nothing changes.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn HandlerPass>>,
}

/// Iteration cap; reaching it means a pass pair keeps undoing each other,
/// which is a bug worth hearing about loudly.
const MAX_ROUNDS: usize = 64;

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard pipeline for an optimisation level.
    pub fn standard(opt_level: u8) -> Self {
        let mut pm = Self::new();
        pm.register(UnusedBlockPass);
        if opt_level >= 1 {
            pm.register(MergeBlockPass);
            pm.register(EmptyBlockElimination);
            pm.register(InstructionElimination);
        }
        pm
    }

    pub fn register<P: HandlerPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn run(&self, program: &mut IrProgram) {
        for handler in &mut program.handlers {
            let mut rounds = 0;
            loop {
                let mut changed = false;
                for pass in &self.passes {
                    if pass.run(handler, &mut program.constants) {
                        debug!(pass = pass.name(), handler = %handler.name, "pass changed IR");
                        changed = true;
                    }
                }
                rounds += 1;
                if !changed {
                    break;
                }
                assert!(
                    rounds < MAX_ROUNDS,
                    "pass pipeline failed to reach a fixed point in handler '{}'",
                    handler.name
                );
            }
        }
    }
}
