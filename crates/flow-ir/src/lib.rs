//! SSA-style intermediate representation for the Flow language.
//!
//! The IR sits between the typed AST and the bytecode program:
//!
//! 1. [`generate::generate_ir`] lowers a parsed unit into an
//!    [`ir::IrProgram`] of basic-block graphs;
//! 2. [`transform::PassManager`] runs the optimisation passes to a fixed
//!    point (block cleanup always, the rest at optimisation level ≥ 1);
//! 3. [`validate::validate`] checks the structural invariants the code
//!    generator depends on.
//!
//! Ownership follows the arena pattern: the program owns constants and
//! native references, handlers own block arenas, and all cross-references
//! are typed indices.

pub mod builder;
pub mod generate;
pub mod ir;
pub mod transform;
pub mod validate;

pub use builder::IrBuilder;
pub use generate::generate_ir;
pub use ir::{
    BinaryIrOp, Block, BlockId, ConstId, Constant, ConstantTable, Instr, InstrKind, IrHandler,
    IrProgram, NativeId, NativeRef, Operand, Terminator, UnaryIrOp, VReg,
};
pub use transform::{
    EmptyBlockElimination, HandlerPass, InstructionElimination, MergeBlockPass, PassManager,
    UnusedBlockPass,
};
pub use validate::{validate, ValidationError};
