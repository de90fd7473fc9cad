//! The Flow virtual machine.
//!
//! Compiled Flow programs are linear streams of packed 64-bit
//! instructions over a shared constant pool. This crate holds:
//!
//! - [`opcode`] — the opcode set and instruction word
//! - [`pool`] — the append-only constant pool and match tables
//! - [`program`] — the immutable linked program
//! - [`runner`] — the per-invocation interpreter with cooperative
//!   suspend/resume
//! - [`native`] / [`params`] — the callback ABI the host registers
//!   callables through
//!
//! Programs are immutable after [`Program::link`] and may be shared by
//! any number of worker threads; each [`Runner`] belongs to exactly one
//! invocation.

pub mod native;
pub mod opcode;
pub mod params;
pub mod pool;
pub mod program;
pub mod runner;

pub use native::{NativeCallback, Runtime, VerifyOutcome};
pub use opcode::{Instruction, Opcode, Operand};
pub use params::Params;
pub use pool::{ConstantPool, MatchCaseDef, MatchDef, PoolError};
pub use program::{LinkError, Program};
pub use runner::{ExecutionError, Outcome, Runner};
