//! The linked, immutable program.

use std::fmt::Write as _;

use tracing::debug;

use crate::native::Runtime;
use crate::opcode::{Instruction, Opcode};
use crate::pool::ConstantPool;

/// Failure to resolve a pool signature against the host runtime.
///
/// The verifier reports unresolved natives with source locations before
/// code generation; hitting this during link means host registration
/// changed in between.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("unresolved native function {signature}")]
    UnresolvedFunction { signature: String },
    #[error("unresolved native handler {signature}")]
    UnresolvedHandler { signature: String },
}

/// Constant pool plus per-handler bytecode, immutable once linked.
///
/// Shared by every worker; runners borrow it read-only.
pub struct Program {
    pool: ConstantPool,
    /// Pool native-function id → runtime callback index.
    functions: Vec<u16>,
    /// Pool native-handler id → runtime callback index.
    handlers: Vec<u16>,
}

impl Program {
    /// Resolve every native reference in `pool` against `runtime`.
    pub fn link(pool: ConstantPool, runtime: &Runtime) -> Result<Self, LinkError> {
        let mut functions = Vec::with_capacity(pool.native_functions().len());
        for signature in pool.native_functions() {
            let (index, callback) = runtime
                .find_callback(signature.name(), signature.params())
                .ok_or_else(|| LinkError::UnresolvedFunction {
                    signature: signature.to_string(),
                })?;
            if callback.is_handler() {
                return Err(LinkError::UnresolvedFunction {
                    signature: signature.to_string(),
                });
            }
            functions.push(index);
        }

        let mut handlers = Vec::with_capacity(pool.native_handlers().len());
        for signature in pool.native_handlers() {
            let (index, callback) = runtime
                .find_callback(signature.name(), signature.params())
                .ok_or_else(|| LinkError::UnresolvedHandler {
                    signature: signature.to_string(),
                })?;
            if !callback.is_handler() {
                return Err(LinkError::UnresolvedHandler {
                    signature: signature.to_string(),
                });
            }
            handlers.push(index);
        }

        debug!(
            handlers = pool.handler_count(),
            natives = functions.len() + handlers.len(),
            "program linked"
        );
        Ok(Self {
            pool,
            functions,
            handlers,
        })
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    pub fn handler_id(&self, name: &str) -> Option<u16> {
        self.pool.handler_id(name)
    }

    pub(crate) fn linked_function(&self, pool_id: u16) -> u16 {
        self.functions[pool_id as usize]
    }

    pub(crate) fn linked_handler(&self, pool_id: u16) -> u16 {
        self.handlers[pool_id as usize]
    }

    /// Human-readable listing of one handler's code.
    pub fn disassemble(&self, handler: u16) -> String {
        let mut out = format!(".handler {}\n", self.pool.handler_name(handler));
        for (pc, instr) in self.pool.handler_code(handler).iter().enumerate() {
            let _ = writeln!(out, "  {pc:4}  {}", self.render(*instr));
        }
        out
    }

    /// Listing of the whole program.
    pub fn disassemble_all(&self) -> String {
        (0..self.pool.handler_count() as u16)
            .map(|id| self.disassemble(id))
            .collect()
    }

    fn render(&self, instr: Instruction) -> String {
        let op = instr.opcode();
        let a = instr.a();
        match op {
            Opcode::NLOAD => format!("{:<10}{a} ; {}", op.mnemonic(), self.pool.number(a)),
            Opcode::SLOAD => format!("{:<10}{a} ; {:?}", op.mnemonic(), self.pool.string(a)),
            Opcode::PLOAD => format!("{:<10}{a} ; {}", op.mnemonic(), self.pool.ipaddr(a)),
            Opcode::CLOAD => format!("{:<10}{a} ; {}", op.mnemonic(), self.pool.cidr(a)),
            Opcode::RLOAD | Opcode::SREGMATCH => {
                format!("{:<10}{a} ; /{}/", op.mnemonic(), self.pool.regex_source(a))
            }
            Opcode::CALL => format!(
                "{:<10}{a}, {}, {} ; {}",
                op.mnemonic(),
                instr.b(),
                instr.c(),
                self.pool.native_function(a)
            ),
            Opcode::HANDLER => format!(
                "{:<10}{a}, {} ; {}",
                op.mnemonic(),
                instr.b(),
                self.pool.native_handler(a)
            ),
            Opcode::SMATCHEQ | Opcode::SMATCHBEG | Opcode::SMATCHEND | Opcode::SMATCHR => {
                let def = self.pool.match_def(a);
                format!(
                    "{:<10}{a} ; {} cases, else @{}",
                    op.mnemonic(),
                    def.cases.len(),
                    def.else_pc
                )
            }
            _ => format!("{:<10}{a}, {}, {}", op.mnemonic(), instr.b(), instr.c()),
        }
    }
}
