//! Insert-point builder over the IR arenas.
//!
//! The builder owns a mutable borrow of the program, tracks the current
//! handler and insertion block, and provides `create_*` helpers that
//! allocate result registers and intern constants. Both the IR generator
//! and hand-built IR in tests go through this interface.

use flow_core::{FlowType, MatchClass, Signature, SourceSpan};

use crate::ir::{
    BinaryIrOp, BlockId, ConstId, Constant, Instr, InstrKind, IrHandler, IrProgram, NativeId,
    Operand, Terminator, UnaryIrOp, VReg,
};

pub struct IrBuilder<'p> {
    program: &'p mut IrProgram,
    handler: usize,
    insert: BlockId,
}

impl<'p> IrBuilder<'p> {
    /// Start a new handler in `program` and position the builder at its
    /// entry block.
    pub fn new_handler(program: &'p mut IrProgram, name: impl Into<String>) -> Self {
        program.handlers.push(IrHandler::new(name));
        let handler = program.handlers.len() - 1;
        let insert = program.handlers[handler].entry();
        Self {
            program,
            handler,
            insert,
        }
    }

    pub fn program(&mut self) -> &mut IrProgram {
        self.program
    }

    pub fn handler(&self) -> &IrHandler {
        &self.program.handlers[self.handler]
    }

    pub fn handler_mut(&mut self) -> &mut IrHandler {
        &mut self.program.handlers[self.handler]
    }

    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        self.handler_mut().create_block(label)
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.insert = block;
    }

    pub fn insert_point(&self) -> BlockId {
        self.insert
    }

    /// Whether the insertion block already has its terminator.
    pub fn terminated(&self) -> bool {
        self.handler().block(self.insert).terminator.is_some()
    }

    // {{{ constants
    pub fn intern(&mut self, constant: Constant) -> ConstId {
        self.program.constants.intern(constant)
    }

    pub fn const_bool(&mut self, value: bool) -> Operand {
        Operand::Const(self.intern(Constant::Bool(value)))
    }

    pub fn const_int(&mut self, value: i64) -> Operand {
        Operand::Const(self.intern(Constant::Int(value)))
    }

    pub fn const_str(&mut self, value: impl Into<String>) -> Operand {
        Operand::Const(self.intern(Constant::Str(value.into())))
    }

    pub fn native(&mut self, signature: Signature, is_handler: bool) -> NativeId {
        self.program.intern_native(signature, is_handler)
    }
    // }}}

    // {{{ instructions
    /// Insert an instruction that produces a value.
    pub fn insert_instr(&mut self, kind: InstrKind, ty: FlowType, span: SourceSpan) -> VReg {
        let dst = self.handler_mut().alloc_vreg();
        let block = self.insert;
        self.handler_mut().block_mut(block).instrs.push(Instr {
            dst: Some(dst),
            ty,
            kind,
            span,
        });
        dst
    }

    /// Insert an effect-only instruction.
    pub fn insert_void(&mut self, kind: InstrKind, span: SourceSpan) {
        let block = self.insert;
        self.handler_mut().block_mut(block).instrs.push(Instr {
            dst: None,
            ty: FlowType::Void,
            kind,
            span,
        });
    }

    /// Reserve a variable slot in the entry block.
    ///
    /// All `Alloca`s land in the entry block so every slot has the same
    /// stack position on every execution path.
    pub fn create_alloca(&mut self, ty: FlowType, span: SourceSpan) -> VReg {
        let dst = self.handler_mut().alloc_vreg();
        let entry = self.handler().entry();
        self.handler_mut().block_mut(entry).instrs.push(Instr {
            dst: Some(dst),
            ty,
            kind: InstrKind::Alloca,
            span,
        });
        dst
    }

    pub fn create_load(&mut self, var: VReg, ty: FlowType, span: SourceSpan) -> Operand {
        Operand::Reg(self.insert_instr(InstrKind::Load { var }, ty, span))
    }

    pub fn create_store(&mut self, var: VReg, value: Operand, span: SourceSpan) {
        self.insert_void(InstrKind::Store { var, value }, span);
    }

    pub fn create_phi(
        &mut self,
        args: Vec<(BlockId, Operand)>,
        ty: FlowType,
        span: SourceSpan,
    ) -> Operand {
        Operand::Reg(self.insert_instr(InstrKind::Phi { args }, ty, span))
    }

    /// Native function call; returns the result operand unless void.
    pub fn create_call(
        &mut self,
        native: NativeId,
        args: Vec<Operand>,
        return_type: FlowType,
        span: SourceSpan,
    ) -> Option<Operand> {
        if return_type == FlowType::Void {
            self.insert_void(InstrKind::Call { native, args }, span);
            None
        } else {
            Some(Operand::Reg(self.insert_instr(
                InstrKind::Call { native, args },
                return_type,
                span,
            )))
        }
    }

    pub fn create_handler_call(&mut self, native: NativeId, args: Vec<Operand>, span: SourceSpan) {
        self.insert_void(InstrKind::HandlerCall { native, args }, span);
    }

    pub fn create_cast(
        &mut self,
        target: FlowType,
        value: Operand,
        span: SourceSpan,
    ) -> Operand {
        Operand::Reg(self.insert_instr(InstrKind::Cast { target, value }, target, span))
    }

    pub fn create_unary(
        &mut self,
        op: UnaryIrOp,
        value: Operand,
        ty: FlowType,
        span: SourceSpan,
    ) -> Operand {
        Operand::Reg(self.insert_instr(InstrKind::Unary { op, value }, ty, span))
    }

    pub fn create_binary(
        &mut self,
        op: BinaryIrOp,
        lhs: Operand,
        rhs: Operand,
        ty: FlowType,
        span: SourceSpan,
    ) -> Operand {
        Operand::Reg(self.insert_instr(InstrKind::Binary { op, lhs, rhs }, ty, span))
    }
    // }}}

    // {{{ terminators
    fn terminate(&mut self, terminator: Terminator) {
        let block = self.insert;
        let block = self.handler_mut().block_mut(block);
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    pub fn create_br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br { target });
    }

    pub fn create_cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn create_ret(&mut self, value: bool) {
        let value = self.const_bool(value);
        self.terminate(Terminator::Ret { value });
    }

    pub fn create_match(
        &mut self,
        class: MatchClass,
        subject: Operand,
        cases: Vec<(ConstId, BlockId)>,
        else_block: BlockId,
    ) {
        self.terminate(Terminator::Match {
            class,
            subject,
            cases,
            else_block,
        });
    }
    // }}}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_positions_allocas_in_entry() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        let body = b.create_block("body");
        b.set_insert_point(body);
        let var = b.create_alloca(FlowType::Number, SourceSpan::zero());
        let value = b.const_int(1);
        b.create_store(var, value, SourceSpan::zero());
        b.create_ret(false);

        let handler = program.handler("main").unwrap();
        let entry = handler.block(handler.entry());
        assert_eq!(entry.instrs.len(), 1);
        assert!(matches!(entry.instrs[0].kind, InstrKind::Alloca));
        assert_eq!(handler.block(body).instrs.len(), 1);
    }

    #[test]
    fn terminate_does_not_overwrite() {
        let mut program = IrProgram::new();
        let mut b = IrBuilder::new_handler(&mut program, "main");
        b.create_ret(true);
        b.create_ret(false);
        let handler = program.handler("main").unwrap();
        let entry = handler.block(handler.entry());
        let Some(Terminator::Ret { value }) = &entry.terminator else {
            panic!("expected ret");
        };
        assert_eq!(
            program.constants.get(value.as_const().unwrap()),
            &Constant::Bool(true)
        );
    }
}
