//! IR → bytecode lowering.
//!
//! Emits each handler's blocks in emission order into a linear stream of
//! packed instructions while modelling the runtime operand stack at
//! compile time (the *shadow stack*). Variables live in slots (`ALLOCA`
//! reserves one; `LOAD`/`STORE` address them); the operand stack carries
//! only expression temporaries. The stack pointer is always the shadow
//! stack's length; there is no separately tracked counter.
//!
//! Pure single-use instructions are not emitted where they appear in the
//! IR: they materialize at their use site, so operand trees evaluate in
//! stack order and no load is emitted for a value that is already on top.
//! The consequence is the static guarantee the runner relies on: the
//! operand-stack depth at every program counter is uniquely determined,
//! and the stack drains to empty at every block boundary.
//!
//! Jumps and match tables are emitted as placeholders recording their
//! target blocks and patched to final program counters once every block's
//! entry point is known.
//!
//! Codegen failures (unsupported cast, missing value, oversized handler)
//! are accumulated in the [`Report`] as `TypeError`s; emission continues
//! so one compilation surfaces every problem at once.

use indexmap::IndexMap;
use std::collections::HashMap;

use tracing::{debug, trace};

use flow_core::{FlowType, Report, SourceSpan};
use flow_ir::{
    BinaryIrOp, BlockId, ConstId, Constant, Instr, InstrKind, IrHandler, IrProgram, Operand,
    Terminator, UnaryIrOp, VReg,
};
use flow_vm::pool::{MatchCaseDef, MatchDef};
use flow_vm::{ConstantPool, Instruction, Opcode};

/// Generate the bytecode pool for a whole IR program.
///
/// Returns the populated pool; success is judged by the report.
pub fn generate(program: &IrProgram, report: &mut Report) -> ConstantPool {
    let mut pool = ConstantPool::new();
    pool.set_modules(program.modules.clone());

    // Forward-declare every handler so handler references resolve to
    // stable ids regardless of declaration order.
    for handler in &program.handlers {
        pool.make_handler(&handler.name);
    }

    for handler in &program.handlers {
        let mut generator = HandlerCodegen::new(program, &mut pool, report, handler);
        generator.generate();
    }

    pool
}

/// Per-handler code generator state.
struct HandlerCodegen<'a> {
    program: &'a IrProgram,
    pool: &'a mut ConstantPool,
    report: &'a mut Report,
    handler: &'a IrHandler,
    handler_id: u16,
    code: Vec<Instruction>,
    /// Shadow operand stack: the IR value each runtime cell holds
    /// (`None` for anonymous cells such as constants in flight).
    stack: Vec<Option<VReg>>,
    /// Variable slot assignment, one entry per `Alloca`.
    slots: HashMap<VReg, u16>,
    /// Pure single-use instructions deferred to their use site.
    pending: HashMap<VReg, &'a Instr>,
    /// Pending conditional jumps: target block → (pc, opcode).
    cond_jumps: IndexMap<BlockId, Vec<(usize, Opcode)>>,
    /// Pending unconditional jumps: target block → pcs.
    jumps: IndexMap<BlockId, Vec<usize>>,
    /// Pending match tables: (match id, case blocks, else block).
    match_hints: Vec<(u16, Vec<BlockId>, BlockId)>,
    /// Total uses per register, for deferral and result discarding.
    uses: HashMap<VReg, usize>,
    /// Result type per register, for cast lowering.
    types: HashMap<VReg, FlowType>,
}

impl<'a> HandlerCodegen<'a> {
    fn new(
        program: &'a IrProgram,
        pool: &'a mut ConstantPool,
        report: &'a mut Report,
        handler: &'a IrHandler,
    ) -> Self {
        let handler_id = pool.make_handler(&handler.name);

        let mut uses: HashMap<VReg, usize> = HashMap::new();
        let mut types: HashMap<VReg, FlowType> = HashMap::new();
        for block in handler.ordered_blocks() {
            for instr in &block.instrs {
                if let Some(dst) = instr.dst {
                    types.insert(dst, instr.ty);
                }
                for operand in instr.operands() {
                    if let Operand::Reg(reg) = operand {
                        *uses.entry(reg).or_default() += 1;
                    }
                }
            }
            if let Some(term) = &block.terminator {
                for operand in term.operands() {
                    if let Operand::Reg(reg) = operand {
                        *uses.entry(reg).or_default() += 1;
                    }
                }
            }
        }

        Self {
            program,
            pool,
            report,
            handler,
            handler_id,
            code: Vec::new(),
            stack: Vec::new(),
            slots: HashMap::new(),
            pending: HashMap::new(),
            cond_jumps: IndexMap::new(),
            jumps: IndexMap::new(),
            match_hints: Vec::new(),
            uses,
            types,
        }
    }

    fn generate(&mut self) {
        let mut entry_points: IndexMap<BlockId, usize> = IndexMap::new();

        let handler = self.handler;
        for &block_id in &handler.order {
            entry_points.insert(block_id, self.code.len());
            let block = handler.block(block_id);
            for instr in &block.instrs {
                self.emit_instr(instr);
            }
            match &block.terminator {
                Some(term) => self.emit_terminator(block_id, term),
                None => self.report.type_error(
                    SourceSpan::zero(),
                    format!(
                        "internal: block {} of handler '{}' has no terminator",
                        block.label, self.handler.name
                    ),
                ),
            }
            if !self.stack.is_empty() {
                trace!(
                    handler = %self.handler.name,
                    block = %block.label,
                    depth = self.stack.len(),
                    "operand stack not drained at block end"
                );
            }
        }

        self.patch_jumps(&entry_points);
        self.patch_matches(&entry_points);

        if self.code.len() > u16::MAX as usize {
            self.report.type_error(
                SourceSpan::zero(),
                format!(
                    "handler '{}' exceeds the maximum program size",
                    self.handler.name
                ),
            );
        }

        debug!(
            handler = %self.handler.name,
            instructions = self.code.len(),
            slots = self.slots.len(),
            "generated bytecode"
        );
        self.pool
            .set_handler_code(self.handler_id, std::mem::take(&mut self.code));
    }

    // {{{ emission primitives
    fn emit(&mut self, instr: Instruction) -> usize {
        let pc = self.code.len();
        self.code.push(instr);
        pc
    }

    fn push(&mut self, value: Option<VReg>) {
        self.stack.push(value);
    }

    fn pop(&mut self, count: usize, span: SourceSpan) {
        for _ in 0..count {
            if self.stack.pop().is_none() {
                self.report.type_error(
                    span,
                    format!(
                        "internal: shadow stack underflow in handler '{}'",
                        self.handler.name
                    ),
                );
                return;
            }
        }
    }

    fn used(&self, reg: VReg) -> usize {
        self.uses.get(&reg).copied().unwrap_or(0)
    }

    fn operand_type(&self, operand: Operand) -> FlowType {
        match operand {
            Operand::Const(id) => self.program.constants.get(id).type_of(),
            Operand::Reg(reg) => self.types.get(&reg).copied().unwrap_or(FlowType::Void),
        }
    }

    /// Whether this instruction may be deferred to its single use site.
    ///
    /// Calls qualify too: operand trees materialize left-to-right at the
    /// consuming instruction, which is exactly the source evaluation
    /// order, and statement roots (stores, handler calls, discarded
    /// calls, terminators) are never deferred.
    fn deferrable(&self, instr: &Instr) -> bool {
        matches!(
            instr.kind,
            InstrKind::Load { .. }
                | InstrKind::Cast { .. }
                | InstrKind::Unary { .. }
                | InstrKind::Binary { .. }
                | InstrKind::Call { .. }
        ) && instr.dst.map(|d| self.used(d) == 1).unwrap_or(false)
    }

    /// Arrange the operands on top of the runtime stack, in order.
    ///
    /// The longest suffix of the shadow stack already matching a prefix of
    /// `args` is consumed in place; the remaining operands are emitted on
    /// top (constants re-load, deferred instructions materialize here).
    fn emit_args(&mut self, args: &[Operand], span: SourceSpan) {
        let mut in_place = 0;
        let max = args.len().min(self.stack.len());
        for k in (1..=max).rev() {
            let tail = &self.stack[self.stack.len() - k..];
            let matches = args[..k].iter().zip(tail).all(|(arg, cell)| {
                matches!(
                    (arg, cell),
                    (Operand::Reg(reg), Some(held))
                        if reg == held && self.used(*reg) == 1
                )
            });
            if matches {
                in_place = k;
                break;
            }
        }
        for arg in &args[in_place..] {
            self.emit_operand(*arg, span);
        }
    }

    /// Emit one operand onto the stack top.
    fn emit_operand(&mut self, operand: Operand, span: SourceSpan) {
        match operand {
            Operand::Const(id) => self.emit_constant(id, span),
            Operand::Reg(reg) => {
                if let Some(instr) = self.pending.remove(&reg) {
                    self.emit_now(instr);
                    return;
                }
                // An eagerly emitted value is consumable only from the top;
                // operand trees drain in order, so anything else is
                // malformed IR.
                if self.stack.last() == Some(&Some(reg)) && self.used(reg) == 1 {
                    return;
                }
                self.report.type_error(
                    span,
                    format!(
                        "internal: value {reg} is not consumable in stack order in '{}'",
                        self.handler.name
                    ),
                );
                self.emit(Instruction::op1(Opcode::ILOAD, 0));
                self.push(None);
            }
        }
    }

    fn emit_constant(&mut self, id: ConstId, span: SourceSpan) {
        let constant = self.program.constants.get(id).clone();
        let instr = match constant {
            Constant::Bool(b) => Instruction::op1(Opcode::ILOAD, b as u16),
            Constant::Int(n) => {
                if (0..=u16::MAX as i64).contains(&n) {
                    Instruction::op1(Opcode::ILOAD, n as u16)
                } else {
                    let id = self.pool.make_number(n);
                    Instruction::op1(Opcode::NLOAD, id)
                }
            }
            Constant::Str(s) => {
                let id = self.pool.make_string(&s);
                Instruction::op1(Opcode::SLOAD, id)
            }
            Constant::Ip(ip) => {
                let id = self.pool.make_ipaddr(ip);
                Instruction::op1(Opcode::PLOAD, id)
            }
            Constant::Cidr(cidr) => {
                let id = self.pool.make_cidr(cidr);
                Instruction::op1(Opcode::CLOAD, id)
            }
            Constant::Regex(pattern) => match self.pool.make_regex(&pattern) {
                Ok(id) => Instruction::op1(Opcode::RLOAD, id),
                Err(error) => {
                    self.report.link_error(span, error.to_string());
                    Instruction::op1(Opcode::ILOAD, 0)
                }
            },
            Constant::IntArray(xs) => {
                let id = self.pool.make_int_array(xs);
                Instruction::op1(Opcode::ITLOAD, id)
            }
            Constant::StringArray(xs) => {
                let id = self.pool.make_string_array(xs);
                Instruction::op1(Opcode::STLOAD, id)
            }
            Constant::IpAddrArray(xs) => {
                let id = self.pool.make_ipaddr_array(xs);
                Instruction::op1(Opcode::PTLOAD, id)
            }
            Constant::CidrArray(xs) => {
                let id = self.pool.make_cidr_array(xs);
                Instruction::op1(Opcode::CTLOAD, id)
            }
            Constant::HandlerRef(name) => {
                let id = self.pool.make_handler(&name);
                Instruction::op1(Opcode::ILOAD, id)
            }
        };
        self.emit(instr);
        self.push(None);
    }

    fn emit_cond_jump(&mut self, opcode: Opcode, target: BlockId, span: SourceSpan) {
        let pc = self.emit(Instruction::op1(opcode, 0));
        self.pop(1, span);
        self.cond_jumps.entry(target).or_default().push((pc, opcode));
    }

    fn emit_jump(&mut self, target: BlockId) {
        let pc = self.emit(Instruction::op1(Opcode::JMP, 0));
        self.jumps.entry(target).or_default().push(pc);
    }
    // }}}

    // {{{ instructions
    fn emit_instr(&mut self, instr: &'a Instr) {
        if self.deferrable(instr) {
            let dst = instr.dst.expect("deferrable implies dst");
            self.pending.insert(dst, instr);
            return;
        }
        self.emit_now(instr);
    }

    /// Emit an instruction at the current position, deferral already
    /// decided.
    fn emit_now(&mut self, instr: &'a Instr) {
        let span = instr.span;
        match &instr.kind {
            InstrKind::Nop => {
                self.emit(Instruction::op0(Opcode::NOP));
            }
            InstrKind::Alloca => {
                let slot = self.slots.len() as u16;
                if let Some(dst) = instr.dst {
                    self.slots.insert(dst, slot);
                }
                self.emit(Instruction::op1(Opcode::ALLOCA, 1));
            }
            InstrKind::Load { var } => {
                let Some(&slot) = self.slots.get(var) else {
                    self.report.type_error(
                        span,
                        format!(
                            "internal: load of unallocated variable in '{}'",
                            self.handler.name
                        ),
                    );
                    return;
                };
                self.emit(Instruction::op1(Opcode::LOAD, slot));
                self.push(instr.dst);
            }
            InstrKind::Store { var, value } => {
                let Some(&slot) = self.slots.get(var) else {
                    self.report.type_error(
                        span,
                        format!(
                            "internal: store to unallocated variable in '{}'",
                            self.handler.name
                        ),
                    );
                    return;
                };
                self.emit_args(std::slice::from_ref(value), span);
                self.emit(Instruction::op1(Opcode::STORE, slot));
                self.pop(1, span);
            }
            InstrKind::Phi { .. } => {
                self.report.type_error(
                    span,
                    "internal: phi nodes must be eliminated before code generation",
                );
            }
            InstrKind::Call { native, args } => {
                self.emit_args(args, span);
                let reference = self.program.native(*native);
                let returns = reference.signature.return_type() != FlowType::Void;
                let fn_id = self.pool.make_native_function(&reference.signature);
                self.emit(Instruction::new(
                    Opcode::CALL,
                    fn_id,
                    args.len() as u16,
                    returns as u16,
                ));
                self.pop(args.len(), span);
                if returns {
                    self.push(instr.dst);
                    let unused = instr.dst.map(|d| self.used(d) == 0).unwrap_or(true);
                    if unused {
                        self.emit(Instruction::op1(Opcode::DISCARD, 1));
                        self.pop(1, span);
                    }
                }
            }
            InstrKind::HandlerCall { native, args } => {
                self.emit_args(args, span);
                let reference = self.program.native(*native);
                let handler_id = self.pool.make_native_handler(&reference.signature);
                self.emit(Instruction::op2(
                    Opcode::HANDLER,
                    handler_id,
                    args.len() as u16,
                ));
                self.pop(args.len(), span);
            }
            InstrKind::Cast { target, value } => self.emit_cast(*target, *value, instr.dst, span),
            InstrKind::Unary { op, value } => {
                self.emit_args(std::slice::from_ref(value), span);
                let opcode = match op {
                    UnaryIrOp::INeg => Opcode::NNEG,
                    UnaryIrOp::INot => Opcode::NNOT,
                    UnaryIrOp::BNot => Opcode::BNOT,
                    UnaryIrOp::SLen => Opcode::SLEN,
                    UnaryIrOp::SIsEmpty => Opcode::SISEMPTY,
                };
                self.emit(Instruction::op0(opcode));
                self.pop(1, span);
                self.push(instr.dst);
            }
            InstrKind::Binary { op, lhs, rhs } => {
                self.emit_binary(*op, *lhs, *rhs, instr.dst, span)
            }
        }
    }

    fn emit_cast(
        &mut self,
        target: FlowType,
        value: Operand,
        dst: Option<VReg>,
        span: SourceSpan,
    ) {
        let source = self.operand_type(value);
        if source == target {
            // Same-type cast aliases the operand.
            self.emit_args(std::slice::from_ref(&value), span);
            if let Some(top) = self.stack.last_mut() {
                *top = dst;
            }
            return;
        }
        let opcode = match (target, source) {
            (FlowType::String, FlowType::Number) => Opcode::N2S,
            (FlowType::String, FlowType::IPAddress) => Opcode::P2S,
            (FlowType::String, FlowType::Cidr) => Opcode::C2S,
            (FlowType::String, FlowType::RegExp) => Opcode::R2S,
            (FlowType::Number, FlowType::String) => Opcode::S2N,
            _ => {
                self.report.type_error(
                    span,
                    format!("unsupported cast from {source} to {target}"),
                );
                return;
            }
        };
        self.emit_args(std::slice::from_ref(&value), span);
        self.emit(Instruction::op0(opcode));
        self.pop(1, span);
        self.push(dst);
    }

    fn emit_binary(
        &mut self,
        op: BinaryIrOp,
        lhs: Operand,
        rhs: Operand,
        dst: Option<VReg>,
        span: SourceSpan,
    ) {
        // Regex comparison takes its pattern from the constant pool, not
        // the operand stack.
        if op == BinaryIrOp::SCmpRE {
            let pattern = rhs.as_const().map(|id| self.program.constants.get(id));
            let Some(Constant::Regex(pattern)) = pattern.cloned() else {
                self.report
                    .type_error(span, "'=~' requires a literal regex on the right");
                return;
            };
            self.emit_args(std::slice::from_ref(&lhs), span);
            match self.pool.make_regex(&pattern) {
                Ok(regex_id) => {
                    self.emit(Instruction::op1(Opcode::SREGMATCH, regex_id));
                }
                Err(error) => {
                    self.report.link_error(span, error.to_string());
                    self.emit(Instruction::op0(Opcode::NOP));
                }
            }
            self.pop(1, span);
            self.push(dst);
            return;
        }

        // A constant zero divisor is detectable now instead of aborting
        // the runner per request.
        if matches!(op, BinaryIrOp::IDiv | BinaryIrOp::IRem)
            && rhs.as_const().map(|id| self.program.constants.get(id)) == Some(&Constant::Int(0))
        {
            self.report.link_error(span, "division by zero");
            return;
        }

        // Commutative operations keep the literal on the right.
        let swap = op.is_commutative()
            && matches!(lhs, Operand::Const(_))
            && matches!(rhs, Operand::Reg(_));
        if swap {
            self.emit_args(&[rhs, lhs], span);
        } else {
            self.emit_args(&[lhs, rhs], span);
        }
        self.emit(Instruction::op0(binary_opcode(op)));
        self.pop(2, span);
        self.push(dst);
    }
    // }}}

    // {{{ terminators
    fn emit_terminator(&mut self, current: BlockId, term: &Terminator) {
        let span = SourceSpan::zero();
        match term {
            Terminator::Br { target } => {
                // No jump when the target is emitted right after this block.
                if !self.handler.is_next(current, *target) {
                    self.emit_jump(*target);
                }
            }
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                self.emit_args(std::slice::from_ref(cond), span);
                if self.handler.is_next(current, *then_block) {
                    self.emit_cond_jump(Opcode::JZ, *else_block, span);
                } else if self.handler.is_next(current, *else_block) {
                    self.emit_cond_jump(Opcode::JN, *then_block, span);
                } else {
                    self.emit_cond_jump(Opcode::JN, *then_block, span);
                    self.emit_jump(*else_block);
                }
            }
            Terminator::Ret { value } => {
                let result = value
                    .as_const()
                    .map(|id| self.program.constants.get(id).clone());
                match result {
                    Some(Constant::Bool(b)) => {
                        self.emit(Instruction::op1(Opcode::EXIT, b as u16));
                    }
                    _ => self.report.type_error(
                        span,
                        format!(
                            "internal: non-constant handler result in '{}'",
                            self.handler.name
                        ),
                    ),
                }
            }
            Terminator::Match {
                class,
                subject,
                cases,
                else_block,
            } => {
                let mut defs = Vec::with_capacity(cases.len());
                let mut targets = Vec::with_capacity(cases.len());
                for (label, target) in cases {
                    let label_id = match self.program.constants.get(*label) {
                        Constant::Str(s) => {
                            let s = s.clone();
                            self.pool.make_string(&s)
                        }
                        Constant::Regex(p) => {
                            let p = p.clone();
                            match self.pool.make_regex(&p) {
                                Ok(id) => id,
                                Err(error) => {
                                    self.report.link_error(span, error.to_string());
                                    continue;
                                }
                            }
                        }
                        other => {
                            self.report.type_error(
                                span,
                                format!("unsupported match label type {}", other.type_of()),
                            );
                            continue;
                        }
                    };
                    defs.push(MatchCaseDef { label: label_id, pc: 0 });
                    targets.push(*target);
                }

                let match_id = self.pool.make_match_def(MatchDef {
                    handler_id: self.handler_id,
                    class: *class,
                    cases: defs,
                    else_pc: 0,
                });
                self.match_hints.push((match_id, targets, *else_block));

                let opcode = match class {
                    flow_core::MatchClass::Same => Opcode::SMATCHEQ,
                    flow_core::MatchClass::Head => Opcode::SMATCHBEG,
                    flow_core::MatchClass::Tail => Opcode::SMATCHEND,
                    flow_core::MatchClass::RegExp => Opcode::SMATCHR,
                };
                self.emit_args(std::slice::from_ref(subject), span);
                self.emit(Instruction::op1(opcode, match_id));
                self.pop(1, span);
            }
        }
    }
    // }}}

    // {{{ back-patching
    fn patch_jumps(&mut self, entry_points: &IndexMap<BlockId, usize>) {
        for (target, sites) in std::mem::take(&mut self.cond_jumps) {
            let Some(&pc) = entry_points.get(&target) else {
                self.report.type_error(
                    SourceSpan::zero(),
                    format!("internal: jump into removed block in '{}'", self.handler.name),
                );
                continue;
            };
            for (site, opcode) in sites {
                self.code[site] = Instruction::op1(opcode, pc as u16);
            }
        }
        for (target, sites) in std::mem::take(&mut self.jumps) {
            let Some(&pc) = entry_points.get(&target) else {
                self.report.type_error(
                    SourceSpan::zero(),
                    format!("internal: jump into removed block in '{}'", self.handler.name),
                );
                continue;
            };
            for site in sites {
                self.code[site] = Instruction::op1(Opcode::JMP, pc as u16);
            }
        }
    }

    fn patch_matches(&mut self, entry_points: &IndexMap<BlockId, usize>) {
        for (match_id, targets, else_block) in std::mem::take(&mut self.match_hints) {
            let def = self.pool.match_def_mut(match_id);
            for (case, target) in def.cases.iter_mut().zip(&targets) {
                case.pc = entry_points.get(target).copied().unwrap_or(0);
            }
            def.else_pc = entry_points.get(&else_block).copied().unwrap_or(0);
        }
    }
    // }}}
}

fn binary_opcode(op: BinaryIrOp) -> Opcode {
    match op {
        BinaryIrOp::IAdd => Opcode::NADD,
        BinaryIrOp::ISub => Opcode::NSUB,
        BinaryIrOp::IMul => Opcode::NMUL,
        BinaryIrOp::IDiv => Opcode::NDIV,
        BinaryIrOp::IRem => Opcode::NREM,
        BinaryIrOp::IPow => Opcode::NPOW,
        BinaryIrOp::IAnd => Opcode::NAND,
        BinaryIrOp::IOr => Opcode::NOR,
        BinaryIrOp::IXor => Opcode::NXOR,
        BinaryIrOp::IShl => Opcode::NSHL,
        BinaryIrOp::IShr => Opcode::NSHR,
        BinaryIrOp::ICmpEQ => Opcode::NCMPEQ,
        BinaryIrOp::ICmpNE => Opcode::NCMPNE,
        BinaryIrOp::ICmpLE => Opcode::NCMPLE,
        BinaryIrOp::ICmpGE => Opcode::NCMPGE,
        BinaryIrOp::ICmpLT => Opcode::NCMPLT,
        BinaryIrOp::ICmpGT => Opcode::NCMPGT,
        BinaryIrOp::BAnd => Opcode::BAND,
        BinaryIrOp::BOr => Opcode::BOR,
        BinaryIrOp::BXor => Opcode::BXOR,
        BinaryIrOp::SAdd => Opcode::SADD,
        BinaryIrOp::SSubStr => Opcode::SSUBSTR,
        BinaryIrOp::SCmpEQ => Opcode::SCMPEQ,
        BinaryIrOp::SCmpNE => Opcode::SCMPNE,
        BinaryIrOp::SCmpLE => Opcode::SCMPLE,
        BinaryIrOp::SCmpGE => Opcode::SCMPGE,
        BinaryIrOp::SCmpLT => Opcode::SCMPLT,
        BinaryIrOp::SCmpGT => Opcode::SCMPGT,
        BinaryIrOp::SCmpBeg => Opcode::SCMPBEG,
        BinaryIrOp::SCmpEnd => Opcode::SCMPEND,
        BinaryIrOp::SIn => Opcode::SCONTAINS,
        BinaryIrOp::PCmpEQ => Opcode::PCMPEQ,
        BinaryIrOp::PCmpNE => Opcode::PCMPNE,
        BinaryIrOp::PInCidr => Opcode::PINCIDR,
        BinaryIrOp::SCmpRE => unreachable!("regex comparison emitted separately"),
    }
}
