//! IR data model.
//!
//! The IR is an arena-backed basic-block graph. All cross-references are
//! typed indices: [`VReg`] for instruction results, [`BlockId`] for blocks,
//! [`ConstId`] for program-wide uniqued constants, [`NativeId`] for
//! referenced native callables. Handlers own their blocks; the program owns
//! the constant table and the native reference table.
//!
//! Blocks live in an arena and are never deallocated during a compilation;
//! the pass pipeline edits each handler's *emission order* instead, which
//! is also what defines "block A is after block B" for the code generator.

use std::fmt;
use std::net::IpAddr;

use indexmap::IndexMap;

use flow_core::{Cidr, FlowType, MatchClass, Signature, SourceSpan};

/// Virtual register: the result of one instruction, assigned exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Basic block identifier within one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Index of a uniqued constant in the program's [`ConstantTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstId(pub u32);

impl fmt::Display for ConstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Index of a referenced native callable in [`IrProgram::natives`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// A program-wide uniqued literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Str(String),
    Ip(IpAddr),
    Cidr(Cidr),
    /// Regex pattern text; compiled when interned into the VM constant pool.
    Regex(String),
    IntArray(Vec<i64>),
    StringArray(Vec<String>),
    IpAddrArray(Vec<IpAddr>),
    CidrArray(Vec<Cidr>),
    /// Reference to a user-defined handler by name.
    HandlerRef(String),
}

impl Constant {
    pub fn type_of(&self) -> FlowType {
        match self {
            Constant::Bool(_) => FlowType::Boolean,
            Constant::Int(_) => FlowType::Number,
            Constant::Str(_) => FlowType::String,
            Constant::Ip(_) => FlowType::IPAddress,
            Constant::Cidr(_) => FlowType::Cidr,
            Constant::Regex(_) => FlowType::RegExp,
            Constant::IntArray(_) => FlowType::IntArray,
            Constant::StringArray(_) => FlowType::StringArray,
            Constant::IpAddrArray(_) => FlowType::IPAddrArray,
            Constant::CidrArray(_) => FlowType::CidrArray,
            Constant::HandlerRef(_) => FlowType::Handler,
        }
    }
}

/// Append-only table of uniqued constants.
///
/// Interning the same literal twice yields the same id; ids stay stable for
/// the lifetime of the program.
#[derive(Debug, Default)]
pub struct ConstantTable {
    entries: Vec<Constant>,
    intern: IndexMap<Constant, ConstId>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, constant: Constant) -> ConstId {
        if let Some(id) = self.intern.get(&constant) {
            return *id;
        }
        let id = ConstId(self.entries.len() as u32);
        self.entries.push(constant.clone());
        self.intern.insert(constant, id);
        id
    }

    pub fn get(&self, id: ConstId) -> &Constant {
        &self.entries[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstId, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, c)| (ConstId(i as u32), c))
    }
}

/// A referenced native callable: the signature is the link key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRef {
    pub signature: Signature,
    pub is_handler: bool,
}

/// Either a uniqued constant or an instruction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Const(ConstId),
    Reg(VReg),
}

impl Operand {
    pub fn as_reg(&self) -> Option<VReg> {
        match self {
            Operand::Reg(reg) => Some(*reg),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<ConstId> {
        match self {
            Operand::Const(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(id) => write!(f, "{id}"),
            Operand::Reg(reg) => write!(f, "{reg}"),
        }
    }
}

/// Unary IR operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryIrOp {
    INeg,
    INot,
    BNot,
    SLen,
    SIsEmpty,
}

/// Binary IR operations, one per bytecode arithmetic/comparison opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryIrOp {
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    IPow,
    IAnd,
    IOr,
    IXor,
    IShl,
    IShr,
    ICmpEQ,
    ICmpNE,
    ICmpLE,
    ICmpGE,
    ICmpLT,
    ICmpGT,
    BAnd,
    BOr,
    BXor,
    SAdd,
    SSubStr,
    SCmpEQ,
    SCmpNE,
    SCmpLE,
    SCmpGE,
    SCmpLT,
    SCmpGT,
    /// String against a constant regex.
    SCmpRE,
    SCmpBeg,
    SCmpEnd,
    /// Substring containment.
    SIn,
    PCmpEQ,
    PCmpNE,
    PInCidr,
}

impl BinaryIrOp {
    /// Commutative operations may swap operands during code generation to
    /// keep a literal on the right.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryIrOp::IAdd
                | BinaryIrOp::IMul
                | BinaryIrOp::IAnd
                | BinaryIrOp::IOr
                | BinaryIrOp::IXor
                | BinaryIrOp::ICmpEQ
                | BinaryIrOp::ICmpNE
                | BinaryIrOp::BAnd
                | BinaryIrOp::BOr
                | BinaryIrOp::BXor
        )
    }
}

/// One non-terminator instruction.
#[derive(Debug, Clone)]
pub struct Instr {
    /// Result register; `None` for pure effects (`Store`, `HandlerCall`,
    /// void `Call`, `Nop`).
    pub dst: Option<VReg>,
    /// Result type (`Void` when `dst` is `None`).
    pub ty: FlowType,
    pub kind: InstrKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum InstrKind {
    Nop,
    /// Reserve a variable slot; `ty` is the variable's type.
    Alloca,
    /// Read a variable slot.
    Load { var: VReg },
    /// Write a variable slot.
    Store { var: VReg, value: Operand },
    /// Join of values at a control-flow merge. Eliminated before codegen.
    Phi { args: Vec<(BlockId, Operand)> },
    /// Native function call; produces a value unless the callee is void.
    Call { native: NativeId, args: Vec<Operand> },
    /// Native handler invocation; may terminate the running handler.
    HandlerCall { native: NativeId, args: Vec<Operand> },
    /// Type conversion per the cast matrix.
    Cast { target: FlowType, value: Operand },
    Unary { op: UnaryIrOp, value: Operand },
    Binary { op: BinaryIrOp, lhs: Operand, rhs: Operand },
}

impl Instr {
    /// All operands read by this instruction.
    pub fn operands(&self) -> Vec<Operand> {
        match &self.kind {
            InstrKind::Nop | InstrKind::Alloca => vec![],
            InstrKind::Load { var } => vec![Operand::Reg(*var)],
            InstrKind::Store { var, value } => vec![Operand::Reg(*var), *value],
            InstrKind::Phi { args } => args.iter().map(|(_, v)| *v).collect(),
            InstrKind::Call { args, .. } | InstrKind::HandlerCall { args, .. } => args.clone(),
            InstrKind::Cast { value, .. } => vec![*value],
            InstrKind::Unary { value, .. } => vec![*value],
            InstrKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }

    /// Rewrite every register operand through `subst`.
    pub fn substitute(&mut self, subst: &dyn Fn(VReg) -> Option<Operand>) {
        let map = |operand: &mut Operand| {
            if let Operand::Reg(reg) = operand {
                if let Some(replacement) = subst(*reg) {
                    *operand = replacement;
                }
            }
        };
        match &mut self.kind {
            InstrKind::Nop | InstrKind::Alloca | InstrKind::Load { .. } => {}
            InstrKind::Store { value, .. } => map(value),
            InstrKind::Phi { args } => args.iter_mut().for_each(|(_, v)| map(v)),
            InstrKind::Call { args, .. } | InstrKind::HandlerCall { args, .. } => {
                args.iter_mut().for_each(map)
            }
            InstrKind::Cast { value, .. } => map(value),
            InstrKind::Unary { value, .. } => map(value),
            InstrKind::Binary { lhs, rhs, .. } => {
                map(lhs);
                map(rhs);
            }
        }
    }

    /// Whether removing this instruction (given a dead result) changes
    /// observable behaviour.
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self.kind,
            InstrKind::Store { .. }
                | InstrKind::Call { .. }
                | InstrKind::HandlerCall { .. }
                | InstrKind::Alloca
        )
    }
}

/// Block terminator.
#[derive(Debug, Clone)]
pub enum Terminator {
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Terminate the handler with a constant boolean result.
    Ret {
        value: Operand,
    },
    /// Multi-way string dispatch.
    Match {
        class: MatchClass,
        subject: Operand,
        /// `(label constant, target block)` per `on` case.
        cases: Vec<(ConstId, BlockId)>,
        else_block: BlockId,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br { target } => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Ret { .. } => vec![],
            Terminator::Match {
                cases, else_block, ..
            } => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*else_block);
                out
            }
        }
    }

    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Terminator::Br { .. } => vec![],
            Terminator::CondBr { cond, .. } => vec![*cond],
            Terminator::Ret { value } => vec![*value],
            Terminator::Match { subject, .. } => vec![*subject],
        }
    }

    /// Rewrite every register operand through `subst`.
    pub fn substitute(&mut self, subst: &dyn Fn(VReg) -> Option<Operand>) {
        let map = |operand: &mut Operand| {
            if let Operand::Reg(reg) = operand {
                if let Some(replacement) = subst(*reg) {
                    *operand = replacement;
                }
            }
        };
        match self {
            Terminator::Br { .. } => {}
            Terminator::CondBr { cond, .. } => map(cond),
            Terminator::Ret { value } => map(value),
            Terminator::Match { subject, .. } => map(subject),
        }
    }

    /// Redirect every edge to `from` onto `to`.
    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        let fix = |b: &mut BlockId| {
            if *b == from {
                *b = to;
            }
        };
        match self {
            Terminator::Br { target } => fix(target),
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => {
                fix(then_block);
                fix(else_block);
            }
            Terminator::Ret { .. } => {}
            Terminator::Match {
                cases, else_block, ..
            } => {
                cases.iter_mut().for_each(|(_, b)| fix(b));
                fix(else_block);
            }
        }
    }
}

/// One basic block.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    /// Debug label (`entry`, `if.then.3`, …).
    pub label: String,
    pub instrs: Vec<Instr>,
    pub terminator: Option<Terminator>,
}

impl Block {
    fn new(id: BlockId, label: String) -> Self {
        Self {
            id,
            label,
            instrs: Vec::new(),
            terminator: None,
        }
    }
}

/// One compiled handler: a block arena plus the emission order.
#[derive(Debug, Clone)]
pub struct IrHandler {
    pub name: String,
    blocks: Vec<Block>,
    /// Live blocks in emission order; the first entry is the entry block.
    pub order: Vec<BlockId>,
    vreg_count: u32,
}

impl IrHandler {
    pub fn new(name: impl Into<String>) -> Self {
        let mut handler = Self {
            name: name.into(),
            blocks: Vec::new(),
            order: Vec::new(),
            vreg_count: 0,
        };
        handler.create_block("entry");
        handler
    }

    pub fn entry(&self) -> BlockId {
        self.order[0]
    }

    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id, label.into()));
        self.order.push(id);
        id
    }

    pub fn alloc_vreg(&mut self) -> VReg {
        let reg = VReg(self.vreg_count);
        self.vreg_count += 1;
        reg
    }

    pub fn vreg_count(&self) -> u32 {
        self.vreg_count
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    /// Live blocks in emission order.
    pub fn ordered_blocks(&self) -> impl Iterator<Item = &Block> {
        self.order.iter().map(|id| self.block(*id))
    }

    /// Position of a block in the emission order, if live.
    pub fn order_index(&self, id: BlockId) -> Option<usize> {
        self.order.iter().position(|b| *b == id)
    }

    /// Whether `b` immediately follows `a` in emission order.
    pub fn is_next(&self, a: BlockId, b: BlockId) -> bool {
        match (self.order_index(a), self.order_index(b)) {
            (Some(ia), Some(ib)) => ib == ia + 1,
            _ => false,
        }
    }

    /// Predecessor blocks of every live block.
    pub fn predecessors(&self) -> IndexMap<BlockId, Vec<BlockId>> {
        let mut preds: IndexMap<BlockId, Vec<BlockId>> = IndexMap::new();
        for id in &self.order {
            preds.entry(*id).or_default();
        }
        for id in &self.order {
            if let Some(term) = &self.block(*id).terminator {
                for succ in term.successors() {
                    preds.entry(succ).or_default().push(*id);
                }
            }
        }
        preds
    }

    /// Pretty-print for debugging and golden tests.
    pub fn pretty_print(&self) -> String {
        let mut out = format!("handler {} {{\n", self.name);
        for block in self.ordered_blocks() {
            out.push_str(&format!("{}: ; {}\n", block.id, block.label));
            for instr in &block.instrs {
                out.push_str(&format!("  {}\n", print_instr(instr)));
            }
            if let Some(term) = &block.terminator {
                out.push_str(&format!("  {}\n", print_terminator(term)));
            }
        }
        out.push_str("}\n");
        out
    }
}

fn print_instr(instr: &Instr) -> String {
    let dst = match instr.dst {
        Some(reg) => format!("{reg} = "),
        None => String::new(),
    };
    let body = match &instr.kind {
        InstrKind::Nop => "nop".to_string(),
        InstrKind::Alloca => format!("alloca {}", instr.ty),
        InstrKind::Load { var } => format!("load {var}"),
        InstrKind::Store { var, value } => format!("store {var}, {value}"),
        InstrKind::Phi { args } => {
            let args: Vec<String> = args.iter().map(|(b, v)| format!("[{b}: {v}]")).collect();
            format!("phi {}", args.join(", "))
        }
        InstrKind::Call { native, args } => format!("call n{} ({})", native.0, join(args)),
        InstrKind::HandlerCall { native, args } => {
            format!("handlercall n{} ({})", native.0, join(args))
        }
        InstrKind::Cast { target, value } => format!("cast {target}, {value}"),
        InstrKind::Unary { op, value } => format!("{op:?} {value}"),
        InstrKind::Binary { op, lhs, rhs } => format!("{op:?} {lhs}, {rhs}"),
    };
    format!("{dst}{body}")
}

fn print_terminator(term: &Terminator) -> String {
    match term {
        Terminator::Br { target } => format!("br {target}"),
        Terminator::CondBr {
            cond,
            then_block,
            else_block,
        } => format!("condbr {cond}, {then_block}, {else_block}"),
        Terminator::Ret { value } => format!("ret {value}"),
        Terminator::Match {
            class,
            subject,
            cases,
            else_block,
        } => {
            let cases: Vec<String> = cases.iter().map(|(c, b)| format!("{c} => {b}")).collect();
            format!(
                "match.{} {subject} [{}] else {else_block}",
                class,
                cases.join(", ")
            )
        }
    }
}

fn join(operands: &[Operand]) -> String {
    operands
        .iter()
        .map(Operand::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The whole IR program: handlers, constants, native references, modules.
#[derive(Debug, Default)]
pub struct IrProgram {
    pub constants: ConstantTable,
    pub handlers: Vec<IrHandler>,
    pub natives: Vec<NativeRef>,
    /// Imported module names, in declaration order.
    pub modules: Vec<String>,
    /// Exported entry points (`setup`, `main`) present in this unit; other
    /// handlers are private and only reachable by inlining or reference.
    pub exports: Vec<String>,
}

impl IrProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self, name: &str) -> Option<&IrHandler> {
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn handler_mut(&mut self, name: &str) -> Option<&mut IrHandler> {
        self.handlers.iter_mut().find(|h| h.name == name)
    }

    /// Intern a native reference, returning a stable id.
    pub fn intern_native(&mut self, signature: Signature, is_handler: bool) -> NativeId {
        if let Some(pos) = self
            .natives
            .iter()
            .position(|n| n.signature == signature && n.is_handler == is_handler)
        {
            return NativeId(pos as u32);
        }
        let id = NativeId(self.natives.len() as u32);
        self.natives.push(NativeRef {
            signature,
            is_handler,
        });
        id
    }

    pub fn native(&self, id: NativeId) -> &NativeRef {
        &self.natives[id.0 as usize]
    }

    pub fn pretty_print(&self) -> String {
        let mut out = String::new();
        for (id, constant) in self.constants.iter() {
            out.push_str(&format!("{id} = {constant:?}\n"));
        }
        for handler in &self.handlers {
            out.push_str(&handler.pretty_print());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_uniqued_and_stable() {
        let mut table = ConstantTable::new();
        let a = table.intern(Constant::Int(42));
        let b = table.intern(Constant::Str("x".into()));
        let c = table.intern(Constant::Int(42));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.get(a), &Constant::Int(42));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn block_order_tracks_creation() {
        let mut handler = IrHandler::new("main");
        let entry = handler.entry();
        let next = handler.create_block("then");
        assert!(handler.is_next(entry, next));
        assert_eq!(handler.order_index(next), Some(1));
    }

    #[test]
    fn predecessors_follow_terminators() {
        let mut handler = IrHandler::new("main");
        let entry = handler.entry();
        let tail = handler.create_block("tail");
        handler.block_mut(entry).terminator = Some(Terminator::Br { target: tail });
        let preds = handler.predecessors();
        assert_eq!(preds[&tail], vec![entry]);
        assert!(preds[&entry].is_empty());
    }

    #[test]
    fn native_interning_discriminates_signatures() {
        let mut program = IrProgram::new();
        let a = program.intern_native(
            Signature::new("log", FlowType::Void, vec![FlowType::String]),
            false,
        );
        let b = program.intern_native(
            Signature::new("log", FlowType::Void, vec![FlowType::Number]),
            false,
        );
        let c = program.intern_native(
            Signature::new("log", FlowType::Void, vec![FlowType::String]),
            false,
        );
        assert_ne!(a, b);
        assert_eq!(a, c);
    }
}
