//! Typed abstract syntax tree.
//!
//! Every node carries a source span; every expression additionally carries
//! the [`FlowType`] the parser resolved for it, so later stages never have
//! to re-derive typing. Call sites are resolved against the native registry
//! during parsing and embed the full [`CallableInfo`] of their callee.

use std::net::IpAddr;

use flow_core::{CallableInfo, Cidr, FlowType, MatchClass, SourceSpan};

/// One parsed compilation unit.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Unit name, taken from the source file name.
    pub name: String,
    pub imports: Vec<Import>,
    pub handlers: Vec<HandlerDecl>,
}

impl Unit {
    pub fn handler(&self, name: &str) -> Option<&HandlerDecl> {
        self.handlers.iter().find(|h| h.name == name)
    }
}

/// `import NAME;` — makes a host module's callables visible to the unit.
#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub span: SourceSpan,
}

/// `handler NAME { … }`.
#[derive(Debug, Clone)]
pub struct HandlerDecl {
    pub name: String,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

/// A statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `{ … }`
    Compound { stmts: Vec<Stmt>, span: SourceSpan },
    /// `name = expr;` — declares the variable on first assignment.
    Assign {
        name: String,
        value: Expr,
        span: SourceSpan,
    },
    /// `if EXPR STMT [else STMT]`
    Cond {
        condition: Expr,
        then_stmt: Box<Stmt>,
        else_stmt: Option<Box<Stmt>>,
        span: SourceSpan,
    },
    /// `match EXPR [=^|=$] { on LIT => STMT … else STMT }`
    Match {
        subject: Expr,
        class: MatchClass,
        cases: Vec<MatchCase>,
        else_stmt: Option<Box<Stmt>>,
        span: SourceSpan,
    },
    /// Call statement: a native function/handler, or a user handler.
    Call {
        target: CallTarget,
        args: Vec<Expr>,
        span: SourceSpan,
    },
}

impl Stmt {
    pub fn span(&self) -> SourceSpan {
        match self {
            Stmt::Compound { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Cond { span, .. }
            | Stmt::Match { span, .. }
            | Stmt::Call { span, .. } => *span,
        }
    }
}

/// What a call statement invokes.
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// A registered native callable (function or handler).
    Native(CallableInfo),
    /// A user-defined handler of this unit, invoked by name.
    Handler(String),
}

/// One `on LIT => STMT` arm of a match.
#[derive(Debug, Clone)]
pub struct MatchCase {
    pub label: Literal,
    pub body: Stmt,
    pub span: SourceSpan,
}

/// A typed expression.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: FlowType,
    pub span: SourceSpan,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: FlowType, span: SourceSpan) -> Self {
        Self { kind, ty, span }
    }

    /// The literal inside, if this is a literal expression.
    pub fn literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    /// Reference to a local variable.
    Var(String),
    /// Reference to a user-defined handler (type `Handler`).
    HandlerRef(String),
    /// Call of a native function in expression position.
    Call {
        callable: CallableInfo,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Implicit conversion inserted by the parser (the cast matrix).
    Cast {
        target: FlowType,
        operand: Box<Expr>,
    },
}

/// A literal of any Flow type, including array literals.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Number(i64),
    String(String),
    IpAddr(IpAddr),
    Cidr(Cidr),
    /// Regex pattern text without the `/` delimiters.
    Regex(String),
    IntArray(Vec<i64>),
    StringArray(Vec<String>),
    IpAddrArray(Vec<IpAddr>),
    CidrArray(Vec<Cidr>),
}

impl Literal {
    pub fn type_of(&self) -> FlowType {
        match self {
            Literal::Bool(_) => FlowType::Boolean,
            Literal::Number(_) => FlowType::Number,
            Literal::String(_) => FlowType::String,
            Literal::IpAddr(_) => FlowType::IPAddress,
            Literal::Cidr(_) => FlowType::Cidr,
            Literal::Regex(_) => FlowType::RegExp,
            Literal::IntArray(_) => FlowType::IntArray,
            Literal::StringArray(_) => FlowType::StringArray,
            Literal::IpAddrArray(_) => FlowType::IPAddrArray,
            Literal::CidrArray(_) => FlowType::CidrArray,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-` on numbers.
    Neg,
    /// `~` on numbers.
    BitNot,
    /// `!` on booleans.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    /// `&&` — lowered to boolean and (both sides always evaluate).
    LogicAnd,
    /// `||`
    LogicOr,
    /// `=~` string against regex.
    RegexMatch,
    /// `=^` string prefix.
    PrefixMatch,
    /// `=$` string suffix.
    SuffixMatch,
    /// `in` — substring on strings, containment on `IPAddress in Cidr`.
    In,
}
