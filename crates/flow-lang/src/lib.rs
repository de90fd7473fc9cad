//! Lexer, parser and typed AST for the Flow configuration language.
//!
//! The entry point is [`parser::parse_unit`]: it lexes the unit, parses it
//! with statement-boundary error recovery, resolves variables and native
//! callables, types every expression, and returns the typed [`ast::Unit`]
//! together with the diagnostic [`flow_core::Report`].

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod print;
pub mod scope;
pub mod stream;

pub use ast::{BinaryOp, CallTarget, Expr, ExprKind, HandlerDecl, Literal, MatchCase, Stmt, UnaryOp, Unit};
pub use parser::parse_unit;
pub use print::print_unit;
