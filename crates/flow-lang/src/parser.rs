//! Recursive-descent parser for Flow.
//!
//! The parser produces a fully typed AST in one pass: names are resolved
//! through the scope stack and the host's [`NativeRegistry`], every
//! expression gets its [`FlowType`], and the implicit casts of the cast
//! matrix are inserted where they make an operation well-typed.
//!
//! Errors never abort the parse. Each diagnostic is pushed into the
//! [`Report`] and the parser synchronizes to the next statement boundary,
//! so a unit with several independent mistakes yields several independent
//! messages.

use logos::Logos;
use tracing::debug;

use flow_core::{
    CallableInfo, ConfigContext, FlowType, MatchClass, NativeRegistry, Report, SourceBuffer,
    SourceSpan, Value,
};

use crate::ast::{
    BinaryOp, CallTarget, Expr, ExprKind, HandlerDecl, Import, Literal, MatchCase, Stmt, UnaryOp,
    Unit,
};
use crate::lexer::Token;
use crate::scope::{ScopeStack, VarInfo};
use crate::stream::TokenStream;

/// Marker for "a diagnostic was already reported; recover".
struct Recover;

type Parsed<T> = Result<T, Recover>;

/// Parse one unit against the host's native registry.
///
/// Always returns a unit (possibly partial); compilation succeeded iff the
/// report carries no error-kind messages.
pub fn parse_unit(buffer: &SourceBuffer, registry: &dyn NativeRegistry) -> (Unit, Report) {
    let mut report = Report::new();
    let stream = TokenStream::lex(buffer);
    let handler_names = scan_handler_names(buffer.source());

    let mut parser = Parser {
        stream,
        registry,
        report: &mut report,
        scopes: ScopeStack::new(),
        handler_names,
        context: ConfigContext::Main,
    };
    let unit = parser.unit(buffer.name());
    debug!(
        handlers = unit.handlers.len(),
        messages = report.len(),
        "parsed unit '{}'",
        unit.name
    );
    (unit, report)
}

/// Pre-scan for handler names so forward references resolve.
fn scan_handler_names(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut lexer = Token::lexer(source);
    let mut after_handler = false;
    while let Some(token) = lexer.next() {
        match token {
            Ok(Token::Handler) => after_handler = true,
            Ok(Token::Ident(name)) if after_handler => {
                names.push(name);
                after_handler = false;
            }
            _ => after_handler = false,
        }
    }
    names
}

struct Parser<'src, 'r> {
    stream: TokenStream<'src>,
    registry: &'r dyn NativeRegistry,
    report: &'r mut Report,
    scopes: ScopeStack,
    handler_names: Vec<String>,
    context: ConfigContext,
}

impl<'src, 'r> Parser<'src, 'r> {
    // {{{ unit level
    fn unit(&mut self, name: &str) -> Unit {
        let mut imports = Vec::new();
        let mut handlers: Vec<HandlerDecl> = Vec::new();

        while let Some(token) = self.stream.peek() {
            match token {
                Token::Import => {
                    if let Ok(import) = self.import_decl() {
                        imports.push(import);
                    } else {
                        self.stream.synchronize();
                    }
                }
                Token::Handler => {
                    if let Ok(handler) = self.handler_decl(&handlers) {
                        handlers.push(handler);
                    }
                }
                _ => {
                    let span = self.stream.current_span();
                    let text = self.unexpected_text();
                    self.report
                        .syntax_error(span, format!("expected 'handler' or 'import', found {text}"));
                    self.stream.advance();
                    self.stream.synchronize();
                }
            }
        }

        Unit {
            name: name.to_string(),
            imports,
            handlers,
        }
    }

    fn import_decl(&mut self) -> Parsed<Import> {
        let start = self.stream.current_pos();
        self.expect(&Token::Import, "'import'")?;
        let module = self.dotted_name()?;
        self.expect(&Token::Semi, "';'")?;
        let span = self.stream.span_from(start);
        if !self.registry.has_module(&module) {
            self.report
                .type_error(span, format!("unknown module '{module}'"));
            return Err(Recover);
        }
        Ok(Import { module, span })
    }

    fn handler_decl(&mut self, seen: &[HandlerDecl]) -> Parsed<HandlerDecl> {
        let start = self.stream.current_pos();
        self.expect(&Token::Handler, "'handler'")?;
        let (name, name_span) = self.ident("handler name")?;
        if seen.iter().any(|h| h.name == name) {
            self.report
                .type_error(name_span, format!("duplicate handler '{name}'"));
        }

        self.context = if name == "setup" {
            ConfigContext::Setup
        } else {
            ConfigContext::Main
        };

        self.expect(&Token::LBrace, "'{'")?;
        self.scopes.push();
        let body = self.stmt_list();
        self.scopes.pop();
        self.expect(&Token::RBrace, "'}'")?;

        Ok(HandlerDecl {
            name,
            body,
            span: self.stream.span_from(start),
        })
    }
    // }}}

    // {{{ statements
    /// Statements until the closing brace (not consumed).
    fn stmt_list(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while let Some(token) = self.stream.peek() {
            if matches!(token, Token::RBrace) {
                break;
            }
            match self.stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(Recover) => self.stream.synchronize(),
            }
        }
        stmts
    }

    fn stmt(&mut self) -> Parsed<Stmt> {
        match self.stream.peek() {
            Some(Token::LBrace) => self.compound_stmt(),
            Some(Token::If) => self.cond_stmt(),
            Some(Token::Match) => self.match_stmt(),
            Some(Token::Semi) => {
                // stray semicolon; harmless
                let span = self.stream.current_span();
                self.stream.advance();
                Ok(Stmt::Compound {
                    stmts: Vec::new(),
                    span,
                })
            }
            Some(Token::Ident(_)) => {
                if matches!(self.stream.peek_nth(1), Some(Token::Assign)) {
                    self.assign_stmt()
                } else {
                    self.call_stmt()
                }
            }
            Some(Token::Error(_)) => {
                let span = self.stream.current_span();
                let text = self.unexpected_text();
                self.report
                    .token_error(span, format!("unrecognized input {text}"));
                self.stream.advance();
                Err(Recover)
            }
            Some(_) => {
                let span = self.stream.current_span();
                let text = self.unexpected_text();
                self.report
                    .syntax_error(span, format!("expected statement, found {text}"));
                self.stream.advance();
                Err(Recover)
            }
            None => {
                self.report
                    .syntax_error(self.stream.current_span(), "unexpected end of file");
                Err(Recover)
            }
        }
    }

    fn compound_stmt(&mut self) -> Parsed<Stmt> {
        let start = self.stream.current_pos();
        self.expect(&Token::LBrace, "'{'")?;
        self.scopes.push();
        let stmts = self.stmt_list();
        self.scopes.pop();
        self.expect(&Token::RBrace, "'}'")?;
        Ok(Stmt::Compound {
            stmts,
            span: self.stream.span_from(start),
        })
    }

    fn cond_stmt(&mut self) -> Parsed<Stmt> {
        let start = self.stream.current_pos();
        self.expect(&Token::If, "'if'")?;
        let condition = self.expr()?;
        if condition.ty != FlowType::Boolean {
            self.report.type_error(
                condition.span,
                format!("if condition must be Boolean, found {}", condition.ty),
            );
            return Err(Recover);
        }
        let then_stmt = Box::new(self.stmt()?);
        let else_stmt = if self.stream.eat(&Token::Else) {
            Some(Box::new(self.stmt()?))
        } else {
            None
        };
        Ok(Stmt::Cond {
            condition,
            then_stmt,
            else_stmt,
            span: self.stream.span_from(start),
        })
    }

    fn match_stmt(&mut self) -> Parsed<Stmt> {
        let start = self.stream.current_pos();
        self.expect(&Token::Match, "'match'")?;

        // Parse the subject above comparison precedence so a `=^`/`=$`
        // match-class operator is left for us rather than eaten as a
        // binary operator.
        let subject = self.binary_expr(PREC_SHIFT)?;
        let subject = self.coerce(subject, FlowType::String).map_err(|subject| {
            self.report.type_error(
                subject.span,
                format!("match subject must be String, found {}", subject.ty),
            );
            Recover
        })?;

        let explicit_class = if self.stream.eat(&Token::PrefixMatch) {
            Some(MatchClass::Head)
        } else if self.stream.eat(&Token::SuffixMatch) {
            Some(MatchClass::Tail)
        } else {
            None
        };

        self.expect(&Token::LBrace, "'{'")?;
        let mut cases = Vec::new();
        let mut else_stmt = None;
        loop {
            match self.stream.peek() {
                Some(Token::On) => {
                    let case_start = self.stream.current_pos();
                    self.stream.advance();
                    let label = self.match_label()?;
                    self.expect(&Token::FatArrow, "'=>'")?;
                    let body = self.stmt()?;
                    cases.push(MatchCase {
                        label,
                        body,
                        span: self.stream.span_from(case_start),
                    });
                }
                Some(Token::Else) => {
                    self.stream.advance();
                    else_stmt = Some(Box::new(self.stmt()?));
                }
                _ => break,
            }
        }
        self.expect(&Token::RBrace, "'}'")?;
        let span = self.stream.span_from(start);

        let class = self.match_class(explicit_class, &cases, span)?;
        Ok(Stmt::Match {
            subject,
            class,
            cases,
            else_stmt,
            span,
        })
    }

    /// A match case label: a string literal, or a regex literal.
    fn match_label(&mut self) -> Parsed<Literal> {
        match self.stream.peek() {
            Some(Token::String(_)) => {
                let Some(Token::String(s)) = self.stream.advance() else {
                    unreachable!()
                };
                Ok(Literal::String(s))
            }
            Some(Token::Slash) => {
                let (pattern, _span) = self.regex_literal()?;
                Ok(Literal::Regex(pattern))
            }
            _ => {
                let span = self.stream.current_span();
                let text = self.unexpected_text();
                self.report.type_error(
                    span,
                    format!("match case label must be a string or regex literal, found {text}"),
                );
                Err(Recover)
            }
        }
    }

    /// Decide the match class from the explicit operator and label kinds.
    fn match_class(
        &mut self,
        explicit: Option<MatchClass>,
        cases: &[MatchCase],
        span: SourceSpan,
    ) -> Parsed<MatchClass> {
        let regex_labels = cases
            .iter()
            .filter(|c| matches!(c.label, Literal::Regex(_)))
            .count();
        if regex_labels > 0 && regex_labels < cases.len() {
            self.report
                .type_error(span, "cannot mix string and regex labels in one match");
            return Err(Recover);
        }
        match explicit {
            Some(class) => {
                if regex_labels > 0 {
                    self.report.type_error(
                        span,
                        format!("regex labels are not allowed in a {class} match"),
                    );
                    return Err(Recover);
                }
                Ok(class)
            }
            None if regex_labels > 0 => Ok(MatchClass::RegExp),
            None => Ok(MatchClass::Same),
        }
    }

    fn assign_stmt(&mut self) -> Parsed<Stmt> {
        let start = self.stream.current_pos();
        let (name, name_span) = self.ident("variable name")?;
        self.expect(&Token::Assign, "'='")?;
        let value = self.expr()?;
        self.expect(&Token::Semi, "';'")?;
        let span = self.stream.span_from(start);

        if value.ty == FlowType::Void {
            self.report
                .type_error(value.span, "cannot assign a void expression");
            return Err(Recover);
        }

        let value = match self.scopes.lookup(&name) {
            Some(var) => {
                let declared = var.ty;
                self.coerce(value, declared).map_err(|value| {
                    self.report.type_error(
                        span,
                        format!(
                            "cannot assign {} to variable '{}' of type {}",
                            value.ty, name, declared
                        ),
                    );
                    Recover
                })?
            }
            None => {
                self.scopes.declare(
                    &name,
                    VarInfo {
                        ty: value.ty,
                        declared_at: name_span,
                    },
                );
                value
            }
        };

        Ok(Stmt::Assign { name, value, span })
    }

    /// Call statement: native call (with or without parentheses) or user
    /// handler invocation.
    fn call_stmt(&mut self) -> Parsed<Stmt> {
        let start = self.stream.current_pos();
        let name = self.dotted_name()?;

        // A bare handler name invokes the handler.
        if !name.contains('.') && self.handler_names.iter().any(|h| h == &name) {
            self.expect(&Token::Semi, "';'")?;
            return Ok(Stmt::Call {
                target: CallTarget::Handler(name),
                args: Vec::new(),
                span: self.stream.span_from(start),
            });
        }

        let args = match self.stream.peek() {
            Some(Token::LParen) => self.paren_args()?,
            Some(Token::Semi) => Vec::new(),
            _ => self.bare_args()?,
        };
        self.expect(&Token::Semi, "';'")?;
        let span = self.stream.span_from(start);

        let (callable, args) = self.resolve_call(&name, args, span)?;
        Ok(Stmt::Call {
            target: CallTarget::Native(callable),
            args,
            span,
        })
    }

    fn paren_args(&mut self) -> Parsed<Vec<Expr>> {
        self.expect(&Token::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.stream.check(&Token::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.stream.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(args)
    }

    fn bare_args(&mut self) -> Parsed<Vec<Expr>> {
        let mut args = vec![self.expr()?];
        while self.stream.eat(&Token::Comma) {
            args.push(self.expr()?);
        }
        Ok(args)
    }
    // }}}

    // {{{ expressions
    fn expr(&mut self) -> Parsed<Expr> {
        self.binary_expr(0)
    }

    /// Precedence-climbing loop for binary operators.
    fn binary_expr(&mut self, min_prec: u8) -> Parsed<Expr> {
        let start = self.stream.current_pos();
        let mut lhs = self.unary_expr()?;

        while let Some(token) = self.stream.peek() {
            let Some((prec, right_assoc, op)) = binary_op_info(token) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.stream.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };

            // `x =~ /pattern/` — the rhs of a regex match is re-scanned.
            let rhs = if op == BinaryOp::RegexMatch && self.stream.check(&Token::Slash) {
                let (pattern, span) = self.regex_literal()?;
                Expr::new(
                    ExprKind::Literal(Literal::Regex(pattern)),
                    FlowType::RegExp,
                    span,
                )
            } else {
                self.binary_expr(next_min)?
            };

            let span = self.stream.span_from(start);
            lhs = self.type_binary(op, lhs, rhs, span)?;
        }

        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Parsed<Expr> {
        let start = self.stream.current_pos();
        let op = match self.stream.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Tilde) => Some(UnaryOp::BitNot),
            _ => None,
        };
        let Some(op) = op else {
            return self.primary_expr();
        };
        self.stream.advance();
        let operand = self.unary_expr()?;
        let span = self.stream.span_from(start);

        let expected = match op {
            UnaryOp::Neg | UnaryOp::BitNot => FlowType::Number,
            UnaryOp::Not => FlowType::Boolean,
        };
        if operand.ty != expected {
            self.report.type_error(
                span,
                format!("operator expects {}, found {}", expected, operand.ty),
            );
            return Err(Recover);
        }
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            expected,
            span,
        ))
    }

    fn primary_expr(&mut self) -> Parsed<Expr> {
        let span = self.stream.current_span();
        match self.stream.peek() {
            Some(Token::Number(_)) => {
                let Some(Token::Number(n)) = self.stream.advance() else {
                    unreachable!()
                };
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Number(n)),
                    FlowType::Number,
                    span,
                ))
            }
            Some(Token::Bool(_)) => {
                let Some(Token::Bool(b)) = self.stream.advance() else {
                    unreachable!()
                };
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Bool(b)),
                    FlowType::Boolean,
                    span,
                ))
            }
            Some(Token::String(_)) => {
                let Some(Token::String(s)) = self.stream.advance() else {
                    unreachable!()
                };
                Ok(Expr::new(
                    ExprKind::Literal(Literal::String(s)),
                    FlowType::String,
                    span,
                ))
            }
            Some(Token::IpV4(_)) | Some(Token::IpV6(_)) => {
                let Some(Token::IpV4(ip) | Token::IpV6(ip)) = self.stream.advance() else {
                    unreachable!()
                };
                Ok(Expr::new(
                    ExprKind::Literal(Literal::IpAddr(ip)),
                    FlowType::IPAddress,
                    span,
                ))
            }
            Some(Token::CidrLiteral(_)) => {
                let Some(Token::CidrLiteral(cidr)) = self.stream.advance() else {
                    unreachable!()
                };
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Cidr(cidr)),
                    FlowType::Cidr,
                    span,
                ))
            }
            Some(Token::Slash) => {
                let (pattern, span) = self.regex_literal()?;
                Ok(Expr::new(
                    ExprKind::Literal(Literal::Regex(pattern)),
                    FlowType::RegExp,
                    span,
                ))
            }
            Some(Token::LParen) => {
                self.stream.advance();
                let inner = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.array_literal(),
            Some(Token::Ident(_)) => self.name_expr(),
            Some(Token::Error(_)) => {
                let text = self.unexpected_text();
                self.report
                    .token_error(span, format!("unrecognized input {text}"));
                self.stream.advance();
                Err(Recover)
            }
            _ => {
                let text = self.unexpected_text();
                self.report
                    .syntax_error(span, format!("expected expression, found {text}"));
                Err(Recover)
            }
        }
    }

    fn regex_literal(&mut self) -> Parsed<(String, SourceSpan)> {
        match self.stream.relex_regex() {
            Ok(result) => Ok(result),
            Err(span) => {
                self.report
                    .token_error(span, "unterminated regex literal");
                Err(Recover)
            }
        }
    }

    /// `[ lit, lit, … ]` — a homogeneous array literal.
    fn array_literal(&mut self) -> Parsed<Expr> {
        let start = self.stream.current_pos();
        self.expect(&Token::LBracket, "'['")?;
        let mut elements = Vec::new();
        if !self.stream.check(&Token::RBracket) {
            loop {
                let negative = self.stream.eat(&Token::Minus);
                let expr = self.primary_expr()?;
                match expr.literal() {
                    Some(Literal::Number(n)) if negative => {
                        elements.push((Literal::Number(n.wrapping_neg()), expr.span))
                    }
                    Some(lit) if !negative => elements.push((lit.clone(), expr.span)),
                    _ => {
                        self.report
                            .type_error(expr.span, "array elements must be literals");
                        return Err(Recover);
                    }
                }
                if !self.stream.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBracket, "']'")?;
        let span = self.stream.span_from(start);

        let Some((first, _)) = elements.first() else {
            self.report
                .type_error(span, "empty array literal has no type");
            return Err(Recover);
        };
        let elem_ty = first.type_of();
        for (lit, lit_span) in &elements {
            if lit.type_of() != elem_ty {
                self.report.type_error(
                    *lit_span,
                    format!(
                        "array element type {} does not match {}",
                        lit.type_of(),
                        elem_ty
                    ),
                );
                return Err(Recover);
            }
        }

        let (literal, ty) = match elem_ty {
            FlowType::Number => (
                Literal::IntArray(
                    elements
                        .iter()
                        .map(|(l, _)| match l {
                            Literal::Number(n) => *n,
                            _ => unreachable!(),
                        })
                        .collect(),
                ),
                FlowType::IntArray,
            ),
            FlowType::String => (
                Literal::StringArray(
                    elements
                        .iter()
                        .map(|(l, _)| match l {
                            Literal::String(s) => s.clone(),
                            _ => unreachable!(),
                        })
                        .collect(),
                ),
                FlowType::StringArray,
            ),
            FlowType::IPAddress => (
                Literal::IpAddrArray(
                    elements
                        .iter()
                        .map(|(l, _)| match l {
                            Literal::IpAddr(ip) => *ip,
                            _ => unreachable!(),
                        })
                        .collect(),
                ),
                FlowType::IPAddrArray,
            ),
            FlowType::Cidr => (
                Literal::CidrArray(
                    elements
                        .iter()
                        .map(|(l, _)| match l {
                            Literal::Cidr(c) => *c,
                            _ => unreachable!(),
                        })
                        .collect(),
                ),
                FlowType::CidrArray,
            ),
            other => {
                self.report
                    .type_error(span, format!("arrays of {other} are not supported"));
                return Err(Recover);
            }
        };

        Ok(Expr::new(ExprKind::Literal(literal), ty, span))
    }

    /// Identifier-led expression: variable, handler reference, or native
    /// function call (dotted names always resolve against the registry).
    fn name_expr(&mut self) -> Parsed<Expr> {
        let start = self.stream.current_pos();
        let name = self.dotted_name()?;

        if self.stream.check(&Token::LParen) {
            let args = self.paren_args()?;
            let span = self.stream.span_from(start);
            let (callable, args) = self.resolve_call(&name, args, span)?;
            return self.call_expr(callable, args, span);
        }

        let span = self.stream.span_from(start);
        if !name.contains('.') {
            if let Some(var) = self.scopes.lookup(&name) {
                return Ok(Expr::new(ExprKind::Var(name), var.ty, span));
            }
            if self.handler_names.iter().any(|h| h == &name) {
                return Ok(Expr::new(
                    ExprKind::HandlerRef(name),
                    FlowType::Handler,
                    span,
                ));
            }
            if self.registry.candidates(&name).is_empty() {
                self.report
                    .type_error(span, format!("unknown variable '{name}'"));
                return Err(Recover);
            }
        }

        // Argument-less native call, e.g. `req.path`.
        let (callable, args) = self.resolve_call(&name, Vec::new(), span)?;
        self.call_expr(callable, args, span)
    }

    fn call_expr(
        &mut self,
        callable: CallableInfo,
        args: Vec<Expr>,
        span: SourceSpan,
    ) -> Parsed<Expr> {
        if callable.is_handler {
            self.report.type_error(
                span,
                format!(
                    "handler '{}' cannot be used in an expression",
                    callable.signature.name()
                ),
            );
            return Err(Recover);
        }
        let ty = callable.signature.return_type();
        if ty == FlowType::Void {
            self.report.type_error(
                span,
                format!(
                    "void function '{}' cannot be used in an expression",
                    callable.signature.name()
                ),
            );
            return Err(Recover);
        }
        Ok(Expr::new(ExprKind::Call { callable, args }, ty, span))
    }
    // }}}

    // {{{ call resolution
    /// Find the native callable matching `name` and the argument types,
    /// inserting implicit casts and filling trailing defaults.
    fn resolve_call(
        &mut self,
        name: &str,
        args: Vec<Expr>,
        span: SourceSpan,
    ) -> Parsed<(CallableInfo, Vec<Expr>)> {
        let candidates: Vec<CallableInfo> = self
            .registry
            .candidates(name)
            .into_iter()
            .cloned()
            .collect();
        if candidates.is_empty() {
            self.report
                .link_error(span, format!("unknown function '{name}'"));
            return Err(Recover);
        }

        let arg_types: Vec<FlowType> = args.iter().map(|a| a.ty).collect();
        let Some(callable) = candidates.iter().find(|c| {
            let params = c.signature.params();
            args.len() >= c.required_arity()
                && args.len() <= params.len()
                && arg_types
                    .iter()
                    .zip(params)
                    .all(|(have, want)| have.casts_to(*want))
        }) else {
            self.report.type_error(
                span,
                format!(
                    "no matching signature for '{}({})'",
                    name,
                    arg_types
                        .iter()
                        .map(FlowType::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            );
            return Err(Recover);
        };
        let callable = callable.clone();

        if !callable.contexts.allows(self.context) {
            let context = match self.context {
                ConfigContext::Setup => "setup",
                ConfigContext::Main => "main",
            };
            self.report.type_error(
                span,
                format!("'{name}' is not available in {context} context"),
            );
            return Err(Recover);
        }

        // Coerce provided arguments, then append defaults for the rest.
        let params = callable.signature.params();
        let mut coerced = Vec::with_capacity(params.len());
        for (arg, want) in args.into_iter().zip(params) {
            match self.coerce(arg, *want) {
                Ok(arg) => coerced.push(arg),
                Err(_) => unreachable!("candidate matched on casts_to"),
            }
        }
        for i in coerced.len()..params.len() {
            let default = callable.defaults.get(i).cloned().flatten();
            let Some(default) = default else {
                unreachable!("candidate matched on required_arity");
            };
            let Some(literal) = value_literal(&default) else {
                self.report.type_error(
                    span,
                    format!("parameter {} of '{}' has an unusable default", i + 1, name),
                );
                return Err(Recover);
            };
            coerced.push(Expr::new(ExprKind::Literal(literal), params[i], span));
        }

        Ok((callable, coerced))
    }
    // }}}

    // {{{ binary typing
    /// Type a binary operation, inserting implicit casts where the matrix
    /// makes the operation well-formed.
    fn type_binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr, span: SourceSpan) -> Parsed<Expr> {
        use BinaryOp::*;
        use FlowType::*;

        let make = |lhs: Expr, rhs: Expr, ty: FlowType| {
            Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                ty,
                span,
            )
        };

        match op {
            Add => {
                if lhs.ty == Number && rhs.ty == Number {
                    return Ok(make(lhs, rhs, Number));
                }
                if lhs.ty == String || rhs.ty == String {
                    if let (Ok(l), Ok(r)) = (
                        self.coerce(lhs.clone(), String),
                        self.coerce(rhs.clone(), String),
                    ) {
                        return Ok(make(l, r, String));
                    }
                }
                self.binary_mismatch(op, &lhs, &rhs, span)
            }
            Sub | Mul | Div | Rem | Pow | Shl | Shr => {
                match (self.coerce(lhs, Number), self.coerce(rhs, Number)) {
                    (Ok(l), Ok(r)) => Ok(make(l, r, Number)),
                    (l, r) => {
                        let lhs = l.unwrap_or_else(|e| e);
                        let rhs = r.unwrap_or_else(|e| e);
                        self.binary_mismatch(op, &lhs, &rhs, span)
                    }
                }
            }
            BitAnd | BitOr | BitXor => {
                if lhs.ty == Boolean && rhs.ty == Boolean {
                    Ok(make(lhs, rhs, Boolean))
                } else if lhs.ty == Number && rhs.ty == Number {
                    Ok(make(lhs, rhs, Number))
                } else {
                    self.binary_mismatch(op, &lhs, &rhs, span)
                }
            }
            LogicAnd | LogicOr => {
                if lhs.ty == Boolean && rhs.ty == Boolean {
                    Ok(make(lhs, rhs, Boolean))
                } else {
                    self.binary_mismatch(op, &lhs, &rhs, span)
                }
            }
            Eq | Ne => match (lhs.ty, rhs.ty) {
                (Number, Number) | (IPAddress, IPAddress) => Ok(make(lhs, rhs, Boolean)),
                _ if lhs.ty == String || rhs.ty == String => {
                    match (
                        self.coerce(lhs.clone(), String),
                        self.coerce(rhs.clone(), String),
                    ) {
                        (Ok(l), Ok(r)) => Ok(make(l, r, Boolean)),
                        _ => self.binary_mismatch(op, &lhs, &rhs, span),
                    }
                }
                _ => self.binary_mismatch(op, &lhs, &rhs, span),
            },
            Le | Ge | Lt | Gt => match (lhs.ty, rhs.ty) {
                (Number, Number) | (String, String) => Ok(make(lhs, rhs, Boolean)),
                _ => self.binary_mismatch(op, &lhs, &rhs, span),
            },
            RegexMatch => {
                if rhs.ty != RegExp {
                    self.report.type_error(
                        rhs.span,
                        format!("'=~' expects a regex on the right, found {}", rhs.ty),
                    );
                    return Err(Recover);
                }
                match self.coerce(lhs, String) {
                    Ok(l) => Ok(make(l, rhs, Boolean)),
                    Err(lhs) => self.binary_mismatch(op, &lhs, &rhs, span),
                }
            }
            PrefixMatch | SuffixMatch => {
                if lhs.ty == String && rhs.ty == String {
                    Ok(make(lhs, rhs, Boolean))
                } else {
                    self.binary_mismatch(op, &lhs, &rhs, span)
                }
            }
            In => match (lhs.ty, rhs.ty) {
                (String, String) => Ok(make(lhs, rhs, Boolean)),
                (IPAddress, Cidr) => Ok(make(lhs, rhs, Boolean)),
                _ => self.binary_mismatch(op, &lhs, &rhs, span),
            },
        }
    }

    fn binary_mismatch(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: SourceSpan,
    ) -> Parsed<Expr> {
        self.report.type_error(
            span,
            format!(
                "invalid operand types {} and {} for operator {:?}",
                lhs.ty, rhs.ty, op
            ),
        );
        Err(Recover)
    }

    /// Wrap `expr` in a cast to `target` if needed and allowed.
    ///
    /// On failure the original expression is handed back so the caller can
    /// report with the right span and type.
    fn coerce(&self, expr: Expr, target: FlowType) -> Result<Expr, Expr> {
        if expr.ty == target {
            return Ok(expr);
        }
        if expr.ty.casts_to(target) {
            let span = expr.span;
            return Ok(Expr::new(
                ExprKind::Cast {
                    target,
                    operand: Box::new(expr),
                },
                target,
                span,
            ));
        }
        Err(expr)
    }
    // }}}

    // {{{ token helpers
    fn expect(&mut self, token: &Token, what: &str) -> Parsed<SourceSpan> {
        if self.stream.check(token) {
            let span = self.stream.current_span();
            self.stream.advance();
            Ok(span)
        } else {
            let span = self.stream.current_span();
            let text = self.unexpected_text();
            self.report
                .syntax_error(span, format!("expected {what}, found {text}"));
            Err(Recover)
        }
    }

    fn ident(&mut self, what: &str) -> Parsed<(String, SourceSpan)> {
        let span = self.stream.current_span();
        match self.stream.peek() {
            Some(Token::Ident(_)) => {
                let Some(Token::Ident(name)) = self.stream.advance() else {
                    unreachable!()
                };
                Ok((name, span))
            }
            _ => {
                let text = self.unexpected_text();
                self.report
                    .syntax_error(span, format!("expected {what}, found {text}"));
                Err(Recover)
            }
        }
    }

    /// `ident ('.' ident)*` joined with dots.
    ///
    /// Keywords are valid segments after a dot (`error.handler`,
    /// `req.match`): only the leading segment competes with statement
    /// keywords.
    fn dotted_name(&mut self) -> Parsed<String> {
        let (mut name, _) = self.ident("name")?;
        while self.stream.check(&Token::Dot) {
            self.stream.advance();
            let part = match self.stream.peek() {
                Some(Token::Ident(_)) => {
                    let Some(Token::Ident(part)) = self.stream.advance() else {
                        unreachable!()
                    };
                    part
                }
                Some(token) if keyword_text(token).is_some() => {
                    let part = keyword_text(token).expect("checked").to_string();
                    self.stream.advance();
                    part
                }
                _ => {
                    let span = self.stream.current_span();
                    let text = self.unexpected_text();
                    self.report
                        .syntax_error(span, format!("expected name after '.', found {text}"));
                    return Err(Recover);
                }
            };
            name.push('.');
            name.push_str(&part);
        }
        Ok(name)
    }

    fn unexpected_text(&self) -> String {
        match self.stream.peek() {
            Some(token) => format!("'{token}'"),
            None => "end of file".to_string(),
        }
    }
    // }}}
}

/// Keyword tokens usable as dotted-name segments.
fn keyword_text(token: &Token) -> Option<&'static str> {
    match token {
        Token::Handler => Some("handler"),
        Token::Import => Some("import"),
        Token::If => Some("if"),
        Token::Else => Some("else"),
        Token::Match => Some("match"),
        Token::On => Some("on"),
        Token::In => Some("in"),
        _ => None,
    }
}

/// Precedence just above the comparison/match operators; used for the
/// `match` subject.
const PREC_SHIFT: u8 = 50;

/// `(precedence, right-associative, op)` for a binary operator token.
fn binary_op_info(token: &Token) -> Option<(u8, bool, BinaryOp)> {
    let info = match token {
        Token::PipePipe => (10, false, BinaryOp::LogicOr),
        Token::AmpAmp => (20, false, BinaryOp::LogicAnd),
        Token::Pipe => (30, false, BinaryOp::BitOr),
        Token::Caret => (32, false, BinaryOp::BitXor),
        Token::Amp => (34, false, BinaryOp::BitAnd),
        Token::EqEq => (40, false, BinaryOp::Eq),
        Token::BangEq => (40, false, BinaryOp::Ne),
        Token::LtEq => (40, false, BinaryOp::Le),
        Token::GtEq => (40, false, BinaryOp::Ge),
        Token::Lt => (40, false, BinaryOp::Lt),
        Token::Gt => (40, false, BinaryOp::Gt),
        Token::RegexMatch => (40, false, BinaryOp::RegexMatch),
        Token::PrefixMatch => (40, false, BinaryOp::PrefixMatch),
        Token::SuffixMatch => (40, false, BinaryOp::SuffixMatch),
        Token::In => (40, false, BinaryOp::In),
        Token::Shl => (PREC_SHIFT, false, BinaryOp::Shl),
        Token::Shr => (PREC_SHIFT, false, BinaryOp::Shr),
        Token::Plus => (60, false, BinaryOp::Add),
        Token::Minus => (60, false, BinaryOp::Sub),
        Token::Star => (70, false, BinaryOp::Mul),
        Token::Slash => (70, false, BinaryOp::Div),
        Token::Percent => (70, false, BinaryOp::Rem),
        Token::StarStar => (80, true, BinaryOp::Pow),
        _ => return None,
    };
    Some(info)
}

/// Convert a default [`Value`] into a literal the AST can carry.
fn value_literal(value: &Value) -> Option<Literal> {
    match value {
        Value::Bool(b) => Some(Literal::Bool(*b)),
        Value::Number(n) => Some(Literal::Number(*n)),
        Value::String(s) => Some(Literal::String(s.to_string())),
        Value::IpAddr(ip) => Some(Literal::IpAddr(*ip)),
        Value::Cidr(c) => Some(Literal::Cidr(*c)),
        Value::IntArray(xs) => Some(Literal::IntArray(xs.as_ref().clone())),
        Value::StringArray(xs) => Some(Literal::StringArray(xs.as_ref().clone())),
        Value::IpAddrArray(xs) => Some(Literal::IpAddrArray(xs.as_ref().clone())),
        Value::CidrArray(xs) => Some(Literal::CidrArray(xs.as_ref().clone())),
        Value::Regex(_) | Value::Handler(_) => None,
    }
}
