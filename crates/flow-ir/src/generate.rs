//! AST → IR lowering.
//!
//! Control structures become basic-block graphs, assignments become
//! entry-block `Alloca` plus `Store`, variable reads become `Load`, native
//! calls become `Call`/`HandlerCall`. Invocations of user-defined handlers
//! are inlined at the call site: a handler that "handles" the request does
//! so through a native `HANDLER` callback or `EXIT`, which terminates the
//! inlining handler exactly like the callee running standalone would.

use indexmap::IndexMap;
use tracing::trace;

use flow_core::{FlowType, Report, SourceSpan};
use flow_lang::ast::{
    BinaryOp, CallTarget, Expr, ExprKind, Literal, Stmt, UnaryOp, Unit,
};

use crate::builder::IrBuilder;
use crate::ir::{BinaryIrOp, Constant, IrProgram, Operand, UnaryIrOp, VReg};

/// Lower a parsed unit into an IR program.
///
/// The unit must be error-free; lowering a unit whose parse reported
/// errors produces additional diagnostics instead of panicking.
pub fn generate_ir(unit: &Unit, report: &mut Report) -> IrProgram {
    let mut program = IrProgram::new();
    program.modules = unit.imports.iter().map(|i| i.module.clone()).collect();
    program.exports = unit
        .handlers
        .iter()
        .filter(|h| h.name == "setup" || h.name == "main")
        .map(|h| h.name.clone())
        .collect();

    for decl in &unit.handlers {
        let builder = IrBuilder::new_handler(&mut program, &decl.name);
        let mut lowering = HandlerLowering {
            builder,
            unit,
            report: &mut *report,
            vars: vec![IndexMap::new()],
            inline_stack: vec![decl.name.clone()],
            labels: 0,
        };
        lowering.lower_body(&decl.body);
        if !lowering.builder.terminated() {
            // Falling off the end means "not handled".
            lowering.builder.create_ret(false);
        }
        trace!(handler = %decl.name, "lowered to IR");
    }

    program
}

struct HandlerLowering<'p, 'a> {
    builder: IrBuilder<'p>,
    unit: &'a Unit,
    report: &'a mut Report,
    /// Scope stack of variable name → (alloca register, type).
    vars: Vec<IndexMap<String, (VReg, FlowType)>>,
    /// Handlers currently being lowered into this one; used to reject
    /// recursive invocation.
    inline_stack: Vec<String>,
    labels: u32,
}

impl<'p, 'a> HandlerLowering<'p, 'a> {
    fn label(&mut self, stem: &str) -> String {
        self.labels += 1;
        format!("{stem}.{}", self.labels)
    }

    fn lookup_var(&self, name: &str) -> Option<(VReg, FlowType)> {
        self.vars.iter().rev().find_map(|s| s.get(name)).copied()
    }

    fn lower_body(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Compound { stmts, .. } => {
                self.vars.push(IndexMap::new());
                self.lower_body(stmts);
                self.vars.pop();
            }
            Stmt::Assign { name, value, span } => {
                let operand = self.lower_expr(value);
                let var = match self.lookup_var(name) {
                    Some((var, _)) => var,
                    None => {
                        let var = self.builder.create_alloca(value.ty, *span);
                        self.vars
                            .last_mut()
                            .expect("scope stack never empty")
                            .insert(name.clone(), (var, value.ty));
                        var
                    }
                };
                self.builder.create_store(var, operand, *span);
            }
            Stmt::Cond {
                condition,
                then_stmt,
                else_stmt,
                ..
            } => self.lower_cond(condition, then_stmt, else_stmt.as_deref()),
            Stmt::Match {
                subject,
                class,
                cases,
                else_stmt,
                ..
            } => self.lower_match(subject, *class, cases, else_stmt.as_deref()),
            Stmt::Call { target, args, span } => match target {
                CallTarget::Native(callable) => {
                    let args: Vec<Operand> = args.iter().map(|a| self.lower_expr(a)).collect();
                    let native = self
                        .builder
                        .native(callable.signature.clone(), callable.is_handler);
                    if callable.is_handler {
                        self.builder.create_handler_call(native, args, *span);
                    } else {
                        // Result, if any, is unused; codegen discards it.
                        let _ = self.builder.create_call(
                            native,
                            args,
                            callable.signature.return_type(),
                            *span,
                        );
                    }
                }
                CallTarget::Handler(name) => self.inline_handler(name, *span),
            },
        }
    }

    fn lower_cond(&mut self, condition: &Expr, then_stmt: &Stmt, else_stmt: Option<&Stmt>) {
        let cond = self.lower_expr(condition);
        let then_block = {
            let label = self.label("if.then");
            self.builder.create_block(label)
        };
        let else_block = else_stmt.map(|_| {
            let label = self.label("if.else");
            self.builder.create_block(label)
        });
        let end_block = {
            let label = self.label("if.end");
            self.builder.create_block(label)
        };

        self.builder
            .create_cond_br(cond, then_block, else_block.unwrap_or(end_block));

        self.builder.set_insert_point(then_block);
        self.lower_stmt(then_stmt);
        if !self.builder.terminated() {
            self.builder.create_br(end_block);
        }

        if let (Some(else_block), Some(else_stmt)) = (else_block, else_stmt) {
            self.builder.set_insert_point(else_block);
            self.lower_stmt(else_stmt);
            if !self.builder.terminated() {
                self.builder.create_br(end_block);
            }
        }

        self.builder.set_insert_point(end_block);
    }

    fn lower_match(
        &mut self,
        subject: &Expr,
        class: flow_core::MatchClass,
        cases: &[flow_lang::ast::MatchCase],
        else_stmt: Option<&Stmt>,
    ) {
        let subject_op = self.lower_expr(subject);

        let mut case_blocks = Vec::with_capacity(cases.len());
        let mut ir_cases = Vec::with_capacity(cases.len());
        for case in cases {
            let label = self.label("match.case");
            let block = self.builder.create_block(label);
            let constant = match &case.label {
                Literal::String(s) => Constant::Str(s.clone()),
                Literal::Regex(p) => Constant::Regex(p.clone()),
                other => {
                    self.report.type_error(
                        case.span,
                        format!("unsupported match label {:?}", other.type_of()),
                    );
                    continue;
                }
            };
            let id = self.builder.intern(constant);
            ir_cases.push((id, block));
            case_blocks.push(block);
        }

        let else_block = else_stmt.map(|_| {
            let label = self.label("match.else");
            self.builder.create_block(label)
        });
        let end_block = {
            let label = self.label("match.end");
            self.builder.create_block(label)
        };

        self.builder.create_match(
            class,
            subject_op,
            ir_cases,
            else_block.unwrap_or(end_block),
        );

        for (case, block) in cases.iter().zip(case_blocks) {
            self.builder.set_insert_point(block);
            self.lower_stmt(&case.body);
            if !self.builder.terminated() {
                self.builder.create_br(end_block);
            }
        }

        if let (Some(else_block), Some(else_stmt)) = (else_block, else_stmt) {
            self.builder.set_insert_point(else_block);
            self.lower_stmt(else_stmt);
            if !self.builder.terminated() {
                self.builder.create_br(end_block);
            }
        }

        self.builder.set_insert_point(end_block);
    }

    /// Inline a user-defined handler at the call site.
    fn inline_handler(&mut self, name: &str, span: SourceSpan) {
        if self.inline_stack.iter().any(|h| h == name) {
            self.report.type_error(
                span,
                format!("recursive invocation of handler '{name}'"),
            );
            return;
        }
        let Some(decl) = self.unit.handler(name) else {
            self.report
                .type_error(span, format!("unknown handler '{name}'"));
            return;
        };

        // The callee gets a fresh variable namespace.
        let saved_vars = std::mem::replace(&mut self.vars, vec![IndexMap::new()]);
        self.inline_stack.push(name.to_string());
        self.lower_body(&decl.body);
        self.inline_stack.pop();
        self.vars = saved_vars;
    }

    fn lower_expr(&mut self, expr: &Expr) -> Operand {
        match &expr.kind {
            ExprKind::Literal(literal) => {
                let constant = literal_constant(literal);
                Operand::Const(self.builder.intern(constant))
            }
            ExprKind::Var(name) => match self.lookup_var(name) {
                Some((var, ty)) => self.builder.create_load(var, ty, expr.span),
                None => {
                    self.report
                        .type_error(expr.span, format!("unknown variable '{name}'"));
                    self.builder.const_bool(false)
                }
            },
            ExprKind::HandlerRef(name) => {
                Operand::Const(self.builder.intern(Constant::HandlerRef(name.clone())))
            }
            ExprKind::Call { callable, args } => {
                let args: Vec<Operand> = args.iter().map(|a| self.lower_expr(a)).collect();
                let native = self
                    .builder
                    .native(callable.signature.clone(), callable.is_handler);
                self.builder
                    .create_call(native, args, callable.signature.return_type(), expr.span)
                    .unwrap_or_else(|| {
                        // Void calls are rejected in expression position by
                        // the parser; reaching this means a broken AST.
                        self.report
                            .type_error(expr.span, "void call in expression");
                        self.builder.const_bool(false)
                    })
            }
            ExprKind::Unary { op, operand } => {
                let value = self.lower_expr(operand);
                let ir_op = match op {
                    UnaryOp::Neg => UnaryIrOp::INeg,
                    UnaryOp::BitNot => UnaryIrOp::INot,
                    UnaryOp::Not => UnaryIrOp::BNot,
                };
                self.builder.create_unary(ir_op, value, expr.ty, expr.span)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let ir_op = ir_binary_op(*op, lhs.ty);
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                self.builder.create_binary(ir_op, l, r, expr.ty, expr.span)
            }
            ExprKind::Cast { target, operand } => {
                let value = self.lower_expr(operand);
                if operand.ty == *target {
                    value
                } else {
                    self.builder.create_cast(*target, value, expr.span)
                }
            }
        }
    }
}

fn literal_constant(literal: &Literal) -> Constant {
    match literal {
        Literal::Bool(b) => Constant::Bool(*b),
        Literal::Number(n) => Constant::Int(*n),
        Literal::String(s) => Constant::Str(s.clone()),
        Literal::IpAddr(ip) => Constant::Ip(*ip),
        Literal::Cidr(c) => Constant::Cidr(*c),
        Literal::Regex(p) => Constant::Regex(p.clone()),
        Literal::IntArray(xs) => Constant::IntArray(xs.clone()),
        Literal::StringArray(xs) => Constant::StringArray(xs.clone()),
        Literal::IpAddrArray(xs) => Constant::IpAddrArray(xs.clone()),
        Literal::CidrArray(xs) => Constant::CidrArray(xs.clone()),
    }
}

/// Map a typed AST operator onto its IR instruction.
///
/// `lhs_ty` is the (already coerced) left operand type, which picks the
/// integer, boolean, string or address family of the operation.
fn ir_binary_op(op: BinaryOp, lhs_ty: FlowType) -> BinaryIrOp {
    use FlowType::*;
    match op {
        BinaryOp::Add => {
            if lhs_ty == String {
                BinaryIrOp::SAdd
            } else {
                BinaryIrOp::IAdd
            }
        }
        BinaryOp::Sub => BinaryIrOp::ISub,
        BinaryOp::Mul => BinaryIrOp::IMul,
        BinaryOp::Div => BinaryIrOp::IDiv,
        BinaryOp::Rem => BinaryIrOp::IRem,
        BinaryOp::Pow => BinaryIrOp::IPow,
        BinaryOp::Shl => BinaryIrOp::IShl,
        BinaryOp::Shr => BinaryIrOp::IShr,
        BinaryOp::BitAnd => {
            if lhs_ty == Boolean {
                BinaryIrOp::BAnd
            } else {
                BinaryIrOp::IAnd
            }
        }
        BinaryOp::BitOr => {
            if lhs_ty == Boolean {
                BinaryIrOp::BOr
            } else {
                BinaryIrOp::IOr
            }
        }
        BinaryOp::BitXor => {
            if lhs_ty == Boolean {
                BinaryIrOp::BXor
            } else {
                BinaryIrOp::IXor
            }
        }
        BinaryOp::LogicAnd => BinaryIrOp::BAnd,
        BinaryOp::LogicOr => BinaryIrOp::BOr,
        BinaryOp::Eq => match lhs_ty {
            String => BinaryIrOp::SCmpEQ,
            IPAddress => BinaryIrOp::PCmpEQ,
            _ => BinaryIrOp::ICmpEQ,
        },
        BinaryOp::Ne => match lhs_ty {
            String => BinaryIrOp::SCmpNE,
            IPAddress => BinaryIrOp::PCmpNE,
            _ => BinaryIrOp::ICmpNE,
        },
        BinaryOp::Le => {
            if lhs_ty == String {
                BinaryIrOp::SCmpLE
            } else {
                BinaryIrOp::ICmpLE
            }
        }
        BinaryOp::Ge => {
            if lhs_ty == String {
                BinaryIrOp::SCmpGE
            } else {
                BinaryIrOp::ICmpGE
            }
        }
        BinaryOp::Lt => {
            if lhs_ty == String {
                BinaryIrOp::SCmpLT
            } else {
                BinaryIrOp::ICmpLT
            }
        }
        BinaryOp::Gt => {
            if lhs_ty == String {
                BinaryIrOp::SCmpGT
            } else {
                BinaryIrOp::ICmpGT
            }
        }
        BinaryOp::RegexMatch => BinaryIrOp::SCmpRE,
        BinaryOp::PrefixMatch => BinaryIrOp::SCmpBeg,
        BinaryOp::SuffixMatch => BinaryIrOp::SCmpEnd,
        BinaryOp::In => {
            if lhs_ty == IPAddress {
                BinaryIrOp::PInCidr
            } else {
                BinaryIrOp::SIn
            }
        }
    }
}
