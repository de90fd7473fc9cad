//! Canonical pretty-printer for the typed AST.
//!
//! The printed form is valid Flow source and re-parses to the same AST:
//! call statements are printed with parentheses, implicit casts print as
//! their operand (the parser re-derives them), and expressions are
//! parenthesized per precedence.

use crate::ast::{
    BinaryOp, CallTarget, Expr, ExprKind, Literal, Stmt, UnaryOp, Unit,
};
use flow_core::MatchClass;

/// Render a whole unit as canonical source.
pub fn print_unit(unit: &Unit) -> String {
    let mut out = String::new();
    for import in &unit.imports {
        out.push_str(&format!("import {};\n", import.module));
    }
    if !unit.imports.is_empty() {
        out.push('\n');
    }
    for handler in &unit.handlers {
        out.push_str(&format!("handler {} {{\n", handler.name));
        for stmt in &handler.body {
            print_stmt(&mut out, stmt, 1);
        }
        out.push_str("}\n");
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn print_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    match stmt {
        Stmt::Compound { stmts, .. } => {
            indent(out, depth);
            out.push_str("{\n");
            for stmt in stmts {
                print_stmt(out, stmt, depth + 1);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::Assign { name, value, .. } => {
            indent(out, depth);
            out.push_str(&format!("{name} = {};\n", print_expr(value)));
        }
        Stmt::Cond {
            condition,
            then_stmt,
            else_stmt,
            ..
        } => {
            indent(out, depth);
            out.push_str(&format!("if {}\n", print_expr(condition)));
            print_branch(out, then_stmt, depth);
            if let Some(else_stmt) = else_stmt {
                indent(out, depth);
                out.push_str("else\n");
                print_branch(out, else_stmt, depth);
            }
        }
        Stmt::Match {
            subject,
            class,
            cases,
            else_stmt,
            ..
        } => {
            indent(out, depth);
            let op = match class {
                MatchClass::Head => " =^",
                MatchClass::Tail => " =$",
                MatchClass::Same | MatchClass::RegExp => "",
            };
            out.push_str(&format!("match {}{op} {{\n", print_expr(subject)));
            for case in cases {
                indent(out, depth + 1);
                out.push_str(&format!("on {} =>\n", print_literal(&case.label)));
                print_branch(out, &case.body, depth + 1);
            }
            if let Some(else_stmt) = else_stmt {
                indent(out, depth + 1);
                out.push_str("else\n");
                print_branch(out, else_stmt, depth + 1);
            }
            indent(out, depth);
            out.push_str("}\n");
        }
        Stmt::Call { target, args, .. } => {
            indent(out, depth);
            match target {
                CallTarget::Handler(name) => out.push_str(&format!("{name};\n")),
                CallTarget::Native(callable) => {
                    let args: Vec<String> = args.iter().map(print_expr).collect();
                    out.push_str(&format!(
                        "{}({});\n",
                        callable.signature.name(),
                        args.join(", ")
                    ));
                }
            }
        }
    }
}

/// Branch bodies print brace-wrapped so nested conditionals never
/// re-associate their `else` on re-parse.
fn print_branch(out: &mut String, stmt: &Stmt, depth: usize) {
    if matches!(stmt, Stmt::Compound { .. }) {
        print_stmt(out, stmt, depth + 1);
    } else {
        indent(out, depth + 1);
        out.push_str("{\n");
        print_stmt(out, stmt, depth + 2);
        indent(out, depth + 1);
        out.push_str("}\n");
    }
}

fn print_expr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal(literal) => print_literal(literal),
        ExprKind::Var(name) => name.clone(),
        ExprKind::HandlerRef(name) => name.clone(),
        ExprKind::Call { callable, args } => {
            let args: Vec<String> = args.iter().map(print_expr).collect();
            format!("{}({})", callable.signature.name(), args.join(", "))
        }
        ExprKind::Unary { op, operand } => {
            let op = match op {
                UnaryOp::Neg => "-",
                UnaryOp::BitNot => "~",
                UnaryOp::Not => "!",
            };
            format!("{op}{}", print_operand(operand))
        }
        ExprKind::Binary { op, lhs, rhs } => format!(
            "{} {} {}",
            print_operand(lhs),
            binary_symbol(*op),
            print_operand(rhs)
        ),
        // Implicit casts re-derive on parse; print the source form.
        ExprKind::Cast { operand, .. } => print_expr(operand),
    }
}

/// Sub-expressions print parenthesized unless atomic.
fn print_operand(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Binary { .. } | ExprKind::Unary { .. } => format!("({})", print_expr(expr)),
        ExprKind::Cast { operand, .. } => print_operand(operand),
        _ => print_expr(expr),
    }
}

fn print_literal(literal: &Literal) -> String {
    match literal {
        Literal::Bool(b) => b.to_string(),
        Literal::Number(n) => n.to_string(),
        Literal::String(s) => quote(s),
        Literal::IpAddr(ip) => ip.to_string(),
        Literal::Cidr(c) => c.to_string(),
        Literal::Regex(p) => format!("/{}/", p.replace('/', "\\/")),
        Literal::IntArray(xs) => {
            let items: Vec<String> = xs.iter().map(i64::to_string).collect();
            format!("[{}]", items.join(", "))
        }
        Literal::StringArray(xs) => {
            let items: Vec<String> = xs.iter().map(|s| quote(s)).collect();
            format!("[{}]", items.join(", "))
        }
        Literal::IpAddrArray(xs) => {
            let items: Vec<String> = xs.iter().map(|ip| ip.to_string()).collect();
            format!("[{}]", items.join(", "))
        }
        Literal::CidrArray(xs) => {
            let items: Vec<String> = xs.iter().map(|c| c.to_string()).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::LogicAnd => "&&",
        BinaryOp::LogicOr => "||",
        BinaryOp::RegexMatch => "=~",
        BinaryOp::PrefixMatch => "=^",
        BinaryOp::SuffixMatch => "=$",
        BinaryOp::In => "in",
    }
}
