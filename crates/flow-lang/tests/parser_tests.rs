//! Parser integration tests against a small stub registry.

use flow_core::{
    CallableInfo, Contexts, DiagnosticKind, FlowType, MatchClass, NativeRegistry, Report,
    Signature, SourceBuffer, Value,
};
use flow_lang::ast::{CallTarget, ExprKind, Literal, Stmt, Unit};
use flow_lang::parse_unit;

struct StubRegistry {
    callables: Vec<CallableInfo>,
}

impl StubRegistry {
    fn new() -> Self {
        let mut callables = Vec::new();
        callables.push(CallableInfo {
            signature: Signature::new("log", FlowType::Void, vec![FlowType::String]),
            is_handler: false,
            contexts: Contexts::BOTH,
            defaults: vec![None],
            read_only: false,
        });
        callables.push(CallableInfo {
            signature: Signature::new("return", FlowType::Boolean, vec![FlowType::Number]),
            is_handler: true,
            contexts: Contexts::MAIN,
            defaults: vec![None],
            read_only: false,
        });
        callables.push(CallableInfo {
            signature: Signature::new("listen", FlowType::Void, vec![FlowType::Number]),
            is_handler: false,
            contexts: Contexts::SETUP,
            defaults: vec![None],
            read_only: false,
        });
        callables.push(CallableInfo {
            signature: Signature::new("req.path", FlowType::String, vec![]),
            is_handler: false,
            contexts: Contexts::MAIN,
            defaults: vec![],
            read_only: false,
        });
        callables.push(CallableInfo {
            signature: Signature::new("sys.env", FlowType::String, vec![FlowType::String]),
            is_handler: false,
            contexts: Contexts::BOTH,
            defaults: vec![None],
            read_only: true,
        });
        callables.push(CallableInfo {
            signature: Signature::new(
                "assert",
                FlowType::Void,
                vec![FlowType::Boolean, FlowType::String],
            ),
            is_handler: false,
            contexts: Contexts::BOTH,
            defaults: vec![None, Some(Value::string(""))],
            read_only: false,
        });
        Self { callables }
    }
}

impl NativeRegistry for StubRegistry {
    fn candidates(&self, name: &str) -> Vec<&CallableInfo> {
        self.callables
            .iter()
            .filter(|c| c.signature.name() == name)
            .collect()
    }

    fn has_module(&self, module: &str) -> bool {
        module == "http"
    }
}

fn parse(source: &str) -> (Unit, Report) {
    let buffer = SourceBuffer::new("test.flow", source);
    parse_unit(&buffer, &StubRegistry::new())
}

fn parse_ok(source: &str) -> Unit {
    let (unit, report) = parse(source);
    assert!(!report.has_errors(), "unexpected errors:\n{report}");
    unit
}

#[test]
fn smallest_program() {
    let unit = parse_ok("handler setup {} handler main { return 200; }");
    assert_eq!(unit.handlers.len(), 2);
    let main = unit.handler("main").unwrap();
    assert_eq!(main.body.len(), 1);
    let Stmt::Call { target, args, .. } = &main.body[0] else {
        panic!("expected call statement");
    };
    let CallTarget::Native(callable) = target else {
        panic!("expected native call");
    };
    assert!(callable.is_handler);
    assert_eq!(callable.signature.name(), "return");
    assert_eq!(args.len(), 1);
}

#[test]
fn paren_and_bare_call_forms_are_equivalent() {
    let a = parse_ok("handler main { log(\"x\"); }");
    let b = parse_ok("handler main { log \"x\"; }");
    let call = |unit: &Unit| match &unit.handler("main").unwrap().body[0] {
        Stmt::Call { args, .. } => args.len(),
        other => panic!("expected call, got {other:?}"),
    };
    assert_eq!(call(&a), call(&b));
}

#[test]
fn assignment_declares_and_types_variables() {
    let unit = parse_ok("handler main { x = 40 + 2; y = x * 2; log \"\" + y; }");
    let body = &unit.handler("main").unwrap().body;
    let Stmt::Assign { name, value, .. } = &body[0] else {
        panic!("expected assignment");
    };
    assert_eq!(name, "x");
    assert_eq!(value.ty, FlowType::Number);
}

#[test]
fn reassignment_with_other_type_fails() {
    let (_, report) = parse("handler main { x = 1; x = \"s\"; }");
    assert!(report.has_errors());
    assert_eq!(report.messages()[0].kind, DiagnosticKind::TypeError);
}

#[test]
fn unknown_native_is_a_link_error() {
    let (_, report) = parse("handler main { x = foo(); }");
    assert_eq!(report.len(), 1);
    assert_eq!(report.messages()[0].kind, DiagnosticKind::LinkError);
}

#[test]
fn unknown_variable_is_a_type_error() {
    let (_, report) = parse("handler main { log \"\" + nope; }");
    assert!(report
        .iter()
        .any(|m| m.kind == DiagnosticKind::TypeError && m.text.contains("nope")));
}

#[test]
fn setup_callable_rejected_in_main_context() {
    let (_, report) = parse("handler main { listen 80; }");
    assert!(report
        .iter()
        .any(|m| m.kind == DiagnosticKind::TypeError && m.text.contains("listen")));
}

#[test]
fn defaults_fill_missing_trailing_arguments() {
    let unit = parse_ok("handler main { assert(true); }");
    let Stmt::Call { args, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 2);
    assert!(matches!(
        &args[1].kind,
        ExprKind::Literal(Literal::String(s)) if s.is_empty()
    ));
}

#[test]
fn implicit_number_to_string_cast_in_concat() {
    let unit = parse_ok("handler main { log \"status: \" + 404; }");
    let Stmt::Call { args, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected call");
    };
    assert_eq!(args[0].ty, FlowType::String);
}

#[test]
fn match_with_string_labels_is_same_class() {
    let unit = parse_ok(
        r#"handler main {
               match req.path {
                 on "/a" => log "A";
                 on "/b" => log "B";
                 else log "X";
               }
             }"#,
    );
    let Stmt::Match { class, cases, else_stmt, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected match");
    };
    assert_eq!(*class, MatchClass::Same);
    assert_eq!(cases.len(), 2);
    assert!(else_stmt.is_some());
}

#[test]
fn match_with_prefix_operator_is_head_class() {
    let unit = parse_ok(
        r#"handler main { match req.path =^ { on "/static" => log "s"; } }"#,
    );
    let Stmt::Match { class, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected match");
    };
    assert_eq!(*class, MatchClass::Head);
}

#[test]
fn match_with_regex_labels_is_regexp_class() {
    let unit = parse_ok(
        r#"handler main { match req.path { on /^\/a.*$/ => log "a"; } }"#,
    );
    let Stmt::Match { class, cases, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected match");
    };
    assert_eq!(*class, MatchClass::RegExp);
    assert!(matches!(&cases[0].label, Literal::Regex(p) if p == "^/a.*$"));
}

#[test]
fn mixed_match_labels_are_rejected() {
    let (_, report) = parse(
        r#"handler main { match req.path { on "/a" => log "a"; on /b/ => log "b"; } }"#,
    );
    assert!(report.has_errors());
}

#[test]
fn regex_match_operator() {
    let unit = parse_ok(r#"handler main { if req.path =~ /^\/dl/ log "dl"; }"#);
    let Stmt::Cond { condition, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected if");
    };
    assert_eq!(condition.ty, FlowType::Boolean);
}

#[test]
fn ip_in_cidr_expression() {
    let unit = parse_ok("handler main { x = 10.1.2.3 in 10.0.0.0/8; }");
    let Stmt::Assign { value, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected assignment");
    };
    assert_eq!(value.ty, FlowType::Boolean);
}

#[test]
fn array_literals_are_typed() {
    let unit = parse_ok("handler main { a = [1, 2, 3]; b = [\"x\", \"y\"]; }");
    let body = &unit.handler("main").unwrap().body;
    let Stmt::Assign { value, .. } = &body[0] else {
        panic!()
    };
    assert_eq!(value.ty, FlowType::IntArray);
    let Stmt::Assign { value, .. } = &body[1] else {
        panic!()
    };
    assert_eq!(value.ty, FlowType::StringArray);
}

#[test]
fn heterogeneous_array_is_rejected() {
    let (_, report) = parse("handler main { a = [1, \"x\"]; }");
    assert!(report.has_errors());
}

#[test]
fn user_handler_invocation_and_reference() {
    let unit = parse_ok("handler helper { log \"h\"; } handler main { helper; }");
    let Stmt::Call { target, .. } = &unit.handler("main").unwrap().body[0] else {
        panic!("expected call");
    };
    assert!(matches!(target, CallTarget::Handler(name) if name == "helper"));
}

#[test]
fn import_of_known_module() {
    let unit = parse_ok("import http; handler main { return 200; }");
    assert_eq!(unit.imports.len(), 1);
    assert_eq!(unit.imports[0].module, "http");
}

#[test]
fn import_of_unknown_module_fails() {
    let (_, report) = parse("import nosuch; handler main { return 200; }");
    assert!(report.has_errors());
}

#[test]
fn recovery_produces_multiple_diagnostics() {
    let (_, report) = parse(
        "handler main { x = ; y = foo(); log \"ok\"; }",
    );
    // one syntax error for `x = ;`, one link error for foo()
    assert!(report.len() >= 2, "got: {report}");
    assert!(report.iter().any(|m| m.kind == DiagnosticKind::SyntaxError));
    assert!(report.iter().any(|m| m.kind == DiagnosticKind::LinkError));
}

#[test]
fn pretty_print_round_trips() {
    let source = r#"
        import http;
        handler setup { listen 80; }
        handler main {
            x = (1 + 2) * 3;
            if req.path =~ /^\/a/ { log "match: " + req.path; }
            else log "no";
            match req.path =^ {
              on "/static" => log "s";
              else helper;
            }
            ips = [10.0.0.1, 10.0.0.2];
            return 200;
        }
        handler helper { log "h"; }
    "#;

    // one print/parse cycle reaches the canonical fixed point
    let buffer = SourceBuffer::new("test.flow", source);
    let (unit, report) = parse_unit(&buffer, &StubRegistry::new());
    assert!(!report.has_errors(), "{report}");
    let printed = flow_lang::print_unit(&unit);

    let buffer2 = SourceBuffer::new("test.flow", printed.clone());
    let (unit2, report2) = parse_unit(&buffer2, &StubRegistry::new());
    assert!(!report2.has_errors(), "reparse failed on:\n{printed}\n{report2}");
    assert_eq!(flow_lang::print_unit(&unit2), printed);
}

#[test]
fn diagnostic_positions_are_one_based() {
    let (_, report) = parse("handler main { x = foo(); }");
    let message = &report.messages()[0];
    assert_eq!(message.range.begin.line, 1);
    assert!(message.range.begin.column > 1);
}
