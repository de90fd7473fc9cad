//! AST → IR lowering tests.

use flow_core::{
    CallableInfo, Contexts, FlowType, NativeRegistry, Report, Signature, SourceBuffer,
};
use flow_ir::{generate_ir, validate, InstrKind, IrProgram, PassManager, Terminator};
use flow_lang::parse_unit;

struct StubRegistry(Vec<CallableInfo>);

impl StubRegistry {
    fn new() -> Self {
        Self(vec![
            CallableInfo {
                signature: Signature::new("log", FlowType::Void, vec![FlowType::String]),
                is_handler: false,
                contexts: Contexts::BOTH,
                defaults: vec![None],
                read_only: false,
            },
            CallableInfo {
                signature: Signature::new("return", FlowType::Boolean, vec![FlowType::Number]),
                is_handler: true,
                contexts: Contexts::MAIN,
                defaults: vec![None],
                read_only: false,
            },
            CallableInfo {
                signature: Signature::new("req.path", FlowType::String, vec![]),
                is_handler: false,
                contexts: Contexts::MAIN,
                defaults: vec![],
                read_only: false,
            },
        ])
    }
}

impl NativeRegistry for StubRegistry {
    fn candidates(&self, name: &str) -> Vec<&CallableInfo> {
        self.0
            .iter()
            .filter(|c| c.signature.name() == name)
            .collect()
    }

    fn has_module(&self, _module: &str) -> bool {
        false
    }
}

fn lower(source: &str) -> IrProgram {
    let buffer = SourceBuffer::new("test.flow", source);
    let (unit, mut report) = parse_unit(&buffer, &StubRegistry::new());
    assert!(!report.has_errors(), "parse failed:\n{report}");
    let program = generate_ir(&unit, &mut report);
    assert!(!report.has_errors(), "irgen failed:\n{report}");
    validate(&program).expect("generated IR must validate");
    program
}

#[test]
fn empty_handler_falls_off_as_not_handled() {
    let program = lower("handler main {}");
    let handler = program.handler("main").unwrap();
    let entry = handler.block(handler.entry());
    assert!(matches!(entry.terminator, Some(Terminator::Ret { .. })));
}

#[test]
fn entry_points_are_exported() {
    let program = lower("handler setup {} handler helper { log \"h\"; } handler main { helper; }");
    assert_eq!(program.exports, vec!["setup", "main"]);
}

#[test]
fn conditional_builds_diamond() {
    let program = lower(r#"handler main { if req.path == "/" log "root"; else log "other"; }"#);
    let handler = program.handler("main").unwrap();
    // entry + then + else + end
    assert_eq!(handler.order.len(), 4);
    let entry = handler.block(handler.entry());
    assert!(matches!(entry.terminator, Some(Terminator::CondBr { .. })));
}

#[test]
fn assignment_allocas_live_in_entry_block() {
    let program = lower(r#"handler main { if req.path == "/" { x = 1; log "" + x; } }"#);
    let handler = program.handler("main").unwrap();
    let entry = handler.block(handler.entry());
    assert!(
        entry
            .instrs
            .iter()
            .any(|i| matches!(i.kind, InstrKind::Alloca)),
        "alloca must be hoisted into entry:\n{}",
        handler.pretty_print()
    );
}

#[test]
fn match_lowers_to_match_terminator() {
    let program = lower(
        r#"handler main {
               match req.path {
                 on "/a" => log "A";
                 on "/b" => log "B";
                 else log "X";
               }
             }"#,
    );
    let handler = program.handler("main").unwrap();
    let entry = handler.block(handler.entry());
    let Some(Terminator::Match { cases, .. }) = &entry.terminator else {
        panic!("expected match terminator:\n{}", handler.pretty_print());
    };
    assert_eq!(cases.len(), 2);
}

#[test]
fn handler_invocation_is_inlined() {
    let program = lower(
        r#"handler helper { return 204; }
           handler main { helper; log "after"; }"#,
    );
    let main = program.handler("main").unwrap();
    let has_handler_call = main
        .ordered_blocks()
        .flat_map(|b| &b.instrs)
        .any(|i| matches!(i.kind, InstrKind::HandlerCall { .. }));
    assert!(has_handler_call, "inlined body must contain the native call");
}

#[test]
fn recursive_handler_invocation_is_rejected() {
    let buffer = SourceBuffer::new(
        "test.flow",
        "handler a { b; } handler b { a; } handler main { a; }",
    );
    let (unit, mut report) = parse_unit(&buffer, &StubRegistry::new());
    assert!(!report.has_errors());
    let _ = generate_ir(&unit, &mut report);
    assert!(report.has_errors());
    assert!(report.iter().any(|m| m.text.contains("recursive")));
}

#[test]
fn optimisation_collapses_constant_branch() {
    let buffer = SourceBuffer::new(
        "test.flow",
        r#"handler main { if true log "always"; else log "never"; }"#,
    );
    let (unit, mut report) = parse_unit(&buffer, &StubRegistry::new());
    assert!(!report.has_errors(), "{report}");
    let mut program = generate_ir(&unit, &mut report);
    PassManager::standard(1).run(&mut program);
    validate(&program).expect("optimised IR must validate");

    let handler = program.handler("main").unwrap();
    // the branch folded away entirely: one block, one surviving log call
    assert_eq!(handler.order.len(), 1, "{}", handler.pretty_print());
    let calls = handler
        .ordered_blocks()
        .flat_map(|b| &b.instrs)
        .filter(|i| matches!(i.kind, InstrKind::Call { .. }))
        .count();
    assert_eq!(calls, 1, "{}", handler.pretty_print());
}

#[test]
fn pass_pipeline_is_idempotent() {
    let buffer = SourceBuffer::new(
        "test.flow",
        r#"handler main {
               x = 1;
               if req.path == "/" { x = 2; }
               log "" + x;
               return 200;
             }"#,
    );
    let (unit, mut report) = parse_unit(&buffer, &StubRegistry::new());
    assert!(!report.has_errors(), "{report}");
    let mut program = generate_ir(&unit, &mut report);
    let pm = PassManager::standard(1);
    pm.run(&mut program);
    let first = program.pretty_print();
    pm.run(&mut program);
    let second = program.pretty_print();
    assert_eq!(first, second);
}
