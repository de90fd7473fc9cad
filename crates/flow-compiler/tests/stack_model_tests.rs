//! Static checks over generated bytecode: every program counter has a
//! uniquely determined operand-stack depth, and jump targets stay inside
//! their handler.

use flow_core::{FlowType, SourceBuffer};
use flow_compiler::{compile, CompileOptions};
use flow_vm::{Opcode, Program, Runtime};

fn stub_runtime() -> Runtime {
    let mut runtime = Runtime::new();
    runtime
        .register_function("log", FlowType::Void)
        .param(FlowType::String)
        .bind(|_| {});
    runtime
        .register_handler("return")
        .param(FlowType::Number)
        .bind(|params| params.set_result(true));
    runtime
        .register_function("req.path", FlowType::String)
        .bind(|params| params.set_result("/"));
    runtime
        .register_function("rand", FlowType::Number)
        .bind(|params| params.set_result(4i64));
    runtime
}

/// Walk the handler's control-flow edges, assigning each pc a depth and
/// failing on any inconsistent join.
fn check_handler(program: &Program, handler: u16) {
    let code = program.pool().handler_code(handler);
    let mut depths: Vec<Option<i64>> = vec![None; code.len()];
    let mut worklist = vec![(0usize, 0i64)];

    while let Some((pc, depth)) = worklist.pop() {
        assert!(pc < code.len(), "pc {pc} escapes the handler");
        match depths[pc] {
            Some(known) => {
                assert_eq!(
                    known, depth,
                    "pc {pc}: depth {depth} disagrees with {known}\n{}",
                    program.disassemble(handler)
                );
                continue;
            }
            None => depths[pc] = Some(depth),
        }

        let instr = code[pc];
        let (a, b, c) = (instr.a() as i64, instr.b() as i64, instr.c() as i64);
        match instr.opcode() {
            Opcode::EXIT => {}
            Opcode::JMP => worklist.push((instr.a() as usize, depth)),
            Opcode::JZ | Opcode::JN => {
                worklist.push((instr.a() as usize, depth - 1));
                worklist.push((pc + 1, depth - 1));
            }
            Opcode::SMATCHEQ | Opcode::SMATCHBEG | Opcode::SMATCHEND | Opcode::SMATCHR => {
                let def = program.pool().match_def(instr.a());
                for case in &def.cases {
                    worklist.push((case.pc, depth - 1));
                }
                worklist.push((def.else_pc, depth - 1));
            }
            opcode => {
                let effect = match opcode {
                    Opcode::NOP => 0,
                    // ALLOCA grows the slot array, not the operand stack
                    Opcode::ALLOCA => 0,
                    Opcode::DISCARD => -a,
                    Opcode::LOAD => 1,
                    Opcode::STORE => -1,
                    Opcode::ILOAD
                    | Opcode::NLOAD
                    | Opcode::SLOAD
                    | Opcode::PLOAD
                    | Opcode::CLOAD
                    | Opcode::RLOAD
                    | Opcode::ITLOAD
                    | Opcode::STLOAD
                    | Opcode::PTLOAD
                    | Opcode::CTLOAD => 1,
                    Opcode::CALL => -b + c,
                    Opcode::HANDLER => -b,
                    Opcode::N2S
                    | Opcode::P2S
                    | Opcode::C2S
                    | Opcode::R2S
                    | Opcode::S2N
                    | Opcode::NNEG
                    | Opcode::NNOT
                    | Opcode::BNOT
                    | Opcode::SLEN
                    | Opcode::SISEMPTY
                    | Opcode::SREGMATCH => 0,
                    // every remaining opcode is a binary pop-two-push-one
                    _ => -1,
                };
                let next = depth + effect;
                assert!(next >= 0, "pc {pc}: stack underflow to {next}");
                worklist.push((pc + 1, next));
            }
        }
    }
}

fn check_source(source: &str) {
    let runtime = stub_runtime();
    for optimize in [0u8, 1u8] {
        let buffer = SourceBuffer::new("test.flow", source);
        let options = CompileOptions {
            optimize,
            require_entrypoints: false,
        };
        let (program, report) = compile(&buffer, &runtime, &options);
        assert!(!report.has_errors(), "O{optimize} failed:\n{report}");
        let program = program.unwrap();
        for id in 0..program.pool().handler_count() as u16 {
            check_handler(&program, id);
        }
    }
}

#[test]
fn depth_is_unique_for_straight_line_code() {
    check_source("handler main { x = 1 + 2 * 3; log \"\" + x; return 200; }");
}

#[test]
fn depth_is_unique_across_branches() {
    check_source(
        r#"handler main {
            x = rand();
            if x == 4 { y = x * 2; log "" + y; }
            else log "other";
            if req.path == "/" log "root";
            return 200;
        }"#,
    );
}

#[test]
fn depth_is_unique_across_match_joins() {
    check_source(
        r#"handler main {
            match req.path {
              on "/a" => { a = 1; log "" + a; }
              on "/b" => log "b";
              else { c = rand(); log "" + c; }
            }
            return 200;
        }"#,
    );
}

#[test]
fn depth_is_unique_with_discarded_results() {
    check_source(
        r#"handler main {
            rand();
            if rand() == 1 rand();
            return 200;
        }"#,
    );
}
