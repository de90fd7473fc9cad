//! Runner tests over hand-assembled programs.

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use flow_core::{FlowType, MatchClass};
use flow_vm::{
    ConstantPool, Instruction, MatchCaseDef, MatchDef, Opcode, Outcome, Program, Runner, Runtime,
};

fn link(pool: ConstantPool, runtime: &Runtime) -> Program {
    Program::link(pool, runtime).expect("program must link")
}

/// `ILOAD 200; HANDLER return,1; EXIT false` — the smallest program.
#[test]
fn smallest_main_invokes_return_native() {
    let seen = Arc::new(AtomicI64::new(0));
    let seen_in_native = seen.clone();

    let mut runtime = Runtime::new();
    runtime
        .register_handler("return")
        .param(FlowType::Number)
        .bind(move |params| {
            seen_in_native.store(params.get_int(1), Ordering::SeqCst);
            params.set_result(true);
        });

    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let return_sig =
        flow_core::Signature::new("return", FlowType::Boolean, vec![FlowType::Number]);
    let return_id = pool.make_native_handler(&return_sig);
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::ILOAD, 200),
            Instruction::op2(Opcode::HANDLER, return_id, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );

    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
    assert_eq!(seen.load(Ordering::SeqCst), 200);
}

#[test]
fn exit_false_when_handler_declines() {
    let mut runtime = Runtime::new();
    runtime
        .register_handler("pass")
        .bind(|params| params.set_result(false));

    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let pass_sig = flow_core::Signature::new("pass", FlowType::Boolean, vec![]);
    let pass_id = pool.make_native_handler(&pass_sig);
    pool.set_handler_code(
        main,
        vec![
            Instruction::op2(Opcode::HANDLER, pass_id, 0),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );

    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(false));
}

#[test]
fn wrapping_arithmetic_and_division_guard() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let big = pool.make_number(i64::MAX);
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::NLOAD, big),
            Instruction::op1(Opcode::ILOAD, 1),
            Instruction::op0(Opcode::NADD),
            Instruction::op1(Opcode::DISCARD, 1),
            Instruction::op1(Opcode::EXIT, 1),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));

    // division by zero aborts
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::ILOAD, 1),
            Instruction::op1(Opcode::ILOAD, 0),
            Instruction::op0(Opcode::NDIV),
            Instruction::op1(Opcode::EXIT, 1),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert!(runner.run().is_err());
    assert!(runner.is_finished());
}

#[test]
fn alloca_store_load_round_trip() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::ALLOCA, 1),
            Instruction::op1(Opcode::ILOAD, 7),
            Instruction::op1(Opcode::STORE, 0),
            Instruction::op1(Opcode::LOAD, 0),
            Instruction::op1(Opcode::ILOAD, 7),
            Instruction::op0(Opcode::NCMPEQ),
            Instruction::op1(Opcode::JZ, 8),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}

#[test]
fn string_opcodes() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let hello = pool.make_string("hello ");
    let world = pool.make_string("world");
    let expected = pool.make_string("hello world");
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::SLOAD, hello),
            Instruction::op1(Opcode::SLOAD, world),
            Instruction::op0(Opcode::SADD),
            Instruction::op1(Opcode::SLOAD, expected),
            Instruction::op0(Opcode::SCMPEQ),
            Instruction::op1(Opcode::JZ, 7),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}

#[test]
fn slen_and_sisempty() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let abc = pool.make_string("abc");
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::SLOAD, abc),
            Instruction::op0(Opcode::SLEN),
            Instruction::op1(Opcode::ILOAD, 3),
            Instruction::op0(Opcode::NCMPEQ),
            Instruction::op1(Opcode::JZ, 9),
            Instruction::op1(Opcode::SLOAD, abc),
            Instruction::op0(Opcode::SISEMPTY),
            Instruction::op1(Opcode::JN, 9),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}

#[test]
fn substring_and_power_opcodes() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let path = pool.make_string("/dl/archive.tar");
    let tail = pool.make_string("archive.tar");
    pool.set_handler_code(
        main,
        vec![
            // substr("/dl/archive.tar", 4) == "archive.tar"
            Instruction::op1(Opcode::SLOAD, path),
            Instruction::op1(Opcode::ILOAD, 4),
            Instruction::op0(Opcode::SSUBSTR),
            Instruction::op1(Opcode::SLOAD, tail),
            Instruction::op0(Opcode::SCMPEQ),
            Instruction::op1(Opcode::JZ, 13),
            // 2 ** 10 == 1024
            Instruction::op1(Opcode::ILOAD, 2),
            Instruction::op1(Opcode::ILOAD, 10),
            Instruction::op0(Opcode::NPOW),
            Instruction::op1(Opcode::ILOAD, 1024),
            Instruction::op0(Opcode::NCMPEQ),
            Instruction::op1(Opcode::JZ, 13),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}

#[test]
fn regex_match_records_captures() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let subject = pool.make_string("/dl/archive.tar");
    let regex = pool.make_regex("^/dl/(.*)$").unwrap();
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::SLOAD, subject),
            Instruction::op1(Opcode::SREGMATCH, regex),
            Instruction::op1(Opcode::JZ, 4),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
    let captures = runner.regex_captures().unwrap();
    assert_eq!(captures[1], "archive.tar");
}

#[test]
fn match_table_dispatch() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let subject = pool.make_string("/b");
    let a = pool.make_string("/a");
    let b = pool.make_string("/b");
    let match_id = pool.make_match_def(MatchDef {
        handler_id: main,
        class: MatchClass::Same,
        cases: vec![
            MatchCaseDef { label: a, pc: 2 },
            MatchCaseDef { label: b, pc: 3 },
        ],
        else_pc: 4,
    });
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::SLOAD, subject),
            Instruction::op1(Opcode::SMATCHEQ, match_id),
            Instruction::op1(Opcode::EXIT, 0), // "/a" case
            Instruction::op1(Opcode::EXIT, 1), // "/b" case
            Instruction::op1(Opcode::EXIT, 0), // else
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}

#[test]
fn ip_and_cidr_opcodes() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let ip = pool.make_ipaddr("192.168.7.9".parse().unwrap());
    let net = pool.make_cidr("192.168.0.0/16".parse().unwrap());
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::PLOAD, ip),
            Instruction::op1(Opcode::CLOAD, net),
            Instruction::op0(Opcode::PINCIDR),
            Instruction::op1(Opcode::JZ, 5),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}

#[test]
fn suspension_preserves_state_and_resumes() {
    let mut runtime = Runtime::new();
    runtime
        .register_function("sleep", FlowType::Void)
        .param(FlowType::Number)
        .bind(|params| {
            let _seconds = params.get_int(1);
            params.suspend();
        });
    runtime
        .register_handler("return")
        .param(FlowType::Number)
        .bind(|params| {
            params.set_result(params.get_int(1) == 200);
        });

    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let sleep_sig = flow_core::Signature::new("sleep", FlowType::Void, vec![FlowType::Number]);
    let sleep_id = pool.make_native_function(&sleep_sig);
    let return_sig =
        flow_core::Signature::new("return", FlowType::Boolean, vec![FlowType::Number]);
    let return_id = pool.make_native_handler(&return_sig);
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::ILOAD, 1),
            Instruction::new(Opcode::CALL, sleep_id, 1, 0),
            Instruction::op1(Opcode::ILOAD, 200),
            Instruction::op2(Opcode::HANDLER, return_id, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );

    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Suspended);
    assert!(runner.is_suspended());

    // resuming continues after the sleep and completes true
    assert_eq!(runner.resume().unwrap(), Outcome::Finished(true));
    assert!(runner.is_finished());

    // resume is idempotent-safe on a finished runner
    assert_eq!(runner.resume().unwrap(), Outcome::Finished(true));
}

#[test]
fn abort_prevents_resumption() {
    let mut runtime = Runtime::new();
    runtime
        .register_function("sleep", FlowType::Void)
        .param(FlowType::Number)
        .bind(|params| params.suspend());

    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let sleep_sig = flow_core::Signature::new("sleep", FlowType::Void, vec![FlowType::Number]);
    let sleep_id = pool.make_native_function(&sleep_sig);
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::ILOAD, 1),
            Instruction::new(Opcode::CALL, sleep_id, 1, 0),
            Instruction::op1(Opcode::EXIT, 1),
        ],
    );

    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Suspended);
    runner.abort();
    assert_eq!(runner.resume().unwrap(), Outcome::Aborted);
}

#[test]
fn casts_between_number_and_string() {
    let runtime = Runtime::new();
    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let text = pool.make_string("404");
    pool.set_handler_code(
        main,
        vec![
            Instruction::op1(Opcode::SLOAD, text),
            Instruction::op0(Opcode::S2N),
            Instruction::op0(Opcode::N2S),
            Instruction::op1(Opcode::SLOAD, text),
            Instruction::op0(Opcode::SCMPEQ),
            Instruction::op1(Opcode::JZ, 7),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );
    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}

#[test]
fn per_invocation_context_reaches_natives() {
    struct Request {
        path: &'static str,
    }

    let mut runtime = Runtime::new();
    runtime
        .register_function("req.path", FlowType::String)
        .bind(|params| {
            let path = params.context::<Request>().expect("request context").path;
            params.set_result(path);
        });

    let mut pool = ConstantPool::new();
    let main = pool.make_handler("main");
    let sig = flow_core::Signature::new("req.path", FlowType::String, vec![]);
    let id = pool.make_native_function(&sig);
    let expected = pool.make_string("/index.html");
    pool.set_handler_code(
        main,
        vec![
            Instruction::new(Opcode::CALL, id, 0, 1),
            Instruction::op1(Opcode::SLOAD, expected),
            Instruction::op0(Opcode::SCMPEQ),
            Instruction::op1(Opcode::JZ, 5),
            Instruction::op1(Opcode::EXIT, 1),
            Instruction::op1(Opcode::EXIT, 0),
        ],
    );

    let program = link(pool, &runtime);
    let mut runner = Runner::new(&program, &runtime, main)
        .with_context(Box::new(Request { path: "/index.html" }));
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
}
