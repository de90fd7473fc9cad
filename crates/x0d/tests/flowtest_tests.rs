//! Conformance fixtures and an end-to-end drive of a routing config.

use std::path::PathBuf;

use flow_compiler::{compile, CompileOptions};
use flow_core::SourceBuffer;
use flow_vm::{Outcome, Runner};

use x0d::flowtest::{check, parse_test_program};
use x0d::runtime::{core_runtime, HostContext, Request, ServerConfig};

fn testdata() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

#[test]
fn all_testdata_fixtures_conform() {
    let runtime = core_runtime();
    let mut seen = 0;
    for entry in std::fs::read_dir(testdata()).expect("testdata directory") {
        let path = entry.expect("dir entry").path();
        if path.extension().map(|e| e != "flow").unwrap_or(true) {
            continue;
        }
        seen += 1;
        let input = std::fs::read_to_string(&path).expect("fixture readable");
        let test = parse_test_program(&input).expect("fixture parses");
        let problems = check(&test, &path.display().to_string(), &runtime);
        assert!(
            problems.is_empty(),
            "{} failed:\n{}",
            path.display(),
            problems.join("\n")
        );
    }
    assert!(seen >= 5, "expected the fixture corpus, found {seen} files");
}

#[test]
fn routing_config_end_to_end() {
    let source = std::fs::read_to_string(testdata().join("routing.flow")).unwrap();
    let buffer = SourceBuffer::new("routing.flow", source);
    let runtime = core_runtime();
    let options = CompileOptions {
        optimize: 1,
        require_entrypoints: true,
    };
    let (program, report) = compile(&buffer, &runtime, &options);
    assert!(!report.has_errors(), "{report}");
    let program = program.unwrap();

    // setup runs once and accumulates the server configuration
    let setup = program.handler_id("setup").unwrap();
    let mut runner =
        Runner::new(&program, &runtime, setup).with_context(Box::new(HostContext::default()));
    assert!(matches!(runner.run().unwrap(), Outcome::Finished(_)));
    let config = runner.context::<HostContext>().unwrap().config.clone();
    assert_eq!(config.listen_ports, vec![8080]);
    assert_eq!(config.workers, 4);
    assert_eq!(config.docroot.as_deref(), Some("/var/www"));

    // per-request invocations of main
    let route = |path: &str| -> (bool, Option<i64>) {
        let request = Request {
            path: path.to_string(),
            ..Request::default()
        };
        let main = program.handler_id("main").unwrap();
        let mut runner = Runner::new(&program, &runtime, main).with_context(Box::new(
            HostContext::for_request(ServerConfig::default(), request),
        ));
        let outcome = runner.run().unwrap();
        let status = runner
            .context::<HostContext>()
            .and_then(|host| host.status);
        (outcome == Outcome::Finished(true), status)
    };

    assert_eq!(route("/static/app.css"), (true, Some(200)));
    assert_eq!(route("/api/users"), (true, Some(404)));
}

#[test]
fn handler_reference_configures_the_error_handler() {
    let source = r#"
        handler notfound { return 404; }
        handler setup { error.handler notfound; }
        handler main {}
    "#;
    let buffer = SourceBuffer::new("t.flow", source);
    let runtime = core_runtime();
    let options = CompileOptions {
        optimize: 1,
        require_entrypoints: true,
    };
    let (program, report) = compile(&buffer, &runtime, &options);
    assert!(!report.has_errors(), "{report}");
    let program = program.unwrap();

    // setup captures the linked handler id
    let setup = program.handler_id("setup").unwrap();
    let mut runner =
        Runner::new(&program, &runtime, setup).with_context(Box::new(HostContext::default()));
    assert!(matches!(runner.run().unwrap(), Outcome::Finished(_)));
    let error_handler = runner
        .context::<HostContext>()
        .unwrap()
        .config
        .error_handler
        .expect("error handler recorded");
    assert_eq!(Some(error_handler), program.handler_id("notfound"));

    // main declines, the error handler answers 404
    let main = program.handler_id("main").unwrap();
    let mut runner = Runner::new(&program, &runtime, main).with_context(Box::new(
        HostContext::for_request(ServerConfig::default(), Request::default()),
    ));
    assert_eq!(runner.run().unwrap(), Outcome::Finished(false));
    let context = runner.take_context().unwrap();
    let mut runner = Runner::new(&program, &runtime, error_handler).with_context(context);
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
    assert_eq!(
        runner.context::<HostContext>().unwrap().status,
        Some(404)
    );
}

#[test]
fn setup_context_state_does_not_leak_into_requests() {
    let source = "handler setup { listen 80; } handler main { return 204; }";
    let buffer = SourceBuffer::new("t.flow", source);
    let runtime = core_runtime();
    let (program, report) = compile(&buffer, &runtime, &CompileOptions::default());
    assert!(!report.has_errors(), "{report}");
    let program = program.unwrap();

    let main = program.handler_id("main").unwrap();
    let mut runner = Runner::new(&program, &runtime, main).with_context(Box::new(
        HostContext::for_request(ServerConfig::default(), Request::default()),
    ));
    assert_eq!(runner.run().unwrap(), Outcome::Finished(true));
    let host = runner.context::<HostContext>().unwrap();
    assert_eq!(host.status, Some(204));
    assert!(host.config.listen_ports.is_empty());
}
