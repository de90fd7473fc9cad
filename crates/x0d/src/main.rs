//! Daemon entry point.
//!
//! Loads the Flow configuration, compiles it, runs the `setup` handler
//! once, and then drives requests through `main`. Networking is handled
//! by the acceptor layer; this driver also serves as a configuration
//! checker (`--check`) and a bytecode inspector (`--dump-program`), and
//! can route a single simulated request for debugging (`--path`).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flow_compiler::{compile, CompileOptions};
use flow_core::{Report, SourceBuffer};
use flow_vm::{Outcome, Program, Runner, Runtime};

use x0d::runtime::{core_runtime, HostContext, Request, ServerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DiagnosticsFormat {
    Text,
    Json,
}

/// x0d — Flow-scripted HTTP server.
#[derive(Debug, Parser)]
#[command(name = "x0d", version, about)]
struct Args {
    /// Path to the Flow configuration.
    #[arg(short = 'f', long = "config", default_value = "x0d.flow")]
    config: PathBuf,

    /// Check the configuration and exit.
    #[arg(long)]
    check: bool,

    /// Print the compiled bytecode and exit.
    #[arg(long)]
    dump_program: bool,

    /// Diagnostic output format.
    #[arg(long, value_enum, default_value_t = DiagnosticsFormat::Text)]
    diagnostics: DiagnosticsFormat,

    /// Optimisation level (0 disables the optional passes).
    #[arg(short = 'O', long, default_value_t = 1)]
    optimize: u8,

    /// Route one simulated request with this path, then exit.
    #[arg(long)]
    path: Option<String>,

    /// Method of the simulated request.
    #[arg(long, default_value = "GET")]
    method: String,

    /// Headers of the simulated request (`Name: value`).
    #[arg(long = "header")]
    headers: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let source = match std::fs::read_to_string(&args.config) {
        Ok(source) => source,
        Err(err) => {
            error!("cannot read {}: {err}", args.config.display());
            return ExitCode::FAILURE;
        }
    };
    let buffer = SourceBuffer::new(args.config.display().to_string(), source);

    let runtime = core_runtime();
    let options = CompileOptions {
        optimize: args.optimize,
        require_entrypoints: true,
    };
    let (program, report) = compile(&buffer, &runtime, &options);
    emit_diagnostics(&report, args.diagnostics);

    let Some(program) = program else {
        return ExitCode::FAILURE;
    };
    if args.check {
        info!("{} OK", args.config.display());
        return ExitCode::SUCCESS;
    }
    if args.dump_program {
        print!("{}", program.disassemble_all());
        return ExitCode::SUCCESS;
    }

    // Run `setup` to completion before any request.
    let config = match run_setup(&program, &runtime) {
        Some(config) => config,
        None => return ExitCode::FAILURE,
    };
    info!(
        ports = ?config.listen_ports,
        workers = config.workers,
        "configuration loaded"
    );

    if let Some(path) = args.path {
        let request = Request {
            method: args.method.clone(),
            path,
            headers: parse_headers(&args.headers),
            remote: std::net::IpAddr::from([127, 0, 0, 1]),
        };
        return route_request(&program, &runtime, config, request);
    }

    warn!("acceptor layer not started from this driver; use --path to route a request");
    ExitCode::SUCCESS
}

fn emit_diagnostics(report: &Report, format: DiagnosticsFormat) {
    match format {
        DiagnosticsFormat::Text => {
            for message in report.iter() {
                eprintln!("{message}");
            }
        }
        DiagnosticsFormat::Json => {
            for message in report.iter() {
                match serde_json::to_string(message) {
                    Ok(line) => println!("{line}"),
                    Err(err) => error!("cannot serialize diagnostic: {err}"),
                }
            }
        }
    }
}

fn run_setup(program: &Program, runtime: &Runtime) -> Option<ServerConfig> {
    let setup = program.handler_id("setup")?;
    let mut runner = Runner::new(program, runtime, setup)
        .with_context(Box::new(HostContext::default()));
    loop {
        match runner.run() {
            Ok(Outcome::Finished(_)) => {
                return runner
                    .context::<HostContext>()
                    .map(|host| host.config.clone());
            }
            Ok(Outcome::Suspended) => {
                // Nothing in setup waits on external events here; resume
                // immediately.
                continue;
            }
            Ok(Outcome::Aborted) => return None,
            Err(err) => {
                error!("setup aborted: {err}");
                return None;
            }
        }
    }
}

fn route_request(
    program: &Program,
    runtime: &Runtime,
    config: ServerConfig,
    request: Request,
) -> ExitCode {
    let Some(main) = program.handler_id("main") else {
        error!("configuration has no 'main' handler");
        return ExitCode::FAILURE;
    };

    let mut error_handler = config.error_handler;
    let mut runner = Runner::new(program, runtime, main)
        .with_context(Box::new(HostContext::for_request(config, request)));
    loop {
        match runner.run() {
            Ok(Outcome::Finished(handled)) => {
                let status = runner
                    .context::<HostContext>()
                    .and_then(|host| host.status);
                match (handled, status) {
                    (true, Some(status)) => info!(status, "request handled"),
                    (true, None) => info!("request handled"),
                    (false, _) => {
                        if let Some(handler) = error_handler.take() {
                            info!("request not handled; invoking error handler");
                            let context = runner
                                .take_context()
                                .unwrap_or_else(|| Box::new(HostContext::default()));
                            runner =
                                Runner::new(program, runtime, handler).with_context(context);
                            continue;
                        }
                        info!("request not handled (would fall through to 404)");
                    }
                }
                return ExitCode::SUCCESS;
            }
            Ok(Outcome::Suspended) => {
                let sleep = runner
                    .context_mut::<HostContext>()
                    .and_then(|host| host.pending_sleep.take());
                if let Some(seconds) = sleep {
                    info!(seconds, "sleeping before resume");
                    std::thread::sleep(std::time::Duration::from_secs(seconds.max(0) as u64));
                }
                continue;
            }
            Ok(Outcome::Aborted) => {
                warn!("request aborted");
                return ExitCode::FAILURE;
            }
            Err(err) => {
                error!("runner aborted: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
}

fn parse_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter()
        .filter_map(|h| {
            h.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}
