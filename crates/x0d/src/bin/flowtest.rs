//! Conformance test driver for `.flow` TestProgram files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use x0d::flowtest::{check, parse_test_program};
use x0d::runtime::core_runtime;

/// flowtest — run Flow TestProgram conformance files.
#[derive(Debug, Parser)]
#[command(name = "flowtest", version, about)]
struct Args {
    /// TestProgram files or directories to scan for `.flow` files.
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args = Args::parse();
    if args.paths.is_empty() {
        eprintln!("usage: flowtest FILE|DIR...");
        return ExitCode::FAILURE;
    }

    let mut files = Vec::new();
    for path in &args.paths {
        collect(path, &mut files);
    }
    files.sort();

    let runtime = core_runtime();
    let mut failures = 0usize;
    for file in &files {
        let input = match std::fs::read_to_string(file) {
            Ok(input) => input,
            Err(err) => {
                eprintln!("FAIL {}: {err}", file.display());
                failures += 1;
                continue;
            }
        };
        let test = match parse_test_program(&input) {
            Ok(test) => test,
            Err(err) => {
                eprintln!("FAIL {}: {err}", file.display());
                failures += 1;
                continue;
            }
        };
        let problems = check(&test, &file.display().to_string(), &runtime);
        if problems.is_empty() {
            println!("ok   {}", file.display());
        } else {
            failures += 1;
            eprintln!("FAIL {}", file.display());
            for problem in problems {
                eprintln!("     {problem}");
            }
        }
    }

    println!("{} files, {} failures", files.len(), failures);
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn collect(path: &Path, out: &mut Vec<PathBuf>) {
    if path.is_dir() {
        let Ok(entries) = std::fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            collect(&entry.path(), out);
        }
    } else if path.extension().is_some_and(|ext| ext == "flow") {
        out.push(path.to_path_buf());
    }
}
