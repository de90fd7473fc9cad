//! The `flowtest` conformance format.
//!
//! A TestProgram file is a Flow program, optionally followed by an
//! initializer line and the messages a conforming implementation must
//! produce for it:
//!
//! ```text
//! TestProgram     ::= FlowProgram [Initializer Message*]
//! Initializer     ::= '#' '----' LF
//! Message         ::= '#' DiagnosticsType ':' Location? MessageText LF
//! DiagnosticsType ::= 'TokenError' | 'SyntaxError' | 'TypeError'
//!                   | 'Warning' | 'LinkError'
//! Location        ::= '[' Line ':' Column '..' Line ':' Column ']'
//! ```
//!
//! A file without an initializer must compile without diagnostics.

use flow_core::{DiagnosticKind, Report, SourceBuffer, SourcePos, SourceSpan};
use flow_compiler::{compile, CompileOptions};
use flow_vm::Runtime;

/// One expected diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedMessage {
    pub kind: DiagnosticKind,
    /// `None` when the expectation omits the location.
    pub range: Option<SourceSpan>,
    pub text: String,
}

/// A parsed TestProgram file.
#[derive(Debug, Clone)]
pub struct TestProgram {
    pub source: String,
    pub expected: Vec<ExpectedMessage>,
}

/// Split a TestProgram file into program text and expectations.
pub fn parse_test_program(input: &str) -> Result<TestProgram, String> {
    let mut source = String::new();
    let mut expected = Vec::new();
    let mut in_messages = false;

    for (number, line) in input.lines().enumerate() {
        let trimmed = line.trim_start();
        if !in_messages {
            if trimmed.starts_with("# ----") || trimmed.starts_with("#----") {
                in_messages = true;
            } else {
                source.push_str(line);
                source.push('\n');
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        let message = trimmed
            .strip_prefix('#')
            .ok_or_else(|| format!("line {}: expected '#' message line", number + 1))?;
        expected.push(parse_message(message.trim(), number + 1)?);
    }

    Ok(TestProgram { source, expected })
}

fn parse_message(line: &str, number: usize) -> Result<ExpectedMessage, String> {
    let (kind, rest) = line
        .split_once(':')
        .ok_or_else(|| format!("line {number}: missing ':' after diagnostic kind"))?;
    let kind = DiagnosticKind::parse(kind.trim())
        .ok_or_else(|| format!("line {number}: unknown diagnostic kind '{kind}'"))?;

    let rest = rest.trim_start();
    let (range, text) = if let Some(after) = rest.strip_prefix('[') {
        let (location, text) = after
            .split_once(']')
            .ok_or_else(|| format!("line {number}: unterminated location"))?;
        (Some(parse_location(location, number)?), text.trim_start())
    } else {
        (None, rest)
    };

    Ok(ExpectedMessage {
        kind,
        range,
        text: text.to_string(),
    })
}

fn parse_location(location: &str, number: usize) -> Result<SourceSpan, String> {
    let (begin, end) = location
        .split_once("..")
        .ok_or_else(|| format!("line {number}: location must be 'l:c..l:c'"))?;
    Ok(SourceSpan::new(
        parse_pos(begin, number)?,
        parse_pos(end, number)?,
    ))
}

fn parse_pos(pos: &str, number: usize) -> Result<SourcePos, String> {
    let (line, column) = pos
        .split_once(':')
        .ok_or_else(|| format!("line {number}: position must be 'line:column'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| format!("line {number}: bad number '{s}'"))
    };
    Ok(SourcePos::new(parse(line)?, parse(column)?))
}

/// Compile the program and diff produced diagnostics against the
/// expectations. Returns the mismatches, empty on success.
pub fn check(test: &TestProgram, name: &str, runtime: &Runtime) -> Vec<String> {
    let buffer = SourceBuffer::new(name, test.source.clone());
    let (_, report) = compile(&buffer, runtime, &CompileOptions::default());
    diff(&report, &test.expected)
}

fn diff(report: &Report, expected: &[ExpectedMessage]) -> Vec<String> {
    let mut failures = Vec::new();

    for want in expected {
        let found = report.iter().any(|message| {
            message.kind == want.kind
                && message.text == want.text
                && want.range.map(|r| r == message.range).unwrap_or(true)
        });
        if !found {
            failures.push(format!(
                "missing expected message: # {}: {}",
                want.kind, want.text
            ));
        }
    }

    for message in report.iter() {
        let anticipated = expected.iter().any(|want| {
            message.kind == want.kind
                && message.text == want.text
                && want.range.map(|r| r == message.range).unwrap_or(true)
        });
        if !anticipated {
            failures.push(format!("unexpected message: {message}"));
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_program_without_expectations() {
        let test = parse_test_program("handler main { return 200; }\n").unwrap();
        assert!(test.expected.is_empty());
        assert!(test.source.contains("handler main"));
    }

    #[test]
    fn parses_messages_with_and_without_location() {
        let input = "handler main {}\n\
                     # ----\n\
                     # LinkError: [1:20..1:24] unknown function 'foo'\n\
                     # Warning: something odd\n";
        let test = parse_test_program(input).unwrap();
        assert_eq!(test.expected.len(), 2);
        assert_eq!(test.expected[0].kind, DiagnosticKind::LinkError);
        assert_eq!(
            test.expected[0].range,
            Some(SourceSpan::new(SourcePos::new(1, 20), SourcePos::new(1, 24)))
        );
        assert_eq!(test.expected[1].range, None);
        assert_eq!(test.expected[1].text, "something odd");
    }

    #[test]
    fn rejects_malformed_message_lines() {
        let input = "x\n# ----\n# Bogus [1:1..1:1] text\n";
        assert!(parse_test_program(input).is_err());
    }
}
