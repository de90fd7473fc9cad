//! Compilation diagnostics.
//!
//! Every phase of the pipeline — lexing, parsing, IR generation,
//! verification, optimisation, code generation — appends to a single
//! [`Report`]. Compilation succeeds iff the report contains no message of
//! an error kind. Messages serialise in the `flowtest` wire format:
//!
//! ```text
//! # TypeError: [3:5..3:12] unknown variable 'foo'
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::span::SourceSpan;

/// Category of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Malformed input at the lexical level.
    TokenError,
    SyntaxError,
    TypeError,
    /// Unresolvable native callback or bad constant at link time.
    LinkError,
    Warning,
}

impl DiagnosticKind {
    /// Warnings do not fail a compilation; everything else does.
    pub fn is_error(self) -> bool {
        !matches!(self, DiagnosticKind::Warning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::TokenError => "TokenError",
            DiagnosticKind::SyntaxError => "SyntaxError",
            DiagnosticKind::TypeError => "TypeError",
            DiagnosticKind::LinkError => "LinkError",
            DiagnosticKind::Warning => "Warning",
        }
    }

    /// Inverse of [`as_str`](Self::as_str), used by the flowtest parser.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TokenError" => Some(DiagnosticKind::TokenError),
            "SyntaxError" => Some(DiagnosticKind::SyntaxError),
            "TypeError" => Some(DiagnosticKind::TypeError),
            "LinkError" => Some(DiagnosticKind::LinkError),
            "Warning" => Some(DiagnosticKind::Warning),
            _ => None,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single diagnostic with kind, source range, and text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: DiagnosticKind,
    pub range: SourceSpan,
    pub text: String,
}

impl Message {
    pub fn new(kind: DiagnosticKind, range: SourceSpan, text: impl Into<String>) -> Self {
        Self {
            kind,
            range,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "# {}: {} {}", self.kind, self.range, self.text)
    }
}

/// Ordered collection of diagnostics produced during one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    messages: Vec<Message>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn token_error(&mut self, range: SourceSpan, text: impl Into<String>) {
        self.push(Message::new(DiagnosticKind::TokenError, range, text));
    }

    pub fn syntax_error(&mut self, range: SourceSpan, text: impl Into<String>) {
        self.push(Message::new(DiagnosticKind::SyntaxError, range, text));
    }

    pub fn type_error(&mut self, range: SourceSpan, text: impl Into<String>) {
        self.push(Message::new(DiagnosticKind::TypeError, range, text));
    }

    pub fn link_error(&mut self, range: SourceSpan, text: impl Into<String>) {
        self.push(Message::new(DiagnosticKind::LinkError, range, text));
    }

    pub fn warning(&mut self, range: SourceSpan, text: impl Into<String>) {
        self.push(Message::new(DiagnosticKind::Warning, range, text));
    }

    /// Whether any message would fail the compilation.
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.kind.is_error())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{message}")?;
        }
        Ok(())
    }
}
