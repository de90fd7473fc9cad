//! Source locations for diagnostics.
//!
//! Flow units compile one file at a time, so locations are plain
//! line/column pairs rather than file-id spans. [`SourceBuffer`] owns the
//! source text of the unit being compiled and converts the byte ranges the
//! lexer produces into [`SourceSpan`]s.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A 1-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An inclusive source range, printed as `[l:c..l:c]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub begin: SourcePos,
    pub end: SourcePos,
}

impl SourceSpan {
    pub fn new(begin: SourcePos, end: SourcePos) -> Self {
        Self { begin, end }
    }

    /// Zero span pointing at the start of the unit.
    pub fn zero() -> Self {
        Self::new(SourcePos::new(1, 1), SourcePos::new(1, 1))
    }

    /// Span covering both `self` and `other`.
    pub fn merge(&self, other: &SourceSpan) -> SourceSpan {
        SourceSpan {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.begin, self.end)
    }
}

/// Source text of one compilation unit with a line index.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    name: String,
    source: String,
    /// Byte offset of each line start; `line_starts[0]` is always 0 and the
    /// final entry is the EOF sentinel.
    line_starts: Vec<u32>,
}

impl SourceBuffer {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let mut line_starts = vec![0u32];
        for (idx, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push((idx + 1) as u32);
            }
        }
        if line_starts.last() != Some(&(source.len() as u32)) {
            line_starts.push(source.len() as u32);
        }
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-based line/column of a byte offset. Offsets past EOF clamp to EOF.
    pub fn position(&self, offset: usize) -> SourcePos {
        let offset = (offset.min(self.source.len())) as u32;
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.max(1) - 1,
        };
        // The EOF sentinel is not a real line start unless the file ends in a
        // newline; clamp onto the last real line.
        let line_idx = line_idx.min(self.line_starts.len().saturating_sub(2));
        SourcePos {
            line: (line_idx + 1) as u32,
            column: offset - self.line_starts[line_idx] + 1,
        }
    }

    /// Span for a half-open byte range as produced by the lexer.
    ///
    /// The end position points at the last byte of the range, matching the
    /// inclusive `[l:c..l:c]` diagnostic format.
    pub fn span(&self, range: Range<usize>) -> SourceSpan {
        let begin = self.position(range.start);
        let end = self.position(range.end.max(range.start + 1) - 1);
        SourceSpan { begin, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let buf = SourceBuffer::new("t.flow", "hello\nworld\n");
        assert_eq!(buf.position(0), SourcePos::new(1, 1));
        assert_eq!(buf.position(5), SourcePos::new(1, 6));
        assert_eq!(buf.position(6), SourcePos::new(2, 1));
    }

    #[test]
    fn span_end_is_inclusive() {
        let buf = SourceBuffer::new("t.flow", "handler main {}");
        let span = buf.span(0..7);
        assert_eq!(span.begin, SourcePos::new(1, 1));
        assert_eq!(span.end, SourcePos::new(1, 7));
        assert_eq!(span.to_string(), "[1:1..1:7]");
    }

    #[test]
    fn offsets_past_eof_clamp() {
        let buf = SourceBuffer::new("t.flow", "ab");
        assert_eq!(buf.position(10), SourcePos::new(1, 3));
    }

    #[test]
    fn merge_spans() {
        let buf = SourceBuffer::new("t.flow", "one two three");
        let a = buf.span(0..3);
        let b = buf.span(8..13);
        assert_eq!(a.merge(&b).to_string(), "[1:1..1:13]");
    }
}
