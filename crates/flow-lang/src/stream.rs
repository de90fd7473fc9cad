//! Token stream with lookahead, span tracking and regex re-scanning.

use std::ops::Range;

use logos::Logos;

use flow_core::{SourceBuffer, SourceSpan};

use crate::lexer::Token;

/// A lexed token paired with its byte range in the source.
pub type Spanned = (Token, Range<usize>);

/// Cursor over the lexed unit.
///
/// Wraps the token vector with lookahead and converts byte ranges into the
/// line/column spans diagnostics use. Unrecognized input becomes a
/// [`Token::Error`] entry rather than an immediate diagnostic: characters
/// like `$` are perfectly legal inside a `/…/` regex literal, which is only
/// recognized once the parser re-scans it.
pub struct TokenStream<'src> {
    buffer: &'src SourceBuffer,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'src> TokenStream<'src> {
    pub fn lex(buffer: &'src SourceBuffer) -> Self {
        let mut tokens = Vec::new();
        let mut lexer = Token::lexer(buffer.source());
        while let Some(result) = lexer.next() {
            let range = lexer.span();
            match result {
                Ok(token) => tokens.push((token, range)),
                Err(()) => {
                    let text = buffer.source()[range.clone()].to_string();
                    tokens.push((Token::Error(text), range));
                }
            }
        }
        Self {
            buffer,
            tokens,
            pos: 0,
        }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    /// Consume and return the current token.
    pub fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Whether the current token has the same discriminant as `expected`.
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consume the current token if it matches `expected`.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn current_pos(&self) -> usize {
        self.pos
    }

    /// Span of the current token, or a caret at EOF.
    pub fn current_span(&self) -> SourceSpan {
        match self.tokens.get(self.pos) {
            Some((_, range)) => self.buffer.span(range.clone()),
            None => match self.tokens.last() {
                Some((_, range)) => self.buffer.span(range.end..range.end + 1),
                None => SourceSpan::zero(),
            },
        }
    }

    /// Span from the token at stream position `start` through the last
    /// consumed token.
    pub fn span_from(&self, start: usize) -> SourceSpan {
        let Some((_, first)) = self.tokens.get(start) else {
            return self.current_span();
        };
        let end = if self.pos > 0 {
            self.tokens
                .get(self.pos - 1)
                .map(|(_, r)| r.end)
                .unwrap_or(first.end)
        } else {
            first.end
        };
        self.buffer.span(first.start..end.max(first.start + 1))
    }

    /// Re-scan a `/…/` regex literal starting at the current `/` token.
    ///
    /// The slash is ambiguous with division, so regex literals are not lexed
    /// up front; the parser calls this when a primary expression is expected
    /// and the lookahead is `/`. On success the pattern text (without
    /// delimiters) and its span are returned and every token the raw scan
    /// overran is discarded. `\/` escapes a slash inside the pattern.
    pub fn relex_regex(&mut self) -> Result<(String, SourceSpan), SourceSpan> {
        debug_assert!(self.check(&Token::Slash));
        let (_, slash) = &self.tokens[self.pos];
        let start_byte = slash.start;
        let source = self.buffer.source();

        let mut pattern = String::new();
        let mut escaped = false;
        let mut end_byte = None;
        for (off, ch) in source[start_byte + 1..].char_indices() {
            let at = start_byte + 1 + off;
            if escaped {
                if ch != '/' {
                    pattern.push('\\');
                }
                pattern.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '/' {
                end_byte = Some(at + 1);
                break;
            } else if ch == '\n' {
                break;
            } else {
                pattern.push(ch);
            }
        }

        match end_byte {
            Some(end) => {
                // Skip every token the raw scan consumed.
                while self.pos < self.tokens.len() && self.tokens[self.pos].1.start < end {
                    self.pos += 1;
                }
                Ok((pattern, self.buffer.span(start_byte..end)))
            }
            None => Err(self.buffer.span(start_byte..start_byte + 1)),
        }
    }

    /// Skip forward to the next statement boundary for error recovery.
    ///
    /// Stops after a `;`, or before a `}` / statement keyword, so one bad
    /// statement costs one diagnostic instead of cascading.
    pub fn synchronize(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::Semi => {
                    self.advance();
                    return;
                }
                Token::RBrace
                | Token::LBrace
                | Token::Handler
                | Token::If
                | Token::Match
                | Token::Import => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_errors_become_error_tokens() {
        let buffer = SourceBuffer::new("t.flow", "log @;");
        let mut s = TokenStream::lex(&buffer);
        assert_eq!(s.advance(), Some(Token::Ident("log".into())));
        assert_eq!(s.advance(), Some(Token::Error("@".into())));
        assert_eq!(s.advance(), Some(Token::Semi));
    }

    #[test]
    fn relex_regex_consumes_overrun_tokens() {
        let buffer = SourceBuffer::new("t.flow", "/^a b$/ ;");
        let mut s = TokenStream::lex(&buffer);
        let (pattern, span) = s.relex_regex().unwrap();
        assert_eq!(pattern, "^a b$");
        assert_eq!(span.to_string(), "[1:1..1:7]");
        assert_eq!(s.advance(), Some(Token::Semi));
    }

    #[test]
    fn relex_regex_escaped_slash() {
        let buffer = SourceBuffer::new("t.flow", r"/a\/b/");
        let mut s = TokenStream::lex(&buffer);
        let (pattern, _) = s.relex_regex().unwrap();
        assert_eq!(pattern, "a/b");
    }

    #[test]
    fn relex_regex_unterminated() {
        let buffer = SourceBuffer::new("t.flow", "/abc\n");
        let mut s = TokenStream::lex(&buffer);
        assert!(s.relex_regex().is_err());
    }

    #[test]
    fn synchronize_stops_after_semicolon() {
        let buffer = SourceBuffer::new("t.flow", "a b c ; next");
        let mut s = TokenStream::lex(&buffer);
        s.synchronize();
        assert_eq!(s.advance(), Some(Token::Ident("next".into())));
    }
}
