//! Logos-based lexer for Flow source text.
//!
//! Regex literals (`/…/`) are intentionally absent from the token set: the
//! slash is ambiguous with division and is resolved by the parser, which
//! asks the token stream to re-scan the raw source when a regex literal is
//! permitted (see [`crate::stream::TokenStream::relex_regex`]).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use logos::{Lexer, Logos};

use flow_core::Cidr;

fn unescape(lex: &mut Lexer<Token>) -> String {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

fn parse_ipv4(lex: &mut Lexer<Token>) -> Option<IpAddr> {
    lex.slice().parse::<Ipv4Addr>().ok().map(IpAddr::V4)
}

fn parse_ipv6(lex: &mut Lexer<Token>) -> Option<IpAddr> {
    lex.slice().parse::<Ipv6Addr>().ok().map(IpAddr::V6)
}

fn parse_cidr(lex: &mut Lexer<Token>) -> Option<Cidr> {
    lex.slice().parse::<Cidr>().ok()
}

/// Flow token.
///
/// `return`, `log`, `sleep` and friends are native callable names, not
/// keywords; only the structural words of the language are reserved.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // --- Keywords ---
    #[token("handler")]
    Handler,
    #[token("import")]
    Import,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("match")]
    Match,
    #[token("on")]
    On,
    #[token("in")]
    In,

    // --- Literals ---
    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok(), priority = 3)]
    Number(i64),

    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    String(String),

    #[regex(r"([0-9]{1,3}\.){3}[0-9]{1,3}/[0-9]{1,2}", parse_cidr, priority = 6)]
    #[regex(r"[0-9a-fA-F]*(:[0-9a-fA-F]*){2,7}/[0-9]{1,3}", parse_cidr, priority = 6)]
    CidrLiteral(Cidr),

    #[regex(r"([0-9]{1,3}\.){3}[0-9]{1,3}", parse_ipv4, priority = 5)]
    IpV4(IpAddr),

    #[regex(r"[0-9a-fA-F]*(:[0-9a-fA-F]*){2,7}", parse_ipv6, priority = 5)]
    IpV6(IpAddr),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 2)]
    Ident(String),

    // --- Operators ---
    #[token("**")]
    StarStar,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("=~")]
    RegexMatch,
    #[token("=^")]
    PrefixMatch,
    #[token("=$")]
    SuffixMatch,
    #[token("=>")]
    FatArrow,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("=")]
    Assign,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,

    // --- Punctuation ---
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    /// Unrecognized input, captured by a lowest-priority catch-all so the
    /// lexer is total. Reported as a `TokenError` when the parser reaches
    /// it; silently skipped when it falls inside a re-scanned regex literal
    /// (where characters like `$` are perfectly legal).
    #[regex(r".", |lex| lex.slice().to_string(), priority = 0)]
    Error(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Handler => write!(f, "handler"),
            Token::Import => write!(f, "import"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::Match => write!(f, "match"),
            Token::On => write!(f, "on"),
            Token::In => write!(f, "in"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::Number(n) => write!(f, "{n}"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::CidrLiteral(c) => write!(f, "{c}"),
            Token::IpV4(ip) | Token::IpV6(ip) => write!(f, "{ip}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::StarStar => write!(f, "**"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::EqEq => write!(f, "=="),
            Token::BangEq => write!(f, "!="),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::RegexMatch => write!(f, "=~"),
            Token::PrefixMatch => write!(f, "=^"),
            Token::SuffixMatch => write!(f, "=$"),
            Token::FatArrow => write!(f, "=>"),
            Token::AmpAmp => write!(f, "&&"),
            Token::PipePipe => write!(f, "||"),
            Token::Assign => write!(f, "="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Bang => write!(f, "!"),
            Token::Tilde => write!(f, "~"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Error(s) => write!(f, "{s}"),
        }
    }
}
