pub mod tree;

use logos::Logos;
use smol_str::SmolStr;

pub use tree::{read, Node, ReadError};

/// Source span as byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The source text covered by this span.
    pub fn slice(self, source: &str) -> &str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Body of a string literal with escapes replaced. `\u{hex}` names a
/// code point; any other unknown escape fails the token.
fn unescape(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let body = lex.slice().strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(body.len());
    let mut rest = body.chars();
    while let Some(c) = rest.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match rest.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            c @ ('\\' | '"') => c,
            'u' => {
                if rest.next()? != '{' {
                    return None;
                }
                let hex: String = rest.by_ref().take_while(|&c| c != '}').collect();
                char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?
            }
            _ => return None,
        });
    }
    Some(out)
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r";[^\n]*")]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(":")]
    Colon,
    /// The naked declaration marker: a lone `+`.
    #[token("+")]
    Naked,

    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", priority = 3, callback = |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r"-?[0-9]+", priority = 2, callback = |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""([^"\\]|\\.)*""#, callback = unescape)]
    String(String),

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    /// Tag: `:name`, `:limit`
    #[regex(r":[a-zA-Z_][a-zA-Z0-9_\-!?]*", callback = |lex| SmolStr::new(&lex.slice()[1..]))]
    Tag(SmolStr),

    /// Declaration: `+name`, `+x`
    #[regex(r"\+[a-zA-Z_][a-zA-Z0-9_\-!?]*", callback = |lex| SmolStr::new(&lex.slice()[1..]))]
    Decl(SmolStr),

    /// Relative path, leading dot included: `.name`, `.pos.x`
    #[regex(r"(\.[a-zA-Z0-9_][a-zA-Z0-9_\-!?]*)+", callback = |lex| SmolStr::new(lex.slice()))]
    Path(SmolStr),

    /// Symbols, operator names, type names and marked names:
    /// `and`, `list|int`, `int?`, `@node`, `$x`, `/root.key`, `~point`, `'1`
    #[regex(r"[a-zA-Z_\-*/<>=!&^~$@'][a-zA-Z0-9_+\-*/<>=!&|^~.?$@']*", priority = 1, callback = |lex| SmolStr::new(lex.slice()))]
    Symbol(SmolStr),
}

/// Tokens of `source` with their spans, and the spans that did not lex.
/// A run of adjacent bad input is one error span.
pub fn lex(source: &str) -> (Vec<(Token, Span)>, Vec<Span>) {
    let mut tokens = Vec::new();
    let mut errors: Vec<Span> = Vec::new();
    for (res, range) in Token::lexer(source).spanned() {
        let span = Span::new(range.start as u32, range.end as u32);
        match res {
            Ok(token) => tokens.push((token, span)),
            Err(_) => match errors.last_mut() {
                Some(last) if last.end == span.start => *last = last.merge(span),
                _ => errors.push(span),
            },
        }
    }
    (tokens, errors)
}
