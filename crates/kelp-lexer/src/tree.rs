use crate::{Span, Token};

/// Read failure: unbalanced or stray delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.span, self.message)
    }
}

impl std::error::Error for ReadError {}

/// Token tree: the structural layer between tokens and elements.
#[derive(Debug, Clone)]
pub enum Node {
    /// A single token (symbol, literal, tag, declaration, ...)
    Atom(Token, Span),
    /// Parenthesized list: `(...)`.
    List(Vec<Node>, Span),
    /// Bracketed list literal: `[...]`.
    Vector(Vec<Node>, Span),
    /// Braced dict literal: `{...}`.
    Map(Vec<Node>, Span),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Atom(_, s) | Node::List(_, s) | Node::Vector(_, s) | Node::Map(_, s) => *s,
        }
    }

    /// If this is a Symbol atom, return its name.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Node::Atom(Token::Symbol(s), _) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Parse a token stream into a list of token trees.
pub fn read(tokens: &[(Token, Span)]) -> (Vec<Node>, Vec<ReadError>) {
    let mut reader = Reader {
        tokens,
        pos: 0,
        errors: Vec::new(),
    };
    let mut result = Vec::new();
    while !reader.at_end() {
        if let Some(node) = reader.read_node() {
            result.push(node);
        }
    }
    (result, reader.errors)
}

struct Reader<'a> {
    tokens: &'a [(Token, Span)],
    pos: usize,
    errors: Vec<ReadError>,
}

impl<'a> Reader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> (Token, Span) {
        let tok = self.tokens[self.pos].clone();
        self.pos += 1;
        tok
    }

    /// Read children up to `close`, returning them with the merged span.
    fn read_seq(&mut self, close: &Token, what: &str) -> Option<(Vec<Node>, Span)> {
        let (_, start_span) = self.advance();
        let mut children = Vec::new();
        while !self.at_end() && self.peek() != Some(close) {
            if let Some(child) = self.read_node() {
                children.push(child);
            } else {
                break;
            }
        }
        if self.at_end() || self.peek() != Some(close) {
            self.errors.push(ReadError {
                message: format!("unclosed '{}'", what),
                span: start_span,
            });
            return None;
        }
        let (_, end_span) = self.advance();
        Some((children, start_span.merge(end_span)))
    }

    fn read_node(&mut self) -> Option<Node> {
        if self.at_end() {
            return None;
        }

        match self.peek()? {
            Token::LParen => {
                let (children, span) = self.read_seq(&Token::RParen, "(")?;
                Some(Node::List(children, span))
            }
            Token::LBracket => {
                let (children, span) = self.read_seq(&Token::RBracket, "[")?;
                Some(Node::Vector(children, span))
            }
            Token::LBrace => {
                let (children, span) = self.read_seq(&Token::RBrace, "{")?;
                Some(Node::Map(children, span))
            }
            Token::RParen | Token::RBracket | Token::RBrace => {
                let (_, span) = self.advance();
                self.errors.push(ReadError {
                    message: "unexpected closing delimiter".into(),
                    span,
                });
                None
            }
            _ => {
                let (token, span) = self.advance();
                Some(Node::Atom(token, span))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_source(source: &str) -> Vec<Node> {
        let (tokens, lex_errors) = crate::lex(source);
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        let (nodes, read_errors) = read(&tokens);
        assert!(read_errors.is_empty(), "read errors: {:?}", read_errors);
        nodes
    }

    #[test]
    fn read_nested_lists() {
        let nodes = read_source("(and (or x 1) [1 2] {a:1})");
        assert_eq!(nodes.len(), 1);
        let Node::List(children, span) = &nodes[0] else {
            panic!("expected list, got {:?}", nodes[0]);
        };
        assert_eq!(*span, Span::new(0, 26));
        assert_eq!(children.len(), 4);
        assert_eq!(children[0].as_symbol(), Some("and"));
        assert!(matches!(&children[1], Node::List(inner, _) if inner.len() == 3));
        assert!(matches!(&children[2], Node::Vector(inner, _) if inner.len() == 2));
        assert!(matches!(&children[3], Node::Map(inner, _) if inner.len() == 3));
    }

    #[test]
    fn read_atoms() {
        let nodes = read_source("42 2.72 \"hello\" true :key +x foo");
        assert_eq!(nodes.len(), 7);
        assert!(matches!(&nodes[0], Node::Atom(Token::Int(42), _)));
        assert!(matches!(&nodes[1], Node::Atom(Token::Float(f), _) if *f == 2.72));
        assert!(matches!(&nodes[5], Node::Atom(Token::Decl(d), _) if d == "x"));
    }

    #[test]
    fn unclosed_list_is_reported() {
        let (tokens, _) = crate::lex("(and 1");
        let (nodes, errors) = read(&tokens);
        assert!(nodes.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unclosed '('");
    }

    #[test]
    fn stray_closing_delimiter() {
        let (tokens, _) = crate::lex("1 )");
        let (nodes, errors) = read(&tokens);
        assert_eq!(nodes.len(), 1);
        assert_eq!(errors[0].to_string(), "[2:3] unexpected closing delimiter");
    }
}
