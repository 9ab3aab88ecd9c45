use kelp_lexer::{lex, Node, Span, Token};
use kelp_types::{Kind, Type};
use smol_str::SmolStr;

use crate::{Decl, ElId, ElKind, ExpError, Sym, Tag, Tree, Val};

// ── Reader ───────────────────────────────────────────────────────

/// Read `source` into elements of `tree`, one per top-level form.
pub fn read(tree: &mut Tree, source: &str) -> Result<Vec<ElId>, ExpError> {
    let (tokens, bad) = lex(source);
    if let Some(&span) = bad.first() {
        return Err(ExpError::Read {
            msg: "unexpected character".into(),
            span,
        });
    }
    let (nodes, errors) = kelp_lexer::read(&tokens);
    if let Some(err) = errors.into_iter().next() {
        return Err(ExpError::Read {
            msg: err.message,
            span: err.span,
        });
    }
    let mut r = Reader { tree, source };
    r.seq(&nodes)
}

/// Symbols that name types rather than definitions.
fn is_type_word(s: &str) -> bool {
    s.starts_with(['\'', '@', '~'])
        || s.contains('|')
        || Kind::from_name(s.strip_suffix('?').unwrap_or(s)).is_some()
}

/// Heads of parenthesized type notation.
fn is_type_head(s: &str) -> bool {
    let s = s.strip_suffix('?').unwrap_or(s);
    s.starts_with('\'') || matches!(s, "obj" | "bits" | "enum" | "form" | "func" | "alt")
}

fn is_marker(node: &Node) -> bool {
    matches!(
        node,
        Node::Atom(Token::Tag(_) | Token::Decl(_) | Token::Naked, _)
    )
}

struct Reader<'a> {
    tree: &'a mut Tree,
    source: &'a str,
}

impl Reader<'_> {
    fn err(&self, msg: impl Into<String>, span: Span) -> ExpError {
        ExpError::Read {
            msg: msg.into(),
            span,
        }
    }

    fn parse_type(&self, text: &str, span: Span) -> Result<Type, ExpError> {
        Type::parse(text).map_err(|e| self.err(e.to_string(), span))
    }

    /// Sibling elements. Tags take the next ordinary sibling; declarations
    /// take every sibling up to the next declaration or naked marker.
    fn seq(&mut self, nodes: &[Node]) -> Result<Vec<ElId>, ExpError> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < nodes.len() {
            let node = &nodes[i];
            i += 1;
            let el = match node {
                Node::Atom(Token::Tag(name), span) => {
                    let (el, span) = match nodes.get(i) {
                        Some(next) if !is_marker(next) => {
                            i += 1;
                            (Some(self.node(next)?), span.merge(next.span()))
                        }
                        _ => (None, *span),
                    };
                    let tag = Tag {
                        name: name.clone(),
                        el,
                    };
                    self.tree.alloc(ElKind::Tag(tag), span)
                }
                Node::Atom(Token::Decl(name), span) => {
                    let start = i;
                    while i < nodes.len()
                        && !matches!(nodes[i], Node::Atom(Token::Decl(_) | Token::Naked, _))
                    {
                        i += 1;
                    }
                    let args = self.seq(&nodes[start..i])?;
                    let span = nodes[start..i]
                        .last()
                        .map_or(*span, |last| span.merge(last.span()));
                    let decl = Decl {
                        name: name.clone(),
                        args,
                    };
                    self.tree.alloc(ElKind::Decl(decl), span)
                }
                node => self.node(node)?,
            };
            out.push(el);
        }
        Ok(out)
    }

    fn node(&mut self, node: &Node) -> Result<ElId, ExpError> {
        let span = node.span();
        let kind = match node {
            Node::Atom(Token::Symbol(s), _) if is_type_word(s) => {
                ElKind::Atom(Val::Typ(self.parse_type(s, span)?))
            }
            Node::Atom(Token::Symbol(name) | Token::Path(name), _) => ElKind::Sym(Sym {
                name: name.clone(),
                def: None,
            }),
            Node::Atom(Token::Naked, _) => ElKind::Decl(Decl {
                name: SmolStr::default(),
                args: Vec::new(),
            }),
            Node::Atom(Token::Tag(name), _) => ElKind::Tag(Tag {
                name: name.clone(),
                el: None,
            }),
            Node::Atom(Token::Decl(name), _) => ElKind::Decl(Decl {
                name: name.clone(),
                args: Vec::new(),
            }),
            Node::List(children, _) => {
                if children.first().and_then(Node::as_symbol).is_some_and(is_type_head) {
                    let text = span.slice(self.source);
                    ElKind::Atom(Val::Typ(self.parse_type(text, span)?))
                } else {
                    ElKind::Dyn(self.seq(children)?)
                }
            }
            node => ElKind::Atom(self.literal(node)?),
        };
        Ok(self.tree.alloc(kind, span))
    }

    /// Literal values: scalars, type words, `[...]` and `{key:value ...}`.
    fn literal(&self, node: &Node) -> Result<Val, ExpError> {
        let span = node.span();
        Ok(match node {
            Node::Atom(Token::Int(n), _) => Val::Int(*n),
            Node::Atom(Token::Float(n), _) => Val::Real(*n),
            Node::Atom(Token::String(s), _) => Val::Str(s.into()),
            Node::Atom(Token::True, _) => Val::Bool(true),
            Node::Atom(Token::False, _) => Val::Bool(false),
            Node::Atom(Token::Null, _) => Val::Null,
            Node::Atom(Token::Symbol(s), _) if is_type_word(s) => {
                Val::Typ(self.parse_type(s, span)?)
            }
            Node::Vector(items, _) => Val::List(
                items
                    .iter()
                    .map(|n| self.literal(n))
                    .collect::<Result<_, _>>()?,
            ),
            Node::Map(items, _) => Val::Dict(self.pairs(items)?),
            _ => return Err(self.err("expected a literal", span)),
        })
    }

    fn pairs(&self, items: &[Node]) -> Result<Vec<(SmolStr, Val)>, ExpError> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < items.len() {
            let key = match &items[i] {
                Node::Atom(Token::Symbol(s), _) => s.clone(),
                Node::Atom(Token::String(s), _) => SmolStr::new(s),
                other => return Err(self.err("expected a key", other.span())),
            };
            // `{a:true}` lexes the value as a tag
            let val = match items.get(i + 1) {
                Some(Node::Atom(Token::Colon, _)) => {
                    let node = items
                        .get(i + 2)
                        .ok_or_else(|| self.err("missing value", items[i + 1].span()))?;
                    i += 3;
                    self.literal(node)?
                }
                Some(Node::Atom(Token::Tag(word), span)) => {
                    i += 2;
                    match word.as_str() {
                        "true" => Val::Bool(true),
                        "false" => Val::Bool(false),
                        "null" => Val::Null,
                        _ => return Err(self.err("expected a literal", *span)),
                    }
                }
                _ => return Err(self.err("expected ':' after key", items[i].span())),
            };
            out.push((key, val));
        }
        Ok(out)
    }
}
