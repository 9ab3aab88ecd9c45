use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use kelp_lexer::Span;
use kelp_types::Type;
use la_arena::{Arena, Idx};
use smol_str::SmolStr;

use crate::{Def, Spec, Val};

// ── Elements ─────────────────────────────────────────────────────

pub type ElId = Idx<El>;

#[derive(Debug, Clone)]
pub struct El {
    pub kind: ElKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ElKind {
    Atom(Val),
    Sym(Sym),
    Tag(Tag),
    /// `+name args...`; the naked marker `+` has an empty name and no
    /// arguments.
    Decl(Decl),
    /// An expression whose operator is not known yet.
    Dyn(Vec<ElId>),
    Call(Call),
}

#[derive(Debug, Clone)]
pub struct Sym {
    pub name: SmolStr,
    /// Cached definition once the symbol has been looked up.
    pub def: Option<Def>,
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub name: SmolStr,
    /// `None` for a flag tag.
    pub el: Option<ElId>,
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: SmolStr,
    pub args: Vec<ElId>,
}

impl Decl {
    pub fn is_naked(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub spec: Arc<Spec>,
    /// Arguments grouped by parameter, in parameter order.
    pub groups: Vec<Vec<ElId>>,
    /// Instantiated spec type, set on the first resolution.
    pub typ: Option<Type>,
}

impl Call {
    pub fn typ(&self) -> &Type {
        self.typ.as_ref().unwrap_or(&self.spec.typ)
    }
}

// ── Tree ─────────────────────────────────────────────────────────

/// Arena of elements. Resolution never mutates an element in place; it
/// allocates replacements, so earlier ids stay valid for retries.
#[derive(Debug, Clone)]
pub struct Tree {
    pub els: Arena<El>,
}

impl Tree {
    pub fn new() -> Self {
        Self { els: Arena::new() }
    }

    pub fn alloc(&mut self, kind: ElKind, span: Span) -> ElId {
        self.els.alloc(El { kind, span })
    }

    pub fn span(&self, id: ElId) -> Span {
        self.els[id].span
    }

    pub fn display(&self, id: ElId) -> ElDisplay<'_> {
        ElDisplay { tree: self, id }
    }

    /// Copy the elements reachable from `roots` into a tree of their own.
    /// Returns the new tree and the ids of the copied roots.
    pub fn extract(&self, roots: &[ElId]) -> (Tree, Vec<ElId>) {
        let mut out = Tree::new();
        let ids = self.copy_all(&mut out, roots);
        (out, ids)
    }

    fn copy_all(&self, out: &mut Tree, ids: &[ElId]) -> Vec<ElId> {
        ids.iter().map(|&id| self.copy_into(out, id)).collect()
    }

    fn copy_into(&self, out: &mut Tree, id: ElId) -> ElId {
        let el = &self[id];
        let kind = match &el.kind {
            ElKind::Tag(tag) => ElKind::Tag(Tag {
                name: tag.name.clone(),
                el: tag.el.map(|e| self.copy_into(out, e)),
            }),
            ElKind::Decl(decl) => ElKind::Decl(Decl {
                name: decl.name.clone(),
                args: self.copy_all(out, &decl.args),
            }),
            ElKind::Dyn(items) => ElKind::Dyn(self.copy_all(out, items)),
            ElKind::Call(call) => ElKind::Call(Call {
                spec: call.spec.clone(),
                groups: call.groups.iter().map(|g| self.copy_all(out, g)).collect(),
                typ: call.typ.clone(),
            }),
            kind => kind.clone(),
        };
        out.alloc(kind, el.span)
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<ElId> for Tree {
    type Output = El;

    fn index(&self, id: ElId) -> &El {
        &self.els[id]
    }
}

// ── Printer ──────────────────────────────────────────────────────

/// Source-like rendering of an element.
pub struct ElDisplay<'t> {
    tree: &'t Tree,
    id: ElId,
}

impl fmt::Display for ElDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut p = Printer {
            tree: self.tree,
            buf: String::new(),
        };
        p.print(self.id);
        f.write_str(&p.buf)
    }
}

struct Printer<'t> {
    tree: &'t Tree,
    buf: String,
}

impl Printer<'_> {
    fn print(&mut self, id: ElId) {
        match &self.tree[id].kind {
            ElKind::Atom(v) => self.buf.push_str(&v.to_string()),
            ElKind::Sym(sym) => self.buf.push_str(&sym.name),
            ElKind::Tag(tag) => {
                self.buf.push(':');
                self.buf.push_str(&tag.name);
                if let Some(el) = tag.el {
                    self.buf.push(' ');
                    self.print(el);
                }
            }
            ElKind::Decl(decl) => {
                self.buf.push('+');
                self.buf.push_str(&decl.name);
                for &arg in &decl.args {
                    self.buf.push(' ');
                    self.print(arg);
                }
            }
            ElKind::Dyn(items) => {
                self.buf.push('(');
                self.seq(items);
                self.buf.push(')');
            }
            ElKind::Call(call) => {
                self.buf.push('(');
                match call.spec.name() {
                    "" => self.buf.push_str(&call.spec.typ.to_string()),
                    name => self.buf.push_str(name),
                }
                for group in &call.groups {
                    for &arg in group {
                        self.buf.push(' ');
                        self.print(arg);
                    }
                }
                self.buf.push(')');
            }
        }
    }

    fn seq(&mut self, items: &[ElId]) {
        for (i, &item) in items.iter().enumerate() {
            if i > 0 {
                self.buf.push(' ');
            }
            self.print(item);
        }
    }
}
