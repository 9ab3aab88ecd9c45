use kelp_types::Param;
use smol_str::SmolStr;

use crate::{Decl, ElId, ElKind, ExpError, Tree};

// ── Argument layout ──────────────────────────────────────────────

/// How a parameter consumes arguments, decided by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// `plain`, `rest`: ordinary elements.
    Plain,
    /// `tags`: tag elements.
    Tags,
    /// `args`, `tail`: ordinary elements, then tags.
    Args,
    /// `decls`: declarations.
    Decls,
    /// `unis`: single-argument declarations.
    Unis,
    /// Any other name: exactly one ordinary element.
    Explicit,
}

impl Role {
    pub(crate) fn of(param: &Param) -> Role {
        match param.key().as_str() {
            "plain" | "rest" => Role::Plain,
            "tags" => Role::Tags,
            "args" | "tail" => Role::Args,
            "decls" => Role::Decls,
            "unis" => Role::Unis,
            _ => Role::Explicit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Plain,
    Tag,
    Decl,
    Naked,
}

fn class(tree: &Tree, id: ElId) -> Class {
    match &tree[id].kind {
        ElKind::Tag(_) => Class::Tag,
        ElKind::Decl(d) if d.is_naked() => Class::Naked,
        ElKind::Decl(_) => Class::Decl,
        _ => Class::Plain,
    }
}

/// Group `args` by the parameters of a spec.
///
/// Returns one group per parameter. The naked marker ends a run of
/// declarations and is dropped. Declarations without an argument in a
/// `unis` run take the argument of the next declaration; the copies are
/// new elements.
pub fn layout(
    tree: &mut Tree,
    params: &[Param],
    args: &[ElId],
) -> Result<Vec<Vec<ElId>>, ExpError> {
    let mut groups = Vec::with_capacity(params.len());
    let mut i = 0;

    for param in params {
        let role = Role::of(param);
        let mut group = Vec::new();
        match role {
            Role::Plain => take_run(tree, args, &mut i, &mut group, Class::Plain),
            Role::Tags => take_run(tree, args, &mut i, &mut group, Class::Tag),
            Role::Args => {
                take_run(tree, args, &mut i, &mut group, Class::Plain);
                take_run(tree, args, &mut i, &mut group, Class::Tag);
            }
            Role::Decls | Role::Unis => {
                take_run(tree, args, &mut i, &mut group, Class::Decl);
                if i < args.len() && class(tree, args[i]) == Class::Naked {
                    i += 1;
                }
                if role == Role::Unis {
                    group = carry_forward(tree, group)?;
                }
            }
            Role::Explicit => match args.get(i).map(|&a| class(tree, a)) {
                Some(Class::Plain) => {
                    group.push(args[i]);
                    i += 1;
                }
                Some(_) | None if param.is_opt() => {}
                Some(_) => return Err(unexpected_tag(tree, args[i])),
                None => {}
            },
        }
        if group.is_empty() && !param.is_opt() {
            return Err(ExpError::MissingArg { param: param.key() });
        }
        groups.push(group);
    }

    match args.get(i) {
        None => Ok(groups),
        Some(&extra) if class(tree, extra) == Class::Plain => Err(ExpError::UnexpectedTail {
            span: tree.span(extra),
        }),
        Some(&extra) => Err(unexpected_tag(tree, extra)),
    }
}

/// Move the run of `want` elements starting at `i` into `group`.
fn take_run(tree: &Tree, args: &[ElId], i: &mut usize, group: &mut Vec<ElId>, want: Class) {
    while *i < args.len() && class(tree, args[*i]) == want {
        group.push(args[*i]);
        *i += 1;
    }
}

fn unexpected_tag(tree: &Tree, id: ElId) -> ExpError {
    let name = match &tree[id].kind {
        ElKind::Tag(t) => SmolStr::new(format!(":{}", t.name)),
        ElKind::Decl(d) => SmolStr::new(format!("+{}", d.name)),
        _ => SmolStr::default(),
    };
    ExpError::UnexpectedTag {
        name,
        span: tree.span(id),
    }
}

fn carry_forward(tree: &mut Tree, decls: Vec<ElId>) -> Result<Vec<ElId>, ExpError> {
    let mut out = Vec::with_capacity(decls.len());
    let mut pending: Vec<(SmolStr, ElId)> = Vec::new();
    for id in decls {
        let span = tree.span(id);
        let ElKind::Decl(decl) = &tree[id].kind else {
            continue;
        };
        match decl.args.len() {
            0 => pending.push((decl.name.clone(), id)),
            1 => {
                let args = decl.args.clone();
                for (name, naked) in pending.drain(..) {
                    let span = tree.span(naked);
                    let copy = Decl {
                        name,
                        args: args.clone(),
                    };
                    out.push(tree.alloc(ElKind::Decl(copy), span));
                }
                out.push(id);
            }
            _ => {
                return Err(ExpError::UniArity {
                    name: decl.name.clone(),
                    span,
                })
            }
        }
    }
    match pending.first() {
        Some((name, id)) => Err(ExpError::UniArity {
            name: name.clone(),
            span: tree.span(*id),
        }),
        None => Ok(out),
    }
}
