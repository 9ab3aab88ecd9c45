use std::sync::Arc;

use kelp_lexer::Span;
use kelp_types::{Ctx, Kind, Type};
use tracing::{debug, trace};

use crate::builtins::apply_spec;
use crate::layout::{layout, Role};
use crate::{lookup, Call, Decl, ElId, ElKind, Env, ExpError, Lit, Registry, Spec, Sym, Tag, Tree, Val};

// ── Program ──────────────────────────────────────────────────────

/// Resolution and evaluation state for one element tree.
pub struct Prog<'r> {
    pub tree: Tree,
    pub ctx: Ctx,
    pub reg: &'r Registry,
    /// Keep going past unresolved elements and report residuals.
    pub partial: bool,
}

/// Arguments of a call after resolving each of them once.
pub struct Resolved {
    pub groups: Vec<Vec<ElId>>,
    /// Some argument is a residual.
    pub unresolved: bool,
}

impl<'r> Prog<'r> {
    pub fn new(reg: &'r Registry) -> Self {
        Self {
            tree: Tree::new(),
            ctx: Ctx::new(),
            reg,
            partial: false,
        }
    }

    pub fn partial(reg: &'r Registry) -> Self {
        Self {
            partial: true,
            ..Self::new(reg)
        }
    }

    // ── Resolution ───────────────────────────────────────────────

    /// Resolve `id` in `env` and check its type against `hint` unless the
    /// hint is void.
    pub fn resolve(&mut self, env: &dyn Env, id: ElId, hint: &Type) -> Result<ElId, ExpError> {
        trace!(el = %self.tree.display(id), hint = %hint, "resolve");
        let res = match self.resolve_el(env, id, hint) {
            Ok(res) => res,
            Err(ExpError::Unresolved { el }) => {
                let el = if self.partial { el } else { id };
                return Err(ExpError::Unresolved { el });
            }
            Err(e) => return Err(e),
        };
        if !hint.is_void() {
            let t = self.type_of(res);
            self.ctx.unify(&t, hint).map_err(|err| ExpError::Type {
                err,
                span: self.tree.span(res),
            })?;
        }
        Ok(res)
    }

    fn resolve_el(&mut self, env: &dyn Env, id: ElId, hint: &Type) -> Result<ElId, ExpError> {
        let span = self.tree.span(id);
        match self.tree[id].kind.clone() {
            ElKind::Atom(Val::Typ(t)) => match self.resolve_refs(env, &t)? {
                None => Err(ExpError::Unresolved { el: id }),
                Some(r) if r == t => Ok(id),
                Some(r) => Ok(self.tree.alloc(ElKind::Atom(Val::Typ(r)), span)),
            },
            ElKind::Atom(_) => Ok(id),
            ElKind::Sym(sym) => {
                if sym.def.is_some() {
                    return Ok(id);
                }
                match lookup(env, &sym.name)? {
                    Some(def) if def.pending => {
                        trace!(name = %sym.name, "pending");
                        Err(ExpError::Unresolved { el: id })
                    }
                    Some(def) => {
                        trace!(name = %sym.name, typ = %def.typ, "found");
                        let sym = Sym {
                            name: sym.name,
                            def: Some(def),
                        };
                        Ok(self.tree.alloc(ElKind::Sym(sym), span))
                    }
                    None => Err(ExpError::Unresolved { el: id }),
                }
            }
            ElKind::Tag(tag) => {
                let Some(el) = tag.el else {
                    return Ok(id);
                };
                let (r, ok) = match self.resolve(env, el, &Type::VOID) {
                    Ok(r) => (r, true),
                    Err(e) => (self.residual(e)?, false),
                };
                let next = if r == el {
                    id
                } else {
                    let tag = Tag {
                        name: tag.name,
                        el: Some(r),
                    };
                    self.tree.alloc(ElKind::Tag(tag), span)
                };
                if ok {
                    Ok(next)
                } else {
                    Err(ExpError::Unresolved { el: next })
                }
            }
            ElKind::Decl(decl) => {
                let mut args = Vec::with_capacity(decl.args.len());
                let mut unresolved = false;
                for &arg in &decl.args {
                    match self.resolve(env, arg, &Type::VOID) {
                        Ok(r) => args.push(r),
                        Err(e) => {
                            args.push(self.residual(e)?);
                            unresolved = true;
                        }
                    }
                }
                let next = if args == decl.args {
                    id
                } else {
                    let decl = Decl {
                        name: decl.name,
                        args,
                    };
                    self.tree.alloc(ElKind::Decl(decl), span)
                };
                if unresolved {
                    Err(ExpError::Unresolved { el: next })
                } else {
                    Ok(next)
                }
            }
            ElKind::Dyn(items) => self.resolve_dyn(env, id, &items, hint),
            ElKind::Call(call) => {
                let (id, call) = self.instantiate(id, call);
                let imp = call.spec.imp.clone();
                imp.resolve(self, env, id, &call, hint)
            }
        }
    }

    /// The residual element of an unresolved error in partial mode; any
    /// other error is passed on.
    pub fn residual(&self, e: ExpError) -> Result<ElId, ExpError> {
        match e {
            ExpError::Unresolved { el } if self.partial => Ok(el),
            e => Err(e),
        }
    }

    /// Give a call its own copy of the spec type on first visit.
    fn instantiate(&mut self, id: ElId, call: Call) -> (ElId, Call) {
        if call.typ.is_some() {
            return (id, call);
        }
        let typ = self.ctx.instantiate_generic(&call.spec.typ);
        let call = Call {
            typ: Some(typ),
            ..call
        };
        let id = self.tree.alloc(ElKind::Call(call.clone()), self.tree.span(id));
        (id, call)
    }

    /// Pick the operator for an expression by its head.
    fn resolve_dyn(
        &mut self,
        env: &dyn Env,
        id: ElId,
        items: &[ElId],
        hint: &Type,
    ) -> Result<ElId, ExpError> {
        let span = self.tree.span(id);
        let Some((&head, rest)) = items.split_first() else {
            return Err(ExpError::Dispatch {
                typ: Type::VOID,
                span,
            });
        };
        let head = match self.resolve(env, head, &Type::VOID) {
            Ok(h) => h,
            Err(e) => {
                let h = self.residual(e)?;
                let mut items = items.to_vec();
                items[0] = h;
                let el = self.tree.alloc(ElKind::Dyn(items), span);
                return Err(ExpError::Unresolved { el });
            }
        };

        let (spec, args) = if let Some(spec) = self.spec_of(head) {
            (spec, rest.to_vec())
        } else {
            let mut args = vec![head];
            args.extend_from_slice(rest);
            (self.default_spec(head, span)?, args)
        };
        debug!(spec = spec.name(), "dispatch");
        let groups = layout(&mut self.tree, spec.params(), &args)?;
        let call = Call {
            spec,
            groups,
            typ: None,
        };
        let call = self.tree.alloc(ElKind::Call(call), span);
        self.resolve_el(env, call, hint)
    }

    /// Operator for an expression whose head is not a spec: type heads
    /// construct values, function values are applied, other heads pick by
    /// the family of their type.
    fn default_spec(&mut self, head: ElId, span: Span) -> Result<Arc<Spec>, ExpError> {
        let name = if let Some(Val::Typ(_)) = self.lit_of(head) {
            "con"
        } else {
            let t = self.type_of(head);
            let t = self.ctx.choose(&t).map_err(|err| ExpError::Type { err, span })?;
            let kind = t.kind.deopt();
            if kind.bare() == Kind::FUNC && !t.params().is_empty() {
                return Ok(apply_spec(&t));
            }
            if kind == Kind::BOOL {
                "and"
            } else if kind.is_num() {
                "add"
            } else if kind.is_char() {
                "cat"
            } else if kind.is_keyr() {
                "merge"
            } else if kind.is_idxr() {
                "append"
            } else {
                return Err(ExpError::Dispatch { typ: t, span });
            }
        };
        self.reg.spec(name).ok_or_else(|| ExpError::Dispatch {
            typ: self.type_of(head),
            span,
        })
    }

    /// Substitute schema and named references in `t` from the environment.
    /// `None` if one of them is not defined.
    fn resolve_refs(&self, env: &dyn Env, t: &Type) -> Result<Option<Type>, ExpError> {
        let bare = t.kind.bare().with_slot(0);
        if bare == Kind::SCH || bare == Kind::REF {
            let name = format!("~{}", t.ref_name());
            return Ok(match lookup(env, &name)?.and_then(|d| d.lit) {
                Some(Val::Typ(found)) if t.is_opt() => Some(found.opt()),
                Some(Val::Typ(found)) => Some(found),
                _ => None,
            });
        }
        if t.params().is_empty() {
            return Ok(Some(t.clone()));
        }
        let mut missing = false;
        let mapped = t.map_params(|p| match self.resolve_refs(env, p)? {
            Some(r) => Ok(r),
            None => {
                missing = true;
                Ok(p.clone())
            }
        })?;
        Ok((!missing).then_some(mapped))
    }

    /// Resolve every argument of `call` with the hint of its parameter.
    ///
    /// Outside partial mode the first unresolved argument ends the pass.
    pub fn resolve_args(&mut self, env: &dyn Env, call: &Call) -> Result<Resolved, ExpError> {
        let mut res = Resolved {
            groups: Vec::with_capacity(call.groups.len()),
            unresolved: false,
        };
        for i in 0..call.groups.len() {
            self.resolve_group(env, call, i, &mut res)?;
        }
        Ok(res)
    }

    /// Resolve the argument group `i` of `call` and push it onto `res`.
    pub fn resolve_group(
        &mut self,
        env: &dyn Env,
        call: &Call,
        i: usize,
        res: &mut Resolved,
    ) -> Result<(), ExpError> {
        let hint = call.typ().args().get(i).map_or(Type::VOID, arg_hint);
        let group = call.groups.get(i).map_or(&[][..], Vec::as_slice);
        let mut out = Vec::with_capacity(group.len());
        for &arg in group {
            match self.resolve(env, arg, &hint) {
                Ok(r) => out.push(r),
                Err(e) => {
                    out.push(self.residual(e)?);
                    res.unresolved = true;
                }
            }
        }
        res.groups.push(out);
        Ok(())
    }

    /// The call with resolved arguments, or a residual if some are
    /// unresolved.
    pub fn finish(&mut self, id: ElId, call: &Call, res: Resolved) -> Result<ElId, ExpError> {
        let next = if res.groups == call.groups {
            id
        } else {
            self.rebuild(id, call, res.groups)
        };
        if res.unresolved {
            Err(ExpError::Unresolved { el: next })
        } else {
            Ok(next)
        }
    }

    pub fn resolve_groups(&mut self, env: &dyn Env, id: ElId, call: &Call) -> Result<ElId, ExpError> {
        let res = self.resolve_args(env, call)?;
        self.finish(id, call, res)
    }

    /// New call element like `call` with other argument groups.
    pub fn rebuild(&mut self, id: ElId, call: &Call, groups: Vec<Vec<ElId>>) -> ElId {
        let call = Call {
            spec: call.spec.clone(),
            groups,
            typ: call.typ.clone(),
        };
        self.tree.alloc(ElKind::Call(call), self.tree.span(id))
    }

    pub fn atom(&mut self, val: Val, span: Span) -> ElId {
        self.tree.alloc(ElKind::Atom(val), span)
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Type of an element with bound variables applied.
    pub fn type_of(&self, id: ElId) -> Type {
        let t = match &self.tree[id].kind {
            ElKind::Atom(v) => v.typ(),
            ElKind::Sym(sym) => sym.def.as_ref().map_or(Type::VOID, |d| d.typ.clone()),
            ElKind::Tag(tag) => match tag.el {
                Some(el) => self.type_of(el),
                None => Type::BOOL,
            },
            ElKind::Decl(decl) => match decl.args.last() {
                Some(&last) => self.type_of(last),
                None => Type::VOID,
            },
            ElKind::Dyn(_) => Type::VOID,
            ElKind::Call(call) => call.typ().result(),
        };
        self.ctx.apply(&t)
    }

    /// The literal an element stands for, if known.
    pub fn lit_of(&self, id: ElId) -> Option<Val> {
        match &self.tree[id].kind {
            ElKind::Atom(v) => Some(v.clone()),
            ElKind::Sym(sym) => sym.def.as_ref()?.lit.clone(),
            _ => None,
        }
    }

    pub fn spec_of(&self, id: ElId) -> Option<Arc<Spec>> {
        match &self.tree[id].kind {
            ElKind::Atom(Val::Spec(spec)) => Some(spec.clone()),
            ElKind::Sym(sym) => sym.def.as_ref()?.spec.clone(),
            _ => None,
        }
    }

    // ── Evaluation ───────────────────────────────────────────────

    /// Evaluate `id` to a literal. Anything that stays unresolved is an
    /// error here.
    pub fn eval(&mut self, env: &dyn Env, id: ElId, hint: &Type) -> Result<Val, ExpError> {
        self.eval_el(env, id, hint).map_err(|e| match e {
            ExpError::Unresolved { el } => ExpError::Unevaluable {
                span: self.tree.span(el),
            },
            e => e,
        })
    }

    fn eval_el(&mut self, env: &dyn Env, id: ElId, hint: &Type) -> Result<Val, ExpError> {
        let span = self.tree.span(id);
        match self.tree[id].kind.clone() {
            ElKind::Atom(Val::Typ(t)) => match self.resolve_refs(env, &t)? {
                Some(t) => Ok(Val::Typ(t)),
                None => Err(ExpError::Unevaluable { span }),
            },
            ElKind::Atom(v) => Ok(v),
            ElKind::Sym(sym) => {
                // values found while resolving stay bound to the lexical scope
                let def = match sym.def {
                    Some(def) if def.is_known() => def,
                    _ => lookup(env, &sym.name)?.ok_or(ExpError::Unevaluable { span })?,
                };
                match (def.lit, def.spec) {
                    (Some(v), _) => Ok(v),
                    (None, Some(spec)) => Ok(Val::Spec(spec)),
                    (None, None) => Err(ExpError::Unevaluable { span }),
                }
            }
            ElKind::Tag(tag) => match tag.el {
                Some(el) => self.eval(env, el, hint),
                None => Ok(Val::Bool(true)),
            },
            ElKind::Decl(decl) => match decl.args.last() {
                Some(&last) => self.eval(env, last, hint),
                None => Ok(Val::Null),
            },
            ElKind::Dyn(_) => {
                let r = self.resolve(env, id, hint)?;
                self.eval(env, r, hint)
            }
            ElKind::Call(call) => {
                let (id, call) = self.instantiate(id, call);
                let imp = call.spec.imp.clone();
                imp.eval(self, env, id, &call, hint)
            }
        }
    }

    /// Evaluate every argument of `call`, group by group.
    pub fn eval_args(&mut self, env: &dyn Env, call: &Call) -> Result<Vec<Vec<Val>>, ExpError> {
        call.groups
            .iter()
            .map(|group| group.iter().map(|&a| self.eval(env, a, &Type::VOID)).collect())
            .collect()
    }

    /// Resolve, check the result type is fully known, then evaluate.
    pub fn run(&mut self, env: &dyn Env, id: ElId, hint: &Type) -> Result<Val, ExpError> {
        let r = self.resolve(env, id, hint)?;
        let t = self.type_of(r);
        let t = self.ctx.realize(&t).map_err(|err| ExpError::Type {
            err,
            span: self.tree.span(r),
        })?;
        debug!(el = %self.tree.display(r), typ = %t, "resolved");
        self.eval(env, r, hint)
    }
}

/// Hint for each element of a parameter's group: the element type for
/// parameters that take several elements, the parameter type otherwise.
pub(crate) fn arg_hint(param: &kelp_types::Param) -> Type {
    match Role::of(param) {
        Role::Explicit => param.typ.clone(),
        Role::Decls | Role::Unis => Type::VOID,
        _ => param.typ.elem().cloned().unwrap_or(Type::VOID),
    }
}
