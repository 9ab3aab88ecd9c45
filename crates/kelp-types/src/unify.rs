use tracing::trace;

use crate::cmp::compare;
use crate::{Ctx, Kind, Param, Type, TypeError};

// ── Unification ──────────────────────────────────────────────────

impl Ctx {
    /// Most specific common type of `a` and `b`, binding variables on the
    /// way.
    ///
    /// Bound variables passed in are rebound to an alternative of their
    /// previous binding and the result, so later choices see both.
    pub fn unify(&mut self, a: &Type, b: &Type) -> Result<Type, TypeError> {
        let (va, a) = self.deref(a);
        let (vb, b) = self.deref(b);
        if a == b {
            return Ok(a);
        }
        if a.var_id().is_some() {
            return self.bind_var(&a, &b);
        }
        if b.var_id().is_some() {
            return self.bind_var(&b, &a);
        }

        let ca = self.choose(&a)?;
        let cb = self.choose(&b)?;
        let res = self.unify_plain(&ca, &cb)?;
        trace!(a = %a, b = %b, res = %res, "unify");

        if let Some(v) = va {
            self.remember(&v, &a, &res)?;
        }
        if let Some(v) = vb {
            self.remember(&v, &b, &res)?;
        }
        Ok(res)
    }

    /// Split a bound variable from its applied binding. Unbound variables
    /// and other types come back applied and without a variable.
    fn deref(&self, t: &Type) -> (Option<Type>, Type) {
        match t.var_id() {
            Some(id) if self.get(id).is_some() => (Some(t.clone()), self.apply(t)),
            _ => (None, self.apply(t)),
        }
    }

    fn remember(&mut self, var: &Type, prev: &Type, res: &Type) -> Result<(), TypeError> {
        if prev == res {
            return Ok(());
        }
        self.bind(var, Type::alt([prev.clone(), res.clone()]))
    }

    /// Bind the unbound variable `var` to `t` after checking constraints.
    fn bind_var(&mut self, var: &Type, t: &Type) -> Result<Type, TypeError> {
        if let Some(other) = t.var_id() {
            if var.var_id() == Some(other) {
                return Ok(t.clone());
            }
            let mut cons: Vec<Type> = t.alts().cloned().collect();
            for c in var.alts() {
                if !cons.contains(c) {
                    cons.push(c.clone());
                }
            }
            let merged = Type::var(t.kind.slot(), cons).opt_if(t.is_opt());
            self.bind(var, merged.clone())?;
            return Ok(merged);
        }

        let cons: Vec<Type> = var.alts().cloned().collect();
        if !cons.is_empty() {
            let cand = self.choose(t)?;
            if !cons.iter().any(|c| compare(&cand, c).is_compatible()) {
                return Err(TypeError::Constraint {
                    var: var.clone(),
                    typ: t.clone(),
                });
            }
        }
        let bound = if var.is_opt() { t.deopt() } else { t.clone() };
        self.bind(var, bound)?;
        Ok(t.clone())
    }

    /// Resolve alternatives to a single type, recursing into parameters.
    ///
    /// Candidates are folded with [`Ctx::unify`]. If any pair has no common
    /// type the result is `any`, which makes the outcome independent of the
    /// candidate order.
    pub fn choose(&mut self, t: &Type) -> Result<Type, TypeError> {
        let t = self.apply(t);
        if !t.kind.is_alt() {
            if t.var_id().is_some() {
                return Ok(t);
            }
            return t.map_params(|p| self.choose(p));
        }
        let cands: Vec<Type> = t.alts().cloned().collect();
        let opt = t.is_opt() || cands.iter().any(Type::is_opt);
        let mut acc: Option<Type> = None;
        for cand in cands {
            let cand = self.choose(&cand)?;
            acc = Some(match acc {
                None => cand,
                Some(prev) => match self.unify(&prev, &cand) {
                    Ok(joined) => joined,
                    Err(TypeError::NoCommonType(..)) | Err(TypeError::Constraint { .. }) => {
                        return Ok(Type::ANY.opt_if(opt));
                    }
                    Err(e) => return Err(e),
                },
            });
        }
        Ok(acc.map_or(Type::VOID, |t| t.opt_if(opt)))
    }

    /// Unify two types that are neither variables nor alternatives.
    fn unify_plain(&mut self, a: &Type, b: &Type) -> Result<Type, TypeError> {
        if a == b {
            return Ok(a.clone());
        }
        let opt = a.is_opt() || b.is_opt();
        let (a, b) = (a.deopt(), b.deopt());
        if a == b {
            return Ok(a.opt_if(opt));
        }
        if a.is_any() {
            return Ok(b.opt_if(opt));
        }
        if b.is_any() {
            return Ok(a.opt_if(opt));
        }
        for t in [&a, &b] {
            if matches!(t.kind.bare().with_slot(0), Kind::REF | Kind::SCH) {
                return Err(TypeError::Unresolved(t.clone()));
            }
        }
        if a.kind.is_ctx() || b.kind.is_ctx() {
            return Err(TypeError::NoCommonType(a, b));
        }
        let res = if a.kind.is_cont() && b.kind.is_cont() {
            self.unify_cont(&a, &b)?
        } else {
            join(&a, &b)?
        };
        Ok(res.opt_if(opt))
    }

    fn unify_cont(&mut self, a: &Type, b: &Type) -> Result<Type, TypeError> {
        let common = a.kind.family() & b.kind.family();
        if common == 0 {
            return Err(TypeError::NoCommonType(a.clone(), b.clone()));
        }
        let kind = Kind(common);
        if kind.is_obj() {
            return self.unify_obj(a, b);
        }
        let ea = self.elem_of(a)?;
        let eb = self.elem_of(b)?;
        let elem = match (ea, eb) {
            (Some(ea), Some(eb)) => Some(self.unify(&ea, &eb)?),
            (Some(e), None) | (None, Some(e)) => Some(e),
            (None, None) => None,
        };
        match elem {
            Some(elem) => Type::cont(kind, elem),
            None => Ok(Type::plain(kind)),
        }
    }

    /// Element type of a container; objects contribute the common type of
    /// their fields.
    fn elem_of(&mut self, t: &Type) -> Result<Option<Type>, TypeError> {
        if !t.kind.is_obj() {
            return Ok(t.elem().cloned());
        }
        if t.params().is_empty() {
            return Ok(None);
        }
        let fields = Type::alt(t.params().iter().map(|p| p.typ.clone()));
        self.choose(&fields).map(Some)
    }

    /// Objects unify over their common fields.
    fn unify_obj(&mut self, a: &Type, b: &Type) -> Result<Type, TypeError> {
        if a.info.is_none() || b.info.is_none() {
            return Ok(Type::OBJ);
        }
        let mut fields = Vec::new();
        for fa in a.params() {
            if let Some(fb) = b.field(&fa.key()) {
                let typ = self.unify(&fa.typ, &fb.typ)?;
                let name = if fa.is_opt() { &fb.name } else { &fa.name };
                fields.push(Param::new(name.clone(), typ));
            }
        }
        let name = if a.ref_name() == b.ref_name() {
            a.ref_name()
        } else {
            ""
        };
        Ok(Type::obj(name, fields))
    }
}

/// Common kind of two primitive or spec types by family-bit intersection.
fn join(a: &Type, b: &Type) -> Result<Type, TypeError> {
    let no_common = || TypeError::NoCommonType(a.clone(), b.clone());
    let (fa, fb) = (a.kind.family(), b.kind.family());
    if fa == fb {
        // same kind with different detail
        if a.kind.is_spec() {
            return Err(no_common());
        }
        return Ok(Type::plain(a.kind.bare()));
    }
    let common = Kind(fa & fb);
    if common.is_void() || !common.is_known() || common.is_any() {
        return Err(no_common());
    }
    if common.family() == fa && a.info.is_none() {
        return Ok(a.clone());
    }
    if common.family() == fb && b.info.is_none() {
        return Ok(b.clone());
    }
    Ok(Type::plain(common))
}
