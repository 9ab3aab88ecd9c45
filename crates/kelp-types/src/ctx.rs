use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::{Type, TypeError};

// ── Type context ─────────────────────────────────────────────────

/// Substitution of type variables plus the id counter for fresh ones.
///
/// Variable ids start at 1. Index `id - 1` of the substitution holds the
/// binding of variable `id`.
#[derive(Debug, Clone, Default)]
pub struct Ctx {
    subst: Vec<Option<Type>>,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Fresh type variables ─────────────────────────────────────

    pub fn new_var(&mut self) -> Type {
        self.new_var_with(Vec::new())
    }

    /// Fresh variable restricted to types compatible with one of
    /// `constraints`.
    pub fn new_var_with(&mut self, constraints: Vec<Type>) -> Type {
        self.subst.push(None);
        Type::var(self.subst.len() as u32, constraints)
    }

    // ── Substitution ─────────────────────────────────────────────

    /// Current binding of the variable `id`.
    pub fn get(&self, id: u32) -> Option<&Type> {
        let idx = (id as usize).checked_sub(1)?;
        self.subst.get(idx)?.as_ref()
    }

    pub fn is_bound(&self, t: &Type) -> bool {
        t.var_id().is_some_and(|id| self.get(id).is_some())
    }

    /// Bind `var` to `typ`, rejecting recursive bindings.
    pub fn bind(&mut self, var: &Type, typ: Type) -> Result<(), TypeError> {
        let Some((id, idx)) = var.var_id().and_then(|id| Some((id, (id as usize).checked_sub(1)?)))
        else {
            return Err(TypeError::NotAVar(var.clone()));
        };
        if self.occurs_in(id, &typ) {
            return Err(TypeError::Recursive {
                var: var.clone(),
                typ,
            });
        }
        trace!(var = %var, typ = %typ, "bind");
        if self.subst.len() <= idx {
            self.subst.resize(idx + 1, None);
        }
        self.subst[idx] = Some(typ);
        Ok(())
    }

    /// Substitute bound variables throughout `t`.
    pub fn apply(&self, t: &Type) -> Type {
        if let Some(id) = t.var_id() {
            return match self.get(id) {
                Some(bound) => self.apply(bound).opt_if(t.is_opt()),
                None => t.clone(),
            };
        }
        t.map_types(|p| self.apply(p))
    }

    pub(crate) fn occurs_in(&self, var: u32, t: &Type) -> bool {
        if let Some(id) = t.var_id() {
            if id == var {
                return true;
            }
            if let Some(bound) = self.get(id) {
                return self.occurs_in(var, bound);
            }
        }
        t.params().iter().any(|p| self.occurs_in(var, &p.typ))
    }

    // ── Instantiation ────────────────────────────────────────────

    /// Copy of `t` with every free variable replaced by a fresh one.
    ///
    /// Occurrences of the same variable map to the same fresh variable,
    /// which keeps the constraints of the original.
    pub fn instantiate(&mut self, t: &Type) -> Type {
        let t = self.apply(t);
        let mut free = BTreeSet::new();
        self.free(&t, &mut free);
        if free.is_empty() {
            return t;
        }
        let mut mapping = HashMap::new();
        for id in free {
            mapping.insert(id, self.new_var());
        }
        self.subst_vars(&t, &mapping)
    }

    /// Copy of the generic type `t` with each of its variables replaced by
    /// a fresh one. Current bindings are ignored, so the ids in `t` are
    /// local to it.
    pub fn instantiate_generic(&mut self, t: &Type) -> Type {
        let mut ids = BTreeSet::new();
        collect_vars(t, &mut ids);
        if ids.is_empty() {
            return t.clone();
        }
        let mapping = ids.into_iter().map(|id| (id, self.new_var())).collect();
        self.subst_vars(t, &mapping)
    }

    fn subst_vars(&self, t: &Type, mapping: &HashMap<u32, Type>) -> Type {
        let mapped = t.map_types(|p| self.subst_vars(p, mapping));
        match t.var_id().and_then(|id| mapping.get(&id)) {
            Some(fresh) => {
                let id = fresh.kind.slot();
                let cons = mapped.alts().cloned().collect();
                Type::var(id, cons).opt_if(t.is_opt())
            }
            None => mapped,
        }
    }

    // ── Variable sets ────────────────────────────────────────────

    /// Collect ids of unbound variables occurring in `t`.
    pub fn free(&self, t: &Type, acc: &mut BTreeSet<u32>) {
        if let Some(id) = t.var_id() {
            match self.get(id) {
                Some(bound) => return self.free(bound, acc),
                None => {
                    acc.insert(id);
                }
            }
        }
        for p in t.params() {
            self.free(&p.typ, acc);
        }
    }

    /// Collect ids of bound variables occurring in `t`.
    pub fn bound(&self, t: &Type, acc: &mut BTreeSet<u32>) {
        if let Some(id) = t.var_id() {
            if let Some(bound) = self.get(id) {
                acc.insert(id);
                return self.bound(bound, acc);
            }
        }
        for p in t.params() {
            self.bound(&p.typ, acc);
        }
    }

    /// Fully resolved form of `t`: variables substituted and alternatives
    /// chosen. Fails if free variables remain.
    pub fn realize(&mut self, t: &Type) -> Result<Type, TypeError> {
        let t = self.apply(t);
        let t = self.choose(&t)?;
        let t = self.apply(&t);
        let mut free = BTreeSet::new();
        self.free(&t, &mut free);
        if !free.is_empty() {
            return Err(TypeError::Ambiguous(t));
        }
        Ok(t)
    }
}

fn collect_vars(t: &Type, acc: &mut BTreeSet<u32>) {
    if let Some(id) = t.var_id() {
        acc.insert(id);
    }
    for p in t.params() {
        collect_vars(&p.typ, acc);
    }
}
