use std::fmt;
use std::sync::Arc;

use kelp_types::{Param, Type};

use crate::{Call, ElId, Env, ExpError, Prog, Val};

// ── Specs ────────────────────────────────────────────────────────

/// An operator together with its form or func signature.
#[derive(Clone)]
pub struct Spec {
    pub typ: Type,
    pub imp: Arc<dyn Operator>,
}

impl Spec {
    pub fn new(typ: Type, imp: impl Operator + 'static) -> Self {
        Self {
            typ,
            imp: Arc::new(imp),
        }
    }

    pub fn name(&self) -> &str {
        self.typ.ref_name()
    }

    pub fn params(&self) -> &[Param] {
        self.typ.args()
    }
}

impl fmt::Debug for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Spec({})", self.typ)
    }
}

/// Behavior behind a spec.
///
/// `id` names the call element being worked on and `call` is its content,
/// with the instantiated signature in `call.typ`. Implementations return
/// the element that replaces the call, or the call itself when nothing
/// changed.
pub trait Operator: Send + Sync {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        p.resolve_groups(env, id, call)
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        hint: &Type,
    ) -> Result<Val, ExpError>;
}
