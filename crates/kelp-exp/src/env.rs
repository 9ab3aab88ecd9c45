use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kelp_types::Type;
use smol_str::SmolStr;
use tracing::trace;

use crate::{ExpError, Lit, Spec, Val};

// ── Definitions ──────────────────────────────────────────────────

/// What a name resolves to.
#[derive(Debug, Clone)]
pub struct Def {
    pub typ: Type,
    pub lit: Option<Val>,
    pub spec: Option<Arc<Spec>>,
    /// Declared, but its definition is itself unresolved. Lookups of the
    /// name stay unresolved until a later pass defines it.
    pub pending: bool,
}

impl Def {
    /// A typed name with no value known yet.
    pub fn typed(typ: Type) -> Self {
        Self {
            typ,
            lit: None,
            spec: None,
            pending: false,
        }
    }

    pub fn pending() -> Self {
        Self {
            pending: true,
            ..Self::typed(Type::ANY)
        }
    }

    pub fn lit(val: Val) -> Self {
        let spec = match &val {
            Val::Spec(spec) => Some(spec.clone()),
            _ => None,
        };
        let typ = val.typ();
        Self {
            lit: Some(val),
            spec,
            ..Self::typed(typ)
        }
    }

    pub fn spec(spec: Arc<Spec>) -> Self {
        let typ = spec.typ.clone();
        Self {
            spec: Some(spec),
            ..Self::typed(typ)
        }
    }

    /// The value is known, as a literal or a spec.
    pub fn is_known(&self) -> bool {
        self.lit.is_some() || self.spec.is_some()
    }
}

// ── Capabilities ─────────────────────────────────────────────────

/// Name forms that only particular scopes answer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `$name` or `$1`
    Param,
    /// `.key.sub`
    RelPath,
    /// `/key.sub`
    AbsPath,
    /// `~name`
    Schema,
}

impl Capability {
    pub fn of(name: &str) -> Option<Capability> {
        match name.as_bytes().first()? {
            b'$' => Some(Capability::Param),
            b'.' => Some(Capability::RelPath),
            b'/' => Some(Capability::AbsPath),
            b'~' => Some(Capability::Schema),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Param => "parameter",
            Capability::RelPath => "relative path",
            Capability::AbsPath => "absolute path",
            Capability::Schema => "schema",
        })
    }
}

// ── Environments ─────────────────────────────────────────────────

/// A scope in the lookup chain.
pub trait Env {
    fn parent(&self) -> Option<&dyn Env>;

    /// Definition of `name` in this scope alone.
    fn get(&self, name: &str) -> Option<Def>;

    fn supports(&self, _cap: Capability) -> bool {
        false
    }
}

/// Look `name` up through the chain starting at `env`.
///
/// Marked names are answered by the nearest scope supporting their
/// capability, found or not. Plain names walk outward until found.
pub fn lookup(env: &dyn Env, name: &str) -> Result<Option<Def>, ExpError> {
    let mut cur = Some(env);
    match Capability::of(name) {
        Some(cap) => {
            while let Some(e) = cur {
                if e.supports(cap) {
                    return Ok(e.get(name));
                }
                cur = e.parent();
            }
            Err(ExpError::Unsupported {
                name: name.into(),
                cap,
            })
        }
        None => {
            while let Some(e) = cur {
                if let Some(def) = e.get(name) {
                    return Ok(Some(def));
                }
                cur = e.parent();
            }
            Ok(None)
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────

/// Root scope: named specs and schema types.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    specs: HashMap<SmolStr, Arc<Spec>>,
    schemas: HashMap<SmolStr, Type>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_spec(&mut self, spec: Spec) {
        let name = SmolStr::new(spec.name());
        trace!(name = %name, typ = %spec.typ, "register spec");
        self.specs.insert(name, Arc::new(spec));
    }

    pub fn add_schema(&mut self, name: impl Into<SmolStr>, typ: Type) {
        self.schemas.insert(name.into(), typ);
    }

    pub fn spec(&self, name: &str) -> Option<Arc<Spec>> {
        self.specs.get(name).cloned()
    }

    pub fn schema(&self, name: &str) -> Option<&Type> {
        self.schemas.get(name)
    }
}

impl Env for Registry {
    fn parent(&self) -> Option<&dyn Env> {
        None
    }

    fn get(&self, name: &str) -> Option<Def> {
        match name.strip_prefix('~') {
            Some(schema) => self.schema(schema).map(|t| Def::lit(Val::Typ(t.clone()))),
            None => self.spec(name).map(Def::spec),
        }
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::Schema
    }
}

// ── Scope ────────────────────────────────────────────────────────

/// Local definitions, as introduced by `let`.
pub struct Scope<'p> {
    parent: &'p dyn Env,
    defs: Vec<(SmolStr, Def)>,
}

impl<'p> Scope<'p> {
    pub fn new(parent: &'p dyn Env) -> Self {
        Self {
            parent,
            defs: Vec::new(),
        }
    }

    pub fn define(&mut self, name: impl Into<SmolStr>, def: Def) -> Result<(), ExpError> {
        let name = name.into();
        if self.defs.iter().any(|(n, _)| *n == name) {
            return Err(ExpError::Redefined { name });
        }
        self.defs.push((name, def));
        Ok(())
    }
}

impl Env for Scope<'_> {
    fn parent(&self) -> Option<&dyn Env> {
        Some(self.parent)
    }

    fn get(&self, name: &str) -> Option<Def> {
        self.defs.iter().find(|(n, _)| n == name).map(|(_, d)| d.clone())
    }
}

/// Function parameters, by name or by 1-based position.
pub struct ParamScope<'p> {
    parent: &'p dyn Env,
    params: Vec<(SmolStr, Def)>,
}

impl<'p> ParamScope<'p> {
    pub fn new(parent: &'p dyn Env, params: Vec<(SmolStr, Def)>) -> Self {
        Self { parent, params }
    }
}

impl Env for ParamScope<'_> {
    fn parent(&self) -> Option<&dyn Env> {
        Some(self.parent)
    }

    fn get(&self, name: &str) -> Option<Def> {
        let key = name.strip_prefix('$').unwrap_or(name);
        let found = match key.parse::<usize>() {
            Ok(pos) => self.params.get(pos.checked_sub(1)?),
            Err(_) => self.params.iter().find(|(n, _)| n == key),
        };
        found.map(|(_, d)| d.clone())
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::Param
    }
}

/// A data value addressed by paths. Only the root data scope answers
/// absolute paths.
pub struct DataScope<'p> {
    parent: &'p dyn Env,
    data: Val,
    root: bool,
}

impl<'p> DataScope<'p> {
    pub fn root(parent: &'p dyn Env, data: Val) -> Self {
        Self {
            parent,
            data,
            root: true,
        }
    }

    pub fn new(parent: &'p dyn Env, data: Val) -> Self {
        Self {
            parent,
            data,
            root: false,
        }
    }
}

impl Env for DataScope<'_> {
    fn parent(&self) -> Option<&dyn Env> {
        Some(self.parent)
    }

    fn get(&self, name: &str) -> Option<Def> {
        let path = match Capability::of(name)? {
            Capability::RelPath => &name[1..],
            Capability::AbsPath if self.root => &name[1..],
            _ => return None,
        };
        let keys = path.split('.').filter(|k| !k.is_empty());
        self.data.path(keys).cloned().map(Def::lit)
    }

    fn supports(&self, cap: Capability) -> bool {
        match cap {
            Capability::RelPath => true,
            Capability::AbsPath => self.root,
            _ => false,
        }
    }
}
