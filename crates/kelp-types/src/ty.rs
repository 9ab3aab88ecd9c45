use std::convert::Infallible;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::kind::{Kind, MAX_DEPTH};
use crate::TypeError;

// ── Type ─────────────────────────────────────────────────────────

/// A type value: a kind plus optional shared detail.
///
/// Types are immutable and cheap to clone. Detail is shared behind an `Arc`
/// and never changed after construction; deriving a type allocates new
/// detail.
#[derive(Clone, Debug)]
pub struct Type {
    pub kind: Kind,
    pub info: Option<Arc<Info>>,
}

/// Detail of reference, composite, variable and alternative types.
#[derive(Clone, Debug, Default)]
pub struct Info {
    /// Reference name for refs and schemas, declared name for objects,
    /// specs, bits and enums.
    pub name: SmolStr,
    /// Fields, spec parameters, container element, variable constraints or
    /// alternative candidates.
    pub params: Vec<Param>,
    /// Named constants of bits and enum types.
    pub consts: Vec<Const>,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: SmolStr,
    pub typ: Type,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Const {
    pub name: SmolStr,
    pub val: i64,
}

impl Param {
    pub fn new(name: impl Into<SmolStr>, typ: Type) -> Self {
        Param {
            name: name.into(),
            typ,
        }
    }

    /// Unnamed parameter.
    pub fn pos(typ: Type) -> Self {
        Param {
            name: SmolStr::default(),
            typ,
        }
    }

    /// Lowercased name without the optional marker.
    pub fn key(&self) -> SmolStr {
        let name = self.name.strip_suffix('?').unwrap_or(&self.name);
        SmolStr::new(name.to_lowercase())
    }

    pub fn is_opt(&self) -> bool {
        self.name.ends_with('?')
    }
}

impl Const {
    pub fn new(name: impl Into<SmolStr>, val: i64) -> Self {
        Const {
            name: name.into(),
            val,
        }
    }
}

impl Type {
    pub const VOID: Type = Type::plain(Kind::VOID);
    pub const ANY: Type = Type::plain(Kind::ANY);
    pub const TYP: Type = Type::plain(Kind::TYP);
    pub const BOOL: Type = Type::plain(Kind::BOOL);
    pub const NUM: Type = Type::plain(Kind::NUM);
    pub const INT: Type = Type::plain(Kind::INT);
    pub const REAL: Type = Type::plain(Kind::REAL);
    pub const BITS: Type = Type::plain(Kind::BITS);
    pub const SPAN: Type = Type::plain(Kind::SPAN);
    pub const CHAR: Type = Type::plain(Kind::CHAR);
    pub const STR: Type = Type::plain(Kind::STR);
    pub const RAW: Type = Type::plain(Kind::RAW);
    pub const UUID: Type = Type::plain(Kind::UUID);
    pub const TIME: Type = Type::plain(Kind::TIME);
    pub const ENUM: Type = Type::plain(Kind::ENUM);
    pub const IDXR: Type = Type::plain(Kind::IDXR);
    pub const KEYR: Type = Type::plain(Kind::KEYR);
    pub const LIST: Type = Type::plain(Kind::LIST);
    pub const DICT: Type = Type::plain(Kind::DICT);
    pub const OBJ: Type = Type::plain(Kind::OBJ);
    pub const FORM: Type = Type::plain(Kind::FORM);
    pub const FUNC: Type = Type::plain(Kind::FUNC);

    pub const fn plain(kind: Kind) -> Type {
        Type { kind, info: None }
    }

    fn with_info(kind: Kind, info: Info) -> Type {
        Type {
            kind,
            info: Some(Arc::new(info)),
        }
    }

    fn with_params(kind: Kind, name: SmolStr, params: Vec<Param>) -> Type {
        Type::with_info(
            kind,
            Info {
                name,
                params,
                consts: Vec::new(),
            },
        )
    }

    // ── Constructors ─────────────────────────────────────────────

    pub fn list(elem: Type) -> Type {
        Type::cont_unchecked(Kind::LIST, elem)
    }

    pub fn dict(elem: Type) -> Type {
        Type::cont_unchecked(Kind::DICT, elem)
    }

    pub fn idxr(elem: Type) -> Type {
        Type::cont_unchecked(Kind::IDXR, elem)
    }

    pub fn keyr(elem: Type) -> Type {
        Type::cont_unchecked(Kind::KEYR, elem)
    }

    /// Container of `kind` with element `elem`, checking the nesting limit.
    pub fn cont(kind: Kind, elem: Type) -> Result<Type, TypeError> {
        let t = Type::cont_unchecked(kind, elem);
        if t.kind.depth() > MAX_DEPTH {
            return Err(TypeError::invalid(
                &t.to_string(),
                "container nesting too deep",
            ));
        }
        Ok(t)
    }

    fn cont_unchecked(kind: Kind, elem: Type) -> Type {
        let depth = elem.kind.depth().saturating_add(1);
        let kind = kind.with_slot(depth);
        Type::with_params(kind, SmolStr::default(), vec![Param::pos(elem)])
    }

    pub fn obj(name: impl Into<SmolStr>, fields: Vec<Param>) -> Type {
        Type::with_params(Kind::OBJ, name.into(), fields)
    }

    /// Form spec: parameters followed by the unnamed result.
    pub fn form(name: impl Into<SmolStr>, params: Vec<Param>) -> Type {
        Type::with_params(Kind::FORM, name.into(), params)
    }

    pub fn func(name: impl Into<SmolStr>, params: Vec<Param>) -> Type {
        Type::with_params(Kind::FUNC, name.into(), params)
    }

    pub fn bits(name: impl Into<SmolStr>, consts: Vec<Const>) -> Type {
        Type::with_info(
            Kind::BITS,
            Info {
                name: name.into(),
                params: Vec::new(),
                consts,
            },
        )
    }

    pub fn enumeration(name: impl Into<SmolStr>, consts: Vec<Const>) -> Type {
        Type::with_info(
            Kind::ENUM,
            Info {
                name: name.into(),
                params: Vec::new(),
                consts,
            },
        )
    }

    /// Flat, deduplicated alternative. A single candidate stands for itself.
    pub fn alt(cands: impl IntoIterator<Item = Type>) -> Type {
        let mut flat: Vec<Type> = Vec::new();
        for c in cands {
            if c.kind.is_alt() {
                for p in c.params() {
                    if !flat.contains(&p.typ) {
                        flat.push(p.typ.clone());
                    }
                }
            } else if !flat.contains(&c) {
                flat.push(c);
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        let params = flat.into_iter().map(Param::pos).collect();
        Type::with_params(Kind::ALT, SmolStr::default(), params)
    }

    /// Type variable with id and optional constraint types.
    pub fn var(id: u32, constraints: Vec<Type>) -> Type {
        let kind = Kind::VAR.with_slot(id);
        if constraints.is_empty() {
            return Type::plain(kind);
        }
        let params = constraints.into_iter().map(Param::pos).collect();
        Type::with_params(kind, SmolStr::default(), params)
    }

    pub fn reference(name: impl Into<SmolStr>) -> Type {
        Type::with_params(Kind::REF, name.into(), Vec::new())
    }

    pub fn schema(name: impl Into<SmolStr>) -> Type {
        Type::with_params(Kind::SCH, name.into(), Vec::new())
    }

    /// Self reference to the enclosing composite type `dist` levels up.
    pub fn self_ref(dist: u32) -> Type {
        Type::plain(Kind::SELF.with_slot(dist))
    }

    // ── Flags ────────────────────────────────────────────────────

    pub fn opt(&self) -> Type {
        Type {
            kind: self.kind.opt(),
            info: self.info.clone(),
        }
    }

    pub fn deopt(&self) -> Type {
        Type {
            kind: self.kind.deopt(),
            info: self.info.clone(),
        }
    }

    /// Adds the optional flag when `opt` is set.
    pub(crate) fn opt_if(self, opt: bool) -> Type {
        if opt {
            self.opt()
        } else {
            self
        }
    }

    pub fn is_opt(&self) -> bool {
        self.kind.is_opt()
    }

    pub fn is_void(&self) -> bool {
        self.kind.is_void()
    }

    pub fn is_any(&self) -> bool {
        self.kind.is_any()
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn params(&self) -> &[Param] {
        self.info.as_ref().map_or(&[], |i| &i.params)
    }

    pub fn consts(&self) -> &[Const] {
        self.info.as_ref().map_or(&[], |i| &i.consts)
    }

    /// Reference name or declared name; empty when absent.
    pub fn ref_name(&self) -> &str {
        self.info.as_ref().map_or("", |i| i.name.as_str())
    }

    /// Element type of `|` containers.
    pub fn elem(&self) -> Option<&Type> {
        if self.kind.is_elem_cont() {
            self.params().first().map(|p| &p.typ)
        } else {
            None
        }
    }

    pub fn var_id(&self) -> Option<u32> {
        self.kind.is_var().then(|| self.kind.slot())
    }

    /// Constraint types of a variable, candidates of an alternative.
    pub fn alts(&self) -> impl Iterator<Item = &Type> {
        let members = self.kind.is_var() || self.kind.is_alt();
        self.params()
            .iter()
            .filter(move |_| members)
            .map(|p| &p.typ)
    }

    /// Field lookup by key on object types.
    pub fn field(&self, key: &str) -> Option<&Param> {
        let key = key.strip_suffix('?').unwrap_or(key).to_lowercase();
        self.params().iter().find(|p| p.key().as_str() == key)
    }

    /// Result type of a spec: the last parameter.
    pub fn result(&self) -> Type {
        self.params()
            .last()
            .map_or(Type::VOID, |p| p.typ.clone())
    }

    /// Argument parameters of a spec: everything but the result.
    pub fn args(&self) -> &[Param] {
        let ps = self.params();
        &ps[..ps.len().saturating_sub(1)]
    }

    /// Rebuild with every parameter type mapped through `f`.
    pub fn map_types(&self, mut f: impl FnMut(&Type) -> Type) -> Type {
        match self.map_params(|t| Ok::<_, Infallible>(f(t))) {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }

    /// Fallible [`Type::map_types`].
    pub fn map_params<E>(
        &self,
        mut f: impl FnMut(&Type) -> Result<Type, E>,
    ) -> Result<Type, E> {
        let Some(info) = &self.info else {
            return Ok(self.clone());
        };
        if info.params.is_empty() {
            return Ok(self.clone());
        }
        let params = info
            .params
            .iter()
            .map(|p| Ok(Param::new(p.name.clone(), f(&p.typ)?)))
            .collect::<Result<Vec<_>, E>>()?;
        let mut kind = self.kind;
        if kind.is_elem_cont() {
            let depth = params[0].typ.kind.depth().saturating_add(1);
            kind = kind.with_slot(depth);
        }
        Ok(Type {
            kind,
            info: Some(Arc::new(Info {
                name: info.name.clone(),
                params,
                consts: info.consts.clone(),
            })),
        })
    }
}

// ── Equality ─────────────────────────────────────────────────────

/// Structural equality. Self references compare equal to the composite
/// they point at; cycles through shared detail are assumed equal once
/// revisited.
impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        let mut hist = Vec::new();
        eq_in(self, self.kind, other, other.kind, &[], &[], &mut hist)
    }
}

fn eq_in<'a>(
    a: &'a Type,
    ka: Kind,
    b: &'a Type,
    kb: Kind,
    anc_a: &[&'a Type],
    anc_b: &[&'a Type],
    hist: &mut Vec<(usize, usize)>,
) -> bool {
    let self_a = ka.bare() == Kind::SELF;
    let self_b = kb.bare() == Kind::SELF;
    if self_a && !self_b {
        return match resolve_self(ka, anc_a) {
            Some((t, rest)) => eq_in(t, t.kind.with_opt(ka.is_opt()), b, kb, rest, anc_b, hist),
            None => false,
        };
    }
    if self_b && !self_a {
        return match resolve_self(kb, anc_b) {
            Some((t, rest)) => eq_in(a, ka, t, t.kind.with_opt(kb.is_opt()), anc_a, rest, hist),
            None => false,
        };
    }
    if ka != kb {
        return false;
    }
    let (ia, ib) = match (&a.info, &b.info) {
        (None, None) => return true,
        (Some(ia), Some(ib)) => (ia, ib),
        _ => return false,
    };
    if Arc::ptr_eq(ia, ib) {
        return true;
    }
    let pair = (Arc::as_ptr(ia) as usize, Arc::as_ptr(ib) as usize);
    if hist.contains(&pair) {
        return true;
    }
    if ia.name != ib.name || ia.consts != ib.consts || ia.params.len() != ib.params.len() {
        return false;
    }
    hist.push(pair);
    let mut next_a = anc_a.to_vec();
    next_a.push(a);
    let mut next_b = anc_b.to_vec();
    next_b.push(b);
    let same = ia.params.iter().zip(&ib.params).all(|(pa, pb)| {
        pa.name == pb.name
            && eq_in(&pa.typ, pa.typ.kind, &pb.typ, pb.typ.kind, &next_a, &next_b, hist)
    });
    hist.pop();
    same
}

fn resolve_self<'a, 's>(
    kind: Kind,
    anc: &'s [&'a Type],
) -> Option<(&'a Type, &'s [&'a Type])> {
    let dist = kind.slot() as usize;
    if dist == 0 || dist > anc.len() {
        return None;
    }
    let idx = anc.len() - dist;
    Some((anc[idx], &anc[..idx]))
}

impl From<Kind> for Type {
    fn from(kind: Kind) -> Type {
        Type::plain(kind)
    }
}
