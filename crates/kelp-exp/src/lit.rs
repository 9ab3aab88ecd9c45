use std::fmt;
use std::sync::Arc;

use kelp_types::{Ctx, Type};
use smol_str::SmolStr;

use crate::Spec;

// ── Literal values ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(SmolStr),
    List(Vec<Val>),
    /// Insertion-ordered key/value pairs.
    Dict(Vec<(SmolStr, Val)>),
    Typ(Type),
    Spec(Arc<Spec>),
}

/// What the engine needs to know about a literal.
pub trait Lit {
    fn typ(&self) -> Type;
    /// Zero values are falsy: null, false, 0, empty strings and containers.
    fn is_zero(&self) -> bool;
    fn equal(&self, other: &Self) -> bool;
    /// `None` if the two values are not ordered against each other.
    fn less(&self, other: &Self) -> Option<bool>;
    fn idx(&self, i: usize) -> Option<&Self>;
    fn key(&self, k: &str) -> Option<&Self>;
    fn len(&self) -> Option<usize>;
}

impl Val {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Int(n) => Some(*n as f64),
            Val::Real(n) => Some(*n),
            _ => None,
        }
    }

    /// Walk a dotted path of keys and list indices.
    pub fn path<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Option<&Val> {
        let mut cur = self;
        for k in keys {
            cur = match k.parse::<usize>() {
                Ok(i) if matches!(cur, Val::List(_)) => cur.idx(i)?,
                _ => cur.key(k)?,
            };
        }
        Some(cur)
    }
}

/// Common element type of a literal container; mixed elements give `any`.
fn elem_type<'a>(vals: impl Iterator<Item = &'a Val>) -> Option<Type> {
    let types: Vec<Type> = vals.map(Lit::typ).collect();
    if types.is_empty() {
        return None;
    }
    Ctx::new().choose(&Type::alt(types)).ok()
}

impl Lit for Val {
    fn typ(&self) -> Type {
        match self {
            Val::Null => Type::ANY.opt(),
            Val::Bool(_) => Type::BOOL,
            Val::Int(_) => Type::INT,
            Val::Real(_) => Type::REAL,
            Val::Str(_) => Type::STR,
            Val::List(items) => elem_type(items.iter()).map_or(Type::LIST, Type::list),
            Val::Dict(pairs) => elem_type(pairs.iter().map(|(_, v)| v)).map_or(Type::DICT, Type::dict),
            Val::Typ(_) => Type::TYP,
            Val::Spec(spec) => spec.typ.clone(),
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Val::Null => true,
            Val::Bool(b) => !b,
            Val::Int(n) => *n == 0,
            Val::Real(n) => *n == 0.0,
            Val::Str(s) => s.is_empty(),
            Val::List(items) => items.is_empty(),
            Val::Dict(pairs) => pairs.is_empty(),
            Val::Typ(t) => t.is_void(),
            Val::Spec(_) => false,
        }
    }

    fn equal(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equal(y))
            }
            (Val::Dict(a), Val::Dict(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| other.key(k).is_some_and(|w| v.equal(w)))
            }
            (Val::Typ(a), Val::Typ(b)) => a == b,
            (Val::Spec(a), Val::Spec(b)) => Arc::ptr_eq(a, b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    fn less(&self, other: &Val) -> Option<bool> {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Some(a < b),
            (Val::Str(a), Val::Str(b)) => Some(a < b),
            (Val::Bool(a), Val::Bool(b)) => Some(a < b),
            _ => Some(self.as_f64()? < other.as_f64()?),
        }
    }

    fn idx(&self, i: usize) -> Option<&Val> {
        match self {
            Val::List(items) => items.get(i),
            _ => None,
        }
    }

    fn key(&self, k: &str) -> Option<&Val> {
        match self {
            Val::Dict(pairs) => pairs.iter().find(|(name, _)| name == k).map(|(_, v)| v),
            _ => None,
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Val::Str(s) => Some(s.chars().count()),
            Val::List(items) => Some(items.len()),
            Val::Dict(pairs) => Some(pairs.len()),
            _ => None,
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => write!(f, "null"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Int(n) => write!(f, "{}", n),
            Val::Real(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Val::Str(s) => write!(f, "{:?}", s.as_str()),
            Val::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Val::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "}}")
            }
            Val::Typ(t) => write!(f, "{}", t),
            Val::Spec(spec) => match spec.name() {
                "" => write!(f, "{}", spec.typ),
                name => write!(f, "{}", name),
            },
        }
    }
}
