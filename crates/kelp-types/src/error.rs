use crate::Type;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("invalid type `{input}`: {reason}")]
    InvalidType { input: String, reason: &'static str },

    #[error("expected a type variable, found {0}")]
    NotAVar(Type),

    #[error("recursive type: {var} occurs in {typ}")]
    Recursive { var: Type, typ: Type },

    #[error("cannot unify {0} with {1}: no common type")]
    NoCommonType(Type, Type),

    #[error("unresolved type reference {0}")]
    Unresolved(Type),

    #[error("{typ} does not satisfy the constraints of {var}")]
    Constraint { var: Type, typ: Type },

    #[error("ambiguous type {0}: free type variables remain")]
    Ambiguous(Type),
}

impl TypeError {
    pub(crate) fn invalid(input: &str, reason: &'static str) -> Self {
        TypeError::InvalidType {
            input: input.to_string(),
            reason,
        }
    }
}
