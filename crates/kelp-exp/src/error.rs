use kelp_lexer::Span;
use kelp_types::{Type, TypeError};
use smol_str::SmolStr;

use crate::env::Capability;
use crate::ElId;

// ── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExpError {
    /// A symbol, type reference or argument could not be resolved yet.
    ///
    /// In partial mode `el` is the residual element to retry later;
    /// otherwise it is the element the caller passed in.
    #[error("unresolved element")]
    Unresolved { el: ElId },

    #[error("[{span}] {err}")]
    Type { err: TypeError, span: Span },

    #[error("missing argument for parameter `{param}`")]
    MissingArg { param: SmolStr },

    #[error("[{span}] unexpected tail element")]
    UnexpectedTail { span: Span },

    #[error("[{span}] unexpected tag or declaration `{name}`")]
    UnexpectedTag { name: SmolStr, span: Span },

    #[error("[{span}] declaration `{name}` needs exactly one argument")]
    UniArity { name: SmolStr, span: Span },

    #[error("no scope supports {cap} names like `{name}`")]
    Unsupported { name: SmolStr, cap: Capability },

    #[error("redefined symbol `{name}`")]
    Redefined { name: SmolStr },

    #[error("[{span}] cannot dispatch on {typ}")]
    Dispatch { typ: Type, span: Span },

    #[error("[{span}] cannot evaluate unresolved element")]
    Unevaluable { span: Span },

    #[error("[{span}] {msg}")]
    Eval { msg: String, span: Span },

    #[error("[{span}] {msg}")]
    Read { msg: String, span: Span },
}

impl ExpError {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, ExpError::Unresolved { .. })
    }

    /// The residual element of an unresolved error.
    pub fn unresolved_el(&self) -> Option<ElId> {
        match self {
            ExpError::Unresolved { el } => Some(*el),
            _ => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            ExpError::Type { span, .. }
            | ExpError::UnexpectedTail { span }
            | ExpError::UnexpectedTag { span, .. }
            | ExpError::UniArity { span, .. }
            | ExpError::Dispatch { span, .. }
            | ExpError::Unevaluable { span }
            | ExpError::Eval { span, .. }
            | ExpError::Read { span, .. } => Some(*span),
            _ => None,
        }
    }

    pub(crate) fn eval(msg: impl Into<String>, span: Span) -> Self {
        ExpError::Eval {
            msg: msg.into(),
            span,
        }
    }
}
