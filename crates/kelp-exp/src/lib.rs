//! Expression elements and their resolution against typed specs.
//!
//! Source is read into an arena of elements. Resolution looks up symbols,
//! picks operators, lays out arguments and unifies types, replacing
//! elements as it learns more. In partial mode anything that cannot be
//! resolved yet is left as a residual element that a later pass can
//! resume from.

mod builtins;
mod el;
mod env;
mod error;
mod layout;
mod lit;
mod prog;
mod read;
mod spec;

pub use el::{Call, Decl, El, ElDisplay, ElId, ElKind, Sym, Tag, Tree};
pub use env::{lookup, Capability, DataScope, Def, Env, ParamScope, Registry, Scope};
pub use error::ExpError;
pub use layout::layout;
pub use lit::{Lit, Val};
pub use prog::{Prog, Resolved};
pub use read::read;
pub use spec::{Operator, Spec};

#[cfg(test)]
mod tests;
