//! Structural types: kinds, type values, comparison and unification.

mod cmp;
mod ctx;
mod error;
mod fmt;
mod kind;
mod parse;
mod ty;
mod unify;

pub use cmp::{compare, Cmp};
pub use ctx::Ctx;
pub use error::TypeError;
pub use kind::{Kind, MAX_DEPTH};
pub use ty::{Const, Info, Param, Type};

#[cfg(test)]
mod tests;
