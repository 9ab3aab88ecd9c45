use std::fmt;

use crate::{Kind, Type};

// ── Cmp ──────────────────────────────────────────────────────────

/// Result of comparing a source type to a destination type.
///
/// The level (bits 8..11) orders results from incompatible to identical;
/// the low bits classify how the types relate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cmp(pub u16);

const LEVEL_SHIFT: u16 = 8;
const CLASS_MASK: u16 = 0xff;

impl Cmp {
    pub const WRAP: u16 = 0x01;
    pub const UNWRAP: u16 = 0x02;
    pub const ANY: u16 = 0x04;
    pub const WIDEN_BIT: u16 = 0x08;
    pub const NARROW_BIT: u16 = 0x10;
    pub const ELEM: u16 = 0x20;
    pub const SIBL: u16 = 0x40;

    pub const LVL_NONE: u16 = 0;
    pub const LVL_REF: u16 = 1;
    pub const LVL_CHECK: u16 = 2;
    pub const LVL_CONV: u16 = 3;
    pub const LVL_EQUAL: u16 = 4;
    pub const LVL_SAME: u16 = 5;

    pub const NONE: Cmp = Cmp(0);
    pub const REF: Cmp = Cmp::level_of(Cmp::LVL_REF, 0);
    pub const CHECK_ANY: Cmp = Cmp::level_of(Cmp::LVL_CHECK, Cmp::ANY);
    pub const CHECK_ELEM: Cmp = Cmp::level_of(Cmp::LVL_CHECK, Cmp::ELEM);
    pub const NARROW: Cmp = Cmp::level_of(Cmp::LVL_CHECK, Cmp::NARROW_BIT);
    pub const CONV_ANY: Cmp = Cmp::level_of(Cmp::LVL_CONV, Cmp::ANY);
    pub const CONV_SIBL: Cmp = Cmp::level_of(Cmp::LVL_CONV, Cmp::SIBL);
    pub const EQUAL: Cmp = Cmp::level_of(Cmp::LVL_EQUAL, 0);
    pub const WIDEN: Cmp = Cmp::level_of(Cmp::LVL_EQUAL, Cmp::WIDEN_BIT);
    pub const SAME: Cmp = Cmp::level_of(Cmp::LVL_SAME, 0);

    const fn level_of(level: u16, class: u16) -> Cmp {
        Cmp(level << LEVEL_SHIFT | class)
    }

    pub fn level(self) -> u16 {
        self.0 >> LEVEL_SHIFT
    }

    pub fn class(self) -> u16 {
        self.0 & CLASS_MASK
    }

    pub fn has(self, bits: u16) -> bool {
        self.0 & bits == bits
    }

    pub fn with(self, bits: u16) -> Cmp {
        if self.level() == Cmp::LVL_NONE {
            return self;
        }
        Cmp(self.0 | bits)
    }

    /// Values of the source type are usable where the destination is
    /// expected, possibly after a runtime check.
    pub fn is_compatible(self) -> bool {
        self.level() >= Cmp::LVL_CHECK
    }

    /// The weaker of two results. Class bits of both are kept.
    pub fn weaker(self, other: Cmp) -> Cmp {
        if self.level() == Cmp::LVL_NONE || other.level() == Cmp::LVL_NONE {
            return Cmp::NONE;
        }
        let level = self.level().min(other.level());
        Cmp::level_of(level, self.class() | other.class())
    }

    /// Caps the level at `level`.
    fn cap(self, level: u16) -> Cmp {
        if self.level() <= level {
            return self;
        }
        Cmp::level_of(level, self.class())
    }
}

impl fmt::Debug for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cmp({})", self)
    }
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level() {
            Cmp::LVL_NONE => "none",
            Cmp::LVL_REF => "ref",
            Cmp::LVL_CHECK => "check",
            Cmp::LVL_CONV => "conv",
            Cmp::LVL_EQUAL => "equal",
            _ => "same",
        };
        write!(f, "{}", level)?;
        let names = [
            (Cmp::WRAP, "wrap"),
            (Cmp::UNWRAP, "unwrap"),
            (Cmp::ANY, "any"),
            (Cmp::WIDEN_BIT, "widen"),
            (Cmp::NARROW_BIT, "narrow"),
            (Cmp::ELEM, "elem"),
            (Cmp::SIBL, "sibl"),
        ];
        for (bit, name) in names {
            if self.0 & bit != 0 {
                write!(f, "|{}", name)?;
            }
        }
        Ok(())
    }
}

// ── Compare ──────────────────────────────────────────────────────

/// How values of `src` relate to the `dst` type.
pub fn compare(src: &Type, dst: &Type) -> Cmp {
    let c = compare_plain(&src.deopt(), &dst.deopt());
    if !c.is_compatible() || src.is_any() || dst.is_any() {
        return c;
    }
    match (src.is_opt(), dst.is_opt()) {
        (false, true) => c.with(Cmp::WRAP).cap(Cmp::LVL_EQUAL),
        (true, false) => c.with(Cmp::UNWRAP).cap(Cmp::LVL_CHECK),
        _ => c,
    }
}

fn compare_plain(src: &Type, dst: &Type) -> Cmp {
    if src == dst {
        return Cmp::SAME;
    }
    let (sk, dk) = (src.kind, dst.kind);
    if sk.is_ctx() || dk.is_ctx() {
        return Cmp::REF;
    }
    if dk.is_any() {
        return Cmp::CONV_ANY;
    }
    if sk.is_any() {
        return Cmp::CHECK_ANY;
    }
    if sk.is_void() || dk.is_void() {
        return Cmp::NONE;
    }
    if sk.is_cont() && dk.is_cont() {
        return compare_cont(src, dst);
    }
    compare_kinds(src, dst)
}

/// Primitive and spec comparison along the family bits.
fn compare_kinds(src: &Type, dst: &Type) -> Cmp {
    let (s, d) = (src.kind.family(), dst.kind.family());
    if s == d {
        // same kind, different detail: named bits, enums and specs
        return match (src.info.is_some(), dst.info.is_some()) {
            (true, false) => Cmp::WIDEN,
            (false, true) => Cmp::NARROW,
            _ if src.kind.is_spec() => Cmp::NONE,
            _ => Cmp::CONV_SIBL,
        };
    }
    let common = s & d;
    if common == s {
        return Cmp::NARROW;
    }
    if common == d {
        return Cmp::WIDEN;
    }
    if Kind(common).is_num() || Kind(common).is_char() {
        return Cmp::CONV_SIBL;
    }
    Cmp::NONE
}

fn compare_cont(src: &Type, dst: &Type) -> Cmp {
    let (sk, dk) = (src.kind.bare().with_slot(0), dst.kind.bare().with_slot(0));
    let (s, d) = (sk.family(), dk.family());
    let common = s & d;
    if common == 0 {
        return Cmp::NONE;
    }
    let kinds = if s == d {
        Cmp::SAME
    } else if common == d {
        Cmp::WIDEN
    } else if common == s {
        Cmp::NARROW
    } else {
        Cmp::CHECK_ELEM
    };

    if sk.is_obj() && dk.is_obj() {
        return compare_obj(src, dst);
    }
    if dk.is_obj() {
        return kinds.weaker(Cmp::CHECK_ELEM);
    }
    if sk.is_obj() {
        // every field must fit the destination element
        let Some(de) = dst.elem() else {
            return kinds;
        };
        return src.params().iter().fold(kinds, |acc, p| {
            acc.weaker(compare(&p.typ, de).with(Cmp::ELEM))
        });
    }
    match (src.elem(), dst.elem()) {
        (Some(se), Some(de)) => {
            let elem = compare(se, de);
            if elem.level() == Cmp::LVL_SAME {
                kinds
            } else {
                kinds.weaker(elem.with(Cmp::ELEM))
            }
        }
        (None, Some(_)) => kinds.weaker(Cmp::CHECK_ELEM),
        (Some(_), None) => kinds.weaker(Cmp::WIDEN.with(Cmp::ELEM)),
        (None, None) => kinds,
    }
}

/// Objects compare by field key regardless of declaration order.
fn compare_obj(src: &Type, dst: &Type) -> Cmp {
    match (src.info.is_some(), dst.info.is_some()) {
        (false, _) => return Cmp::CHECK_ELEM,
        (true, false) => return Cmp::WIDEN,
        _ => {}
    }
    let mut res = if src.ref_name() == dst.ref_name() {
        Cmp::SAME
    } else {
        Cmp::EQUAL
    };
    let mut matched = 0;
    for field in dst.params() {
        match src.field(&field.key()) {
            Some(p) => {
                matched += 1;
                let c = compare(&p.typ, &field.typ);
                if c.level() != Cmp::LVL_SAME {
                    res = res.weaker(c.with(Cmp::ELEM));
                }
            }
            None if field.is_opt() => res = res.weaker(Cmp::EQUAL.with(Cmp::ELEM)),
            None => return Cmp::NONE,
        }
        if res.level() == Cmp::LVL_NONE {
            return Cmp::NONE;
        }
    }
    if src.params().len() > matched {
        res = res.weaker(Cmp::WIDEN.with(Cmp::ELEM));
    }
    res
}
