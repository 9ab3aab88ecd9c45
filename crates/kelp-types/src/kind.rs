use std::fmt;

// ── Kind ─────────────────────────────────────────────────────────

/// Compact classification of a type.
///
/// The low 32 bits hold flags and family bits, the high 32 bits the slot:
/// the nesting depth of container kinds, the id of type variables, or the
/// ancestor distance of self references.
///
/// Specific kinds carry the bits of every more general kind they belong to,
/// so `int` is `num` plus the int bit and the most specific common kind of
/// two kinds is the intersection of their bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Kind(pub u64);

pub const MAX_DEPTH: u32 = 7;

const SLOT_SHIFT: u32 = 32;
const MASK_KIND: u64 = 0xffff_ffff;

pub(crate) const OPT: u64 = 1 << 0;
pub(crate) const CTX: u64 = 1 << 1;

const BASE_NUM: u64 = 1 << 2;
const BASE_CHAR: u64 = 1 << 3;
const BASE_IDXR: u64 = 1 << 4;
const BASE_KEYR: u64 = 1 << 5;

const BIT_INT: u64 = 1 << 6;
const BIT_REAL: u64 = 1 << 7;
const BIT_BITS: u64 = 1 << 8;
const BIT_SPAN: u64 = 1 << 9;
const BIT_STR: u64 = 1 << 10;
const BIT_RAW: u64 = 1 << 11;
const BIT_UUID: u64 = 1 << 12;
const BIT_TIME: u64 = 1 << 13;
const BIT_ENUM: u64 = 1 << 14;
const BIT_BOOL: u64 = 1 << 15;
const BIT_TYP: u64 = 1 << 16;
const BIT_SPEC: u64 = 1 << 17;
const BIT_FORM: u64 = 1 << 18;
const BIT_FUNC: u64 = 1 << 19;
const BIT_LIST: u64 = 1 << 20;
const BIT_DICT: u64 = 1 << 21;
const BIT_OBJ: u64 = 1 << 22;
const BIT_VAR: u64 = 1 << 23;
const BIT_REF: u64 = 1 << 24;
const BIT_SCH: u64 = 1 << 25;
const BIT_ALT: u64 = 1 << 26;
const BIT_SELF: u64 = 1 << 27;
const BIT_ANY: u64 = 1 << 28;

impl Kind {
    pub const VOID: Kind = Kind(0);
    pub const ANY: Kind = Kind(BIT_ANY);
    pub const TYP: Kind = Kind(BIT_TYP);
    pub const BOOL: Kind = Kind(BIT_BOOL);

    pub const NUM: Kind = Kind(BASE_NUM);
    pub const INT: Kind = Kind(BASE_NUM | BIT_INT);
    pub const REAL: Kind = Kind(BASE_NUM | BIT_REAL);
    pub const BITS: Kind = Kind(BASE_NUM | BIT_INT | BIT_BITS);
    pub const SPAN: Kind = Kind(BASE_NUM | BIT_INT | BIT_SPAN);

    pub const CHAR: Kind = Kind(BASE_CHAR);
    pub const STR: Kind = Kind(BASE_CHAR | BIT_STR);
    pub const RAW: Kind = Kind(BASE_CHAR | BIT_RAW);
    pub const UUID: Kind = Kind(BASE_CHAR | BIT_UUID);
    pub const TIME: Kind = Kind(BASE_CHAR | BIT_TIME);
    pub const ENUM: Kind = Kind(BASE_CHAR | BIT_STR | BIT_ENUM);

    pub const IDXR: Kind = Kind(BASE_IDXR);
    pub const KEYR: Kind = Kind(BASE_KEYR);
    pub const LIST: Kind = Kind(BASE_IDXR | BIT_LIST);
    pub const DICT: Kind = Kind(BASE_KEYR | BIT_DICT);
    pub const OBJ: Kind = Kind(BASE_IDXR | BASE_KEYR | BIT_OBJ);

    pub const FORM: Kind = Kind(BIT_SPEC | BIT_FORM);
    pub const FUNC: Kind = Kind(BIT_SPEC | BIT_FUNC);

    pub const VAR: Kind = Kind(CTX | BIT_VAR);
    pub const REF: Kind = Kind(CTX | BIT_REF);
    pub const SCH: Kind = Kind(CTX | BIT_SCH);
    pub const ALT: Kind = Kind(CTX | BIT_ALT);
    pub const SELF: Kind = Kind(CTX | BIT_SELF);
}

/// Every named kind in the lattice, in canonical spelling.
const NAMES: &[(&str, Kind)] = &[
    ("void", Kind::VOID),
    ("any", Kind::ANY),
    ("typ", Kind::TYP),
    ("bool", Kind::BOOL),
    ("num", Kind::NUM),
    ("int", Kind::INT),
    ("real", Kind::REAL),
    ("bits", Kind::BITS),
    ("span", Kind::SPAN),
    ("char", Kind::CHAR),
    ("str", Kind::STR),
    ("raw", Kind::RAW),
    ("uuid", Kind::UUID),
    ("time", Kind::TIME),
    ("enum", Kind::ENUM),
    ("idxr", Kind::IDXR),
    ("keyr", Kind::KEYR),
    ("list", Kind::LIST),
    ("dict", Kind::DICT),
    ("obj", Kind::OBJ),
    ("form", Kind::FORM),
    ("func", Kind::FUNC),
    ("alt", Kind::ALT),
];

impl Kind {
    /// Kind without optional flag and slot.
    pub fn bare(self) -> Kind {
        Kind(self.0 & MASK_KIND & !OPT)
    }

    /// Family bits only: no flags, no slot.
    pub(crate) fn family(self) -> u64 {
        self.0 & MASK_KIND & !(OPT | CTX)
    }

    pub fn slot(self) -> u32 {
        (self.0 >> SLOT_SHIFT) as u32
    }

    pub fn with_slot(self, slot: u32) -> Kind {
        Kind((self.0 & MASK_KIND) | ((slot as u64) << SLOT_SHIFT))
    }

    pub fn is_opt(self) -> bool {
        self.0 & OPT != 0
    }

    pub fn opt(self) -> Kind {
        Kind(self.0 | OPT)
    }

    pub fn deopt(self) -> Kind {
        Kind(self.0 & !OPT)
    }

    pub fn with_opt(self, opt: bool) -> Kind {
        if opt {
            self.opt()
        } else {
            self.deopt()
        }
    }

    pub fn is_void(self) -> bool {
        self.bare() == Kind::VOID
    }

    pub fn is_any(self) -> bool {
        self.bare() == Kind::ANY
    }

    /// Context or meta kind: var, ref, sch, alt or self.
    pub fn is_ctx(self) -> bool {
        self.0 & CTX != 0
    }

    pub fn is_var(self) -> bool {
        self.bare() == Kind::VAR
    }

    pub fn is_alt(self) -> bool {
        self.bare() == Kind::ALT
    }

    pub fn is_num(self) -> bool {
        self.0 & BASE_NUM != 0
    }

    pub fn is_char(self) -> bool {
        self.0 & BASE_CHAR != 0
    }

    pub fn is_idxr(self) -> bool {
        self.0 & BASE_IDXR != 0
    }

    pub fn is_keyr(self) -> bool {
        self.0 & BASE_KEYR != 0
    }

    /// Container kinds: index- or key-accessed.
    pub fn is_cont(self) -> bool {
        self.0 & (BASE_IDXR | BASE_KEYR) != 0
    }

    /// Containers whose element type is a single `|` element.
    pub fn is_elem_cont(self) -> bool {
        self.is_cont() && self.0 & BIT_OBJ == 0
    }

    pub fn is_obj(self) -> bool {
        self.0 & BIT_OBJ != 0
    }

    pub fn is_spec(self) -> bool {
        self.0 & BIT_SPEC != 0
    }

    pub fn is_prim(self) -> bool {
        self.0 & (BASE_NUM | BASE_CHAR | BIT_BOOL) != 0
    }

    /// Kinds spelled with a parenthesized parameter list.
    pub fn is_composite(self) -> bool {
        self.0 & (BIT_OBJ | BIT_SPEC | BIT_BITS | BIT_ENUM) != 0 || self.is_alt()
    }

    /// Nesting depth of container kinds.
    pub fn depth(self) -> u32 {
        if self.is_elem_cont() {
            self.slot()
        } else {
            0
        }
    }

    /// Whether the family bits spell a kind of the lattice.
    pub fn is_known(self) -> bool {
        let bare = Kind(self.family() | (self.0 & CTX));
        NAMES.iter().any(|(_, k)| *k == bare)
            || matches!(bare, Kind::VAR | Kind::REF | Kind::SCH | Kind::SELF)
    }

    /// The next more general kind of the primitive and container hierarchy.
    pub fn parent(self) -> Option<Kind> {
        let bare = self.bare().with_slot(0);
        let parent = match bare {
            Kind::INT | Kind::REAL => Kind::NUM,
            Kind::BITS | Kind::SPAN => Kind::INT,
            Kind::STR | Kind::RAW | Kind::UUID | Kind::TIME => Kind::CHAR,
            Kind::ENUM => Kind::STR,
            Kind::LIST => Kind::IDXR,
            Kind::DICT => Kind::KEYR,
            Kind::NUM | Kind::CHAR | Kind::IDXR | Kind::KEYR | Kind::BOOL | Kind::TYP => Kind::ANY,
            _ => return None,
        };
        Some(parent)
    }

    /// Canonical name of the kind, ignoring flag and slot.
    pub fn name(self) -> Option<&'static str> {
        let bare = self.bare().with_slot(0);
        NAMES.iter().find(|(_, k)| *k == bare).map(|(n, _)| *n)
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        NAMES.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.bare().with_slot(0) {
            Kind::VAR => "var",
            Kind::REF => "ref",
            Kind::SCH => "sch",
            Kind::SELF => "self",
            k => k.name().unwrap_or("?"),
        };
        write!(f, "{}", name)?;
        if self.is_opt() {
            write!(f, "?")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({}", self)?;
        if self.slot() != 0 {
            write!(f, ";{}", self.slot())?;
        }
        write!(f, ")")
    }
}
