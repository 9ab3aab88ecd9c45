use std::fmt;

use crate::{Kind, Param, Type};

/// Canonical type notation. The output parses back into an equal type.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = if self.is_opt() { "?" } else { "" };
        let bare = self.kind.bare().with_slot(0);
        match bare {
            Kind::VAR => {
                let id = self.kind.slot();
                if self.params().is_empty() {
                    return write!(f, "'{}{}", id, opt);
                }
                write!(f, "('{}{}", id, opt)?;
                for c in self.alts() {
                    write!(f, " {}", c)?;
                }
                write!(f, ")")
            }
            Kind::REF => write!(f, "@{}{}", self.ref_name(), opt),
            Kind::SCH => write!(f, "~{}{}", self.ref_name(), opt),
            Kind::SELF => write!(f, "@{}{}", self.kind.slot(), opt),
            Kind::ALT => {
                write!(f, "(alt{}", opt)?;
                for c in self.alts() {
                    write!(f, " {}", c)?;
                }
                write!(f, ")")
            }
            _ if self.kind.is_elem_cont() => {
                write!(f, "{}", self.kind)?;
                match self.elem() {
                    Some(elem) => write!(f, "|{}", elem),
                    None => Ok(()),
                }
            }
            _ if self.kind.is_composite() && self.info.is_some() => write_composite(f, self),
            _ => write!(f, "{}", self.kind),
        }
    }
}

fn write_composite(f: &mut fmt::Formatter<'_>, t: &Type) -> fmt::Result {
    write!(f, "({}", t.kind)?;
    if !t.ref_name().is_empty() {
        write!(f, " \"{}\"", t.ref_name())?;
    }
    for c in t.consts() {
        write!(f, " +{} {}", c.name, c.val)?;
    }
    write_params(f, t.params())?;
    write!(f, ")")
}

/// Consecutive named parameters of equal type share one type.
fn write_params(f: &mut fmt::Formatter<'_>, params: &[Param]) -> fmt::Result {
    for (i, p) in params.iter().enumerate() {
        if p.name.is_empty() {
            write!(f, " {}", p.typ)?;
            continue;
        }
        write!(f, " +{}", p.name)?;
        let shares_next = params
            .get(i + 1)
            .is_some_and(|next| !next.name.is_empty() && next.typ == p.typ);
        if !shares_next {
            write!(f, " {}", p.typ)?;
        }
    }
    Ok(())
}
