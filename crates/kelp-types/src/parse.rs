use smol_str::SmolStr;

use crate::{Const, Kind, Param, Type, TypeError};

impl Type {
    /// Parse canonical type notation.
    ///
    /// ```text
    /// int  int?  list|int  dict?|list|str  @node  ~point  @1  '2
    /// ('1 num str)  (alt int str)  (obj "point" +x +y int)
    /// (bits "mode" +read 1 +write 2)  (form "and" +plain? list bool)
    /// ```
    pub fn parse(src: &str) -> Result<Type, TypeError> {
        let mut p = Parser { src, pos: 0 };
        let t = p.parse_type()?;
        p.skip_ws();
        if p.pos < src.len() {
            return Err(TypeError::invalid(src, "trailing input"));
        }
        Ok(t)
    }
}

struct Parser<'s> {
    src: &'s str,
    pos: usize,
}

fn is_delim(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | '|')
}

impl<'s> Parser<'s> {
    fn err(&self, reason: &'static str) -> TypeError {
        TypeError::invalid(self.src, reason)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn word(&mut self) -> &'s str {
        let start = self.pos;
        while self.peek().is_some_and(|c| !is_delim(c)) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn parse_type(&mut self) -> Result<Type, TypeError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.err("missing type")),
            Some('(') => self.parse_form(),
            Some(_) => self.parse_word(),
        }
    }

    fn parse_word(&mut self) -> Result<Type, TypeError> {
        let word = self.word();
        if word.is_empty() {
            return Err(self.err("unexpected character"));
        }
        let (name, opt) = split_opt(word);
        let t = if let Some(id) = name.strip_prefix('\'') {
            Type::var(self.number(id)?, Vec::new())
        } else if let Some(rest) = name.strip_prefix('@') {
            match rest.parse::<u32>() {
                Ok(0) => return Err(self.err("self reference distance must be positive")),
                Ok(dist) => Type::self_ref(dist),
                Err(_) if rest.is_empty() => return Err(self.err("missing reference name")),
                Err(_) => Type::reference(rest),
            }
        } else if let Some(rest) = name.strip_prefix('~') {
            if rest.is_empty() {
                return Err(self.err("missing schema name"));
            }
            Type::schema(rest)
        } else {
            let kind = Kind::from_name(name).ok_or_else(|| self.err("unknown type name"))?;
            if kind == Kind::ALT {
                return Err(self.err("alternatives need a candidate list"));
            }
            if self.peek() == Some('|') {
                if !kind.is_elem_cont() {
                    return Err(self.err("only containers take an element type"));
                }
                self.bump();
                let elem = self.parse_type()?;
                Type::cont(kind, elem)?
            } else {
                Type::plain(kind)
            }
        };
        Ok(t.opt_if(opt))
    }

    fn number(&self, digits: &str) -> Result<u32, TypeError> {
        match digits.parse() {
            Ok(0) | Err(_) => Err(self.err("expected a positive number")),
            Ok(n) => Ok(n),
        }
    }

    fn parse_form(&mut self) -> Result<Type, TypeError> {
        self.bump();
        self.skip_ws();
        let head = self.word();
        let (name, opt) = split_opt(head);
        let t = if let Some(id) = name.strip_prefix('\'') {
            let id = self.number(id)?;
            let cons = self.parse_list()?;
            Type::var(id, cons)
        } else {
            match Kind::from_name(name) {
                Some(Kind::ALT) => Type::alt(self.parse_list()?),
                Some(kind) if kind.is_composite() => self.parse_composite(kind)?,
                _ => return Err(self.err("unknown composite type")),
            }
        };
        self.skip_ws();
        if self.peek() != Some(')') {
            return Err(self.err("unclosed '('"));
        }
        self.bump();
        Ok(t.opt_if(opt))
    }

    fn parse_list(&mut self) -> Result<Vec<Type>, TypeError> {
        let mut types = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(')') | None => return Ok(types),
                _ => types.push(self.parse_type()?),
            }
        }
    }

    fn parse_composite(&mut self, kind: Kind) -> Result<Type, TypeError> {
        self.skip_ws();
        let name = if self.peek() == Some('"') {
            self.bump();
            let start = self.pos;
            while self.peek().is_some_and(|c| c != '"') {
                self.bump();
            }
            if self.peek().is_none() {
                return Err(self.err("unclosed name"));
            }
            let name = SmolStr::new(&self.src[start..self.pos]);
            self.bump();
            name
        } else {
            SmolStr::default()
        };

        let constants = kind == Kind::BITS || kind == Kind::ENUM;
        let mut params = Vec::new();
        let mut consts = Vec::new();
        let mut pending: Vec<SmolStr> = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(')') | None => break,
                Some('+') => {
                    self.bump();
                    let decl = self.word();
                    if decl.is_empty() {
                        return Err(self.err("missing parameter name"));
                    }
                    if constants {
                        self.skip_ws();
                        let val = self.word();
                        let val = val.parse().map_err(|_| self.err("expected a constant value"))?;
                        consts.push(Const::new(decl, val));
                    } else {
                        pending.push(SmolStr::new(decl));
                    }
                }
                Some(_) if constants => return Err(self.err("expected a constant")),
                Some(_) => {
                    let typ = self.parse_type()?;
                    if pending.is_empty() {
                        params.push(Param::pos(typ));
                    } else {
                        params.extend(pending.drain(..).map(|n| Param::new(n, typ.clone())));
                    }
                }
            }
        }
        if !pending.is_empty() {
            return Err(self.err("parameter without type"));
        }

        Ok(match kind {
            Kind::BITS => Type::bits(name, consts),
            Kind::ENUM => Type::enumeration(name, consts),
            Kind::FORM => Type::form(name, params),
            Kind::FUNC => Type::func(name, params),
            _ => Type::obj(name, params),
        })
    }
}

fn split_opt(word: &str) -> (&str, bool) {
    match word.strip_suffix('?') {
        Some(name) => (name, true),
        None => (word, false),
    }
}
