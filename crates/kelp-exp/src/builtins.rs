use std::sync::Arc;

use kelp_lexer::Span;
use kelp_types::{Ctx, Kind, Param, Type};
use smol_str::SmolStr;
use tracing::debug;

use crate::{
    lookup, Call, Capability, Decl, Def, ElId, ElKind, Env, ExpError, Lit, Operator, ParamScope,
    Prog, Registry, Resolved, Scope, Spec, Tree, Val,
};

// ── Registry ─────────────────────────────────────────────────────

fn p(name: &str, typ: Type) -> Param {
    Param::new(name, typ)
}

fn form(name: &str, mut params: Vec<Param>, result: Type) -> Type {
    params.push(Param::pos(result));
    Type::form(name, params)
}

impl Registry {
    /// Registry with the builtin operators.
    pub fn builtins() -> Self {
        let v1 = Type::var(1, Vec::new());
        let num1 = Type::var(1, vec![Type::NUM]);
        let plain_opt = || vec![p("plain?", Type::LIST)];
        let decls = || vec![p("unis?", Type::LIST), p("tail", Type::LIST)];

        let specs = [
            Spec::new(form("and", plain_opt(), Type::BOOL), Logic { and: true }),
            Spec::new(form("or", plain_opt(), Type::BOOL), Logic { and: false }),
            Spec::new(form("not", vec![p("a", Type::ANY)], Type::BOOL), Not),
            Spec::new(form("ok", vec![p("a", Type::ANY)], Type::BOOL), Truthy),
            Spec::new(
                form(
                    "if",
                    vec![p("cond", Type::ANY), p("then", v1.clone()), p("else?", v1.clone())],
                    v1.clone(),
                ),
                If,
            ),
            Spec::new(form("fail", plain_opt(), Type::ANY), Fail),
            Spec::new(form("add", vec![p("plain", Type::list(num1))], v1.clone()), Add),
            Spec::new(form("cat", vec![p("plain", Type::list(Type::CHAR))], Type::STR), Cat),
            Spec::new(
                form(
                    "append",
                    vec![p("a", Type::list(v1.clone())), p("plain?", Type::list(v1.clone()))],
                    Type::list(v1.clone()),
                ),
                Append,
            ),
            Spec::new(
                form(
                    "merge",
                    vec![
                        p("a", Type::dict(v1.clone())),
                        p("plain?", Type::list(Type::dict(v1.clone()))),
                    ],
                    Type::dict(v1.clone()),
                ),
                Merge,
            ),
            Spec::new(form("eq", vec![p("plain", Type::LIST)], Type::BOOL), Compare { lt: false }),
            Spec::new(form("lt", vec![p("plain", Type::LIST)], Type::BOOL), Compare { lt: true }),
            Spec::new(form("let", decls(), v1.clone()), Let),
            Spec::new(form("fn", decls(), v1.clone()), Lambda),
            Spec::new(
                form("con", vec![p("typ", Type::TYP), p("plain?", Type::LIST)], v1),
                Con,
            ),
        ];
        let mut reg = Registry::new();
        let count = specs.len();
        for spec in specs {
            reg.add_spec(spec);
        }
        debug!(count, "builtins registered");
        reg
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn arg(call: &Call, i: usize) -> Option<ElId> {
    call.groups.get(i)?.first().copied()
}

fn group(call: &Call, i: usize) -> &[ElId] {
    call.groups.get(i).map_or(&[], Vec::as_slice)
}

fn decl_arg(tree: &Tree, id: ElId) -> Result<(SmolStr, ElId), ExpError> {
    let span = tree.span(id);
    match &tree[id].kind {
        ElKind::Decl(decl) => match decl.args.as_slice() {
            [a] => Ok((decl.name.clone(), *a)),
            _ => Err(ExpError::UniArity {
                name: decl.name.clone(),
                span,
            }),
        },
        _ => Err(ExpError::UniArity {
            name: SmolStr::default(),
            span,
        }),
    }
}

/// Resolve the arguments, then fold literal arguments with `reduce`.
///
/// With every argument literal the call becomes the reduced literal. With
/// `prefix` set, two or more leading literals collapse into one.
fn fold(
    p: &mut Prog<'_>,
    env: &dyn Env,
    id: ElId,
    call: &Call,
    prefix: bool,
    reduce: fn(&[Val], Span) -> Result<Val, ExpError>,
) -> Result<ElId, ExpError> {
    let span = p.tree.span(id);
    let mut res = p.resolve_args(env, call)?;
    let complete = !res.unresolved && res.groups.len() == 1;
    if let Some(args) = res.groups.first_mut() {
        let lits: Vec<Val> = args.iter().map_while(|&a| p.lit_of(a)).collect();
        if lits.len() == args.len() && complete {
            if let Ok(v) = reduce(&lits, span) {
                return Ok(p.atom(v, span));
            }
        } else if prefix && lits.len() >= 2 {
            if let Ok(v) = reduce(&lits, span) {
                let head = p.tree.span(args[0]).merge(p.tree.span(args[lits.len() - 1]));
                let folded = p.atom(v, head);
                args.splice(..lits.len(), [folded]);
            }
        }
    }
    p.finish(id, call, res)
}

fn eval_plain(
    p: &mut Prog<'_>,
    env: &dyn Env,
    id: ElId,
    call: &Call,
    reduce: fn(&[Val], Span) -> Result<Val, ExpError>,
) -> Result<Val, ExpError> {
    let span = p.tree.span(id);
    let vals: Vec<Val> = p.eval_args(env, call)?.into_iter().flatten().collect();
    reduce(&vals, span)
}

// ── Logic ────────────────────────────────────────────────────────

/// `and` and `or`: stop at the first argument that decides the result.
struct Logic {
    and: bool,
}

impl Logic {
    fn decides(&self, v: &Val) -> bool {
        v.is_zero() == self.and
    }
}

impl Operator for Logic {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        let span = p.tree.span(id);
        let mut kept = Vec::new();
        let mut unresolved = false;
        for &a in group(call, 0) {
            let r = match p.resolve(env, a, &Type::VOID) {
                Ok(r) => r,
                Err(e) => {
                    kept.push(p.residual(e)?);
                    unresolved = true;
                    continue;
                }
            };
            match p.lit_of(r) {
                Some(v) if self.decides(&v) => {
                    if kept.is_empty() {
                        return Ok(p.atom(Val::Bool(!self.and), span));
                    }
                    kept.push(r);
                    break;
                }
                Some(_) => {}
                None => kept.push(r),
            }
        }
        if kept.is_empty() {
            return Ok(p.atom(Val::Bool(self.and), span));
        }
        let res = Resolved {
            groups: vec![kept],
            unresolved,
        };
        p.finish(id, call, res)
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        _id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        for &a in group(call, 0) {
            let v = p.eval(env, a, &Type::VOID)?;
            if self.decides(&v) {
                return Ok(Val::Bool(!self.and));
            }
        }
        Ok(Val::Bool(self.and))
    }
}

struct Not;

impl Not {
    /// Argument of a `not` call element.
    fn negated(tree: &Tree, id: ElId) -> Option<ElId> {
        match &tree[id].kind {
            ElKind::Call(call) if call.spec.name() == "not" => arg(call, 0),
            _ => None,
        }
    }
}

impl Operator for Not {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        let span = p.tree.span(id);
        let a = arg(call, 0).ok_or(ExpError::MissingArg { param: "a".into() })?;
        let (r, ok) = match p.resolve(env, a, &Type::VOID) {
            Ok(r) => (r, true),
            Err(e) => (p.residual(e)?, false),
        };
        if let Some(v) = p.lit_of(r).filter(|_| ok) {
            return Ok(p.atom(Val::Bool(v.is_zero()), span));
        }
        // (not (not x)) is (ok x)
        if let (Some(inner), Some(truthy)) = (Not::negated(&p.tree, r), p.reg.spec("ok")) {
            let call = Call {
                spec: truthy,
                groups: vec![vec![inner]],
                typ: None,
            };
            let el = p.tree.alloc(ElKind::Call(call), span);
            return if ok {
                p.resolve(env, el, &Type::VOID)
            } else {
                Err(ExpError::Unresolved { el })
            };
        }
        let res = Resolved {
            groups: vec![vec![r]],
            unresolved: !ok,
        };
        p.finish(id, call, res)
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        _id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        let a = arg(call, 0).ok_or(ExpError::MissingArg { param: "a".into() })?;
        Ok(Val::Bool(p.eval(env, a, &Type::VOID)?.is_zero()))
    }
}

/// `ok`: truthiness of its argument.
struct Truthy;

impl Operator for Truthy {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        fold(p, env, id, call, false, |vals, _| {
            Ok(Val::Bool(vals.first().is_some_and(|v| !v.is_zero())))
        })
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        _id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        let a = arg(call, 0).ok_or(ExpError::MissingArg { param: "a".into() })?;
        Ok(Val::Bool(!p.eval(env, a, &Type::VOID)?.is_zero()))
    }
}

struct If;

impl Operator for If {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        let span = p.tree.span(id);
        let cond = arg(call, 0).ok_or(ExpError::MissingArg { param: "cond".into() })?;
        let (c, ok) = match p.resolve(env, cond, &Type::VOID) {
            Ok(c) => (c, true),
            Err(e) => (p.residual(e)?, false),
        };
        if let Some(v) = p.lit_of(c).filter(|_| ok) {
            let branch = if v.is_zero() { arg(call, 2) } else { arg(call, 1) };
            return match branch {
                Some(b) => {
                    let result = call.typ().result();
                    p.resolve(env, b, &result)
                }
                None => Ok(p.atom(Val::Null, span)),
            };
        }
        let mut res = Resolved {
            groups: vec![vec![c]],
            unresolved: !ok,
        };
        for i in 1..call.groups.len() {
            p.resolve_group(env, call, i, &mut res)?;
        }
        p.finish(id, call, res)
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        _id: ElId,
        call: &Call,
        hint: &Type,
    ) -> Result<Val, ExpError> {
        let cond = arg(call, 0).ok_or(ExpError::MissingArg { param: "cond".into() })?;
        let branch = if p.eval(env, cond, &Type::VOID)?.is_zero() {
            arg(call, 2)
        } else {
            arg(call, 1)
        };
        match branch {
            Some(b) => p.eval(env, b, hint),
            None => Ok(Val::Null),
        }
    }
}

/// `fail`: an evaluation error carrying its arguments as message.
struct Fail;

impl Operator for Fail {
    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        let span = p.tree.span(id);
        let mut msg = String::from("fail");
        for v in p.eval_args(env, call)?.into_iter().flatten() {
            msg.push(' ');
            match v {
                Val::Str(s) => msg.push_str(&s),
                v => msg.push_str(&v.to_string()),
            }
        }
        Err(ExpError::eval(msg, span))
    }
}

// ── Arithmetic and text ──────────────────────────────────────────

fn sum(vals: &[Val], span: Span) -> Result<Val, ExpError> {
    let mut acc = Val::Int(0);
    for v in vals {
        acc = match (&acc, v) {
            (Val::Int(a), Val::Int(b)) => a
                .checked_add(*b)
                .map(Val::Int)
                .ok_or_else(|| ExpError::eval("integer overflow", span))?,
            _ => match (acc.as_f64(), v.as_f64()) {
                (Some(a), Some(b)) => Val::Real(a + b),
                _ => return Err(ExpError::eval(format!("add expects numbers, got {}", v), span)),
            },
        };
    }
    Ok(acc)
}

fn concat(vals: &[Val], _span: Span) -> Result<Val, ExpError> {
    let mut out = String::new();
    for v in vals {
        match v {
            Val::Str(s) => out.push_str(s),
            v => out.push_str(&v.to_string()),
        }
    }
    Ok(Val::Str(out.into()))
}

struct Add;

impl Operator for Add {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        fold(p, env, id, call, true, sum)
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        eval_plain(p, env, id, call, sum)
    }
}

struct Cat;

impl Operator for Cat {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        fold(p, env, id, call, true, concat)
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        eval_plain(p, env, id, call, concat)
    }
}

// ── Containers ───────────────────────────────────────────────────

struct Append;

impl Operator for Append {
    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        let span = p.tree.span(id);
        let mut groups = p.eval_args(env, call)?.into_iter();
        let mut items = match groups.next().and_then(|g| g.into_iter().next()) {
            Some(Val::List(items)) => items,
            Some(v) => return Err(ExpError::eval(format!("append expects a list, got {}", v), span)),
            None => Vec::new(),
        };
        items.extend(groups.flatten());
        Ok(Val::List(items))
    }
}

struct Merge;

impl Operator for Merge {
    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        let span = p.tree.span(id);
        let mut out: Vec<(SmolStr, Val)> = Vec::new();
        for v in p.eval_args(env, call)?.into_iter().flatten() {
            let Val::Dict(pairs) = v else {
                return Err(ExpError::eval(format!("merge expects dicts, got {}", v), span));
            };
            for (k, v) in pairs {
                match out.iter_mut().find(|(name, _)| *name == k) {
                    Some(slot) => slot.1 = v,
                    None => out.push((k, v)),
                }
            }
        }
        Ok(Val::Dict(out))
    }
}

// ── Comparison ───────────────────────────────────────────────────

/// `eq`: all arguments equal. `lt`: arguments strictly increasing.
struct Compare {
    lt: bool,
}

fn all_equal(vals: &[Val], _span: Span) -> Result<Val, ExpError> {
    Ok(Val::Bool(vals.windows(2).all(|w| w[0].equal(&w[1]))))
}

fn increasing(vals: &[Val], span: Span) -> Result<Val, ExpError> {
    for w in vals.windows(2) {
        match w[0].less(&w[1]) {
            Some(true) => {}
            Some(false) => return Ok(Val::Bool(false)),
            None => {
                let msg = format!("cannot compare {} with {}", w[0], w[1]);
                return Err(ExpError::eval(msg, span));
            }
        }
    }
    Ok(Val::Bool(true))
}

impl Compare {
    fn reduce(&self) -> fn(&[Val], Span) -> Result<Val, ExpError> {
        if self.lt {
            increasing
        } else {
            all_equal
        }
    }
}

impl Operator for Compare {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        fold(p, env, id, call, false, self.reduce())
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        eval_plain(p, env, id, call, self.reduce())
    }
}

// ── Bindings ─────────────────────────────────────────────────────

/// `let`: declarations visible to later declarations and to the body.
struct Let;

impl Operator for Let {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        let span = p.tree.span(id);
        let mut scope = Scope::new(env);
        let mut decls = Vec::new();
        let mut unresolved = false;
        let mut literal = true;
        for &d in group(call, 0) {
            let (name, a) = decl_arg(&p.tree, d)?;
            let (r, def) = match p.resolve(&scope, a, &Type::VOID) {
                Ok(r) => {
                    let lit = p.lit_of(r);
                    literal &= lit.is_some();
                    let def = Def {
                        lit,
                        spec: p.spec_of(r),
                        ..Def::typed(p.type_of(r))
                    };
                    (r, def)
                }
                Err(e) => {
                    unresolved = true;
                    (p.residual(e)?, Def::pending())
                }
            };
            scope.define(name.clone(), def)?;
            decls.push(if r == a {
                d
            } else {
                let decl = Decl {
                    name,
                    args: vec![r],
                };
                p.tree.alloc(ElKind::Decl(decl), p.tree.span(d))
            });
        }

        let body = group(call, 1);
        let result = call.typ().result();
        let mut tail = Vec::with_capacity(body.len());
        for (i, &t) in body.iter().enumerate() {
            let hint = if i + 1 == body.len() { result.clone() } else { Type::VOID };
            match p.resolve(&scope, t, &hint) {
                Ok(r) => tail.push(r),
                Err(e) => {
                    tail.push(p.residual(e)?);
                    unresolved = true;
                }
            }
        }
        if literal && !unresolved {
            if let Some(v) = tail.last().and_then(|&last| p.lit_of(last)) {
                return Ok(p.atom(v, span));
            }
        }
        let res = Resolved {
            groups: vec![decls, tail],
            unresolved,
        };
        p.finish(id, call, res)
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        _id: ElId,
        call: &Call,
        hint: &Type,
    ) -> Result<Val, ExpError> {
        let mut scope = Scope::new(env);
        for &d in group(call, 0) {
            let (name, a) = decl_arg(&p.tree, d)?;
            let v = p.eval(&scope, a, &Type::VOID)?;
            scope.define(name, Def::lit(v))?;
        }
        let mut last = Val::Null;
        for &t in group(call, 1) {
            last = p.eval(&scope, t, hint)?;
        }
        Ok(last)
    }
}

/// `fn`: typed parameters and a body, resolved to a function literal.
///
/// The literal owns a copy of its body and the values of the free names
/// it uses. A body that uses names whose values are only known while
/// evaluating stays a `fn` call typed with the signature, and becomes a
/// literal when evaluated.
struct Lambda;

impl Operator for Lambda {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        let span = p.tree.span(id);
        let mut params = Vec::new();
        for &d in group(call, 0) {
            let (name, a) = decl_arg(&p.tree, d)?;
            let r = match p.resolve(env, a, &Type::VOID) {
                Ok(r) => r,
                Err(e) if e.is_unresolved() => return Err(ExpError::Unresolved { el: id }),
                Err(e) => return Err(e),
            };
            match p.lit_of(r) {
                Some(Val::Typ(t)) => params.push((name, t)),
                _ => {
                    let msg = format!("parameter `{}` needs a type", name);
                    return Err(ExpError::eval(msg, p.tree.span(a)));
                }
            }
        }

        let defs = params
            .iter()
            .map(|(n, t)| (n.clone(), Def::typed(t.clone())))
            .collect();
        let scope = ParamScope::new(env, defs);
        let mut body = Vec::new();
        let mut unresolved = false;
        for &t in group(call, 1) {
            match p.resolve(&scope, t, &Type::VOID) {
                Ok(r) => body.push(r),
                Err(e) => {
                    body.push(p.residual(e)?);
                    unresolved = true;
                }
            }
        }
        if unresolved {
            let res = Resolved {
                groups: vec![group(call, 0).to_vec(), body],
                unresolved,
            };
            return p.finish(id, call, res);
        }

        let result = body.last().map_or(Type::VOID, |&b| p.type_of(b));
        let mut sig: Vec<Param> = params
            .iter()
            .map(|(n, t)| Param::new(n.clone(), t.clone()))
            .collect();
        sig.push(Param::pos(result));
        let sig = Type::func("", sig);
        let names: Vec<SmolStr> = params.into_iter().map(|(n, _)| n).collect();

        let (tree, ids) = p.tree.extract(&body);
        let mut captured = Vec::new();
        let mut open = false;
        for name in free_names(&tree, &names) {
            match lookup(env, &name)? {
                Some(def) if def.is_known() => captured.push((name, def)),
                Some(_) => open = true,
                None => {}
            }
        }
        if open {
            debug!(sig = %sig, "fn waits for values");
            p.ctx
                .unify(&call.typ().result(), &sig)
                .map_err(|err| ExpError::Type { err, span })?;
            let res = Resolved {
                groups: vec![group(call, 0).to_vec(), body],
                unresolved: false,
            };
            return p.finish(id, call, res);
        }

        let closure = Closure {
            names,
            body: Arc::new(Body {
                tree,
                ids,
                ctx: p.ctx.clone(),
            }),
            captured,
        };
        let spec = Spec::new(sig, closure);
        Ok(p.atom(Val::Spec(Arc::new(spec)), span))
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        hint: &Type,
    ) -> Result<Val, ExpError> {
        let span = p.tree.span(id);
        let r = self.resolve(p, env, id, call, hint)?;
        p.lit_of(r).ok_or(ExpError::Unevaluable { span })
    }
}

/// Plain names used in `tree`, other than `bound`.
fn free_names(tree: &Tree, bound: &[SmolStr]) -> Vec<SmolStr> {
    let mut names: Vec<SmolStr> = Vec::new();
    for (_, el) in tree.els.iter() {
        let ElKind::Sym(sym) = &el.kind else {
            continue;
        };
        if Capability::of(&sym.name).is_none()
            && !bound.contains(&sym.name)
            && !names.contains(&sym.name)
        {
            names.push(sym.name.clone());
        }
    }
    names
}

/// Resolved body of a function literal.
struct Body {
    tree: Tree,
    ids: Vec<ElId>,
    ctx: Ctx,
}

/// A function literal.
struct Closure {
    names: Vec<SmolStr>,
    body: Arc<Body>,
    captured: Vec<(SmolStr, Def)>,
}

impl Operator for Closure {
    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        _id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        let vals = p.eval_args(env, call)?;
        let params = self
            .names
            .iter()
            .cloned()
            .zip(vals)
            .map(|(n, g)| (n, Def::lit(g.into_iter().next().unwrap_or(Val::Null))))
            .collect();

        let reg = p.reg;
        let mut captured = Scope::new(reg);
        for (name, def) in &self.captured {
            captured.define(name.clone(), def.clone())?;
        }
        let scope = ParamScope::new(&captured, params);
        let mut body = Prog {
            tree: self.body.tree.clone(),
            ctx: self.body.ctx.clone(),
            reg,
            partial: false,
        };
        let mut last = Val::Null;
        for &b in &self.body.ids {
            last = body.eval(&scope, b, &Type::VOID)?;
        }
        Ok(last)
    }
}

/// Call of a function value that is only known while evaluating. The
/// first argument group holds the function.
struct Apply;

pub(crate) fn apply_spec(func: &Type) -> Arc<Spec> {
    let mut params = vec![p("fn", func.clone())];
    params.extend(func.params().iter().cloned());
    Arc::new(Spec::new(Type::func("apply", params), Apply))
}

impl Operator for Apply {
    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        hint: &Type,
    ) -> Result<Val, ExpError> {
        let span = p.tree.span(id);
        let head = arg(call, 0).ok_or(ExpError::MissingArg { param: "fn".into() })?;
        let spec = match p.eval(env, head, &Type::VOID)? {
            Val::Spec(spec) => spec,
            v => return Err(ExpError::eval(format!("cannot call {}", v), span)),
        };
        let inner = Call {
            spec: spec.clone(),
            groups: call.groups.iter().skip(1).cloned().collect(),
            typ: None,
        };
        spec.imp.eval(p, env, id, &inner, hint)
    }
}

// ── Construction ─────────────────────────────────────────────────

/// `con`: the zero value of a type, a conversion, or a list built from
/// the arguments.
struct Con;

impl Con {
    fn target(p: &Prog<'_>, call: &Call) -> Option<Type> {
        match p.lit_of(arg(call, 0)?)? {
            Val::Typ(t) => Some(t),
            _ => None,
        }
    }
}

impl Operator for Con {
    fn resolve(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<ElId, ExpError> {
        let span = p.tree.span(id);
        let res = p.resolve_args(env, call)?;
        let next = p.finish(id, call, res)?;
        let ElKind::Call(resolved) = p.tree[next].kind.clone() else {
            return Ok(next);
        };
        let Some(t) = Con::target(p, &resolved) else {
            return Ok(next);
        };
        p.ctx
            .unify(&resolved.typ().result(), &t)
            .map_err(|err| ExpError::Type { err, span })?;
        let vals: Option<Vec<Val>> = group(&resolved, 1).iter().map(|&a| p.lit_of(a)).collect();
        match vals.map(|vals| construct(&t, &vals, span)) {
            Some(Ok(v)) => Ok(p.atom(v, span)),
            _ => Ok(next),
        }
    }

    fn eval(
        &self,
        p: &mut Prog<'_>,
        env: &dyn Env,
        id: ElId,
        call: &Call,
        _hint: &Type,
    ) -> Result<Val, ExpError> {
        let span = p.tree.span(id);
        let mut groups = p.eval_args(env, call)?.into_iter();
        let t = match groups.next().and_then(|g| g.into_iter().next()) {
            Some(Val::Typ(t)) => t,
            _ => return Err(ExpError::eval("con expects a type", span)),
        };
        let vals: Vec<Val> = groups.flatten().collect();
        construct(&t, &vals, span)
    }
}

fn construct(t: &Type, vals: &[Val], span: Span) -> Result<Val, ExpError> {
    match vals {
        [] => zero(t).ok_or_else(|| ExpError::eval(format!("no zero value for {}", t), span)),
        [v] => convert(t, v, span),
        many if t.kind.bare() == Kind::LIST => {
            let elem = t.elem().cloned().unwrap_or(Type::ANY);
            many.iter()
                .map(|v| convert(&elem, v, span))
                .collect::<Result<_, _>>()
                .map(Val::List)
        }
        _ => Err(ExpError::eval(format!("too many arguments to construct {}", t), span)),
    }
}

fn zero(t: &Type) -> Option<Val> {
    if t.is_opt() || t.is_any() {
        return Some(Val::Null);
    }
    let kind = t.kind.bare();
    Some(if kind == Kind::BOOL {
        Val::Bool(false)
    } else if kind == Kind::REAL {
        Val::Real(0.0)
    } else if kind.is_num() {
        Val::Int(0)
    } else if kind.is_char() {
        Val::Str(SmolStr::default())
    } else if kind.is_keyr() {
        Val::Dict(Vec::new())
    } else if kind.is_idxr() {
        Val::List(Vec::new())
    } else if kind == Kind::TYP {
        Val::Typ(Type::VOID)
    } else {
        return None;
    })
}

fn convert(t: &Type, v: &Val, span: Span) -> Result<Val, ExpError> {
    let fail = || ExpError::eval(format!("cannot convert {} to {}", v, t), span);
    if t.is_any() || (t.is_opt() && matches!(v, Val::Null)) {
        return Ok(v.clone());
    }
    let kind = t.kind.bare();
    if kind == Kind::BOOL {
        return Ok(Val::Bool(!v.is_zero()));
    }
    if kind == Kind::REAL {
        return match v {
            Val::Str(s) => s.trim().parse().map(Val::Real).map_err(|_| fail()),
            v => v.as_f64().map(Val::Real).ok_or_else(fail),
        };
    }
    if kind.is_num() {
        return match v {
            Val::Int(n) => Ok(Val::Int(*n)),
            Val::Real(n) => Ok(Val::Int(n.trunc() as i64)),
            Val::Bool(b) => Ok(Val::Int(*b as i64)),
            Val::Str(s) => s.trim().parse().map(Val::Int).map_err(|_| fail()),
            _ => Err(fail()),
        };
    }
    if kind.is_char() {
        return Ok(match v {
            Val::Str(s) => Val::Str(s.clone()),
            v => Val::Str(v.to_string().into()),
        });
    }
    if kind == Kind::TYP {
        return Ok(Val::Typ(v.typ()));
    }
    if kind.is_keyr() {
        return match v {
            Val::Dict(_) => Ok(v.clone()),
            _ => Err(fail()),
        };
    }
    if kind.is_idxr() {
        let Val::List(items) = v else {
            return Err(fail());
        };
        return match t.elem() {
            Some(elem) => items
                .iter()
                .map(|i| convert(elem, i, span))
                .collect::<Result<_, _>>()
                .map(Val::List),
            None => Ok(v.clone()),
        };
    }
    Err(fail())
}
