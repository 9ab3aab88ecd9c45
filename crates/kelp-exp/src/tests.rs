use super::*;
use kelp_types::{Param, Type};

fn run_in(env: &dyn Env, reg: &Registry, src: &str) -> Result<Val, ExpError> {
    let mut p = Prog::new(reg);
    let ids = read(&mut p.tree, src)?;
    p.run(env, ids[0], &Type::VOID)
}

fn run(src: &str) -> String {
    let reg = Registry::builtins();
    match run_in(&reg, &reg, src) {
        Ok(v) => v.to_string(),
        Err(e) => panic!("{}: {}", src, e),
    }
}

fn run_err(src: &str) -> String {
    let reg = Registry::builtins();
    match run_in(&reg, &reg, src) {
        Ok(v) => panic!("{}: expected an error, got {}", src, v),
        Err(e) => e.to_string(),
    }
}

/// Residual of a partial resolution that is expected to stay unresolved.
fn residual(p: &mut Prog<'_>, env: &dyn Env, src: &str) -> (ElId, String) {
    let ids = read(&mut p.tree, src).unwrap();
    let err = p.resolve(env, ids[0], &Type::VOID).unwrap_err();
    let el = err.unresolved_el().unwrap_or_else(|| panic!("{}: {}", src, err));
    (el, p.tree.display(el).to_string())
}

// ── Literals ─────────────────────────────────────────────────────

#[test]
fn literals_evaluate_to_themselves() {
    assert_eq!(run("42"), "42");
    assert_eq!(run("2.0"), "2.0");
    assert_eq!(run("[1 2.5]"), "[1 2.5]");
    assert_eq!(run("{a:true b:\"s\"}"), "{a:true b:\"s\"}");
    assert_eq!(run("list|int"), "list|int");
}

#[test]
fn literal_types() {
    let list = Val::List(vec![Val::Int(1), Val::Real(2.5)]);
    assert_eq!(list.typ().to_string(), "list|num");
    assert_eq!(Val::List(Vec::new()).typ().to_string(), "list");
    assert_eq!(Val::Null.typ().to_string(), "any?");
    let mixed = Val::Dict(vec![("a".into(), Val::Int(1)), ("b".into(), Val::Str("x".into()))]);
    assert_eq!(mixed.typ().to_string(), "dict|any");
}

#[test]
fn literal_comparison() {
    assert_eq!(Val::Int(1), Val::Real(1.0));
    assert_eq!(Val::Int(1).less(&Val::Real(1.5)), Some(true));
    assert_eq!(Val::Int(1).less(&Val::Str("a".into())), None);
    assert!(Val::Str("".into()).is_zero());
    assert!(!Val::List(vec![Val::Null]).is_zero());
}

// ── Logic ────────────────────────────────────────────────────────

#[test]
fn and_or_fold_literals() {
    assert_eq!(run("(and 1 2)"), "true");
    assert_eq!(run("(and 1 0)"), "false");
    assert_eq!(run("(or 0 \"\")"), "false");
    assert_eq!(run("(or 0 \"x\")"), "true");
    assert_eq!(run("(and)"), "true");
    assert_eq!(run("(or)"), "false");
}

#[test]
fn and_or_short_circuit() {
    assert_eq!(run("(and 0 (fail))"), "false");
    assert_eq!(run("(or 1 (fail))"), "true");
    insta::assert_snapshot!(run_err("(and 1 (fail \"boom\"))"), @"[7:20] fail boom");
}

#[test]
fn not_and_ok() {
    assert_eq!(run("(not 0)"), "true");
    assert_eq!(run("(not (not true))"), "true");
    assert_eq!(run("(ok [])"), "false");
}

#[test]
fn double_negation_becomes_ok() {
    let reg = Registry::builtins();
    let mut p = Prog::partial(&reg);
    let (_, shown) = residual(&mut p, &reg, "(not (not x))");
    assert_eq!(shown, "(ok x)");
}

#[test]
fn if_picks_a_branch() {
    assert_eq!(run("(if 1 \"a\" \"b\")"), "\"a\"");
    assert_eq!(run("(if \"\" \"a\" \"b\")"), "\"b\"");
    assert_eq!(run("(if 0 1)"), "null");
}

#[test]
fn if_joins_branch_types() {
    let reg = Registry::builtins();
    let mut scope = Scope::new(&reg);
    scope.define("x", Def::typed(Type::BOOL)).unwrap();
    let mut p = Prog::new(&reg);
    let ids = read(&mut p.tree, "(if x 1 2.5)").unwrap();
    let r = p.resolve(&scope, ids[0], &Type::VOID).unwrap();
    let t = p.type_of(r);
    assert_eq!(p.ctx.realize(&t).unwrap().to_string(), "num");
}

#[test]
fn calls_get_their_own_signature() {
    assert_eq!(run("(eq (if true 1 2) (if true \"a\" \"b\"))"), "false");
}

// ── Arithmetic, text and containers ──────────────────────────────

#[test]
fn add_and_cat() {
    assert_eq!(run("(add 1 2 3)"), "6");
    assert_eq!(run("(add 1 2.5)"), "3.5");
    assert_eq!(run("(cat \"a\" \"b\")"), "\"ab\"");
}

#[test]
fn add_rejects_mixed_types() {
    insta::assert_snapshot!(run_err("(add 1 \"a\")"), @"[7:10] cannot unify str with int: no common type");
}

#[test]
fn add_folds_literal_prefix() {
    let reg = Registry::builtins();
    let mut p = Prog::partial(&reg);
    let (_, shown) = residual(&mut p, &reg, "(add 1 2 x 4)");
    assert_eq!(shown, "(add 3 x 4)");
}

#[test]
fn dyn_dispatches_on_head_type() {
    assert_eq!(run("(1 2)"), "3");
    assert_eq!(run("(\"a\" \"b\")"), "\"ab\"");
    assert_eq!(run("([1] 2 3)"), "[1 2 3]");
    assert_eq!(run("({a:1} {b:2} {a:3})"), "{a:3 b:2}");
    assert_eq!(run("(true 0)"), "false");
}

#[test]
fn dyn_without_operator() {
    insta::assert_snapshot!(run_err("((fail) 1)"), @"[0:10] cannot dispatch on any");
}

#[test]
fn comparisons() {
    assert_eq!(run("(eq 1 1.0)"), "true");
    assert_eq!(run("(eq 1 2)"), "false");
    assert_eq!(run("(lt 1 2 3)"), "true");
    assert_eq!(run("(lt 2 1)"), "false");
    assert!(run_err("(lt 1 \"a\")").contains("cannot compare 1 with \"a\""));
}

#[test]
fn type_heads_construct_values() {
    assert_eq!(run("(int \"42\")"), "42");
    assert_eq!(run("(str 42)"), "\"42\"");
    assert_eq!(run("(bool 0)"), "false");
    assert_eq!(run("(real)"), "0.0");
    assert_eq!(run("(list|int 1 2.9)"), "[1 2]");
    insta::assert_snapshot!(run_err("(int \"x\")"), @r#"[0:9] cannot convert "x" to int"#);
}

// ── Bindings ─────────────────────────────────────────────────────

#[test]
fn let_binds_in_order() {
    assert_eq!(run("(let +x 1 +y (add x 1) + (add x y))"), "3");
    assert_eq!(run("(let +a +b 5 + (add a b))"), "10");
}

#[test]
fn let_rejects_redefinition() {
    insta::assert_snapshot!(run_err("(let +x 1 +x 2 + x)"), @"redefined symbol `x`");
}

#[test]
fn fn_literals_apply() {
    assert_eq!(run("((fn +x int + (add x 1)) 41)"), "42");
    assert_eq!(run("((fn +x +y int + (add $x $2)) 1 2)"), "3");
    assert_eq!(run("(fn +x int + x)"), "(func +x int int)");
}

#[test]
fn closures_use_their_defining_scope() {
    assert_eq!(run("(let +y 1 +f (fn +x int + (add x y)) + (let +y 100 + (f 1)))"), "2");
    assert_eq!(run("(let +y 1 +f (fn +x int + (add x y)) + (let +y \"s\" + (f 1)))"), "2");
}

#[test]
fn closures_capture_enclosing_parameters() {
    assert_eq!(run("(let +g ((fn +y int + (fn +x int + (add x y))) 5) + (g 1))"), "6");
    assert_eq!(
        run("((fn +y int + (let +h (fn +x int + (add x y)) + (let +y 7 + (h 1)))) 5)"),
        "6"
    );
}

#[test]
fn function_literals_outlive_their_program() {
    let reg = Registry::builtins();
    let f = run_in(&reg, &reg, "(fn +x int + (add x 1))").unwrap();
    let mut scope = Scope::new(&reg);
    scope.define("f", Def::lit(f)).unwrap();
    assert_eq!(run_in(&scope, &reg, "(f 41)").unwrap(), Val::Int(42));
    assert_eq!(run_in(&scope, &reg, "(let +x 5 + (f x))").unwrap(), Val::Int(6));
}

#[test]
fn fn_parameters_need_types() {
    insta::assert_snapshot!(run_err("(fn +x 1 + x)"), @"[7:8] parameter `x` needs a type");
}

// ── Partial resolution ───────────────────────────────────────────

#[test]
fn partial_residual_resumes() {
    let reg = Registry::builtins();
    let empty = Scope::new(&reg);
    let mut p = Prog::partial(&reg);
    let (el, shown) = residual(&mut p, &empty, "(and x)");
    assert_eq!(shown, "(and x)");

    let mut env = Scope::new(&reg);
    env.define("x", Def::lit(Val::Bool(true))).unwrap();
    let resumed = p.run(&env, el, &Type::VOID).unwrap();
    let fresh = run_in(&env, &reg, "(and x)").unwrap();
    assert_eq!(resumed, fresh);
    assert_eq!(resumed, Val::Bool(true));
}

#[test]
fn partial_keeps_resolved_work() {
    let reg = Registry::builtins();
    let mut p = Prog::partial(&reg);
    let (el, shown) = residual(&mut p, &reg, "(and 1 x 0 y)");
    assert_eq!(shown, "(and x 0)");

    let mut env = Scope::new(&reg);
    env.define("x", Def::lit(Val::Bool(true))).unwrap();
    assert_eq!(p.run(&env, el, &Type::VOID).unwrap(), Val::Bool(false));
}

#[test]
fn partial_let_leaves_pending_names_unresolved() {
    let reg = Registry::builtins();
    let mut p = Prog::partial(&reg);
    let (el, shown) = residual(&mut p, &reg, "(let +a x + (a 1 2))");
    assert_eq!(shown, "(let +a x (a 1 2))");

    let mut env = Scope::new(&reg);
    env.define("x", Def::lit(Val::Int(1))).unwrap();
    assert_eq!(p.run(&env, el, &Type::VOID).unwrap(), Val::Int(4));
}

#[test]
fn partial_let_does_not_fall_back_to_outer_names() {
    let reg = Registry::builtins();
    let mut outer = Scope::new(&reg);
    outer.define("a", Def::lit(Val::Int(100))).unwrap();
    let mut p = Prog::partial(&reg);
    let (_, shown) = residual(&mut p, &outer, "(let +a x + (add a 1))");
    assert_eq!(shown, "(let +a x (add a 1))");
}

#[test]
fn partial_fn_resumes() {
    let reg = Registry::builtins();
    let mut p = Prog::partial(&reg);
    let (el, shown) = residual(&mut p, &reg, "((fn +x int + (add x y)) 1)");
    assert_eq!(shown, "((fn +x int (add x y)) 1)");

    let mut env = Scope::new(&reg);
    env.define("y", Def::lit(Val::Int(2))).unwrap();
    assert_eq!(p.run(&env, el, &Type::VOID).unwrap(), Val::Int(3));
}

#[test]
fn partial_if_keeps_resolved_condition() {
    let reg = Registry::builtins();
    let mut p = Prog::partial(&reg);
    let (el, shown) = residual(&mut p, &reg, "(if (and 1 x) (add 1 2) 0)");
    assert_eq!(shown, "(if (and x) 3 0)");

    let mut env = Scope::new(&reg);
    env.define("x", Def::lit(Val::Bool(false))).unwrap();
    assert_eq!(p.run(&env, el, &Type::VOID).unwrap(), Val::Int(0));
}

#[test]
fn unresolved_reports_original_element() {
    let reg = Registry::builtins();
    let mut p = Prog::new(&reg);
    let ids = read(&mut p.tree, "(and (or x))").unwrap();
    let err = p.resolve(&reg, ids[0], &Type::VOID).unwrap_err();
    assert_eq!(err.unresolved_el(), Some(ids[0]));

    let err = p.eval(&reg, ids[0], &Type::VOID).unwrap_err();
    insta::assert_snapshot!(err, @"[0:12] cannot evaluate unresolved element");
}

#[test]
fn hint_is_checked() {
    let reg = Registry::builtins();
    let mut p = Prog::new(&reg);
    let ids = read(&mut p.tree, "(add 1 2)").unwrap();
    let err = p.resolve(&reg, ids[0], &Type::STR).unwrap_err();
    insta::assert_snapshot!(err, @"[0:9] cannot unify int with str: no common type");
}

#[test]
fn run_requires_a_known_type() {
    let err = run_err("([])");
    assert!(err.starts_with("[0:4] ambiguous type list|'"), "{}", err);
}

// ── Environments ─────────────────────────────────────────────────

#[test]
fn marked_names_need_a_supporting_scope() {
    insta::assert_snapshot!(run_err("$x"), @"no scope supports parameter names like `$x`");
}

#[test]
fn data_paths() {
    let reg = Registry::builtins();
    let data = Val::Dict(vec![
        ("a".into(), Val::Dict(vec![("b".into(), Val::Int(2))])),
        ("l".into(), Val::List(vec![Val::Int(1), Val::Int(7)])),
    ]);
    let root = DataScope::root(&reg, data);
    assert_eq!(run_in(&root, &reg, ".a.b").unwrap(), Val::Int(2));
    assert_eq!(run_in(&root, &reg, "/a.b").unwrap(), Val::Int(2));
    assert_eq!(run_in(&root, &reg, ".l.1").unwrap(), Val::Int(7));

    let child = DataScope::new(&root, Val::Dict(vec![("c".into(), Val::Int(3))]));
    assert_eq!(run_in(&child, &reg, "(add .c /a.b)").unwrap(), Val::Int(5));
    // relative paths stop at the nearest data scope
    assert!(run_in(&child, &reg, ".a.b").unwrap_err().is_unresolved());
}

#[test]
fn inner_scopes_shadow_outer() {
    let reg = Registry::builtins();
    let mut outer = Scope::new(&reg);
    outer.define("x", Def::lit(Val::Int(1))).unwrap();
    let mut inner = Scope::new(&outer);
    inner.define("x", Def::lit(Val::Int(2))).unwrap();
    assert_eq!(run_in(&inner, &reg, "x").unwrap(), Val::Int(2));
    assert_eq!(run_in(&inner, &reg, "(let +x 3 + x)").unwrap(), Val::Int(3));
}

#[test]
fn schema_references_resolve() {
    let mut reg = Registry::builtins();
    reg.add_schema("point", Type::parse("(obj \"point\" +x +y int)").unwrap());
    let shown = |src: &str| run_in(&reg, &reg, src).unwrap().to_string();
    assert_eq!(shown("~point"), "(obj \"point\" +x +y int)");
    assert_eq!(shown("list|~point"), "list|(obj \"point\" +x +y int)");
    assert_eq!(shown("(~point {x:1 y:2})"), "{x:1 y:2}");
    assert!(run_in(&reg, &reg, "~nope").unwrap_err().is_unresolved());
}

// ── Layout ───────────────────────────────────────────────────────

fn els(tree: &mut Tree, src: &str) -> Vec<ElId> {
    read(tree, src).unwrap()
}

#[test]
fn layout_groups_plain_and_tags() {
    let mut tree = Tree::new();
    let args = els(&mut tree, "a b :tag1 v");
    let params = [Param::new("plain", Type::LIST), Param::new("tags", Type::LIST)];
    let groups = layout(&mut tree, &params, &args).unwrap();
    assert_eq!(groups, vec![vec![args[0], args[1]], vec![args[2]]]);
    assert_eq!(tree.display(args[2]).to_string(), ":tag1 v");
    assert_eq!(layout(&mut tree, &params, &args).unwrap(), groups);
}

#[test]
fn layout_carries_naked_declarations_forward() {
    let mut tree = Tree::new();
    let args = els(&mut tree, "+a +b 1");
    let groups = layout(&mut tree, &[Param::new("unis", Type::LIST)], &args).unwrap();
    let shown: Vec<String> = groups[0].iter().map(|&d| tree.display(d).to_string()).collect();
    assert_eq!(shown, ["+a 1", "+b 1"]);
    assert_eq!(groups[0][1], args[1]);
    assert_eq!(tree.display(args[0]).to_string(), "+a");
}

#[test]
fn layout_skips_optional_explicit_at_tags() {
    let mut tree = Tree::new();
    let args = els(&mut tree, ":t 1");
    let params = [Param::new("x?", Type::INT), Param::new("tags", Type::LIST)];
    let groups = layout(&mut tree, &params, &args).unwrap();
    assert_eq!(groups, vec![vec![], vec![args[0]]]);
}

#[test]
fn layout_errors() {
    let explicit = [Param::new("x", Type::INT)];
    let unis = [Param::new("unis", Type::LIST)];
    let check = |params: &[Param], src: &str| {
        let mut tree = Tree::new();
        let args = els(&mut tree, src);
        layout(&mut tree, params, &args).unwrap_err().to_string()
    };
    insta::assert_snapshot!(check(&explicit, ""), @"missing argument for parameter `x`");
    insta::assert_snapshot!(check(&explicit, "1 2"), @"[2:3] unexpected tail element");
    insta::assert_snapshot!(check(&explicit, "1 :t"), @"[2:4] unexpected tag or declaration `:t`");
    insta::assert_snapshot!(check(&explicit, ":t 1"), @"[0:4] unexpected tag or declaration `:t`");
    insta::assert_snapshot!(check(&unis, "+a 1 2"), @"[0:6] declaration `a` needs exactly one argument");
    insta::assert_snapshot!(check(&unis, "+a"), @"[0:2] declaration `a` needs exactly one argument");
}

// ── Reader ───────────────────────────────────────────────────────

#[test]
fn reader_builds_elements() {
    let mut tree = Tree::new();
    let ids = els(&mut tree, "(obj \"p\" +x int) (and :flag +d 1 2 + x) [1 [2]]");
    let shown: Vec<String> = ids.iter().map(|&id| tree.display(id).to_string()).collect();
    assert_eq!(shown, ["(obj \"p\" +x int)", "(and :flag +d 1 2 + x)", "[1 [2]]"]);
    assert!(matches!(&tree[ids[0]].kind, ElKind::Atom(Val::Typ(_))));
}

#[test]
fn reader_errors() {
    let check = |src: &str| read(&mut Tree::new(), src).unwrap_err().to_string();
    insta::assert_snapshot!(check("[1 x]"), @"[3:4] expected a literal");
    insta::assert_snapshot!(check("(and 1"), @"[0:1] unclosed '('");
    insta::assert_snapshot!(check("{a:b}"), @"[2:4] expected a literal");
}
