use super::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn t(src: &str) -> Type {
    Type::parse(src).unwrap_or_else(|e| panic!("{}", e))
}

fn parse_err(src: &str) -> String {
    match Type::parse(src) {
        Ok(t) => panic!("expected parse error, got {}", t),
        Err(e) => e.to_string(),
    }
}

fn unify_ok(a: &str, b: &str) -> String {
    let mut ctx = Ctx::new();
    match ctx.unify(&t(a), &t(b)) {
        Ok(t) => t.to_string(),
        Err(e) => panic!("unexpected error: {}", e),
    }
}

fn unify_err(a: &str, b: &str) -> String {
    let mut ctx = Ctx::new();
    match ctx.unify(&t(a), &t(b)) {
        Ok(t) => panic!("expected unify error, got {}", t),
        Err(e) => e.to_string(),
    }
}

fn choose(src: &str) -> String {
    let mut ctx = Ctx::new();
    ctx.choose(&t(src)).unwrap().to_string()
}

// ── Notation ─────────────────────────────────────────────────────

#[test]
fn canonical_notation_round_trips() {
    let sources = [
        "int",
        "int?",
        "any?",
        "list|int",
        "dict?|list|str",
        "@node",
        "~point",
        "@1",
        "'2",
        "('1 num str)",
        "(alt int str)",
        "(obj \"point\" +x +y int)",
        "(obj \"node\" +name str +kids list|@2)",
        "(bits \"mode\" +read 1 +write 2)",
        "(enum \"dir\" +north 0 +south 1)",
        "(form \"and\" +plain? list bool)",
        "(func \"inc\" +x int int)",
        "list|(obj +a int)",
        "(obj)",
    ];
    for src in sources {
        assert_eq!(t(src).to_string(), src);
    }
}

#[test]
fn parse_rejects_malformed_input() {
    let msg = parse_err("list|");
    insta::assert_snapshot!(msg, @"invalid type `list|`: missing type");
    assert!(parse_err("unknown").contains("unknown type name"));
    assert!(parse_err("int|str").contains("only containers"));
    assert!(parse_err("(obj +x)").contains("parameter without type"));
    assert!(parse_err("(obj +x int").contains("unclosed"));
    assert!(parse_err("int str").contains("trailing input"));
    assert!(parse_err("'0").contains("positive"));
}

#[test]
fn parse_limits_container_depth() {
    let seven = format!("{}int", "list|".repeat(7));
    assert_eq!(t(&seven).kind.depth(), 7);
    let eight = format!("{}int", "list|".repeat(8));
    assert!(parse_err(&eight).contains("nesting too deep"));
}

#[test]
fn parse_builds_params_and_consts() {
    let point = t("(obj \"point\" +x +y int +label? str)");
    assert_eq!(point.ref_name(), "point");
    let names: Vec<_> = point.params().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["x", "y", "label?"]);
    assert!(point.field("LABEL").is_some_and(|p| p.is_opt()));

    let mode = t("(bits \"mode\" +read 1 +write 2)");
    assert_eq!(mode.consts()[1], Const::new("write", 2));

    let and = t("(form \"and\" +plain? list bool)");
    assert_eq!(and.args().len(), 1);
    assert_eq!(and.result(), Type::BOOL);
}

// ── Equality ─────────────────────────────────────────────────────

#[test]
fn optional_types_differ() {
    assert_ne!(t("int?"), t("int"));
    assert_eq!(t("int?").deopt(), t("int"));
    assert_ne!(t("list|int"), t("list|real"));
}

#[test]
fn self_reference_equals_unfolded_type() {
    let node = t("(obj \"node\" +kids list|@2)");
    let unfolded = Type::obj("node", vec![Param::new("kids", Type::list(node.clone()))]);
    assert_eq!(node, unfolded);
    assert_eq!(unfolded, node);
}

#[test]
fn alternatives_are_flat_and_deduplicated() {
    let alt = Type::alt([t("int"), t("(alt str int)"), t("real")]);
    assert_eq!(alt.to_string(), "(alt int str real)");
    assert_eq!(Type::alt([t("int"), t("int")]), t("int"));
}

// ── Compare ──────────────────────────────────────────────────────

#[test]
fn compare_table() {
    let pairs = [
        ("int", "num"),
        ("num", "int"),
        ("int", "real"),
        ("str", "int"),
        ("int", "any"),
        ("any", "int"),
        ("int", "int?"),
        ("int?", "int"),
        ("any", "int?"),
        ("'1", "int"),
        ("list|int", "list|num"),
        ("list", "list|int"),
        ("bool", "int"),
    ];
    let table = pairs
        .iter()
        .map(|(a, b)| format!("{} -> {}: {}", a, b, compare(&t(a), &t(b))))
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(table, @r"
    int -> num: equal|widen
    num -> int: check|narrow
    int -> real: conv|sibl
    str -> int: none
    int -> any: conv|any
    any -> int: check|any
    int -> int?: equal|wrap
    int? -> int: check|unwrap
    any -> int?: check|any
    '1 -> int: ref
    list|int -> list|num: equal|widen|elem
    list -> list|int: check|elem
    bool -> int: none
    ");
}

#[test]
fn objects_compare_by_key() {
    let c = compare(&t("(obj +x int +y str)"), &t("(obj +y str +x int)"));
    assert_eq!(c, Cmp::SAME);

    let c = compare(&t("(obj +x int +y str)"), &t("(obj +x int)"));
    assert_eq!(c.level(), Cmp::LVL_EQUAL);
    assert!(c.has(Cmp::WIDEN_BIT));

    let c = compare(&t("(obj +x int)"), &t("(obj +x int +z? int)"));
    assert!(c.is_compatible());

    let c = compare(&t("(obj +x int)"), &t("(obj +x int +z int)"));
    assert_eq!(c, Cmp::NONE);
}

#[test]
fn weaker_keeps_lowest_level() {
    assert_eq!(Cmp::SAME.weaker(Cmp::NARROW).level(), Cmp::LVL_CHECK);
    assert_eq!(Cmp::WIDEN.weaker(Cmp::NONE), Cmp::NONE);
    assert!(Cmp::WIDEN.weaker(Cmp::CONV_SIBL).has(Cmp::SIBL | Cmp::WIDEN_BIT));
}

// ── Unify ────────────────────────────────────────────────────────

#[test]
fn unify_primitives() {
    assert_eq!(unify_ok("int", "real"), "num");
    assert_eq!(unify_ok("int", "span"), "int");
    assert_eq!(unify_ok("enum", "str"), "str");
    assert_eq!(unify_ok("int?", "real"), "num?");
    assert_eq!(unify_ok("any", "list|int"), "list|int");
    let msg = unify_err("str", "int");
    insta::assert_snapshot!(msg, @"cannot unify str with int: no common type");
}

#[test]
fn unify_containers() {
    assert_eq!(unify_ok("list|int", "list|real"), "list|num");
    assert_eq!(unify_ok("list", "list|int"), "list|int");
    assert_eq!(unify_ok("list|int", "idxr|span"), "idxr|int");
    assert!(unify_err("list|int", "dict|int").contains("no common type"));
    assert_eq!(unify_ok("(obj +x int +y str)", "(obj +x real)"), "(obj +x num)");
}

#[test]
fn unify_binds_variables() {
    let mut ctx = Ctx::new();
    let v = ctx.new_var();
    assert_eq!(v.to_string(), "'1");
    assert_eq!(ctx.unify(&v, &Type::INT).unwrap(), Type::INT);
    assert_eq!(ctx.apply(&v), Type::INT);
    assert_eq!(ctx.apply(&Type::list(v)).to_string(), "list|int");
}

#[test]
fn unify_rebinds_to_alternative() {
    let mut ctx = Ctx::new();
    let v = ctx.new_var();
    ctx.unify(&v, &Type::INT).unwrap();
    let res = ctx.unify(&v, &Type::REAL).unwrap();
    assert_eq!(res.to_string(), "num");
    assert_eq!(ctx.apply(&v).to_string(), "(alt int num)");
    assert_eq!(ctx.choose(&v).unwrap().to_string(), "num");
}

#[test]
fn unify_is_stable_on_rebound_variables() {
    let mut ctx = Ctx::new();
    let v = ctx.new_var();
    ctx.unify(&v, &Type::INT).unwrap();
    let first = ctx.unify(&v, &Type::REAL).unwrap();
    let bound = ctx.apply(&v);
    assert_eq!(ctx.unify(&v, &Type::REAL).unwrap(), first);
    assert_eq!(ctx.unify(&v, &Type::INT).unwrap(), first);
    assert_eq!(ctx.apply(&v), bound);
    assert_eq!(ctx.unify(&first, &Type::REAL).unwrap(), first);
}

#[test]
fn unify_merges_variables() {
    let mut ctx = Ctx::new();
    let a = ctx.new_var();
    let b = ctx.new_var();
    ctx.unify(&a, &b).unwrap();
    ctx.unify(&b, &Type::STR).unwrap();
    assert_eq!(ctx.apply(&a), Type::STR);
}

#[test]
fn unify_checks_constraints() {
    let mut ctx = Ctx::new();
    let v = ctx.new_var_with(vec![Type::NUM]);
    let msg = ctx.unify(&v, &Type::STR).unwrap_err().to_string();
    insta::assert_snapshot!(msg, @"str does not satisfy the constraints of ('1 num)");
    assert_eq!(ctx.unify(&v, &Type::INT).unwrap(), Type::INT);
}

#[test]
fn unify_rejects_recursive_binding() {
    let mut ctx = Ctx::new();
    let v = ctx.new_var();
    let msg = ctx.unify(&v, &Type::list(v.clone())).unwrap_err().to_string();
    insta::assert_snapshot!(msg, @"recursive type: '1 occurs in list|'1");
}

#[test]
fn bind_requires_a_variable() {
    let mut ctx = Ctx::new();
    let err = ctx.bind(&Type::INT, Type::STR).unwrap_err();
    assert_eq!(err, TypeError::NotAVar(Type::INT));
}

#[test]
fn unify_leaves_references_unresolved() {
    let msg = unify_err("@point", "int");
    insta::assert_snapshot!(msg, @"unresolved type reference @point");
}

// ── Choose ───────────────────────────────────────────────────────

#[test]
fn choose_joins_alternatives() {
    assert_eq!(choose("(alt int real)"), "num");
    assert_eq!(choose("(alt int span)"), "int");
    assert_eq!(choose("(alt str int)"), "any");
    assert_eq!(choose("(alt list|int list|real)"), "list|num");
    assert_eq!(choose("list|(alt int real)"), "list|num");
    assert_eq!(choose("(alt int? real)"), "num?");
}

#[test]
fn choose_poisons_regardless_of_order() {
    assert_eq!(choose("(alt str int real)"), "any");
    assert_eq!(choose("(alt int real str)"), "any");
}

// ── Context ──────────────────────────────────────────────────────

#[test]
fn instantiate_replaces_free_variables() {
    let mut ctx = Ctx::new();
    ctx.new_var();
    ctx.new_var();
    let add = t("(form \"add\" +plain list|('1 num) '1)");
    let inst = ctx.instantiate(&add);
    assert_eq!(inst.to_string(), "(form \"add\" +plain list|('3 num) '3)");
}

#[test]
fn instantiate_keeps_bound_variables() {
    let mut ctx = Ctx::new();
    let v = ctx.new_var();
    ctx.unify(&v, &Type::INT).unwrap();
    assert_eq!(ctx.instantiate(&Type::list(v)).to_string(), "list|int");
}

#[test]
fn generic_instantiation_ignores_bindings() {
    let mut ctx = Ctx::new();
    let v = ctx.new_var();
    ctx.unify(&v, &Type::INT).unwrap();
    let append = t("(form \"append\" +a list|'1 list|'1)");
    assert_eq!(
        ctx.instantiate_generic(&append).to_string(),
        "(form \"append\" +a list|'2 list|'2)"
    );
}

#[test]
fn free_and_bound_sets() {
    let mut ctx = Ctx::new();
    let a = ctx.new_var();
    let b = ctx.new_var();
    ctx.bind(&a, Type::INT).unwrap();
    let pair = Type::obj("", vec![Param::new("a", a), Param::new("b", b)]);

    let mut free = BTreeSet::new();
    ctx.free(&pair, &mut free);
    assert_eq!(free.into_iter().collect::<Vec<_>>(), [2]);

    let mut bound = BTreeSet::new();
    ctx.bound(&pair, &mut bound);
    assert_eq!(bound.into_iter().collect::<Vec<_>>(), [1]);
}

#[test]
fn realize_requires_ground_types() {
    let mut ctx = Ctx::new();
    let a = ctx.new_var();
    let b = ctx.new_var();
    ctx.unify(&a, &Type::alt([Type::INT, Type::REAL])).unwrap();
    assert_eq!(ctx.realize(&Type::list(a)).unwrap().to_string(), "list|num");
    let msg = ctx.realize(&Type::list(b)).unwrap_err().to_string();
    insta::assert_snapshot!(msg, @"ambiguous type list|'2: free type variables remain");
}

// ── Properties ───────────────────────────────────────────────────

fn leaf() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::ANY),
        Just(Type::BOOL),
        Just(Type::NUM),
        Just(Type::INT),
        Just(Type::REAL),
        Just(Type::BITS),
        Just(Type::SPAN),
        Just(Type::CHAR),
        Just(Type::STR),
        Just(Type::RAW),
        Just(Type::ENUM),
    ]
    .prop_flat_map(|t| prop_oneof![Just(t.clone()), Just(t.opt())])
}

fn arb_type() -> BoxedStrategy<Type> {
    let base = prop_oneof![
        4 => leaf(),
        1 => (1u32..4).prop_map(|id| Type::var(id, Vec::new())),
        1 => "[a-z]{1,4}".prop_map(|name| Type::reference(name)),
    ];
    nest(base.boxed())
}

/// Types without variables or references.
fn ground_type() -> BoxedStrategy<Type> {
    nest(leaf().boxed())
}

fn nest(base: BoxedStrategy<Type>) -> BoxedStrategy<Type> {
    base.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(Type::list),
            inner.clone().prop_map(Type::dict),
            inner.clone().prop_map(|t| t.opt()),
            prop::collection::vec(("[a-z]{1,3}", inner.clone()), 0..3).prop_map(|fields| {
                let params = fields.into_iter().map(|(n, t)| Param::new(n, t)).collect();
                Type::obj("", params)
            }),
            (inner.clone(), inner).prop_map(|(a, b)| Type::alt([a, b])),
        ]
    })
    .boxed()
}

proptest! {
    #[test]
    fn format_then_parse_is_identity(typ in arb_type()) {
        let text = typ.to_string();
        let back = Type::parse(&text);
        prop_assert_eq!(back, Ok(typ), "notation: {}", text);
    }

    #[test]
    fn compare_with_itself_is_same(typ in arb_type()) {
        prop_assert_eq!(compare(&typ, &typ), Cmp::SAME);
    }

    #[test]
    fn any_compares_against_everything(typ in ground_type()) {
        prop_assume!(!typ.is_any() && !typ.kind.is_ctx());
        prop_assert_eq!(compare(&typ, &Type::ANY), Cmp::CONV_ANY);
        prop_assert_eq!(compare(&Type::ANY, &typ), Cmp::CHECK_ANY);
        prop_assert_eq!(compare(&typ, &Type::ANY.opt()), Cmp::CONV_ANY);
    }

    #[test]
    fn unify_is_idempotent(a in ground_type(), b in ground_type()) {
        let mut ctx = Ctx::new();
        if let Ok(joined) = ctx.unify(&a, &b) {
            let again = ctx.unify(&joined, &b);
            prop_assert_eq!(again, Ok(joined.clone()), "{} with {}", a, b);
            prop_assert_eq!(ctx.unify(&joined, &joined), Ok(joined));
        }
    }

    #[test]
    fn choose_ignores_candidate_order(cands in prop::collection::vec(leaf(), 1..5)) {
        let fwd = Ctx::new().choose(&Type::alt(cands.clone()));
        let rev = Ctx::new().choose(&Type::alt(cands.into_iter().rev()));
        prop_assert_eq!(fwd, rev);
    }

    #[test]
    fn unify_of_leaves_is_commutative(a in leaf(), b in leaf()) {
        let ab = Ctx::new().unify(&a, &b).ok();
        let ba = Ctx::new().unify(&b, &a).ok();
        prop_assert_eq!(ab, ba);
    }
}
