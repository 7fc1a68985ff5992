//! End-to-end scenarios: a program is transformed, then both versions
//! run on the reference interpreter.

use ivmc_core::ir::{AggrOp, Clause, Expr, FnDef, Program, QueryNode, SetOp, Stmt};
use ivmc_core::{Error, Mask, Type};
use ivmc_incremental::{transform_program, Config, Ctx, QuerySym, Strategy, SymbolTable};
use ivmc_runtime::{Interpreter, Val};

fn pair(a: i64, b: i64) -> Val {
    Val::tuple([Val::int(a), Val::int(b)])
}

fn relation_funcs(program: &mut Program, rel: &str) {
    program.declare_relation(rel, false);
    program.add_func(FnDef::new(
        format!("add_{}", rel),
        vec!["e".into()],
        vec![Stmt::rel_update(rel, SetOp::Add, "e")],
    ));
    program.add_func(FnDef::new(
        format!("remove_{}", rel),
        vec!["e".into()],
        vec![Stmt::rel_update(rel, SetOp::Remove, "e")],
    ));
}

/// Program over binary relation `R` whose `query` function returns `sym`.
fn build(sym: QuerySym, config: Config) -> (Program, Program) {
    let mut program = Program::new(vec![]);
    relation_funcs(&mut program, "R");
    program.add_func(FnDef::new(
        "query",
        sym.params.clone(),
        vec![Stmt::Return(Expr::query(sym.name.as_str(), sym.node.clone()))],
    ));

    let mut symtab = SymbolTable::new();
    symtab
        .define_relation("R", Type::relation_of_arity(2), false)
        .unwrap();
    symtab.define_query(sym).unwrap();
    let mut ctx = Ctx::new(symtab, config);
    let transformed = transform_program(program.clone(), &mut ctx).unwrap();
    (program, transformed)
}

fn succ() -> QueryNode {
    QueryNode::comp(
        Expr::tuplify(&["y"], false),
        vec![Clause::rel_member(&["x", "y"], "R")],
    )
}

#[test]
fn test_projection_keeps_derivation_counts() {
    let node = QueryNode::comp(Expr::name("y"), vec![Clause::rel_member(&["x", "y"], "R")]);
    let sym = QuerySym::new("Q", node).with_strategy(Strategy::Incremental);
    let (_, transformed) = build(sym, Config::default());
    let mut interp = Interpreter::new(&transformed);

    interp.call("add_R", vec![pair(1, 3)]).unwrap();
    interp.call("add_R", vec![pair(2, 3)]).unwrap();
    assert_eq!(interp.relation_counts("R_Q"), Some(vec![(Val::int(3), 2)]));

    interp.call("remove_R", vec![pair(1, 3)]).unwrap();
    assert_eq!(interp.relation_counts("R_Q"), Some(vec![(Val::int(3), 1)]));

    let out = interp.call("query", vec![]).unwrap();
    assert_eq!(out.sorted_elements(), Some(vec![Val::int(3)]));

    interp.call("remove_R", vec![pair(2, 3)]).unwrap();
    assert_eq!(interp.relation("R_Q"), Some(vec![]));
}

#[test]
fn test_parameterized_lookup_through_auxmap() {
    let sym = QuerySym::new("Q", succ())
        .with_params(&["x"])
        .with_strategy(Strategy::Incremental);
    let (_, transformed) = build(sym, Config::default());
    let mut interp = Interpreter::new(&transformed);

    for (a, b) in [(1, 2), (1, 3), (2, 3)] {
        interp.call("add_R", vec![pair(a, b)]).unwrap();
    }
    let out = interp.call("query", vec![Val::int(1)]).unwrap();
    assert_eq!(
        out.sorted_elements(),
        Some(vec![Val::tuple([Val::int(2)]), Val::tuple([Val::int(3)])])
    );
    let none = interp.call("query", vec![Val::int(7)]).unwrap();
    assert_eq!(none.sorted_elements(), Some(vec![]));

    // Emptied images leave the auxiliary map.
    interp.call("remove_R", vec![pair(2, 3)]).unwrap();
    let keys: Vec<Val> = interp
        .map_entries("R_Q_bu")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec![Val::int(1)]);
}

#[test]
fn test_set_from_map_follows_assignments() {
    let mut program = Program::new(vec![]);
    program.declare_map("M");
    program.add_func(FnDef::new(
        "set",
        vec!["k".into(), "v".into()],
        vec![Stmt::map_assign("M", Expr::name("k"), Expr::name("v"))],
    ));
    program.add_func(FnDef::new(
        "unset",
        vec!["k".into()],
        vec![Stmt::map_delete("M", Expr::name("k"))],
    ));
    program.add_func(FnDef::new(
        "snapshot",
        vec![],
        vec![Stmt::Return(Expr::set_from_map(Expr::name("M"), Mask::mapmask(1)))],
    ));

    let mut symtab = SymbolTable::new();
    symtab
        .define_map("M", Type::map(Type::tuple([Type::Number]), Type::String))
        .unwrap();
    let mut ctx = Ctx::new(symtab, Config::default());
    let transformed = transform_program(program.clone(), &mut ctx).unwrap();
    assert!(transformed.has_global("SM"));

    let mut original = Interpreter::new(&program);
    let mut interp = Interpreter::new(&transformed);
    let key = |i| Val::tuple([Val::int(i)]);
    for machine in [&mut original, &mut interp] {
        machine.call("set", vec![key(1), Val::str("a")]).unwrap();
        machine.call("set", vec![key(2), Val::str("b")]).unwrap();
        machine.call("unset", vec![key(1)]).unwrap();
    }
    let expected = original.call("snapshot", vec![]).unwrap().sorted_elements();
    let actual = interp.call("snapshot", vec![]).unwrap().sorted_elements();
    assert_eq!(actual, expected);
    assert_eq!(actual, Some(vec![Val::tuple([Val::int(2), Val::str("b")])]));
}

#[test]
fn test_demanded_count_without_parameters() {
    let node = QueryNode::aggr(AggrOp::Count, Expr::name("R"));
    let sym = QuerySym::new("C", node)
        .with_demand()
        .with_strategy(Strategy::Incremental);
    let (_, transformed) = build(sym, Config::default());
    let mut interp = Interpreter::new(&transformed);

    interp.call("add_R", vec![pair(1, 2)]).unwrap();
    interp.call("add_R", vec![pair(3, 4)]).unwrap();
    // Nothing is maintained before the first demand.
    assert_eq!(interp.map_entries("R_C"), Some(vec![]));

    assert_eq!(interp.call("query", vec![]).unwrap(), Val::int(2));
    assert_eq!(
        interp.map_entries("R_C"),
        Some(vec![(Val::Tuple(vec![]), Val::int(2))])
    );

    interp.call("add_R", vec![pair(5, 6)]).unwrap();
    interp.call("remove_R", vec![pair(1, 2)]).unwrap();
    interp.call("remove_R", vec![pair(3, 4)]).unwrap();
    assert_eq!(interp.call("query", vec![]).unwrap(), Val::int(1));
}

#[test]
fn test_bounded_demand_set_evicts_oldest() {
    let sym = QuerySym::new("Q", succ())
        .with_params(&["x"])
        .with_demand()
        .with_demand_set_maxsize(2)
        .with_strategy(Strategy::Incremental);
    let (_, transformed) = build(sym, Config::default());
    let mut interp = Interpreter::new(&transformed);

    for (a, b) in [(1, 10), (2, 20), (3, 30)] {
        interp.call("add_R", vec![pair(a, b)]).unwrap();
    }
    for x in [1, 2, 3] {
        let out = interp.call("query", vec![Val::int(x)]).unwrap();
        assert_eq!(out.sorted_elements(), Some(vec![Val::tuple([Val::int(x * 10)])]));
    }

    let demanded = Some(vec![Val::tuple([Val::int(2)]), Val::tuple([Val::int(3)])]);
    assert_eq!(interp.relation("_U_Q"), demanded);
    assert_eq!(
        interp.relation("R_Q"),
        Some(vec![pair(2, 20), pair(3, 30)])
    );

    // An evicted key is recomputed on its next demand.
    interp.call("add_R", vec![pair(1, 11)]).unwrap();
    let out = interp.call("query", vec![Val::int(1)]).unwrap();
    assert_eq!(
        out.sorted_elements(),
        Some(vec![Val::tuple([Val::int(10)]), Val::tuple([Val::int(11)])])
    );
}

#[test]
fn test_filtered_two_hop_matches_scratch() {
    let node = QueryNode::comp(
        Expr::tuplify(&["z"], false),
        vec![
            Clause::rel_member(&["x", "y"], "R"),
            Clause::rel_member(&["y", "z"], "R"),
        ],
    );
    let sym = QuerySym::new("Q", node)
        .with_params(&["x"])
        .with_demand()
        .with_strategy(Strategy::Filtered);
    let (program, transformed) = build(sym, Config::default());
    let mut original = Interpreter::new(&program);
    let mut interp = Interpreter::new(&transformed);

    let mut step = |func: &str, e: Val| {
        original.call(func, vec![e.clone()]).unwrap();
        interp.call(func, vec![e]).unwrap();
    };
    step("add_R", pair(1, 2));
    step("add_R", pair(2, 3));
    step("add_R", pair(2, 2));

    let expected = original.call("query", vec![Val::int(1)]).unwrap();
    let actual = interp.call("query", vec![Val::int(1)]).unwrap();
    assert_eq!(actual.sorted_elements(), expected.sorted_elements());
    assert_eq!(
        actual.sorted_elements(),
        Some(vec![Val::tuple([Val::int(2)]), Val::tuple([Val::int(3)])])
    );

    // Updates after the demand reach the filtered result.
    original.call("remove_R", vec![pair(2, 2)]).unwrap();
    interp.call("remove_R", vec![pair(2, 2)]).unwrap();
    original.call("add_R", vec![pair(2, 4)]).unwrap();
    interp.call("add_R", vec![pair(2, 4)]).unwrap();
    let expected = original.call("query", vec![Val::int(1)]).unwrap();
    let actual = interp.call("query", vec![Val::int(1)]).unwrap();
    assert_eq!(actual.sorted_elements(), expected.sorted_elements());
}

#[test]
fn test_filtered_query_with_repeated_variable() {
    let node = QueryNode::comp(
        Expr::tuplify(&["z"], false),
        vec![
            Clause::rel_member(&["x", "x"], "R"),
            Clause::rel_member(&["x", "z"], "R"),
        ],
    );
    let sym = QuerySym::new("Q", node)
        .with_params(&["x"])
        .with_demand()
        .with_strategy(Strategy::Filtered);
    let (program, transformed) = build(sym, Config::default());
    let mut original = Interpreter::new(&program);
    let mut interp = Interpreter::new(&transformed);

    for (func, a, b) in [("add_R", 1, 1), ("add_R", 1, 5), ("add_R", 2, 6), ("add_R", 2, 2)] {
        original.call(func, vec![pair(a, b)]).unwrap();
        interp.call(func, vec![pair(a, b)]).unwrap();
    }
    for x in [1, 2, 3] {
        let expected = original.call("query", vec![Val::int(x)]).unwrap();
        let actual = interp.call("query", vec![Val::int(x)]).unwrap();
        assert_eq!(actual.sorted_elements(), expected.sorted_elements(), "x = {}", x);
    }
    original.call("remove_R", vec![pair(1, 1)]).unwrap();
    interp.call("remove_R", vec![pair(1, 1)]).unwrap();
    let actual = interp.call("query", vec![Val::int(1)]).unwrap();
    assert_eq!(actual.sorted_elements(), Some(vec![]));
}

/// Like [`build`], with `inner` only reachable through `outer`.
fn build_nested(inner: QuerySym, outer: QuerySym) -> (Program, Program) {
    let mut program = Program::new(vec![]);
    relation_funcs(&mut program, "R");
    program.add_func(FnDef::new(
        "query",
        outer.params.clone(),
        vec![Stmt::Return(Expr::query(outer.name.as_str(), outer.node.clone()))],
    ));

    let mut symtab = SymbolTable::new();
    symtab
        .define_relation("R", Type::relation_of_arity(2), false)
        .unwrap();
    symtab.define_query(inner).unwrap();
    symtab.define_query(outer).unwrap();
    let mut ctx = Ctx::new(symtab, Config::default());
    let transformed = transform_program(program.clone(), &mut ctx).unwrap();
    (program, transformed)
}

fn succ_of_y() -> QuerySym {
    let node = QueryNode::comp(
        Expr::tuplify(&["z"], false),
        vec![Clause::rel_member(&["y", "z"], "R")],
    );
    QuerySym::new("Q", node)
        .with_params(&["y"])
        .with_demand()
        .with_strategy(Strategy::Incremental)
}

#[test]
fn test_nested_query_follows_demand_of_its_context() {
    let inner = succ_of_y();
    let outer = QuerySym::new(
        "P",
        QueryNode::comp(
            Expr::tuplify(&["x", "z"], false),
            vec![
                Clause::rel_member(&["x", "y"], "R"),
                Clause::vars_member(&["z"], Expr::query("Q", inner.node.clone())),
            ],
        ),
    )
    .with_strategy(Strategy::Incremental);
    let (program, transformed) = build_nested(inner, outer);
    assert!(transformed.has_global("R__QU_Q"));
    assert!(transformed.func("_demand_Q").is_none());

    let mut original = Interpreter::new(&program);
    let mut interp = Interpreter::new(&transformed);
    let steps = [
        ("add_R", 1, 2),
        ("add_R", 2, 3),
        ("add_R", 2, 4),
        ("add_R", 3, 1),
        ("remove_R", 2, 3),
        ("add_R", 1, 3),
        ("remove_R", 1, 2),
    ];
    for (func, a, b) in steps {
        original.call(func, vec![pair(a, b)]).unwrap();
        interp.call(func, vec![pair(a, b)]).unwrap();
        let expected = original.call("query", vec![]).unwrap();
        let actual = interp.call("query", vec![]).unwrap();
        assert_eq!(
            actual.sorted_elements(),
            expected.sorted_elements(),
            "after {}({}, {})",
            func,
            a,
            b
        );
    }
}

#[test]
fn test_aggregate_passes_demand_to_its_operand() {
    let inner = succ_of_y();
    let outer = QuerySym::new("A", QueryNode::aggr(AggrOp::Count, Expr::query("Q", inner.node.clone())))
        .with_params(&["y"])
        .with_strategy(Strategy::Incremental);
    let (program, transformed) = build_nested(inner, outer);
    assert!(transformed.func("_demand_A").is_some());
    assert!(transformed.has_global("R__QU_Q"));

    let mut original = Interpreter::new(&program);
    let mut interp = Interpreter::new(&transformed);
    for (func, a, b) in [("add_R", 1, 2), ("add_R", 1, 3), ("add_R", 2, 3)] {
        original.call(func, vec![pair(a, b)]).unwrap();
        interp.call(func, vec![pair(a, b)]).unwrap();
    }
    for y in [1, 2, 5] {
        let expected = original.call("query", vec![Val::int(y)]).unwrap();
        assert_eq!(interp.call("query", vec![Val::int(y)]).unwrap(), expected, "y = {}", y);
    }
    // Demanded counts keep up with later updates.
    for (func, a, b) in [("remove_R", 1, 2), ("add_R", 2, 7), ("add_R", 5, 1)] {
        original.call(func, vec![pair(a, b)]).unwrap();
        interp.call(func, vec![pair(a, b)]).unwrap();
    }
    for y in [1, 2, 5] {
        let expected = original.call("query", vec![Val::int(y)]).unwrap();
        assert_eq!(interp.call("query", vec![Val::int(y)]).unwrap(), expected, "y = {}", y);
    }
}

#[test]
fn test_aux_only_recomputes_on_each_read() {
    let sym = QuerySym::new("Q", succ())
        .with_params(&["x"])
        .with_strategy(Strategy::AuxOnly);
    let (program, transformed) = build(sym, Config::default());
    assert!(transformed.func("_compute_Q").is_some());
    assert!(!transformed.has_global("R_Q"));

    let mut original = Interpreter::new(&program);
    let mut interp = Interpreter::new(&transformed);
    for machine in [&mut original, &mut interp] {
        machine.call("add_R", vec![pair(4, 5)]).unwrap();
        machine.call("add_R", vec![pair(4, 6)]).unwrap();
    }
    let expected = original.call("query", vec![Val::int(4)]).unwrap();
    let actual = interp.call("query", vec![Val::int(4)]).unwrap();
    assert_eq!(actual.sorted_elements(), expected.sorted_elements());
}

#[test]
fn test_violated_precondition_is_a_runtime_error() {
    let sym = QuerySym::new("Q", succ())
        .with_params(&["x"])
        .with_strategy(Strategy::Incremental);
    let (_, transformed) = build(sym, Config::default());
    let mut interp = Interpreter::new(&transformed);
    interp.call("add_R", vec![pair(1, 2)]).unwrap();
    let err = interp.call("add_R", vec![pair(1, 2)]).unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }), "{}", err);
}
