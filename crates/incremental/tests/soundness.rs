//! Property-based tests: after any sequence of updates, a transformed
//! program answers every query exactly as from-scratch evaluation does.

use ivmc_core::ir::{AggrOp, Clause, CmpOp, Expr, FnDef, Program, QueryNode, SetOp, Stmt};
use ivmc_core::{Mask, Type};
use ivmc_incremental::{transform_program, Config, Ctx, QuerySym, Strategy, SymbolTable};
use ivmc_runtime::{Interpreter, Val};
use proptest::prelude::*;
use proptest::strategy::Strategy as _;
use std::collections::BTreeSet;

const DOMAIN: i64 = 4;

#[derive(Clone, Debug)]
enum Op {
    /// Adds the edge to relation `rel` when absent, removes it otherwise.
    Toggle(usize, i64, i64),
    /// Empties relation `rel`.
    Clear(usize),
    /// Reads the query for a parameter value.
    Ask(i64),
}

fn ops(rels: usize) -> impl proptest::strategy::Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        3 => (0..rels, 0..DOMAIN, 0..DOMAIN).prop_map(|(r, a, b)| Op::Toggle(r, a, b)),
        1 => (0..DOMAIN).prop_map(Op::Ask),
        1 => (0..rels).prop_map(Op::Clear),
    ];
    prop::collection::vec(op, 1..40)
}

/// Runs an original program and its transformed version side by side.
struct Harness {
    rels: Vec<String>,
    params: usize,
    original: Interpreter,
    transformed: Interpreter,
    present: BTreeSet<(usize, i64, i64)>,
}

impl Harness {
    fn new(rels: &[&str], sym: QuerySym, config: Config) -> Self {
        Self::with_queries(rels, vec![], sym, config)
    }

    /// `helpers` are defined before `sym` and reached only through it.
    fn with_queries(rels: &[&str], helpers: Vec<QuerySym>, sym: QuerySym, config: Config) -> Self {
        let mut program = Program::new(vec![]);
        let mut symtab = SymbolTable::new();
        for rel in rels {
            program.declare_relation(rel, false);
            program.add_func(FnDef::new(
                format!("add_{}", rel),
                vec!["e".into()],
                vec![Stmt::rel_update(*rel, SetOp::Add, "e")],
            ));
            program.add_func(FnDef::new(
                format!("remove_{}", rel),
                vec!["e".into()],
                vec![Stmt::rel_update(*rel, SetOp::Remove, "e")],
            ));
            program.add_func(FnDef::new(
                format!("clear_{}", rel),
                vec![],
                vec![Stmt::rel_clear(*rel)],
            ));
            symtab
                .define_relation(rel, Type::relation_of_arity(2), false)
                .unwrap();
        }
        let params = sym.params.len();
        program.add_func(FnDef::new(
            "query",
            sym.params.clone(),
            vec![Stmt::Return(Expr::query(sym.name.as_str(), sym.node.clone()))],
        ));
        for helper in helpers {
            symtab.define_query(helper).unwrap();
        }
        symtab.define_query(sym).unwrap();

        let mut ctx = Ctx::new(symtab, config);
        let transformed = transform_program(program.clone(), &mut ctx).unwrap();
        Self {
            rels: rels.iter().map(|r| r.to_string()).collect(),
            params,
            original: Interpreter::new(&program),
            transformed: Interpreter::new(&transformed),
            present: BTreeSet::new(),
        }
    }

    fn toggle(&mut self, rel: usize, a: i64, b: i64) {
        let rel = rel % self.rels.len();
        let func = if self.present.remove(&(rel, a, b)) {
            format!("remove_{}", self.rels[rel])
        } else {
            self.present.insert((rel, a, b));
            format!("add_{}", self.rels[rel])
        };
        let elem = Val::tuple([Val::int(a), Val::int(b)]);
        self.original.call(&func, vec![elem.clone()]).unwrap();
        self.transformed.call(&func, vec![elem]).unwrap();
    }

    fn clear(&mut self, rel: usize) {
        let rel = rel % self.rels.len();
        self.present.retain(|(r, _, _)| *r != rel);
        let func = format!("clear_{}", self.rels[rel]);
        self.original.call(&func, vec![]).unwrap();
        self.transformed.call(&func, vec![]).unwrap();
    }

    /// The from-scratch answer and the maintained one.
    fn answers(&mut self, x: i64) -> (Vec<Val>, Vec<Val>) {
        let args: Vec<Val> = (0..self.params).map(|_| Val::int(x)).collect();
        let expected = self.original.call("query", args.clone()).unwrap();
        let actual = self.transformed.call("query", args).unwrap();
        (observe(&expected), observe(&actual))
    }

    fn run(&mut self, ops: &[Op]) -> Result<(), TestCaseError> {
        for op in ops {
            match op {
                Op::Toggle(rel, a, b) => self.toggle(*rel, *a, *b),
                Op::Clear(rel) => self.clear(*rel),
                Op::Ask(x) => {
                    let (expected, actual) = self.answers(*x);
                    prop_assert_eq!(actual, expected, "after {:?}", op);
                }
            }
        }
        for x in 0..DOMAIN {
            let (expected, actual) = self.answers(x);
            prop_assert_eq!(actual, expected, "final read at {}", x);
        }
        Ok(())
    }
}

fn observe(v: &Val) -> Vec<Val> {
    v.sorted_elements().unwrap_or_else(|| vec![v.clone()])
}

fn image_of_r() -> Expr {
    Expr::unwrap_of(Expr::img_lookup(
        Expr::name("R"),
        Mask::keymask(1, 1),
        vec!["x".into()],
    ))
}

proptest! {
    /// A projection keeps one reference per derivation.
    #[test]
    fn projection_matches_scratch(ops in ops(1)) {
        let node = QueryNode::comp(Expr::name("y"), vec![Clause::rel_member(&["x", "y"], "R")]);
        let sym = QuerySym::new("Q", node).with_strategy(Strategy::Incremental);
        Harness::new(&["R"], sym, Config::default()).run(&ops)?;
    }

    /// A join over two relations, with and without count elimination.
    #[test]
    fn join_matches_scratch(ops in ops(2), elim in any::<bool>()) {
        let node = QueryNode::comp(
            Expr::tuplify(&["x", "z"], false),
            vec![
                Clause::rel_member(&["x", "y"], "R"),
                Clause::rel_member(&["y", "z"], "S"),
            ],
        );
        let sym = QuerySym::new("Q", node).with_strategy(Strategy::Incremental);
        let config = Config::default().with_elim_counts(elim);
        Harness::new(&["R", "S"], sym, config).run(&ops)?;
    }

    /// A self-join sees each changed edge in both clauses.
    #[test]
    fn self_join_matches_scratch(ops in ops(1)) {
        let node = QueryNode::comp(
            Expr::tuplify(&["x", "z"], false),
            vec![
                Clause::rel_member(&["x", "y"], "R"),
                Clause::rel_member(&["y", "z"], "R"),
            ],
        );
        let sym = QuerySym::new("Q", node).with_strategy(Strategy::Incremental);
        Harness::new(&["R"], sym, Config::default()).run(&ops)?;
    }

    /// A condition clause leaves a duplicate-safe, uncounted result.
    #[test]
    fn condition_matches_scratch(ops in ops(1)) {
        let node = QueryNode::comp(
            Expr::tuplify(&["x", "y"], false),
            vec![
                Clause::rel_member(&["x", "y"], "R"),
                Clause::cond(Expr::cmp(Expr::name("x"), CmpOp::Lt, Expr::name("y"))),
            ],
        );
        let sym = QuerySym::new("Q", node).with_strategy(Strategy::Incremental);
        Harness::new(&["R"], sym, Config::default()).run(&ops)?;
    }

    /// A parameterized comprehension under a bounded demand set.
    #[test]
    fn demanded_comp_matches_scratch(ops in ops(1), maxsize in 1usize..4) {
        let node = QueryNode::comp(
            Expr::tuplify(&["y"], false),
            vec![Clause::rel_member(&["x", "y"], "R")],
        );
        let sym = QuerySym::new("Q", node)
            .with_params(&["x"])
            .with_demand()
            .with_demand_set_maxsize(maxsize)
            .with_strategy(Strategy::Incremental);
        Harness::new(&["R"], sym, Config::default()).run(&ops)?;
    }

    /// Maintenance restricted by tag and filter structures.
    #[test]
    fn filtered_comp_matches_scratch(ops in ops(1), singletag in any::<bool>()) {
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
        let config = Config::default().with_singletag_demand(singletag);
        Harness::new(&["R"], sym, config).run(&ops)?;
    }

    /// Filtered maintenance of a join over two relations with a condition.
    #[test]
    fn filtered_join_with_condition_matches_scratch(ops in ops(2), singletag in any::<bool>()) {
        let node = QueryNode::comp(
            Expr::tuplify(&["y", "z"], false),
            vec![
                Clause::rel_member(&["x", "y"], "R"),
                Clause::rel_member(&["y", "z"], "S"),
                Clause::cond(Expr::cmp(Expr::name("x"), CmpOp::Lt, Expr::name("z"))),
            ],
        );
        let sym = QuerySym::new("Q", node)
            .with_params(&["x"])
            .with_demand()
            .with_strategy(Strategy::Filtered);
        let config = Config::default().with_singletag_demand(singletag);
        Harness::new(&["R", "S"], sym, config).run(&ops)?;
    }

    /// An uncounted result the caller vouches for.
    #[test]
    fn count_elim_override_matches_scratch(ops in ops(1)) {
        let node = QueryNode::comp(
            Expr::tuplify(&["x"], false),
            vec![
                Clause::rel_member(&["x", "y"], "R"),
                Clause::cond(Expr::equals(Expr::name("x"), Expr::name("y"))),
            ],
        );
        let sym = QuerySym::new("Q", node)
            .with_count_elim_safe_override()
            .with_strategy(Strategy::Incremental);
        Harness::new(&["R"], sym, Config::default()).run(&ops)?;
    }

    /// A demanded query nested in a maintained join.
    #[test]
    fn nested_demand_matches_scratch(ops in ops(2)) {
        let inner_node = QueryNode::comp(
            Expr::tuplify(&["z"], false),
            vec![Clause::rel_member(&["y", "z"], "S")],
        );
        let inner = QuerySym::new("N", inner_node.clone())
            .with_params(&["y"])
            .with_demand()
            .with_strategy(Strategy::Incremental);
        let node = QueryNode::comp(
            Expr::tuplify(&["y", "z"], false),
            vec![
                Clause::rel_member(&["x", "y"], "R"),
                Clause::vars_member(&["z"], Expr::query("N", inner_node)),
            ],
        );
        let sym = QuerySym::new("Q", node)
            .with_params(&["x"])
            .with_strategy(Strategy::Incremental);
        Harness::with_queries(&["R", "S"], vec![inner], sym, Config::default()).run(&ops)?;
    }

    /// Grouped aggregates, maintained for every key.
    #[test]
    fn aggregates_match_scratch(ops in ops(1)) {
        for op in [AggrOp::Count, AggrOp::Sum, AggrOp::Min, AggrOp::Max] {
            let node = QueryNode::aggr(op, image_of_r());
            let sym = QuerySym::new("A", node)
                .with_params(&["x"])
                .with_strategy(Strategy::Incremental);
            Harness::new(&["R"], sym, Config::default()).run(&ops)?;
        }
    }

    /// Grouped aggregates, maintained only for demanded keys.
    #[test]
    fn demanded_aggregates_match_scratch(ops in ops(1)) {
        for op in [AggrOp::Count, AggrOp::Sum, AggrOp::Min, AggrOp::Max] {
            let node = QueryNode::aggr(op, image_of_r());
            let sym = QuerySym::new("A", node)
                .with_params(&["x"])
                .with_demand()
                .with_strategy(Strategy::Incremental);
            Harness::new(&["R"], sym, Config::default()).run(&ops)?;
        }
    }
}
