//! Benchmarks for ivmc-incremental.
//!
//! Measures the transformation itself and the cost of one update in a
//! transformed program against from-scratch evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ivmc_core::ir::{AggrOp, Clause, Expr, FnDef, Program, QueryNode, SetOp, Stmt};
use ivmc_core::{Mask, Type};
use ivmc_incremental::{transform_program, Config, Ctx, QuerySym, Strategy, SymbolTable};
use ivmc_runtime::{Interpreter, Val};

fn two_hop() -> QueryNode {
    QueryNode::comp(
        Expr::tuplify(&["z"], false),
        vec![
            Clause::rel_member(&["x", "y"], "E"),
            Clause::rel_member(&["y", "z"], "E"),
        ],
    )
}

fn degree() -> QueryNode {
    QueryNode::aggr(
        AggrOp::Count,
        Expr::img_lookup(Expr::name("E"), Mask::keymask(1, 1), vec!["x".into()]),
    )
}

fn program_for(sym: &QuerySym) -> Program {
    let mut program = Program::new(vec![]);
    program.declare_relation("E", false);
    program.add_func(FnDef::new(
        "add",
        vec!["e".into()],
        vec![Stmt::rel_update("E", SetOp::Add, "e")],
    ));
    program.add_func(FnDef::new(
        "remove",
        vec!["e".into()],
        vec![Stmt::rel_update("E", SetOp::Remove, "e")],
    ));
    program.add_func(FnDef::new(
        "query",
        sym.params.clone(),
        vec![Stmt::Return(Expr::query(sym.name.as_str(), sym.node.clone()))],
    ));
    program
}

fn transform(sym: &QuerySym) -> Program {
    let mut symtab = SymbolTable::new();
    symtab
        .define_relation("E", Type::relation_of_arity(2), false)
        .unwrap();
    symtab.define_query(sym.clone()).unwrap();
    let mut ctx = Ctx::new(symtab, Config::default());
    transform_program(program_for(sym), &mut ctx).unwrap()
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    let cases = [
        ("comp", QuerySym::new("Q", two_hop()).with_params(&["x"]).with_strategy(Strategy::Incremental)),
        (
            "filtered",
            QuerySym::new("Q", two_hop())
                .with_params(&["x"])
                .with_demand()
                .with_strategy(Strategy::Filtered),
        ),
        ("aggregate", QuerySym::new("D", degree()).with_params(&["x"]).with_strategy(Strategy::Incremental)),
    ];
    for (name, sym) in &cases {
        group.bench_with_input(BenchmarkId::new("pipeline", name), sym, |b, sym| {
            b.iter(|| transform(black_box(sym)))
        });
    }

    group.finish();
}

fn edge(a: i64, b: i64) -> Val {
    Val::tuple([Val::int(a), Val::int(b)])
}

/// Chain graph `0 -> 1 -> ... -> n` loaded into `interp`.
fn load_chain(interp: &mut Interpreter, n: i64) {
    for i in 0..n {
        interp.call("add", vec![edge(i, i + 1)]).unwrap();
    }
}

fn bench_update_then_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_then_read");

    let sym = QuerySym::new("Q", two_hop())
        .with_params(&["x"])
        .with_strategy(Strategy::Incremental);
    let original = program_for(&sym);
    let transformed = transform(&sym);

    for size in [10, 100, 1000] {
        for (label, program) in [("scratch", &original), ("maintained", &transformed)] {
            let mut interp = Interpreter::new(program);
            load_chain(&mut interp, size);
            group.bench_function(BenchmarkId::new(label, size), |b| {
                b.iter(|| {
                    interp.call("add", vec![edge(0, size)]).unwrap();
                    let out = interp.call("query", vec![Val::int(0)]).unwrap();
                    interp.call("remove", vec![edge(0, size)]).unwrap();
                    black_box(out)
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_transform, bench_update_then_read);
criterion_main!(benches);
