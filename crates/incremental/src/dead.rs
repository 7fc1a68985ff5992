//! Dead relation elimination.
//!
//! A relation is dead when nothing reads it: its name appears only as
//! the target of its own updates and clears. Those statements and the
//! symbol are removed.

use crate::context::Ctx;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashSet;
use ivmc_core::ir::{self, Clause, Expr, Fold, Program, QueryNode, Stmt, Visit};
use ivmc_core::Result;
use tracing::debug;

/// Collects every name read anywhere, query definitions included.
#[derive(Default)]
struct ReadFinder {
    reads: HashSet<String>,
}

impl Visit for ReadFinder {
    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::Name(n) = expr {
            self.reads.insert(n.clone());
        }
        ir::visit::walk_expr(self, expr)
    }

    fn visit_clause(&mut self, clause: &Clause) {
        if let Clause::RelMember { rel, .. } = clause {
            self.reads.insert(rel.clone());
        }
        ir::visit::walk_clause(self, clause)
    }
}

struct UpdateRemover<'a> {
    dead: &'a HashSet<String>,
}

impl Fold for UpdateRemover<'_> {
    fn fold_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>> {
        match ir::fold::walk_stmt(self, stmt)? {
            Stmt::RelUpdate { rel, .. } | Stmt::RelClear { rel } if self.dead.contains(&rel) => Ok(Vec::new()),
            s => Ok(vec![s]),
        }
    }
}

/// Names of relations nothing in `program` or in a query definition reads.
pub fn dead_relations(program: &Program, ctx: &Ctx) -> Vec<String> {
    let mut finder = ReadFinder::default();
    finder.visit_program(program);
    let nodes: Vec<&QueryNode> = ctx.symtab.queries().map(|q| &q.node).collect();
    for node in nodes {
        ir::visit::walk_query_node(&mut finder, node);
    }
    ctx.symtab
        .relations()
        .filter(|r| !finder.reads.contains(&r.name))
        .map(|r| r.name.clone())
        .collect()
}

/// Removes the updates, clears and symbols of dead relations.
pub fn eliminate_dead_relations(program: Program, ctx: &mut Ctx) -> Result<Program> {
    let dead: HashSet<String> = dead_relations(&program, ctx).into_iter().collect();
    if dead.is_empty() {
        return Ok(program);
    }
    let mut program = UpdateRemover { dead: &dead }.fold_program(program)?;
    program.globals.retain(|g| !dead.contains(&g.name));
    for rel in &dead {
        ctx.symtab.remove_relation(rel);
        debug!(rel = %rel, "eliminated dead relation");
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::symtab::SymbolTable;
    use alloc::string::ToString;
    use ivmc_core::ir::SetOp;
    use ivmc_core::Type;

    fn ctx() -> Ctx {
        let mut symtab = SymbolTable::new();
        for rel in ["R", "S", "T"] {
            symtab.define_relation(rel, Type::relation_of_arity(1), false).unwrap();
        }
        Ctx::new(symtab, Config::default())
    }

    #[test]
    fn test_unread_relation_is_removed() {
        let mut ctx = ctx();
        let program = Program::new(vec![
            Stmt::rel_update("R", SetOp::Add, "x"),
            Stmt::rel_update("S", SetOp::Add, "x"),
            Stmt::for_(
                "y",
                Expr::name("S"),
                vec![Stmt::if_(
                    Expr::is_in(Expr::name("y"), Expr::name("T")),
                    vec![Stmt::rel_clear("R")],
                )],
            ),
        ]);
        let mut sorted = dead_relations(&program, &ctx);
        sorted.sort();
        assert_eq!(sorted, vec!["R"]);

        let out = eliminate_dead_relations(program, &mut ctx).unwrap();
        assert_eq!(out.body.len(), 2);
        assert_eq!(
            out.body[1].to_string(),
            "for y in S:\n    if y in T:\n        pass\n"
        );
        assert!(ctx.symtab.relation("R").is_none());
        assert!(ctx.symtab.relation("S").is_some());
    }

    #[test]
    fn test_clause_reads_keep_relation() {
        let mut ctx = ctx();
        let q = QueryNode::comp(Expr::name("x"), vec![Clause::rel_member(&["x"], "R")]);
        ctx.symtab
            .define_query(crate::symtab::QuerySym::new("Q", q.clone()))
            .unwrap();
        let program = Program::new(vec![
            Stmt::rel_update("R", SetOp::Add, "x"),
            Stmt::assign("out", Expr::query("Q", q)),
        ]);
        let dead = dead_relations(&program, &ctx);
        assert!(!dead.contains(&String::from("R")));
        let out = eliminate_dead_relations(program.clone(), &mut ctx).unwrap();
        assert_eq!(out.body, program.body);
    }
}
