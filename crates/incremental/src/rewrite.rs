//! Query rewriting that keeps occurrences and symbols in step.
//!
//! A [`QueryRewriter`] decides, per query, whether to keep it, give it a
//! new definition, or replace its occurrences by another expression.
//! [`rewrite_queries`] applies that decision to the symbol definitions
//! (innermost queries first) and to every occurrence in the program.

use crate::context::Ctx;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use ivmc_core::ir::{self, Expr, Fold, Program, QueryNode, Visit};
use ivmc_core::{Error, Result};

/// Outcome of rewriting one query.
#[derive(Clone, Debug, PartialEq)]
pub enum Rewrite {
    Keep,
    /// New definition for the query, applied to the symbol and occurrences.
    Redefine(QueryNode),
    /// Expression replacing every occurrence; the symbol is kept.
    Expand(Expr),
}

pub trait QueryRewriter {
    /// Called once per query, with nested queries already rewritten.
    fn rewrite(&mut self, ctx: &mut Ctx, name: &str, node: &QueryNode) -> Result<Rewrite>;
}

/// Rewriter from a closure.
pub struct FnRewriter<F>(pub F);

impl<F> QueryRewriter for FnRewriter<F>
where
    F: FnMut(&mut Ctx, &str, &QueryNode) -> Result<Rewrite>,
{
    fn rewrite(&mut self, ctx: &mut Ctx, name: &str, node: &QueryNode) -> Result<Rewrite> {
        (self.0)(ctx, name, node)
    }
}

/// Expands every occurrence of `query` into `expr`.
pub fn expand_query(program: Program, ctx: &mut Ctx, query: &str, expr: Expr) -> Result<Program> {
    let mut r = FnRewriter(|_: &mut Ctx, name: &str, _: &QueryNode| -> Result<Rewrite> {
        Ok(if name == query {
            Rewrite::Expand(expr.clone())
        } else {
            Rewrite::Keep
        })
    });
    rewrite_queries(program, ctx, &mut r)
}

/// Gives `query` a new definition everywhere.
pub fn redefine_query(program: Program, ctx: &mut Ctx, query: &str, node: QueryNode) -> Result<Program> {
    let mut r = FnRewriter(|_: &mut Ctx, name: &str, _: &QueryNode| -> Result<Rewrite> {
        Ok(if name == query {
            Rewrite::Redefine(node.clone())
        } else {
            Rewrite::Keep
        })
    });
    rewrite_queries(program, ctx, &mut r)
}

/// Applies `rewriter` to the symbol table and the program.
pub fn rewrite_queries<R: QueryRewriter + ?Sized>(
    program: Program,
    ctx: &mut Ctx,
    rewriter: &mut R,
) -> Result<Program> {
    ctx.symtab.check_consistency(&program)?;

    let mut by_size: Vec<(usize, String, QueryNode)> = ctx
        .symtab
        .queries()
        .map(|q| (node_size(&q.node), q.name.clone(), q.node.clone()))
        .collect();
    by_size.sort_by_key(|(size, _, _)| *size);

    let mut runner = Runner {
        ctx,
        rewriter,
        memo: HashMap::new(),
    };
    for (_, name, node) in by_size {
        runner.fold_query(name, node)?;
    }
    runner.fold_program(program)
}

struct Runner<'a, R: ?Sized> {
    ctx: &'a mut Ctx,
    rewriter: &'a mut R,
    /// Per query: the definition seen and the expression it became.
    memo: HashMap<String, (QueryNode, Expr)>,
}

impl<R: QueryRewriter + ?Sized> Fold for Runner<'_, R> {
    fn fold_query(&mut self, name: String, node: QueryNode) -> Result<Expr> {
        let node = self.fold_query_node(node)?;
        if let Some((seen, result)) = self.memo.get(&name) {
            if *seen != node {
                return Err(Error::transformation(format!(
                    "Inconsistent occurrences of query \"{}\": {}, {}",
                    name, seen, node
                )));
            }
            return Ok(result.clone());
        }

        let result = match self.rewriter.rewrite(self.ctx, &name, &node)? {
            Rewrite::Keep => {
                self.ctx.symtab.get_query_mut(&name)?.node = node.clone();
                Expr::query(name.as_str(), node.clone())
            }
            Rewrite::Redefine(new_node) => {
                self.ctx.symtab.get_query_mut(&name)?.node = new_node.clone();
                Expr::query(name.as_str(), new_node)
            }
            Rewrite::Expand(expr) => {
                self.ctx.symtab.get_query_mut(&name)?.node = node.clone();
                expr
            }
        };
        self.memo.insert(name, (node, result.clone()));
        Ok(result)
    }
}

#[derive(Default)]
struct SizeCounter(usize);

impl Visit for SizeCounter {
    fn visit_expr(&mut self, expr: &Expr) {
        self.0 += 1;
        ir::visit::walk_expr(self, expr)
    }

    fn visit_clause(&mut self, clause: &ir::Clause) {
        self.0 += 1;
        ir::visit::walk_clause(self, clause)
    }
}

/// Number of expression and clause nodes in a query definition.
pub fn node_size(node: &QueryNode) -> usize {
    let mut c = SizeCounter::default();
    ir::visit::walk_query_node(&mut c, node);
    c.0
}
