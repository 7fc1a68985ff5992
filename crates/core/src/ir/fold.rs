//! Owning tree transformation.
//!
//! Every `fold_*` method defaults to the matching `walk_*` function,
//! which rebuilds the node from its folded children. Statements fold to
//! a list so that one statement may be replaced by several.

use super::{Clause, Comp, Expr, FnDef, Program, QueryNode, Stmt};
use crate::error::Result;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

pub trait Fold {
    fn fold_program(&mut self, program: Program) -> Result<Program> {
        walk_program(self, program)
    }

    fn fold_fn(&mut self, func: FnDef) -> Result<FnDef> {
        walk_fn(self, func)
    }

    fn fold_block(&mut self, block: Vec<Stmt>) -> Result<Vec<Stmt>> {
        walk_block(self, block)
    }

    fn fold_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>> {
        Ok(vec![walk_stmt(self, stmt)?])
    }

    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        walk_expr(self, expr)
    }

    fn fold_clause(&mut self, clause: Clause) -> Result<Clause> {
        walk_clause(self, clause)
    }

    /// Folds a query occurrence; may replace it with any expression.
    fn fold_query(&mut self, name: String, node: QueryNode) -> Result<Expr> {
        walk_query(self, name, node)
    }

    fn fold_query_node(&mut self, node: QueryNode) -> Result<QueryNode> {
        walk_query_node(self, node)
    }
}

pub fn walk_program<F: Fold + ?Sized>(f: &mut F, program: Program) -> Result<Program> {
    let Program {
        globals,
        funcs,
        body,
    } = program;
    let funcs = funcs
        .into_iter()
        .map(|func| f.fold_fn(func))
        .collect::<Result<Vec<_>>>()?;
    let body = f.fold_block(body)?;
    Ok(Program {
        globals,
        funcs,
        body,
    })
}

pub fn walk_fn<F: Fold + ?Sized>(f: &mut F, func: FnDef) -> Result<FnDef> {
    Ok(FnDef {
        body: f.fold_block(func.body)?,
        ..func
    })
}

pub fn walk_block<F: Fold + ?Sized>(f: &mut F, block: Vec<Stmt>) -> Result<Vec<Stmt>> {
    let mut out = Vec::with_capacity(block.len());
    for stmt in block {
        out.extend(f.fold_stmt(stmt)?);
    }
    Ok(out)
}

pub fn walk_stmt<F: Fold + ?Sized>(f: &mut F, stmt: Stmt) -> Result<Stmt> {
    Ok(match stmt {
        Stmt::Assign { target, value } => Stmt::Assign {
            target,
            value: f.fold_expr(value)?,
        },
        Stmt::DecompAssign { vars, value } => Stmt::DecompAssign {
            vars,
            value: f.fold_expr(value)?,
        },
        Stmt::Expr(e) => Stmt::Expr(f.fold_expr(e)?),
        Stmt::If { test, body, orelse } => Stmt::If {
            test: f.fold_expr(test)?,
            body: f.fold_block(body)?,
            orelse: f.fold_block(orelse)?,
        },
        Stmt::For { target, iter, body } => Stmt::For {
            target,
            iter: f.fold_expr(iter)?,
            body: f.fold_block(body)?,
        },
        Stmt::DecompFor { vars, iter, body } => Stmt::DecompFor {
            vars,
            iter: f.fold_expr(iter)?,
            body: f.fold_block(body)?,
        },
        Stmt::While { test, body } => Stmt::While {
            test: f.fold_expr(test)?,
            body: f.fold_block(body)?,
        },
        Stmt::Return(e) => Stmt::Return(f.fold_expr(e)?),
        Stmt::SetUpdate { target, op, elem } => Stmt::SetUpdate {
            target: f.fold_expr(target)?,
            op,
            elem: f.fold_expr(elem)?,
        },
        Stmt::SetClear { target } => Stmt::SetClear {
            target: f.fold_expr(target)?,
        },
        Stmt::MapAssign { map, key, value } => Stmt::MapAssign {
            map,
            key: f.fold_expr(key)?,
            value: f.fold_expr(value)?,
        },
        Stmt::MapDelete { map, key } => Stmt::MapDelete {
            map,
            key: f.fold_expr(key)?,
        },
        s @ (Stmt::RelUpdate { .. }
        | Stmt::RelClear { .. }
        | Stmt::MapClear { .. }
        | Stmt::ResetDemand { .. }) => s,
    })
}

fn fold_boxed<F: Fold + ?Sized>(f: &mut F, e: Box<Expr>) -> Result<Box<Expr>> {
    Ok(Box::new(f.fold_expr(*e)?))
}

fn fold_list<F: Fold + ?Sized>(f: &mut F, es: Vec<Expr>) -> Result<Vec<Expr>> {
    es.into_iter().map(|e| f.fold_expr(e)).collect()
}

pub fn walk_expr<F: Fold + ?Sized>(f: &mut F, expr: Expr) -> Result<Expr> {
    Ok(match expr {
        e @ (Expr::Name(_) | Expr::Const(_) | Expr::EmptySet | Expr::EmptyTree) => e,
        Expr::Tuple(elts) => Expr::Tuple(fold_list(f, elts)?),
        Expr::Index(v, i) => Expr::Index(fold_boxed(f, v)?, i),
        Expr::BinOp(l, op, r) => Expr::BinOp(fold_boxed(f, l)?, op, fold_boxed(f, r)?),
        Expr::Not(v) => Expr::Not(fold_boxed(f, v)?),
        Expr::Compare(l, op, r) => Expr::Compare(fold_boxed(f, l)?, op, fold_boxed(f, r)?),
        Expr::BoolOp(op, vs) => Expr::BoolOp(op, fold_list(f, vs)?),
        Expr::Call(func, args) => Expr::Call(func, fold_list(f, args)?),
        Expr::Builtin(b, args) => Expr::Builtin(b, fold_list(f, args)?),
        Expr::FirstThen(first, then) => Expr::FirstThen(fold_list(f, first)?, fold_boxed(f, then)?),
        Expr::GetCount(s, e) => Expr::GetCount(fold_boxed(f, s)?, fold_boxed(f, e)?),
        Expr::DictLookup { map, key, default } => Expr::DictLookup {
            map: fold_boxed(f, map)?,
            key: fold_boxed(f, key)?,
            default: match default {
                Some(d) => Some(fold_boxed(f, d)?),
                None => None,
            },
        },
        Expr::ImgLookup { set, mask, bounds } => Expr::ImgLookup {
            set: fold_boxed(f, set)?,
            mask,
            bounds,
        },
        Expr::SetFromMap { map, mask } => Expr::SetFromMap {
            map: fold_boxed(f, map)?,
            mask,
        },
        Expr::Wrap(v) => Expr::Wrap(fold_boxed(f, v)?),
        Expr::Unwrap(v) => Expr::Unwrap(fold_boxed(f, v)?),
        Expr::Query { name, node } => f.fold_query(name, *node)?,
    })
}

pub fn walk_query<F: Fold + ?Sized>(f: &mut F, name: String, node: QueryNode) -> Result<Expr> {
    Ok(Expr::Query {
        name,
        node: Box::new(f.fold_query_node(node)?),
    })
}

pub fn walk_query_node<F: Fold + ?Sized>(f: &mut F, node: QueryNode) -> Result<QueryNode> {
    Ok(match node {
        QueryNode::Comp(Comp { resexp, clauses }) => {
            let clauses = clauses
                .into_iter()
                .map(|cl| f.fold_clause(cl))
                .collect::<Result<Vec<_>>>()?;
            QueryNode::Comp(Comp {
                resexp: f.fold_expr(resexp)?,
                clauses,
            })
        }
        QueryNode::Aggr { op, value } => QueryNode::Aggr {
            op,
            value: f.fold_expr(value)?,
        },
        QueryNode::AggrRestr {
            op,
            value,
            params,
            restr,
        } => QueryNode::AggrRestr {
            op,
            value: f.fold_expr(value)?,
            params,
            restr: f.fold_expr(restr)?,
        },
    })
}

pub fn walk_clause<F: Fold + ?Sized>(f: &mut F, clause: Clause) -> Result<Clause> {
    Ok(match clause {
        cl @ Clause::RelMember { .. } => cl,
        Clause::SingMember { vars, value } => Clause::SingMember {
            vars,
            value: f.fold_expr(value)?,
        },
        Clause::WithoutMember { clause, value } => Clause::WithoutMember {
            clause: Box::new(f.fold_clause(*clause)?),
            value: f.fold_expr(value)?,
        },
        Clause::VarsMember { vars, iter } => Clause::VarsMember {
            vars,
            iter: f.fold_expr(iter)?,
        },
        Clause::Cond(e) => Clause::Cond(f.fold_expr(e)?),
    })
}
