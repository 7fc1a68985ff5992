//! Read-only tree traversal, the borrowing counterpart of [`super::fold`].

use super::{Clause, Comp, Expr, FnDef, Program, QueryNode, Stmt};

pub trait Visit {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program)
    }

    fn visit_fn(&mut self, func: &FnDef) {
        walk_block(self, &func.body)
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt)
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr)
    }

    fn visit_clause(&mut self, clause: &Clause) {
        walk_clause(self, clause)
    }

    fn visit_query(&mut self, name: &str, node: &QueryNode) {
        let _ = name;
        walk_query_node(self, node)
    }
}

pub fn walk_program<V: Visit + ?Sized>(v: &mut V, program: &Program) {
    for func in &program.funcs {
        v.visit_fn(func);
    }
    walk_block(v, &program.body);
}

pub fn walk_block<V: Visit + ?Sized>(v: &mut V, block: &[Stmt]) {
    for stmt in block {
        v.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visit + ?Sized>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Assign { value, .. } | Stmt::DecompAssign { value, .. } => v.visit_expr(value),
        Stmt::Expr(e) | Stmt::Return(e) => v.visit_expr(e),
        Stmt::If { test, body, orelse } => {
            v.visit_expr(test);
            walk_block(v, body);
            walk_block(v, orelse);
        }
        Stmt::For { iter, body, .. } | Stmt::DecompFor { iter, body, .. } => {
            v.visit_expr(iter);
            walk_block(v, body);
        }
        Stmt::While { test, body } => {
            v.visit_expr(test);
            walk_block(v, body);
        }
        Stmt::SetUpdate { target, elem, .. } => {
            v.visit_expr(target);
            v.visit_expr(elem);
        }
        Stmt::SetClear { target } => v.visit_expr(target),
        Stmt::MapAssign { key, value, .. } => {
            v.visit_expr(key);
            v.visit_expr(value);
        }
        Stmt::MapDelete { key, .. } => v.visit_expr(key),
        Stmt::RelUpdate { .. } | Stmt::RelClear { .. } | Stmt::MapClear { .. } | Stmt::ResetDemand { .. } => {}
    }
}

pub fn walk_expr<V: Visit + ?Sized>(v: &mut V, expr: &Expr) {
    match expr {
        Expr::Name(_) | Expr::Const(_) | Expr::EmptySet | Expr::EmptyTree => {}
        Expr::Tuple(es) | Expr::BoolOp(_, es) | Expr::Call(_, es) | Expr::Builtin(_, es) => {
            for e in es {
                v.visit_expr(e);
            }
        }
        Expr::Index(e, _) | Expr::Not(e) | Expr::Wrap(e) | Expr::Unwrap(e) => v.visit_expr(e),
        Expr::BinOp(l, _, r) | Expr::Compare(l, _, r) | Expr::GetCount(l, r) => {
            v.visit_expr(l);
            v.visit_expr(r);
        }
        Expr::FirstThen(first, then) => {
            for e in first {
                v.visit_expr(e);
            }
            v.visit_expr(then);
        }
        Expr::DictLookup { map, key, default } => {
            v.visit_expr(map);
            v.visit_expr(key);
            if let Some(d) = default {
                v.visit_expr(d);
            }
        }
        Expr::ImgLookup { set, .. } => v.visit_expr(set),
        Expr::SetFromMap { map, .. } => v.visit_expr(map),
        Expr::Query { name, node } => v.visit_query(name, node),
    }
}

pub fn walk_query_node<V: Visit + ?Sized>(v: &mut V, node: &QueryNode) {
    match node {
        QueryNode::Comp(Comp { resexp, clauses }) => {
            for cl in clauses {
                v.visit_clause(cl);
            }
            v.visit_expr(resexp);
        }
        QueryNode::Aggr { value, .. } => v.visit_expr(value),
        QueryNode::AggrRestr { value, restr, .. } => {
            v.visit_expr(value);
            v.visit_expr(restr);
        }
    }
}

pub fn walk_clause<V: Visit + ?Sized>(v: &mut V, clause: &Clause) {
    match clause {
        Clause::RelMember { .. } => {}
        Clause::SingMember { value, .. } => v.visit_expr(value),
        Clause::WithoutMember { clause, value } => {
            v.visit_clause(clause);
            v.visit_expr(value);
        }
        Clause::VarsMember { iter, .. } => v.visit_expr(iter),
        Clause::Cond(e) => v.visit_expr(e),
    }
}
