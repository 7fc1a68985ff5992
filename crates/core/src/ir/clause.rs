//! Comprehension clauses.

use super::expr::Expr;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// One generator term of a comprehension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Clause {
    /// `(vars) in rel` for a global relation.
    RelMember { vars: Vec<String>, rel: String },
    /// `(vars) in {value}`.
    SingMember { vars: Vec<String>, value: Expr },
    /// `clause` restricted to elements other than `value`.
    WithoutMember { clause: Box<Clause>, value: Expr },
    /// `(vars) in iter` for an arbitrary set expression.
    VarsMember { vars: Vec<String>, iter: Expr },
    /// A boolean condition.
    Cond(Expr),
}

impl Clause {
    pub fn rel_member<S: AsRef<str>>(vars: &[S], rel: impl Into<String>) -> Self {
        Clause::RelMember {
            vars: vars.iter().map(|v| v.as_ref().into()).collect(),
            rel: rel.into(),
        }
    }

    pub fn sing_member(vars: Vec<String>, value: Expr) -> Self {
        Clause::SingMember { vars, value }
    }

    pub fn without(clause: Clause, value: Expr) -> Self {
        Clause::WithoutMember {
            clause: Box::new(clause),
            value,
        }
    }

    pub fn vars_member<S: AsRef<str>>(vars: &[S], iter: Expr) -> Self {
        Clause::VarsMember {
            vars: vars.iter().map(|v| v.as_ref().into()).collect(),
            iter,
        }
    }

    pub fn cond(expr: Expr) -> Self {
        Clause::Cond(expr)
    }
}
