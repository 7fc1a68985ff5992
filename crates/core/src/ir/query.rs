//! Query nodes: comprehensions and aggregates.

use super::clause::Clause;
use super::expr::Expr;
use alloc::string::String;
use alloc::vec::Vec;

/// Aggregate operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggrOp {
    Count,
    Sum,
    Min,
    Max,
}

impl AggrOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggrOp::Count => "count",
            AggrOp::Sum => "sum",
            AggrOp::Min => "min",
            AggrOp::Max => "max",
        }
    }
}

/// A set comprehension `{resexp for clauses}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Comp {
    pub resexp: Expr,
    pub clauses: Vec<Clause>,
}

impl Comp {
    pub fn new(resexp: Expr, clauses: Vec<Clause>) -> Self {
        Self { resexp, clauses }
    }
}

/// The body of a named query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryNode {
    Comp(Comp),
    Aggr {
        op: AggrOp,
        value: Expr,
    },
    /// An aggregate evaluated only for keys present in `restr`.
    AggrRestr {
        op: AggrOp,
        value: Expr,
        params: Vec<String>,
        restr: Expr,
    },
}

impl QueryNode {
    pub fn comp(resexp: Expr, clauses: Vec<Clause>) -> Self {
        QueryNode::Comp(Comp::new(resexp, clauses))
    }

    pub fn aggr(op: AggrOp, value: Expr) -> Self {
        QueryNode::Aggr { op, value }
    }

    pub fn as_comp(&self) -> Option<&Comp> {
        match self {
            QueryNode::Comp(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_aggr(&self) -> bool {
        matches!(self, QueryNode::Aggr { .. } | QueryNode::AggrRestr { .. })
    }
}
