//! Aggregate operator logic.
//!
//! A handler describes the per-key state an aggregate keeps: how to
//! build the state of an empty operand, how one added or removed value
//! changes it, and how the answer is read back out.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use ivmc_core::ir::{AggrOp, BinOp, Builtin, Expr, SetOp, Stmt};
use ivmc_core::Type;

pub trait AggrHandler {
    /// Expression building the state of an empty operand. Evaluated
    /// afresh at every use so states never share a tree.
    fn zero(&self) -> Expr;

    /// Code updating the variable `state` for `value` being added or
    /// removed. `prefix` is reserved for helper variables.
    fn update_state(&self, prefix: &str, state: &str, op: SetOp, value: &str) -> Vec<Stmt>;

    /// Answer held by a state.
    fn project(&self, state: Expr) -> Expr;

    /// Condition under which `state` describes an empty operand, or
    /// `None` when the state cannot tell.
    fn is_empty(&self, state: &str) -> Option<Expr>;

    /// Result type for operand values of type `value`.
    fn result_type(&self, value: &Type) -> Type;
}

fn arith(op: SetOp) -> BinOp {
    match op {
        SetOp::Remove | SetOp::DecCount => BinOp::Sub,
        SetOp::Add | SetOp::IncCount => BinOp::Add,
    }
}

/// State `n`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Count;

impl AggrHandler for Count {
    fn zero(&self) -> Expr {
        Expr::int(0)
    }

    fn update_state(&self, _prefix: &str, state: &str, op: SetOp, _value: &str) -> Vec<Stmt> {
        vec![Stmt::assign(
            state,
            Expr::binop(Expr::name(state), arith(op), Expr::int(1)),
        )]
    }

    fn project(&self, state: Expr) -> Expr {
        state
    }

    fn is_empty(&self, state: &str) -> Option<Expr> {
        Some(Expr::equals(Expr::name(state), Expr::int(0)))
    }

    fn result_type(&self, _value: &Type) -> Type {
        Type::Number
    }
}

/// State `s`. Only used under demand, where the state lives exactly as
/// long as its key is demanded.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum;

impl AggrHandler for Sum {
    fn zero(&self) -> Expr {
        Expr::int(0)
    }

    fn update_state(&self, _prefix: &str, state: &str, op: SetOp, value: &str) -> Vec<Stmt> {
        vec![Stmt::assign(
            state,
            Expr::binop(Expr::name(state), arith(op), Expr::name(value)),
        )]
    }

    fn project(&self, state: Expr) -> Expr {
        state
    }

    fn is_empty(&self, _state: &str) -> Option<Expr> {
        None
    }

    fn result_type(&self, _value: &Type) -> Type {
        Type::Number
    }
}

/// State `(s, n)`: the sum and the number of summed values.
#[derive(Clone, Copy, Debug, Default)]
pub struct CountedSum;

impl AggrHandler for CountedSum {
    fn zero(&self) -> Expr {
        Expr::tuple([Expr::int(0), Expr::int(0)])
    }

    fn update_state(&self, _prefix: &str, state: &str, op: SetOp, value: &str) -> Vec<Stmt> {
        let op = arith(op);
        let s = Expr::index(Expr::name(state), 0);
        let n = Expr::index(Expr::name(state), 1);
        vec![Stmt::assign(
            state,
            Expr::tuple([
                Expr::binop(s, op, Expr::name(value)),
                Expr::binop(n, op, Expr::int(1)),
            ]),
        )]
    }

    fn project(&self, state: Expr) -> Expr {
        Expr::index(state, 0)
    }

    fn is_empty(&self, state: &str) -> Option<Expr> {
        Some(Expr::equals(Expr::index(Expr::name(state), 1), Expr::int(0)))
    }

    fn result_type(&self, _value: &Type) -> Type {
        Type::Number
    }
}

/// State `(tree, cached)`: every operand value, and the current
/// minimum (or maximum), `None` while the tree is empty.
#[derive(Clone, Copy, Debug)]
pub struct MinMax {
    pub max: bool,
}

impl AggrHandler for MinMax {
    fn zero(&self) -> Expr {
        Expr::tuple([Expr::EmptyTree, Expr::none()])
    }

    fn update_state(&self, prefix: &str, state: &str, op: SetOp, value: &str) -> Vec<Stmt> {
        let tree: String = format!("{}_tree", prefix);
        let extreme = if self.max { Builtin::TreeMax } else { Builtin::TreeMin };
        vec![
            Stmt::assign(tree.as_str(), Expr::index(Expr::name(state), 0)),
            Stmt::SetUpdate {
                target: Expr::name(tree.as_str()),
                op,
                elem: Expr::name(value),
            },
            Stmt::assign(
                state,
                Expr::tuple([
                    Expr::name(tree.as_str()),
                    Expr::builtin(extreme, [Expr::name(tree.as_str())]),
                ]),
            ),
        ]
    }

    fn project(&self, state: Expr) -> Expr {
        Expr::index(state, 1)
    }

    fn is_empty(&self, state: &str) -> Option<Expr> {
        Some(Expr::equals(
            Expr::len(Expr::index(Expr::name(state), 0)),
            Expr::int(0),
        ))
    }

    fn result_type(&self, value: &Type) -> Type {
        value.clone()
    }
}

/// Handler for `op`. Sums keep a count alongside unless a demand set
/// decides when their state goes away.
pub fn handler_for(op: AggrOp, uses_demand: bool) -> Box<dyn AggrHandler> {
    match op {
        AggrOp::Count => Box::new(Count),
        AggrOp::Sum if uses_demand => Box::new(Sum),
        AggrOp::Sum => Box::new(CountedSum),
        AggrOp::Min => Box::new(MinMax { max: false }),
        AggrOp::Max => Box::new(MinMax { max: true }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_counted_sum_update() {
        let h = handler_for(AggrOp::Sum, false);
        let code = h.update_state("_v1", "_v1_state", SetOp::Remove, "_v1_value");
        assert_eq!(
            code[0].to_string(),
            "_v1_state = ((_v1_state[0] - _v1_value), (_v1_state[1] - 1))\n"
        );
        assert_eq!(h.project(Expr::name("st")).to_string(), "st[0]");
        assert_eq!(h.zero().to_string(), "(0, 0)");
    }

    #[test]
    fn test_sum_under_demand_is_never_empty() {
        assert!(handler_for(AggrOp::Sum, true).is_empty("s").is_none());
        assert!(handler_for(AggrOp::Count, true).is_empty("s").is_some());
    }

    #[test]
    fn test_minmax_uses_helper_tree() {
        let h = handler_for(AggrOp::Max, false);
        let code = h.update_state("_v3", "_v3_state", SetOp::Add, "_v3_value");
        assert_eq!(code.len(), 3);
        assert_eq!(code[1].to_string(), "_v3_tree.add(_v3_value)\n");
        assert_eq!(code[2].to_string(), "_v3_state = (_v3_tree, tree_max(_v3_tree))\n");
        assert_eq!(h.zero().to_string(), "(Tree(), None)");
        assert_eq!(h.result_type(&Type::Number), Type::Number);
    }
}
