//! Statement nodes.

use super::expr::Expr;
use alloc::string::String;
use alloc::vec::Vec;

/// Set update operations.
///
/// `IncCount` and `DecCount` only adjust the reference count of an
/// element already present in a counted set; they never trigger
/// maintenance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetOp {
    Add,
    Remove,
    IncCount,
    DecCount,
}

impl SetOp {
    /// Name used in generated function names.
    pub fn name(&self) -> &'static str {
        match self {
            SetOp::Add => "add",
            SetOp::Remove => "remove",
            SetOp::IncCount => "inccount",
            SetOp::DecCount => "deccount",
        }
    }

    /// Add or remove, the two operations that are maintained.
    pub fn is_maintained(&self) -> bool {
        matches!(self, SetOp::Add | SetOp::Remove)
    }
}

/// A statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
    },
    /// Tuple destructuring assignment.
    DecompAssign {
        vars: Vec<String>,
        value: Expr,
    },
    /// An expression evaluated for effect.
    Expr(Expr),
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    /// Loop that destructures each element into `vars`.
    DecompFor {
        vars: Vec<String>,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Return(Expr),
    /// Update of a global relation with the value of variable `elem`.
    RelUpdate {
        rel: String,
        op: SetOp,
        elem: String,
    },
    RelClear {
        rel: String,
    },
    /// Update of a set or tree that is not a global relation.
    SetUpdate {
        target: Expr,
        op: SetOp,
        elem: Expr,
    },
    SetClear {
        target: Expr,
    },
    /// `map[key] = value`; the key must be absent.
    MapAssign {
        map: String,
        key: Expr,
        value: Expr,
    },
    /// `del map[key]`; the key must be present.
    MapDelete {
        map: String,
        key: Expr,
    },
    MapClear {
        map: String,
    },
    /// Clears the demand sets of the named queries, or of every query
    /// when `names` is empty.
    ResetDemand {
        names: Vec<String>,
    },
}

impl Stmt {
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            value,
        }
    }

    pub fn decomp_assign(vars: Vec<String>, value: Expr) -> Self {
        Stmt::DecompAssign { vars, value }
    }

    pub fn if_(test: Expr, body: Vec<Stmt>) -> Self {
        Stmt::If {
            test,
            body,
            orelse: Vec::new(),
        }
    }

    pub fn if_else(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Self {
        Stmt::If { test, body, orelse }
    }

    pub fn for_(target: impl Into<String>, iter: Expr, body: Vec<Stmt>) -> Self {
        Stmt::For {
            target: target.into(),
            iter,
            body,
        }
    }

    pub fn decomp_for(vars: Vec<String>, iter: Expr, body: Vec<Stmt>) -> Self {
        Stmt::DecompFor { vars, iter, body }
    }

    pub fn rel_update(rel: impl Into<String>, op: SetOp, elem: impl Into<String>) -> Self {
        Stmt::RelUpdate {
            rel: rel.into(),
            op,
            elem: elem.into(),
        }
    }

    pub fn rel_clear(rel: impl Into<String>) -> Self {
        Stmt::RelClear { rel: rel.into() }
    }

    pub fn map_assign(map: impl Into<String>, key: Expr, value: Expr) -> Self {
        Stmt::MapAssign {
            map: map.into(),
            key,
            value,
        }
    }

    pub fn map_delete(map: impl Into<String>, key: Expr) -> Self {
        Stmt::MapDelete {
            map: map.into(),
            key,
        }
    }

    pub fn map_clear(map: impl Into<String>) -> Self {
        Stmt::MapClear { map: map.into() }
    }

    pub fn call(func: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Stmt::Expr(Expr::call(func, args))
    }
}

/// Update of relation `rel` with the value of `elem`, honoring
/// reference counts when the relation is counted.
///
/// A counted add only performs a real `Add` for a new element and a
/// counted remove only performs a real `Remove` for the last reference,
/// so maintenance downstream of `rel` fires once per distinct element.
pub fn rel_update(rel: &str, op: SetOp, elem: &str, counted: bool) -> Vec<Stmt> {
    let mut code = Vec::new();
    if !counted {
        code.push(Stmt::rel_update(rel, op, elem));
        return code;
    }
    match op {
        SetOp::Add => code.push(Stmt::if_else(
            Expr::not_in(Expr::name(elem), Expr::name(rel)),
            alloc::vec![Stmt::rel_update(rel, SetOp::Add, elem)],
            alloc::vec![Stmt::rel_update(rel, SetOp::IncCount, elem)],
        )),
        SetOp::Remove => code.push(Stmt::if_else(
            Expr::equals(
                Expr::get_count(Expr::name(rel), Expr::name(elem)),
                Expr::int(1),
            ),
            alloc::vec![Stmt::rel_update(rel, SetOp::Remove, elem)],
            alloc::vec![Stmt::rel_update(rel, SetOp::DecCount, elem)],
        )),
        SetOp::IncCount | SetOp::DecCount => code.push(Stmt::rel_update(rel, op, elem)),
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncounted_update_is_plain() {
        let code = rel_update("R_Q", SetOp::Add, "_v1_result", false);
        assert_eq!(code, alloc::vec![Stmt::rel_update("R_Q", SetOp::Add, "_v1_result")]);
    }

    #[test]
    fn test_counted_add_checks_membership() {
        let code = rel_update("R_Q", SetOp::Add, "r", true);
        match &code[..] {
            [Stmt::If { test, body, orelse }] => {
                assert_eq!(*test, Expr::not_in(Expr::name("r"), Expr::name("R_Q")));
                assert_eq!(body[0], Stmt::rel_update("R_Q", SetOp::Add, "r"));
                assert_eq!(orelse[0], Stmt::rel_update("R_Q", SetOp::IncCount, "r"));
            }
            other => panic!("unexpected code: {:?}", other),
        }
    }

    #[test]
    fn test_counted_remove_checks_count() {
        let code = rel_update("R_Q", SetOp::Remove, "r", true);
        match &code[..] {
            [Stmt::If { body, orelse, .. }] => {
                assert_eq!(body[0], Stmt::rel_update("R_Q", SetOp::Remove, "r"));
                assert_eq!(orelse[0], Stmt::rel_update("R_Q", SetOp::DecCount, "r"));
            }
            other => panic!("unexpected code: {:?}", other),
        }
    }

    #[test]
    fn test_op_names() {
        assert_eq!(SetOp::Add.name(), "add");
        assert!(SetOp::Remove.is_maintained());
        assert!(!SetOp::IncCount.is_maintained());
    }
}
