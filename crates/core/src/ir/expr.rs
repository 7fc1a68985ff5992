//! Expression nodes.

use super::query::QueryNode;
use crate::mask::Mask;
use crate::value::Value;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// Arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
}

/// Comparison operators, including set membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

/// Short-circuiting boolean operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

/// Built-in functions available to generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Size of a set, map, tree or tuple.
    Len,
    /// Smallest element of a tree, `None` when empty.
    TreeMin,
    /// Largest element of a tree, `None` when empty.
    TreeMax,
    /// Oldest element of a set.
    Peek,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::TreeMin => "tree_min",
            Builtin::TreeMax => "tree_max",
            Builtin::Peek => "peek",
        }
    }
}

/// An expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Name(String),
    Const(Value),
    Tuple(Vec<Expr>),
    /// Tuple component access with a constant index.
    Index(Box<Expr>, usize),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Not(Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    BoolOp(BoolOp, Vec<Expr>),
    /// Call of a program-level function.
    Call(String, Vec<Expr>),
    Builtin(Builtin, Vec<Expr>),
    /// Evaluates every expression in `first` for effect, then yields `then`.
    FirstThen(Vec<Expr>, Box<Expr>),
    /// A fresh empty set.
    EmptySet,
    /// A fresh empty tree.
    EmptyTree,
    /// Reference count of an element in a counted set.
    GetCount(Box<Expr>, Box<Expr>),
    /// `map[key]`, or `map.get(key, default)` when a default is given.
    DictLookup {
        map: Box<Expr>,
        key: Box<Expr>,
        default: Option<Box<Expr>>,
    },
    /// The image of a relation under the bound components `bounds`.
    ImgLookup {
        set: Box<Expr>,
        mask: Mask,
        bounds: Vec<String>,
    },
    /// A map viewed as a relation of `key + (value,)` tuples.
    SetFromMap { map: Box<Expr>, mask: Mask },
    /// Each element `e` becomes `(e,)`.
    Wrap(Box<Expr>),
    /// Each 1-tuple `(e,)` becomes `e`.
    Unwrap(Box<Expr>),
    /// An occurrence of a named query.
    Query { name: String, node: Box<QueryNode> },
}

impl Expr {
    pub fn name(id: impl Into<String>) -> Self {
        Expr::Name(id.into())
    }

    pub fn int(i: i64) -> Self {
        Expr::Const(Value::Int(i))
    }

    pub fn none() -> Self {
        Expr::Const(Value::None)
    }

    pub fn str(s: &str) -> Self {
        Expr::Const(Value::from(s))
    }

    pub fn tuple(elts: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Tuple(elts.into_iter().collect())
    }

    /// A tuple of names, or a bare name if `unwrap` is set and there is
    /// exactly one.
    pub fn tuplify<S: AsRef<str>>(names: &[S], unwrap: bool) -> Self {
        if unwrap && names.len() == 1 {
            Expr::name(names[0].as_ref())
        } else {
            Expr::Tuple(names.iter().map(|n| Expr::name(n.as_ref())).collect())
        }
    }

    /// Inverse of [`Expr::tuplify`] for tuples of names.
    pub fn detuplify(&self) -> Option<Vec<String>> {
        match self {
            Expr::Tuple(elts) => elts
                .iter()
                .map(|e| match e {
                    Expr::Name(n) => Some(n.clone()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    pub fn index(value: Expr, i: usize) -> Self {
        Expr::Index(Box::new(value), i)
    }

    pub fn binop(left: Expr, op: BinOp, right: Expr) -> Self {
        Expr::BinOp(Box::new(left), op, Box::new(right))
    }

    pub fn not(value: Expr) -> Self {
        Expr::Not(Box::new(value))
    }

    pub fn cmp(left: Expr, op: CmpOp, right: Expr) -> Self {
        Expr::Compare(Box::new(left), op, Box::new(right))
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Self::cmp(left, CmpOp::Eq, right)
    }

    pub fn is_in(elem: Expr, set: Expr) -> Self {
        Self::cmp(elem, CmpOp::In, set)
    }

    pub fn not_in(elem: Expr, set: Expr) -> Self {
        Self::cmp(elem, CmpOp::NotIn, set)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Expr::BoolOp(BoolOp::And, exprs.into_iter().collect())
    }

    pub fn call(func: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call(func.into(), args.into_iter().collect())
    }

    pub fn builtin(op: Builtin, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Builtin(op, args.into_iter().collect())
    }

    pub fn len(value: Expr) -> Self {
        Self::builtin(Builtin::Len, [value])
    }

    pub fn get_count(set: Expr, elem: Expr) -> Self {
        Expr::GetCount(Box::new(set), Box::new(elem))
    }

    pub fn dict_lookup(map: Expr, key: Expr, default: Option<Expr>) -> Self {
        Expr::DictLookup {
            map: Box::new(map),
            key: Box::new(key),
            default: default.map(Box::new),
        }
    }

    pub fn img_lookup(set: Expr, mask: Mask, bounds: Vec<String>) -> Self {
        Expr::ImgLookup {
            set: Box::new(set),
            mask,
            bounds,
        }
    }

    pub fn set_from_map(map: Expr, mask: Mask) -> Self {
        Expr::SetFromMap {
            map: Box::new(map),
            mask,
        }
    }

    pub fn wrap(value: Expr) -> Self {
        Expr::Wrap(Box::new(value))
    }

    pub fn unwrap_of(value: Expr) -> Self {
        Expr::Unwrap(Box::new(value))
    }

    pub fn query(name: impl Into<String>, node: QueryNode) -> Self {
        Expr::Query {
            name: name.into(),
            node: Box::new(node),
        }
    }

    pub fn first_then(first: impl IntoIterator<Item = Expr>, then: Expr) -> Self {
        Expr::FirstThen(first.into_iter().collect(), Box::new(then))
    }

    /// The identifier if this is a plain name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Variables read by this expression, in first-occurrence order.
    ///
    /// Names inside query occurrences are not included.
    pub fn find_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>) {
        fn push(n: &str, out: &mut Vec<String>) {
            if !out.iter().any(|v| v == n) {
                out.push(n.into());
            }
        }
        match self {
            Expr::Name(n) => push(n, out),
            Expr::Const(_) | Expr::EmptySet | Expr::EmptyTree | Expr::Query { .. } => {}
            Expr::Tuple(elts) | Expr::BoolOp(_, elts) | Expr::Call(_, elts) | Expr::Builtin(_, elts) => {
                for e in elts {
                    e.collect_vars(out);
                }
            }
            Expr::Index(v, _) | Expr::Not(v) | Expr::Wrap(v) | Expr::Unwrap(v) => v.collect_vars(out),
            Expr::BinOp(l, _, r) | Expr::Compare(l, _, r) | Expr::GetCount(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
            Expr::FirstThen(first, then) => {
                for e in first {
                    e.collect_vars(out);
                }
                then.collect_vars(out);
            }
            Expr::DictLookup { map, key, default } => {
                map.collect_vars(out);
                key.collect_vars(out);
                if let Some(d) = default {
                    d.collect_vars(out);
                }
            }
            Expr::ImgLookup { set, bounds, .. } => {
                set.collect_vars(out);
                for b in bounds {
                    push(b, out);
                }
            }
            Expr::SetFromMap { map, .. } => map.collect_vars(out),
        }
    }

    /// Applies `renamer` to every variable occurrence outside queries.
    pub fn rename<F: Fn(&str) -> String>(&self, renamer: &F) -> Expr {
        let r = |e: &Expr| Box::new(e.rename(renamer));
        let rv = |es: &[Expr]| es.iter().map(|e| e.rename(renamer)).collect::<Vec<_>>();
        match self {
            Expr::Name(n) => Expr::Name(renamer(n)),
            Expr::Const(_) | Expr::EmptySet | Expr::EmptyTree | Expr::Query { .. } => self.clone(),
            Expr::Tuple(elts) => Expr::Tuple(rv(elts)),
            Expr::Index(v, i) => Expr::Index(r(v), *i),
            Expr::BinOp(l, op, rr) => Expr::BinOp(r(l), *op, r(rr)),
            Expr::Not(v) => Expr::Not(r(v)),
            Expr::Compare(l, op, rr) => Expr::Compare(r(l), *op, r(rr)),
            Expr::BoolOp(op, elts) => Expr::BoolOp(*op, rv(elts)),
            Expr::Call(f, args) => Expr::Call(f.clone(), rv(args)),
            Expr::Builtin(b, args) => Expr::Builtin(*b, rv(args)),
            Expr::FirstThen(first, then) => Expr::FirstThen(rv(first), r(then)),
            Expr::GetCount(s, e) => Expr::GetCount(r(s), r(e)),
            Expr::DictLookup { map, key, default } => Expr::DictLookup {
                map: r(map),
                key: r(key),
                default: default.as_ref().map(|d| r(d)),
            },
            Expr::ImgLookup { set, mask, bounds } => Expr::ImgLookup {
                set: r(set),
                mask: mask.clone(),
                bounds: bounds.iter().map(|b| renamer(b)).collect(),
            },
            Expr::SetFromMap { map, mask } => Expr::SetFromMap {
                map: r(map),
                mask: mask.clone(),
            },
            Expr::Wrap(v) => Expr::Wrap(r(v)),
            Expr::Unwrap(v) => Expr::Unwrap(r(v)),
        }
    }

    /// Conservative check that distinct variable values give distinct
    /// results: only names and tuples of injective expressions qualify.
    pub fn is_injective(&self) -> bool {
        match self {
            Expr::Name(_) => true,
            Expr::Tuple(elts) => elts.iter().all(Expr::is_injective),
            _ => false,
        }
    }
}
