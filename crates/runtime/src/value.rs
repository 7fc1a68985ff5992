//! Runtime values.
//!
//! Scalars and tuples compare structurally. Sets, trees and maps are
//! shared by reference: two handles are equal only when they point to
//! the same store, and an update through one handle is seen by all.

use crate::store::{Bag, Dict, Tree};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use ivmc_core::Value;

/// A value held by a variable, a store element or a map entry.
#[derive(Clone, Debug)]
pub enum Val {
    Scalar(Value),
    Tuple(Vec<Val>),
    Set(Rc<RefCell<Bag>>),
    Tree(Rc<RefCell<Tree>>),
    Map(Rc<RefCell<Dict>>),
}

impl Val {
    pub fn none() -> Self {
        Val::Scalar(Value::None)
    }

    pub fn int(i: i64) -> Self {
        Val::Scalar(Value::Int(i))
    }

    pub fn bool(b: bool) -> Self {
        Val::Scalar(Value::Bool(b))
    }

    pub fn str(s: &str) -> Self {
        Val::Scalar(Value::from(s))
    }

    pub fn tuple(elts: impl IntoIterator<Item = Val>) -> Self {
        Val::Tuple(elts.into_iter().collect())
    }

    /// A fresh empty set.
    pub fn new_set() -> Self {
        Val::Set(Rc::new(RefCell::new(Bag::new())))
    }

    /// A fresh empty tree.
    pub fn new_tree() -> Self {
        Val::Tree(Rc::new(RefCell::new(Tree::new())))
    }

    /// A fresh empty map.
    pub fn new_map() -> Self {
        Val::Map(Rc::new(RefCell::new(Dict::new())))
    }

    /// A fresh set holding `elems` once each.
    pub fn set_of(elems: impl IntoIterator<Item = Val>) -> Self {
        let mut bag = Bag::new();
        for e in elems {
            bag.insert(e);
        }
        Val::Set(Rc::new(RefCell::new(bag)))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Val::Scalar(v) => v.as_int(),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Val]> {
        match self {
            Val::Tuple(elts) => Some(elts),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Val::Scalar(Value::None))
    }

    /// Truthiness used by conditions: containers are true when non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Scalar(v) => v.is_truthy(),
            Val::Tuple(elts) => !elts.is_empty(),
            Val::Set(s) => !s.borrow().is_empty(),
            Val::Tree(t) => !t.borrow().is_empty(),
            Val::Map(m) => !m.borrow().is_empty(),
        }
    }

    /// Distinct elements of a set, or the elements of a tree with
    /// multiplicity, in ascending order.
    pub fn sorted_elements(&self) -> Option<Vec<Val>> {
        let mut elems = match self {
            Val::Set(s) => s.borrow().elements(),
            Val::Tree(t) => t.borrow().elements(),
            _ => return None,
        };
        elems.sort();
        Some(elems)
    }

    fn rank(&self) -> u8 {
        match self {
            Val::Scalar(_) => 0,
            Val::Tuple(_) => 1,
            Val::Set(_) => 2,
            Val::Tree(_) => 3,
            Val::Map(_) => 4,
        }
    }

    fn addr(&self) -> usize {
        match self {
            Val::Scalar(_) | Val::Tuple(_) => 0,
            Val::Set(s) => Rc::as_ptr(s) as usize,
            Val::Tree(t) => Rc::as_ptr(t) as usize,
            Val::Map(m) => Rc::as_ptr(m) as usize,
        }
    }
}

impl Ord for Val {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Val::Scalar(a), Val::Scalar(b)) => a.cmp(b),
            (Val::Tuple(a), Val::Tuple(b)) => a.cmp(b),
            _ => self
                .rank()
                .cmp(&other.rank())
                .then_with(|| self.addr().cmp(&other.addr())),
        }
    }
}

impl PartialOrd for Val {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Val {}

impl Hash for Val {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Val::Scalar(v) => v.hash(state),
            Val::Tuple(elts) => elts.hash(state),
            _ => self.addr().hash(state),
        }
    }
}

impl From<Value> for Val {
    fn from(v: Value) -> Self {
        Val::Scalar(v)
    }
}

impl From<i64> for Val {
    fn from(v: i64) -> Self {
        Val::int(v)
    }
}

impl From<&str> for Val {
    fn from(v: &str) -> Self {
        Val::str(v)
    }
}

impl From<String> for Val {
    fn from(v: String) -> Self {
        Val::Scalar(Value::Str(v))
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Val]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Scalar(v) => write!(f, "{}", v),
            Val::Tuple(elts) => {
                f.write_str("(")?;
                write_seq(f, elts)?;
                if elts.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Val::Set(s) => {
                f.write_str("{")?;
                write_seq(f, &s.borrow().elements())?;
                f.write_str("}")
            }
            Val::Tree(t) => {
                f.write_str("Tree(")?;
                write_seq(f, &t.borrow().elements())?;
                f.write_str(")")
            }
            Val::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.borrow().entries().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}
