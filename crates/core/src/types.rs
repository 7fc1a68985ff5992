//! Type lattice used by the symbol table.
//!
//! Types are only consumed, never inferred, by the engine: relation and
//! map symbols carry a type supplied by the caller, and the aggregate
//! engine reads it to find the operand arity.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// A type in the lattice `Bottom <= t <= Top`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    /// No information yet.
    Bottom,
    /// Any value.
    Top,
    Bool,
    Number,
    String,
    /// Fixed-arity tuple.
    Tuple(Vec<Type>),
    /// Set (relation) with the given element type.
    Set(Box<Type>),
    /// Map from key type to value type.
    Map(Box<Type>, Box<Type>),
    /// Ordered multiset used by min/max aggregate state.
    Tree,
}

impl Type {
    /// Builds `Set<elt>`.
    pub fn set(elt: Type) -> Self {
        Type::Set(Box::new(elt))
    }

    /// Builds `Map<key, value>`.
    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Box::new(key), Box::new(value))
    }

    /// Builds a tuple type.
    pub fn tuple(elts: impl IntoIterator<Item = Type>) -> Self {
        Type::Tuple(elts.into_iter().collect())
    }

    /// Builds `Set<(Top, ..., Top)>` with `arity` components.
    pub fn relation_of_arity(arity: usize) -> Self {
        Type::set(Type::Tuple(alloc::vec![Type::Top; arity]))
    }

    /// Least upper bound.
    pub fn join(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Bottom, t) | (t, Type::Bottom) => t.clone(),
            (Type::Top, _) | (_, Type::Top) => Type::Top,
            (Type::Tuple(a), Type::Tuple(b)) if a.len() == b.len() => {
                Type::Tuple(a.iter().zip(b).map(|(x, y)| x.join(y)).collect())
            }
            (Type::Set(a), Type::Set(b)) => Type::set(a.join(b)),
            (Type::Map(ak, av), Type::Map(bk, bv)) => Type::map(ak.join(bk), av.join(bv)),
            (a, b) if a == b => a.clone(),
            _ => Type::Top,
        }
    }

    /// Returns true if `self <= other` in the lattice.
    pub fn is_smaller(&self, other: &Type) -> bool {
        self.join(other) == *other
    }

    /// Element type of a set type.
    pub fn elt(&self) -> Option<&Type> {
        match self {
            Type::Set(elt) => Some(elt),
            _ => None,
        }
    }

    /// Component types of a tuple type.
    pub fn tuple_elts(&self) -> Option<&[Type]> {
        match self {
            Type::Tuple(elts) => Some(elts),
            _ => None,
        }
    }

    /// Arity of a set-of-tuples type.
    pub fn relation_arity(&self) -> Option<usize> {
        self.elt().and_then(Type::tuple_elts).map(<[Type]>::len)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bottom => write!(f, "Bottom"),
            Type::Top => write!(f, "Top"),
            Type::Bool => write!(f, "Bool"),
            Type::Number => write!(f, "Number"),
            Type::String => write!(f, "String"),
            Type::Tuple(elts) => {
                write!(f, "(")?;
                for (i, t) in elts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
            Type::Set(elt) => write!(f, "Set<{}>", elt),
            Type::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
            Type::Tree => write!(f, "Tree"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    #[test]
    fn test_join_bottom_and_top() {
        assert_eq!(Type::Bottom.join(&Type::Number), Type::Number);
        assert_eq!(Type::Number.join(&Type::Top), Type::Top);
        assert_eq!(Type::Number.join(&Type::String), Type::Top);
    }

    #[test]
    fn test_join_structural() {
        let a = Type::set(Type::tuple(vec![Type::Number, Type::Bottom]));
        let b = Type::set(Type::tuple(vec![Type::Bottom, Type::String]));
        assert_eq!(
            a.join(&b),
            Type::set(Type::tuple(vec![Type::Number, Type::String]))
        );
        let c = Type::tuple(vec![Type::Number]);
        let d = Type::tuple(vec![Type::Number, Type::Number]);
        assert_eq!(c.join(&d), Type::Top);
    }

    #[test]
    fn test_is_smaller() {
        assert!(Type::Bottom.is_smaller(&Type::Number));
        assert!(Type::set(Type::Number).is_smaller(&Type::set(Type::Top)));
        assert!(!Type::Number.is_smaller(&Type::set(Type::Top)));
    }

    #[test]
    fn test_relation_arity() {
        assert_eq!(Type::relation_of_arity(3).relation_arity(), Some(3));
        assert_eq!(Type::set(Type::Number).relation_arity(), None);
        assert_eq!(Type::Number.relation_arity(), None);
    }

    #[test]
    fn test_display() {
        let t = Type::map(Type::tuple(vec![Type::Number]), Type::set(Type::String));
        assert_eq!(t.to_string(), "Map<(Number), Set<String>>");
    }
}
