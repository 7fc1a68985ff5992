//! Invariants: value descriptions of the structures the engine maintains.
//!
//! Two invariants are the same structure exactly when they are equal as
//! values, so they are collected in an [`OrderedSet`] keyed by value.

use crate::maint::UpdateKind;
use crate::naming;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashSet;
use ivmc_core::ir::{AggrOp, Comp};
use ivmc_core::Mask;

/// Map from the bound positions of `rel` (per `mask`) to the set of
/// unbound remainders.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AuxmapInvariant {
    pub map: String,
    pub rel: String,
    pub mask: Mask,
    /// The key is a bare value instead of a 1-tuple.
    pub unwrap_key: bool,
    /// The image elements are bare values instead of 1-tuples.
    pub unwrap_value: bool,
}

impl AuxmapInvariant {
    pub fn new(rel: &str, mask: Mask, unwrap_key: bool, unwrap_value: bool) -> Self {
        Self {
            map: naming::auxmap(rel, &mask, unwrap_value),
            rel: rel.into(),
            mask,
            unwrap_key,
            unwrap_value,
        }
    }
}

/// Relation of `(key..., value)` tuples mirroring map `map`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SetFromMapInvariant {
    pub rel: String,
    pub map: String,
    /// Map mask: one bound position per key component, one unbound.
    pub mask: Mask,
}

impl SetFromMapInvariant {
    pub fn new(map: &str, mask: Mask) -> Self {
        Self {
            rel: naming::set_from_map(map, &mask),
            map: map.into(),
            mask,
        }
    }
}

/// `rel` holds every element of `oper` wrapped in a 1-tuple, or with
/// the 1-tuple removed when `unwrap` is set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WrapInvariant {
    pub rel: String,
    pub oper: String,
    pub unwrap: bool,
}

impl WrapInvariant {
    pub fn new(oper: &str, unwrap: bool) -> Self {
        let rel = if unwrap {
            naming::unwrap(oper)
        } else {
            naming::wrap(oper)
        };
        Self {
            rel,
            oper: oper.into(),
            unwrap,
        }
    }
}

/// Map from group key to aggregate state over the image of `rel`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggrInvariant {
    pub map: String,
    pub op: AggrOp,
    pub rel: String,
    pub mask: Mask,
    /// The operand is the unwrapped image: exactly one unbound position.
    pub unwrap: bool,
    pub params: Vec<String>,
    /// Demand set restricting which keys are kept.
    pub restr: Option<String>,
}

impl AggrInvariant {
    pub fn uses_demand(&self) -> bool {
        self.restr.is_some()
    }
}

/// Result relation `rel` of a comprehension query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompInvariant {
    pub query: String,
    pub rel: String,
    pub comp: Comp,
    pub counted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Invariant {
    Auxmap(AuxmapInvariant),
    SetFromMap(SetFromMapInvariant),
    Wrap(WrapInvariant),
    Aggr(AggrInvariant),
    Comp(CompInvariant),
}

impl Invariant {
    /// Name of the maintained store.
    pub fn name(&self) -> &str {
        match self {
            Invariant::Auxmap(inv) => &inv.map,
            Invariant::SetFromMap(inv) => &inv.rel,
            Invariant::Wrap(inv) => &inv.rel,
            Invariant::Aggr(inv) => &inv.map,
            Invariant::Comp(inv) => &inv.rel,
        }
    }

    /// Every `(store, update kind)` pair that needs a maintenance function.
    pub fn triggers(&self, rhs_rels: &dyn Fn(&Comp) -> Vec<String>) -> Vec<(String, UpdateKind)> {
        let both = |rel: &str| -> Vec<(String, UpdateKind)> {
            vec![(rel.into(), UpdateKind::Add), (rel.into(), UpdateKind::Remove)]
        };
        match self {
            Invariant::Auxmap(inv) => both(&inv.rel),
            Invariant::Wrap(inv) => both(&inv.oper),
            Invariant::SetFromMap(inv) => vec![
                (inv.map.clone(), UpdateKind::Assign),
                (inv.map.clone(), UpdateKind::Delete),
            ],
            Invariant::Aggr(inv) => {
                let mut out = both(&inv.rel);
                if let Some(restr) = &inv.restr {
                    out.extend(both(restr));
                }
                out
            }
            Invariant::Comp(inv) => rhs_rels(&inv.comp).iter().flat_map(|r| both(r)).collect(),
        }
    }

    /// Name of the function maintaining this invariant for one trigger.
    pub fn maint_func_name(&self, watched: &str, kind: UpdateKind) -> String {
        naming::maint_func(self.name(), watched, kind.name())
    }
}

/// Insertion-ordered set keyed by value.
#[derive(Clone, Debug)]
pub struct OrderedSet<T: Eq + Hash + Clone> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> OrderedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `item`, returning false if an equal value is already present.
    pub fn insert(&mut self, item: T) -> bool {
        if self.seen.contains(&item) {
            return false;
        }
        self.seen.insert(item.clone());
        self.items.push(item);
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.seen.contains(item)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Eq + Hash + Clone> Extend<T> for OrderedSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a, T: Eq + Hash + Clone> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bu() -> Mask {
        Mask::new("bu").unwrap()
    }

    #[test]
    fn test_ordered_set_dedups_by_value() {
        let mut set = OrderedSet::new();
        assert!(set.insert(Invariant::Auxmap(AuxmapInvariant::new("R", bu(), true, false))));
        assert!(set.insert(Invariant::Wrap(WrapInvariant::new("R", false))));
        assert!(!set.insert(Invariant::Auxmap(AuxmapInvariant::new("R", bu(), true, false))));
        assert_eq!(set.len(), 2);
        let names: Vec<&str> = set.iter().map(Invariant::name).collect();
        assert_eq!(names, vec!["R_bu", "R_wrapped"]);
    }

    #[test]
    fn test_unwrap_value_gets_its_own_map() {
        let plain = AuxmapInvariant::new("R", bu(), true, false);
        let unwrapped = AuxmapInvariant::new("R", bu(), true, true);
        assert_ne!(plain.map, unwrapped.map);
    }

    #[test]
    fn test_triggers() {
        let sfm = Invariant::SetFromMap(SetFromMapInvariant::new("M", bu()));
        let none = |_: &Comp| Vec::new();
        assert_eq!(
            sfm.triggers(&none),
            vec![
                (String::from("M"), UpdateKind::Assign),
                (String::from("M"), UpdateKind::Delete)
            ]
        );
        assert_eq!(sfm.maint_func_name("M", UpdateKind::Delete), "_maint_SM_for_M_delete");

        let aggr = Invariant::Aggr(AggrInvariant {
            map: "R_Q".into(),
            op: AggrOp::Count,
            rel: "R".into(),
            mask: Mask::new("u").unwrap(),
            unwrap: false,
            params: Vec::new(),
            restr: Some("_U_Q".into()),
        });
        assert_eq!(aggr.triggers(&none).len(), 4);
    }
}
