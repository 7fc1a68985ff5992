//! Mutable stores behind set, tree and map values.
//!
//! Updates are checked: adding a present element, removing an absent
//! one or reassigning a bound map key is a runtime error. Generated
//! maintenance code relies on these preconditions, so a violation
//! points at wrong code rather than at bad input.

use crate::value::Val;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec::Vec;
use hashbrown::HashMap;
use ivmc_core::ir::SetOp;
use ivmc_core::{Error, Result};

/// A set whose elements carry a reference count.
///
/// Iteration follows insertion order, so `peek` yields the element
/// held the longest.
#[derive(Debug, Default)]
pub struct Bag {
    counts: HashMap<Val, (usize, u64)>,
    order: BTreeMap<u64, Val>,
    next_seq: u64,
}

impl Bag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct elements.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn contains(&self, elem: &Val) -> bool {
        self.counts.contains_key(elem)
    }

    /// Reference count of `elem`, zero when absent.
    pub fn count(&self, elem: &Val) -> usize {
        self.counts.get(elem).map_or(0, |(n, _)| *n)
    }

    /// Adds an absent element with count one.
    pub fn add(&mut self, elem: Val) -> Result<()> {
        if self.contains(&elem) {
            return Err(Error::runtime(format!("Add of {}, which is already present", elem)));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, elem.clone());
        self.counts.insert(elem, (1, seq));
        Ok(())
    }

    /// Removes an element whose count is exactly one.
    pub fn remove(&mut self, elem: &Val) -> Result<()> {
        match self.count(elem) {
            0 => Err(Error::runtime(format!("Remove of {}, which is absent", elem))),
            1 => {
                if let Some((_, seq)) = self.counts.remove(elem) {
                    self.order.remove(&seq);
                }
                Ok(())
            }
            n => Err(Error::runtime(format!(
                "Remove of {}, which still has count {}",
                elem, n
            ))),
        }
    }

    pub fn inc_count(&mut self, elem: &Val) -> Result<()> {
        match self.counts.get_mut(elem) {
            Some((n, _)) => {
                *n += 1;
                Ok(())
            }
            None => Err(Error::runtime(format!("IncCount of {}, which is absent", elem))),
        }
    }

    /// Decrements a count that stays positive.
    pub fn dec_count(&mut self, elem: &Val) -> Result<()> {
        match self.counts.get_mut(elem) {
            Some((n, _)) if *n > 1 => {
                *n -= 1;
                Ok(())
            }
            Some(_) => Err(Error::runtime(format!("DecCount of {} would drop its last reference", elem))),
            None => Err(Error::runtime(format!("DecCount of {}, which is absent", elem))),
        }
    }

    /// Adds one reference to `elem`, whether or not it is present.
    pub fn insert(&mut self, elem: Val) {
        match self.counts.get_mut(&elem) {
            Some((n, _)) => *n += 1,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.order.insert(seq, elem.clone());
                self.counts.insert(elem, (1, seq));
            }
        }
    }

    pub fn update(&mut self, op: SetOp, elem: Val) -> Result<()> {
        match op {
            SetOp::Add => self.add(elem),
            SetOp::Remove => self.remove(&elem),
            SetOp::IncCount => self.inc_count(&elem),
            SetOp::DecCount => self.dec_count(&elem),
        }
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.order.clear();
    }

    /// The element held the longest.
    pub fn peek(&self) -> Option<&Val> {
        self.order.values().next()
    }

    /// Distinct elements in insertion order.
    pub fn elements(&self) -> Vec<Val> {
        self.order.values().cloned().collect()
    }

    /// Elements with their counts, in insertion order.
    pub fn counts(&self) -> Vec<(Val, usize)> {
        self.order
            .values()
            .map(|e| (e.clone(), self.count(e)))
            .collect()
    }
}

/// An ordered multiset.
#[derive(Debug, Default)]
pub struct Tree {
    items: BTreeMap<Val, usize>,
    len: usize,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements, counting repeats.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, elem: &Val) -> bool {
        self.items.contains_key(elem)
    }

    pub fn add(&mut self, elem: Val) {
        *self.items.entry(elem).or_insert(0) += 1;
        self.len += 1;
    }

    pub fn remove(&mut self, elem: &Val) -> Result<()> {
        let n = self
            .items
            .get_mut(elem)
            .ok_or_else(|| Error::runtime(format!("Remove of {} from tree, which is absent", elem)))?;
        if *n > 1 {
            *n -= 1;
        } else {
            self.items.remove(elem);
        }
        self.len -= 1;
        Ok(())
    }

    pub fn update(&mut self, op: SetOp, elem: Val) -> Result<()> {
        match op {
            SetOp::Add => {
                self.add(elem);
                Ok(())
            }
            SetOp::Remove => self.remove(&elem),
            SetOp::IncCount | SetOp::DecCount => Err(Error::runtime(format!(
                "Trees do not support {}",
                op.name()
            ))),
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.len = 0;
    }

    pub fn min(&self) -> Option<&Val> {
        self.items.keys().next()
    }

    pub fn max(&self) -> Option<&Val> {
        self.items.keys().next_back()
    }

    /// Elements in ascending order, repeats included.
    pub fn elements(&self) -> Vec<Val> {
        self.items
            .iter()
            .flat_map(|(e, n)| core::iter::repeat(e.clone()).take(*n))
            .collect()
    }
}

/// A map whose keys are bound and unbound explicitly.
#[derive(Debug, Default)]
pub struct Dict {
    entries: BTreeMap<Val, Val>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &Val) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &Val) -> Option<&Val> {
        self.entries.get(key)
    }

    /// Binds an absent key.
    pub fn assign(&mut self, key: Val, value: Val) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(Error::runtime(format!("Assignment to bound map key {}", key)));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Unbinds a present key, returning its value.
    pub fn delete(&mut self, key: &Val) -> Result<Val> {
        self.entries
            .remove(key)
            .ok_or_else(|| Error::runtime(format!("Deletion of unbound map key {}", key)))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<Val> {
        self.entries.keys().cloned().collect()
    }

    /// Entries in ascending key order.
    pub fn entries(&self) -> Vec<(Val, Val)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
