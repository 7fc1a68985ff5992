//! Bound/unbound masks over tuple positions.
//!
//! A mask is a string over `b` (bound, a known input) and `u` (unbound,
//! an output). Key masks have all bound positions before all unbound
//! ones; map masks are key masks with exactly one unbound position.

use crate::error::{Error, Result};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A bound/unbound pattern over the positions of a tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mask(String);

impl Mask {
    /// Parses a mask string, rejecting anything but `b` and `u`.
    pub fn new(m: &str) -> Result<Self> {
        if m.chars().all(|c| c == 'b' || c == 'u') {
            Ok(Mask(m.into()))
        } else {
            Err(Error::program(alloc::format!("Invalid mask: {:?}", m)))
        }
    }

    /// Builds a mask from per-position "is bound" flags.
    pub fn from_bools(bound: impl IntoIterator<Item = bool>) -> Self {
        Mask(bound.into_iter().map(|b| if b { 'b' } else { 'u' }).collect())
    }

    /// Mask with `bound` positions marked where the item is known.
    pub fn from_bounds<T, F>(items: &[T], is_bound: F) -> Self
    where
        F: Fn(&T) -> bool,
    {
        Self::from_bools(items.iter().map(is_bound))
    }

    /// `nb` bound positions followed by `nu` unbound ones.
    pub fn keymask(nb: usize, nu: usize) -> Self {
        let mut s = String::with_capacity(nb + nu);
        s.extend(core::iter::repeat('b').take(nb));
        s.extend(core::iter::repeat('u').take(nu));
        Mask(s)
    }

    /// `nb` bound positions followed by a single unbound one.
    pub fn mapmask(nb: usize) -> Self {
        Self::keymask(nb, 1)
    }

    /// All-unbound mask of the given length.
    pub fn all_unbound(len: usize) -> Self {
        Self::keymask(0, len)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Per-position "is bound" flags.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.chars().map(|c| c == 'b')
    }

    pub fn count_bound(&self) -> usize {
        self.bits().filter(|b| *b).count()
    }

    pub fn count_unbound(&self) -> usize {
        self.len() - self.count_bound()
    }

    pub fn is_all_bound(&self) -> bool {
        self.bits().all(|b| b)
    }

    pub fn is_all_unbound(&self) -> bool {
        self.bits().all(|b| !b)
    }

    /// Returns `(nb, nu)` if this is a key mask.
    pub fn break_keymask(&self) -> Option<(usize, usize)> {
        let nb = self.0.find('u').unwrap_or(self.len());
        if self.0[nb..].chars().all(|c| c == 'u') {
            Some((nb, self.len() - nb))
        } else {
            None
        }
    }

    pub fn is_keymask(&self) -> bool {
        self.break_keymask().is_some()
    }

    /// Returns the number of bound positions if this is a map mask.
    pub fn break_mapmask(&self) -> Option<usize> {
        match self.break_keymask() {
            Some((nb, 1)) => Some(nb),
            _ => None,
        }
    }

    pub fn is_mapmask(&self) -> bool {
        self.break_mapmask().is_some()
    }

    /// Splits items into their bound and unbound components.
    pub fn split<T: Clone>(&self, items: &[T]) -> Result<(Vec<T>, Vec<T>)> {
        if items.len() != self.len() {
            return Err(Error::program(alloc::format!(
                "Mask {} does not match arity {}",
                self,
                items.len()
            )));
        }
        let mut bound = Vec::new();
        let mut unbound = Vec::new();
        for (item, b) in items.iter().zip(self.bits()) {
            if b {
                bound.push(item.clone());
            } else {
                unbound.push(item.clone());
            }
        }
        Ok((bound, unbound))
    }

    /// Interleaves bound and unbound components back into one sequence.
    pub fn combine<T: Clone>(&self, bound: &[T], unbound: &[T]) -> Result<Vec<T>> {
        if bound.len() != self.count_bound() || unbound.len() != self.count_unbound() {
            return Err(Error::program(alloc::format!(
                "Cannot combine {} bound and {} unbound items with mask {}",
                bound.len(),
                unbound.len(),
                self
            )));
        }
        let mut bi = bound.iter();
        let mut ui = unbound.iter();
        Ok(self
            .bits()
            .filter_map(|b| if b { bi.next() } else { ui.next() })
            .cloned()
            .collect())
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
