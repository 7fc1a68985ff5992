//! Canonical names for generated stores, functions and variables.
//!
//! Every name is a pure function of the invariant or query it belongs
//! to, so the same invariant reached twice yields the same name.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use ivmc_core::Mask;

/// Result relation (or map) of a query.
pub fn result_set(query: &str) -> String {
    format!("R_{}", query)
}

/// Auxiliary map indexing `rel` by the bound positions of `mask`.
pub fn auxmap(rel: &str, mask: &Mask, unwrap_value: bool) -> String {
    if unwrap_value {
        format!("{}_{}_unwrapped", rel, mask)
    } else {
        format!("{}_{}", rel, mask)
    }
}

/// Relation of `(key..., value)` tuples derived from `map`.
pub fn set_from_map(map: &str, mask: &Mask) -> String {
    if mask.as_str() == "bu" {
        format!("S{}", map)
    } else {
        format!("S{}_{}", map, mask)
    }
}

pub fn wrap(rel: &str) -> String {
    format!("{}_wrapped", rel)
}

pub fn unwrap(rel: &str) -> String {
    format!("{}_unwrapped", rel)
}

/// Maintenance function keeping `inv` in sync with `op` updates of `watched`.
pub fn maint_func(inv: &str, watched: &str, op: &str) -> String {
    format!("_maint_{}_for_{}_{}", inv, watched, op)
}

pub fn compute_func(query: &str) -> String {
    format!("_compute_{}", query)
}

pub fn demand_func(query: &str) -> String {
    format!("_demand_{}", query)
}

pub fn demand_set(query: &str) -> String {
    format!("_U_{}", query)
}

/// Query yielding the demand of a nested query.
pub fn demand_query(query: &str) -> String {
    format!("_QU_{}", query)
}

/// Tag over `var`; `n` disambiguates several tags on one variable.
pub fn tag(query: &str, var: &str, n: Option<usize>) -> String {
    match n {
        Some(n) => format!("{}_T_{}_{}", query, var, n),
        None => format!("{}_T_{}", query, var),
    }
}

/// Filter over `rel`; `n` disambiguates several filters on one relation.
pub fn filter(query: &str, rel: &str, n: Option<usize>) -> String {
    match n {
        Some(n) => format!("{}_d{}_{}", query, rel, n),
        None => format!("{}_d{}", query, rel),
    }
}

pub fn maint_join(query: &str, n: usize) -> String {
    format!("{}_J{}", query, n)
}

/// `n` variable names sharing `prefix`.
pub fn subnames(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{}_v{}", prefix, i)).collect()
}
