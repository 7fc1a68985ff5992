//! Aggregate invariants: count, sum, min and max kept per group key.

mod handler;
mod trans;

pub use handler::{handler_for, AggrHandler, Count, CountedSum, MinMax, Sum};
pub use trans::{aggr_invariant, aggr_maint_func, incrementalize_aggr};
