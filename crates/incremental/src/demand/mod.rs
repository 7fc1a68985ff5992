//! Demand: sets of parameter values a query is currently asked for,
//! and the tag/filter structures restricting maintenance to them.

mod filter;
mod trans;

pub use filter::{Filter, Structure, StructureGenerator, Tag};
pub use trans::{expand_reset_demand, incrementalize_comp_with_filtering, introduce_demand, make_demand_func};
