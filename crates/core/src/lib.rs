//! ivmc Core - IR and foundational types for the ivmc incrementalizing compiler.
//!
//! This crate provides the program representation that every ivmc
//! transformation consumes and produces:
//!
//! - `ir`: expressions, statements, comprehension clauses, query nodes and
//!   programs, with the [`Fold`](ir::Fold) and [`Visit`](ir::Visit) traversals
//! - `Mask`: bound/unbound patterns over tuple positions
//! - `Value`: scalar constants
//! - `Type`: the type lattice carried by relation and map symbols
//! - `Error`: program, transformation and runtime errors
//!
//! # Example
//!
//! ```rust
//! use ivmc_core::ir::{Clause, Expr, QueryNode};
//!
//! // {y for (x, y) in R}
//! let comp = QueryNode::comp(Expr::name("y"), vec![Clause::rel_member(&["x", "y"], "R")]);
//! assert_eq!(comp.to_string(), "{y for (x, y) in R}");
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod ir;
mod mask;
mod types;
mod value;

pub use error::{Error, Result};
pub use mask::Mask;
pub use types::Type;
pub use value::Value;
