//! ivmc Runtime - a reference interpreter for ivmc programs.
//!
//! Runs a program before and after incrementalization so that each
//! maintained store can be compared with the query it replaces,
//! evaluated from scratch.
//!
//! - `value`: runtime values; sets, trees and maps are shared handles
//! - `store`: the checked stores behind them
//! - `interp`: statement execution and expression evaluation
//! - `query`: from-scratch comprehensions, aggregates and lookups
//!
//! # Example
//!
//! ```rust
//! use ivmc_core::ir::{Clause, Expr, Program, QueryNode, SetOp, Stmt};
//! use ivmc_runtime::{Interpreter, Val};
//!
//! let node = QueryNode::comp(Expr::name("y"), vec![Clause::rel_member(&["x", "y"], "R")]);
//! let mut program = Program::new(vec![
//!     Stmt::assign("e", Expr::tuple([Expr::int(1), Expr::int(2)])),
//!     Stmt::rel_update("R", SetOp::Add, "e"),
//!     Stmt::assign("out", Expr::query("Q", node)),
//! ]);
//! program.declare_relation("R", false);
//!
//! let mut interp = Interpreter::new(&program);
//! interp.run().unwrap();
//! let out = interp.var("out").and_then(Val::sorted_elements).unwrap();
//! assert_eq!(out, vec![Val::int(2)]);
//! ```

#![no_std]

extern crate alloc;

mod interp;
mod query;
mod store;
mod value;

pub use interp::Interpreter;
pub use store::{Bag, Dict, Tree};
pub use value::Val;
