//! ivmc Incremental - compiles queries over relations and maps into
//! maintained imperative code.
//!
//! Each query (a set comprehension or an aggregate) is replaced by a
//! materialized store, and every update of a store the query reads is
//! followed (or preceded) by a call to a generated maintenance function
//! that keeps the materialized result consistent.
//!
//! # Components
//!
//! - `invariant` / `naming`: what each materialized structure must equal,
//!   and the canonical names of generated stores and functions
//! - `maint`: maintenance-function synthesis and placement around updates
//! - `auxmap`: auxiliary maps backing image-set lookups, set-from-map
//!   relations and wrapped relations, installed to a fixpoint
//! - `aggr`: count, sum, min and max maintained per group key
//! - `comp`: comprehension results maintained through delta joins
//! - `demand`: demand sets, and tag/filter structures restricting
//!   maintenance to demanded parameter values
//! - `dead`: removal of relations nothing reads
//! - `pipeline`: a reference driver dispatching on each query's strategy
//!
//! # Example
//!
//! ```rust
//! use ivmc_core::ir::{Clause, Expr, Program, QueryNode, SetOp, Stmt};
//! use ivmc_core::Type;
//! use ivmc_incremental::{transform_program, Config, Ctx, QuerySym, Strategy, SymbolTable};
//!
//! let mut symtab = SymbolTable::new();
//! symtab
//!     .define_relation("R", Type::relation_of_arity(2), false)
//!     .unwrap();
//! let node = QueryNode::comp(Expr::name("y"), vec![Clause::rel_member(&["x", "y"], "R")]);
//! symtab
//!     .define_query(QuerySym::new("Q", node.clone()).with_strategy(Strategy::Incremental))
//!     .unwrap();
//!
//! let program = Program::new(vec![
//!     Stmt::rel_update("R", SetOp::Add, "e"),
//!     Stmt::assign("out", Expr::query("Q", node)),
//! ]);
//! let mut ctx = Ctx::new(symtab, Config::default());
//! let out = transform_program(program, &mut ctx).unwrap();
//! assert!(out.func("_maint_R_Q_for_R_add").is_some());
//! ```

#![no_std]

extern crate alloc;

pub mod aggr;
pub mod auxmap;
pub mod clause;
pub mod comp;
pub mod config;
pub mod context;
pub mod dead;
pub mod demand;
pub mod infer;
pub mod invariant;
pub mod maint;
pub mod naming;
pub mod pipeline;
pub mod rewrite;
pub mod stats;
pub mod symtab;

pub use aggr::incrementalize_aggr;
pub use auxmap::transform_all_auxmaps;
pub use clause::{ClauseTools, CoreClauseTools};
pub use comp::{incrementalize_comp, transform_aux_comp};
pub use config::Config;
pub use context::Ctx;
pub use dead::eliminate_dead_relations;
pub use demand::{expand_reset_demand, incrementalize_comp_with_filtering, introduce_demand};
pub use invariant::{Invariant, OrderedSet};
pub use maint::{MaintHooks, UpdateKind};
pub use pipeline::{transform_program, Pipeline, TransformPass};
pub use stats::Stats;
pub use symtab::{DemandParamStrategy, QuerySym, Strategy, SymbolTable};
