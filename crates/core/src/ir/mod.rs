//! Intermediate representation shared by every transformation.
//!
//! Every node category is a closed enum; transformations match on it
//! exhaustively through [`Fold`] and [`Visit`].

mod clause;
mod expr;
pub mod fold;
mod pretty;
mod program;
mod query;
mod stmt;
pub mod visit;

pub use clause::Clause;
pub use expr::{BinOp, BoolOp, Builtin, CmpOp, Expr};
pub use fold::Fold;
pub use program::{FnDef, Global, GlobalKind, Program};
pub use query::{AggrOp, Comp, QueryNode};
pub use stmt::{rel_update, SetOp, Stmt};
pub use visit::Visit;
