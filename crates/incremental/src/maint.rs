//! Maintenance-function synthesis and placement.
//!
//! A maintenance function keeps one invariant consistent with one kind
//! of update to one watched store. [`MaintHooks`] places calls to those
//! functions around every matching update in a program: removal-like
//! maintenance runs before the base update, addition-like maintenance
//! after it.

use crate::context::Ctx;
use crate::invariant::Invariant;
use crate::{aggr, auxmap, comp};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashMap;
use ivmc_core::ir::{self, Expr, FnDef, SetOp, Stmt};
use ivmc_core::Result;
use tracing::debug;

/// An update that may need maintenance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// Element added to a relation.
    Add,
    /// Element removed from a relation.
    Remove,
    /// Key assigned in a map.
    Assign,
    /// Key deleted from a map.
    Delete,
}

impl UpdateKind {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateKind::Add => "add",
            UpdateKind::Remove => "remove",
            UpdateKind::Assign => "assign",
            UpdateKind::Delete => "delete",
        }
    }

    /// Removal-like updates are maintained before they happen.
    pub fn is_removal(&self) -> bool {
        matches!(self, UpdateKind::Remove | UpdateKind::Delete)
    }

    /// The relation update kind of a set operation, if it is maintained.
    pub fn from_set_op(op: SetOp) -> Option<Self> {
        match op {
            SetOp::Add => Some(UpdateKind::Add),
            SetOp::Remove => Some(UpdateKind::Remove),
            SetOp::IncCount | SetOp::DecCount => None,
        }
    }

    pub fn set_op(&self) -> SetOp {
        if self.is_removal() {
            SetOp::Remove
        } else {
            SetOp::Add
        }
    }
}

/// Combines a base update with its maintenance code.
pub fn insert_rel_maint(update: Vec<Stmt>, maint: Vec<Stmt>, kind: UpdateKind) -> Vec<Stmt> {
    let mut code = Vec::with_capacity(update.len() + maint.len());
    if kind.is_removal() {
        code.extend(maint);
        code.extend(update);
    } else {
        code.extend(update);
        code.extend(maint);
    }
    code
}

/// Call statement of a maintenance function.
pub fn maint_call(func: &str, args: Vec<Expr>) -> Stmt {
    Stmt::call(func, args)
}

/// Builds the maintenance function of `inv` for `kind` updates of
/// `watched`.
pub fn synthesize(ctx: &mut Ctx, inv: &Invariant, watched: &str, kind: UpdateKind) -> Result<FnDef> {
    let func = match inv {
        Invariant::Auxmap(inv) => auxmap::auxmap_maint_func(ctx, inv, kind)?,
        Invariant::SetFromMap(inv) => auxmap::setfrommap_maint_func(ctx, inv, kind)?,
        Invariant::Wrap(inv) => auxmap::wrap_maint_func(ctx, inv, kind)?,
        Invariant::Aggr(inv) => aggr::aggr_maint_func(ctx, inv, watched, kind)?,
        Invariant::Comp(inv) => comp::comp_maint_func(ctx, inv, watched, kind)?,
    };
    debug!(func = %func.name, invariant = inv.name(), "synthesized maintenance function");
    Ok(func)
}

/// A maintenance function together with the update that triggers it.
#[derive(Clone, Debug)]
pub struct MaintFunc {
    pub watched: String,
    pub kind: UpdateKind,
    pub func: FnDef,
}

/// Synthesizes every maintenance function `inv` needs.
pub fn synthesize_all(ctx: &mut Ctx, inv: &Invariant) -> Result<Vec<MaintFunc>> {
    let tools = ctx.clause_tools();
    let triggers = inv.triggers(&|comp| tools.rhs_rels_from_comp(comp));
    let mut out = Vec::with_capacity(triggers.len());
    for (watched, kind) in triggers {
        let func = synthesize(ctx, inv, &watched, kind)?;
        out.push(MaintFunc { watched, kind, func });
    }
    Ok(out)
}

#[derive(Clone, Debug, Default)]
struct ClearHook {
    before: Vec<Stmt>,
    after: Vec<Stmt>,
}

/// Maintenance to place at update sites, applied with [`ir::Fold`].
///
/// Several functions hooked to one update run in hook order on
/// addition and in reverse order on removal.
#[derive(Clone, Debug, Default)]
pub struct MaintHooks {
    updates: HashMap<(String, UpdateKind), Vec<String>>,
    clears: HashMap<String, ClearHook>,
    map_clears: HashMap<String, Vec<Stmt>>,
}

impl MaintHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `func` on every `kind` update of `watched`.
    pub fn on_update(&mut self, watched: &str, kind: UpdateKind, func: &str) {
        self.updates
            .entry((watched.into(), kind))
            .or_default()
            .push(func.into());
    }

    /// Hooks every function in `funcs` to its trigger.
    pub fn on_updates(&mut self, funcs: &[MaintFunc]) {
        for f in funcs {
            self.on_update(&f.watched, f.kind, &f.func.name);
        }
    }

    /// Runs `code` before every clear of relation `rel`.
    pub fn before_clear(&mut self, rel: &str, code: Vec<Stmt>) {
        self.clears.entry(rel.into()).or_default().before.extend(code);
    }

    /// Runs `code` after every clear of relation `rel`.
    pub fn after_clear(&mut self, rel: &str, code: Vec<Stmt>) {
        self.clears.entry(rel.into()).or_default().after.extend(code);
    }

    /// Runs `code` before every clear of map `map`.
    pub fn before_map_clear(&mut self, map: &str, code: Vec<Stmt>) {
        self.map_clears.entry(map.into()).or_default().extend(code);
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.clears.is_empty() && self.map_clears.is_empty()
    }

    fn calls(&self, watched: &str, kind: UpdateKind, args: &[Expr]) -> Vec<Stmt> {
        let funcs = match self.updates.get(&(String::from(watched), kind)) {
            Some(funcs) => funcs,
            None => return Vec::new(),
        };
        let mut calls: Vec<Stmt> = funcs
            .iter()
            .map(|f| maint_call(f, args.to_vec()))
            .collect();
        if kind.is_removal() {
            calls.reverse();
        }
        calls
    }
}

impl ir::Fold for MaintHooks {
    fn fold_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>> {
        let stmt = ir::fold::walk_stmt(self, stmt)?;
        let code = match &stmt {
            Stmt::RelUpdate { rel, op, elem } => match UpdateKind::from_set_op(*op) {
                Some(kind) => {
                    let maint = self.calls(rel, kind, &[Expr::name(elem.as_str())]);
                    insert_rel_maint(vec![stmt.clone()], maint, kind)
                }
                None => vec![stmt.clone()],
            },
            Stmt::RelClear { rel } => match self.clears.get(rel) {
                Some(hook) => {
                    let mut code = hook.before.clone();
                    code.push(stmt.clone());
                    code.extend(hook.after.iter().cloned());
                    code
                }
                None => vec![stmt.clone()],
            },
            Stmt::MapAssign { map, key, value } => {
                let maint = self.calls(map, UpdateKind::Assign, &[key.clone(), value.clone()]);
                insert_rel_maint(vec![stmt.clone()], maint, UpdateKind::Assign)
            }
            Stmt::MapDelete { map, key } => {
                let maint = self.calls(map, UpdateKind::Delete, &[key.clone()]);
                insert_rel_maint(vec![stmt.clone()], maint, UpdateKind::Delete)
            }
            Stmt::MapClear { map } => match self.map_clears.get(map) {
                Some(before) => {
                    let mut code = before.clone();
                    code.push(stmt.clone());
                    code
                }
                None => vec![stmt.clone()],
            },
            _ => vec![stmt.clone()],
        };
        Ok(code)
    }
}
