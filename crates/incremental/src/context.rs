//! Shared transformation state.

use crate::clause::{ClauseTools, CoreClauseTools};
use crate::config::Config;
use crate::invariant::{Invariant, OrderedSet};
use crate::stats::Stats;
use crate::symtab::SymbolTable;
use alloc::rc::Rc;

/// Everything a transformation reads or updates besides the program.
pub struct Ctx {
    pub symtab: SymbolTable,
    pub config: Config,
    pub stats: Stats,
    /// Invariants installed so far, in installation order.
    pub invariants: OrderedSet<Invariant>,
    clause_tools: Rc<dyn ClauseTools>,
}

impl Ctx {
    pub fn new(symtab: SymbolTable, config: Config) -> Self {
        Self {
            symtab,
            config,
            stats: Stats::default(),
            invariants: OrderedSet::new(),
            clause_tools: Rc::new(CoreClauseTools),
        }
    }

    /// Replaces the clause tools used by every transformation.
    pub fn with_clause_tools(mut self, tools: Rc<dyn ClauseTools>) -> Self {
        self.clause_tools = tools;
        self
    }

    /// Shared handle on the clause tools, detached from the borrow of `self`.
    pub fn clause_tools(&self) -> Rc<dyn ClauseTools> {
        Rc::clone(&self.clause_tools)
    }
}

impl core::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ctx")
            .field("symtab", &self.symtab)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("invariants", &self.invariants.len())
            .finish()
    }
}
