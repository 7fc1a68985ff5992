//! Transformation options.

use crate::symtab::Strategy;

/// Options shared by every transformation in one compilation unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Allow uncounted result relations for duplicate-safe comprehensions.
    pub elim_counts: bool,
    /// Gate each filter on a single predecessor tag instead of all of them.
    pub use_singletag_demand: bool,
    /// Eviction bound applied to demand sets whose query sets none.
    pub default_demand_set_maxsize: Option<usize>,
    /// Drop relations that are never read after transformation.
    pub elim_dead_relations: bool,
    /// Strategy given to queries defined without one.
    pub default_strategy: Strategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elim_counts: true,
            use_singletag_demand: false,
            default_demand_set_maxsize: None,
            elim_dead_relations: false,
            default_strategy: Strategy::Normal,
        }
    }
}

impl Config {
    pub fn with_elim_counts(mut self, on: bool) -> Self {
        self.elim_counts = on;
        self
    }

    pub fn with_singletag_demand(mut self, on: bool) -> Self {
        self.use_singletag_demand = on;
        self
    }

    pub fn with_default_demand_set_maxsize(mut self, maxsize: Option<usize>) -> Self {
        self.default_demand_set_maxsize = maxsize;
        self
    }

    pub fn with_elim_dead_relations(mut self, on: bool) -> Self {
        self.elim_dead_relations = on;
        self
    }

    pub fn with_default_strategy(mut self, strategy: Strategy) -> Self {
        self.default_strategy = strategy;
        self
    }
}
