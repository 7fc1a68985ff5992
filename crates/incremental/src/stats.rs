//! Transformation counters. Reporting only; nothing branches on them.

use core::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub queries_transformed: usize,
    pub comps_transformed: usize,
    pub aggrs_transformed: usize,
    pub auxmaps_transformed: usize,
    pub tags_created: usize,
    pub filters_created: usize,
    pub auxmap_rounds: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queries={} comps={} aggrs={} auxmaps={} tags={} filters={} auxmap_rounds={}",
            self.queries_transformed,
            self.comps_transformed,
            self.aggrs_transformed,
            self.auxmaps_transformed,
            self.tags_created,
            self.filters_created,
            self.auxmap_rounds
        )
    }
}
