//! Symbol table: relations, maps and named queries.
//!
//! Symbols keep definition order so generated declarations and the
//! query walk of the pipeline are deterministic.

use crate::clause::ClauseTools;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use ivmc_core::ir::{self, Clause, Program, QueryNode, Visit};
use ivmc_core::{Error, Result, Type};

/// How a query is implemented.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Left alone and evaluated on every read.
    #[default]
    Normal,
    /// Replaced by a compute function evaluated on every read.
    AuxOnly,
    /// Materialized and maintained.
    Incremental,
    /// Materialized, with maintenance restricted by demand filters.
    Filtered,
}

/// How the demand parameters of a query are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DemandParamStrategy {
    /// Every parameter.
    #[default]
    All,
    /// Parameters no clause of the comprehension constrains.
    Unconstrained,
    /// The caller's list.
    Explicit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelationSym {
    pub name: String,
    pub ty: Type,
    /// Elements carry a reference count.
    pub counted: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapSym {
    pub name: String,
    pub ty: Type,
}

/// A named query and its transformation attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySym {
    pub name: String,
    pub node: QueryNode,
    /// Result type; `Top` until analyzed.
    pub ty: Type,
    pub params: Vec<String>,
    /// `None` defers to the configured default.
    pub strategy: Option<Strategy>,
    pub uses_demand: bool,
    pub demand_param_strategy: DemandParamStrategy,
    /// Parameters demand ranges over under [`DemandParamStrategy::Explicit`].
    pub demand_params: Option<Vec<String>>,
    pub demand_set: Option<String>,
    /// Query computing the demand of a nested query from its context.
    pub demand_query: Option<String>,
    pub demand_set_maxsize: Option<usize>,
    /// Caller assertion that results never need counting.
    pub count_elim_safe_override: bool,
    /// Demand-filtered clause list driving maintenance joins.
    pub filters: Option<Vec<Clause>>,
    pub maint_joins: Vec<String>,
    /// Variable prefix of a maintenance join.
    pub join_prefix: Option<String>,
    /// Query a tag or filter structure was generated for.
    pub struct_for_query: Option<String>,
}

impl QuerySym {
    pub fn new(name: impl Into<String>, node: QueryNode) -> Self {
        Self {
            name: name.into(),
            node,
            ty: Type::Top,
            params: Vec::new(),
            strategy: None,
            uses_demand: false,
            demand_param_strategy: DemandParamStrategy::All,
            demand_params: None,
            demand_set: None,
            demand_query: None,
            demand_set_maxsize: None,
            count_elim_safe_override: false,
            filters: None,
            maint_joins: Vec::new(),
            join_prefix: None,
            struct_for_query: None,
        }
    }

    pub fn with_params<S: AsRef<str>>(mut self, params: &[S]) -> Self {
        self.params = params.iter().map(|p| p.as_ref().into()).collect();
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_demand(mut self) -> Self {
        self.uses_demand = true;
        self
    }

    pub fn with_demand_params<S: AsRef<str>>(mut self, params: &[S]) -> Self {
        self.uses_demand = true;
        self.demand_param_strategy = DemandParamStrategy::Explicit;
        self.demand_params = Some(params.iter().map(|p| p.as_ref().into()).collect());
        self
    }

    pub fn with_demand_param_strategy(mut self, strategy: DemandParamStrategy) -> Self {
        self.demand_param_strategy = strategy;
        self
    }

    pub fn with_demand_set_maxsize(mut self, maxsize: usize) -> Self {
        self.demand_set_maxsize = Some(maxsize);
        self
    }

    pub fn with_count_elim_safe_override(mut self) -> Self {
        self.count_elim_safe_override = true;
        self
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = ty;
        self
    }

    /// Demand parameters chosen by the query's [`DemandParamStrategy`].
    /// Aggregates are always demanded on every parameter.
    pub fn effective_demand_params(&self, tools: &dyn ClauseTools) -> Vec<String> {
        match (self.demand_param_strategy, &self.node) {
            (DemandParamStrategy::Explicit, _) => self.demand_params.clone().unwrap_or_else(|| self.params.clone()),
            (DemandParamStrategy::Unconstrained, QueryNode::Comp(comp)) => {
                let con: Vec<String> = comp.clauses.iter().flat_map(|cl| tools.con_lhs_vars(cl)).collect();
                self.params.iter().filter(|p| !con.contains(p)).cloned().collect()
            }
            _ => self.params.clone(),
        }
    }

    /// True for maintenance joins and tag/filter structures.
    pub fn is_generated(&self) -> bool {
        self.join_prefix.is_some() || self.struct_for_query.is_some()
    }
}

/// Unbounded source of fresh variable names `_v1`, `_v2`, ...
#[derive(Clone, Debug, Default)]
pub struct FreshNames {
    next: usize,
}

impl FreshNames {
    pub fn next_var(&mut self) -> String {
        self.next += 1;
        format!("_v{}", self.next)
    }
}

#[derive(Clone, Copy, Debug)]
enum SymbolRef {
    Relation(usize),
    Map(usize),
    Query(usize),
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    relations: Vec<RelationSym>,
    maps: Vec<MapSym>,
    queries: Vec<QuerySym>,
    index: HashMap<String, SymbolRef>,
    pub fresh: FreshNames,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, name: &str) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(Error::transformation(format!(
                "Symbol \"{}\" is already defined",
                name
            )));
        }
        Ok(())
    }

    pub fn define_relation(&mut self, name: &str, ty: Type, counted: bool) -> Result<&mut RelationSym> {
        self.claim(name)?;
        let idx = self.relations.len();
        self.relations.push(RelationSym {
            name: name.into(),
            ty,
            counted,
        });
        self.index.insert(name.into(), SymbolRef::Relation(idx));
        Ok(&mut self.relations[idx])
    }

    pub fn define_map(&mut self, name: &str, ty: Type) -> Result<&mut MapSym> {
        self.claim(name)?;
        let idx = self.maps.len();
        self.maps.push(MapSym { name: name.into(), ty });
        self.index.insert(name.into(), SymbolRef::Map(idx));
        Ok(&mut self.maps[idx])
    }

    pub fn define_query(&mut self, sym: QuerySym) -> Result<&mut QuerySym> {
        self.claim(&sym.name)?;
        let idx = self.queries.len();
        self.index.insert(sym.name.clone(), SymbolRef::Query(idx));
        self.queries.push(sym);
        Ok(&mut self.queries[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSym> {
        match self.index.get(name) {
            Some(SymbolRef::Relation(i)) => Some(&self.relations[*i]),
            _ => None,
        }
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut RelationSym> {
        match self.index.get(name) {
            Some(SymbolRef::Relation(i)) => Some(&mut self.relations[*i]),
            _ => None,
        }
    }

    pub fn map(&self, name: &str) -> Option<&MapSym> {
        match self.index.get(name) {
            Some(SymbolRef::Map(i)) => Some(&self.maps[*i]),
            _ => None,
        }
    }

    pub fn query(&self, name: &str) -> Option<&QuerySym> {
        match self.index.get(name) {
            Some(SymbolRef::Query(i)) => Some(&self.queries[*i]),
            _ => None,
        }
    }

    pub fn query_mut(&mut self, name: &str) -> Option<&mut QuerySym> {
        match self.index.get(name) {
            Some(SymbolRef::Query(i)) => Some(&mut self.queries[*i]),
            _ => None,
        }
    }

    /// Query lookup that treats a missing symbol as an internal error.
    pub fn get_query(&self, name: &str) -> Result<&QuerySym> {
        self.query(name)
            .ok_or_else(|| Error::transformation(format!("No symbol for query \"{}\"", name)))
    }

    pub fn get_query_mut(&mut self, name: &str) -> Result<&mut QuerySym> {
        self.query_mut(name)
            .ok_or_else(|| Error::transformation(format!("No symbol for query \"{}\"", name)))
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationSym> {
        self.relations.iter()
    }

    pub fn maps(&self) -> impl Iterator<Item = &MapSym> {
        self.maps.iter()
    }

    pub fn queries(&self) -> impl Iterator<Item = &QuerySym> {
        self.queries.iter()
    }

    pub fn query_names(&self) -> Vec<String> {
        self.queries.iter().map(|q| q.name.clone()).collect()
    }

    /// Removes a relation symbol; the other symbols keep their order.
    pub fn remove_relation(&mut self, name: &str) -> Option<RelationSym> {
        let idx = match self.index.get(name) {
            Some(SymbolRef::Relation(i)) => *i,
            _ => return None,
        };
        let sym = self.relations.remove(idx);
        self.reindex();
        Some(sym)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, r) in self.relations.iter().enumerate() {
            self.index.insert(r.name.clone(), SymbolRef::Relation(i));
        }
        for (i, m) in self.maps.iter().enumerate() {
            self.index.insert(m.name.clone(), SymbolRef::Map(i));
        }
        for (i, q) in self.queries.iter().enumerate() {
            self.index.insert(q.name.clone(), SymbolRef::Query(i));
        }
    }

    /// Checks that every query occurrence, in the program and inside
    /// other query definitions, equals its symbol's definition.
    pub fn check_consistency(&self, program: &Program) -> Result<()> {
        let mut occ = OccurrenceCollector::default();
        occ.visit_program(program);
        for q in &self.queries {
            ir::visit::walk_query_node(&mut occ, &q.node);
        }
        for (name, node) in occ.found {
            let sym = self.get_query(&name)?;
            if sym.node != node {
                return Err(Error::transformation(format!(
                    "Inconsistent symbol and occurrence for query \"{}\": {}, {}",
                    name, sym.node, node
                )));
            }
        }
        Ok(())
    }
}

/// Collects every query occurrence with its node.
#[derive(Default)]
pub(crate) struct OccurrenceCollector {
    pub(crate) found: Vec<(String, QueryNode)>,
}

impl Visit for OccurrenceCollector {
    fn visit_query(&mut self, name: &str, node: &QueryNode) {
        self.found.push((name.into(), node.clone()));
        ir::visit::walk_query_node(self, node);
    }
}
