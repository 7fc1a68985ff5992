//! Reference driver running every transformation in order.
//!
//! The default passes are:
//! 1. [`DemandPass`] - demand sets and demand queries for queries that use demand
//! 2. [`QueryPass`] - per-query dispatch on the strategy
//! 3. [`AuxmapPass`] - auxiliary maps for every remaining lookup
//! 4. [`DeadRelationPass`] - only when `elim_dead_relations` is set
//! 5. [`DeclareGlobalsPass`] - a global for every relation and map symbol

use crate::aggr;
use crate::auxmap;
use crate::comp;
use crate::context::Ctx;
use crate::dead;
use crate::demand;
use crate::rewrite::node_size;
use crate::symtab::{OccurrenceCollector, QuerySym, Strategy};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use ivmc_core::ir::{Program, QueryNode, Visit};
use ivmc_core::Result;
use tracing::{debug, info, trace};

/// One whole-program step of the pipeline.
pub trait TransformPass {
    fn run(&self, program: Program, ctx: &mut Ctx) -> Result<Program>;

    fn name(&self) -> &'static str {
        "unnamed"
    }
}

/// The strategy `sym` is implemented with under `ctx`'s defaults.
/// Aggregates have no auxiliary-only form and need no filters.
pub fn effective_strategy(ctx: &Ctx, sym: &QuerySym) -> Strategy {
    let strategy = sym.strategy.unwrap_or(ctx.config.default_strategy);
    match (&sym.node, strategy) {
        (QueryNode::Comp(_), s) => s,
        (_, Strategy::AuxOnly) => Strategy::Normal,
        (_, Strategy::Filtered) => Strategy::Incremental,
        (_, s) => s,
    }
}

/// User queries, nested ones before the queries containing them.
fn user_queries(ctx: &Ctx) -> Vec<String> {
    let mut queries: Vec<(usize, String)> = ctx
        .symtab
        .queries()
        .filter(|q| !q.is_generated())
        .map(|q| (node_size(&q.node), q.name.clone()))
        .collect();
    queries.sort_by_key(|(size, _)| *size);
    queries.into_iter().map(|(_, name)| name).collect()
}

/// A maintained aggregate over a demand-driven query needs demand of
/// its own to pass down.
fn infer_aggregate_demand(ctx: &mut Ctx, name: &str) -> Result<()> {
    let sym = ctx.symtab.get_query(name)?;
    let QueryNode::Aggr { value, .. } = &sym.node else {
        return Ok(());
    };
    if sym.uses_demand || effective_strategy(ctx, sym) == Strategy::Normal {
        return Ok(());
    }
    let mut occ = OccurrenceCollector::default();
    occ.visit_expr(value);
    let demanded = occ.found.iter().any(|(inner, _)| {
        ctx.symtab
            .query(inner)
            .is_some_and(|q| q.uses_demand && effective_strategy(ctx, q) != Strategy::Normal)
    });
    if demanded {
        debug!(query = name, "aggregate uses demand of its operand");
        ctx.symtab.get_query_mut(name)?.uses_demand = true;
    }
    Ok(())
}

pub struct DemandPass;

impl TransformPass for DemandPass {
    fn run(&self, mut program: Program, ctx: &mut Ctx) -> Result<Program> {
        let queries = user_queries(ctx);
        for name in &queries {
            infer_aggregate_demand(ctx, name)?;
        }
        // Enclosing queries first, so nested ones see their demand clause.
        for name in queries.iter().rev() {
            let sym = ctx.symtab.get_query(name)?;
            if sym.uses_demand && effective_strategy(ctx, sym) != Strategy::Normal {
                program = demand::introduce_demand(program, ctx, name)?;
            }
        }
        demand::expand_reset_demand(program, ctx)
    }

    fn name(&self) -> &'static str {
        "demand"
    }
}

pub struct QueryPass;

impl TransformPass for QueryPass {
    fn run(&self, mut program: Program, ctx: &mut Ctx) -> Result<Program> {
        for name in user_queries(ctx) {
            let sym = ctx.symtab.get_query(&name)?;
            let strategy = effective_strategy(ctx, sym);
            let is_comp = matches!(sym.node, QueryNode::Comp(_));
            program = match (strategy, is_comp) {
                (Strategy::Normal, _) => continue,
                (Strategy::AuxOnly, true) => comp::transform_aux_comp(program, ctx, &name)?,
                (Strategy::Incremental, true) => comp::incrementalize_comp(program, ctx, &name)?,
                (Strategy::Filtered, true) => demand::incrementalize_comp_with_filtering(program, ctx, &name)?,
                (_, false) => aggr::incrementalize_aggr(program, ctx, &name)?,
            };
            ctx.stats.queries_transformed += 1;
            debug!(query = %name, ?strategy, "transformed query");
        }
        Ok(program)
    }

    fn name(&self) -> &'static str {
        "queries"
    }
}

pub struct AuxmapPass;

impl TransformPass for AuxmapPass {
    fn run(&self, program: Program, ctx: &mut Ctx) -> Result<Program> {
        auxmap::transform_all_auxmaps(program, ctx)
    }

    fn name(&self) -> &'static str {
        "auxmaps"
    }
}

pub struct DeadRelationPass;

impl TransformPass for DeadRelationPass {
    fn run(&self, program: Program, ctx: &mut Ctx) -> Result<Program> {
        if !ctx.config.elim_dead_relations {
            return Ok(program);
        }
        dead::eliminate_dead_relations(program, ctx)
    }

    fn name(&self) -> &'static str {
        "dead_relations"
    }
}

pub struct DeclareGlobalsPass;

impl TransformPass for DeclareGlobalsPass {
    fn run(&self, mut program: Program, ctx: &mut Ctx) -> Result<Program> {
        for rel in ctx.symtab.relations() {
            program.declare_relation(&rel.name, rel.counted);
        }
        for map in ctx.symtab.maps() {
            program.declare_map(&map.name);
        }
        Ok(program)
    }

    fn name(&self) -> &'static str {
        "declare_globals"
    }
}

/// Runs transformation passes in order over one program.
pub struct Pipeline {
    passes: Vec<Box<dyn TransformPass>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            passes: alloc::vec![
                Box::new(DemandPass),
                Box::new(QueryPass),
                Box::new(AuxmapPass),
                Box::new(DeadRelationPass),
                Box::new(DeclareGlobalsPass),
            ],
        }
    }

    pub fn with_passes(passes: Vec<Box<dyn TransformPass>>) -> Self {
        Self { passes }
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, mut program: Program, ctx: &mut Ctx) -> Result<Program> {
        for pass in &self.passes {
            trace!(pass = pass.name(), "running pass");
            program = pass.run(program, ctx)?;
        }
        info!(stats = %ctx.stats, "transformation finished");
        Ok(program)
    }
}

/// Runs the default pipeline.
pub fn transform_program(program: Program, ctx: &mut Ctx) -> Result<Program> {
    Pipeline::new().run(program, ctx)
}
