use super::filter::StructureGenerator;
use crate::comp;
use crate::context::Ctx;
use crate::infer;
use crate::naming;
use crate::pipeline::effective_strategy;
use crate::rewrite;
use crate::symtab::{DemandParamStrategy, OccurrenceCollector, QuerySym, Strategy};
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use ivmc_core::ir::{self, Builtin, Clause, CmpOp, Comp, Expr, FnDef, Fold, Program, QueryNode, SetOp, Stmt, Visit};
use ivmc_core::{Error, Result, Type};
use tracing::debug;

/// Incrementalizes comprehension `query` with its maintenance joins
/// restricted by tag and filter structures, each itself maintained as
/// a comprehension.
pub fn incrementalize_comp_with_filtering(program: Program, ctx: &mut Ctx, query: &str) -> Result<Program> {
    let mut program = comp::transform_comp_first_half(program, ctx, query)?;

    let tools = ctx.clause_tools();
    let node = ctx.symtab.get_query(query)?.node.clone();
    let Some(outer) = node.as_comp() else {
        return Err(Error::transformation(format!(
            "Query {} is not a comprehension: {}",
            query, node
        )));
    };
    let taken: Vec<String> = ctx
        .symtab
        .relations()
        .map(|r| r.name.clone())
        .chain(ctx.symtab.maps().map(|m| m.name.clone()))
        .chain(ctx.symtab.query_names())
        .collect();
    let mut generator = StructureGenerator::new(
        tools.as_ref(),
        query,
        outer.clone(),
        ctx.config.use_singletag_demand,
    )
    .with_reserved(taken);
    generator.make_structs()?;
    generator.simplify_names();
    generator.prune_tags();

    for s in &generator.structs {
        let comp = generator.make_comp(s)?;
        let mut sym = QuerySym::new(s.name(), QueryNode::Comp(comp));
        sym.struct_for_query = Some(query.into());
        ctx.symtab.define_query(sym)?;
        debug!(query, structure = s.name(), "defined demand structure");
        program = comp::incrementalize_comp(program, ctx, s.name())?;
    }

    ctx.stats.tags_created += generator.tags().count();
    ctx.stats.filters_created += generator.filters().count();
    ctx.symtab.get_query_mut(query)?.filters = Some(generator.make_filter_list());

    comp::expand_maint_joins(program, ctx, query)
}

/// Eviction bound of `sym`'s demand set; `None` is unbounded.
fn demand_set_maxsize(ctx: &Ctx, sym: &QuerySym) -> Result<Option<usize>> {
    match sym.demand_set_maxsize.or(ctx.config.default_demand_set_maxsize) {
        Some(0) => Err(Error::program(format!(
            "Invalid value for demand_set_maxsize of query {}",
            sym.name
        ))),
        other => Ok(other),
    }
}

/// `_demand_Q(_elem)`: adds `_elem` to the demand set if absent,
/// evicting the oldest entries first when the set is bounded.
pub fn make_demand_func(query: &str, maxsize: Option<usize>) -> FnDef {
    let uset = naming::demand_set(query);
    let elem = Expr::name("_elem");
    let add = Stmt::rel_update(uset.as_str(), SetOp::Add, "_elem");

    let body = match maxsize {
        None | Some(0) => vec![add],
        Some(1) => vec![Stmt::rel_clear(uset.as_str()), add],
        Some(n) => {
            let full = Expr::cmp(
                Expr::len(Expr::name(uset.as_str())),
                CmpOp::GtE,
                Expr::int(n as i64),
            );
            let evict = vec![
                Stmt::assign("_stale", Expr::builtin(Builtin::Peek, [Expr::name(uset.as_str())])),
                Stmt::rel_update(uset.as_str(), SetOp::Remove, "_stale"),
            ];
            vec![Stmt::While { test: full, body: evict }, add]
        }
    };
    FnDef::new(
        naming::demand_func(query),
        vec!["_elem".into()],
        vec![Stmt::if_(Expr::not_in(elem, Expr::name(uset.as_str())), body)],
    )
}

/// Where the demand of a query comes from.
#[derive(Clone, Debug, PartialEq)]
enum DemandContext {
    /// Reads record their demand in a demand set.
    Outer,
    /// Demand follows from the clauses preceding the query in its
    /// enclosing maintained query.
    Inner(Vec<Clause>),
}

/// Finds occurrences of one query without entering other queries.
struct DirectOccurrence<'a> {
    query: &'a str,
    found: bool,
}

impl<'a> DirectOccurrence<'a> {
    fn in_expr(query: &'a str, expr: &Expr) -> bool {
        let mut v = Self { query, found: false };
        v.visit_expr(expr);
        v.found
    }

    fn in_clause(query: &'a str, cl: &Clause) -> bool {
        let mut v = Self { query, found: false };
        v.visit_clause(cl);
        v.found
    }
}

impl Visit for DirectOccurrence<'_> {
    fn visit_query(&mut self, name: &str, _node: &QueryNode) {
        if name == self.query {
            self.found = true;
        }
    }
}

fn demand_context(program: &Program, ctx: &Ctx, query: &str) -> Result<DemandContext> {
    let mut contexts = Vec::new();
    let mut top = DirectOccurrence { query, found: false };
    top.visit_program(program);
    if top.found {
        contexts.push(DemandContext::Outer);
    }

    for container in ctx.symtab.queries().filter(|q| q.name != query) {
        let normal = effective_strategy(ctx, container) == Strategy::Normal;
        let found = match &container.node {
            QueryNode::Comp(comp) => {
                let first = comp.clauses.iter().position(|cl| DirectOccurrence::in_clause(query, cl));
                if first.is_none() && !DirectOccurrence::in_expr(query, &comp.resexp) {
                    continue;
                }
                if normal {
                    DemandContext::Outer
                } else {
                    if !matches!(ctx.symtab.get_query(query)?.node, QueryNode::Comp(_)) {
                        return Err(Error::program(format!(
                            "Demand for aggregate {} inside comprehension {} is not supported",
                            query, container.name
                        )));
                    }
                    let left = first.unwrap_or(comp.clauses.len());
                    DemandContext::Inner(comp.clauses[..left].to_vec())
                }
            }
            QueryNode::Aggr { value, .. } => {
                if !DirectOccurrence::in_expr(query, value) {
                    continue;
                }
                if !normal {
                    return Err(Error::program(format!(
                        "Query {} needs demand from aggregate {}, which has none",
                        query, container.name
                    )));
                }
                DemandContext::Outer
            }
            QueryNode::AggrRestr { value, params, restr, .. } => {
                if !DirectOccurrence::in_expr(query, value) && !DirectOccurrence::in_expr(query, restr) {
                    continue;
                }
                if normal {
                    DemandContext::Outer
                } else {
                    DemandContext::Inner(vec![Clause::vars_member(params, restr.clone())])
                }
            }
        };
        if !contexts.contains(&found) {
            contexts.push(found);
        }
    }

    match contexts.len() {
        0 => Ok(DemandContext::Outer),
        1 => Ok(contexts.remove(0)),
        _ => Err(Error::program(format!(
            "Query {} occurs in contexts with different demand",
            query
        ))),
    }
}

/// Adds demand to `query`. A query read from the program gets a demand
/// set `_U_{query}`, filled by every occurrence before it is read. A
/// query nested in a maintained query gets a demand query `_QU_{query}`
/// over the clauses that precede it. Comprehensions get a leading
/// clause over the demand and aggregates become restricted to it.
pub fn introduce_demand(program: Program, ctx: &mut Ctx, query: &str) -> Result<Program> {
    let sym = ctx.symtab.get_query(query)?;
    if !sym.uses_demand {
        return Ok(program);
    }
    if sym.demand_set.is_some() || sym.demand_query.is_some() {
        return Err(Error::transformation(format!("Query {} already has demand", query)));
    }
    if let QueryNode::AggrRestr { .. } = sym.node {
        return Err(Error::transformation(format!(
            "Query {} is already restricted: {}",
            query, sym.node
        )));
    }

    let tools = ctx.clause_tools();
    let demand_params = sym.effective_demand_params(tools.as_ref());
    let narrowed = sym.demand_param_strategy != DemandParamStrategy::All;
    if demand_params.is_empty() && narrowed && sym.node.as_comp().is_some() {
        debug!(query, "no demand parameters, demand dropped");
        ctx.symtab.get_query_mut(query)?.uses_demand = false;
        return Ok(program);
    }

    match demand_context(&program, ctx, query)? {
        DemandContext::Outer => introduce_demand_set(program, ctx, query, demand_params),
        DemandContext::Inner(left) => introduce_demand_query(program, ctx, query, demand_params, left),
    }
}

fn restrict(node: QueryNode, clause: Clause, params: &[String], restr: Expr) -> QueryNode {
    match node {
        QueryNode::Comp(comp) => {
            let mut clauses = vec![clause];
            clauses.extend(comp.clauses);
            QueryNode::Comp(Comp::new(comp.resexp, clauses))
        }
        QueryNode::Aggr { op, value } | QueryNode::AggrRestr { op, value, .. } => QueryNode::AggrRestr {
            op,
            value,
            params: params.to_vec(),
            restr,
        },
    }
}

fn introduce_demand_set(program: Program, ctx: &mut Ctx, query: &str, demand_params: Vec<String>) -> Result<Program> {
    let sym = ctx.symtab.get_query(query)?;
    let maxsize = demand_set_maxsize(ctx, sym)?;
    let node = sym.node.clone();

    let uset = naming::demand_set(query);
    let elt_types: Vec<Type> = match &node {
        QueryNode::Comp(comp) => {
            let types = infer::clause_var_types(&ctx.symtab, &comp.clauses);
            demand_params
                .iter()
                .map(|p| types.get(p).cloned().unwrap_or(Type::Top))
                .collect()
        }
        _ => vec![Type::Top; demand_params.len()],
    };
    let new_node = restrict(
        node,
        Clause::rel_member(&demand_params, uset.as_str()),
        &demand_params,
        Expr::name(uset.as_str()),
    );

    ctx.symtab.define_relation(&uset, Type::set(Type::tuple(elt_types)), false)?;
    ctx.symtab.get_query_mut(query)?.demand_set = Some(uset.clone());

    let program = rewrite::redefine_query(program, ctx, query, new_node.clone())?;
    let call = Expr::call(naming::demand_func(query), [Expr::tuplify(&demand_params, false)]);
    let wrapped = Expr::first_then([call], Expr::query(query, new_node));
    let mut program = rewrite::expand_query(program, ctx, query, wrapped)?;
    program.prepend_funcs(vec![make_demand_func(query, maxsize)]);

    debug!(query, uset = %uset, maxsize, "introduced demand set");
    Ok(program)
}

fn introduce_demand_query(
    program: Program,
    ctx: &mut Ctx,
    query: &str,
    demand_params: Vec<String>,
    left: Vec<Clause>,
) -> Result<Program> {
    let tools = ctx.clause_tools();
    let bound = tools.lhs_vars_from_clauses(&left);
    if let Some(p) = demand_params.iter().find(|p| !bound.contains(p)) {
        return Err(Error::program(format!(
            "Demand parameter {} of query {} is not bound by its context",
            p, query
        )));
    }
    let mut nested = OccurrenceCollector::default();
    for cl in &left {
        nested.visit_clause(cl);
    }
    if !nested.found.is_empty() {
        return Err(Error::program(format!(
            "Demand of query {} depends on other queries",
            query
        )));
    }
    let free: Vec<String> = left
        .iter()
        .flat_map(|cl| tools.uncon_vars(cl))
        .filter(|v| !bound.contains(v) && !ctx.symtab.contains(v))
        .collect();
    if !free.is_empty() {
        return Err(Error::program(format!(
            "Demand of query {} depends on unbound variables: {}",
            query,
            free.join(", ")
        )));
    }

    let sym = ctx.symtab.get_query(query)?;
    let strategy = effective_strategy(ctx, sym);
    let node = sym.node.clone();
    let dq = naming::demand_query(query);
    let dq_node = QueryNode::Comp(Comp::new(Expr::tuplify(&demand_params, false), left));
    ctx.symtab
        .define_query(QuerySym::new(dq.as_str(), dq_node.clone()).with_strategy(strategy))?;

    let occurrence = Expr::query(dq.as_str(), dq_node);
    let new_node = restrict(
        node,
        Clause::vars_member(&demand_params, occurrence.clone()),
        &demand_params,
        occurrence,
    );
    ctx.symtab.get_query_mut(query)?.demand_query = Some(dq.clone());
    let program = rewrite::redefine_query(program, ctx, query, new_node)?;

    debug!(query, demand_query = %dq, "introduced demand query");
    Ok(program)
}

/// Replaces `reset_demand(names)` by clears of the named queries'
/// demand sets, or of every demand set when no name is given.
pub fn expand_reset_demand(program: Program, ctx: &mut Ctx) -> Result<Program> {
    let sets: Vec<(String, String)> = ctx
        .symtab
        .queries()
        .filter_map(|q| q.demand_set.clone().map(|u| (q.name.clone(), u)))
        .collect();
    DemandResetter { sets: &sets }.fold_program(program)
}

struct DemandResetter<'a> {
    /// Query name and demand set, in query definition order.
    sets: &'a [(String, String)],
}

impl Fold for DemandResetter<'_> {
    fn fold_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>> {
        match ir::fold::walk_stmt(self, stmt)? {
            Stmt::ResetDemand { names } => Ok(self
                .sets
                .iter()
                .filter(|(q, _)| names.is_empty() || names.contains(q))
                .map(|(_, u)| Stmt::rel_clear(u.as_str()))
                .collect()),
            s => Ok(vec![s]),
        }
    }
}
