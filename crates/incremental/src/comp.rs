//! Comprehension queries: materialized result relations, maintenance
//! joins, and compute functions for the auxiliary-only strategy.

use crate::clause::{bindenv, BindEnv, ClauseTools};
use crate::context::Ctx;
use crate::infer;
use crate::invariant::{CompInvariant, Invariant};
use crate::maint::{self, MaintHooks, UpdateKind};
use crate::naming;
use crate::rewrite::{self, FnRewriter, Rewrite};
use crate::symtab::QuerySym;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use ivmc_core::ir::{self, Clause, Comp, Expr, FnDef, Fold, Program, QueryNode, SetOp, Stmt};
use ivmc_core::{Error, Mask, Result, Type};
use tracing::debug;

/// Whether the result can never be derived twice: the result
/// expression is injective and its variables determine every clause.
pub fn is_duplicate_safe(tools: &dyn ClauseTools, comp: &Comp) -> bool {
    comp.resexp.is_injective() && tools.all_vars_determined(&comp.clauses, &bindenv(&comp.resexp.find_vars()))
}

/// Reads a `VarsMember` over an incrementalized result as a relation
/// membership. Other clauses are returned unchanged.
fn convert_subquery_clause(ctx: &Ctx, cl: &Clause) -> Result<Clause> {
    match cl {
        Clause::VarsMember { vars, iter } => match iter {
            Expr::Name(rel) if ctx.symtab.relation(rel).is_some() => Ok(Clause::rel_member(vars, rel.as_str())),
            Expr::ImgLookup { set, mask, bounds } if mask.is_keymask() => {
                let Some(rel) = set.as_name() else {
                    return Ok(cl.clone());
                };
                if mask.break_keymask() != Some((bounds.len(), vars.len())) {
                    return Err(Error::program(format!("Mask does not match clause shape: {}", cl)));
                }
                let mut all = bounds.clone();
                all.extend(vars.iter().cloned());
                Ok(Clause::rel_member(&all, rel))
            }
            _ => Ok(cl.clone()),
        },
        Clause::WithoutMember { clause, value } => Ok(Clause::WithoutMember {
            clause: Box::new(convert_subquery_clause(ctx, clause)?),
            value: value.clone(),
        }),
        other => Ok(other.clone()),
    }
}

fn query_comp(ctx: &Ctx, query: &str) -> Result<Comp> {
    match &ctx.symtab.get_query(query)?.node {
        QueryNode::Comp(comp) => Ok(comp.clone()),
        other => Err(Error::transformation(format!(
            "Query {} is not a comprehension: {}",
            query, other
        ))),
    }
}

/// Rewrites subquery clauses, renames repeated clause variables apart,
/// and with `with_params` prepends the parameters to the result.
pub fn preprocess_comp(program: Program, ctx: &mut Ctx, query: &str, with_params: bool) -> Result<Program> {
    let tools = ctx.clause_tools();
    let comp = query_comp(ctx, query)?;
    let clauses = comp
        .clauses
        .iter()
        .map(|cl| convert_subquery_clause(ctx, cl))
        .collect::<Result<Vec<_>>>()?;
    let mut comp = tools.elim_sameclause_eqs(&Comp::new(comp.resexp, clauses));

    let params = ctx.symtab.get_query(query)?.params.clone();
    if with_params && !params.is_empty() {
        comp = tools.rewrite_resexp_with_params(&comp, &params)?;
        let ty = infer::comp_type(&ctx.symtab, &comp);
        ctx.symtab.get_query_mut(query)?.ty = ty;
    }
    rewrite::redefine_query(program, ctx, query, QueryNode::Comp(comp))
}

/// Maintenance of a comprehension result for one update of one
/// relation it reads. Defines a query symbol for each maintenance join.
pub fn comp_maint_func(ctx: &mut Ctx, inv: &CompInvariant, watched: &str, kind: UpdateKind) -> Result<FnDef> {
    if !matches!(kind, UpdateKind::Add | UpdateKind::Remove) {
        return Err(Error::transformation(format!(
            "Comprehension result {} does not watch map updates",
            inv.rel
        )));
    }
    let tools = ctx.clause_tools();
    let prefix = ctx.symtab.fresh.next_var();

    let symtab = &ctx.symtab;
    let mut n = 0;
    let mut join_names = || loop {
        n += 1;
        let name = naming::maint_join(&inv.query, n);
        if !symtab.contains(&name) {
            return name;
        }
    };
    let (code, joins) = tools.get_maint_code(
        &prefix,
        &mut join_names,
        &inv.comp,
        &inv.rel,
        watched,
        kind.set_op(),
        "_elem",
        inv.counted,
    )?;

    for (name, join) in joins {
        let mut sym = QuerySym::new(name.as_str(), QueryNode::Comp(join));
        sym.join_prefix = Some(prefix.clone());
        ctx.symtab.define_query(sym)?;
        ctx.symtab.get_query_mut(&inv.query)?.maint_joins.push(name);
    }
    let name = naming::maint_func(&inv.rel, watched, kind.name());
    Ok(FnDef::new(name, vec!["_elem".into()], code))
}

fn find_vars_member(clauses: &[Clause]) -> Option<&Clause> {
    clauses.iter().find(|cl| {
        let mut inner = *cl;
        while let Clause::WithoutMember { clause, .. } = inner {
            inner = clause;
        }
        matches!(inner, Clause::VarsMember { .. })
    })
}

/// Installs the result relation `R_{query}` and its maintenance, and
/// replaces occurrences. Maintenance joins are left as query
/// occurrences for [`expand_maint_joins`].
pub fn transform_comp_first_half(program: Program, ctx: &mut Ctx, query: &str) -> Result<Program> {
    let program = preprocess_comp(program, ctx, query, true)?;
    let tools = ctx.clause_tools();
    let comp = query_comp(ctx, query)?;
    if let Some(cl) = find_vars_member(&comp.clauses) {
        return Err(Error::program(format!(
            "Cannot incrementalize clause over a non-relation: {}",
            cl
        )));
    }

    let sym = ctx.symtab.get_query_mut(query)?;
    sym.maint_joins.clear();
    let params = sym.params.clone();
    let safe_override = sym.count_elim_safe_override;
    let ty = match sym.ty.clone() {
        Type::Top => infer::comp_type(&ctx.symtab, &comp),
        ty => ty,
    };

    let dupsafe = is_duplicate_safe(tools.as_ref(), &comp);
    let counted = !(ctx.config.elim_counts && (dupsafe || safe_override));
    let rel = naming::result_set(query);
    let inv = CompInvariant {
        query: query.into(),
        rel: rel.clone(),
        comp: comp.clone(),
        counted,
    };

    let funcs = maint::synthesize_all(ctx, &Invariant::Comp(inv.clone()))?;
    let mut hooks = MaintHooks::new();
    hooks.on_updates(&funcs);
    for watched in tools.rhs_rels_from_comp(&comp) {
        hooks.before_clear(&watched, vec![Stmt::rel_clear(rel.as_str())]);
    }
    let mut program = hooks.fold_program(program)?;
    program.prepend_funcs(funcs.into_iter().map(|m| m.func).collect());

    let occurrence = if params.is_empty() {
        Expr::name(rel.as_str())
    } else {
        let arity = match &comp.resexp {
            Expr::Tuple(elts) => elts.len() - params.len(),
            _ => 0,
        };
        Expr::img_lookup(Expr::name(rel.as_str()), Mask::keymask(params.len(), arity), params)
    };
    let program = rewrite::expand_query(program, ctx, query, occurrence)?;

    ctx.symtab.define_relation(&rel, ty, counted)?;
    ctx.invariants.insert(Invariant::Comp(inv));
    ctx.stats.comps_transformed += 1;
    debug!(query, rel = %rel, counted, dupsafe, "incrementalized comprehension");
    Ok(program)
}

/// Orders the clauses of each maintenance join of `query`, substitutes
/// its demand filters if it has any, then expands the joins into
/// nested loops.
pub fn expand_maint_joins(program: Program, ctx: &mut Ctx, query: &str) -> Result<Program> {
    let sym = ctx.symtab.get_query(query)?;
    let joins = sym.maint_joins.clone();
    let filters = sym.filters.clone();
    let tools = ctx.clause_tools();

    let mut orderer = FnRewriter(|ctx: &mut Ctx, name: &str, node: &QueryNode| -> Result<Rewrite> {
        if !joins.iter().any(|j| j == name) {
            return Ok(Rewrite::Keep);
        }
        let Some(comp) = node.as_comp() else {
            return Ok(Rewrite::Keep);
        };
        let order = tools.order_clause_indices(&comp.clauses, &BindEnv::new())?;
        let mut clauses: Vec<Clause> = order.iter().map(|&i| comp.clauses[i].clone()).collect();

        if let Some(filters) = &filters {
            if filters.len() != comp.clauses.len() {
                return Err(Error::transformation(format!(
                    "Filters of {} do not match join {}",
                    query, name
                )));
            }
            let prefix = ctx.symtab.get_query(name)?.join_prefix.clone().unwrap_or_default();
            let renamed = tools.clauses_rename_lhs_vars(filters, &|x| format!("{}_{}", prefix, x));
            let reordered: Vec<Clause> = order
                .iter()
                .map(|&i| match (&comp.clauses[i], &renamed[i]) {
                    (Clause::WithoutMember { value, .. }, f) if !matches!(f, Clause::WithoutMember { .. }) => {
                        Clause::without(f.clone(), value.clone())
                    }
                    (_, f) => f.clone(),
                })
                .collect();
            clauses = tools.filter_clauses(&clauses, &reordered, &BindEnv::new())?;
        }
        Ok(Rewrite::Redefine(QueryNode::Comp(Comp::new(comp.resexp.clone(), clauses))))
    });
    let program = rewrite::rewrite_queries(program, ctx, &mut orderer)?;

    let mut expander = JoinExpander {
        tools: tools.as_ref(),
        joins: &joins,
    };
    expander.fold_program(program)
}

/// Incrementalizes comprehension `query` without demand filtering.
pub fn incrementalize_comp(program: Program, ctx: &mut Ctx, query: &str) -> Result<Program> {
    let program = transform_comp_first_half(program, ctx, query)?;
    expand_maint_joins(program, ctx, query)
}

/// Replaces `for (vars) in QUERY(join)` loops by the join's nested
/// clause code when `vars` is exactly the join's result tuple.
struct JoinExpander<'a> {
    tools: &'a dyn ClauseTools,
    joins: &'a [String],
}

impl Fold for JoinExpander<'_> {
    fn fold_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>> {
        let stmt = ir::fold::walk_stmt(self, stmt)?;
        if let Stmt::DecompFor { vars, iter: Expr::Query { name, node }, body } = &stmt {
            if let QueryNode::Comp(comp) = node.as_ref() {
                if self.joins.contains(name)
                    && self.tools.is_join(comp)
                    && comp.resexp.detuplify().as_ref() == Some(vars)
                {
                    return self.tools.get_code_for_clauses(&comp.clauses, &BindEnv::new(), body.clone());
                }
            }
        }
        Ok(vec![stmt])
    }
}

/// Implements comprehension `query` by a function computing its result
/// from scratch, called wherever the query occurs.
pub fn transform_aux_comp(program: Program, ctx: &mut Ctx, query: &str) -> Result<Program> {
    let program = preprocess_comp(program, ctx, query, false)?;
    let tools = ctx.clause_tools();
    let comp = query_comp(ctx, query)?;
    let params = ctx.symtab.get_query(query)?.params.clone();

    let func = naming::compute_func(query);
    let call = Expr::call(func.as_str(), params.iter().map(|p| Expr::name(p.as_str())));
    let mut program = rewrite::expand_query(program, ctx, query, call)?;

    let env = bindenv(&params);
    let clauses = tools.order_clauses(&comp.clauses, &env)?;
    let add = vec![Stmt::if_(
        Expr::not_in(comp.resexp.clone(), Expr::name("_result")),
        vec![Stmt::SetUpdate {
            target: Expr::name("_result"),
            op: SetOp::Add,
            elem: comp.resexp.clone(),
        }],
    )];
    let mut body = vec![Stmt::assign("_result", Expr::EmptySet)];
    body.extend(tools.get_code_for_clauses(&clauses, &env, add)?);
    body.push(Stmt::Return(Expr::name("_result")));
    program.prepend_funcs(vec![FnDef::new(func.as_str(), params, body)]);

    debug!(query, func = %func, "defined compute function");
    Ok(program)
}
