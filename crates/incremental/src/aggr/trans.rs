use super::handler::{handler_for, AggrHandler};
use crate::context::Ctx;
use crate::invariant::{AggrInvariant, Invariant};
use crate::maint::{self, MaintHooks, UpdateKind};
use crate::naming;
use crate::rewrite;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use ivmc_core::ir::{Expr, Fold, FnDef, Program, QueryNode, Stmt};
use ivmc_core::{Error, Mask, Result, Type};
use tracing::debug;

/// Component types of the tuples in operand relation `rel`.
fn operand_elt_types(ctx: &Ctx, rel: &str) -> Result<Vec<Type>> {
    let sym = ctx
        .symtab
        .relation(rel)
        .ok_or_else(|| Error::transformation(format!("No symbol info for operand relation {}", rel)))?;
    match sym.ty.elt().and_then(Type::tuple_elts) {
        Some(elts) => Ok(elts.to_vec()),
        None => Err(Error::program(format!(
            "Invalid type for aggregate operand {}: {}",
            rel, sym.ty
        ))),
    }
}

/// Reads the invariant maintaining query `query` off its definition.
pub fn aggr_invariant(ctx: &Ctx, query: &str, node: &QueryNode) -> Result<AggrInvariant> {
    let (op, value, restr) = match node {
        QueryNode::Aggr { op, value } => (*op, value, None),
        QueryNode::AggrRestr {
            op,
            value,
            params,
            restr,
        } => (*op, value, Some((params, restr))),
        QueryNode::Comp(_) => {
            return Err(Error::transformation(format!("Query {} is not an aggregate", query)))
        }
    };

    let (oper, unwrap) = match value {
        Expr::Unwrap(inner) => (&**inner, true),
        other => (other, false),
    };
    let (rel, mask, params) = match oper {
        Expr::Name(rel) => (rel.as_str(), None, Vec::new()),
        Expr::ImgLookup { set, mask, bounds } => match set.as_name() {
            Some(rel) => (rel, Some(mask.clone()), bounds.clone()),
            None => return Err(Error::program(format!("Unknown aggregate form: {}", node))),
        },
        _ => return Err(Error::program(format!("Unknown aggregate form: {}", node))),
    };

    let arity = operand_elt_types(ctx, rel)?.len();
    let mask = match mask {
        Some(mask) if mask.len() != arity => {
            return Err(Error::program(format!(
                "Mask {} does not match the arity of {}",
                mask, rel
            )))
        }
        Some(mask) => mask,
        None => Mask::all_unbound(arity),
    };
    if unwrap && mask.count_unbound() != 1 {
        return Err(Error::program("Aggregates of unwrap() expressions must have arity 1"));
    }

    let restr = match restr {
        Some((restr_params, restr)) => {
            if *restr_params != params {
                return Err(Error::transformation("AggrRestr params do not match ImgLookup params"));
            }
            match restr.as_name() {
                Some(name) => Some(String::from(name)),
                None => return Err(Error::program(format!("Bad AggrRestr restriction expr: {}", restr))),
            }
        }
        None => None,
    };

    Ok(AggrInvariant {
        map: naming::result_set(query),
        op,
        rel: rel.into(),
        mask,
        unwrap,
        params,
        restr,
    })
}

/// Maintenance of `inv` for updates of its operand or its restriction set.
pub fn aggr_maint_func(ctx: &mut Ctx, inv: &AggrInvariant, watched: &str, kind: UpdateKind) -> Result<FnDef> {
    if !matches!(kind, UpdateKind::Add | UpdateKind::Remove) {
        return Err(Error::transformation(format!(
            "Aggregate {} does not watch map updates",
            inv.map
        )));
    }
    if watched == inv.rel {
        oper_maint_func(ctx, inv, kind)
    } else if inv.restr.as_deref() == Some(watched) {
        restr_maint_func(ctx, inv, kind)
    } else {
        Err(Error::transformation(format!(
            "Aggregate {} does not watch {}",
            inv.map, watched
        )))
    }
}

fn oper_maint_func(ctx: &mut Ctx, inv: &AggrInvariant, kind: UpdateKind) -> Result<FnDef> {
    let vars = naming::subnames("_elem", inv.mask.len());
    let (kvars, vvars) = inv.mask.split(&vars)?;
    let prefix = ctx.symtab.fresh.next_var();
    let key = format!("{}_key", prefix);
    let value = format!("{}_value", prefix);
    let state = format!("{}_state", prefix);

    let value_expr = match (inv.unwrap, vvars.as_slice()) {
        (true, [v]) => Expr::name(v.as_str()),
        (true, _) => return Err(Error::program("Aggregates of unwrap() expressions must have arity 1")),
        (false, _) => Expr::tuplify(&vvars, false),
    };

    let handler = handler_for(inv.op, inv.uses_demand());
    let map = Expr::name(inv.map.as_str());
    let key_expr = Expr::name(key.as_str());

    let (preexists, may_remove) = match kind {
        UpdateKind::Add => (inv.uses_demand(), false),
        _ => (true, !inv.uses_demand()),
    };
    let default = if preexists { None } else { Some(handler.zero()) };

    let mut code = vec![Stmt::assign(
        state.as_str(),
        Expr::dict_lookup(map.clone(), key_expr.clone(), default),
    )];
    code.extend(handler.update_state(&prefix, &state, kind.set_op(), &value));
    if preexists {
        code.push(Stmt::map_delete(inv.map.as_str(), key_expr.clone()));
    } else {
        code.push(Stmt::if_(
            Expr::is_in(key_expr.clone(), map),
            vec![Stmt::map_delete(inv.map.as_str(), key_expr.clone())],
        ));
    }
    let assign = Stmt::map_assign(inv.map.as_str(), key_expr.clone(), Expr::name(state.as_str()));
    match (may_remove, handler.is_empty(&state)) {
        (true, Some(empty)) => code.push(Stmt::if_(Expr::not(empty), vec![assign])),
        _ => code.push(assign),
    }
    if let Some(restr) = &inv.restr {
        code = vec![Stmt::if_(Expr::is_in(key_expr, Expr::name(restr.as_str())), code)];
    }

    let mut body = vec![
        Stmt::decomp_assign(vars, Expr::name("_elem")),
        Stmt::assign(key.as_str(), Expr::tuplify(&kvars, false)),
        Stmt::assign(value.as_str(), value_expr),
    ];
    body.extend(code);
    let name = naming::maint_func(&inv.map, &inv.rel, kind.name());
    Ok(FnDef::new(name, vec!["_elem".into()], body))
}

fn restr_maint_func(ctx: &mut Ctx, inv: &AggrInvariant, kind: UpdateKind) -> Result<FnDef> {
    let restr = inv.restr.as_deref().unwrap_or_default();
    let body = match kind {
        UpdateKind::Add => {
            let prefix = ctx.symtab.fresh.next_var();
            let value = format!("{}_value", prefix);
            let state = format!("{}_state", prefix);
            let key_vars = naming::subnames("_key", inv.params.len());
            let handler = handler_for(inv.op, true);

            let image = Expr::img_lookup(Expr::name(inv.rel.as_str()), inv.mask.clone(), key_vars.clone());
            let update = handler.update_state(&prefix, &state, kind.set_op(), &value);
            let scan = if inv.unwrap {
                Stmt::decomp_for(vec![value], image, update)
            } else {
                Stmt::for_(value, image, update)
            };
            vec![
                Stmt::assign(state.as_str(), handler.zero()),
                Stmt::decomp_assign(key_vars, Expr::name("_key")),
                scan,
                Stmt::map_assign(inv.map.as_str(), Expr::name("_key"), Expr::name(state.as_str())),
            ]
        }
        _ => vec![Stmt::map_delete(inv.map.as_str(), Expr::name("_key"))],
    };
    let name = naming::maint_func(&inv.map, restr, kind.name());
    Ok(FnDef::new(name, vec!["_key".into()], body))
}

/// Materializes aggregate query `query` as the map `R_{query}` from
/// group key to state, and replaces its occurrences by map reads.
pub fn incrementalize_aggr(program: Program, ctx: &mut Ctx, query: &str) -> Result<Program> {
    let node = ctx.symtab.get_query(query)?.node.clone();
    let inv = aggr_invariant(ctx, query, &node)?;
    let handler: Box<dyn AggrHandler> = handler_for(inv.op, inv.uses_demand());

    let funcs = maint::synthesize_all(ctx, &Invariant::Aggr(inv.clone()))?;
    let mut hooks = MaintHooks::new();
    hooks.on_updates(&funcs);
    let clear = Stmt::map_clear(inv.map.as_str());
    match &inv.restr {
        None => hooks.before_clear(&inv.rel, vec![clear]),
        Some(restr) => {
            hooks.before_clear(restr, vec![clear.clone()]);
            // Demanded keys stay in the map with an empty-operand state.
            let k = ctx.symtab.fresh.next_var();
            hooks.after_clear(
                &inv.rel,
                vec![
                    clear,
                    Stmt::for_(
                        k.as_str(),
                        Expr::name(restr.as_str()),
                        vec![Stmt::map_assign(inv.map.as_str(), Expr::name(k.as_str()), handler.zero())],
                    ),
                ],
            );
        }
    }
    let mut program = hooks.fold_program(program)?;
    program.prepend_funcs(funcs.into_iter().map(|m| m.func).collect());

    let zero = if inv.uses_demand() { None } else { Some(handler.zero()) };
    let state = Expr::dict_lookup(
        Expr::name(inv.map.as_str()),
        Expr::tuplify(&inv.params, false),
        zero,
    );
    let program = rewrite::expand_query(program, ctx, query, handler.project(state))?;

    let elts = operand_elt_types(ctx, &inv.rel)?;
    let (key_types, value_types) = inv.mask.split(&elts)?;
    let value_ty = match (inv.unwrap, value_types.as_slice()) {
        (true, [t]) => t.clone(),
        _ => Type::Tuple(value_types),
    };
    let ty = Type::map(Type::Tuple(key_types), handler.result_type(&value_ty));
    ctx.symtab.define_map(&inv.map, ty)?;

    debug!(query, map = %inv.map, op = inv.op.name(), demand = inv.uses_demand(), "incrementalized aggregate");
    ctx.invariants.insert(Invariant::Aggr(inv));
    ctx.stats.aggrs_transformed += 1;
    Ok(program)
}
