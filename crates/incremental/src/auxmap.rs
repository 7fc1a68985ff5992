//! Auxiliary maps, set-from-map relations and wrap views.
//!
//! Image lookups `R.imglookup(mask, bounds)` become reads of an index
//! map from the bound components to the set of unbound remainders.
//! `M.setfrommap(mask)` becomes a relation mirroring map `M`, and
//! `wrap(R)`/`unwrap(R)` become relations mirroring `R` element-wise.
//! New lookups may appear while earlier invariants are installed, so
//! the transformation repeats until a round finds nothing to rewrite.

use crate::context::Ctx;
use crate::invariant::{AuxmapInvariant, Invariant, OrderedSet, SetFromMapInvariant, WrapInvariant};
use crate::maint::{self, MaintHooks, UpdateKind};
use crate::naming;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use ivmc_core::ir::{self, Expr, FnDef, Fold, Program, SetOp, Stmt, Visit};
use ivmc_core::{Error, Mask, Result, Type};
use tracing::{debug, trace};

/// Rewrites every image lookup, set-from-map and wrap expression over a
/// named store, installing the invariants they need.
pub fn transform_all_auxmaps(mut program: Program, ctx: &mut Ctx) -> Result<Program> {
    loop {
        let found = find_invariants(&program, ctx)?;
        if found.is_empty() {
            break;
        }
        ctx.stats.auxmap_rounds += 1;
        trace!(round = ctx.stats.auxmap_rounds, found = found.len(), "auxiliary map round");
        let before = program.clone();
        program = transform_round(program, ctx, &found)?;
        if program == before {
            break;
        }
    }
    check_leftovers(program, ctx)
}

fn transform_round(mut program: Program, ctx: &mut Ctx, found: &OrderedSet<Invariant>) -> Result<Program> {
    let mut hooks = MaintHooks::new();
    let mut funcs = Vec::new();
    for inv in found {
        if ctx.invariants.contains(inv) {
            continue;
        }
        install(ctx, inv, &mut hooks, &mut funcs)?;
    }

    let mut rewriter = LookupRewriter { found };
    for name in ctx.symtab.query_names() {
        let sym = ctx.symtab.get_query_mut(&name)?;
        sym.node = rewriter.fold_query_node(sym.node.clone())?;
    }
    program.prepend_funcs(funcs);
    let program = rewriter.fold_program(program)?;
    hooks.fold_program(program)
}

fn install(ctx: &mut Ctx, inv: &Invariant, hooks: &mut MaintHooks, funcs: &mut Vec<FnDef>) -> Result<()> {
    match inv {
        Invariant::Auxmap(aux) => {
            let rel_ty = relation_type(ctx, &aux.rel);
            let ty = make_auxmap_type(&rel_ty, aux);
            ctx.symtab.define_map(&aux.map, ty)?;
            hooks.before_clear(&aux.rel, vec![Stmt::map_clear(aux.map.as_str())]);
            ctx.stats.auxmaps_transformed += 1;
        }
        Invariant::SetFromMap(sfm) => {
            for other in ctx.invariants.iter() {
                if let Invariant::SetFromMap(other) = other {
                    if other.map == sfm.map {
                        return Err(if other.mask != sfm.mask {
                            Error::program(format!(
                                "Multiple SetFromMap expressions on same map {}",
                                sfm.map
                            ))
                        } else {
                            Error::transformation(format!(
                                "Multiple SetFromMap invariants on same map {}",
                                sfm.map
                            ))
                        });
                    }
                }
            }
            let map_ty = ctx.symtab.map(&sfm.map).map(|m| m.ty.clone()).unwrap_or(Type::Top);
            let ty = make_setfrommap_type(&map_ty, &sfm.mask);
            ctx.symtab.define_relation(&sfm.rel, ty, false)?;
            hooks.before_map_clear(&sfm.map, vec![Stmt::rel_clear(sfm.rel.as_str())]);
        }
        Invariant::Wrap(wrap) => {
            let oper_ty = relation_type(ctx, &wrap.oper);
            let ty = make_wrap_type(&oper_ty, wrap.unwrap);
            ctx.symtab.define_relation(&wrap.rel, ty, false)?;
            hooks.before_clear(&wrap.oper, vec![Stmt::rel_clear(wrap.rel.as_str())]);
        }
        Invariant::Aggr(_) | Invariant::Comp(_) => {
            return Err(Error::transformation(format!(
                "Not an auxiliary map invariant: {}",
                inv.name()
            )))
        }
    }
    ctx.invariants.insert(inv.clone());
    let generated = maint::synthesize_all(ctx, inv)?;
    hooks.on_updates(&generated);
    funcs.extend(generated.into_iter().map(|m| m.func));
    debug!(invariant = inv.name(), "installed auxiliary invariant");
    Ok(())
}

fn relation_type(ctx: &Ctx, rel: &str) -> Type {
    ctx.symtab.relation(rel).map(|r| r.ty.clone()).unwrap_or(Type::Top)
}

/// `Map(key, Set(value))` over the bound/unbound split of the element type.
pub fn make_auxmap_type(rel_ty: &Type, aux: &AuxmapInvariant) -> Type {
    let elts = rel_ty.elt().and_then(Type::tuple_elts);
    let (kts, vts) = match elts.map(|elts| aux.mask.split(elts)) {
        Some(Ok(split)) => split,
        _ => return Type::map(Type::Top, Type::Top),
    };
    let pack = |ts: Vec<Type>, unwrap: bool| {
        if unwrap && ts.len() == 1 {
            ts.into_iter().next().unwrap_or(Type::Top)
        } else {
            Type::Tuple(ts)
        }
    };
    Type::map(pack(kts, aux.unwrap_key), Type::set(pack(vts, aux.unwrap_value)))
}

/// Relation of `key + (value,)` tuples for a map type.
pub fn make_setfrommap_type(map_ty: &Type, mask: &Mask) -> Type {
    let nb = mask.count_bound();
    match map_ty {
        Type::Map(key, value) => match key.tuple_elts() {
            Some(kts) if kts.len() == nb => {
                let mut elts = kts.to_vec();
                elts.push((**value).clone());
                Type::set(Type::Tuple(elts))
            }
            _ => Type::relation_of_arity(nb + 1),
        },
        _ => Type::relation_of_arity(nb + 1),
    }
}

pub fn make_wrap_type(oper_ty: &Type, unwrap: bool) -> Type {
    match oper_ty.elt() {
        Some(elt) if unwrap => match elt.tuple_elts() {
            Some([t]) => Type::set(t.clone()),
            _ => Type::set(Type::Top),
        },
        Some(elt) => Type::set(Type::tuple([elt.clone()])),
        None if unwrap => Type::set(Type::Top),
        None => Type::relation_of_arity(1),
    }
}

/// `def _maint_{map}_for_{rel}_{op}(_elem)` updating one image set.
pub fn auxmap_maint_func(ctx: &mut Ctx, aux: &AuxmapInvariant, kind: UpdateKind) -> Result<FnDef> {
    let vars = naming::subnames("_elem", aux.mask.len());
    let (kvars, vvars) = aux.mask.split(&vars)?;
    let prefix = ctx.symtab.fresh.next_var();
    let key_var = format!("{}_key", prefix);
    let value_var = format!("{}_value", prefix);

    let mut body = vec![
        Stmt::decomp_assign(vars, Expr::name("_elem")),
        Stmt::assign(key_var.as_str(), Expr::tuplify(&kvars, aux.unwrap_key)),
        Stmt::assign(value_var.as_str(), Expr::tuplify(&vvars, aux.unwrap_value)),
    ];
    let map = Expr::name(aux.map.as_str());
    let key = Expr::name(key_var.as_str());
    let image = Expr::dict_lookup(map.clone(), key.clone(), None);
    match kind {
        UpdateKind::Add => {
            body.push(Stmt::if_(
                Expr::not_in(key.clone(), map),
                vec![Stmt::map_assign(aux.map.as_str(), key, Expr::EmptySet)],
            ));
            body.push(Stmt::SetUpdate {
                target: image,
                op: SetOp::Add,
                elem: Expr::name(value_var.as_str()),
            });
        }
        UpdateKind::Remove => {
            body.push(Stmt::SetUpdate {
                target: image.clone(),
                op: SetOp::Remove,
                elem: Expr::name(value_var.as_str()),
            });
            body.push(Stmt::if_(
                Expr::equals(Expr::len(image), Expr::int(0)),
                vec![Stmt::map_delete(aux.map.as_str(), key)],
            ));
        }
        UpdateKind::Assign | UpdateKind::Delete => {
            return Err(Error::transformation(format!(
                "Auxiliary map {} does not watch map updates",
                aux.map
            )))
        }
    }
    let name = naming::maint_func(&aux.map, &aux.rel, kind.name());
    Ok(FnDef::new(name, vec!["_elem".into()], body))
}

/// Maintenance of a set-from-map relation on map assignment or deletion.
pub fn setfrommap_maint_func(ctx: &mut Ctx, sfm: &SetFromMapInvariant, kind: UpdateKind) -> Result<FnDef> {
    let nb = sfm
        .mask
        .break_mapmask()
        .ok_or_else(|| Error::program(format!("SetFromMap needs a map mask, got {}", sfm.mask)))?;
    let key_vars = naming::subnames("_key", nb);
    let vars = sfm.mask.combine(&key_vars, &[String::from("_val")])?;
    let prefix = ctx.symtab.fresh.next_var();
    let elem_var = format!("{}_elem", prefix);

    let mut body = Vec::new();
    let params = match kind {
        UpdateKind::Assign => vec![String::from("_key"), String::from("_val")],
        UpdateKind::Delete => {
            body.push(Stmt::assign(
                "_val",
                Expr::dict_lookup(Expr::name(sfm.map.as_str()), Expr::name("_key"), None),
            ));
            vec![String::from("_key")]
        }
        UpdateKind::Add | UpdateKind::Remove => {
            return Err(Error::transformation(format!(
                "SetFromMap relation {} only watches map updates",
                sfm.rel
            )))
        }
    };
    body.push(Stmt::decomp_assign(key_vars, Expr::name("_key")));
    body.push(Stmt::assign(elem_var.as_str(), Expr::tuplify(&vars, false)));
    body.push(Stmt::rel_update(sfm.rel.as_str(), kind.set_op(), elem_var));
    let name = naming::maint_func(&sfm.rel, &sfm.map, kind.name());
    Ok(FnDef::new(name, params, body))
}

pub fn wrap_maint_func(ctx: &mut Ctx, wrap: &WrapInvariant, kind: UpdateKind) -> Result<FnDef> {
    if !matches!(kind, UpdateKind::Add | UpdateKind::Remove) {
        return Err(Error::transformation(format!(
            "Wrap view {} does not watch map updates",
            wrap.rel
        )));
    }
    let v = format!("{}_v", ctx.symtab.fresh.next_var());
    let value = if wrap.unwrap {
        Expr::index(Expr::name("_elem"), 0)
    } else {
        Expr::tuple([Expr::name("_elem")])
    };
    let body = vec![
        Stmt::assign(v.as_str(), value),
        Stmt::rel_update(wrap.rel.as_str(), kind.set_op(), v),
    ];
    let name = naming::maint_func(&wrap.rel, &wrap.oper, kind.name());
    Ok(FnDef::new(name, vec!["_elem".into()], body))
}

/// Collects the invariants needed by lookups in the program and in
/// every query definition.
pub fn find_invariants(program: &Program, ctx: &Ctx) -> Result<OrderedSet<Invariant>> {
    let mut finder = InvariantFinder {
        ctx,
        found: OrderedSet::new(),
        error: None,
    };
    finder.visit_program(program);
    for q in ctx.symtab.queries() {
        ir::visit::walk_query_node(&mut finder, &q.node);
    }
    match finder.error {
        Some(err) => Err(err),
        None => Ok(finder.found),
    }
}

struct InvariantFinder<'a> {
    ctx: &'a Ctx,
    found: OrderedSet<Invariant>,
    error: Option<Error>,
}

impl InvariantFinder<'_> {
    fn fail(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn check_relation(&mut self, name: &str, what: &str) -> bool {
        if self.ctx.symtab.relation(name).is_some() {
            return true;
        }
        let err = if self.ctx.symtab.contains(name) {
            Error::program(format!("{} over {}, which is not a relation", what, name))
        } else {
            Error::transformation(format!("No symbol for relation {} used in {}", name, what))
        };
        self.fail(err);
        false
    }

    fn lookup(&mut self, rel: &str, mask: &Mask, unwrap_value: bool) {
        if self.check_relation(rel, "ImgLookup") {
            let unwrap_key = mask.count_bound() == 1;
            let inv = AuxmapInvariant::new(rel, mask.clone(), unwrap_key, unwrap_value);
            self.found.insert(Invariant::Auxmap(inv));
        }
    }

    fn wrap(&mut self, oper: &str, unwrap: bool) {
        if self.check_relation(oper, if unwrap { "Unwrap" } else { "Wrap" }) {
            self.found.insert(Invariant::Wrap(WrapInvariant::new(oper, unwrap)));
        }
    }
}

impl Visit for InvariantFinder<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Unwrap(inner) => match &**inner {
                Expr::ImgLookup { set, mask, .. } if mask.count_unbound() == 1 && set.as_name().is_some() => {
                    if let Some(rel) = set.as_name() {
                        self.lookup(rel, mask, true);
                    }
                }
                Expr::Name(oper) => self.wrap(oper, true),
                _ => ir::visit::walk_expr(self, expr),
            },
            Expr::Wrap(inner) => match &**inner {
                Expr::Name(oper) => self.wrap(oper, false),
                _ => ir::visit::walk_expr(self, expr),
            },
            Expr::ImgLookup { set, mask, .. } => match set.as_name() {
                Some(rel) => self.lookup(rel, mask, false),
                None => ir::visit::walk_expr(self, expr),
            },
            Expr::SetFromMap { map, mask } => match map.as_name() {
                Some(m) => {
                    if self.ctx.symtab.map(m).is_some() {
                        if mask.is_mapmask() {
                            let inv = SetFromMapInvariant::new(m, mask.clone());
                            self.found.insert(Invariant::SetFromMap(inv));
                        } else {
                            self.fail(Error::program(format!("SetFromMap needs a map mask: {}", expr)));
                        }
                    } else if self.ctx.symtab.contains(m) {
                        self.fail(Error::program(format!("SetFromMap over {}, which is not a map", m)));
                    } else {
                        self.fail(Error::transformation(format!("No symbol for map {}", m)));
                    }
                }
                None => ir::visit::walk_expr(self, expr),
            },
            _ => ir::visit::walk_expr(self, expr),
        }
    }
}

/// Replaces lookup forms by reads of their maintained stores.
struct LookupRewriter<'a> {
    found: &'a OrderedSet<Invariant>,
}

impl LookupRewriter<'_> {
    fn auxmap_read(&self, expr: &Expr, unwrap_value: bool) -> Option<Expr> {
        let Expr::ImgLookup { set, mask, bounds } = expr else {
            return None;
        };
        let rel = set.as_name()?;
        self.found.iter().find_map(|inv| match inv {
            Invariant::Auxmap(aux) if aux.rel == rel && aux.mask == *mask && aux.unwrap_value == unwrap_value => {
                Some(Expr::dict_lookup(
                    Expr::name(aux.map.as_str()),
                    Expr::tuplify(bounds, aux.unwrap_key),
                    Some(Expr::EmptySet),
                ))
            }
            _ => None,
        })
    }

    fn wrap_read(&self, oper: &str, unwrap: bool) -> Option<Expr> {
        self.found.iter().find_map(|inv| match inv {
            Invariant::Wrap(w) if w.oper == oper && w.unwrap == unwrap => Some(Expr::name(w.rel.as_str())),
            _ => None,
        })
    }
}

impl Fold for LookupRewriter<'_> {
    fn fold_expr(&mut self, expr: Expr) -> Result<Expr> {
        if let Expr::Unwrap(inner) = &expr {
            if let Some(read) = self.auxmap_read(inner, true) {
                return Ok(read);
            }
        }
        let expr = ir::fold::walk_expr(self, expr)?;
        let replaced = match &expr {
            Expr::ImgLookup { .. } => self.auxmap_read(&expr, false),
            Expr::SetFromMap { map, mask } => match map.as_name() {
                Some(m) => self.found.iter().find_map(|inv| match inv {
                    Invariant::SetFromMap(sfm) if sfm.map == m && sfm.mask == *mask => {
                        Some(Expr::name(sfm.rel.as_str()))
                    }
                    _ => None,
                }),
                None => None,
            },
            Expr::Wrap(inner) => inner.as_name().and_then(|r| self.wrap_read(r, false)),
            Expr::Unwrap(inner) => inner.as_name().and_then(|r| self.wrap_read(r, true)),
            _ => None,
        };
        Ok(replaced.unwrap_or(expr))
    }
}

fn check_leftovers(program: Program, ctx: &Ctx) -> Result<Program> {
    #[derive(Default)]
    struct Leftover(Option<Expr>);

    impl Visit for Leftover {
        fn visit_expr(&mut self, expr: &Expr) {
            if self.0.is_none() && matches!(expr, Expr::ImgLookup { .. } | Expr::SetFromMap { .. }) {
                self.0 = Some(expr.clone());
            }
            ir::visit::walk_expr(self, expr)
        }
    }

    let mut v = Leftover::default();
    v.visit_program(&program);
    for q in ctx.symtab.queries() {
        ir::visit::walk_query_node(&mut v, &q.node);
    }
    match v.0 {
        Some(e @ Expr::ImgLookup { .. }) => Err(Error::program(format!("Invalid ImgLookup expression: {}", e))),
        Some(e) => Err(Error::program(format!("Invalid SetFromMap expression: {}", e))),
        None => Ok(program),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::symtab::SymbolTable;

    fn ctx_with_r() -> Ctx {
        let mut symtab = SymbolTable::new();
        let ty = Type::set(Type::tuple(vec![Type::Number, Type::String]));
        symtab.define_relation("R", ty, false).unwrap();
        Ctx::new(symtab, Config::default())
    }

    fn bu() -> Mask {
        Mask::new("bu").unwrap()
    }

    #[test]
    fn test_lookup_becomes_map_read() {
        let mut ctx = ctx_with_r();
        let lookup = Expr::img_lookup(Expr::name("R"), bu(), vec!["x".into()]);
        let program = Program::new(vec![
            Stmt::rel_update("R", SetOp::Add, "e"),
            Stmt::for_("y", Expr::unwrap_of(lookup.clone()), vec![]),
            Stmt::assign("s", lookup),
            Stmt::rel_clear("R"),
        ]);
        let out = transform_all_auxmaps(program, &mut ctx).unwrap();

        assert_eq!(ctx.stats.auxmaps_transformed, 2);
        assert!(ctx.symtab.map("R_bu").is_some());
        assert_eq!(
            ctx.symtab.map("R_bu_unwrapped").map(|m| m.ty.clone()),
            Some(Type::map(Type::Number, Type::set(Type::String)))
        );
        assert_eq!(
            out.body[3],
            Stmt::for_(
                "y",
                Expr::dict_lookup(Expr::name("R_bu_unwrapped"), Expr::name("x"), Some(Expr::EmptySet)),
                vec![]
            )
        );
        // Both maps are maintained after the add and cleared before the clear.
        assert_eq!(
            out.body[1],
            maint::maint_call("_maint_R_bu_unwrapped_for_R_add", vec![Expr::name("e")])
        );
        assert!(out.body.contains(&Stmt::map_clear("R_bu")));
        assert_eq!(out.body.last(), Some(&Stmt::rel_clear("R")));
        assert_eq!(out.funcs.len(), 4);
    }

    #[test]
    fn test_auxmap_maint_add_body() {
        let mut ctx = ctx_with_r();
        let aux = AuxmapInvariant::new("R", bu(), true, false);
        let f = auxmap_maint_func(&mut ctx, &aux, UpdateKind::Add).unwrap();
        assert_eq!(f.name, "_maint_R_bu_for_R_add");
        assert_eq!(f.params, vec!["_elem"]);
        assert_eq!(
            f.body[0],
            Stmt::decomp_assign(vec!["_elem_v1".into(), "_elem_v2".into()], Expr::name("_elem"))
        );
        assert_eq!(f.body[1], Stmt::assign("_v1_key", Expr::name("_elem_v1")));
        assert_eq!(f.body[2], Stmt::assign("_v1_value", Expr::tuplify(&["_elem_v2"], false)));
        assert!(matches!(f.body[4], Stmt::SetUpdate { op: SetOp::Add, .. }));
    }

    #[test]
    fn test_setfrommap_and_wrap() {
        let mut ctx = ctx_with_r();
        ctx.symtab.define_map("M", Type::Top).unwrap();
        let program = Program::new(vec![
            Stmt::map_assign("M", Expr::tuple([Expr::int(1)]), Expr::int(2)),
            Stmt::assign("s", Expr::set_from_map(Expr::name("M"), bu())),
            Stmt::assign("w", Expr::wrap(Expr::name("R"))),
            Stmt::map_clear("M"),
        ]);
        let out = transform_all_auxmaps(program, &mut ctx).unwrap();
        assert!(out.body.contains(&Stmt::assign("s", Expr::name("SM"))));
        assert!(out.body.contains(&Stmt::assign("w", Expr::name("R_wrapped"))));
        assert_eq!(
            out.body[1],
            maint::maint_call(
                "_maint_SM_for_M_assign",
                vec![Expr::tuple([Expr::int(1)]), Expr::int(2)]
            )
        );
        assert!(out.body.contains(&Stmt::rel_clear("SM")));
        assert!(out.func("_maint_SM_for_M_delete").is_some());
        assert!(out.func("_maint_R_wrapped_for_R_remove").is_some());
    }

    #[test]
    fn test_conflicting_setfrommap_masks() {
        let mut ctx = ctx_with_r();
        ctx.symtab.define_map("M", Type::Top).unwrap();
        let program = Program::new(vec![
            Stmt::assign("a", Expr::set_from_map(Expr::name("M"), bu())),
            Stmt::assign("b", Expr::set_from_map(Expr::name("M"), Mask::new("bbu").unwrap())),
        ]);
        let err = transform_all_auxmaps(program, &mut ctx).unwrap_err();
        assert!(err.is_program());
    }

    #[test]
    fn test_bad_operands() {
        let mut ctx = ctx_with_r();
        ctx.symtab.define_map("M", Type::Top).unwrap();
        let over_map = Program::new(vec![Stmt::assign(
            "a",
            Expr::img_lookup(Expr::name("M"), bu(), vec!["x".into()]),
        )]);
        assert!(transform_all_auxmaps(over_map, &mut ctx).unwrap_err().is_program());

        let missing = Program::new(vec![Stmt::assign("a", Expr::wrap(Expr::name("Nope")))]);
        assert!(transform_all_auxmaps(missing, &mut ctx).unwrap_err().is_transformation());

        let computed = Program::new(vec![Stmt::assign(
            "a",
            Expr::img_lookup(Expr::call("f", Vec::<Expr>::new()), bu(), vec!["x".into()]),
        )]);
        let err = transform_all_auxmaps(computed, &mut ctx).unwrap_err();
        assert!(err.message().starts_with("Invalid ImgLookup expression"));
    }

    #[test]
    fn test_fixpoint_is_idempotent() {
        let mut ctx = ctx_with_r();
        let program = Program::new(vec![
            Stmt::rel_update("R", SetOp::Add, "e"),
            Stmt::assign("s", Expr::img_lookup(Expr::name("R"), bu(), vec!["x".into()])),
        ]);
        let once = transform_all_auxmaps(program, &mut ctx).unwrap();
        let twice = transform_all_auxmaps(once.clone(), &mut ctx).unwrap();
        assert_eq!(once, twice);
    }
}
