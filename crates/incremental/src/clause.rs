//! Clause tools: per-clause queries and the join algebra built on them.
//!
//! [`ClauseTools`] answers questions about single clauses (bound
//! variables, filtering, ordering priority, loop code) and derives the
//! comprehension-level operations from them: maintenance joins, clause
//! ordering and code generation for whole clause lists. The trait is
//! object safe so a [`Ctx`](crate::Ctx) can carry any implementation.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashSet;
use ivmc_core::ir::{self, Clause, Comp, Expr, SetOp, Stmt};
use ivmc_core::{Error, Mask, Result};

/// Variables known to be bound at some program point.
pub type BindEnv = HashSet<String>;

/// Builds a binding environment from variable names.
pub fn bindenv<S: AsRef<str>>(vars: &[S]) -> BindEnv {
    vars.iter().map(|v| v.as_ref().to_string()).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClauseKind {
    Member,
    Cond,
}

/// Whether a clause should be replaced by its demand-filtered version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    No,
    Yes,
    /// Keep the clause and add the filter after it.
    Intersect,
}

/// Ordering priority; lower runs earlier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Constant,
    Normal,
    Unpreferred,
}

fn names(vars: &[String]) -> String {
    vars.join(", ")
}

fn clause_list(clauses: &[Clause]) -> String {
    clauses
        .iter()
        .map(|cl| cl.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn assert_unique(vars: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    let dups: Vec<String> = vars
        .iter()
        .filter(|v| !seen.insert(v.as_str()))
        .cloned()
        .collect();
    if dups.is_empty() {
        Ok(())
    } else {
        Err(Error::program(format!(
            "LHS vars appear multiple times in same clause: {}",
            names(&dups)
        )))
    }
}

fn bound_mask(vars: &[String], env: &BindEnv) -> Mask {
    Mask::from_bounds(vars, |v| env.contains(v))
}

fn is_subset(vars: &[String], env: &BindEnv) -> bool {
    vars.iter().all(|v| env.contains(v))
}

fn select(vars: Vec<String>, mask: &[bool]) -> Vec<String> {
    vars.into_iter()
        .zip(mask.iter())
        .filter(|(_, m)| **m)
        .map(|(v, _)| v)
        .collect()
}

fn push_unique(out: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
}

pub trait ClauseTools {
    fn kind(&self, cl: &Clause) -> ClauseKind;

    /// Variables bound by a membership clause; empty for conditions.
    fn lhs_vars(&self, cl: &Clause) -> Vec<String>;

    /// Relation iterated by the clause, if it iterates a relation.
    fn rhs_rel(&self, cl: &Clause) -> Option<String>;

    /// Per lhs variable: whether its values come from the clause itself.
    fn constrained_mask(&self, cl: &Clause) -> Vec<bool> {
        vec![true; self.lhs_vars(cl).len()]
    }

    /// Variables whose values the clause takes from its environment.
    fn uncon_vars(&self, cl: &Clause) -> Vec<String>;

    fn con_lhs_vars(&self, cl: &Clause) -> Vec<String> {
        select(self.lhs_vars(cl), &self.constrained_mask(cl))
    }

    fn uncon_lhs_vars(&self, cl: &Clause) -> Vec<String> {
        let mask: Vec<bool> = self.constrained_mask(cl).iter().map(|m| !m).collect();
        select(self.lhs_vars(cl), &mask)
    }

    /// Positions a predecessor tag may filter.
    fn tagsin_mask(&self, cl: &Clause) -> Vec<bool> {
        if self.uncon_lhs_vars(cl).is_empty() {
            vec![true; self.lhs_vars(cl).len()]
        } else {
            self.constrained_mask(cl).iter().map(|m| !m).collect()
        }
    }

    /// Positions this clause may define tags for.
    fn tagsout_mask(&self, cl: &Clause) -> Vec<bool> {
        if self.uncon_lhs_vars(cl).is_empty() {
            vec![true; self.lhs_vars(cl).len()]
        } else {
            self.constrained_mask(cl)
        }
    }

    fn tagsin_lhs_vars(&self, cl: &Clause) -> Vec<String> {
        select(self.lhs_vars(cl), &self.tagsin_mask(cl))
    }

    fn tagsout_lhs_vars(&self, cl: &Clause) -> Vec<String> {
        select(self.lhs_vars(cl), &self.tagsout_mask(cl))
    }

    fn should_filter(&self, cl: &Clause, env: &BindEnv) -> FilterMode {
        if is_subset(&self.tagsin_lhs_vars(cl), env) {
            FilterMode::No
        } else {
            FilterMode::Yes
        }
    }

    /// Whether a filter over this clause needs at least one predecessor tag.
    fn filter_needs_preds(&self, _cl: &Clause) -> bool {
        false
    }

    /// True if the clause is satisfied at most once under `env`.
    fn functionally_determines(&self, cl: &Clause, env: &BindEnv) -> bool;

    /// Priority under `env`, or `None` if the clause cannot run yet.
    fn get_priority(&self, cl: &Clause, env: &BindEnv) -> Option<Priority>;

    /// Code running `body` once per satisfying binding of the unbound
    /// lhs variables.
    fn get_code(&self, cl: &Clause, env: &BindEnv, body: Vec<Stmt>) -> Result<Vec<Stmt>>;

    fn rename_lhs_vars(&self, cl: &Clause, renamer: &dyn Fn(&str) -> String) -> Clause;

    fn rename_rhs_rel(&self, cl: &Clause, renamer: &dyn Fn(&str) -> String) -> Clause;

    /// The same clause iterating over `{value}` instead of its relation.
    fn singletonize(&self, cl: &Clause, value: Expr) -> Result<Clause>;

    /// The same clause skipping `value`.
    fn subtract(&self, cl: &Clause, value: Expr) -> Result<Clause> {
        match self.kind(cl) {
            ClauseKind::Member => Ok(Clause::without(cl.clone(), value)),
            ClauseKind::Cond => Err(Error::transformation(format!(
                "Cannot subtract from condition clause: {}",
                cl
            ))),
        }
    }

    // Derived operations.

    /// Lhs variables of all clauses, in order, without duplicates.
    fn lhs_vars_from_clauses(&self, clauses: &[Clause]) -> Vec<String> {
        let mut out = Vec::new();
        for cl in clauses {
            push_unique(&mut out, self.lhs_vars(cl));
        }
        out
    }

    fn rhs_rels_from_comp(&self, comp: &Comp) -> Vec<String> {
        let mut out = Vec::new();
        push_unique(&mut out, comp.clauses.iter().filter_map(|cl| self.rhs_rel(cl)));
        out
    }

    /// The join over `clauses`: its result is the tuple of lhs variables.
    fn make_join_from_clauses(&self, clauses: &[Clause]) -> Comp {
        let vars = self.lhs_vars_from_clauses(clauses);
        Comp::new(Expr::tuplify(&vars, false), clauses.to_vec())
    }

    fn is_join(&self, comp: &Comp) -> bool {
        let mut lhs = self.lhs_vars_from_clauses(&comp.clauses);
        match comp.resexp.detuplify() {
            Some(mut res) => {
                lhs.sort();
                res.sort();
                lhs == res
            }
            None => false,
        }
    }

    /// True if `env` functionally determines every lhs variable.
    fn all_vars_determined(&self, clauses: &[Clause], env: &BindEnv) -> bool {
        let mut env = env.clone();
        let mut remaining: Vec<&Clause> = clauses.iter().collect();
        loop {
            let pos = remaining
                .iter()
                .position(|cl| self.functionally_determines(cl, &env));
            match pos {
                Some(i) => {
                    let cl = remaining.remove(i);
                    env.extend(self.lhs_vars(cl));
                }
                None => return remaining.is_empty(),
            }
        }
    }

    fn clauses_rename_lhs_vars(
        &self,
        clauses: &[Clause],
        renamer: &dyn Fn(&str) -> String,
    ) -> Vec<Clause> {
        let lhs = self.lhs_vars_from_clauses(clauses);
        let lhs_only = |x: &str| {
            if lhs.iter().any(|v| v == x) {
                renamer(x)
            } else {
                x.to_string()
            }
        };
        clauses
            .iter()
            .map(|cl| self.rename_lhs_vars(cl, &lhs_only))
            .collect()
    }

    /// Renames lhs variables throughout `comp`, leaving other names alone.
    fn comp_rename_lhs_vars(&self, comp: &Comp, renamer: &dyn Fn(&str) -> String) -> Comp {
        let lhs = self.lhs_vars_from_clauses(&comp.clauses);
        let lhs_only = |x: &str| {
            if lhs.iter().any(|v| v == x) {
                renamer(x)
            } else {
                x.to_string()
            }
        };
        let clauses = comp
            .clauses
            .iter()
            .map(|cl| self.rename_lhs_vars(cl, &lhs_only))
            .collect();
        Comp::new(comp.resexp.rename(&lhs_only), clauses)
    }

    /// Renames repeated variables within one clause apart, adding an
    /// equality condition after the clause for each one.
    fn elim_sameclause_eqs(&self, comp: &Comp) -> Comp {
        use core::cell::RefCell;
        let dup_count: RefCell<hashbrown::HashMap<String, usize>> = RefCell::default();
        let mut clauses = Vec::with_capacity(comp.clauses.len());
        for cl in &comp.clauses {
            if self.kind(cl) == ClauseKind::Cond {
                clauses.push(cl.clone());
                continue;
            }
            let seen: RefCell<HashSet<String>> = RefCell::default();
            let eqs: RefCell<Vec<(String, String)>> = RefCell::default();
            let renamer = |x: &str| {
                if !seen.borrow_mut().insert(x.to_string()) {
                    let mut counts = dup_count.borrow_mut();
                    let n = counts.entry(x.to_string()).or_insert(1);
                    *n += 1;
                    let new_x = format!("{}_{}", x, n);
                    eqs.borrow_mut().push((x.to_string(), new_x.clone()));
                    new_x
                } else {
                    x.to_string()
                }
            };
            clauses.push(self.rename_lhs_vars(cl, &renamer));
            for (left, right) in eqs.into_inner() {
                clauses.push(Clause::cond(Expr::equals(Expr::name(left), Expr::name(right))));
            }
        }
        Comp::new(comp.resexp.clone(), clauses)
    }

    /// Prepends the parameters to a tuple result expression.
    fn rewrite_resexp_with_params(&self, comp: &Comp, params: &[String]) -> Result<Comp> {
        let lhs = self.lhs_vars_from_clauses(&comp.clauses);
        if let Some(p) = params.iter().find(|p| !lhs.contains(p)) {
            return Err(Error::program(format!(
                "Parameter {} is not bound by any clause of {{{} ...}}",
                p, comp.resexp
            )));
        }
        match &comp.resexp {
            Expr::Tuple(elts) => {
                let mut new_elts: Vec<Expr> = params.iter().map(|p| Expr::name(p.as_str())).collect();
                new_elts.extend(elts.iter().cloned());
                Ok(Comp::new(Expr::Tuple(new_elts), comp.clauses.clone()))
            }
            other => Err(Error::program(format!(
                "Result expression of a parameterized query must be a tuple: {}",
                other
            ))),
        }
    }

    /// Picks the original or filtered clause at each position.
    fn filter_clauses(
        &self,
        clauses: &[Clause],
        filters: &[Clause],
        env: &BindEnv,
    ) -> Result<Vec<Clause>> {
        if clauses.len() != filters.len() {
            return Err(Error::transformation(format!(
                "Filter list does not match clauses: [{}] vs [{}]",
                clause_list(clauses),
                clause_list(filters)
            )));
        }
        let mut env = env.clone();
        let mut out = Vec::with_capacity(clauses.len());
        for (cl, f) in clauses.iter().zip(filters) {
            match self.should_filter(cl, &env) {
                FilterMode::No => out.push(cl.clone()),
                FilterMode::Yes => out.push(f.clone()),
                FilterMode::Intersect => {
                    out.push(cl.clone());
                    out.push(f.clone());
                }
            }
            env.extend(self.lhs_vars(cl));
        }
        Ok(out)
    }

    /// Nested loop code for `clauses` in the given order.
    fn get_code_for_clauses(
        &self,
        clauses: &[Clause],
        env: &BindEnv,
        body: Vec<Stmt>,
    ) -> Result<Vec<Stmt>> {
        let mut envs = Vec::with_capacity(clauses.len());
        let mut cur = env.clone();
        for cl in clauses {
            envs.push(cur.clone());
            cur.extend(self.lhs_vars(cl));
        }
        let mut code = body;
        for (cl, env) in clauses.iter().zip(envs.iter()).rev() {
            code = self.get_code(cl, env, code)?;
        }
        Ok(code)
    }

    /// Loop over a join wrapped in a query occurrence named `join_name`.
    fn get_loop_for_join(&self, comp: &Comp, body: Vec<Stmt>, join_name: &str) -> Result<Stmt> {
        if !self.is_join(comp) {
            return Err(Error::transformation(format!("Not a join: {}", ir::QueryNode::Comp(comp.clone()))));
        }
        let vars = self.lhs_vars_from_clauses(&comp.clauses);
        Ok(Stmt::decomp_for(
            vars,
            Expr::query(join_name, ir::QueryNode::Comp(comp.clone())),
            body,
        ))
    }

    /// Maintenance join for a change to the relation of clause `i`.
    ///
    /// Earlier clauses are kept, clause `i` ranges over `{value}`, and
    /// later clauses over the same relation skip `value`.
    fn get_maint_join(&self, comp: &Comp, i: usize, value: &Expr) -> Result<Comp> {
        let target = comp.clauses.get(i).ok_or_else(|| {
            Error::transformation(format!("No clause {} in join of {} clauses", i, comp.clauses.len()))
        })?;
        let rel = self
            .rhs_rel(target)
            .ok_or_else(|| Error::transformation(format!("Cannot bind clause: {}", target)))?;
        let mut clauses: Vec<Clause> = comp.clauses[..i].to_vec();
        clauses.push(self.singletonize(target, value.clone())?);
        for cl in &comp.clauses[i + 1..] {
            if self.rhs_rel(cl).as_deref() == Some(rel.as_str()) {
                clauses.push(self.subtract(cl, value.clone())?);
            } else {
                clauses.push(cl.clone());
            }
        }
        Ok(Comp::new(comp.resexp.clone(), clauses))
    }

    /// One maintenance join per clause over `rel`.
    fn get_maint_join_union(&self, comp: &Comp, rel: &str, value: &Expr) -> Result<Vec<Comp>> {
        let mut joins = Vec::new();
        for (i, cl) in comp.clauses.iter().enumerate() {
            if self.rhs_rel(cl).as_deref() == Some(rel) {
                joins.push(self.get_maint_join(comp, i, value)?);
            }
        }
        Ok(joins)
    }

    /// Code applying a change of `elem` in `rel` to the result set
    /// `result_var` of `comp`.
    ///
    /// Returns the code and the maintenance joins it loops over, keyed
    /// by the names drawn from `join_names`.
    #[allow(clippy::too_many_arguments)]
    fn get_maint_code(
        &self,
        prefix: &str,
        join_names: &mut dyn FnMut() -> String,
        comp: &Comp,
        result_var: &str,
        rel: &str,
        op: SetOp,
        elem: &str,
        counted: bool,
    ) -> Result<(Vec<Stmt>, Vec<(String, Comp)>)> {
        let result_elem = format!("{}_result", prefix);
        let comp = self.comp_rename_lhs_vars(comp, &|x| format!("{}_{}", prefix, x));
        let mut body = vec![Stmt::assign(result_elem.as_str(), comp.resexp.clone())];
        body.extend(ir::rel_update(result_var, op, &result_elem, counted));

        let join = self.make_join_from_clauses(&comp.clauses);
        let mut code = Vec::new();
        let mut joins = Vec::new();
        for maint_join in self.get_maint_join_union(&join, rel, &Expr::name(elem))? {
            let name = join_names();
            code.push(self.get_loop_for_join(&maint_join, body.clone(), &name)?);
            joins.push((name, maint_join));
        }
        Ok((code, joins))
    }

    /// Order of clause indices chosen greedily: at each step the leftmost
    /// clause with the best priority. Names no clause binds count as
    /// bound from the start.
    fn order_clause_indices(&self, clauses: &[Clause], env: &BindEnv) -> Result<Vec<usize>> {
        let lhs = self.lhs_vars_from_clauses(clauses);
        let mut start = env.clone();
        for cl in clauses {
            start.extend(self.uncon_vars(cl).into_iter().filter(|v| !lhs.contains(v)));
        }
        let remaining: Vec<usize> = (0..clauses.len()).collect();
        let mut chosen = Vec::with_capacity(clauses.len());
        if search_order(self, clauses, &start, remaining, &mut chosen) {
            Ok(chosen)
        } else {
            Err(Error::transformation(format!(
                "No valid order found for clauses: {}",
                clause_list(clauses)
            )))
        }
    }

    fn order_clauses(&self, clauses: &[Clause], env: &BindEnv) -> Result<Vec<Clause>> {
        Ok(self
            .order_clause_indices(clauses, env)?
            .into_iter()
            .map(|i| clauses[i].clone())
            .collect())
    }
}

/// Depth-first search over greedy choices; the first complete order
/// found is the greedy one whenever greedy alone succeeds.
fn search_order<T: ClauseTools + ?Sized>(
    tools: &T,
    clauses: &[Clause],
    env: &BindEnv,
    remaining: Vec<usize>,
    chosen: &mut Vec<usize>,
) -> bool {
    if remaining.is_empty() {
        return true;
    }
    let mut candidates: Vec<(Priority, usize)> = remaining
        .iter()
        .filter_map(|&i| tools.get_priority(&clauses[i], env).map(|p| (p, i)))
        .collect();
    // Stable sort keeps the leftmost clause first among equals.
    candidates.sort_by_key(|(p, _)| *p);
    for (_, i) in candidates {
        let mut next_env = env.clone();
        next_env.extend(tools.lhs_vars(&clauses[i]));
        let rest: Vec<usize> = remaining.iter().copied().filter(|&j| j != i).collect();
        chosen.push(i);
        if search_order(tools, clauses, &next_env, rest, chosen) {
            return true;
        }
        chosen.pop();
    }
    false
}

/// Clause tools for the core clause forms.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoreClauseTools;

impl ClauseTools for CoreClauseTools {
    fn kind(&self, cl: &Clause) -> ClauseKind {
        match cl {
            Clause::Cond(_) => ClauseKind::Cond,
            _ => ClauseKind::Member,
        }
    }

    fn lhs_vars(&self, cl: &Clause) -> Vec<String> {
        match cl {
            Clause::RelMember { vars, .. }
            | Clause::SingMember { vars, .. }
            | Clause::VarsMember { vars, .. } => vars.clone(),
            Clause::WithoutMember { clause, .. } => self.lhs_vars(clause),
            Clause::Cond(_) => Vec::new(),
        }
    }

    fn rhs_rel(&self, cl: &Clause) -> Option<String> {
        match cl {
            Clause::RelMember { rel, .. } => Some(rel.clone()),
            Clause::WithoutMember { clause, .. } => self.rhs_rel(clause),
            _ => None,
        }
    }

    fn uncon_vars(&self, cl: &Clause) -> Vec<String> {
        match cl {
            Clause::RelMember { .. } => Vec::new(),
            Clause::SingMember { value, .. } => value.find_vars(),
            Clause::WithoutMember { clause, value } => {
                let mut out = self.uncon_vars(clause);
                push_unique(&mut out, value.find_vars());
                out
            }
            Clause::VarsMember { iter, .. } => iter.find_vars(),
            Clause::Cond(e) => e.find_vars(),
        }
    }

    fn tagsin_mask(&self, cl: &Clause) -> Vec<bool> {
        match cl {
            Clause::SingMember { vars, .. } => vec![false; vars.len()],
            Clause::WithoutMember { clause, .. } => self.tagsin_mask(clause),
            _ => {
                let n = self.lhs_vars(cl).len();
                if self.uncon_lhs_vars(cl).is_empty() {
                    vec![true; n]
                } else {
                    self.constrained_mask(cl).iter().map(|m| !m).collect()
                }
            }
        }
    }

    fn tagsout_mask(&self, cl: &Clause) -> Vec<bool> {
        match cl {
            Clause::SingMember { vars, .. } => vec![false; vars.len()],
            Clause::WithoutMember { clause, .. } => self.tagsout_mask(clause),
            _ => {
                if self.uncon_lhs_vars(cl).is_empty() {
                    vec![true; self.lhs_vars(cl).len()]
                } else {
                    self.constrained_mask(cl)
                }
            }
        }
    }

    fn should_filter(&self, cl: &Clause, env: &BindEnv) -> FilterMode {
        match cl {
            Clause::SingMember { .. } => FilterMode::Intersect,
            Clause::Cond(_) => FilterMode::No,
            Clause::WithoutMember { clause, .. } => self.should_filter(clause, env),
            _ => {
                if is_subset(&self.tagsin_lhs_vars(cl), env) {
                    FilterMode::No
                } else {
                    FilterMode::Yes
                }
            }
        }
    }

    fn functionally_determines(&self, cl: &Clause, env: &BindEnv) -> bool {
        match cl {
            Clause::RelMember { vars, .. } | Clause::VarsMember { vars, .. } => is_subset(vars, env),
            Clause::SingMember { .. } | Clause::Cond(_) => true,
            Clause::WithoutMember { clause, .. } => self.functionally_determines(clause, env),
        }
    }

    fn get_priority(&self, cl: &Clause, env: &BindEnv) -> Option<Priority> {
        match cl {
            Clause::RelMember { vars, .. } => {
                let mask = bound_mask(vars, env);
                Some(if mask.is_all_bound() {
                    Priority::Constant
                } else if mask.is_all_unbound() {
                    Priority::Unpreferred
                } else {
                    Priority::Normal
                })
            }
            Clause::SingMember { .. } => Some(Priority::Constant),
            Clause::WithoutMember { clause, .. } => self.get_priority(clause, env),
            Clause::VarsMember { vars, iter } => {
                if !is_subset(&iter.find_vars(), env) {
                    return None;
                }
                let mask = bound_mask(vars, env);
                if mask.is_all_bound() {
                    Some(Priority::Constant)
                } else if mask.is_all_unbound() {
                    Some(Priority::Unpreferred)
                } else {
                    None
                }
            }
            Clause::Cond(e) => {
                if is_subset(&e.find_vars(), env) {
                    Some(Priority::Constant)
                } else {
                    None
                }
            }
        }
    }

    fn get_code(&self, cl: &Clause, env: &BindEnv, body: Vec<Stmt>) -> Result<Vec<Stmt>> {
        match cl {
            Clause::RelMember { vars, rel } => {
                assert_unique(vars)?;
                let mask = bound_mask(vars, env);
                if mask.is_all_bound() {
                    let test = Expr::is_in(Expr::tuplify(vars, false), Expr::name(rel.as_str()));
                    Ok(vec![Stmt::if_(test, body)])
                } else if mask.is_all_unbound() {
                    Ok(vec![Stmt::decomp_for(vars.clone(), Expr::name(rel.as_str()), body)])
                } else {
                    let (bvars, uvars) = mask.split(vars)?;
                    let lookup = Expr::img_lookup(Expr::name(rel.as_str()), mask, bvars);
                    if uvars.len() == 1 {
                        Ok(vec![Stmt::for_(uvars[0].as_str(), Expr::unwrap_of(lookup), body)])
                    } else {
                        Ok(vec![Stmt::decomp_for(uvars, lookup, body)])
                    }
                }
            }
            Clause::SingMember { vars, value } => {
                assert_unique(vars)?;
                let mask = bound_mask(vars, env);
                let check_eq = Expr::equals(Expr::tuplify(vars, false), value.clone());
                if mask.is_all_bound() {
                    Ok(vec![Stmt::if_(check_eq, body)])
                } else if mask.is_all_unbound() {
                    let mut code = vec![Stmt::decomp_assign(vars.clone(), value.clone())];
                    code.extend(body);
                    Ok(code)
                } else {
                    let mut code: Vec<Stmt> = vars
                        .iter()
                        .zip(mask.bits())
                        .enumerate()
                        .filter(|(_, (_, bound))| !bound)
                        .map(|(i, (v, _))| Stmt::assign(v.as_str(), Expr::index(value.clone(), i)))
                        .collect();
                    code.push(Stmt::if_(check_eq, body));
                    Ok(code)
                }
            }
            Clause::WithoutMember { clause, value } => {
                let vars = self.lhs_vars(clause);
                let test = Expr::cmp(Expr::tuplify(&vars, false), ir::CmpOp::NotEq, value.clone());
                self.get_code(clause, env, vec![Stmt::if_(test, body)])
            }
            Clause::VarsMember { vars, iter } => {
                assert_unique(vars)?;
                let mask = bound_mask(vars, env);
                if mask.is_all_bound() {
                    let test = Expr::is_in(Expr::tuplify(vars, false), iter.clone());
                    Ok(vec![Stmt::if_(test, body)])
                } else if mask.is_all_unbound() {
                    Ok(vec![Stmt::decomp_for(vars.clone(), iter.clone(), body)])
                } else {
                    Err(Error::program(format!(
                        "Cannot run clause with partially bound variables: {}",
                        cl
                    )))
                }
            }
            Clause::Cond(e) => Ok(vec![Stmt::if_(e.clone(), body)]),
        }
    }

    fn rename_lhs_vars(&self, cl: &Clause, renamer: &dyn Fn(&str) -> String) -> Clause {
        let rename_all = |vars: &[String]| vars.iter().map(|v| renamer(v)).collect::<Vec<_>>();
        match cl {
            Clause::RelMember { vars, rel } => Clause::RelMember {
                vars: rename_all(vars),
                rel: rel.clone(),
            },
            Clause::SingMember { vars, value } => Clause::SingMember {
                vars: rename_all(vars),
                value: value.clone(),
            },
            Clause::WithoutMember { clause, value } => Clause::WithoutMember {
                clause: Box::new(self.rename_lhs_vars(clause, renamer)),
                value: value.clone(),
            },
            Clause::VarsMember { vars, iter } => Clause::VarsMember {
                vars: rename_all(vars),
                iter: iter.clone(),
            },
            Clause::Cond(e) => Clause::Cond(e.rename(&|v: &str| renamer(v))),
        }
    }

    fn rename_rhs_rel(&self, cl: &Clause, renamer: &dyn Fn(&str) -> String) -> Clause {
        match cl {
            Clause::RelMember { vars, rel } => Clause::RelMember {
                vars: vars.clone(),
                rel: renamer(rel),
            },
            Clause::WithoutMember { clause, value } => Clause::WithoutMember {
                clause: Box::new(self.rename_rhs_rel(clause, renamer)),
                value: value.clone(),
            },
            other => other.clone(),
        }
    }

    fn singletonize(&self, cl: &Clause, value: Expr) -> Result<Clause> {
        match cl {
            Clause::RelMember { vars, .. } => Ok(Clause::sing_member(vars.clone(), value)),
            Clause::WithoutMember { clause, value: without } => Ok(Clause::WithoutMember {
                clause: Box::new(self.singletonize(clause, value)?),
                value: without.clone(),
            }),
            other => Err(Error::transformation(format!(
                "Cannot singletonize clause: {}",
                other
            ))),
        }
    }
}
