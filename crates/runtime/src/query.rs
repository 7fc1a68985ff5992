//! From-scratch evaluation of query occurrences and lookup forms.
//!
//! A comprehension binds its clauses left to right. A clause variable
//! already bound in scope, by an enclosing frame or an earlier clause,
//! acts as a constraint; any other variable is bound by the clause.
//! The result counts one reference per satisfying binding.

use crate::interp::{as_set, members, Frame, Interpreter};
use crate::store::Bag;
use crate::value::Val;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use ivmc_core::ir::{AggrOp, Clause, Comp, QueryNode};
use ivmc_core::{Error, Mask, Result};

impl Interpreter {
    pub(crate) fn eval_query(&mut self, node: &QueryNode, frame: &Frame) -> Result<Val> {
        match node {
            QueryNode::Comp(comp) => self.eval_comp(comp, frame),
            QueryNode::Aggr { op, value } => {
                let operand = self.eval(value, frame)?;
                aggregate(*op, &operand)
            }
            QueryNode::AggrRestr {
                op,
                value,
                params,
                restr,
            } => {
                let key = Val::Tuple(
                    params
                        .iter()
                        .map(|p| self.lookup(p, frame))
                        .collect::<Result<Vec<_>>>()?,
                );
                let restr = self.eval(restr, frame)?;
                if !as_set(&restr)?.borrow().contains(&key) {
                    return Err(Error::runtime(format!(
                        "Aggregate {} evaluated for undemanded key {}",
                        node, key
                    )));
                }
                let operand = self.eval(value, frame)?;
                aggregate(*op, &operand)
            }
        }
    }

    fn eval_comp(&mut self, comp: &Comp, frame: &Frame) -> Result<Val> {
        let mut bindings = vec![frame.clone()];
        for clause in &comp.clauses {
            let mut next = Vec::new();
            for binding in &bindings {
                self.expand_clause(clause, binding, &mut next)?;
            }
            bindings = next;
        }
        let mut result = Bag::new();
        for binding in &bindings {
            result.insert(self.eval(&comp.resexp, binding)?);
        }
        Ok(Val::Set(Rc::new(RefCell::new(result))))
    }

    /// Pushes every extension of `binding` satisfying `clause`.
    fn expand_clause(&mut self, clause: &Clause, binding: &Frame, out: &mut Vec<Frame>) -> Result<()> {
        match clause {
            Clause::RelMember { vars, rel } => {
                let rel = self.lookup(rel, binding)?;
                match_all(vars, &members(&rel)?, binding, out)
            }
            Clause::VarsMember { vars, iter } => {
                let iter = self.eval(iter, binding)?;
                match_all(vars, &members(&iter)?, binding, out)
            }
            Clause::SingMember { vars, value } => {
                let value = self.eval(value, binding)?;
                match_all(vars, &[value], binding, out)
            }
            Clause::WithoutMember { clause, value } => {
                let excluded = self.eval(value, binding)?;
                let vars = member_vars(clause)?;
                let mut inner = Vec::new();
                self.expand_clause(clause, binding, &mut inner)?;
                for b in inner {
                    let elem = Val::Tuple(vars.iter().filter_map(|v| b.get(v).cloned()).collect());
                    if elem != excluded {
                        out.push(b);
                    }
                }
                Ok(())
            }
            Clause::Cond(test) => {
                if self.eval(test, binding)?.is_truthy() {
                    out.push(binding.clone());
                }
                Ok(())
            }
        }
    }
}

fn member_vars(clause: &Clause) -> Result<&[String]> {
    match clause {
        Clause::RelMember { vars, .. } | Clause::SingMember { vars, .. } | Clause::VarsMember { vars, .. } => {
            Ok(vars)
        }
        Clause::WithoutMember { clause, .. } => member_vars(clause),
        Clause::Cond(_) => Err(Error::runtime(format!("Cannot subtract from condition {}", clause))),
    }
}

fn match_all(vars: &[String], elems: &[Val], binding: &Frame, out: &mut Vec<Frame>) -> Result<()> {
    for elem in elems {
        if let Some(b) = match_elem(vars, elem, binding)? {
            out.push(b);
        }
    }
    Ok(())
}

/// Extends `binding` so that `vars` matches tuple `elem`, or `None`
/// when a bound variable disagrees.
fn match_elem(vars: &[String], elem: &Val, binding: &Frame) -> Result<Option<Frame>> {
    let elts = match elem.as_tuple() {
        Some(elts) if elts.len() == vars.len() => elts,
        _ => {
            return Err(Error::runtime(format!(
                "Cannot match {} against {} variables",
                elem,
                vars.len()
            )))
        }
    };
    let mut b = binding.clone();
    for (var, v) in vars.iter().zip(elts) {
        match b.get(var) {
            Some(bound) if bound != v => return Ok(None),
            Some(_) => {}
            None => {
                b.insert(var.clone(), v.clone());
            }
        }
    }
    Ok(Some(b))
}

fn aggregate(op: AggrOp, operand: &Val) -> Result<Val> {
    let elems = members(operand)?;
    match op {
        AggrOp::Count => Ok(Val::int(elems.len() as i64)),
        AggrOp::Sum => elems.iter().try_fold(Val::int(0), |acc, e| match (acc.as_int(), e.as_int()) {
            (Some(a), Some(b)) => Ok(Val::int(a.wrapping_add(b))),
            _ => Err(Error::runtime(format!("sum() over non-integer {}", e))),
        }),
        AggrOp::Min => Ok(elems.into_iter().min().unwrap_or_else(Val::none)),
        AggrOp::Max => Ok(elems.into_iter().max().unwrap_or_else(Val::none)),
    }
}

/// Image of `set` under the bound components `keys`: the tuples of
/// unbound components of every element agreeing with `keys`.
pub(crate) fn image(set: &Val, mask: &Mask, keys: &[Val]) -> Result<Val> {
    let mut out = Bag::new();
    for elem in members(set)? {
        let elts = elem
            .as_tuple()
            .ok_or_else(|| Error::runtime(format!("Image lookup on non-tuple {}", elem)))?;
        let (bound, unbound) = mask.split(elts)?;
        if bound == keys && !out.contains(&Val::Tuple(unbound.clone())) {
            out.insert(Val::Tuple(unbound));
        }
    }
    Ok(Val::Set(Rc::new(RefCell::new(out))))
}

/// The relation of `key + (value,)` tuples of map `map`, placed by `mask`.
pub(crate) fn set_from_map(map: &Val, mask: &Mask) -> Result<Val> {
    let Val::Map(m) = map else {
        return Err(Error::runtime(format!("setfrommap() of non-map {}", map)));
    };
    let mut out = Bag::new();
    for (key, value) in m.borrow().entries() {
        let key_elts = key
            .as_tuple()
            .ok_or_else(|| Error::runtime(format!("setfrommap() needs tuple keys, got {}", key)))?;
        out.insert(Val::Tuple(mask.combine(key_elts, &[value])?));
    }
    Ok(Val::Set(Rc::new(RefCell::new(out))))
}
