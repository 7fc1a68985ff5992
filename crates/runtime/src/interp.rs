//! Statement execution and expression evaluation.

use crate::store::{Bag, Dict, Tree};
use crate::value::Val;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use hashbrown::HashMap;
use ivmc_core::ir::{BinOp, BoolOp, Builtin, CmpOp, Expr, FnDef, GlobalKind, Program, Stmt};
use ivmc_core::{Error, Result, Value};
use tracing::trace;

/// Local variables of the running function or of the top-level body.
pub(crate) type Frame = HashMap<String, Val>;

const MAX_CALL_DEPTH: usize = 256;

/// How a block finished.
enum Flow {
    Next,
    Return(Val),
}

/// Executes one program.
///
/// Global stores are created empty from the program's declarations.
/// Functions see their parameters, their own locals and the global
/// stores; the top-level body additionally keeps its variables after
/// [`Interpreter::run`] for inspection.
pub struct Interpreter {
    funcs: HashMap<String, Rc<FnDef>>,
    body: Rc<Vec<Stmt>>,
    stores: HashMap<String, Val>,
    module: Frame,
    depth: usize,
}

impl Interpreter {
    pub fn new(program: &Program) -> Self {
        let mut interp = Self {
            funcs: program
                .funcs
                .iter()
                .map(|f| (f.name.clone(), Rc::new(f.clone())))
                .collect(),
            body: Rc::new(program.body.clone()),
            stores: HashMap::new(),
            module: Frame::new(),
            depth: 0,
        };
        for global in &program.globals {
            match global.kind {
                GlobalKind::Relation { .. } => interp.declare_relation(&global.name),
                GlobalKind::Map => interp.declare_map(&global.name),
            }
        }
        interp
    }

    /// Creates an empty global relation unless the name is taken.
    pub fn declare_relation(&mut self, name: &str) {
        self.stores.entry(name.into()).or_insert_with(Val::new_set);
    }

    /// Creates an empty global map unless the name is taken.
    pub fn declare_map(&mut self, name: &str) {
        self.stores.entry(name.into()).or_insert_with(Val::new_map);
    }

    /// Runs the top-level body.
    pub fn run(&mut self) -> Result<()> {
        let body = self.body.clone();
        let mut module = core::mem::take(&mut self.module);
        let flow = self.exec_block(&body, &mut module);
        self.module = module;
        match flow? {
            Flow::Next => Ok(()),
            Flow::Return(_) => Err(Error::runtime("Return outside of a function")),
        }
    }

    /// Calls a program function, returning `None` when it falls off
    /// its end.
    pub fn call(&mut self, name: &str, args: Vec<Val>) -> Result<Val> {
        let func = self
            .funcs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::runtime(format!("Call of undefined function {}", name)))?;
        if func.params.len() != args.len() {
            return Err(Error::runtime(format!(
                "{} takes {} arguments, {} given",
                name,
                func.params.len(),
                args.len()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Error::runtime(format!("Call depth exceeded in {}", name)));
        }
        trace!(func = name, "call");
        let mut frame: Frame = func.params.iter().cloned().zip(args).collect();
        self.depth += 1;
        let flow = self.exec_block(&func.body, &mut frame);
        self.depth -= 1;
        match flow? {
            Flow::Next => Ok(Val::none()),
            Flow::Return(v) => Ok(v),
        }
    }

    /// A global relation or map.
    pub fn store(&self, name: &str) -> Option<&Val> {
        self.stores.get(name)
    }

    /// A top-level variable left by [`Interpreter::run`].
    pub fn var(&self, name: &str) -> Option<&Val> {
        self.module.get(name)
    }

    /// Distinct elements of a global relation, ascending.
    pub fn relation(&self, name: &str) -> Option<Vec<Val>> {
        match self.stores.get(name)? {
            v @ Val::Set(_) => v.sorted_elements(),
            _ => None,
        }
    }

    /// Elements of a global relation with their counts, ascending.
    pub fn relation_counts(&self, name: &str) -> Option<Vec<(Val, usize)>> {
        match self.stores.get(name)? {
            Val::Set(s) => {
                let mut counts = s.borrow().counts();
                counts.sort();
                Some(counts)
            }
            _ => None,
        }
    }

    /// Entries of a global map in ascending key order.
    pub fn map_entries(&self, name: &str) -> Option<Vec<(Val, Val)>> {
        match self.stores.get(name)? {
            Val::Map(m) => Some(m.borrow().entries()),
            _ => None,
        }
    }

    pub(crate) fn lookup(&self, name: &str, frame: &Frame) -> Result<Val> {
        frame
            .get(name)
            .or_else(|| self.stores.get(name))
            .cloned()
            .ok_or_else(|| Error::runtime(format!("Unbound name {}", name)))
    }

    fn global_store(&self, name: &str) -> Result<Val> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| Error::runtime(format!("No global store {}", name)))
    }

    fn exec_block(&mut self, block: &[Stmt], frame: &mut Frame) -> Result<Flow> {
        for stmt in block {
            if let Flow::Return(v) = self.exec(stmt, frame)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow> {
        match stmt {
            Stmt::Assign { target, value } => {
                let v = self.eval(value, frame)?;
                frame.insert(target.clone(), v);
            }
            Stmt::DecompAssign { vars, value } => {
                let v = self.eval(value, frame)?;
                bind_tuple(vars, &v, frame)?;
            }
            Stmt::Expr(e) => {
                self.eval(e, frame)?;
            }
            Stmt::If { test, body, orelse } => {
                let branch = if self.eval(test, frame)?.is_truthy() { body } else { orelse };
                return self.exec_block(branch, frame);
            }
            Stmt::For { target, iter, body } => {
                let items = self.eval(iter, frame).and_then(|v| members(&v))?;
                for item in items {
                    frame.insert(target.clone(), item);
                    if let Flow::Return(v) = self.exec_block(body, frame)? {
                        return Ok(Flow::Return(v));
                    }
                }
            }
            Stmt::DecompFor { vars, iter, body } => {
                let items = self.eval(iter, frame).and_then(|v| members(&v))?;
                for item in items {
                    bind_tuple(vars, &item, frame)?;
                    if let Flow::Return(v) = self.exec_block(body, frame)? {
                        return Ok(Flow::Return(v));
                    }
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test, frame)?.is_truthy() {
                    if let Flow::Return(v) = self.exec_block(body, frame)? {
                        return Ok(Flow::Return(v));
                    }
                }
            }
            Stmt::Return(e) => return Ok(Flow::Return(self.eval(e, frame)?)),
            Stmt::RelUpdate { rel, op, elem } => {
                let set = self.global_store(rel)?;
                let elem = self.lookup(elem, frame)?;
                update_set(&set, *op, elem)?;
            }
            Stmt::RelClear { rel } => clear(&self.global_store(rel)?)?,
            Stmt::SetUpdate { target, op, elem } => {
                let set = self.eval(target, frame)?;
                let elem = self.eval(elem, frame)?;
                update_set(&set, *op, elem)?;
            }
            Stmt::SetClear { target } => clear(&self.eval(target, frame)?)?,
            Stmt::MapAssign { map, key, value } => {
                let m = self.global_store(map)?;
                let key = self.eval(key, frame)?;
                let value = self.eval(value, frame)?;
                as_map(&m)?.borrow_mut().assign(key, value)?;
            }
            Stmt::MapDelete { map, key } => {
                let m = self.global_store(map)?;
                let key = self.eval(key, frame)?;
                as_map(&m)?.borrow_mut().delete(&key)?;
            }
            Stmt::MapClear { map } => clear(&self.global_store(map)?)?,
            // Demand sets exist only once a transformation introduces them.
            Stmt::ResetDemand { .. } => {}
        }
        Ok(Flow::Next)
    }

    pub(crate) fn eval(&mut self, expr: &Expr, frame: &Frame) -> Result<Val> {
        match expr {
            Expr::Name(n) => self.lookup(n, frame),
            Expr::Const(v) => Ok(Val::Scalar(v.clone())),
            Expr::Tuple(elts) => Ok(Val::Tuple(self.eval_all(elts, frame)?)),
            Expr::Index(v, i) => {
                let v = self.eval(v, frame)?;
                v.as_tuple()
                    .and_then(|elts| elts.get(*i))
                    .cloned()
                    .ok_or_else(|| Error::runtime(format!("Cannot index {} at {}", v, i)))
            }
            Expr::BinOp(l, op, r) => {
                let l = self.eval(l, frame)?;
                let r = self.eval(r, frame)?;
                arith(&l, *op, &r)
            }
            Expr::Not(v) => Ok(Val::bool(!self.eval(v, frame)?.is_truthy())),
            Expr::Compare(l, op, r) => {
                let l = self.eval(l, frame)?;
                let r = self.eval(r, frame)?;
                compare(&l, *op, &r).map(Val::bool)
            }
            Expr::BoolOp(op, operands) => {
                for e in operands {
                    let truthy = self.eval(e, frame)?.is_truthy();
                    match op {
                        BoolOp::And if !truthy => return Ok(Val::bool(false)),
                        BoolOp::Or if truthy => return Ok(Val::bool(true)),
                        _ => {}
                    }
                }
                Ok(Val::bool(matches!(op, BoolOp::And)))
            }
            Expr::Call(func, args) => {
                let args = self.eval_all(args, frame)?;
                self.call(func, args)
            }
            Expr::Builtin(b, args) => {
                let args = self.eval_all(args, frame)?;
                builtin(*b, &args)
            }
            Expr::FirstThen(first, then) => {
                for e in first {
                    self.eval(e, frame)?;
                }
                self.eval(then, frame)
            }
            Expr::EmptySet => Ok(Val::new_set()),
            Expr::EmptyTree => Ok(Val::new_tree()),
            Expr::GetCount(set, elem) => {
                let set = self.eval(set, frame)?;
                let elem = self.eval(elem, frame)?;
                let n = as_set(&set)?.borrow().count(&elem);
                Ok(Val::int(n as i64))
            }
            Expr::DictLookup { map, key, default } => {
                let m = self.eval(map, frame)?;
                let key = self.eval(key, frame)?;
                let found = as_map(&m)?.borrow().get(&key).cloned();
                match (found, default) {
                    (Some(v), _) => Ok(v),
                    (None, Some(d)) => self.eval(d, frame),
                    (None, None) => Err(Error::runtime(format!("Lookup of unbound map key {}", key))),
                }
            }
            Expr::ImgLookup { set, mask, bounds } => {
                let set = self.eval(set, frame)?;
                let keys = bounds
                    .iter()
                    .map(|b| self.lookup(b, frame))
                    .collect::<Result<Vec<_>>>()?;
                crate::query::image(&set, mask, &keys)
            }
            Expr::SetFromMap { map, mask } => {
                let m = self.eval(map, frame)?;
                crate::query::set_from_map(&m, mask)
            }
            Expr::Wrap(v) => {
                let v = self.eval(v, frame)?;
                let items = members(&v)?;
                Ok(Val::set_of(items.into_iter().map(|e| Val::tuple([e]))))
            }
            Expr::Unwrap(v) => {
                let v = self.eval(v, frame)?;
                let items = members(&v)?
                    .into_iter()
                    .map(|e| match e.as_tuple() {
                        Some([inner]) => Ok(inner.clone()),
                        _ => Err(Error::runtime(format!("Cannot unwrap {}", e))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Val::set_of(items))
            }
            Expr::Query { name, node } => {
                trace!(query = %name, "evaluating query from scratch");
                self.eval_query(node, frame)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], frame: &Frame) -> Result<Vec<Val>> {
        exprs.iter().map(|e| self.eval(e, frame)).collect()
    }
}

/// Binds `vars` to the components of tuple `value`.
pub(crate) fn bind_tuple(vars: &[String], value: &Val, frame: &mut Frame) -> Result<()> {
    match value.as_tuple() {
        Some(elts) if elts.len() == vars.len() => {
            for (var, v) in vars.iter().zip(elts) {
                frame.insert(var.clone(), v.clone());
            }
            Ok(())
        }
        _ => Err(Error::runtime(format!(
            "Cannot unpack {} into {} variables",
            value,
            vars.len()
        ))),
    }
}

/// Snapshot of the items iterated by a loop over `value`.
pub(crate) fn members(value: &Val) -> Result<Vec<Val>> {
    match value {
        Val::Set(s) => Ok(s.borrow().elements()),
        Val::Tree(t) => Ok(t.borrow().elements()),
        Val::Map(m) => Ok(m.borrow().keys()),
        Val::Tuple(elts) => Ok(elts.clone()),
        Val::Scalar(_) => Err(Error::runtime(format!("Cannot iterate over {}", value))),
    }
}

pub(crate) fn as_set(value: &Val) -> Result<&Rc<RefCell<Bag>>> {
    match value {
        Val::Set(s) => Ok(s),
        _ => Err(Error::runtime(format!("Expected a set, got {}", value))),
    }
}

fn as_map(value: &Val) -> Result<&Rc<RefCell<Dict>>> {
    match value {
        Val::Map(m) => Ok(m),
        _ => Err(Error::runtime(format!("Expected a map, got {}", value))),
    }
}

fn as_tree(value: &Val) -> Result<&Rc<RefCell<Tree>>> {
    match value {
        Val::Tree(t) => Ok(t),
        _ => Err(Error::runtime(format!("Expected a tree, got {}", value))),
    }
}

fn update_set(target: &Val, op: ivmc_core::ir::SetOp, elem: Val) -> Result<()> {
    match target {
        Val::Set(s) => s.borrow_mut().update(op, elem),
        Val::Tree(t) => t.borrow_mut().update(op, elem),
        _ => Err(Error::runtime(format!("Cannot {} on {}", op.name(), target))),
    }
}

fn clear(target: &Val) -> Result<()> {
    match target {
        Val::Set(s) => s.borrow_mut().clear(),
        Val::Tree(t) => t.borrow_mut().clear(),
        Val::Map(m) => m.borrow_mut().clear(),
        _ => return Err(Error::runtime(format!("Cannot clear {}", target))),
    }
    Ok(())
}

fn arith(l: &Val, op: BinOp, r: &Val) -> Result<Val> {
    match (l, op, r) {
        (Val::Scalar(Value::Int(a)), BinOp::Add, Val::Scalar(Value::Int(b))) => Ok(Val::int(a.wrapping_add(*b))),
        (Val::Scalar(Value::Int(a)), BinOp::Sub, Val::Scalar(Value::Int(b))) => Ok(Val::int(a.wrapping_sub(*b))),
        (Val::Scalar(Value::Str(a)), BinOp::Add, Val::Scalar(Value::Str(b))) => {
            let mut s = a.clone();
            s.push_str(b);
            Ok(Val::from(s))
        }
        (Val::Tuple(a), BinOp::Add, Val::Tuple(b)) => Ok(Val::tuple(a.iter().chain(b).cloned())),
        _ => Err(Error::runtime(format!("Unsupported operands: {} {} {}", l, op, r))),
    }
}

fn compare(l: &Val, op: CmpOp, r: &Val) -> Result<bool> {
    Ok(match op {
        CmpOp::Eq => l == r,
        CmpOp::NotEq => l != r,
        CmpOp::Lt => l < r,
        CmpOp::LtE => l <= r,
        CmpOp::Gt => l > r,
        CmpOp::GtE => l >= r,
        CmpOp::In => contains(r, l)?,
        CmpOp::NotIn => !contains(r, l)?,
    })
}

fn contains(container: &Val, elem: &Val) -> Result<bool> {
    match container {
        Val::Set(s) => Ok(s.borrow().contains(elem)),
        Val::Tree(t) => Ok(t.borrow().contains(elem)),
        Val::Map(m) => Ok(m.borrow().contains_key(elem)),
        Val::Tuple(elts) => Ok(elts.contains(elem)),
        Val::Scalar(_) => Err(Error::runtime(format!("Membership test in {}", container))),
    }
}

fn builtin(b: Builtin, args: &[Val]) -> Result<Val> {
    let [arg] = args else {
        return Err(Error::runtime(format!("{} takes one argument", b.name())));
    };
    match b {
        Builtin::Len => {
            let n = match arg {
                Val::Set(s) => s.borrow().len(),
                Val::Tree(t) => t.borrow().len(),
                Val::Map(m) => m.borrow().len(),
                Val::Tuple(elts) => elts.len(),
                Val::Scalar(_) => return Err(Error::runtime(format!("len() of {}", arg))),
            };
            Ok(Val::int(n as i64))
        }
        Builtin::TreeMin => Ok(as_tree(arg)?.borrow().min().cloned().unwrap_or_else(Val::none)),
        Builtin::TreeMax => Ok(as_tree(arg)?.borrow().max().cloned().unwrap_or_else(Val::none)),
        Builtin::Peek => as_set(arg)?
            .borrow()
            .peek()
            .cloned()
            .ok_or_else(|| Error::runtime("peek() of an empty set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use ivmc_core::ir::SetOp;

    fn run(globals: &[&str], body: Vec<Stmt>) -> Result<Interpreter> {
        let mut program = Program::new(body);
        for g in globals {
            program.declare_relation(g, false);
        }
        let mut interp = Interpreter::new(&program);
        interp.run()?;
        Ok(interp)
    }

    fn pair(a: i64, b: i64) -> Expr {
        Expr::tuple([Expr::int(a), Expr::int(b)])
    }

    #[test]
    fn test_relation_updates() {
        let interp = run(
            &["R"],
            vec![
                Stmt::assign("e", pair(1, 2)),
                Stmt::rel_update("R", SetOp::Add, "e"),
                Stmt::rel_update("R", SetOp::IncCount, "e"),
                Stmt::assign("f", pair(3, 4)),
                Stmt::rel_update("R", SetOp::Add, "f"),
                Stmt::rel_update("R", SetOp::Remove, "f"),
            ],
        )
        .unwrap();
        assert_eq!(
            interp.relation_counts("R"),
            Some(vec![(Val::tuple([Val::int(1), Val::int(2)]), 2)])
        );
    }

    #[test]
    fn test_checked_updates_fail() {
        let err = run(
            &["R"],
            vec![
                Stmt::assign("e", Expr::int(1)),
                Stmt::rel_update("R", SetOp::Add, "e"),
                Stmt::rel_update("R", SetOp::Add, "e"),
            ],
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Runtime { .. }));
        assert!(err.message().contains("already present"));
    }

    #[test]
    fn test_functions_and_return() {
        let mut program = Program::new(vec![Stmt::assign(
            "out",
            Expr::call("inc", [Expr::int(41)]),
        )]);
        program.add_func(FnDef::new(
            "inc",
            vec!["x".into()],
            vec![
                Stmt::if_(
                    Expr::cmp(Expr::name("x"), CmpOp::Gt, Expr::int(100)),
                    vec![Stmt::Return(Expr::none())],
                ),
                Stmt::Return(Expr::binop(Expr::name("x"), BinOp::Add, Expr::int(1))),
            ],
        ));
        let mut interp = Interpreter::new(&program);
        interp.run().unwrap();
        assert_eq!(interp.var("out"), Some(&Val::int(42)));
        assert_eq!(interp.call("inc", vec![Val::int(500)]).unwrap(), Val::none());
        assert!(interp.call("inc", vec![]).is_err());
        assert!(interp.call("missing", vec![]).is_err());
    }

    #[test]
    fn test_nested_sets_are_shared() {
        let mut program = Program::new(vec![
            Stmt::map_assign("M", Expr::int(1), Expr::EmptySet),
            Stmt::SetUpdate {
                target: Expr::dict_lookup(Expr::name("M"), Expr::int(1), None),
                op: SetOp::Add,
                elem: Expr::str("a"),
            },
            Stmt::assign("n", Expr::len(Expr::dict_lookup(Expr::name("M"), Expr::int(1), None))),
            Stmt::assign("d", Expr::dict_lookup(Expr::name("M"), Expr::int(2), Some(Expr::int(0)))),
        ]);
        program.declare_map("M");
        let mut interp = Interpreter::new(&program);
        interp.run().unwrap();
        assert_eq!(interp.var("n"), Some(&Val::int(1)));
        assert_eq!(interp.var("d"), Some(&Val::int(0)));
    }

    #[test]
    fn test_tree_state_tuple() {
        let interp = run(
            &[],
            vec![
                Stmt::assign("state", Expr::tuple([Expr::EmptyTree, Expr::none()])),
                Stmt::assign("t", Expr::index(Expr::name("state"), 0)),
                Stmt::SetUpdate {
                    target: Expr::name("t"),
                    op: SetOp::Add,
                    elem: Expr::int(7),
                },
                Stmt::SetUpdate {
                    target: Expr::name("t"),
                    op: SetOp::Add,
                    elem: Expr::int(3),
                },
                Stmt::assign(
                    "state",
                    Expr::tuple([Expr::name("t"), Expr::builtin(Builtin::TreeMin, [Expr::name("t")])]),
                ),
                Stmt::assign("low", Expr::index(Expr::name("state"), 1)),
                Stmt::assign("size", Expr::len(Expr::index(Expr::name("state"), 0))),
            ],
        )
        .unwrap();
        assert_eq!(interp.var("low"), Some(&Val::int(3)));
        assert_eq!(interp.var("size"), Some(&Val::int(2)));
    }

    #[test]
    fn test_peek_and_while() {
        let interp = run(
            &["U"],
            vec![
                Stmt::assign("a", Expr::tuple([Expr::int(1)])),
                Stmt::rel_update("U", SetOp::Add, "a"),
                Stmt::assign("b", Expr::tuple([Expr::int(2)])),
                Stmt::rel_update("U", SetOp::Add, "b"),
                Stmt::While {
                    test: Expr::cmp(Expr::len(Expr::name("U")), CmpOp::GtE, Expr::int(2)),
                    body: vec![
                        Stmt::assign("stale", Expr::builtin(Builtin::Peek, [Expr::name("U")])),
                        Stmt::rel_update("U", SetOp::Remove, "stale"),
                    ],
                },
            ],
        )
        .unwrap();
        assert_eq!(interp.relation("U"), Some(vec![Val::tuple([Val::int(2)])]));
        assert_eq!(interp.var("stale"), Some(&Val::tuple([Val::int(1)])));
    }

    #[test]
    fn test_decomposition_checks_arity() {
        let err = run(
            &[],
            vec![Stmt::decomp_assign(vec!["x".into(), "y".into()], Expr::tuple([Expr::int(1)]))],
        )
        .err()
        .unwrap();
        assert!(err.message().contains("Cannot unpack"));
    }

    #[test]
    fn test_unbound_name() {
        let err = run(&[], vec![Stmt::assign("x", Expr::name("y"))]).err().unwrap();
        assert_eq!(err.message(), "Unbound name y");
    }
}
