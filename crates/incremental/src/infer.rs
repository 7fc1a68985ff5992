//! Result types of transformed queries, read off relation symbol types.

use crate::symtab::SymbolTable;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use ivmc_core::ir::{Clause, Comp, Expr};
use ivmc_core::Type;

/// Types of the variables bound by relation membership clauses.
pub fn clause_var_types(symtab: &SymbolTable, clauses: &[Clause]) -> HashMap<String, Type> {
    let mut types: HashMap<String, Type> = HashMap::new();
    for cl in clauses {
        let mut inner = cl;
        while let Clause::WithoutMember { clause, .. } = inner {
            inner = clause;
        }
        let Clause::RelMember { vars, rel } = inner else {
            continue;
        };
        let elts: Vec<Type> = symtab
            .relation(rel)
            .and_then(|r| r.ty.elt())
            .and_then(Type::tuple_elts)
            .filter(|elts| elts.len() == vars.len())
            .map(<[Type]>::to_vec)
            .unwrap_or_else(|| alloc::vec![Type::Top; vars.len()]);
        for (v, t) in vars.iter().zip(elts) {
            let joined = match types.get(v) {
                Some(prev) => prev.join(&t),
                None => t,
            };
            types.insert(v.clone(), joined);
        }
    }
    types
}

/// Type of `expr` given variable types; `Top` where unknown.
pub fn expr_type(vars: &HashMap<String, Type>, expr: &Expr) -> Type {
    match expr {
        Expr::Name(n) => vars.get(n).cloned().unwrap_or(Type::Top),
        Expr::Tuple(elts) => Type::tuple(elts.iter().map(|e| expr_type(vars, e))),
        _ => Type::Top,
    }
}

/// Set type of a comprehension's result.
pub fn comp_type(symtab: &SymbolTable, comp: &Comp) -> Type {
    let vars = clause_var_types(symtab, &comp.clauses);
    Type::set(expr_type(&vars, &comp.resexp))
}
