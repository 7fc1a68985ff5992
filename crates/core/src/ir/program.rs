//! Whole programs.

use super::stmt::Stmt;
use alloc::string::String;
use alloc::vec::Vec;

/// A program-level function.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

impl FnDef {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }
}

/// Kind of a global store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    Relation { counted: bool },
    Map,
}

/// A global relation or map, created empty when the program starts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Global {
    pub name: String,
    pub kind: GlobalKind,
}

/// A program: global stores, functions, and a top-level body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    pub globals: Vec<Global>,
    pub funcs: Vec<FnDef>,
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self {
            globals: Vec::new(),
            funcs: Vec::new(),
            body,
        }
    }

    /// Declares a global relation unless one with that name exists.
    pub fn declare_relation(&mut self, name: &str, counted: bool) {
        if !self.has_global(name) {
            self.globals.push(Global {
                name: name.into(),
                kind: GlobalKind::Relation { counted },
            });
        }
    }

    /// Declares a global map unless one with that name exists.
    pub fn declare_map(&mut self, name: &str) {
        if !self.has_global(name) {
            self.globals.push(Global {
                name: name.into(),
                kind: GlobalKind::Map,
            });
        }
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.iter().any(|g| g.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Adds a function to the program.
    pub fn add_func(&mut self, func: FnDef) {
        self.funcs.push(func);
    }

    /// Inserts functions ahead of the existing ones, keeping their order.
    pub fn prepend_funcs(&mut self, funcs: Vec<FnDef>) {
        let rest = core::mem::take(&mut self.funcs);
        self.funcs = funcs;
        self.funcs.extend(rest);
    }

    pub fn func(&self, name: &str) -> Option<&FnDef> {
        self.funcs.iter().find(|f| f.name == name)
    }
}
