//! Tag and filter structures for demand-filtered maintenance.
//!
//! Structures are generated in one left-to-right pass over the clauses
//! of a comprehension. A filter restricts the relation of clause `i` to
//! the values its inbound variables take in the tags of earlier
//! clauses; a tag projects one outbound variable of a (filtered)
//! clause. Clause 0 is its own filter.

use crate::clause::{ClauseKind, ClauseTools};
use crate::naming;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use ivmc_core::ir::{Clause, Comp, Expr};
use ivmc_core::{Error, Result};

/// Restriction of the relation read by clause `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub i: usize,
    pub name: String,
    /// The unfiltered clause.
    pub clause: Clause,
    /// Tags gating the filter.
    pub preds: Vec<String>,
}

/// The values one variable takes in clause `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    pub i: usize,
    pub name: String,
    pub tag_var: String,
    /// Clause projected, already over the filter of clause `i` if any.
    pub clause: Clause,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Structure {
    Tag(Tag),
    Filter(Filter),
}

impl Structure {
    pub fn name(&self) -> &str {
        match self {
            Structure::Tag(t) => &t.name,
            Structure::Filter(f) => &f.name,
        }
    }
}

/// Builds the tags and filters of one comprehension query.
pub struct StructureGenerator<'a> {
    tools: &'a dyn ClauseTools,
    query: String,
    comp: Comp,
    singletag: bool,
    /// Names already taken outside this generator.
    reserved: HashSet<String>,
    /// All structures in definition order.
    pub structs: Vec<Structure>,
}

impl<'a> StructureGenerator<'a> {
    pub fn new(tools: &'a dyn ClauseTools, query: &str, comp: Comp, singletag: bool) -> Self {
        Self {
            tools,
            query: query.into(),
            comp,
            singletag,
            reserved: HashSet::new(),
            structs: Vec::new(),
        }
    }

    /// Keeps structure names, and their result relations, clear of `names`.
    pub fn with_reserved<I: IntoIterator<Item = String>>(mut self, names: I) -> Self {
        self.reserved.extend(names);
        self
    }

    /// Whether `name` can be given to a new structure.
    fn is_free(&self, name: &str) -> bool {
        !self.reserved.contains(name)
            && !self.reserved.contains(&naming::result_set(name))
            && self.structs.iter().all(|s| s.name() != name)
    }

    /// First numbered name from `from` on that is free.
    fn numbered(&self, from: usize, make: impl Fn(usize) -> String) -> String {
        let mut n = from;
        loop {
            let name = make(n);
            if self.is_free(&name) {
                return name;
            }
            n += 1;
        }
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.structs.iter().filter_map(|s| match s {
            Structure::Filter(f) => Some(f),
            Structure::Tag(_) => None,
        })
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.structs.iter().filter_map(|s| match s {
            Structure::Tag(t) => Some(t),
            Structure::Filter(_) => None,
        })
    }

    fn filter_rel(&self, f: &Filter) -> Option<String> {
        self.tools.rhs_rel(&f.clause)
    }

    fn count_filters_on(&self, rel: &str) -> usize {
        self.filters()
            .filter(|f| self.filter_rel(f).as_deref() == Some(rel))
            .count()
    }

    fn count_tags_on(&self, var: &str) -> usize {
        self.tags().filter(|t| t.tag_var == var).count()
    }

    /// `cl` reading the result relation of structure `name`.
    fn over(&self, cl: &Clause, name: &str) -> Clause {
        let rel = naming::result_set(name);
        self.tools.rename_rhs_rel(cl, &|_| rel.clone())
    }

    /// Tags of clauses before `i` over any of `in_vars`.
    fn preds(&self, i: usize, in_vars: &[String]) -> Vec<String> {
        let mut out: Vec<String> = in_vars
            .iter()
            .flat_map(|v| self.tags().filter(move |t| &t.tag_var == v && t.i < i))
            .map(|t| t.name.clone())
            .collect();
        if self.singletag {
            out.truncate(1);
        }
        out
    }

    /// Generates the numbered structures.
    pub fn make_structs(&mut self) -> Result<()> {
        let clauses = self.comp.clauses.clone();
        for (i, cl) in clauses.iter().enumerate() {
            if self.tools.kind(cl) != ClauseKind::Member {
                continue;
            }
            let rel = self.tools.rhs_rel(cl).ok_or_else(|| {
                Error::transformation(format!("Cannot generate tags and filter for clause: {}", cl))
            })?;

            let filtered = if i == 0 {
                cl.clone()
            } else {
                let from = self.count_filters_on(&rel) + 1;
                let name = self.numbered(from, |n| naming::filter(&self.query, &rel, Some(n)));
                let preds = self.preds(i, &self.tools.tagsin_lhs_vars(cl));
                if self.tools.filter_needs_preds(cl) && preds.is_empty() {
                    return Err(Error::program(format!(
                        "No predecessor tags for filter over clause: {}",
                        cl
                    )));
                }
                let filtered = self.over(cl, &name);
                self.structs.push(Structure::Filter(Filter {
                    i,
                    name,
                    clause: cl.clone(),
                    preds,
                }));
                filtered
            };

            for var in self.tools.tagsout_lhs_vars(cl) {
                let from = self.count_tags_on(&var) + 1;
                let name = self.numbered(from, |n| naming::tag(&self.query, &var, Some(n)));
                self.structs.push(Structure::Tag(Tag {
                    i,
                    name,
                    tag_var: var,
                    clause: filtered.clone(),
                }));
            }
        }
        Ok(())
    }

    /// Drops the number from every name that is unique for its
    /// relation or variable, unless the shorter name is taken.
    pub fn simplify_names(&mut self) {
        let mut by_rel: HashMap<String, usize> = HashMap::new();
        for f in self.filters() {
            if let Some(rel) = self.filter_rel(f) {
                *by_rel.entry(rel).or_default() += 1;
            }
        }
        let filter_renames: Vec<(usize, String)> = self
            .filters()
            .filter_map(|f| {
                let rel = self.filter_rel(f)?;
                (by_rel.get(&rel) == Some(&1)).then(|| (f.i, naming::filter(&self.query, &rel, None)))
            })
            .collect();
        for (i, name) in filter_renames {
            if !self.is_free(&name) {
                continue;
            }
            let rel = naming::result_set(&name);
            for s in &mut self.structs {
                match s {
                    Structure::Filter(f) if f.i == i => f.name = name.clone(),
                    Structure::Tag(t) if t.i == i => {
                        t.clause = self.tools.rename_rhs_rel(&t.clause, &|_| rel.clone());
                    }
                    _ => {}
                }
            }
        }

        let mut by_var: HashMap<String, usize> = HashMap::new();
        for t in self.tags() {
            *by_var.entry(t.tag_var.clone()).or_default() += 1;
        }
        let tag_renames: Vec<(String, String)> = self
            .tags()
            .filter(|t| by_var.get(&t.tag_var) == Some(&1))
            .map(|t| (t.name.clone(), naming::tag(&self.query, &t.tag_var, None)))
            .collect();
        for (old, new) in tag_renames {
            if !self.is_free(&new) {
                continue;
            }
            for s in &mut self.structs {
                match s {
                    Structure::Tag(t) if t.name == old => t.name = new.clone(),
                    Structure::Filter(f) => {
                        for p in f.preds.iter_mut().filter(|p| **p == old) {
                            *p = new.clone();
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Removes tags no filter depends on.
    pub fn prune_tags(&mut self) {
        let used: HashSet<String> = self.filters().flat_map(|f| f.preds.iter().cloned()).collect();
        self.structs.retain(|s| match s {
            Structure::Tag(t) => used.contains(&t.name),
            Structure::Filter(_) => true,
        });
    }

    /// Comprehension defining a structure.
    pub fn make_comp(&self, s: &Structure) -> Result<Comp> {
        match s {
            Structure::Filter(f) => {
                let mut clauses = Vec::with_capacity(f.preds.len() + 1);
                for p in &f.preds {
                    let tag = self.tags().find(|t| &t.name == p).ok_or_else(|| {
                        Error::transformation(format!("Filter {} depends on missing tag {}", f.name, p))
                    })?;
                    clauses.push(Clause::rel_member(&[tag.tag_var.as_str()], naming::result_set(&tag.name)));
                }
                clauses.push(f.clause.clone());
                let vars = self.tools.lhs_vars(&f.clause);
                Ok(Comp::new(Expr::tuplify(&vars, false), clauses))
            }
            Structure::Tag(t) => Ok(Comp::new(
                Expr::tuplify(&[t.tag_var.as_str()], false),
                vec![t.clause.clone()],
            )),
        }
    }

    /// The query's clauses with each filtered clause read over its
    /// filter's result relation.
    pub fn make_filter_list(&self) -> Vec<Clause> {
        self.comp
            .clauses
            .iter()
            .enumerate()
            .map(|(i, cl)| match self.filters().find(|f| f.i == i) {
                Some(f) => self.over(&f.clause, &f.name),
                None => cl.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::CoreClauseTools;
    use alloc::string::ToString;
    use ivmc_core::ir::QueryNode;

    fn names(g: &StructureGenerator<'_>) -> Vec<String> {
        g.structs.iter().map(|s| s.name().to_string()).collect()
    }

    fn demand_join() -> Comp {
        Comp::new(
            Expr::tuplify(&["x", "z"], false),
            vec![
                Clause::rel_member(&["x"], "_U_Q"),
                Clause::rel_member(&["x", "y"], "E"),
                Clause::rel_member(&["y", "z"], "E"),
            ],
        )
    }

    #[test]
    fn test_numbered_structures() {
        let tools = CoreClauseTools;
        let mut g = StructureGenerator::new(&tools, "Q", demand_join(), false);
        g.make_structs().unwrap();
        assert_eq!(
            names(&g),
            vec!["Q_T_x_1", "Q_dE_1", "Q_T_x_2", "Q_T_y_1", "Q_dE_2", "Q_T_y_2", "Q_T_z_1"]
        );
        let f2 = g.filters().nth(1).unwrap();
        assert_eq!(f2.preds, vec!["Q_T_y_1"]);
        let t = g.tags().find(|t| t.name == "Q_T_y_1").unwrap();
        assert_eq!(t.clause, Clause::rel_member(&["x", "y"], "R_Q_dE_1"));
    }

    #[test]
    fn test_simplify_and_prune() {
        let tools = CoreClauseTools;
        let mut g = StructureGenerator::new(&tools, "Q", demand_join(), false);
        g.make_structs().unwrap();
        g.simplify_names();
        g.prune_tags();
        // Two filters on E keep their numbers; only tags feeding a
        // filter survive.
        assert_eq!(names(&g), vec!["Q_T_x_1", "Q_dE_1", "Q_T_y_1", "Q_dE_2"]);

        let comps: Vec<String> = g
            .structs
            .iter()
            .map(|s| QueryNode::Comp(g.make_comp(s).unwrap()).to_string())
            .collect();
        assert_eq!(
            comps,
            vec![
                "{(x,) for (x,) in _U_Q}",
                "{(x, y) for (x,) in R_Q_T_x_1 for (x, y) in E}",
                "{(y,) for (x, y) in R_Q_dE_1}",
                "{(y, z) for (y,) in R_Q_T_y_1 for (y, z) in E}",
            ]
        );
        assert_eq!(
            g.make_filter_list(),
            vec![
                Clause::rel_member(&["x"], "_U_Q"),
                Clause::rel_member(&["x", "y"], "R_Q_dE_1"),
                Clause::rel_member(&["y", "z"], "R_Q_dE_2"),
            ]
        );
    }

    #[test]
    fn test_unique_names_lose_numbers() {
        let tools = CoreClauseTools;
        let comp = Comp::new(
            Expr::tuplify(&["x", "y"], false),
            vec![
                Clause::rel_member(&["x"], "_U_Q"),
                Clause::rel_member(&["x", "y"], "E"),
            ],
        );
        let mut g = StructureGenerator::new(&tools, "Q", comp, false);
        g.make_structs().unwrap();
        g.simplify_names();
        assert_eq!(names(&g), vec!["Q_T_x_1", "Q_dE", "Q_T_x_2", "Q_T_y"]);
        let t = g.tags().find(|t| t.name == "Q_T_y").unwrap();
        assert_eq!(t.clause, Clause::rel_member(&["x", "y"], "R_Q_dE"));

        g.prune_tags();
        assert_eq!(names(&g), vec!["Q_T_x_1", "Q_dE"]);
        assert_eq!(g.filters().next().unwrap().preds, vec!["Q_T_x_1"]);
    }

    #[test]
    fn test_renamed_apart_variable_keeps_its_number() {
        let tools = CoreClauseTools;
        // `(x, x) in R` after renaming apart.
        let comp = Comp::new(
            Expr::tuplify(&["x", "z"], false),
            vec![
                Clause::rel_member(&["x"], "_U_Q"),
                Clause::rel_member(&["x", "x_2"], "R"),
                Clause::cond(Expr::equals(Expr::name("x"), Expr::name("x_2"))),
                Clause::rel_member(&["x", "z"], "R"),
            ],
        );
        let mut g = StructureGenerator::new(&tools, "Q", comp, false);
        g.make_structs().unwrap();
        g.simplify_names();
        assert_eq!(
            names(&g),
            vec!["Q_T_x_1", "Q_dR_1", "Q_T_x_2", "Q_T_x_2_1", "Q_dR_2", "Q_T_x_3", "Q_T_z"]
        );
        g.prune_tags();
        let all = names(&g);
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_filter_names_stay_distinct_across_relations() {
        let tools = CoreClauseTools;
        let comp = Comp::new(
            Expr::tuplify(&["x", "w"], false),
            vec![
                Clause::rel_member(&["x"], "_U_Q"),
                Clause::rel_member(&["x", "y"], "E"),
                Clause::rel_member(&["y", "z"], "E"),
                Clause::rel_member(&["z", "w"], "E_1"),
            ],
        );
        let mut g = StructureGenerator::new(&tools, "Q", comp, false);
        g.make_structs().unwrap();
        g.simplify_names();
        let filters: Vec<&str> = g.filters().map(|f| f.name.as_str()).collect();
        assert_eq!(filters, vec!["Q_dE_1", "Q_dE_2", "Q_dE_1_1"]);
    }

    #[test]
    fn test_reserved_names_are_avoided() {
        let tools = CoreClauseTools;
        let comp = Comp::new(
            Expr::tuplify(&["x", "y"], false),
            vec![
                Clause::rel_member(&["x"], "_U_Q"),
                Clause::rel_member(&["x", "y"], "E"),
            ],
        );
        let mut g = StructureGenerator::new(&tools, "Q", comp, false)
            .with_reserved(["R_Q_dE".to_string(), "Q_T_x_1".to_string()]);
        g.make_structs().unwrap();
        g.simplify_names();
        assert_eq!(names(&g), vec!["Q_T_x_2", "Q_dE_1", "Q_T_x_3", "Q_T_y"]);
        assert_eq!(g.filters().next().unwrap().preds, vec!["Q_T_x_2"]);
    }

    #[test]
    fn test_singletag_mode_keeps_first_pred() {
        let tools = CoreClauseTools;
        let comp = Comp::new(
            Expr::tuplify(&["x", "y", "z"], false),
            vec![
                Clause::rel_member(&["x", "y"], "_U_Q"),
                Clause::rel_member(&["x", "y", "z"], "T"),
            ],
        );
        let mut all = StructureGenerator::new(&tools, "Q", comp.clone(), false);
        all.make_structs().unwrap();
        assert_eq!(all.filters().next().unwrap().preds.len(), 2);

        let mut single = StructureGenerator::new(&tools, "Q", comp, true);
        single.make_structs().unwrap();
        assert_eq!(single.filters().next().unwrap().preds, vec!["Q_T_x_1"]);
    }

    #[test]
    fn test_conditions_are_skipped_and_non_relations_rejected() {
        let tools = CoreClauseTools;
        let comp = Comp::new(
            Expr::name("x"),
            vec![
                Clause::rel_member(&["x"], "_U_Q"),
                Clause::cond(Expr::equals(Expr::name("x"), Expr::int(1))),
            ],
        );
        let mut g = StructureGenerator::new(&tools, "Q", comp, false);
        g.make_structs().unwrap();
        assert_eq!(names(&g), vec!["Q_T_x_1"]);

        let comp = Comp::new(
            Expr::name("x"),
            vec![Clause::sing_member(vec!["x".into()], Expr::int(1))],
        );
        let mut g = StructureGenerator::new(&tools, "Q", comp, false);
        assert!(g.make_structs().unwrap_err().is_transformation());
    }
}
