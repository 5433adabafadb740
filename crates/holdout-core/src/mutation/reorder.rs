//! Top-level reordering.
//!
//! The module body is regrouped as: pinned prefix (docstring and
//! `__future__` imports), imports, classes, functions, everything else.
//! Functions are emitted in a randomized topological order so that a function
//! appears after every function it references. The new order is accepted only
//! if every pair of statements that share a definition-time dependency keeps
//! its relative order; otherwise the stage reports no change.

use super::{MutationStage, StageContext};
use crate::errors::TransformError;
use crate::pyast::visit::{
    bound_names, identifiers_in, referenced_names, walk_stmt, IdentSite, Visitor,
};
use crate::pyast::{Module, Stmt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

pub struct ReorderStage {
    pub functions: bool,
    pub imports: bool,
}

impl MutationStage for ReorderStage {
    fn name(&self) -> &'static str {
        "reorder"
    }

    fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        if !self.functions && !self.imports {
            return Ok(0);
        }
        let Some(order) = plan_order(&module.body, self.functions, self.imports, ctx.rng) else {
            return Ok(0);
        };
        let moved = order.iter().enumerate().filter(|(pos, idx)| pos != *idx).count();
        if moved == 0 {
            return Ok(0);
        }
        let mut slots: Vec<Option<Stmt>> = std::mem::take(&mut module.body).into_iter().map(Some).collect();
        let mut body = Vec::with_capacity(slots.len());
        for idx in order {
            let stmt = slots[idx].take().ok_or_else(|| TransformError::Invariant {
                stage: "reorder",
                detail: format!("statement {idx} scheduled twice"),
            })?;
            body.push(stmt);
        }
        module.body = body;
        Ok(moved)
    }
}

/// Compute the new order as indices into `body`, or `None` when reordering
/// is unsafe.
fn plan_order(body: &[Stmt], functions: bool, imports: bool, rng: &mut StdRng) -> Option<Vec<usize>> {
    let mut prefix = Vec::new();
    let mut idx = 0;
    if body.first().is_some_and(Stmt::is_docstring) {
        prefix.push(0);
        idx = 1;
    }
    while idx < body.len() && body[idx].is_future_import() {
        prefix.push(idx);
        idx += 1;
    }

    let (mut import_group, mut classes, mut funcs, mut other) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for (i, stmt) in body.iter().enumerate().skip(idx) {
        match stmt {
            Stmt::Import { .. } | Stmt::ImportFrom { .. } => import_group.push(i),
            Stmt::ClassDef(_) => classes.push(i),
            Stmt::FunctionDef(_) => funcs.push(i),
            _ => other.push(i),
        }
    }

    let mut seen = BTreeSet::new();
    for &i in &funcs {
        if let Stmt::FunctionDef(def) = &body[i] {
            if !seen.insert(def.name.as_str()) {
                return None;
            }
        }
    }

    if imports {
        import_group.shuffle(rng);
    }
    if functions {
        funcs = topological_functions(body, &funcs, rng);
    }

    let order: Vec<usize> = prefix
        .into_iter()
        .chain(import_group)
        .chain(classes)
        .chain(funcs)
        .chain(other)
        .collect();
    preserves_dependencies(body, &order).then_some(order)
}

/// Randomized Kahn sort: `a` before `b` whenever `b` references `a`.
fn topological_functions(body: &[Stmt], funcs: &[usize], rng: &mut StdRng) -> Vec<usize> {
    let names: BTreeMap<&str, usize> = funcs
        .iter()
        .filter_map(|&i| match &body[i] {
            Stmt::FunctionDef(def) => Some((def.name.as_str(), i)),
            _ => None,
        })
        .collect();

    let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut indegree: BTreeMap<usize, usize> = funcs.iter().map(|&i| (i, 0)).collect();
    for &user in funcs {
        let referenced = identifiers_in(std::slice::from_ref(&body[user]));
        for (name, &dep) in &names {
            if dep != user && referenced.contains(*name) {
                dependents.entry(dep).or_default().push(user);
                *indegree.entry(user).or_default() += 1;
            }
        }
    }

    let mut remaining: Vec<usize> = funcs.to_vec();
    let mut order = Vec::with_capacity(funcs.len());
    while !remaining.is_empty() {
        let ready: Vec<usize> = remaining
            .iter()
            .copied()
            .filter(|i| indegree.get(i).copied().unwrap_or(0) == 0)
            .collect();
        // A cycle leaves nothing ready; break it with a random pick.
        let pool = if ready.is_empty() { &remaining } else { &ready };
        let next = pool[rng.gen_range(0..pool.len())];
        remaining.retain(|&i| i != next);
        order.push(next);
        for &user in dependents.get(&next).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = indegree.get_mut(&user) {
                *count = count.saturating_sub(1);
            }
        }
    }
    order
}

/// Every pair of statements where one binds a name the other needs at
/// definition time (or both bind the same name) must keep its order.
fn preserves_dependencies(body: &[Stmt], order: &[usize]) -> bool {
    let mut position = vec![0; body.len()];
    for (pos, &idx) in order.iter().enumerate() {
        position[idx] = pos;
    }
    let deps: Vec<BTreeSet<String>> = body.iter().map(definition_time_names).collect();
    let binds: Vec<BTreeSet<String>> = body.iter().map(module_bindings).collect();

    for j in 0..body.len() {
        for i in 0..j {
            let linked = !deps[j].is_disjoint(&binds[i])
                || !deps[i].is_disjoint(&binds[j])
                || !binds[i].is_disjoint(&binds[j]);
            if linked && position[i] > position[j] {
                return false;
            }
        }
    }
    true
}

/// Names a top-level statement evaluates when it executes.
fn definition_time_names(stmt: &Stmt) -> BTreeSet<String> {
    match stmt {
        Stmt::FunctionDef(def) => {
            let mut names = BTreeSet::new();
            let params = def.params.iter().flat_map(|p| p.annotation.iter().chain(p.default.iter()));
            for expr in def.decorators.iter().chain(params).chain(def.returns.iter()) {
                names.extend(referenced_names(expr));
            }
            names
        }
        Stmt::ClassDef(class) => {
            let mut names = BTreeSet::new();
            let keywords = class.keywords.iter().map(|k| &k.value);
            for expr in class.decorators.iter().chain(class.bases.iter()).chain(keywords) {
                names.extend(referenced_names(expr));
            }
            for inner in &class.body {
                match inner {
                    Stmt::FunctionDef(_) | Stmt::ClassDef(_) => names.extend(definition_time_names(inner)),
                    _ => names.extend(identifiers_in(std::slice::from_ref(inner))),
                }
            }
            names
        }
        Stmt::Import { .. } | Stmt::ImportFrom { .. } => BTreeSet::new(),
        _ => identifiers_in(std::slice::from_ref(stmt)),
    }
}

struct ModuleBinder {
    names: BTreeSet<String>,
}

impl Visitor for ModuleBinder {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => {
                self.names.insert(def.name.clone());
            }
            Stmt::ClassDef(class) => {
                self.names.insert(class.name.clone());
            }
            Stmt::Import { names } | Stmt::ImportFrom { names, .. } => {
                self.names.extend(names.iter().map(|a| a.bound_name().to_string()));
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_target(&mut self, target: &crate::pyast::Expr) {
        self.names.extend(bound_names(target));
    }

    fn visit_identifier(&mut self, name: &str, site: IdentSite) {
        if matches!(site, IdentSite::ExceptAlias | IdentSite::WalrusTarget) {
            self.names.insert(name.to_string());
        }
    }
}

/// Names a top-level statement binds in the module namespace.
fn module_bindings(stmt: &Stmt) -> BTreeSet<String> {
    let mut binder = ModuleBinder {
        names: BTreeSet::new(),
    };
    binder.visit_stmt(stmt);
    binder.names
}
