//! Inlining of trivial module-level functions.
//!
//! A candidate is an undecorated, synchronous, module-level `def` with plain
//! positional parameters whose body is a single `return <expr>` (optionally
//! preceded by a docstring or `pass`). Call sites whose arguments are all names
//! or literals are replaced by the return expression with parameters
//! substituted. The definition itself stays, since other modules may import it.

use super::{MutationStage, StageContext};
use crate::errors::TransformError;
use crate::pyast::visit::{
    binds_name, bound_names, referenced_names, transform_module, walk_expr, walk_expr_mut,
    walk_stmt, IdentSite, Transformer, Visitor,
};
use crate::pyast::{Expr, FunctionDef, Module, Stmt};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

const MAX_BODY_STATEMENTS: usize = 3;

pub struct InlineStage {
    pub rate: f64,
}

impl MutationStage for InlineStage {
    fn name(&self) -> &'static str {
        "inline_functions"
    }

    fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        let candidates = find_candidates(module);
        if candidates.is_empty() {
            return Ok(0);
        }
        let mut inliner = Inliner {
            candidates: &candidates,
            rng: ctx.rng,
            rate: self.rate,
            inlined: 0,
        };
        transform_module(&mut inliner, module)?;
        Ok(inliner.inlined)
    }
}

struct Candidate {
    params: Vec<String>,
    expr: Expr,
}

fn find_candidates(module: &Module) -> BTreeMap<String, Candidate> {
    let mut defs: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, stmt) in module.body.iter().enumerate() {
        if let Stmt::FunctionDef(def) = stmt {
            defs.entry(def.name.as_str()).or_default().push(idx);
        }
    }
    let locals = local_bindings(module);

    let mut candidates = BTreeMap::new();
    for (name, indices) in defs {
        let [idx] = indices.as_slice() else {
            continue;
        };
        let Stmt::FunctionDef(def) = &module.body[*idx] else {
            continue;
        };
        let Some(expr) = inlinable_expression(def) else {
            continue;
        };
        let params: Vec<String> = def.params.args.iter().map(|p| p.name.clone()).collect();
        let free: BTreeSet<String> = referenced_names(expr)
            .into_iter()
            .filter(|n| !params.contains(n))
            .collect();
        if free.contains(name) || locals.contains(name) || free.iter().any(|n| locals.contains(n)) {
            continue;
        }
        let others: Vec<Stmt> = module
            .body
            .iter()
            .enumerate()
            .filter(|(i, _)| i != idx)
            .map(|(_, s)| s.clone())
            .collect();
        if binds_name(&others, name) {
            continue;
        }
        candidates.insert(
            name.to_string(),
            Candidate {
                params,
                expr: expr.clone(),
            },
        );
    }
    candidates
}

/// The returned expression when `def` has an inlinable shape.
fn inlinable_expression(def: &FunctionDef) -> Option<&Expr> {
    if def.is_async || !def.decorators.is_empty() || !def.params.is_plain_positional() {
        return None;
    }
    if def.body.len() > MAX_BODY_STATEMENTS {
        return None;
    }
    let mut returned = None;
    for stmt in &def.body {
        match stmt {
            Stmt::Return { value: Some(value) } if returned.is_none() => returned = Some(value),
            Stmt::Pass => {}
            stmt if stmt.is_docstring() => {}
            _ => return None,
        }
    }
    returned.filter(|expr| is_scope_free(expr))
}

struct ScopeFree {
    ok: bool,
}

impl Visitor for ScopeFree {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lambda { .. }
            | Expr::ListComp { .. }
            | Expr::SetComp { .. }
            | Expr::DictComp { .. }
            | Expr::GeneratorExp { .. }
            | Expr::NamedExpr { .. }
            | Expr::Yield { .. }
            | Expr::YieldFrom { .. }
            | Expr::Await { .. } => self.ok = false,
            _ => walk_expr(self, expr),
        }
    }
}

/// No nested scopes, bindings or suspension points, so parameter
/// substitution is purely structural.
fn is_scope_free(expr: &Expr) -> bool {
    let mut check = ScopeFree { ok: true };
    check.visit_expr(expr);
    check.ok
}

struct LocalBindings {
    depth: usize,
    names: BTreeSet<String>,
}

impl LocalBindings {
    fn nested(&mut self, walk: impl FnOnce(&mut Self)) {
        self.depth += 1;
        walk(self);
        self.depth -= 1;
    }
}

impl Visitor for LocalBindings {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(_) | Stmt::ClassDef(_) => {
                if self.depth > 0 {
                    if let Stmt::FunctionDef(def) = stmt {
                        self.names.insert(def.name.clone());
                    }
                    if let Stmt::ClassDef(class) = stmt {
                        self.names.insert(class.name.clone());
                    }
                }
                self.nested(|this| walk_stmt(this, stmt));
            }
            Stmt::Import { names } | Stmt::ImportFrom { names, .. } if self.depth > 0 => {
                self.names.extend(names.iter().map(|a| a.bound_name().to_string()));
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lambda { .. }
            | Expr::ListComp { .. }
            | Expr::SetComp { .. }
            | Expr::DictComp { .. }
            | Expr::GeneratorExp { .. } => self.nested(|this| walk_expr(this, expr)),
            _ => walk_expr(self, expr),
        }
    }

    fn visit_target(&mut self, target: &Expr) {
        if self.depth > 0 {
            self.names.extend(bound_names(target));
        }
        self.visit_expr(target);
    }

    fn visit_identifier(&mut self, name: &str, site: IdentSite) {
        if self.depth > 0 && site != IdentSite::Reference {
            self.names.insert(name.to_string());
        }
    }
}

/// Every name bound in a non-module scope anywhere in the file.
fn local_bindings(module: &Module) -> BTreeSet<String> {
    let mut collector = LocalBindings {
        depth: 0,
        names: BTreeSet::new(),
    };
    for stmt in &module.body {
        collector.visit_stmt(stmt);
    }
    collector.names
}

struct Inliner<'a> {
    candidates: &'a BTreeMap<String, Candidate>,
    rng: &'a mut StdRng,
    rate: f64,
    inlined: usize,
}

impl Inliner<'_> {
    fn replacement(&self, expr: &Expr) -> Result<Option<Expr>, TransformError> {
        let Expr::Call { func, args, keywords } = expr else {
            return Ok(None);
        };
        let Some(candidate) = func.as_name().and_then(|name| self.candidates.get(name)) else {
            return Ok(None);
        };
        if !keywords.is_empty() || args.len() != candidate.params.len() {
            return Ok(None);
        }
        if !args.iter().all(|a| !matches!(a, Expr::Starred { .. }) && a.is_atomic_operand()) {
            return Ok(None);
        }
        let mut substitute = Substitute {
            bindings: candidate.params.iter().map(String::as_str).zip(args.iter()).collect(),
        };
        let mut body = candidate.expr.clone();
        substitute.transform_expr(&mut body)?;
        Ok(Some(body))
    }
}

impl Transformer for Inliner<'_> {
    fn transform_expr(&mut self, expr: &mut Expr) -> Result<(), TransformError> {
        walk_expr_mut(self, expr)?;
        if let Some(replacement) = self.replacement(expr)? {
            if self.rng.gen_bool(self.rate) {
                *expr = replacement;
                self.inlined += 1;
            }
        }
        Ok(())
    }
}

/// Parameter name to call-site argument.
struct Substitute<'a> {
    bindings: BTreeMap<&'a str, &'a Expr>,
}

impl Transformer for Substitute<'_> {
    fn transform_expr(&mut self, expr: &mut Expr) -> Result<(), TransformError> {
        if let Expr::Name { id } = expr {
            if let Some(arg) = self.bindings.get(id.as_str()) {
                *expr = (*arg).clone();
            }
            return Ok(());
        }
        walk_expr_mut(self, expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyast::{parse_module, unparse};
    use rand::SeedableRng;

    fn inline(source: &str) -> (String, usize) {
        let mut module = parse_module(source).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = StageContext::new(&mut rng);
        let n = InlineStage { rate: 1.0 }.apply(&mut module, &mut ctx).unwrap();
        (unparse(&module), n)
    }

    #[test]
    fn test_inlines_simple_call() {
        let (out, n) = inline("def double(x):\n    return x * 2\n\nresult = double(value) + 1\n");
        assert_eq!(n, 1);
        assert!(out.ends_with("result = value * 2 + 1\n"));
        assert!(out.starts_with("def double(x):"));
    }

    #[test]
    fn test_substitution_respects_precedence() {
        let (out, _) = inline("def scale(a, b):\n    \"\"\"Doc.\"\"\"\n    return a * b\n\nv = scale(p, 3) ** 2\n");
        assert!(out.ends_with("v = (p * 3) ** 2\n"));
    }

    #[test]
    fn test_rejected_candidates_and_sites() {
        // Recursive.
        assert_eq!(inline("def f(n):\n    return f(n)\n\nf(1)\n").1, 0);
        // Non-atomic argument.
        assert_eq!(inline("def f(n):\n    return n + 1\n\nf(g())\n").1, 0);
        // Keyword argument and arity mismatch.
        assert_eq!(inline("def f(n):\n    return n\n\nf(n=1)\nf(1, 2)\n").1, 0);
        // Decorated.
        assert_eq!(inline("@cache\ndef f(n):\n    return n\n\nf(1)\n").1, 0);
        // Body is more than a return.
        assert_eq!(inline("def f(n):\n    m = n\n    return m\n\nf(1)\n").1, 0);
        // Defined twice.
        assert_eq!(inline("def f(n):\n    return n\n\ndef f(n):\n    return 0\n\nf(1)\n").1, 0);
    }

    #[test]
    fn test_free_name_shadowed_locally_blocks_inlining() {
        let source = "def f(n):\n    return n + offset\n\ndef g():\n    offset = 3\n    return f(1)\n";
        assert_eq!(inline(source).1, 0);
    }

    #[test]
    fn test_comprehension_variable_counts_as_local() {
        let source = "def f():\n    return x\n\nvalues = [f() for x in range(3)]\n";
        assert_eq!(inline(source).1, 0);
    }
}
