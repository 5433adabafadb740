//! Dead-code elimination and boolean rewrites.
//!
//! Rewrites that preserve the exact value of an expression apply anywhere.
//! Rewrites that only preserve its truth value (dropping a trailing `True`
//! from an `and`, collapsing `not not x`) apply only where the value is
//! consumed as a condition: `if`/`while`/`assert` tests, conditional
//! expression tests, comprehension filters and the operand of `not`.

use super::{MutationStage, StageContext};
use crate::errors::TransformError;
use crate::pyast::visit::{
    bound_names, identifier_counts, transform_module, walk_body, walk_expr, walk_expr_mut, walk_stmt,
    walk_stmt_mut, IdentSite, Transformer, Visitor,
};
use crate::pyast::{BoolOperator, Comprehension, Expr, Module, Stmt, UnaryOperator};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeSet;

// =============================================================================
// Dead code
// =============================================================================

pub struct DeadCodeStage;

impl MutationStage for DeadCodeStage {
    fn name(&self) -> &'static str {
        "eliminate_dead_code"
    }

    fn apply(&self, module: &mut Module, _ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        let mut eliminator = DeadCode {
            removed: 0,
            functions: Vec::new(),
        };
        transform_module(&mut eliminator, module)?;
        Ok(eliminator.removed)
    }
}

struct DeadCode {
    removed: usize,
    /// Bodies of the enclosing functions, innermost last, as they were before
    /// this pass.
    functions: Vec<Vec<Stmt>>,
}

impl DeadCode {
    /// Dropping `branch` must not turn a function-local name into a global
    /// lookup, so it stays when it binds a name the enclosing function uses
    /// anywhere else.
    fn removable(&self, branch: &[Stmt]) -> bool {
        if affects_scope(branch) {
            return false;
        }
        let Some(function) = self.functions.last() else {
            return true;
        };
        let bound = names_bound_in(branch);
        if bound.is_empty() {
            return true;
        }
        let inside = identifier_counts(branch);
        let total = identifier_counts(function);
        !bound.iter().any(|name| {
            let here = inside.get(name).copied().unwrap_or(0);
            total.get(name).copied().unwrap_or(0) > here
        })
    }
}

impl Transformer for DeadCode {
    fn transform_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>, TransformError> {
        let stmt = match stmt {
            Stmt::FunctionDef(def) => {
                self.functions.push(def.body.clone());
                let walked = walk_stmt_mut(self, Stmt::FunctionDef(def));
                self.functions.pop();
                return Ok(vec![walked?]);
            }
            other => walk_stmt_mut(self, other)?,
        };
        match stmt {
            Stmt::If { test, body, orelse } => {
                let Some(taken) = test.literal_truthiness() else {
                    return Ok(vec![Stmt::If { test, body, orelse }]);
                };
                let (kept, dropped) = if taken { (body, orelse) } else { (orelse, body) };
                if self.removable(&dropped) && !affects_scope(&kept) {
                    self.removed += 1;
                    Ok(kept)
                } else if taken {
                    Ok(vec![Stmt::If { test, body: kept, orelse: dropped }])
                } else {
                    Ok(vec![Stmt::If { test, body: dropped, orelse: kept }])
                }
            }
            Stmt::While { test, body, orelse }
                if test.literal_truthiness() == Some(false) && self.removable(&body) =>
            {
                self.removed += 1;
                Ok(orelse)
            }
            other => Ok(vec![other]),
        }
    }
}

struct BindingCollector {
    names: BTreeSet<String>,
}

impl Visitor for BindingCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Stmt::Import { names } | Stmt::ImportFrom { names, .. } = stmt {
            self.names.extend(names.iter().map(|a| a.bound_name().to_string()));
        }
        walk_stmt(self, stmt);
    }

    fn visit_target(&mut self, target: &Expr) {
        self.names.extend(bound_names(target));
        self.visit_expr(target);
    }

    fn visit_identifier(&mut self, name: &str, site: IdentSite) {
        if site != IdentSite::Reference {
            self.names.insert(name.to_string());
        }
    }
}

/// Every name a statement list binds, nested scopes included.
fn names_bound_in(body: &[Stmt]) -> BTreeSet<String> {
    let mut collector = BindingCollector { names: BTreeSet::new() };
    walk_body(&mut collector, body);
    collector.names
}

struct ScopeEffects {
    found: bool,
}

impl Visitor for ScopeEffects {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Global { .. } | Stmt::Nonlocal { .. } => self.found = true,
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Yield { .. } | Expr::YieldFrom { .. } => self.found = true,
            _ => walk_expr(self, expr),
        }
    }
}

/// A branch whose mere presence changes the enclosing scope: `yield` makes a
/// generator, `global`/`nonlocal` change name resolution.
fn affects_scope(body: &[Stmt]) -> bool {
    let mut effects = ScopeEffects { found: false };
    for stmt in body {
        effects.visit_stmt(stmt);
    }
    effects.found
}

// =============================================================================
// Boolean simplification
// =============================================================================

pub struct BooleanStage;

impl MutationStage for BooleanStage {
    fn name(&self) -> &'static str {
        "simplify_booleans"
    }

    fn apply(&self, module: &mut Module, _ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        let mut simplifier = Simplifier {
            truth: false,
            simplified: 0,
        };
        transform_module(&mut simplifier, module)?;
        Ok(simplifier.simplified)
    }
}

struct Simplifier {
    /// Set just before visiting an expression consumed only for its truth value.
    truth: bool,
    simplified: usize,
}

impl Simplifier {
    fn condition(&mut self, expr: &mut Expr) -> Result<(), TransformError> {
        self.truth = true;
        self.transform_expr(expr)
    }

    fn generators(&mut self, generators: &mut [Comprehension]) -> Result<(), TransformError> {
        for generator in generators {
            self.transform_expr(&mut generator.iter)?;
            self.transform_expr(&mut generator.target)?;
            for cond in &mut generator.ifs {
                self.condition(cond)?;
            }
        }
        Ok(())
    }

    fn simplify_node(&mut self, expr: &mut Expr, truth: bool) {
        match expr {
            Expr::BoolOp { op, values } => {
                // `and` continues past truthy members, `or` past falsy ones.
                let neutral = matches!(op, BoolOperator::And);
                let before = values.len();
                let last = values.len().saturating_sub(1);
                let mut idx = 0;
                values.retain(|v| {
                    let keep = idx == last || !v.is_literal_bool(neutral);
                    idx += 1;
                    keep
                });
                if truth && values.len() > 1 && values.last().is_some_and(|v| v.is_literal_bool(neutral)) {
                    values.pop();
                }
                if values.len() < before {
                    self.simplified += 1;
                }
                if values.len() == 1 {
                    if let Some(only) = values.pop() {
                        *expr = only;
                    }
                }
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand,
            } if truth => {
                if let Expr::UnaryOp {
                    op: UnaryOperator::Not,
                    operand: inner,
                } = operand.as_mut()
                {
                    let inner = std::mem::replace(inner.as_mut(), Expr::bool_literal(false));
                    *expr = inner;
                    self.simplified += 1;
                }
            }
            _ => {}
        }
    }
}

impl Transformer for Simplifier {
    fn transform_stmt(&mut self, mut stmt: Stmt) -> Result<Vec<Stmt>, TransformError> {
        match &mut stmt {
            Stmt::If { test, body, orelse } | Stmt::While { test, body, orelse } => {
                self.condition(test)?;
                self.transform_body(body)?;
                self.transform_body(orelse)?;
            }
            Stmt::Assert { test, msg } => {
                self.condition(test)?;
                if let Some(msg) = msg {
                    self.transform_expr(msg)?;
                }
            }
            _ => return Ok(vec![walk_stmt_mut(self, stmt)?]),
        }
        Ok(vec![stmt])
    }

    fn transform_expr(&mut self, expr: &mut Expr) -> Result<(), TransformError> {
        let truth = std::mem::take(&mut self.truth);
        match expr {
            Expr::BoolOp { values, .. } => {
                for value in values.iter_mut() {
                    self.truth = truth;
                    self.transform_expr(value)?;
                }
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand,
            } => self.condition(operand)?,
            Expr::IfExp { test, body, orelse } => {
                self.condition(test)?;
                self.transform_expr(body)?;
                self.transform_expr(orelse)?;
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                self.generators(generators)?;
                self.transform_expr(elt)?;
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                self.generators(generators)?;
                self.transform_expr(key)?;
                self.transform_expr(value)?;
            }
            _ => walk_expr_mut(self, expr)?,
        }
        self.simplify_node(expr, truth);
        Ok(())
    }
}

// =============================================================================
// De Morgan
// =============================================================================

/// `not (a and b)` to `not a or not b` (and the dual), one coin per site.
pub struct DeMorganStage {
    pub rate: f64,
}

impl MutationStage for DeMorganStage {
    fn name(&self) -> &'static str {
        "de_morgan"
    }

    fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        let mut rewriter = DeMorgan {
            rng: ctx.rng,
            rate: self.rate,
            rewritten: 0,
        };
        transform_module(&mut rewriter, module)?;
        Ok(rewriter.rewritten)
    }
}

struct DeMorgan<'a> {
    rng: &'a mut StdRng,
    rate: f64,
    rewritten: usize,
}

impl Transformer for DeMorgan<'_> {
    fn transform_expr(&mut self, expr: &mut Expr) -> Result<(), TransformError> {
        walk_expr_mut(self, expr)?;
        let Expr::UnaryOp {
            op: UnaryOperator::Not,
            operand,
        } = expr
        else {
            return Ok(());
        };
        let Expr::BoolOp { op, values } = operand.as_mut() else {
            return Ok(());
        };
        if !self.rng.gen_bool(self.rate) {
            return Ok(());
        }
        let dual = match op {
            BoolOperator::And => BoolOperator::Or,
            BoolOperator::Or => BoolOperator::And,
        };
        let negated = std::mem::take(values)
            .into_iter()
            .map(|value| Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(value),
            })
            .collect();
        *expr = Expr::BoolOp {
            op: dual,
            values: negated,
        };
        self.rewritten += 1;
        Ok(())
    }
}
