//! `for v in range(...)` to counted `while` conversion.

use super::{MutationStage, StageContext};
use crate::errors::TransformError;
use crate::mutation::fold::literal_number;
use crate::pyast::visit::{binds_name, identifier_counts, transform_module, walk_stmt_mut, Transformer};
use crate::pyast::{CmpOperator, Expr, Module, Number, Operator, Stmt};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;

pub struct LoopStage {
    pub rate: f64,
}

impl MutationStage for LoopStage {
    fn name(&self) -> &'static str {
        "convert_loops"
    }

    fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        if binds_name(&module.body, "range") {
            return Ok(0);
        }
        let mut converter = LoopConverter {
            rng: ctx.rng,
            rate: self.rate,
            scopes: vec![identifier_counts(&module.body)],
            converted: 0,
        };
        transform_module(&mut converter, module)?;
        Ok(converter.converted)
    }
}

struct RangePlan {
    var: String,
    start: Expr,
    stop: Expr,
    step: i64,
}

struct LoopConverter<'a> {
    rng: &'a mut StdRng,
    rate: f64,
    /// Identifier counts of each enclosing function scope, innermost last.
    scopes: Vec<BTreeMap<String, usize>>,
    converted: usize,
}

impl LoopConverter<'_> {
    fn plan(&self, stmt: &Stmt) -> Option<RangePlan> {
        let Stmt::For {
            target,
            iter,
            body,
            is_async: false,
            ..
        } = stmt
        else {
            return None;
        };
        let var = target.as_name()?;
        let Expr::Call { func, args, keywords } = iter else {
            return None;
        };
        if func.as_name() != Some("range") || !keywords.is_empty() || args.is_empty() || args.len() > 3 {
            return None;
        }
        let bound_ok = |expr: &Expr| match expr {
            Expr::Name { id } => !binds_name(body, id),
            other => matches!(literal_number(other), Some(Number::Int(_))),
        };
        if !args.iter().all(bound_ok) {
            return None;
        }
        let step = match args.get(2) {
            Some(expr) => match literal_number(expr)? {
                Number::Int(0) => return None,
                Number::Int(step) => step,
                Number::Float(_) => return None,
            },
            None => 1,
        };
        step.checked_abs()?;

        if binds_name(body, var) || has_own_continue(body) {
            return None;
        }
        // Every occurrence of the variable in its scope must be this loop's
        // target or body; the two forms leave it holding different values.
        let in_scope = self.scopes.last()?.get(var).copied().unwrap_or(0);
        let in_loop = 1 + identifier_counts(body).get(var).copied().unwrap_or(0);
        if in_scope != in_loop {
            return None;
        }

        let (start, stop) = match args.as_slice() {
            [stop] => (Expr::int_literal(0), stop.clone()),
            [start, stop, ..] => (start.clone(), stop.clone()),
            [] => return None,
        };
        Some(RangePlan {
            var: var.to_string(),
            start,
            stop,
            step,
        })
    }
}

impl Transformer for LoopConverter<'_> {
    fn transform_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>, TransformError> {
        if matches!(stmt, Stmt::FunctionDef(_)) {
            self.scopes.push(identifier_counts(std::slice::from_ref(&stmt)));
            let result = walk_stmt_mut(self, stmt);
            self.scopes.pop();
            return Ok(vec![result?]);
        }
        let stmt = walk_stmt_mut(self, stmt)?;
        let Some(plan) = self.plan(&stmt) else {
            return Ok(vec![stmt]);
        };
        if !self.rng.gen_bool(self.rate) {
            return Ok(vec![stmt]);
        }
        match stmt {
            Stmt::For { body, orelse, .. } => {
                self.converted += 1;
                Ok(counted_while(plan, body, orelse))
            }
            other => Err(TransformError::UnexpectedShape {
                stage: "convert_loops",
                node: other.kind(),
                detail: "planned conversion for a non-loop statement".into(),
            }),
        }
    }
}

fn counted_while(plan: RangePlan, mut body: Vec<Stmt>, orelse: Vec<Stmt>) -> Vec<Stmt> {
    let RangePlan {
        var,
        start,
        stop,
        step,
    } = plan;
    let (cmp, op) = if step > 0 {
        (CmpOperator::Lt, Operator::Add)
    } else {
        (CmpOperator::Gt, Operator::Sub)
    };
    body.push(Stmt::AugAssign {
        target: Expr::name(var.as_str()),
        op,
        value: Expr::int_literal(step.abs()),
    });
    vec![
        Stmt::Assign {
            targets: vec![Expr::name(var.as_str())],
            value: start,
        },
        Stmt::While {
            test: Expr::Compare {
                left: Box::new(Expr::name(var.as_str())),
                ops: vec![cmp],
                comparators: vec![stop],
            },
            body,
            orelse,
        },
    ]
}

/// `continue` that would resume this loop (not one nested inside it).
fn has_own_continue(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Continue => true,
        Stmt::For { orelse, .. } | Stmt::While { orelse, .. } => has_own_continue(orelse),
        Stmt::If { body, orelse, .. } => has_own_continue(body) || has_own_continue(orelse),
        Stmt::With { body, .. } => has_own_continue(body),
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            has_own_continue(body)
                || handlers.iter().any(|h| has_own_continue(&h.body))
                || has_own_continue(orelse)
                || has_own_continue(finalbody)
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyast::{parse_module, unparse};
    use rand::SeedableRng;

    fn convert(source: &str) -> (String, usize) {
        let mut module = parse_module(source).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = StageContext::new(&mut rng);
        let n = LoopStage { rate: 1.0 }.apply(&mut module, &mut ctx).unwrap();
        (unparse(&module), n)
    }

    #[test]
    fn test_simple_range_loop() {
        let (out, n) = convert("def f(n):\n    total = 0\n    for i in range(n):\n        total += 1\n    return total\n");
        assert_eq!(n, 1);
        assert_eq!(
            out,
            "def f(n):\n    total = 0\n    i = 0\n    while i < n:\n        total += 1\n        i += 1\n    return total\n"
        );
    }

    #[test]
    fn test_start_stop_and_negative_step() {
        let (out, _) = convert("for k in range(10, 0, -2):\n    print(k)\nelse:\n    done()\n");
        assert_eq!(
            out,
            "k = 10\nwhile k > 0:\n    print(k)\n    k -= 2\nelse:\n    done()\n"
        );
    }

    #[test]
    fn test_guards() {
        // Loop variable read after the loop.
        assert_eq!(convert("for i in range(3):\n    pass\nprint(i)\n").1, 0);
        // Reassigned in the body.
        assert_eq!(convert("for i in range(3):\n    i = 5\n").1, 0);
        // `continue` would skip the increment.
        assert_eq!(convert("for i in range(3):\n    if i:\n        continue\n").1, 0);
        // Bound rebound in the body.
        assert_eq!(convert("for i in range(n):\n    n = 1\n").1, 0);
        // Step of unknown sign.
        assert_eq!(convert("for i in range(0, 9, s):\n    pass\n").1, 0);
        // `range` shadowed somewhere in the file.
        assert_eq!(convert("range = list\nfor i in range(3):\n    pass\n").1, 0);
        // Non-range iterables and tuple targets.
        assert_eq!(convert("for i in items:\n    pass\n").1, 0);
        assert_eq!(convert("for a, b in range(3):\n    pass\n").1, 0);
    }

    #[test]
    fn test_nested_loop_continue_is_fine() {
        let source = "for i in range(2):\n    for j in items:\n        continue\n";
        assert_eq!(convert(source).1, 1);
    }
}
