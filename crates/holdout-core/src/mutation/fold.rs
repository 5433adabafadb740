//! Numeric constant folding with Python semantics.
//!
//! Only `+ - * / // %` over literal operands are folded. Integer arithmetic is
//! checked, `//` and `%` round toward negative infinity, and `/` always yields
//! a float. Anything whose result Python would compute differently (division
//! by zero, overflow past `i64`, non-finite or negative-zero floats, integers
//! too wide for exact float conversion) is left as written.

use super::{MutationStage, StageContext};
use crate::errors::TransformError;
use crate::pyast::visit::{transform_module, walk_expr_mut, Transformer};
use crate::pyast::{Expr, Module, Number, Operator, UnaryOperator};

/// Largest integer magnitude that converts to `f64` exactly.
const EXACT_FLOAT_INT: u64 = 1 << 53;

pub struct FoldStage;

impl MutationStage for FoldStage {
    fn name(&self) -> &'static str {
        "fold_constants"
    }

    fn apply(&self, module: &mut Module, _ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        let mut folder = Folder { folded: 0 };
        transform_module(&mut folder, module)?;
        Ok(folder.folded)
    }
}

struct Folder {
    folded: usize,
}

impl Transformer for Folder {
    fn transform_expr(&mut self, expr: &mut Expr) -> Result<(), TransformError> {
        walk_expr_mut(self, expr)?;
        if let Expr::BinOp { left, op, right } = expr {
            if let (Some(a), Some(b)) = (literal_number(left), literal_number(right)) {
                if let Some(result) = fold_binop(a, *op, b) {
                    *expr = result.into_expr();
                    self.folded += 1;
                }
            }
        }
        Ok(())
    }
}

/// Numeric literal, optionally behind a unary sign.
pub fn literal_number(expr: &Expr) -> Option<Number> {
    match expr {
        Expr::Constant(c) => c.as_number(),
        Expr::UnaryOp { op, operand } => {
            let Expr::Constant(c) = operand.as_ref() else {
                return None;
            };
            match (op, c.as_number()?) {
                (UnaryOperator::UAdd, n) => Some(n),
                (UnaryOperator::USub, Number::Int(i)) => i.checked_neg().map(Number::Int),
                (UnaryOperator::USub, Number::Float(f)) => Some(Number::Float(-f)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Evaluate `a op b` the way CPython would, or `None` when the result cannot
/// be represented exactly as a literal.
pub fn fold_binop(a: Number, op: Operator, b: Number) -> Option<Number> {
    let result = match (a, b) {
        (Number::Int(x), Number::Int(y)) => fold_int(x, op, y)?,
        _ => Number::Float(fold_float(a.as_f64(), op, b.as_f64())?),
    };
    match result {
        Number::Float(f) if !f.is_finite() || (f == 0.0 && f.is_sign_negative()) => None,
        other => Some(other),
    }
}

fn fold_int(x: i64, op: Operator, y: i64) -> Option<Number> {
    let value = match op {
        Operator::Add => x.checked_add(y)?,
        Operator::Sub => x.checked_sub(y)?,
        Operator::Mult => x.checked_mul(y)?,
        Operator::FloorDiv => floor_div(x, y)?,
        Operator::Mod => floor_mod(x, y)?,
        Operator::Div => {
            if y == 0 || x.unsigned_abs() > EXACT_FLOAT_INT || y.unsigned_abs() > EXACT_FLOAT_INT {
                return None;
            }
            return Some(Number::Float(x as f64 / y as f64));
        }
        _ => return None,
    };
    Some(Number::Int(value))
}

fn fold_float(x: f64, op: Operator, y: f64) -> Option<f64> {
    match op {
        Operator::Add => Some(x + y),
        Operator::Sub => Some(x - y),
        Operator::Mult => Some(x * y),
        Operator::Div if y != 0.0 => Some(x / y),
        _ => None,
    }
}

fn floor_div(x: i64, y: i64) -> Option<i64> {
    let q = x.checked_div(y)?;
    let r = x.checked_rem(y)?;
    if r != 0 && ((r < 0) != (y < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(x: i64, y: i64) -> Option<i64> {
    let r = x.checked_rem(y)?;
    if r != 0 && ((r < 0) != (y < 0)) {
        r.checked_add(y)
    } else {
        Some(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyast::{parse_module, unparse};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fold(source: &str) -> (String, usize) {
        let mut module = parse_module(source).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = StageContext::new(&mut rng);
        let n = FoldStage.apply(&mut module, &mut ctx).unwrap();
        (unparse(&module), n)
    }

    #[test]
    fn test_folds_simple_arithmetic() {
        assert_eq!(fold("x = 2 + 3\n"), ("x = 5\n".to_string(), 1));
        assert_eq!(fold("x = 10 / 4\n").0, "x = 2.5\n");
        assert_eq!(fold("x = 1 + 2 * 3\n"), ("x = 7\n".to_string(), 2));
        assert_eq!(fold("x = 2 - 5\n").0, "x = -3\n");
        assert_eq!(fold("x = 1.5 + 1\n").0, "x = 2.5\n");
    }

    #[test]
    fn test_python_floor_semantics() {
        assert_eq!(fold_binop(Number::Int(7), Operator::FloorDiv, Number::Int(-2)), Some(Number::Int(-4)));
        assert_eq!(fold_binop(Number::Int(-7), Operator::Mod, Number::Int(3)), Some(Number::Int(2)));
        assert_eq!(fold_binop(Number::Int(7), Operator::Mod, Number::Int(-3)), Some(Number::Int(-2)));
        assert_eq!(fold_binop(Number::Int(6), Operator::FloorDiv, Number::Int(3)), Some(Number::Int(2)));
    }

    #[test]
    fn test_unfoldable_sites_are_untouched() {
        assert_eq!(fold("x = 10 / 0\n"), ("x = 10 / 0\n".to_string(), 0));
        assert_eq!(fold("x = 10 % 0\n").1, 0);
        assert_eq!(fold("x = 9223372036854775807 + 1\n").1, 0);
        assert_eq!(fold("x = 1e308 * 10.0\n").1, 0);
        assert_eq!(fold("x = 2 ** 3\n").1, 0);
        assert_eq!(fold("x = a + 1\n").1, 0);
        assert_eq!(fold("x = 0.0 * -1.0\n").1, 0);
    }

    #[test]
    fn test_signed_operands() {
        assert_eq!(fold("x = -2 * 3\n").0, "x = -6\n");
        assert_eq!(literal_number(&Expr::int_literal(-4)), Some(Number::Int(-4)));
    }
}
