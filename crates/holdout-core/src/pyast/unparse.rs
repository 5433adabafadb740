//! Source printer for [`Module`] trees.
//!
//! Output is canonical rather than layout-preserving: four-space indentation,
//! one statement per line, and parentheses only where operator precedence
//! demands them (tuples and walrus expressions are always parenthesized).
//! The printer guarantees `parse_module(&unparse(&m)) == Ok(m)` for every
//! tree the parser produces and every tree the mutators derive from one.

use super::ast::*;
use std::fmt::Write as _;

const INDENT: &str = "    ";

/// Binding strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Tuple,
    Yield,
    Test,
    Or,
    And,
    Not,
    Cmp,
    BitOr,
    BitXor,
    BitAnd,
    Shift,
    Arith,
    Term,
    Factor,
    Power,
    Await,
    Atom,
}

impl Prec {
    fn next(self) -> Prec {
        match self {
            Prec::Tuple => Prec::Yield,
            Prec::Yield => Prec::Test,
            Prec::Test => Prec::Or,
            Prec::Or => Prec::And,
            Prec::And => Prec::Not,
            Prec::Not => Prec::Cmp,
            Prec::Cmp => Prec::BitOr,
            Prec::BitOr => Prec::BitXor,
            Prec::BitXor => Prec::BitAnd,
            Prec::BitAnd => Prec::Shift,
            Prec::Shift => Prec::Arith,
            Prec::Arith => Prec::Term,
            Prec::Term => Prec::Factor,
            Prec::Factor => Prec::Power,
            Prec::Power => Prec::Await,
            Prec::Await | Prec::Atom => Prec::Atom,
        }
    }

    fn of_operator(op: Operator) -> Prec {
        match op {
            Operator::BitOr => Prec::BitOr,
            Operator::BitXor => Prec::BitXor,
            Operator::BitAnd => Prec::BitAnd,
            Operator::LShift | Operator::RShift => Prec::Shift,
            Operator::Add | Operator::Sub => Prec::Arith,
            Operator::Mult
            | Operator::MatMult
            | Operator::Div
            | Operator::Mod
            | Operator::FloorDiv => Prec::Term,
            Operator::Pow => Prec::Power,
        }
    }
}

/// Print a module back to source text.
pub fn unparse(module: &Module) -> String {
    let mut printer = Printer::default();
    printer.body(&module.body, true);
    printer.out
}

/// Print a single expression.
pub fn unparse_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, Prec::Test);
    out
}

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn body(&mut self, stmts: &[Stmt], top_level: bool) {
        let mut prev_was_def = false;
        for (i, stmt) in stmts.iter().enumerate() {
            let is_def = matches!(stmt, Stmt::FunctionDef(_) | Stmt::ClassDef(_));
            if top_level && i > 0 && (is_def || prev_was_def) {
                self.out.push('\n');
            }
            self.stmt(stmt);
            prev_was_def = is_def;
        }
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.depth += 1;
        if stmts.is_empty() {
            self.line("pass");
        } else {
            self.body(stmts, false);
        }
        self.depth -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => self.function_def(def),
            Stmt::ClassDef(class) => self.class_def(class),
            Stmt::Return { value } => match value {
                Some(value) => self.line(&format!("return {}", expr_at(value, Prec::Tuple))),
                None => self.line("return"),
            },
            Stmt::Delete { targets } => {
                let targets = join(targets, Prec::BitOr);
                self.line(&format!("del {targets}"));
            }
            Stmt::Assign { targets, value } => {
                let mut text = String::new();
                for target in targets {
                    write_expr(&mut text, target, Prec::Tuple);
                    text.push_str(" = ");
                }
                write_expr(&mut text, value, Prec::Yield);
                self.line(&text);
            }
            Stmt::AugAssign { target, op, value } => {
                self.line(&format!(
                    "{} {}= {}",
                    expr_at(target, Prec::Test),
                    op.symbol(),
                    expr_at(value, Prec::Yield)
                ));
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let mut text = format!(
                    "{}: {}",
                    expr_at(target, Prec::Test),
                    expr_at(annotation, Prec::Test)
                );
                if let Some(value) = value {
                    let _ = write!(text, " = {}", expr_at(value, Prec::Yield));
                }
                self.line(&text);
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
                is_async,
            } => {
                let keyword = if *is_async { "async for" } else { "for" };
                self.line(&format!(
                    "{keyword} {} in {}:",
                    expr_at(target, Prec::Tuple),
                    expr_at(iter, Prec::Tuple)
                ));
                self.block(body);
                self.else_block(orelse);
            }
            Stmt::While { test, body, orelse } => {
                self.line(&format!("while {}:", expr_at(test, Prec::Test)));
                self.block(body);
                self.else_block(orelse);
            }
            Stmt::If { test, body, orelse } => self.if_chain("if", test, body, orelse),
            Stmt::With {
                items,
                body,
                is_async,
            } => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| match &item.optional_vars {
                        Some(vars) => format!(
                            "{} as {}",
                            expr_at(&item.context_expr, Prec::Test),
                            expr_at(vars, Prec::BitOr)
                        ),
                        None => expr_at(&item.context_expr, Prec::Test),
                    })
                    .collect();
                let keyword = if *is_async { "async with" } else { "with" };
                self.line(&format!("{keyword} {}:", items.join(", ")));
                self.block(body);
            }
            Stmt::Raise { exc, cause } => {
                let mut text = String::from("raise");
                if let Some(exc) = exc {
                    let _ = write!(text, " {}", expr_at(exc, Prec::Test));
                }
                if let Some(cause) = cause {
                    let _ = write!(text, " from {}", expr_at(cause, Prec::Test));
                }
                self.line(&text);
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.line("try:");
                self.block(body);
                for handler in handlers {
                    let header = match (&handler.typ, &handler.name) {
                        (Some(typ), Some(name)) => {
                            format!("except {} as {name}:", expr_at(typ, Prec::Test))
                        }
                        (Some(typ), None) => format!("except {}:", expr_at(typ, Prec::Test)),
                        (None, _) => "except:".to_string(),
                    };
                    self.line(&header);
                    self.block(&handler.body);
                }
                self.else_block(orelse);
                if !finalbody.is_empty() {
                    self.line("finally:");
                    self.block(finalbody);
                }
            }
            Stmt::Assert { test, msg } => {
                let mut text = format!("assert {}", expr_at(test, Prec::Test));
                if let Some(msg) = msg {
                    let _ = write!(text, ", {}", expr_at(msg, Prec::Test));
                }
                self.line(&text);
            }
            Stmt::Import { names } => self.line(&format!("import {}", aliases(names))),
            Stmt::ImportFrom {
                module,
                names,
                level,
            } => {
                let dots = ".".repeat(*level as usize);
                let module = module.as_deref().unwrap_or("");
                self.line(&format!("from {dots}{module} import {}", aliases(names)));
            }
            Stmt::Global { names } => self.line(&format!("global {}", names.join(", "))),
            Stmt::Nonlocal { names } => self.line(&format!("nonlocal {}", names.join(", "))),
            Stmt::Expr { value } => self.line(&expr_at(value, Prec::Yield)),
            Stmt::Pass => self.line("pass"),
            Stmt::Break => self.line("break"),
            Stmt::Continue => self.line("continue"),
        }
    }

    fn if_chain(&mut self, keyword: &str, test: &Expr, body: &[Stmt], orelse: &[Stmt]) {
        self.line(&format!("{keyword} {}:", expr_at(test, Prec::Test)));
        self.block(body);
        match orelse {
            [Stmt::If { test, body, orelse }] => self.if_chain("elif", test, body, orelse),
            _ => self.else_block(orelse),
        }
    }

    fn else_block(&mut self, orelse: &[Stmt]) {
        if !orelse.is_empty() {
            self.line("else:");
            self.block(orelse);
        }
    }

    fn function_def(&mut self, def: &FunctionDef) {
        for decorator in &def.decorators {
            self.line(&format!("@{}", expr_at(decorator, Prec::Test)));
        }
        let mut header = String::new();
        if def.is_async {
            header.push_str("async ");
        }
        let _ = write!(header, "def {}(", def.name);
        write_params(&mut header, &def.params, true);
        header.push(')');
        if let Some(returns) = &def.returns {
            let _ = write!(header, " -> {}", expr_at(returns, Prec::Test));
        }
        header.push(':');
        self.line(&header);
        self.block(&def.body);
    }

    fn class_def(&mut self, class: &ClassDef) {
        for decorator in &class.decorators {
            self.line(&format!("@{}", expr_at(decorator, Prec::Test)));
        }
        let mut header = format!("class {}", class.name);
        if !class.bases.is_empty() || !class.keywords.is_empty() {
            header.push('(');
            write_arguments(&mut header, &class.bases, &class.keywords);
            header.push(')');
        }
        header.push(':');
        self.line(&header);
        self.block(&class.body);
    }
}

fn aliases(names: &[Alias]) -> String {
    names
        .iter()
        .map(|alias| match &alias.asname {
            Some(asname) => format!("{} as {asname}", alias.name),
            None => alias.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn expr_at(expr: &Expr, prec: Prec) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, prec);
    out
}

fn join(exprs: &[Expr], prec: Prec) -> String {
    exprs
        .iter()
        .map(|e| expr_at(e, prec))
        .collect::<Vec<_>>()
        .join(", ")
}

fn own_prec(expr: &Expr) -> Prec {
    match expr {
        Expr::Yield { .. } | Expr::YieldFrom { .. } => Prec::Yield,
        Expr::Lambda { .. } | Expr::IfExp { .. } => Prec::Test,
        Expr::BoolOp {
            op: BoolOperator::Or,
            ..
        } => Prec::Or,
        Expr::BoolOp {
            op: BoolOperator::And,
            ..
        } => Prec::And,
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => Prec::Not,
        Expr::UnaryOp { .. } => Prec::Factor,
        Expr::Compare { .. } => Prec::Cmp,
        Expr::BinOp { op, .. } => Prec::of_operator(*op),
        Expr::Await { .. } => Prec::Await,
        _ => Prec::Atom,
    }
}

fn write_expr(out: &mut String, expr: &Expr, ctx: Prec) {
    let needs_parens = own_prec(expr) < ctx;
    if needs_parens {
        out.push('(');
    }
    write_bare(out, expr);
    if needs_parens {
        out.push(')');
    }
}

fn write_bare(out: &mut String, expr: &Expr) {
    match expr {
        Expr::BoolOp { op, values } => {
            let prec = own_prec(expr);
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    let _ = write!(out, " {} ", op.keyword());
                }
                write_expr(out, value, prec.next());
            }
        }
        Expr::NamedExpr { target, value } => {
            let _ = write!(out, "({target} := ");
            write_expr(out, value, Prec::Test);
            out.push(')');
        }
        Expr::BinOp { left, op, right } => {
            let prec = Prec::of_operator(*op);
            let (left_ctx, right_ctx) = if *op == Operator::Pow {
                (Prec::Await, Prec::Factor)
            } else {
                (prec, prec.next())
            };
            write_expr(out, left, left_ctx);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, right, right_ctx);
        }
        Expr::UnaryOp { op, operand } => match op {
            UnaryOperator::Not => {
                out.push_str("not ");
                write_expr(out, operand, Prec::Not);
            }
            UnaryOperator::USub | UnaryOperator::UAdd | UnaryOperator::Invert => {
                out.push(match op {
                    UnaryOperator::USub => '-',
                    UnaryOperator::UAdd => '+',
                    _ => '~',
                });
                write_expr(out, operand, Prec::Factor);
            }
        },
        Expr::Lambda { params, body } => {
            out.push_str("lambda");
            if !params.is_empty() {
                out.push(' ');
                write_params(out, params, false);
            }
            out.push_str(": ");
            write_expr(out, body, Prec::Test);
        }
        Expr::IfExp { test, body, orelse } => {
            write_expr(out, body, Prec::Or);
            out.push_str(" if ");
            write_expr(out, test, Prec::Or);
            out.push_str(" else ");
            write_expr(out, orelse, Prec::Test);
        }
        Expr::Dict { entries } => {
            out.push('{');
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match &entry.key {
                    Some(key) => {
                        write_expr(out, key, Prec::Test);
                        out.push_str(": ");
                        write_expr(out, &entry.value, Prec::Test);
                    }
                    None => {
                        out.push_str("**");
                        write_expr(out, &entry.value, Prec::BitOr);
                    }
                }
            }
            out.push('}');
        }
        Expr::Set { elts } => {
            out.push('{');
            write_elements(out, elts);
            out.push('}');
        }
        Expr::ListComp { elt, generators } => {
            out.push('[');
            write_expr(out, elt, Prec::Test);
            write_generators(out, generators);
            out.push(']');
        }
        Expr::SetComp { elt, generators } => {
            out.push('{');
            write_expr(out, elt, Prec::Test);
            write_generators(out, generators);
            out.push('}');
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            out.push('{');
            write_expr(out, key, Prec::Test);
            out.push_str(": ");
            write_expr(out, value, Prec::Test);
            write_generators(out, generators);
            out.push('}');
        }
        Expr::GeneratorExp { elt, generators } => {
            out.push('(');
            write_expr(out, elt, Prec::Test);
            write_generators(out, generators);
            out.push(')');
        }
        Expr::Await { value } => {
            out.push_str("await ");
            write_expr(out, value, Prec::Atom);
        }
        Expr::Yield { value } => {
            out.push_str("yield");
            if let Some(value) = value {
                out.push(' ');
                write_expr(out, value, Prec::Tuple);
            }
        }
        Expr::YieldFrom { value } => {
            out.push_str("yield from ");
            write_expr(out, value, Prec::Test);
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            write_expr(out, left, Prec::BitOr);
            for (op, comparator) in ops.iter().zip(comparators) {
                let _ = write!(out, " {} ", op.symbol());
                write_expr(out, comparator, Prec::BitOr);
            }
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            write_expr(out, func, Prec::Atom);
            out.push('(');
            match (args.as_slice(), keywords.is_empty()) {
                // A lone generator argument keeps the `f(x for x in y)` form.
                ([Expr::GeneratorExp { elt, generators }], true) => {
                    write_expr(out, elt, Prec::Test);
                    write_generators(out, generators);
                }
                _ => write_arguments(out, args, keywords),
            }
            out.push(')');
        }
        Expr::Constant(constant) => write_constant(out, constant),
        Expr::Attribute { value, attr } => {
            let numeric = matches!(
                **value,
                Expr::Constant(Constant::Int(_) | Constant::Float(_) | Constant::Imaginary(_))
            );
            if numeric {
                out.push('(');
                write_bare(out, value);
                out.push(')');
            } else {
                write_expr(out, value, Prec::Atom);
            }
            let _ = write!(out, ".{attr}");
        }
        Expr::Subscript { value, slice } => {
            write_expr(out, value, Prec::Atom);
            out.push('[');
            match &**slice {
                Expr::Tuple { elts } if !elts.is_empty() => {
                    for (i, elt) in elts.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        write_expr(out, elt, Prec::Test);
                    }
                    if elts.len() == 1 {
                        out.push(',');
                    }
                }
                other => write_expr(out, other, Prec::Test),
            }
            out.push(']');
        }
        Expr::Starred { value } => {
            out.push('*');
            write_expr(out, value, Prec::BitOr);
        }
        Expr::Name { id } => out.push_str(id),
        Expr::List { elts } => {
            out.push('[');
            write_elements(out, elts);
            out.push(']');
        }
        Expr::Tuple { elts } => {
            out.push('(');
            write_elements(out, elts);
            if elts.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Expr::Slice { lower, upper, step } => {
            if let Some(lower) = lower {
                write_expr(out, lower, Prec::Test);
            }
            out.push(':');
            if let Some(upper) = upper {
                write_expr(out, upper, Prec::Test);
            }
            if let Some(step) = step {
                out.push(':');
                write_expr(out, step, Prec::Test);
            }
        }
    }
}

fn write_constant(out: &mut String, constant: &Constant) {
    match constant {
        Constant::None => out.push_str("None"),
        Constant::Bool(true) => out.push_str("True"),
        Constant::Bool(false) => out.push_str("False"),
        Constant::Ellipsis => out.push_str("..."),
        Constant::Int(int) => out.push_str(&int.text),
        Constant::Float(float) => out.push_str(&float.text),
        Constant::Imaginary(text) => out.push_str(text),
        Constant::Str(s) | Constant::Bytes(s) => out.push_str(&s.parts.join(" ")),
    }
}

fn write_elements(out: &mut String, elts: &[Expr]) {
    for (i, elt) in elts.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, elt, Prec::Test);
    }
}

fn write_generators(out: &mut String, generators: &[Comprehension]) {
    for generator in generators {
        out.push_str(if generator.is_async {
            " async for "
        } else {
            " for "
        });
        write_expr(out, &generator.target, Prec::BitOr);
        out.push_str(" in ");
        write_expr(out, &generator.iter, Prec::Or);
        for cond in &generator.ifs {
            out.push_str(" if ");
            write_expr(out, cond, Prec::Or);
        }
    }
}

fn write_arguments(out: &mut String, args: &[Expr], keywords: &[Keyword]) {
    let mut first = true;
    let mut sep = |out: &mut String| {
        if !first {
            out.push_str(", ");
        }
        first = false;
    };
    for arg in args {
        sep(out);
        write_expr(out, arg, Prec::Test);
    }
    for keyword in keywords {
        sep(out);
        match &keyword.arg {
            Some(name) => {
                let _ = write!(out, "{name}=");
            }
            None => out.push_str("**"),
        }
        write_expr(out, &keyword.value, Prec::Test);
    }
}

fn write_params(out: &mut String, params: &Parameters, annotations: bool) {
    let mut parts: Vec<String> = Vec::new();
    let render = |param: &Param| {
        let mut text = param.name.clone();
        if annotations {
            if let Some(annotation) = &param.annotation {
                let _ = write!(text, ": {}", expr_at(annotation, Prec::Test));
            }
        }
        if let Some(default) = &param.default {
            let sep = if annotations && param.annotation.is_some() {
                " = "
            } else {
                "="
            };
            let _ = write!(text, "{sep}{}", expr_at(default, Prec::Test));
        }
        text
    };
    for param in &params.posonly {
        parts.push(render(param));
    }
    if !params.posonly.is_empty() {
        parts.push("/".to_string());
    }
    for param in &params.args {
        parts.push(render(param));
    }
    match &params.vararg {
        Some(vararg) => parts.push(format!("*{}", render(vararg))),
        None if !params.kwonly.is_empty() => parts.push("*".to_string()),
        None => {}
    }
    for param in &params.kwonly {
        parts.push(render(param));
    }
    if let Some(kwarg) = &params.kwarg {
        parts.push(format!("**{}", render(kwarg)));
    }
    out.push_str(&parts.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyast::parse_module;

    fn roundtrip(source: &str) -> String {
        let module = parse_module(source).unwrap_or_else(|e| panic!("parse failed: {e}"));
        let printed = unparse(&module);
        let reparsed = parse_module(&printed)
            .unwrap_or_else(|e| panic!("reparse failed: {e}\n{printed}"));
        assert_eq!(module, reparsed, "tree changed after printing:\n{printed}");
        printed
    }

    #[test]
    fn test_precedence_parentheses() {
        assert_eq!(roundtrip("x = (a + b) * c\n"), "x = (a + b) * c\n");
        assert_eq!(roundtrip("x = a - (b - c)\n"), "x = a - (b - c)\n");
        assert_eq!(roundtrip("x = a - b - c\n"), "x = a - b - c\n");
        assert_eq!(roundtrip("x = (a ** b) ** c\n"), "x = (a ** b) ** c\n");
        assert_eq!(roundtrip("x = a ** b ** c\n"), "x = a ** b ** c\n");
        assert_eq!(roundtrip("x = -a ** -b\n"), "x = -a ** -b\n");
        assert_eq!(roundtrip("x = not (a and b)\n"), "x = not (a and b)\n");
        assert_eq!(roundtrip("x = (a or b) and c\n"), "x = (a or b) and c\n");
        assert_eq!(roundtrip("x = (1).real\n"), "x = (1).real\n");
        assert_eq!(roundtrip("x = (lambda: 1)()\n"), "x = (lambda: 1)()\n");
    }

    #[test]
    fn test_tuples_and_subscripts() {
        assert_eq!(roundtrip("a, b = b, a\n"), "(a, b) = (b, a)\n");
        assert_eq!(roundtrip("t = 1,\n"), "t = (1,)\n");
        assert_eq!(roundtrip("v = m[1:2, ::3]\n"), "v = m[1:2, ::3]\n");
        assert_eq!(roundtrip("v = m[i]\n"), "v = m[i]\n");
        roundtrip("v = m[()]\n");
    }

    #[test]
    fn test_elif_chain_and_blocks() {
        let printed = roundtrip("if a:\n  x = 1\nelif b:\n  x = 2\nelse:\n  x = 3\n");
        assert_eq!(printed, "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
    }

    #[test]
    fn test_full_roundtrip() {
        roundtrip(
            r#""""Module doc."""
from __future__ import annotations
import os.path as osp
from ..pkg import (a, b as c)

CONSTANT = 0x1F

@dataclass(frozen=True)
class Point(Base, metaclass=Meta):
    x: int = 0
    def norm(self, *, scale: float = 1.0) -> float:
        return (self.x ** 2) ** 0.5 * scale

async def fetch(url, /, retries=3, *args, timeout=None, **kw):
    async with session() as s:
        async for chunk in s.stream():
            yield chunk
    result = await s.get(url)
    return [c for c in result if c if not c.empty] or None

def gen(xs):
    total = 0
    for i, (a, *rest) in enumerate(xs):
        total += a if a > 0 else -a
        del rest[0]
    else:
        pass
    while total > 0:
        total -= 1
        if total == 3:
            break
        continue
    try:
        value = {k: v for k, v in xs.items() if k not in {1, 2}}
    except (KeyError, ValueError) as exc:
        raise RuntimeError("bad") from exc
    except:
        raise
    else:
        value = {**value, 'x': 1}
    finally:
        print(f"{total!r}", sep='')
    assert total >= 0, 'negative'
    x = yield
    y = yield from gen(x)
    z = (n := len(xs)) + 1
    w = sum(i * i for i in range(10))
    return lambda a, b=2, *c, **d: (a, b, c, d)

def scopes():
    global counter
    def inner():
        nonlocal counter
        counter += 1
    return inner
"#,
        );
    }
}
