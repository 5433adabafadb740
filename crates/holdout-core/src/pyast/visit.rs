//! Tree traversal.
//!
//! # Architecture
//!
//! - [`Visitor`]: read-only walk with a hook per identifier occurrence and a
//!   separate hook for binding targets (assignment, loop, `with`, comprehension).
//! - [`Transformer`]: owning walk where a statement may be replaced by zero or
//!   more statements; expressions and identifiers are rewritten in place.
//!
//! Both traits default every hook to the matching `walk_*` function, so an
//! implementation overrides only the node kinds it cares about and calls the
//! walker to continue into children.

use super::ast::*;
use crate::errors::TransformError;
use std::collections::{BTreeMap, BTreeSet};

/// Where an identifier occurs. Attribute names, keyword-argument names and
/// import aliases are not identifier sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentSite {
    Reference,
    FunctionName,
    ClassName,
    Parameter,
    Global,
    Nonlocal,
    ExceptAlias,
    WalrusTarget,
}

// =============================================================================
// Read-only visitor
// =============================================================================

pub trait Visitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    /// Binding target of an assignment, loop, `with` or comprehension.
    fn visit_target(&mut self, target: &Expr) {
        self.visit_expr(target);
    }

    fn visit_identifier(&mut self, _name: &str, _site: IdentSite) {}
}

pub fn walk_body<V: Visitor + ?Sized>(visitor: &mut V, body: &[Stmt]) {
    for stmt in body {
        visitor.visit_stmt(stmt);
    }
}

fn walk_params<V: Visitor + ?Sized>(visitor: &mut V, params: &Parameters) {
    for param in params.iter() {
        if let Some(annotation) = &param.annotation {
            visitor.visit_expr(annotation);
        }
        if let Some(default) = &param.default {
            visitor.visit_expr(default);
        }
        visitor.visit_identifier(&param.name, IdentSite::Parameter);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::FunctionDef(def) => {
            for decorator in &def.decorators {
                visitor.visit_expr(decorator);
            }
            visitor.visit_identifier(&def.name, IdentSite::FunctionName);
            walk_params(visitor, &def.params);
            if let Some(returns) = &def.returns {
                visitor.visit_expr(returns);
            }
            walk_body(visitor, &def.body);
        }
        Stmt::ClassDef(class) => {
            for decorator in &class.decorators {
                visitor.visit_expr(decorator);
            }
            visitor.visit_identifier(&class.name, IdentSite::ClassName);
            for base in &class.bases {
                visitor.visit_expr(base);
            }
            for keyword in &class.keywords {
                visitor.visit_expr(&keyword.value);
            }
            walk_body(visitor, &class.body);
        }
        Stmt::Return { value } => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        Stmt::Delete { targets } => {
            for target in targets {
                visitor.visit_expr(target);
            }
        }
        Stmt::Assign { targets, value } => {
            visitor.visit_expr(value);
            for target in targets {
                visitor.visit_target(target);
            }
        }
        Stmt::AugAssign { target, value, .. } => {
            visitor.visit_expr(value);
            visitor.visit_target(target);
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value,
        } => {
            visitor.visit_expr(annotation);
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
            visitor.visit_target(target);
        }
        Stmt::For {
            target,
            iter,
            body,
            orelse,
            ..
        } => {
            visitor.visit_expr(iter);
            visitor.visit_target(target);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        Stmt::While { test, body, orelse } | Stmt::If { test, body, orelse } => {
            visitor.visit_expr(test);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        Stmt::With { items, body, .. } => {
            for item in items {
                visitor.visit_expr(&item.context_expr);
                if let Some(vars) = &item.optional_vars {
                    visitor.visit_target(vars);
                }
            }
            walk_body(visitor, body);
        }
        Stmt::Raise { exc, cause } => {
            if let Some(exc) = exc {
                visitor.visit_expr(exc);
            }
            if let Some(cause) = cause {
                visitor.visit_expr(cause);
            }
        }
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            walk_body(visitor, body);
            for handler in handlers {
                if let Some(typ) = &handler.typ {
                    visitor.visit_expr(typ);
                }
                if let Some(name) = &handler.name {
                    visitor.visit_identifier(name, IdentSite::ExceptAlias);
                }
                walk_body(visitor, &handler.body);
            }
            walk_body(visitor, orelse);
            walk_body(visitor, finalbody);
        }
        Stmt::Assert { test, msg } => {
            visitor.visit_expr(test);
            if let Some(msg) = msg {
                visitor.visit_expr(msg);
            }
        }
        Stmt::Global { names } => {
            for name in names {
                visitor.visit_identifier(name, IdentSite::Global);
            }
        }
        Stmt::Nonlocal { names } => {
            for name in names {
                visitor.visit_identifier(name, IdentSite::Nonlocal);
            }
        }
        Stmt::Expr { value } => visitor.visit_expr(value),
        Stmt::Import { .. }
        | Stmt::ImportFrom { .. }
        | Stmt::Pass
        | Stmt::Break
        | Stmt::Continue => {}
    }
}

fn walk_generators<V: Visitor + ?Sized>(visitor: &mut V, generators: &[Comprehension]) {
    for generator in generators {
        visitor.visit_expr(&generator.iter);
        visitor.visit_target(&generator.target);
        for cond in &generator.ifs {
            visitor.visit_expr(cond);
        }
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::BoolOp { values, .. } => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        Expr::NamedExpr { target, value } => {
            visitor.visit_expr(value);
            visitor.visit_identifier(target, IdentSite::WalrusTarget);
        }
        Expr::BinOp { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Expr::UnaryOp { operand, .. } => visitor.visit_expr(operand),
        Expr::Lambda { params, body } => {
            walk_params(visitor, params);
            visitor.visit_expr(body);
        }
        Expr::IfExp { test, body, orelse } => {
            visitor.visit_expr(test);
            visitor.visit_expr(body);
            visitor.visit_expr(orelse);
        }
        Expr::Dict { entries } => {
            for entry in entries {
                if let Some(key) = &entry.key {
                    visitor.visit_expr(key);
                }
                visitor.visit_expr(&entry.value);
            }
        }
        Expr::Set { elts } | Expr::List { elts } | Expr::Tuple { elts } => {
            for elt in elts {
                visitor.visit_expr(elt);
            }
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            walk_generators(visitor, generators);
            visitor.visit_expr(elt);
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            walk_generators(visitor, generators);
            visitor.visit_expr(key);
            visitor.visit_expr(value);
        }
        Expr::Await { value } | Expr::YieldFrom { value } | Expr::Starred { value } => {
            visitor.visit_expr(value)
        }
        Expr::Yield { value } => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            visitor.visit_expr(left);
            for comparator in comparators {
                visitor.visit_expr(comparator);
            }
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            visitor.visit_expr(func);
            for arg in args {
                visitor.visit_expr(arg);
            }
            for keyword in keywords {
                visitor.visit_expr(&keyword.value);
            }
        }
        Expr::Attribute { value, .. } => visitor.visit_expr(value),
        Expr::Subscript { value, slice } => {
            visitor.visit_expr(value);
            visitor.visit_expr(slice);
        }
        Expr::Name { id } => visitor.visit_identifier(id, IdentSite::Reference),
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                visitor.visit_expr(part);
            }
        }
        Expr::Constant(_) => {}
    }
}

// =============================================================================
// Owning transformer
// =============================================================================

pub trait Transformer {
    fn transform_body(&mut self, body: &mut Vec<Stmt>) -> Result<(), TransformError> {
        walk_body_mut(self, body)
    }

    /// Replace one statement with any number of statements.
    fn transform_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>, TransformError> {
        Ok(vec![walk_stmt_mut(self, stmt)?])
    }

    fn transform_expr(&mut self, expr: &mut Expr) -> Result<(), TransformError> {
        walk_expr_mut(self, expr)
    }

    fn transform_identifier(&mut self, _name: &mut String, _site: IdentSite) {}
}

pub fn transform_module<T: Transformer + ?Sized>(
    transformer: &mut T,
    module: &mut Module,
) -> Result<(), TransformError> {
    transformer.transform_body(&mut module.body)
}

pub fn walk_body_mut<T: Transformer + ?Sized>(
    transformer: &mut T,
    body: &mut Vec<Stmt>,
) -> Result<(), TransformError> {
    let stmts = std::mem::take(body);
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        out.extend(transformer.transform_stmt(stmt)?);
    }
    *body = out;
    Ok(())
}

fn walk_params_mut<T: Transformer + ?Sized>(
    transformer: &mut T,
    params: &mut Parameters,
) -> Result<(), TransformError> {
    for param in params.iter_mut() {
        if let Some(annotation) = &mut param.annotation {
            transformer.transform_expr(annotation)?;
        }
        if let Some(default) = &mut param.default {
            transformer.transform_expr(default)?;
        }
        transformer.transform_identifier(&mut param.name, IdentSite::Parameter);
    }
    Ok(())
}

fn walk_opt_mut<T: Transformer + ?Sized>(
    transformer: &mut T,
    expr: &mut Option<Expr>,
) -> Result<(), TransformError> {
    match expr {
        Some(expr) => transformer.transform_expr(expr),
        None => Ok(()),
    }
}

pub fn walk_stmt_mut<T: Transformer + ?Sized>(
    transformer: &mut T,
    mut stmt: Stmt,
) -> Result<Stmt, TransformError> {
    match &mut stmt {
        Stmt::FunctionDef(def) => {
            for decorator in &mut def.decorators {
                transformer.transform_expr(decorator)?;
            }
            transformer.transform_identifier(&mut def.name, IdentSite::FunctionName);
            walk_params_mut(transformer, &mut def.params)?;
            walk_opt_mut(transformer, &mut def.returns)?;
            transformer.transform_body(&mut def.body)?;
        }
        Stmt::ClassDef(class) => {
            for decorator in &mut class.decorators {
                transformer.transform_expr(decorator)?;
            }
            transformer.transform_identifier(&mut class.name, IdentSite::ClassName);
            for base in &mut class.bases {
                transformer.transform_expr(base)?;
            }
            for keyword in &mut class.keywords {
                transformer.transform_expr(&mut keyword.value)?;
            }
            transformer.transform_body(&mut class.body)?;
        }
        Stmt::Return { value } => walk_opt_mut(transformer, value)?,
        Stmt::Delete { targets } => {
            for target in targets {
                transformer.transform_expr(target)?;
            }
        }
        Stmt::Assign { targets, value } => {
            transformer.transform_expr(value)?;
            for target in targets {
                transformer.transform_expr(target)?;
            }
        }
        Stmt::AugAssign { target, value, .. } => {
            transformer.transform_expr(value)?;
            transformer.transform_expr(target)?;
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value,
        } => {
            transformer.transform_expr(annotation)?;
            walk_opt_mut(transformer, value)?;
            transformer.transform_expr(target)?;
        }
        Stmt::For {
            target,
            iter,
            body,
            orelse,
            ..
        } => {
            transformer.transform_expr(iter)?;
            transformer.transform_expr(target)?;
            transformer.transform_body(body)?;
            transformer.transform_body(orelse)?;
        }
        Stmt::While { test, body, orelse } | Stmt::If { test, body, orelse } => {
            transformer.transform_expr(test)?;
            transformer.transform_body(body)?;
            transformer.transform_body(orelse)?;
        }
        Stmt::With { items, body, .. } => {
            for item in items {
                transformer.transform_expr(&mut item.context_expr)?;
                walk_opt_mut(transformer, &mut item.optional_vars)?;
            }
            transformer.transform_body(body)?;
        }
        Stmt::Raise { exc, cause } => {
            walk_opt_mut(transformer, exc)?;
            walk_opt_mut(transformer, cause)?;
        }
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            transformer.transform_body(body)?;
            for handler in handlers {
                walk_opt_mut(transformer, &mut handler.typ)?;
                if let Some(name) = &mut handler.name {
                    transformer.transform_identifier(name, IdentSite::ExceptAlias);
                }
                transformer.transform_body(&mut handler.body)?;
            }
            transformer.transform_body(orelse)?;
            transformer.transform_body(finalbody)?;
        }
        Stmt::Assert { test, msg } => {
            transformer.transform_expr(test)?;
            walk_opt_mut(transformer, msg)?;
        }
        Stmt::Global { names } => {
            for name in names {
                transformer.transform_identifier(name, IdentSite::Global);
            }
        }
        Stmt::Nonlocal { names } => {
            for name in names {
                transformer.transform_identifier(name, IdentSite::Nonlocal);
            }
        }
        Stmt::Expr { value } => transformer.transform_expr(value)?,
        Stmt::Import { .. }
        | Stmt::ImportFrom { .. }
        | Stmt::Pass
        | Stmt::Break
        | Stmt::Continue => {}
    }
    Ok(stmt)
}

fn walk_generators_mut<T: Transformer + ?Sized>(
    transformer: &mut T,
    generators: &mut [Comprehension],
) -> Result<(), TransformError> {
    for generator in generators {
        transformer.transform_expr(&mut generator.iter)?;
        transformer.transform_expr(&mut generator.target)?;
        for cond in &mut generator.ifs {
            transformer.transform_expr(cond)?;
        }
    }
    Ok(())
}

pub fn walk_expr_mut<T: Transformer + ?Sized>(
    transformer: &mut T,
    expr: &mut Expr,
) -> Result<(), TransformError> {
    match expr {
        Expr::BoolOp { values, .. } => {
            for value in values {
                transformer.transform_expr(value)?;
            }
        }
        Expr::NamedExpr { target, value } => {
            transformer.transform_expr(value)?;
            transformer.transform_identifier(target, IdentSite::WalrusTarget);
        }
        Expr::BinOp { left, right, .. } => {
            transformer.transform_expr(left)?;
            transformer.transform_expr(right)?;
        }
        Expr::UnaryOp { operand, .. } => transformer.transform_expr(operand)?,
        Expr::Lambda { params, body } => {
            walk_params_mut(transformer, params)?;
            transformer.transform_expr(body)?;
        }
        Expr::IfExp { test, body, orelse } => {
            transformer.transform_expr(test)?;
            transformer.transform_expr(body)?;
            transformer.transform_expr(orelse)?;
        }
        Expr::Dict { entries } => {
            for entry in entries {
                if let Some(key) = &mut entry.key {
                    transformer.transform_expr(key)?;
                }
                transformer.transform_expr(&mut entry.value)?;
            }
        }
        Expr::Set { elts } | Expr::List { elts } | Expr::Tuple { elts } => {
            for elt in elts {
                transformer.transform_expr(elt)?;
            }
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            walk_generators_mut(transformer, generators)?;
            transformer.transform_expr(elt)?;
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            walk_generators_mut(transformer, generators)?;
            transformer.transform_expr(key)?;
            transformer.transform_expr(value)?;
        }
        Expr::Await { value } | Expr::YieldFrom { value } | Expr::Starred { value } => {
            transformer.transform_expr(value)?
        }
        Expr::Yield { value } => {
            if let Some(value) = value {
                transformer.transform_expr(value)?;
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            transformer.transform_expr(left)?;
            for comparator in comparators {
                transformer.transform_expr(comparator)?;
            }
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            transformer.transform_expr(func)?;
            for arg in args {
                transformer.transform_expr(arg)?;
            }
            for keyword in keywords {
                transformer.transform_expr(&mut keyword.value)?;
            }
        }
        Expr::Attribute { value, .. } => transformer.transform_expr(value)?,
        Expr::Subscript { value, slice } => {
            transformer.transform_expr(value)?;
            transformer.transform_expr(slice)?;
        }
        Expr::Name { id } => transformer.transform_identifier(id, IdentSite::Reference),
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                transformer.transform_expr(part)?;
            }
        }
        Expr::Constant(_) => {}
    }
    Ok(())
}

// =============================================================================
// Name queries
// =============================================================================

/// Names bound by an assignment target (`a`, `a, (b, *c)`); attribute and
/// subscript targets bind nothing.
pub fn bound_names(target: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    collect_bound(target, &mut names);
    names
}

fn collect_bound(target: &Expr, names: &mut Vec<String>) {
    match target {
        Expr::Name { id } => names.push(id.clone()),
        Expr::Tuple { elts } | Expr::List { elts } => {
            for elt in elts {
                collect_bound(elt, names);
            }
        }
        Expr::Starred { value } => collect_bound(value, names),
        _ => {}
    }
}

struct IdentifierCollector {
    names: BTreeSet<String>,
}

impl Visitor for IdentifierCollector {
    fn visit_identifier(&mut self, name: &str, _site: IdentSite) {
        self.names.insert(name.to_string());
    }
}

/// Every identifier occurring in an expression, at any site.
pub fn referenced_names(expr: &Expr) -> BTreeSet<String> {
    let mut collector = IdentifierCollector {
        names: BTreeSet::new(),
    };
    collector.visit_expr(expr);
    collector.names
}

/// Every identifier occurring in a statement list, nested scopes included.
pub fn identifiers_in(body: &[Stmt]) -> BTreeSet<String> {
    let mut collector = IdentifierCollector {
        names: BTreeSet::new(),
    };
    walk_body(&mut collector, body);
    collector.names
}

struct CountingCollector {
    counts: BTreeMap<String, usize>,
}

impl Visitor for CountingCollector {
    fn visit_identifier(&mut self, name: &str, _site: IdentSite) {
        *self.counts.entry(name.to_string()).or_default() += 1;
    }
}

/// Occurrence count of every identifier in a statement list.
pub fn identifier_counts(body: &[Stmt]) -> BTreeMap<String, usize> {
    let mut collector = CountingCollector {
        counts: BTreeMap::new(),
    };
    walk_body(&mut collector, body);
    collector.counts
}

struct BindingFinder<'a> {
    name: &'a str,
    found: bool,
}

impl Visitor for BindingFinder<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Import { names } | Stmt::ImportFrom { names, .. } => {
                self.found |= names.iter().any(|a| a.bound_name() == self.name);
            }
            Stmt::Delete { targets } => {
                self.found |= targets.iter().any(|t| bound_names(t).iter().any(|n| n == self.name));
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_target(&mut self, target: &Expr) {
        self.found |= bound_names(target).iter().any(|n| n == self.name);
        self.visit_expr(target);
    }

    fn visit_identifier(&mut self, name: &str, site: IdentSite) {
        if site != IdentSite::Reference && name == self.name {
            self.found = true;
        }
    }
}

/// True when `name` is bound, declared or deleted anywhere in `body`,
/// nested scopes included.
pub fn binds_name(body: &[Stmt], name: &str) -> bool {
    let mut finder = BindingFinder { name, found: false };
    walk_body(&mut finder, body);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyast::parse_module;

    #[test]
    fn test_binds_name_and_counts() {
        let module = parse_module("for i in range(3):\n    total += i\nimport os as range\n").unwrap();
        assert!(binds_name(&module.body, "total"));
        assert!(binds_name(&module.body, "range"));
        assert!(!binds_name(&module.body, "os"));
        assert_eq!(identifier_counts(&module.body).get("i"), Some(&2));
    }

    struct SiteRecorder(Vec<(String, IdentSite)>);

    impl Visitor for SiteRecorder {
        fn visit_identifier(&mut self, name: &str, site: IdentSite) {
            self.0.push((name.to_string(), site));
        }
    }

    #[test]
    fn test_identifier_sites() {
        let module = parse_module(
            "def f(a, *b, c=1):\n    global g\n    try:\n        pass\n    except E as err:\n        h = (w := a)\n",
        )
        .unwrap();
        let mut recorder = SiteRecorder(Vec::new());
        walk_body(&mut recorder, &module.body);
        let sites: Vec<_> = recorder.0.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        assert!(sites.contains(&("f", IdentSite::FunctionName)));
        assert!(sites.contains(&("b", IdentSite::Parameter)));
        assert!(sites.contains(&("g", IdentSite::Global)));
        assert!(sites.contains(&("err", IdentSite::ExceptAlias)));
        assert!(sites.contains(&("w", IdentSite::WalrusTarget)));
        assert!(sites.contains(&("E", IdentSite::Reference)));
    }

    struct Upper;

    impl Transformer for Upper {
        fn transform_identifier(&mut self, name: &mut String, _site: IdentSite) {
            *name = name.to_uppercase();
        }

        fn transform_stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>, TransformError> {
            match stmt {
                Stmt::Pass => Ok(Vec::new()),
                other => Ok(vec![walk_stmt_mut(self, other)?]),
            }
        }
    }

    #[test]
    fn test_transformer_rewrites_and_drops() {
        let mut module = parse_module("x = y.attr\npass\nf(k=v)\n").unwrap();
        transform_module(&mut Upper, &mut module).unwrap();
        assert_eq!(crate::pyast::unparse(&module), "X = Y.attr\nF(k=V)\n");
    }

    #[test]
    fn test_bound_names() {
        let module = parse_module("a, (b, *c), d.e, f[0] = x\n").unwrap();
        let Stmt::Assign { targets, .. } = &module.body[0] else {
            panic!("expected assign");
        };
        assert_eq!(bound_names(&targets[0]), vec!["a", "b", "c"]);
    }
}
