//! Consistent identifier renaming.
//!
//! Collection only considers names *bound* in the file (assignment, loop,
//! `with`, `except`, comprehension and walrus targets, parameters, def and
//! class names). A name is left alone when renaming it could change which
//! object some reference resolves to: builtins, dunders, `_private` names,
//! UPPER_CASE constants, import-bound names, class attributes, call keyword
//! names, names mentioned in string literals or f-strings, and any name the
//! caller marks as protected (e.g. imported by another module). Files that
//! call `eval`/`exec`/`locals`/`globals`/`vars` are not renamed at all.

use super::{MutationConfig, MutationStage, StageContext};
use crate::errors::TransformError;
use crate::pyast::builtins::is_builtin;
use crate::pyast::visit::{
    bound_names, identifiers_in, transform_module, walk_expr, walk_stmt, IdentSite, Transformer,
    Visitor,
};
use crate::pyast::{is_keyword, Constant, Expr, Module, Stmt};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const DYNAMIC_SCOPE_CALLS: &[&str] = &["eval", "exec", "locals", "globals", "vars"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Variable,
    Function,
    Class,
}

impl IdentifierKind {
    fn tag(self) -> &'static str {
        match self {
            IdentifierKind::Variable => "var",
            IdentifierKind::Function => "func",
            IdentifierKind::Class => "class",
        }
    }
}

/// Renameable names bound in one file, bucketed by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifiers {
    pub variables: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub classes: BTreeSet<String>,
}

impl Identifiers {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.functions.is_empty() && self.classes.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Module,
    Function,
    Class,
}

struct BindingCollector {
    scopes: Vec<Scope>,
    found: Identifiers,
    excluded: BTreeSet<String>,
    dynamic: bool,
}

impl BindingCollector {
    fn in_class(&self) -> bool {
        self.scopes.last() == Some(&Scope::Class)
    }

    fn bind_variable(&mut self, name: &str) {
        if self.in_class() {
            self.excluded.insert(name.to_string());
        } else {
            self.found.variables.insert(name.to_string());
        }
    }
}

impl Visitor for BindingCollector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => {
                if self.in_class() {
                    self.excluded.insert(def.name.clone());
                } else if !def.name.starts_with("__") {
                    self.found.functions.insert(def.name.clone());
                }
                self.scopes.push(Scope::Function);
                walk_stmt(self, stmt);
                self.scopes.pop();
            }
            Stmt::ClassDef(class) => {
                if self.in_class() {
                    self.excluded.insert(class.name.clone());
                } else {
                    self.found.classes.insert(class.name.clone());
                }
                self.scopes.push(Scope::Class);
                walk_stmt(self, stmt);
                self.scopes.pop();
            }
            Stmt::Import { names } | Stmt::ImportFrom { names, .. } => {
                for alias in names {
                    self.excluded.insert(alias.bound_name().to_string());
                }
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_target(&mut self, target: &Expr) {
        for name in bound_names(target) {
            self.bind_variable(&name);
        }
        self.visit_expr(target);
    }

    fn visit_identifier(&mut self, name: &str, site: IdentSite) {
        match site {
            IdentSite::Parameter | IdentSite::ExceptAlias | IdentSite::WalrusTarget => {
                self.bind_variable(name)
            }
            IdentSite::Reference if DYNAMIC_SCOPE_CALLS.contains(&name) => self.dynamic = true,
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Call { keywords, .. } => {
                for keyword in keywords {
                    if let Some(arg) = &keyword.arg {
                        self.excluded.insert(arg.clone());
                    }
                }
            }
            Expr::Constant(Constant::Str(literal)) => {
                let content = literal.content();
                if literal.is_fstring() {
                    self.excluded.extend(words(&content));
                } else if is_identifier(&content) {
                    self.excluded.insert(content);
                }
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| is_identifier(w))
        .map(str::to_string)
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn is_upper_constant(name: &str) -> bool {
    name.chars().any(char::is_alphabetic) && !name.chars().any(char::is_lowercase)
}

fn is_eligible(name: &str) -> bool {
    !(is_builtin(name)
        || is_keyword(name)
        || name.starts_with('_')
        || is_upper_constant(name))
}

/// Collect renameable identifiers, skipping everything in `protected`.
pub fn collect_identifiers(module: &Module, protected: &BTreeSet<String>) -> Identifiers {
    let mut collector = BindingCollector {
        scopes: vec![Scope::Module],
        found: Identifiers::default(),
        excluded: BTreeSet::new(),
        dynamic: false,
    };
    for stmt in &module.body {
        collector.visit_stmt(stmt);
    }
    if collector.dynamic {
        return Identifiers::default();
    }

    let BindingCollector {
        found, excluded, ..
    } = collector;
    let keep = |name: &String| is_eligible(name) && !excluded.contains(name) && !protected.contains(name);

    let classes: BTreeSet<String> = found.classes.into_iter().filter(keep).collect();
    let functions: BTreeSet<String> = found
        .functions
        .into_iter()
        .filter(|n| keep(n) && !classes.contains(n))
        .collect();
    let variables = found
        .variables
        .into_iter()
        .filter(|n| keep(n) && !classes.contains(n) && !functions.contains(n))
        .collect();
    Identifiers {
        variables,
        functions,
        classes,
    }
}

// =============================================================================
// Rename map
// =============================================================================

/// Original name to new name, per kind. Always a bijection: no two originals
/// share a target and no target equals a name already present in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameMap {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub functions: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
}

impl RenameMap {
    pub fn bucket(&self, kind: IdentifierKind) -> &BTreeMap<String, String> {
        match kind {
            IdentifierKind::Variable => &self.variables,
            IdentifierKind::Function => &self.functions,
            IdentifierKind::Class => &self.classes,
        }
    }

    fn bucket_mut(&mut self, kind: IdentifierKind) -> &mut BTreeMap<String, String> {
        match kind {
            IdentifierKind::Variable => &mut self.variables,
            IdentifierKind::Function => &mut self.functions,
            IdentifierKind::Class => &mut self.classes,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables
            .get(name)
            .or_else(|| self.functions.get(name))
            .or_else(|| self.classes.get(name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len() + self.functions.len() + self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.variables
            .iter()
            .chain(self.functions.iter())
            .chain(self.classes.iter())
    }

    pub fn is_bijective(&self) -> bool {
        let targets: BTreeSet<&String> = self.iter().map(|(_, to)| to).collect();
        targets.len() == self.len() && self.iter().all(|(from, _)| !targets.contains(from))
    }

    /// Generate renames for `identifiers`; `taken` holds every name already
    /// used in the file.
    pub fn generate(
        identifiers: &Identifiers,
        config: &MutationConfig,
        taken: &BTreeSet<String>,
        rng: &mut StdRng,
    ) -> Self {
        let mut map = RenameMap::default();
        let mut used: BTreeSet<String> = taken.clone();
        let rate = config.rate();
        let buckets = [
            (IdentifierKind::Variable, config.rename_variables, &identifiers.variables),
            (IdentifierKind::Function, config.rename_functions, &identifiers.functions),
            (IdentifierKind::Class, config.rename_classes, &identifiers.classes),
        ];
        for (kind, enabled, names) in buckets {
            if !enabled {
                continue;
            }
            for name in names {
                if !rng.gen_bool(rate) {
                    continue;
                }
                let candidate = if config.preserve_functionality {
                    styled_name(name, kind)
                } else {
                    random_name(kind, rng)
                };
                let target = disambiguate(candidate, &used);
                used.insert(target.clone());
                map.bucket_mut(kind).insert(name.clone(), target);
            }
        }
        map
    }

    /// Merge another file's map, keeping only names renamed identically
    /// everywhere they were renamed.
    pub fn merge_consistent(maps: &[RenameMap]) -> RenameMap {
        let mut merged = RenameMap::default();
        for kind in [
            IdentifierKind::Variable,
            IdentifierKind::Function,
            IdentifierKind::Class,
        ] {
            let mut seen: BTreeMap<&String, Option<&String>> = BTreeMap::new();
            for map in maps {
                for (from, to) in map.bucket(kind) {
                    seen.entry(from)
                        .and_modify(|existing| {
                            if *existing != Some(to) {
                                *existing = None;
                            }
                        })
                        .or_insert(Some(to));
                }
            }
            let bucket = merged.bucket_mut(kind);
            for (from, to) in seen {
                if let Some(to) = to {
                    bucket.insert(from.clone(), to.clone());
                }
            }
        }
        merged
    }
}

/// Tag the name while keeping its casing convention.
fn styled_name(name: &str, kind: IdentifierKind) -> String {
    let tag = kind.tag();
    let has_upper = name.chars().any(char::is_uppercase);
    if name.contains('_') || !has_upper {
        format!("{tag}_{name}")
    } else if name.starts_with(char::is_uppercase) {
        format!("{}{name}", capitalize(tag))
    } else {
        format!("{tag}{}", capitalize(name))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn random_name(kind: IdentifierKind, rng: &mut StdRng) -> String {
    let suffix: String = (0..6).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
    format!("{}_{suffix}", kind.tag())
}

fn disambiguate(candidate: String, used: &BTreeSet<String>) -> String {
    if !used.contains(&candidate) {
        return candidate;
    }
    let sep = if candidate.contains('_') { "_" } else { "" };
    (2u32..)
        .map(|n| format!("{candidate}{sep}{n}"))
        .find(|name| !used.contains(name))
        .unwrap_or(candidate)
}

// =============================================================================
// Application
// =============================================================================

struct Renamer<'a> {
    map: &'a RenameMap,
    renamed: usize,
}

impl Transformer for Renamer<'_> {
    fn transform_identifier(&mut self, name: &mut String, _site: IdentSite) {
        if let Some(new_name) = self.map.get(name) {
            *name = new_name.to_string();
            self.renamed += 1;
        }
    }
}

/// Apply `map` to every identifier site; returns the number of occurrences rewritten.
pub fn apply_renames(module: &mut Module, map: &RenameMap) -> Result<usize, TransformError> {
    let mut renamer = Renamer { map, renamed: 0 };
    transform_module(&mut renamer, module)?;
    Ok(renamer.renamed)
}

pub struct RenameStage<'a> {
    pub config: MutationConfig,
    pub protected: &'a BTreeSet<String>,
}

impl MutationStage for RenameStage<'_> {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
        let identifiers = collect_identifiers(module, self.protected);
        if identifiers.is_empty() {
            return Ok(0);
        }
        let mut taken = identifiers_in(&module.body);
        taken.extend(self.protected.iter().cloned());
        let map = RenameMap::generate(&identifiers, &self.config, &taken, ctx.rng);
        if map.is_empty() {
            return Ok(0);
        }
        if !map.is_bijective() {
            return Err(TransformError::Invariant {
                stage: "rename",
                detail: "generated rename map is not a bijection".into(),
            });
        }
        apply_renames(module, &map)?;
        let renamed = map.len();
        ctx.renames = map;
        Ok(renamed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyast::{parse_module, unparse};
    use rand::SeedableRng;

    fn collect(source: &str) -> Identifiers {
        collect_identifiers(&parse_module(source).unwrap(), &BTreeSet::new())
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_collection_buckets_and_exclusions() {
        let ids = collect(
            r#"
import os
from typing import List as L
MAX_SIZE = 10
_hidden = 1
total = 0

class Widget:
    size = 3
    def render(self, scale):
        return self.size * scale

def build(count, *rest, **opts):
    items = [x for x in rest]
    return Widget(size=count)

def __private__():
    pass

label = f"{total}"
key = "count"
"#,
        );
        assert_eq!(ids.classes, set(&["Widget"]));
        assert_eq!(ids.functions, set(&["build"]));
        // `total` appears in an f-string, `count` as a string literal,
        // `size` as a class attribute and keyword.
        assert_eq!(
            ids.variables,
            set(&["items", "key", "label", "opts", "rest", "scale", "x"])
        );
    }

    #[test]
    fn test_dynamic_scope_disables_renaming() {
        let ids = collect("def f(a):\n    return locals()\n");
        assert!(ids.is_empty());
    }

    #[test]
    fn test_protected_names_are_skipped() {
        let module = parse_module("def helper(a):\n    return a\n").unwrap();
        let ids = collect_identifiers(&module, &set(&["helper"]));
        assert!(ids.functions.is_empty());
        assert_eq!(ids.variables, set(&["a"]));
    }

    #[test]
    fn test_styled_names() {
        assert_eq!(styled_name("a", IdentifierKind::Variable), "var_a");
        assert_eq!(styled_name("my_value", IdentifierKind::Variable), "var_my_value");
        assert_eq!(styled_name("myValue", IdentifierKind::Variable), "varMyValue");
        assert_eq!(styled_name("Foo", IdentifierKind::Class), "ClassFoo");
        assert_eq!(styled_name("Foo", IdentifierKind::Variable), "VarFoo");
        assert_eq!(styled_name("add", IdentifierKind::Function), "func_add");
    }

    #[test]
    fn test_add_scenario_renames_parameters_consistently() {
        let mut module = parse_module("def add(a, b): return a + b\n").unwrap();
        let config = MutationConfig {
            rename_functions: false,
            rename_classes: false,
            ..MutationConfig::default().with_rate(1.0)
        };
        let protected = BTreeSet::new();
        let stage = RenameStage {
            config,
            protected: &protected,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = StageContext::new(&mut rng);
        assert_eq!(stage.apply(&mut module, &mut ctx).unwrap(), 2);
        assert_eq!(
            unparse(&module),
            "def add(var_a, var_b):\n    return var_a + var_b\n"
        );
        assert_eq!(ctx.renames.get("a"), Some("var_a"));
    }

    #[test]
    fn test_collisions_get_numeric_suffix() {
        let ids = collect("var_a = 1\na = var_a\n");
        let taken = set(&["var_a", "a"]);
        let mut rng = StdRng::seed_from_u64(3);
        let map = RenameMap::generate(&ids, &MutationConfig::default().with_rate(1.0), &taken, &mut rng);
        assert_eq!(map.get("a"), Some("var_a_2"));
        assert!(map.is_bijective());
    }

    #[test]
    fn test_random_names_when_not_preserving() {
        let ids = collect("alpha = 1\nbeta = 2\n");
        let config = MutationConfig {
            preserve_functionality: false,
            ..MutationConfig::default().with_rate(1.0)
        };
        let mut rng = StdRng::seed_from_u64(9);
        let map = RenameMap::generate(&ids, &config, &set(&["alpha", "beta"]), &mut rng);
        assert_eq!(map.len(), 2);
        for (_, to) in map.iter() {
            assert!(to.starts_with("var_"));
            assert_eq!(to.len(), "var_".len() + 6);
        }
        assert!(map.is_bijective());
    }

    #[test]
    fn test_merge_drops_conflicting_entries() {
        let mut first = RenameMap::default();
        first.functions.insert("load".into(), "func_load".into());
        first.variables.insert("data".into(), "var_data".into());
        let mut second = RenameMap::default();
        second.functions.insert("load".into(), "func_load".into());
        second.variables.insert("data".into(), "var_data_2".into());
        let merged = RenameMap::merge_consistent(&[first, second]);
        assert_eq!(merged.get("load"), Some("func_load"));
        assert_eq!(merged.get("data"), None);
    }
}
