//! Patch mutation operators.
//!
//! When the input looks like a unified diff only the content of added lines
//! (after the `+` marker) is mutated; hunk headers, context and removed lines
//! are left alone. Plain code is mutated anywhere.

use super::{Mutation, MutationKind};
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

/// Each catalog entry rewrites at most this many sites.
pub const MAX_SITES_PER_OPERATOR: usize = 2;

const OPERATOR_CATALOG: &[(&str, &str)] = &[
    ("+", "-"),
    ("-", "+"),
    ("*", "/"),
    ("/", "*"),
    ("//", "/"),
    ("%", "//"),
    ("**", "*"),
    ("==", "!="),
    ("!=", "=="),
    ("<", "<="),
    (">", ">="),
    ("<=", "<"),
    (">=", ">"),
    ("and", "or"),
    ("or", "and"),
    ("+=", "-="),
    ("-=", "+="),
    ("*=", "/="),
    ("/=", "*="),
];

const COMPARISON_NEIGHBORS: &str = "<>=!";
const ARITHMETIC_CHARS: &str = "+-*/%";
/// After these a `*` or `**` unpacks or marks a variadic parameter.
const STAR_PREFIX_CHARS: &str = "(,=[{:";
const STAR_PREFIX_KEYWORDS: &[&str] = &[
    "import", "return", "yield", "in", "lambda", "else", "not", "and", "or", "is", "if", "await", "del", "assert",
];

// =============================================================================
// Patch text
// =============================================================================

/// A patch with the byte ranges that operators may rewrite.
#[derive(Debug, Clone)]
pub struct PatchText<'a> {
    text: &'a str,
    editable: Vec<Range<usize>>,
    is_diff: bool,
}

impl<'a> PatchText<'a> {
    pub fn new(text: &'a str) -> Self {
        let has_headers = text
            .lines()
            .any(|l| l.starts_with("@@") || l.starts_with("diff --git") || l.starts_with("+++ "));
        // A bare run of `+` lines is an added-lines excerpt, not code.
        let only_added = text.lines().any(|l| !l.trim().is_empty())
            && text.lines().filter(|l| !l.trim().is_empty()).all(|l| l.starts_with('+'));
        let is_diff = has_headers || only_added;
        let editable = if is_diff {
            added_line_ranges(text)
                .into_iter()
                .map(|line| line.start + 1..line.end)
                .collect()
        } else {
            vec![0..text.len()]
        };
        Self {
            text,
            editable,
            is_diff,
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn is_diff(&self) -> bool {
        self.is_diff
    }

    fn is_editable(&self, range: &Range<usize>) -> bool {
        self.editable
            .iter()
            .any(|span| span.start <= range.start && range.end <= span.end)
    }

    /// True when only indentation precedes `pos` in its editable line.
    fn starts_line(&self, pos: usize) -> bool {
        let line_start = self
            .editable
            .iter()
            .filter(|span| span.start <= pos && pos <= span.end)
            .map(|span| span.start)
            .max()
            .unwrap_or(0);
        let line_start = line_start.max(self.text[..pos].rfind('\n').map_or(0, |nl| nl + 1));
        self.text[line_start..pos].chars().all(|c| c == ' ' || c == '\t')
    }

    /// The editable code, joined by line and with common indentation removed.
    pub fn editable_source(&self) -> String {
        let lines: Vec<&str> = self
            .editable
            .iter()
            .flat_map(|span| self.text[span.clone()].lines())
            .collect();
        let indent = lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
            .min()
            .unwrap_or(0);
        let mut out = String::new();
        for line in lines {
            out.push_str(line.get(indent..).unwrap_or_else(|| line.trim_start()));
            out.push('\n');
        }
        out
    }

    /// `line N:C`, both 1-based.
    fn location(&self, pos: usize) -> String {
        let before = &self.text[..pos];
        let line = before.matches('\n').count() + 1;
        let col = before.rfind('\n').map_or(pos, |nl| pos - nl - 1) + 1;
        format!("line {line}:{col}")
    }

    fn splice(&self, range: Range<usize>, replacement: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + replacement.len());
        out.push_str(&self.text[..range.start]);
        out.push_str(replacement);
        out.push_str(&self.text[range.end..]);
        out
    }

    fn mutant(&self, name: String, kind: MutationKind, range: Range<usize>, replacement: &str) -> Mutation {
        Mutation {
            name,
            original: self.text[range.clone()].to_string(),
            location: self.location(range.start),
            mutated: self.splice(range, replacement),
            mutation_type: kind,
        }
    }
}

/// Byte ranges of `+` lines (not `+++` headers), without the line break.
fn added_line_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content.starts_with('+') && !content.starts_with("+++") {
            ranges.push(start..start + content.len());
        }
        start += line.len();
    }
    ranges
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

// =============================================================================
// Operators
// =============================================================================

pub trait PatchOperator: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> MutationKind;
    /// Mutants of `patch`, in discovery order, at most `limit` of them.
    fn generate(&self, patch: &PatchText<'_>, limit: usize) -> Vec<Mutation>;
}

#[derive(Debug)]
struct OperatorSwap;

impl OperatorSwap {
    fn site_ok(patch: &PatchText<'_>, range: &Range<usize>, op: &str) -> bool {
        let text = patch.text();
        if (op == "*" || op == "**") && Self::is_star_prefix(patch, range.start) {
            return false;
        }
        let prev = text[..range.start].chars().next_back();
        let next = text[range.end..].chars().next();
        if prev.is_some_and(|c| COMPARISON_NEIGHBORS.contains(c))
            || next.is_some_and(|c| "<>=".contains(c))
        {
            return false;
        }
        let arithmetic = op.starts_with(|c: char| ARITHMETIC_CHARS.contains(c));
        !(arithmetic
            && (prev.is_some_and(|c| ARITHMETIC_CHARS.contains(c))
                || next.is_some_and(|c| ARITHMETIC_CHARS.contains(c))))
    }

    /// `*args`, `**kwargs`, `f(*xs)`, `from m import *` and friends.
    fn is_star_prefix(patch: &PatchText<'_>, pos: usize) -> bool {
        if patch.starts_line(pos) {
            return true;
        }
        let before = patch.text()[..pos].trim_end_matches([' ', '\t']);
        match before.chars().next_back() {
            None => true,
            Some(c) if STAR_PREFIX_CHARS.contains(c) => true,
            Some(c) if c.is_ascii_alphabetic() => {
                let word_start = before
                    .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .map_or(0, |i| i + 1);
                STAR_PREFIX_KEYWORDS.contains(&&before[word_start..])
            }
            Some(_) => false,
        }
    }

    fn sites(patch: &PatchText<'_>, op: &str) -> Vec<Range<usize>> {
        let text = patch.text();
        let candidates: Vec<Range<usize>> = if op.chars().all(|c| c.is_ascii_alphabetic()) {
            match Regex::new(&format!(r"\b{}\b", regex::escape(op))) {
                Ok(re) => re.find_iter(text).map(|m| m.range()).collect(),
                Err(_) => Vec::new(),
            }
        } else {
            text.match_indices(op)
                .map(|(start, _)| start..start + op.len())
                .filter(|range| Self::site_ok(patch, range, op))
                .collect()
        };
        candidates
            .into_iter()
            .filter(|range| patch.is_editable(range))
            .take(MAX_SITES_PER_OPERATOR)
            .collect()
    }
}

impl PatchOperator for OperatorSwap {
    fn name(&self) -> &'static str {
        "operator_swap"
    }

    fn kind(&self) -> MutationKind {
        MutationKind::Operator
    }

    fn generate(&self, patch: &PatchText<'_>, limit: usize) -> Vec<Mutation> {
        let mut out = Vec::new();
        'catalog: for (op, replacement) in OPERATOR_CATALOG {
            for range in Self::sites(patch, op) {
                if out.len() >= limit {
                    break 'catalog;
                }
                let name = format!("op_{op}_to_{replacement}_{}", range.start);
                out.push(patch.mutant(name, self.kind(), range, replacement));
            }
        }
        out
    }
}

#[derive(Debug)]
struct Negation;

fn negation_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        compile(&[
            r"\bif\s+(\w+)",
            r"\bif\s+not\s+(\w+)",
            r"\bwhile\s+(\w+)",
            r"\breturn\s+True\b",
            r"\breturn\s+False\b",
        ])
    })
}

impl PatchOperator for Negation {
    fn name(&self) -> &'static str {
        "negation"
    }

    fn kind(&self) -> MutationKind {
        MutationKind::Negation
    }

    fn generate(&self, patch: &PatchText<'_>, limit: usize) -> Vec<Mutation> {
        let mut out = Vec::new();
        for (index, re) in negation_patterns().iter().enumerate() {
            if out.len() >= limit {
                break;
            }
            let site = re.captures_iter(patch.text()).find_map(|caps| {
                let whole = caps.get(0)?;
                let operand = caps.get(1).map(|m| m.as_str());
                // `if not x` belongs to the second pattern; `if x` never turns
                // into `if not not x`.
                if matches!(index, 0 | 2) && operand == Some("not") {
                    return None;
                }
                let range = whole.range();
                patch.is_editable(&range).then(|| (range, operand.map(str::to_string)))
            });
            let Some((range, operand)) = site else {
                continue;
            };
            let replacement = match (index, operand) {
                (0, Some(x)) => format!("if not {x}"),
                (1, Some(x)) => format!("if {x}"),
                (2, Some(x)) => format!("while not {x}"),
                (3, _) => "return False".to_string(),
                _ => "return True".to_string(),
            };
            let name = format!("negate_{}", patch.text()[range.clone()].replace(char::is_whitespace, "_"));
            out.push(patch.mutant(name, self.kind(), range, &replacement));
        }
        out
    }
}

#[derive(Debug)]
struct Removal;

fn removal_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\+(\s*)(return\b.*|raise\b.*|assert\b.*|break|continue)\s*$").ok())
        .as_ref()
}

impl PatchOperator for Removal {
    fn name(&self) -> &'static str {
        "statement_removal"
    }

    fn kind(&self) -> MutationKind {
        MutationKind::Removal
    }

    fn generate(&self, patch: &PatchText<'_>, limit: usize) -> Vec<Mutation> {
        let Some(re) = removal_pattern() else {
            return Vec::new();
        };
        let text = patch.text();
        let mut seen_keywords = HashSet::new();
        let mut out = Vec::new();
        for line in added_line_ranges(text) {
            if out.len() >= limit {
                break;
            }
            let Some(caps) = re.captures(&text[line.clone()]) else {
                continue;
            };
            let Some(statement) = caps.get(2) else {
                continue;
            };
            let keyword = statement.as_str().split_whitespace().next().unwrap_or_default();
            // One mutant per statement keyword.
            if !seen_keywords.insert(keyword.to_string()) {
                continue;
            }
            let range = line.start + statement.start()..line.start + statement.end();
            let name = format!("remove_{keyword}_{}", line.start);
            let mut mutation = patch.mutant(name, self.kind(), range, "pass");
            mutation.original = statement.as_str().trim_end().to_string();
            out.push(mutation);
        }
        out
    }
}

#[derive(Debug)]
struct Boundary;

fn boundary_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| compile(&[r"\b\d+\b", r"(<=|>=|<|>)(\s*)(\d+)\b"]))
}

impl Boundary {
    fn first_literal(patch: &PatchText<'_>) -> Option<(Range<usize>, u64)> {
        let re = boundary_patterns().first()?;
        re.find_iter(patch.text()).find_map(|m| {
            let range = m.range();
            let preceded_by_dot = patch.text()[..range.start].ends_with('.');
            if preceded_by_dot || !patch.is_editable(&range) {
                return None;
            }
            m.as_str().parse::<u64>().ok().map(|value| (range, value))
        })
    }

    /// First editable `op n` site for each comparison operator.
    fn comparison_sites(patch: &PatchText<'_>) -> Vec<(Range<usize>, &'static str, String)> {
        let Some(re) = boundary_patterns().get(1) else {
            return Vec::new();
        };
        let text = patch.text();
        let mut seen = HashSet::new();
        let mut sites = Vec::new();
        for caps in re.captures_iter(text) {
            let (Some(op), Some(gap), Some(number)) = (caps.get(1), caps.get(2), caps.get(3)) else {
                continue;
            };
            let prev = text[..op.start()].chars().next_back();
            if prev.is_some_and(|c| COMPARISON_NEIGHBORS.contains(c) || c == '-') {
                continue;
            }
            let range = op.start()..number.end();
            if !patch.is_editable(&range) || !seen.insert(op.as_str().to_string()) {
                continue;
            }
            let flipped = match op.as_str() {
                "<" => "<=",
                "<=" => "<",
                ">" => ">=",
                _ => ">",
            };
            sites.push((range, flipped, format!("{flipped}{}{}", gap.as_str(), number.as_str())));
        }
        sites
    }
}

impl PatchOperator for Boundary {
    fn name(&self) -> &'static str {
        "boundary"
    }

    fn kind(&self) -> MutationKind {
        MutationKind::Boundary
    }

    fn generate(&self, patch: &PatchText<'_>, limit: usize) -> Vec<Mutation> {
        let mut out = Vec::new();
        if let Some((range, value)) = Self::first_literal(patch) {
            let shifted = [value.checked_add(1), value.checked_sub(1)];
            for (suffix, replacement) in ["plus_one", "minus_one"].into_iter().zip(shifted) {
                if let Some(replacement) = replacement {
                    let name = format!("boundary_{value}_{suffix}");
                    out.push(patch.mutant(name, self.kind(), range.clone(), &replacement.to_string()));
                }
            }
        }
        for (range, flipped, replacement) in Self::comparison_sites(patch) {
            let name = format!("boundary_to_{flipped}_{}", range.start);
            out.push(patch.mutant(name, self.kind(), range, &replacement));
        }
        out.truncate(limit);
        out
    }
}

static OPERATOR_SWAP: OperatorSwap = OperatorSwap;
static NEGATION: Negation = Negation;
static REMOVAL: Removal = Removal;
static BOUNDARY: Boundary = Boundary;

/// Every operator, in the order mutants are generated.
pub fn patch_operator_registry() -> Vec<&'static dyn PatchOperator> {
    vec![&OPERATOR_SWAP, &NEGATION, &REMOVAL, &BOUNDARY]
}

/// Operators by name, deduplicated; unknown names are ignored and an empty
/// selection falls back to the full registry.
pub fn select_patch_operators(names: &[String]) -> Vec<&'static dyn PatchOperator> {
    let registry = patch_operator_registry();
    let mut selected = Vec::new();
    let mut seen = HashSet::new();
    for name in names {
        if let Some(operator) = registry.iter().find(|op| op.name() == name.as_str()) {
            if seen.insert(operator.name()) {
                selected.push(*operator);
            }
        }
    }
    if selected.is_empty() {
        return registry;
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(op: &dyn PatchOperator, text: &str) -> Vec<Mutation> {
        op.generate(&PatchText::new(text), usize::MAX)
    }

    #[test]
    fn test_equality_swap() {
        let mutants = run(&OPERATOR_SWAP, "if x == 5:\n    pass\n");
        let eq: Vec<_> = mutants.iter().filter(|m| m.original == "==").collect();
        assert_eq!(eq.len(), 1);
        assert!(eq[0].mutated.contains("if x != 5:"));
        assert_eq!(eq[0].location, "line 1:6");
    }

    #[test]
    fn test_longer_operators_are_not_split() {
        let mutants = run(&OPERATOR_SWAP, "y = a ** b\nz //= 2\nw <= 3\n");
        let originals: Vec<&str> = mutants.iter().map(|m| m.original.as_str()).collect();
        assert_eq!(originals, vec!["**", "<="]);
        assert!(mutants[0].mutated.starts_with("y = a * b\n"));
    }

    #[test]
    fn test_at_most_two_sites_per_operator() {
        let mutants = run(&OPERATOR_SWAP, "a + b + c + d\n");
        assert_eq!(mutants.len(), 2);
        assert_eq!(mutants[1].mutated, "a + b - c + d\n");
    }

    #[test]
    fn test_star_unpacking_is_not_an_operator() {
        let mutants = run(&OPERATOR_SWAP, "+def f(*args, **kw):\n+    return g(*args) * 2 + h(**kw)\n");
        let originals: Vec<&str> = mutants.iter().map(|m| m.original.as_str()).collect();
        assert_eq!(originals, vec!["+", "*"]);
        assert!(mutants[1].mutated.contains("return g(*args) / 2"));
        assert!(mutants.iter().all(|m| m.mutated.starts_with("+def f(*args, **kw):\n")));

        assert!(run(&OPERATOR_SWAP, "from m import *\nxs = [*a, *b]\n").is_empty());
    }

    #[test]
    fn test_editable_source_strips_markers_and_indent() {
        let patch = PatchText::new("@@ -1 +1,2 @@\n context\n+    x = 1\n+    if x:\n+        y = 2\n");
        assert_eq!(patch.editable_source(), "x = 1\nif x:\n    y = 2\n");
        assert!(PatchText::new("+a = 1\n+b = 2\n").is_diff());
    }

    #[test]
    fn test_word_operators_need_boundaries() {
        let mutants = run(&OPERATOR_SWAP, "ok = ready and order\n");
        assert_eq!(mutants.len(), 1);
        assert_eq!(mutants[0].mutated, "ok = ready or order\n");
    }

    #[test]
    fn test_diff_headers_and_context_are_left_alone() {
        let patch = "--- a/m.py\n+++ b/m.py\n@@ -1,2 +1,2 @@\n x = 1 + 2\n-y = a - b\n+y = a * b\n";
        let mutants = run(&OPERATOR_SWAP, patch);
        assert_eq!(mutants.len(), 1);
        assert_eq!(mutants[0].original, "*");
        assert!(mutants[0].mutated.ends_with("+y = a / b\n"));
    }

    #[test]
    fn test_negations() {
        let text = "+    if ready:\n+        return True\n+    while busy:\n+        if not done:\n+            pass\n";
        let mutants = run(&NEGATION, text);
        let mutated: Vec<&str> = mutants.iter().map(|m| m.original.as_str()).collect();
        assert_eq!(mutated, vec!["if ready", "if not done", "while busy", "return True"]);
        assert!(mutants[0].mutated.contains("if not ready:"));
        assert!(mutants[1].mutated.contains("        if done:"));
        assert!(mutants[3].mutated.contains("return False"));
    }

    #[test]
    fn test_removal_keeps_indentation() {
        let text = "@@ -1 +1,3 @@\n+def f(x):\n+    assert x\n+    return x\n";
        let mutants = run(&REMOVAL, text);
        assert_eq!(mutants.len(), 2);
        assert_eq!(mutants[0].original, "assert x");
        assert!(mutants[0].mutated.contains("+    pass\n+    return x\n"));
        assert_eq!(mutants[1].original, "return x");
    }

    #[test]
    fn test_boundaries() {
        let mutants = run(&BOUNDARY, "if n < 10 and m >= 3:\n    k = 1.5\n");
        let mutated: Vec<&str> = mutants.iter().map(|m| m.mutated.as_str()).collect();
        assert_eq!(mutated[0], "if n < 11 and m >= 3:\n    k = 1.5\n");
        assert_eq!(mutated[1], "if n < 9 and m >= 3:\n    k = 1.5\n");
        assert_eq!(mutated[2], "if n <= 10 and m >= 3:\n    k = 1.5\n");
        assert_eq!(mutated[3], "if n < 10 and m > 3:\n    k = 1.5\n");
    }

    #[test]
    fn test_select_operators() {
        let picked = select_patch_operators(&["negation".into(), "negation".into(), "nope".into()]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "negation");
        assert_eq!(select_patch_operators(&[]).len(), 4);
    }
}
