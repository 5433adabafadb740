//! Fuzz case construction and heuristic evaluation.

use super::report::{CaseVerdict, FuzzResult, FuzzStatistics, FuzzTestCase};
use super::signature::{extract_function_signatures, FunctionSignature};
use super::value_gen::{FuzzValue, ValueGenerator};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::debug;

const DEFENSIVE_PATTERNS: &[&str] = &[
    r"if\s+\w+\s+is\s+None",
    r"if\s+not\s+\w+",
    r"if\s+len\(\w+\)\s*[<>=]",
    r"try\s*:",
    r"except\s+",
    r"isinstance\(",
    r"hasattr\(",
    r"\.get\(",
    r#"or\s+\[\]"#,
    r#"or\s+\{\}"#,
    r#"or\s+"""#,
    r"or\s+0",
];

const KEYWORD_PATTERNS: &[&str] = &[
    r"\b(null|none|empty|zero|negative|overflow|underflow)\b",
    r"\b(crash|error|exception|fail|break|invalid)\b",
    r"\b(boundary|edge|corner|limit|max|min)\b",
];

/// Problem-statement keywords that make an edge-case pattern relevant.
const EDGE_CASE_TRIGGERS: &[(&str, &[&str])] = &[
    ("empty_input", &["null", "none", "empty"]),
    ("zero_value", &["zero", "boundary", "edge", "corner"]),
    ("negative", &["negative", "underflow", "min"]),
    ("large_value", &["overflow", "limit", "max"]),
    ("unicode", &["invalid"]),
    ("whitespace", &["empty", "invalid"]),
    ("special_chars", &["invalid", "exception"]),
];

fn compiled(slot: &'static OnceLock<Vec<Regex>>, patterns: &[&str]) -> &'static [Regex] {
    slot.get_or_init(|| patterns.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

fn defensive_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(&PATTERNS, DEFENSIVE_PATTERNS)
}

/// Bug-related keywords in `text`, lowercased and sorted.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let lower = text.to_lowercase();
    compiled(&PATTERNS, KEYWORD_PATTERNS)
        .iter()
        .flat_map(|re| re.find_iter(&lower).map(|m| m.as_str().to_string()).collect::<Vec<_>>())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    pub num_random_tests: usize,
    /// Random cases are generated for at most this many signatures.
    pub max_signatures: usize,
    pub seed: Option<u64>,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            num_random_tests: 20,
            max_signatures: 3,
            seed: None,
        }
    }
}

pub struct FuzzTester {
    config: FuzzConfig,
    seed: u64,
    stats: Mutex<FuzzStatistics>,
}

impl Default for FuzzTester {
    fn default() -> Self {
        Self::new(FuzzConfig::default())
    }
}

impl FuzzTester {
    pub fn new(config: FuzzConfig) -> Self {
        Self {
            seed: config.seed.unwrap_or_else(rand::random),
            config,
            stats: Mutex::new(FuzzStatistics::default()),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// `num_cases` input maps for `signature`, one value per parameter.
    pub fn generate_fuzz_inputs(
        &self,
        signature: &FunctionSignature,
        num_cases: usize,
        gen: &mut ValueGenerator,
    ) -> Vec<BTreeMap<String, FuzzValue>> {
        let inputs: Vec<BTreeMap<String, FuzzValue>> = (0..num_cases)
            .map(|_| {
                signature
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), gen.generate(p.param_type)))
                    .collect()
            })
            .collect();
        self.stats.lock().tests_generated += inputs.len();
        inputs
    }

    /// The seven canonical edge-case probes, those relevant to `keywords` first.
    pub fn generate_edge_case_tests(&self, keywords: &BTreeSet<String>) -> Vec<FuzzTestCase> {
        let s = FuzzValue::str;
        let patterns: Vec<(&str, Vec<(&str, FuzzValue)>)> = vec![
            ("empty_input", vec![("input", s("")), ("data", FuzzValue::List(Vec::new())), ("value", FuzzValue::None)]),
            ("zero_value", vec![("input", FuzzValue::Int(0)), ("count", FuzzValue::Int(0)), ("index", FuzzValue::Int(0))]),
            ("negative", vec![("input", FuzzValue::Int(-1)), ("count", FuzzValue::Int(-1)), ("index", FuzzValue::Int(-1))]),
            ("large_value", vec![("input", FuzzValue::Int(1_000_000_000)), ("count", FuzzValue::Int(1_000_000))]),
            ("unicode", vec![("input", s("\u{1F389}\u{e9}moji")), ("name", s("\u{540d}\u{524d}"))]),
            ("whitespace", vec![("input", s("  \t\n  ")), ("name", s(" "))]),
            ("special_chars", vec![("input", s("<>&\"'\\")), ("path", s("../../../etc/passwd"))]),
        ];
        let relevant = |name: &str| {
            EDGE_CASE_TRIGGERS
                .iter()
                .find(|(pattern, _)| *pattern == name)
                .is_some_and(|(_, triggers)| triggers.iter().any(|t| keywords.contains(*t)))
        };
        let mut cases: Vec<(bool, FuzzTestCase)> = patterns
            .into_iter()
            .map(|(name, inputs)| {
                let inputs = inputs.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
                (relevant(name), FuzzTestCase::new(format!("edge_case_{name}"), inputs))
            })
            .collect();
        cases.sort_by_key(|(relevant, _)| !*relevant);
        self.stats.lock().tests_generated += cases.len();
        cases.into_iter().map(|(_, case)| case).collect()
    }

    /// Judge a case by the patch's defensive idioms: a None input needs a
    /// None check, an empty input needs an emptiness check, unless the patch
    /// is defensive in general.
    pub fn evaluate_test_case(&self, case: &FuzzTestCase, patch: &str) -> CaseVerdict {
        let defensive = defensive_patterns().iter().any(|re| re.is_match(patch));
        let has_none = case.inputs.values().any(FuzzValue::is_none);
        let has_empty = case.inputs.values().any(FuzzValue::is_empty_container);
        let handles_none = patch.contains("None");
        let handles_empty = ["len(", "if not", "\"\"", "[]", "{}"].iter().any(|t| patch.contains(t));

        let verdict = |passed: bool, crash: bool, result: &str| CaseVerdict {
            passed,
            crash,
            result: result.to_string(),
        };
        if has_none && !handles_none && !defensive {
            return verdict(false, true, "Potential None error");
        }
        if has_empty && !handles_empty && !defensive {
            return verdict(false, false, "May not handle empty");
        }
        if defensive {
            return verdict(true, false, "Has defensive code");
        }
        verdict(true, false, "OK")
    }

    /// Edge-case probes plus `num_random_tests / 3` random cases for each of
    /// the first signatures added by the patch, all judged heuristically.
    pub fn run_fuzz_tests(&self, patch: &str, problem_statement: &str, num_random_tests: usize) -> FuzzResult {
        let keywords = extract_keywords(problem_statement);
        let mut cases = self.generate_edge_case_tests(&keywords);

        let mut gen = ValueGenerator::new(self.seed);
        let per_signature = num_random_tests / 3;
        for signature in extract_function_signatures(patch).iter().take(self.config.max_signatures) {
            let inputs = self.generate_fuzz_inputs(signature, per_signature, &mut gen);
            cases.extend(
                inputs
                    .into_iter()
                    .enumerate()
                    .map(|(i, inputs)| FuzzTestCase::new(format!("fuzz_{}_{i}", signature.name), inputs)),
            );
        }

        let verdicts: Vec<CaseVerdict> = cases
            .iter_mut()
            .map(|case| {
                let verdict = self.evaluate_test_case(case, patch);
                case.passed = verdict.passed;
                case.actual_result = Some(verdict.result.clone());
                verdict
            })
            .collect();
        let result = FuzzResult::from_cases(cases, &verdicts, self.seed, keywords.into_iter().collect());

        let mut stats = self.stats.lock();
        stats.tests_run += result.total_tests;
        stats.crashes_found += result.crashes;
        stats.crash_rate = if stats.tests_run == 0 {
            0.0
        } else {
            stats.crashes_found as f64 / stats.tests_run as f64
        };
        debug!(total = result.total_tests, passed = result.passed, crashes = result.crashes, "fuzz run complete");
        result
    }

    /// Same as [`Self::run_fuzz_tests`] with the configured case count.
    pub fn run(&self, patch: &str, problem_statement: &str) -> FuzzResult {
        self.run_fuzz_tests(patch, problem_statement, self.config.num_random_tests)
    }

    pub fn statistics(&self) -> FuzzStatistics {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tester() -> FuzzTester {
        FuzzTester::new(FuzzConfig {
            seed: Some(17),
            ..FuzzConfig::default()
        })
    }

    const DEFENSIVE_PATCH: &str = "\
+def mean(values: list) -> float:
+    if not values:
+        return 0.0
+    return sum(values) / len(values)
";

    const NAIVE_PATCH: &str = "\
+def mean(values: list) -> float:
+    return sum(values) / len(values)
";

    #[test]
    fn test_keywords() {
        let keywords = extract_keywords("Crash on EMPTY input; overflow at the max limit.");
        let expected: BTreeSet<String> = ["crash", "empty", "overflow", "max", "limit"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keywords, expected);
    }

    #[test]
    fn test_relevant_edge_cases_come_first() {
        let keywords = extract_keywords("integer overflow");
        let cases = tester().generate_edge_case_tests(&keywords);
        assert_eq!(cases.len(), 7);
        assert_eq!(cases[0].name, "edge_case_large_value");
        assert_eq!(cases[1].name, "edge_case_empty_input");
    }

    #[test]
    fn test_defensive_patch_passes_everything() {
        let result = tester().run_fuzz_tests(DEFENSIVE_PATCH, "mean crashes on empty list", 9);
        assert_eq!(result.total_tests, 7 + 3);
        assert_eq!(result.passed, result.total_tests);
        assert_eq!(result.score, 1.0);
        assert!(result.test_cases.iter().any(|c| c.name == "fuzz_mean_2"));
    }

    #[test]
    fn test_naive_patch_fails_none_probe() {
        let tester = tester();
        let result = tester.run_fuzz_tests(NAIVE_PATCH, "", 0);
        assert_eq!(result.total_tests, 7);
        let empty = result.test_cases.iter().find(|c| c.name == "edge_case_empty_input").unwrap();
        assert!(!empty.passed);
        assert_eq!(empty.actual_result.as_deref(), Some("Potential None error"));
        assert_eq!(result.crashes, 1);
        assert!(result.score < 1.0);
        assert_eq!(tester.statistics().crashes_found, 1);
    }

    #[test]
    fn test_no_cases_scores_zero() {
        let result = FuzzResult::from_cases(Vec::new(), &[], 0, Vec::new());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_seeded_runs_match() {
        let a = tester().run_fuzz_tests(NAIVE_PATCH, "", 12);
        let b = tester().run_fuzz_tests(NAIVE_PATCH, "", 12);
        let render = |r: &FuzzResult| -> Vec<String> {
            r.test_cases
                .iter()
                .map(|c| c.inputs.values().map(ToString::to_string).collect::<Vec<_>>().join(","))
                .collect()
        };
        assert_eq!(render(&a), render(&b));
    }
}
