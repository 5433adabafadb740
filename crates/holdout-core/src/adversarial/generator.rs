use super::TextGenerator;
use crate::errors::{ErrorCode, Failure};
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const PROMPT_PROBLEM_CHARS: usize = 500;
const PROMPT_PATCH_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCategory {
    EdgeCase,
    Boundary,
    Malformed,
    Injection,
    Resource,
    /// Any label the collaborator invents that is not one of the above.
    Other,
}

impl ProbeCategory {
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "edge_case" | "edge" => ProbeCategory::EdgeCase,
            "boundary" => ProbeCategory::Boundary,
            "malformed" => ProbeCategory::Malformed,
            "injection" => ProbeCategory::Injection,
            "resource" => ProbeCategory::Resource,
            _ => ProbeCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeCategory::EdgeCase => "edge_case",
            ProbeCategory::Boundary => "boundary",
            ProbeCategory::Malformed => "malformed",
            ProbeCategory::Injection => "injection",
            ProbeCategory::Resource => "resource",
            ProbeCategory::Other => "other",
        }
    }

    /// Idioms that suggest a patch copes with probes of this category.
    fn defensive_patterns(&self) -> &'static [Regex] {
        static PATTERNS: OnceLock<BTreeMap<ProbeCategory, Vec<Regex>>> = OnceLock::new();
        let table = PATTERNS.get_or_init(|| {
            let raw: [(ProbeCategory, &[&str]); 5] = [
                (
                    ProbeCategory::EdgeCase,
                    &[r"if\s+\w+\s+is\s+None", r"if\s+not\s+\w+", r"if\s+len\(\w+\)", r"\.get\(", r"or\s+\[\]", r#"or\s+"""#],
                ),
                (ProbeCategory::Boundary, &[r"if\s+\w+\s*[<>]=?\s*\d+", r"max\(", r"min\(", r"clamp", r"bound"]),
                (ProbeCategory::Malformed, &[r"try\s*:", r"except\s+", r"validate", r"sanitize", r"escape"]),
                (
                    ProbeCategory::Injection,
                    &[r"escape", r"quote", r"sanitize", r"parameterized", r"prepared", r"safe_"],
                ),
                (ProbeCategory::Resource, &[r"limit", r"max_", r"timeout", r"\[:\s*\d+\s*\]"]),
            ];
            raw.into_iter()
                .map(|(category, patterns)| {
                    let compiled = patterns
                        .iter()
                        .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
                        .collect();
                    (category, compiled)
                })
                .collect()
        });
        table.get(self).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for ProbeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Pattern-based judgement of whether a patch copes with a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// A category-specific defensive idiom is present.
    LikelyHandled,
    /// No specific idiom, but the patch catches exceptions.
    Maybe,
    /// No specific idiom and no exception handling.
    LikelyVulnerable,
    /// The category has no known idioms.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdversarialTest {
    pub name: String,
    pub description: String,
    pub test_code: String,
    pub category: ProbeCategory,
    pub severity: Severity,
    pub expected_behavior: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

impl AdversarialTest {
    fn probe(name: &str, description: &str, test_code: &str, category: ProbeCategory, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            test_code: test_code.to_string(),
            category,
            severity,
            expected_behavior: "handled without an unexpected exception".to_string(),
            verdict: None,
        }
    }
}

fn heuristic_library() -> Vec<AdversarialTest> {
    use ProbeCategory::*;
    use Severity::*;
    vec![
        AdversarialTest::probe("null_input", "Test with None/null input", "input = None", EdgeCase, High),
        AdversarialTest::probe("empty_string", "Test with empty string", "input = \"\"", EdgeCase, Medium),
        AdversarialTest::probe("empty_list", "Test with empty list", "input = []", EdgeCase, Medium),
        AdversarialTest::probe("negative_number", "Test with negative number", "input = -1", Boundary, Medium),
        AdversarialTest::probe("large_number", "Test with very large number", "input = 10**18", Boundary, Medium),
        AdversarialTest::probe(
            "unicode_input",
            "Test with unicode characters",
            "input = \"\u{1F389}\u{e9}moji\u{540d}\u{524d}\"",
            Malformed,
            Low,
        ),
        AdversarialTest::probe(
            "sql_injection",
            "Test SQL injection attempt",
            "input = \"'; DROP TABLE users; --\"",
            Injection,
            High,
        ),
        AdversarialTest::probe(
            "path_traversal",
            "Test path traversal attempt",
            "input = \"../../../etc/passwd\"",
            Injection,
            High,
        ),
        AdversarialTest::probe("large_payload", "Test with large payload", "input = \"x\" * 1000000", Resource, Medium),
        AdversarialTest::probe(
            "special_chars",
            "Test with special characters",
            r#"input = "<>&\"\'\\\x00\n\r\t""#,
            Malformed,
            Medium,
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Strings,
    Numbers,
    Collections,
    Paths,
}

/// Whole-word topic cues, in priority order.
fn topic_patterns() -> &'static [(Topic, Regex)] {
    static PATTERNS: OnceLock<Vec<(Topic, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (Topic::Strings, r"\bstrings?\b"),
            (Topic::Numbers, r"\b(?:numbers?|ints?|integers?)\b"),
            (Topic::Collections, r"\b(?:lists?|arrays?)\b"),
            (Topic::Paths, r"\b(?:paths?|files?)\b"),
        ]
        .into_iter()
        .filter_map(|(topic, pattern)| Regex::new(pattern).ok().map(|re| (topic, re)))
        .collect()
    })
}

/// Does the problem statement make `test` a priority? The first matching
/// topic decides: strings, then numbers, then collections, then paths.
fn is_prioritized(problem: &str, test: &AdversarialTest) -> bool {
    let topic = topic_patterns()
        .iter()
        .find(|(_, re)| re.is_match(problem))
        .map(|(topic, _)| *topic);
    match topic {
        Some(Topic::Strings) => matches!(test.category, ProbeCategory::EdgeCase | ProbeCategory::Malformed),
        Some(Topic::Numbers) => test.category == ProbeCategory::Boundary,
        Some(Topic::Collections) => test.name.contains("empty") || test.name.contains("large"),
        Some(Topic::Paths) => test.category == ProbeCategory::Injection,
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    Heuristic,
    Collaborator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdversarialSuite {
    pub tests: Vec<AdversarialTest>,
    pub source: GenerationSource,
    /// Why the collaborator path was abandoned, if it was tried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Failure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeDetail {
    pub test: String,
    pub category: ProbeCategory,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdversarialEvaluation {
    pub total: usize,
    pub likely_handled: usize,
    pub likely_vulnerable: usize,
    /// `maybe` and `unknown` verdicts.
    pub unknown: usize,
    pub details: Vec<ProbeDetail>,
    /// `likely_handled / total`, 0 when there are no probes.
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdversarialStatistics {
    pub tests_generated: usize,
    pub collaborator_calls: usize,
    pub collaborator_failures: usize,
    pub categories: BTreeMap<ProbeCategory, usize>,
}

pub struct AdversarialGenerator {
    collaborator: Option<Arc<dyn TextGenerator>>,
    stats: Mutex<AdversarialStatistics>,
}

impl Default for AdversarialGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AdversarialGenerator {
    /// Heuristic-only generator.
    pub fn new() -> Self {
        Self {
            collaborator: None,
            stats: Mutex::new(AdversarialStatistics::default()),
        }
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            collaborator: Some(generator),
            ..Self::new()
        }
    }

    /// Up to `num_cases` probes: from the collaborator when one is injected
    /// and answers with at least one parseable probe, from the heuristic
    /// library otherwise.
    pub fn generate_edge_cases(&self, problem_statement: &str, patch: &str, num_cases: usize) -> AdversarialSuite {
        let mut fallback = None;
        if let Some(generator) = &self.collaborator {
            self.stats.lock().collaborator_calls += 1;
            let prompt = build_prompt(problem_statement, patch, num_cases);
            match generator.complete(&prompt) {
                Ok(response) => {
                    let mut tests = parse_response(&response);
                    if tests.is_empty() {
                        warn!(generator = generator.name(), "collaborator response had no parseable probes");
                        fallback = Some(Failure::new(
                            ErrorCode::MalformedResponse,
                            "no TEST blocks with a name and description",
                        ));
                    } else {
                        tests.truncate(num_cases);
                        self.record(&tests);
                        return AdversarialSuite {
                            tests,
                            source: GenerationSource::Collaborator,
                            fallback: None,
                        };
                    }
                }
                Err(err) => {
                    warn!(generator = generator.name(), error = %err, "collaborator failed, using heuristic probes");
                    fallback = Some(
                        Failure::new(ErrorCode::CollaboratorUnavailable, err.to_string())
                            .with_context("generator", generator.name()),
                    );
                }
            }
            self.stats.lock().collaborator_failures += 1;
        }
        let tests = self.heuristic_tests(problem_statement, num_cases);
        AdversarialSuite {
            tests,
            source: GenerationSource::Heuristic,
            fallback,
        }
    }

    /// Prioritized probes from the built-in library, padded with the rest in
    /// library order.
    pub fn heuristic_tests(&self, problem_statement: &str, num_cases: usize) -> Vec<AdversarialTest> {
        let problem = problem_statement.to_lowercase();
        let library = heuristic_library();
        let (prioritized, rest): (Vec<_>, Vec<_>) =
            library.into_iter().partition(|test| is_prioritized(&problem, test));
        let selected: Vec<AdversarialTest> = prioritized.into_iter().chain(rest).take(num_cases).collect();
        debug!(selected = selected.len(), "heuristic probes selected");
        self.record(&selected);
        selected
    }

    fn record(&self, tests: &[AdversarialTest]) {
        let mut stats = self.stats.lock();
        stats.tests_generated += tests.len();
        for test in tests {
            *stats.categories.entry(test.category).or_default() += 1;
        }
    }

    pub fn check_if_handled(&self, patch: &str, test: &AdversarialTest) -> Verdict {
        let patterns = test.category.defensive_patterns();
        if patterns.iter().any(|re| re.is_match(patch)) {
            return Verdict::LikelyHandled;
        }
        if catches_exceptions(patch) {
            return Verdict::Maybe;
        }
        if patterns.is_empty() {
            Verdict::Unknown
        } else {
            Verdict::LikelyVulnerable
        }
    }

    pub fn evaluate_patch_against_tests(&self, patch: &str, tests: &[AdversarialTest]) -> AdversarialEvaluation {
        let details: Vec<ProbeDetail> = tests
            .iter()
            .map(|test| ProbeDetail {
                test: test.name.clone(),
                category: test.category,
                verdict: self.check_if_handled(patch, test),
            })
            .collect();
        let count = |wanted: &[Verdict]| details.iter().filter(|d| wanted.contains(&d.verdict)).count();
        let likely_handled = count(&[Verdict::LikelyHandled]);
        let total = details.len();
        AdversarialEvaluation {
            total,
            likely_handled,
            likely_vulnerable: count(&[Verdict::LikelyVulnerable]),
            unknown: count(&[Verdict::Maybe, Verdict::Unknown]),
            score: if total == 0 {
                0.0
            } else {
                likely_handled as f64 / total as f64
            },
            details,
        }
    }

    /// Attach verdicts to the probes in place.
    pub fn annotate(&self, patch: &str, tests: &mut [AdversarialTest]) {
        for test in tests.iter_mut() {
            test.verdict = Some(self.check_if_handled(patch, test));
        }
    }

    pub fn statistics(&self) -> AdversarialStatistics {
        self.stats.lock().clone()
    }
}

fn catches_exceptions(patch: &str) -> bool {
    static TRY: OnceLock<Option<Regex>> = OnceLock::new();
    let has_try = TRY
        .get_or_init(|| Regex::new(r"try\s*:").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(patch));
    has_try && patch.contains("except")
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_prompt(problem_statement: &str, patch: &str, num_cases: usize) -> String {
    format!(
        "You are a security researcher testing code patches for vulnerabilities.\n\n\
         Problem being fixed:\n{problem}\n\n\
         Patch:\n{patch}\n\n\
         Generate {num_cases} adversarial test cases that might break this patch.\n\
         Focus on:\n\
         1. Edge cases (empty, null, boundary values)\n\
         2. Malformed inputs\n\
         3. Type confusion\n\
         4. Resource exhaustion\n\
         5. Injection attacks\n\n\
         Format each test as:\n\
         TEST 1:\n\
         Name: <name>\n\
         Description: <description>\n\
         Category: <edge_case|boundary|malformed|injection|resource>\n\
         Input: <test input or scenario>\n\
         ---",
        problem = truncate_chars(problem_statement, PROMPT_PROBLEM_CHARS),
        patch = truncate_chars(patch, PROMPT_PATCH_CHARS),
    )
}

struct ResponsePatterns {
    marker: Regex,
    name: Regex,
    description: Regex,
    category: Regex,
    input: Regex,
}

fn response_patterns() -> Option<&'static ResponsePatterns> {
    static PATTERNS: OnceLock<Option<ResponsePatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(ResponsePatterns {
                marker: Regex::new(r"TEST\s+\d+:").ok()?,
                name: Regex::new(r"Name:\s*(.+)").ok()?,
                description: Regex::new(r"Description:\s*(.+)").ok()?,
                category: Regex::new(r"Category:\s*(.+)").ok()?,
                input: Regex::new(r"(?s)Input:\s*(.+)").ok()?,
            })
        })
        .as_ref()
}

/// Probes from `TEST n:` blocks. A block needs a name and a description;
/// the category defaults to edge_case and the input to empty.
pub fn parse_response(content: &str) -> Vec<AdversarialTest> {
    let Some(p) = response_patterns() else {
        return Vec::new();
    };
    let capture = |re: &Regex, block: &str| {
        re.captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };
    p.marker
        .split(content)
        .skip(1)
        .filter_map(|block| {
            let name = capture(&p.name, block)?;
            let description = capture(&p.description, block)?;
            let category = capture(&p.category, block)
                .map_or(ProbeCategory::EdgeCase, |label| ProbeCategory::from_label(&label));
            let test_code = capture(&p.input, block)
                .map(|input| input.trim_end_matches('-').trim_end().to_string())
                .unwrap_or_default();
            Some(AdversarialTest {
                name,
                description,
                test_code,
                category,
                severity: Severity::Medium,
                expected_behavior: "handled without an unexpected exception".to_string(),
                verdict: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adversarial::{MockGenerator, NoopGenerator};

    const RESPONSE: &str = "\
Here are the tests.
TEST 1:
Name: huge_batch
Description: Submit a million rows at once
Category: Resource
Input: rows = [0] * 10**6
---
TEST 2:
Name: missing_description
Category: boundary
---
TEST 3:
Name: race
Description: Two writers at once
Category: race condition
Input: spawn two threads
calling save()
---";

    #[test]
    fn test_parse_response() {
        let tests = parse_response(RESPONSE);
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].name, "huge_batch");
        assert_eq!(tests[0].category, ProbeCategory::Resource);
        assert_eq!(tests[0].test_code, "rows = [0] * 10**6");
        assert_eq!(tests[1].category, ProbeCategory::Other);
        assert_eq!(tests[1].test_code, "spawn two threads\ncalling save()");
    }

    #[test]
    fn test_collaborator_probes_are_used() {
        let mock = Arc::new(MockGenerator::responding(RESPONSE));
        let generator = AdversarialGenerator::with_generator(mock.clone());
        let suite = generator.generate_edge_cases("slow batch insert", "+def save(rows): ...", 1);
        assert_eq!(suite.source, GenerationSource::Collaborator);
        assert_eq!(suite.tests.len(), 1);
        assert!(mock.prompts()[0].contains("Generate 1 adversarial test cases"));
    }

    #[test]
    fn test_collaborator_failure_falls_back() {
        let generator = AdversarialGenerator::with_generator(Arc::new(NoopGenerator));
        let suite = generator.generate_edge_cases("anything", "", 3);
        assert_eq!(suite.source, GenerationSource::Heuristic);
        assert_eq!(suite.tests.len(), 3);
        assert_eq!(suite.fallback.unwrap().code, ErrorCode::CollaboratorUnavailable);

        let generator = AdversarialGenerator::with_generator(Arc::new(MockGenerator::responding("no idea")));
        let suite = generator.generate_edge_cases("anything", "", 3);
        assert_eq!(suite.fallback.unwrap().code, ErrorCode::MalformedResponse);
        assert_eq!(generator.statistics().collaborator_failures, 1);
    }

    #[test]
    fn test_heuristic_prioritization() {
        let generator = AdversarialGenerator::new();
        let names = |tests: Vec<AdversarialTest>| tests.into_iter().map(|t| t.name).collect::<Vec<_>>();
        assert_eq!(
            names(generator.heuristic_tests("Reading a FILE path crashes", 2)),
            vec!["sql_injection", "path_traversal"]
        );
        assert_eq!(
            names(generator.heuristic_tests("wrong number returned", 3)),
            vec!["negative_number", "large_number", "null_input"]
        );
        assert_eq!(generator.heuristic_tests("", 20).len(), 10);
        // `print` and `point` are not numeric cues.
        assert_eq!(
            names(generator.heuristic_tests("print shows the wrong point", 2)),
            vec!["null_input", "empty_string"]
        );
        assert_eq!(
            names(generator.heuristic_tests("int overflow", 1)),
            vec!["negative_number"]
        );
    }

    #[test]
    fn test_verdicts() {
        let generator = AdversarialGenerator::new();
        let library = heuristic_library();
        let null = &library[0];
        let sql = &library[6];
        assert_eq!(generator.check_if_handled("+    if value is None:\n+        return", null), Verdict::LikelyHandled);
        assert_eq!(generator.check_if_handled("+    try:\n+        run()\n+    except KeyError:\n+        pass", sql), Verdict::Maybe);
        assert_eq!(generator.check_if_handled("+    run(query)", sql), Verdict::LikelyVulnerable);
        let mut other = null.clone();
        other.category = ProbeCategory::Other;
        assert_eq!(generator.check_if_handled("+    run(query)", &other), Verdict::Unknown);
    }

    #[test]
    fn test_evaluate_patch() {
        let generator = AdversarialGenerator::new();
        let tests = generator.heuristic_tests("", 10);
        let patch = "+def load(path, limit=100):\n+    if not path:\n+        return None\n+    return open(path).read()[:limit]\n";
        let report = generator.evaluate_patch_against_tests(patch, &tests);
        assert_eq!(report.total, 10);
        assert_eq!(report.likely_handled + report.likely_vulnerable + report.unknown, 10);
        // edge_case (3) and resource (1) idioms are present.
        assert_eq!(report.likely_handled, 4);
        assert!((report.score - 0.4).abs() < 1e-9);
        assert!(generator.evaluate_patch_against_tests(patch, &[]).score == 0.0);
    }
}
