use super::operators::{patch_operator_registry, select_patch_operators, PatchOperator, PatchText};
use super::{EvaluatedMutation, KindTally, Mutation, MutationKind, MutationResult};
use crate::pyast::verify_syntax;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Fragments of the expected patch that pin behavior down.
fn key_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"return\s+.+", r"raise\s+.+", r"assert\s+.+", r"if\s+.+:"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

const COMPARISON_FRAGMENTS: &[&str] = &["==", "!=", "<", ">"];

/// Running totals across every [`PatchMutationTester::run_mutation_testing`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationTestStatistics {
    pub runs: usize,
    pub total_mutations: usize,
    pub mutations_by_type: BTreeMap<MutationKind, KindTally>,
}

pub struct PatchMutationTester {
    operators: Vec<&'static dyn PatchOperator>,
    stats: Mutex<MutationTestStatistics>,
}

impl Default for PatchMutationTester {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchMutationTester {
    pub fn new() -> Self {
        Self::with_operators(patch_operator_registry())
    }

    /// Restrict generation to the named operators (see [`select_patch_operators`]).
    pub fn with_operator_names(names: &[String]) -> Self {
        Self::with_operators(select_patch_operators(names))
    }

    fn with_operators(operators: Vec<&'static dyn PatchOperator>) -> Self {
        Self {
            operators,
            stats: Mutex::new(MutationTestStatistics::default()),
        }
    }

    pub fn operator_names(&self) -> Vec<&'static str> {
        self.operators.iter().map(|op| op.name()).collect()
    }

    /// Mutants in operator order: operator swaps, negations, removals,
    /// boundaries, capped at `max_mutations` in total. Mutants identical to
    /// the input are dropped, and so are mutants that break the syntax of
    /// edited code which parsed before.
    pub fn generate_mutations(&self, patch: &str, max_mutations: usize) -> Vec<Mutation> {
        let text = PatchText::new(patch);
        let check_syntax = verify_syntax(&text.editable_source());
        let mut mutations: Vec<Mutation> = Vec::new();
        for operator in &self.operators {
            let remaining = max_mutations.saturating_sub(mutations.len());
            if remaining == 0 {
                break;
            }
            let produced = operator.generate(&text, remaining);
            debug!(operator = operator.name(), produced = produced.len(), "patch operator ran");
            mutations.extend(produced.into_iter().filter(|m| {
                if m.mutated == patch {
                    return false;
                }
                let parses = !check_syntax || verify_syntax(&PatchText::new(&m.mutated).editable_source());
                if !parses {
                    debug!(mutation = %m.name, "dropping mutant that does not parse");
                }
                parses
            }));
        }
        mutations.truncate(max_mutations);
        mutations
    }

    /// Heuristic kill oracle. No test runs: a mutant counts as killed when it
    /// erases a key fragment of `expected_patch` that the original contained,
    /// flips a comparison, negates a condition or removes a statement. All
    /// other mutants are assumed to survive.
    pub fn evaluate_mutation(&self, original_patch: &str, mutation: &Mutation, expected_patch: &str) -> bool {
        let erases_key = key_patterns().iter().any(|re| {
            re.find_iter(expected_patch).any(|key| {
                let key = key.as_str();
                original_patch.contains(key) && !mutation.mutated.contains(key)
            })
        });
        if erases_key {
            return true;
        }
        match mutation.mutation_type {
            MutationKind::Negation | MutationKind::Removal => true,
            MutationKind::Operator => COMPARISON_FRAGMENTS
                .iter()
                .any(|op| mutation.original.contains(op)),
            MutationKind::Boundary => false,
        }
    }

    pub fn run_mutation_testing(&self, generated_patch: &str, expected_patch: &str, max_mutations: usize) -> MutationResult {
        let verdicts: Vec<EvaluatedMutation> = self
            .generate_mutations(generated_patch, max_mutations)
            .into_iter()
            .map(|mutation| {
                let killed = self.evaluate_mutation(generated_patch, &mutation, expected_patch);
                EvaluatedMutation { mutation, killed }
            })
            .collect();

        {
            let mut stats = self.stats.lock();
            stats.runs += 1;
            stats.total_mutations += verdicts.len();
            for verdict in &verdicts {
                stats
                    .mutations_by_type
                    .entry(verdict.mutation.mutation_type)
                    .or_default()
                    .record(verdict.killed);
            }
        }

        let result = MutationResult::from_verdicts(verdicts);
        debug!(total = result.total_mutants, killed = result.killed, score = result.score, "mutation testing complete");
        result
    }

    pub fn statistics(&self) -> MutationTestStatistics {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATCH: &str = "\
--- a/calc.py
+++ b/calc.py
@@ -1,4 +1,6 @@
 def safe_div(a, b):
-    return a / b
+    if b == 0:
+        raise ValueError(\"b must be nonzero\")
+    return a / b
";

    #[test]
    fn test_comparison_swap_is_killed() {
        let tester = PatchMutationTester::new();
        let mutations = tester.generate_mutations("if x == 5:\n    y = 1\n", 10);
        let swap = mutations.iter().find(|m| m.original == "==").unwrap();
        assert!(swap.mutated.contains("if x != 5:"));
        assert!(tester.evaluate_mutation("if x == 5:\n    y = 1\n", swap, "z = 0\n"));
    }

    #[test]
    fn test_variadic_patch_mutants_all_parse() {
        let tester = PatchMutationTester::new();
        let patch = "+def f(*args):\n+    return g(*args)\n";
        let mutations = tester.generate_mutations(patch, 20);
        assert!(!mutations.is_empty());
        for mutation in &mutations {
            assert!(!mutation.mutated.contains("/args"), "{}", mutation.name);
            assert!(
                verify_syntax(&PatchText::new(&mutation.mutated).editable_source()),
                "{} does not parse",
                mutation.name
            );
        }

        let result = tester.run_mutation_testing(patch, patch, 20);
        assert_eq!(result.total_mutants, mutations.len());
    }

    #[test]
    fn test_unrelated_boundary_survives() {
        let tester = PatchMutationTester::new();
        let mutation = Mutation {
            name: "boundary_1_plus_one".into(),
            original: "1".into(),
            mutated: "y = 2\n".into(),
            location: "line 1:5".into(),
            mutation_type: MutationKind::Boundary,
        };
        assert!(!tester.evaluate_mutation("y = 1\n", &mutation, "z = 0\n"));
    }

    #[test]
    fn test_self_comparison_kills_key_changes() {
        let tester = PatchMutationTester::new();
        let result = tester.run_mutation_testing(PATCH, PATCH, 10);
        assert!(result.total_mutants > 0 && result.total_mutants <= 10);
        assert!((0.0..=1.0).contains(&result.score));
        for entry in &result.mutations {
            assert_ne!(entry.mutation.mutated, PATCH);
            let always = matches!(entry.mutation.mutation_type, MutationKind::Negation | MutationKind::Removal)
                || entry.mutation.original == "==";
            if always {
                assert!(entry.killed, "{} should be killed", entry.mutation.name);
            }
        }
        assert!(result.mutations.iter().any(|m| m.mutation.original == "=="));
    }

    #[test]
    fn test_cap_and_empty_patch() {
        let tester = PatchMutationTester::new();
        assert!(tester.generate_mutations(PATCH, 3).len() <= 3);
        let result = tester.run_mutation_testing("", "", 10);
        assert_eq!(result.total_mutants, 0);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_statistics_accumulate() {
        let tester = PatchMutationTester::with_operator_names(&["negation".to_string()]);
        assert_eq!(tester.operator_names(), vec!["negation"]);
        tester.run_mutation_testing("if ok:\n    return True\n", "", 10);
        tester.run_mutation_testing("while busy:\n    pass\n", "", 10);
        let stats = tester.statistics();
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.total_mutations, 3);
        assert_eq!(stats.mutations_by_type[&MutationKind::Negation].kill_rate, 1.0);
    }
}
