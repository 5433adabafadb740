//! Patch probes through the public entry points.

use holdout_bench::api;
use holdout_core::adversarial::{AdversarialGenerator, GenerationSource, MockGenerator, ProbeCategory};
use holdout_core::patch::{analyze_survivors, MutationKind, PatchMutationTester};
use std::sync::Arc;

const DIFF: &str = "\
--- a/shop/cart.py
+++ b/shop/cart.py
@@ -10,6 +10,10 @@ class Cart:
     def total(self, items, discount):
-        return sum(items)
+        if discount is None or discount < 0:
+            raise ValueError(discount)
+        subtotal = sum(item.price for item in items)
+        return subtotal - discount
";

#[test]
fn test_comparison_mutant_in_diff_is_killed() {
    let tester = PatchMutationTester::new();
    let patch = "+if x == 5:\n+    return True\n";
    let mutations = tester.generate_mutations(patch, 10);
    let swap = mutations.iter().find(|m| m.original == "==").unwrap();
    assert!(swap.mutated.contains("if x != 5:"));
    assert!(tester.evaluate_mutation(patch, swap, "return True"));
}

#[test]
fn test_self_comparison_scores_within_bounds() {
    let result = api::run_mutation_testing(DIFF, DIFF, 10);
    assert!(result.total_mutants > 0);
    assert!(result.total_mutants <= 10);
    assert!((0.0..=1.0).contains(&result.score));
    assert_eq!(result.killed + result.survived, result.total_mutants);
    for entry in &result.mutations {
        assert_ne!(entry.mutation.mutated, DIFF);
        if matches!(entry.mutation.mutation_type, MutationKind::Negation | MutationKind::Removal) {
            assert!(entry.killed, "{} should be killed", entry.mutation.name);
        }
    }

    let analysis = analyze_survivors(&result);
    assert_eq!(analysis.survivors.len(), result.survived);
    let tallied: usize = analysis.by_type.values().map(|t| t.total).sum();
    assert_eq!(tallied, result.total_mutants);
}

#[test]
fn test_removed_lines_are_never_mutated() {
    let tester = PatchMutationTester::new();
    for mutation in tester.generate_mutations(DIFF, 50) {
        assert!(mutation.mutated.contains("-        return sum(items)\n"));
    }
}

#[test]
fn test_seeded_fuzzing_is_reproducible() {
    let problem = "total() crashes with an empty cart and a None discount";
    let first = api::run_fuzz_tests(DIFF, problem, 9, Some(17));
    let second = api::run_fuzz_tests(DIFF, problem, 9, Some(17));
    assert_eq!(first, second);
    assert_eq!(first.seed, 17);
    assert_eq!(first.passed + first.failed, first.total_tests);
    assert!(first.crashes <= first.failed);
    assert!((0.0..=1.0).contains(&first.score));
    assert!(first.keywords.iter().any(|k| k == "none" || k == "empty" || k == "crash"));
}

#[test]
fn test_collaborator_probes_are_scored() {
    let response = "\
TEST 1:
Name: negative_discount
Description: A negative discount must be rejected
Category: boundary
Input: cart.total(items, -1)
---
TEST 2:
Name: missing_discount
Description: No discount at all
Category: edge_case
Input: cart.total(items, None)
---";
    let mock = Arc::new(MockGenerator::responding(response));
    let generator = AdversarialGenerator::with_generator(mock.clone());
    let mut suite = generator.generate_edge_cases("discount handling", DIFF, 5);
    assert_eq!(suite.source, GenerationSource::Collaborator);
    assert_eq!(suite.tests.len(), 2);
    assert_eq!(suite.tests[0].category, ProbeCategory::Boundary);
    assert_eq!(mock.prompts().len(), 1);

    generator.annotate(DIFF, &mut suite.tests);
    assert!(suite.tests.iter().all(|t| t.verdict.is_some()));
    let evaluation = generator.evaluate_patch_against_tests(DIFF, &suite.tests);
    assert_eq!(evaluation.total, 2);
    assert_eq!(
        evaluation.likely_handled + evaluation.likely_vulnerable + evaluation.unknown,
        2
    );
    assert_eq!(generator.statistics().collaborator_calls, 1);
}
