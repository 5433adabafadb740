//! One-call entry points with JSON-serializable results.
//!
//! Each function builds the component it needs from a config value, runs it
//! once and returns the report. Long-lived callers should hold the component
//! ([`MutationEngine`], [`PatchMutationTester`], [`FuzzTester`],
//! [`AntiContaminationPipeline`](crate::AntiContaminationPipeline)) instead.

use crate::pipeline::{AntiContaminationPipeline, ContaminationReport, PreparedTask};
use anyhow::{Context, Result};
use holdout_core::fuzz::{FuzzConfig, FuzzResult, FuzzTester};
use holdout_core::mutation::{EngineConfig, MutationEngine, RepositoryMutationResult};
use holdout_core::patch::{MutationResult, PatchMutationTester};
use holdout_types::{AntiContaminationConfig, EvaluationSlice, TaskInstance};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub fn mutate_repository(path: &Path, output_path: Option<&Path>, config: EngineConfig) -> RepositoryMutationResult {
    MutationEngine::new(config).mutate_repository(path, output_path)
}

/// The mutated source, or `code` unchanged when it cannot be mutated.
pub fn mutate_code_string(code: &str, filename: &str, config: EngineConfig) -> String {
    MutationEngine::new(config).mutate_code_string(code, filename)
}

/// Prepare a single task with a fresh pipeline. Repeated calls with the same
/// seeded config prepare the same task identically.
pub fn prepare_task(
    instance: &TaskInstance,
    repo_path: &Path,
    config: AntiContaminationConfig,
    slice: Option<EvaluationSlice>,
    allow_heuristics: Option<bool>,
) -> PreparedTask {
    AntiContaminationPipeline::new(config).prepare_task(instance, repo_path, slice, allow_heuristics)
}

pub fn run_mutation_testing(generated_patch: &str, expected_patch: &str, max_mutations: usize) -> MutationResult {
    PatchMutationTester::new().run_mutation_testing(generated_patch, expected_patch, max_mutations)
}

pub fn run_fuzz_tests(patch: &str, problem_statement: &str, num_random_tests: usize, seed: Option<u64>) -> FuzzResult {
    FuzzTester::new(FuzzConfig {
        num_random_tests,
        seed,
        ..FuzzConfig::default()
    })
    .run_fuzz_tests(patch, problem_statement, num_random_tests)
}

pub fn calculate_contamination_score(
    verified: &BTreeMap<String, f64>,
    mutated: &BTreeMap<String, f64>,
) -> ContaminationReport {
    crate::pipeline::calculate_contamination_score(verified, mutated)
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("serialize result")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_serialize() {
        let result = run_mutation_testing("if x == 5:\n    return x\n", "return x", 10);
        let json = to_json(&result).unwrap();
        assert!(json.contains("\"total_mutants\""));

        let config = EngineConfig {
            mutation_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(mutate_code_string("x = 1\n", "m.py", config), "x = 1\n");

        let fuzz = run_fuzz_tests("+def f(n: int):\n+    return n\n", "", 6, Some(1));
        assert_eq!(fuzz.seed, 1);
        assert!(fuzz.total_tests > 0);
    }

    #[test]
    fn test_prepare_task_verified() {
        let instance = TaskInstance::new("acme__tool-1", "acme/tool", "abc", "Fix it", "");
        let prepared = prepare_task(
            &instance,
            Path::new("/nonexistent"),
            AntiContaminationConfig::default(),
            Some(EvaluationSlice::Verified),
            None,
        );
        assert_eq!(prepared.metadata.evaluation_slice(), EvaluationSlice::Verified);
        assert!(!prepared.metadata.mutation_applied());
        assert!(to_json(&prepared).unwrap().contains("acme__tool-1"));
    }
}
