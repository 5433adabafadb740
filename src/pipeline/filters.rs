//! Result filtering by slice and run mode.

use holdout_types::{EvaluationSlice, RunMode, TaskMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One scored task as reported by an evaluation harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub instance_id: String,
    pub score: f64,
    pub metadata: TaskMetadata,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Results recorded under `slice`. A mutated-slice task whose mutation was
/// discarded only matches [`EvaluationSlice::Verified`] when `effective` is set.
pub fn filter_results_by_slice(results: &[TaskResult], slice: EvaluationSlice, effective: bool) -> Vec<&TaskResult> {
    results
        .iter()
        .filter(|r| {
            let recorded = if effective {
                r.metadata.effective_slice()
            } else {
                r.metadata.evaluation_slice()
            };
            recorded == slice
        })
        .collect()
}

pub fn filter_results_by_mode(results: &[TaskResult], mode: RunMode) -> Vec<&TaskResult> {
    results.iter().filter(|r| r.metadata.run_mode() == mode).collect()
}

/// `instance_id -> score` for the given results.
pub fn scores_by_instance<'a>(results: impl IntoIterator<Item = &'a TaskResult>) -> BTreeMap<String, f64> {
    results.into_iter().map(|r| (r.instance_id.clone(), r.score)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdout_types::MutationLevel;

    fn result(id: &str, metadata: TaskMetadata) -> TaskResult {
        TaskResult {
            instance_id: id.to_string(),
            score: 1.0,
            metadata,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_filters() {
        let results = vec![
            result("a", TaskMetadata::new(EvaluationSlice::Verified, false)),
            result(
                "b",
                TaskMetadata::new(EvaluationSlice::Mutated, true).with_failed_mutation(1, MutationLevel::Medium),
            ),
            result(
                "c",
                TaskMetadata::new(EvaluationSlice::Mutated, false).with_mutation(1, MutationLevel::Medium),
            ),
        ];
        assert_eq!(filter_results_by_slice(&results, EvaluationSlice::Mutated, false).len(), 2);
        let effective = filter_results_by_slice(&results, EvaluationSlice::Mutated, true);
        assert_eq!(effective.len(), 1);
        assert_eq!(effective[0].instance_id, "c");
        assert_eq!(filter_results_by_slice(&results, EvaluationSlice::Verified, true).len(), 2);
        assert_eq!(filter_results_by_mode(&results, RunMode::HeuristicAssisted).len(), 1);
        assert_eq!(scores_by_instance(&results).len(), 3);
    }
}
