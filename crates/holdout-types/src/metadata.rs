//! Per-task provenance record.

use crate::slice::{EvaluationSlice, MutationLevel, RunMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance of one prepared task: which slice and mode produced its score
/// and whether a verified mutation was applied.
///
/// Built once through [`TaskMetadata::new`] and the `with_*` builders, then
/// read through accessors. Timestamps serialize as ISO-8601.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    evaluation_slice: EvaluationSlice,
    run_mode: RunMode,
    mutation_applied: bool,
    #[serde(default)]
    mutation_seed: Option<u64>,
    #[serde(default)]
    mutation_level: Option<MutationLevel>,
    heuristics_allowed: bool,
    #[serde(default)]
    base_commit: Option<String>,
    #[serde(default)]
    harvested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    model_training_cutoff: Option<DateTime<Utc>>,
}

impl TaskMetadata {
    pub fn new(evaluation_slice: EvaluationSlice, heuristics_allowed: bool) -> Self {
        Self {
            evaluation_slice,
            run_mode: RunMode::from_heuristics(heuristics_allowed),
            mutation_applied: false,
            mutation_seed: None,
            mutation_level: None,
            heuristics_allowed,
            base_commit: None,
            harvested_at: None,
            model_training_cutoff: None,
        }
    }

    /// Records a mutation that was generated and passed verification.
    pub fn with_mutation(mut self, seed: u64, level: MutationLevel) -> Self {
        self.mutation_applied = true;
        self.mutation_seed = Some(seed);
        self.mutation_level = Some(level);
        self
    }

    /// Records an attempted mutation that was discarded.
    pub fn with_failed_mutation(mut self, seed: u64, level: MutationLevel) -> Self {
        self.mutation_applied = false;
        self.mutation_seed = Some(seed);
        self.mutation_level = Some(level);
        self
    }

    pub fn with_base_commit(mut self, base_commit: Option<String>) -> Self {
        self.base_commit = base_commit.filter(|c| !c.is_empty());
        self
    }

    pub fn with_harvested_at(mut self, harvested_at: DateTime<Utc>) -> Self {
        self.harvested_at = Some(harvested_at);
        self
    }

    pub fn with_training_cutoff(mut self, cutoff: Option<DateTime<Utc>>) -> Self {
        self.model_training_cutoff = cutoff;
        self
    }

    pub fn evaluation_slice(&self) -> EvaluationSlice {
        self.evaluation_slice
    }

    /// The slice the task was actually scored under: a mutated-slice task whose
    /// mutation was discarded ran against the original instance.
    pub fn effective_slice(&self) -> EvaluationSlice {
        match self.evaluation_slice {
            EvaluationSlice::Mutated if !self.mutation_applied => EvaluationSlice::Verified,
            other => other,
        }
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn mutation_applied(&self) -> bool {
        self.mutation_applied
    }

    pub fn mutation_seed(&self) -> Option<u64> {
        self.mutation_seed
    }

    pub fn mutation_level(&self) -> Option<MutationLevel> {
        self.mutation_level
    }

    pub fn heuristics_allowed(&self) -> bool {
        self.heuristics_allowed
    }

    pub fn base_commit(&self) -> Option<&str> {
        self.base_commit.as_deref()
    }

    pub fn harvested_at(&self) -> Option<DateTime<Utc>> {
        self.harvested_at
    }

    pub fn model_training_cutoff(&self) -> Option<DateTime<Utc>> {
        self.model_training_cutoff
    }
}
