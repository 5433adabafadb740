//! Preparation lifecycle and shared pipeline state.

use holdout_types::{EvaluationSlice, RunMode, TaskMetadata};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a task is in `prepare_task`.
///
/// `Unprepared -> SliceSelected -> (MutationApplied | MutationSkipped) -> MetadataRecorded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStage {
    Unprepared,
    SliceSelected,
    MutationApplied,
    MutationSkipped,
    MetadataRecorded,
}

impl PreparationStage {
    pub fn can_advance_to(self, next: PreparationStage) -> bool {
        use PreparationStage::*;
        matches!(
            (self, next),
            (Unprepared, SliceSelected)
                | (SliceSelected, MutationApplied)
                | (SliceSelected, MutationSkipped)
                | (MutationApplied, MetadataRecorded)
                | (MutationSkipped, MetadataRecorded)
        )
    }
}

/// Ordered record of the stages one preparation went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTrace(Vec<PreparationStage>);

impl Default for StageTrace {
    fn default() -> Self {
        Self(vec![PreparationStage::Unprepared])
    }
}

impl StageTrace {
    pub fn current(&self) -> PreparationStage {
        self.0.last().copied().unwrap_or(PreparationStage::Unprepared)
    }

    /// Appends `next`; an illegal transition is ignored and reported as `false`.
    pub fn advance(&mut self, next: PreparationStage) -> bool {
        if self.current().can_advance_to(next) {
            self.0.push(next);
            true
        } else {
            false
        }
    }

    pub fn stages(&self) -> &[PreparationStage] {
        &self.0
    }
}

/// Counters over every prepared task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounters {
    pub verified_count: usize,
    pub mutated_count: usize,
    pub fresh_count: usize,
    pub post_cutoff_count: usize,
    pub adversarial_count: usize,
    pub heuristic_runs: usize,
    pub llm_only_runs: usize,
    pub mutation_successes: usize,
    pub mutation_failures: usize,
}

impl PipelineCounters {
    pub(crate) fn record(&mut self, metadata: &TaskMetadata, mutation_attempted: bool) {
        let slot = match metadata.evaluation_slice() {
            EvaluationSlice::Verified => &mut self.verified_count,
            EvaluationSlice::Mutated => &mut self.mutated_count,
            EvaluationSlice::Fresh => &mut self.fresh_count,
            EvaluationSlice::PostCutoff => &mut self.post_cutoff_count,
            EvaluationSlice::Adversarial => &mut self.adversarial_count,
        };
        *slot += 1;
        match metadata.run_mode() {
            RunMode::HeuristicAssisted => self.heuristic_runs += 1,
            RunMode::LlmOnly => self.llm_only_runs += 1,
        }
        if mutation_attempted {
            if metadata.mutation_applied() {
                self.mutation_successes += 1;
            } else {
                self.mutation_failures += 1;
            }
        }
    }
}

/// Processed-instance map and counters. Preparing different ids concurrently
/// is safe; callers serialize preparations of the same id.
#[derive(Debug, Default)]
pub struct PipelineState {
    processed: RwLock<BTreeMap<String, TaskMetadata>>,
    counters: RwLock<PipelineCounters>,
}

impl PipelineState {
    pub fn record(&self, instance_id: &str, metadata: TaskMetadata, mutation_attempted: bool) {
        self.counters.write().record(&metadata, mutation_attempted);
        self.processed.write().insert(instance_id.to_string(), metadata);
    }

    pub fn metadata(&self, instance_id: &str) -> Option<TaskMetadata> {
        self.processed.read().get(instance_id).cloned()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.read().len()
    }

    pub fn processed(&self) -> BTreeMap<String, TaskMetadata> {
        self.processed.read().clone()
    }

    pub fn counters(&self) -> PipelineCounters {
        self.counters.read().clone()
    }
}
