//! Anti-contamination pipeline.
//!
//! Assigns each task to an evaluation slice, applies the slice's preparation
//! (a verified retro-holdout rewrite for the mutated slice) and records
//! immutable [`TaskMetadata`] for later filtering and contamination scoring.
//!
//! # Architecture
//!
//! - [`state`]: preparation lifecycle, processed-instance map and counters
//! - [`score`]: contamination score from paired verified/mutated results
//! - [`filters`]: result filtering by slice and run mode
//!
//! Slice draws hash the pipeline seed with the instance id, so a seeded
//! pipeline assigns the same slice to the same instance in any order.

pub mod filters;
pub mod score;
pub mod state;

pub use filters::{filter_results_by_mode, filter_results_by_slice, scores_by_instance, TaskResult};
pub use score::{calculate_contamination_score, ContaminationReport, HIGH_CONTAMINATION_THRESHOLD};
pub use state::{PipelineCounters, PipelineState, PreparationStage, StageTrace};

use crate::retro_holdout::{RetroHoldoutGenerator, RetroHoldoutStatistics};
use chrono::Utc;
use holdout_core::mutation::verify::EquivalenceReport;
use holdout_core::{ErrorCode, Failure};
use holdout_types::{AntiContaminationConfig, EvaluationSlice, TaskInstance, TaskMetadata};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// A prepared task and the provenance it will be scored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTask {
    pub instance: TaskInstance,
    pub metadata: TaskMetadata,
    pub stages: StageTrace,
    /// Why a requested mutation was discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_failure: Option<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equivalence: Option<EquivalenceReport>,
}

impl PreparedTask {
    pub fn into_parts(self) -> (TaskInstance, TaskMetadata) {
        (self.instance, self.metadata)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatistics {
    #[serde(flatten)]
    pub counters: PipelineCounters,
    pub config: AntiContaminationConfig,
    pub retro_holdout_stats: RetroHoldoutStatistics,
    pub total_processed: usize,
    pub seed: u64,
}

struct MutationAttempt {
    instance: TaskInstance,
    metadata: TaskMetadata,
    failure: Option<Failure>,
    equivalence: Option<EquivalenceReport>,
}

pub struct AntiContaminationPipeline {
    config: AntiContaminationConfig,
    retro: RetroHoldoutGenerator,
    state: PipelineState,
}

impl AntiContaminationPipeline {
    pub fn new(config: AntiContaminationConfig) -> Self {
        let retro = RetroHoldoutGenerator::new(config.mutation_seed);
        Self {
            config,
            retro,
            state: PipelineState::default(),
        }
    }

    /// Replace the retro-holdout generator, e.g. to inject a test runner.
    /// Its seed becomes the pipeline seed.
    pub fn with_retro_holdout(mut self, retro: RetroHoldoutGenerator) -> Self {
        self.retro = retro;
        self
    }

    pub fn config(&self) -> &AntiContaminationConfig {
        &self.config
    }

    /// Effective seed for slice draws and mutations.
    pub fn seed(&self) -> u64 {
        self.retro.seed()
    }

    /// Fresh provenance, then post-cutoff, then a seeded draw for mutated,
    /// then verified.
    pub fn select_slice(&self, instance: &TaskInstance) -> EvaluationSlice {
        if instance.has_fresh_provenance() && self.config.is_slice_enabled(EvaluationSlice::Fresh) {
            return EvaluationSlice::Fresh;
        }

        if let (Some(cutoff), Some(raw)) = (self.config.model_training_cutoff, instance.created_at.as_deref()) {
            match instance.created_at_utc() {
                Some(created) if created > cutoff && self.config.is_slice_enabled(EvaluationSlice::PostCutoff) => {
                    return EvaluationSlice::PostCutoff;
                }
                Some(_) => {}
                None => warn!(instance_id = %instance.instance_id, created_at = raw, "unparseable created_at"),
            }
        }

        if self.config.is_slice_enabled(EvaluationSlice::Mutated)
            && slice_draw(self.seed(), &instance.instance_id) < self.config.mutated_slice_probability
        {
            return EvaluationSlice::Mutated;
        }

        EvaluationSlice::Verified
    }

    pub fn prepare_task(
        &self,
        instance: &TaskInstance,
        repo_path: &Path,
        slice_override: Option<EvaluationSlice>,
        heuristics_override: Option<bool>,
    ) -> PreparedTask {
        let instance_id = instance.instance_id.as_str();
        let mut stages = StageTrace::default();

        let slice = slice_override.unwrap_or_else(|| self.select_slice(instance));
        let heuristics = heuristics_override.unwrap_or(self.config.allow_heuristics);
        stages.advance(PreparationStage::SliceSelected);
        debug!(instance_id, slice = %slice, heuristics, "slice selected");

        let base = TaskMetadata::new(slice, heuristics)
            .with_base_commit(Some(instance.base_commit.clone()))
            .with_training_cutoff(self.config.model_training_cutoff);

        let mut prepared = instance.clone();
        let mut failure = None;
        let mut equivalence = None;
        let mut mutation_attempted = false;

        let metadata = match slice {
            EvaluationSlice::Mutated if self.config.enable_mutations => {
                mutation_attempted = true;
                let attempt = self.apply_mutation(instance, repo_path, base);
                prepared = attempt.instance;
                failure = attempt.failure;
                equivalence = attempt.equivalence;
                attempt.metadata
            }
            EvaluationSlice::Fresh => {
                let harvested_at = instance.harvested_at_utc().unwrap_or_else(Utc::now);
                base.with_harvested_at(harvested_at)
            }
            EvaluationSlice::Adversarial => {
                prepared.adversarial_enabled = true;
                base
            }
            _ => base,
        };

        stages.advance(if metadata.mutation_applied() {
            PreparationStage::MutationApplied
        } else {
            PreparationStage::MutationSkipped
        });
        self.state.record(instance_id, metadata.clone(), mutation_attempted);
        stages.advance(PreparationStage::MetadataRecorded);

        info!(
            instance_id,
            slice = %metadata.evaluation_slice(),
            mode = %metadata.run_mode(),
            mutation = metadata.mutation_applied(),
            "prepared task"
        );
        PreparedTask {
            instance: prepared,
            metadata,
            stages,
            mutation_failure: failure,
            equivalence,
        }
    }

    fn apply_mutation(&self, instance: &TaskInstance, repo_path: &Path, base: TaskMetadata) -> MutationAttempt {
        let level = self.config.mutation_level;
        let seed = self.retro.seed_for(&instance.instance_id);
        let discarded = |failure: Failure, equivalence: Option<EquivalenceReport>| MutationAttempt {
            instance: instance.clone(),
            metadata: base.clone().with_failed_mutation(seed, level),
            failure: Some(failure),
            equivalence,
        };

        let holdout = match self.retro.generate(instance, repo_path, level) {
            Ok(holdout) => holdout,
            Err(err) => {
                warn!(instance_id = %instance.instance_id, error = %err, "mutation failed, keeping original");
                return discarded(err.failure(), None);
            }
        };

        let mut equivalence = None;
        if self.config.verify_semantic_equivalence && !instance.test_commands.is_empty() {
            let report = self.retro.verify_semantic_equivalence(
                repo_path,
                &holdout.mutated_repo,
                &instance.test_commands,
                self.config.verification_timeout(),
            );
            if !report.equivalent {
                warn!(instance_id = %instance.instance_id, "mutation broke semantic equivalence, reverting");
                if let Err(err) = self.retro.discard(&holdout) {
                    warn!(error = %err, "could not remove mutated copy");
                }
                let failure = report
                    .failure
                    .clone()
                    .unwrap_or_else(|| Failure::new(ErrorCode::TestsDiverged, "test results differ after mutation"));
                return discarded(failure, Some(report));
            }
            equivalence = Some(report);
        }

        MutationAttempt {
            metadata: base.with_mutation(holdout.seed, level),
            instance: holdout.instance,
            failure: None,
            equivalence,
        }
    }

    pub fn get_task_metadata(&self, instance_id: &str) -> Option<TaskMetadata> {
        self.state.metadata(instance_id)
    }

    pub fn processed_instances(&self) -> BTreeMap<String, TaskMetadata> {
        self.state.processed()
    }

    pub fn statistics(&self) -> PipelineStatistics {
        PipelineStatistics {
            counters: self.state.counters(),
            config: self.config.clone(),
            retro_holdout_stats: self.retro.statistics(),
            total_processed: self.state.processed_count(),
            seed: self.seed(),
        }
    }

    pub fn calculate_contamination_score(
        &self,
        verified: &BTreeMap<String, f64>,
        mutated: &BTreeMap<String, f64>,
    ) -> ContaminationReport {
        calculate_contamination_score(verified, mutated)
    }
}

/// Uniform draw in `[0, 1)` fixed by seed and instance id.
fn slice_draw(seed: u64, instance_id: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(b"slice");
    hasher.update(instance_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instance(id: &str) -> TaskInstance {
        TaskInstance::new(id, "acme/widgets", "abc", "It breaks.", "")
    }

    fn pipeline(config: AntiContaminationConfig) -> AntiContaminationPipeline {
        AntiContaminationPipeline::new(AntiContaminationConfig {
            mutation_seed: Some(42),
            ..config
        })
    }

    #[test]
    fn test_fresh_beats_everything_when_enabled() {
        let p = pipeline(AntiContaminationConfig {
            enabled_slices: vec![EvaluationSlice::Verified, EvaluationSlice::Fresh, EvaluationSlice::Mutated],
            mutated_slice_probability: 1.0,
            ..Default::default()
        });
        let mut harvested = instance("x-1");
        harvested.is_fresh = true;
        assert_eq!(p.select_slice(&harvested), EvaluationSlice::Fresh);
    }

    #[test]
    fn test_post_cutoff_requires_listed_slice() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut late = instance("x-2");
        late.created_at = Some("2024-06-01T00:00:00Z".to_string());

        let unlisted = pipeline(AntiContaminationConfig {
            model_training_cutoff: Some(cutoff),
            mutated_slice_probability: 0.0,
            ..Default::default()
        });
        assert_eq!(unlisted.select_slice(&late), EvaluationSlice::Verified);

        let listed = pipeline(AntiContaminationConfig {
            model_training_cutoff: Some(cutoff),
            enabled_slices: vec![EvaluationSlice::Verified, EvaluationSlice::PostCutoff],
            ..Default::default()
        });
        assert_eq!(listed.select_slice(&late), EvaluationSlice::PostCutoff);
        late.created_at = Some("2023-06-01T00:00:00Z".to_string());
        assert_eq!(listed.select_slice(&late), EvaluationSlice::Verified);
    }

    #[test]
    fn test_slice_draw_is_deterministic_and_in_range() {
        for id in ["a", "b", "c", "django__django-1"] {
            let draw = slice_draw(9, id);
            assert!((0.0..1.0).contains(&draw));
            assert_eq!(draw, slice_draw(9, id));
        }
        let p = pipeline(AntiContaminationConfig::default());
        let q = pipeline(AntiContaminationConfig::default());
        for i in 0..20 {
            let inst = instance(&format!("id-{i}"));
            assert_eq!(p.select_slice(&inst), q.select_slice(&inst));
        }
    }

    #[test]
    fn test_adversarial_and_fresh_preparation() {
        let p = pipeline(AntiContaminationConfig::default());
        let prepared = p.prepare_task(&instance("adv-1"), Path::new("/nonexistent"), Some(EvaluationSlice::Adversarial), None);
        assert!(prepared.instance.adversarial_enabled);
        assert_eq!(prepared.stages.current(), PreparationStage::MetadataRecorded);

        let mut fresh = instance("fresh-1");
        fresh.harvested_at = Some("2025-02-03T04:05:06Z".to_string());
        let prepared = p.prepare_task(&fresh, Path::new("/nonexistent"), Some(EvaluationSlice::Fresh), Some(true));
        assert_eq!(
            prepared.metadata.harvested_at(),
            Some(Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap())
        );
        assert!(prepared.metadata.heuristics_allowed());

        let stats = p.statistics();
        assert_eq!(stats.counters.adversarial_count, 1);
        assert_eq!(stats.counters.fresh_count, 1);
        assert_eq!(stats.counters.heuristic_runs, 1);
        assert_eq!(stats.total_processed, 2);
        assert!(p.get_task_metadata("fresh-1").is_some());
    }

    #[test]
    fn test_mutation_failure_keeps_original() {
        let p = pipeline(AntiContaminationConfig::default());
        let original = instance("broken-1");
        let prepared = p.prepare_task(&original, Path::new("/definitely/not/here"), Some(EvaluationSlice::Mutated), None);
        assert_eq!(prepared.instance, original);
        assert!(!prepared.metadata.mutation_applied());
        assert_eq!(prepared.metadata.evaluation_slice(), EvaluationSlice::Mutated);
        assert_eq!(prepared.metadata.effective_slice(), EvaluationSlice::Verified);
        assert_eq!(prepared.mutation_failure.unwrap().code, ErrorCode::PathNotFound);
        assert_eq!(p.statistics().counters.mutation_failures, 1);
    }
}
