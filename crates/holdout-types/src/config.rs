//! Anti-contamination settings.
//!
//! Resolution order: [`Default`], then an optional JSON file, then
//! `HOLDOUT_*` environment variables (see [`AntiContaminationConfig::apply_env`]).

use crate::env_utils::{env_bool_or, env_list, env_var, env_var_or};
use crate::instance::parse_timestamp;
use crate::slice::{EvaluationSlice, MutationLevel};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiContaminationConfig {
    pub enable_mutations: bool,
    pub enable_fresh_harvesting: bool,
    pub enable_post_cutoff_filter: bool,
    /// Off by default; probing is slow.
    pub enable_adversarial_tests: bool,

    pub mutation_level: MutationLevel,
    /// Fixed seed for reproducible mutations; drawn per run otherwise.
    pub mutation_seed: Option<u64>,
    pub verify_semantic_equivalence: bool,
    pub verification_timeout_secs: u64,

    pub max_issue_age_hours: u64,
    pub min_repo_stars: u64,

    pub model_training_cutoff: Option<DateTime<Utc>>,

    /// Default run mode is LLM-only.
    pub allow_heuristics: bool,

    pub enabled_slices: Vec<EvaluationSlice>,
    /// Chance that an otherwise unassigned instance lands in the mutated slice.
    pub mutated_slice_probability: f64,
}

impl Default for AntiContaminationConfig {
    fn default() -> Self {
        Self {
            enable_mutations: true,
            enable_fresh_harvesting: true,
            enable_post_cutoff_filter: true,
            enable_adversarial_tests: false,
            mutation_level: MutationLevel::Medium,
            mutation_seed: None,
            verify_semantic_equivalence: true,
            verification_timeout_secs: 300,
            max_issue_age_hours: 24,
            min_repo_stars: 100,
            model_training_cutoff: None,
            allow_heuristics: false,
            enabled_slices: vec![EvaluationSlice::Verified, EvaluationSlice::Mutated],
            mutated_slice_probability: 0.5,
        }
    }
}

impl AntiContaminationConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `HOLDOUT_*` variables. A set but malformed enum, slice list or
    /// timestamp is an error; malformed numbers and booleans keep the current value.
    pub fn apply_env(&mut self) -> Result<()> {
        self.enable_mutations = env_bool_or("ENABLE_MUTATIONS", self.enable_mutations);
        self.enable_fresh_harvesting = env_bool_or("ENABLE_FRESH_HARVESTING", self.enable_fresh_harvesting);
        self.enable_post_cutoff_filter = env_bool_or("ENABLE_POST_CUTOFF_FILTER", self.enable_post_cutoff_filter);
        self.enable_adversarial_tests = env_bool_or("ENABLE_ADVERSARIAL_TESTS", self.enable_adversarial_tests);
        self.verify_semantic_equivalence =
            env_bool_or("VERIFY_SEMANTIC_EQUIVALENCE", self.verify_semantic_equivalence);
        self.allow_heuristics = env_bool_or("ALLOW_HEURISTICS", self.allow_heuristics);

        self.verification_timeout_secs = env_var_or("VERIFICATION_TIMEOUT_SECS", self.verification_timeout_secs);
        self.max_issue_age_hours = env_var_or("MAX_ISSUE_AGE_HOURS", self.max_issue_age_hours);
        self.min_repo_stars = env_var_or("MIN_REPO_STARS", self.min_repo_stars);
        self.mutated_slice_probability = env_var_or("MUTATED_SLICE_PROBABILITY", self.mutated_slice_probability);
        if let Some(seed) = env_var::<u64>("MUTATION_SEED") {
            self.mutation_seed = Some(seed);
        }

        if let Some(level) = env_var::<String>("MUTATION_LEVEL") {
            self.mutation_level = level.parse().context("HOLDOUT_MUTATION_LEVEL")?;
        }
        if let Some(cutoff) = env_var::<String>("MODEL_TRAINING_CUTOFF") {
            self.model_training_cutoff = Some(
                parse_timestamp(&cutoff)
                    .with_context(|| format!("HOLDOUT_MODEL_TRAINING_CUTOFF: bad timestamp `{cutoff}`"))?,
            );
        }
        let slices = env_list("ENABLED_SLICES");
        if !slices.is_empty() {
            self.enabled_slices = slices
                .iter()
                .map(|s| s.parse::<EvaluationSlice>())
                .collect::<Result<_, _>>()
                .context("HOLDOUT_ENABLED_SLICES")?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.mutated_slice_probability) {
            bail!(
                "mutated_slice_probability must be within [0, 1], got {}",
                self.mutated_slice_probability
            );
        }
        if self.verification_timeout_secs == 0 {
            bail!("verification_timeout_secs must be positive");
        }
        if self.enabled_slices.is_empty() {
            bail!("enabled_slices must name at least one slice");
        }
        Ok(())
    }

    /// Listed in `enabled_slices` and its feature switch is on.
    pub fn is_slice_enabled(&self, slice: EvaluationSlice) -> bool {
        let feature_on = match slice {
            EvaluationSlice::Verified => true,
            EvaluationSlice::Mutated => self.enable_mutations,
            EvaluationSlice::Fresh => self.enable_fresh_harvesting,
            EvaluationSlice::PostCutoff => self.enable_post_cutoff_filter,
            EvaluationSlice::Adversarial => self.enable_adversarial_tests,
        };
        feature_on && self.enabled_slices.contains(&slice)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }
}
