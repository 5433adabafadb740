//! Task preparation command.

use anyhow::{Context, Result};
use clap::Parser;
use holdout_bench::api;
use holdout_types::{AntiContaminationConfig, EvaluationSlice, MutationLevel, TaskInstance};
use std::path::PathBuf;

use super::output::print_json;

#[derive(Parser, Debug)]
#[command(about = "Assign a task instance to an evaluation slice and prepare it")]
pub struct PrepareCmd {
    /// Task instance JSON (SWE-bench format)
    pub instance: PathBuf,

    /// Checkout of the instance's repository at its base commit
    #[arg(long)]
    pub repo: PathBuf,

    /// Force a slice instead of selecting one
    #[arg(long)]
    pub slice: Option<EvaluationSlice>,

    /// Allow heuristic assistance for this task
    #[arg(long)]
    pub heuristics: bool,

    /// Pipeline configuration JSON (defaults plus HOLDOUT_* environment otherwise)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for slice draws and mutations
    #[arg(long)]
    pub seed: Option<u64>,

    /// Mutation level for the mutated slice
    #[arg(long)]
    pub level: Option<MutationLevel>,

    /// Skip running the instance's test commands after mutating
    #[arg(long)]
    pub skip_verification: bool,
}

impl PrepareCmd {
    fn load_config(&self) -> Result<AntiContaminationConfig> {
        let mut config = match &self.config {
            Some(path) => AntiContaminationConfig::from_json_file(path)?,
            None => AntiContaminationConfig::from_env()?,
        };
        if self.seed.is_some() {
            config.mutation_seed = self.seed;
        }
        if let Some(level) = self.level {
            config.mutation_level = level;
        }
        if self.skip_verification {
            config.verify_semantic_equivalence = false;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn execute(&self, json_output: bool) -> Result<()> {
        let config = self.load_config()?;
        let instance = TaskInstance::from_file(&self.instance)
            .with_context(|| format!("load task instance {}", self.instance.display()))?;
        let heuristics = self.heuristics.then_some(true);

        let prepared = api::prepare_task(&instance, &self.repo, config, self.slice, heuristics);

        if json_output {
            return print_json(&prepared);
        }

        let metadata = &prepared.metadata;
        println!("Instance: {}", prepared.instance.instance_id);
        println!("Slice:    {}", metadata.evaluation_slice());
        if metadata.effective_slice() != metadata.evaluation_slice() {
            println!("          (evaluated as {})", metadata.effective_slice());
        }
        println!("Mode:     {}", metadata.run_mode());
        if let Some(path) = &prepared.instance.mutated_repo_path {
            println!("Repo:     {}", path.display());
        }
        if let Some(seed) = metadata.mutation_seed() {
            println!("Seed:     {seed}");
        }
        if let Some(failure) = &prepared.mutation_failure {
            println!("Mutation discarded: {failure}");
        }
        Ok(())
    }
}
