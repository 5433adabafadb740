//! Repository and single-file mutation commands.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use holdout_bench::api;
use holdout_core::mutation::{EngineConfig, MutationEngine, RepositoryMutationResult};
use std::path::PathBuf;

use super::output::{print_json, read_text};

/// Engine switches shared by both mutation commands.
#[derive(Parser, Debug)]
pub struct EngineArgs {
    /// Seed for reproducible mutations (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip identifier renaming and function reordering
    #[arg(long)]
    pub no_structural: bool,

    /// Skip folding, loop rewriting, inlining and dead-code removal
    #[arg(long)]
    pub no_semantic: bool,
}

impl EngineArgs {
    fn config(&self, mutation_rate: f64) -> Result<EngineConfig> {
        if !(0.0..=1.0).contains(&mutation_rate) {
            return Err(anyhow!("--rate must be within [0, 1], got {mutation_rate}"));
        }
        Ok(EngineConfig {
            enable_structural: !self.no_structural,
            enable_semantic: !self.no_semantic,
            mutation_rate,
            seed: self.seed,
            ..EngineConfig::default()
        })
    }
}

#[derive(Parser, Debug)]
#[command(about = "Mutate every Python file of a repository")]
pub struct MutateRepoCmd {
    /// Repository root
    pub path: PathBuf,

    /// Write the mutated copy here instead of mutating in place
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Fraction of eligible files to mutate
    #[arg(long, default_value_t = 0.3)]
    pub rate: f64,

    /// Mutate test files too
    #[arg(long)]
    pub include_tests: bool,

    /// Mutate files one at a time
    #[arg(long)]
    pub sequential: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

impl MutateRepoCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let config = EngineConfig {
            preserve_tests: !self.include_tests,
            parallel: !self.sequential,
            ..self.engine.config(self.rate)?
        };
        let result = api::mutate_repository(&self.path, self.output.as_deref(), config);

        if json_output {
            print_json(&result)?;
        } else {
            print_repository_summary(&result);
        }

        match &result.error {
            Some(failure) if !result.success => Err(anyhow!("mutation of {} failed: {failure}", self.path.display())),
            _ => Ok(()),
        }
    }
}

fn print_repository_summary(result: &RepositoryMutationResult) {
    println!("Repository: {}", result.root.display());
    println!("Seed:       {}", result.seed);
    println!(
        "Files:      {} mutated, {} skipped, {} total",
        result.mutated_files.len(),
        result.skipped_files.len(),
        result.total_files
    );
    let stats = &result.statistics;
    println!(
        "Renamed:    {} variables, {} functions, {} classes",
        stats.variables_renamed, stats.functions_renamed, stats.classes_renamed
    );
    println!(
        "Rewritten:  {} constants, {} loops, {} inlined, {} dead blocks, {} reordered",
        stats.constants_modified,
        stats.loops_transformed,
        stats.functions_inlined,
        stats.dead_code_removed,
        stats.functions_reordered
    );
    for file in &result.mutated_files {
        println!("  M {file}");
    }
    for err in &result.errors {
        println!("  ! {}: {}", err.file, err.error);
    }
}

#[derive(Parser, Debug)]
#[command(about = "Mutate a single Python source file")]
pub struct MutateCodeCmd {
    /// Python source file
    pub file: PathBuf,

    /// Write the mutated source here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Number of distinct variants to emit (each with its own derived seed)
    #[arg(long, default_value_t = 1)]
    pub variants: usize,

    #[command(flatten)]
    pub engine: EngineArgs,
}

impl MutateCodeCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let code = read_text(&self.file)?;
        let filename = self.file.to_string_lossy();
        let engine = MutationEngine::new(self.engine.config(1.0)?);

        if self.variants > 1 {
            let variants = engine.create_mutation_variants(&code, self.variants);
            if json_output {
                print_json(&variants)?;
            } else {
                for (idx, variant) in variants.iter().enumerate() {
                    println!("# --- variant {} ---", idx + 1);
                    print!("{variant}");
                }
            }
            return Ok(());
        }

        let outcome = engine.mutate_code_detailed(&code, &filename);
        if let Some(path) = &self.output {
            std::fs::write(path, &outcome.source).with_context(|| format!("write {}", path.display()))?;
        }

        match (&self.output, json_output) {
            (_, true) => print_json(&outcome)?,
            (Some(path), false) => println!("Wrote {} ({} changes)", path.display(), outcome.total_changes()),
            (None, false) => print!("{}", outcome.source),
        }

        match outcome.failure {
            Some(failure) => Err(anyhow!("{} left unchanged: {failure}", self.file.display())),
            None => Ok(()),
        }
    }
}
