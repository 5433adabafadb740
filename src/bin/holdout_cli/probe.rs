//! Patch quality probes: mutation testing, fuzzing and adversarial checks.

use anyhow::Result;
use clap::Parser;
use holdout_bench::api;
use holdout_core::adversarial::{AdversarialEvaluation, AdversarialGenerator, AdversarialSuite, Verdict};
use holdout_core::patch::analyze_survivors;
use serde::Serialize;
use std::path::PathBuf;

use super::output::{format_score, print_json, read_optional_text, read_text};

#[derive(Parser, Debug)]
#[command(about = "Run patch mutation testing against an expected patch")]
pub struct MutationTestCmd {
    /// Patch produced by the agent
    #[arg(long)]
    pub generated: PathBuf,

    /// Reference patch the mutants are judged against
    #[arg(long)]
    pub expected: PathBuf,

    /// Maximum number of mutants to evaluate
    #[arg(long, default_value_t = 10)]
    pub max_mutations: usize,
}

impl MutationTestCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let generated = read_text(&self.generated)?;
        let expected = read_text(&self.expected)?;
        let result = api::run_mutation_testing(&generated, &expected, self.max_mutations);

        if json_output {
            return print_json(&result);
        }

        println!(
            "Mutation score: {} ({} killed, {} survived, {} total)",
            format_score(result.score),
            result.killed,
            result.survived,
            result.total_mutants
        );
        let analysis = analyze_survivors(&result);
        for (kind, tally) in &analysis.by_type {
            println!("  {:<10} {}/{} killed", kind.as_str(), tally.killed, tally.total);
        }
        for survivor in &analysis.survivors {
            println!("  survived {} at {}: {}", survivor.name, survivor.location, survivor.recommendation);
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(about = "Fuzz the functions a patch defines")]
pub struct FuzzCmd {
    /// Patch to probe
    #[arg(long)]
    pub patch: PathBuf,

    /// Problem statement used to pick edge cases
    #[arg(long)]
    pub problem: Option<PathBuf>,

    /// Random cases per function signature
    #[arg(long, default_value_t = 20)]
    pub num_tests: usize,

    /// Seed for reproducible inputs
    #[arg(long)]
    pub seed: Option<u64>,
}

impl FuzzCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let patch = read_text(&self.patch)?;
        let problem = read_optional_text(self.problem.as_deref())?;
        let result = api::run_fuzz_tests(&patch, &problem, self.num_tests, self.seed);

        if json_output {
            return print_json(&result);
        }

        println!(
            "Fuzz score: {} ({} passed, {} failed, {} crashes, seed {})",
            format_score(result.score),
            result.passed,
            result.failed,
            result.crashes,
            result.seed
        );
        if !result.keywords.is_empty() {
            println!("Keywords: {}", result.keywords.join(", "));
        }
        for case in result.test_cases.iter().filter(|c| !c.passed) {
            let inputs: Vec<String> = case.inputs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            println!(
                "  FAIL {}({}): {}",
                case.name,
                inputs.join(", "),
                case.actual_result.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(about = "Evaluate a patch against adversarial probes")]
pub struct AdversarialCmd {
    /// Patch to evaluate
    #[arg(long)]
    pub patch: PathBuf,

    /// Problem statement used to prioritize probe categories
    #[arg(long)]
    pub problem: Option<PathBuf>,

    /// Number of probes to generate
    #[arg(long, default_value_t = 5)]
    pub num_cases: usize,
}

#[derive(Serialize)]
struct AdversarialReport {
    suite: AdversarialSuite,
    evaluation: AdversarialEvaluation,
}

impl AdversarialCmd {
    pub fn execute(&self, json_output: bool) -> Result<()> {
        let patch = read_text(&self.patch)?;
        let problem = read_optional_text(self.problem.as_deref())?;

        // No collaborator is wired into the CLI; probes come from the heuristic library.
        let generator = AdversarialGenerator::new();
        let mut suite = generator.generate_edge_cases(&problem, &patch, self.num_cases);
        generator.annotate(&patch, &mut suite.tests);
        let evaluation = generator.evaluate_patch_against_tests(&patch, &suite.tests);

        if json_output {
            return print_json(&AdversarialReport { suite, evaluation });
        }

        println!(
            "Adversarial score: {} ({} handled, {} vulnerable, {} unknown)",
            format_score(evaluation.score),
            evaluation.likely_handled,
            evaluation.likely_vulnerable,
            evaluation.unknown
        );
        for detail in &evaluation.details {
            let marker = match detail.verdict {
                Verdict::LikelyHandled => "ok",
                Verdict::LikelyVulnerable => "!!",
                Verdict::Maybe | Verdict::Unknown => "??",
            };
            println!("  [{marker}] {} ({})", detail.test, detail.category.as_str());
        }
        Ok(())
    }
}
