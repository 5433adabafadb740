//! Contamination scoring command.

use anyhow::{anyhow, Result};
use clap::Parser;
use holdout_bench::api;
use holdout_bench::pipeline::{filter_results_by_slice, scores_by_instance, TaskResult, HIGH_CONTAMINATION_THRESHOLD};
use holdout_types::EvaluationSlice;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::output::{format_score, print_json, read_json};

#[derive(Parser, Debug)]
#[command(about = "Compute contamination scores from verified and mutated results")]
pub struct ContaminationScoreCmd {
    /// JSON object mapping instance id to its verified-slice score
    #[arg(long, requires = "mutated", required_unless_present = "results")]
    pub verified: Option<PathBuf>,

    /// JSON object mapping instance id to its mutated-slice score
    #[arg(long, requires = "verified")]
    pub mutated: Option<PathBuf>,

    /// JSON array of scored results carrying task metadata; split by effective slice
    #[arg(long, conflicts_with_all = ["verified", "mutated"])]
    pub results: Option<PathBuf>,
}

impl ContaminationScoreCmd {
    fn load_scores(&self) -> Result<(BTreeMap<String, f64>, BTreeMap<String, f64>)> {
        if let Some(path) = &self.results {
            let results: Vec<TaskResult> = read_json(path)?;
            let verified = scores_by_instance(filter_results_by_slice(&results, EvaluationSlice::Verified, true));
            let mutated = scores_by_instance(filter_results_by_slice(&results, EvaluationSlice::Mutated, true));
            return Ok((verified, mutated));
        }
        match (&self.verified, &self.mutated) {
            (Some(verified), Some(mutated)) => Ok((read_json(verified)?, read_json(mutated)?)),
            _ => Err(anyhow!("either --results or both --verified and --mutated are required")),
        }
    }

    pub fn execute(&self, json_output: bool) -> Result<()> {
        let (verified, mutated) = self.load_scores()?;
        let report = api::calculate_contamination_score(&verified, &mutated);

        if json_output {
            return print_json(&report);
        }

        println!(
            "Compared {} instances; average contamination {}",
            report.instances_compared,
            format_score(report.average_contamination)
        );
        println!(
            "High contamination (> {}): {}",
            format_score(HIGH_CONTAMINATION_THRESHOLD),
            report.high_contamination_count
        );
        for (id, score) in report
            .per_instance
            .iter()
            .filter(|(_, score)| **score > HIGH_CONTAMINATION_THRESHOLD)
        {
            println!("  {id}: {}", format_score(*score));
        }
        Ok(())
    }
}
