//! holdout-bench: anti-contamination tooling for coding-agent benchmarks
//!
//! ## Features
//!
//! - **mutate-repo**: Write a behavior-equivalent, lexically different copy of a repository
//! - **mutate-code**: Mutate a single Python file
//! - **mutation-test**: Score how well an expected patch pins down a generated one
//! - **fuzz**: Probe a patch's functions with seeded random and edge-case inputs
//! - **adversarial**: Check a patch against heuristic adversarial probes
//! - **prepare**: Assign a task to an evaluation slice and prepare it
//! - **contamination-score**: Compare verified and mutated scores
//!
//! ## Example Usage
//!
//! ```bash
//! # Mutate a checkout into ./repo-mutated with a fixed seed
//! holdout-bench mutate-repo ./repo --output ./repo-mutated --seed 42
//!
//! # Prepare a task for the mutated slice
//! holdout-bench prepare task.json --repo ./repo --slice mutated --seed 42
//!
//! # Score contamination from two score maps
//! holdout-bench --json contamination-score --verified verified.json --mutated mutated.json
//! ```

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod holdout_cli;

use holdout_cli::{
    contamination::ContaminationScoreCmd,
    mutate::{MutateCodeCmd, MutateRepoCmd},
    prepare::PrepareCmd,
    probe::{AdversarialCmd, FuzzCmd, MutationTestCmd},
};

#[derive(Parser)]
#[command(
    name = "holdout-bench",
    author,
    version,
    about = "Anti-contamination tooling for coding-agent benchmarks",
    long_about = "Retro-holdout generation, evaluation slices, patch mutation testing and \
                  fuzz probes for SWE-bench-style task instances."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging on stderr)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mutate every Python file of a repository
    MutateRepo(MutateRepoCmd),

    /// Mutate a single Python source file
    MutateCode(MutateCodeCmd),

    /// Run patch mutation testing against an expected patch
    MutationTest(MutationTestCmd),

    /// Fuzz the functions a patch defines
    Fuzz(FuzzCmd),

    /// Evaluate a patch against adversarial probes
    Adversarial(AdversarialCmd),

    /// Prepare a task instance for evaluation
    Prepare(PrepareCmd),

    /// Compute contamination scores from verified and mutated results
    ContaminationScore(ContaminationScoreCmd),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let Cli { command, json, verbose } = Cli::parse();
    init_tracing(verbose);

    let result = match command {
        Commands::MutateRepo(cmd) => cmd.execute(json),
        Commands::MutateCode(cmd) => cmd.execute(json),
        Commands::MutationTest(cmd) => cmd.execute(json),
        Commands::Fuzz(cmd) => cmd.execute(json),
        Commands::Adversarial(cmd) => cmd.execute(json),
        Commands::Prepare(cmd) => cmd.execute(json),
        Commands::ContaminationScore(cmd) => cmd.execute(json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", holdout_cli::output::format_error(&err, json));
            ExitCode::FAILURE
        }
    }
}
