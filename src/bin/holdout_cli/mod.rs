//! CLI subcommand implementations for holdout-bench

pub mod contamination;
pub mod mutate;
pub mod output;
pub mod prepare;
pub mod probe;
