//! Holdout Bench
//!
//! Anti-contamination tooling for evaluating coding agents on benchmark tasks:
//!
//! - **Retro-holdout generation**: rewrite a task's repository into a
//!   behavior-equivalent but lexically different copy and remap the task to it
//! - **Slice tracking**: assign each task to an evaluation slice and record its
//!   provenance in immutable [`TaskMetadata`]
//! - **Contamination scoring**: compare verified and mutated scores per task
//! - **Fresh issues**: register harvested issues and convert them to tasks
//!
//! The mutation and probing machinery lives in [`holdout_core`]; the shared
//! record types live in [`holdout_types`]. See [`pipeline`] for the entry point.

#![allow(clippy::too_many_arguments)]

pub mod api;
pub mod harvest;
pub mod pipeline;
pub mod retro_holdout;

pub use holdout_core;
pub use holdout_types;

pub use holdout_types::{
    AntiContaminationConfig, EvaluationSlice, MutationLevel, RunMode, TaskInstance, TaskMetadata,
};
pub use pipeline::{AntiContaminationPipeline, ContaminationReport, PreparedTask};
pub use retro_holdout::{RetroHoldout, RetroHoldoutGenerator};

use holdout_core::{ErrorCode, Failure};
use std::path::PathBuf;

/// Errors raised while turning an instance into a retro-holdout.
#[derive(Debug, thiserror::Error)]
pub enum HoldoutError {
    #[error("repository mutation failed: {0}")]
    Repository(Failure),

    #[error("mutated repository is not equivalent: {0}")]
    Verification(Failure),

    #[error("cannot place a mutated copy next to {}", path.display())]
    NoSiblingDirectory { path: PathBuf },

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HoldoutError {
    /// The structured form recorded in results.
    pub fn failure(&self) -> Failure {
        match self {
            HoldoutError::Repository(failure) | HoldoutError::Verification(failure) => failure.clone(),
            HoldoutError::NoSiblingDirectory { path } => {
                Failure::new(ErrorCode::NotADirectory, self.to_string()).with_context("path", path.display().to_string())
            }
            HoldoutError::Io { path, .. } => {
                Failure::new(ErrorCode::IoError, self.to_string()).with_context("path", path.display().to_string())
            }
        }
    }
}
