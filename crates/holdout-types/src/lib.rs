//! Shared types for the holdout-bench workspace.
//!
//! Task records, evaluation slices, provenance metadata and the
//! anti-contamination configuration, kept apart from the mutation core so
//! result consumers can depend on them alone.

pub mod config;
pub mod env_utils;
pub mod instance;
pub mod metadata;
pub mod slice;

pub use config::AntiContaminationConfig;
pub use instance::{parse_timestamp, CodeMutations, TaskInstance, HARVESTED_SOURCE};
pub use metadata::TaskMetadata;
pub use slice::{EvaluationSlice, MutationLevel, ParseEnumError, RunMode};
