#![allow(dead_code, unused_imports)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: on-disk Python repositories and task instances
//! - `runners`: scripted [`TestCommandRunner`] doubles

pub mod fixtures;
pub mod runners;

pub use fixtures::{read, sample_instance, sample_repo, write_file, GEOMETRY_SOURCE, TEST_FOO_SOURCE};
pub use runners::ScriptedRunner;

use holdout_core::mutation::verify::TestCommandRunner;
