//! Holdout Core
//!
//! Behavior-preserving mutation of Python sources and heuristic robustness
//! probes for generated patches.
//!
//! # Features
//!
//! - **Source mutation**: rename, reorder, fold, simplify, convert loops and
//!   inline functions while keeping the program's behavior
//! - **Repository mutation**: walk a tree, mutate eligible files in parallel,
//!   write atomically and only when the result still parses
//! - **Patch mutation testing**: operator catalog over unified diffs with a
//!   heuristic kill oracle
//! - **Fuzz and adversarial probes**: signature-driven edge cases and a probe
//!   library with an optional text-generation collaborator
//!
//! # Core Modules
//!
//! - [`pyast`]: Python lexer, parser, tree, visitor and printer
//! - [`mutation`]: structural and semantic mutators plus the [`MutationEngine`]
//! - [`patch`]: [`PatchMutationTester`]
//! - [`fuzz`]: [`FuzzTester`]
//! - [`adversarial`]: [`AdversarialGenerator`]
//! - [`errors`]: phase and code taxonomy shared by every result type
//!
//! # Example
//!
//! ```ignore
//! use holdout_core::mutation::{EngineConfig, MutationEngine};
//!
//! let engine = MutationEngine::new(EngineConfig { seed: Some(7), ..Default::default() });
//! let result = engine.mutate_repository(Path::new("repo"), Some(Path::new("repo_mutated")));
//! assert!(result.success);
//! ```

#![allow(clippy::too_many_arguments)]

pub mod adversarial;
pub mod errors;
pub mod fuzz;
pub mod mutation;
pub mod patch;
pub mod pyast;

pub use adversarial::{AdversarialGenerator, MockGenerator, NoopGenerator, TextGenerator};
pub use errors::{ErrorCode, Failure, ParseError, Phase, TransformError};
pub use fuzz::{FuzzConfig, FuzzResult, FuzzTester};
pub use mutation::{EngineConfig, MutationConfig, MutationEngine, RepositoryMutationResult, SemanticConfig};
pub use patch::{MutationResult, PatchMutationTester};
