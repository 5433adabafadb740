//! Behavior-preserving source mutation.
//!
//! # Architecture
//!
//! - [`StructuralMutator`]: renaming, top-level reordering, constant folding
//! - [`SemanticMutator`]: loop conversion, inlining, folding, dead-code
//!   elimination, boolean simplification, De Morgan
//! - [`MutationEngine`]: walks a repository and applies both stages per file
//! - [`verify`]: test-command runner used for semantic-equivalence checks
//!
//! Every transformation is a [`MutationStage`]. Stages run in a fixed order on
//! a clone of the current tree; a stage that returns a [`TransformError`] is
//! rolled back and later stages continue from the last good tree.

mod config;
pub mod engine;
pub mod fold;
pub mod inline;
pub mod loops;
pub mod rename;
pub mod reorder;
mod semantic;
pub mod simplify;
mod structural;
pub mod verify;

pub use config::{MutationConfig, SemanticConfig};
pub use engine::{
    EngineConfig, FileError, MutationEngine, MutationStatistics, RepositoryMutationResult,
};
pub use rename::{IdentifierKind, RenameMap};
pub use semantic::SemanticMutator;
pub use structural::StructuralMutator;

use crate::errors::{ErrorCode, Failure, TransformError};
use crate::pyast::{parse_module, unparse, Module};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Mutable state threaded through one file's stages.
pub struct StageContext<'a> {
    pub rng: &'a mut StdRng,
    /// Renames applied so far in this file.
    pub renames: RenameMap,
}

impl<'a> StageContext<'a> {
    pub fn new(rng: &'a mut StdRng) -> Self {
        Self {
            rng,
            renames: RenameMap::default(),
        }
    }
}

pub trait MutationStage {
    fn name(&self) -> &'static str;

    /// Rewrite `module` in place and return how many sites changed.
    fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>) -> Result<usize, TransformError>;
}

/// Per-stage outcome for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub changes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

/// Result of mutating one source unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub source: String,
    pub changed: bool,
    pub stages: Vec<StageReport>,
    pub renames: RenameMap,
    /// Set when the input did not parse or the output failed verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl MutationOutcome {
    pub fn unchanged(source: &str) -> Self {
        Self {
            source: source.to_string(),
            changed: false,
            stages: Vec::new(),
            renames: RenameMap::default(),
            failure: None,
        }
    }

    pub fn failed(source: &str, failure: Failure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::unchanged(source)
        }
    }

    pub fn total_changes(&self) -> usize {
        self.stages.iter().map(|s| s.changes).sum()
    }
}

/// Run `stages` in order, each on a clone of the last good tree.
pub(crate) fn run_stages(
    module: &mut Module,
    stages: &[&dyn MutationStage],
    ctx: &mut StageContext<'_>,
    file: &str,
) -> Vec<StageReport> {
    let mut reports = Vec::with_capacity(stages.len());
    for stage in stages {
        let mut candidate = module.clone();
        match stage.apply(&mut candidate, ctx) {
            Ok(changes) => {
                if changes > 0 {
                    *module = candidate;
                }
                debug!(file, stage = stage.name(), changes, "stage complete");
                reports.push(StageReport {
                    stage: stage.name().to_string(),
                    changes,
                    failure: None,
                });
            }
            Err(err) => {
                warn!(file, stage = stage.name(), error = %err, "transform stage failed, keeping last good tree");
                reports.push(StageReport {
                    stage: stage.name().to_string(),
                    changes: 0,
                    failure: Some(Failure::transform(&err).with_context("file", file)),
                });
            }
        }
    }
    reports
}

/// Print the mutated tree and check it. An unchanged tree yields the original
/// text byte-for-byte; output that no longer parses is discarded.
pub(crate) fn finish(
    source: &str,
    original: &Module,
    mutated: &Module,
    stages: Vec<StageReport>,
    renames: RenameMap,
    file: &str,
) -> MutationOutcome {
    if mutated == original {
        return MutationOutcome {
            stages,
            ..MutationOutcome::unchanged(source)
        };
    }
    let text = unparse(mutated);
    if let Err(err) = parse_module(&text) {
        warn!(file, error = %err, "mutated source failed to reparse, keeping original");
        let failure = Failure::new(ErrorCode::SyntaxCheckFailed, err.to_string()).with_context("file", file);
        return MutationOutcome {
            stages,
            ..MutationOutcome::failed(source, failure)
        };
    }
    MutationOutcome {
        source: text,
        changed: true,
        stages,
        renames,
        failure: None,
    }
}

/// Parse `source`, logging and converting the error into a failed outcome.
pub(crate) fn parse_or_fail(source: &str, file: &str) -> Result<Module, MutationOutcome> {
    parse_module(source).map_err(|err| {
        warn!(file, error = %err, "source does not parse, leaving it unchanged");
        MutationOutcome::failed(source, Failure::parse(&err).with_context("file", file))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyast::Stmt;
    use rand::SeedableRng;

    struct DropPass;

    impl MutationStage for DropPass {
        fn name(&self) -> &'static str {
            "drop_pass"
        }

        fn apply(&self, module: &mut Module, _ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
            let before = module.body.len();
            module.body.retain(|s| !matches!(s, Stmt::Pass));
            Ok(before - module.body.len())
        }
    }

    struct Broken;

    impl MutationStage for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn apply(&self, module: &mut Module, _ctx: &mut StageContext<'_>) -> Result<usize, TransformError> {
            module.body.clear();
            Err(TransformError::Invariant {
                stage: "broken",
                detail: "always fails".into(),
            })
        }
    }

    #[test]
    fn test_failed_stage_rolls_back_and_later_stages_run() {
        let mut module = parse_module("x = 1\npass\n").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut ctx = StageContext::new(&mut rng);
        let reports = run_stages(&mut module, &[&Broken, &DropPass], &mut ctx, "demo.py");
        assert_eq!(module.body.len(), 1);
        assert!(reports[0].failure.is_some());
        assert_eq!(reports[1].changes, 1);
    }
}
