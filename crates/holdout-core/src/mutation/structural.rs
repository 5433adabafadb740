use super::fold::FoldStage;
use super::rename::RenameStage;
use super::reorder::ReorderStage;
use super::{finish, parse_or_fail, run_stages, MutationConfig, MutationOutcome, MutationStage, StageContext, StageReport};
use crate::pyast::Module;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::debug;

/// Renaming, top-level reordering and constant folding for one source unit.
///
/// ```
/// use holdout_core::mutation::{MutationConfig, StructuralMutator};
///
/// let config = MutationConfig { rename_functions: false, ..MutationConfig::default().with_rate(1.0) };
/// let out = StructuralMutator::new(config).with_seed(1).mutate("def add(a, b): return a + b\n");
/// assert_eq!(out, "def add(var_a, var_b):\n    return var_a + var_b\n");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StructuralMutator {
    config: MutationConfig,
    protected: BTreeSet<String>,
    seed: Option<u64>,
}

impl StructuralMutator {
    pub fn new(config: MutationConfig) -> Self {
        Self {
            config,
            protected: BTreeSet::new(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Names that must keep their spelling, typically because another file
    /// refers to them.
    pub fn with_protected_names(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.protected.extend(names);
        self
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Mutate `source`, returning the original text on any failure.
    pub fn mutate(&self, source: &str) -> String {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.mutate_with_rng(source, "<string>", &mut rng).source
    }

    /// Mutate with a caller-owned RNG, behind the file-level coin flip.
    pub fn mutate_with_rng(&self, source: &str, file: &str, rng: &mut StdRng) -> MutationOutcome {
        if !rng.gen_bool(self.config.rate()) {
            debug!(file, "file-level coin flip skipped mutation");
            return MutationOutcome::unchanged(source);
        }
        let module = match parse_or_fail(source, file) {
            Ok(module) => module,
            Err(outcome) => return outcome,
        };
        let mut mutated = module.clone();
        let mut ctx = StageContext::new(rng);
        let reports = self.apply(&mut mutated, &mut ctx, file);
        finish(source, &module, &mutated, reports, ctx.renames, file)
    }

    /// Run every enabled stage on an already parsed tree, without the coin flip.
    pub(crate) fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>, file: &str) -> Vec<StageReport> {
        let rename = RenameStage {
            config: self.config,
            protected: &self.protected,
        };
        let reorder = ReorderStage {
            functions: self.config.reorder_functions,
            imports: self.config.reorder_imports,
        };
        let mut stages: Vec<&dyn MutationStage> = Vec::new();
        if self.config.renames_enabled() {
            stages.push(&rename);
        }
        if self.config.reorder_functions || self.config.reorder_imports {
            stages.push(&reorder);
        }
        if self.config.modify_constants {
            stages.push(&FoldStage);
        }
        run_stages(module, &stages, ctx, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_identity() {
        let source = "def add(a, b):  # comment kept\n    return a+b\n";
        let mutator = StructuralMutator::new(MutationConfig::default().with_rate(0.0)).with_seed(3);
        assert_eq!(mutator.mutate(source), source);
    }

    #[test]
    fn test_unparseable_input_is_returned_unchanged() {
        let mutator = StructuralMutator::new(MutationConfig::default().with_rate(1.0)).with_seed(3);
        let mut rng = StdRng::seed_from_u64(3);
        let outcome = mutator.mutate_with_rng("def broken(:\n", "bad.py", &mut rng);
        assert_eq!(outcome.source, "def broken(:\n");
        assert!(!outcome.changed);
        assert_eq!(outcome.failure.unwrap().code.code_string(), "E101");
    }

    #[test]
    fn test_nothing_to_do_returns_original_bytes() {
        // Only an upper-case constant and an import: nothing is eligible.
        let source = "import os\nLIMIT   =  3\n";
        let config = MutationConfig {
            reorder_functions: false,
            reorder_imports: false,
            ..MutationConfig::default().with_rate(1.0)
        };
        assert_eq!(StructuralMutator::new(config).with_seed(1).mutate(source), source);
    }

    #[test]
    fn test_protected_names_survive() {
        let config = MutationConfig::none().with_rate(1.0);
        let config = MutationConfig {
            rename_functions: true,
            rename_variables: true,
            ..config
        };
        let out = StructuralMutator::new(config)
            .with_seed(2)
            .with_protected_names(["shared".to_string()])
            .mutate("def shared(x):\n    return x\n");
        assert_eq!(out, "def shared(var_x):\n    return var_x\n");
    }

    #[test]
    fn test_folding_and_renaming_together() {
        let config = MutationConfig {
            reorder_functions: false,
            reorder_imports: false,
            ..MutationConfig::default().with_rate(1.0)
        };
        let mut rng = StdRng::seed_from_u64(4);
        let outcome = StructuralMutator::new(config).mutate_with_rng("size = 2 + 3\n", "m.py", &mut rng);
        assert!(outcome.changed);
        assert_eq!(outcome.source, "var_size = 5\n");
        assert_eq!(outcome.renames.get("size"), Some("var_size"));
    }
}
