use super::fold::FoldStage;
use super::inline::InlineStage;
use super::loops::LoopStage;
use super::simplify::{BooleanStage, DeMorganStage, DeadCodeStage};
use super::{finish, parse_or_fail, run_stages, MutationOutcome, MutationStage, SemanticConfig, StageContext, StageReport};
use crate::pyast::Module;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Second, independent mutation stage: rewrites control flow and expressions
/// without touching names.
#[derive(Debug, Clone, Default)]
pub struct SemanticMutator {
    config: SemanticConfig,
    seed: Option<u64>,
}

impl SemanticMutator {
    pub fn new(config: SemanticConfig) -> Self {
        Self { config, seed: None }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &SemanticConfig {
        &self.config
    }

    pub fn mutate(&self, source: &str) -> String {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.mutate_with_rng(source, "<string>", &mut rng).source
    }

    pub fn mutate_with_rng(&self, source: &str, file: &str, rng: &mut StdRng) -> MutationOutcome {
        let module = match parse_or_fail(source, file) {
            Ok(module) => module,
            Err(outcome) => return outcome,
        };
        let mut mutated = module.clone();
        let mut ctx = StageContext::new(rng);
        let reports = self.apply(&mut mutated, &mut ctx, file);
        finish(source, &module, &mutated, reports, ctx.renames, file)
    }

    pub(crate) fn apply(&self, module: &mut Module, ctx: &mut StageContext<'_>, file: &str) -> Vec<StageReport> {
        let rate = self.config.rate();
        let loops = LoopStage { rate };
        let inline = InlineStage { rate };
        let de_morgan = DeMorganStage { rate };
        let toggles: [(bool, &dyn MutationStage); 6] = [
            (self.config.convert_loops, &loops),
            (self.config.inline_functions, &inline),
            (self.config.fold_constants, &FoldStage),
            (self.config.eliminate_dead_code, &DeadCodeStage),
            (self.config.simplify_booleans, &BooleanStage),
            (self.config.apply_de_morgan, &de_morgan),
        ];
        let stages: Vec<&dyn MutationStage> = toggles
            .into_iter()
            .filter_map(|(enabled, stage)| enabled.then_some(stage))
            .collect();
        run_stages(module, &stages, ctx, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_pipeline_rewrites_and_reparses() {
        let source = "def count(n):\n    total = 0\n    for i in range(n):\n        if True and n:\n            total += 1\n    if False:\n        total = -1\n    return total * (2 + 3)\n";
        let mutator = SemanticMutator::new(SemanticConfig::default().with_rate(1.0)).with_seed(5);
        let out = mutator.mutate(source);
        assert_ne!(out, source);
        assert!(out.contains("while i < n:"));
        assert!(out.contains("total * 5"));
        assert!(!out.contains("total = -1"));
        assert!(out.contains("if n:"));
        assert!(crate::pyast::verify_syntax(&out));
    }

    #[test]
    fn test_everything_disabled_is_identity() {
        let config = SemanticConfig {
            convert_loops: false,
            inline_functions: false,
            fold_constants: false,
            eliminate_dead_code: false,
            simplify_booleans: false,
            apply_de_morgan: false,
            mutation_rate: 1.0,
        };
        let source = "x = 1 + 2\nif True:\n    y = x\n";
        assert_eq!(SemanticMutator::new(config).with_seed(1).mutate(source), source);
    }
}
