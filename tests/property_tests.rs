//! Property tests over generated Python modules.

use holdout_bench::retro_holdout::contamination_for;
use holdout_core::mutation::{MutationConfig, SemanticConfig, SemanticMutator, StructuralMutator};
use holdout_core::pyast::verify_syntax;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const NAMES: &[&str] = &["alpha", "beta", "gamma", "delta", "total", "count", "item", "value"];

fn name() -> impl Strategy<Value = String> {
    prop::sample::select(NAMES).prop_map(str::to_string)
}

fn expr() -> impl Strategy<Value = String> {
    prop_oneof![
        (0i64..100).prop_map(|n| n.to_string()),
        name(),
        (name(), 1i64..10).prop_map(|(n, k)| format!("{n} + {k}")),
        (1i64..20, 1i64..20).prop_map(|(a, b)| format!("{a} * {b}")),
        (name(), name()).prop_map(|(a, b)| format!("{a} if {a} > {b} else {b}")),
    ]
}

fn statement() -> impl Strategy<Value = String> {
    prop_oneof![
        (name(), expr()).prop_map(|(n, e)| format!("{n} = {e}")),
        (name(), 1i64..6).prop_map(|(n, k)| format!("for i in range({k}):\n        {n} = {n} + i")),
        expr().prop_map(|e| format!("if True:\n        result = {e}\n    else:\n        result = 0")),
    ]
}

/// A module of functions whose parameters are bound before use.
fn module() -> impl Strategy<Value = String> {
    prop::collection::vec((prop::collection::vec(statement(), 1..4), expr()), 1..5).prop_map(|funcs| {
        let mut out = String::new();
        for (idx, (body, ret)) in funcs.into_iter().enumerate() {
            out.push_str(&format!("def func{idx}({}):\n", NAMES.join(", ")));
            out.push_str("    result = 0\n");
            for stmt in body {
                out.push_str(&format!("    {stmt}\n"));
            }
            out.push_str(&format!("    return {ret}\n\n\n"));
        }
        out
    })
}

fn full_rate() -> MutationConfig {
    MutationConfig::default().with_rate(1.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_structural_output_parses(source in module(), seed in any::<u64>(), rate in 0.0f64..=1.0) {
        prop_assume!(verify_syntax(&source));
        let out = StructuralMutator::new(MutationConfig::default().with_rate(rate)).with_seed(seed).mutate(&source);
        prop_assert!(verify_syntax(&out));
    }

    #[test]
    fn prop_semantic_output_parses(source in module(), seed in any::<u64>()) {
        prop_assume!(verify_syntax(&source));
        let mut rng = StdRng::seed_from_u64(seed);
        let outcome = SemanticMutator::new(SemanticConfig::default().with_rate(1.0))
            .mutate_with_rng(&source, "prop.py", &mut rng);
        prop_assert!(verify_syntax(&outcome.source));
    }

    #[test]
    fn prop_renames_are_bijective(source in module(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let outcome = StructuralMutator::new(full_rate()).mutate_with_rng(&source, "prop.py", &mut rng);
        prop_assert!(outcome.renames.is_bijective());
    }

    #[test]
    fn prop_zero_rate_is_identity(source in module(), seed in any::<u64>()) {
        let out = StructuralMutator::new(MutationConfig::default().with_rate(0.0)).with_seed(seed).mutate(&source);
        prop_assert_eq!(out, source);
    }

    #[test]
    fn prop_callees_precede_callers(seed in any::<u64>(), extra in 0usize..4) {
        let mut source = String::from("def caller():\n    return callee() + 1\n\n\n");
        for i in 0..extra {
            source.push_str(&format!("def filler{i}():\n    return {i}\n\n\n"));
        }
        source.push_str("def callee():\n    return 41\n");
        let config = MutationConfig { reorder_functions: true, ..MutationConfig::none() }.with_rate(1.0);
        let out = StructuralMutator::new(config).with_seed(seed).mutate(&source);
        let callee = out.find("def callee").unwrap();
        let caller = out.find("def caller").unwrap();
        prop_assert!(callee < caller);
    }

    #[test]
    fn prop_contamination_is_bounded(original in -1.0f64..2.0, mutated in -1.0f64..2.0) {
        let score = contamination_for(original, mutated);
        prop_assert!((0.0..=1.0).contains(&score));
    }
}
