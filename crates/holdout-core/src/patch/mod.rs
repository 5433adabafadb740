//! Mutation testing for generated patches.
//!
//! # Architecture
//!
//! - [`operators`]: the operator catalog. Each [`PatchOperator`] proposes
//!   single-site textual mutants of a patch.
//! - [`tester`]: [`PatchMutationTester`] runs the registry, judges every mutant
//!   with a heuristic kill oracle and aggregates the adequacy score.
//!
//! Nothing here executes code. A mutant is "killed" when the expected patch
//! pins down the text it changes, or when its kind is one that tests almost
//! always notice (negations, removed statements, flipped comparisons).

pub mod operators;
pub mod tester;

pub use operators::{patch_operator_registry, select_patch_operators, PatchOperator, PatchText};
pub use tester::{MutationTestStatistics, PatchMutationTester};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Operator,
    Boundary,
    Negation,
    Removal,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Operator => "operator",
            MutationKind::Boundary => "boundary",
            MutationKind::Negation => "negation",
            MutationKind::Removal => "removal",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            MutationKind::Operator => "Add test cases that verify operator behavior",
            MutationKind::Boundary => "Add boundary value tests",
            MutationKind::Negation => "Add tests for both true and false conditions",
            MutationKind::Removal => "Add tests that verify the removed statement's effect",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutant: the full mutated patch plus where and what changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub name: String,
    /// The fragment that was replaced.
    pub original: String,
    pub mutated: String,
    pub location: String,
    pub mutation_type: MutationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedMutation {
    #[serde(flatten)]
    pub mutation: Mutation,
    pub killed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
    pub total_mutants: usize,
    pub killed: usize,
    pub survived: usize,
    /// `killed / total_mutants`, or 1.0 when no mutant was generated.
    pub score: f64,
    pub mutations: Vec<EvaluatedMutation>,
}

impl MutationResult {
    pub fn from_verdicts(mutations: Vec<EvaluatedMutation>) -> Self {
        let total_mutants = mutations.len();
        let killed = mutations.iter().filter(|m| m.killed).count();
        let score = if total_mutants == 0 {
            1.0
        } else {
            killed as f64 / total_mutants as f64
        };
        Self {
            total_mutants,
            killed,
            survived: total_mutants - killed,
            score,
            mutations,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KindTally {
    pub total: usize,
    pub killed: usize,
    pub kill_rate: f64,
}

impl KindTally {
    pub(crate) fn record(&mut self, killed: bool) {
        self.total += 1;
        if killed {
            self.killed += 1;
        }
        self.kill_rate = self.killed as f64 / self.total as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survivor {
    pub name: String,
    pub mutation_type: MutationKind,
    pub original: String,
    pub location: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurvivorAnalysis {
    pub survivors: Vec<Survivor>,
    pub by_type: BTreeMap<MutationKind, KindTally>,
}

/// Surviving mutants with a test-writing hint each, plus kill rates per kind.
pub fn analyze_survivors(result: &MutationResult) -> SurvivorAnalysis {
    let mut analysis = SurvivorAnalysis::default();
    for entry in &result.mutations {
        let kind = entry.mutation.mutation_type;
        analysis.by_type.entry(kind).or_default().record(entry.killed);
        if !entry.killed {
            analysis.survivors.push(Survivor {
                name: entry.mutation.name.clone(),
                mutation_type: kind,
                original: entry.mutation.original.clone(),
                location: entry.mutation.location.clone(),
                recommendation: kind.recommendation().to_string(),
            });
        }
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutant(kind: MutationKind, killed: bool) -> EvaluatedMutation {
        EvaluatedMutation {
            mutation: Mutation {
                name: format!("{kind}_1"),
                original: "+".into(),
                mutated: "x - 1".into(),
                location: "line 1:3".into(),
                mutation_type: kind,
            },
            killed,
        }
    }

    #[test]
    fn test_empty_result_scores_one() {
        let result = MutationResult::from_verdicts(Vec::new());
        assert_eq!(result.total_mutants, 0);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_survivor_analysis() {
        let result = MutationResult::from_verdicts(vec![
            mutant(MutationKind::Operator, false),
            mutant(MutationKind::Operator, true),
            mutant(MutationKind::Boundary, false),
        ]);
        assert_eq!(result.score, 1.0 / 3.0);
        let analysis = analyze_survivors(&result);
        assert_eq!(analysis.survivors.len(), 2);
        assert_eq!(analysis.survivors[1].recommendation, "Add boundary value tests");
        assert_eq!(analysis.by_type[&MutationKind::Operator].kill_rate, 0.5);
        assert_eq!(analysis.by_type[&MutationKind::Boundary].killed, 0);
    }

    #[test]
    fn test_mutation_json_shape() {
        let json = serde_json::to_value(mutant(MutationKind::Negation, true)).unwrap();
        assert_eq!(json["mutation_type"], "negation");
        assert_eq!(json["killed"], true);
        assert_eq!(json["name"], "negation_1");
    }
}
