//! Evaluation slices, run modes and mutation levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}` (expected one of: {expected})")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Generates `as_str`, `ALL`, `Display` and `FromStr` for a unit enum whose
/// wire names are fixed.
macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase().replace('-', "_");
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == normalized)
                    .ok_or_else(|| ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: $ty::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", "),
                    })
            }
        }
    };
}

/// Which provenance bucket a score belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationSlice {
    /// The benchmark instance as published.
    Verified,
    /// A retro-holdout rewrite of the instance.
    Mutated,
    /// A recently harvested issue.
    Fresh,
    /// Created after the model's training cutoff.
    PostCutoff,
    /// Scored with adversarial probes enabled.
    Adversarial,
}

wire_enum!(EvaluationSlice, "evaluation slice", {
    Verified => "verified",
    Mutated => "mutated",
    Fresh => "fresh",
    PostCutoff => "post_cutoff",
    Adversarial => "adversarial",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    LlmOnly,
    HeuristicAssisted,
}

wire_enum!(RunMode, "run mode", {
    LlmOnly => "llm_only",
    HeuristicAssisted => "heuristic_assisted",
});

impl RunMode {
    pub fn from_heuristics(allowed: bool) -> Self {
        if allowed {
            RunMode::HeuristicAssisted
        } else {
            RunMode::LlmOnly
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationLevel {
    Light,
    #[default]
    Medium,
    Heavy,
}

wire_enum!(MutationLevel, "mutation level", {
    Light => "light",
    Medium => "medium",
    Heavy => "heavy",
});

impl MutationLevel {
    /// Per-file mutation probability for the level.
    pub fn file_rate(&self) -> f64 {
        match self {
            MutationLevel::Light => 0.3,
            MutationLevel::Medium => 0.6,
            MutationLevel::Heavy => 0.9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&EvaluationSlice::PostCutoff).unwrap(), "\"post_cutoff\"");
        assert_eq!(EvaluationSlice::PostCutoff.to_string(), "post_cutoff");
        assert_eq!(
            serde_json::from_str::<RunMode>("\"heuristic_assisted\"").unwrap(),
            RunMode::HeuristicAssisted
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("post-cutoff".parse::<EvaluationSlice>().unwrap(), EvaluationSlice::PostCutoff);
        assert_eq!(" Heavy ".parse::<MutationLevel>().unwrap(), MutationLevel::Heavy);
        let err = "extreme".parse::<MutationLevel>().unwrap_err();
        assert!(err.to_string().contains("light, medium, heavy"));
    }

    #[test]
    fn test_level_rates() {
        let rates: Vec<f64> = MutationLevel::ALL.iter().map(MutationLevel::file_rate).collect();
        assert_eq!(rates, vec![0.3, 0.6, 0.9]);
        assert_eq!(RunMode::from_heuristics(true), RunMode::HeuristicAssisted);
    }
}
