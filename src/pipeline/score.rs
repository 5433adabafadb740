//! Contamination scoring from paired verified/mutated results.

use crate::retro_holdout::contamination_for;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scores above this mark an instance as highly contaminated.
pub const HIGH_CONTAMINATION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContaminationReport {
    pub per_instance: BTreeMap<String, f64>,
    /// Unweighted mean over compared instances, 0 when none were compared.
    pub average_contamination: f64,
    pub high_contamination_count: usize,
    pub instances_compared: usize,
}

/// Compare scores for ids present in both maps. Each instance's contamination
/// is the relative drop from its verified score, clamped to `[0, 1]`.
pub fn calculate_contamination_score(
    verified: &BTreeMap<String, f64>,
    mutated: &BTreeMap<String, f64>,
) -> ContaminationReport {
    let per_instance: BTreeMap<String, f64> = verified
        .iter()
        .filter_map(|(id, v)| mutated.get(id).map(|m| (id.clone(), contamination_for(*v, *m))))
        .collect();
    let instances_compared = per_instance.len();
    let average_contamination = if instances_compared == 0 {
        0.0
    } else {
        per_instance.values().sum::<f64>() / instances_compared as f64
    };
    ContaminationReport {
        high_contamination_count: per_instance
            .values()
            .filter(|s| **s > HIGH_CONTAMINATION_THRESHOLD)
            .count(),
        per_instance,
        average_contamination,
        instances_compared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_contamination_scenario() {
        let verified = scores(&[("a", 1.0), ("b", 0.5), ("c", 0.0)]);
        let mutated = scores(&[("a", 0.2), ("b", 0.5), ("c", 0.3)]);
        let report = calculate_contamination_score(&verified, &mutated);
        assert_eq!(report.instances_compared, 3);
        assert!((report.per_instance["a"] - 0.8).abs() < 1e-9);
        assert_eq!(report.per_instance["b"], 0.0);
        assert_eq!(report.per_instance["c"], 0.0);
        assert!((report.average_contamination - 0.8 / 3.0).abs() < 1e-9);
        assert_eq!(report.high_contamination_count, 1);
    }

    #[test]
    fn test_unpaired_ids_are_ignored() {
        let report = calculate_contamination_score(&scores(&[("a", 1.0)]), &scores(&[("z", 0.0)]));
        assert_eq!(report.instances_compared, 0);
        assert_eq!(report.average_contamination, 0.0);
    }
}
