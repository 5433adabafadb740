use serde::{Deserialize, Serialize};

/// Switches and rate for the structural stage (renaming, reordering,
/// constant folding). Passed by value; never modified after construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub rename_variables: bool,
    pub rename_functions: bool,
    pub rename_classes: bool,
    pub reorder_functions: bool,
    pub reorder_imports: bool,
    pub modify_constants: bool,
    /// Tag-prefixed renames (`var_x`) instead of random suffixes.
    pub preserve_functionality: bool,
    /// File-level gate and per-identifier rename probability, in `[0, 1]`.
    pub mutation_rate: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rename_variables: true,
            rename_functions: true,
            rename_classes: true,
            reorder_functions: true,
            reorder_imports: true,
            modify_constants: true,
            preserve_functionality: true,
            mutation_rate: 0.3,
        }
    }
}

impl MutationConfig {
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = clamp_rate(rate);
        self
    }

    /// Every category off; useful as a base for enabling one at a time.
    pub fn none() -> Self {
        Self {
            rename_variables: false,
            rename_functions: false,
            rename_classes: false,
            reorder_functions: false,
            reorder_imports: false,
            modify_constants: false,
            preserve_functionality: true,
            mutation_rate: 0.0,
        }
    }

    pub fn renames_enabled(&self) -> bool {
        self.rename_variables || self.rename_functions || self.rename_classes
    }

    pub fn rate(&self) -> f64 {
        clamp_rate(self.mutation_rate)
    }
}

/// Switches for the semantic stage. `mutation_rate` is the per-site coin for
/// the optional rewrites (loop conversion, inlining, De Morgan); folding,
/// dead-code elimination and boolean simplification apply at every site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub convert_loops: bool,
    pub inline_functions: bool,
    pub fold_constants: bool,
    pub eliminate_dead_code: bool,
    pub simplify_booleans: bool,
    pub apply_de_morgan: bool,
    pub mutation_rate: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            convert_loops: true,
            inline_functions: true,
            fold_constants: true,
            eliminate_dead_code: true,
            simplify_booleans: true,
            apply_de_morgan: true,
            mutation_rate: 0.5,
        }
    }
}

impl SemanticConfig {
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = clamp_rate(rate);
        self
    }

    pub fn rate(&self) -> f64 {
        clamp_rate(self.mutation_rate)
    }
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MutationConfig::default();
        assert!(config.renames_enabled());
        assert_eq!(config.mutation_rate, 0.3);
        assert!(config.preserve_functionality);
        assert_eq!(SemanticConfig::default().mutation_rate, 0.5);
    }

    #[test]
    fn test_rate_is_clamped() {
        assert_eq!(MutationConfig::default().with_rate(1.7).mutation_rate, 1.0);
        assert_eq!(MutationConfig::default().with_rate(-1.0).mutation_rate, 0.0);
        assert_eq!(SemanticConfig::default().with_rate(f64::NAN).mutation_rate, 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MutationConfig =
            serde_json::from_str(r#"{"rename_classes": false, "mutation_rate": 1.0}"#).unwrap();
        assert!(!config.rename_classes);
        assert!(config.rename_variables);
        assert_eq!(config.rate(), 1.0);
    }
}
