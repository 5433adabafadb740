//! Retro-holdout generation.
//!
//! A retro-holdout is a benchmark instance rewritten so that a model which
//! memorized the original cannot pattern-match it: the repository is mutated
//! into a behavior-equivalent copy, the problem statement is paraphrased, and
//! the gold patch and test ids are remapped onto the renamed identifiers.
//!
//! # Architecture
//!
//! - The mutated copy lives in a sibling directory `{repo}_retro_{hash8}`; the
//!   input repository is never written.
//! - `hash8` and every random choice derive from the generator seed and the
//!   instance id, so a seeded generator reproduces the same holdout regardless
//!   of call order.
//! - Equivalence is checked through an injected [`TestCommandRunner`].

use crate::HoldoutError;
use holdout_core::mutation::verify::{verify_equivalence, EquivalenceReport, ProcessRunner, TestCommandRunner};
use holdout_core::mutation::{EngineConfig, IdentifierKind, MutationEngine, RenameMap};
use holdout_types::{CodeMutations, MutationLevel, TaskInstance};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Applied in order, each with probability one half, at medium and heavy levels.
const PARAPHRASE_REPLACEMENTS: &[(&str, &str)] = &[
    ("bug", "issue"),
    ("error", "problem"),
    ("fails", "doesn't work"),
    ("crashes", "stops working"),
    ("throws", "raises"),
    ("returns", "gives back"),
    ("function", "method"),
    ("method", "function"),
    ("parameter", "argument"),
    ("argument", "parameter"),
    ("module", "package"),
    ("package", "module"),
];

const VARIATION_PREFIXES: &[&str] = &[
    "There's an issue where ",
    "A problem occurs when ",
    "The system encounters an error when ",
    "Users report that ",
];

const REPLACEMENT_PROBABILITY: f64 = 0.5;

// =============================================================================
// Results
// =============================================================================

/// A generated holdout: the rewritten instance plus where its repository lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetroHoldout {
    pub instance: TaskInstance,
    pub mutated_repo: PathBuf,
    pub seed: u64,
    pub level: MutationLevel,
    pub mutation_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HistoryEntry {
    original_instance: String,
    level: MutationLevel,
    files_mutated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetroHoldoutStatistics {
    pub total_mutations: usize,
    pub mutations_by_level: BTreeMap<MutationLevel, usize>,
    pub average_files_mutated: f64,
    pub unique_instances: usize,
}

// =============================================================================
// Generator
// =============================================================================

pub struct RetroHoldoutGenerator {
    seed: u64,
    parallel: bool,
    runner: Arc<dyn TestCommandRunner>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl RetroHoldoutGenerator {
    /// `seed: None` draws one; [`RetroHoldoutGenerator::seed`] reports it.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seed: seed.unwrap_or_else(rand::random),
            parallel: true,
            runner: Arc::new(ProcessRunner::default()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn TestCommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seed used for one instance's repository mutation.
    pub fn seed_for(&self, instance_id: &str) -> u64 {
        derive_seed(self.seed, &[instance_id, "repository"])
    }

    pub fn mutation_hash(&self, instance_id: &str, level: MutationLevel) -> String {
        let mut hasher = Sha256::new();
        hasher.update(instance_id.as_bytes());
        hasher.update(level.as_str().as_bytes());
        hasher.update(self.seed.to_le_bytes());
        hex::encode(hasher.finalize())[..8].to_string()
    }

    /// Where the mutated copy of `repo_path` goes for this hash.
    pub fn holdout_dir(repo_path: &Path, mutation_hash: &str) -> Result<PathBuf, HoldoutError> {
        let name = repo_path
            .file_name()
            .ok_or_else(|| HoldoutError::NoSiblingDirectory {
                path: repo_path.to_path_buf(),
            })?
            .to_string_lossy();
        Ok(repo_path.with_file_name(format!("{name}_retro_{mutation_hash}")))
    }

    pub fn generate(
        &self,
        instance: &TaskInstance,
        repo_path: &Path,
        level: MutationLevel,
    ) -> Result<RetroHoldout, HoldoutError> {
        let instance_id = instance.instance_id.as_str();
        let mutation_hash = self.mutation_hash(instance_id, level);
        let seed = self.seed_for(instance_id);
        let out = Self::holdout_dir(repo_path, &mutation_hash)?;
        info!(instance_id, level = %level, hash = %mutation_hash, "generating retro-holdout");

        if out.exists() {
            remove_dir(&out)?;
        }
        let engine = MutationEngine::new(EngineConfig {
            mutation_rate: level.file_rate(),
            preserve_tests: level == MutationLevel::Light,
            seed: Some(seed),
            parallel: self.parallel,
            ..EngineConfig::default()
        });
        let result = engine.mutate_repository(repo_path, Some(&out));
        if !result.success {
            let failure = result.error.unwrap_or_else(|| {
                holdout_core::Failure::new(holdout_core::ErrorCode::IoError, "repository mutation failed")
            });
            if out.exists() {
                let _ = std::fs::remove_dir_all(&out);
            }
            return Err(HoldoutError::Repository(failure));
        }
        if result.mutated_files.is_empty() {
            warn!(instance_id, skipped = result.skipped_files.len(), "mutation changed no file");
            if out.exists() {
                remove_dir(&out)?;
            }
            return Err(HoldoutError::Repository(
                holdout_core::Failure::new(holdout_core::ErrorCode::NothingMutated, "no file was changed")
                    .with_context("repository", repo_path.display().to_string()),
            ));
        }

        let maps: Vec<RenameMap> = result.renames.values().cloned().collect();
        let merged = RenameMap::merge_consistent(&maps);
        let code_mutations = CodeMutations {
            variables: merged.bucket(IdentifierKind::Variable).clone(),
            functions: merged.bucket(IdentifierKind::Function).clone(),
            classes: merged.bucket(IdentifierKind::Class).clone(),
            files_mutated: result.mutated_files.clone(),
            seed,
        };

        let mut rng = StdRng::seed_from_u64(derive_seed(self.seed, &[instance_id, "paraphrase"]));
        let test_renames = Renamer::new(code_mutations.functions.iter().chain(&code_mutations.classes));
        let patch_renames = Renamer::new(merged.iter());

        let mut mutated = instance.clone();
        mutated.instance_id = format!("{instance_id}_retro_{mutation_hash}");
        mutated.problem_statement = paraphrase(&instance.problem_statement, level, &mut rng);
        mutated.fail_to_pass = instance.fail_to_pass.iter().map(|t| test_renames.apply(t)).collect();
        mutated.pass_to_pass = instance.pass_to_pass.iter().map(|t| test_renames.apply(t)).collect();
        mutated.patch = patch_renames.apply(&instance.patch);
        if let Some(test_patch) = &instance.test_patch {
            if level != MutationLevel::Light {
                mutated.test_patch = Some(patch_renames.apply(test_patch));
            }
        }
        mutated.is_retro_holdout = true;
        mutated.original_instance_id = Some(instance_id.to_string());
        mutated.mutation_level = Some(level);
        mutated.mutation_hash = Some(mutation_hash.clone());
        mutated.mutated_repo_path = Some(out.clone());

        info!(
            instance_id,
            files = code_mutations.files_mutated.len(),
            renames = code_mutations.rename_count(),
            "retro-holdout generated"
        );
        self.history.lock().push(HistoryEntry {
            original_instance: instance_id.to_string(),
            level,
            files_mutated: code_mutations.files_mutated.len(),
        });
        mutated.code_mutations = Some(code_mutations);

        Ok(RetroHoldout {
            instance: mutated,
            mutated_repo: out,
            seed,
            level,
            mutation_hash,
        })
    }

    /// Run `commands` in both trees; equal pass/fail tallies mean equivalent and
    /// any timeout means not.
    pub fn verify_semantic_equivalence(
        &self,
        original: &Path,
        mutated: &Path,
        commands: &[String],
        timeout: Duration,
    ) -> EquivalenceReport {
        let report = verify_equivalence(self.runner.as_ref(), commands, original, mutated, timeout);
        if let Some(failure) = &report.failure {
            warn!(original = %original.display(), mutated = %mutated.display(), %failure, "equivalence check failed");
        }
        report
    }

    /// Remove a holdout's repository copy.
    pub fn discard(&self, holdout: &RetroHoldout) -> Result<(), HoldoutError> {
        remove_dir(&holdout.mutated_repo)
    }

    pub fn statistics(&self) -> RetroHoldoutStatistics {
        let history = self.history.lock();
        let mut by_level: BTreeMap<MutationLevel, usize> = MutationLevel::ALL.iter().map(|l| (*l, 0)).collect();
        for entry in history.iter() {
            *by_level.entry(entry.level).or_default() += 1;
        }
        let files: usize = history.iter().map(|e| e.files_mutated).sum();
        RetroHoldoutStatistics {
            total_mutations: history.len(),
            mutations_by_level: by_level,
            average_files_mutated: files as f64 / history.len().max(1) as f64,
            unique_instances: history
                .iter()
                .map(|e| e.original_instance.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
        }
    }
}

/// Share of the original score lost on the holdout, in `[0, 1]`. A
/// non-positive original score yields 0.
pub fn contamination_for(original_score: f64, mutated_score: f64) -> f64 {
    if original_score <= 0.0 || original_score.is_nan() || mutated_score.is_nan() {
        return 0.0;
    }
    ((original_score - mutated_score) / original_score).clamp(0.0, 1.0)
}

/// Rule-based rewording: word swaps for medium and heavy, middle-sentence
/// shuffle for heavy, an opening phrase for anything above light.
pub fn paraphrase(text: &str, level: MutationLevel, rng: &mut StdRng) -> String {
    let mut out = text.to_string();
    if level == MutationLevel::Light {
        return out;
    }
    for (word, replacement) in PARAPHRASE_REPLACEMENTS {
        if !rng.gen_bool(REPLACEMENT_PROBABILITY) {
            continue;
        }
        let pattern = format!(r"\b{}\b", regex::escape(word));
        if let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() {
            out = re.replace_all(&out, *replacement).into_owned();
        }
    }

    if level == MutationLevel::Heavy {
        let mut sentences: Vec<&str> = out.split(". ").collect();
        if sentences.len() > 2 {
            let last = sentences.len() - 1;
            sentences[1..last].shuffle(rng);
            out = sentences.join(". ");
        }
    }

    if !out.is_empty() && !VARIATION_PREFIXES.iter().any(|p| out.starts_with(p)) {
        if let Some(prefix) = VARIATION_PREFIXES.choose(rng) {
            let mut chars = out.chars();
            let first: String = chars.next().map(|c| c.to_lowercase().collect()).unwrap_or_default();
            out = format!("{prefix}{first}{}", chars.as_str());
        }
    }
    out
}

/// Simultaneous whole-word replacement, so `a -> b, b -> c` never chains.
struct Renamer {
    pattern: Option<Regex>,
    map: BTreeMap<String, String>,
}

impl Renamer {
    fn new<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> Self {
        let map: BTreeMap<String, String> = pairs.map(|(k, v)| (k.clone(), v.clone())).collect();
        let mut keys: Vec<&String> = map.keys().collect();
        // Longest first so alternation prefers `get_user` over `get`.
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let pattern = if keys.is_empty() {
            None
        } else {
            let alternation = keys.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
            Regex::new(&format!(r"\b(?:{alternation})\b")).ok()
        };
        Self { pattern, map }
    }

    fn apply(&self, text: &str) -> String {
        match &self.pattern {
            Some(re) => re
                .replace_all(text, |caps: &regex::Captures<'_>| {
                    let found = &caps[0];
                    self.map.get(found).cloned().unwrap_or_else(|| found.to_string())
                })
                .into_owned(),
            None => text.to_string(),
        }
    }
}

fn derive_seed(seed: u64, parts: &[&str]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn remove_dir(path: &Path) -> Result<(), HoldoutError> {
    std::fs::remove_dir_all(path).map_err(|source| HoldoutError::Io {
        action: "remove",
        path: path.to_path_buf(),
        source,
    })
}
