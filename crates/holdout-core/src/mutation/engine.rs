//! Repository-wide mutation.
//!
//! The engine walks a source tree, decides per file (with an RNG derived from
//! the engine seed and the file's relative path) whether to mutate it, runs the
//! structural and then the semantic stage, and writes the result back only if
//! the text changed and still parses. Files are processed in parallel with
//! rayon; results are aggregated in path order so the outcome of a seeded run
//! does not depend on scheduling.

use super::{
    finish, parse_or_fail, IdentifierKind, MutationConfig, MutationOutcome, RenameMap,
    SemanticConfig, SemanticMutator, StageContext, StructuralMutator,
};
use crate::errors::{ErrorCode, Failure};
use crate::mutation::rename::is_identifier;
use crate::pyast::visit::{walk_expr, walk_stmt, IdentSite, Visitor};
use crate::pyast::{parse_module, Constant, Expr, Stmt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

const PRUNED_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    ".hg",
    ".svn",
    ".tox",
    ".nox",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "node_modules",
    "build",
    "dist",
];

const GENERATED_SUFFIXES: &[&str] = &["_pb2.py", "_pb2_grpc.py"];

const VARIANT_RATE_RANGE: std::ops::RangeInclusive<f64> = 0.1..=0.5;

// =============================================================================
// Configuration and results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub enable_structural: bool,
    pub enable_semantic: bool,
    /// Per-file mutation probability; also the per-identifier rename rate.
    pub mutation_rate: f64,
    pub preserve_tests: bool,
    /// Fixed seed for reproducible runs; a random one is drawn otherwise.
    pub seed: Option<u64>,
    pub parallel: bool,
    pub structural: MutationConfig,
    pub semantic: SemanticConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_structural: true,
            enable_semantic: true,
            mutation_rate: 0.3,
            preserve_tests: true,
            seed: None,
            parallel: true,
            structural: MutationConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

/// Counts of what the engine did, aggregated over every processed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationStatistics {
    pub files_mutated: usize,
    pub files_skipped: usize,
    pub tests_skipped: usize,
    pub verification_failures: usize,
    pub errors: usize,
    pub stage_failures: usize,
    pub variables_renamed: usize,
    pub functions_renamed: usize,
    pub classes_renamed: usize,
    pub functions_reordered: usize,
    pub constants_modified: usize,
    pub loops_transformed: usize,
    pub functions_inlined: usize,
    pub dead_code_removed: usize,
    pub expressions_simplified: usize,
}

impl MutationStatistics {
    fn absorb(&mut self, outcome: &MutationOutcome) {
        self.variables_renamed += outcome.renames.bucket(IdentifierKind::Variable).len();
        self.functions_renamed += outcome.renames.bucket(IdentifierKind::Function).len();
        self.classes_renamed += outcome.renames.bucket(IdentifierKind::Class).len();
        for report in &outcome.stages {
            if report.failure.is_some() {
                self.stage_failures += 1;
            }
            let slot = match report.stage.as_str() {
                "reorder" => &mut self.functions_reordered,
                "fold_constants" => &mut self.constants_modified,
                "convert_loops" => &mut self.loops_transformed,
                "inline_functions" => &mut self.functions_inlined,
                "eliminate_dead_code" => &mut self.dead_code_removed,
                "simplify_booleans" | "de_morgan" => &mut self.expressions_simplified,
                _ => continue,
            };
            *slot += report.changes;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMutationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
    /// Root that was actually mutated (the copy when an output path was given).
    pub root: PathBuf,
    pub seed: u64,
    pub total_files: usize,
    pub mutated_files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub errors: Vec<FileError>,
    pub statistics: MutationStatistics,
    /// Renames applied per mutated file, keyed by relative path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub renames: BTreeMap<String, RenameMap>,
}

impl RepositoryMutationResult {
    fn failed(root: &Path, seed: u64, failure: Failure) -> Self {
        Self {
            success: false,
            error: Some(failure),
            root: root.to_path_buf(),
            seed,
            total_files: 0,
            mutated_files: Vec::new(),
            skipped_files: Vec::new(),
            errors: Vec::new(),
            statistics: MutationStatistics::default(),
            renames: BTreeMap::new(),
        }
    }
}

/// How many single-strategy variants an oracle still accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResistanceReport {
    pub total_mutations: usize,
    pub successful_mutations: usize,
    pub failed_mutations: usize,
    pub resistance_score: f64,
    pub strategies: Vec<StrategyOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub strategy: String,
    pub changed: bool,
    pub accepted: bool,
}

enum FileStatus {
    Mutated(MutationOutcome),
    Unchanged,
    TestSkipped,
    VerificationFailed(Failure),
    Error(Failure),
}

// =============================================================================
// Engine
// =============================================================================

pub struct MutationEngine {
    config: EngineConfig,
    seed: u64,
}

impl MutationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self { config, seed }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The seed in effect, whether configured or drawn.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn rate(&self) -> f64 {
        MutationConfig::default().with_rate(self.config.mutation_rate).rate()
    }

    fn structural(&self, rate: f64, protected: &BTreeSet<String>) -> StructuralMutator {
        StructuralMutator::new(self.config.structural.with_rate(rate))
            .with_protected_names(protected.iter().cloned())
    }

    fn semantic(&self) -> SemanticMutator {
        SemanticMutator::new(self.config.semantic)
    }

    /// Mutate every eligible `*.py` file under `path`. With `output_path` the
    /// tree is copied there first and only the copy is touched.
    pub fn mutate_repository(&self, path: &Path, output_path: Option<&Path>) -> RepositoryMutationResult {
        if !path.exists() {
            warn!(path = %path.display(), "repository not found");
            return RepositoryMutationResult::failed(
                path,
                self.seed,
                Failure::new(ErrorCode::PathNotFound, "repository not found")
                    .with_context("path", path.display().to_string()),
            );
        }
        if !path.is_dir() {
            return RepositoryMutationResult::failed(
                path,
                self.seed,
                Failure::new(ErrorCode::NotADirectory, "repository path is not a directory")
                    .with_context("path", path.display().to_string()),
            );
        }

        let root = match output_path {
            Some(out) if out != path => {
                if let Err(err) = copy_tree(path, out) {
                    return RepositoryMutationResult::failed(
                        out,
                        self.seed,
                        Failure::new(ErrorCode::IoError, format!("copy repository: {err}"))
                            .with_context("destination", out.display().to_string()),
                    );
                }
                out.to_path_buf()
            }
            _ => path.to_path_buf(),
        };

        info!(root = %root.display(), seed = self.seed, "mutating repository");
        let files = python_files(&root);
        let protected = protected_names(&root, &files);
        debug!(files = files.len(), protected = protected.len(), "collected source files");

        let mutated = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let structural = self.structural(self.rate(), &protected);
        let semantic = self.semantic();
        let process = |rel: &String| {
            let status = self.process_file(&root, rel, &structural, &semantic);
            match &status {
                FileStatus::Mutated(_) => mutated.fetch_add(1, Ordering::Relaxed),
                _ => skipped.fetch_add(1, Ordering::Relaxed),
            };
            status
        };
        let statuses: Vec<FileStatus> = if self.config.parallel {
            files.par_iter().map(process).collect()
        } else {
            files.iter().map(process).collect()
        };

        let mut result = RepositoryMutationResult {
            success: true,
            error: None,
            root,
            seed: self.seed,
            total_files: files.len(),
            mutated_files: Vec::new(),
            skipped_files: Vec::new(),
            errors: Vec::new(),
            statistics: MutationStatistics::default(),
            renames: BTreeMap::new(),
        };
        for (rel, status) in files.into_iter().zip(statuses) {
            let stats = &mut result.statistics;
            match status {
                FileStatus::Mutated(outcome) => {
                    stats.files_mutated += 1;
                    stats.absorb(&outcome);
                    if !outcome.renames.is_empty() {
                        result.renames.insert(rel.clone(), outcome.renames);
                    }
                    result.mutated_files.push(rel);
                }
                FileStatus::Unchanged => {
                    stats.files_skipped += 1;
                    result.skipped_files.push(rel);
                }
                FileStatus::TestSkipped => {
                    stats.files_skipped += 1;
                    stats.tests_skipped += 1;
                    result.skipped_files.push(rel);
                }
                FileStatus::VerificationFailed(failure) => {
                    stats.files_skipped += 1;
                    stats.verification_failures += 1;
                    debug!(file = %rel, failure = %failure, "verification rejected mutation");
                    result.skipped_files.push(rel);
                }
                FileStatus::Error(failure) => {
                    stats.files_skipped += 1;
                    stats.errors += 1;
                    result.errors.push(FileError {
                        file: rel.clone(),
                        error: failure.to_string(),
                    });
                    result.skipped_files.push(rel);
                }
            }
        }
        info!(
            mutated = mutated.load(Ordering::Relaxed),
            skipped = skipped.load(Ordering::Relaxed),
            errors = result.errors.len(),
            "repository mutation complete"
        );
        result
    }

    fn process_file(
        &self,
        root: &Path,
        rel: &str,
        structural: &StructuralMutator,
        semantic: &SemanticMutator,
    ) -> FileStatus {
        if self.config.preserve_tests && is_test_file(Path::new(rel)) {
            return FileStatus::TestSkipped;
        }
        let mut rng = file_rng(self.seed, rel);
        if !rng.gen_bool(self.rate()) {
            return FileStatus::Unchanged;
        }
        let path = root.join(rel);
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                return FileStatus::Error(
                    Failure::new(ErrorCode::IoError, format!("read: {err}")).with_context("file", rel),
                )
            }
        };
        let outcome = self.mutate_parsed(&source, rel, &mut rng, structural, semantic);
        match &outcome.failure {
            Some(failure) if failure.code == ErrorCode::SyntaxCheckFailed => {
                return FileStatus::VerificationFailed(failure.clone())
            }
            Some(failure) => return FileStatus::Error(failure.clone()),
            None => {}
        }
        if !outcome.changed {
            return FileStatus::Unchanged;
        }
        match write_atomic(&path, &outcome.source) {
            Ok(()) => {
                debug!(file = rel, changes = outcome.total_changes(), "file mutated");
                FileStatus::Mutated(outcome)
            }
            Err(err) => FileStatus::Error(
                Failure::new(ErrorCode::IoError, format!("write: {err}")).with_context("file", rel),
            ),
        }
    }

    /// Structural then semantic stage on one source, without any coin flip.
    fn mutate_parsed(
        &self,
        source: &str,
        file: &str,
        rng: &mut StdRng,
        structural: &StructuralMutator,
        semantic: &SemanticMutator,
    ) -> MutationOutcome {
        let module = match parse_or_fail(source, file) {
            Ok(module) => module,
            Err(outcome) => return outcome,
        };
        let mut mutated = module.clone();
        let mut ctx = StageContext::new(rng);
        let mut reports = Vec::new();
        if self.config.enable_structural {
            reports.extend(structural.apply(&mut mutated, &mut ctx, file));
        }
        if self.config.enable_semantic {
            reports.extend(semantic.apply(&mut mutated, &mut ctx, file));
        }
        finish(source, &module, &mutated, reports, ctx.renames, file)
    }

    /// Mutate a code string; the original is returned on any failure.
    pub fn mutate_code_string(&self, code: &str, filename: &str) -> String {
        self.mutate_code_detailed(code, filename).source
    }

    /// Like [`Self::mutate_code_string`] but with stage reports and renames.
    pub fn mutate_code_detailed(&self, code: &str, filename: &str) -> MutationOutcome {
        let mut rng = file_rng(self.seed, filename);
        self.mutate_string_at(code, filename, self.rate(), &mut rng)
    }

    fn mutate_string_at(&self, code: &str, filename: &str, rate: f64, rng: &mut StdRng) -> MutationOutcome {
        if self.config.enable_structural && !rng.gen_bool(rate) {
            return MutationOutcome::unchanged(code);
        }
        let structural = self.structural(rate, &BTreeSet::new());
        self.mutate_parsed(code, filename, rng, &structural, &self.semantic())
    }

    /// Up to `n` distinct variants, each at a rate drawn from `[0.1, 0.5]`,
    /// padded with the original when fewer distinct variants exist.
    pub fn create_mutation_variants(&self, code: &str, n: usize) -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut variants: Vec<String> = Vec::with_capacity(n);
        for i in 0..n {
            let rate = rng.gen_range(VARIANT_RATE_RANGE);
            let mut variant_rng = file_rng(rng.gen(), &format!("variant_{i}.py"));
            let variant = self.mutate_string_at(code, &format!("variant_{i}.py"), rate, &mut variant_rng);
            if variant.changed && !variants.contains(&variant.source) {
                variants.push(variant.source);
            }
        }
        variants.resize(n, code.to_string());
        variants
    }

    /// Apply one strategy at a time at full rate and ask `oracle` whether
    /// each changed variant still behaves.
    pub fn analyze_mutation_resistance(&self, code: &str, oracle: &dyn Fn(&str) -> bool) -> ResistanceReport {
        let none = MutationConfig::none();
        let strategies: [(&str, MutationConfig); 5] = [
            ("variable_rename", MutationConfig { rename_variables: true, ..none }),
            ("function_rename", MutationConfig { rename_functions: true, ..none }),
            ("class_rename", MutationConfig { rename_classes: true, ..none }),
            ("reorder", MutationConfig { reorder_functions: true, reorder_imports: true, ..none }),
            ("constants", MutationConfig { modify_constants: true, ..none }),
        ];
        let mut report = ResistanceReport::default();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut record = |name: &str, outcome: MutationOutcome, report: &mut ResistanceReport| {
            let accepted = outcome.changed && oracle(&outcome.source);
            if outcome.changed {
                report.total_mutations += 1;
                if accepted {
                    report.successful_mutations += 1;
                } else {
                    report.failed_mutations += 1;
                }
            }
            report.strategies.push(StrategyOutcome {
                strategy: name.to_string(),
                changed: outcome.changed,
                accepted,
            });
        };
        for (name, config) in strategies {
            let outcome = StructuralMutator::new(config.with_rate(1.0)).mutate_with_rng(code, "resistance.py", &mut rng);
            record(name, outcome, &mut report);
        }
        let semantic = SemanticMutator::new(self.config.semantic.with_rate(1.0));
        let outcome = semantic.mutate_with_rng(code, "resistance.py", &mut rng);
        record("semantic", outcome, &mut report);

        if report.total_mutations > 0 {
            report.resistance_score = report.successful_mutations as f64 / report.total_mutations as f64;
        }
        report
    }
}

// =============================================================================
// Files
// =============================================================================

fn is_pruned(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    PRUNED_DIRS.contains(&name.as_ref()) || name.ends_with(".egg-info")
}

/// Relative paths (forward slashes) of every mutable Python file, sorted.
pub fn python_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_pruned(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy();
            if !name.ends_with(".py") || GENERATED_SUFFIXES.iter().any(|s| name.ends_with(s)) {
                return None;
            }
            let rel = e.path().strip_prefix(root).ok()?;
            Some(
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/"),
            )
        })
        .collect();
    files.sort();
    files
}

/// `test_*.py`, `*_test.py`, `conftest.py`, or anything under a `test`/`tests` directory.
pub fn is_test_file(rel: &Path) -> bool {
    let name = rel
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.starts_with("test_") || name.ends_with("_test.py") || name == "conftest.py" {
        return true;
    }
    rel.parent().is_some_and(|dir| {
        dir.components().any(|c| {
            let part = c.as_os_str().to_string_lossy().to_lowercase();
            part == "test" || part == "tests"
        })
    })
}

/// Per-file RNG: the same seed and path always make the same decisions.
fn file_rng(seed: u64, rel: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(rel.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(bytes))
}

/// Replace `path` through a temporary sibling so a crash never leaves a
/// half-written file; the original permissions are kept.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path)?.permissions();
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Recursive copy of `src` into `dst` (created if missing). Symlinked
/// directories are not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() || entry.path().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// =============================================================================
// Cross-file names
// =============================================================================

struct ProtectedScanner<'a> {
    names: &'a mut BTreeSet<String>,
    test_file: bool,
}

impl Visitor for ProtectedScanner<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if let Stmt::ImportFrom { names, .. } = stmt {
            self.names.extend(names.iter().map(|a| a.name.clone()));
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Attribute { attr, .. } => {
                self.names.insert(attr.clone());
            }
            Expr::Call { keywords, .. } => {
                self.names.extend(keywords.iter().filter_map(|k| k.arg.clone()));
            }
            Expr::Constant(Constant::Str(literal)) if literal.is_plain() => {
                let content = literal.content();
                if is_identifier(&content) {
                    self.names.insert(content);
                }
            }
            _ => {}
        }
        walk_expr(self, expr);
    }

    fn visit_identifier(&mut self, name: &str, site: IdentSite) {
        let test_binding = matches!(
            site,
            IdentSite::FunctionName | IdentSite::ClassName | IdentSite::Parameter
        );
        if self.test_file && test_binding {
            self.names.insert(name.to_string());
        }
    }
}

/// Names other files may refer to: anything imported by name, every
/// attribute and keyword-argument name, identifier-like strings, and the
/// definitions and parameters of test files (pytest resolves those by name).
fn protected_names(root: &Path, files: &[String]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for rel in files {
        let Ok(source) = fs::read_to_string(root.join(rel)) else {
            continue;
        };
        let Ok(module) = parse_module(&source) else {
            continue;
        };
        let mut scanner = ProtectedScanner {
            names: &mut names,
            test_file: is_test_file(Path::new(rel)),
        };
        for stmt in &module.body {
            scanner.visit_stmt(stmt);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn full_rate(seed: u64) -> EngineConfig {
        EngineConfig {
            mutation_rate: 1.0,
            seed: Some(seed),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file(Path::new("test_api.py")));
        assert!(is_test_file(Path::new("pkg/api_test.py")));
        assert!(is_test_file(Path::new("conftest.py")));
        assert!(is_test_file(Path::new("tests/helpers.py")));
        assert!(is_test_file(Path::new("pkg/test/fixtures.py")));
        assert!(!is_test_file(Path::new("pkg/testing_utils.py")));
        assert!(!is_test_file(Path::new("contest/solver.py")));
    }

    #[test]
    fn test_python_files_prunes_and_sorts() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.py", "x = 1\n");
        write(dir.path(), "a/mod.py", "x = 1\n");
        write(dir.path(), "__pycache__/a.py", "x = 1\n");
        write(dir.path(), ".venv/lib/site.py", "x = 1\n");
        write(dir.path(), "pkg.egg-info/x.py", "x = 1\n");
        write(dir.path(), "proto/msg_pb2.py", "x = 1\n");
        write(dir.path(), "README.md", "# hi\n");
        assert_eq!(python_files(dir.path()), vec!["a/mod.py", "b.py"]);
    }

    #[test]
    fn test_missing_repository_is_structured_error() {
        let engine = MutationEngine::new(EngineConfig::default());
        let result = engine.mutate_repository(Path::new("/definitely/not/here"), None);
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, ErrorCode::PathNotFound);
    }

    #[test]
    fn test_output_path_leaves_source_untouched() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let original = "def area(width, height):\n    return width * height\n";
        write(src.path(), "geometry.py", original);
        write(src.path(), "tests/test_geometry.py", "from geometry import area\n\ndef test_area():\n    assert area(2, 3) == 6\n");

        let engine = MutationEngine::new(full_rate(11));
        let result = engine.mutate_repository(src.path(), Some(out.path()));
        assert!(result.success);
        assert_eq!(result.total_files, 2);
        assert_eq!(result.mutated_files, vec!["geometry.py"]);
        assert_eq!(result.statistics.tests_skipped, 1);
        assert_eq!(fs::read_to_string(src.path().join("geometry.py")).unwrap(), original);

        let mutated = fs::read_to_string(out.path().join("geometry.py")).unwrap();
        // `area` is imported by the test module, so only its parameters move.
        assert!(mutated.contains("def area(var_width, var_height):"));
        assert_eq!(result.renames["geometry.py"].get("width"), Some("var_width"));
    }

    #[test]
    fn test_unparseable_file_is_left_alone_and_reported() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.py", "def oops(:\n");
        let engine = MutationEngine::new(full_rate(1));
        let result = engine.mutate_repository(dir.path(), None);
        assert!(result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].error.starts_with("[E101]"));
        assert_eq!(fs::read_to_string(dir.path().join("broken.py")).unwrap(), "def oops(:\n");
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let source = "def total(items):\n    acc = 0\n    for item in items:\n        acc += item\n    return acc\n";
        let first = MutationEngine::new(full_rate(42)).mutate_code_string(source, "m.py");
        let second = MutationEngine::new(full_rate(42)).mutate_code_string(source, "m.py");
        assert_eq!(first, second);
        assert_ne!(first, source);
    }

    #[test]
    fn test_variants_are_distinct_and_padded() {
        let engine = MutationEngine::new(EngineConfig {
            seed: Some(5),
            ..EngineConfig::default()
        });
        let variants = engine.create_mutation_variants("x = 1\n", 3);
        assert_eq!(variants.len(), 3);
        let code = "def scale(value, factor):\n    result = value * factor\n    return result\n";
        let variants = engine.create_mutation_variants(code, 4);
        assert_eq!(variants.len(), 4);
        let distinct: BTreeSet<&String> = variants.iter().filter(|v| v.as_str() != code).collect();
        assert_eq!(distinct.len(), variants.iter().filter(|v| v.as_str() != code).count());
    }

    #[test]
    fn test_resistance_report() {
        let engine = MutationEngine::new(full_rate(3));
        let code = "def add(a, b):\n    return a + b\n\nresult = add(1, 2)\n";
        let report = engine.analyze_mutation_resistance(code, &|text: &str| parse_module(text).is_ok());
        assert!(report.total_mutations > 0);
        assert_eq!(report.successful_mutations, report.total_mutations);
        assert_eq!(report.resistance_score, 1.0);
        assert_eq!(report.strategies.len(), 6);
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tool.py");
        fs::write(&path, "x = 1\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        write_atomic(&path, "y = 2\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "y = 2\n");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o755);
    }
}
