//! Repository-level mutation behavior.

mod common;

use common::{read, sample_repo, write_file, TEST_FOO_SOURCE};
use holdout_core::mutation::{EngineConfig, MutationEngine};
use holdout_core::pyast::verify_syntax;
use holdout_core::ErrorCode;
use tempfile::TempDir;

fn engine(rate: f64, seed: u64) -> MutationEngine {
    MutationEngine::new(EngineConfig {
        mutation_rate: rate,
        seed: Some(seed),
        parallel: false,
        ..EngineConfig::default()
    })
}

#[test]
fn test_files_are_always_skipped_when_preserved() {
    for rate in [0.0, 0.5, 1.0] {
        for seed in 0..6 {
            let dir = TempDir::new().unwrap();
            let root = sample_repo(&dir);
            let result = engine(rate, seed).mutate_repository(&root, None);
            assert!(result.success);
            assert!(result.skipped_files.contains(&"test_foo.py".to_string()));
            assert!(!result.mutated_files.contains(&"test_foo.py".to_string()));
            assert!(!result.mutated_files.contains(&"tests/test_geometry.py".to_string()));
            assert_eq!(read(&root, "test_foo.py"), TEST_FOO_SOURCE);
        }
    }
}

#[test]
fn test_every_written_file_parses() {
    for seed in 0..8 {
        let dir = TempDir::new().unwrap();
        let root = sample_repo(&dir);
        let result = engine(1.0, seed).mutate_repository(&root, None);
        assert!(result.success);
        assert!(!result.mutated_files.is_empty());
        for file in &result.mutated_files {
            assert!(verify_syntax(&read(&root, file)), "{file} does not parse (seed {seed})");
        }
        assert_eq!(
            result.total_files,
            result.mutated_files.len() + result.skipped_files.len()
        );
    }
}

#[test]
fn test_unparseable_file_bytes_are_preserved() {
    let dir = TempDir::new().unwrap();
    let root = sample_repo(&dir);
    let broken = "def broken(:\n    return 1\n";
    write_file(&root, "broken.py", broken);

    let result = engine(1.0, 3).mutate_repository(&root, None);
    assert!(result.success);
    assert_eq!(read(&root, "broken.py"), broken);
    assert!(result.skipped_files.contains(&"broken.py".to_string()));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].file, "broken.py");
}

#[test]
fn test_zero_rate_leaves_tree_untouched() {
    let dir = TempDir::new().unwrap();
    let root = sample_repo(&dir);
    let before = read(&root, "geometry.py");
    let result = engine(0.0, 9).mutate_repository(&root, None);
    assert!(result.success);
    assert!(result.mutated_files.is_empty());
    assert_eq!(read(&root, "geometry.py"), before);
}

#[test]
fn test_output_copy_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let root = sample_repo(&dir);
    let first = dir.path().join("first");
    let second = dir.path().join("second");

    let a = engine(1.0, 21).mutate_repository(&root, Some(&first));
    let b = engine(1.0, 21).mutate_repository(&root, Some(&second));
    assert_eq!(a.mutated_files, b.mutated_files);
    assert_eq!(a.renames, b.renames);
    for file in &a.mutated_files {
        assert_eq!(read(&first, file), read(&second, file));
    }
    // Names imported by test modules keep their spelling.
    assert!(read(&first, "geometry.py").contains("def compute_area("));
    assert!(read(&first, "foo.py").contains("def scale("));
}

#[test]
fn test_file_path_is_not_a_repository() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "single.py", "x = 1\n");
    let result = engine(1.0, 1).mutate_repository(&dir.path().join("single.py"), None);
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, ErrorCode::NotADirectory);
}
