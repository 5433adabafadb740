mod common;

use assert_cmd::Command;
use common::{sample_instance, sample_repo, write_file};
use predicates::prelude::*;
use tempfile::TempDir;

fn holdout_bench() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("holdout-bench").unwrap()
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_mutate_code_renames_parameters() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "add.py", "def add(a, b): return a + b\n");

    holdout_bench()
        .arg("mutate-code")
        .arg(dir.path().join("add.py"))
        .args(["--seed", "1", "--no-semantic"])
        .assert()
        .success()
        .stdout(predicate::str::contains("var_a").and(predicate::str::contains("var_b")));
}

#[test]
fn test_mutate_repo_json_reports_skipped_tests() {
    let dir = TempDir::new().unwrap();
    let root = sample_repo(&dir);
    let out = dir.path().join("out");

    let json = json_stdout(
        holdout_bench()
            .args(["--json", "mutate-repo"])
            .arg(&root)
            .arg("--output")
            .arg(&out)
            .args(["--rate", "1.0", "--seed", "3"]),
    );
    assert_eq!(json["success"], true);
    assert_eq!(json["seed"], 3);
    let skipped: Vec<&str> = json["skipped_files"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(skipped.contains(&"test_foo.py"));
    assert!(out.join("geometry.py").exists());
}

#[test]
fn test_mutate_repo_missing_path_fails() {
    holdout_bench()
        .args(["mutate-repo", "/definitely/not/a/repo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("repository not found"));
}

#[test]
fn test_mutation_test_json() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "gen.diff", "+if x == 5:\n+    return x\n");
    write_file(dir.path(), "exp.diff", "+if x == 5:\n+    return x\n");

    let json = json_stdout(
        holdout_bench()
            .args(["--json", "mutation-test", "--generated"])
            .arg(dir.path().join("gen.diff"))
            .arg("--expected")
            .arg(dir.path().join("exp.diff")),
    );
    let score = json["score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));
    assert!(json["total_mutants"].as_u64().unwrap() > 0);
}

#[test]
fn test_fuzz_and_adversarial_human_output() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "fix.diff",
        "+def parse(text: str, limit: int):\n+    if not text:\n+        return None\n+    return text[:limit]\n",
    );
    write_file(dir.path(), "problem.txt", "parse crashes on empty input");

    holdout_bench()
        .args(["fuzz", "--seed", "5", "--patch"])
        .arg(dir.path().join("fix.diff"))
        .arg("--problem")
        .arg(dir.path().join("problem.txt"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Fuzz score:").and(predicate::str::contains("seed 5")));

    holdout_bench()
        .args(["adversarial", "--num-cases", "4", "--patch"])
        .arg(dir.path().join("fix.diff"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Adversarial score:"));
}

#[test]
fn test_prepare_verified_slice() {
    let dir = TempDir::new().unwrap();
    let root = sample_repo(&dir);
    let instance_path = dir.path().join("instance.json");
    std::fs::write(&instance_path, serde_json::to_string(&sample_instance("acme__widgets-9")).unwrap()).unwrap();

    let json = json_stdout(
        holdout_bench()
            .args(["--json", "prepare"])
            .arg(&instance_path)
            .arg("--repo")
            .arg(&root)
            .args(["--slice", "verified", "--heuristics", "--seed", "4"]),
    );
    assert_eq!(json["instance"]["instance_id"], "acme__widgets-9");
    assert_eq!(json["metadata"]["evaluation_slice"], "verified");
    assert_eq!(json["metadata"]["run_mode"], "heuristic_assisted");
    assert_eq!(json["metadata"]["mutation_applied"], false);
}

#[test]
fn test_prepare_rejects_unknown_slice() {
    holdout_bench()
        .args(["prepare", "instance.json", "--repo", ".", "--slice", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sideways"));
}

#[test]
fn test_contamination_score_from_maps() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "verified.json", r#"{"t1": 0.8, "t2": 0.5}"#);
    write_file(dir.path(), "mutated.json", r#"{"t1": 0.2, "t2": 0.9}"#);

    let json = json_stdout(
        holdout_bench()
            .args(["--json", "contamination-score", "--verified"])
            .arg(dir.path().join("verified.json"))
            .arg("--mutated")
            .arg(dir.path().join("mutated.json")),
    );
    assert!((json["per_instance"]["t1"].as_f64().unwrap() - 0.75).abs() < 1e-9);
    assert_eq!(json["per_instance"]["t2"], 0.0);
    assert_eq!(json["high_contamination_count"], 1);
    assert_eq!(json["instances_compared"], 2);
}

#[test]
fn test_json_errors_are_structured() {
    let output = holdout_bench()
        .args(["--json", "mutate-code", "/definitely/missing.py"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert!(json["error"].as_str().unwrap().contains("missing.py"));
}
