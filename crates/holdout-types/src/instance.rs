//! Benchmark task records.
//!
//! [`TaskInstance`] is the SWE-bench instance shape with the provenance and
//! retro-holdout fields this workspace adds. Keys it does not know are kept in
//! [`TaskInstance::extra`] and written back unchanged.

use crate::slice::MutationLevel;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Provenance tag carried by harvested issues.
pub const HARVESTED_SOURCE: &str = "harvested";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub instance_id: String,
    pub repo: String,
    pub base_commit: String,
    pub problem_statement: String,
    pub patch: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_patch: Option<String>,
    /// Issue creation time as published; see [`TaskInstance::created_at_utc`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harvested_at: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_fresh: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub test_commands: Vec<String>,
    #[serde(rename = "FAIL_TO_PASS", default, deserialize_with = "list_or_encoded_list")]
    pub fail_to_pass: Vec<String>,
    #[serde(rename = "PASS_TO_PASS", default, deserialize_with = "list_or_encoded_list")]
    pub pass_to_pass: Vec<String>,
    #[serde(default, deserialize_with = "opt_string_or_number", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_setup_commit: Option<String>,

    // Retro-holdout provenance
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_retro_holdout: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_level: Option<MutationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_mutations: Option<CodeMutations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutated_repo_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub adversarial_enabled: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// What the retro-holdout rewrite changed in the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeMutations {
    pub variables: BTreeMap<String, String>,
    pub functions: BTreeMap<String, String>,
    pub classes: BTreeMap<String, String>,
    /// Relative paths of rewritten files.
    pub files_mutated: Vec<String>,
    pub seed: u64,
}

impl CodeMutations {
    pub fn rename_count(&self) -> usize {
        self.variables.len() + self.functions.len() + self.classes.len()
    }
}

impl TaskInstance {
    pub fn new(
        instance_id: impl Into<String>,
        repo: impl Into<String>,
        base_commit: impl Into<String>,
        problem_statement: impl Into<String>,
        patch: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            repo: repo.into(),
            base_commit: base_commit.into(),
            problem_statement: problem_statement.into(),
            patch: patch.into(),
            test_patch: None,
            created_at: None,
            harvested_at: None,
            is_fresh: false,
            source: None,
            test_commands: Vec::new(),
            fail_to_pass: Vec::new(),
            pass_to_pass: Vec::new(),
            version: None,
            hints_text: None,
            environment_setup_commit: None,
            is_retro_holdout: false,
            original_instance_id: None,
            mutation_level: None,
            mutation_hash: None,
            code_mutations: None,
            mutated_repo_path: None,
            adversarial_enabled: false,
            extra: BTreeMap::new(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse task instance JSON")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Harvested rather than drawn from a published benchmark.
    pub fn has_fresh_provenance(&self) -> bool {
        self.is_fresh || self.source.as_deref() == Some(HARVESTED_SOURCE)
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    pub fn harvested_at_utc(&self) -> Option<DateTime<Utc>> {
        self.harvested_at.as_deref().and_then(parse_timestamp)
    }
}

/// RFC 3339 (`Z` or offset), a naive `YYYY-MM-DDTHH:MM:SS[.f]` taken as UTC,
/// or a bare date at midnight UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// SWE-bench ships test lists either as arrays or as JSON-encoded strings.
fn list_or_encoded_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Encoded(String),
        Null(()),
    }
    match Raw::deserialize(deserializer)? {
        Raw::List(list) => Ok(list),
        Raw::Null(()) => Ok(Vec::new()),
        Raw::Encoded(text) if text.trim().is_empty() => Ok(Vec::new()),
        Raw::Encoded(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
    }
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SWE_BENCH_ROW: &str = r#"{
        "instance_id": "astropy__astropy-12907",
        "repo": "astropy/astropy",
        "base_commit": "d16bfe05",
        "problem_statement": "Separability matrix is wrong for nested models.",
        "patch": "--- a/x.py\n+++ b/x.py\n",
        "FAIL_TO_PASS": "[\"test_separable\"]",
        "PASS_TO_PASS": [],
        "version": 4.3,
        "created_at": "2022-03-03T15:14:54Z",
        "environment_setup_commit": "298ccb47",
        "difficulty": "15 min - 1 hour"
    }"#;

    #[test]
    fn test_swe_bench_row_round_trips_unknown_keys() {
        let instance = TaskInstance::from_json(SWE_BENCH_ROW).unwrap();
        assert_eq!(instance.fail_to_pass, vec!["test_separable"]);
        assert_eq!(instance.version.as_deref(), Some("4.3"));
        assert_eq!(instance.extra["difficulty"], "15 min - 1 hour");

        let value = serde_json::to_value(&instance).unwrap();
        assert_eq!(value["difficulty"], "15 min - 1 hour");
        assert_eq!(value["FAIL_TO_PASS"][0], "test_separable");
        assert!(value.get("is_retro_holdout").is_none());
    }

    #[test]
    fn test_missing_required_field_is_an_error() {
        assert!(TaskInstance::from_json(r#"{"instance_id": "x"}"#).is_err());
    }

    #[test]
    fn test_provenance_and_timestamps() {
        let mut instance = TaskInstance::new("a-1", "a/a", "abc", "broken", "");
        assert!(!instance.has_fresh_provenance());
        instance.source = Some(HARVESTED_SOURCE.to_string());
        assert!(instance.has_fresh_provenance());

        instance.created_at = Some("2024-05-01T12:00:00".to_string());
        assert_eq!(instance.created_at_utc(), Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        assert_eq!(
            parse_timestamp("2024-05-01T14:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("2024-05-01"), Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        assert_eq!(parse_timestamp("last tuesday"), None);
    }
}
