//! Freshly harvested issues.
//!
//! Issues opened after a model was trained cannot have been memorized. The
//! [`FreshIssueRegistry`] tracks when each was harvested so it counts as fresh
//! only for `max_age_hours`; [`convert_harvested`] turns a GitHub issue and its
//! fixing pull request into a [`TaskInstance`].

use chrono::{DateTime, Duration, Utc};
use holdout_types::{EvaluationSlice, TaskInstance, TaskMetadata, HARVESTED_SOURCE};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GithubIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub closed_at: Option<String>,
    /// Commit the issue was filed against, when the harvester knows it.
    #[serde(default)]
    pub base_commit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestBase {
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubPullRequest {
    #[serde(default)]
    pub base: PullRequestBase,
    #[serde(default)]
    pub files: Vec<PullRequestFile>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HarvestRecord {
    issue: GithubIssue,
    harvested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestStatistics {
    pub total_harvested: usize,
    pub currently_fresh: usize,
    pub expired: usize,
    pub max_age_hours: u64,
}

pub struct FreshIssueRegistry {
    max_age_hours: u64,
    issues: RwLock<BTreeMap<String, HarvestRecord>>,
}

impl FreshIssueRegistry {
    pub fn new(max_age_hours: u64) -> Self {
        Self {
            max_age_hours,
            issues: RwLock::new(BTreeMap::new()),
        }
    }

    /// Track an issue and return fresh-slice, LLM-only metadata for it.
    pub fn register(
        &self,
        instance_id: &str,
        issue: &GithubIssue,
        harvested_at: Option<DateTime<Utc>>,
    ) -> TaskMetadata {
        let harvested_at = harvested_at.unwrap_or_else(Utc::now);
        self.issues.write().insert(
            instance_id.to_string(),
            HarvestRecord {
                issue: issue.clone(),
                harvested_at,
            },
        );
        debug!(instance_id, %harvested_at, "registered harvested issue");
        TaskMetadata::new(EvaluationSlice::Fresh, false)
            .with_harvested_at(harvested_at)
            .with_base_commit(issue.base_commit.clone())
    }

    pub fn issue(&self, instance_id: &str) -> Option<GithubIssue> {
        self.issues.read().get(instance_id).map(|record| record.issue.clone())
    }

    pub fn is_fresh(&self, instance_id: &str) -> bool {
        self.is_fresh_at(instance_id, Utc::now())
    }

    pub fn is_fresh_at(&self, instance_id: &str, now: DateTime<Utc>) -> bool {
        self.issues
            .read()
            .get(instance_id)
            .is_some_and(|record| self.within_window(record, now))
    }

    fn within_window(&self, record: &HarvestRecord, now: DateTime<Utc>) -> bool {
        // Largest hour count chrono can represent in milliseconds.
        const MAX_HOURS: u64 = (i64::MAX / 3_600_000) as u64;
        let max_age = Duration::hours(self.max_age_hours.min(MAX_HOURS) as i64);
        now - record.harvested_at < max_age
    }

    pub fn fresh_instances(&self) -> Vec<String> {
        let now = Utc::now();
        self.issues
            .read()
            .iter()
            .filter(|(_, record)| self.within_window(record, now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn statistics(&self) -> HarvestStatistics {
        let now = Utc::now();
        let issues = self.issues.read();
        let currently_fresh = issues.values().filter(|r| self.within_window(r, now)).count();
        HarvestStatistics {
            total_harvested: issues.len(),
            currently_fresh,
            expired: issues.len() - currently_fresh,
            max_age_hours: self.max_age_hours,
        }
    }
}

/// Build a SWE-bench-shaped instance from an issue and the pull request that
/// fixed it. Test commands are left empty; they are repository-specific.
pub fn convert_harvested(issue: &GithubIssue, pr: &GithubPullRequest, owner: &str, repo: &str) -> TaskInstance {
    let problem_statement = format!("{}\n\n{}", issue.title, issue.body.as_deref().unwrap_or_default());
    let patch = pr
        .files
        .iter()
        .filter_map(|file| {
            file.patch
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(|p| format!("--- a/{name}\n+++ b/{name}\n{p}", name = file.filename))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut instance = TaskInstance::new(
        format!("{owner}__{repo}-{}", issue.number),
        format!("{owner}/{repo}"),
        pr.base.sha.clone(),
        problem_statement,
        patch,
    );
    instance.is_fresh = true;
    instance.source = Some(HARVESTED_SOURCE.to_string());
    instance.harvested_at = Some(Utc::now().to_rfc3339());
    instance.created_at = issue.created_at.clone();

    let mut extra = BTreeMap::new();
    extra.insert("repo_url".to_string(), Value::from(format!("https://github.com/{owner}/{repo}")));
    if let Some(url) = &issue.html_url {
        extra.insert("github_issue_url".to_string(), Value::from(url.as_str()));
    }
    if let Some(url) = &pr.html_url {
        extra.insert("github_pr_url".to_string(), Value::from(url.as_str()));
    }
    if let Some(closed) = &issue.closed_at {
        extra.insert("closed_at".to_string(), Value::from(closed.as_str()));
    }
    instance.extra = extra;
    instance
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issue() -> GithubIssue {
        GithubIssue {
            number: 812,
            title: "Crash on empty config".to_string(),
            body: Some("Loading `{}` raises KeyError.".to_string()),
            html_url: Some("https://github.com/acme/tool/issues/812".to_string()),
            created_at: Some("2025-03-01T10:00:00Z".to_string()),
            closed_at: None,
            base_commit: Some("f00d".to_string()),
        }
    }

    #[test]
    fn test_freshness_window() {
        let registry = FreshIssueRegistry::new(24);
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let meta = registry.register("acme__tool-812", &issue(), Some(at));
        assert_eq!(meta.evaluation_slice(), EvaluationSlice::Fresh);
        assert_eq!(meta.run_mode(), holdout_types::RunMode::LlmOnly);
        assert_eq!(meta.base_commit(), Some("f00d"));

        assert!(registry.is_fresh_at("acme__tool-812", at + Duration::hours(23)));
        assert!(!registry.is_fresh_at("acme__tool-812", at + Duration::hours(24)));
        assert!(!registry.is_fresh_at("unknown", at));
        assert_eq!(registry.issue("acme__tool-812").map(|i| i.number), Some(812));
    }

    #[test]
    fn test_statistics_count_expired() {
        let registry = FreshIssueRegistry::new(1);
        registry.register("old", &issue(), Some(Utc::now() - Duration::hours(5)));
        registry.register("new", &issue(), None);
        let stats = registry.statistics();
        assert_eq!(stats.total_harvested, 2);
        assert_eq!(stats.currently_fresh, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(registry.fresh_instances(), vec!["new".to_string()]);
    }

    #[test]
    fn test_convert_harvested() {
        let pr = GithubPullRequest {
            base: PullRequestBase { sha: "beef".to_string() },
            files: vec![
                PullRequestFile {
                    filename: "tool/config.py".to_string(),
                    patch: Some("@@ -1 +1 @@\n-a\n+b".to_string()),
                },
                PullRequestFile {
                    filename: "logo.png".to_string(),
                    patch: None,
                },
            ],
            html_url: Some("https://github.com/acme/tool/pull/813".to_string()),
        };
        let instance = convert_harvested(&issue(), &pr, "acme", "tool");
        assert_eq!(instance.instance_id, "acme__tool-812");
        assert_eq!(instance.repo, "acme/tool");
        assert_eq!(instance.base_commit, "beef");
        assert!(instance.has_fresh_provenance());
        assert!(instance.problem_statement.starts_with("Crash on empty config\n\n"));
        assert_eq!(
            instance.patch,
            "--- a/tool/config.py\n+++ b/tool/config.py\n@@ -1 +1 @@\n-a\n+b"
        );
        assert_eq!(instance.extra["github_pr_url"], "https://github.com/acme/tool/pull/813");
        assert!(instance.harvested_at_utc().is_some());
    }
}
