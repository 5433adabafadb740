//! Report types for fuzz runs.

use super::value_gen::FuzzValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedBehavior {
    NoCrash,
    ReturnsValue,
    RaisesException,
}

/// One probe: named inputs plus the behavior the patch should show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzTestCase {
    pub name: String,
    pub inputs: BTreeMap<String, FuzzValue>,
    pub expected_behavior: ExpectedBehavior,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_result: Option<String>,
    pub passed: bool,
}

impl FuzzTestCase {
    pub fn new(name: impl Into<String>, inputs: BTreeMap<String, FuzzValue>) -> Self {
        Self {
            name: name.into(),
            inputs,
            expected_behavior: ExpectedBehavior::NoCrash,
            actual_result: None,
            passed: false,
        }
    }
}

/// Heuristic judgement of one case against the patch text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseVerdict {
    pub passed: bool,
    /// The failure would surface as an exception rather than a wrong value.
    pub crash: bool,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzResult {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    /// Subset of `failed`.
    pub crashes: usize,
    /// `passed / total_tests`, 0 when there are no tests.
    pub score: f64,
    pub seed: u64,
    /// Bug-related keywords found in the problem statement.
    pub keywords: Vec<String>,
    pub test_cases: Vec<FuzzTestCase>,
}

impl FuzzResult {
    pub fn from_cases(test_cases: Vec<FuzzTestCase>, verdicts: &[CaseVerdict], seed: u64, keywords: Vec<String>) -> Self {
        let total_tests = test_cases.len();
        let passed = verdicts.iter().filter(|v| v.passed).count();
        let crashes = verdicts.iter().filter(|v| !v.passed && v.crash).count();
        Self {
            total_tests,
            passed,
            failed: total_tests - passed,
            crashes,
            score: if total_tests == 0 {
                0.0
            } else {
                passed as f64 / total_tests as f64
            },
            seed,
            keywords,
            test_cases,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzStatistics {
    pub tests_generated: usize,
    pub tests_run: usize,
    pub crashes_found: usize,
    pub crash_rate: f64,
}
