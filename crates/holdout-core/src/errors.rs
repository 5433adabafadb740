//! Error types and the failure taxonomy shared by every mutation entry point.
//!
//! # Error Taxonomy
//!
//! | Phase | Meaning | Codes |
//! |-------|---------|-------|
//! | Parse | Input source does not parse | E101-E102 |
//! | Transform | A transformation stage hit an unexpected tree shape | E201 |
//! | Verification | A candidate failed its syntax or test-equivalence check | E301-E303 |
//! | Repository | Target path missing or unreadable | E401-E403 |
//! | Collaborator | An injected external collaborator failed | E501-E502 |
//!
//! Parse, transform and verification failures are recoverable: the caller
//! keeps the last good text. Repository failures end a `mutate_repository`
//! call with a structured result. Collaborator failures fall back to the
//! heuristic path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source text could not be tokenized or parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// A transformation stage could not complete on the current tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("{stage}: unexpected {node} node: {detail}")]
    UnexpectedShape {
        stage: &'static str,
        node: &'static str,
        detail: String,
    },
    #[error("{stage}: {detail}")]
    Invariant { stage: &'static str, detail: String },
}

impl TransformError {
    pub fn stage(&self) -> &'static str {
        match self {
            TransformError::UnexpectedShape { stage, .. } | TransformError::Invariant { stage, .. } => {
                stage
            }
        }
    }
}

// =============================================================================
// Failure taxonomy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parse,
    Transform,
    Verification,
    Repository,
    Collaborator,
}

impl Phase {
    pub fn code_prefix(&self) -> u16 {
        match self {
            Phase::Parse => 100,
            Phase::Transform => 200,
            Phase::Verification => 300,
            Phase::Repository => 400,
            Phase::Collaborator => 500,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Phase::Parse => "parse",
            Phase::Transform => "transform",
            Phase::Verification => "verification",
            Phase::Repository => "repository",
            Phase::Collaborator => "collaborator",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// E101: Source text is not valid Python
    #[serde(rename = "E101")]
    SyntaxError,
    /// E102: Source uses syntax the parser does not model
    #[serde(rename = "E102")]
    UnsupportedSyntax,

    /// E201: A transformation stage failed and was rolled back
    #[serde(rename = "E201")]
    TransformFailed,
    /// E202: Mutation finished without changing any file
    #[serde(rename = "E202")]
    NothingMutated,

    /// E301: Mutated text no longer parses
    #[serde(rename = "E301")]
    SyntaxCheckFailed,
    /// E302: Test commands disagree between original and mutated trees
    #[serde(rename = "E302")]
    TestsDiverged,
    /// E303: Test commands exceeded the verification timeout
    #[serde(rename = "E303")]
    VerificationTimeout,

    /// E401: Target path does not exist
    #[serde(rename = "E401")]
    PathNotFound,
    /// E402: Target path is not a directory
    #[serde(rename = "E402")]
    NotADirectory,
    /// E403: Filesystem read, copy or write failed
    #[serde(rename = "E403")]
    IoError,

    /// E501: Collaborator call failed
    #[serde(rename = "E501")]
    CollaboratorUnavailable,
    /// E502: Collaborator response could not be parsed
    #[serde(rename = "E502")]
    MalformedResponse,
}

impl ErrorCode {
    pub fn phase(&self) -> Phase {
        match self {
            ErrorCode::SyntaxError | ErrorCode::UnsupportedSyntax => Phase::Parse,
            ErrorCode::TransformFailed | ErrorCode::NothingMutated => Phase::Transform,
            ErrorCode::SyntaxCheckFailed
            | ErrorCode::TestsDiverged
            | ErrorCode::VerificationTimeout => Phase::Verification,
            ErrorCode::PathNotFound | ErrorCode::NotADirectory | ErrorCode::IoError => {
                Phase::Repository
            }
            ErrorCode::CollaboratorUnavailable | ErrorCode::MalformedResponse => {
                Phase::Collaborator
            }
        }
    }

    pub fn numeric_code(&self) -> u16 {
        let offset = match self {
            ErrorCode::SyntaxError => 1,
            ErrorCode::UnsupportedSyntax => 2,
            ErrorCode::TransformFailed => 1,
            ErrorCode::NothingMutated => 2,
            ErrorCode::SyntaxCheckFailed => 1,
            ErrorCode::TestsDiverged => 2,
            ErrorCode::VerificationTimeout => 3,
            ErrorCode::PathNotFound => 1,
            ErrorCode::NotADirectory => 2,
            ErrorCode::IoError => 3,
            ErrorCode::CollaboratorUnavailable => 1,
            ErrorCode::MalformedResponse => 2,
        };
        self.phase().code_prefix() + offset
    }

    /// `E101` style string.
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric_code())
    }

    /// Recoverable failures keep the last good value instead of failing the call.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ErrorCode::PathNotFound | ErrorCode::NotADirectory
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code_string())
    }
}

/// Structured failure carried in results instead of an error return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub phase: Phase,
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl Failure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            phase: code.phase(),
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn parse(err: &ParseError) -> Self {
        Self::new(ErrorCode::SyntaxError, err.to_string())
    }

    pub fn transform(err: &TransformError) -> Self {
        Self::new(ErrorCode::TransformFailed, err.to_string()).with_context("stage", err.stage())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        for (key, value) in &self.context {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_strings_follow_phase_prefix() {
        assert_eq!(ErrorCode::SyntaxError.code_string(), "E101");
        assert_eq!(ErrorCode::TransformFailed.code_string(), "E201");
        assert_eq!(ErrorCode::NothingMutated.code_string(), "E202");
        assert_eq!(ErrorCode::VerificationTimeout.code_string(), "E303");
        assert_eq!(ErrorCode::NotADirectory.code_string(), "E402");
        assert_eq!(ErrorCode::MalformedResponse.code_string(), "E502");
    }

    #[test]
    fn test_failure_serialization_uses_codes() {
        let failure = Failure::new(ErrorCode::PathNotFound, "missing")
            .with_context("path", "/nope");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["code"], "E401");
        assert_eq!(json["phase"], "repository");
        assert_eq!(json["context"]["path"], "/nope");
        assert!(!failure.code.is_recoverable());
    }

    #[test]
    fn test_failure_display() {
        let err = TransformError::Invariant {
            stage: "reorder",
            detail: "duplicate definition".into(),
        };
        let failure = Failure::transform(&err);
        assert_eq!(
            failure.to_string(),
            "[E201] reorder: duplicate definition stage=reorder"
        );
    }
}
