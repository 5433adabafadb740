//! Output formatting and input loading shared by the subcommands.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::path::Path;

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", holdout_bench::api::to_json(value)?);
    Ok(())
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Read `path`, or return an empty string when no path was given.
pub fn read_optional_text(path: Option<&Path>) -> Result<String> {
    path.map(read_text).transpose().map(Option::unwrap_or_default)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = read_text(path)?;
    serde_json::from_str(&text).with_context(|| format!("parse JSON from {}", path.display()))
}

pub fn format_score(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

pub fn format_error(error: &anyhow::Error, json_output: bool) -> String {
    if json_output {
        #[derive(Serialize)]
        struct ErrorJson {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            cause: Option<String>,
        }

        let err = ErrorJson {
            error: error.to_string(),
            cause: error.source().map(|e| e.to_string()),
        };
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut out = format!("\x1b[31mError:\x1b[0m {}", error);
        let mut causes = error.chain().skip(1).peekable();
        if causes.peek().is_some() {
            out.push_str("\nCaused by:");
            for (idx, cause) in causes.enumerate() {
                out.push_str(&format!("\n  {}: {}", idx + 1, cause));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_json_includes_cause() {
        let err = anyhow::anyhow!("disk full").context("write report");
        let json: serde_json::Value = serde_json::from_str(&format_error(&err, true)).unwrap();
        assert_eq!(json["error"], "write report");
        assert_eq!(json["cause"], "disk full");

        let human = format_error(&err, false);
        assert!(human.contains("Caused by:\n  1: disk full"));
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0.4567), "45.7%");
    }
}
