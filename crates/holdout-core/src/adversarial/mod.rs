//! Adversarial probes for generated patches.
//!
//! # Architecture
//!
//! - [`TextGenerator`]: the optional model-backed collaborator. It is injected,
//!   never reached through global state; [`NoopGenerator`] stands in when no
//!   model is configured and [`MockGenerator`] replays canned responses.
//! - [`generator`]: [`AdversarialGenerator`], which asks the collaborator for
//!   probes, falls back to the built-in heuristic library on any failure, and
//!   scores a patch against the probes by pattern matching.

pub mod generator;

pub use generator::{
    AdversarialEvaluation, AdversarialGenerator, AdversarialStatistics, AdversarialSuite, AdversarialTest,
    GenerationSource, ProbeCategory, ProbeDetail, Severity, Verdict,
};

use anyhow::Result;
use parking_lot::Mutex;

/// Text-completion collaborator.
pub trait TextGenerator: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Short label for logs.
    fn name(&self) -> &str;
}

/// Collaborator used when generation is disabled; every call fails.
pub struct NoopGenerator;

impl TextGenerator for NoopGenerator {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow::anyhow!("text generation is disabled"))
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Replays a fixed response (or error) and records the prompts it was sent.
pub struct MockGenerator {
    response: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn responding(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(message.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl TextGenerator for MockGenerator {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        self.response.clone().map_err(|message| anyhow::anyhow!(message))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
