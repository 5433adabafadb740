use anyhow::Result;
use holdout_core::mutation::verify::{CommandOutcome, TestCommandRunner};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    /// Every command passes everywhere.
    AllPass,
    /// Commands pass in the original tree and fail in retro-holdout copies.
    BreaksMutated,
    /// Commands never finish.
    TimesOut,
}

/// Fake runner that records every `(cwd, command)` it is asked to run.
pub struct ScriptedRunner {
    script: Script,
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl ScriptedRunner {
    fn new(script: Script) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn all_pass() -> Self {
        Self::new(Script::AllPass)
    }

    pub fn breaks_mutated() -> Self {
        Self::new(Script::BreaksMutated)
    }

    pub fn times_out() -> Self {
        Self::new(Script::TimesOut)
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().clone()
    }
}

impl TestCommandRunner for ScriptedRunner {
    fn run(&self, command: &str, cwd: &Path, _timeout: Duration) -> Result<CommandOutcome> {
        self.calls.lock().push((cwd.to_path_buf(), command.to_string()));
        let in_copy = cwd.to_string_lossy().contains("_retro_");
        let (passed, timed_out) = match self.script {
            Script::AllPass => (true, false),
            Script::BreaksMutated => (!in_copy, false),
            Script::TimesOut => (false, true),
        };
        Ok(CommandOutcome {
            command: command.to_string(),
            passed,
            timed_out,
            exit_code: (!timed_out).then_some(if passed { 0 } else { 1 }),
            duration_ms: 1,
            output_tail: String::new(),
        })
    }
}
