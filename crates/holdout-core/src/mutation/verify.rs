//! Test-command execution for semantic-equivalence checks.
//!
//! A mutated tree is accepted only if every test command produces the same
//! pass/fail tally in the original and the mutated tree. Commands run through a
//! [`TestCommandRunner`] so callers can substitute a fake in tests; the default
//! [`ProcessRunner`] spawns `sh -c <command>` and kills it at the timeout.

use crate::errors::{ErrorCode, Failure};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const OUTPUT_TAIL_BYTES: usize = 4096;
/// How long to keep draining pipes once the shell itself is gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Result of running one command once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: String,
    pub passed: bool,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_tail: String,
}

pub trait TestCommandRunner: Send + Sync {
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<CommandOutcome>;
}

/// Runs commands through the system shell.
///
/// On unix the shell leads its own process group and a timeout kills the
/// whole group, so subprocesses started by the command die with it.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    pub shell: String,
    pub poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl TestCommandRunner for ProcessRunner {
    fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<CommandOutcome> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn test command `{command}` in {}", cwd.display()))?;
        let captured = Arc::new(Mutex::new(Vec::new()));
        let readers = [
            drain(child.stdout.take().context("stdout pipe")?, captured.clone()),
            drain(child.stderr.take().context("stderr pipe")?, captured.clone()),
        ];

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().context("check test command status")? {
                break Some(status);
            }
            if start.elapsed() >= timeout {
                kill_process_tree(&mut child);
                let _ = child.wait();
                break None;
            }
            std::thread::sleep(self.poll_interval);
        };

        // Readers still blocked on a pipe held by an escaped process are left
        // to finish on their own.
        let drain_deadline = Instant::now() + PIPE_DRAIN_GRACE;
        while readers.iter().any(|r| !r.is_finished()) && Instant::now() < drain_deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let output = captured.lock().clone();
        let tail_start = output.len().saturating_sub(OUTPUT_TAIL_BYTES);
        let output_tail = String::from_utf8_lossy(&output[tail_start..]).into_owned();

        Ok(CommandOutcome {
            command: command.to_string(),
            passed: status.is_some_and(|s| s.success()),
            timed_out: status.is_none(),
            exit_code: status.and_then(|s| s.code()),
            duration_ms: start.elapsed().as_millis() as u64,
            output_tail,
        })
    }
}

fn drain(mut pipe: impl Read + Send + 'static, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().extend_from_slice(&buf[..n]),
            }
        }
    })
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(err) = killpg(pgid, Signal::SIGKILL) {
        debug!(pid = child.id(), error = %err, "process group kill failed, killing shell only");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Pass/fail tally over a list of commands. A timeout counts as a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl TestRunSummary {
    fn record(&mut self, outcome: &CommandOutcome) {
        if outcome.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        if outcome.timed_out {
            self.timed_out += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

/// Run every command in `cwd`. Spawn errors count as failures.
pub fn run_test_commands(
    runner: &dyn TestCommandRunner,
    commands: &[String],
    cwd: &Path,
    timeout: Duration,
) -> TestRunSummary {
    let mut summary = TestRunSummary::default();
    for command in commands {
        match runner.run(command, cwd, timeout) {
            Ok(outcome) => {
                debug!(command = %command, passed = outcome.passed, timed_out = outcome.timed_out, "test command finished");
                summary.record(&outcome);
            }
            Err(err) => {
                warn!(command = %command, error = %err, "test command could not run");
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Original versus mutated test tallies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceReport {
    pub original: TestRunSummary,
    pub mutated: TestRunSummary,
    pub equivalent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

/// Run `commands` in both trees and compare tallies.
pub fn verify_equivalence(
    runner: &dyn TestCommandRunner,
    commands: &[String],
    original_dir: &Path,
    mutated_dir: &Path,
    timeout: Duration,
) -> EquivalenceReport {
    let original = run_test_commands(runner, commands, original_dir, timeout);
    let mutated = run_test_commands(runner, commands, mutated_dir, timeout);
    let failure = if original.timed_out > 0 || mutated.timed_out > 0 {
        Some(Failure::new(
            ErrorCode::VerificationTimeout,
            format!("test commands exceeded {}s", timeout.as_secs_f64()),
        ))
    } else if (original.passed, original.failed) != (mutated.passed, mutated.failed) {
        Some(
            Failure::new(ErrorCode::TestsDiverged, "test results differ after mutation")
                .with_context("original", format!("{}/{}", original.passed, original.total()))
                .with_context("mutated", format!("{}/{}", mutated.passed, mutated.total())),
        )
    } else {
        None
    };
    EquivalenceReport {
        original,
        mutated,
        equivalent: failure.is_none(),
        failure,
    }
}

/// Run a single shell command in both trees with the default process runner.
pub fn validate_mutations(
    original_dir: &Path,
    mutated_dir: &Path,
    test_command: &str,
    timeout: Duration,
) -> EquivalenceReport {
    verify_equivalence(
        &ProcessRunner::default(),
        &[test_command.to_string()],
        original_dir,
        mutated_dir,
        timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Fails every command run in a directory whose name contains `broken`.
    struct FakeRunner {
        calls: Mutex<Vec<String>>,
    }

    impl TestCommandRunner for FakeRunner {
        fn run(&self, command: &str, cwd: &Path, _timeout: Duration) -> Result<CommandOutcome> {
            self.calls.lock().push(format!("{}:{command}", cwd.display()));
            let passed = !cwd.to_string_lossy().contains("broken");
            Ok(CommandOutcome {
                command: command.to_string(),
                passed,
                timed_out: false,
                exit_code: Some(if passed { 0 } else { 1 }),
                duration_ms: 1,
                output_tail: String::new(),
            })
        }
    }

    #[test]
    fn test_equivalent_when_tallies_match() {
        let runner = FakeRunner { calls: Mutex::new(Vec::new()) };
        let commands = vec!["pytest -x".to_string(), "pytest tests/unit".to_string()];
        let report = verify_equivalence(&runner, &commands, Path::new("/a"), Path::new("/b"), Duration::from_secs(1));
        assert!(report.equivalent);
        assert_eq!(report.original.passed, 2);
        assert_eq!(runner.calls.lock().len(), 4);
    }

    #[test]
    fn test_diverging_tallies_fail() {
        let runner = FakeRunner { calls: Mutex::new(Vec::new()) };
        let commands = vec!["pytest".to_string()];
        let report = verify_equivalence(&runner, &commands, Path::new("/a"), Path::new("/broken"), Duration::from_secs(1));
        assert!(!report.equivalent);
        assert_eq!(report.failure.unwrap().code, ErrorCode::TestsDiverged);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_exit_codes_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::default();
        let ok = runner.run("echo hi", dir.path(), Duration::from_secs(10)).unwrap();
        assert!(ok.passed);
        assert!(ok.output_tail.contains("hi"));
        let bad = runner.run("exit 3", dir.path(), Duration::from_secs(10)).unwrap();
        assert!(!bad.passed);
        assert_eq!(bad.exit_code, Some(3));
        let slow = runner.run("sleep 2", dir.path(), Duration::from_millis(100)).unwrap();
        assert!(slow.timed_out);
        assert!(!slow.passed);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_compound_commands() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::default();
        let start = Instant::now();
        let outcome = runner
            .run("echo started; sleep 4; echo done", dir.path(), Duration::from_millis(300))
            .unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.passed);
        assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
        assert!(outcome.output_tail.contains("started"));
        assert!(!outcome.output_tail.contains("done"));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_mutations_reports_timeout() {
        let original = tempfile::tempdir().unwrap();
        let mutated = tempfile::tempdir().unwrap();
        let report = validate_mutations(original.path(), mutated.path(), "sleep 2", Duration::from_millis(100));
        assert!(!report.equivalent);
        assert_eq!(report.failure.unwrap().code, ErrorCode::VerificationTimeout);
    }
}
