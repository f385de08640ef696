//! Test execution engine.
//!
//! Runs test case definitions in order, validates what each command
//! printed and collects one [`TestResult`] per definition.

use crate::executor::{self, Execute, ExecutionOutcome};
use crate::schema::{DEFAULT_TIMEOUT_SECS, TestCaseDefinition, ValidationMode};
use crate::validator::{self, Channel, Validation};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Reason recorded for a definition without a command.
pub const MISSING_COMMAND: &str = "Test case definition missing 'command'.";

/// Final verdict for one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    /// Every check passed.
    Pass,
    /// The command failed to complete or a check did not match.
    Fail,
    /// The definition itself was unusable.
    Error,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Error => "ERROR",
        })
    }
}

/// Result of running a single test case.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub command: Option<String>,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    /// Execution failure classification (e.g. `TimeoutExpired`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub actual_stdout: Option<String>,
    pub actual_stderr: Option<String>,
    pub actual_returncode: Option<i32>,
    pub expected_stdout: Option<String>,
    pub expected_stderr: Option<String>,
    pub expected_returncode: Option<i32>,
    pub stdout_mode: Option<ValidationMode>,
    pub stderr_mode: Option<ValidationMode>,
    pub returncode_validation: Option<Validation>,
    pub stdout_validation: Option<Validation>,
    pub stderr_validation: Option<Validation>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

impl TestResult {
    fn definition_error(name: String) -> Self {
        Self {
            name,
            command: None,
            status: TestStatus::Error,
            status_reason: Some(MISSING_COMMAND.to_string()),
            error: None,
            actual_stdout: None,
            actual_stderr: None,
            actual_returncode: None,
            expected_stdout: None,
            expected_stderr: None,
            expected_returncode: None,
            stdout_mode: None,
            stderr_mode: None,
            returncode_validation: None,
            stdout_validation: None,
            stderr_validation: None,
            duration: Duration::ZERO,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }

    /// Human-readable lines explaining why this case did not pass.
    ///
    /// Built from the stored validations; nothing is re-evaluated.
    pub fn failures(&self) -> Vec<String> {
        if self.passed() {
            return Vec::new();
        }
        if let Some(reason) = &self.status_reason {
            return vec![reason.clone()];
        }

        let mut failures = Vec::new();
        if let Some(v) = self.returncode_validation.as_ref().filter(|v| !v.matched) {
            failures.push(v.detail());
        }
        let channels = [
            (
                Channel::Stdout,
                &self.stdout_validation,
                &self.stdout_mode,
                &self.expected_stdout,
                &self.actual_stdout,
            ),
            (
                Channel::Stderr,
                &self.stderr_validation,
                &self.stderr_mode,
                &self.expected_stderr,
                &self.actual_stderr,
            ),
        ];
        for (channel, validation, mode, expected, actual) in channels {
            if let Some(v) = validation.as_ref().filter(|v| !v.matched) {
                failures.push(format!(
                    "{channel} MISMATCH: {}\n  Expected ({}): '{}'\n  Actual:   '{}'",
                    v.detail(),
                    mode.as_ref().map(ValidationMode::as_str).unwrap_or("exact"),
                    expected.as_deref().unwrap_or("None"),
                    actual.as_deref().unwrap_or(""),
                ));
            }
        }
        failures
    }
}

/// Results of a whole run, in definition order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub results: Vec<TestResult>,
    pub passed_count: usize,
    pub failed_count: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_passed(&self) -> bool {
        self.failed_count == 0
    }
}

/// Options for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum number of cases run at once. 1 runs strictly in order.
    pub jobs: usize,
    /// Timeout in seconds for cases that don't set their own.
    pub default_timeout: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            default_timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Receives progress events as cases run.
///
/// With `jobs > 1` events arrive from worker threads and cases may finish
/// out of order; `index` is always the position in the input.
pub trait RunObserver: Sync {
    fn case_started(&self, _index: usize, _total: usize, _case: &TestCaseDefinition) {}
    fn case_finished(&self, _index: usize, _total: usize, _result: &TestResult) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl RunObserver for NoProgress {}

#[derive(Debug, Default)]
struct Tally {
    passed: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail | TestStatus::Error => self.failed += 1,
        }
    }
}

/// Run every definition and collect the results.
///
/// No case can abort the run: every failure becomes a [`TestResult`].
pub fn run(
    definitions: &[TestCaseDefinition],
    executor: &dyn Execute,
    options: &RunOptions,
    observer: &dyn RunObserver,
) -> RunSummary {
    let total = definitions.len();
    let jobs = options.jobs.clamp(1, total.max(1));
    tracing::info!(total, jobs, "starting test run");

    let run_one = |index: usize, case: &TestCaseDefinition| {
        observer.case_started(index, total, case);
        let result = run_case(case, executor, options.default_timeout);
        tracing::info!(
            index = index + 1,
            name = %result.name,
            status = %result.status,
            "test case finished"
        );
        observer.case_finished(index, total, &result);
        result
    };

    let mut tally = Tally::default();
    let mut results = Vec::with_capacity(total);

    if jobs == 1 {
        for (index, case) in definitions.iter().enumerate() {
            let result = run_one(index, case);
            tally.record(result.status);
            results.push(result);
        }
    } else {
        let next = AtomicUsize::new(0);
        let (next, run_one) = (&next, &run_one);
        let mut indexed: Vec<(usize, TestResult)> = thread::scope(|s| {
            let handles: Vec<_> = (0..jobs)
                .map(|_| {
                    s.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(case) = definitions.get(index) else {
                                break;
                            };
                            done.push((index, run_one(index, case)));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().expect("Test worker thread panicked"))
                .collect()
        });

        // Sort by original index to maintain declaration order
        indexed.sort_by_key(|(index, _)| *index);
        for (_, result) in indexed {
            tally.record(result.status);
            results.push(result);
        }
    }

    tracing::info!(
        passed = tally.passed,
        failed = tally.failed,
        "test run finished"
    );
    RunSummary {
        results,
        passed_count: tally.passed,
        failed_count: tally.failed,
    }
}

/// Run a single test case.
pub fn run_case(
    case: &TestCaseDefinition,
    executor: &dyn Execute,
    default_timeout: f64,
) -> TestResult {
    let start = Instant::now();
    let name = case.display_name().to_string();

    let Some(command) = case.command() else {
        tracing::warn!(name = %name, "test case has no command");
        return TestResult::definition_error(name);
    };

    let timeout_secs = case.timeout.unwrap_or(default_timeout);
    let outcome = match executor::timeout_from_secs(timeout_secs) {
        Ok(timeout) => executor.execute(command, timeout),
        Err(e) => ExecutionOutcome::failed(e),
    };

    // Execution failures skip validation entirely.
    let (status, status_reason, checks) = match &outcome.error {
        Some(error) => (
            TestStatus::Fail,
            Some(format!("Command execution error: {error}")),
            None,
        ),
        None => {
            let returncode = Validation::returncode(outcome.returncode, case.expected_returncode);
            let stdout = check_channel(
                Channel::Stdout,
                &outcome.stdout,
                case.expected_stdout.as_deref(),
                &case.stdout_mode,
            );
            let stderr = check_channel(
                Channel::Stderr,
                &outcome.stderr,
                case.expected_stderr.as_deref(),
                &case.stderr_mode,
            );
            let status = if returncode.matched && stdout.matched && stderr.matched {
                TestStatus::Pass
            } else {
                TestStatus::Fail
            };
            (status, None, Some((returncode, stdout, stderr)))
        }
    };
    let (returncode_validation, stdout_validation, stderr_validation) = match checks {
        Some((rc, out, err)) => (Some(rc), Some(out), Some(err)),
        None => (None, None, None),
    };

    TestResult {
        name,
        command: Some(command.to_string()),
        status,
        status_reason,
        error: outcome.error,
        actual_stdout: Some(outcome.stdout),
        actual_stderr: Some(outcome.stderr),
        actual_returncode: Some(outcome.returncode),
        expected_stdout: case.expected_stdout.clone(),
        expected_stderr: case.expected_stderr.clone(),
        expected_returncode: Some(case.expected_returncode),
        stdout_mode: Some(case.stdout_mode.clone()),
        stderr_mode: Some(case.stderr_mode.clone()),
        returncode_validation,
        stdout_validation,
        stderr_validation,
        duration: start.elapsed(),
    }
}

/// A channel with no expectation and mode `ignore` is a vacuous pass.
fn check_channel(
    channel: Channel,
    actual: &str,
    expected: Option<&str>,
    mode: &ValidationMode,
) -> Validation {
    if expected.is_none() && *mode == ValidationMode::Ignore {
        Validation::not_configured(channel)
    } else {
        validator::validate(Some(actual), expected, mode)
    }
}
