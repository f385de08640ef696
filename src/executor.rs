//! Command execution.
//!
//! Runs one shell command line with a timeout and captures what it printed.
//! Every way a command can fail to complete is folded into an
//! [`ExecutionOutcome`]; nothing here returns an error to the caller.

use serde::Serialize;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Classification recorded when a command overruns its timeout.
pub const TIMEOUT_EXPIRED: &str = "TimeoutExpired";

/// Return code reported for a timed-out command.
pub const TIMEOUT_RETURNCODE: i32 = -1;

/// Return code reported when the command could not be run at all.
pub const EXECUTION_ERROR_RETURNCODE: i32 = -2;

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What happened when a command was run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr, or the failure message if the command didn't complete.
    pub stderr: String,
    /// Exit code, [`TIMEOUT_RETURNCODE`] or [`EXECUTION_ERROR_RETURNCODE`].
    pub returncode: i32,
    /// Set when the command did not run to completion.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Outcome of a command that exited on its own.
    pub fn completed(stdout: &str, stderr: &str, returncode: i32) -> Self {
        Self {
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            returncode,
            error: None,
        }
    }

    /// Outcome of a command that was killed after `timeout`.
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!(
                "Command timed out after {} seconds.",
                format_secs(timeout)
            ),
            returncode: TIMEOUT_RETURNCODE,
            error: Some(TIMEOUT_EXPIRED.to_string()),
        }
    }

    /// Outcome of a command that could not be run or read.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            stdout: String::new(),
            stderr: message.clone(),
            returncode: EXECUTION_ERROR_RETURNCODE,
            error: Some(message),
        }
    }

    /// Whether the command overran its timeout.
    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_EXPIRED)
    }
}

/// Runs a command line and reports the outcome.
pub trait Execute: Sync {
    fn execute(&self, command: &str, timeout: Duration) -> ExecutionOutcome;
}

/// Shell used to interpret command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    /// Shell executable.
    pub program: String,
    /// Flag that makes the shell run its next argument as a command line.
    pub flag: String,
}

impl Shell {
    pub fn new(program: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            flag: flag.into(),
        }
    }
}

impl Default for Shell {
    #[cfg(not(windows))]
    fn default() -> Self {
        Self::new("sh", "-c")
    }

    #[cfg(windows)]
    fn default() -> Self {
        Self::new("cmd", "/C")
    }
}

/// Executes commands through a [`Shell`].
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    shell: Shell,
}

impl ShellExecutor {
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    fn run(&self, command: &str, timeout: Duration) -> Result<ExecutionOutcome, String> {
        let start = Instant::now();
        let deadline = start
            .checked_add(timeout)
            .ok_or_else(|| format!("timeout of {} seconds is too large", format_secs(timeout)))?;

        tracing::debug!(shell = %self.shell.program, command, "spawning command");
        let mut cmd = Command::new(&self.shell.program);
        cmd.arg(&self.shell.flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout takes down everything the shell started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn '{}': {e}", self.shell.program))?;

        // Drain both pipes off-thread so a full pipe can't stall the child.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    let now = Instant::now();
                    if now >= deadline {
                        kill(&mut child);
                        tracing::warn!(command, ?timeout, "command timed out");
                        return Ok(ExecutionOutcome::timed_out(timeout));
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => {
                    kill(&mut child);
                    return Err(format!("failed to wait for command: {e}"));
                }
            }
        };

        // A background process can keep the pipes open after the shell exits.
        let (Some(stdout), Some(stderr)) = (collect(stdout, deadline)?, collect(stderr, deadline)?)
        else {
            kill(&mut child);
            tracing::warn!(command, ?timeout, "command output still open at timeout");
            return Ok(ExecutionOutcome::timed_out(timeout));
        };

        let returncode = exit_code(status)
            .ok_or_else(|| "command ended without an exit status".to_string())?;
        tracing::debug!(
            command,
            returncode,
            elapsed = ?start.elapsed(),
            "command finished"
        );
        Ok(ExecutionOutcome::completed(&stdout, &stderr, returncode))
    }
}

impl Execute for ShellExecutor {
    fn execute(&self, command: &str, timeout: Duration) -> ExecutionOutcome {
        self.run(command, timeout).unwrap_or_else(|e| {
            tracing::warn!(command, error = %e, "command execution failed");
            ExecutionOutcome::failed(e)
        })
    }
}

/// Convert a timeout in seconds to a [`Duration`].
pub fn timeout_from_secs(secs: f64) -> Result<Duration, String> {
    if secs <= 0.0 {
        return Err(format!("invalid timeout: {secs} seconds"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout: {secs} seconds ({e})"))
}

/// Render a duration in seconds, without a fraction when it is whole.
pub fn format_secs(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        d.as_secs().to_string()
    } else {
        d.as_secs_f64().to_string()
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<std::io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = reader.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });
    rx
}

/// Wait for a drained pipe until `deadline`. `Ok(None)` means time ran out.
fn collect(
    rx: Option<Receiver<std::io::Result<Vec<u8>>>>,
    deadline: Instant,
) -> Result<Option<String>, String> {
    let Some(rx) = rx else {
        return Ok(Some(String::new()));
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    match rx.recv_timeout(remaining) {
        // Invalid UTF-8 is replaced rather than failing the case.
        Ok(Ok(bytes)) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Ok(Err(e)) => Err(format!("failed to read output: {e}")),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err("output reader exited early".to_string()),
    }
}

/// Kill the shell's whole process group, then reap the shell.
///
/// Safe after the shell has already been reaped: the group id stays
/// reserved while any member is alive.
fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if let Ok(pgid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Exit code of a finished process. A signal death maps to `128 + signal`.
fn exit_code(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(|signal| 128 + signal)
    }
    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn run(command: &str) -> ExecutionOutcome {
        ShellExecutor::default().execute(command, Duration::from_secs(10))
    }

    #[test]
    fn captures_trimmed_stdout() {
        let outcome = run("echo '  hello  '");
        assert_eq!(outcome.stdout, "hello");
        assert_eq!(outcome.stderr, "");
        assert_eq!(outcome.returncode, 0);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn captures_stderr() {
        let outcome = run("echo oops >&2");
        assert_eq!(outcome.stdout, "");
        assert_eq!(outcome.stderr, "oops");
    }

    #[test]
    fn shell_resolves_pipes_and_operators() {
        let outcome = run("printf 'b\\na\\n' | sort && echo done");
        assert_eq!(outcome.stdout, "a\nb\ndone");
    }

    #[test]
    fn reports_exit_code() {
        let outcome = run("exit 3");
        assert_eq!(outcome.returncode, 3);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn signal_death_maps_above_128() {
        let outcome = run("kill -9 $$");
        assert_eq!(outcome.returncode, 137);
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn timeout_kills_command() {
        let start = Instant::now();
        let outcome = ShellExecutor::default().execute("sleep 5", Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(4));

        assert!(outcome.is_timeout());
        assert_eq!(outcome.returncode, TIMEOUT_RETURNCODE);
        assert_eq!(outcome.stdout, "");
        assert_eq!(outcome.stderr, "Command timed out after 1 seconds.");
        assert_eq!(outcome.error.as_deref(), Some("TimeoutExpired"));
    }

    #[test]
    fn timeout_kills_subshells() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let command = format!("(sleep 2; touch '{}'); echo after", marker.display());

        let outcome = ShellExecutor::default().execute(&command, Duration::from_millis(500));
        assert!(outcome.is_timeout());

        thread::sleep(Duration::from_secs(3));
        assert!(!marker.exists(), "subshell survived the timeout");
    }

    #[test]
    fn background_job_holding_output_times_out() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let command = format!("(sleep 3; touch '{}') & echo hi", marker.display());

        let start = Instant::now();
        let outcome = ShellExecutor::default().execute(&command, Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(outcome.is_timeout());
        assert_eq!(outcome.returncode, TIMEOUT_RETURNCODE);
        assert_eq!(outcome.stderr, "Command timed out after 1 seconds.");

        thread::sleep(Duration::from_secs(4));
        assert!(!marker.exists(), "background job survived the timeout");
    }

    #[test]
    fn invalid_utf8_output_is_replaced() {
        let outcome = run("printf 'ok\\377\\n'");
        assert_eq!(outcome.returncode, 0);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.stdout, "ok\u{FFFD}");
    }

    #[test]
    fn fractional_timeout_message() {
        let outcome = ShellExecutor::default().execute("sleep 5", Duration::from_millis(200));
        assert_eq!(outcome.stderr, "Command timed out after 0.2 seconds.");
    }

    #[test]
    fn missing_shell_is_execution_error() {
        let executor = ShellExecutor::new(Shell::new("/nonexistent/shell-12345", "-c"));
        let outcome = executor.execute("echo hi", Duration::from_secs(1));

        assert_eq!(outcome.returncode, EXECUTION_ERROR_RETURNCODE);
        assert_eq!(outcome.stdout, "");
        let error = outcome.error.expect("error should be set");
        assert!(error.contains("failed to spawn"), "error: {error}");
        assert_eq!(outcome.stderr, error);
    }

    #[test]
    fn large_output_does_not_stall() {
        let outcome = run("head -c 200000 /dev/zero | tr '\\0' a");
        assert_eq!(outcome.returncode, 0);
        assert_eq!(outcome.stdout.len(), 200000);
    }

    #[test]
    fn timeout_from_secs_rejects_bad_values() {
        assert!(timeout_from_secs(0.0).is_err());
        assert!(timeout_from_secs(-1.0).is_err());
        assert!(timeout_from_secs(f64::NAN).is_err());
        assert!(timeout_from_secs(f64::INFINITY).is_err());
        assert_eq!(timeout_from_secs(1.5).unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn format_secs_drops_whole_fraction() {
        assert_eq!(format_secs(Duration::from_secs(60)), "60");
        assert_eq!(format_secs(Duration::from_millis(2500)), "2.5");
    }
}
