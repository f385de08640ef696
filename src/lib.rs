//! cmdcheck: a declarative command test runner.
//!
//! Test cases pair a shell command with the stdout, stderr and return code
//! it should produce. [`runner::run`] executes them, validates the output
//! and returns a [`runner::RunSummary`] for reporting.

pub mod error;
pub mod executor;
pub mod loader;
pub mod report;
pub mod runner;
pub mod schema;
pub mod validator;

pub use error::{Error, LoadError, ReportError, Result};
pub use executor::{Execute, ExecutionOutcome, Shell, ShellExecutor};
pub use runner::{RunObserver, RunOptions, RunSummary, TestResult, TestStatus};
pub use schema::{TestCaseDefinition, ValidationMode};
pub use validator::{Validation, validate};
