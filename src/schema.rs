//! Schema definitions for cmdcheck definition files.
//!
//! A definition file holds an ordered list of test cases. Each case is a
//! shell command plus the stdout, stderr and return code it is expected
//! to produce. Files may be written as JSON, YAML or TOML.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name used for test cases that don't define one.
pub const UNNAMED_TEST: &str = "Unnamed Test";

/// Timeout in seconds applied when neither the case nor the file sets one.
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// Root document of a definition file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DefinitionFile {
    /// Default timeout in seconds for cases that don't set their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    /// The test cases, run in declaration order.
    ///
    /// Required. Kept optional here so a missing key can be reported
    /// precisely by the loader instead of as a generic parse error.
    #[serde(default)]
    pub test_cases: Option<Vec<TestCaseDefinition>>,
}

/// A single test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestCaseDefinition {
    /// Display name (defaults to "Unnamed Test").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Shell command line to execute. Required; a case without one is
    /// reported as an error and never executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Timeout in seconds (overrides the file default, which overrides 60).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    /// Expected stdout, compared after trimming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_stdout: Option<String>,

    /// Expected stderr, compared after trimming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_stderr: Option<String>,

    /// How stdout is compared (default: exact).
    #[serde(default)]
    pub stdout_mode: ValidationMode,

    /// How stderr is compared (default: exact).
    #[serde(default)]
    pub stderr_mode: ValidationMode,

    /// Expected process exit code (default: 0).
    #[serde(default)]
    pub expected_returncode: i32,
}

impl TestCaseDefinition {
    /// Create a definition for `command` with every other field defaulted.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// The name to show for this case.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_TEST)
    }

    /// The command to run, treating an empty string as absent.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.is_empty())
    }
}

/// Matching mode for stdout/stderr.
///
/// Deserialized from a plain string. Unrecognized strings are kept as
/// [`ValidationMode::Unknown`] so the case still runs and reports the
/// bad mode as a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(from = "String", into = "String")]
pub enum ValidationMode {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// Expected text occurs somewhere in the output.
    Contains,
    /// Expected text is a regex found somewhere in the output.
    Regex,
    /// Output is not checked.
    Ignore,
    /// Anything else.
    Unknown(String),
}

impl From<String> for ValidationMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "exact" => ValidationMode::Exact,
            "contains" => ValidationMode::Contains,
            "regex" => ValidationMode::Regex,
            "ignore" => ValidationMode::Ignore,
            _ => ValidationMode::Unknown(s),
        }
    }
}

impl From<&str> for ValidationMode {
    fn from(s: &str) -> Self {
        ValidationMode::from(s.to_string())
    }
}

impl From<ValidationMode> for String {
    fn from(mode: ValidationMode) -> String {
        match mode {
            ValidationMode::Unknown(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl ValidationMode {
    /// The wire name of this mode.
    pub fn as_str(&self) -> &str {
        match self {
            ValidationMode::Exact => "exact",
            ValidationMode::Contains => "contains",
            ValidationMode::Regex => "regex",
            ValidationMode::Ignore => "ignore",
            ValidationMode::Unknown(s) => s,
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate the JSON Schema for definition files.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(DefinitionFile)
}
