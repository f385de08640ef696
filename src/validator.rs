//! Output validation.
//!
//! Compares one actual output against one expectation under a
//! [`ValidationMode`]. Misconfiguration (bad regex, unknown mode) is a
//! non-match with an explanation, never an error.

use crate::schema::ValidationMode;
use serde::{Serialize, Serializer};
use std::fmt;

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub matched: bool,
    pub reason: Reason,
}

/// Why a check came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Mode was `ignore` or there was no expectation.
    Ignored,
    /// There was no actual output to check.
    MissingActual,
    /// Exact comparison.
    Exact,
    /// Substring search for `expected`.
    Contains { expected: String },
    /// Regex search for `pattern`.
    Regex { pattern: String },
    /// `pattern` failed to compile.
    InvalidRegex { pattern: String, error: String },
    /// The mode string was not recognized.
    UnknownMode(String),
    /// The channel had no expectation and was ignored.
    NotConfigured(Channel),
    /// Return code comparison.
    ReturnCode { expected: i32, actual: i32 },
}

/// An output stream of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stdout => f.write_str("Stdout"),
            Channel::Stderr => f.write_str("Stderr"),
        }
    }
}

impl Validation {
    fn new(matched: bool, reason: Reason) -> Self {
        Self { matched, reason }
    }

    /// A vacuous pass for a channel with nothing to check.
    pub fn not_configured(channel: Channel) -> Self {
        Self::new(true, Reason::NotConfigured(channel))
    }

    /// Compare an actual return code with the expected one.
    pub fn returncode(actual: i32, expected: i32) -> Self {
        Self::new(actual == expected, Reason::ReturnCode { expected, actual })
    }

    /// Human-readable detail, e.g. `Contains 'bar': true`.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matched = self.matched;
        match &self.reason {
            Reason::Ignored => f.write_str("Ignored"),
            Reason::MissingActual => f.write_str("Actual output was None"),
            Reason::Exact => write!(f, "Exact match: {matched}"),
            Reason::Contains { expected } => write!(f, "Contains '{expected}': {matched}"),
            Reason::Regex { pattern } => write!(f, "Regex '{pattern}' match: {matched}"),
            Reason::InvalidRegex { pattern, error } => {
                write!(f, "Invalid regex '{pattern}': {error}")
            }
            Reason::UnknownMode(mode) => write!(f, "Unknown validation mode: {mode}"),
            Reason::NotConfigured(channel) => {
                write!(f, "{channel} validation not configured or ignored.")
            }
            Reason::ReturnCode { actual, .. } if matched => {
                write!(f, "Return code matched: {actual}")
            }
            Reason::ReturnCode { expected, actual } => {
                write!(f, "Return code MISMATCH. Expected: {expected}, Got: {actual}")
            }
        }
    }
}

impl Serialize for Validation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Validation", 2)?;
        s.serialize_field("matched", &self.matched)?;
        s.serialize_field("detail", &self.detail())?;
        s.end()
    }
}

/// Check `actual` against `expected` under `mode`.
pub fn validate(actual: Option<&str>, expected: Option<&str>, mode: &ValidationMode) -> Validation {
    let expected = match expected {
        Some(expected) if *mode != ValidationMode::Ignore => expected,
        _ => return Validation::new(true, Reason::Ignored),
    };
    let Some(actual) = actual else {
        return Validation::new(false, Reason::MissingActual);
    };

    match mode {
        ValidationMode::Exact => Validation::new(actual == expected, Reason::Exact),
        ValidationMode::Contains => Validation::new(
            actual.contains(expected),
            Reason::Contains {
                expected: expected.to_string(),
            },
        ),
        ValidationMode::Regex => match regex::Regex::new(expected) {
            Ok(re) => Validation::new(
                re.is_match(actual),
                Reason::Regex {
                    pattern: expected.to_string(),
                },
            ),
            Err(e) => Validation::new(
                false,
                Reason::InvalidRegex {
                    pattern: expected.to_string(),
                    error: e.to_string(),
                },
            ),
        },
        ValidationMode::Unknown(other) => {
            Validation::new(false, Reason::UnknownMode(other.clone()))
        }
        ValidationMode::Ignore => Validation::new(true, Reason::Ignored),
    }
}
