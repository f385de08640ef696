//! Definition file loader.
//!
//! Loads and checks definition files from disk. A file that can't be
//! trusted is refused here so the runner only ever sees well-formed cases.

use crate::error::LoadError;
use crate::schema::{DefinitionFile, TestCaseDefinition};
use std::path::Path;

/// Definition file used when none is given on the command line.
pub const DEFAULT_DEFINITIONS_FILE: &str = "test_cases.json";

/// A loaded, checked definition file.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    /// File-level default timeout in seconds.
    pub timeout: Option<f64>,
    /// The test cases in declaration order.
    pub cases: Vec<TestCaseDefinition>,
}

/// Load test case definitions from a file path.
///
/// The parser is picked by extension: `.json`, `.yaml`/`.yml` or `.toml`.
pub fn load_definitions(path: &Path) -> Result<Definitions, LoadError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let file: DefinitionFile = match ext {
        "json" => serde_json::from_str(&contents)?,
        "yaml" | "yml" => serde_yaml::from_str(&contents)?,
        "toml" => toml::from_str(&contents)?,
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };

    let definitions = check_definitions(file)?;
    tracing::debug!(
        path = %path.display(),
        cases = definitions.cases.len(),
        "loaded definitions"
    );
    Ok(definitions)
}

/// Check a parsed document for problems the runner must not see.
pub fn check_definitions(file: DefinitionFile) -> Result<Definitions, LoadError> {
    let cases = file.test_cases.ok_or(LoadError::MissingTestCases)?;

    if let Some(value) = file.timeout {
        check_timeout("file", value)?;
    }
    for (i, case) in cases.iter().enumerate() {
        if let Some(value) = case.timeout {
            check_timeout(
                &format!("test case {} ({})", i + 1, case.display_name()),
                value,
            )?;
        }
    }

    Ok(Definitions {
        timeout: file.timeout,
        cases,
    })
}

fn check_timeout(location: &str, value: f64) -> Result<(), LoadError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LoadError::InvalidTimeout {
            location: location.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_valid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"{ "test_cases": [ { "name": "hi", "command": "echo hi", "expected_stdout": "hi" } ] }"#,
        )
        .unwrap();

        let defs = load_definitions(&path).unwrap();
        assert_eq!(defs.cases.len(), 1);
        assert_eq!(defs.cases[0].display_name(), "hi");
        assert_eq!(defs.timeout, None);
    }

    #[test]
    fn load_valid_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.yml");
        std::fs::write(
            &path,
            r#"
timeout: 10
test_cases:
  - command: "true"
  - command: "false"
    expected_returncode: 1
"#,
        )
        .unwrap();

        let defs = load_definitions(&path).unwrap();
        assert_eq!(defs.cases.len(), 2);
        assert_eq!(defs.timeout, Some(10.0));
        assert_eq!(defs.cases[1].expected_returncode, 1);
    }

    #[test]
    fn load_valid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.toml");
        std::fs::write(
            &path,
            r#"
[[test_cases]]
name = "echo"
command = "echo hi"
expected_stdout = "hi"
"#,
        )
        .unwrap();

        let defs = load_definitions(&path).unwrap();
        assert_eq!(defs.cases.len(), 1);
        assert_eq!(defs.cases[0].command(), Some("echo hi"));
    }

    #[test]
    fn missing_file() {
        let dir = tempdir().unwrap();
        let result = load_definitions(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = load_definitions(&path);
        assert!(matches!(result, Err(LoadError::Json(_))));
    }

    #[test]
    fn test_cases_must_be_a_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "test_cases": "echo hi" }"#).unwrap();

        let result = load_definitions(&path);
        assert!(matches!(result, Err(LoadError::Json(_))));
    }

    #[test]
    fn missing_test_cases_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{ "cases": [] }"#).unwrap();

        let result = load_definitions(&path);
        assert!(matches!(result, Err(LoadError::MissingTestCases)));
    }

    #[test]
    fn empty_test_cases_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{ "test_cases": [] }"#).unwrap();

        let defs = load_definitions(&path).unwrap();
        assert!(defs.cases.is_empty());
    }

    #[test]
    fn unsupported_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.txt");
        std::fs::write(&path, "").unwrap();

        let result = load_definitions(&path);
        assert!(matches!(result, Err(LoadError::UnsupportedFormat(_))));
    }

    #[test]
    fn rejects_non_positive_timeout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"{ "test_cases": [ { "name": "slow", "command": "true", "timeout": 0 } ] }"#,
        )
        .unwrap();

        let err = load_definitions(&path).unwrap_err();
        assert!(matches!(err, LoadError::InvalidTimeout { .. }));
        assert!(err.to_string().contains("slow"));
    }

    #[test]
    fn rejects_negative_file_timeout() {
        let file = DefinitionFile {
            timeout: Some(-1.0),
            test_cases: Some(vec![]),
        };
        let result = check_definitions(file);
        assert!(matches!(result, Err(LoadError::InvalidTimeout { .. })));
    }

    #[test]
    fn case_without_command_still_loads() {
        let file = DefinitionFile {
            timeout: None,
            test_cases: Some(vec![TestCaseDefinition {
                name: Some("bad".to_string()),
                ..TestCaseDefinition::default()
            }]),
        };
        let defs = check_definitions(file).unwrap();
        assert_eq!(defs.cases.len(), 1);
        assert_eq!(defs.cases[0].command(), None);
    }
}
