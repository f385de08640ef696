//! Result reporting.
//!
//! Console progress while cases run, plus JSON, JUnit XML and HTML
//! renderings of a finished [`RunSummary`].

use crate::error::ReportError;
use crate::runner::{RunObserver, RunSummary, TestResult, TestStatus};
use crate::schema::{TestCaseDefinition, ValidationMode};
use crate::validator::Validation;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

/// Directory reports are written to when none is given.
pub const DEFAULT_REPORT_DIR: &str = "test_reports";

/// Prints human-readable progress to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress {
    /// Also print actual output of passing cases.
    pub verbose: bool,
}

impl RunObserver for ConsoleProgress {
    fn case_started(&self, index: usize, total: usize, case: &TestCaseDefinition) {
        let mut out = format!(
            "Running test {}/{total}: {}...",
            index + 1,
            case.display_name()
        );
        if let Some(command) = case.command() {
            let _ = write!(out, "\n  Command: {command}");
        }
        println!("{out}");
    }

    fn case_finished(&self, index: usize, total: usize, result: &TestResult) {
        println!("{}", format_case_verdict(index, total, result, self.verbose));
    }
}

/// Verdict block for one finished case.
pub fn format_case_verdict(index: usize, total: usize, result: &TestResult, verbose: bool) -> String {
    let mut out = String::new();
    match result.status {
        TestStatus::Error => {
            let reason = result.status_reason.as_deref().unwrap_or("unknown error");
            let _ = writeln!(out, "  [{}/{total}] ERROR: {reason} Skipping.", index + 1);
        }
        TestStatus::Pass => {
            let _ = writeln!(
                out,
                "  [{}/{total}] Status: PASS ({:.2?})",
                index + 1,
                result.duration
            );
            if verbose {
                if let Some(stdout) = result.actual_stdout.as_deref().filter(|s| !s.is_empty()) {
                    let _ = writeln!(out, "    stdout: {stdout:?}");
                }
                if let Some(stderr) = result.actual_stderr.as_deref().filter(|s| !s.is_empty()) {
                    let _ = writeln!(out, "    stderr: {stderr:?}");
                }
            }
        }
        TestStatus::Fail => {
            let _ = writeln!(
                out,
                "  [{}/{total}] Status: FAIL ({:.2?})",
                index + 1,
                result.duration
            );
            for failure in result.failures() {
                let _ = writeln!(out, "    - {}", failure.replace('\n', "\n    "));
            }
        }
    }
    out
}

/// Final summary block printed after a run.
pub fn format_summary(summary: &RunSummary, report_path: Option<&Path>) -> String {
    let mut out = String::from("--- Test Execution Summary ---\n");
    let _ = writeln!(out, "Total tests run: {}", summary.total());
    let _ = writeln!(out, "Passed: {}", summary.passed_count);
    let _ = writeln!(out, "Failed: {}", summary.failed_count);
    if let Some(path) = report_path {
        let _ = writeln!(out, "Report available at: {}", path.display());
    }
    out
}

/// Serialize a summary as pretty-printed JSON.
pub fn format_json(summary: &RunSummary) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Format results as JUnit XML.
pub fn format_junit_xml(summary: &RunSummary, suite_name: &str) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let errors = summary
        .results
        .iter()
        .filter(|r| r.status == TestStatus::Error)
        .count();
    let failures = summary.failed_count - errors;
    let total_time: f64 = summary.results.iter().map(|r| r.duration.as_secs_f64()).sum();

    let _ = writeln!(
        xml,
        "<testsuites tests=\"{}\" failures=\"{failures}\" errors=\"{errors}\" time=\"{total_time:.3}\">",
        summary.total()
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{failures}\" errors=\"{errors}\" time=\"{total_time:.3}\">",
        escape_xml(suite_name),
        summary.total()
    );

    for result in &summary.results {
        let _ = writeln!(
            xml,
            "    <testcase name=\"{}\" time=\"{:.3}\">",
            escape_xml(&result.name),
            result.duration.as_secs_f64()
        );

        let failures = result.failures();
        match result.status {
            TestStatus::Pass => {}
            TestStatus::Error | TestStatus::Fail => {
                let tag = if result.status == TestStatus::Error {
                    "error"
                } else {
                    "failure"
                };
                let message = failures
                    .first()
                    .map(|s| s.lines().next().unwrap_or(s.as_str()))
                    .unwrap_or("Test failed");
                let _ = writeln!(xml, "      <{tag} message=\"{}\">", escape_xml(message));
                for failure in &failures {
                    let _ = writeln!(xml, "{}", escape_xml(failure));
                }
                let _ = writeln!(xml, "      </{tag}>");
            }
        }

        if let Some(stdout) = result.actual_stdout.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(xml, "      <system-out>{}</system-out>", escape_xml(stdout));
        }
        if let Some(stderr) = result.actual_stderr.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(xml, "      <system-err>{}</system-err>", escape_xml(stderr));
        }

        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
    xml.push_str("</testsuites>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Write an HTML report into `report_dir`, creating it if needed.
///
/// Returns the path of the new file, `test_report_<YYYYMMDD_HHMMSS>.html`.
/// An existing report is never overwritten: a second report in the same
/// second gets a `_1`, `_2`, ... suffix.
pub fn write_html_report(
    summary: &RunSummary,
    report_dir: &Path,
    generated_at: DateTime<Local>,
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(report_dir).map_err(|source| ReportError::Io {
        path: report_dir.to_path_buf(),
        source,
    })?;

    let timestamp = generated_at.format("%Y%m%d_%H%M%S").to_string();
    let (path, mut file) = create_report_file(report_dir, &timestamp)?;
    file.write_all(render_html(summary, &timestamp).as_bytes())
        .map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;

    let path = std::path::absolute(&path).unwrap_or(path);
    tracing::info!(path = %path.display(), "wrote HTML report");
    Ok(path)
}

fn create_report_file(report_dir: &Path, timestamp: &str) -> Result<(PathBuf, File), ReportError> {
    let mut suffix = 0u32;
    loop {
        let name = match suffix {
            0 => format!("test_report_{timestamp}.html"),
            n => format!("test_report_{timestamp}_{n}.html"),
        };
        let path = report_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(source) => return Err(ReportError::Io { path, source }),
        }
    }
}

const HTML_STYLE: &str = r#"
    body { font-family: Arial, sans-serif; margin: 20px; }
    h1 { color: #333; }
    h2 { color: #555; }
    table { width: 100%; border-collapse: collapse; margin-bottom: 20px; }
    th, td { border: 1px solid #ddd; padding: 8px; text-align: left; vertical-align: top; }
    th { background-color: #f2f2f2; }
    .pass { background-color: #d4edda; color: #155724; }
    .fail { background-color: #f8d7da; color: #721c24; }
    .error { background-color: #fff3cd; color: #856404; }
    .details-box { background-color: #f0f0f0; border: 1px solid #ccc; padding: 10px; margin-top: 5px; font-family: monospace; white-space: pre-wrap; word-wrap: break-word; }
    .summary { margin-bottom: 20px; padding: 10px; border: 1px solid #ccc; background-color: #e9ecef; }
    .summary p { margin: 5px 0; }
"#;

/// Render a summary as a standalone HTML document.
pub fn render_html(summary: &RunSummary, timestamp: &str) -> String {
    let timestamp = escape_xml(timestamp);
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Test Execution Report - {timestamp}</title>
  <style>{HTML_STYLE}</style>
</head>
<body>
  <h1>Test Execution Report</h1>
  <div class="summary">
    <h2>Summary</h2>
    <p><strong>Total Tests:</strong> {total}</p>
    <p><strong>Passed:</strong> <span style="color: green;">{passed}</span></p>
    <p><strong>Failed:</strong> <span style="color: red;">{failed}</span></p>
    <p><strong>Report Generated:</strong> {timestamp}</p>
  </div>

  <h2>Test Case Details</h2>
  <table>
    <thead>
      <tr><th>#</th><th>Test Name</th><th>Status</th><th>Command</th><th>Details</th></tr>
    </thead>
    <tbody>
"#,
        total = summary.total(),
        passed = summary.passed_count,
        failed = summary.failed_count,
    );

    for (i, result) in summary.results.iter().enumerate() {
        let class = match result.status {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Error => "error",
        };
        let _ = write!(
            html,
            r#"      <tr class="{class}">
        <td>{}</td>
        <td>{}</td>
        <td><strong>{}</strong></td>
        <td><div class="details-box">{}</div></td>
        <td>"#,
            i + 1,
            escape_xml(&result.name),
            result.status,
            escape_xml(result.command.as_deref().unwrap_or("N/A")),
        );

        if let Some(reason) = &result.status_reason {
            let _ = write!(html, "<p><strong>Reason:</strong> {}</p>", escape_xml(reason));
        }

        // Definition errors never ran, so there is nothing to show.
        if result.status != TestStatus::Error {
            let _ = write!(
                html,
                "<p><strong>Return Code:</strong> {}</p>",
                detail_or_na(result.returncode_validation.as_ref())
            );
            write_channel_html(
                &mut html,
                "Stdout",
                result.stdout_validation.as_ref(),
                result.stdout_mode.as_ref(),
                result.expected_stdout.as_deref(),
                result.actual_stdout.as_deref(),
            );
            write_channel_html(
                &mut html,
                "Stderr",
                result.stderr_validation.as_ref(),
                result.stderr_mode.as_ref(),
                result.expected_stderr.as_deref(),
                result.actual_stderr.as_deref(),
            );
        }
        html.push_str("</td>\n      </tr>\n");
    }

    html.push_str("    </tbody>\n  </table>\n</body>\n</html>\n");
    html
}

fn write_channel_html(
    html: &mut String,
    label: &str,
    validation: Option<&Validation>,
    mode: Option<&ValidationMode>,
    expected: Option<&str>,
    actual: Option<&str>,
) {
    let _ = write!(
        html,
        "<p><strong>{label} Validation:</strong> {}</p>",
        detail_or_na(validation)
    );
    let mode = mode.cloned().unwrap_or_default();
    if let Some(expected) = expected
        && mode != ValidationMode::Ignore
    {
        let upper = label.to_uppercase();
        let _ = write!(
            html,
            r#"<div class="details-box"><strong>Expected {upper} ({}):</strong>
{}
<hr><strong>Actual {upper}:</strong>
{}</div>"#,
            escape_xml(mode.as_str()),
            escape_xml(expected),
            escape_xml(actual.unwrap_or("N/A")),
        );
    }
}

fn detail_or_na(validation: Option<&Validation>) -> String {
    validation
        .map(|v| escape_xml(&v.detail()))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::ShellExecutor;
    use crate::runner::{NoProgress, RunOptions, run};
    use tempfile::tempdir;

    fn sample_summary() -> RunSummary {
        let mut pass = TestCaseDefinition::new("greets <you>", "echo hi");
        pass.expected_stdout = Some("hi".to_string());
        let mut fail = TestCaseDefinition::new("mismatch", "echo hello");
        fail.expected_stdout = Some("world & co".to_string());
        fail.stdout_mode = ValidationMode::Contains;
        let error = TestCaseDefinition {
            name: Some("no command".to_string()),
            ..TestCaseDefinition::default()
        };
        run(
            &[pass, fail, error],
            &ShellExecutor::default(),
            &RunOptions::default(),
            &NoProgress,
        )
    }

    #[test]
    fn summary_lists_counts() {
        let summary = sample_summary();
        let text = format_summary(&summary, Some(Path::new("/tmp/r.html")));
        assert!(text.contains("Total tests run: 3"));
        assert!(text.contains("Passed: 1"));
        assert!(text.contains("Failed: 2"));
        assert!(text.contains("Report available at: /tmp/r.html"));
    }

    #[test]
    fn verdict_shows_mismatch_details() {
        let summary = sample_summary();
        let text = format_case_verdict(1, 3, &summary.results[1], false);
        assert!(text.contains("[2/3] Status: FAIL"));
        assert!(text.contains("- Stdout MISMATCH: Contains 'world & co': false"));
        assert!(text.contains("Expected (contains): 'world & co'"));

        let text = format_case_verdict(2, 3, &summary.results[2], false);
        assert!(text.contains("ERROR: Test case definition missing 'command'."));
    }

    #[test]
    fn json_has_counts_and_statuses() {
        let summary = sample_summary();
        let value: serde_json::Value = serde_json::from_str(&format_json(&summary).unwrap()).unwrap();
        assert_eq!(value["passed_count"], 1);
        assert_eq!(value["failed_count"], 2);
        assert_eq!(value["results"][0]["status"], "PASS");
        assert_eq!(value["results"][1]["status"], "FAIL");
        assert_eq!(value["results"][2]["status"], "ERROR");
        assert_eq!(value["results"][1]["stdout_mode"], "contains");
        assert_eq!(value["results"][1]["stdout_validation"]["matched"], false);
    }

    #[test]
    fn junit_separates_failures_and_errors() {
        let summary = sample_summary();
        let xml = format_junit_xml(&summary, "cases.json");
        assert!(xml.contains("tests=\"3\" failures=\"1\" errors=\"1\""));
        assert!(xml.contains("<testcase name=\"greets &lt;you&gt;\""));
        assert!(xml.contains("<failure message=\"Stdout MISMATCH: Contains &apos;world &amp; co&apos;: false\">"));
        assert!(xml.contains("<error message=\"Test case definition missing &apos;command&apos;.\">"));
    }

    #[test]
    fn html_escapes_and_marks_rows() {
        let summary = sample_summary();
        let html = render_html(&summary, "20260101_120000");
        assert!(html.contains("<title>Test Execution Report - 20260101_120000</title>"));
        assert!(html.contains("<tr class=\"pass\">"));
        assert!(html.contains("<tr class=\"fail\">"));
        assert!(html.contains("<tr class=\"error\">"));
        assert!(html.contains("greets &lt;you&gt;"));
        assert!(!html.contains("greets <you>"));
        assert!(html.contains("Expected STDOUT (contains):"));
        assert!(html.contains("<div class=\"details-box\">N/A</div>"));
    }

    #[test]
    fn html_report_written_with_timestamp_name() {
        let dir = tempdir().unwrap();
        let report_dir = dir.path().join("nested/reports");
        let generated_at = Local::now();

        let path = write_html_report(&sample_summary(), &report_dir, generated_at).unwrap();

        let expected_name = format!(
            "test_report_{}.html",
            generated_at.format("%Y%m%d_%H%M%S")
        );
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected_name);
        assert!(path.is_absolute());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn html_report_in_same_second_gets_suffix() {
        let dir = tempdir().unwrap();
        let summary = sample_summary();
        let generated_at = Local::now();
        let stamp = generated_at.format("%Y%m%d_%H%M%S");

        let first = write_html_report(&summary, dir.path(), generated_at).unwrap();
        let second = write_html_report(&summary, dir.path(), generated_at).unwrap();
        let third = write_html_report(&summary, dir.path(), generated_at).unwrap();

        assert_eq!(first.file_name().unwrap().to_str().unwrap(), format!("test_report_{stamp}.html"));
        assert_eq!(second.file_name().unwrap().to_str().unwrap(), format!("test_report_{stamp}_1.html"));
        assert_eq!(third.file_name().unwrap().to_str().unwrap(), format!("test_report_{stamp}_2.html"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
