//! Runs the project's test command and turns failures into validation
//! issues.
//!
//! Pass/fail accounting is intentionally crude: it counts `" passed"` /
//! `" failed"` substrings in the combined output rather than parsing a
//! specific test framework's summary line, so the same validator works
//! across `pytest`, `go test`, `cargo test`, and friends without per-tool
//! configuration. Individual failing tests are recovered from lines that
//! start with `FAILED`, which `pytest` and several other runners share.

use super::{ValidationIssue, ValidationResult, ValidationSeverity, Validator};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

pub struct TestRunnerValidator {
    name: String,
    command: String,
}

impl TestRunnerValidator {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    fn count_occurrences(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    fn failed_test_names(output: &str) -> Vec<String> {
        output
            .lines()
            .filter(|line| line.trim_start().starts_with("FAILED"))
            .map(|line| line.trim().to_string())
            .collect()
    }
}

#[async_trait]
impl Validator for TestRunnerValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, path: &Path) -> ValidationResult {
        let output = match Command::new("sh").arg("-c").arg(&self.command).current_dir(path_or_cwd(path)).output().await {
            Ok(output) => output,
            Err(e) => {
                return ValidationResult::failure(vec![ValidationIssue::new(
                    format!("failed to spawn `{}`: {e}", self.command),
                    ValidationSeverity::Error,
                )
                .with_source(self.name.clone())])
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{stdout}\n{stderr}");

        let passed = Self::count_occurrences(&combined, " passed");
        let failed = Self::count_occurrences(&combined, " failed");
        let exit_code = output.status.code();

        let success = exit_code == Some(0) && failed == 0;

        let mut issues = Vec::new();
        if !success {
            for name in Self::failed_test_names(&combined) {
                issues.push(ValidationIssue::new(name, ValidationSeverity::Error).with_source(self.name.clone()));
            }
            if issues.is_empty() {
                issues.push(
                    ValidationIssue::new(
                        format!("`{}` exited with code {:?}", self.command, exit_code),
                        ValidationSeverity::Error,
                    )
                    .with_source(self.name.clone()),
                );
            }
        }

        ValidationResult {
            success,
            issues,
            metadata: std::collections::HashMap::from([
                ("exit_code".to_string(), serde_json::json!(exit_code)),
                ("passed".to_string(), serde_json::json!(passed)),
                ("failed".to_string(), serde_json::json!(failed)),
            ]),
        }
    }
}

fn path_or_cwd(path: &Path) -> &Path {
    if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn passing_command_is_success() {
        let validator = TestRunnerValidator::new("tests", "echo '3 passed in 0.01s'");
        let dir = tempdir().unwrap();
        let result = validator.validate(dir.path()).await;
        assert!(result.success);
        assert_eq!(result.metadata.get("passed").unwrap(), &serde_json::json!(3));
    }

    #[tokio::test]
    async fn failing_tests_are_extracted_by_name() {
        let validator = TestRunnerValidator::new(
            "tests",
            "printf 'FAILED tests/test_foo.py::test_bar\\n1 failed, 2 passed in 0.02s\\n'; exit 1",
        );
        let dir = tempdir().unwrap();
        let result = validator.validate(dir.path()).await;
        assert!(!result.success);
        assert_eq!(result.issues.len(), 1);
        assert!(result.issues[0].message.contains("test_bar"));
        assert_eq!(result.metadata.get("failed").unwrap(), &serde_json::json!(1));
    }

    #[tokio::test]
    async fn nonzero_exit_without_failed_lines_still_reports_an_issue() {
        let validator = TestRunnerValidator::new("tests", "exit 1");
        let dir = tempdir().unwrap();
        let result = validator.validate(dir.path()).await;
        assert!(!result.success);
        assert_eq!(result.issues.len(), 1);
    }
}
