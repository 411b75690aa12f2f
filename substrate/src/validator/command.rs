//! Runs an arbitrary configured command against the edited path.

use super::{ValidationIssue, ValidationResult, ValidationSeverity, Validator};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

const STDERR_PREVIEW_BYTES: usize = 500;

/// A shell command template with a `{path}` placeholder, e.g.
/// `"mypy {path}"`. Exit codes in `success_codes` (default `[0]`) count as
/// success.
pub struct CommandValidator {
    name: String,
    command_template: String,
    success_codes: Vec<i32>,
}

impl CommandValidator {
    pub fn new(name: impl Into<String>, command_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_template: command_template.into(),
            success_codes: vec![0],
        }
    }

    pub fn with_success_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_codes = codes;
        self
    }

    fn render(&self, path: &Path) -> String {
        self.command_template.replace("{path}", &path.display().to_string())
    }
}

#[async_trait]
impl Validator for CommandValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, path: &Path) -> ValidationResult {
        let rendered = self.render(path);

        let output = match Command::new("sh").arg("-c").arg(&rendered).output().await {
            Ok(output) => output,
            Err(e) => {
                return ValidationResult::failure(vec![ValidationIssue::new(
                    format!("failed to spawn `{rendered}`: {e}"),
                    ValidationSeverity::Error,
                )
                .with_source(self.name.clone())])
            }
        };

        let code = output.status.code().unwrap_or(-1);
        if self.success_codes.contains(&code) {
            return ValidationResult::success();
        }

        let truncated = &output.stderr[..output.stderr.len().min(STDERR_PREVIEW_BYTES)];
        let preview = String::from_utf8_lossy(truncated).into_owned();

        let mut issues = vec![ValidationIssue::new(
            format!("`{rendered}` exited with code {code}"),
            ValidationSeverity::Error,
        )
        .with_source(self.name.clone())];

        if !preview.trim().is_empty() {
            issues.push(
                ValidationIssue::new(preview, ValidationSeverity::Error).with_source(self.name.clone()),
            );
        }

        ValidationResult::failure(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn success_code_yields_success() {
        let validator = CommandValidator::new("true", "true {path}");
        let result = validator.validate(Path::new("ignored")).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn nonzero_exit_reports_issue_with_stderr_preview() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.py");
        fs::write(&file, "x").unwrap();
        let validator = CommandValidator::new("false_cmd", "echo boom 1>&2; false");
        let result = validator.validate(&file).await;
        assert!(!result.success);
        assert_eq!(result.issues.len(), 2);
        assert!(result.issues[1].message.contains("boom"));
    }

    #[tokio::test]
    async fn custom_success_codes_are_honored() {
        let validator = CommandValidator::new("exit2", "exit 2").with_success_codes(vec![0, 2]);
        let result = validator.validate(Path::new("ignored")).await;
        assert!(result.success);
    }
}
