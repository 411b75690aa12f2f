//! Runs a configured command with structured-output flags (e.g.
//! `ruff check --output-format=json`) and converts the parsed diagnostics
//! into validation issues.

use super::{ValidationIssue, ValidationResult, ValidationSeverity, Validator};
use crate::diagnostics::{self, Severity};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

fn map_severity(severity: Severity) -> ValidationSeverity {
    match severity {
        Severity::Error => ValidationSeverity::Error,
        Severity::Warning => ValidationSeverity::Warning,
        Severity::Info | Severity::Hint => ValidationSeverity::Info,
    }
}

pub struct DiagnosticValidator {
    name: String,
    command_template: String,
    parser_name: Option<String>,
}

impl DiagnosticValidator {
    pub fn new(name: impl Into<String>, command_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_template: command_template.into(),
            parser_name: None,
        }
    }

    /// Pin the diagnostic parser by registry name instead of auto-sniffing.
    pub fn with_parser(mut self, parser_name: impl Into<String>) -> Self {
        self.parser_name = Some(parser_name.into());
        self
    }

    fn render(&self, path: &Path) -> String {
        self.command_template.replace("{path}", &path.display().to_string())
    }
}

#[async_trait]
impl Validator for DiagnosticValidator {
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

        let combined = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let set = diagnostics::parse_diagnostics(&combined, self.parser_name.as_deref());

        let issues: Vec<ValidationIssue> = set
            .diagnostics
            .iter()
            .map(|d| {
                let mut issue = ValidationIssue::new(d.message.clone(), map_severity(d.severity))
                    .with_source(set.source.clone());
                if let Some(code) = &d.code {
                    issue.code = Some(code.clone());
                }
                if let Some(location) = &d.location {
                    issue = issue.with_location(location.file.clone(), location.line, location.column);
                }
                issue
            })
            .collect();

        let success = !issues.iter().any(|i| i.severity == ValidationSeverity::Error);
        ValidationResult {
            success,
            issues,
            metadata: std::collections::HashMap::from([(
                "exit_code".to_string(),
                serde_json::json!(output.status.code()),
            )]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_output_is_success() {
        let validator = DiagnosticValidator::new("ruff", "true");
        let result = validator.validate(Path::new("ignored")).await;
        assert!(result.success);
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn rustc_style_error_output_fails() {
        let validator = DiagnosticValidator::new("rustc", "printf 'error[E0308]: mismatched types\\n --> src/lib.rs:3:5\\n'").with_parser("rustc");
        let result = validator.validate(Path::new("ignored")).await;
        assert!(!result.success);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, ValidationSeverity::Error);
    }
}
