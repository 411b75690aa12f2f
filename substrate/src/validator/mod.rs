//! Validator chain: pluggable checks that run after each edit, producing a
//! uniform structured-issue stream.

mod command;
mod diagnostic;
mod syntax;
mod test_runner;

pub use command::CommandValidator;
pub use diagnostic::DiagnosticValidator;
pub use syntax::SyntaxValidator;
pub use test_runner::TestRunnerValidator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    pub severity: ValidationSeverity,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub code: Option<String>,
    pub source: Option<String>,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>, severity: ValidationSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
            file: None,
            line: None,
            column: None,
            code: None,
            source: None,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: Option<usize>, column: Option<usize>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}: {}", self.message),
            (Some(file), None) => write!(f, "{file}: {}", self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            success: true,
            issues: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn failure(issues: Vec<ValidationIssue>) -> Self {
        Self {
            success: false,
            issues,
            metadata: HashMap::new(),
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == ValidationSeverity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Compact one-line-per-issue summary, for logging.
    pub fn to_compact(&self) -> String {
        self.issues.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("\n")
    }
}

/// One check run after an edit. `validate` takes the repo-relative path of
/// the edited file (or directory, for project-wide checks like test runs).
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    async fn validate(&self, path: &Path) -> ValidationResult;
}

/// Ordered chain of validators, run sequentially.
pub struct ValidatorChain {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self { validators: Vec::new() }
    }

    pub fn add(mut self, validator: Box<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Run each validator in order, accumulating issues and per-validator
    /// metadata. If `stop_on_error`, stop at the first unsuccessful
    /// validator. Final `success` is the logical AND of every run
    /// validator's `success`.
    pub async fn validate(&self, path: &Path, stop_on_error: bool) -> ValidationResult {
        let mut combined = ValidationResult::success();

        for validator in &self.validators {
            let result = validator.validate(path).await;
            combined.success &= result.success;
            combined.issues.extend(result.issues);
            combined
                .metadata
                .insert(validator.name().to_string(), serde_json::to_value(&result.metadata).unwrap_or_default());

            if stop_on_error && !result.success {
                break;
            }
        }

        combined
    }
}

impl Default for ValidatorChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFail;
    #[async_trait]
    impl Validator for AlwaysFail {
        fn name(&self) -> &str {
            "always_fail"
        }
        async fn validate(&self, _path: &Path) -> ValidationResult {
            ValidationResult::failure(vec![ValidationIssue::new("boom", ValidationSeverity::Error)])
        }
    }

    struct AlwaysPass;
    #[async_trait]
    impl Validator for AlwaysPass {
        fn name(&self) -> &str {
            "always_pass"
        }
        async fn validate(&self, _path: &Path) -> ValidationResult {
            ValidationResult::success()
        }
    }

    #[tokio::test]
    async fn stop_on_error_halts_chain() {
        let chain = ValidatorChain::new().add(Box::new(AlwaysFail)).add(Box::new(AlwaysPass));
        let result = chain.validate(Path::new("."), true).await;
        assert!(!result.success);
        assert_eq!(result.issues.len(), 1);
        assert!(!result.metadata.contains_key("always_pass"));
    }

    #[tokio::test]
    async fn without_stop_on_error_runs_every_validator() {
        let chain = ValidatorChain::new().add(Box::new(AlwaysFail)).add(Box::new(AlwaysPass));
        let result = chain.validate(Path::new("."), false).await;
        assert!(!result.success);
        assert!(result.metadata.contains_key("always_pass"));
    }
}
