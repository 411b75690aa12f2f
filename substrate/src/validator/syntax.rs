//! Parses the edited file with the matching tree-sitter grammar and reports
//! every `ERROR`/`MISSING` node as a validation issue.

use super::{ValidationIssue, ValidationResult, ValidationSeverity, Validator};
use async_trait::async_trait;
use std::path::Path;
use tree_sitter::{Language, Node, Parser};

#[derive(Clone, Copy)]
enum Lang {
    Rust,
    Python,
    TypeScript,
    Go,
}

fn detect_language(file: &Path) -> Option<Lang> {
    let ext = file.extension()?.to_str()?;
    match ext {
        "rs" => Some(Lang::Rust),
        "py" => Some(Lang::Python),
        "ts" | "tsx" => Some(Lang::TypeScript),
        "go" => Some(Lang::Go),
        _ => None,
    }
}

fn grammar(lang: Lang) -> Language {
    match lang {
        Lang::Rust => tree_sitter_rust::LANGUAGE.into(),
        Lang::Python => tree_sitter_python::LANGUAGE.into(),
        Lang::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Lang::Go => tree_sitter_go::LANGUAGE.into(),
    }
}

fn collect_errors(node: Node, source: &[u8], file: &str, out: &mut Vec<ValidationIssue>) {
    if node.is_error() || node.is_missing() {
        let point = node.start_position();
        let kind = if node.is_missing() { "missing" } else { "unexpected" };
        let text = node.utf8_text(source).unwrap_or("").trim();
        let message = if text.is_empty() {
            format!("syntax error: {kind} token")
        } else {
            format!("syntax error: {kind} `{text}`")
        };
        out.push(
            ValidationIssue::new(message, ValidationSeverity::Error)
                .with_location(file, Some(point.row + 1), Some(point.column + 1))
                .with_source("syntax"),
        );
        return;
    }
    for child in node.children(&mut node.walk()) {
        collect_errors(child, source, file, out);
    }
}

/// Languages with no registered grammar are treated as out of scope: the
/// validator reports success rather than failing on files it cannot parse.
pub struct SyntaxValidator;

impl SyntaxValidator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Validator for SyntaxValidator {
    fn name(&self) -> &str {
        "syntax"
    }

    async fn validate(&self, path: &Path) -> ValidationResult {
        let Some(lang) = detect_language(path) else {
            return ValidationResult::success();
        };

        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) => {
                return ValidationResult::failure(vec![ValidationIssue::new(
                    format!("failed to read {}: {e}", path.display()),
                    ValidationSeverity::Error,
                )])
            }
        };

        let mut parser = Parser::new();
        if parser.set_language(&grammar(lang)).is_err() {
            return ValidationResult::success();
        }
        let Some(tree) = parser.parse(&source, None) else {
            return ValidationResult::failure(vec![ValidationIssue::new(
                format!("{} could not be parsed", path.display()),
                ValidationSeverity::Error,
            )]);
        };

        let file = path.display().to_string();
        let mut issues = Vec::new();
        collect_errors(tree.root_node(), source.as_bytes(), &file, &mut issues);

        if issues.is_empty() {
            ValidationResult::success()
        } else {
            ValidationResult::failure(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn valid_rust_file_passes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("lib.rs");
        fs::write(&file, "fn f() -> i32 { 1 }\n").unwrap();
        let result = SyntaxValidator::new().validate(&file).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn malformed_rust_file_reports_error_nodes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("lib.rs");
        fs::write(&file, "fn f( {\n    let x = ;\n}\n").unwrap();
        let result = SyntaxValidator::new().validate(&file).await;
        assert!(!result.success);
        assert!(!result.issues.is_empty());
    }

    #[tokio::test]
    async fn unsupported_extension_passes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "not code").unwrap();
        let result = SyntaxValidator::new().validate(&file).await;
        assert!(result.success);
    }
}
