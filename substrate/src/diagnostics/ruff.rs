//! `ruff check --output-format=json` parser.
//!
//! ruff emits a JSON array of `{code, message, filename, location:{row,column}}`
//! objects (one per violation, no wrapping per-file grouping).

use super::{Diagnostic, DiagnosticParser, Location, Severity};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RuffLocation {
    row: Option<usize>,
    column: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RuffViolation {
    code: Option<String>,
    message: String,
    filename: String,
    location: RuffLocation,
}

pub struct RuffParser;

impl DiagnosticParser for RuffParser {
    fn name(&self) -> &'static str {
        "ruff"
    }

    fn sniff(&self, raw_output: &str) -> bool {
        let trimmed = raw_output.trim_start();
        trimmed.starts_with('[') && trimmed.contains("\"location\"") && trimmed.contains("\"code\"")
    }

    fn parse(&self, raw_output: &str) -> Vec<Diagnostic> {
        let violations: Vec<RuffViolation> = match serde_json::from_str(raw_output) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        violations
            .into_iter()
            .map(|v| {
                let mut d = Diagnostic::new(Severity::Error, v.message)
                    .with_source("ruff")
                    .with_location(Location::new(
                        v.filename,
                        v.location.row,
                        v.location.column,
                    ));
                if let Some(code) = v.code {
                    d = d.with_code(code);
                }
                d
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ruff_parser_extracts_code_and_location() {
        let output = r#"[{"code":"F401","message":"`os` imported but unused","filename":"src/main.py","location":{"row":1,"column":1}}]"#;
        let parser = RuffParser;
        assert!(parser.sniff(output));
        let diags = parser.parse(output);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code.as_deref(), Some("F401"));
        let loc = diags[0].location.as_ref().unwrap();
        assert_eq!(loc.file, "src/main.py");
        assert_eq!(loc.line, Some(1));
    }

    #[test]
    fn ruff_parser_tolerates_malformed_json() {
        assert!(RuffParser.parse("not json").is_empty());
    }

    #[test]
    fn ruff_parser_does_not_sniff_eslint_output() {
        let eslint_like = r#"[{"filePath":"/repo/a.js","messages":[]}]"#;
        assert!(!RuffParser.sniff(eslint_like));
    }
}
