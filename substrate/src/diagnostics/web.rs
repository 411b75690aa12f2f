//! `tsc` and `eslint` diagnostic parsers.

use super::{Diagnostic, DiagnosticParser, Location, Severity};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

// tsc: "src/index.ts(12,5): error TS2345: Argument of type ... not assignable."
static TSC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.+?)\((\d+),(\d+)\):\s*(error|warning)\s*(TS\d+)?:?\s*(.+)$").unwrap()
});

pub struct TscParser;

impl DiagnosticParser for TscParser {
    fn name(&self) -> &'static str {
        "tsc"
    }

    fn sniff(&self, raw_output: &str) -> bool {
        TSC_LINE.is_match(raw_output)
    }

    fn parse(&self, raw_output: &str) -> Vec<Diagnostic> {
        TSC_LINE
            .captures_iter(raw_output)
            .map(|caps| {
                let file = caps[1].to_string();
                let line = caps[2].parse().ok();
                let column = caps[3].parse().ok();
                let severity = match &caps[4] {
                    "warning" => Severity::Warning,
                    _ => Severity::Error,
                };
                let code = caps.get(5).map(|m| m.as_str().to_string());
                let message = caps[6].trim().to_string();

                let mut d = Diagnostic::new(severity, message)
                    .with_source("tsc")
                    .with_location(Location::new(file, line, column));
                if let Some(code) = code {
                    d = d.with_code(code);
                }
                d
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct EslintPosition {
    line: Option<usize>,
    column: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EslintMessage {
    #[serde(rename = "ruleId")]
    rule_id: Option<String>,
    severity: u8,
    message: String,
    #[serde(flatten)]
    position: EslintPosition,
}

#[derive(Debug, Deserialize)]
struct EslintFileResult {
    #[serde(rename = "filePath")]
    file_path: String,
    messages: Vec<EslintMessage>,
}

pub struct EslintParser;

impl DiagnosticParser for EslintParser {
    fn name(&self) -> &'static str {
        "eslint"
    }

    fn sniff(&self, raw_output: &str) -> bool {
        let trimmed = raw_output.trim_start();
        trimmed.starts_with('[') && trimmed.contains("\"filePath\"")
    }

    fn parse(&self, raw_output: &str) -> Vec<Diagnostic> {
        let results: Vec<EslintFileResult> = match serde_json::from_str(raw_output) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };

        results
            .into_iter()
            .flat_map(|file| {
                file.messages.into_iter().map(move |m| {
                    // eslint severity: 1 = warning, 2 = error
                    let severity = match m.severity {
                        2 => Severity::Error,
                        1 => Severity::Warning,
                        _ => Severity::Info,
                    };
                    let mut d = Diagnostic::new(severity, m.message)
                        .with_source("eslint")
                        .with_location(Location::new(
                            file.file_path.clone(),
                            m.position.line,
                            m.position.column,
                        ));
                    if let Some(rule_id) = m.rule_id {
                        d = d.with_code(rule_id);
                    }
                    d
                })
            })
            .collect()
    }
}
