//! `cargo` and bare `rustc` diagnostic parsers.
//!
//! `cargo` output (via `--message-format=json`) is one JSON object per line,
//! tagged by `"reason"`; `rustc` invoked directly emits the human-readable
//! `error[E####]: message` + `--> file:line:col` rendering. Both are common
//! enough to warrant dedicated parsers rather than falling back to a generic
//! line-prefix scan.

use super::{strip_ansi, Diagnostic, DiagnosticParser, Location, Severity};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static RUSTC_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(error|warning)(?:\[(E\d+)\])?: (.+)$").unwrap()
});

static RUSTC_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-->\s*(.+):(\d+):(\d+)\s*$").unwrap());

fn severity_from_level(level: &str) -> Severity {
    match level {
        "error" => Severity::Error,
        "warning" => Severity::Warning,
        "note" | "help" => Severity::Info,
        _ => Severity::Info,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct Span {
    file_name: String,
    line_start: usize,
    column_start: usize,
    #[serde(default)]
    is_primary: bool,
    suggested_replacement: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompilerMessage {
    message: String,
    code: Option<ErrorCode>,
    level: String,
    #[serde(default)]
    spans: Vec<Span>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "reason")]
enum CargoMessage {
    #[serde(rename = "compiler-message")]
    CompilerMessage { message: CompilerMessage },
    #[serde(other)]
    Other,
}

pub struct CargoParser;

impl DiagnosticParser for CargoParser {
    fn name(&self) -> &'static str {
        "cargo"
    }

    fn sniff(&self, raw_output: &str) -> bool {
        raw_output
            .lines()
            .any(|line| line.trim_start().starts_with(r#"{"reason""#))
    }

    fn parse(&self, raw_output: &str) -> Vec<Diagnostic> {
        raw_output
            .lines()
            .filter_map(|line| serde_json::from_str::<CargoMessage>(line).ok())
            .filter_map(|msg| match msg {
                CargoMessage::CompilerMessage { message } => Some(message),
                CargoMessage::Other => None,
            })
            .map(|diag| {
                let primary = diag.spans.iter().find(|s| s.is_primary);
                let mut d = Diagnostic::new(severity_from_level(&diag.level), diag.message)
                    .with_source("cargo");
                if let Some(code) = &diag.code {
                    d = d.with_code(code.code.clone());
                }
                if let Some(span) = primary {
                    d = d.with_location(Location::new(
                        span.file_name.clone(),
                        Some(span.line_start),
                        Some(span.column_start),
                    ));
                    if let Some(replacement) = &span.suggested_replacement {
                        d = d.with_suggestion(replacement.clone());
                    }
                }
                d
            })
            .collect()
    }
}

pub struct RustcParser;

impl DiagnosticParser for RustcParser {
    fn name(&self) -> &'static str {
        "rustc"
    }

    fn sniff(&self, raw_output: &str) -> bool {
        RUSTC_HEADER.is_match(raw_output)
    }

    fn parse(&self, raw_output: &str) -> Vec<Diagnostic> {
        let cleaned = strip_ansi(raw_output);
        let mut diagnostics = Vec::new();

        // Walk header matches, pairing each with the next `-->` line that
        // follows it (rustc always emits the location line immediately
        // after the header, separated only by blank/caret decoration).
        let headers: Vec<_> = RUSTC_HEADER.captures_iter(&cleaned).collect();
        let locations: Vec<_> = RUSTC_LOCATION.captures_iter(&cleaned).collect();

        for (idx, caps) in headers.iter().enumerate() {
            let level = &caps[1];
            let code = caps.get(2).map(|m| m.as_str().to_string());
            let message = caps[3].to_string();

            let mut d = Diagnostic::new(severity_from_level(level), message).with_source("rustc");
            if let Some(code) = code {
                d = d.with_code(code);
            }
            if let Some(loc) = locations.get(idx) {
                let line = loc[2].parse().ok();
                let column = loc[3].parse().ok();
                d = d.with_location(Location::new(loc[1].to_string(), line, column));
            }
            diagnostics.push(d);
        }

        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cargo_parser_extracts_error_code_and_location() {
        let line = r#"{"reason":"compiler-message","message":{"message":"mismatched types","code":{"code":"E0308"},"level":"error","spans":[{"file_name":"src/main.rs","line_start":5,"column_start":10,"is_primary":true,"suggested_replacement":null}]}}"#;
        let parser = CargoParser;
        assert!(parser.sniff(line));
        let diags = parser.parse(line);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code.as_deref(), Some("E0308"));
        assert_eq!(diags[0].severity, Severity::Error);
        let loc = diags[0].location.as_ref().unwrap();
        assert_eq!(loc.file, "src/main.rs");
        assert_eq!(loc.line, Some(5));
    }

    #[test]
    fn cargo_parser_ignores_non_compiler_messages() {
        let line = r#"{"reason":"build-finished","success":true}"#;
        let parser = CargoParser;
        assert!(parser.parse(line).is_empty());
    }

    #[test]
    fn rustc_parser_extracts_header_and_location() {
        let output = "error[E0425]: cannot find value `x` in this scope\n --> src/lib.rs:12:5\n  |\n12 |     x\n   |     ^ not found in this scope\n";
        let parser = RustcParser;
        assert!(parser.sniff(output));
        let diags = parser.parse(output);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code.as_deref(), Some("E0425"));
        let loc = diags[0].location.as_ref().unwrap();
        assert_eq!(loc.file, "src/lib.rs");
        assert_eq!(loc.line, Some(12));
        assert_eq!(loc.column, Some(5));
    }

    #[test]
    fn rustc_parser_handles_multiple_diagnostics() {
        let output = "warning: unused variable: `y`\n --> src/lib.rs:3:9\n\nerror: mismatched types\n --> src/lib.rs:7:1\n";
        let diags = RustcParser.parse(output);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[1].severity, Severity::Error);
    }

    #[test]
    fn unparseable_blob_yields_no_diagnostics() {
        assert!(CargoParser.parse("not json at all").is_empty());
        assert!(!RustcParser.sniff("totally unrelated text"));
    }
}
