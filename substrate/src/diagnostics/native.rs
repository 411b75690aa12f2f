//! `gcc` and `clang` diagnostic parsers.
//!
//! Both tools share the classic `file:line:column: severity: message` shape;
//! clang additionally prints a caret-underline line which is discarded as
//! noise per the parser contract.

use super::{Diagnostic, DiagnosticParser, Location, Severity};
use regex::Regex;
use std::sync::LazyLock;

static GCC_CLANG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([^\s:][^:]*):(\d+):(\d+):\s*(fatal error|error|warning|note):\s*(.+)$")
        .unwrap()
});

fn severity_from_label(label: &str) -> Severity {
    match label {
        "fatal error" | "error" => Severity::Error,
        "warning" => Severity::Warning,
        _ => Severity::Info,
    }
}

fn parse_lines(raw_output: &str, source: &'static str) -> Vec<Diagnostic> {
    GCC_CLANG_LINE
        .captures_iter(raw_output)
        .map(|caps| {
            let file = caps[1].to_string();
            let line = caps[2].parse().ok();
            let column = caps[3].parse().ok();
            let severity = severity_from_label(&caps[4]);
            let message = caps[5].trim().to_string();
            Diagnostic::new(severity, message)
                .with_source(source)
                .with_location(Location::new(file, line, column))
        })
        .collect()
}

pub struct GccParser;

impl DiagnosticParser for GccParser {
    fn name(&self) -> &'static str {
        "gcc"
    }

    fn sniff(&self, raw_output: &str) -> bool {
        GCC_CLANG_LINE.is_match(raw_output)
    }

    fn parse(&self, raw_output: &str) -> Vec<Diagnostic> {
        parse_lines(raw_output, "gcc")
    }
}

pub struct ClangParser;

impl DiagnosticParser for ClangParser {
    fn name(&self) -> &'static str {
        "clang"
    }

    fn sniff(&self, raw_output: &str) -> bool {
        GCC_CLANG_LINE.is_match(raw_output)
    }

    fn parse(&self, raw_output: &str) -> Vec<Diagnostic> {
        parse_lines(raw_output, "clang")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcc_parser_extracts_error() {
        let output = "main.c:10:5: error: expected ';' before 'return'\n   10 |     int x\n      |          ^\n";
        let diags = GccParser.parse(output);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].location.as_ref().unwrap().line, Some(10));
    }

    #[test]
    fn clang_parser_extracts_warning() {
        let output = "src/foo.cpp:3:1: warning: unused variable 'y' [-Wunused-variable]";
        let diags = ClangParser.parse(output);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("unused variable"));
    }
}
