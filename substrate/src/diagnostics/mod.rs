//! Diagnostic model: a uniform representation of issues extracted from
//! heterogeneous tool output, and a registry of per-tool-family parsers.
//!
//! Parsing never raises. Unparseable input yields an empty [`DiagnosticSet`];
//! diagnostics with unknown severity default to [`Severity::Info`].

mod native;
mod rustc;
mod ruff;
mod web;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Severity of one diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

/// A source location. When present, `line`/`column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: Option<usize>, column: Option<usize>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// One issue produced by a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub code: Option<String>,
    pub message: String,
    pub source: Option<String>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            location: None,
            code: None,
            message: message.into(),
            source: None,
            suggestion: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// A bundle of diagnostics from one parse, with a source label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticSet {
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSet {
    pub fn new(source: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            source: source.into(),
            diagnostics,
        }
    }

    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            diagnostics: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// One tool-family's diagnostic extraction: reads stdout+stderr concatenated
/// and emits zero or more diagnostics. Must never panic on malformed input.
pub trait DiagnosticParser: Send + Sync {
    /// Registry name, e.g. `"cargo"`, `"rustc"`, `"tsc"`.
    fn name(&self) -> &'static str;

    /// Cheap content sniff used by auto-detection; should be conservative
    /// (false negatives are fine, false positives cause misclassification).
    fn sniff(&self, raw_output: &str) -> bool;

    /// Parse the blob into diagnostics. Never panics; returns an empty vec
    /// on anything it cannot make sense of.
    fn parse(&self, raw_output: &str) -> Vec<Diagnostic>;
}

/// Open registry of parser name -> parser. Built-ins are registered once;
/// callers may extend it with [`ParserRegistry::register`].
pub struct ParserRegistry {
    parsers: HashMap<&'static str, Box<dyn DiagnosticParser>>,
    /// Sniff order: first match wins during auto-detection.
    sniff_order: Vec<&'static str>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            parsers: HashMap::new(),
            sniff_order: Vec::new(),
        };
        registry.register(Box::new(rustc::CargoParser));
        registry.register(Box::new(rustc::RustcParser));
        registry.register(Box::new(web::TscParser));
        registry.register(Box::new(web::EslintParser));
        registry.register(Box::new(ruff::RuffParser));
        registry.register(Box::new(native::GccParser));
        registry.register(Box::new(native::ClangParser));
        registry
    }

    /// Register (or replace) a parser under its own name.
    pub fn register(&mut self, parser: Box<dyn DiagnosticParser>) {
        let name = parser.name();
        if !self.parsers.contains_key(name) {
            self.sniff_order.push(name);
        }
        self.parsers.insert(name, parser);
    }

    pub fn get(&self, name: &str) -> Option<&dyn DiagnosticParser> {
        self.parsers.get(name).map(|p| p.as_ref())
    }

    /// Auto-detect the parser by content sniffing, in registration order.
    fn detect(&self, raw_output: &str) -> Option<&dyn DiagnosticParser> {
        self.sniff_order
            .iter()
            .filter_map(|name| self.parsers.get(name))
            .map(|p| p.as_ref())
            .find(|p| p.sniff(raw_output))
    }

    /// Parse diagnostics, selecting a parser by name or auto-detecting.
    pub fn parse_diagnostics(&self, raw_output: &str, parser_name: Option<&str>) -> DiagnosticSet {
        let parser = match parser_name {
            Some(name) => self.get(name),
            None => self.detect(raw_output),
        };

        match parser {
            Some(parser) => DiagnosticSet::new(parser.name(), parser.parse(raw_output)),
            None => DiagnosticSet::empty("unknown"),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_REGISTRY: OnceLock<ParserRegistry> = OnceLock::new();

/// Parse diagnostics using the process-wide default registry. Equivalent to
/// `ParserRegistry::new().parse_diagnostics(...)` but avoids rebuilding the
/// registry (and recompiling its regexes) on every call.
pub fn parse_diagnostics(raw_output: &str, parser_name: Option<&str>) -> DiagnosticSet {
    DEFAULT_REGISTRY
        .get_or_init(ParserRegistry::new)
        .parse_diagnostics(raw_output, parser_name)
}

/// Strip ANSI escape sequences. Diagnostic parsers must discard these before
/// attempting line-oriented matching.
pub(crate) fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_input_yields_empty_set() {
        let set = parse_diagnostics("not a recognizable diagnostic blob at all", None);
        assert_eq!(set.diagnostics.len(), 0);
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        let input = "\u{1b}[31merror\u{1b}[0m: oops";
        assert_eq!(strip_ansi(input), "error: oops");
    }

    #[test]
    fn default_severity_is_info() {
        assert_eq!(Severity::default(), Severity::Info);
    }

    #[test]
    fn explicit_parser_name_overrides_sniffing() {
        let registry = ParserRegistry::new();
        let set = registry.parse_diagnostics("garbage", Some("rustc"));
        assert_eq!(set.source, "rustc");
        assert!(set.diagnostics.is_empty());
    }
}
