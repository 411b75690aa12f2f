//! In-process AST introspection: given a file and a 1-based line number,
//! resolve the innermost enclosing named symbol (function, method, class,
//! struct, ...).
//!
//! The engine speaks to this the same way it would speak to an external
//! `get_symbols_at_line` collaborator (see the crate's diagnostics/VCS
//! boundary notes): on any error it receives "no symbol", never a panic.

use std::path::Path;
use tree_sitter::{Language, Node, Parser, Point};

#[derive(Clone, Copy)]
enum Lang {
    Rust,
    Python,
    TypeScript,
    Go,
}

fn detect_language(file: &str) -> Option<Lang> {
    let ext = Path::new(file).extension()?.to_str()?;
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

/// Node kinds considered a "named symbol" for the purpose of hunk
/// attribution, per language.
fn is_symbol_kind(lang: Lang, kind: &str) -> bool {
    match lang {
        Lang::Rust => matches!(
            kind,
            "function_item" | "struct_item" | "enum_item" | "trait_item" | "impl_item" | "mod_item"
        ),
        Lang::Python => matches!(kind, "function_definition" | "class_definition"),
        Lang::TypeScript => matches!(
            kind,
            "function_declaration"
                | "class_declaration"
                | "method_definition"
                | "interface_declaration"
        ),
        Lang::Go => matches!(
            kind,
            "function_declaration" | "method_declaration" | "type_declaration"
        ),
    }
}

/// Best-effort name extraction. Falls back to the node's first line (e.g.
/// for `impl Foo for Bar` blocks, which have no `name` field) rather than
/// giving up entirely.
fn symbol_name(node: Node, source: &[u8]) -> Option<String> {
    if let Some(name_node) = node.child_by_field_name("name") {
        if let Ok(text) = name_node.utf8_text(source) {
            return Some(text.to_string());
        }
    }
    node.utf8_text(source)
        .ok()
        .and_then(|text| text.lines().next())
        .map(|line| line.trim_end_matches('{').trim().to_string())
}

/// Resolve the innermost enclosing symbol at `line` (1-based) in `file`,
/// interpreted relative to `repo_root`. Returns `None` on any failure to
/// read, parse, or resolve — never raises.
pub fn resolve_symbol_at_line(repo_root: &Path, file: &str, line: usize) -> Option<String> {
    if line == 0 {
        return None;
    }
    let lang = detect_language(file)?;
    let source = std::fs::read_to_string(repo_root.join(file)).ok()?;

    let mut parser = Parser::new();
    parser.set_language(&grammar(lang)).ok()?;
    let tree = parser.parse(&source, None)?;

    let point = Point {
        row: line - 1,
        column: 0,
    };
    let root = tree.root_node();
    let mut node = root.descendant_for_point_range(point, point)?;

    let source_bytes = source.as_bytes();
    loop {
        if is_symbol_kind(lang, node.kind()) {
            if let Some(name) = symbol_name(node, source_bytes) {
                return Some(name);
            }
        }
        node = node.parent()?;
    }
}
