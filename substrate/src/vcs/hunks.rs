//! Unified-diff parsing and hunk-level revert.
//!
//! `parse_diff` turns a raw unified diff into [`DiffHunk`] records; this is
//! the engineering highlight of the shadow VCS engine because it is what
//! lets a caller revert a single broken hunk without discarding sibling
//! edits in the same commit.

use super::symbols::resolve_symbol_at_line;
use std::path::Path;

/// One contiguous block of changed lines in a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub file: String,
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    /// Lines removed by this hunk (the `-`-prefixed lines, prefix stripped).
    pub removed: Vec<String>,
    /// Lines added by this hunk (the `+`-prefixed lines, prefix stripped).
    pub added: Vec<String>,
    /// Innermost enclosing symbol name, populated by `map_hunks_to_symbols`.
    pub symbol: Option<String>,
}

/// `@@ -old_start,old_count +new_start,new_count @@` — counts default to 1
/// when omitted (single-line hunks).
fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let body = line.strip_prefix("@@ ")?;
    let end = body.find(" @@")?;
    let ranges = &body[..end];
    let mut parts = ranges.split(' ');
    let old_range = parts.next()?.strip_prefix('-')?;
    let new_range = parts.next()?.strip_prefix('+')?;

    let parse_range = |r: &str| -> (usize, usize) {
        match r.split_once(',') {
            Some((start, count)) => (
                start.parse().unwrap_or(0),
                count.parse().unwrap_or(1),
            ),
            None => (r.parse().unwrap_or(0), 1),
        }
    };

    let (old_start, old_count) = parse_range(old_range);
    let (new_start, new_count) = parse_range(new_range);
    Some((old_start, old_count, new_start, new_count))
}

/// Parse a unified diff into hunks. Tracks the "current file" from
/// `diff --git a/X b/Y` headers, using the new path `Y` as authoritative.
/// A blank line followed by `diff --git` is tolerated as a file-boundary
/// signal, since real VCS output sometimes inserts one.
pub fn parse_diff(diff: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut current_file: Option<String> = None;
    let mut active: Option<DiffHunk> = None;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(hunk) = active.take() {
                hunks.push(hunk);
            }
            current_file = parse_git_diff_header(rest);
            continue;
        }

        if line.starts_with("--- ") || line.starts_with("+++ ") {
            continue;
        }

        if line.starts_with("@@ ") {
            if let Some(hunk) = active.take() {
                hunks.push(hunk);
            }
            if let Some((old_start, old_count, new_start, new_count)) = parse_hunk_header(line) {
                active = Some(DiffHunk {
                    file: current_file.clone().unwrap_or_default(),
                    old_start,
                    old_count,
                    new_start,
                    new_count,
                    removed: Vec::new(),
                    added: Vec::new(),
                    symbol: None,
                });
            }
            continue;
        }

        if let Some(hunk) = active.as_mut() {
            if let Some(rest) = line.strip_prefix('-') {
                hunk.removed.push(rest.to_string());
            } else if let Some(rest) = line.strip_prefix('+') {
                hunk.added.push(rest.to_string());
            }
            // context lines (leading space) carry no payload for revert.
        }
    }

    if let Some(hunk) = active.take() {
        hunks.push(hunk);
    }

    hunks
}

/// `diff --git a/<path> b/<path>` → the `b/` path, authoritative per spec.
fn parse_git_diff_header(rest: &str) -> Option<String> {
    let b_idx = rest.find(" b/")?;
    Some(rest[b_idx + 3..].trim().to_string())
}

/// For each hunk, resolve the innermost enclosing symbol at `new_start` by
/// reading the target file and querying the AST-introspection layer. Never
/// raises: unresolvable files or symbols leave `symbol` as `None`.
pub fn map_hunks_to_symbols(hunks: Vec<DiffHunk>, repo_root: &Path) -> Vec<DiffHunk> {
    hunks
        .into_iter()
        .map(|mut hunk| {
            hunk.symbol = resolve_symbol_at_line(repo_root, &hunk.file, hunk.new_start);
            hunk
        })
        .collect()
}

/// Surgical per-file revert of a set of hunks against the file's *current*
/// on-disk text. Hunks must be sorted by `new_start` descending by the
/// caller (per file) before being passed in one file-group at a time;
/// see [`super::ShadowVcsEngine::rollback_hunks`] for the grouping pass.
pub fn revert_hunks_in_text(text: &str, hunks: &[DiffHunk]) -> String {
    // Preserve a trailing newline if the original had one; `lines()` drops it.
    let had_trailing_newline = text.ends_with('\n');
    let mut lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();

    for hunk in hunks {
        let start_idx = hunk.new_start.saturating_sub(1);
        let end_idx = (start_idx + hunk.new_count).min(lines.len());
        if start_idx > lines.len() {
            continue;
        }
        lines.splice(start_idx..end_idx, hunk.removed.iter().cloned());
    }

    let mut out = lines.join("\n");
    if had_trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_file_single_hunk() {
        let diff = "diff --git a/src/lib.rs b/src/lib.rs\n\
             --- a/src/lib.rs\n\
             +++ b/src/lib.rs\n\
             @@ -1,2 +1,2 @@\n\
             -let x = 1;\n\
             +let x = 2;\n\
             \x20context line\n";
        let hunks = parse_diff(diff);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].file, "src/lib.rs");
        assert_eq!(hunks[0].new_start, 1);
        assert_eq!(hunks[0].removed, vec!["let x = 1;"]);
        assert_eq!(hunks[0].added, vec!["let x = 2;"]);
    }

    #[test]
    fn tolerates_blank_line_before_next_file_header() {
        let diff = "diff --git a/a.py b/a.py\n\
             @@ -1,1 +1,1 @@\n\
             -x = 1\n\
             +x = 2\n\
             \n\
             diff --git a/b.py b/b.py\n\
             @@ -1,1 +1,1 @@\n\
             -y = 1\n\
             +y = 2\n";
        let hunks = parse_diff(diff);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].file, "a.py");
        assert_eq!(hunks[1].file, "b.py");
    }

    #[test]
    fn missing_counts_default_to_one() {
        let diff = "diff --git a/x.rs b/x.rs\n@@ -5 +5 @@\n-old\n+new\n";
        let hunks = parse_diff(diff);
        assert_eq!(hunks[0].old_count, 1);
        assert_eq!(hunks[0].new_count, 1);
    }

    #[test]
    fn empty_diff_yields_no_hunks() {
        assert!(parse_diff("").is_empty());
    }

    #[test]
    fn file_header_with_no_hunk_body_yields_no_hunks() {
        let diff = "diff --git a/empty.rs b/empty.rs\n";
        assert!(parse_diff(diff).is_empty());
    }

    #[test]
    fn revert_replaces_added_lines_with_removed_lines() {
        let text = "line1\nline2\nline3\n";
        let hunk = DiffHunk {
            file: "f.txt".to_string(),
            old_start: 2,
            old_count: 1,
            new_start: 2,
            new_count: 1,
            removed: vec!["OLD".to_string()],
            added: vec!["line2".to_string()],
            symbol: None,
        };
        let reverted = revert_hunks_in_text(text, &[hunk]);
        assert_eq!(reverted, "line1\nOLD\nline3\n");
    }

    #[test]
    fn parse_diff_is_stable_across_reparse() {
        let diff = "diff --git a/a.rs b/a.rs\n@@ -1,2 +1,2 @@\n-a\n-b\n+c\n+d\n";
        assert_eq!(parse_diff(diff), parse_diff(diff));
    }
}
