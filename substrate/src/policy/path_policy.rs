//! Blocks sensitive paths outright: VCS internals, secrets, credential
//! stores, dependency caches.

use super::{Policy, PolicyDecision, PolicyResult, ToolCallContext};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[
    ".git",
    ".env",
    "__pycache__",
    "node_modules",
    ".ssh",
    ".aws",
    "credentials",
    "secrets",
];

pub struct PathPolicy {
    blocked_patterns: Vec<String>,
    blocked_paths: Vec<PathBuf>,
}

impl PathPolicy {
    pub fn new() -> Self {
        Self {
            blocked_patterns: DEFAULT_BLOCKED_PATTERNS.iter().map(|s| s.to_string()).collect(),
            blocked_paths: Vec::new(),
        }
    }

    pub fn with_blocked_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blocked_paths.push(canonical_or_self(&path.into()));
        self
    }
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Policy for PathPolicy {
    fn name(&self) -> &str {
        "path"
    }

    async fn evaluate(&self, context: &ToolCallContext) -> PolicyResult {
        let target = context.resolved_target();
        let resolved = canonical_or_self(Path::new(&target));

        for blocked in &self.blocked_paths {
            if &resolved == blocked || resolved.starts_with(blocked) {
                return PolicyResult::new(
                    PolicyDecision::Deny,
                    self.name(),
                    format!("{target} is a blocked path"),
                );
            }
        }

        for pattern in &self.blocked_patterns {
            if target.contains(pattern.as_str()) {
                return PolicyResult::new(
                    PolicyDecision::Deny,
                    self.name(),
                    format!("{target} matches blocked pattern '{pattern}'"),
                );
            }
        }

        PolicyResult::allow(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_git_internals_by_substring() {
        let policy = PathPolicy::new();
        let ctx = ToolCallContext::new("edit").with_target("repo/.git/config");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Deny);
    }

    #[tokio::test]
    async fn blocks_explicit_path_and_descendants() {
        let policy = PathPolicy::new().with_blocked_path("/etc/passwd");
        let ctx = ToolCallContext::new("edit").with_target("/etc/passwd");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Deny);
    }

    #[tokio::test]
    async fn allows_ordinary_source_file() {
        let policy = PathPolicy::new();
        let ctx = ToolCallContext::new("edit").with_target("src/lib.rs");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Allow);
    }
}
