//! Locks a file against non-repair modification, typically after
//! parse-error detection by a validator.

use super::{Policy, PolicyDecision, PolicyResult, ToolCallContext};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

pub struct QuarantinePolicy {
    quarantined: Mutex<HashMap<PathBuf, String>>,
    repair_tools: HashSet<String>,
}

impl QuarantinePolicy {
    pub fn new() -> Self {
        Self {
            quarantined: Mutex::new(HashMap::new()),
            repair_tools: ["repair", "fix_syntax", "raw_edit"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn quarantine(&self, path: impl AsRef<Path>, reason: impl Into<String>) {
        let canonical = canonical_or_self(path.as_ref());
        self.quarantined.lock().unwrap().insert(canonical, reason.into());
    }

    pub fn release(&self, path: impl AsRef<Path>) {
        let canonical = canonical_or_self(path.as_ref());
        self.quarantined.lock().unwrap().remove(&canonical);
    }

    pub fn is_quarantined(&self, path: impl AsRef<Path>) -> bool {
        let canonical = canonical_or_self(path.as_ref());
        self.quarantined.lock().unwrap().contains_key(&canonical)
    }
}

impl Default for QuarantinePolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Policy for QuarantinePolicy {
    fn name(&self) -> &str {
        "quarantine"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn evaluate(&self, context: &ToolCallContext) -> PolicyResult {
        let target = context.resolved_target();
        let canonical = canonical_or_self(Path::new(&target));
        let quarantined = self.quarantined.lock().unwrap();

        let Some(reason) = quarantined.get(&canonical) else {
            return PolicyResult::allow(self.name());
        };

        if self.repair_tools.contains(&context.tool_name) {
            PolicyResult::new(PolicyDecision::Warn, self.name(), reason.clone())
        } else {
            let mut allowed: Vec<&str> = self.repair_tools.iter().map(String::as_str).collect();
            allowed.sort_unstable();
            PolicyResult::new(
                PolicyDecision::Quarantine,
                self.name(),
                format!("{target} is quarantined ({reason}); use one of {allowed:?} to repair"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_repair_tool_is_quarantined() {
        let policy = QuarantinePolicy::new();
        policy.quarantine("foo.py", "SyntaxError line 5");

        let ctx = ToolCallContext::new("edit").with_target("foo.py");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Quarantine);

        let ctx = ToolCallContext::new("repair").with_target("foo.py");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Warn);

        let ctx = ToolCallContext::new("edit").with_target("bar.py");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Allow);
    }

    #[tokio::test]
    async fn release_clears_quarantine() {
        let policy = QuarantinePolicy::new();
        policy.quarantine("foo.py", "broken");
        policy.release("foo.py");
        let ctx = ToolCallContext::new("edit").with_target("foo.py");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Allow);
    }
}
