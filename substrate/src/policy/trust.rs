//! Declarative trust rules: `<operation>:<glob-pattern>` -> {allow, deny,
//! confirm}, loaded from a YAML rules file at the project root.
//!
//! Glob patterns are simple shell globs (`*`, `?`, `**`) against the
//! resolved target path or a command-line substring; full regular
//! expressions are deliberately out of scope.

use super::{Policy, PolicyDecision, PolicyResult, ToolCallContext};
use crate::error::{PolicyError, SubstrateResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDecision {
    Allow,
    Deny,
    Confirm,
}

#[derive(Debug, Clone)]
pub struct TrustRuleDecision {
    pub decision: TrustDecision,
    pub reason: Option<String>,
    pub matched_rule: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TrustRule {
    operation: String,
    pattern: String,
    decision: TrustDecision,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TrustRulesFile {
    #[serde(default)]
    rules: Vec<TrustRule>,
}

/// Project-root-scoped trust-rules store. Rules are evaluated in
/// declaration order; the first matching rule wins. A target that matches
/// no rule defaults to [`TrustDecision::Confirm`] (surfaced to the policy
/// engine as `WARN`) rather than silently allowing unconfigured operations.
pub struct TrustManager {
    rules: Vec<TrustRule>,
}

impl TrustManager {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn from_yaml(yaml: &str) -> SubstrateResult<Self> {
        let parsed: TrustRulesFile = serde_yaml::from_str(yaml).map_err(|e| PolicyError::TrustConfigLoad {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { rules: parsed.rules })
    }

    pub fn load(path: impl AsRef<Path>) -> SubstrateResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| PolicyError::TrustConfigLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let parsed: TrustRulesFile =
            serde_yaml::from_str(&contents).map_err(|e| PolicyError::TrustConfigLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { rules: parsed.rules })
    }

    pub fn check(&self, operation: &str, target: &str) -> TrustRuleDecision {
        for rule in &self.rules {
            if rule.operation == operation && glob_match(&rule.pattern, target) {
                return TrustRuleDecision {
                    decision: rule.decision,
                    reason: rule.reason.clone(),
                    matched_rule: Some(format!("{}:{}", rule.operation, rule.pattern)),
                };
            }
        }
        TrustRuleDecision {
            decision: TrustDecision::Confirm,
            reason: None,
            matched_rule: None,
        }
    }
}

/// Shell-glob match: `?` matches one non-`/` character, `*` matches any
/// run of non-`/` characters, `**` matches across `/` boundaries.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn recurse(pattern: &[u8], text: &[u8]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(b'*'), _) if pattern.get(1) == Some(&b'*') => {
                let mut rest = &pattern[2..];
                if rest.first() == Some(&b'/') {
                    rest = &rest[1..];
                }
                recurse(rest, text) || (!text.is_empty() && recurse(pattern, &text[1..]))
            }
            (Some(b'*'), _) => {
                let rest = &pattern[1..];
                recurse(rest, text)
                    || matches!(text.first(), Some(c) if *c != b'/') && recurse(pattern, &text[1..])
            }
            (Some(b'?'), Some(c)) if *c != b'/' => recurse(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p == t => recurse(&pattern[1..], &text[1..]),
            _ => false,
        }
    }
    recurse(pattern.as_bytes(), text.as_bytes())
}

/// Bridges [`TrustManager`] into the policy engine.
pub struct TrustPolicy {
    manager: TrustManager,
}

impl TrustPolicy {
    pub fn new(manager: TrustManager) -> Self {
        Self { manager }
    }

    fn infer_operation(context: &ToolCallContext) -> String {
        if let Some(action) = &context.action {
            return action.clone();
        }
        let name = context.tool_name.to_lowercase();
        if name.contains("read") || name.contains("grep") {
            "read".to_string()
        } else if name.contains("write") || name.contains("edit") || name.contains("patch") {
            "write".to_string()
        } else if name.contains("delete") {
            "delete".to_string()
        } else if name.contains("bash") || name.contains("exec") {
            "bash".to_string()
        } else {
            name
        }
    }
}

#[async_trait]
impl Policy for TrustPolicy {
    fn name(&self) -> &str {
        "trust"
    }

    fn priority(&self) -> i32 {
        5
    }

    async fn evaluate(&self, context: &ToolCallContext) -> PolicyResult {
        let operation = Self::infer_operation(context);
        let target = context.resolved_target();
        let decision = self.manager.check(&operation, &target);

        let policy_decision = match decision.decision {
            TrustDecision::Allow => PolicyDecision::Allow,
            TrustDecision::Deny => PolicyDecision::Deny,
            TrustDecision::Confirm => PolicyDecision::Warn,
        };
        let reason = decision
            .reason
            .unwrap_or_else(|| format!("trust rule for {operation}:{target}"));

        let mut result = PolicyResult::new(policy_decision, self.name(), reason);
        if let Some(matched) = decision.matched_rule {
            result = result.with_metadata("matched_rule", matched);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_does_not_cross_slash() {
        assert!(glob_match("src/*.rs", "src/lib.rs"));
        assert!(!glob_match("src/*.rs", "src/nested/lib.rs"));
    }

    #[test]
    fn glob_double_star_crosses_slash() {
        assert!(glob_match("src/**", "src/nested/deep/file.rs"));
        assert!(glob_match("src/**", "src/file.rs"));
    }

    #[test]
    fn glob_question_mark_matches_one_char() {
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
    }

    #[tokio::test]
    async fn no_matching_rule_defaults_to_confirm() {
        let policy = TrustPolicy::new(TrustManager::empty());
        let ctx = ToolCallContext::new("write_file").with_target("src/lib.rs");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Warn);
    }

    #[tokio::test]
    async fn deny_rule_blocks_write() {
        let yaml = "rules:\n  - operation: write\n    pattern: \"secrets/**\"\n    decision: deny\n    reason: \"secrets are read-only\"\n";
        let manager = TrustManager::from_yaml(yaml).unwrap();
        let policy = TrustPolicy::new(manager);
        let ctx = ToolCallContext::new("edit_file").with_target("secrets/token.txt");
        let result = policy.evaluate(&ctx).await;
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert_eq!(result.reason, "secrets are read-only");
    }

    #[tokio::test]
    async fn confirm_rule_maps_to_warn() {
        let yaml = "rules:\n  - operation: bash\n    pattern: \"*\"\n    decision: confirm\n";
        let manager = TrustManager::from_yaml(yaml).unwrap();
        let policy = TrustPolicy::new(manager);
        let ctx = ToolCallContext::new("run_bash").with_parameter("command", "rm -rf build");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Warn);
    }
}
