//! Policy engine: prioritised, composable interceptors evaluated before
//! every tool invocation.
//!
//! Policies are stored in a priority-sorted list (higher priority first,
//! stable for ties in insertion order). Evaluation runs policies in order;
//! the first policy returning `Deny` or `Quarantine` short-circuits with
//! that result set as `blocking_result`. `Allow` and `Warn` continue.

mod path_policy;
mod quarantine;
mod rate_limit;
mod trust;
mod velocity;

pub use path_policy::PathPolicy;
pub use quarantine::QuarantinePolicy;
pub use rate_limit::RateLimitPolicy;
pub use trust::{TrustDecision, TrustManager, TrustPolicy, TrustRuleDecision};
pub use velocity::VelocityPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The decision a policy reaches for one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow,
    Deny,
    Warn,
    Quarantine,
}

/// What an agent is about to do, as seen by the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallContext {
    pub tool_name: String,
    pub target: Option<String>,
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallContext {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            target: None,
            action: None,
            parameters: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// The operation's target per the trust-policy resolution order:
    /// `context.target`, else the first present parameter among
    /// `{path, file, command, target, cmd}`, else `"*"`.
    pub fn resolved_target(&self) -> String {
        if let Some(t) = &self.target {
            return t.clone();
        }
        for key in ["path", "file", "command", "target", "cmd"] {
            if let Some(v) = self.parameters.get(key).and_then(|v| v.as_str()) {
                return v.to_string();
            }
        }
        "*".to_string()
    }
}

/// One policy's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResult {
    pub decision: PolicyDecision,
    pub policy_name: String,
    pub reason: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PolicyResult {
    pub fn new(decision: PolicyDecision, policy_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            decision,
            policy_name: policy_name.into(),
            reason: reason.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn allow(policy_name: impl Into<String>) -> Self {
        Self::new(PolicyDecision::Allow, policy_name, "")
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn allowed(&self) -> bool {
        matches!(self.decision, PolicyDecision::Allow | PolicyDecision::Warn)
    }
}

/// One policy evaluated against every tool call, in priority order.
#[async_trait]
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    async fn evaluate(&self, context: &ToolCallContext) -> PolicyResult;
}

/// Aggregate result of evaluating every policy against one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEngineResult {
    pub allowed: bool,
    pub results: Vec<PolicyResult>,
    pub blocking_result: Option<PolicyResult>,
}

impl PolicyEngineResult {
    pub fn warnings(&self) -> Vec<&PolicyResult> {
        self.results
            .iter()
            .filter(|r| r.decision == PolicyDecision::Warn)
            .collect()
    }
}

/// Priority-sorted, composable chain of policies.
pub struct PolicyEngine {
    policies: Vec<Box<dyn Policy>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self { policies: Vec::new() }
    }

    /// Insert in priority order (higher first); ties keep insertion order.
    pub fn add_policy(&mut self, policy: Box<dyn Policy>) {
        let priority = policy.priority();
        let insert_at = self
            .policies
            .iter()
            .position(|p| p.priority() < priority)
            .unwrap_or(self.policies.len());
        self.policies.insert(insert_at, policy);
    }

    pub fn remove_policy(&mut self, name: &str) {
        self.policies.retain(|p| p.name() != name);
    }

    pub fn get_policy(&self, name: &str) -> Option<&dyn Policy> {
        self.policies.iter().map(|p| p.as_ref()).find(|p| p.name() == name)
    }

    pub async fn evaluate(&self, context: &ToolCallContext) -> PolicyEngineResult {
        let mut results = Vec::with_capacity(self.policies.len());
        let mut blocking_result = None;

        for policy in &self.policies {
            let result = policy.evaluate(context).await;
            let blocks = matches!(result.decision, PolicyDecision::Deny | PolicyDecision::Quarantine);
            results.push(result);
            if blocks {
                blocking_result = results.last().cloned();
                break;
            }
        }

        PolicyEngineResult {
            allowed: blocking_result.is_none(),
            results,
            blocking_result,
        }
    }

    /// Convenience wrapper returning just the `allowed` boolean.
    pub async fn check(&self, context: &ToolCallContext) -> bool {
        self.evaluate(context).await.allowed
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Quarantine(20) -> Velocity(10) -> Trust(5) -> RateLimit(0) -> Path(0).
/// This ordering ensures quarantine is not defeated by a velocity reset,
/// that stalled agents cannot perform writes, and that declarative trust
/// rules gate before rate limits.
pub fn create_default_policy_engine(trust_manager: Option<TrustManager>) -> PolicyEngine {
    let mut engine = PolicyEngine::new();
    engine.add_policy(Box::new(QuarantinePolicy::new()));
    engine.add_policy(Box::new(VelocityPolicy::new()));
    if let Some(manager) = trust_manager {
        engine.add_policy(Box::new(TrustPolicy::new(manager)));
    }
    engine.add_policy(Box::new(RateLimitPolicy::new()));
    engine.add_policy(Box::new(PathPolicy::new()));
    engine
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysDeny;
    #[async_trait]
    impl Policy for AlwaysDeny {
        fn name(&self) -> &str {
            "always_deny"
        }
        fn priority(&self) -> i32 {
            100
        }
        async fn evaluate(&self, _context: &ToolCallContext) -> PolicyResult {
            PolicyResult::new(PolicyDecision::Deny, self.name(), "nope")
        }
    }

    struct AlwaysAllow;
    #[async_trait]
    impl Policy for AlwaysAllow {
        fn name(&self) -> &str {
            "always_allow"
        }
        async fn evaluate(&self, _context: &ToolCallContext) -> PolicyResult {
            PolicyResult::allow(self.name())
        }
    }

    #[tokio::test]
    async fn higher_priority_denial_short_circuits() {
        let mut engine = PolicyEngine::new();
        engine.add_policy(Box::new(AlwaysAllow));
        engine.add_policy(Box::new(AlwaysDeny));

        let ctx = ToolCallContext::new("edit").with_target("foo.py");
        let result = engine.evaluate(&ctx).await;
        assert!(!result.allowed);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.blocking_result.unwrap().policy_name, "always_deny");
    }

    #[tokio::test]
    async fn no_blocking_policy_allows() {
        let mut engine = PolicyEngine::new();
        engine.add_policy(Box::new(AlwaysAllow));
        let ctx = ToolCallContext::new("edit");
        assert!(engine.check(&ctx).await);
    }

    #[test]
    fn resolved_target_prefers_explicit_target() {
        let ctx = ToolCallContext::new("edit")
            .with_target("explicit.py")
            .with_parameter("path", "param.py");
        assert_eq!(ctx.resolved_target(), "explicit.py");
    }

    #[test]
    fn resolved_target_falls_back_to_parameters_then_wildcard() {
        let ctx = ToolCallContext::new("edit").with_parameter("file", "param.py");
        assert_eq!(ctx.resolved_target(), "param.py");
        assert_eq!(ToolCallContext::new("edit").resolved_target(), "*");
    }
}
