//! Global and per-target call-rate limiting.
//!
//! Two counters: a global call-times list pruned to the last minute, and a
//! per-target call count map. Callers record calls via
//! [`RateLimitPolicy::record_call`] *after* the tool runs, so `evaluate`
//! always sees the state as of the previous call.

use super::{Policy, PolicyDecision, PolicyResult, ToolCallContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const DEFAULT_MAX_CALLS_PER_MINUTE: usize = 60;
const DEFAULT_MAX_CALLS_PER_TARGET: usize = 10;

struct RateLimitState {
    global_calls: VecDeque<DateTime<Utc>>,
    per_target: HashMap<String, usize>,
}

pub struct RateLimitPolicy {
    state: Mutex<RateLimitState>,
    max_calls_per_minute: usize,
    max_calls_per_target: usize,
}

impl RateLimitPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RateLimitState {
                global_calls: VecDeque::new(),
                per_target: HashMap::new(),
            }),
            max_calls_per_minute: DEFAULT_MAX_CALLS_PER_MINUTE,
            max_calls_per_target: DEFAULT_MAX_CALLS_PER_TARGET,
        }
    }

    pub fn with_limits(mut self, max_calls_per_minute: usize, max_calls_per_target: usize) -> Self {
        self.max_calls_per_minute = max_calls_per_minute;
        self.max_calls_per_target = max_calls_per_target;
        self
    }

    pub fn record_call(&self, target: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.global_calls.push_back(Utc::now());
        if let Some(target) = target {
            *state.per_target.entry(target.to_string()).or_insert(0) += 1;
        }
    }

    fn prune(state: &mut RateLimitState) {
        let now = Utc::now();
        while let Some(front) = state.global_calls.front() {
            if now.signed_duration_since(*front).num_seconds() >= 60 {
                state.global_calls.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Policy for RateLimitPolicy {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn evaluate(&self, context: &ToolCallContext) -> PolicyResult {
        let mut state = self.state.lock().unwrap();
        Self::prune(&mut state);

        if state.global_calls.len() > self.max_calls_per_minute {
            return PolicyResult::new(
                PolicyDecision::Deny,
                self.name(),
                format!(
                    "global rate limit exceeded: {} calls in the last minute",
                    state.global_calls.len()
                ),
            );
        }

        let target = context.resolved_target();
        let count = state.per_target.get(&target).copied().unwrap_or(0);
        if count >= self.max_calls_per_target {
            return PolicyResult::new(
                PolicyDecision::Warn,
                self.name(),
                format!("target '{target}' called {count} times; consider an alternative approach"),
            );
        }

        PolicyResult::allow(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn boundary_is_strictly_greater_than() {
        let policy = RateLimitPolicy::new().with_limits(5, 100);
        for _ in 0..5 {
            policy.record_call(None);
        }
        let ctx = ToolCallContext::new("edit");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Allow);

        policy.record_call(None);
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Deny);
    }

    #[tokio::test]
    async fn per_target_limit_warns_not_denies() {
        let policy = RateLimitPolicy::new().with_limits(1000, 3);
        let ctx = ToolCallContext::new("edit").with_target("foo.py");
        for _ in 0..3 {
            policy.record_call(Some("foo.py"));
        }
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Warn);
    }
}
