//! Anti-stall / anti-oscillation policy.
//!
//! Fed externally via [`VelocityPolicy::record_error_count`] (the policy
//! itself never observes tool output directly). Detection runs at
//! record-time so `evaluate` is a cheap flag check.

use super::{Policy, PolicyDecision, PolicyResult, ToolCallContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_STALL_THRESHOLD: usize = 3;
const DEFAULT_OSCILLATION_THRESHOLD: usize = 2;
const DEFAULT_WINDOW_SECS: u64 = 300;

struct VelocityState {
    observations: VecDeque<(DateTime<Utc>, i64)>,
    oscillation_cycles: usize,
    blocked: Option<String>,
}

pub struct VelocityPolicy {
    state: Mutex<VelocityState>,
    stall_threshold: usize,
    oscillation_threshold: usize,
    window: Duration,
}

impl VelocityPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VelocityState {
                observations: VecDeque::new(),
                oscillation_cycles: 0,
                blocked: None,
            }),
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            oscillation_threshold: DEFAULT_OSCILLATION_THRESHOLD,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }

    pub fn with_stall_threshold(mut self, threshold: usize) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Feed the latest error count; may transition the policy into a
    /// blocked state. Stays blocked until [`Self::reset`] is called.
    pub fn record_error_count(&self, count: i64) {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        state.observations.push_back((now, count));

        let window = self.window;
        while let Some((ts, _)) = state.observations.front() {
            if now.signed_duration_since(*ts).num_seconds() as u64 > window.as_secs() {
                state.observations.pop_front();
            } else {
                break;
            }
        }

        let obs: Vec<i64> = state.observations.iter().map(|(_, c)| *c).collect();

        if obs.len() >= self.stall_threshold + 1 {
            let recent = &obs[obs.len() - self.stall_threshold..];
            let preceding = obs[obs.len() - self.stall_threshold - 1];
            if recent.iter().all(|&v| v == preceding) {
                state.blocked = Some(format!(
                    "Stalled: error count unchanged at {preceding} for {} observations",
                    self.stall_threshold
                ));
                return;
            }
        }

        if obs.len() >= 4 {
            let last4 = &obs[obs.len() - 4..];
            let deltas: Vec<i64> = last4.windows(2).map(|w| w[1] - w[0]).collect();
            if deltas.iter().all(|&d| d != 0) {
                let signs: Vec<i32> = deltas.iter().map(|&d| if d > 0 { 1 } else { -1 }).collect();
                let alternating = signs[0] != signs[1] && signs[1] != signs[2];
                if alternating {
                    state.oscillation_cycles += 1;
                    if state.oscillation_cycles >= self.oscillation_threshold {
                        state.blocked = Some(format!(
                            "Oscillating: {} sign-alternating cycles detected",
                            state.oscillation_cycles
                        ));
                    }
                }
            }
        }
    }

    /// Clear the blocked state and observation window.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.observations.clear();
        state.oscillation_cycles = 0;
        state.blocked = None;
    }
}

impl Default for VelocityPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Policy for VelocityPolicy {
    fn name(&self) -> &str {
        "velocity"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn evaluate(&self, _context: &ToolCallContext) -> PolicyResult {
        let state = self.state.lock().unwrap();
        match &state.blocked {
            Some(reason) => PolicyResult::new(PolicyDecision::Deny, self.name(), reason.clone()),
            None => PolicyResult::allow(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stall_blocks_until_reset() {
        let policy = VelocityPolicy::new();
        for _ in 0..4 {
            policy.record_error_count(5);
        }
        let ctx = ToolCallContext::new("edit");
        let result = policy.evaluate(&ctx).await;
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert!(result.reason.contains("Stalled"));

        policy.reset();
        let result = policy.evaluate(&ctx).await;
        assert_eq!(result.decision, PolicyDecision::Allow);
    }

    #[tokio::test]
    async fn decreasing_errors_do_not_stall() {
        let policy = VelocityPolicy::new();
        for count in [10, 7, 4, 1] {
            policy.record_error_count(count);
        }
        let ctx = ToolCallContext::new("edit");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Allow);
    }

    #[tokio::test]
    async fn oscillation_after_two_cycles_blocks() {
        let policy = VelocityPolicy::new().with_stall_threshold(3);
        // +5,-5,+5,-5,+5,-5,+5 sequence of deltas: cycles of +-+ / -+-
        for count in [0, 5, 0, 5, 0, 5, 0] {
            policy.record_error_count(count);
        }
        let ctx = ToolCallContext::new("edit");
        assert_eq!(policy.evaluate(&ctx).await.decision, PolicyDecision::Deny);
    }
}
