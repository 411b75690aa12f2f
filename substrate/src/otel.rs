//! OpenTelemetry-Compatible Span Helpers
//!
//! Structured `tracing` span builders for the substrate's four subsystems.
//! All spans use dot-notation field names compatible with OpenTelemetry
//! semantic conventions.
//!
//! # Span Hierarchy
//!
//! ```text
//! loop.run                  (root — one agent-loop execution)
//!   └─ loop.step             (one step execution, possibly retried)
//! vcs.commit                 (shadow VCS mutating operation)
//! policy.evaluate             (one ToolCallContext evaluation)
//! validator.run               (one validator's check)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use substrate::otel;
//!
//! let span = otel::validator_span("syntax", "src/lib.rs");
//! let guard = span.enter();
//! // ... run the validator ...
//! otel::record_validator_result(&span, true, 0, 12);
//! drop(guard);
//! ```

use serde::{Deserialize, Serialize};
use tracing::Span;

// ── Span Name Constants ──────────────────────────────────────────────

pub const SPAN_LOOP_RUN: &str = "loop.run";
pub const SPAN_LOOP_STEP: &str = "loop.step";
pub const SPAN_VCS_COMMIT: &str = "vcs.commit";
pub const SPAN_VCS_MERGE: &str = "vcs.merge";
pub const SPAN_POLICY_EVALUATE: &str = "policy.evaluate";
pub const SPAN_VALIDATOR_RUN: &str = "validator.run";

// ── Field Name Constants ─────────────────────────────────────────────

pub const FIELD_LOOP_NAME: &str = "loop.name";
pub const FIELD_LOOP_STATUS: &str = "loop.status";
pub const FIELD_ITERATIONS: &str = "loop.iterations";
pub const FIELD_STEP_NAME: &str = "loop.step.name";
pub const FIELD_STEP_STATUS: &str = "loop.step.status";
pub const FIELD_STEP_RETRIES: &str = "loop.step.retries";
pub const FIELD_BRANCH: &str = "vcs.branch";
pub const FIELD_COMMIT_SHA: &str = "vcs.commit.sha";
pub const FIELD_TOOL_NAME: &str = "policy.tool.name";
pub const FIELD_POLICY_NAME: &str = "policy.name";
pub const FIELD_POLICY_DECISION: &str = "policy.decision";
pub const FIELD_VALIDATOR_NAME: &str = "validator.name";
pub const FIELD_VALIDATOR_SUCCESS: &str = "validator.success";
pub const FIELD_ISSUE_COUNT: &str = "validator.issue_count";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// ── Span Builders: Agent-Loop Runtime ──────────────────────────────────

/// Root span for one agent-loop run.
///
/// Fields filled at creation: `loop.name`. Fields filled later via
/// [`record_loop_result`]: `loop.status`, `loop.iterations`, duration.
pub fn loop_run_span(loop_name: &str) -> Span {
    tracing::info_span!(
        "loop.run",
        "loop.name" = %loop_name,
        "loop.status" = tracing::field::Empty,
        "loop.iterations" = tracing::field::Empty,
        "duration_ms" = tracing::field::Empty,
    )
}

pub fn record_loop_result(span: &Span, status: &str, iterations: u64, duration_ms: u64) {
    span.record("loop.status", status);
    span.record("loop.iterations", iterations);
    span.record("duration_ms", duration_ms);
}

/// Span for one step execution (including internal retries).
pub fn loop_step_span(loop_name: &str, step_name: &str) -> Span {
    tracing::info_span!(
        "loop.step",
        "loop.name" = %loop_name,
        "loop.step.name" = %step_name,
        "loop.step.status" = tracing::field::Empty,
        "loop.step.retries" = tracing::field::Empty,
        "duration_ms" = tracing::field::Empty,
    )
}

pub fn record_loop_step_result(span: &Span, status: &str, retries: u32, duration_ms: u64) {
    span.record("loop.step.status", status);
    span.record("loop.step.retries", retries);
    span.record("duration_ms", duration_ms);
}

// ── Span Builders: Shadow VCS Engine ────────────────────────────────────

/// Span for a VCS mutating operation (`commit`, `rollback`, `squash_merge`, ...).
pub fn vcs_commit_span(branch: &str) -> Span {
    tracing::info_span!(
        "vcs.commit",
        "vcs.branch" = %branch,
        "vcs.commit.sha" = tracing::field::Empty,
        "duration_ms" = tracing::field::Empty,
    )
}

pub fn record_vcs_commit_result(span: &Span, sha: &str, duration_ms: u64) {
    span.record("vcs.commit.sha", sha);
    span.record("duration_ms", duration_ms);
}

/// Span for a merge operation (`squash_merge`, `smart_merge`).
pub fn vcs_merge_span(branch: &str, base: &str) -> Span {
    tracing::info_span!(
        "vcs.merge",
        "vcs.branch" = %branch,
        "vcs.base" = %base,
        "vcs.commit.sha" = tracing::field::Empty,
        "duration_ms" = tracing::field::Empty,
    )
}

// ── Span Builders: Policy Engine ────────────────────────────────────────

/// Span for one `ToolCallContext` evaluation across the policy chain.
///
/// Fields filled at creation: `policy.tool.name`. Fields filled later via
/// [`record_policy_result`]: the deciding policy's name and decision.
pub fn policy_evaluate_span(tool_name: &str) -> Span {
    tracing::info_span!(
        "policy.evaluate",
        "policy.tool.name" = %tool_name,
        "policy.name" = tracing::field::Empty,
        "policy.decision" = tracing::field::Empty,
        "duration_ms" = tracing::field::Empty,
    )
}

pub fn record_policy_result(span: &Span, policy_name: &str, decision: &str, duration_ms: u64) {
    span.record("policy.name", policy_name);
    span.record("policy.decision", decision);
    span.record("duration_ms", duration_ms);
}

// ── Span Builders: Validator Chain ──────────────────────────────────────

/// Span for one validator's check.
pub fn validator_span(validator_name: &str, path: &str) -> Span {
    tracing::info_span!(
        "validator.run",
        "validator.name" = %validator_name,
        "path" = %path,
        "validator.success" = tracing::field::Empty,
        "validator.issue_count" = tracing::field::Empty,
        "duration_ms" = tracing::field::Empty,
    )
}

pub fn record_validator_result(span: &Span, success: bool, issue_count: usize, duration_ms: u64) {
    span.record("validator.success", success);
    span.record("validator.issue_count", issue_count as u64);
    span.record("duration_ms", duration_ms);
}

// ── Batch Span Summary ───────────────────────────────────────────────

/// Summary of span activity for a single engine session. Useful for
/// telemetry aggregation and post-run analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanSummary {
    pub loop_runs: u32,
    pub loop_steps: u32,
    pub vcs_commits: u32,
    pub policy_evaluations: u32,
    pub policy_denials: u32,
    pub validator_runs: u32,
    pub validator_failures: u32,
    pub total_duration_ms: u64,
}

impl SpanSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_loop_run(&mut self, duration_ms: u64) {
        self.loop_runs += 1;
        self.total_duration_ms += duration_ms;
    }

    pub fn record_loop_step(&mut self) {
        self.loop_steps += 1;
    }

    pub fn record_vcs_commit(&mut self) {
        self.vcs_commits += 1;
    }

    pub fn record_policy_evaluation(&mut self, allowed: bool) {
        self.policy_evaluations += 1;
        if !allowed {
            self.policy_denials += 1;
        }
    }

    pub fn record_validator_run(&mut self, success: bool, duration_ms: u64) {
        self.validator_runs += 1;
        if !success {
            self.validator_failures += 1;
        }
        self.total_duration_ms += duration_ms;
    }

    pub fn policy_denial_rate(&self) -> f64 {
        if self.policy_evaluations == 0 {
            return 0.0;
        }
        self.policy_denials as f64 / self.policy_evaluations as f64
    }

    pub fn validator_pass_rate(&self) -> f64 {
        if self.validator_runs == 0 {
            return 0.0;
        }
        (self.validator_runs - self.validator_failures) as f64 / self.validator_runs as f64
    }
}

impl std::fmt::Display for SpanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "loop_runs={} vcs_commits={} policy_evals={} denials={} validators={}/{}",
            self.loop_runs,
            self.vcs_commits,
            self.policy_evaluations,
            self.policy_denials,
            self.validator_runs - self.validator_failures,
            self.validator_runs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_subscriber() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .try_init();
        });
    }

    #[test]
    fn loop_run_span_is_valid() {
        init_test_subscriber();
        let span = loop_run_span("fix-lint");
        assert!(!span.is_disabled());
        record_loop_result(&span, "success", 3, 4500);
    }

    #[test]
    fn vcs_commit_span_is_valid() {
        init_test_subscriber();
        let span = vcs_commit_span("shadow/abc12345");
        assert!(!span.is_disabled());
        record_vcs_commit_result(&span, "deadbeef", 120);
    }

    #[test]
    fn policy_evaluate_span_is_valid() {
        init_test_subscriber();
        let span = policy_evaluate_span("edit_file");
        assert!(!span.is_disabled());
        record_policy_result(&span, "quarantine", "deny", 5);
    }

    #[test]
    fn validator_span_is_valid() {
        init_test_subscriber();
        let span = validator_span("syntax", "src/lib.rs");
        assert!(!span.is_disabled());
        record_validator_result(&span, false, 2, 80);
    }

    #[test]
    fn span_constants_are_dotted() {
        assert!(SPAN_LOOP_RUN.contains('.'));
        assert!(SPAN_VCS_COMMIT.contains('.'));
        assert!(SPAN_POLICY_EVALUATE.contains('.'));
        assert!(SPAN_VALIDATOR_RUN.contains('.'));
    }

    #[test]
    fn span_summary_recording() {
        let mut summary = SpanSummary::new();
        summary.record_loop_run(1000);
        summary.record_vcs_commit();
        summary.record_policy_evaluation(true);
        summary.record_policy_evaluation(false);
        summary.record_validator_run(true, 50);
        summary.record_validator_run(false, 60);

        assert_eq!(summary.loop_runs, 1);
        assert_eq!(summary.vcs_commits, 1);
        assert_eq!(summary.policy_evaluations, 2);
        assert_eq!(summary.policy_denials, 1);
        assert_eq!(summary.validator_runs, 2);
        assert_eq!(summary.validator_failures, 1);
        assert!((summary.policy_denial_rate() - 0.5).abs() < 1e-9);
        assert!((summary.validator_pass_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn span_summary_display() {
        let mut summary = SpanSummary::new();
        summary.record_loop_run(100);
        summary.record_vcs_commit();
        let display = summary.to_string();
        assert!(display.contains("loop_runs=1"));
        assert!(display.contains("vcs_commits=1"));
    }

    #[test]
    fn span_summary_serialization() {
        let mut summary = SpanSummary::new();
        summary.record_validator_run(true, 10);
        let json = serde_json::to_string(&summary).unwrap();
        let restored: SpanSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.validator_runs, 1);
    }
}
