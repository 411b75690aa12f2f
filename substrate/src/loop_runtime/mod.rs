//! Agent-loop data model: step graphs, execution context, and metrics.

mod runner;

pub use runner::{AgentLoopRunner, Executor};

use crate::error::{LoopError, SubstrateResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Tool,
    Llm,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    Abort,
    Retry,
    Skip,
    Goto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStep {
    pub name: String,
    pub tool: String,
    pub step_type: StepType,
    pub input_from: Option<String>,
    pub on_error: ErrorAction,
    pub goto_target: Option<String>,
    pub max_retries: u32,
    pub timeout_seconds: Option<u64>,
}

impl LoopStep {
    pub fn new(name: impl Into<String>, tool: impl Into<String>, step_type: StepType) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
            step_type,
            input_from: None,
            on_error: ErrorAction::Abort,
            goto_target: None,
            max_retries: 0,
            timeout_seconds: None,
        }
    }

    pub fn with_on_error(mut self, action: ErrorAction) -> Self {
        self.on_error = action;
        self
    }

    pub fn with_goto_target(mut self, target: impl Into<String>) -> Self {
        self.goto_target = Some(target.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_input_from(mut self, step: impl Into<String>) -> Self {
        self.input_from = Some(step.into());
        self
    }
}

/// A step graph, validated at construction so a runner never has to check
/// structural invariants mid-execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoop {
    pub name: String,
    pub steps: Vec<LoopStep>,
    pub entry: String,
    pub exit_conditions: Vec<String>,
    pub max_steps: u32,
    pub token_budget: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

impl AgentLoop {
    pub fn new(name: impl Into<String>, steps: Vec<LoopStep>) -> SubstrateResult<Self> {
        let name = name.into();
        if steps.is_empty() {
            return Err(LoopError::EmptySteps { name }.into());
        }

        let mut seen = std::collections::HashSet::new();
        for step in &steps {
            if !seen.insert(step.name.clone()) {
                return Err(LoopError::DuplicateStepName {
                    loop_name: name.clone(),
                    name: step.name.clone(),
                }
                .into());
            }
        }

        let entry = steps[0].name.clone();

        for step in &steps {
            if step.on_error == ErrorAction::Goto && step.goto_target.is_none() {
                return Err(LoopError::GotoRequiresTarget { step: step.name.clone() }.into());
            }
            if let Some(target) = &step.goto_target {
                if !seen.contains(target) {
                    return Err(LoopError::GotoTargetNotFound {
                        loop_name: name.clone(),
                        target: target.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(Self {
            name,
            steps,
            entry,
            exit_conditions: Vec::new(),
            max_steps: 100,
            token_budget: None,
            timeout_seconds: None,
        })
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> SubstrateResult<Self> {
        let entry = entry.into();
        if !self.steps.iter().any(|s| s.name == entry) {
            return Err(LoopError::EntryNotFound {
                loop_name: self.name.clone(),
                entry,
            }
            .into());
        }
        self.entry = entry;
        Ok(self)
    }

    pub fn with_exit_conditions(mut self, conditions: Vec<String>) -> Self {
        self.exit_conditions = conditions;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_token_budget(mut self, budget: u64) -> Self {
        self.token_budget = Some(budget);
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn step(&self, name: &str) -> Option<&LoopStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }
}

/// Carried through execution. Never mutated in place: [`LoopContext::with_step`]
/// returns a new instance, so a step can safely retain a reference to an
/// earlier context for retry or diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopContext {
    pub input: serde_json::Value,
    pub steps: HashMap<String, serde_json::Value>,
    pub last: Option<serde_json::Value>,
}

impl LoopContext {
    pub fn new(input: serde_json::Value) -> Self {
        Self {
            input,
            steps: HashMap::new(),
            last: None,
        }
    }

    pub fn with_step(&self, name: impl Into<String>, output: serde_json::Value) -> Self {
        let mut steps = self.steps.clone();
        steps.insert(name.into(), output.clone());
        Self {
            input: self.input.clone(),
            steps,
            last: Some(output),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Success,
    Failed,
    Timeout,
    BudgetExceeded,
    MaxIterations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub status: LoopStatus,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub step_results: Vec<StepResult>,
    pub metrics: LoopMetrics,
}

/// Accumulators for one loop run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopMetrics {
    pub llm_calls: u64,
    pub llm_tokens_in: u64,
    pub llm_tokens_out: u64,
    pub tool_calls: u64,
    pub wall_seconds: f64,
    pub per_step_seconds: HashMap<String, f64>,
    pub iterations: u64,
    pub retries: u64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one step execution by type, per the accounting rule: `tool`
    /// increments `tool_calls`; `llm` increments `llm_calls` and adds
    /// tokens; `hybrid` always increments `tool_calls`, and additionally
    /// `llm_calls` iff either token count is nonzero.
    pub fn record_step(&mut self, step_type: StepType, tokens_in: u64, tokens_out: u64, elapsed_seconds: f64, step_name: &str) {
        match step_type {
            StepType::Tool => {
                self.tool_calls += 1;
            }
            StepType::Llm => {
                self.llm_calls += 1;
                self.llm_tokens_in += tokens_in;
                self.llm_tokens_out += tokens_out;
            }
            StepType::Hybrid => {
                self.tool_calls += 1;
                if tokens_in != 0 || tokens_out != 0 {
                    self.llm_calls += 1;
                    self.llm_tokens_in += tokens_in;
                    self.llm_tokens_out += tokens_out;
                }
            }
        }
        *self.per_step_seconds.entry(step_name.to_string()).or_insert(0.0) += elapsed_seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_requires_at_least_one_step() {
        let result = AgentLoop::new("empty", vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let steps = vec![
            LoopStep::new("a", "tool.a", StepType::Tool),
            LoopStep::new("a", "tool.b", StepType::Tool),
        ];
        assert!(AgentLoop::new("dup", steps).is_err());
    }

    #[test]
    fn goto_without_target_is_rejected() {
        let steps = vec![LoopStep::new("a", "tool.a", StepType::Tool).with_on_error(ErrorAction::Goto)];
        assert!(AgentLoop::new("bad_goto", steps).is_err());
    }

    #[test]
    fn goto_target_must_resolve() {
        let steps = vec![LoopStep::new("a", "tool.a", StepType::Tool)
            .with_on_error(ErrorAction::Goto)
            .with_goto_target("missing")];
        assert!(AgentLoop::new("bad_target", steps).is_err());
    }

    #[test]
    fn entry_defaults_to_first_step() {
        let steps = vec![
            LoopStep::new("first", "tool.a", StepType::Tool),
            LoopStep::new("second", "tool.b", StepType::Tool),
        ];
        let agent_loop = AgentLoop::new("ok", steps).unwrap();
        assert_eq!(agent_loop.entry, "first");
    }

    #[test]
    fn with_step_does_not_mutate_the_original() {
        let c1 = LoopContext::new(serde_json::json!({"x": 1}));
        let c2 = c1.with_step("a", serde_json::json!("out"));
        assert!(c1.steps.is_empty());
        assert!(c1.last.is_none());
        assert_eq!(c2.steps.get("a"), Some(&serde_json::json!("out")));
        assert_eq!(c2.last, Some(serde_json::json!("out")));
        assert_eq!(c1.input, c2.input);
    }

    #[test]
    fn metrics_record_step_by_type() {
        let mut metrics = LoopMetrics::new();
        metrics.record_step(StepType::Tool, 0, 0, 1.0, "a");
        metrics.record_step(StepType::Llm, 10, 20, 1.0, "b");
        metrics.record_step(StepType::Hybrid, 0, 0, 1.0, "c");
        metrics.record_step(StepType::Hybrid, 5, 0, 1.0, "d");
        assert_eq!(metrics.tool_calls, 3);
        assert_eq!(metrics.llm_calls, 2);
        assert_eq!(metrics.llm_tokens_in, 15);
        assert_eq!(metrics.llm_tokens_out, 20);
    }
}
