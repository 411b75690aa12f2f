//! Agent-loop runner: drives an [`AgentLoop`] to completion against an
//! [`Executor`], branching on each step's configured error action.

use super::{
    AgentLoop, ErrorAction, LoopContext, LoopMetrics, LoopResult, LoopStatus, LoopStep, StepResult,
    StepStatus, StepType,
};
use async_trait::async_trait;
use std::time::Instant;

/// One tool/LLM/hybrid call. Non-LLM tools return `(output, 0, 0)` for the
/// token counts. Timeouts must surface as [`ExecutorError::Timeout`], not a
/// generic failure, so the runner can record TIMEOUT rather than FAILED.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        context: &LoopContext,
        step: &LoopStep,
    ) -> Result<(serde_json::Value, u64, u64), ExecutorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("step '{0}' timed out")]
    Timeout(String),
    #[error("{0}")]
    Failed(String),
}

pub struct AgentLoopRunner<'a> {
    executor: &'a dyn Executor,
}

impl<'a> AgentLoopRunner<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }

    pub async fn run(&self, agent_loop: &AgentLoop, input: serde_json::Value) -> LoopResult {
        let mut metrics = LoopMetrics::new();
        let mut step_results: Vec<StepResult> = Vec::new();
        let mut context = LoopContext::new(input);
        let mut current = agent_loop.entry.clone();
        let start = Instant::now();

        for _iteration in 0..agent_loop.max_steps {
            metrics.iterations += 1;

            let Some(step) = agent_loop.step(&current) else {
                return LoopResult {
                    status: LoopStatus::Failed,
                    success: false,
                    output: context.last.clone(),
                    error: Some(format!("step '{current}' not found in loop '{}'", agent_loop.name)),
                    step_results,
                    metrics,
                };
            };

            let step_start = Instant::now();
            let outcome = self.execute_step_with_retry(step, &context, &mut metrics).await;
            let elapsed = step_start.elapsed().as_secs_f64();

            match outcome {
                Ok((output, tokens_in, tokens_out)) => {
                    metrics.record_step(step.step_type, tokens_in, tokens_out, elapsed, &step.name);
                    step_results.push(StepResult {
                        step_name: step.name.clone(),
                        status: StepStatus::Success,
                        output: Some(output.clone()),
                        error: None,
                        tokens_in,
                        tokens_out,
                        retries: 0,
                    });

                    context = context.with_step(step.name.clone(), output.clone());

                    if agent_loop
                        .exit_conditions
                        .iter()
                        .any(|cond| cond == &format!("{}.success", step.name))
                    {
                        return LoopResult {
                            status: LoopStatus::Success,
                            success: true,
                            output: Some(output),
                            error: None,
                            step_results,
                            metrics,
                        };
                    }

                    match agent_loop.position(&step.name) {
                        Some(pos) if pos + 1 < agent_loop.steps.len() => {
                            current = agent_loop.steps[pos + 1].name.clone();
                        }
                        _ => {
                            if agent_loop.exit_conditions.is_empty() {
                                return LoopResult {
                                    status: LoopStatus::Success,
                                    success: true,
                                    output: Some(output),
                                    error: None,
                                    step_results,
                                    metrics,
                                };
                            }
                            current = agent_loop.entry.clone();
                        }
                    }
                }
                Err(StepOutcomeError::Timeout) => {
                    step_results.push(StepResult {
                        step_name: step.name.clone(),
                        status: StepStatus::Timeout,
                        output: None,
                        error: Some(format!("step '{}' timed out", step.name)),
                        tokens_in: 0,
                        tokens_out: 0,
                        retries: 0,
                    });
                    return LoopResult {
                        status: LoopStatus::Timeout,
                        success: false,
                        output: context.last.clone(),
                        error: Some(format!("step '{}' timed out", step.name)),
                        step_results,
                        metrics,
                    };
                }
                Err(StepOutcomeError::Failed(message)) => {
                    step_results.push(StepResult {
                        step_name: step.name.clone(),
                        status: StepStatus::Failed,
                        output: None,
                        error: Some(message.clone()),
                        tokens_in: 0,
                        tokens_out: 0,
                        retries: 0,
                    });

                    match step.on_error {
                        ErrorAction::Abort => {
                            return LoopResult {
                                status: LoopStatus::Failed,
                                success: false,
                                output: context.last.clone(),
                                error: Some(message),
                                step_results,
                                metrics,
                            };
                        }
                        ErrorAction::Skip => match agent_loop.position(&step.name) {
                            Some(pos) if pos + 1 < agent_loop.steps.len() => {
                                current = agent_loop.steps[pos + 1].name.clone();
                            }
                            _ => current = agent_loop.entry.clone(),
                        },
                        ErrorAction::Goto => {
                            current = step
                                .goto_target
                                .clone()
                                .expect("construction guarantees goto_target is set");
                        }
                        ErrorAction::Retry => {
                            unreachable!("retry is consumed inside execute_step_with_retry")
                        }
                    }
                }
            }

            let elapsed_total = start.elapsed().as_secs_f64();
            metrics.wall_seconds = elapsed_total;
            if let Some(timeout) = agent_loop.timeout_seconds {
                if elapsed_total > timeout as f64 {
                    return LoopResult {
                        status: LoopStatus::Timeout,
                        success: false,
                        output: context.last.clone(),
                        error: Some("loop wall-clock budget exceeded".to_string()),
                        step_results,
                        metrics,
                    };
                }
            }
            if let Some(budget) = agent_loop.token_budget {
                if metrics.llm_tokens_in + metrics.llm_tokens_out > budget {
                    return LoopResult {
                        status: LoopStatus::BudgetExceeded,
                        success: false,
                        output: context.last.clone(),
                        error: Some("loop token budget exceeded".to_string()),
                        step_results,
                        metrics,
                    };
                }
            }
        }

        LoopResult {
            status: LoopStatus::MaxIterations,
            success: false,
            output: context.last.clone(),
            error: Some("max iterations reached without success".to_string()),
            step_results,
            metrics,
        }
    }

    /// Run the per-step executor, honouring `retry` internally: a `retry`
    /// step never surfaces as FAILED to the caller's on_error switch unless
    /// retries are exhausted.
    async fn execute_step_with_retry(
        &self,
        step: &LoopStep,
        context: &LoopContext,
        metrics: &mut LoopMetrics,
    ) -> Result<(serde_json::Value, u64, u64), StepOutcomeError> {
        let mut attempts = 0;
        loop {
            match self.executor.execute(&step.tool, context, step).await {
                Ok(result) => return Ok(result),
                Err(ExecutorError::Timeout(_)) => return Err(StepOutcomeError::Timeout),
                Err(ExecutorError::Failed(message)) => {
                    if step.on_error != ErrorAction::Retry || attempts >= step.max_retries {
                        return Err(StepOutcomeError::Failed(message));
                    }
                    attempts += 1;
                    metrics.retries += 1;
                }
            }
        }
    }
}

enum StepOutcomeError {
    Timeout,
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct ScriptedExecutor {
        calls: Mutex<Vec<(String, Result<(serde_json::Value, u64, u64), String>)>>,
        index: AtomicU32,
    }

    impl ScriptedExecutor {
        fn new(responses: Vec<Result<(serde_json::Value, u64, u64), String>>) -> Self {
            Self {
                calls: Mutex::new(responses.into_iter().map(|r| (String::new(), r)).collect()),
                index: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(
            &self,
            _tool_name: &str,
            _context: &LoopContext,
            _step: &LoopStep,
        ) -> Result<(serde_json::Value, u64, u64), ExecutorError> {
            let idx = self.index.fetch_add(1, Ordering::SeqCst) as usize;
            let calls = self.calls.lock().unwrap();
            match &calls[idx].1 {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(ExecutorError::Failed(e.clone())),
            }
        }
    }

    #[tokio::test]
    async fn single_successful_step_with_no_exit_conditions_succeeds() {
        let steps = vec![LoopStep::new("only", "tool.echo", StepType::Tool)];
        let agent_loop = AgentLoop::new("single", steps).unwrap();
        let executor = ScriptedExecutor::new(vec![Ok((serde_json::json!("done"), 0, 0))]);
        let result = AgentLoopRunner::new(&executor).run(&agent_loop, serde_json::json!(null)).await;
        assert_eq!(result.status, LoopStatus::Success);
        assert!(result.success);
    }

    #[tokio::test]
    async fn abort_on_error_returns_failed() {
        let steps = vec![LoopStep::new("only", "tool.fail", StepType::Tool)];
        let agent_loop = AgentLoop::new("aborting", steps).unwrap();
        let executor = ScriptedExecutor::new(vec![Err("boom".to_string())]);
        let result = AgentLoopRunner::new(&executor).run(&agent_loop, serde_json::json!(null)).await;
        assert_eq!(result.status, LoopStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn retry_exhausts_and_then_fails() {
        let steps = vec![LoopStep::new("only", "tool.flaky", StepType::Tool)
            .with_on_error(ErrorAction::Retry)
            .with_max_retries(2)];
        let agent_loop = AgentLoop::new("retrying", steps).unwrap();
        let executor = ScriptedExecutor::new(vec![
            Err("e1".to_string()),
            Err("e2".to_string()),
            Err("e3".to_string()),
        ]);
        let result = AgentLoopRunner::new(&executor).run(&agent_loop, serde_json::json!(null)).await;
        assert_eq!(result.status, LoopStatus::Failed);
        assert_eq!(result.metrics.retries, 2);
    }

    #[tokio::test]
    async fn retry_then_success_advances_normally() {
        let steps = vec![LoopStep::new("only", "tool.flaky", StepType::Tool)
            .with_on_error(ErrorAction::Retry)
            .with_max_retries(3)];
        let agent_loop = AgentLoop::new("retry_ok", steps).unwrap();
        let executor = ScriptedExecutor::new(vec![
            Err("e1".to_string()),
            Ok((serde_json::json!("recovered"), 0, 0)),
        ]);
        let result = AgentLoopRunner::new(&executor).run(&agent_loop, serde_json::json!(null)).await;
        assert_eq!(result.status, LoopStatus::Success);
        assert_eq!(result.metrics.retries, 1);
    }

    #[tokio::test]
    async fn exit_condition_on_matching_step_stops_the_loop() {
        let steps = vec![
            LoopStep::new("a", "tool.a", StepType::Tool),
            LoopStep::new("b", "tool.b", StepType::Tool),
        ];
        let agent_loop = AgentLoop::new("exit_cond", steps)
            .unwrap()
            .with_exit_conditions(vec!["a.success".to_string()]);
        let executor = ScriptedExecutor::new(vec![Ok((serde_json::json!("a-out"), 0, 0))]);
        let result = AgentLoopRunner::new(&executor).run(&agent_loop, serde_json::json!(null)).await;
        assert_eq!(result.status, LoopStatus::Success);
        assert_eq!(result.output, Some(serde_json::json!("a-out")));
        assert_eq!(result.step_results.len(), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_after_the_step_that_crosses_it() {
        // A single-step loop with no exit conditions wraps back to entry
        // after each success. The budget check after the first iteration
        // already exceeds 150 tokens, so the second iteration never runs.
        let steps = vec![LoopStep::new("a", "tool.llm_a", StepType::Llm)];
        let agent_loop = AgentLoop::new("budgeted", steps)
            .unwrap()
            .with_max_steps(10)
            .with_token_budget(150)
            .with_exit_conditions(vec!["a.never".to_string()]);
        let executor = ScriptedExecutor::new(vec![
            Ok((serde_json::json!("first"), 100, 100)),
            Ok((serde_json::json!("second"), 100, 100)),
        ]);
        let result = AgentLoopRunner::new(&executor).run(&agent_loop, serde_json::json!(null)).await;
        assert_eq!(result.status, LoopStatus::BudgetExceeded);
        assert_eq!(result.step_results.len(), 1);
        assert_eq!(result.step_results[0].status, StepStatus::Success);
        assert_eq!(result.output, Some(serde_json::json!("first")));
    }

    #[tokio::test]
    async fn goto_redirects_to_target_step() {
        let steps = vec![
            LoopStep::new("a", "tool.a", StepType::Tool)
                .with_on_error(ErrorAction::Goto)
                .with_goto_target("recover"),
            LoopStep::new("recover", "tool.recover", StepType::Tool),
        ];
        let agent_loop = AgentLoop::new("goto_loop", steps).unwrap();
        let executor = ScriptedExecutor::new(vec![
            Err("oops".to_string()),
            Ok((serde_json::json!("recovered"), 0, 0)),
        ]);
        let result = AgentLoopRunner::new(&executor).run(&agent_loop, serde_json::json!(null)).await;
        assert_eq!(result.status, LoopStatus::Success);
    }
}
