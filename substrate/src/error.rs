//! Substrate error types.
//!
//! Provides structured error handling for every subsystem (shadow VCS,
//! policy engine, validator chain, agent-loop runtime). Includes an
//! agent-friendly structured representation alongside the normal
//! [`std::error::Error`] hierarchy, since callers of this crate are often
//! themselves agents deciding how to recover rather than humans reading a
//! log.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type SubstrateResult<T> = Result<T, SubstrateError>;

// ============================================================================
// Structured Error Response (Agent-Friendly)
// ============================================================================

/// Structured error response that helps an agent self-recover.
///
/// # Example
/// ```json
/// {
///   "code": "VCS_ROLLBACK_OUT_OF_RANGE",
///   "message": "rollback(3) exceeds 1 commit(s) on branch shadow/ab12cd34",
///   "recovery_action": "Call rollback with steps <= branch.commits.len()",
///   "context": { "branch": "shadow/ab12cd34", "steps": 3 },
///   "retryable": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code (e.g. "VCS_COMMAND_FAILED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Actionable recovery instruction for the agent.
    pub recovery_action: String,
    /// Relevant context for debugging and recovery.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    /// Whether this error is retryable (transient failure).
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

// ============================================================================
// Subsystem error enums
// ============================================================================

/// Errors raised by the shadow VCS engine.
#[derive(Error, Debug)]
pub enum VcsError {
    /// The underlying VCS returned a non-zero exit code.
    #[error("git {args:?} failed (exit {code}): {stderr}")]
    CommandFailed {
        code: i32,
        stderr: String,
        args: Vec<String>,
    },

    #[error("rollback steps must be >= 1, got {steps}")]
    InvalidRollbackSteps { steps: i64 },

    #[error("rollback({steps}) exceeds {available} commit(s) on branch '{branch}'")]
    RollbackOutOfRange {
        branch: String,
        steps: usize,
        available: usize,
    },

    #[error("nothing to commit on branch '{branch}'")]
    NothingToCommit { branch: String },

    #[error("commit handle {sha} not found in history of branch '{branch}'")]
    HandleNotFound { branch: String, sha: String },

    #[error("no commits to merge on branch '{branch}'")]
    NoCommitsToMerge { branch: String },

    #[error("merge of '{branch}' could not be automatically resolved: {message}")]
    UnresolvedConflict { branch: String, message: String },

    #[error("shadow branch '{branch}' not found")]
    BranchNotFound { branch: String },

    #[error("experiment '{experiment}' not found")]
    ExperimentNotFound { experiment: String },

    #[error("approach '{approach}' not found in experiment '{experiment}'")]
    ApproachNotFound { experiment: String, approach: String },

    #[error("begin_multi_commit called while already in multi-commit mode on branch '{branch}'")]
    AlreadyInMultiCommit { branch: String },

    #[error("finish_multi_commit called while not in multi-commit mode on branch '{branch}'")]
    NotInMultiCommit { branch: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CommandFailed { stderr, .. } => {
                let lower = stderr.to_lowercase();
                lower.contains("lock")
                    || lower.contains("another git process")
                    || lower.contains("timeout")
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::CommandFailed { stderr, args, .. } => {
                let lower = stderr.to_lowercase();
                if lower.contains("lock") {
                    "Underlying VCS index is locked; wait briefly and retry.".to_string()
                } else {
                    format!("Inspect repository state; command was `git {}`.", args.join(" "))
                }
            }
            Self::InvalidRollbackSteps { .. } => "Pass a steps value >= 1.".to_string(),
            Self::RollbackOutOfRange { available, .. } => {
                format!("Pass steps <= {available}.")
            }
            Self::NothingToCommit { .. } => {
                "Make changes before committing, or pass allow_empty=true.".to_string()
            }
            Self::HandleNotFound { .. } => {
                "The commit handle is not reachable from this branch; list branch.commits() first."
                    .to_string()
            }
            Self::NoCommitsToMerge { .. } => {
                "Commit at least one change on the branch before merging.".to_string()
            }
            Self::UnresolvedConflict { .. } => {
                "Resolve the conflict manually on the shadow branch, then retry the merge."
                    .to_string()
            }
            Self::BranchNotFound { .. } => {
                "Create the shadow branch first with create_shadow_branch.".to_string()
            }
            Self::ExperimentNotFound { .. } => {
                "Create the experiment first with create_experiment.".to_string()
            }
            Self::ApproachNotFound { .. } => {
                "Register the approach with create_experiment_branch before referencing it."
                    .to_string()
            }
            Self::AlreadyInMultiCommit { .. } => {
                "Call finish_multi_commit before starting a new multi-commit sequence."
                    .to_string()
            }
            Self::NotInMultiCommit { .. } => {
                "Call begin_multi_commit before finish_multi_commit.".to_string()
            }
            Self::Io(_) => "Check filesystem permissions and disk space.".to_string(),
        }
    }
}

/// Errors raised by the policy engine (outside of ordinary ALLOW/WARN/DENY
/// results, which are not exceptions per the engine's contract).
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("failed to load trust rules from {path}: {message}")]
    TrustConfigLoad { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by validators (subprocess/IO failures, not validation
/// findings themselves, which are reported as [`crate::validator::ValidationIssue`]s).
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("failed to spawn validator command {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        source: std::io::Error,
    },

    #[error("validator command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural errors raised at agent-loop construction time.
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("loop '{name}' must have at least one step")]
    EmptySteps { name: String },

    #[error("step names must be unique; '{name}' is duplicated in loop '{loop_name}'")]
    DuplicateStepName { loop_name: String, name: String },

    #[error("entry step '{entry}' not found in loop '{loop_name}'")]
    EntryNotFound { loop_name: String, entry: String },

    #[error("goto target '{target}' not found in loop '{loop_name}'")]
    GotoTargetNotFound { loop_name: String, target: String },

    #[error("step '{step}' uses on_error=goto but declares no goto_target")]
    GotoRequiresTarget { step: String },
}

/// Top-level crate error aggregating every subsystem.
#[derive(Error, Debug)]
pub enum SubstrateError {
    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SubstrateError {
    /// Whether this error represents a transient condition worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Vcs(e) => e.is_retryable(),
            Self::Policy(_) | Self::Validator(_) | Self::Loop(_) | Self::Json(_) => false,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Vcs(VcsError::CommandFailed { .. }) => "VCS_COMMAND_FAILED",
            Self::Vcs(VcsError::InvalidRollbackSteps { .. }) => "VCS_INVALID_ROLLBACK_STEPS",
            Self::Vcs(VcsError::RollbackOutOfRange { .. }) => "VCS_ROLLBACK_OUT_OF_RANGE",
            Self::Vcs(VcsError::NothingToCommit { .. }) => "VCS_NOTHING_TO_COMMIT",
            Self::Vcs(VcsError::HandleNotFound { .. }) => "VCS_HANDLE_NOT_FOUND",
            Self::Vcs(VcsError::NoCommitsToMerge { .. }) => "VCS_NO_COMMITS_TO_MERGE",
            Self::Vcs(VcsError::UnresolvedConflict { .. }) => "VCS_UNRESOLVED_CONFLICT",
            Self::Vcs(VcsError::BranchNotFound { .. }) => "VCS_BRANCH_NOT_FOUND",
            Self::Vcs(VcsError::ExperimentNotFound { .. }) => "VCS_EXPERIMENT_NOT_FOUND",
            Self::Vcs(VcsError::ApproachNotFound { .. }) => "VCS_APPROACH_NOT_FOUND",
            Self::Vcs(VcsError::AlreadyInMultiCommit { .. }) => "VCS_ALREADY_IN_MULTI_COMMIT",
            Self::Vcs(VcsError::NotInMultiCommit { .. }) => "VCS_NOT_IN_MULTI_COMMIT",
            Self::Vcs(VcsError::Io(_)) => "VCS_IO_ERROR",
            Self::Policy(PolicyError::TrustConfigLoad { .. }) => "POLICY_TRUST_CONFIG_LOAD",
            Self::Policy(PolicyError::Io(_)) => "POLICY_IO_ERROR",
            Self::Validator(ValidatorError::Spawn { .. }) => "VALIDATOR_SPAWN_FAILED",
            Self::Validator(ValidatorError::Timeout { .. }) => "VALIDATOR_TIMEOUT",
            Self::Validator(ValidatorError::Io(_)) => "VALIDATOR_IO_ERROR",
            Self::Loop(LoopError::EmptySteps { .. }) => "LOOP_EMPTY_STEPS",
            Self::Loop(LoopError::DuplicateStepName { .. }) => "LOOP_DUPLICATE_STEP_NAME",
            Self::Loop(LoopError::EntryNotFound { .. }) => "LOOP_ENTRY_NOT_FOUND",
            Self::Loop(LoopError::GotoTargetNotFound { .. }) => "LOOP_GOTO_TARGET_NOT_FOUND",
            Self::Loop(LoopError::GotoRequiresTarget { .. }) => "LOOP_GOTO_REQUIRES_TARGET",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    fn recovery_action(&self) -> String {
        match self {
            Self::Vcs(e) => e.recovery_suggestion(),
            Self::Policy(PolicyError::TrustConfigLoad { .. }) => {
                "Check the trust-rules YAML file for syntax errors.".to_string()
            }
            Self::Policy(PolicyError::Io(_)) => {
                "Check filesystem permissions for the trust-rules path.".to_string()
            }
            Self::Validator(ValidatorError::Spawn { command, .. }) => {
                format!("Verify `{}` is installed and on PATH.", command.first().cloned().unwrap_or_default())
            }
            Self::Validator(ValidatorError::Timeout { .. }) => {
                "Increase the validator timeout or investigate why the command hangs.".to_string()
            }
            Self::Validator(ValidatorError::Io(_)) => "Check filesystem permissions.".to_string(),
            Self::Loop(LoopError::EmptySteps { .. }) => "Add at least one LoopStep.".to_string(),
            Self::Loop(LoopError::DuplicateStepName { .. }) => {
                "Rename steps so every name is unique within the loop.".to_string()
            }
            Self::Loop(LoopError::EntryNotFound { .. }) => {
                "Set entry to a step name that exists, or omit it to default to the first step."
                    .to_string()
            }
            Self::Loop(LoopError::GotoTargetNotFound { .. }) => {
                "Point goto_target at an existing step name.".to_string()
            }
            Self::Loop(LoopError::GotoRequiresTarget { .. }) => {
                "Set goto_target when on_error is Goto.".to_string()
            }
            Self::Json(_) => "Validate the JSON payload.".to_string(),
        }
    }

    /// Convert to the agent-facing structured representation.
    pub fn to_structured(&self) -> StructuredError {
        let mut structured =
            StructuredError::new(self.code(), self.to_string(), self.recovery_action());
        if self.is_retryable() {
            structured = structured.retryable();
        }
        structured
    }

    /// Convert to a structured error JSON string.
    pub fn to_structured_json(&self) -> String {
        serde_json::to_string_pretty(&self.to_structured())
            .unwrap_or_else(|_| format!(r#"{{"code":"SERIALIZATION_ERROR","message":"{}"}}"#, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vcs_lock_errors_are_retryable() {
        let err = VcsError::CommandFailed {
            code: 128,
            stderr: "fatal: Unable to create '.git/index.lock'".to_string(),
            args: vec!["add".to_string(), "-A".to_string()],
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn vcs_structural_errors_are_not_retryable() {
        let err = VcsError::NothingToCommit {
            branch: "shadow/deadbeef".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn structured_error_round_trips_through_json() {
        let err = SubstrateError::from(VcsError::RollbackOutOfRange {
            branch: "shadow/abc".to_string(),
            steps: 5,
            available: 2,
        });
        let structured = err.to_structured();
        assert_eq!(structured.code, "VCS_ROLLBACK_OUT_OF_RANGE");
        assert!(!structured.retryable);

        let json = serde_json::to_string(&structured).unwrap();
        let restored: StructuredError = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.code, structured.code);
        assert_eq!(restored.message, structured.message);
    }

    #[test]
    fn loop_error_codes_are_distinct() {
        let a = SubstrateError::from(LoopError::EmptySteps {
            name: "l".to_string(),
        });
        let b = SubstrateError::from(LoopError::GotoRequiresTarget {
            step: "s".to_string(),
        });
        assert_ne!(a.code(), b.code());
    }

    #[test]
    fn structured_error_context_builder() {
        let err = StructuredError::new("X", "msg", "fix it").with_context("branch", "shadow/a");
        assert_eq!(err.context.get("branch").unwrap(), "shadow/a");
    }
}
