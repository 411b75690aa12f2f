//! Substrate: headless orchestration substrate for autonomous
//! code-modifying agents.
//!
//! This library provides:
//! - A diagnostic model that normalizes tool output (cargo, rustc, tsc,
//!   eslint, ruff, gcc, clang) into a uniform `Diagnostic` stream
//! - A shadow VCS engine for isolated, revertible, hunk-addressable edits
//! - A policy engine gating tool calls against velocity, quarantine,
//!   rate-limit, path, and trust rules
//! - A validator chain running syntax, command, diagnostic, and
//!   test-runner checks after an edit
//! - An agent-loop runtime driving a step graph to completion against a
//!   pluggable executor
//!
//! # Usage
//!
//! ```rust,ignore
//! use substrate::vcs::ShadowVcsEngine;
//! use substrate::policy::create_default_policy_engine;
//!
//! let mut vcs = ShadowVcsEngine::new(repo_root);
//! let branch = vcs.create_shadow_branch(None).await?;
//! let policy_engine = create_default_policy_engine(None);
//! ```

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod loop_runtime;
pub mod otel;
pub mod policy;
pub mod validator;
pub mod vcs;

pub use config::{ConfigError, PolicyConfig, SubstrateConfig, ValidatorConfig, ValidatorKind};
pub use error::{
    LoopError, PolicyError, StructuredError, SubstrateError, SubstrateResult, ValidatorError,
    VcsError,
};

pub use diagnostics::{
    parse_diagnostics, Diagnostic, DiagnosticParser, DiagnosticSet, Location, ParserRegistry,
    Severity,
};

pub use vcs::{CommitHandle, DiffHunk, Experiment, ExperimentComparison, ShadowBranch, ShadowVcsEngine};

pub use policy::{
    create_default_policy_engine, Policy, PolicyDecision, PolicyEngine, PolicyEngineResult,
    PolicyResult, RateLimitPolicy, QuarantinePolicy, PathPolicy, ToolCallContext, TrustDecision,
    TrustManager, TrustPolicy, VelocityPolicy,
};

pub use validator::{
    CommandValidator, DiagnosticValidator, SyntaxValidator, TestRunnerValidator, ValidationIssue,
    ValidationResult, ValidationSeverity, Validator, ValidatorChain,
};

pub use loop_runtime::{
    AgentLoop, AgentLoopRunner, ErrorAction, Executor, LoopContext, LoopMetrics, LoopResult,
    LoopStatus, LoopStep, StepResult, StepStatus, StepType,
};
