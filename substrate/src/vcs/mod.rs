//! Shadow VCS engine.
//!
//! Wraps `git` so agent edits are never applied directly to the calling
//! branch: every edit lands on an isolated shadow branch with atomic
//! commits, commit-level rollback, hunk-level selective revert, and
//! experiment grouping of concurrent branches. Every method that shells out
//! suspends; there is no synchronous git path here by design (see the
//! concurrency notes in the crate root docs).

mod experiment;
mod hunks;
mod symbols;

pub use experiment::{Experiment, ExperimentComparison};
pub use hunks::DiffHunk;

use crate::error::{SubstrateResult, VcsError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use uuid::Uuid;

/// An isolated branch onto which agent edits are applied.
#[derive(Debug, Clone)]
pub struct ShadowBranch {
    pub name: String,
    pub base: String,
    pub commits: Vec<CommitHandle>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A single commit on a shadow branch. Immutable once constructed; the
/// engine is the only legal mutator of the branch's commit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHandle {
    pub sha: String,
    pub message: String,
    is_staged: bool,
}

impl CommitHandle {
    /// `true` for the sentinel handle returned during multi-commit mode,
    /// whose `sha` is the literal `"staged"` rather than a real commit.
    pub fn is_staged(&self) -> bool {
        self.is_staged
    }
}

struct MultiCommitState {
    queued_messages: Vec<String>,
}

/// The shadow VCS engine. One instance owns one working tree.
pub struct ShadowVcsEngine {
    working_dir: PathBuf,
    branches: HashMap<String, ShadowBranch>,
    experiments: HashMap<String, Experiment>,
    multi_commit: HashMap<String, MultiCommitState>,
}

impl ShadowVcsEngine {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            branches: HashMap::new(),
            experiments: HashMap::new(),
            multi_commit: HashMap::new(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn branch(&self, name: &str) -> Option<&ShadowBranch> {
        self.branches.get(name)
    }

    async fn run_git(&self, args: &[&str]) -> SubstrateResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .await
            .map_err(VcsError::Io)?;

        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn current_branch(&self) -> SubstrateResult<String> {
        self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn current_commit_full(&self) -> SubstrateResult<String> {
        self.run_git(&["rev-parse", "HEAD"]).await
    }

    async fn has_uncommitted_changes(&self) -> SubstrateResult<bool> {
        Ok(!self.run_git(&["status", "--porcelain"]).await?.is_empty())
    }

    fn get_branch(&self, branch: &str) -> SubstrateResult<&ShadowBranch> {
        self.branches
            .get(branch)
            .ok_or_else(|| VcsError::BranchNotFound {
                branch: branch.to_string(),
            }.into())
    }

    /// Switch HEAD to `name`, recording the current branch as base; name
    /// defaults to `shadow/<8-hex>` when omitted.
    pub async fn create_shadow_branch(&mut self, name: Option<String>) -> SubstrateResult<ShadowBranch> {
        let base = self.current_branch().await?;
        let name = name.unwrap_or_else(|| format!("shadow/{}", short_hex()));
        self.run_git(&["checkout", "-b", &name]).await?;

        let branch = ShadowBranch {
            name: name.clone(),
            base,
            commits: Vec::new(),
            metadata: HashMap::new(),
        };
        self.branches.insert(name, branch.clone());
        Ok(branch)
    }

    pub async fn checkout_shadow_branch(&self, branch: &str) -> SubstrateResult<()> {
        self.run_git(&["checkout", branch]).await?;
        Ok(())
    }

    /// Stage and commit. In multi-commit mode the change is only staged and
    /// the message queued; the returned handle carries the `"staged"`
    /// sentinel SHA (see [`CommitHandle::is_staged`]).
    pub async fn commit(
        &mut self,
        branch: &str,
        message: &str,
        allow_empty: bool,
    ) -> SubstrateResult<CommitHandle> {
        self.get_branch(branch)?;
        self.checkout_shadow_branch(branch).await?;
        self.run_git(&["add", "-A"]).await?;

        if let Some(state) = self.multi_commit.get_mut(branch) {
            state.queued_messages.push(message.to_string());
            let handle = CommitHandle {
                sha: "staged".to_string(),
                message: message.to_string(),
                is_staged: true,
            };
            self.branches.get_mut(branch).unwrap().commits.push(handle.clone());
            return Ok(handle);
        }

        if !allow_empty && !self.has_uncommitted_changes().await? {
            return Err(VcsError::NothingToCommit {
                branch: branch.to_string(),
            }
            .into());
        }

        let mut args = vec!["commit", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run_git(&args).await?;

        let sha = self.current_commit_full().await?;
        let handle = CommitHandle {
            sha,
            message: message.to_string(),
            is_staged: false,
        };
        self.branches.get_mut(branch).unwrap().commits.push(handle.clone());
        Ok(handle)
    }

    pub async fn begin_multi_commit(&mut self, branch: &str) -> SubstrateResult<()> {
        self.get_branch(branch)?;
        if self.multi_commit.contains_key(branch) {
            return Err(VcsError::AlreadyInMultiCommit {
                branch: branch.to_string(),
            }
            .into());
        }
        self.multi_commit.insert(
            branch.to_string(),
            MultiCommitState {
                queued_messages: Vec::new(),
            },
        );
        Ok(())
    }

    /// Flush the queued multi-commit sequence into exactly one real commit,
    /// replacing the staged placeholder handles on the branch.
    pub async fn finish_multi_commit(
        &mut self,
        branch: &str,
        message: Option<String>,
    ) -> SubstrateResult<CommitHandle> {
        let state = self
            .multi_commit
            .remove(branch)
            .ok_or_else(|| VcsError::NotInMultiCommit {
                branch: branch.to_string(),
            })?;

        self.checkout_shadow_branch(branch).await?;
        if !self.has_uncommitted_changes().await? {
            return Err(VcsError::NothingToCommit {
                branch: branch.to_string(),
            }
            .into());
        }

        let joined = message.unwrap_or_else(|| state.queued_messages.join(" / "));
        self.run_git(&["commit", "-m", &joined]).await?;
        let sha = self.current_commit_full().await?;
        let handle = CommitHandle {
            sha,
            message: joined,
            is_staged: false,
        };

        let b = self.branches.get_mut(branch).unwrap();
        let new_len = b.commits.len().saturating_sub(state.queued_messages.len());
        b.commits.truncate(new_len);
        b.commits.push(handle.clone());
        Ok(handle)
    }

    pub async fn rollback(&mut self, branch: &str, steps: i64) -> SubstrateResult<()> {
        if steps < 1 {
            return Err(VcsError::InvalidRollbackSteps { steps }.into());
        }
        let steps = steps as usize;
        let available = self.get_branch(branch)?.commits.len();
        if steps > available {
            return Err(VcsError::RollbackOutOfRange {
                branch: branch.to_string(),
                steps,
                available,
            }
            .into());
        }

        self.checkout_shadow_branch(branch).await?;
        self.run_git(&["reset", "--hard", &format!("HEAD~{steps}")]).await?;

        let b = self.branches.get_mut(branch).unwrap();
        let new_len = b.commits.len() - steps;
        b.commits.truncate(new_len);
        Ok(())
    }

    /// Roll back by the exact offset needed to land at `handle`.
    pub async fn rollback_to(&mut self, branch: &str, handle: &CommitHandle) -> SubstrateResult<()> {
        let commits = &self.get_branch(branch)?.commits;
        let idx = commits
            .iter()
            .position(|c| c.sha == handle.sha)
            .ok_or_else(|| VcsError::HandleNotFound {
                branch: branch.to_string(),
                sha: handle.sha.clone(),
            })?;
        let steps = commits.len() - idx - 1;
        if steps == 0 {
            return Ok(());
        }
        self.rollback(branch, steps as i64).await
    }

    pub async fn squash_merge(
        &mut self,
        branch: &str,
        message: Option<String>,
    ) -> SubstrateResult<CommitHandle> {
        let b = self.get_branch(branch)?;
        if b.commits.is_empty() {
            return Err(VcsError::NoCommitsToMerge {
                branch: branch.to_string(),
            }
            .into());
        }
        let base = b.base.clone();
        let msg = message.unwrap_or_else(|| format!("Squash merge {branch}"));

        self.checkout_shadow_branch(&base).await?;
        self.run_git(&["merge", "--squash", branch]).await?;
        self.run_git(&["commit", "-m", &msg]).await?;

        let sha = self.current_commit_full().await?;
        Ok(CommitHandle {
            sha,
            message: msg,
            is_staged: false,
        })
    }

    /// Attempt a normal merge; on conflict, fall back to favoring the
    /// shadow branch's content and commit with a `" (resolved conflicts)"`
    /// suffix. This is the one VCS operation that catches a failure and
    /// retries internally before propagating.
    pub async fn smart_merge(
        &mut self,
        branch: &str,
        message: Option<String>,
    ) -> SubstrateResult<CommitHandle> {
        let base = self.get_branch(branch)?.base.clone();
        let msg = message.unwrap_or_else(|| format!("Merge {branch}"));

        self.checkout_shadow_branch(&base).await?;
        match self.run_git(&["merge", branch, "-m", &msg]).await {
            Ok(_) => {
                let sha = self.current_commit_full().await?;
                Ok(CommitHandle {
                    sha,
                    message: msg,
                    is_staged: false,
                })
            }
            Err(first_failure) => {
                if self.run_git(&["checkout", "--theirs", "."]).await.is_err() {
                    return Err(first_failure);
                }
                self.run_git(&["add", "-A"]).await?;
                let resolved_msg = format!("{msg} (resolved conflicts)");
                self.run_git(&["commit", "-m", &resolved_msg])
                    .await
                    .map_err(|_| VcsError::UnresolvedConflict {
                        branch: branch.to_string(),
                        message: first_failure.to_string(),
                    })?;
                let sha = self.current_commit_full().await?;
                Ok(CommitHandle {
                    sha,
                    message: resolved_msg,
                    is_staged: false,
                })
            }
        }
    }

    pub async fn abort(&mut self, branch: &str) -> SubstrateResult<()> {
        let base = self.get_branch(branch)?.base.clone();
        self.checkout_shadow_branch(&base).await?;
        self.run_git(&["branch", "-D", branch]).await?;
        self.branches.remove(branch);
        Ok(())
    }

    pub async fn diff(&self, branch: &str) -> SubstrateResult<String> {
        let base = self.get_branch(branch)?.base.clone();
        self.run_git(&["diff", &format!("{base}...{branch}")]).await
    }

    pub async fn diff_stat(&self, branch: &str) -> SubstrateResult<String> {
        let base = self.get_branch(branch)?.base.clone();
        self.run_git(&["diff", "--stat", &format!("{base}...{branch}")]).await
    }

    pub async fn get_hunks(&self, branch: &str) -> SubstrateResult<Vec<DiffHunk>> {
        let diff_text = self.diff(branch).await?;
        Ok(hunks::parse_diff(&diff_text))
    }

    /// Resolve each hunk's innermost enclosing symbol. Never fails; hunks
    /// whose file or symbol cannot be resolved are returned with
    /// `symbol: None`.
    pub fn map_hunks_to_symbols(&self, hunks: Vec<DiffHunk>) -> Vec<DiffHunk> {
        hunks::map_hunks_to_symbols(hunks, &self.working_dir)
    }

    /// Surgical revert: group by file, revert bottom-up by `new_start`
    /// within each file, write the file back. Returns the count of hunks
    /// reverted. This touches the working tree only; callers typically
    /// follow with `commit` to record the selective revert.
    pub async fn rollback_hunks(&self, branch: &str, hunks_to_revert: &[DiffHunk]) -> SubstrateResult<usize> {
        self.get_branch(branch)?;

        let mut by_file: HashMap<String, Vec<DiffHunk>> = HashMap::new();
        for h in hunks_to_revert {
            by_file.entry(h.file.clone()).or_default().push(h.clone());
        }

        let mut reverted = 0usize;
        for (file, mut file_hunks) in by_file {
            file_hunks.sort_by(|a, b| b.new_start.cmp(&a.new_start));
            let path = self.working_dir.join(&file);
            let text = tokio::fs::read_to_string(&path).await.map_err(VcsError::Io)?;
            let updated = hunks::revert_hunks_in_text(&text, &file_hunks);
            tokio::fs::write(&path, updated).await.map_err(VcsError::Io)?;
            reverted += file_hunks.len();
        }
        Ok(reverted)
    }
}

fn short_hex() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
