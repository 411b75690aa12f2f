//! Experiment grouping: parallel exploration of several approaches from a
//! shared base, with cross-branch comparison and winner selection.

use super::{CommitHandle, ShadowBranch, ShadowVcsEngine};
use crate::error::{SubstrateResult, VcsError};
use std::collections::{HashMap, HashSet};

/// A named exploration grouping several sibling shadow branches that all
/// fork from the same base.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub id: String,
    pub description: Option<String>,
    pub base: String,
    pub branches: HashMap<String, ShadowBranch>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Cross-branch comparison of an experiment's approaches.
#[derive(Debug, Clone, Default)]
pub struct ExperimentComparison {
    pub common_files: Vec<String>,
    pub unique_files: HashMap<String, Vec<String>>,
    pub metrics: HashMap<String, serde_json::Value>,
}

impl ShadowVcsEngine {
    /// Record the current branch as the experiment's base. Does not create
    /// any VCS branch itself; that happens per-approach in
    /// [`Self::create_experiment_branch`].
    pub async fn create_experiment(
        &mut self,
        name: &str,
        description: Option<String>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SubstrateResult<Experiment> {
        let base = self.current_branch().await?;
        let experiment = Experiment {
            id: name.to_string(),
            description,
            base,
            branches: HashMap::new(),
            metadata: metadata.unwrap_or_default(),
        };
        self.experiments.insert(name.to_string(), experiment.clone());
        Ok(experiment)
    }

    pub fn experiment(&self, name: &str) -> Option<&Experiment> {
        self.experiments.get(name)
    }

    /// Check out the experiment's base, then branch to
    /// `experiment/<id>/<approach>`. The fully qualified name is the key in
    /// both `experiment.branches` and the engine's global branch index, so
    /// an approach name colliding across two experiments never aliases.
    pub async fn create_experiment_branch(
        &mut self,
        experiment: &str,
        approach: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SubstrateResult<ShadowBranch> {
        let base = self
            .experiments
            .get(experiment)
            .ok_or_else(|| VcsError::ExperimentNotFound {
                experiment: experiment.to_string(),
            })?
            .base
            .clone();

        self.run_git(&["checkout", &base]).await?;
        let qualified = format!("experiment/{experiment}/{approach}");
        self.run_git(&["checkout", "-b", &qualified]).await?;

        let branch = ShadowBranch {
            name: qualified.clone(),
            base,
            commits: Vec::new(),
            metadata: metadata.unwrap_or_default(),
        };
        self.branches.insert(qualified.clone(), branch.clone());
        self.experiments
            .get_mut(experiment)
            .unwrap()
            .branches
            .insert(approach.to_string(), branch.clone());
        Ok(branch)
    }

    /// Shallow-merge `metrics` into `branch.metadata["metrics"]`.
    pub fn record_metrics(
        &mut self,
        branch: &str,
        metrics: HashMap<String, serde_json::Value>,
    ) -> SubstrateResult<()> {
        let b = self
            .branches
            .get_mut(branch)
            .ok_or_else(|| VcsError::BranchNotFound {
                branch: branch.to_string(),
            })?;
        let entry = b
            .metadata
            .entry("metrics".to_string())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let serde_json::Value::Object(map) = entry {
            for (k, v) in metrics {
                map.insert(k, v);
            }
        }
        Ok(())
    }

    /// For each branch, compute the files changed vs. the experiment base;
    /// common_files is the intersection across all branches, unique_files
    /// per branch is the set-difference against the union of every other
    /// branch's files.
    pub async fn compare_experiment_branches(
        &self,
        experiment: &str,
    ) -> SubstrateResult<ExperimentComparison> {
        let exp = self
            .experiments
            .get(experiment)
            .ok_or_else(|| VcsError::ExperimentNotFound {
                experiment: experiment.to_string(),
            })?;

        let mut files_by_approach: HashMap<String, Vec<String>> = HashMap::new();
        for (approach, branch) in &exp.branches {
            let output = self
                .run_git(&["diff", "--name-only", &format!("{}...{}", exp.base, branch.name)])
                .await?;
            files_by_approach.insert(approach.clone(), output.lines().map(str::to_string).collect());
        }

        let approaches: Vec<&String> = files_by_approach.keys().collect();
        let common_files = intersect_all(&files_by_approach, &approaches);

        let mut unique_files = HashMap::new();
        for approach in &approaches {
            let this_set: HashSet<&String> = files_by_approach[*approach].iter().collect();
            let mut union_others: HashSet<&String> = HashSet::new();
            for other in &approaches {
                if other != approach {
                    union_others.extend(files_by_approach[*other].iter());
                }
            }
            let mut unique: Vec<String> = this_set
                .difference(&union_others)
                .map(|s| (*s).clone())
                .collect();
            unique.sort();
            unique_files.insert((*approach).clone(), unique);
        }

        let metrics = exp
            .branches
            .iter()
            .filter_map(|(approach, branch)| {
                branch
                    .metadata
                    .get("metrics")
                    .map(|m| (approach.clone(), m.clone()))
            })
            .collect();

        Ok(ExperimentComparison {
            common_files,
            unique_files,
            metrics,
        })
    }

    /// Squash-merge the winning approach onto the experiment's base branch.
    pub async fn select_winner(
        &mut self,
        experiment: &str,
        winner: &str,
        message: Option<String>,
    ) -> SubstrateResult<CommitHandle> {
        let branch = self
            .experiments
            .get(experiment)
            .ok_or_else(|| VcsError::ExperimentNotFound {
                experiment: experiment.to_string(),
            })?
            .branches
            .get(winner)
            .ok_or_else(|| VcsError::ApproachNotFound {
                experiment: experiment.to_string(),
                approach: winner.to_string(),
            })?
            .clone();

        let msg = message.unwrap_or_else(|| format!("Experiment '{experiment}': selected {winner}"));
        self.squash_merge(&branch.name, Some(msg)).await
    }

    /// Abort every branch in the experiment, then drop the experiment.
    pub async fn abort_experiment(&mut self, experiment: &str) -> SubstrateResult<()> {
        let exp = self
            .experiments
            .remove(experiment)
            .ok_or_else(|| VcsError::ExperimentNotFound {
                experiment: experiment.to_string(),
            })?;
        for branch in exp.branches.values() {
            self.abort(&branch.name).await?;
        }
        Ok(())
    }
}

fn intersect_all(files_by_approach: &HashMap<String, Vec<String>>, approaches: &[&String]) -> Vec<String> {
    let Some((first, rest)) = approaches.split_first() else {
        return Vec::new();
    };
    let mut common: HashSet<String> = files_by_approach[*first].iter().cloned().collect();
    for approach in rest {
        let set: HashSet<String> = files_by_approach[*approach].iter().cloned().collect();
        common = common.intersection(&set).cloned().collect();
    }
    let mut out: Vec<String> = common.into_iter().collect();
    out.sort();
    out
}
