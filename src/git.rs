//! Git, as an external collaborator (spec §6): worktree lifecycle, the
//! completed-task merge helper, and the four branch-integration predicates
//! the quality gate consults. Every operation shells out to the `git`
//! binary — this module owns no repository state of its own. Grounded on
//! `original_source/src/tools/merge.py` and the integration-state checks in
//! `original_source/src/tools/ipc.py`.

use std::collections::BTreeSet;
use std::path::Path;

use tokio::process::Command;

use crate::error::{AgentmuxError, Result};

async fn run_git(repo_path: &str, args: &[&str]) -> (bool, String) {
    let output = Command::new("git").arg("-C").arg(repo_path).args(args).output().await;
    match output {
        Ok(o) => {
            let text = if o.status.success() {
                String::from_utf8_lossy(&o.stdout).trim().to_string()
            } else {
                let stderr = String::from_utf8_lossy(&o.stderr);
                if stderr.trim().is_empty() {
                    String::from_utf8_lossy(&o.stdout).trim().to_string()
                } else {
                    stderr.trim().to_string()
                }
            };
            (o.status.success(), text)
        }
        Err(e) => (false, e.to_string()),
    }
}

fn split_lines(output: &str) -> BTreeSet<String> {
    output.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
}

pub async fn branch_exists(repo_path: &str, branch: &str) -> bool {
    run_git(repo_path, &["rev-parse", "--verify", branch]).await.0
}

pub async fn is_branch_merged_into(repo_path: &str, branch: &str, target: &str) -> bool {
    run_git(repo_path, &["merge-base", "--is-ancestor", branch, target]).await.0
}

async fn working_tree_diff_files(repo_path: &str) -> (BTreeSet<String>, Option<String>) {
    let (ok, unstaged) = run_git(repo_path, &["diff", "--name-only"]).await;
    if !ok {
        return (BTreeSet::new(), Some(unstaged));
    }
    let (ok, staged) = run_git(repo_path, &["diff", "--cached", "--name-only"]).await;
    if !ok {
        return (BTreeSet::new(), Some(staged));
    }
    (split_lines(&unstaged).union(&split_lines(&staged)).cloned().collect(), None)
}

async fn branch_changed_files(repo_path: &str, branch: &str) -> (BTreeSet<String>, Option<String>) {
    let range = format!("HEAD...{branch}");
    let (ok, out) = run_git(repo_path, &["diff", "--name-only", &range]).await;
    if !ok {
        return (BTreeSet::new(), Some(out));
    }
    (split_lines(&out), None)
}

/// `git diff --quiet HEAD branch` uses a three-way exit code: 0 means the
/// trees are identical, 1 means they differ, and >=2 is a real git error
/// (unknown branch, not a repository, ...) that must not be read as
/// "not equal".
async fn is_branch_tree_equal_to_head(repo_path: &str, branch: &str) -> (bool, Option<String>) {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_path)
        .args(["diff", "--quiet", "HEAD", branch])
        .output()
        .await;
    match output {
        Ok(o) => match o.status.code() {
            Some(0) => (true, None),
            Some(1) => (false, None),
            _ => {
                let stderr = String::from_utf8_lossy(&o.stderr);
                let text = if stderr.trim().is_empty() {
                    String::from_utf8_lossy(&o.stdout).trim().to_string()
                } else {
                    stderr.trim().to_string()
                };
                (false, Some(text))
            }
        },
        Err(e) => (false, Some(e.to_string())),
    }
}

/// `git cherry HEAD branch` reports `-` for commits already applied and
/// `+` for ones that are not; every line starting with `-` (and at least
/// one line present) means the branch's changes are already in HEAD via a
/// different commit (e.g. a squash or cherry-pick upstream).
async fn is_branch_changes_already_applied(repo_path: &str, branch: &str) -> (bool, Option<String>) {
    let (ok, out) = run_git(repo_path, &["cherry", "HEAD", branch]).await;
    if !ok {
        return (false, Some(out));
    }
    let lines: Vec<&str> = out.lines().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return (false, None);
    }
    (lines.iter().all(|l| l.starts_with('-')), None)
}

#[derive(Debug, Clone)]
pub struct BranchIntegrationState {
    pub branch: String,
    pub merged: bool,
    pub tree_equal_to_head: bool,
    pub changes_already_applied: bool,
    pub covered_by_diff: bool,
    pub branch_not_found: bool,
    pub missing_files: Vec<String>,
    pub error: Option<String>,
}

impl BranchIntegrationState {
    pub fn is_integrated(&self) -> bool {
        self.merged || self.covered_by_diff || self.tree_equal_to_head || self.changes_already_applied
    }
}

/// The four-predicate branch-integration check the quality gate uses to
/// decide whether a completed task's branch has actually landed.
pub async fn check_branch_integration_state(repo_path: &str, branches: &[String]) -> Vec<BranchIntegrationState> {
    let (diff_files, diff_error) = working_tree_diff_files(repo_path).await;
    if let Some(e) = &diff_error {
        tracing::debug!(error = %e, "working tree diff fetch failed");
    }

    let unique: BTreeSet<&String> = branches.iter().filter(|b| !b.is_empty()).collect();
    let mut states = Vec::new();
    for branch in unique {
        if !branch_exists(repo_path, branch).await {
            states.push(BranchIntegrationState {
                branch: branch.clone(),
                merged: false,
                tree_equal_to_head: false,
                changes_already_applied: false,
                covered_by_diff: false,
                branch_not_found: true,
                missing_files: Vec::new(),
                error: None,
            });
            continue;
        }

        let merged = is_branch_merged_into(repo_path, branch, "HEAD").await;
        let (changed_files, branch_error) = branch_changed_files(repo_path, branch).await;
        let (tree_equal, tree_error) = is_branch_tree_equal_to_head(repo_path, branch).await;
        let (changes_applied, cherry_error) = is_branch_changes_already_applied(repo_path, branch).await;

        let integration_error = branch_error.or(tree_error).or(cherry_error);
        if let Some(e) = &integration_error {
            states.push(BranchIntegrationState {
                branch: branch.clone(),
                merged,
                tree_equal_to_head: tree_equal,
                changes_already_applied: changes_applied,
                covered_by_diff: false,
                branch_not_found: false,
                missing_files: Vec::new(),
                error: Some(e.clone()),
            });
            continue;
        }

        let missing_files: Vec<String> = changed_files.difference(&diff_files).cloned().collect();
        states.push(BranchIntegrationState {
            branch: branch.clone(),
            merged,
            tree_equal_to_head: tree_equal,
            changes_already_applied: changes_applied,
            covered_by_diff: missing_files.is_empty(),
            branch_not_found: false,
            missing_files,
            error: None,
        });
    }
    states
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    Merge,
    Squash,
    Rebase,
}

impl MergeStrategy {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "merge" => Ok(Self::Merge),
            "squash" => Ok(Self::Squash),
            "rebase" => Ok(Self::Rebase),
            other => Err(AgentmuxError::argument("strategy", other, "merge, squash, rebase")),
        }
    }
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub merged: Vec<String>,
    pub already_merged: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub conflicts: Vec<(String, String)>,
}

impl MergeReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && self.conflicts.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "merged={}, already_merged={}, failed={}, conflicts={}",
            self.merged.len(),
            self.already_merged.len(),
            self.failed.len(),
            self.conflicts.len()
        )
    }
}

/// Integrate every distinct branch from `branches` into `base_branch`
/// using `strategy`. Checks out `base_branch` first; a branch already an
/// ancestor of it is reported as `already_merged` and skipped.
pub async fn merge_completed_tasks(
    repo_path: &Path,
    base_branch: &str,
    branches: &[String],
    strategy: MergeStrategy,
) -> Result<MergeReport> {
    let repo = repo_path.to_string_lossy().to_string();
    let (ok, err) = run_git(&repo, &["checkout", base_branch]).await;
    if !ok {
        return Err(AgentmuxError::Subprocess(format!(
            "base ブランチへの checkout に失敗しました: {err}"
        )));
    }

    let mut report = MergeReport::default();
    let unique: BTreeSet<&String> = branches.iter().filter(|b| !b.is_empty()).collect();

    for branch in unique {
        if is_branch_merged_into(&repo, branch, base_branch).await {
            report.already_merged.push(branch.clone());
            continue;
        }

        let (ok, out) = match strategy {
            MergeStrategy::Merge => {
                run_git(&repo, &["merge", "--no-ff", branch, "-m", &format!("merge: {branch}")]).await
            }
            MergeStrategy::Squash => {
                let (squash_ok, squash_out) = run_git(&repo, &["merge", "--squash", branch]).await;
                if squash_ok {
                    run_git(&repo, &["commit", "-m", &format!("squash merge: {branch}")]).await
                } else {
                    (squash_ok, squash_out)
                }
            }
            MergeStrategy::Rebase => run_git(&repo, &["rebase", branch]).await,
        };

        if ok {
            report.merged.push(branch.clone());
            continue;
        }

        if out.to_lowercase().contains("conflict") {
            report.conflicts.push((branch.clone(), out));
            run_git(&repo, &["merge", "--abort"]).await;
            run_git(&repo, &["rebase", "--abort"]).await;
        } else {
            report.failed.push((branch.clone(), out));
        }
    }

    Ok(report)
}

// ---- Worktree lifecycle -------------------------------------------------

pub async fn create_worktree(repo_path: &str, worktree_path: &str, branch: &str) -> Result<()> {
    let (ok, out) = run_git(repo_path, &["worktree", "add", "-b", branch, worktree_path]).await;
    if !ok {
        return Err(AgentmuxError::Subprocess(out));
    }
    Ok(())
}

pub async fn remove_worktree(repo_path: &str, worktree_path: &str) -> Result<()> {
    let (ok, out) = run_git(repo_path, &["worktree", "remove", worktree_path, "--force"]).await;
    if !ok {
        return Err(AgentmuxError::Subprocess(out));
    }
    Ok(())
}

pub async fn list_worktrees(repo_path: &str) -> Result<Vec<String>> {
    let (ok, out) = run_git(repo_path, &["worktree", "list", "--porcelain"]).await;
    if !ok {
        return Err(AgentmuxError::Subprocess(out));
    }
    Ok(out
        .lines()
        .filter_map(|l| l.strip_prefix("worktree "))
        .map(|s| s.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command as TokioCommand;

    async fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "test"],
        ] {
            TokioCommand::new("git").arg("-C").arg(&path).args(&args).output().await.unwrap();
        }
        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        TokioCommand::new("git").arg("-C").arg(&path).args(["add", "."]).output().await.unwrap();
        TokioCommand::new("git")
            .arg("-C")
            .arg(&path)
            .args(["commit", "-q", "-m", "init"])
            .output()
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn merge_strategy_parses_known_values_only() {
        assert_eq!(MergeStrategy::parse("merge").unwrap(), MergeStrategy::Merge);
        assert!(MergeStrategy::parse("octopus").is_err());
    }

    #[tokio::test]
    async fn branch_not_found_short_circuits_integration_check() {
        let dir = init_repo().await;
        let repo = dir.path().to_string_lossy().to_string();
        let states = check_branch_integration_state(&repo, &["does-not-exist".to_string()]).await;
        assert_eq!(states.len(), 1);
        assert!(states[0].branch_not_found);
    }

    #[tokio::test]
    async fn a_branch_already_merged_is_reported_as_such() {
        let dir = init_repo().await;
        let repo = dir.path().to_string_lossy().to_string();
        let (_, base_branch) = run_git(&repo, &["branch", "--show-current"]).await;
        run_git(&repo, &["branch", "feature-x"]).await;
        let report = merge_completed_tasks(dir.path(), &base_branch, &["feature-x".to_string()], MergeStrategy::Merge)
            .await
            .unwrap();
        assert_eq!(report.already_merged, vec!["feature-x".to_string()]);
        assert!(report.merged.is_empty());
    }
}
