//! Session Lifecycle (spec §4.K): project-name derivation, provisional → real
//! `session_id` promotion, and workspace cleanup. Grounded on
//! `original_source/src/managers/tmux_shared.py::get_project_name` for the
//! git-common-dir hashing scheme and `original_source/tests/tools/test_session_tools.py`
//! for the provisional-directory migration contract.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::domain::Agent;
use crate::error::{AgentmuxError, Result};
use crate::tmux::TmuxClient;

const MCP_DIR: &str = ".multi-agent-mcp";

/// `git rev-parse --git-common-dir`, resolved to an absolute path. Used both
/// to validate `enable_git` workspaces and to name the tmux session after
/// the repository rather than an arbitrary checkout directory.
async fn git_common_dir(working_dir: &str) -> Result<PathBuf> {
    let output = Command::new("git")
        .args(["-C", working_dir, "rev-parse", "--git-common-dir"])
        .output()
        .await?;
    if !output.status.success() {
        return Err(AgentmuxError::Other(format!("{working_dir} は git リポジトリではありません")));
    }
    let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let path = PathBuf::from(&raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(Path::new(working_dir).join(path))
    }
}

fn six_hex_hash(input: &str) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:06x}", hasher.finish() & 0xFF_FFFF)
}

/// Derive the stable project name used to build the tmux session name.
///
/// `enable_git=true`: basename of the git common directory's parent, plus a
/// 6-hex hash of the canonicalised working directory. `enable_git=false`:
/// the working directory's own basename plus the same hash, no git lookup
/// (and so no rejection of non-git directories).
pub async fn project_name(working_dir: &str, enable_git: bool) -> Result<String> {
    let canonical = std::fs::canonicalize(working_dir)?.to_string_lossy().into_owned();
    let hash = six_hex_hash(&canonical);

    let base = if enable_git {
        let common_dir = git_common_dir(working_dir).await?;
        common_dir
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AgentmuxError::Other(format!("{working_dir} のプロジェクト名を決定できません")))?
    } else {
        Path::new(working_dir)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AgentmuxError::Other(format!("{working_dir} のプロジェクト名を決定できません")))?
    };

    Ok(format!("{base}-{hash}"))
}

pub fn session_name(project: &str, session_id: &str) -> String {
    format!("{project}-{session_id}")
}

fn is_provisional(session_id: &str) -> bool {
    session_id.starts_with("provisional-")
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionalMigration {
    pub executed: bool,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionalCleanup {
    pub removed_count: usize,
    pub removed_dirs: Vec<String>,
}

/// Promote a provisional session directory (`.multi-agent-mcp/provisional-XXXXXX/`)
/// to the real `session_id`, purging every other leftover `provisional-*`
/// directory in the process.
pub fn migrate_provisional_session(mcp_dir: &Path, previous_session_id: &str, real_session_id: &str) -> Result<(ProvisionalMigration, ProvisionalCleanup)> {
    let mut migration = ProvisionalMigration::default();
    let mut cleanup = ProvisionalCleanup::default();

    if is_provisional(previous_session_id) && previous_session_id != real_session_id {
        let source = mcp_dir.join(previous_session_id);
        let dest = mcp_dir.join(real_session_id);
        if source.exists() {
            if dest.exists() {
                std::fs::remove_dir_all(&dest)?;
            }
            std::fs::rename(&source, &dest)?;
            migration = ProvisionalMigration {
                executed: true,
                from: Some(previous_session_id.to_string()),
                to: Some(real_session_id.to_string()),
            };
        }
    }

    if mcp_dir.exists() {
        for entry in std::fs::read_dir(mcp_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("provisional-") && name != real_session_id {
                std::fs::remove_dir_all(entry.path())?;
                cleanup.removed_dirs.push(name);
            }
        }
        cleanup.removed_count = cleanup.removed_dirs.len();
    }

    Ok((migration, cleanup))
}

#[derive(Debug, Clone)]
pub struct WorkspaceInit {
    pub session: String,
    pub created: bool,
    pub renamed_from_legacy: bool,
    pub provisional_migration: ProvisionalMigration,
    pub provisional_cleanup: ProvisionalCleanup,
}

/// `init_tmux_workspace`: resolve the session name, rename a legacy
/// (no-suffix) session in place if one exists, create the tmux session if
/// needed, and run the provisional-session migration.
pub async fn init_tmux_workspace(
    tmux: &TmuxClient,
    working_dir: &str,
    session_id: &str,
    previous_session_id: Option<&str>,
    enable_git: bool,
) -> Result<WorkspaceInit> {
    let project = project_name(working_dir, enable_git).await?;
    let session = session_name(&project, session_id);
    let legacy = project.clone();

    let mut renamed_from_legacy = false;
    if tmux.session_exists(&legacy).await && !tmux.session_exists(&session).await {
        tmux.rename_session(&legacy, &session).await?;
        renamed_from_legacy = true;
    }

    let created = if !tmux.session_exists(&session).await {
        tmux.new_session(&session, working_dir).await?;
        true
    } else {
        false
    };

    let mcp_dir = Path::new(working_dir).join(MCP_DIR);
    let (provisional_migration, provisional_cleanup) = match previous_session_id {
        Some(prev) => migrate_provisional_session(&mcp_dir, prev, session_id)?,
        None => Default::default(),
    };

    Ok(WorkspaceInit {
        session,
        created,
        renamed_from_legacy,
        provisional_migration,
        provisional_cleanup,
    })
}

#[derive(Debug, Clone, Default)]
pub struct CleanupOutcome {
    pub terminated_sessions: usize,
    pub cleared_agents: usize,
    pub was_forced: bool,
}

/// Collect the distinct tmux session names referenced by the current Agent
/// set, from both `placement.session_name` and any agent carrying a legacy
/// combined `tmux_session` string in its metadata-free representation (the
/// domain `Agent` only has `placement`, so only that source applies here).
fn referenced_sessions(agents: &[Agent]) -> Vec<String> {
    let mut sessions: Vec<String> = agents
        .iter()
        .filter_map(|a| a.placement.as_ref().map(|p| p.session_name.clone()))
        .collect();
    sessions.sort();
    sessions.dedup();
    sessions
}

/// `cleanup_workspace`: terminate only sessions referenced by the current
/// Agent set. Never a global "kill all tmux sessions".
pub async fn cleanup_workspace(tmux: &TmuxClient, agents: &[Agent]) -> Result<CleanupOutcome> {
    let sessions = referenced_sessions(agents);
    let mut terminated = 0;
    for session in &sessions {
        if tmux.session_exists(session).await {
            tmux.kill_session(session).await?;
            terminated += 1;
        }
    }
    Ok(CleanupOutcome {
        terminated_sessions: terminated,
        cleared_agents: agents.len(),
        was_forced: false,
    })
}

pub struct CompletionStatus {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub failed_tasks: usize,
}

impl CompletionStatus {
    pub fn is_all_completed(&self) -> bool {
        self.total_tasks > 0 && self.pending_tasks == 0 && self.in_progress_tasks == 0 && self.failed_tasks == 0
    }
}

/// `cleanup_on_completion`: additionally enforces the completion predicate
/// unless `force=true`.
pub async fn cleanup_on_completion(
    tmux: &TmuxClient,
    agents: &[Agent],
    status: &CompletionStatus,
    force: bool,
) -> Result<CleanupOutcome> {
    if !status.is_all_completed() && !force {
        return Err(AgentmuxError::Other(format!(
            "まだ完了していないタスクがあります（未着手: {}件, 進行中: {}件, 失敗: {}件）",
            status.pending_tasks, status.in_progress_tasks, status.failed_tasks
        )));
    }
    let mut outcome = cleanup_workspace(tmux, agents).await?;
    outcome.was_forced = force && !status.is_all_completed();
    Ok(outcome)
}
