//! Task Dispatcher (spec §4.H): turns `send_task` into either a worktree +
//! tmux bootstrap (Worker) or a task-file + stdin bootstrap (Admin).
//! Grounded on `original_source/src/tools/command.py`'s `send_task` /
//! `_send_task_to_worker`.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::domain::{Agent, AiCli, Role};
use crate::error::{AgentmuxError, Result};
use crate::git;
use crate::tmux::TmuxClient;

#[derive(Debug, Clone)]
pub struct SendTaskRequest {
    pub task_content: String,
    pub session_id: String,
    pub auto_enhance: bool,
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Worker,
    AdminFile,
    None,
}

#[derive(Debug, Clone)]
pub struct SendTaskResult {
    pub success: bool,
    pub command_sent: Option<String>,
    pub dispatch_mode: DispatchMode,
    pub branch_name: Option<String>,
    pub worktree_path: Option<String>,
    pub task_file: Option<PathBuf>,
}

/// `feature/{safe_session_id}-worker-{n}-{6-hex}`. `safe_session_id` keeps
/// only `[0-9A-Za-z._-]`, collapsing everything else to `-` and trimming
/// leading/trailing dashes; an empty result falls back to `"task"`.
pub fn generate_worker_branch_name(session_id: &str, worker_no: u32) -> String {
    let mut safe = String::with_capacity(session_id.len());
    let mut last_was_dash = false;
    for c in session_id.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            safe.push(c);
            last_was_dash = c == '-';
        } else if !last_was_dash {
            safe.push('-');
            last_was_dash = true;
        }
    }
    let safe = safe.trim_matches('-');
    let safe_session_id = if safe.is_empty() { "task" } else { safe };
    let nonce: String = {
        let mut rng = rand::rng();
        (0..6).map(|_| std::char::from_digit(rng.random_range(0..16), 16).unwrap()).collect()
    };
    format!("feature/{safe_session_id}-worker-{worker_no}-{nonce}")
}

pub fn admin_default_branch_name(session_id: &str) -> String {
    format!("feature/{session_id}")
}

fn ai_cli_bootstrap_command(ai_cli: AiCli, task_file: &Path, model: Option<&str>) -> String {
    let path = task_file.to_string_lossy();
    match ai_cli {
        AiCli::Claude => {
            let model_flag = model.map(|m| format!(" --model {m}")).unwrap_or_default();
            format!("cat {path} | claude{model_flag} -p -")
        }
        AiCli::Codex => format!("cat {path} | codex exec -"),
        AiCli::Gemini => format!("cat {path} | gemini"),
        AiCli::Cursor => format!("cat {path} | cursor-agent"),
    }
}

pub struct TaskDispatcher<'a> {
    pub tmux: &'a TmuxClient,
    pub enable_worktree: bool,
}

impl<'a> TaskDispatcher<'a> {
    /// Dispatch to a Worker: resolve its slot, optionally stand up a fresh
    /// worktree, write the instruction file alongside it, and send the
    /// AI-CLI bootstrap command into its pane.
    pub async fn send_to_worker(
        &self,
        agent: &mut Agent,
        request: &SendTaskRequest,
        task_dir: &Path,
        repo_path: &str,
    ) -> Result<SendTaskResult> {
        if agent.role != Role::Worker {
            return Err(AgentmuxError::argument("agent.role", agent.role.as_str(), "worker"));
        }
        let placement = agent
            .placement
            .clone()
            .ok_or_else(|| AgentmuxError::Other(format!("agent {} has no tmux pane placement", agent.agent_id)))?;
        let worker_no = agent.worker_index().unwrap_or(1);

        let mut branch_name = request.branch_name.clone();
        let mut worktree_path = agent.worktree_path.clone();

        if self.enable_worktree {
            let generated = branch_name.unwrap_or_else(|| generate_worker_branch_name(&request.session_id, worker_no));
            let base_branch = "main";
            let wt_path = format!("{repo_path}/.worktrees/{worker_no}-{}", request.session_id);
            git::create_worktree(repo_path, &wt_path, &generated).await?;
            let _ = base_branch;
            agent.worktree_path = Some(wt_path.clone());
            agent.working_dir = Some(wt_path.clone());
            worktree_path = Some(wt_path);
            branch_name = Some(generated);
        }

        std::fs::create_dir_all(task_dir)?;
        let task_file = task_dir.join(format!("{}.md", request.session_id));
        std::fs::write(&task_file, &request.task_content)?;

        let command = ai_cli_bootstrap_command(agent.ai_cli.unwrap_or(AiCli::Claude), &task_file, None);
        self.tmux
            .send_keys_with_retry(&placement.session_name, placement.window_index, placement.pane_index, &command)
            .await?;

        agent.current_task = Some(request.session_id.clone());
        agent.status = crate::domain::AgentStatus::Busy;
        agent.touch();

        Ok(SendTaskResult {
            success: true,
            command_sent: Some(command),
            dispatch_mode: DispatchMode::Worker,
            branch_name,
            worktree_path,
            task_file: Some(task_file),
        })
    }

    /// Dispatch to an Admin: optionally auto-enhance the plan text, write
    /// the task file to a session-scoped directory, and send the stdin
    /// bootstrap command.
    pub async fn send_to_admin(
        &self,
        agent: &Agent,
        request: &SendTaskRequest,
        task_dir: &Path,
        worker_count: u32,
        model: Option<&str>,
    ) -> Result<SendTaskResult> {
        if agent.role != Role::Admin {
            return Err(AgentmuxError::argument("agent.role", agent.role.as_str(), "admin"));
        }
        let placement = agent
            .placement
            .clone()
            .ok_or_else(|| AgentmuxError::Other(format!("agent {} has no tmux pane placement", agent.agent_id)))?;

        let branch_name = request
            .branch_name
            .clone()
            .unwrap_or_else(|| admin_default_branch_name(&request.session_id));

        let content = if request.auto_enhance {
            compose_admin_task(&request.task_content, &branch_name, worker_count)
        } else {
            request.task_content.clone()
        };

        std::fs::create_dir_all(task_dir)?;
        let task_file = task_dir.join(format!("{}.md", request.session_id));
        std::fs::write(&task_file, &content)?;

        let command = ai_cli_bootstrap_command(agent.ai_cli.unwrap_or(AiCli::Claude), &task_file, model);
        self.tmux
            .send_keys_with_retry(&placement.session_name, placement.window_index, placement.pane_index, &command)
            .await?;

        Ok(SendTaskResult {
            success: true,
            command_sent: Some(command),
            dispatch_mode: DispatchMode::AdminFile,
            branch_name: Some(branch_name),
            worktree_path: None,
            task_file: Some(task_file),
        })
    }
}

/// Wraps the Owner's plan text with the branch name and Worker-count
/// parameter drawn from the active model profile, the way
/// `generate_admin_task` augments a plan with Worker-management
/// instructions in the original.
fn compose_admin_task(plan_content: &str, branch_name: &str, worker_count: u32) -> String {
    format!(
        "# Task Plan\n\n\
        Branch: `{branch_name}`\n\
        Available workers: {worker_count}\n\n\
        ---\n\n\
        {plan_content}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_sanitizes_and_includes_nonce() {
        let name = generate_worker_branch_name("Issue #94!", 2);
        assert!(name.starts_with("feature/Issue-94-worker-2-"));
        assert_eq!(name.len(), "feature/Issue-94-worker-2-".len() + 6);
    }

    #[test]
    fn branch_name_falls_back_to_task_when_session_id_has_no_safe_chars() {
        let name = generate_worker_branch_name("###", 1);
        assert!(name.starts_with("feature/task-worker-1-"));
    }

    #[test]
    fn admin_default_branch_name_uses_session_id_directly() {
        assert_eq!(admin_default_branch_name("94"), "feature/94");
    }

    #[test]
    fn compose_admin_task_includes_branch_and_worker_count() {
        let composed = compose_admin_task("do the thing", "feature/94", 3);
        assert!(composed.contains("feature/94"));
        assert!(composed.contains("3"));
        assert!(composed.contains("do the thing"));
    }
}
