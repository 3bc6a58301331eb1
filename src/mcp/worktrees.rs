//! Worktree tools (spec §6 "Worktree"): direct wrappers around
//! [`crate::git`]'s worktree lifecycle plus the merge helper.

use serde_json::{json, Value};

use crate::error::{AgentmuxError, Result};
use crate::git::{self, MergeStrategy};

use super::{guard, ok, required_str, str_arg, ToolCall, ToolContext};

pub async fn create_worktree(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let worktree_path = required_str(&call.args, "worktree_path")?;
    let branch = required_str(&call.args, "branch")?;
    git::create_worktree(&ctx.repo_path, worktree_path, branch).await?;
    Ok(ok(json!({ "worktree_path": worktree_path, "branch": branch })))
}

pub async fn remove_worktree(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let worktree_path = required_str(&call.args, "worktree_path")?;
    git::remove_worktree(&ctx.repo_path, worktree_path).await?;
    Ok(ok(json!({ "worktree_path": worktree_path })))
}

pub async fn list_worktrees(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let worktrees = git::list_worktrees(&ctx.repo_path).await?;
    Ok(ok(json!({ "worktrees": worktrees })))
}

pub async fn assign_worktree(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agent_id = required_str(&call.args, "agent_id")?;
    let worktree_path = required_str(&call.args, "worktree_path")?;
    let mut agent = ctx.registry.get(agent_id)?;
    agent.worktree_path = Some(worktree_path.to_string());
    agent.working_dir = Some(worktree_path.to_string());
    agent.touch();
    ctx.registry.save_agent_to_file(&agent)?;
    ctx.dashboard.upsert_agent(agent)?;
    Ok(ok(json!({ "agent_id": agent_id, "worktree_path": worktree_path })))
}

pub async fn get_worktree_status(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let branch = required_str(&call.args, "branch")?;
    let exists = git::branch_exists(&ctx.repo_path, branch).await;
    let merged = git::is_branch_merged_into(&ctx.repo_path, branch, &ctx.current_head_branch).await;
    Ok(ok(json!({ "branch": branch, "branch_exists": exists, "merged": merged })))
}

pub async fn merge_completed_tasks(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let base_branch = str_arg(&call.args, "base_branch").unwrap_or(&ctx.current_head_branch);
    let strategy = str_arg(&call.args, "strategy")
        .map(MergeStrategy::parse)
        .transpose()?
        .unwrap_or(MergeStrategy::Merge);

    let tasks = ctx.dashboard.list_tasks()?;
    let branches: Vec<String> = tasks
        .iter()
        .filter(|t| t.status == crate::domain::TaskStatus::Completed)
        .filter_map(|t| t.branch.clone())
        .collect();
    if branches.is_empty() {
        return Err(AgentmuxError::Other("no completed task has a branch to merge".to_string()));
    }

    let report = git::merge_completed_tasks(std::path::Path::new(&ctx.repo_path), base_branch, &branches, strategy).await?;

    Ok(ok(json!({
        "success": report.success(),
        "summary": report.summary(),
        "merged": report.merged,
        "already_merged": report.already_merged,
        "failed": report.failed,
        "conflicts": report.conflicts,
    })))
}
