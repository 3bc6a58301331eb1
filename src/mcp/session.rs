//! Session tools (spec §4.K / §6 "Session").

use serde_json::{json, Value};

use crate::error::Result;
use crate::session::{self, CompletionStatus};

use super::{bool_arg, guard, ok, required_str, str_arg, ToolCall, ToolContext};

pub async fn init_tmux_workspace(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let working_dir = required_str(&call.args, "working_dir")?;
    let session_id = required_str(&call.args, "session_id")?;
    let previous_session_id = str_arg(&call.args, "previous_session_id");
    let enable_git = bool_arg(&call.args, "enable_git", ctx.settings.enable_git);

    let init = session::init_tmux_workspace(&ctx.tmux, working_dir, session_id, previous_session_id, enable_git).await?;

    Ok(ok(json!({
        "session": init.session,
        "created": init.created,
        "renamed_from_legacy": init.renamed_from_legacy,
        "provisional_migration": {
            "executed": init.provisional_migration.executed,
            "from": init.provisional_migration.from,
            "to": init.provisional_migration.to,
        },
        "provisional_cleanup": {
            "removed_count": init.provisional_cleanup.removed_count,
            "removed_dirs": init.provisional_cleanup.removed_dirs,
        },
    })))
}

pub async fn cleanup_workspace(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agents = ctx.registry.list_all()?;
    let outcome = session::cleanup_workspace(&ctx.tmux, &agents).await?;
    Ok(ok(json!({
        "terminated_sessions": outcome.terminated_sessions,
        "cleared_agents": outcome.cleared_agents,
    })))
}

fn completion_status(ctx: &ToolContext) -> Result<CompletionStatus> {
    let tasks = ctx.dashboard.list_tasks()?;
    Ok(CompletionStatus {
        total_tasks: tasks.len(),
        pending_tasks: tasks.iter().filter(|t| t.status == crate::domain::TaskStatus::Pending).count(),
        in_progress_tasks: tasks.iter().filter(|t| t.status == crate::domain::TaskStatus::InProgress).count(),
        failed_tasks: tasks.iter().filter(|t| t.status == crate::domain::TaskStatus::Failed).count(),
    })
}

pub async fn cleanup_on_completion(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let force = bool_arg(&call.args, "force", false);
    let status = completion_status(ctx)?;
    let agents = ctx.registry.list_all()?;
    let outcome = session::cleanup_on_completion(&ctx.tmux, &agents, &status, force).await?;
    Ok(ok(json!({
        "terminated_sessions": outcome.terminated_sessions,
        "cleared_agents": outcome.cleared_agents,
        "was_forced": outcome.was_forced,
    })))
}

pub async fn check_all_tasks_completed(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let status = completion_status(ctx)?;
    Ok(ok(json!({
        "all_completed": status.is_all_completed(),
        "total_tasks": status.total_tasks,
        "pending_tasks": status.pending_tasks,
        "in_progress_tasks": status.in_progress_tasks,
        "failed_tasks": status.failed_tasks,
    })))
}

pub async fn unlock_owner_wait(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let owner_id = call.caller_agent_id.clone().unwrap_or_default();
    let reason = str_arg(&call.args, "reason").map(str::to_string);
    let reason = reason.unwrap_or_else(|| "manual_unlock".to_string());
    ctx.polling.unlock_owner_wait(&owner_id, Some(reason.clone()));
    Ok(ok(json!({
        "owner_id": owner_id,
        "waiting_after": false,
        "unlock_reason": reason,
    })))
}
