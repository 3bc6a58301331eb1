//! Dispatch tools (spec §4.H / §6 "Dispatch"): `send_task` drives the full
//! Task Dispatcher; `send_command`/`get_output`/`broadcast_command` are the
//! lower-level tmux primitives it's built from, exposed directly for
//! ad-hoc use; `open_session` just confirms a pane exists.

use std::path::Path;

use serde_json::{json, Value};

use crate::dispatch::{DispatchMode, SendTaskRequest, TaskDispatcher};
use crate::error::{AgentmuxError, Result};

use super::{bool_arg, guard, ok, required_str, str_arg, u64_arg, ToolCall, ToolContext};

fn dispatch_mode_str(mode: DispatchMode) -> &'static str {
    match mode {
        DispatchMode::Worker => "worker",
        DispatchMode::AdminFile => "admin_file",
        DispatchMode::None => "none",
    }
}

pub async fn send_task(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agent_id = required_str(&call.args, "agent_id")?;
    let task_content = required_str(&call.args, "task_content")?;
    let session_id = required_str(&call.args, "session_id")?;
    let auto_enhance = bool_arg(&call.args, "auto_enhance", true);
    let branch_name = str_arg(&call.args, "branch_name").map(str::to_string);

    let mut agent = ctx.registry.get(agent_id)?;
    let dispatcher = TaskDispatcher {
        tmux: &ctx.tmux,
        enable_worktree: ctx.settings.enable_worktree,
    };
    let request = SendTaskRequest {
        task_content: task_content.to_string(),
        session_id: session_id.to_string(),
        auto_enhance,
        branch_name,
    };
    let task_dir = Path::new(&ctx.repo_path).join(".multi-agent-mcp").join(session_id).join("tasks");

    let result = match agent.role {
        crate::domain::Role::Worker => dispatcher.send_to_worker(&mut agent, &request, &task_dir, &ctx.repo_path).await?,
        crate::domain::Role::Admin => {
            let worker_count = ctx.registry.list_by_role(crate::domain::Role::Worker)?.len() as u32;
            let model = Some(ctx.settings.active_model_profile().admin_model.as_str());
            dispatcher.send_to_admin(&agent, &request, &task_dir, worker_count, model).await?
        }
        crate::domain::Role::Owner => {
            return Err(AgentmuxError::argument("agent.role", "owner", "worker, admin"));
        }
    };

    ctx.registry.save_agent_to_file(&agent)?;
    ctx.dashboard.upsert_agent(agent.clone())?;

    Ok(ok(json!({
        "command_sent": result.command_sent,
        "dispatch_mode": dispatch_mode_str(result.dispatch_mode),
        "branch_name": result.branch_name,
        "worktree_path": result.worktree_path,
        "task_file": result.task_file.map(|p| p.to_string_lossy().into_owned()),
    })))
}

pub async fn send_command(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agent_id = required_str(&call.args, "agent_id")?;
    let command = required_str(&call.args, "command")?;
    let agent = ctx.registry.get(agent_id)?;
    let placement = agent
        .placement
        .ok_or_else(|| AgentmuxError::Other(format!("agent {agent_id} has no tmux pane placement")))?;
    ctx.tmux
        .send_keys_with_retry(&placement.session_name, placement.window_index, placement.pane_index, command)
        .await?;
    Ok(ok(json!({ "agent_id": agent_id, "command_sent": command })))
}

pub async fn get_output(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    let agent_id = required_str(&call.args, "agent_id")?;
    guard(ctx, call, Some(agent_id))?;
    let agent = ctx.registry.get(agent_id)?;
    let placement = agent
        .placement
        .ok_or_else(|| AgentmuxError::Other(format!("agent {agent_id} has no tmux pane placement")))?;
    let output = ctx.tmux.capture_pane(&placement.session_name, placement.window_index, placement.pane_index).await?;
    Ok(ok(json!({ "agent_id": agent_id, "output": output })))
}

pub async fn broadcast_command(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let command = required_str(&call.args, "command")?;
    let role_filter = str_arg(&call.args, "role").map(crate::domain::Role::parse).transpose()?;

    let mut sent_to = Vec::new();
    for agent in ctx.registry.list_all()? {
        if let Some(filter) = role_filter {
            if agent.role != filter {
                continue;
            }
        }
        let Some(placement) = &agent.placement else { continue };
        if ctx
            .tmux
            .send_keys_with_retry(&placement.session_name, placement.window_index, placement.pane_index, command)
            .await
            .is_ok()
        {
            sent_to.push(agent.agent_id);
        }
    }

    Ok(ok(json!({ "command": command, "sent_to": sent_to })))
}

pub async fn open_session(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let session_name = required_str(&call.args, "session_name")?;
    let window_index = u64_arg(&call.args, "window_index").unwrap_or(0) as u32;
    let working_dir = str_arg(&call.args, "working_dir").unwrap_or(&ctx.repo_path);

    if !ctx.tmux.session_exists(session_name).await {
        ctx.tmux.new_session(session_name, working_dir).await?;
    } else if window_index > 0 {
        ctx.tmux.new_window(session_name, window_index, working_dir).await?;
    }

    Ok(ok(json!({ "session_name": session_name, "window_index": window_index })))
}
