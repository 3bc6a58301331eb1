//! Task tools (spec §6 "Tasks"): thin argument-marshalling wrappers around
//! [`crate::dashboard::DashboardStore`]'s task operations.

use serde_json::{json, Value};

use crate::domain::{ChecklistItem, Task, TaskStatus};
use crate::error::{AgentmuxError, Result};

use super::{guard, ok, required_str, str_arg, u64_arg, ToolCall, ToolContext};

fn task_json(task: &Task) -> Value {
    serde_json::to_value(task).unwrap_or(Value::Null)
}

pub async fn create_task(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let task_id = required_str(&call.args, "task_id")?;
    let title = required_str(&call.args, "title")?;
    let mut task = Task::new(task_id, title);
    if let Some(description) = str_arg(&call.args, "description") {
        task.description = Some(description.to_string());
    }
    if let Some(branch) = str_arg(&call.args, "branch") {
        task.branch = Some(branch.to_string());
    }
    if let Some(metadata) = call.args.get("metadata").and_then(Value::as_object) {
        for (k, v) in metadata {
            task.metadata.insert(k.clone(), v.clone());
        }
    }
    let created = ctx.dashboard.create_task(task)?;
    Ok(ok(json!({ "task": task_json(&created) })))
}

pub async fn update_task_status(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let task_id = required_str(&call.args, "task_id")?;
    let status = TaskStatus::parse(required_str(&call.args, "status")?)?;
    let progress = u64_arg(&call.args, "progress").map(|p| p.min(100) as u8);
    let task = ctx.dashboard.update_task_status(task_id, status, progress)?;
    Ok(ok(json!({ "task": task_json(&task) })))
}

pub async fn reopen_task(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let task_id = required_str(&call.args, "task_id")?;
    let reset_progress = super::bool_arg(&call.args, "reset_progress", true);
    let task = ctx.dashboard.reopen_task(task_id, reset_progress)?;
    Ok(ok(json!({ "task": task_json(&task) })))
}

pub async fn assign_task_to_agent(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let task_id = required_str(&call.args, "task_id")?;
    let agent_id = required_str(&call.args, "agent_id")?;

    // §8 invariant 2: assigning to a new agent clears the previous
    // assignee's `current_task` iff it matched this task.
    let previous = ctx.dashboard.get_task(task_id).ok().and_then(|t| t.assigned_agent_id);
    let branch = str_arg(&call.args, "branch");

    let task = ctx.dashboard.assign_task(task_id, agent_id, branch)?;

    if let Ok(mut agent) = ctx.registry.get(agent_id) {
        agent.current_task = Some(task.id.clone());
        agent.status = crate::domain::AgentStatus::Busy;
        agent.touch();
        ctx.registry.save_agent_to_file(&agent)?;
    }
    if let Some(previous_id) = previous {
        if previous_id != agent_id {
            if let Ok(mut prev_agent) = ctx.registry.get(&previous_id) {
                if prev_agent.current_task.as_deref() == Some(task.id.as_str()) {
                    prev_agent.current_task = None;
                    prev_agent.touch();
                    ctx.registry.save_agent_to_file(&prev_agent)?;
                }
            }
        }
    }

    Ok(ok(json!({ "task": task_json(&task) })))
}

pub async fn list_tasks(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let tasks = ctx.dashboard.list_tasks()?;
    Ok(ok(json!({ "tasks": tasks.iter().map(task_json).collect::<Vec<_>>() })))
}

pub async fn get_task(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let task_id = required_str(&call.args, "task_id")?;
    let task = ctx.dashboard.get_task(task_id)?;
    Ok(ok(json!({ "task": task_json(&task) })))
}

pub async fn remove_task(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let task_id = required_str(&call.args, "task_id")?;
    ctx.dashboard.remove_task(task_id)?;
    Ok(ok(json!({ "task_id": task_id })))
}

/// Workers report progress/completion by sending themselves an IPC message
/// of the matching type, so the Auto-Reconciler is the single place that
/// applies it to the dashboard (spec §4.J); these two tools are a
/// convenience wrapper that does `send_message` + local reconciliation in
/// one call rather than requiring the Worker to also call `read_messages`.
pub async fn report_task_progress(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let caller = call
        .caller_agent_id
        .as_deref()
        .ok_or_else(|| AgentmuxError::argument("caller_agent_id", "", "a registered agent id"))?;
    let task_id = required_str(&call.args, "task_id")?;
    let progress = u64_arg(&call.args, "progress").map(|p| p.min(100) as u8);
    let checklist: Vec<ChecklistItem> = call
        .args
        .get("checklist")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(ChecklistItem {
                        text: item.get("text")?.as_str()?.to_string(),
                        completed: item.get("completed").and_then(Value::as_bool).unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let admin = ctx
        .registry
        .unique_admin()?
        .ok_or_else(|| AgentmuxError::routing("no unique admin registered to receive the progress report"))?;

    let metadata = json!({
        "task_id": task_id,
        "progress": progress,
        "checklist": checklist,
    });
    let outcome = ctx.ipc.send_message(crate::ipc::SendMessageRequest {
        sender_id: caller.to_string(),
        caller_agent_id: caller.to_string(),
        receiver_id: Some(admin.agent_id.clone()),
        message_type: crate::domain::MessageType::TaskProgress,
        subject: format!("progress: {task_id}"),
        content: call.args.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
        metadata,
    })?;

    Ok(ok(json!({ "message_id": outcome.message.id })))
}

pub async fn report_task_completion(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let caller = call
        .caller_agent_id
        .as_deref()
        .ok_or_else(|| AgentmuxError::argument("caller_agent_id", "", "a registered agent id"))?;
    let task_id = required_str(&call.args, "task_id")?;
    let failed = super::bool_arg(&call.args, "failed", false);

    let admin = ctx
        .registry
        .unique_admin()?
        .ok_or_else(|| AgentmuxError::routing("no unique admin registered to receive the completion report"))?;

    let message_type = if failed {
        crate::domain::MessageType::TaskFailed
    } else {
        crate::domain::MessageType::TaskComplete
    };
    let content = call.args.get("message").and_then(Value::as_str).unwrap_or("").to_string();

    let metadata = json!({ "task_id": task_id });
    let outcome = ctx.ipc.send_message(crate::ipc::SendMessageRequest {
        sender_id: caller.to_string(),
        caller_agent_id: caller.to_string(),
        receiver_id: Some(admin.agent_id.clone()),
        message_type,
        subject: format!("{}: {task_id}", if failed { "failed" } else { "complete" }),
        content,
        metadata,
    })?;

    Ok(ok(json!({ "message_id": outcome.message.id })))
}
