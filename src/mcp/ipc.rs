//! IPC tools (spec §4.D/§4.G/§4.I/§4.J): `send_message` runs the
//! Completion Quality Gate before an admin→owner `task_complete` actually
//! goes out; `read_messages`/`get_unread_count` run the polling-suppression
//! checks first and, for an Admin reading its own inbox, the
//! Auto-Reconciler afterwards.

use serde_json::{json, Value};

use crate::domain::{Message, MessagePriority, MessageType, Role};
use crate::error::{AgentmuxError, Result};
use crate::quality_gate;
use crate::reconcile;

use super::{bool_arg, guard, ok, required_str, str_arg, ToolCall, ToolContext};

fn message_json(message: &Message) -> Value {
    serde_json::to_value(message).unwrap_or(Value::Null)
}

fn gate_response(report: &crate::quality_gate::GateReport, ctx: &ToolContext) -> Value {
    json!({
        "success": false,
        "next_action": "replan_and_reassign",
        "gate": {
            "status": "needs_replan",
            "reasons": report.reasons,
            "suggestions": report.suggestions,
            "quality_limits": {
                "max_iterations": ctx.settings.quality_check_max_iterations,
                "same_issue_limit": ctx.settings.quality_check_same_issue_limit,
            },
            "branch_integration": report.branch_integration.iter().map(|b| json!({
                "branch": b.branch,
                "merged": b.merged,
                "tree_equal_to_head": b.tree_equal_to_head,
                "changes_already_applied": b.changes_already_applied,
                "covered_by_diff": b.covered_by_diff,
                "branch_not_found": b.branch_not_found,
                "missing_files": b.missing_files,
                "error": b.error,
            })).collect::<Vec<_>>(),
        },
    })
}

pub async fn send_message(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let sender_id = required_str(&call.args, "sender_id")?;
    let caller_agent_id = call
        .caller_agent_id
        .as_deref()
        .ok_or_else(|| AgentmuxError::argument("caller_agent_id", "", "a registered agent id"))?;
    let receiver_id = str_arg(&call.args, "receiver_id").map(str::to_string);
    let message_type = MessageType::parse(required_str(&call.args, "type")?)?;
    let subject = required_str(&call.args, "subject")?;
    let content = required_str(&call.args, "content")?;
    let metadata = call.args.get("metadata").cloned().unwrap_or(Value::Null);
    let priority = str_arg(&call.args, "priority")
        .map(|p| match p {
            "low" => MessagePriority::Low,
            "high" => MessagePriority::High,
            "urgent" => MessagePriority::Urgent,
            _ => MessagePriority::Normal,
        })
        .unwrap_or(MessagePriority::Normal);

    if message_type == MessageType::TaskComplete {
        if let (Ok(sender_role), Some(target)) = (ctx.registry.role_of(sender_id), receiver_id.as_deref()) {
            if sender_role == Role::Admin && ctx.registry.role_of(target).ok() == Some(Role::Owner) {
                let dashboard = ctx.dashboard.read()?;
                let report = quality_gate::evaluate(&dashboard, &ctx.repo_path, &ctx.current_head_branch, ctx.settings.quality_gate_strict).await;
                if report.status_needs_replan {
                    return Ok(gate_response(&report, ctx));
                }
            }
        }
    }

    let outcome = ctx.ipc.send_message(crate::ipc::SendMessageRequest {
        sender_id: sender_id.to_string(),
        caller_agent_id: caller_agent_id.to_string(),
        receiver_id,
        message_type,
        subject: subject.to_string(),
        content: content.to_string(),
        metadata,
    })?;

    let mut message = outcome.message;
    message.priority = priority;
    ctx.dashboard.append_message(message.clone())?;

    Ok(ok(json!({
        "message": message_json(&message),
        "rerouted_receiver_id": outcome.rerouted_receiver_id,
    })))
}

pub async fn read_messages(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    let target_agent_id = required_str(&call.args, "agent_id")?;
    guard(ctx, call, Some(target_agent_id))?;
    let caller_agent_id = call
        .caller_agent_id
        .as_deref()
        .ok_or_else(|| AgentmuxError::argument("caller_agent_id", "", "a registered agent id"))?;
    let unread_only = bool_arg(&call.args, "unread_only", false);
    let mark_as_read = bool_arg(&call.args, "mark_as_read", true);
    let type_filter = str_arg(&call.args, "type").map(MessageType::parse).transpose()?;

    let caller_role = ctx.registry.role_of(caller_agent_id)?;
    let unread_count = ctx.ipc.get_unread_count(target_agent_id)?;

    match caller_role {
        Role::Owner => {
            ctx.polling.check_owner_read(caller_agent_id, target_agent_id, unread_count == 0)?;
        }
        Role::Admin => {
            ctx.polling.check_admin_poll(caller_agent_id, unread_count)?;
        }
        Role::Worker => {}
    }

    let messages = ctx.ipc.read_messages(target_agent_id, unread_only, type_filter, mark_as_read)?;

    let mut owner_wait_unlocked = false;
    if caller_role == Role::Owner && caller_agent_id == target_agent_id {
        let senders: Vec<String> = messages.iter().map(|m| m.sender_id.clone()).collect();
        owner_wait_unlocked = ctx.polling.maybe_clear_owner_wait_on_read(caller_agent_id, &senders);
    }

    let mut reconcile_outcome = None;
    if caller_role == Role::Admin && caller_agent_id == target_agent_id {
        let outcome = reconcile::reconcile_into_store(&ctx.dashboard, &messages)?;
        reconcile_outcome = Some(outcome);
    }

    let mut response = json!({
        "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        "count": messages.len(),
        "owner_wait_unlocked": owner_wait_unlocked,
    });
    if let Some(outcome) = reconcile_outcome {
        response["reconciled"] = json!({
            "applied": outcome.applied,
            "skipped": outcome.skipped.iter().map(|s| json!({
                "message_id": s.message_id,
                "reason": s.reason,
            })).collect::<Vec<_>>(),
        });
    }

    Ok(ok(response))
}

pub async fn get_unread_count(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    let target_agent_id = required_str(&call.args, "agent_id")?;
    guard(ctx, call, Some(target_agent_id))?;
    let caller_agent_id = call
        .caller_agent_id
        .as_deref()
        .ok_or_else(|| AgentmuxError::argument("caller_agent_id", "", "a registered agent id"))?;

    let count = ctx.ipc.get_unread_count(target_agent_id)?;

    if ctx.registry.role_of(caller_agent_id)? == Role::Admin {
        ctx.polling.check_admin_poll(caller_agent_id, count)?;
    }

    Ok(ok(json!({ "agent_id": target_agent_id, "unread_count": count })))
}
