//! Tool dispatcher (spec §6 "Tool surface"): one `ToolContext` aggregating
//! every component built in the modules above, and one `dispatch` entry
//! point per tool name. Every handler runs the guard check first, then
//! does its work, then is converted to the `{success, error, next_action,
//! …}` response shape spec'd in §7 by [`ok`]/[`err_response`]. No
//! subordinate error ever escapes `dispatch` as a Rust `Err` — the point of
//! this module is to be the one place that turns `AgentmuxError` into JSON.

mod agents;
mod commands;
mod cost;
mod dashboard;
mod ipc;
mod session;
mod tasks;
mod worktrees;

use std::path::PathBuf;

use serde_json::{json, Value};

use crate::config::Settings;
use crate::dashboard::DashboardStore;
use crate::error::{AgentmuxError, Result};
use crate::guard::{self, PermissionCheck};
use crate::ipc::IpcBus;
use crate::notify::NotifyDispatcher;
use crate::polling::PollingState;
use crate::registry::AgentRegistry;
use crate::tmux::TmuxClient;

/// Everything a tool handler needs, for one workspace/session. Built once
/// per `init_tmux_workspace` and handed to every subsequent tool call for
/// that session.
#[derive(Clone)]
pub struct ToolContext {
    pub settings: std::sync::Arc<Settings>,
    pub registry: AgentRegistry,
    pub dashboard: std::sync::Arc<DashboardStore>,
    pub ipc: std::sync::Arc<IpcBus>,
    pub polling: std::sync::Arc<PollingState>,
    pub tmux: TmuxClient,
    pub notify: std::sync::Arc<NotifyDispatcher>,
    pub repo_path: String,
    pub current_head_branch: String,
}

impl ToolContext {
    pub fn new(mcp_dir: PathBuf, workspace_id: impl Into<String>, repo_path: impl Into<String>, settings: Settings) -> Self {
        let workspace_id = workspace_id.into();
        let repo_path = repo_path.into();
        let registry = AgentRegistry::new(mcp_dir.join("agents"));
        let dashboard = DashboardStore::new(&mcp_dir.join("dashboard"), &workspace_id, &repo_path);
        let ipc = IpcBus::new(mcp_dir.join("ipc"), registry.clone());
        let tmux = TmuxClient::default();
        Self {
            settings: std::sync::Arc::new(settings),
            registry,
            dashboard: std::sync::Arc::new(dashboard),
            ipc: std::sync::Arc::new(ipc),
            polling: std::sync::Arc::new(PollingState::new()),
            tmux: tmux.clone(),
            notify: std::sync::Arc::new(NotifyDispatcher::new(tmux)),
            repo_path,
            current_head_branch: "main".to_string(),
        }
    }
}

/// Every tool call arrives with `caller_agent_id` plus tool-specific named
/// arguments collapsed into one JSON object (spec §6).
pub struct ToolCall {
    pub tool_name: String,
    pub caller_agent_id: Option<String>,
    pub args: Value,
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    str_arg(args, key).ok_or_else(|| AgentmuxError::argument(key, "", "a required string argument"))
}

fn bool_arg(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn u64_arg(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

/// Wrap a successful handler result into `{success: true, ...fields}`.
/// `fields` must serialize to a JSON object.
pub fn ok(fields: Value) -> Value {
    let mut body = json!({ "success": true });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), fields.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    body
}

/// Turn an `AgentmuxError` into the `{success: false, error, next_action?}`
/// shape spec'd in §7. The quality gate carries its own richer `gate`
/// payload and is handled by the caller before this generic fallback runs.
pub fn err_response(error: AgentmuxError) -> Value {
    match &error {
        AgentmuxError::PollingBlocked { message, next_action } => json!({
            "success": false,
            "error": message,
            "next_action": next_action,
        }),
        AgentmuxError::Permission { tool, role } => json!({
            "success": false,
            "error": error.to_string(),
            "next_action": "get_role_guide",
            "tool": tool,
            "role": role,
        }),
        _ => json!({
            "success": false,
            "error": error.to_string(),
        }),
    }
}

fn guard(ctx: &ToolContext, call: &ToolCall, target_agent_id: Option<&str>) -> Result<crate::domain::Role> {
    guard::check_permission(
        &ctx.registry,
        PermissionCheck {
            tool_name: &call.tool_name,
            caller_agent_id: call.caller_agent_id.as_deref(),
            target_agent_id,
        },
    )
}

/// Route one tool call to its handler and always return a JSON response —
/// never a Rust `Result` — matching the "no exception escapes the
/// transport" propagation policy (spec §7).
pub async fn dispatch(ctx: &ToolContext, call: ToolCall) -> Value {
    let result = route(ctx, &call).await;
    match result {
        Ok(value) => value,
        Err(e) => err_response(e),
    }
}

async fn route(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    match call.tool_name.as_str() {
        // Session
        "init_tmux_workspace" => session::init_tmux_workspace(ctx, call).await,
        "cleanup_workspace" => session::cleanup_workspace(ctx, call).await,
        "cleanup_on_completion" => session::cleanup_on_completion(ctx, call).await,
        "check_all_tasks_completed" => session::check_all_tasks_completed(ctx, call).await,
        "unlock_owner_wait" => session::unlock_owner_wait(ctx, call).await,

        // Agents
        "create_agent" => agents::create_agent(ctx, call).await,
        "create_workers_batch" => agents::create_workers_batch(ctx, call).await,
        "list_agents" => agents::list_agents(ctx, call).await,
        "get_agent_status" => agents::get_agent_status(ctx, call).await,
        "terminate_agent" => agents::terminate_agent(ctx, call).await,
        "register_agent_to_ipc" => agents::register_agent_to_ipc(ctx, call).await,

        // Tasks
        "create_task" => tasks::create_task(ctx, call).await,
        "update_task_status" => tasks::update_task_status(ctx, call).await,
        "reopen_task" => tasks::reopen_task(ctx, call).await,
        "assign_task_to_agent" => tasks::assign_task_to_agent(ctx, call).await,
        "list_tasks" => tasks::list_tasks(ctx, call).await,
        "get_task" => tasks::get_task(ctx, call).await,
        "remove_task" => tasks::remove_task(ctx, call).await,
        "report_task_progress" => tasks::report_task_progress(ctx, call).await,
        "report_task_completion" => tasks::report_task_completion(ctx, call).await,

        // Dispatch
        "send_task" => commands::send_task(ctx, call).await,
        "send_command" => commands::send_command(ctx, call).await,
        "get_output" => commands::get_output(ctx, call).await,
        "broadcast_command" => commands::broadcast_command(ctx, call).await,
        "open_session" => commands::open_session(ctx, call).await,

        // IPC
        "send_message" => ipc::send_message(ctx, call).await,
        "read_messages" => ipc::read_messages(ctx, call).await,
        "get_unread_count" => ipc::get_unread_count(ctx, call).await,

        // Worktree
        "create_worktree" => worktrees::create_worktree(ctx, call).await,
        "remove_worktree" => worktrees::remove_worktree(ctx, call).await,
        "list_worktrees" => worktrees::list_worktrees(ctx, call).await,
        "assign_worktree" => worktrees::assign_worktree(ctx, call).await,
        "get_worktree_status" => worktrees::get_worktree_status(ctx, call).await,
        "merge_completed_tasks" => worktrees::merge_completed_tasks(ctx, call).await,

        // Dashboard
        "get_dashboard" => dashboard::get_dashboard(ctx, call).await,
        "get_dashboard_summary" => dashboard::get_dashboard_summary(ctx, call).await,

        // Cost
        "get_cost_estimate" => cost::get_cost_estimate(ctx, call).await,
        "record_api_call" => cost::record_api_call(ctx, call).await,
        "get_cost_summary" => cost::get_cost_summary(ctx, call).await,
        "set_cost_warning_threshold" => cost::set_cost_warning_threshold(ctx, call).await,
        "reset_cost_counter" => cost::reset_cost_counter(ctx, call).await,

        other => Err(AgentmuxError::Permission {
            tool: other.to_string(),
            role: call
                .caller_agent_id
                .as_deref()
                .map(|id| ctx.registry.role_of(id).map(|r| r.as_str().to_string()).unwrap_or_default())
                .unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Agent, Role};
    use tempfile::tempdir;

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempdir().unwrap();
        let mut settings = Settings::load();
        settings.quality_gate_strict = false;
        let ctx = ToolContext::new(dir.path().join(".multi-agent-mcp/94"), "94", dir.path().to_string_lossy().to_string(), settings);
        ctx.registry.save_agent_to_file(&Agent::new("owner-1", Role::Owner)).unwrap();
        ctx.ipc.register_agent("owner-1").unwrap();
        (dir, ctx)
    }

    #[tokio::test]
    async fn unknown_tool_name_is_a_permission_error() {
        let (_dir, ctx) = ctx();
        let response = dispatch(
            &ctx,
            ToolCall {
                tool_name: "not_a_real_tool".into(),
                caller_agent_id: Some("owner-1".into()),
                args: json!({}),
            },
        )
        .await;
        assert_eq!(response["success"], false);
    }

    #[tokio::test]
    async fn create_task_then_list_tasks_round_trips() {
        let (_dir, ctx) = ctx();
        let created = dispatch(
            &ctx,
            ToolCall {
                tool_name: "create_task".into(),
                caller_agent_id: Some("owner-1".into()),
                args: json!({"task_id": "t1", "title": "Ship it"}),
            },
        )
        .await;
        assert_eq!(created["success"], true);

        let listed = dispatch(
            &ctx,
            ToolCall {
                tool_name: "list_tasks".into(),
                caller_agent_id: Some("owner-1".into()),
                args: json!({}),
            },
        )
        .await;
        assert_eq!(listed["tasks"].as_array().unwrap().len(), 1);
    }
}
