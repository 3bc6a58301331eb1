//! Agent tools (spec §6 "Agents"): thin wrappers around
//! [`crate::registry::AgentRegistry`] and the IPC bus's inbox registration.

use serde_json::{json, Value};

use crate::domain::{Agent, AiCli, PanePlacement, Role};
use crate::error::{AgentmuxError, Result};

use super::{bool_arg, guard, ok, required_str, str_arg, u64_arg, ToolCall, ToolContext};

fn agent_json(agent: &Agent) -> Value {
    serde_json::to_value(agent).unwrap_or(Value::Null)
}

fn placement_from_args(args: &Value) -> Option<PanePlacement> {
    let session_name = str_arg(args, "session_name")?.to_string();
    let window_index = u64_arg(args, "window_index").unwrap_or(0) as u32;
    let pane_index = u64_arg(args, "pane_index").unwrap_or(0) as u32;
    Some(PanePlacement {
        session_name,
        window_index,
        pane_index,
    })
}

pub async fn create_agent(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agent_id = required_str(&call.args, "agent_id")?;
    let role = Role::parse(required_str(&call.args, "role")?)?;

    let mut agent = Agent::new(agent_id, role);
    agent.placement = placement_from_args(&call.args);
    if let Some(ai_cli) = str_arg(&call.args, "ai_cli") {
        agent.ai_cli = Some(AiCli::parse(ai_cli)?);
    }
    if let Some(working_dir) = str_arg(&call.args, "working_dir") {
        agent.working_dir = Some(working_dir.to_string());
    }

    ctx.registry.save_agent_to_file(&agent)?;
    ctx.ipc.register_agent(agent_id)?;
    ctx.dashboard.upsert_agent(agent.clone())?;

    Ok(ok(json!({ "agent": agent_json(&agent) })))
}

/// Spin up `count` Worker agents sharing one tmux session, placed
/// consecutively starting at `(window_index=0, pane_index=1)` so
/// [`Agent::worker_index`] assigns them slots 1..=count.
pub async fn create_workers_batch(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let session_name = required_str(&call.args, "session_name")?;
    let count = u64_arg(&call.args, "count").unwrap_or(1).max(1) as u32;
    if count > ctx.settings.max_workers {
        return Err(AgentmuxError::argument(
            "count",
            count.to_string(),
            format!("<= MCP_MAX_WORKERS ({})", ctx.settings.max_workers),
        ));
    }
    let ai_cli = match str_arg(&call.args, "ai_cli") {
        Some(v) => Some(AiCli::parse(v)?),
        None => None,
    };

    let mut created = Vec::with_capacity(count as usize);
    for n in 1..=count {
        let agent_id = format!("worker-{n}");
        let mut agent = Agent::new(&agent_id, Role::Worker);
        agent.placement = Some(PanePlacement {
            session_name: session_name.to_string(),
            window_index: 0,
            pane_index: n,
        });
        agent.ai_cli = ai_cli;
        ctx.registry.save_agent_to_file(&agent)?;
        ctx.ipc.register_agent(&agent_id)?;
        ctx.dashboard.upsert_agent(agent.clone())?;
        created.push(agent_json(&agent));
    }

    Ok(ok(json!({ "agents": created })))
}

pub async fn list_agents(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agents = ctx.registry.list_all()?;
    Ok(ok(json!({ "agents": agents.iter().map(agent_json).collect::<Vec<_>>() })))
}

pub async fn get_agent_status(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    let agent_id = required_str(&call.args, "agent_id")?;
    guard(ctx, call, Some(agent_id))?;
    let agent = ctx.registry.get(agent_id)?;
    Ok(ok(json!({ "agent": agent_json(&agent) })))
}

pub async fn terminate_agent(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agent_id = required_str(&call.args, "agent_id")?;
    let kill_session = bool_arg(&call.args, "kill_session", false);

    let mut agent = ctx.registry.get(agent_id)?;
    agent.status = crate::domain::AgentStatus::Terminated;
    agent.current_task = None;
    agent.touch();
    ctx.registry.save_agent_to_file(&agent)?;
    ctx.dashboard.upsert_agent(agent.clone())?;

    if kill_session {
        if let Some(placement) = &agent.placement {
            if ctx.tmux.session_exists(&placement.session_name).await {
                ctx.tmux.kill_session(&placement.session_name).await?;
            }
        }
    }

    Ok(ok(json!({ "agent_id": agent_id, "status": agent.status })))
}

pub async fn register_agent_to_ipc(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let agent_id = required_str(&call.args, "agent_id")?;
    ctx.ipc.register_agent(agent_id)?;
    Ok(ok(json!({ "agent_id": agent_id })))
}
