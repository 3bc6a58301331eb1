//! Dashboard tools (spec §6 "Dashboard"). Owner/Admin dashboard reads also
//! run the polling-suppression checks from §4.G.

use serde_json::{json, Value};

use crate::error::Result;

use super::{guard, ok, ToolCall, ToolContext};

pub async fn get_dashboard(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    if let Some(caller) = &call.caller_agent_id {
        match ctx.registry.role_of(caller) {
            Ok(crate::domain::Role::Owner) => ctx.polling.check_owner_dashboard_read(caller)?,
            Ok(crate::domain::Role::Admin) => ctx.polling.check_admin_dashboard_read(caller)?,
            _ => {}
        }
    }
    let dashboard = ctx.dashboard.read()?;
    Ok(ok(json!({
        "workspace_id": dashboard.workspace_id,
        "workspace_path": dashboard.workspace_path,
        "agents": dashboard.agents,
        "tasks": dashboard.tasks,
        "cost": dashboard.cost,
    })))
}

pub async fn get_dashboard_summary(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    if let Some(caller) = &call.caller_agent_id {
        match ctx.registry.role_of(caller) {
            Ok(crate::domain::Role::Owner) => ctx.polling.check_owner_dashboard_read(caller)?,
            Ok(crate::domain::Role::Admin) => ctx.polling.check_admin_dashboard_read(caller)?,
            _ => {}
        }
    }
    let dashboard = ctx.dashboard.read()?;
    Ok(ok(json!({
        "total_agents": dashboard.total_agents(),
        "active_agents": dashboard.active_agents(),
        "total_tasks": dashboard.total_tasks(),
        "completed_tasks": dashboard.completed_tasks(),
        "failed_tasks": dashboard.failed_tasks(),
    })))
}
