//! Cost tools (spec §6 "Cost"): estimate/summary reads plus the Owner-only
//! warning-threshold and counter-reset mutations.

use serde_json::{json, Value};

use crate::dashboard::cost::RecordApiCallInput;
use crate::domain::AiCli;
use crate::error::Result;

use super::{guard, ok, str_arg, ToolCall, ToolContext};

pub async fn get_cost_estimate(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let estimate = ctx.dashboard.cost_estimate()?;
    Ok(ok(json!({ "estimate": estimate })))
}

pub async fn get_cost_summary(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let summary = ctx.dashboard.cost_summary()?;
    Ok(ok(json!({ "summary": summary })))
}

pub async fn set_cost_warning_threshold(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let threshold = call.args.get("threshold_usd").and_then(Value::as_f64);
    ctx.dashboard.set_cost_warning_threshold(threshold)?;
    Ok(ok(json!({ "threshold_usd": threshold })))
}

pub async fn reset_cost_counter(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    ctx.dashboard.reset_cost_counter()?;
    Ok(ok(json!({ "reset": true })))
}

/// Not a standalone tool in spec §6's "Major tools" list, but the shared
/// helper `send_task`/workers call after an AI-CLI invocation to append a
/// cost row — kept here alongside the other cost operations it composes.
pub async fn record_api_call(ctx: &ToolContext, call: &ToolCall) -> Result<Value> {
    guard(ctx, call, None)?;
    let ai_cli = str_arg(&call.args, "ai_cli").map(AiCli::parse).transpose()?.unwrap_or(AiCli::Claude);
    let model = str_arg(&call.args, "model").map(str::to_string);
    let tokens = call.args.get("tokens").and_then(Value::as_u64);
    let agent_id = str_arg(&call.args, "agent_id").map(str::to_string);
    let task_id = str_arg(&call.args, "task_id").map(str::to_string);
    let actual_cost_usd = call.args.get("actual_cost_usd").and_then(Value::as_f64);
    let table = ctx.settings.model_cost_table();

    let record = ctx.dashboard.record_api_call(
        RecordApiCallInput {
            ai_cli,
            model,
            tokens,
            agent_id,
            task_id,
            actual_cost_usd,
            status_line: None,
            cost_source: None,
            default_tokens_per_call: 1000,
            table: &table,
        },
        &table,
    )?;

    Ok(ok(json!({ "record": record })))
}
