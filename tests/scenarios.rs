//! End-to-end scenario tests (spec §8 S1-S6), each driving the dispatcher
//! exactly as an MCP client would: one `ToolContext` per scenario, built
//! over a fresh `tempfile` workspace, then a sequence of `dispatch` calls.

use agentmux::config::Settings;
use agentmux::domain::{Agent, Role};
use agentmux::mcp::{dispatch, ToolCall, ToolContext};
use serde_json::json;
use tempfile::tempdir;

fn context(dir: &std::path::Path, quality_gate_strict: bool) -> ToolContext {
    let mut settings = Settings::load();
    settings.quality_gate_strict = quality_gate_strict;
    ToolContext::new(dir.join(".multi-agent-mcp"), "ws1", dir.to_string_lossy().to_string(), settings)
}

fn register(ctx: &ToolContext, agent_id: &str, role: Role) {
    ctx.registry.save_agent_to_file(&Agent::new(agent_id, role)).unwrap();
    ctx.ipc.register_agent(agent_id).unwrap();
    ctx.dashboard.upsert_agent(Agent::new(agent_id, role)).unwrap();
}

async fn call(ctx: &ToolContext, tool_name: &str, caller: &str, args: serde_json::Value) -> serde_json::Value {
    dispatch(
        ctx,
        ToolCall {
            tool_name: tool_name.to_string(),
            caller_agent_id: Some(caller.to_string()),
            args,
        },
    )
    .await
}

#[tokio::test]
async fn s1_task_completion_path() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), false);
    register(&ctx, "owner-001", Role::Owner);
    register(&ctx, "admin-001", Role::Admin);
    register(&ctx, "worker-001", Role::Worker);

    let created = call(&ctx, "create_task", "owner-001", json!({"task_id": "t1", "title": "T1"})).await;
    assert_eq!(created["success"], true);

    let assigned = call(
        &ctx,
        "assign_task_to_agent",
        "admin-001",
        json!({"task_id": "t1", "agent_id": "worker-001", "branch": "feature/t1"}),
    )
    .await;
    assert_eq!(assigned["success"], true);

    let progress = call(
        &ctx,
        "report_task_progress",
        "worker-001",
        json!({"task_id": "t1", "progress": 50, "message": "halfway"}),
    )
    .await;
    assert_eq!(progress["success"], true);

    let read = call(&ctx, "read_messages", "admin-001", json!({"agent_id": "admin-001", "unread_only": true})).await;
    assert_eq!(read["success"], true);
    let messages = read["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message_type"], "task_progress");
    assert_eq!(read["reconciled"]["applied"], 1);

    let task = call(&ctx, "get_task", "admin-001", json!({"task_id": "t1"})).await;
    assert_eq!(task["task"]["status"], "in_progress");
    assert_eq!(task["task"]["progress"], 50);

    let completion = call(
        &ctx,
        "report_task_completion",
        "worker-001",
        json!({"task_id": "t1", "status": "completed", "message": "done"}),
    )
    .await;
    assert_eq!(completion["success"], true);

    let read2 = call(&ctx, "read_messages", "admin-001", json!({"agent_id": "admin-001", "unread_only": true})).await;
    assert_eq!(read2["reconciled"]["applied"], 1);

    let task2 = call(&ctx, "get_task", "admin-001", json!({"task_id": "t1"})).await;
    assert_eq!(task2["task"]["status"], "completed");
    assert_eq!(task2["task"]["progress"], 100);

    let summary = call(&ctx, "get_dashboard_summary", "admin-001", json!({})).await;
    assert_eq!(summary["completed_tasks"], 1);
}

#[tokio::test]
async fn s2_quality_gate_blocks_premature_completion() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), true);
    register(&ctx, "owner-001", Role::Owner);
    register(&ctx, "admin-001", Role::Admin);

    call(&ctx, "create_task", "admin-001", json!({"task_id": "t1", "title": "impl", "branch": "feature/impl"})).await;
    call(&ctx, "update_task_status", "admin-001", json!({"task_id": "t1", "status": "completed"})).await;
    call(&ctx, "create_task", "admin-001", json!({"task_id": "t2", "title": "qa smoke"})).await;
    call(&ctx, "update_task_status", "admin-001", json!({"task_id": "t2", "status": "completed"})).await;

    let response = call(
        &ctx,
        "send_message",
        "admin-001",
        json!({
            "sender_id": "admin-001",
            "receiver_id": "owner-001",
            "type": "task_complete",
            "subject": "done",
            "content": "done",
        }),
    )
    .await;

    assert_eq!(response["success"], false);
    assert_eq!(response["gate"]["status"], "needs_replan");
    let reasons = response["gate"]["reasons"].as_array().unwrap();
    assert!(reasons.iter().any(|r| r.as_str().unwrap().contains("feature/impl")));
}

#[tokio::test]
async fn s3_auto_reroute_worker_request() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), false);
    register(&ctx, "admin-001", Role::Admin);
    register(&ctx, "worker-001", Role::Worker);

    let response = call(
        &ctx,
        "send_message",
        "worker-001",
        json!({
            "sender_id": "worker-001",
            "receiver_id": "stale-id",
            "type": "request",
            "subject": "?",
            "content": "?",
        }),
    )
    .await;

    assert_eq!(response["success"], true);
    assert_eq!(response["rerouted_receiver_id"], "admin-001");
}

#[tokio::test]
async fn s4_polling_suppression() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), false);
    register(&ctx, "admin-001", Role::Admin);

    let first = call(&ctx, "read_messages", "admin-001", json!({"agent_id": "admin-001", "unread_only": true})).await;
    assert_eq!(first["success"], true);
    assert_eq!(first["count"], 0);

    let second = call(&ctx, "read_messages", "admin-001", json!({"agent_id": "admin-001", "unread_only": true})).await;
    assert_eq!(second["success"], false);
    assert!(second["error"].as_str().unwrap().contains("polling"));
}

#[tokio::test]
async fn s5_reopen_after_terminal() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), false);
    register(&ctx, "admin-001", Role::Admin);

    call(&ctx, "create_task", "admin-001", json!({"task_id": "r1", "title": "R"})).await;
    let completed = call(&ctx, "update_task_status", "admin-001", json!({"task_id": "r1", "status": "completed"})).await;
    assert_eq!(completed["success"], true);

    let rejected = call(&ctx, "update_task_status", "admin-001", json!({"task_id": "r1", "status": "in_progress"})).await;
    assert_eq!(rejected["success"], false);
    assert!(rejected["error"].as_str().unwrap().contains("reopen_task"));

    let reopened = call(&ctx, "reopen_task", "admin-001", json!({"task_id": "r1", "reset_progress": true})).await;
    assert_eq!(reopened["success"], true);

    let task = call(&ctx, "get_task", "admin-001", json!({"task_id": "r1"})).await;
    assert_eq!(task["task"]["status"], "pending");
    assert_eq!(task["task"]["progress"], 0);
}

#[tokio::test]
async fn s6_owner_wait_lock_lifecycle() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), false);
    register(&ctx, "owner-001", Role::Owner);
    register(&ctx, "admin-001", Role::Admin);

    ctx.polling.lock_owner_wait("owner-001", Some("admin-001".to_string()), None);

    let blocked = call(&ctx, "read_messages", "owner-001", json!({"agent_id": "owner-001", "unread_only": true})).await;
    assert_eq!(blocked["success"], false);
    assert_eq!(blocked["next_action"], "wait_for_user_input_or_unlock_owner_wait");

    call(
        &ctx,
        "send_message",
        "admin-001",
        json!({
            "sender_id": "admin-001",
            "receiver_id": "owner-001",
            "type": "system",
            "subject": "status",
            "content": "all clear",
        }),
    )
    .await;

    let read = call(&ctx, "read_messages", "owner-001", json!({"agent_id": "owner-001"})).await;
    assert_eq!(read["success"], true);
    assert_eq!(read["count"], 1);
    assert_eq!(read["owner_wait_unlocked"], true);
}
