//! Role/Permission Guard (spec §4.F): a static tool → allowed-roles table
//! plus the ordered check sequence every MCP tool call runs through before
//! it touches the dashboard, registry, or IPC bus. Transcribed from
//! `original_source/src/config/role_permissions.py`'s `TOOL_PERMISSIONS`.

use crate::domain::Role;
use crate::error::{AgentmuxError, Result};
use crate::registry::AgentRegistry;

fn allowed_roles(tool_name: &str) -> &'static [Role] {
    use Role::{Admin, Owner, Worker};
    match tool_name {
        // Session management
        "init_tmux_workspace" | "cleanup_workspace" | "cleanup_on_completion" => &[Owner],
        "check_all_tasks_completed" => &[Owner, Admin],
        "unlock_owner_wait" => &[Owner],

        // Agent management
        "create_agent" | "create_workers_batch" | "terminate_agent" | "healthcheck_agent"
        | "healthcheck_all" | "get_unhealthy_agents" | "monitor_and_recover_workers"
        | "attempt_recovery" | "initialize_agent" | "register_agent_to_ipc" => &[Owner, Admin],
        "full_recovery" => &[Admin],
        "list_agents" | "get_agent_status" => &[Owner, Admin, Worker],

        // Worktree management
        "create_worktree" | "remove_worktree" | "assign_worktree" | "merge_completed_tasks"
        | "check_gtr_available" | "check_gtrconfig" | "generate_gtrconfig"
        | "analyze_project_for_gtrconfig" | "open_worktree_with_ai" | "open_session" => &[Owner, Admin],
        "list_worktrees" | "get_worktree_status" => &[Owner, Admin, Worker],

        // Task management
        "create_task" | "remove_task" => &[Owner, Admin],
        "get_task" | "list_tasks" => &[Owner, Admin, Worker],
        "assign_task_to_agent" | "update_task_status" => &[Admin],
        "report_task_progress" | "report_task_completion" => &[Worker],

        // Task queue
        "enqueue_task" | "get_task_queue" | "detect_task_type" | "get_optimal_persona" => &[Owner, Admin],
        "auto_assign_tasks" => &[Admin],

        // Command dispatch
        "send_task" | "send_command" => &[Owner, Admin],
        "broadcast_command" => &[Admin],
        "get_output" => &[Owner, Admin, Worker],

        // Messaging
        "send_message" | "read_messages" | "get_unread_count" => &[Owner, Admin, Worker],

        // Dashboard
        "get_dashboard" | "get_dashboard_summary" => &[Owner, Admin, Worker],

        // Memory
        "save_to_memory" | "retrieve_from_memory" | "list_memory_entries" | "get_memory_entry"
        | "get_memory_summary" | "list_memory_archive" | "search_memory_archive"
        | "get_memory_archive_summary" | "save_to_global_memory" | "retrieve_from_global_memory"
        | "list_global_memory_entries" | "get_global_memory_summary" | "list_global_memory_archive"
        | "search_global_memory_archive" | "get_global_memory_archive_summary" => &[Owner, Admin, Worker],
        "delete_memory_entry" | "restore_from_memory_archive" | "delete_global_memory_entry"
        | "restore_from_global_memory_archive" => &[Owner, Admin],

        // Cost
        "get_cost_summary" => &[Owner, Admin, Worker],
        "get_cost_estimate" => &[Owner, Admin],
        "record_api_call" => &[Owner, Admin],
        "reset_cost_counter" | "set_cost_warning_threshold" => &[Owner],

        // Screenshots
        "list_screenshots" | "read_screenshot" | "read_latest_screenshot" | "get_screenshot_dir" => {
            &[Owner, Admin, Worker]
        }

        // Personas / role guide
        "list_personas" => &[Owner, Admin],
        "get_role_guide" | "list_role_guides" => &[Owner, Admin, Worker],

        // Model profiles
        "get_model_profile" | "get_model_profile_settings" => &[Owner, Admin],
        "switch_model_profile" => &[Owner],

        // Workspace templates
        "list_workspace_templates" | "get_workspace_template" => &[Owner, Admin],

        _ => &[],
    }
}

/// Tools whose `agent_id` target a Worker caller may not read on another
/// agent's behalf (spec §4.F step 4).
fn rejects_worker_reading_other_agent(tool_name: &str) -> bool {
    matches!(tool_name, "read_messages" | "get_unread_count")
}

pub struct PermissionCheck<'a> {
    pub tool_name: &'a str,
    pub caller_agent_id: Option<&'a str>,
    pub target_agent_id: Option<&'a str>,
}

/// Run the ordered guard sequence from spec §4.F steps 1-4 (step 5,
/// `sender_id == caller_agent_id`, is checked by the IPC bus itself since
/// it only applies to `send_message`).
pub fn check_permission(registry: &AgentRegistry, check: PermissionCheck<'_>) -> Result<Role> {
    let caller_agent_id = check
        .caller_agent_id
        .ok_or_else(|| AgentmuxError::argument("caller_agent_id", "", "a registered agent id"))?;

    let role = registry.role_of(caller_agent_id)?;

    let allowed = allowed_roles(check.tool_name);
    if !allowed.contains(&role) {
        return Err(AgentmuxError::Permission {
            tool: check.tool_name.to_string(),
            role: role.as_str().to_string(),
        });
    }

    if role == Role::Worker && rejects_worker_reading_other_agent(check.tool_name) {
        if let Some(target) = check.target_agent_id {
            if target != caller_agent_id {
                return Err(AgentmuxError::Permission {
                    tool: check.tool_name.to_string(),
                    role: role.as_str().to_string(),
                });
            }
        }
    }

    Ok(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Agent;
    use tempfile::tempdir;

    fn registry() -> (tempfile::TempDir, AgentRegistry) {
        let dir = tempdir().unwrap();
        let reg = AgentRegistry::new(dir.path());
        reg.save_agent_to_file(&Agent::new("owner-1", Role::Owner)).unwrap();
        reg.save_agent_to_file(&Agent::new("admin-1", Role::Admin)).unwrap();
        reg.save_agent_to_file(&Agent::new("worker-1", Role::Worker)).unwrap();
        (dir, reg)
    }

    #[test]
    fn worker_cannot_update_task_status() {
        let (_dir, reg) = registry();
        let err = check_permission(
            &reg,
            PermissionCheck {
                tool_name: "update_task_status",
                caller_agent_id: Some("worker-1"),
                target_agent_id: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AgentmuxError::Permission { .. }));
    }

    #[test]
    fn admin_can_update_task_status() {
        let (_dir, reg) = registry();
        let role = check_permission(
            &reg,
            PermissionCheck {
                tool_name: "update_task_status",
                caller_agent_id: Some("admin-1"),
                target_agent_id: None,
            },
        )
        .unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn worker_cannot_read_another_agents_messages() {
        let (_dir, reg) = registry();
        let err = check_permission(
            &reg,
            PermissionCheck {
                tool_name: "read_messages",
                caller_agent_id: Some("worker-1"),
                target_agent_id: Some("admin-1"),
            },
        )
        .unwrap_err();
        assert!(matches!(err, AgentmuxError::Permission { .. }));
    }

    #[test]
    fn worker_can_read_its_own_messages() {
        let (_dir, reg) = registry();
        let role = check_permission(
            &reg,
            PermissionCheck {
                tool_name: "read_messages",
                caller_agent_id: Some("worker-1"),
                target_agent_id: Some("worker-1"),
            },
        )
        .unwrap();
        assert_eq!(role, Role::Worker);
    }

    #[test]
    fn unknown_tool_is_allowed_to_nobody() {
        let (_dir, reg) = registry();
        let err = check_permission(
            &reg,
            PermissionCheck {
                tool_name: "not_a_real_tool",
                caller_agent_id: Some("owner-1"),
                target_agent_id: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AgentmuxError::Permission { .. }));
    }
}
