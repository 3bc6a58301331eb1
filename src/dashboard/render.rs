//! `dashboard.md` (YAML front matter + Markdown body) and the sibling,
//! append-only `messages.md`. Grounded on
//! `original_source/src/managers/dashboard_markdown_mixin.py`,
//! `dashboard_reader_mixin.py` and `dashboard_writer_mixin.py`.

use crate::domain::{AgentStatus, MessageType, Role, TaskStatus};
use crate::error::{AgentmuxError, Result};

use super::state::Dashboard;

const FRONT_MATTER_DELIM: &str = "---";

/// Everything persisted in the YAML front matter — the aggregate minus the
/// `messages` field, which lives in `messages.md` instead (mirrors
/// `model_dump(mode="json", exclude={"messages"})`).
#[derive(serde::Serialize, serde::Deserialize)]
struct FrontMatter {
    #[serde(flatten)]
    dashboard: Dashboard,
}

/// Render `dashboard.md`'s full text: `---\n<yaml>---\n\n<markdown body>`.
pub fn render_dashboard_file(dashboard: &Dashboard) -> Result<String> {
    let yaml = serde_yaml::to_string(&FrontMatter {
        dashboard: dashboard.clone(),
    })?;
    let body = render_markdown_body(dashboard);
    Ok(format!(
        "{FRONT_MATTER_DELIM}\n{yaml}{FRONT_MATTER_DELIM}\n\n{body}"
    ))
}

/// Parse a previously-written `dashboard.md`. Returns `Ok(None)` when the
/// file has no recognizable front matter (fresh workspace), and a
/// `LegacyFormat` error when the legacy `description`/`task_file_path` pair
/// disagree — a hard error per the contract the reader raises on, not a
/// value to silently coerce.
pub fn parse_dashboard_file(content: &str) -> Result<Option<Dashboard>> {
    let Some(yaml_str) = extract_front_matter(content) else {
        return Ok(None);
    };
    let front: FrontMatter = match serde_yaml::from_str(&yaml_str) {
        Ok(f) => f,
        Err(_) => return Ok(None),
    };
    for task in &front.dashboard.tasks {
        validate_legacy_task_shape(task)?;
    }
    Ok(Some(front.dashboard))
}

fn validate_legacy_task_shape(task: &crate::domain::Task) -> Result<()> {
    let has_description = task.description.as_deref().is_some_and(|d| !d.is_empty());
    let has_path = task.task_file_path.as_deref().is_some_and(|p| !p.is_empty());
    if has_description && !has_path {
        return Err(AgentmuxError::LegacyFormat(
            "description body unsupported without task_file_path".to_string(),
        ));
    }
    if has_description && has_path && task.description.as_deref() != task.task_file_path.as_deref() {
        return Err(AgentmuxError::LegacyFormat(
            "description/task_file_path mismatch".to_string(),
        ));
    }
    Ok(())
}

fn extract_front_matter(content: &str) -> Option<String> {
    let rest = content.strip_prefix("---\n")?;
    let end = rest.find("\n---")?;
    Some(rest[..end].to_string())
}

fn status_emoji_agent(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Idle => "\u{1F7E2}",
        AgentStatus::Busy => "\u{1F535}",
        AgentStatus::Error => "\u{1F534}",
        AgentStatus::Terminated => "\u{26AB}",
    }
}

fn status_emoji_task(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "\u{23F3}",
        TaskStatus::InProgress => "\u{1F504}",
        TaskStatus::Completed => "\u{2705}",
        TaskStatus::Failed => "\u{274C}",
        TaskStatus::Blocked => "\u{1F6AB}",
        TaskStatus::Cancelled => "\u{1F5D1}",
    }
}

fn message_emoji(message_type: MessageType) -> &'static str {
    match message_type {
        MessageType::TaskProgress => "\u{1F4CA}",
        MessageType::TaskComplete => "\u{2705}",
        MessageType::TaskFailed => "\u{274C}",
        MessageType::Request => "\u{2753}",
        MessageType::Response => "\u{1F4AC}",
        MessageType::TaskApproved => "\u{1F44D}",
        MessageType::Error => "\u{1F534}",
        _ => "\u{1F4E8}",
    }
}

fn label_for(dashboard: &Dashboard, agent_id: &str) -> String {
    dashboard
        .agents
        .iter()
        .find(|a| a.agent_id == agent_id)
        .map(|a| a.display_label())
        .unwrap_or_else(|| "unknown".to_string())
}

fn render_markdown_body(dashboard: &Dashboard) -> String {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
    let mut lines = vec![
        "# Multi-Agent Dashboard".to_string(),
        String::new(),
        format!("**更新時刻**: {now}"),
    ];
    lines.extend(render_agent_table(dashboard));
    lines.extend(render_task_table(dashboard));
    lines.extend(render_task_details(dashboard));
    lines.extend(render_stats(dashboard));
    lines.join("\n")
}

fn render_agent_table(dashboard: &Dashboard) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "---".to_string(),
        String::new(),
        "## エージェント状態".to_string(),
        String::new(),
        "| ID | 名前 | 役割 | 状態 | 現在のタスク |".to_string(),
        "|:---|:---|:---|:---|:---|".to_string(),
    ];
    for agent in &dashboard.agents {
        lines.push(format!(
            "| `{}` | `{}` | {} | {} {:?} | {} |",
            agent.agent_id,
            agent.display_label(),
            agent.role,
            status_emoji_agent(agent.status),
            agent.status,
            agent.current_task.as_deref().unwrap_or("-"),
        ));
    }
    lines
}

fn render_task_table(dashboard: &Dashboard) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "---".to_string(),
        String::new(),
        "## タスク状態".to_string(),
        String::new(),
        "| ID | タイトル | 状態 | 担当 | 進捗 | worktree |".to_string(),
        "|:---|:---|:---|:---|:---|:---|".to_string(),
    ];
    for task in &dashboard.tasks {
        let assigned = task
            .assigned_agent_id
            .as_ref()
            .map(|id| label_for(dashboard, id))
            .unwrap_or_else(|| "-".to_string());
        let worktree = task
            .worktree_path
            .as_deref()
            .map(|p| format!("<details><summary>表示</summary><code>{p}</code></details>"))
            .unwrap_or_else(|| "-".to_string());
        let short_id: String = task.id.chars().take(8).collect();
        lines.push(format!(
            "| `{}` | {} | {} {} | `{}` | {}% | {} |",
            short_id,
            task.title,
            status_emoji_task(task.status),
            task.status.as_str(),
            assigned,
            task.progress,
            worktree,
        ));
    }
    lines
}

fn render_task_details(dashboard: &Dashboard) -> Vec<String> {
    let in_progress: Vec<_> = dashboard
        .tasks
        .iter()
        .filter(|t| {
            t.status == TaskStatus::InProgress
                && (!t.checklist.is_empty() || !t.logs.is_empty() || t.error_message.is_some())
        })
        .collect();
    if in_progress.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![String::new(), "---".to_string(), String::new(), "## タスク詳細".to_string()];
    for task in in_progress {
        lines.push(String::new());
        lines.push(format!("### {}", task.title));
        lines.push(String::new());
        lines.push(format!("**進捗**: {}%", task.progress));
        if let Some(err) = &task.error_message {
            lines.push(String::new());
            lines.push(format!("**エラー**: {err}"));
        }
        if !task.checklist.is_empty() {
            lines.push(String::new());
            lines.push("**チェックリスト**:".to_string());
            for item in &task.checklist {
                let check = if item.completed { "x" } else { " " };
                lines.push(format!("- [{check}] {}", item.text));
            }
        }
        if !task.logs.is_empty() {
            lines.push(String::new());
            lines.push("**最新ログ**:".to_string());
            for log in task.logs.iter().rev().take(5).rev() {
                lines.push(format!("- {log}"));
            }
        }
    }
    lines
}

fn render_stats(dashboard: &Dashboard) -> Vec<String> {
    let pending = dashboard.tasks_by_status(TaskStatus::Pending).len();
    let in_progress = dashboard.tasks_by_status(TaskStatus::InProgress).len();
    let all_completed = dashboard.total_tasks() > 0
        && pending == 0
        && in_progress == 0
        && dashboard.failed_tasks() == 0;

    vec![
        String::new(),
        "---".to_string(),
        String::new(),
        "## 統計".to_string(),
        String::new(),
        format!("- **総エージェント数**: {}", dashboard.total_agents()),
        format!("- **アクティブエージェント**: {}", dashboard.active_agents()),
        format!("- **総タスク数**: {}", dashboard.total_tasks()),
        format!("- **完了タスク**: {}", dashboard.completed_tasks()),
        format!("- **失敗タスク**: {}", dashboard.failed_tasks()),
        format!(
            "- **実装完了**: {}",
            if all_completed { "\u{2705}" } else { "\u{274C}" }
        ),
        format!("- **総APIコール数**: {}", dashboard.cost.total_api_calls),
        format!("- **推定コスト(USD)**: {:.4}", dashboard.cost.estimated_cost_usd),
        format!("- **実コスト(USD)**: {:.4}", dashboard.cost.actual_cost_usd),
    ]
}

/// Render `messages.md`'s full text. Always overwritten in full (not
/// appended byte-by-byte) so a reader never sees a torn entry, but the
/// *content* only grows — nothing already listed is removed.
pub fn render_messages_file(dashboard: &Dashboard) -> String {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
    let mut lines = vec![
        "# Multi-Agent Messages".to_string(),
        String::new(),
        format!("**更新時刻**: {now}"),
        String::new(),
    ];
    if dashboard.messages.is_empty() {
        lines.push("メッセージはまだありません。".to_string());
        return lines.join("\n");
    }
    lines.push("## メッセージ履歴".to_string());
    for msg in &dashboard.messages {
        let time_str = msg.created_at.format("%H:%M:%S");
        let sender = label_for(dashboard, &msg.sender_id);
        let receiver = msg
            .receiver_id
            .as_ref()
            .map(|id| label_for(dashboard, id))
            .unwrap_or_else(|| "broadcast".to_string());
        let content = if msg.content.trim().is_empty() {
            "(本文なし)".to_string()
        } else {
            msg.content.trim().to_string()
        };
        lines.push(String::new());
        lines.push("<details open>".to_string());
        lines.push(format!(
            "<summary>{} {} {} \u{2192} {}</summary>",
            time_str,
            message_emoji(msg.message_type),
            sender,
            receiver
        ));
        lines.push(String::new());
        lines.push("```text".to_string());
        lines.push(content);
        lines.push("```".to_string());
        lines.push("</details>".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Agent, Role, Task};

    fn sample() -> Dashboard {
        let mut d = Dashboard::new("ws1", "/tmp/ws");
        d.agents.push(Agent::new("owner-1", Role::Owner));
        let mut t = Task::new("task-1", "Build thing");
        t.progress = 40;
        t.status = TaskStatus::InProgress;
        t.push_log("started");
        d.tasks.push(t);
        d
    }

    #[test]
    fn render_then_parse_roundtrips_front_matter() {
        let d = sample();
        let rendered = render_dashboard_file(&d).unwrap();
        assert!(rendered.starts_with("---\n"));
        let parsed = parse_dashboard_file(&rendered).unwrap().unwrap();
        assert_eq!(parsed.workspace_id, "ws1");
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].id, "task-1");
    }

    #[test]
    fn parse_returns_none_for_content_without_front_matter() {
        assert!(parse_dashboard_file("# just markdown, no yaml").unwrap().is_none());
    }

    #[test]
    fn legacy_description_without_task_file_path_is_hard_error() {
        let mut d = sample();
        d.tasks[0].description = Some("some inline body".to_string());
        d.tasks[0].task_file_path = None;
        let rendered = render_dashboard_file(&d).unwrap();
        let err = parse_dashboard_file(&rendered).unwrap_err();
        assert!(matches!(err, AgentmuxError::LegacyFormat(_)));
    }

    #[test]
    fn legacy_mismatched_description_and_task_file_path_is_hard_error() {
        let mut d = sample();
        d.tasks[0].description = Some("a".to_string());
        d.tasks[0].task_file_path = Some("b".to_string());
        let rendered = render_dashboard_file(&d).unwrap();
        let err = parse_dashboard_file(&rendered).unwrap_err();
        assert!(matches!(err, AgentmuxError::LegacyFormat(_)));
    }

    #[test]
    fn messages_file_reports_placeholder_when_empty() {
        let d = sample();
        let rendered = render_messages_file(&d);
        assert!(rendered.contains("メッセージはまだありません"));
    }
}
