//! Auto-Reconciler (spec §4.J): applies `task_progress`/`task_complete`/
//! `task_failed` messages into dashboard state whenever an Admin reads its
//! inbox. Grounded on `original_source/src/tools/ipc.py`'s reconciliation
//! pass inside `read_messages`.

use crate::dashboard::{Dashboard, DashboardStore};
use crate::domain::{AgentStatus, ChecklistItem, Message, MessageType, TaskStatus};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub message_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub applied: usize,
    pub skipped: Vec<SkippedItem>,
}

fn extract_task_id(message: &Message) -> Option<String> {
    message.metadata.get("task_id")?.as_str().map(str::to_string)
}

fn extract_progress(message: &Message) -> Option<u8> {
    message
        .metadata
        .get("progress")
        .and_then(|v| v.as_u64())
        .map(|v| v.min(100) as u8)
}

fn extract_checklist(message: &Message) -> Option<Vec<ChecklistItem>> {
    let items = message.metadata.get("checklist")?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                let text = item.get("text")?.as_str()?.to_string();
                let completed = item.get("completed").and_then(|v| v.as_bool()).unwrap_or(false);
                Some(ChecklistItem { text, completed })
            })
            .collect(),
    )
}

/// Apply `messages` (already filtered to task-typed messages returned from
/// an Admin's `read_messages`) into `dashboard`. Pure and synchronous so it
/// can run inside a [`DashboardStore::transaction`] closure.
pub fn reconcile(dashboard: &mut Dashboard, messages: &[Message]) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    for message in messages {
        if !matches!(
            message.message_type,
            MessageType::TaskProgress | MessageType::TaskComplete | MessageType::TaskFailed
        ) {
            continue;
        }

        let Some(task_id) = extract_task_id(message) else {
            outcome.skipped.push(SkippedItem {
                message_id: message.id.clone(),
                reason: "missing_task_id".to_string(),
            });
            continue;
        };

        if dashboard.find_task(&task_id).is_none() {
            outcome.skipped.push(SkippedItem {
                message_id: message.id.clone(),
                reason: format!("task_not_found:{}", crate::domain::normalize_task_id(&task_id)),
            });
            continue;
        }

        let reporter_id = message.sender_id.clone();

        match message.message_type {
            MessageType::TaskProgress => {
                let task = dashboard.find_task_mut(&task_id).expect("checked above");
                if task.status.is_terminal() {
                    outcome.skipped.push(SkippedItem {
                        message_id: message.id.clone(),
                        reason: format!("task_terminal:{}", task.id),
                    });
                    continue;
                }
                task.status = TaskStatus::InProgress;
                if task.started_at.is_none() {
                    task.started_at = Some(chrono::Utc::now());
                }
                if let Some(progress) = extract_progress(message) {
                    task.progress = progress;
                }
                if let Some(checklist) = extract_checklist(message) {
                    task.checklist = checklist;
                }
                let resolved_task_id = task.id.clone();
                if let Some(agent) = dashboard.agents.iter_mut().find(|a| a.agent_id == reporter_id) {
                    agent.status = AgentStatus::Busy;
                    agent.current_task = Some(resolved_task_id);
                    agent.touch();
                }
                outcome.applied += 1;
            }
            MessageType::TaskComplete => {
                let task = dashboard.find_task_mut(&task_id).expect("checked above");
                if task.status == TaskStatus::Completed {
                    outcome.skipped.push(SkippedItem {
                        message_id: message.id.clone(),
                        reason: format!("already_completed:{}", task.id),
                    });
                    continue;
                }
                task.status = TaskStatus::Completed;
                task.progress = 100;
                task.completed_at = Some(chrono::Utc::now());
                let resolved_task_id = task.id.clone();
                if let Some(agent) = dashboard.agents.iter_mut().find(|a| a.agent_id == reporter_id) {
                    if agent.current_task.as_deref() == Some(resolved_task_id.as_str()) {
                        agent.current_task = None;
                    }
                    agent.status = AgentStatus::Idle;
                    agent.touch();
                }
                outcome.applied += 1;
            }
            MessageType::TaskFailed => {
                let task = dashboard.find_task_mut(&task_id).expect("checked above");
                if task.status == TaskStatus::Failed {
                    outcome.skipped.push(SkippedItem {
                        message_id: message.id.clone(),
                        reason: format!("already_failed:{}", task.id),
                    });
                    continue;
                }
                task.status = TaskStatus::Failed;
                task.completed_at = Some(chrono::Utc::now());
                task.error_message = Some(message.content.clone());
                let resolved_task_id = task.id.clone();
                if let Some(agent) = dashboard.agents.iter_mut().find(|a| a.agent_id == reporter_id) {
                    if agent.current_task.as_deref() == Some(resolved_task_id.as_str()) {
                        agent.current_task = None;
                    }
                    agent.status = AgentStatus::Idle;
                    agent.touch();
                }
                outcome.applied += 1;
            }
            _ => unreachable!("filtered above"),
        }
    }

    outcome
}

/// Convenience wrapper that runs [`reconcile`] inside a dashboard
/// transaction so the re-render happens exactly once per call.
pub fn reconcile_into_store(store: &DashboardStore, messages: &[Message]) -> Result<ReconcileOutcome> {
    store.transaction(|d| Ok(reconcile(d, messages)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Agent, Role, Task};

    fn dashboard_with(task: Task, agent: Agent) -> Dashboard {
        let mut d = Dashboard::new("ws1", "/tmp/ws");
        d.tasks.push(task);
        d.agents.push(agent);
        d
    }

    fn progress_message(task_id: &str, sender: &str, progress: u64) -> Message {
        let mut m = Message::new(sender, Some("admin-1".to_string()), MessageType::TaskProgress, "progress", "halfway");
        m.metadata = serde_json::json!({"task_id": task_id, "progress": progress});
        m
    }

    #[test]
    fn progress_message_updates_task_and_marks_reporter_busy() {
        let mut d = dashboard_with(Task::new("t1", "Title"), Agent::new("worker-1", Role::Worker));
        let msg = progress_message("t1", "worker-1", 50);
        let outcome = reconcile(&mut d, &[msg]);
        assert_eq!(outcome.applied, 1);
        let task = d.find_task("t1").unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.progress, 50);
        let agent = d.agents.iter().find(|a| a.agent_id == "worker-1").unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);
        assert_eq!(agent.current_task.as_deref(), Some("t1"));
    }

    #[test]
    fn missing_task_id_is_skipped() {
        let mut d = dashboard_with(Task::new("t1", "Title"), Agent::new("worker-1", Role::Worker));
        let msg = Message::new("worker-1", Some("admin-1".to_string()), MessageType::TaskProgress, "progress", "x");
        let outcome = reconcile(&mut d, &[msg]);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.skipped[0].reason, "missing_task_id");
    }

    #[test]
    fn unknown_task_id_is_skipped_with_normalized_id() {
        let mut d = dashboard_with(Task::new("t1", "Title"), Agent::new("worker-1", Role::Worker));
        let msg = progress_message("task:zzz", "worker-1", 10);
        let outcome = reconcile(&mut d, &[msg]);
        assert_eq!(outcome.skipped[0].reason, "task_not_found:zzz");
    }

    #[test]
    fn task_complete_is_idempotent() {
        let mut task = Task::new("t1", "Title");
        task.status = TaskStatus::Completed;
        let mut agent = Agent::new("worker-1", Role::Worker);
        agent.current_task = Some("t1".to_string());
        let mut d = dashboard_with(task, agent);

        let mut msg = Message::new("worker-1", Some("admin-1".to_string()), MessageType::TaskComplete, "done", "done");
        msg.metadata = serde_json::json!({"task_id": "t1"});
        let outcome = reconcile(&mut d, &[msg]);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.skipped[0].reason, "already_completed:t1");
    }

    #[test]
    fn task_complete_clears_reporter_linkage() {
        let task = Task::new("t1", "Title");
        let mut agent = Agent::new("worker-1", Role::Worker);
        agent.current_task = Some("t1".to_string());
        agent.status = AgentStatus::Busy;
        let mut d = dashboard_with(task, agent);

        let mut msg = Message::new("worker-1", Some("admin-1".to_string()), MessageType::TaskComplete, "done", "done");
        msg.metadata = serde_json::json!({"task_id": "t1"});
        let outcome = reconcile(&mut d, &[msg]);
        assert_eq!(outcome.applied, 1);
        let task = d.find_task("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        let agent = d.agents.iter().find(|a| a.agent_id == "worker-1").unwrap();
        assert!(agent.current_task.is_none());
        assert_eq!(agent.status, AgentStatus::Idle);
    }

    #[test]
    fn task_failed_sets_error_message() {
        let task = Task::new("t1", "Title");
        let agent = Agent::new("worker-1", Role::Worker);
        let mut d = dashboard_with(task, agent);

        let mut msg = Message::new("worker-1", Some("admin-1".to_string()), MessageType::TaskFailed, "failed", "out of memory");
        msg.metadata = serde_json::json!({"task_id": "t1"});
        let outcome = reconcile(&mut d, &[msg]);
        assert_eq!(outcome.applied, 1);
        let task = d.find_task("t1").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("out of memory"));
    }
}
