//! The Dashboard Store (spec §4.B): the single writer of `dashboard.md`,
//! serialized through the advisory lock in [`crate::lock`] and cached by
//! mtime so repeated reads inside one process don't re-parse YAML on every
//! call. Grounded on `dashboard_reader_mixin.py` / `dashboard_writer_mixin.py`
//! / `dashboard_sync_mixin.py`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{Agent, ApiCallRecord, CostEstimate, CostSummary, Message, Task, TaskStatus};
use crate::error::{AgentmuxError, Result};
use crate::lock;

use super::cost::{self, ModelCostTable, RecordApiCallInput};
use super::fsm;
use super::render;
use super::state::Dashboard;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DashboardStore {
    dashboard_path: PathBuf,
    messages_path: PathBuf,
    workspace_id: String,
    workspace_path: String,
    cache: lock::MtimeCache<Dashboard>,
    default_tokens_per_call: u64,
}

impl DashboardStore {
    pub fn new(dashboard_dir: &Path, workspace_id: impl Into<String>, workspace_path: impl Into<String>) -> Self {
        Self {
            dashboard_path: dashboard_dir.join("dashboard.md"),
            messages_path: dashboard_dir.join("messages.md"),
            workspace_id: workspace_id.into(),
            workspace_path: workspace_path.into(),
            cache: lock::MtimeCache::new(),
            default_tokens_per_call: 1000,
        }
    }

    fn read_unlocked(&self) -> Result<Dashboard> {
        if !self.dashboard_path.exists() {
            return Ok(Dashboard::new(&self.workspace_id, &self.workspace_path));
        }
        self.cache.get_or_read(&self.dashboard_path, |bytes| {
            let text = String::from_utf8_lossy(bytes);
            match render::parse_dashboard_file(&text) {
                Ok(Some(d)) => Ok(d),
                Ok(None) => Ok(Dashboard::new(&self.workspace_id, &self.workspace_path)),
                Err(e) => Err(e),
            }
        })
    }

    fn write_unlocked(&self, dashboard: &Dashboard) -> Result<()> {
        let content = render::render_dashboard_file(dashboard)?;
        lock::atomic_write(&self.dashboard_path, content.as_bytes())?;
        lock::atomic_write(&self.messages_path, render::render_messages_file(dashboard).as_bytes())?;
        self.cache.invalidate();
        Ok(())
    }

    /// Run `mutate` against the current dashboard under the file lock and
    /// write the result back. `mutate` returning an error aborts the
    /// transaction without touching disk.
    pub fn transaction<F, T>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Dashboard) -> Result<T>,
    {
        let _guard = lock::acquire(&self.dashboard_path, LOCK_TIMEOUT)?;
        let mut dashboard = self.read_unlocked()?;
        let result = mutate(&mut dashboard)?;
        self.write_unlocked(&dashboard)?;
        Ok(result)
    }

    pub fn read(&self) -> Result<Dashboard> {
        let _guard = lock::acquire(&self.dashboard_path, LOCK_TIMEOUT)?;
        self.read_unlocked()
    }

    // ---- Task operations -------------------------------------------------

    pub fn create_task(&self, task: Task) -> Result<Task> {
        self.transaction(|d| {
            if d.find_task(&task.id).is_some() {
                return Err(AgentmuxError::argument("task_id", task.id.clone(), "a new, unused task id"));
            }
            d.tasks.push(task.clone());
            Ok(task)
        })
    }

    pub fn update_task_status(&self, task_id: &str, next: TaskStatus, progress: Option<u8>) -> Result<Task> {
        self.transaction(|d| {
            let task = d
                .find_task_mut(task_id)
                .ok_or_else(|| AgentmuxError::not_found("task", task_id))?;
            let transition = fsm::apply_status(task, next, progress);
            if !transition.ok {
                return Err(AgentmuxError::Other(transition.message));
            }
            Ok(task.clone())
        })
    }

    pub fn reopen_task(&self, task_id: &str, reset_progress: bool) -> Result<Task> {
        self.transaction(|d| {
            let task = d
                .find_task_mut(task_id)
                .ok_or_else(|| AgentmuxError::not_found("task", task_id))?;
            let transition = fsm::reopen(task, reset_progress);
            if !transition.ok {
                return Err(AgentmuxError::Other(transition.message));
            }
            Ok(task.clone())
        })
    }

    pub fn update_task_checklist(
        &self,
        task_id: &str,
        checklist: Vec<crate::domain::ChecklistItem>,
    ) -> Result<Task> {
        self.transaction(|d| {
            let task = d
                .find_task_mut(task_id)
                .ok_or_else(|| AgentmuxError::not_found("task", task_id))?;
            task.checklist = checklist;
            Ok(task.clone())
        })
    }

    pub fn assign_task(&self, task_id: &str, agent_id: &str, branch: Option<&str>) -> Result<Task> {
        self.transaction(|d| {
            if !d.agents.iter().any(|a| a.agent_id == agent_id) {
                return Err(AgentmuxError::not_found("agent", agent_id));
            }
            let task = d
                .find_task_mut(task_id)
                .ok_or_else(|| AgentmuxError::not_found("task", task_id))?;
            task.assigned_agent_id = Some(agent_id.to_string());
            if let Some(branch) = branch {
                task.branch = Some(branch.to_string());
            }
            Ok(task.clone())
        })
    }

    pub fn append_task_log(&self, task_id: &str, message: impl Into<String> + Clone) -> Result<Task> {
        self.transaction(|d| {
            let task = d
                .find_task_mut(task_id)
                .ok_or_else(|| AgentmuxError::not_found("task", task_id))?;
            task.push_log(message.clone());
            Ok(task.clone())
        })
    }

    pub fn remove_task(&self, task_id: &str) -> Result<()> {
        self.transaction(|d| {
            let before = d.tasks.len();
            let needle = crate::domain::normalize_task_id(task_id);
            d.tasks.retain(|t| crate::domain::normalize_task_id(&t.id) != needle);
            if d.tasks.len() == before {
                return Err(AgentmuxError::not_found("task", task_id));
            }
            Ok(())
        })
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.read()?.tasks)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        self.read()?
            .find_task(task_id)
            .cloned()
            .ok_or_else(|| AgentmuxError::not_found("task", task_id))
    }

    // ---- Agent mirror (dashboard's own copy, distinct from the registry) --

    pub fn upsert_agent(&self, agent: Agent) -> Result<()> {
        self.transaction(|d| {
            if let Some(existing) = d.agents.iter_mut().find(|a| a.agent_id == agent.agent_id) {
                *existing = agent;
            } else {
                d.agents.push(agent);
            }
            Ok(())
        })
    }

    pub fn remove_agent(&self, agent_id: &str) -> Result<()> {
        self.transaction(|d| {
            d.agents.retain(|a| a.agent_id != agent_id);
            Ok(())
        })
    }

    // ---- Messages (mirrored for rendering; the IPC bus is authoritative) --

    pub fn append_message(&self, message: Message) -> Result<()> {
        self.transaction(|d| {
            d.messages.push(message);
            Ok(())
        })
    }

    // ---- Cost --------------------------------------------------------

    pub fn record_api_call(&self, input: RecordApiCallInput, table: &ModelCostTable) -> Result<ApiCallRecord> {
        let _ = table;
        self.transaction(|d| {
            let record = cost::build_record(RecordApiCallInput {
                ai_cli: input.ai_cli,
                model: input.model,
                tokens: input.tokens,
                agent_id: input.agent_id,
                task_id: input.task_id,
                actual_cost_usd: input.actual_cost_usd,
                status_line: input.status_line,
                cost_source: input.cost_source,
                default_tokens_per_call: self.default_tokens_per_call,
                table: input.table,
            });
            d.cost.calls.push(record.clone());
            cost::recalculate(&mut d.cost);
            Ok(record)
        })
    }

    pub fn cost_estimate(&self) -> Result<CostEstimate> {
        Ok(cost::estimate(&self.read()?.cost))
    }

    pub fn cost_summary(&self) -> Result<CostSummary> {
        Ok(cost::summary(&self.read()?.cost))
    }

    pub fn set_cost_warning_threshold(&self, threshold: Option<f64>) -> Result<()> {
        self.transaction(|d| {
            d.cost.warning_threshold_usd = threshold;
            Ok(())
        })
    }

    pub fn reset_cost_counter(&self) -> Result<()> {
        self.transaction(|d| {
            d.cost = crate::domain::CostInfo {
                warning_threshold_usd: d.cost.warning_threshold_usd,
                ..Default::default()
            };
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AiCli;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, DashboardStore) {
        let dir = tempdir().unwrap();
        let s = DashboardStore::new(dir.path(), "ws1", dir.path().to_string_lossy().to_string());
        (dir, s)
    }

    #[test]
    fn create_then_list_round_trips_through_disk() {
        let (_dir, store) = store();
        store.create_task(Task::new("t1", "Title")).unwrap();
        let tasks = store.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "t1");
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let (_dir, store) = store();
        store.create_task(Task::new("t1", "Title")).unwrap();
        let err = store.create_task(Task::new("t1", "Other")).unwrap_err();
        assert!(matches!(err, AgentmuxError::Argument { .. }));
    }

    #[test]
    fn update_status_persists_across_reads() {
        let (_dir, store) = store();
        store.create_task(Task::new("t1", "Title")).unwrap();
        store
            .update_task_status("t1", TaskStatus::InProgress, None)
            .unwrap();
        let t = store.get_task("t1").unwrap();
        assert_eq!(t.status, TaskStatus::InProgress);
        assert!(t.started_at.is_some());
    }

    #[test]
    fn reopen_rejected_on_non_terminal_task() {
        let (_dir, store) = store();
        store.create_task(Task::new("t1", "Title")).unwrap();
        let err = store.reopen_task("t1", true).unwrap_err();
        assert!(matches!(err, AgentmuxError::Other(_)));
    }

    #[test]
    fn record_api_call_updates_cost_summary() {
        let (_dir, store) = store();
        let table = ModelCostTable {
            default_per_1k: 2.0,
            ..Default::default()
        };
        store
            .record_api_call(
                RecordApiCallInput {
                    ai_cli: AiCli::Gemini,
                    model: None,
                    tokens: Some(500),
                    agent_id: Some("w1".into()),
                    task_id: None,
                    actual_cost_usd: None,
                    status_line: None,
                    cost_source: None,
                    default_tokens_per_call: 1000,
                    table: &table,
                },
                &table,
            )
            .unwrap();
        let summary = store.cost_summary().unwrap();
        assert_eq!(summary.estimate.total_api_calls, 1);
        assert!(summary.estimate.estimated_cost_usd > 0.0);
    }
}
