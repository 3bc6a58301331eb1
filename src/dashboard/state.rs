//! The in-memory Dashboard aggregate (spec §3 Dashboard, §4.B). This is the
//! single struct that gets read from and written back to `dashboard.md`'s
//! YAML front matter; `render.rs` turns it into the Markdown body and
//! `store.rs` wraps it with locking and the mtime cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Agent, CostInfo, Message, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub workspace_id: String,
    pub workspace_path: String,
    #[serde(default)]
    pub session_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub cost: CostInfo,
    /// Not part of the YAML front matter (excluded the way the original
    /// mixes `exclude={"messages"}` when dumping); kept here only so a
    /// single in-memory value can serve both `dashboard.md` and
    /// `messages.md` rendering in one pass.
    #[serde(skip)]
    pub messages: Vec<Message>,
}

impl Dashboard {
    pub fn new(workspace_id: impl Into<String>, workspace_path: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            workspace_path: workspace_path.into(),
            session_started_at: None,
            agents: Vec::new(),
            tasks: Vec::new(),
            cost: CostInfo::default(),
            messages: Vec::new(),
        }
    }

    pub fn total_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn active_agents(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| !matches!(a.status, crate::domain::AgentStatus::Terminated))
            .count()
    }

    pub fn total_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn completed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == crate::domain::TaskStatus::Completed)
            .count()
    }

    pub fn failed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == crate::domain::TaskStatus::Failed)
            .count()
    }

    pub fn tasks_by_status(&self, status: crate::domain::TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    pub fn find_task(&self, id: &str) -> Option<&Task> {
        let needle = crate::domain::normalize_task_id(id);
        self.tasks
            .iter()
            .find(|t| crate::domain::normalize_task_id(&t.id) == needle)
    }

    pub fn find_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        let needle = crate::domain::normalize_task_id(id);
        self.tasks
            .iter_mut()
            .find(|t| crate::domain::normalize_task_id(&t.id) == needle)
    }
}
