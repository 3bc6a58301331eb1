use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AgentmuxError, Result};

/// Task lifecycle state (spec §3 Task state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AgentmuxError::argument(
                "status",
                other,
                "pending, in_progress, completed, failed, blocked, cancelled",
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub task_file_path: Option<String>,
    pub status: TaskStatus,
    pub branch: Option<String>,
    pub worktree_path: Option<String>,
    pub progress: u8,
    pub checklist: Vec<ChecklistItem>,
    /// Bounded to the last 5 entries per spec §4.B.
    pub logs: Vec<String>,
    pub error_message: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub assigned_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

const MAX_LOGS_PER_TASK: usize = 5;

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            task_file_path: None,
            status: TaskStatus::Pending,
            branch: None,
            worktree_path: None,
            progress: 0,
            checklist: Vec::new(),
            logs: Vec::new(),
            error_message: None,
            metadata: HashMap::new(),
            assigned_agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn push_log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
        if self.logs.len() > MAX_LOGS_PER_TASK {
            let drop = self.logs.len() - MAX_LOGS_PER_TASK;
            self.logs.drain(0..drop);
        }
    }

    pub fn requires_playwright(&self) -> bool {
        self.metadata
            .get("requires_playwright")
            .map(metadata_bool)
            .unwrap_or(false)
    }

    pub fn task_kind(&self) -> Option<&str> {
        self.metadata.get("task_kind").and_then(|v| v.as_str())
    }

    fn context_text(&self) -> String {
        let requested = self
            .metadata
            .get("requested_description")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        format!(
            "{} {} {}",
            self.title,
            requested,
            self.description.as_deref().unwrap_or("")
        )
        .to_lowercase()
    }

    /// A completed task whose content indicates test/QA/verification, or
    /// whose metadata declares it so (spec GLOSSARY "Quality proof task").
    pub fn is_quality_proof(&self) -> bool {
        if self.task_kind() == Some("test") || self.requires_playwright() {
            return true;
        }
        const KEYWORDS: &[&str] = &[
            "qa", "quality", "test", "e2e", "検証", "テスト", "品質", "playwright",
        ];
        let text = self.context_text();
        KEYWORDS.iter().any(|kw| text.contains(kw))
    }

    pub fn is_playwright_proof(&self) -> bool {
        if let Some(flag) = self.metadata.get("requires_playwright") {
            return metadata_bool(flag);
        }
        self.context_text().contains("playwright")
    }

    pub fn is_ui_related(&self) -> bool {
        if let Some(flag) = self.metadata.get("requires_playwright") {
            if metadata_bool(flag) {
                return true;
            }
        }
        const KEYWORDS: &[&str] = &["ui", "frontend", "画面", "表示", "フロント", "browser"];
        let text = self.context_text();
        KEYWORDS.iter().any(|kw| text.contains(kw))
    }
}

fn metadata_bool(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => matches!(
            s.to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

/// Strip one of the `task:`/`task_`/`task-` prefixes (case-insensitive) for
/// comparison purposes. Storage keeps the original form.
pub fn normalize_task_id(id: &str) -> String {
    let lower = id.to_ascii_lowercase();
    for prefix in ["task:", "task_", "task-"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    lower
}
