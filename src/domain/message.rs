use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentmuxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssign,
    TaskProgress,
    TaskComplete,
    TaskFailed,
    TaskApproved,
    Request,
    Response,
    System,
    Error,
    Broadcast,
    StatusUpdate,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskAssign => "task_assign",
            Self::TaskProgress => "task_progress",
            Self::TaskComplete => "task_complete",
            Self::TaskFailed => "task_failed",
            Self::TaskApproved => "task_approved",
            Self::Request => "request",
            Self::Response => "response",
            Self::System => "system",
            Self::Error => "error",
            Self::Broadcast => "broadcast",
            Self::StatusUpdate => "status_update",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        Ok(match value {
            "task_assign" => Self::TaskAssign,
            "task_progress" => Self::TaskProgress,
            "task_complete" => Self::TaskComplete,
            "task_failed" => Self::TaskFailed,
            "task_approved" => Self::TaskApproved,
            "request" => Self::Request,
            "response" => Self::Response,
            "system" => Self::System,
            "error" => Self::Error,
            "broadcast" => Self::Broadcast,
            "status_update" => Self::StatusUpdate,
            other => {
                return Err(AgentmuxError::argument(
                    "type",
                    other,
                    "task_assign, task_progress, task_complete, task_failed, task_approved, \
                     request, response, system, error, broadcast, status_update",
                ))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// A unit of the inter-agent IPC bus (spec §3 Message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    /// `None` marks a broadcast (fans out to every registered agent but the
    /// sender).
    pub receiver_id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub priority: MessagePriority,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: Option<String>,
        message_type: MessageType,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            receiver_id,
            message_type,
            priority: MessagePriority::Normal,
            subject: subject.into(),
            content: content.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver_id.is_none()
    }
}
