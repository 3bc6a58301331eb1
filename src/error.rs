use thiserror::Error;

/// Error kinds surfaced by the coordination kernel.
///
/// Every public operation in the dashboard, IPC bus, dispatcher, quality
/// gate and session-lifecycle modules returns `Result<T, AgentmuxError>`.
/// The tool dispatcher (`src/mcp`) is the only place that converts these
/// into the structured `{success, error, next_action, ...}` JSON the spec
/// describes in §7 — nothing below that boundary talks JSON.
#[derive(Error, Debug)]
pub enum AgentmuxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Caller's role is not in the tool's allow-list.
    #[error("あなたのロール ({role}) では `{tool}` は使用禁止です")]
    Permission { tool: String, role: String },

    /// An enum-valued argument (role/status/message type/priority/profile)
    /// did not match its valid set.
    #[error("invalid value for {field}: {value} (valid: {valid})")]
    Argument {
        field: String,
        value: String,
        valid: String,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// `sender_id != caller_agent_id` on `send_message`.
    #[error("sender_id ({sender_id}) does not match caller_agent_id ({caller_agent_id})")]
    SenderBinding {
        sender_id: String,
        caller_agent_id: String,
    },

    /// Unknown receiver, worker broadcast attempt, or worker sending to a
    /// non-Admin.
    #[error("routing error: {message}")]
    Routing { message: String },

    /// Owner/Admin polling suppression tripped.
    #[error("polling_blocked: {message}")]
    PollingBlocked {
        message: String,
        next_action: &'static str,
    },

    /// `task_complete` rejected by the completion quality gate.
    #[error("quality gate needs_replan: {}", reasons.join("; "))]
    QualityGate {
        reasons: Vec<String>,
        suggestions: Vec<String>,
    },

    /// The file lock could not be acquired within the configured timeout.
    /// Distinct from I/O or parse errors so callers can choose to retry.
    #[error("lock timeout after {0:?}")]
    LockTimeout(std::time::Duration),

    /// A cooperative lock was attempted from inside an async context while
    /// contended; fails fast instead of risking a deadlock with the holder.
    #[error("lock contended inside an async context; fails fast instead of blocking")]
    LockWouldBlockInAsyncContext,

    /// Legacy dashboard file with disagreeing `description`/`task_file_path`.
    #[error("invalid_legacy_dashboard_format: {0}")]
    LegacyFormat(String),

    /// Message stored but tmux/macOS notification delivery did not succeed.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// A `tmux`/`git`/`gtr` subprocess exited non-zero; text is surfaced
    /// verbatim.
    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AgentmuxError>;

impl AgentmuxError {
    pub fn argument(field: impl Into<String>, value: impl Into<String>, valid: impl Into<String>) -> Self {
        Self::Argument {
            field: field.into(),
            value: value.into(),
            valid: valid.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing { message: message.into() }
    }
}
