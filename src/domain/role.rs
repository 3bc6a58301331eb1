use serde::{Deserialize, Serialize};

use crate::error::{AgentmuxError, Result};

/// Fixed set of agent roles (spec §3 Role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Worker,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Worker => "worker",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "worker" => Ok(Role::Worker),
            other => Err(AgentmuxError::argument("role", other, "owner, admin, worker")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// AI-CLI backends an agent may be driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiCli {
    Claude,
    Codex,
    Gemini,
    Cursor,
}

impl AiCli {
    pub fn as_str(self) -> &'static str {
        match self {
            AiCli::Claude => "claude",
            AiCli::Codex => "codex",
            AiCli::Gemini => "gemini",
            AiCli::Cursor => "cursor",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "claude" => Ok(AiCli::Claude),
            "codex" => Ok(AiCli::Codex),
            "gemini" => Ok(AiCli::Gemini),
            "cursor" => Ok(AiCli::Cursor),
            other => Err(AgentmuxError::argument(
                "ai_cli",
                other,
                "claude, codex, gemini, cursor",
            )),
        }
    }
}

impl std::fmt::Display for AiCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
