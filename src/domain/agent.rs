use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::{AiCli, Role};

/// Agent liveness/activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Terminated,
}

/// A tmux `(session, window, pane)` placement. `None` for the Owner and for
/// headless agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanePlacement {
    pub session_name: String,
    pub window_index: u32,
    pub pane_index: u32,
}

/// A long-lived, role-tagged participant (spec §3 Agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub role: Role,
    pub placement: Option<PanePlacement>,
    pub ai_cli: Option<AiCli>,
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub worktree_path: Option<String>,
    pub working_dir: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(agent_id: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            role,
            placement: None,
            ai_cli: None,
            status: AgentStatus::Idle,
            current_task: None,
            worktree_path: None,
            working_dir: None,
            last_activity: now,
            created_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Display-label prefix derived from the agent's AI-CLI, falling back to
    /// `"worker"` for anything not in the known set (mirrors
    /// `dashboard_markdown_mixin.py::_resolve_cli_prefix`).
    pub fn cli_prefix(&self) -> &'static str {
        match self.ai_cli {
            Some(AiCli::Claude) => "claude",
            Some(AiCli::Codex) => "codex",
            Some(AiCli::Gemini) => "gemini",
            _ => "worker",
        }
    }

    /// Worker slot number derived from `(window_index, pane_index)`.
    ///
    /// `window_index=0, pane_index>=1` maps directly onto `pane_index`;
    /// additional tmux windows each carry 10 more worker slots. This
    /// formula is load-bearing for both display labels and worktree branch
    /// names — do not "simplify" it.
    pub fn worker_index(&self) -> Option<u32> {
        let p = self.placement.as_ref()?;
        if p.window_index == 0 && p.pane_index >= 1 {
            Some(p.pane_index)
        } else if p.window_index >= 1 {
            Some(6 + (p.window_index - 1) * 10 + p.pane_index + 1)
        } else {
            None
        }
    }

    /// Deterministic display label used in the dashboard Agents table.
    pub fn display_label(&self) -> String {
        match self.role {
            Role::Owner => "owner".to_string(),
            Role::Admin => "admin".to_string(),
            Role::Worker => match self.worker_index() {
                Some(n) => format!("{}{}", self.cli_prefix(), n),
                None => self.agent_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(window_index: u32, pane_index: u32) -> Agent {
        let mut a = Agent::new("w1", Role::Worker);
        a.placement = Some(PanePlacement {
            session_name: "s".into(),
            window_index,
            pane_index,
        });
        a
    }

    #[test]
    fn worker_index_window_zero() {
        assert_eq!(placed(0, 1).worker_index(), Some(1));
        assert_eq!(placed(0, 6).worker_index(), Some(6));
    }

    #[test]
    fn worker_index_extra_windows_carry_ten_each() {
        // window=1 pane=0 -> 6 + 0*10 + 0 + 1 = 7
        assert_eq!(placed(1, 0).worker_index(), Some(7));
        // window=2 pane=3 -> 6 + 1*10 + 3 + 1 = 20
        assert_eq!(placed(2, 3).worker_index(), Some(20));
    }

    #[test]
    fn worker_index_window_zero_pane_zero_is_admin_pane() {
        assert_eq!(placed(0, 0).worker_index(), None);
    }

    #[test]
    fn display_label_uses_role_and_cli_prefix() {
        let mut a = placed(0, 3);
        a.ai_cli = Some(AiCli::Codex);
        assert_eq!(a.display_label(), "codex3");

        let owner = Agent::new("o1", Role::Owner);
        assert_eq!(owner.display_label(), "owner");
    }
}
