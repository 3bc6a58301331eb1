//! Async tmux client (external collaborator, spec §6): pane placement and
//! `send-keys`/`capture-pane` plumbing for the Notification Dispatcher
//! (§4.E) and Task Dispatcher (§4.H). Adapted from the synchronous
//! `TmuxClient` in the teacher's root `src/tmux/mod.rs` to `tokio::process`
//! so it composes with the rest of the async server.

use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;

use crate::error::{AgentmuxError, Result};

#[derive(Debug, Clone)]
pub struct TmuxClient {
    pub send_keys_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self {
            send_keys_retries: 3,
            retry_backoff: Duration::from_millis(300),
        }
    }
}

fn target(session: &str, window_index: u32, pane_index: u32) -> String {
    format!("{session}:{window_index}.{pane_index}")
}

impl TmuxClient {
    pub async fn session_exists(&self, session: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", session])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub async fn new_session(&self, session: &str, working_dir: &str) -> Result<()> {
        let output = Command::new("tmux")
            .args(["new-session", "-d", "-s", session, "-c", working_dir])
            .output()
            .await?;
        if !output.status.success() {
            return Err(AgentmuxError::Subprocess(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }

    pub async fn new_window(&self, session: &str, window_index: u32, working_dir: &str) -> Result<()> {
        let output = Command::new("tmux")
            .args([
                "new-window",
                "-t",
                &format!("{session}:{window_index}"),
                "-c",
                working_dir,
            ])
            .output()
            .await?;
        if !output.status.success() {
            return Err(AgentmuxError::Subprocess(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }

    pub async fn rename_session(&self, old_name: &str, new_name: &str) -> Result<()> {
        let output = Command::new("tmux")
            .args(["rename-session", "-t", old_name, new_name])
            .output()
            .await?;
        if !output.status.success() {
            return Err(AgentmuxError::Subprocess(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }

    pub async fn kill_session(&self, session: &str) -> Result<()> {
        let output = Command::new("tmux").args(["kill-session", "-t", session]).output().await?;
        if !output.status.success() {
            return Err(AgentmuxError::Subprocess(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }

    /// Send `command` followed by `Enter`. Does not retry — callers that
    /// need delivery-confirmed retry (the Notification Dispatcher) use
    /// [`Self::send_keys_with_retry`] instead.
    pub async fn send_command(&self, session: &str, window_index: u32, pane_index: u32, command: &str) -> Result<()> {
        let t = target(session, window_index, pane_index);
        let output = Command::new("tmux")
            .args(["send-keys", "-t", &t, command, "Enter"])
            .output()
            .await?;
        if !output.status.success() {
            return Err(AgentmuxError::Subprocess(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }

    /// Retry loop used by the Notification Dispatcher: attempt `send-keys`
    /// up to `send_keys_retries` times with a fixed back-off, succeeding as
    /// soon as one attempt exits zero.
    pub async fn send_keys_with_retry(
        &self,
        session: &str,
        window_index: u32,
        pane_index: u32,
        keys: &str,
    ) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..self.send_keys_retries {
            match self.send_command(session, window_index, pane_index, keys).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < self.send_keys_retries {
                        sleep(self.retry_backoff).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AgentmuxError::Subprocess("send-keys retry exhausted".into())))
    }

    pub async fn capture_pane(&self, session: &str, window_index: u32, pane_index: u32) -> Result<String> {
        let t = target(session, window_index, pane_index);
        let output = Command::new("tmux").args(["capture-pane", "-t", &t, "-p"]).output().await?;
        if !output.status.success() {
            return Err(AgentmuxError::Subprocess(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_formats_session_window_pane() {
        assert_eq!(target("sess", 0, 1), "sess:0.1");
        assert_eq!(target("sess", 2, 3), "sess:2.3");
    }

    #[tokio::test]
    async fn session_exists_is_false_when_tmux_unavailable_or_absent() {
        let client = TmuxClient::default();
        // In a sandboxed test environment there is no `nonexistent-session`,
        // and tmux itself may not even be installed; either way this must
        // resolve to false rather than panicking.
        assert!(!client.session_exists("definitely-not-a-real-session-xyz").await);
    }
}
