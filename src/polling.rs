//! Polling-suppression & wait-lock state (spec §4.G): two in-memory maps
//! that stop short-lived agent processes from spinning on an empty inbox
//! or a not-yet-answered delegation. Persisted only by virtue of being
//! owned by the long-lived server process; a fresh process starts with
//! empty maps, matching the "per-process" wording in the spec.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{AgentmuxError, Result};

const ADMIN_POLL_GRACE: Duration = Duration::from_secs(30);
const ADMIN_DASHBOARD_WINDOW: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct OwnerWait {
    pub waiting_for_admin: bool,
    pub admin_id: Option<String>,
    pub session_id: Option<String>,
    pub locked_at: Instant,
    pub unlocked_at: Option<Instant>,
    pub unlock_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct AdminPollEntry {
    waiting_for_ipc: bool,
    last_poll_blocked_at: Option<Instant>,
    allow_dashboard_until: Option<Instant>,
}

#[derive(Default)]
pub struct PollingState {
    owner_wait: Mutex<HashMap<String, OwnerWait>>,
    admin_poll: Mutex<HashMap<String, AdminPollEntry>>,
}

impl PollingState {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Owner wait-lock --------------------------------------------

    pub fn lock_owner_wait(&self, owner_id: &str, admin_id: Option<String>, session_id: Option<String>) {
        let mut map = self.owner_wait.lock().expect("owner_wait mutex poisoned");
        map.insert(
            owner_id.to_string(),
            OwnerWait {
                waiting_for_admin: true,
                admin_id,
                session_id,
                locked_at: Instant::now(),
                unlocked_at: None,
                unlock_reason: None,
            },
        );
    }

    /// Idempotent manual unlock; defaults to `"manual_unlock"` when no
    /// reason is given (spec §9 Open Question decision, recorded in
    /// DESIGN.md).
    pub fn unlock_owner_wait(&self, owner_id: &str, reason: Option<String>) {
        let mut map = self.owner_wait.lock().expect("owner_wait mutex poisoned");
        if let Some(entry) = map.get_mut(owner_id) {
            entry.waiting_for_admin = false;
            entry.unlocked_at = Some(Instant::now());
            entry.unlock_reason = Some(reason.unwrap_or_else(|| "manual_unlock".to_string()));
        }
    }

    fn is_owner_waiting(&self, owner_id: &str) -> bool {
        self.owner_wait
            .lock()
            .expect("owner_wait mutex poisoned")
            .get(owner_id)
            .map(|w| w.waiting_for_admin)
            .unwrap_or(false)
    }

    fn expected_admin(&self, owner_id: &str) -> Option<String> {
        self.owner_wait
            .lock()
            .expect("owner_wait mutex poisoned")
            .get(owner_id)
            .and_then(|w| w.admin_id.clone())
    }

    /// Clears the lock when `sender_id` is the expected Admin (or any Admin
    /// when none was recorded) and the read produced at least one unread
    /// message. Returns whether the lock was actually cleared by this call.
    pub fn maybe_clear_owner_wait_on_read(&self, owner_id: &str, unread_senders: &[String]) -> bool {
        if !self.is_owner_waiting(owner_id) {
            return false;
        }
        let expected = self.expected_admin(owner_id);
        let clears = match expected {
            Some(admin_id) => unread_senders.iter().any(|s| s == &admin_id),
            None => !unread_senders.is_empty(),
        };
        if clears {
            self.unlock_owner_wait(owner_id, Some("admin_notification_consumed".to_string()));
        }
        clears
    }

    /// Owner reads are only permitted for their own, non-empty inbox while
    /// waiting; everything else (including dashboard reads) is blocked.
    pub fn check_owner_read(&self, owner_id: &str, target_agent_id: &str, target_inbox_is_empty: bool) -> Result<()> {
        if !self.is_owner_waiting(owner_id) {
            return Ok(());
        }
        if target_agent_id == owner_id && !target_inbox_is_empty {
            return Ok(());
        }
        Err(AgentmuxError::PollingBlocked {
            message: "owner is waiting for an admin reply".to_string(),
            next_action: "wait_for_user_input_or_unlock_owner_wait",
        })
    }

    pub fn check_owner_dashboard_read(&self, owner_id: &str) -> Result<()> {
        if self.is_owner_waiting(owner_id) {
            return Err(AgentmuxError::PollingBlocked {
                message: "owner is waiting for an admin reply".to_string(),
                next_action: "wait_for_user_input_or_unlock_owner_wait",
            });
        }
        Ok(())
    }

    // ---- Admin poll suppression --------------------------------------

    /// Called on every Admin `read_messages`/`get_unread_count`. Returns
    /// an error when the call should be rejected as a spin-loop poll.
    pub fn check_admin_poll(&self, admin_id: &str, unread_count: usize) -> Result<()> {
        let mut map = self.admin_poll.lock().expect("admin_poll mutex poisoned");
        let entry = map.entry(admin_id.to_string()).or_default();
        let now = Instant::now();

        if unread_count > 0 {
            entry.waiting_for_ipc = false;
            entry.last_poll_blocked_at = None;
            entry.allow_dashboard_until = Some(now + ADMIN_DASHBOARD_WINDOW);
            return Ok(());
        }

        match entry.last_poll_blocked_at {
            None => {
                entry.last_poll_blocked_at = Some(now);
                entry.waiting_for_ipc = true;
                Ok(())
            }
            Some(first_empty_at) if now.duration_since(first_empty_at) < ADMIN_POLL_GRACE => Err(AgentmuxError::PollingBlocked {
                message: "admin is polling an empty inbox too frequently".to_string(),
                next_action: "wait_for_user_input_or_unlock_owner_wait",
            }),
            Some(_) => {
                entry.last_poll_blocked_at = Some(now);
                Ok(())
            }
        }
    }

    pub fn check_admin_dashboard_read(&self, admin_id: &str) -> Result<()> {
        let map = self.admin_poll.lock().expect("admin_poll mutex poisoned");
        let Some(entry) = map.get(admin_id) else {
            return Ok(());
        };
        if !entry.waiting_for_ipc {
            return Ok(());
        }
        match entry.allow_dashboard_until {
            Some(until) if Instant::now() < until => Ok(()),
            _ => Err(AgentmuxError::PollingBlocked {
                message: "admin dashboard reads are suppressed while waiting on ipc".to_string(),
                next_action: "wait_for_user_input_or_unlock_owner_wait",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_read_of_own_nonempty_inbox_is_allowed_while_waiting() {
        let state = PollingState::new();
        state.lock_owner_wait("owner-1", Some("admin-1".into()), None);
        assert!(state.check_owner_read("owner-1", "owner-1", false).is_ok());
        assert!(state.check_owner_read("owner-1", "owner-1", true).is_err());
        assert!(state.check_owner_dashboard_read("owner-1").is_err());
    }

    #[test]
    fn reading_unread_from_expected_admin_clears_lock() {
        let state = PollingState::new();
        state.lock_owner_wait("owner-1", Some("admin-1".into()), None);
        assert!(state.maybe_clear_owner_wait_on_read("owner-1", &["admin-1".to_string()]));
        assert!(state.check_owner_dashboard_read("owner-1").is_ok());
    }

    #[test]
    fn manual_unlock_defaults_reason_to_manual_unlock() {
        let state = PollingState::new();
        state.lock_owner_wait("owner-1", None, None);
        state.unlock_owner_wait("owner-1", None);
        let reason = state.owner_wait.lock().unwrap().get("owner-1").unwrap().unlock_reason.clone();
        assert_eq!(reason.as_deref(), Some("manual_unlock"));
    }

    #[test]
    fn admin_second_empty_poll_within_grace_is_blocked_then_allowed_after() {
        let state = PollingState::new();
        assert!(state.check_admin_poll("admin-1", 0).is_ok());
        assert!(state.check_admin_poll("admin-1", 0).is_err());
    }

    #[test]
    fn admin_nonempty_poll_clears_suppression() {
        let state = PollingState::new();
        state.check_admin_poll("admin-1", 0).unwrap();
        state.check_admin_poll("admin-1", 3).unwrap();
        assert!(state.check_admin_dashboard_read("admin-1").is_ok());
    }
}
