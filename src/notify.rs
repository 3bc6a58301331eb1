//! Notification Dispatcher (spec §4.E): wakes a message's recipient via
//! tmux `send-keys`, falling back to a desktop notification for
//! Admin→Owner deliveries when tmux is unavailable or fails. The
//! macOS-bundle-identifier pre-set technique is grounded on
//! `groblegark-oddjobs`'s desktop notify adapter — in a headless server
//! process, `notify-rust`'s first call otherwise blocks forever waiting on
//! an AppleScript bundle-ID lookup that requires Automation permissions.

use crate::domain::{Agent, Role};
use crate::tmux::TmuxClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    Tmux,
    MacosFallback,
    Macos,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Broadcast,
    Delivered,
    QueuedUnnotified,
}

pub struct NotifyOutcome {
    pub method: DeliveryMethod,
    pub state: DeliveryState,
}

#[cfg(target_os = "macos")]
fn preset_bundle_identifier() {
    let _ = mac_notification_sys::set_application("com.apple.Terminal");
}

#[cfg(not(target_os = "macos"))]
fn preset_bundle_identifier() {}

pub struct NotifyDispatcher {
    tmux: TmuxClient,
}

impl Default for NotifyDispatcher {
    fn default() -> Self {
        preset_bundle_identifier();
        Self {
            tmux: TmuxClient::default(),
        }
    }
}

impl NotifyDispatcher {
    pub fn new(tmux: TmuxClient) -> Self {
        preset_bundle_identifier();
        Self { tmux }
    }

    fn is_admin_to_owner(sender: &Agent, recipient: &Agent) -> bool {
        sender.role == Role::Admin && recipient.role == Role::Owner
    }

    /// Broadcast messages are stored in every inbox but never poked — the
    /// caller reports `broadcast` unconditionally per spec §4.E.
    pub async fn notify_broadcast(&self) -> NotifyOutcome {
        NotifyOutcome {
            method: DeliveryMethod::None,
            state: DeliveryState::Broadcast,
        }
    }

    /// Point-to-point delivery decision table (spec §4.E). `title`/`body`
    /// are only used on the desktop-notification paths.
    pub async fn notify_point_to_point(
        &self,
        sender: &Agent,
        recipient: &Agent,
        title: &str,
        body: &str,
    ) -> NotifyOutcome {
        let admin_to_owner = Self::is_admin_to_owner(sender, recipient);

        if let Some(placement) = &recipient.placement {
            let tmux_ok = self
                .tmux
                .send_keys_with_retry(&placement.session_name, placement.window_index, placement.pane_index, body)
                .await
                .is_ok();

            if tmux_ok {
                return NotifyOutcome {
                    method: DeliveryMethod::Tmux,
                    state: DeliveryState::Delivered,
                };
            }

            if admin_to_owner && send_desktop_notification(title, body) {
                return NotifyOutcome {
                    method: DeliveryMethod::MacosFallback,
                    state: DeliveryState::Delivered,
                };
            }

            return NotifyOutcome {
                method: DeliveryMethod::None,
                state: DeliveryState::QueuedUnnotified,
            };
        }

        if admin_to_owner {
            return if send_desktop_notification(title, body) {
                NotifyOutcome {
                    method: DeliveryMethod::Macos,
                    state: DeliveryState::Delivered,
                }
            } else {
                NotifyOutcome {
                    method: DeliveryMethod::None,
                    state: DeliveryState::QueuedUnnotified,
                }
            };
        }

        NotifyOutcome {
            method: DeliveryMethod::None,
            state: DeliveryState::QueuedUnnotified,
        }
    }
}

/// Fire-and-forget on tokio's blocking pool since `notify-rust`'s `show()`
/// is synchronous on macOS/Linux desktop backends.
fn send_desktop_notification(title: &str, body: &str) -> bool {
    let title = title.to_string();
    let body = body.to_string();
    match notify_rust::Notification::new().summary(&title).body(&body).show() {
        Ok(_) => {
            tracing::info!(%title, "desktop notification sent");
            true
        }
        Err(e) => {
            tracing::warn!(%title, error = %e, "desktop notification failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Agent, PanePlacement, Role};

    #[tokio::test]
    async fn no_pane_and_not_admin_to_owner_is_queued_unnotified_without_attempting_anything() {
        let dispatcher = NotifyDispatcher::default();
        let sender = Agent::new("worker-1", Role::Worker);
        let recipient = Agent::new("worker-2", Role::Worker);
        let outcome = dispatcher.notify_point_to_point(&sender, &recipient, "t", "b").await;
        assert_eq!(outcome.method, DeliveryMethod::None);
        assert_eq!(outcome.state, DeliveryState::QueuedUnnotified);
    }

    #[tokio::test]
    async fn has_pane_but_tmux_fails_and_not_admin_to_owner_is_queued_unnotified() {
        let dispatcher = NotifyDispatcher::default();
        let sender = Agent::new("admin-1", Role::Admin);
        let mut recipient = Agent::new("worker-1", Role::Worker);
        recipient.placement = Some(PanePlacement {
            session_name: "definitely-not-a-real-session-xyz".into(),
            window_index: 0,
            pane_index: 1,
        });
        let outcome = dispatcher.notify_point_to_point(&sender, &recipient, "t", "b").await;
        assert_eq!(outcome.method, DeliveryMethod::None);
        assert_eq!(outcome.state, DeliveryState::QueuedUnnotified);
    }

    #[tokio::test]
    async fn broadcast_always_reports_broadcast_state() {
        let dispatcher = NotifyDispatcher::default();
        let outcome = dispatcher.notify_broadcast().await;
        assert_eq!(outcome.state, DeliveryState::Broadcast);
    }
}
