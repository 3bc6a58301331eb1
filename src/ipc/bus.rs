//! The IPC Bus (spec §4.D): routing, broadcast fan-out, and the
//! Worker→Admin auto-reroute rule on top of per-agent [`Inbox`]es.

use std::path::PathBuf;

use crate::domain::{Message, MessageType, Role};
use crate::error::{AgentmuxError, Result};
use crate::registry::AgentRegistry;

use super::inbox::Inbox;

pub struct IpcBus {
    inboxes_root: PathBuf,
    registry: AgentRegistry,
}

pub struct SendMessageRequest {
    pub sender_id: String,
    pub caller_agent_id: String,
    pub receiver_id: Option<String>,
    pub message_type: MessageType,
    pub subject: String,
    pub content: String,
    /// Structured payload the Auto-Reconciler (`task_id`/`progress`/
    /// `checklist`) and quality gate consult; `Null` for plain messages.
    pub metadata: serde_json::Value,
}

pub struct SendMessageOutcome {
    pub message: Message,
    pub rerouted_receiver_id: Option<String>,
}

impl IpcBus {
    pub fn new(inboxes_root: impl Into<PathBuf>, registry: AgentRegistry) -> Self {
        Self {
            inboxes_root: inboxes_root.into(),
            registry,
        }
    }

    fn inbox(&self, agent_id: &str) -> Inbox {
        Inbox::new(&self.inboxes_root, agent_id)
    }

    pub fn register_agent(&self, agent_id: &str) -> Result<()> {
        self.inbox(agent_id).register()
    }

    /// Resolve routing (including the Worker→Admin auto-reroute and the
    /// Worker-may-not-broadcast rule), deliver to one or every inbox, and
    /// return the stored message plus whether it was rerouted.
    pub fn send_message(&self, req: SendMessageRequest) -> Result<SendMessageOutcome> {
        if req.sender_id != req.caller_agent_id {
            return Err(AgentmuxError::SenderBinding {
                sender_id: req.sender_id,
                caller_agent_id: req.caller_agent_id,
            });
        }

        let sender_role = self.registry.role_of(&req.sender_id)?;

        if sender_role == Role::Worker && req.receiver_id.is_none() {
            return Err(AgentmuxError::routing(
                "Worker は send_message をブロードキャストできません。Admin の agent_id を receiver_id に指定してください。",
            ));
        }

        let mut rerouted_receiver_id = None;
        let mut receiver_id = req.receiver_id.clone();

        if let Some(target) = &receiver_id {
            if self.registry.get(target).is_err() {
                // Named receiver doesn't resolve. A Worker's unresolvable
                // `Request` receiver reroutes to the unique Admin; anything
                // else is a plain routing error.
                let is_worker_request =
                    sender_role == Role::Worker && req.message_type == MessageType::Request;
                if is_worker_request {
                    match self.registry.unique_admin()? {
                        Some(admin) => {
                            rerouted_receiver_id = Some(admin.agent_id.clone());
                            receiver_id = Some(admin.agent_id);
                        }
                        None => {
                            return Err(AgentmuxError::routing(
                                "不正な receiver_id です（有効な Admin が一意に解決できません）",
                            ));
                        }
                    }
                } else {
                    return Err(AgentmuxError::routing(format!(
                        "受信者 {target} が見つかりません"
                    )));
                }
            } else if sender_role == Role::Worker {
                let target_role = self.registry.role_of(target)?;
                if target_role != Role::Admin {
                    return Err(AgentmuxError::routing(
                        "Worker は Admin 以外に send_message できません。",
                    ));
                }
            }
        } else if sender_role == Role::Worker {
            unreachable!("broadcast-without-receiver already rejected above");
        }

        let mut message = Message::new(
            req.sender_id.clone(),
            receiver_id.clone(),
            req.message_type,
            req.subject,
            req.content,
        );
        message.metadata = req.metadata;

        match &receiver_id {
            // Resolution (direct or rerouted) already happened above.
            Some(target) => {
                self.inbox(target).deliver(&message)?;
            }
            None => {
                for agent in self.registry.list_all()? {
                    if agent.agent_id == req.sender_id {
                        continue;
                    }
                    self.inbox(&agent.agent_id).deliver(&message)?;
                }
            }
        }

        if rerouted_receiver_id.is_some() {
            message.receiver_id = receiver_id;
        }

        Ok(SendMessageOutcome {
            message,
            rerouted_receiver_id,
        })
    }

    pub fn read_messages(
        &self,
        agent_id: &str,
        unread_only: bool,
        type_filter: Option<MessageType>,
        mark_as_read: bool,
    ) -> Result<Vec<Message>> {
        let inbox = self.inbox(agent_id);
        let mut messages = inbox.read_all()?;
        if unread_only {
            messages.retain(|m| m.read_at.is_none());
        }
        if let Some(t) = type_filter {
            messages.retain(|m| m.message_type == t);
        }
        if mark_as_read {
            let ids: Vec<String> = messages.iter().filter(|m| m.read_at.is_none()).map(|m| m.id.clone()).collect();
            if !ids.is_empty() {
                inbox.mark_read(&ids)?;
                // reflect the mark in the values we return too
                let now = chrono::Utc::now();
                for m in messages.iter_mut() {
                    if m.read_at.is_none() {
                        m.read_at = Some(now);
                    }
                }
            }
        }
        Ok(messages)
    }

    pub fn get_unread_count(&self, agent_id: &str) -> Result<usize> {
        self.inbox(agent_id).unread_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Agent;
    use tempfile::tempdir;

    fn bus() -> (tempfile::TempDir, IpcBus) {
        let dir = tempdir().unwrap();
        let registry = AgentRegistry::new(dir.path().join("agents"));
        registry.save_agent_to_file(&Agent::new("admin-1", Role::Admin)).unwrap();
        registry.save_agent_to_file(&Agent::new("worker-1", Role::Worker)).unwrap();
        registry.save_agent_to_file(&Agent::new("owner-1", Role::Owner)).unwrap();
        let bus = IpcBus::new(dir.path().join("inboxes"), registry);
        (dir, bus)
    }

    #[test]
    fn sender_id_must_equal_caller_agent_id() {
        let (_dir, bus) = bus();
        let err = bus
            .send_message(SendMessageRequest {
                sender_id: "admin-1".into(),
                caller_agent_id: "worker-1".into(),
                receiver_id: Some("owner-1".into()),
                message_type: MessageType::System,
                subject: "s".into(),
                content: "c".into(),
                metadata: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, AgentmuxError::SenderBinding { .. }));
    }

    #[test]
    fn worker_cannot_broadcast() {
        let (_dir, bus) = bus();
        let err = bus
            .send_message(SendMessageRequest {
                sender_id: "worker-1".into(),
                caller_agent_id: "worker-1".into(),
                receiver_id: None,
                message_type: MessageType::StatusUpdate,
                subject: "s".into(),
                content: "c".into(),
                metadata: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, AgentmuxError::Routing { .. }));
    }

    #[test]
    fn worker_request_with_unknown_receiver_reroutes_to_unique_admin() {
        let (_dir, bus) = bus();
        let outcome = bus
            .send_message(SendMessageRequest {
                sender_id: "worker-1".into(),
                caller_agent_id: "worker-1".into(),
                receiver_id: Some("stale-id".into()),
                message_type: MessageType::Request,
                subject: "help".into(),
                content: "stuck".into(),
                metadata: serde_json::Value::Null,
            })
            .unwrap();
        assert_eq!(outcome.rerouted_receiver_id.as_deref(), Some("admin-1"));
        assert_eq!(bus.get_unread_count("admin-1").unwrap(), 1);
    }

    #[test]
    fn non_worker_request_with_unknown_receiver_is_a_plain_routing_error() {
        let (_dir, bus) = bus();
        let err = bus
            .send_message(SendMessageRequest {
                sender_id: "admin-1".into(),
                caller_agent_id: "admin-1".into(),
                receiver_id: Some("stale-id".into()),
                message_type: MessageType::System,
                subject: "s".into(),
                content: "c".into(),
                metadata: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, AgentmuxError::Routing { .. }));
    }

    #[test]
    fn worker_cannot_send_to_owner_directly() {
        let (_dir, bus) = bus();
        let err = bus
            .send_message(SendMessageRequest {
                sender_id: "worker-1".into(),
                caller_agent_id: "worker-1".into(),
                receiver_id: Some("owner-1".into()),
                message_type: MessageType::StatusUpdate,
                subject: "s".into(),
                content: "c".into(),
                metadata: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, AgentmuxError::Routing { .. }));
    }

    #[test]
    fn read_messages_marks_read_by_default() {
        let (_dir, bus) = bus();
        bus.send_message(SendMessageRequest {
            sender_id: "admin-1".into(),
            caller_agent_id: "admin-1".into(),
            receiver_id: Some("worker-1".into()),
            message_type: MessageType::TaskAssign,
            subject: "s".into(),
            content: "do it".into(),
            metadata: serde_json::Value::Null,
        })
        .unwrap();
        let msgs = bus.read_messages("worker-1", false, None, true).unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].read_at.is_some());
        assert_eq!(bus.get_unread_count("worker-1").unwrap(), 0);
    }
}
