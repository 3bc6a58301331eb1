//! Per-recipient inbox: a directory of message files (YAML front matter,
//! the full spec §3 `Message` shape, no separate body — unlike
//! `dashboard.md` there is no human-readable section to keep in sync).
//! Grounded on [`crate::lock`]'s atomic-write/lock idiom and
//! `original_source/src/tools/ipc.py`'s `read_messages`/`get_unread_count`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Message;
use crate::error::Result;
use crate::lock;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Inbox {
    dir: PathBuf,
}

impl Inbox {
    pub fn new(inboxes_root: &Path, agent_id: &str) -> Self {
        Self {
            dir: inboxes_root.join(agent_id),
        }
    }

    pub fn register(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn message_path(&self, message: &Message) -> PathBuf {
        self.dir.join(format!("{}.yaml", message.id))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join("_inbox")
    }

    pub fn deliver(&self, message: &Message) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let yaml = serde_yaml::to_string(message)?;
        lock::atomic_write(&self.message_path(message), yaml.as_bytes())
    }

    /// Read every message file in creation order. Files with no parseable
    /// YAML front matter are skipped (logged at debug) rather than treated
    /// as an error — content is never truncated or repaired.
    pub fn read_all(&self) -> Result<Vec<Message>> {
        std::fs::create_dir_all(&self.dir)?;
        let mut messages = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            match serde_yaml::from_slice::<Message>(&bytes) {
                Ok(m) => messages.push(m),
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "inbox file not a message"),
            }
        }
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    /// Stamp `read_at` on every message in `ids` and persist.
    pub fn mark_read(&self, ids: &[String]) -> Result<()> {
        let _guard = lock::acquire(&self.lock_path(), LOCK_TIMEOUT)?;
        for id in ids {
            let path = self.dir.join(format!("{id}.yaml"));
            if !path.exists() {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            if let Ok(mut message) = serde_yaml::from_slice::<Message>(&bytes) {
                if message.read_at.is_none() {
                    message.read_at = Some(chrono::Utc::now());
                    let yaml = serde_yaml::to_string(&message)?;
                    lock::atomic_write(&path, yaml.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    pub fn unread_count(&self) -> Result<usize> {
        Ok(self.read_all()?.iter().filter(|m| m.read_at.is_none()).count())
    }
}
