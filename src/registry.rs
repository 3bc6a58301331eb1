//! Agent Registry (spec §4.C): one JSON file per live agent, reloaded in
//! full on every tool call that reads the agent set. The server process
//! driving a single pane is expected to be short-lived, so the directory —
//! not any in-memory map — is the source of truth; `sync_agents_from_file`
//! is cheap enough (a handful of small JSON files) to call on every read.
//!
//! Grounded on the lock/atomic-write idiom in [`crate::lock`] and the
//! `agents.json` sync described in
//! `original_source/src/managers/dashboard_sync_mixin.py`, adapted here to
//! one-file-per-agent as the spec requires (the original keeps a single
//! combined `agents.json`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{Agent, Role};
use crate::error::{AgentmuxError, Result};
use crate::lock;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AgentRegistry {
    dir: PathBuf,
}

impl AgentRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn agent_path(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{agent_id}.json"))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join("_registry")
    }

    /// Reload every `*.json` file in the registry directory. Files that
    /// fail to parse are skipped with a warning log rather than aborting
    /// the whole sync — one corrupt agent file should not blind the server
    /// to every other live agent.
    pub fn sync_agents_from_file(&self) -> Result<HashMap<String, Agent>> {
        let _guard = lock::acquire(&self.lock_path(), LOCK_TIMEOUT)?;
        std::fs::create_dir_all(&self.dir)?;
        let mut agents = HashMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "agent registry read failed");
                    continue;
                }
            };
            match serde_json::from_slice::<Agent>(&bytes) {
                Ok(agent) => {
                    agents.insert(agent.agent_id.clone(), agent);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "agent registry parse failed");
                }
            }
        }
        Ok(agents)
    }

    /// Atomically rewrite one agent's file. Does not touch any other
    /// agent's file or take the whole-directory lock, so concurrent writers
    /// for distinct agents never contend.
    pub fn save_agent_to_file(&self, agent: &Agent) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec_pretty(agent)?;
        lock::atomic_write(&self.agent_path(&agent.agent_id), &bytes)
    }

    pub fn remove_agent(&self, agent_id: &str) -> Result<()> {
        let path = self.agent_path(agent_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn get(&self, agent_id: &str) -> Result<Agent> {
        self.sync_agents_from_file()?
            .remove(agent_id)
            .ok_or_else(|| AgentmuxError::not_found("agent", agent_id))
    }

    pub fn role_of(&self, agent_id: &str) -> Result<Role> {
        Ok(self.get(agent_id)?.role)
    }

    /// Stable-order (by `agent_id`) list of agents holding `role`.
    pub fn list_by_role(&self, role: Role) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .sync_agents_from_file()?
            .into_values()
            .filter(|a| a.role == role)
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    /// The single Admin, when exactly one is registered — used by the IPC
    /// bus's auto-reroute rule (spec §4.D).
    pub fn unique_admin(&self) -> Result<Option<Agent>> {
        let admins = self.list_by_role(Role::Admin)?;
        Ok(match admins.len() {
            1 => Some(admins.into_iter().next().unwrap()),
            _ => None,
        })
    }

    pub fn list_all(&self) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self.sync_agents_from_file()?.into_values().collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_sync_roundtrips() {
        let dir = tempdir().unwrap();
        let reg = AgentRegistry::new(dir.path());
        let agent = Agent::new("owner-1", Role::Owner);
        reg.save_agent_to_file(&agent).unwrap();
        let synced = reg.sync_agents_from_file().unwrap();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced["owner-1"].role, Role::Owner);
    }

    #[test]
    fn corrupt_file_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let reg = AgentRegistry::new(dir.path());
        reg.save_agent_to_file(&Agent::new("ok-1", Role::Worker)).unwrap();
        std::fs::write(dir.path().join("broken.json"), b"not json").unwrap();
        let synced = reg.sync_agents_from_file().unwrap();
        assert_eq!(synced.len(), 1);
    }

    #[test]
    fn unique_admin_is_none_when_zero_or_many() {
        let dir = tempdir().unwrap();
        let reg = AgentRegistry::new(dir.path());
        assert!(reg.unique_admin().unwrap().is_none());
        reg.save_agent_to_file(&Agent::new("admin-1", Role::Admin)).unwrap();
        assert!(reg.unique_admin().unwrap().is_some());
        reg.save_agent_to_file(&Agent::new("admin-2", Role::Admin)).unwrap();
        assert!(reg.unique_admin().unwrap().is_none());
    }

    #[test]
    fn list_by_role_is_stably_ordered() {
        let dir = tempdir().unwrap();
        let reg = AgentRegistry::new(dir.path());
        reg.save_agent_to_file(&Agent::new("worker-b", Role::Worker)).unwrap();
        reg.save_agent_to_file(&Agent::new("worker-a", Role::Worker)).unwrap();
        let workers = reg.list_by_role(Role::Worker).unwrap();
        assert_eq!(workers[0].agent_id, "worker-a");
        assert_eq!(workers[1].agent_id, "worker-b");
    }
}
