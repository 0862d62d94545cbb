//! Agent Directory
//!
//! Thread-safe registry of live agents keyed by id. The directory is the
//! only path through which steps reach an agent; an unknown id yields a
//! failed [`AgentResult`] instead of an error so that a missing agent is
//! handled like any other failed step.

use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};

use crate::error::{Result, WorkflowError};

use super::agent::{Agent, AgentCommand, AgentError, AgentHealth, AgentInfo, AgentResult};

/// Registry of pluggable executors.
#[derive(Default)]
pub struct AgentDirectory {
    agents: DashMap<String, Arc<dyn Agent>>,
}

impl AgentDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    /// Starts `agent` and registers it, replacing any agent with the same id.
    ///
    /// A replaced agent is stopped. If `start` fails nothing is registered.
    pub async fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let id = agent.id().to_string();
        agent.start().await?;

        let previous = self.agents.insert(id.clone(), agent.clone());
        match previous {
            Some(previous) if !same_agent(&previous, &agent) => {
                info!("Replaced agent '{}'", id);
                if let Err(e) = previous.stop().await {
                    warn!("Failed to stop replaced agent '{}': {}", id, e);
                }
            }
            Some(_) => debug!("Agent '{}' re-registered", id),
            None => info!("Registered agent '{}'", id),
        }
        Ok(())
    }

    /// Stops and removes an agent.
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let (_, agent) = self
            .agents
            .remove(id)
            .ok_or_else(|| WorkflowError::not_found("Agent", id))?;

        info!("Unregistered agent '{}'", id);
        agent.stop().await?;
        Ok(())
    }

    /// Gets an agent by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Lists registered agents, sorted by id.
    pub fn list(&self) -> Vec<AgentInfo> {
        let mut infos: Vec<AgentInfo> = self.snapshot().iter().map(|a| a.info()).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Dispatches a command to an agent.
    ///
    /// Unknown ids produce a failed result rather than an error.
    pub async fn execute(
        &self,
        agent_id: &str,
        command: AgentCommand,
    ) -> std::result::Result<AgentResult, AgentError> {
        let Some(agent) = self.get(agent_id) else {
            warn!("No agent registered with id '{}'", agent_id);
            return Ok(AgentResult::failure(format!("Agent '{}' not found", agent_id)));
        };

        debug!(
            "Dispatching '{}' to agent '{}' (command {})",
            command.operation, agent_id, command.id
        );
        agent.execute(command).await
    }

    /// Health of one agent.
    pub async fn health(&self, id: &str) -> Result<AgentHealth> {
        let agent = self
            .get(id)
            .ok_or_else(|| WorkflowError::not_found("Agent", id))?;
        Ok(agent.health().await)
    }

    /// Health of every registered agent, sorted by id.
    pub async fn all_health(&self) -> Vec<AgentHealth> {
        let mut reports = Vec::with_capacity(self.agents.len());
        for agent in self.snapshot() {
            reports.push(agent.health().await);
        }
        reports.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        reports
    }

    /// Clones the current agents out of the map so no shard lock is held
    /// across an await.
    fn snapshot(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.iter().map(|entry| entry.value().clone()).collect()
    }
}

fn same_agent(a: &Arc<dyn Agent>, b: &Arc<dyn Agent>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
