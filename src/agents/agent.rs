//! Agent Contract
//!
//! Agents are the pluggable executors that steps dispatch to. Each agent is
//! identified by an id, advertises the named operations it supports, and
//! turns an [`AgentCommand`] into an [`AgentResult`].

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::workflow::model::Context;

/// Faults an agent can raise while handling a command.
///
/// The step executor converts every one of these into a failed step record.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent '{0}' is not running")]
    NotRunning(String),

    #[error("Operation '{operation}' is not supported by agent '{agent}'")]
    UnsupportedOperation { agent: String, operation: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A named operation an agent can perform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AgentCapability {
    pub name: String,
    pub description: String,
}

impl AgentCapability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Work order sent to an agent for one step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentCommand {
    pub id: String,
    pub operation: String,
    pub parameters: Context,
    /// Deadline hint for the agent; 0 means none
    pub timeout_seconds: u64,
    pub workflow_execution_id: String,
    pub step_id: String,
}

impl AgentCommand {
    pub fn new(operation: impl Into<String>, parameters: Context) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation: operation.into(),
            parameters,
            timeout_seconds: 0,
            workflow_execution_id: String::new(),
            step_id: String::new(),
        }
    }

    /// Returns a string parameter, if present.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// Outcome reported by an agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AgentResult {
    pub success: bool,
    #[serde(default)]
    pub output_data: Context,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl AgentResult {
    pub fn success(output_data: Context) -> Self {
        Self {
            success: true,
            output_data,
            error_message: None,
            logs: Vec::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_data: Context::new(),
            error_message: Some(error.into()),
            logs: Vec::new(),
        }
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }
}

/// Liveness of an agent.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Healthy => "Healthy",
            Self::Degraded => "Degraded",
            Self::Unhealthy => "Unhealthy",
        };
        f.write_str(name)
    }
}

/// Health report for one agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentHealth {
    pub agent_id: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl AgentHealth {
    pub fn new(agent_id: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            agent_id: agent_id.into(),
            status,
            message: None,
            checked_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Directory listing entry for a registered agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<AgentCapability>,
}

/// A pluggable executor.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique id steps refer to.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Named operations this agent understands.
    fn capabilities(&self) -> Vec<AgentCapability>;

    /// Called when the agent is registered.
    async fn start(&self) -> Result<(), AgentError>;

    /// Called when the agent is unregistered or replaced.
    async fn stop(&self) -> Result<(), AgentError>;

    /// Handles one command.
    async fn execute(&self, command: AgentCommand) -> Result<AgentResult, AgentError>;

    /// Reports liveness.
    async fn health(&self) -> AgentHealth;

    /// Directory listing entry.
    fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            capabilities: self.capabilities(),
        }
    }
}
