//! Echo agent: returns its parameters as output.
//!
//! Useful for wiring and trying out workflows without side effects.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::debug;

use crate::workflow::model::{Context, OPERATION_KEY};

use super::agent::{
    Agent, AgentCapability, AgentCommand, AgentError, AgentHealth, AgentResult, HealthStatus,
};

/// Default id of the echo agent.
pub const ECHO_AGENT_ID: &str = "echo";

pub struct EchoAgent {
    id: String,
    running: AtomicBool,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self::with_id(ECHO_AGENT_ID)
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            running: AtomicBool::new(false),
        }
    }
}

impl Default for EchoAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Echo"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![
            AgentCapability::new("execute", "Return the parameters as output"),
            AgentCapability::new("echo", "Alias of execute"),
            AgentCapability::new("fail", "Fail with the `message` parameter"),
        ]
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, command: AgentCommand) -> Result<AgentResult, AgentError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AgentError::NotRunning(self.id.clone()));
        }

        match command.operation.as_str() {
            "execute" | "echo" => {
                let output: Context = command
                    .parameters
                    .into_iter()
                    .filter(|(key, _)| key != OPERATION_KEY)
                    .collect();
                debug!("Echoing {} parameters", output.len());
                Ok(AgentResult::success(output).with_log("echoed parameters"))
            }
            "fail" => {
                let message = command
                    .parameter_str("message")
                    .unwrap_or("Echo agent asked to fail")
                    .to_string();
                Ok(AgentResult::failure(message))
            }
            other => Err(AgentError::UnsupportedOperation {
                agent: self.id.clone(),
                operation: other.to_string(),
            }),
        }
    }

    async fn health(&self) -> AgentHealth {
        if self.running.load(Ordering::SeqCst) {
            AgentHealth::new(self.id.clone(), HealthStatus::Healthy)
        } else {
            AgentHealth::new(self.id.clone(), HealthStatus::Unhealthy).with_message("stopped")
        }
    }
}
