//! Test support: a scriptable agent that records what it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::agents::{
    Agent, AgentCapability, AgentCommand, AgentError, AgentHealth, AgentResult, HealthStatus,
};
use crate::workflow::model::Context;

/// What the agent does for a given operation.
#[derive(Clone)]
pub(crate) enum Behavior {
    /// Succeed with this output
    Output(Context),
    /// Return a failed result
    Fail(String),
    /// Return an `Err`
    Error(String),
    /// Panic inside `execute`
    Panic(String),
    /// Sleep, then behave as the inner behavior
    Delay(Duration, Box<Behavior>),
    /// Wait for a notification, then behave as the inner behavior
    WaitFor(Arc<Notify>, Box<Behavior>),
}

impl Behavior {
    /// Succeed with the fields of a JSON object as output.
    pub(crate) fn output(value: Value) -> Self {
        Self::Output(to_context(value))
    }

    pub(crate) fn delayed(self, millis: u64) -> Self {
        Self::Delay(Duration::from_millis(millis), Box::new(self))
    }

    pub(crate) fn after(self, gate: Arc<Notify>) -> Self {
        Self::WaitFor(gate, Box::new(self))
    }
}

/// Builds a context from the fields of a JSON object.
pub(crate) fn to_context(value: Value) -> Context {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => Context::new(),
    }
}

/// Agent that records every command and answers per operation.
pub(crate) struct RecordingAgent {
    id: String,
    behaviors: HashMap<String, Behavior>,
    commands: Mutex<Vec<AgentCommand>>,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl RecordingAgent {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            behaviors: HashMap::new(),
            commands: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    /// Scripts the behavior for an operation. Unscripted operations succeed
    /// with empty output.
    pub(crate) fn on(mut self, operation: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(operation.to_string(), behavior);
        self
    }

    pub(crate) fn commands(&self) -> Vec<AgentCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn command_for_step(&self, step_id: &str) -> Option<AgentCommand> {
        self.commands().into_iter().find(|c| c.step_id == step_id)
    }

    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn perform(&self, behavior: Behavior) -> Result<AgentResult, AgentError> {
        let mut behavior = behavior;
        loop {
            match behavior {
                Behavior::Output(output) => return Ok(AgentResult::success(output)),
                Behavior::Fail(message) => return Ok(AgentResult::failure(message)),
                Behavior::Error(message) => return Err(AgentError::Execution(message)),
                Behavior::Panic(message) => panic!("{}", message),
                Behavior::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    behavior = *inner;
                }
                Behavior::WaitFor(gate, inner) => {
                    gate.notified().await;
                    behavior = *inner;
                }
            }
        }
    }
}

#[async_trait]
impl Agent for RecordingAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Recording agent"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        let mut operations: Vec<&String> = self.behaviors.keys().collect();
        operations.sort();
        operations
            .into_iter()
            .map(|op| AgentCapability::new(op.clone(), "scripted"))
            .collect()
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, command: AgentCommand) -> Result<AgentResult, AgentError> {
        let behavior = self
            .behaviors
            .get(&command.operation)
            .cloned()
            .unwrap_or_else(|| Behavior::Output(Context::new()));
        self.commands.lock().unwrap().push(command);
        self.perform(behavior).await
    }

    async fn health(&self) -> AgentHealth {
        AgentHealth::new(self.id.clone(), HealthStatus::Healthy)
    }
}
