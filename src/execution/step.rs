//! Individual Step Execution
//!
//! Turns one [`WorkflowStep`] into one agent call and records the outcome:
//! - Input bag: mapped context values, then the step configuration on top
//! - Operation: `configuration["operation"]`, else `"execute"`
//! - Agent errors, panics and deadline overruns become a failed record
//!
//! Nothing here returns an error; the caller always gets a
//! [`WorkflowStepExecution`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, warn};

use crate::agents::{AgentCommand, AgentDirectory};
use crate::workflow::model::{Context, WorkflowStep, WorkflowStepExecution};

/// Builds the parameters sent to the agent.
///
/// Mapped context values are copied first; configuration entries are then
/// written over them, so configuration wins on a key collision.
pub fn build_parameters(step: &WorkflowStep, context: &Context) -> (Context, Vec<String>) {
    let mut parameters = Context::new();
    let mut missing = Vec::new();

    for (local_key, context_key) in &step.input_mapping {
        match context.get(context_key) {
            Some(value) => {
                parameters.insert(local_key.clone(), value.clone());
            }
            None => missing.push(context_key.clone()),
        }
    }
    missing.sort();

    for (key, value) in &step.configuration {
        parameters.insert(key.clone(), value.clone());
    }

    (parameters, missing)
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Dispatches steps to agents and records the results.
#[derive(Clone)]
pub struct StepExecutor {
    agents: Arc<AgentDirectory>,
    enforce_timeouts: bool,
}

impl StepExecutor {
    pub fn new(agents: Arc<AgentDirectory>, enforce_timeouts: bool) -> Self {
        Self {
            agents,
            enforce_timeouts,
        }
    }

    /// Executes one step against a context snapshot.
    pub async fn execute_step(
        &self,
        step: &WorkflowStep,
        execution_id: &str,
        context: &Context,
    ) -> WorkflowStepExecution {
        let mut record = WorkflowStepExecution::begin(execution_id, step);
        let (parameters, missing) = build_parameters(step, context);

        for key in &missing {
            record.log(format!("Context key '{}' not present; input left unset", key));
        }
        record.input_data = parameters.clone();

        let operation = step.operation().to_string();
        let mut command = AgentCommand::new(operation.clone(), parameters);
        command.timeout_seconds = step.timeout_seconds;
        command.workflow_execution_id = execution_id.to_string();
        command.step_id = step.id.clone();

        debug!(
            "Step '{}': dispatching '{}' to agent '{}'",
            step.id, operation, step.agent_id
        );
        record.log(format!(
            "Dispatching '{}' to agent '{}'",
            operation, step.agent_id
        ));

        let call = AssertUnwindSafe(self.agents.execute(&step.agent_id, command)).catch_unwind();
        let outcome = if self.enforce_timeouts && step.timeout_seconds > 0 {
            match tokio::time::timeout(Duration::from_secs(step.timeout_seconds), call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let message = format!("Step timed out after {} seconds", step.timeout_seconds);
                    warn!("Step '{}': {}", step.id, message);
                    record.fail(message);
                    return record;
                }
            }
        } else {
            call.await
        };

        match outcome {
            Ok(Ok(result)) => {
                record.logs.extend(result.logs);
                if result.success {
                    debug!("Step '{}' completed", step.id);
                    record.log("Completed");
                    record.complete(result.output_data);
                } else {
                    let message = result
                        .error_message
                        .unwrap_or_else(|| format!("Agent '{}' reported failure", step.agent_id));
                    error!("Step '{}' failed: {}", step.id, message);
                    record.output_data = result.output_data;
                    record.fail(message);
                }
            }
            Ok(Err(e)) => {
                error!("Step '{}' agent error: {}", step.id, e);
                record.fail(e.to_string());
            }
            Err(payload) => {
                let message = format!("Agent '{}' panicked: {}", step.agent_id, panic_message(&*payload));
                error!("Step '{}': {}", step.id, message);
                record.fail(message);
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{to_context, Behavior, RecordingAgent};
    use crate::workflow::model::ExecutionStatus;
    use serde_json::json;

    async fn executor_with(agent: RecordingAgent, enforce_timeouts: bool) -> (StepExecutor, Arc<RecordingAgent>) {
        let agent = Arc::new(agent);
        let directory = Arc::new(AgentDirectory::new());
        directory.register(agent.clone()).await.unwrap();
        (StepExecutor::new(directory, enforce_timeouts), agent)
    }

    #[test]
    fn test_configuration_overrides_mapped_input() {
        let step = WorkflowStep::new("a", "fs")
            .map_input("path", "picked_path")
            .map_input("mode", "mode")
            .with_config("path", "/etc/fixed");
        let context = to_context(json!({"picked_path": "/tmp/x", "mode": "r"}));

        let (parameters, missing) = build_parameters(&step, &context);

        assert_eq!(parameters["path"], json!("/etc/fixed"));
        assert_eq!(parameters["mode"], json!("r"));
        assert!(missing.is_empty());
    }

    #[test]
    fn test_missing_context_keys_are_reported() {
        let step = WorkflowStep::new("a", "fs").map_input("path", "absent");
        let (parameters, missing) = build_parameters(&step, &Context::new());
        assert!(parameters.is_empty());
        assert_eq!(missing, vec!["absent"]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[tokio::test]
    async fn test_successful_step_dispatches_command() {
        let (executor, agent) = executor_with(
            RecordingAgent::new("fs").on("read_file", Behavior::output(json!({"content": "hi"}))),
            true,
        )
        .await;
        let step = WorkflowStep::new("read", "fs")
            .with_operation("read_file")
            .map_input("file_path", "picked_path")
            .with_timeout(5);
        let context = to_context(json!({"picked_path": "/tmp/x"}));

        let record = executor.execute_step(&step, "exec-1", &context).await;

        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.output_data["content"], json!("hi"));
        assert!(record.end_time.is_some());

        let command = agent.command_for_step("read").unwrap();
        assert_eq!(command.operation, "read_file");
        assert_eq!(command.parameters["file_path"], json!("/tmp/x"));
        assert_eq!(command.timeout_seconds, 5);
        assert_eq!(command.workflow_execution_id, "exec-1");
    }

    #[tokio::test]
    async fn test_default_operation() {
        let (executor, agent) = executor_with(RecordingAgent::new("fs"), true).await;
        let step = WorkflowStep::new("a", "fs");

        executor.execute_step(&step, "exec-1", &Context::new()).await;

        assert_eq!(agent.commands()[0].operation, "execute");
    }

    #[tokio::test]
    async fn test_failed_result_is_failed_record() {
        let (executor, _) = executor_with(
            RecordingAgent::new("fs").on("execute", Behavior::Fail("disk full".to_string())),
            true,
        )
        .await;

        let record = executor
            .execute_step(&WorkflowStep::new("a", "fs"), "exec-1", &Context::new())
            .await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_agent_error_is_captured() {
        let (executor, _) = executor_with(
            RecordingAgent::new("fs").on("execute", Behavior::Error("socket closed".to_string())),
            true,
        )
        .await;

        let record = executor
            .execute_step(&WorkflowStep::new("a", "fs"), "exec-1", &Context::new())
            .await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("socket closed"));
    }

    #[tokio::test]
    async fn test_agent_panic_is_captured() {
        let (executor, _) = executor_with(
            RecordingAgent::new("fs").on("execute", Behavior::Panic("kaboom".to_string())),
            true,
        )
        .await;

        let record = executor
            .execute_step(&WorkflowStep::new("a", "fs"), "exec-1", &Context::new())
            .await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_failed_record() {
        let executor = StepExecutor::new(Arc::new(AgentDirectory::new()), true);

        let record = executor
            .execute_step(&WorkflowStep::new("a", "ghost"), "exec-1", &Context::new())
            .await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_enforced() {
        let (executor, _) = executor_with(
            RecordingAgent::new("fs").on("execute", Behavior::output(json!({})).delayed(5_000)),
            true,
        )
        .await;
        let step = WorkflowStep::new("slow", "fs").with_timeout(1);

        let record = executor.execute_step(&step, "exec-1", &Context::new()).await;

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("timed out after 1 seconds"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_enforced_when_disabled() {
        let (executor, _) = executor_with(
            RecordingAgent::new("fs").on("execute", Behavior::output(json!({"ok": true})).delayed(5_000)),
            false,
        )
        .await;
        let step = WorkflowStep::new("slow", "fs").with_timeout(1);

        let record = executor.execute_step(&step, "exec-1", &Context::new()).await;

        assert_eq!(record.status, ExecutionStatus::Completed);
    }
}
