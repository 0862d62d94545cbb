//! Workflow Execution Engine
//!
//! The coordinator behind the public workflow API:
//! - Definition CRUD, validated against the live agent directory
//! - Fire-and-forget execution: one background task per execution
//! - Cooperative cancellation through the running-execution registry
//!
//! `execute_workflow` returns as soon as the Running record is persisted.
//! Callers observe the outcome with [`Engine::get_execution`] or
//! [`Engine::wait_for_execution`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::AgentDirectory;
use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::store::WorkflowStore;
use crate::workflow::condition::{ConditionEvaluator, ExistsConditionEvaluator};
use crate::workflow::model::{
    Context, ExecutionStatus, WorkflowDefinition, WorkflowExecution,
};
use crate::workflow::validator::{validate_workflow, ValidationResult};

use super::registry::RunningExecutions;
use super::step::{panic_message, StepExecutor};
use super::strategy::{strategy_for, ExecutionRun, StrategyOutcome};

/// Pause before the single retry of a failed final save.
const FINAL_SAVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Workflow execution engine.
///
/// Cheap to clone; clones share the directory, store and registry.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use agentrunner::agents::{AgentDirectory, EchoAgent};
/// use agentrunner::execution::Engine;
/// use agentrunner::store::InMemoryStore;
/// use agentrunner::workflow::{load_definition_file, Context};
///
/// # async fn run() -> agentrunner::Result<()> {
/// let agents = Arc::new(AgentDirectory::new());
/// agents.register(Arc::new(EchoAgent::new())).await?;
///
/// let engine = Engine::new(agents, Arc::new(InMemoryStore::new()));
/// let definition = engine.create_workflow(load_definition_file("pipeline.yaml")?).await?;
///
/// let execution = engine.execute_workflow(&definition.id, Context::new(), "me").await?;
/// let finished = engine
///     .wait_for_execution(&execution.id, Duration::from_millis(100))
///     .await?;
/// println!("{}", finished.status);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Engine {
    agents: Arc<AgentDirectory>,
    store: Arc<dyn WorkflowStore>,
    running: Arc<RunningExecutions>,
    conditions: Arc<dyn ConditionEvaluator>,
    max_parallel: Option<usize>,
    enforce_step_timeouts: bool,
}

impl Engine {
    /// Creates an engine with default settings.
    pub fn new(agents: Arc<AgentDirectory>, store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            agents,
            store,
            running: Arc::new(RunningExecutions::new()),
            conditions: Arc::new(ExistsConditionEvaluator),
            max_parallel: None,
            enforce_step_timeouts: true,
        }
    }

    /// Creates an engine configured from an [`EngineConfig`].
    pub fn from_config(
        agents: Arc<AgentDirectory>,
        store: Arc<dyn WorkflowStore>,
        config: &EngineConfig,
    ) -> Self {
        let mut engine = Self::new(agents, store);
        engine.set_max_parallel(config.max_parallel_steps);
        engine.set_enforce_step_timeouts(config.enforce_step_timeouts);
        engine
    }

    /// Caps Parallel-mode fan-out. `None` or `Some(0)` means no limit.
    pub fn set_max_parallel(&mut self, max: Option<usize>) {
        self.max_parallel = max.filter(|n| *n > 0);
    }

    pub fn set_enforce_step_timeouts(&mut self, enforce: bool) {
        self.enforce_step_timeouts = enforce;
    }

    /// Replaces the condition evaluator used by validation and execution.
    pub fn set_condition_evaluator(&mut self, evaluator: Arc<dyn ConditionEvaluator>) {
        self.conditions = evaluator;
    }

    pub fn agents(&self) -> &Arc<AgentDirectory> {
        &self.agents
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Ids of executions whose background task is still running.
    pub fn running_executions(&self) -> Vec<String> {
        self.running.ids()
    }

    // ---- definitions ----

    /// Validates a definition without saving it.
    pub fn validate_workflow(&self, definition: &WorkflowDefinition) -> ValidationResult {
        validate_workflow(definition, &self.agents, self.conditions.as_ref())
    }

    /// Validates and stores a new definition. An empty id is replaced with a
    /// generated one.
    pub async fn create_workflow(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition> {
        self.validate_workflow(&definition).into_result()?;

        if definition.id.trim().is_empty() {
            definition.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        definition.created_at = now;
        definition.updated_at = now;

        self.store.insert_definition(definition.clone()).await?;
        info!("Created workflow '{}' ({})", definition.name, definition.id);
        Ok(definition)
    }

    /// Validates and replaces an existing definition.
    pub async fn update_workflow(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition> {
        self.validate_workflow(&definition).into_result()?;

        let existing = self.get_workflow(&definition.id).await?;
        definition.created_at = existing.created_at;
        definition.updated_at = Utc::now();

        self.store.update_definition(definition.clone()).await?;
        info!("Updated workflow '{}' ({})", definition.name, definition.id);
        Ok(definition)
    }

    /// Deletes a definition. Refused while executions of it are running.
    pub async fn delete_workflow(&self, id: &str) -> Result<()> {
        let running = self.store.count_running_executions(id).await?;
        if running > 0 {
            return Err(WorkflowError::Conflict(format!(
                "Workflow '{}' has {} running executions",
                id, running
            )));
        }

        if !self.store.delete_definition(id).await? {
            return Err(WorkflowError::not_found("Workflow", id));
        }
        info!("Deleted workflow '{}'", id);
        Ok(())
    }

    pub async fn get_workflow(&self, id: &str) -> Result<WorkflowDefinition> {
        self.store
            .load_definition(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Workflow", id))
    }

    pub async fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        self.store.list_definitions().await
    }

    // ---- executions ----

    /// Starts an execution and returns its Running record immediately.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        input: Context,
        executed_by: &str,
    ) -> Result<WorkflowExecution> {
        let definition = self.get_workflow(workflow_id).await?;

        let mut execution = WorkflowExecution::start(&definition.id, input, executed_by);
        execution.log(format!(
            "Execution started by '{}' in {} mode",
            executed_by, definition.execution_mode
        ));
        // Registered before the record is visible, so a cancel issued by
        // anyone who can see the Running record is never lost.
        let token = self.running.insert(&execution.id);
        if let Err(e) = self.store.insert_execution(execution.clone()).await {
            self.running.remove(&execution.id);
            return Err(e);
        }

        info!(
            "Starting execution '{}' of workflow '{}' ({} steps, {} mode)",
            execution.id,
            definition.name,
            definition.steps.len(),
            definition.execution_mode
        );

        let engine = self.clone();
        let snapshot = execution.clone();
        tokio::spawn(async move {
            engine.run_execution(definition, execution, token).await;
        });

        Ok(snapshot)
    }

    /// Body of the background task that owns one execution.
    async fn run_execution(
        self,
        definition: WorkflowDefinition,
        execution: WorkflowExecution,
        token: CancellationToken,
    ) {
        let execution_id = execution.id.clone();
        let executor = StepExecutor::new(self.agents.clone(), self.enforce_step_timeouts);
        let mut run = ExecutionRun::new(
            execution,
            executor,
            token,
            self.store.clone(),
            self.conditions.clone(),
        )
        .with_max_parallel(self.max_parallel);

        let strategy = strategy_for(definition.execution_mode);
        let outcome = AssertUnwindSafe(strategy.run(&definition, &mut run))
            .catch_unwind()
            .await;

        let (status, error_message) = match outcome {
            Ok(Ok(StrategyOutcome::Completed)) => (ExecutionStatus::Completed, None),
            Ok(Ok(StrategyOutcome::Failed(message))) => (ExecutionStatus::Failed, Some(message)),
            Ok(Ok(StrategyOutcome::Cancelled)) => (ExecutionStatus::Cancelled, None),
            Ok(Err(e)) => (ExecutionStatus::Failed, Some(e.to_string())),
            Err(payload) => (
                ExecutionStatus::Failed,
                Some(format!("Execution panicked: {}", panic_message(&*payload))),
            ),
        };

        let mut execution = run.execution;
        execution.output_data = run.context;
        if execution.finish(status, error_message.clone()) {
            let duration_ms = execution.duration().num_milliseconds();
            match &error_message {
                Some(message) => {
                    error!("Execution '{}' {}: {}", execution_id, status, message);
                    execution.log(format!("Execution {} after {} ms: {}", status, duration_ms, message));
                }
                None => {
                    info!("Execution '{}' {} in {} ms", execution_id, status, duration_ms);
                    execution.log(format!("Execution {} in {} ms", status, duration_ms));
                }
            }
        }

        let mut saved = self.store.update_execution(execution.clone()).await;
        if let Err(e) = &saved {
            warn!("Failed to persist execution '{}', retrying: {}", execution_id, e);
            tokio::time::sleep(FINAL_SAVE_RETRY_DELAY).await;
            saved = self.store.update_execution(execution).await;
        }
        if let Err(e) = saved {
            error!("Failed to persist execution '{}': {}", execution_id, e);
        }
        self.running.remove(&execution_id);
    }

    pub async fn get_execution(&self, id: &str) -> Result<WorkflowExecution> {
        self.store
            .get_execution(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Execution", id))
    }

    pub async fn list_executions(&self, workflow_id: &str) -> Result<Vec<WorkflowExecution>> {
        self.store.list_executions(workflow_id).await
    }

    /// Requests cancellation. Unknown or finished ids are a logged no-op.
    pub async fn cancel_execution(&self, id: &str) -> Result<()> {
        if self.running.cancel(id) {
            info!("Cancellation requested for execution '{}'", id);
        } else {
            warn!("Execution '{}' is not running; nothing to cancel", id);
        }
        Ok(())
    }

    pub async fn pause_execution(&self, id: &str) -> Result<()> {
        Err(WorkflowError::NotImplemented(format!(
            "Pausing execution '{}'",
            id
        )))
    }

    pub async fn resume_execution(&self, id: &str) -> Result<()> {
        Err(WorkflowError::NotImplemented(format!(
            "Resuming execution '{}'",
            id
        )))
    }

    /// Polls until the execution is terminal.
    ///
    /// Also returns once the execution has no running task, so a record left
    /// Running by an earlier process is returned as-is.
    pub async fn wait_for_execution(
        &self,
        id: &str,
        poll_interval: Duration,
    ) -> Result<WorkflowExecution> {
        loop {
            let active = self.running.contains(id);
            let execution = self.get_execution(id).await?;
            if execution.is_terminal() || !active {
                return Ok(execution);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
