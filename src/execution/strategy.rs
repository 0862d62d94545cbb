//! Execution Strategies
//!
//! One strategy per [`ExecutionMode`]. All of them work on an
//! [`ExecutionRun`], which owns the execution record and the context map
//! threaded through the steps.
//!
//! - Sequential: steps by `order`, fail-fast, outputs merged after each step
//! - Conditional: as Sequential, but steps whose condition is false are skipped
//! - Parallel: every step runs against the same context snapshot; outputs are
//!   merged after the join in ascending `order`, so on a key collision the
//!   step with the highest `order` wins (declaration order breaks ties)
//! - Mixed: runs the Conditional strategy

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::store::WorkflowStore;
use crate::workflow::condition::ConditionEvaluator;
use crate::workflow::model::{
    Context, ExecutionMode, WorkflowDefinition, WorkflowExecution, WorkflowStep,
    WorkflowStepExecution,
};

use super::step::StepExecutor;

/// How a strategy ended. Step failures and cancellation are outcomes, not
/// errors; an `Err` from a strategy is a coordinator-level fault.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// State of one execution while its strategy runs.
pub struct ExecutionRun {
    pub execution: WorkflowExecution,
    pub context: Context,
    executor: StepExecutor,
    token: CancellationToken,
    store: Arc<dyn WorkflowStore>,
    conditions: Arc<dyn ConditionEvaluator>,
    max_parallel: Option<usize>,
}

impl ExecutionRun {
    pub fn new(
        execution: WorkflowExecution,
        executor: StepExecutor,
        token: CancellationToken,
        store: Arc<dyn WorkflowStore>,
        conditions: Arc<dyn ConditionEvaluator>,
    ) -> Self {
        let context = execution.input_data.clone();
        Self {
            execution,
            context,
            executor,
            token,
            store,
            conditions,
            max_parallel: None,
        }
    }

    /// Caps the number of concurrently running steps in Parallel mode.
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel.filter(|n| *n > 0);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn merge_output(&mut self, output: &Context) {
        for (key, value) in output {
            self.context.insert(key.clone(), value.clone());
        }
    }

    /// Appends a step record without persisting.
    fn push_step(&mut self, record: WorkflowStepExecution) {
        self.execution.log(format!(
            "Step '{}' {}",
            record.step_id,
            record.status.to_string().to_lowercase()
        ));
        self.execution.step_executions.push(record);
    }

    /// Persists the in-progress execution. Failures are only logged.
    pub async fn checkpoint(&self) {
        if let Err(e) = self.store.update_execution(self.execution.clone()).await {
            warn!(
                "Failed to checkpoint execution '{}': {}",
                self.execution.id, e
            );
        }
    }

    async fn record_step(&mut self, record: WorkflowStepExecution) {
        self.push_step(record);
        self.checkpoint().await;
    }
}

/// A step-iteration algorithm for one execution mode.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        run: &mut ExecutionRun,
    ) -> Result<StrategyOutcome>;
}

/// Picks the strategy for a mode. Mixed has no strategy of its own and
/// runs as Conditional.
pub fn strategy_for(mode: ExecutionMode) -> Box<dyn ExecutionStrategy> {
    match mode {
        ExecutionMode::Sequential => Box::new(SequentialStrategy),
        ExecutionMode::Parallel => Box::new(ParallelStrategy),
        ExecutionMode::Conditional => Box::new(ConditionalStrategy),
        ExecutionMode::Mixed => {
            info!("Mixed mode runs with the Conditional strategy");
            Box::new(ConditionalStrategy)
        }
    }
}

/// Shared loop of the Sequential and Conditional strategies.
async fn run_in_order(
    definition: &WorkflowDefinition,
    run: &mut ExecutionRun,
    evaluate_conditions: bool,
) -> Result<StrategyOutcome> {
    for step in definition.steps_in_order() {
        if run.is_cancelled() {
            info!(
                "Execution '{}' cancelled before step '{}'",
                run.execution.id, step.id
            );
            return Ok(StrategyOutcome::Cancelled);
        }

        if evaluate_conditions {
            if let Some(condition) = step.condition() {
                if !run.conditions.evaluate(condition, &run.context)? {
                    info!("Skipping step '{}': condition '{}' not met", step.id, condition);
                    run.execution.log(format!(
                        "Step '{}' skipped: condition '{}' not met",
                        step.id, condition
                    ));
                    continue;
                }
            }
        }

        let record = run
            .executor
            .execute_step(step, &run.execution.id, &run.context)
            .await;

        if record.is_completed() {
            let output = record.output_data.clone();
            run.record_step(record).await;
            run.merge_output(&output);
        } else {
            let message = record
                .error_message
                .clone()
                .unwrap_or_else(|| format!("Step '{}' failed", step.id));
            run.record_step(record).await;
            return Ok(StrategyOutcome::Failed(message));
        }
    }

    Ok(StrategyOutcome::Completed)
}

pub struct SequentialStrategy;

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        run: &mut ExecutionRun,
    ) -> Result<StrategyOutcome> {
        run_in_order(definition, run, false).await
    }
}

pub struct ConditionalStrategy;

#[async_trait]
impl ExecutionStrategy for ConditionalStrategy {
    fn name(&self) -> &'static str {
        "conditional"
    }

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        run: &mut ExecutionRun,
    ) -> Result<StrategyOutcome> {
        run_in_order(definition, run, true).await
    }
}

/// Runs every step at once. Conditions are not evaluated.
pub struct ParallelStrategy;

#[async_trait]
impl ExecutionStrategy for ParallelStrategy {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        run: &mut ExecutionRun,
    ) -> Result<StrategyOutcome> {
        if run.is_cancelled() {
            return Ok(StrategyOutcome::Cancelled);
        }

        let steps: Vec<&WorkflowStep> = definition.steps_in_order();
        if steps.is_empty() {
            return Ok(StrategyOutcome::Completed);
        }

        let limit = run.max_parallel.unwrap_or(steps.len()).max(1);
        debug!(
            "Launching {} steps of execution '{}' (limit {})",
            steps.len(),
            run.execution.id,
            limit
        );

        let snapshot = Arc::new(run.context.clone());
        let launches: Vec<_> = steps
            .iter()
            .enumerate()
            .map(|(rank, step)| {
                let executor = run.executor.clone();
                let snapshot = Arc::clone(&snapshot);
                let execution_id = run.execution.id.clone();
                let token = run.token.clone();
                let step = (*step).clone();
                async move {
                    // Queued steps are not dispatched once cancellation is requested.
                    if token.is_cancelled() {
                        debug!("Step '{}' not started: execution cancelled", step.id);
                        return None;
                    }
                    let record = executor.execute_step(&step, &execution_id, &snapshot).await;
                    Some((rank, record))
                }
            })
            .collect();

        let mut finished: Vec<(usize, WorkflowStepExecution)> = stream::iter(launches)
            .buffer_unordered(limit)
            .filter_map(|launched| async move { launched })
            .collect()
            .await;
        finished.sort_by_key(|(rank, _)| *rank);

        let failures: Vec<String> = finished
            .iter()
            .filter(|(_, record)| !record.is_completed())
            .map(|(_, record)| {
                format!(
                    "Step '{}': {}",
                    record.step_id,
                    record.error_message.as_deref().unwrap_or("failed")
                )
            })
            .collect();

        let outputs: Vec<Context> = finished
            .iter()
            .filter(|(_, record)| record.is_completed())
            .map(|(_, record)| record.output_data.clone())
            .collect();

        for (_, record) in finished {
            run.push_step(record);
        }
        run.checkpoint().await;

        if run.is_cancelled() {
            info!("Execution '{}' cancelled at parallel join", run.execution.id);
            return Ok(StrategyOutcome::Cancelled);
        }

        if !failures.is_empty() {
            return Ok(StrategyOutcome::Failed(failures.join("; ")));
        }

        for output in &outputs {
            run.merge_output(output);
        }
        Ok(StrategyOutcome::Completed)
    }
}
