//! Workflow Data Model
//!
//! Core data structures for workflow definitions and their executions.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: triage
//! name: Triage incoming file
//! execution_mode: Sequential
//! steps:
//!   - id: pick
//!     name: Pick a file
//!     agent_id: fs
//!     order: 1
//!     configuration:
//!       operation: list_directory
//!       path: /tmp/inbox
//!
//!   - id: read
//!     name: Read the picked file
//!     agent_id: fs
//!     order: 2
//!     dependencies: [pick]
//!     input_mapping:
//!       file_path: picked_path
//!     configuration:
//!       operation: read_file
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Mutable key/value map threaded through one execution.
pub type Context = HashMap<String, Value>;

/// Configuration key that overrides the operation sent to the agent.
pub const OPERATION_KEY: &str = "operation";

/// Operation sent to the agent when a step configures none.
pub const DEFAULT_OPERATION: &str = "execute";

/// Default per-step timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Step-iteration strategy for a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    /// Steps run one at a time, ordered by `order`
    #[default]
    #[serde(alias = "sequential")]
    Sequential,
    /// All steps run concurrently against the same context snapshot
    #[serde(alias = "parallel")]
    Parallel,
    /// Sequential, but steps with a false condition are skipped
    #[serde(alias = "conditional")]
    Conditional,
    /// Reserved name; runs with the conditional strategy
    #[serde(alias = "mixed")]
    Mixed,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sequential => "Sequential",
            Self::Parallel => "Parallel",
            Self::Conditional => "Conditional",
            Self::Mixed => "Mixed",
        };
        f.write_str(name)
    }
}

/// Lifecycle status shared by executions and step executions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Returns true for Completed, Failed and Cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// A single unit of work bound to one agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    /// Identifier, unique within the definition
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Agent that executes this step
    pub agent_id: String,

    /// Position in Sequential/Conditional iteration (ascending)
    #[serde(default)]
    pub order: i32,

    /// Step ids this step relies on; checked at validation time only
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Local parameter name -> context key
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input_mapping: HashMap<String, String>,

    /// Static parameters; may carry an `operation` override
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub configuration: HashMap<String, Value>,

    /// Optional predicate, e.g. `exists:some_key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_condition: Option<String>,

    /// Deadline for the agent call; 0 disables it
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl WorkflowStep {
    /// Creates a step bound to an agent. The name defaults to the id.
    ///
    /// # Example
    ///
    /// ```
    /// use agentrunner::workflow::WorkflowStep;
    ///
    /// let step = WorkflowStep::new("read", "fs")
    ///     .with_order(2)
    ///     .with_operation("read_file")
    ///     .map_input("file_path", "picked_path")
    ///     .depends_on("pick");
    /// assert_eq!(step.operation(), "read_file");
    /// ```
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let id = id.into().trim().to_string();
        Self {
            name: id.clone(),
            id,
            agent_id: agent_id.into().trim().to_string(),
            order: 0,
            dependencies: Vec::new(),
            input_mapping: HashMap::new(),
            configuration: HashMap::new(),
            execution_condition: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Sets the `operation` configuration entry.
    pub fn with_operation(self, operation: impl Into<String>) -> Self {
        self.with_config(OPERATION_KEY, Value::String(operation.into()))
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    /// Copies `context[context_key]` into the command parameter `local_key`.
    pub fn map_input(mut self, local_key: impl Into<String>, context_key: impl Into<String>) -> Self {
        self.input_mapping.insert(local_key.into(), context_key.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.execution_condition = Some(condition.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    /// Operation to dispatch: the `operation` configuration entry when it is
    /// a non-empty string, otherwise [`DEFAULT_OPERATION`].
    pub fn operation(&self) -> &str {
        self.configuration
            .get(OPERATION_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|op| !op.is_empty())
            .unwrap_or(DEFAULT_OPERATION)
    }

    /// Returns the condition if one is set and not blank.
    pub fn condition(&self) -> Option<&str> {
        self.execution_condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// A saved, reusable plan of steps.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    /// Identifier; generated on create when left empty
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input_parameters: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output_parameters: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,

    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Creates an empty Sequential definition.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: default_version(),
            execution_mode: ExecutionMode::Sequential,
            steps: Vec::new(),
            input_parameters: HashMap::new(),
            output_parameters: HashMap::new(),
            metadata: HashMap::new(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Gets a step by ID.
    pub fn get_step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Steps sorted by `order` ascending. Ties keep declaration order.
    pub fn steps_in_order(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Unique agent ids referenced by the steps, sorted.
    pub fn agent_ids(&self) -> Vec<String> {
        let agents: HashSet<_> = self.steps.iter().map(|s| s.agent_id.clone()).collect();
        let mut agents: Vec<String> = agents.into_iter().collect();
        agents.sort();
        agents
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Formats a log line with a UTC timestamp prefix.
fn log_line(message: &str) -> String {
    format!("[{}] {}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"), message)
}

/// One run of a definition against concrete input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub input_data: Context,
    /// Final merged context
    #[serde(default)]
    pub output_data: Context,
    #[serde(default)]
    pub executed_by: String,
    pub start_time: DateTime<Utc>,
    /// Set iff the status is terminal
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub step_executions: Vec<WorkflowStepExecution>,
}

impl WorkflowExecution {
    /// Creates a Running execution with a fresh id.
    pub fn start(workflow_id: impl Into<String>, input: Context, executed_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            input_data: input,
            output_data: Context::new(),
            executed_by: executed_by.into(),
            start_time: Utc::now(),
            end_time: None,
            error_message: None,
            logs: Vec::new(),
            step_executions: Vec::new(),
        }
    }

    /// Appends a timestamped log line.
    pub fn log(&mut self, message: impl AsRef<str>) {
        self.logs.push(log_line(message.as_ref()));
    }

    /// Moves the execution into a terminal status.
    ///
    /// Returns false, leaving the record untouched, if it is already
    /// terminal or `status` is not terminal.
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            warn!(
                "Execution '{}' already {}; ignoring transition to {}",
                self.id, self.status, status
            );
            return false;
        }
        if !status.is_terminal() {
            warn!("Execution '{}': {} is not a terminal status", self.id, status);
            return false;
        }

        self.status = status;
        self.error_message = error;
        self.end_time = Some(Utc::now());
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Gets the step execution recorded for a step id.
    pub fn step_execution(&self, step_id: &str) -> Option<&WorkflowStepExecution> {
        self.step_executions.iter().find(|s| s.step_id == step_id)
    }

    /// Elapsed time, up to now for running executions.
    pub fn duration(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }
}

/// Record of one step attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowStepExecution {
    pub id: String,
    pub workflow_execution_id: String,
    pub step_id: String,
    pub agent_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub input_data: Context,
    #[serde(default)]
    pub output_data: Context,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowStepExecution {
    /// Creates a Running record for `step` within an execution.
    pub fn begin(workflow_execution_id: impl Into<String>, step: &WorkflowStep) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_execution_id: workflow_execution_id.into(),
            step_id: step.id.clone(),
            agent_id: step.agent_id.clone(),
            status: ExecutionStatus::Running,
            input_data: Context::new(),
            output_data: Context::new(),
            error_message: None,
            logs: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        self.logs.push(log_line(message.as_ref()));
    }

    /// Marks the step as completed with its output.
    pub fn complete(&mut self, output: Context) {
        self.status = ExecutionStatus::Completed;
        self.output_data = output;
        self.end_time = Some(Utc::now());
    }

    /// Marks the step as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Duration in milliseconds, if the step has finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}
