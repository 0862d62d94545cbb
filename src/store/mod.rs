//! Persistence
//!
//! The engine reads and writes definitions and executions through the
//! [`WorkflowStore`] trait. Two backends ship with the crate:
//!
//! - [`InMemoryStore`]: process-local maps, used by tests and one-shot runs
//! - [`FileStore`]: one pretty-printed JSON document per record

mod file;
mod memory;

pub use file::FileStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::workflow::model::{WorkflowDefinition, WorkflowExecution};

/// Storage contract for definitions and executions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Inserts a new definition. An existing id is a
    /// [`Conflict`](crate::WorkflowError::Conflict).
    async fn insert_definition(&self, definition: WorkflowDefinition) -> Result<()>;

    /// Replaces an existing definition. An unknown id is
    /// [`NotFound`](crate::WorkflowError::NotFound).
    async fn update_definition(&self, definition: WorkflowDefinition) -> Result<()>;

    /// Removes a definition, returning whether it existed.
    async fn delete_definition(&self, id: &str) -> Result<bool>;

    async fn load_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>>;

    /// All definitions, sorted by name then id.
    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>>;

    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<()>;

    /// Overwrites the execution with the same id (inserting if absent).
    async fn update_execution(&self, execution: WorkflowExecution) -> Result<()>;

    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>>;

    /// Executions of one workflow, oldest first.
    async fn list_executions(&self, workflow_id: &str) -> Result<Vec<WorkflowExecution>>;

    /// Number of executions of `workflow_id` currently in the Running state.
    async fn count_running_executions(&self, workflow_id: &str) -> Result<usize>;
}

pub(crate) fn sort_definitions(definitions: &mut [WorkflowDefinition]) {
    definitions.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

pub(crate) fn sort_executions(executions: &mut [WorkflowExecution]) {
    executions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
}
