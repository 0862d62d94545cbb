use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use crate::error::{Result, WorkflowError};
use crate::workflow::model::{ExecutionStatus, WorkflowDefinition, WorkflowExecution};

use super::{sort_definitions, sort_executions, WorkflowStore};

/// Process-local store. Contents are lost when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
    executions: RwLock<HashMap<String, WorkflowExecution>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> Result<()> {
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&definition.id) {
            return Err(WorkflowError::Conflict(format!(
                "Workflow '{}' already exists",
                definition.id
            )));
        }
        debug!("Stored workflow '{}'", definition.id);
        definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    async fn update_definition(&self, definition: WorkflowDefinition) -> Result<()> {
        let mut definitions = self.definitions.write().await;
        match definitions.get_mut(&definition.id) {
            Some(existing) => {
                *existing = definition;
                Ok(())
            }
            None => Err(WorkflowError::not_found("Workflow", &definition.id)),
        }
    }

    async fn delete_definition(&self, id: &str) -> Result<bool> {
        Ok(self.definitions.write().await.remove(id).is_some())
    }

    async fn load_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        Ok(self.definitions.read().await.get(id).cloned())
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        let mut definitions: Vec<_> = self.definitions.read().await.values().cloned().collect();
        sort_definitions(&mut definitions);
        Ok(definitions)
    }

    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<()> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id) {
            return Err(WorkflowError::Conflict(format!(
                "Execution '{}' already exists",
                execution.id
            )));
        }
        executions.insert(execution.id.clone(), execution);
        Ok(())
    }

    async fn update_execution(&self, execution: WorkflowExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id.clone(), execution);
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn list_executions(&self, workflow_id: &str) -> Result<Vec<WorkflowExecution>> {
        let mut executions: Vec<_> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        sort_executions(&mut executions);
        Ok(executions)
    }

    async fn count_running_executions(&self, workflow_id: &str) -> Result<usize> {
        Ok(self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.workflow_id == workflow_id && e.status == ExecutionStatus::Running)
            .count())
    }
}
