//! File-backed store.
//!
//! Layout under the root directory:
//!
//! ```text
//! definitions/{id}.json
//! executions/{id}.json
//! ```
//!
//! Each record is pretty-printed JSON, written to a temporary file and
//! renamed into place so readers never see a partial document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Result, WorkflowError};
use crate::workflow::model::{ExecutionStatus, WorkflowDefinition, WorkflowExecution};

use super::{sort_definitions, sort_executions, WorkflowStore};

const DEFINITIONS_DIR: &str = "definitions";
const EXECUTIONS_DIR: &str = "executions";

pub struct FileStore {
    root: PathBuf,
    /// Serializes writers so check-then-write on insert is atomic.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(DEFINITIONS_DIR))?;
        std::fs::create_dir_all(root.join(EXECUTIONS_DIR))?;
        info!("Using workflow store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: &str, id: &str) -> Result<PathBuf> {
        if !is_safe_id(id) {
            return Err(WorkflowError::Storage(format!(
                "'{}' cannot be used as a record id",
                id
            )));
        }
        Ok(self.root.join(kind).join(format!("{}.json", id)))
    }

    async fn read_record<T: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<Option<T>> {
        let path = self.record_path(kind, id)?;
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record<T: Serialize>(&self, kind: &str, id: &str, value: &T) -> Result<()> {
        let path = self.record_path(kind, id)?;
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(value)?;

        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!("Saved {}", path.display());
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<T>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(self.root.join(kind)).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }
}

/// Ids become file names, so only a conservative character set is allowed.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[async_trait]
impl WorkflowStore for FileStore {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.record_path(DEFINITIONS_DIR, &definition.id)?.exists() {
            return Err(WorkflowError::Conflict(format!(
                "Workflow '{}' already exists",
                definition.id
            )));
        }
        self.write_record(DEFINITIONS_DIR, &definition.id, &definition).await
    }

    async fn update_definition(&self, definition: WorkflowDefinition) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.record_path(DEFINITIONS_DIR, &definition.id)?.exists() {
            return Err(WorkflowError::not_found("Workflow", &definition.id));
        }
        self.write_record(DEFINITIONS_DIR, &definition.id, &definition).await
    }

    async fn delete_definition(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.record_path(DEFINITIONS_DIR, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted workflow file: {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_definition(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        self.read_record(DEFINITIONS_DIR, id).await
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        let mut definitions: Vec<WorkflowDefinition> = self.read_all(DEFINITIONS_DIR).await?;
        sort_definitions(&mut definitions);
        Ok(definitions)
    }

    async fn insert_execution(&self, execution: WorkflowExecution) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.record_path(EXECUTIONS_DIR, &execution.id)?.exists() {
            return Err(WorkflowError::Conflict(format!(
                "Execution '{}' already exists",
                execution.id
            )));
        }
        self.write_record(EXECUTIONS_DIR, &execution.id, &execution).await
    }

    async fn update_execution(&self, execution: WorkflowExecution) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_record(EXECUTIONS_DIR, &execution.id, &execution).await
    }

    async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        self.read_record(EXECUTIONS_DIR, id).await
    }

    async fn list_executions(&self, workflow_id: &str) -> Result<Vec<WorkflowExecution>> {
        let mut executions: Vec<WorkflowExecution> = self
            .read_all::<WorkflowExecution>(EXECUTIONS_DIR)
            .await?
            .into_iter()
            .filter(|e| e.workflow_id == workflow_id)
            .collect();
        sort_executions(&mut executions);
        Ok(executions)
    }

    async fn count_running_executions(&self, workflow_id: &str) -> Result<usize> {
        Ok(self
            .list_executions(workflow_id)
            .await?
            .iter()
            .filter(|e| e.status == ExecutionStatus::Running)
            .count())
    }
}
