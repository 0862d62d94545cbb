//! Error Types
//!
//! A single error enum covers every failure the public API can surface.
//! Step failures are not errors: a failing agent call is recorded
//! on a [`WorkflowStepExecution`](crate::workflow::WorkflowStepExecution)
//! and never returned as an `Err`.

use thiserror::Error;

use crate::agents::AgentError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised by the engine, its store and its validator.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The definition failed validation; every collected error is kept.
    #[error("Workflow validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A workflow, execution or agent id did not resolve.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The operation clashes with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation is part of the contract but has no implementation.
    #[error("{0} is not implemented")]
    NotImplemented(String),

    /// An execution condition could not be evaluated.
    #[error("Condition error: {0}")]
    Condition(String),

    /// An agent failed outside of step execution (start, stop).
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    /// The persistence layer rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl WorkflowError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns true for [`WorkflowError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`WorkflowError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
