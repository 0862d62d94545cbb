//! Workflow Definition Module
//!
//! Data structures and utilities for defining, loading and validating
//! agent workflows.
//!
//! # Structure
//!
//! - [`model`]: Definitions, steps and execution records
//! - [`parser`]: YAML/JSON loading and saving
//! - [`validator`]: Static checks run before a definition is saved
//! - [`condition`]: Step execution predicates

pub mod condition;
pub mod model;
pub mod parser;
pub mod validator;

pub use condition::{ConditionEvaluator, ExistsConditionEvaluator};
pub use model::{
    Context, ExecutionMode, ExecutionStatus, WorkflowDefinition, WorkflowExecution, WorkflowStep,
    WorkflowStepExecution,
};
pub use parser::{load_context_file, load_definition_file, save_definition_file};
pub use validator::{validate_workflow, ValidationIssue, ValidationResult};
