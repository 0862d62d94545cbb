//! AgentRunner - Agent Workflow Execution Engine
//!
//! Runs saved workflow definitions by dispatching each step to a pluggable
//! agent. Executions run in the background; callers poll for the outcome
//! or cancel them cooperatively.
//!
//! # Architecture
//!
//! - [`workflow`]: Definitions, execution records, parsing and validation
//! - [`execution`]: Coordinator, per-mode strategies and step execution
//! - [`agents`]: The agent contract, directory and built-in agents
//! - [`store`]: Persistence of definitions and executions
//! - [`monitoring`]: Timelines and health reports
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use agentrunner::agents::{AgentDirectory, EchoAgent};
//! use agentrunner::store::InMemoryStore;
//! use agentrunner::workflow::{Context, WorkflowDefinition, WorkflowStep};
//! use agentrunner::Engine;
//!
//! # async fn run() -> agentrunner::Result<()> {
//! let agents = Arc::new(AgentDirectory::new());
//! agents.register(Arc::new(EchoAgent::new())).await?;
//! let engine = Engine::new(agents, Arc::new(InMemoryStore::new()));
//!
//! let definition = WorkflowDefinition::new("", "hello")
//!     .with_step(WorkflowStep::new("greet", "echo").with_config("message", "hi"));
//! let definition = engine.create_workflow(definition).await?;
//!
//! let execution = engine.execute_workflow(&definition.id, Context::new(), "docs").await?;
//! println!("started {}", execution.id);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{Result, WorkflowError};
pub use execution::engine::Engine;
pub use workflow::model::{WorkflowDefinition, WorkflowExecution, WorkflowStep};
pub use workflow::parser::load_definition_file;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "AgentRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "AgentRunner");
    }

    #[test]
    fn test_module_exports_step() {
        let step = WorkflowStep::new("test", "echo");
        assert_eq!(step.id, "test");
        assert_eq!(step.agent_id, "echo");
    }

    #[test]
    fn test_module_exports_definition() {
        let definition = WorkflowDefinition::new("wf", "empty");
        assert!(definition.is_empty());
    }
}
