//! Workflow Execution Module
//!
//! Runs workflow definitions against agents in the background.
//!
//! # Architecture
//!
//! - [`engine`]: Coordinator and public workflow API
//! - [`strategy`]: One step-iteration algorithm per execution mode
//! - [`step`]: Single step execution against the agent directory
//! - [`registry`]: Cancellation handles of running executions

pub mod engine;
pub mod registry;
pub mod step;
pub mod strategy;

pub use engine::Engine;
pub use registry::RunningExecutions;
pub use step::StepExecutor;
pub use strategy::{strategy_for, ExecutionRun, ExecutionStrategy, StrategyOutcome};
