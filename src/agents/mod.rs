//! Agents Module
//!
//! Pluggable executors and the directory that routes step commands to them.
//!
//! - [`agent`]: The [`Agent`] trait and its command/result/health types
//! - [`directory`]: Live registry of agents keyed by id
//! - [`echo`], [`shell`]: Built-in agents

pub mod agent;
pub mod directory;
pub mod echo;
pub mod shell;

pub use agent::{
    Agent, AgentCapability, AgentCommand, AgentError, AgentHealth, AgentInfo, AgentResult,
    HealthStatus,
};
pub use directory::AgentDirectory;
pub use echo::{EchoAgent, ECHO_AGENT_ID};
pub use shell::{ShellAgent, SHELL_AGENT_ID};
