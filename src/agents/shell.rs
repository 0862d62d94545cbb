//! Shell Agent
//!
//! Runs a bash command supplied by the step:
//! - `{name}` placeholders in the command are replaced with parameter values;
//!   string values are single-quoted, the template itself is trusted
//! - the command is written to a temporary script and run with `bash`
//! - stdout, stderr and the exit code become the step output
//!
//! A non-zero exit code is reported as a failed result.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::workflow::model::Context;

use super::agent::{
    Agent, AgentCapability, AgentCommand, AgentError, AgentHealth, AgentResult, HealthStatus,
};

/// Default id of the shell agent.
pub const SHELL_AGENT_ID: &str = "shell";

/// Parameter holding the command template.
const COMMAND_PARAM: &str = "command";

/// Parameter overriding the working directory for one command.
const WORKING_DIR_PARAM: &str = "working_dir";

pub struct ShellAgent {
    id: String,
    working_dir: Option<PathBuf>,
    running: AtomicBool,
}

impl ShellAgent {
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        Self {
            id: SHELL_AGENT_ID.to_string(),
            working_dir,
            running: AtomicBool::new(false),
        }
    }

    async fn run(&self, command: &AgentCommand) -> Result<AgentResult, AgentError> {
        let template = command
            .parameter_str(COMMAND_PARAM)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                AgentError::InvalidParameters(format!("'{}' parameter is required", COMMAND_PARAM))
            })?;

        let command_text = render_command(template, &command.parameters);
        let working_dir = command
            .parameter_str(WORKING_DIR_PARAM)
            .map(PathBuf::from)
            .or_else(|| self.working_dir.clone());

        let script_path = create_execution_script(&command.id, &command_text).await?;
        let output = execute_with_bash(&script_path, working_dir.as_deref()).await;

        if let Err(e) = fs::remove_file(&script_path).await {
            warn!("Failed to clean up script {}: {}", script_path.display(), e);
        }
        let output = output?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        let mut data = Context::new();
        data.insert("stdout".to_string(), Value::String(stdout.trim_end().to_string()));
        data.insert("stderr".to_string(), Value::String(stderr.trim_end().to_string()));
        data.insert("exit_code".to_string(), json!(exit_code));

        if output.status.success() {
            debug!("Shell command {} completed", command.id);
            return Ok(AgentResult::success(data).with_log(format!("ran: {}", command_text)));
        }

        error!("Shell command {} failed with exit code: {:?}", command.id, exit_code);
        let mut message = match exit_code {
            Some(code) => format!("Command exited with code {}", code),
            None => "Command terminated by signal".to_string(),
        };
        if !stderr.trim().is_empty() {
            message.push_str(": ");
            message.push_str(stderr.trim());
        }

        let mut result = AgentResult::failure(message).with_log(format!("ran: {}", command_text));
        result.output_data = data;
        Ok(result)
    }
}

impl Default for ShellAgent {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Replaces `{name}` placeholders with scalar parameter values in one pass.
/// Strings are single-quoted so input data cannot add shell syntax.
fn render_command(template: &str, parameters: &Context) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rest = &rest[open..];
            break;
        };
        let key = &after[..close];
        let replacement = match parameters.get(key) {
            Some(_) if key == COMMAND_PARAM => None,
            Some(Value::String(s)) => Some(shell_quote(s)),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        };
        match replacement {
            Some(value) => {
                rendered.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

/// Wraps a value in single quotes, escaping embedded quotes as `'\''`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Creates a temporary bash script for one command.
async fn create_execution_script(command_id: &str, command_text: &str) -> Result<PathBuf, AgentError> {
    let script_dir = std::env::temp_dir().join("agentrunner_scripts");
    fs::create_dir_all(&script_dir).await?;

    let script_path = script_dir.join(format!("cmd_{}.sh", command_id));
    let mut file = fs::File::create(&script_path).await?;

    file.write_all(b"#!/bin/bash\nset -e\n").await?;
    file.write_all(command_text.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    Ok(script_path)
}

/// Executes a script with bash. The child is killed if the future is dropped.
async fn execute_with_bash(
    script_path: &Path,
    working_dir: Option<&Path>,
) -> Result<std::process::Output, AgentError> {
    let mut cmd = Command::new("bash");
    cmd.arg(script_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
        debug!("Executing in directory: {}", dir.display());
    }

    Ok(cmd.output().await?)
}

#[async_trait]
impl Agent for ShellAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Shell"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![
            AgentCapability::new("execute", "Run the `command` parameter with bash"),
            AgentCapability::new("run", "Alias of execute"),
        ]
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, command: AgentCommand) -> Result<AgentResult, AgentError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AgentError::NotRunning(self.id.clone()));
        }

        match command.operation.as_str() {
            "execute" | "run" => self.run(&command).await,
            other => Err(AgentError::UnsupportedOperation {
                agent: self.id.clone(),
                operation: other.to_string(),
            }),
        }
    }

    async fn health(&self) -> AgentHealth {
        if !self.running.load(Ordering::SeqCst) {
            return AgentHealth::new(self.id.clone(), HealthStatus::Unhealthy).with_message("stopped");
        }
        match &self.working_dir {
            Some(dir) if !dir.is_dir() => AgentHealth::new(self.id.clone(), HealthStatus::Degraded)
                .with_message(format!("working directory {} is missing", dir.display())),
            _ => AgentHealth::new(self.id.clone(), HealthStatus::Healthy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::to_context;

    async fn started_agent(working_dir: Option<PathBuf>) -> ShellAgent {
        let agent = ShellAgent::new(working_dir);
        agent.start().await.unwrap();
        agent
    }

    #[test]
    fn test_render_command_placeholders() {
        let parameters = to_context(json!({
            "command": "ignored",
            "file": "data.txt",
            "lines": 5,
            "verbose": true,
            "nested": {"a": 1}
        }));
        let rendered = render_command("head -n {lines} {file} {verbose} {nested}", &parameters);
        assert_eq!(rendered, "head -n 5 'data.txt' true {nested}");
    }

    #[test]
    fn test_render_command_quotes_strings() {
        let parameters = to_context(json!({
            "name": "it's; rm -rf x",
            "other": "{name}"
        }));
        let rendered = render_command("echo {name} {other} {missing} {", &parameters);
        assert_eq!(rendered, "echo 'it'\\''s; rm -rf x' '{name}' {missing} {");
    }

    #[tokio::test]
    async fn test_input_values_cannot_inject_commands() {
        let temp_dir = tempfile::tempdir().unwrap();
        let agent = started_agent(Some(temp_dir.path().to_path_buf())).await;
        let command = AgentCommand::new(
            "execute",
            to_context(json!({"command": "echo {greeting}", "greeting": "hi; touch pwned"})),
        );

        let result = agent.execute(command).await.unwrap();

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.output_data["stdout"], json!("hi; touch pwned"));
        assert!(!temp_dir.path().join("pwned").exists());
    }

    #[tokio::test]
    async fn test_create_execution_script() {
        let script_path = create_execution_script("test-script", "echo 'hello world'")
            .await
            .unwrap();
        assert!(script_path.exists());

        let content = std::fs::read_to_string(&script_path).unwrap();
        assert!(content.contains("#!/bin/bash"));
        assert!(content.contains("set -e"));
        assert!(content.contains("echo 'hello world'"));

        std::fs::remove_file(script_path).unwrap();
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let agent = started_agent(None).await;
        let command = AgentCommand::new(
            "execute",
            to_context(json!({"command": "echo {greeting}", "greeting": "hello"})),
        );

        let result = agent.execute(command).await.unwrap();

        assert!(result.success, "{:?}", result.error_message);
        assert_eq!(result.output_data["stdout"], json!("hello"));
        assert_eq!(result.output_data["exit_code"], json!(0));
    }

    #[tokio::test]
    async fn test_run_in_working_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let agent = started_agent(Some(temp_dir.path().to_path_buf())).await;
        let command = AgentCommand::new(
            "run",
            to_context(json!({"command": "echo done > marker.txt"})),
        );

        let result = agent.execute(command).await.unwrap();

        assert!(result.success);
        assert!(temp_dir.path().join("marker.txt").exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let agent = started_agent(None).await;
        let command = AgentCommand::new(
            "execute",
            to_context(json!({"command": "echo oops >&2; exit 3"})),
        );

        let result = agent.execute(command).await.unwrap();

        assert!(!result.success);
        let message = result.error_message.unwrap();
        assert!(message.contains("code 3"));
        assert!(message.contains("oops"));
        assert_eq!(result.output_data["exit_code"], json!(3));
    }

    #[tokio::test]
    async fn test_missing_command_is_invalid() {
        let agent = started_agent(None).await;
        let result = agent
            .execute(AgentCommand::new("execute", Context::new()))
            .await;
        assert!(matches!(result, Err(AgentError::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_health_missing_working_dir_is_degraded() {
        let agent = started_agent(Some(PathBuf::from("/nonexistent/agentrunner"))).await;
        assert_eq!(agent.health().await.status, HealthStatus::Degraded);
    }
}
