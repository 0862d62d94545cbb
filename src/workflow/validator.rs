//! Workflow Validation
//!
//! Static checks run when a definition is created, updated or explicitly
//! validated. Every rule is evaluated; nothing short-circuits.
//!
//! Errors (block saving):
//! - Name required, at least one step
//! - Every step needs an id, a name and an agent id
//! - Step ids are unique
//! - Dependencies name steps of the same definition
//! - Conditions in Conditional/Mixed workflows use supported syntax
//!
//! Warnings (informational):
//! - A step's agent is not currently registered
//! - Dependencies form a cycle, or a dependency runs after its dependent
//! - A condition is set on a step of a mode that ignores conditions

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::agents::AgentDirectory;
use crate::error::{Result, WorkflowError};

use super::condition::ConditionEvaluator;
use super::model::{ExecutionMode, WorkflowDefinition, WorkflowStep};

/// A single validation finding.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    MissingName,
    NoSteps,
    MissingStepId { position: usize },
    MissingStepName(String),
    DuplicateStepId(String),
    MissingAgentId(String),
    UnknownDependency { step: String, dependency: String },
    UnsupportedCondition { step: String, condition: String },
    UnregisteredAgent { step: String, agent: String },
    CyclicDependencies(Vec<String>),
    DependencyRunsLater { step: String, dependency: String },
    IgnoredCondition { step: String, mode: ExecutionMode },
}

impl ValidationIssue {
    /// Returns true for findings that make a definition invalid.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::UnregisteredAgent { .. }
                | Self::CyclicDependencies(_)
                | Self::DependencyRunsLater { .. }
                | Self::IgnoredCondition { .. }
        )
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingName => write!(f, "Workflow name is required"),
            Self::NoSteps => write!(f, "Workflow must have at least one step"),
            Self::MissingStepId { position } => {
                write!(f, "Step at position {} is missing an ID", position)
            }
            Self::MissingStepName(step) => write!(f, "Step '{}' is missing a name", step),
            Self::DuplicateStepId(step) => write!(f, "Duplicate step ID: {}", step),
            Self::MissingAgentId(step) => write!(f, "Step '{}' is missing an agent ID", step),
            Self::UnknownDependency { step, dependency } => {
                write!(f, "Step '{}' depends on unknown step '{}'", step, dependency)
            }
            Self::UnsupportedCondition { step, condition } => {
                write!(f, "Step '{}' has unsupported execution condition '{}'", step, condition)
            }
            Self::UnregisteredAgent { step, agent } => {
                write!(f, "Agent '{}' used by step '{}' is not registered", agent, step)
            }
            Self::CyclicDependencies(steps) => {
                write!(f, "Steps have cyclic dependencies: {}", steps.join(", "))
            }
            Self::DependencyRunsLater { step, dependency } => write!(
                f,
                "Step '{}' depends on '{}', which is ordered after it",
                step, dependency
            ),
            Self::IgnoredCondition { step, mode } => write!(
                f,
                "Step '{}' has an execution condition, which {} mode ignores",
                step, mode
            ),
        }
    }
}

/// Outcome of validating a definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_issues(issues: &[ValidationIssue]) -> Self {
        let (errors, warnings): (Vec<_>, Vec<_>) = issues.iter().partition(|i| i.is_error());
        Self {
            is_valid: errors.is_empty(),
            errors: errors.iter().map(|e| e.to_string()).collect(),
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Converts an invalid result into [`WorkflowError::Validation`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(WorkflowError::Validation(self.errors))
        }
    }
}

/// Label used for a step in messages.
fn step_label(step: &WorkflowStep, position: usize) -> String {
    if step.id.trim().is_empty() {
        format!("#{}", position)
    } else {
        step.id.clone()
    }
}

/// Checks a single step's own fields.
fn validate_step(
    step: &WorkflowStep,
    position: usize,
    mode: ExecutionMode,
    conditions: &dyn ConditionEvaluator,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let label = step_label(step, position);

    if step.id.trim().is_empty() {
        issues.push(ValidationIssue::MissingStepId { position });
    }

    if step.name.trim().is_empty() {
        issues.push(ValidationIssue::MissingStepName(label.clone()));
    }

    if step.agent_id.trim().is_empty() {
        issues.push(ValidationIssue::MissingAgentId(label.clone()));
    }

    if let Some(condition) = step.condition() {
        match mode {
            ExecutionMode::Conditional | ExecutionMode::Mixed => {
                if !conditions.supports(condition) {
                    issues.push(ValidationIssue::UnsupportedCondition {
                        step: label,
                        condition: condition.to_string(),
                    });
                }
            }
            ExecutionMode::Sequential | ExecutionMode::Parallel => {
                issues.push(ValidationIssue::IgnoredCondition { step: label, mode });
            }
        }
    }

    issues
}

/// Validates a workflow definition against the live agent directory.
pub fn validate_workflow(
    definition: &WorkflowDefinition,
    agents: &AgentDirectory,
    conditions: &dyn ConditionEvaluator,
) -> ValidationResult {
    info!(
        "Validating workflow '{}' with {} steps",
        definition.name,
        definition.steps.len()
    );
    let mut issues = Vec::new();

    if definition.name.trim().is_empty() {
        issues.push(ValidationIssue::MissingName);
    }

    if definition.steps.is_empty() {
        issues.push(ValidationIssue::NoSteps);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in &definition.steps {
        if !step.id.trim().is_empty() && !seen_ids.insert(step.id.as_str()) {
            issues.push(ValidationIssue::DuplicateStepId(step.id.clone()));
        }
    }

    for (index, step) in definition.steps.iter().enumerate() {
        let position = index + 1;
        issues.extend(validate_step(step, position, definition.execution_mode, conditions));

        for dependency in &step.dependencies {
            if !seen_ids.contains(dependency.as_str()) {
                issues.push(ValidationIssue::UnknownDependency {
                    step: step_label(step, position),
                    dependency: dependency.clone(),
                });
            }
        }

        if !step.agent_id.trim().is_empty() && !agents.contains(&step.agent_id) {
            issues.push(ValidationIssue::UnregisteredAgent {
                step: step_label(step, position),
                agent: step.agent_id.clone(),
            });
        }
    }

    issues.extend(dependency_warnings(definition));

    let result = ValidationResult::from_issues(&issues);
    if result.is_valid {
        info!(
            "Workflow '{}' is valid ({} warnings)",
            definition.name,
            result.warnings.len()
        );
    } else {
        debug!("Workflow '{}' has errors: {:?}", definition.name, result.errors);
    }
    result
}

/// Reports cycles and dependencies ordered after their dependents.
fn dependency_warnings(definition: &WorkflowDefinition) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let orders: HashMap<&str, i32> = definition
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.order))
        .collect();

    for step in &definition.steps {
        for dependency in &step.dependencies {
            if let Some(&dep_order) = orders.get(dependency.as_str()) {
                if dep_order > step.order {
                    issues.push(ValidationIssue::DependencyRunsLater {
                        step: step.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
    }

    let cyclic = steps_in_cycles(definition);
    if !cyclic.is_empty() {
        issues.push(ValidationIssue::CyclicDependencies(cyclic));
    }

    issues
}

/// Returns the ids left over after Kahn's algorithm, i.e. steps that sit on
/// or behind a dependency cycle. Unknown dependencies are ignored.
fn steps_in_cycles(definition: &WorkflowDefinition) -> Vec<String> {
    let known: HashSet<&str> = definition.steps.iter().map(|s| s.id.as_str()).collect();

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in &definition.steps {
        let deps: HashSet<&str> = step
            .dependencies
            .iter()
            .map(String::as_str)
            .filter(|d| known.contains(d))
            .collect();
        in_degree.insert(step.id.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(step.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(current) = queue.pop_front() {
        visited.insert(current);
        for &next in dependents.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    let mut remaining: Vec<String> = in_degree
        .keys()
        .filter(|id| !visited.contains(*id))
        .map(|id| id.to_string())
        .collect();
    remaining.sort();
    remaining
}
