//! Execution Conditions
//!
//! Steps in Conditional (and Mixed) workflows may carry a predicate string.
//! The predicate language is pluggable through [`ConditionEvaluator`]; the
//! default evaluator understands a single form:
//!
//! - `exists:<key>`: true when the context contains `<key>`
//!
//! Anything else is rejected. The validator reports unsupported syntax as an
//! error and the engine fails the execution if one slips through, so an
//! unknown predicate never silently runs its step.

use crate::error::{Result, WorkflowError};

use super::model::Context;

/// Prefix of the key-presence predicate.
pub const EXISTS_PREFIX: &str = "exists:";

/// Evaluates step execution conditions against the current context.
pub trait ConditionEvaluator: Send + Sync {
    /// Returns true if `condition` uses syntax this evaluator understands.
    fn supports(&self, condition: &str) -> bool;

    /// Evaluates `condition`. Unsupported syntax is an error.
    fn evaluate(&self, condition: &str, context: &Context) -> Result<bool>;
}

/// The built-in `exists:<key>` evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistsConditionEvaluator;

impl ExistsConditionEvaluator {
    fn key<'a>(&self, condition: &'a str) -> Option<&'a str> {
        condition
            .trim()
            .strip_prefix(EXISTS_PREFIX)
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl ConditionEvaluator for ExistsConditionEvaluator {
    fn supports(&self, condition: &str) -> bool {
        self.key(condition).is_some()
    }

    fn evaluate(&self, condition: &str, context: &Context) -> Result<bool> {
        let key = self.key(condition).ok_or_else(|| {
            WorkflowError::Condition(format!("Unsupported condition syntax: '{}'", condition))
        })?;
        Ok(context.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(key: &str) -> Context {
        let mut context = Context::new();
        context.insert(key.to_string(), json!(true));
        context
    }

    #[test]
    fn test_exists_true_when_key_present() {
        let evaluator = ExistsConditionEvaluator;
        assert!(evaluator.evaluate("exists:foo", &context_with("foo")).unwrap());
    }

    #[test]
    fn test_exists_false_when_key_absent() {
        let evaluator = ExistsConditionEvaluator;
        assert!(!evaluator.evaluate("exists:foo", &context_with("bar")).unwrap());
    }

    #[test]
    fn test_exists_tolerates_whitespace() {
        let evaluator = ExistsConditionEvaluator;
        assert!(evaluator.evaluate("  exists: foo ", &context_with("foo")).unwrap());
    }

    #[test]
    fn test_null_value_still_exists() {
        let evaluator = ExistsConditionEvaluator;
        let mut context = Context::new();
        context.insert("foo".to_string(), serde_json::Value::Null);
        assert!(evaluator.evaluate("exists:foo", &context).unwrap());
    }

    #[test]
    fn test_unknown_syntax_is_error() {
        let evaluator = ExistsConditionEvaluator;
        let result = evaluator.evaluate("foo == 1", &Context::new());
        assert!(matches!(result, Err(WorkflowError::Condition(_))));
        assert!(!evaluator.supports("foo == 1"));
    }

    #[test]
    fn test_empty_key_is_unsupported() {
        let evaluator = ExistsConditionEvaluator;
        assert!(!evaluator.supports("exists:"));
        assert!(evaluator.evaluate("exists:  ", &Context::new()).is_err());
    }

    #[test]
    fn test_supports_exists() {
        assert!(ExistsConditionEvaluator.supports("exists:picked_path"));
    }
}
