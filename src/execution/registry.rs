//! Registry of running executions.
//!
//! Maps an execution id to the cancellation token of its background task.
//! Entries exist only while the task runs; cancelling an absent id is a
//! no-op.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RunningExecutions {
    tokens: DashMap<String, CancellationToken>,
}

impl RunningExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an execution and returns the token its task should watch.
    pub fn insert(&self, execution_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(execution_id.to_string(), token.clone());
        token
    }

    /// Signals cancellation. Returns false if the id is not running.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.tokens.get(execution_id) {
            Some(entry) => {
                entry.value().cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, execution_id: &str) {
        self.tokens.remove(execution_id);
    }

    pub fn contains(&self, execution_id: &str) -> bool {
        self.tokens.contains_key(execution_id)
    }

    /// Ids of running executions, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tokens.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
