// src/task/result.rs

//! Task outcomes and the completion-ordered result mapping returned to
//! callers after a scheduler pass.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde_json::Value;
use thiserror::Error;

use super::{BaseKey, TaskKind};

/// Why a task did not produce an output.
///
/// `Propagated` is distinct from `Execution`: the task's own processing step
/// never ran, so reporting can say "skipped due to dependency failure"
/// rather than "failed".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("dependency discovery failed for '{key}': {message}")]
    Discovery { key: BaseKey, message: String },

    #[error("execution of '{key}' failed: {message}")]
    Execution { key: BaseKey, message: String },

    #[error("'{key}' was skipped because dependency '{failed_dependency}' failed")]
    Propagated {
        key: BaseKey,
        failed_dependency: BaseKey,
    },

    #[error("'{key}' was cancelled before reaching a terminal state")]
    Cancelled { key: BaseKey },
}

impl TaskError {
    pub fn is_propagated(&self) -> bool {
        matches!(self, TaskError::Propagated { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled { .. })
    }
}

/// Provider-defined payload of a successful task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub payload: Value,
    /// False when the provider reused a previously recorded output for the
    /// same version instead of re-executing.
    pub fresh: bool,
}

impl TaskOutput {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            fresh: true,
        }
    }

    pub fn cached(payload: Value) -> Self {
        Self {
            payload,
            fresh: false,
        }
    }
}

/// Outcome of one executed (or skipped) task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub key: BaseKey,
    pub kind: TaskKind,
    pub output: Option<TaskOutput>,
    pub error: Option<TaskError>,
    /// When the processing step started; `None` if it never ran.
    pub started: Option<SystemTime>,
    pub duration: Option<Duration>,
    /// Results of this task's direct prerequisites, so a consumer can
    /// inspect why a task was skipped.
    pub dependency_results: TaskResults,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Mapping from base key to result; iteration order is completion order.
///
/// This is the terminal artifact of a scheduler pass: it covers every node
/// in the root set's dependency closure, not only the roots.
#[derive(Debug, Clone, Default)]
pub struct TaskResults {
    order: Vec<BaseKey>,
    map: HashMap<BaseKey, TaskResult>,
}

impl TaskResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result. The first insertion for a key fixes its position in
    /// completion order; re-insertion replaces the payload in place.
    pub fn insert(&mut self, result: TaskResult) {
        let key = result.key.clone();
        if self.map.insert(key.clone(), result).is_none() {
            self.order.push(key);
        }
    }

    pub fn get(&self, key: &str) -> Option<&TaskResult> {
        self.map.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Results in completion order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskResult> {
        self.order.iter().filter_map(|key| self.map.get(key))
    }

    /// Base keys in completion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|key| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskResult> {
        self.iter().filter(|result| result.is_failure())
    }

    /// Invocation-level failure rule: the invocation failed iff any *root*
    /// task ended in error (execution, discovery, propagated or cancelled).
    /// A dependency failure alone does not fail the invocation unless it
    /// propagated to a root.
    pub fn any_root_failed(&self, roots: &[BaseKey]) -> bool {
        roots
            .iter()
            .any(|key| self.get(key).is_none_or(|result| result.is_failure()))
    }
}
