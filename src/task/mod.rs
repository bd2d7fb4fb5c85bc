// src/task/mod.rs

//! The task data model: units of schedulable work and their identities.

use std::fmt;

pub mod result;

pub use result::{TaskError, TaskOutput, TaskResult, TaskResults};

/// Canonical task identity type used throughout the scheduler.
///
/// A base key is stable across re-requests of the same unit of work: it does
/// not encode `version` or `force`.
pub type BaseKey = String;

/// Closed set of work kinds gantry knows how to schedule.
///
/// The kind selects which provider handles discovery and execution; the
/// scheduler itself treats all kinds uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Build,
    Deploy,
    Test,
    Run,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Build => "build",
            TaskKind::Deploy => "deploy",
            TaskKind::Test => "test",
            TaskKind::Run => "run",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One schedulable unit of work against a module or one of its sub-entities.
///
/// Two tasks describe the same unit of work iff their base key and `version`
/// match. Tasks with an equal base key but different `force` flags collapse
/// to a single scheduler node whose `force` is the OR of the requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub kind: TaskKind,
    /// Name of the module this task operates on.
    pub module: String,
    /// Sub-entity within the module (test or aux task name), when applicable.
    pub target: Option<String>,
    /// Content fingerprint of the module and its resolved inputs.
    pub version: String,
    /// Bypass any cache/staleness short-circuit in the provider.
    pub force: bool,
}

impl Task {
    pub fn new(kind: TaskKind, module: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind,
            module: module.into(),
            target: None,
            version: version.into(),
            force: false,
        }
    }

    /// Address a sub-entity of the module, e.g. a named test.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Stable identity of this task, independent of `force` and `version`.
    ///
    /// E.g. `"build.api"` or `"test.api.unit"`.
    pub fn base_key(&self) -> BaseKey {
        match &self.target {
            Some(target) => format!("{}.{}.{}", self.kind, self.module, target),
            None => format!("{}.{}", self.kind, self.module),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_key())
    }
}
