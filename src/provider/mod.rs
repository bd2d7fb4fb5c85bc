// src/provider/mod.rs

//! Pluggable execution collaborators.
//!
//! The scheduler talks to a [`Provider`] per task kind instead of running
//! work itself. This keeps provider-specific concerns (process spawning,
//! caching, backends) out of the coordination logic and makes it easy to
//! swap in a recording fake in tests.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;

use crate::task::{Task, TaskKind, TaskOutput};

pub mod cache;
pub mod command;

pub use cache::VersionCache;
pub use command::CommandProvider;

/// Boxed future type used on the provider seam.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execution collaborator for one or more task kinds.
///
/// Both operations are asynchronous and fallible; a failure is recorded as
/// the task's own failure, never as a scheduler fault.
pub trait Provider: Send + Sync {
    /// Compute the prerequisite tasks that must reach a terminal state
    /// before `task` may run. May consult the dependency graph.
    fn discover_dependencies(&self, task: Task) -> BoxFuture<'_, Result<Vec<Task>>>;

    /// Run the task's processing step.
    ///
    /// A provider may decide to skip execution and reuse a recorded output
    /// when the task's version is unchanged and `force` is false; the
    /// scheduler only requires that the node reaches a terminal state with
    /// a usable result.
    fn execute(&self, task: Task) -> BoxFuture<'_, Result<TaskOutput>>;
}

/// Providers keyed by task kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<TaskKind, Arc<dyn Provider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the same provider for every task kind.
    pub fn with_all(provider: Arc<dyn Provider>) -> Self {
        let mut registry = Self::new();
        for kind in [
            TaskKind::Build,
            TaskKind::Deploy,
            TaskKind::Test,
            TaskKind::Run,
        ] {
            registry.register(kind, Arc::clone(&provider));
        }
        registry
    }

    pub fn register(&mut self, kind: TaskKind, provider: Arc<dyn Provider>) {
        self.providers.insert(kind, provider);
    }

    pub fn with(mut self, kind: TaskKind, provider: Arc<dyn Provider>) -> Self {
        self.register(kind, provider);
        self
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).map(Arc::clone)
    }
}
