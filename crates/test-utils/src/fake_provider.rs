use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::json;

use gantry::provider::{BoxFuture, Provider};
use gantry::task::{BaseKey, Task, TaskOutput};

/// One recorded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTask {
    pub key: BaseKey,
    pub force: bool,
}

#[derive(Debug, Default)]
struct Gauge {
    current: usize,
    max: usize,
}

/// Shared observation log for a [`RecordingProvider`].
#[derive(Debug, Default)]
pub struct ExecutionLog {
    executed: Mutex<Vec<ExecutedTask>>,
    discovered: Mutex<Vec<BaseKey>>,
    gauge: Mutex<Gauge>,
}

impl ExecutionLog {
    /// Keys whose processing step ran, in dispatch-completion order.
    pub fn executed_keys(&self) -> Vec<BaseKey> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn executed(&self) -> Vec<ExecutedTask> {
        self.executed.lock().unwrap().clone()
    }

    /// How many times the processing step ran for `key`.
    pub fn execution_count(&self, key: &str) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.key == key)
            .count()
    }

    pub fn discovered_keys(&self) -> Vec<BaseKey> {
        self.discovered.lock().unwrap().clone()
    }

    /// Highest number of executions observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.gauge.lock().unwrap().max
    }

    fn record_discovery(&self, key: BaseKey) {
        self.discovered.lock().unwrap().push(key);
    }

    fn record_execution(&self, key: BaseKey, force: bool) {
        self.executed.lock().unwrap().push(ExecutedTask { key, force });
    }

    fn enter(&self) {
        let mut gauge = self.gauge.lock().unwrap();
        gauge.current += 1;
        gauge.max = gauge.max.max(gauge.current);
    }

    fn exit(&self) {
        let mut gauge = self.gauge.lock().unwrap();
        gauge.current = gauge.current.saturating_sub(1);
    }
}

/// A scripted in-memory provider:
/// - dependency edges come from a fixed `base key -> tasks` map
/// - configured keys fail discovery or execution
/// - every discovery/execution is recorded, so tests can assert which
///   processing steps ran (and which never did)
pub struct RecordingProvider {
    deps: HashMap<BaseKey, Vec<Task>>,
    exec_failures: HashSet<BaseKey>,
    discovery_failures: HashSet<BaseKey>,
    delay: Option<Duration>,
    log: Arc<ExecutionLog>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self {
            deps: HashMap::new(),
            exec_failures: HashSet::new(),
            discovery_failures: HashSet::new(),
            delay: None,
            log: Arc::new(ExecutionLog::default()),
        }
    }

    /// Script a prerequisite for the task with the given base key.
    pub fn with_dependency(mut self, key: &str, dep: Task) -> Self {
        self.deps.entry(key.to_string()).or_default().push(dep);
        self
    }

    pub fn with_exec_failure(mut self, key: &str) -> Self {
        self.exec_failures.insert(key.to_string());
        self
    }

    pub fn with_discovery_failure(mut self, key: &str) -> Self {
        self.discovery_failures.insert(key.to_string());
        self
    }

    /// Make every execution take at least this long (for concurrency and
    /// watch serialization tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn log(&self) -> Arc<ExecutionLog> {
        Arc::clone(&self.log)
    }
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for RecordingProvider {
    fn discover_dependencies(&self, task: Task) -> BoxFuture<'_, Result<Vec<Task>>> {
        Box::pin(async move {
            let key = task.base_key();
            self.log.record_discovery(key.clone());

            if self.discovery_failures.contains(&key) {
                bail!("scripted discovery failure for '{key}'");
            }

            Ok(self.deps.get(&key).cloned().unwrap_or_default())
        })
    }

    fn execute(&self, task: Task) -> BoxFuture<'_, Result<TaskOutput>> {
        Box::pin(async move {
            let key = task.base_key();
            self.log.enter();

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.log.record_execution(key.clone(), task.force);
            self.log.exit();

            if self.exec_failures.contains(&key) {
                bail!("scripted execution failure for '{key}'");
            }

            Ok(TaskOutput::new(json!({ "key": key })))
        })
    }
}
