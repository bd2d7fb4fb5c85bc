// src/sched/scheduler.rs

//! The task graph pass: one coordinating loop per pass, with dependency
//! discovery and provider execution running as spawned futures that report
//! back over an event channel.
//!
//! The loop alternates between two steps:
//! 1. a *sweep* that dispatches discovery for new nodes, marks dependents of
//!    failed nodes as propagated failures, and starts execution for nodes
//!    whose dependencies are all terminal (bounded by the concurrency
//!    limit), repeated until nothing changes;
//! 2. awaiting the next [`SchedEvent`] from an in-flight future.
//!
//! The pass ends when every node reachable from the roots is terminal, or
//! immediately on a construction fault (dependency cycle).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::{GantryError, Result};
use crate::provider::ProviderRegistry;
use crate::sched::node::{NodeState, TaskNode};
use crate::task::{BaseKey, Task, TaskError, TaskOutput, TaskResult, TaskResults};

/// Events sent from spawned discovery/execution futures back to the
/// coordinating loop. Errors travel as rendered strings because provider
/// errors are recorded, not handled.
#[derive(Debug)]
enum SchedEvent {
    DepsResolved {
        key: BaseKey,
        outcome: std::result::Result<Vec<Task>, String>,
    },
    ExecFinished {
        key: BaseKey,
        outcome: std::result::Result<TaskOutput, String>,
        started: SystemTime,
        duration: Duration,
    },
}

enum LoopInput {
    Event(Option<SchedEvent>),
    Cancelled,
    CancelGone,
}

enum DepGate {
    /// At least one dependency is not terminal yet.
    Waiting,
    /// All dependencies terminal and successful.
    Clear,
    /// All dependencies terminal, at least this one failed.
    Failed(BaseKey),
}

/// Dependency-aware concurrent scheduler.
///
/// One instance coordinates one pass at a time; per-pass state lives in the
/// pass itself, so constructing a fresh `TaskGraph` per pass (as the watch
/// loop does) is cheap and leaks nothing between passes.
pub struct TaskGraph {
    providers: ProviderRegistry,
    concurrency: usize,
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl TaskGraph {
    pub fn new(providers: ProviderRegistry, concurrency: usize) -> Self {
        Self {
            providers,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one pass over `roots` and their full dependency closure.
    ///
    /// The returned [`TaskResults`] covers every discovered node, not only
    /// the roots. Individual task failures are recorded in the results;
    /// only construction faults (empty root set, unknown provider kind,
    /// dependency cycle) surface as `Err`.
    pub async fn process(&self, roots: Vec<Task>) -> Result<TaskResults> {
        self.process_with_cancel(roots, None).await
    }

    /// Like [`TaskGraph::process`], but cooperatively cancellable: when the
    /// watch channel flips to `true`, every node that has not reached a
    /// terminal state is recorded as cancelled and the partial results are
    /// returned.
    pub async fn process_with_cancel(
        &self,
        roots: Vec<Task>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<TaskResults> {
        if roots.is_empty() {
            return Err(GantryError::EmptyRoots);
        }

        let mut pass = Pass::new(&self.providers, self.concurrency);
        for task in roots {
            pass.admit(task)?;
        }
        pass.run(cancel).await
    }
}

/// Mutable state of one scheduler pass.
struct Pass<'a> {
    providers: &'a ProviderRegistry,
    concurrency: usize,
    nodes: HashMap<BaseKey, TaskNode>,
    /// Node/edge mirror of the discovered dependency structure, used for
    /// cycle detection as edges appear.
    key_graph: DiGraph<BaseKey, ()>,
    indices: HashMap<BaseKey, NodeIndex>,
    results: TaskResults,
    active: usize,
    tx: mpsc::Sender<SchedEvent>,
    rx: mpsc::Receiver<SchedEvent>,
}

impl<'a> Pass<'a> {
    fn new(providers: &'a ProviderRegistry, concurrency: usize) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            providers,
            concurrency,
            nodes: HashMap::new(),
            key_graph: DiGraph::new(),
            indices: HashMap::new(),
            results: TaskResults::new(),
            active: 0,
            tx,
            rx,
        }
    }

    /// Create a node for `task`, or attach to the existing node with the
    /// same base key (de-duplication). Attaching merges the `force` flag.
    fn admit(&mut self, task: Task) -> Result<()> {
        let key = task.base_key();

        if let Some(node) = self.nodes.get_mut(&key) {
            if node.task.version != task.version {
                warn!(
                    key = %key,
                    first = %node.task.version,
                    second = %task.version,
                    "same base key admitted with differing versions; keeping the first"
                );
            }
            node.task.force = node.task.force || task.force;
            node.requested_by += 1;
            debug!(key = %key, waiters = node.requested_by, "attached to existing node");
            return Ok(());
        }

        if self.providers.get(task.kind).is_none() {
            return Err(GantryError::UnknownProvider(task.kind));
        }

        debug!(key = %key, version = %task.version, force = task.force, "node created");
        let index = self.key_graph.add_node(key.clone());
        self.indices.insert(key.clone(), index);
        self.nodes.insert(key, TaskNode::new(task));
        Ok(())
    }

    async fn run(mut self, mut cancel: Option<watch::Receiver<bool>>) -> Result<TaskResults> {
        loop {
            self.sweep();

            if self.all_terminal() {
                break;
            }

            let input = match cancel.as_mut() {
                Some(rx) => tokio::select! {
                    event = self.rx.recv() => LoopInput::Event(event),
                    changed = rx.changed() => match changed {
                        Ok(()) if *rx.borrow() => LoopInput::Cancelled,
                        _ => LoopInput::CancelGone,
                    },
                },
                None => LoopInput::Event(self.rx.recv().await),
            };

            match input {
                LoopInput::Event(Some(event)) => self.apply(event)?,
                LoopInput::Event(None) => {
                    // Unreachable while we hold a sender; bail rather than spin.
                    warn!("scheduler event channel closed with non-terminal nodes");
                    break;
                }
                LoopInput::Cancelled => {
                    info!("pass cancelled; recording non-terminal nodes as cancelled");
                    self.cancel_remaining();
                    break;
                }
                LoopInput::CancelGone => {
                    cancel = None;
                }
            }
        }

        Ok(self.results)
    }

    /// Dispatch and propagate until nothing changes.
    fn sweep(&mut self) {
        loop {
            let mut changed = false;

            let pending: Vec<BaseKey> = self
                .nodes
                .iter()
                .filter(|(_, node)| node.state == NodeState::Pending)
                .map(|(key, _)| key.clone())
                .collect();
            for key in pending {
                self.spawn_discovery(&key);
                changed = true;
            }

            let ready: Vec<BaseKey> = self
                .nodes
                .iter()
                .filter(|(_, node)| node.state == NodeState::Ready)
                .map(|(key, _)| key.clone())
                .collect();
            for key in ready {
                match self.dep_gate(&key) {
                    DepGate::Waiting => {}
                    DepGate::Failed(dep) => {
                        self.finish_propagated(&key, dep);
                        changed = true;
                    }
                    DepGate::Clear => {
                        if self.active < self.concurrency {
                            self.spawn_execute(&key);
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                return;
            }
        }
    }

    /// Whether `key` may run: all dependencies terminal and none failed.
    fn dep_gate(&self, key: &str) -> DepGate {
        let node = match self.nodes.get(key) {
            Some(node) => node,
            None => return DepGate::Waiting,
        };

        for dep in &node.deps {
            match self.nodes.get(dep).map(|dep_node| dep_node.state) {
                Some(state) if !state.is_terminal() => return DepGate::Waiting,
                Some(NodeState::Failed) => return DepGate::Failed(dep.clone()),
                Some(_) => {}
                None => {
                    // A dependency key with no node: discovery admitted it,
                    // so this indicates internal inconsistency. Treat as a
                    // failed dependency rather than stalling the pass.
                    warn!(key, dep = %dep, "dependency has no scheduler node");
                    return DepGate::Failed(dep.clone());
                }
            }
        }

        DepGate::Clear
    }

    fn spawn_discovery(&mut self, key: &str) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let Some(provider) = self.providers.get(node.task.kind) else {
            // Guarded at admission; kept as a node failure for safety.
            let error = TaskError::Discovery {
                key: key.to_string(),
                message: format!("no provider registered for '{}'", node.task.kind),
            };
            self.finish_failed(key, error, None, None);
            return;
        };

        node.state = NodeState::Resolving;
        debug!(key, "resolving dependencies");

        let task = node.task.clone();
        let key = key.to_string();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = provider
                .discover_dependencies(task)
                .await
                .map_err(|err| format!("{err:#}"));
            let _ = tx.send(SchedEvent::DepsResolved { key, outcome }).await;
        });
    }

    fn spawn_execute(&mut self, key: &str) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let Some(provider) = self.providers.get(node.task.kind) else {
            let error = TaskError::Execution {
                key: key.to_string(),
                message: format!("no provider registered for '{}'", node.task.kind),
            };
            self.finish_failed(key, error, None, None);
            return;
        };

        node.state = NodeState::Active;
        self.active += 1;
        info!(key, active = self.active, "dependencies satisfied; dispatching");

        let task = node.task.clone();
        let key = key.to_string();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let started = SystemTime::now();
            let clock = Instant::now();
            let outcome = provider.execute(task).await.map_err(|err| format!("{err:#}"));
            let _ = tx
                .send(SchedEvent::ExecFinished {
                    key,
                    outcome,
                    started,
                    duration: clock.elapsed(),
                })
                .await;
        });
    }

    fn apply(&mut self, event: SchedEvent) -> Result<()> {
        match event {
            SchedEvent::DepsResolved { key, outcome } => match outcome {
                Ok(deps) => self.deps_resolved(key, deps),
                Err(message) => {
                    warn!(key = %key, error = %message, "dependency discovery failed");
                    let error = TaskError::Discovery {
                        key: key.clone(),
                        message,
                    };
                    self.finish_failed(&key, error, None, None);
                    Ok(())
                }
            },
            SchedEvent::ExecFinished {
                key,
                outcome,
                started,
                duration,
            } => {
                self.active = self.active.saturating_sub(1);
                match outcome {
                    Ok(output) => self.finish_success(&key, output, started, duration),
                    Err(message) => {
                        warn!(key = %key, error = %message, "task execution failed");
                        let error = TaskError::Execution {
                            key: key.clone(),
                            message,
                        };
                        self.finish_failed(&key, error, Some(started), Some(duration));
                    }
                }
                Ok(())
            }
        }
    }

    /// Record resolved dependencies for `key`: admit each discovered task,
    /// mirror the edges, and fail the whole pass on a cycle.
    fn deps_resolved(&mut self, key: BaseKey, deps: Vec<Task>) -> Result<()> {
        let mut dep_keys: Vec<BaseKey> = Vec::with_capacity(deps.len());
        let mut seen: HashSet<BaseKey> = HashSet::new();

        for dep in deps {
            let dep_key = dep.base_key();
            self.admit(dep)?;
            if seen.insert(dep_key.clone()) {
                dep_keys.push(dep_key);
            }
        }

        for dep_key in &dep_keys {
            if let (Some(&from), Some(&to)) = (self.indices.get(dep_key), self.indices.get(&key)) {
                self.key_graph.add_edge(from, to, ());
            }
        }

        // A cycle means no valid execution order exists; abort the pass
        // wholesale with no partial results.
        if is_cyclic_directed(&self.key_graph) {
            return Err(GantryError::Cycle(key));
        }

        if let Some(node) = self.nodes.get_mut(&key) {
            debug!(key = %key, deps = ?dep_keys, "dependencies resolved");
            node.deps = dep_keys;
            node.state = NodeState::Ready;
        }

        Ok(())
    }

    /// Direct-dependency results for `key`, cloned out of the aggregate.
    fn dependency_results(&self, key: &str) -> TaskResults {
        let mut out = TaskResults::new();
        if let Some(node) = self.nodes.get(key) {
            for dep in &node.deps {
                if let Some(result) = self.results.get(dep) {
                    out.insert(result.clone());
                }
            }
        }
        out
    }

    fn finish_success(
        &mut self,
        key: &str,
        output: TaskOutput,
        started: SystemTime,
        duration: Duration,
    ) {
        let dependency_results = self.dependency_results(key);
        if let Some(node) = self.nodes.get_mut(key) {
            node.state = NodeState::Succeeded;
            info!(key, fresh = output.fresh, ?duration, "task succeeded");
            self.results.insert(TaskResult {
                key: key.to_string(),
                kind: node.task.kind,
                output: Some(output),
                error: None,
                started: Some(started),
                duration: Some(duration),
                dependency_results,
            });
        }
    }

    fn finish_failed(
        &mut self,
        key: &str,
        error: TaskError,
        started: Option<SystemTime>,
        duration: Option<Duration>,
    ) {
        let dependency_results = self.dependency_results(key);
        if let Some(node) = self.nodes.get_mut(key) {
            node.state = NodeState::Failed;
            self.results.insert(TaskResult {
                key: key.to_string(),
                kind: node.task.kind,
                output: None,
                error: Some(error),
                started,
                duration,
                dependency_results,
            });
        }
    }

    fn finish_propagated(&mut self, key: &str, failed_dependency: BaseKey) {
        warn!(
            key,
            dependency = %failed_dependency,
            "skipping task: dependency failed"
        );
        let error = TaskError::Propagated {
            key: key.to_string(),
            failed_dependency,
        };
        self.finish_failed(key, error, None, None);
    }

    /// Record every non-terminal node as cancelled, in stable key order.
    fn cancel_remaining(&mut self) {
        let mut remaining: Vec<BaseKey> = self
            .nodes
            .iter()
            .filter(|(_, node)| !node.state.is_terminal())
            .map(|(key, _)| key.clone())
            .collect();
        remaining.sort();

        for key in remaining {
            let error = TaskError::Cancelled { key: key.clone() };
            self.finish_failed(&key, error, None, None);
        }
    }

    fn all_terminal(&self) -> bool {
        self.nodes.values().all(|node| node.state.is_terminal())
    }
}
