// src/sched/node.rs

//! Per-task bookkeeping inside a single scheduler pass.

use crate::task::{BaseKey, Task};

/// Lifecycle state of a scheduler node.
///
/// `Succeeded` and `Failed` are terminal; a node only becomes `Active`
/// after every one of its dependency nodes is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created; dependency discovery not yet started.
    Pending,
    /// Dependency discovery in flight.
    Resolving,
    /// Dependencies known; waiting for them to go terminal (and for a free
    /// execution slot).
    Ready,
    /// Processing step dispatched to the provider.
    Active,
    Succeeded,
    Failed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Failed)
    }
}

/// One live node per base key; a second request for an in-flight key
/// attaches to the existing node instead of creating a new one.
#[derive(Debug)]
pub struct TaskNode {
    pub task: Task,
    pub state: NodeState,
    /// Base keys of this node's prerequisites. Immutable once discovery
    /// completes.
    pub deps: Vec<BaseKey>,
    /// How many tasks (roots or dependents) requested this node.
    pub requested_by: usize,
}

impl TaskNode {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            state: NodeState::Pending,
            deps: Vec::new(),
            requested_by: 1,
        }
    }
}
