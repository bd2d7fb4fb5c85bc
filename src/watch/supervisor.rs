// src/watch/supervisor.rs

//! The watch loop: one full pass up front, then one pass per batch of
//! source changes, strictly serialized.
//!
//! Change events that arrive while a pass is active are queued and
//! coalesced; at most one follow-up pass is scheduled for any burst of
//! events. A fresh [`TaskGraph`] is constructed per pass so no scheduler
//! state survives between unrelated change events.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::project::{DependencyGraph, ModuleDescriptor};
use crate::provider::ProviderRegistry;
use crate::sched::TaskGraph;
use crate::task::{Task, TaskResults};
use crate::watch::profile::{build_profiles, resolve_owner, ModuleWatchProfile};
use crate::watch::WatchEvent;

/// Grace period after cooperative cancellation before a pass is abandoned.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct WatchLoopOptions {
    /// Concurrency bound handed to each pass's scheduler.
    pub concurrency: usize,
    /// How long an in-flight pass may keep draining after shutdown before
    /// it is cancelled.
    pub drain_deadline: Duration,
    /// Settle window for coalescing change bursts between passes.
    pub settle: Duration,
}

impl Default for WatchLoopOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            drain_deadline: Duration::from_secs(30),
            settle: Duration::from_millis(200),
        }
    }
}

/// What started a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassTrigger {
    Initial,
    /// Names of the modules whose sources changed.
    SourceChange(Vec<String>),
}

/// How a pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    Completed(TaskResults),
    /// Shutdown interrupted the pass. Results are present when the
    /// scheduler drained cooperatively; its non-terminal tasks are recorded
    /// as cancelled, not failed.
    Cancelled(Option<TaskResults>),
    /// Pass-level fault (e.g. a dependency cycle); watch mode keeps running.
    Faulted(String),
}

/// One entry of the per-pass result stream handed to the caller.
#[derive(Debug)]
pub struct PassReport {
    pub index: u64,
    pub trigger: PassTrigger,
    pub outcome: PassOutcome,
}

impl PassReport {
    pub fn results(&self) -> Option<&TaskResults> {
        match &self.outcome {
            PassOutcome::Completed(results) => Some(results),
            PassOutcome::Cancelled(results) => results.as_ref(),
            PassOutcome::Faulted(_) => None,
        }
    }
}

enum PassEnd {
    Continue,
    Stop,
}

/// Supervises source-change events and feeds derived task sets back into
/// the scheduler, one serialized pass at a time.
#[derive(Debug)]
pub struct WatchLoop {
    graph: Arc<DependencyGraph>,
    providers: ProviderRegistry,
    options: WatchLoopOptions,
}

impl WatchLoop {
    pub fn new(
        graph: Arc<DependencyGraph>,
        providers: ProviderRegistry,
        options: WatchLoopOptions,
    ) -> Self {
        Self {
            graph,
            providers,
            options,
        }
    }

    /// Run until the event channel yields [`WatchEvent::Shutdown`] or
    /// closes.
    ///
    /// `root_task_policy` derives the initial task set; `change_task_policy`
    /// maps one changed module to the tasks that must re-run. One
    /// [`PassReport`] is emitted per pass on `reports`. Task failures never
    /// end the loop; only shutdown does.
    pub async fn run<RP, CP>(
        &self,
        initial_modules: Vec<ModuleDescriptor>,
        root_task_policy: RP,
        change_task_policy: CP,
        mut events: mpsc::Receiver<WatchEvent>,
        reports: mpsc::Sender<PassReport>,
    ) -> Result<()>
    where
        RP: Fn(&[ModuleDescriptor]) -> Result<Vec<Task>> + Send + Sync,
        CP: Fn(&ModuleDescriptor) -> Result<Vec<Task>> + Send + Sync,
    {
        let profiles = build_profiles(self.graph.as_ref())?;
        let mut pass_index = 0u64;
        let mut pending: BTreeSet<String> = BTreeSet::new();

        info!(
            modules = initial_modules.len(),
            "watch loop starting with initial pass"
        );
        let roots = root_task_policy(&initial_modules)?;
        let end = self
            .execute_pass(
                roots,
                PassTrigger::Initial,
                &mut pass_index,
                &mut events,
                &reports,
                &profiles,
                &mut pending,
            )
            .await?;
        if matches!(end, PassEnd::Stop) {
            return Ok(());
        }

        loop {
            if pending.is_empty() {
                match events.recv().await {
                    None => {
                        info!("watch event channel closed; stopping");
                        return Ok(());
                    }
                    Some(WatchEvent::Shutdown) => {
                        info!("shutdown requested while idle; stopping");
                        return Ok(());
                    }
                    Some(WatchEvent::SourceChanged(path)) => {
                        self.note_change(&profiles, &path, &mut pending);
                    }
                }
            }

            // Let change bursts settle so one pass covers them all.
            loop {
                match tokio::time::timeout(self.options.settle, events.recv()).await {
                    Ok(Some(WatchEvent::SourceChanged(path))) => {
                        self.note_change(&profiles, &path, &mut pending);
                    }
                    Ok(Some(WatchEvent::Shutdown)) => {
                        info!("shutdown requested while idle; stopping");
                        return Ok(());
                    }
                    Ok(None) => {
                        info!("watch event channel closed; stopping");
                        return Ok(());
                    }
                    Err(_settled) => break,
                }
            }

            if pending.is_empty() {
                continue;
            }

            let changed: Vec<String> = std::mem::take(&mut pending).into_iter().collect();
            debug!(?changed, "deriving tasks for changed modules");

            let mut roots: Vec<Task> = Vec::new();
            let mut seen: BTreeSet<String> = BTreeSet::new();
            let mut policy_failed = false;
            for name in &changed {
                let module = match self.graph.module(name) {
                    Ok(module) => module,
                    Err(err) => {
                        warn!(module = %name, error = %err, "changed module not in graph; skipping");
                        continue;
                    }
                };
                match change_task_policy(module) {
                    Ok(tasks) => {
                        for task in tasks {
                            if seen.insert(task.base_key()) {
                                roots.push(task);
                            }
                        }
                    }
                    Err(err) => {
                        // Keep watching; the next change gets a fresh try.
                        error!(module = %name, error = %err, "change task policy failed");
                        policy_failed = true;
                    }
                }
            }

            if roots.is_empty() {
                if !policy_failed {
                    debug!("change policy produced no tasks; returning to idle");
                }
                continue;
            }

            let end = self
                .execute_pass(
                    roots,
                    PassTrigger::SourceChange(changed),
                    &mut pass_index,
                    &mut events,
                    &reports,
                    &profiles,
                    &mut pending,
                )
                .await?;
            if matches!(end, PassEnd::Stop) {
                return Ok(());
            }
        }
    }

    /// Run one scheduler pass while staying responsive to queued change
    /// events and shutdown.
    async fn execute_pass(
        &self,
        roots: Vec<Task>,
        trigger: PassTrigger,
        pass_index: &mut u64,
        events: &mut mpsc::Receiver<WatchEvent>,
        reports: &mpsc::Sender<PassReport>,
        profiles: &[ModuleWatchProfile],
        pending: &mut BTreeSet<String>,
    ) -> Result<PassEnd> {
        *pass_index += 1;
        let index = *pass_index;
        info!(index, tasks = roots.len(), "starting scheduler pass");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task_graph = TaskGraph::new(self.providers.clone(), self.options.concurrency);
        let mut handle: JoinHandle<Result<TaskResults>> =
            tokio::spawn(async move { task_graph.process_with_cancel(roots, Some(cancel_rx)).await });

        loop {
            tokio::select! {
                finished = &mut handle => {
                    let outcome = pass_outcome(finished);
                    self.report(reports, PassReport { index, trigger, outcome }).await;
                    return Ok(PassEnd::Continue);
                }
                event = events.recv() => match event {
                    Some(WatchEvent::SourceChanged(path)) => {
                        // Queued for the next pass; passes never overlap.
                        self.note_change(profiles, &path, pending);
                    }
                    Some(WatchEvent::Shutdown) | None => {
                        info!(index, "shutdown requested; draining in-flight pass");
                        let outcome = self.drain(&mut handle, &cancel_tx).await;
                        self.report(reports, PassReport { index, trigger, outcome }).await;
                        return Ok(PassEnd::Stop);
                    }
                }
            }
        }
    }

    /// Let an in-flight pass drain up to the hard deadline, then cancel it
    /// cooperatively, then abandon it.
    async fn drain(
        &self,
        handle: &mut JoinHandle<Result<TaskResults>>,
        cancel_tx: &watch::Sender<bool>,
    ) -> PassOutcome {
        if let Ok(finished) = tokio::time::timeout(self.options.drain_deadline, &mut *handle).await
        {
            return pass_outcome(finished);
        }

        warn!("drain deadline exceeded; cancelling pass");
        let _ = cancel_tx.send(true);
        match tokio::time::timeout(CANCEL_GRACE, &mut *handle).await {
            Ok(Ok(Ok(results))) => PassOutcome::Cancelled(Some(results)),
            Ok(_) => PassOutcome::Cancelled(None),
            Err(_elapsed) => {
                handle.abort();
                PassOutcome::Cancelled(None)
            }
        }
    }

    fn note_change(
        &self,
        profiles: &[ModuleWatchProfile],
        path: &Path,
        pending: &mut BTreeSet<String>,
    ) {
        let rel = match path.strip_prefix(self.graph.root()) {
            Ok(rel) => rel,
            Err(_) => {
                debug!(?path, "change outside project root; ignoring");
                return;
            }
        };

        match resolve_owner(profiles, rel) {
            Some(profile) => {
                if pending.insert(profile.name().to_string()) {
                    info!(module = %profile.name(), path = ?rel, "source change mapped to module");
                }
            }
            None => debug!(path = ?rel, "change did not map to any module"),
        }
    }

    async fn report(&self, reports: &mpsc::Sender<PassReport>, report: PassReport) {
        if reports.send(report).await.is_err() {
            warn!("pass report receiver dropped; continuing without reporting");
        }
    }
}

fn pass_outcome(
    finished: std::result::Result<Result<TaskResults>, tokio::task::JoinError>,
) -> PassOutcome {
    match finished {
        Ok(Ok(results)) => PassOutcome::Completed(results),
        Ok(Err(err)) => {
            error!(error = %err, "scheduler pass faulted");
            PassOutcome::Faulted(err.to_string())
        }
        Err(join_err) if join_err.is_cancelled() => PassOutcome::Cancelled(None),
        Err(join_err) => {
            error!(error = %join_err, "scheduler pass panicked");
            PassOutcome::Faulted(join_err.to_string())
        }
    }
}
