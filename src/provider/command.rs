// src/provider/command.rs

//! Local shell-command backend: the default provider for all task kinds.
//!
//! Commands come from the project configuration (build/deploy commands and
//! named test/task commands per module). Staleness is handled here, not in
//! the scheduler: when a task's version matches the recorded output and
//! `force` is false, execution short-circuits with the cached payload.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info};

use crate::project::{DependencyGraph, VersionResolver};
use crate::provider::{BoxFuture, Provider, VersionCache};
use crate::task::{Task, TaskKind, TaskOutput};

/// How much of a command's stdout is kept in the task payload.
const STDOUT_TAIL_BYTES: usize = 4096;

pub struct CommandProvider {
    graph: Arc<DependencyGraph>,
    versions: Arc<VersionResolver>,
    cache: Arc<VersionCache>,
    timeout: Option<Duration>,
}

impl CommandProvider {
    pub fn new(graph: Arc<DependencyGraph>, versions: Arc<VersionResolver>) -> Self {
        Self {
            graph,
            versions,
            cache: Arc::new(VersionCache::new()),
            timeout: None,
        }
    }

    /// Deadline for a single command; a timeout is surfaced as that task's
    /// execution failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache(&self) -> Arc<VersionCache> {
        Arc::clone(&self.cache)
    }

    fn command_for(&self, task: &Task) -> Result<Option<String>> {
        let module = self.graph.module(&task.module)?;
        match task.kind {
            TaskKind::Build => Ok(module.build_cmd.clone()),
            TaskKind::Deploy => {
                let cmd = module
                    .deploy_cmd
                    .clone()
                    .with_context(|| format!("module '{}' has no deploy command", module.name))?;
                Ok(Some(cmd))
            }
            TaskKind::Test => {
                let target = task
                    .target
                    .as_deref()
                    .context("test task is missing a target name")?;
                let test = module.test(target).with_context(|| {
                    format!("module '{}' has no test named '{target}'", module.name)
                })?;
                Ok(Some(test.cmd.clone()))
            }
            TaskKind::Run => {
                let target = task
                    .target
                    .as_deref()
                    .context("run task is missing a target name")?;
                let aux = module.task(target).with_context(|| {
                    format!("module '{}' has no task named '{target}'", module.name)
                })?;
                Ok(Some(aux.cmd.clone()))
            }
        }
    }
}

impl Provider for CommandProvider {
    fn discover_dependencies(&self, task: Task) -> BoxFuture<'_, Result<Vec<Task>>> {
        Box::pin(async move {
            let graph = Arc::clone(&self.graph);
            let versions = Arc::clone(&self.versions);

            // Version hashing reads module trees; keep it off the
            // scheduler's coordination thread.
            tokio::task::spawn_blocking(move || standard_dependencies(&graph, &versions, &task))
                .await
                .map_err(|err| anyhow!("dependency discovery worker panicked: {err}"))?
        })
    }

    fn execute(&self, task: Task) -> BoxFuture<'_, Result<TaskOutput>> {
        Box::pin(async move {
            let key = task.base_key();

            if !task.force
                && let Some(payload) = self.cache.lookup(&key, &task.version)
            {
                info!(key = %key, version = %task.version, "version unchanged; reusing recorded output");
                return Ok(TaskOutput::cached(payload));
            }

            let command = self.command_for(&task)?;
            let module = self.graph.module(&task.module)?;
            let cwd = self.graph.root().join(&module.path);

            let payload = match command {
                Some(cmd) => run_command(&key, &cmd, &cwd, self.timeout).await?,
                None => {
                    debug!(key = %key, "no command configured; completing as a no-op");
                    json!({ "command": Value::Null, "exit_code": 0 })
                }
            };

            self.cache.record(&key, &task.version, &payload);
            Ok(TaskOutput::new(payload))
        })
    }
}

/// The standard dependency shapes:
/// - `build.M` waits for the builds of M's build deps
/// - `deploy.M` waits for `build.M` plus the deploys (or builds) of M's
///   runtime deps
/// - `test.M.T` and `run.M.T` wait for `build.M`
fn standard_dependencies(
    graph: &DependencyGraph,
    versions: &VersionResolver,
    task: &Task,
) -> Result<Vec<Task>> {
    let module = graph.module(&task.module)?;
    let mut deps = Vec::new();

    match task.kind {
        TaskKind::Build => {
            for dep in &module.build_deps {
                let version = versions.module_version(graph, dep)?;
                deps.push(Task::new(TaskKind::Build, dep, version));
            }
        }
        TaskKind::Deploy => {
            let version = versions.module_version(graph, &module.name)?;
            deps.push(Task::new(TaskKind::Build, &module.name, version));
            for dep in &module.runtime_deps {
                let dep_module = graph.module(dep)?;
                let dep_version = versions.module_version(graph, dep)?;
                let kind = if dep_module.is_service() {
                    TaskKind::Deploy
                } else {
                    TaskKind::Build
                };
                deps.push(Task::new(kind, dep, dep_version));
            }
        }
        TaskKind::Test | TaskKind::Run => {
            let version = versions.module_version(graph, &module.name)?;
            deps.push(Task::new(TaskKind::Build, &module.name, version));
        }
    }

    Ok(deps)
}

async fn run_command(
    key: &str,
    cmd_str: &str,
    cwd: &Path,
    timeout: Option<Duration>,
) -> Result<Value> {
    info!(key, cmd = %cmd_str, "starting task process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_str);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_str);
        c
    };

    cmd.current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{key}'"))?;

    let wait = child.wait_with_output();
    let output = match timeout {
        Some(deadline) => tokio::time::timeout(deadline, wait)
            .await
            .map_err(|_| anyhow!("command timed out after {deadline:?}"))?,
        None => wait.await,
    }
    .with_context(|| format!("waiting for process of task '{key}'"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(key, "stderr: {line}");
    }

    let code = output.status.code().unwrap_or(-1);
    info!(key, exit_code = code, success = output.status.success(), "task process exited");

    if !output.status.success() {
        bail!("command exited with status {code}: {}", tail(&stderr));
    }

    Ok(json!({
        "command": cmd_str,
        "exit_code": code,
        "stdout": tail(&stdout),
    }))
}

fn tail(text: &str) -> &str {
    let start = text.len().saturating_sub(STDOUT_TAIL_BYTES);
    // Walk forward to the next char boundary.
    let mut idx = start;
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    &text[idx..]
}
