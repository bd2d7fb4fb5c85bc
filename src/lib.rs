// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod logging;
pub mod project;
pub mod provider;
pub mod report;
pub mod sched;
pub mod task;
pub mod watch;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::errors::Result;
use crate::project::{DependencyGraph, DependencyPurpose, ModuleDescriptor, VersionResolver};
use crate::provider::{CommandProvider, ProviderRegistry};
use crate::sched::TaskGraph;
use crate::task::{BaseKey, Task, TaskKind};
use crate::watch::{WatchEvent, WatchLoop, WatchLoopOptions};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and the dependency graph snapshot
/// - the command provider (with version cache)
/// - the scheduler (one-shot commands) or the watch loop (`dev`)
///
/// Returns the process exit code: non-zero iff any root task of a one-shot
/// invocation failed (including skipped-due-to-dependency-failure).
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root = config_root_dir(&config_path);

    let graph = Arc::new(DependencyGraph::from_config(&cfg, root)?);
    let versions = Arc::new(VersionResolver::new(graph.root()));
    let provider = Arc::new(CommandProvider::new(
        Arc::clone(&graph),
        Arc::clone(&versions),
    ));
    let providers = ProviderRegistry::with_all(provider);

    let requested = select_modules(&graph, args.command.modules())?;

    match &args.command {
        Command::Dev { .. } => {
            run_dev(args.jobs, args.force, graph, versions, providers, requested).await
        }
        _ => run_once(&args, &graph, &versions, providers, &requested).await,
    }
}

/// One-shot invocation: derive root tasks, run a single pass, report.
async fn run_once(
    args: &CliArgs,
    graph: &DependencyGraph,
    versions: &VersionResolver,
    providers: ProviderRegistry,
    requested: &[ModuleDescriptor],
) -> Result<i32> {
    versions.reset();
    let roots = root_tasks(&args.command, graph, versions, requested, args.force)?;
    if roots.is_empty() {
        warn!("nothing to do for the requested modules");
        return Ok(0);
    }
    let root_keys: Vec<BaseKey> = roots.iter().map(Task::base_key).collect();

    let task_graph = TaskGraph::new(providers, args.jobs);
    let results = task_graph.process(roots).await?;
    report::log_results(&results);

    if results.any_root_failed(&root_keys) {
        Ok(1)
    } else {
        Ok(0)
    }
}

/// Watch mode: initial pass over the requested modules, then re-run the
/// affected subset on every source change until Ctrl-C.
async fn run_dev(
    jobs: usize,
    force: bool,
    graph: Arc<DependencyGraph>,
    versions: Arc<VersionResolver>,
    providers: ProviderRegistry,
    requested: Vec<ModuleDescriptor>,
) -> Result<i32> {
    let (event_tx, event_rx) = mpsc::channel::<WatchEvent>(64);
    let _watcher = watch::spawn_watcher(graph.root().to_path_buf(), event_tx.clone())?;

    // Ctrl-C → graceful shutdown.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {err}");
                return;
            }
            let _ = tx.send(WatchEvent::Shutdown).await;
        });
    }

    let (report_tx, mut report_rx) = mpsc::channel(16);
    let reporter = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            report::log_pass_report(&report);
        }
    });

    let requested_names: BTreeSet<String> =
        requested.iter().map(|module| module.name.clone()).collect();

    let root_policy = {
        let graph = Arc::clone(&graph);
        let versions = Arc::clone(&versions);
        move |modules: &[ModuleDescriptor]| -> Result<Vec<Task>> {
            versions.reset();
            dev_tasks(graph.as_ref(), versions.as_ref(), modules.iter(), force)
        }
    };

    // Changed module plus everything that depends on it for building,
    // transitively, intersected with the originally requested subset.
    let change_policy = {
        let graph = Arc::clone(&graph);
        let versions = Arc::clone(&versions);
        let requested_names = requested_names.clone();
        move |changed: &ModuleDescriptor| -> Result<Vec<Task>> {
            versions.reset();
            let mut affected: Vec<&ModuleDescriptor> = vec![changed];
            affected.extend(graph.dependents(DependencyPurpose::Build, &changed.name, true));
            let affected = affected
                .into_iter()
                .filter(|module| requested_names.contains(&module.name));
            dev_tasks(graph.as_ref(), versions.as_ref(), affected, force)
        }
    };

    let watch_loop = WatchLoop::new(
        Arc::clone(&graph),
        providers,
        WatchLoopOptions {
            concurrency: jobs,
            ..WatchLoopOptions::default()
        },
    );
    watch_loop
        .run(requested, root_policy, change_policy, event_rx, report_tx)
        .await?;

    let _ = reporter.await;
    info!("watch mode stopped");
    Ok(0)
}

/// Root tasks for a one-shot command over the requested modules.
fn root_tasks(
    command: &Command,
    graph: &DependencyGraph,
    versions: &VersionResolver,
    modules: &[ModuleDescriptor],
    force: bool,
) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for module in modules {
        let version = versions.module_version(graph, &module.name)?;
        match command {
            Command::Build { .. } => {
                tasks.push(
                    Task::new(TaskKind::Build, module.name.clone(), version.clone()).forced(force),
                );
            }
            Command::Test { .. } => {
                for test in &module.tests {
                    tasks.push(
                        Task::new(TaskKind::Test, module.name.clone(), version.clone())
                            .with_target(test.name.clone())
                            .forced(force),
                    );
                }
            }
            Command::Deploy { .. } => {
                if module.is_service() {
                    tasks.push(
                        Task::new(TaskKind::Deploy, module.name.clone(), version.clone())
                            .forced(force),
                    );
                }
            }
            Command::Dev { .. } => {
                tasks.extend(dev_tasks(
                    graph,
                    versions,
                    std::iter::once(module),
                    force,
                )?);
            }
        }
    }
    Ok(tasks)
}

/// The `dev` task shape: build every module, deploy the services.
fn dev_tasks<'m>(
    graph: &DependencyGraph,
    versions: &VersionResolver,
    modules: impl IntoIterator<Item = &'m ModuleDescriptor>,
    force: bool,
) -> Result<Vec<Task>> {
    let mut tasks = Vec::new();
    for module in modules {
        let version = versions.module_version(graph, &module.name)?;
        tasks.push(Task::new(TaskKind::Build, module.name.clone(), version.clone()).forced(force));
        if module.is_service() {
            tasks.push(Task::new(TaskKind::Deploy, module.name.clone(), version).forced(force));
        }
    }
    Ok(tasks)
}

/// Resolve the requested module subset; empty means all modules.
fn select_modules(graph: &DependencyGraph, names: &[String]) -> Result<Vec<ModuleDescriptor>> {
    if names.is_empty() {
        return Ok(graph.modules().cloned().collect());
    }
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        out.push(graph.module(name)?.clone());
    }
    Ok(out)
}

/// Figure out a sensible project root for watching and hashing.
///
/// - If the config path has a non-empty parent (e.g. "configs/gantry.toml"),
///   we use that directory.
/// - If it's just a bare filename like "gantry.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
