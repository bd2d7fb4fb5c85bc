// tests/watch_loop.rs

mod common;
use crate::common::{init_tracing, registry};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio::time::timeout;

use gantry::project::{DependencyGraph, DependencyPurpose, ModuleDescriptor};
use gantry::task::{Task, TaskKind};
use gantry::watch::{PassOutcome, PassTrigger, WatchEvent, WatchLoop, WatchLoopOptions};
use gantry_test_utils::builders::{ModuleConfigBuilder, ProjectFileBuilder};
use gantry_test_utils::fake_provider::RecordingProvider;

type TestResult = Result<(), Box<dyn Error>>;

/// Two modules, `app` depending on `lib`, with real directories so watcher
/// paths relativize cleanly.
fn project_graph(root: &Path) -> DependencyGraph {
    std::fs::create_dir_all(root.join("lib")).unwrap();
    std::fs::create_dir_all(root.join("app")).unwrap();
    let cfg = ProjectFileBuilder::new("demo")
        .with_module("lib", ModuleConfigBuilder::new().build())
        .with_module("app", ModuleConfigBuilder::new().dep("lib").build())
        .build();
    DependencyGraph::from_config(&cfg, root).unwrap()
}

fn root_policy(modules: &[ModuleDescriptor]) -> gantry::errors::Result<Vec<Task>> {
    Ok(modules
        .iter()
        .map(|module| Task::new(TaskKind::Build, module.name.clone(), "v1"))
        .collect())
}

fn change_policy(
    graph: Arc<DependencyGraph>,
) -> impl Fn(&ModuleDescriptor) -> gantry::errors::Result<Vec<Task>> + Send + Sync {
    move |changed| {
        let mut tasks = vec![Task::new(TaskKind::Build, changed.name.clone(), "v2")];
        for dependent in graph.dependents(DependencyPurpose::Build, &changed.name, true) {
            tasks.push(Task::new(TaskKind::Build, dependent.name.clone(), "v2"));
        }
        Ok(tasks)
    }
}

/// Two change events arriving while a pass is active coalesce into exactly
/// one follow-up pass; passes never overlap.
#[tokio::test]
async fn changes_during_pass_coalesce_into_one_follow_up() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let graph = Arc::new(project_graph(dir.path()));
    let provider = RecordingProvider::new().with_delay(Duration::from_millis(150));
    let (providers, log) = registry(provider);

    let (event_tx, event_rx) = mpsc::channel(16);
    let (report_tx, mut report_rx) = mpsc::channel(16);

    let watch_loop = WatchLoop::new(
        Arc::clone(&graph),
        providers,
        WatchLoopOptions {
            concurrency: 4,
            settle: Duration::from_millis(100),
            ..WatchLoopOptions::default()
        },
    );

    let initial: Vec<ModuleDescriptor> = graph.modules().cloned().collect();
    let policy_graph = Arc::clone(&graph);
    let handle = tokio::spawn(async move {
        watch_loop
            .run(
                initial,
                root_policy,
                change_policy(policy_graph),
                event_rx,
                report_tx,
            )
            .await
    });

    // Two changes to lib, typically while the initial pass is still running.
    event_tx
        .send(WatchEvent::SourceChanged(graph.root().join("lib/a.rs")))
        .await?;
    event_tx
        .send(WatchEvent::SourceChanged(graph.root().join("lib/b.rs")))
        .await?;

    let first = timeout(Duration::from_secs(5), report_rx.recv())
        .await?
        .expect("initial report");
    assert_eq!(first.trigger, PassTrigger::Initial);
    assert!(matches!(first.outcome, PassOutcome::Completed(_)));

    let second = timeout(Duration::from_secs(5), report_rx.recv())
        .await?
        .expect("follow-up report");
    assert_eq!(
        second.trigger,
        PassTrigger::SourceChange(vec!["lib".to_string()])
    );
    let results = second.results().expect("follow-up results");
    assert!(results.get("build.lib").is_some());
    assert!(
        results.get("build.app").is_some(),
        "transitive dependent must be included in the follow-up pass"
    );

    // The burst produced exactly one follow-up pass.
    assert!(
        timeout(Duration::from_millis(500), report_rx.recv())
            .await
            .is_err(),
        "no third pass may be scheduled for a coalesced burst"
    );

    event_tx.send(WatchEvent::Shutdown).await?;
    timeout(Duration::from_secs(5), handle).await???;

    // Initial pass built both modules, the follow-up rebuilt both.
    assert_eq!(log.execution_count("build.lib"), 2);
    assert_eq!(log.execution_count("build.app"), 2);

    Ok(())
}

/// Shutdown during a pass lets it drain and reports it as completed; no
/// further passes run.
#[tokio::test]
async fn shutdown_during_pass_drains_in_flight_work() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let graph = Arc::new(project_graph(dir.path()));
    let provider = RecordingProvider::new().with_delay(Duration::from_millis(150));
    let (providers, log) = registry(provider);

    let (event_tx, event_rx) = mpsc::channel(16);
    let (report_tx, mut report_rx) = mpsc::channel(16);

    let watch_loop = WatchLoop::new(
        Arc::clone(&graph),
        providers,
        WatchLoopOptions::default(),
    );

    let initial: Vec<ModuleDescriptor> = graph.modules().cloned().collect();
    let policy_graph = Arc::clone(&graph);
    let handle = tokio::spawn(async move {
        watch_loop
            .run(
                initial,
                root_policy,
                change_policy(policy_graph),
                event_rx,
                report_tx,
            )
            .await
    });

    event_tx.send(WatchEvent::Shutdown).await?;

    let report = timeout(Duration::from_secs(5), report_rx.recv())
        .await?
        .expect("drained report");
    assert!(matches!(report.outcome, PassOutcome::Completed(_)));

    timeout(Duration::from_secs(5), handle).await???;

    assert!(
        timeout(Duration::from_millis(200), report_rx.recv())
            .await
            .is_ok_and(|report| report.is_none()),
        "loop must stop after shutdown"
    );
    assert_eq!(log.execution_count("build.lib"), 1);

    Ok(())
}

/// When the drain deadline is exceeded, the pass is cancelled cooperatively
/// and its unfinished tasks are reported as cancelled, not failed.
#[tokio::test]
async fn drain_deadline_cancels_the_pass() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let graph = Arc::new(project_graph(dir.path()));
    let provider = RecordingProvider::new().with_delay(Duration::from_millis(500));
    let (providers, _log) = registry(provider);

    let (event_tx, event_rx) = mpsc::channel(16);
    let (report_tx, mut report_rx) = mpsc::channel(16);

    let watch_loop = WatchLoop::new(
        Arc::clone(&graph),
        providers,
        WatchLoopOptions {
            drain_deadline: Duration::from_millis(50),
            ..WatchLoopOptions::default()
        },
    );

    let initial: Vec<ModuleDescriptor> = graph.modules().cloned().collect();
    let policy_graph = Arc::clone(&graph);
    let handle = tokio::spawn(async move {
        watch_loop
            .run(
                initial,
                root_policy,
                change_policy(policy_graph),
                event_rx,
                report_tx,
            )
            .await
    });

    event_tx.send(WatchEvent::Shutdown).await?;

    let report = timeout(Duration::from_secs(5), report_rx.recv())
        .await?
        .expect("cancelled report");
    match &report.outcome {
        PassOutcome::Cancelled(Some(results)) => {
            assert!(
                results
                    .iter()
                    .any(|result| result.error.as_ref().is_some_and(|err| err.is_cancelled())),
                "unfinished tasks must be recorded as cancelled"
            );
        }
        other => panic!("expected a cancelled pass with partial results, got {other:?}"),
    }

    timeout(Duration::from_secs(5), handle).await???;

    Ok(())
}
