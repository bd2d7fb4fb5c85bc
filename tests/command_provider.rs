// tests/command_provider.rs

//! Exercises the real shell-command provider: version-addressed caching,
//! force bypass, dependency shapes and failure surfacing.

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;

use gantry::project::{DependencyGraph, VersionResolver};
use gantry::provider::{CommandProvider, ProviderRegistry};
use gantry::sched::TaskGraph;
use gantry::task::{Task, TaskError, TaskKind};
use gantry_test_utils::builders::{ModuleConfigBuilder, ProjectFileBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn marker_lines(root: &Path) -> usize {
    fs::read_to_string(root.join("marker.txt"))
        .map(|content| content.lines().count())
        .unwrap_or(0)
}

struct Fixture {
    graph: Arc<DependencyGraph>,
    versions: Arc<VersionResolver>,
    providers: ProviderRegistry,
}

/// One module `app` whose build appends a line to `../marker.txt` (outside
/// the module directory, so the module version is unaffected by builds).
fn fixture(root: &Path, build_cmd: &str) -> Fixture {
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(root.join("app/main.txt"), "one").unwrap();

    let cfg = ProjectFileBuilder::new("demo")
        .with_module("app", ModuleConfigBuilder::new().build_cmd(build_cmd).build())
        .build();
    let graph = Arc::new(DependencyGraph::from_config(&cfg, root).unwrap());
    let versions = Arc::new(VersionResolver::new(graph.root()));
    let provider = Arc::new(CommandProvider::new(
        Arc::clone(&graph),
        Arc::clone(&versions),
    ));
    Fixture {
        graph,
        versions,
        providers: ProviderRegistry::with_all(provider),
    }
}

/// An unchanged version short-circuits to the recorded output; force and a
/// content change both re-execute.
#[tokio::test]
async fn version_cache_skips_unchanged_builds() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let fx = fixture(dir.path(), "echo built >> ../marker.txt");

    let version_one = fx.versions.module_version(&fx.graph, "app")?;
    let task = Task::new(TaskKind::Build, "app", version_one.clone());

    // First pass executes the command.
    let graph = TaskGraph::new(fx.providers.clone(), 2);
    let results = timeout(Duration::from_secs(5), graph.process(vec![task.clone()])).await??;
    let first = results.get("build.app").expect("missing result");
    assert!(first.is_success());
    assert!(first.output.as_ref().is_some_and(|output| output.fresh));
    assert_eq!(marker_lines(dir.path()), 1);

    // Same version again: the provider reuses the recorded output.
    let graph = TaskGraph::new(fx.providers.clone(), 2);
    let results = timeout(Duration::from_secs(5), graph.process(vec![task.clone()])).await??;
    let second = results.get("build.app").expect("missing result");
    assert!(second.is_success());
    assert!(second.output.as_ref().is_some_and(|output| !output.fresh));
    assert_eq!(marker_lines(dir.path()), 1);

    // Force bypasses the cache.
    let graph = TaskGraph::new(fx.providers.clone(), 2);
    let results = timeout(
        Duration::from_secs(5),
        graph.process(vec![task.forced(true)]),
    )
    .await??;
    assert!(
        results
            .get("build.app")
            .and_then(|result| result.output.as_ref())
            .is_some_and(|output| output.fresh)
    );
    assert_eq!(marker_lines(dir.path()), 2);

    // A content change produces a new version, which misses the cache.
    fs::write(dir.path().join("app/main.txt"), "two")?;
    fx.versions.reset();
    let version_two = fx.versions.module_version(&fx.graph, "app")?;
    assert_ne!(version_one, version_two);

    let graph = TaskGraph::new(fx.providers, 2);
    let results = timeout(
        Duration::from_secs(5),
        graph.process(vec![Task::new(TaskKind::Build, "app", version_two)]),
    )
    .await??;
    assert!(
        results
            .get("build.app")
            .and_then(|result| result.output.as_ref())
            .is_some_and(|output| output.fresh)
    );
    assert_eq!(marker_lines(dir.path()), 3);

    Ok(())
}

/// A non-zero exit is surfaced as that task's execution failure, with the
/// status in the message.
#[tokio::test]
async fn failing_command_is_an_execution_failure() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let fx = fixture(dir.path(), "exit 3");

    let version = fx.versions.module_version(&fx.graph, "app")?;
    let graph = TaskGraph::new(fx.providers, 2);
    let results = timeout(
        Duration::from_secs(5),
        graph.process(vec![Task::new(TaskKind::Build, "app", version)]),
    )
    .await??;

    match &results.get("build.app").expect("missing result").error {
        Some(TaskError::Execution { message, .. }) => {
            assert!(message.contains("status 3"), "unexpected message: {message}");
        }
        other => panic!("expected execution failure, got {other:?}"),
    }

    Ok(())
}

/// A provider deadline turns a hung command into that task's failure, not a
/// scheduler fault.
#[tokio::test]
async fn command_timeout_fails_the_task() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("app"))?;

    let cfg = ProjectFileBuilder::new("demo")
        .with_module("app", ModuleConfigBuilder::new().build_cmd("sleep 5").build())
        .build();
    let graph = Arc::new(DependencyGraph::from_config(&cfg, dir.path()).unwrap());
    let versions = Arc::new(VersionResolver::new(graph.root()));
    let provider = Arc::new(
        CommandProvider::new(Arc::clone(&graph), Arc::clone(&versions))
            .with_timeout(Duration::from_millis(100)),
    );
    let providers = ProviderRegistry::with_all(provider);

    let version = versions.module_version(&graph, "app")?;
    let task_graph = TaskGraph::new(providers, 2);
    let results = timeout(
        Duration::from_secs(5),
        task_graph.process(vec![Task::new(TaskKind::Build, "app", version)]),
    )
    .await??;

    match &results.get("build.app").expect("missing result").error {
        Some(TaskError::Execution { message, .. }) => {
            assert!(message.contains("timed out"), "unexpected message: {message}");
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }

    Ok(())
}

/// Build dependencies are discovered from the module graph: building `app`
/// builds `lib` first, and a module without a build command completes as a
/// no-op.
#[tokio::test]
async fn discovery_follows_module_dependencies() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("app"))?;
    fs::create_dir_all(dir.path().join("lib"))?;

    let cfg = ProjectFileBuilder::new("demo")
        .with_module(
            "app",
            ModuleConfigBuilder::new()
                .build_cmd("echo app >> ../order.txt")
                .dep("lib")
                .build(),
        )
        .with_module("lib", ModuleConfigBuilder::new().build())
        .build();
    let graph = Arc::new(DependencyGraph::from_config(&cfg, dir.path()).unwrap());
    let versions = Arc::new(VersionResolver::new(graph.root()));
    let provider = Arc::new(CommandProvider::new(
        Arc::clone(&graph),
        Arc::clone(&versions),
    ));
    let providers = ProviderRegistry::with_all(provider);

    let version = versions.module_version(&graph, "app")?;
    let task_graph = TaskGraph::new(providers, 2);
    let results = timeout(
        Duration::from_secs(5),
        task_graph.process(vec![Task::new(TaskKind::Build, "app", version)]),
    )
    .await??;

    assert_eq!(results.len(), 2);
    let keys: Vec<&str> = results.keys().collect();
    assert_eq!(keys, vec!["build.lib", "build.app"]);

    // The command-less lib build is a successful no-op.
    let lib = results.get("build.lib").expect("missing lib result");
    assert!(lib.is_success());
    assert_eq!(
        lib.output.as_ref().map(|output| output.payload["exit_code"].clone()),
        Some(serde_json::json!(0))
    );

    Ok(())
}
