// tests/process_chain.rs

mod common;
use crate::common::{init_tracing, registry};

use std::error::Error;
use std::time::Duration;

use tokio::time::timeout;

use gantry::sched::TaskGraph;
use gantry::task::{Task, TaskKind};
use gantry_test_utils::fake_provider::RecordingProvider;

type TestResult = Result<(), Box<dyn Error>>;

fn build(module: &str) -> Task {
    Task::new(TaskKind::Build, module, "v1")
}

/// Chain a -> b -> c: processing a single root executes the whole closure
/// bottom-up and returns results for every key, not only the root.
#[tokio::test]
async fn chain_executes_in_dependency_order() -> TestResult {
    init_tracing();

    let provider = RecordingProvider::new()
        .with_dependency("build.a", build("b"))
        .with_dependency("build.b", build("c"));
    let (providers, log) = registry(provider);

    let graph = TaskGraph::new(providers, 4);
    let results = timeout(Duration::from_secs(3), graph.process(vec![build("a")])).await??;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|result| result.is_success()));

    // Completion order is bottom-up for a chain.
    let keys: Vec<&str> = results.keys().collect();
    assert_eq!(keys, vec!["build.c", "build.b", "build.a"]);
    assert_eq!(
        log.executed_keys(),
        vec!["build.c".to_string(), "build.b".to_string(), "build.a".to_string()]
    );

    Ok(())
}

/// Every result carries its direct dependency results, so a consumer can
/// walk the chain from the root's result alone.
#[tokio::test]
async fn results_reference_dependency_results() -> TestResult {
    init_tracing();

    let provider = RecordingProvider::new()
        .with_dependency("build.a", build("b"))
        .with_dependency("build.b", build("c"));
    let (providers, _log) = registry(provider);

    let graph = TaskGraph::new(providers, 4);
    let results = timeout(Duration::from_secs(3), graph.process(vec![build("a")])).await??;

    let root = results.get("build.a").expect("root result missing");
    let dep = root
        .dependency_results
        .get("build.b")
        .expect("dependency result missing");
    assert!(dep.is_success());
    assert!(dep.dependency_results.get("build.c").is_some());

    Ok(())
}

/// Mutually independent tasks run concurrently, but never more than the
/// configured bound at once.
#[tokio::test]
async fn concurrency_stays_within_bound() -> TestResult {
    init_tracing();

    let provider = RecordingProvider::new().with_delay(Duration::from_millis(50));
    let (providers, log) = registry(provider);

    let roots: Vec<Task> = ["a", "b", "c", "d", "e", "f"]
        .iter()
        .map(|module| build(module))
        .collect();

    let graph = TaskGraph::new(providers, 2);
    let results = timeout(Duration::from_secs(5), graph.process(roots)).await??;

    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|result| result.is_success()));
    assert!(
        log.max_concurrent() <= 2,
        "observed {} concurrent executions with a bound of 2",
        log.max_concurrent()
    );

    Ok(())
}
