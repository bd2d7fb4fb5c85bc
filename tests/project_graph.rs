// tests/project_graph.rs

//! Config validation and dependency-graph queries.

mod common;
use crate::common::init_tracing;

use std::error::Error;

use gantry::config::validate::validate_config;
use gantry::errors::GantryError;
use gantry::project::{DependencyGraph, DependencyPurpose, EntityKind};
use gantry::watch::{build_profiles, resolve_owner};
use gantry_test_utils::builders::{ModuleConfigBuilder, ProjectFileBuilder};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn unknown_dependency_is_rejected() {
    init_tracing();

    let cfg = ProjectFileBuilder::new("demo")
        .with_module("app", ModuleConfigBuilder::new().dep("ghost").build())
        .build_unchecked();

    match validate_config(&cfg) {
        Err(GantryError::Config(message)) => {
            assert!(message.contains("unknown dependency 'ghost'"));
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_rejected() {
    init_tracing();

    let cfg = ProjectFileBuilder::new("demo")
        .with_module("app", ModuleConfigBuilder::new().dep("app").build())
        .build_unchecked();

    assert!(matches!(
        validate_config(&cfg),
        Err(GantryError::Config(_))
    ));
}

#[test]
fn dependency_cycle_is_rejected() {
    init_tracing();

    let cfg = ProjectFileBuilder::new("demo")
        .with_module("a", ModuleConfigBuilder::new().dep("b").build())
        .with_module("b", ModuleConfigBuilder::new().dep("a").build())
        .build_unchecked();

    assert!(matches!(validate_config(&cfg), Err(GantryError::Cycle(_))));
}

#[test]
fn empty_project_is_rejected() {
    init_tracing();

    let cfg = ProjectFileBuilder::new("demo").build_unchecked();
    assert!(matches!(validate_config(&cfg), Err(GantryError::Config(_))));
}

#[test]
fn entities_cover_modules_services_tests_and_tasks() -> TestResult {
    init_tracing();

    let cfg = ProjectFileBuilder::new("demo")
        .with_module(
            "api",
            ModuleConfigBuilder::new()
                .deploy_cmd("deploy.sh")
                .test("unit", "run-tests unit")
                .task("migrate", "run-migrations")
                .build(),
        )
        .with_module("lib", ModuleConfigBuilder::new().build())
        .build();
    let graph = DependencyGraph::from_config(&cfg, ".")?;

    let all = graph.entities(None, None)?;
    // api: module + service + test + task; lib: module.
    assert_eq!(all.len(), 5);

    let services = graph.entities(Some(EntityKind::Service), None)?;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].module, "api");

    let api_subentities = graph.entities(None, Some("api.*"))?;
    let names: Vec<&str> = api_subentities
        .iter()
        .map(|entity| entity.name.as_str())
        .collect();
    assert_eq!(names, vec!["api.unit", "api.migrate"]);

    Ok(())
}

#[test]
fn dependents_respect_purpose_and_transitivity() -> TestResult {
    init_tracing();

    // web -> app -> lib (build); db is only a runtime dependency of app.
    let cfg = ProjectFileBuilder::new("demo")
        .with_module("lib", ModuleConfigBuilder::new().build())
        .with_module(
            "app",
            ModuleConfigBuilder::new().dep("lib").runtime_dep("db").build(),
        )
        .with_module("web", ModuleConfigBuilder::new().dep("app").build())
        .with_module("db", ModuleConfigBuilder::new().build())
        .build();
    let graph = DependencyGraph::from_config(&cfg, ".")?;

    let direct: Vec<&str> = graph
        .dependents(DependencyPurpose::Build, "lib", false)
        .iter()
        .map(|module| module.name.as_str())
        .collect();
    assert_eq!(direct, vec!["app"]);

    let transitive: Vec<&str> = graph
        .dependents(DependencyPurpose::Build, "lib", true)
        .iter()
        .map(|module| module.name.as_str())
        .collect();
    assert_eq!(transitive, vec!["app", "web"]);

    let runtime: Vec<&str> = graph
        .dependents(DependencyPurpose::Runtime, "db", true)
        .iter()
        .map(|module| module.name.as_str())
        .collect();
    assert_eq!(runtime, vec!["app"]);

    assert!(graph.dependents(DependencyPurpose::Build, "web", true).is_empty());

    Ok(())
}

#[test]
fn changed_paths_resolve_to_the_owning_module() -> TestResult {
    init_tracing();

    let cfg = ProjectFileBuilder::new("demo")
        .with_module(
            "app",
            ModuleConfigBuilder::new()
                .path("services/app")
                .exclude("tmp/**")
                .build(),
        )
        .with_module(
            "app-worker",
            ModuleConfigBuilder::new().path("services/app/worker").build(),
        )
        .build();
    let graph = DependencyGraph::from_config(&cfg, ".")?;
    let profiles = build_profiles(&graph)?;

    let owner = |path: &str| {
        resolve_owner(&profiles, std::path::Path::new(path)).map(|profile| profile.name())
    };

    assert_eq!(owner("services/app/src/main.rs"), Some("app"));
    // The deeper module wins for nested directories.
    assert_eq!(owner("services/app/worker/job.rs"), Some("app-worker"));
    // Excluded paths do not map to the module.
    assert_eq!(owner("services/app/tmp/scratch.rs"), None);
    // Paths outside any module map nowhere.
    assert_eq!(owner("docs/readme.md"), None);

    Ok(())
}
