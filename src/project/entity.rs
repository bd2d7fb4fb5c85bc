// src/project/entity.rs

//! Descriptors for the entities a project is made of.

use std::path::PathBuf;

/// Kinds of addressable entities derived from the project configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Module,
    /// A module with a deploy command.
    Service,
    Test,
    Task,
}

/// Why one module depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyPurpose {
    Build,
    Runtime,
}

/// Lightweight reference to an entity, as returned by entity queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Qualified name: the module name, or `"<module>.<target>"` for tests
    /// and aux tasks.
    pub name: String,
    /// Owning module.
    pub module: String,
}

/// A named shell command attached to a module (test or aux task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCommand {
    pub name: String,
    pub cmd: String,
}

/// A named unit of source with declared build/runtime dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    /// Module directory, relative to the project root.
    pub path: PathBuf,
    pub build_cmd: Option<String>,
    pub deploy_cmd: Option<String>,
    pub build_deps: Vec<String>,
    pub runtime_deps: Vec<String>,
    /// Source patterns relative to the module directory; empty means all.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub tests: Vec<NamedCommand>,
    pub tasks: Vec<NamedCommand>,
}

impl ModuleDescriptor {
    pub fn is_service(&self) -> bool {
        self.deploy_cmd.is_some()
    }

    pub fn test(&self, name: &str) -> Option<&NamedCommand> {
        self.tests.iter().find(|test| test.name == name)
    }

    pub fn task(&self, name: &str) -> Option<&NamedCommand> {
        self.tasks.iter().find(|task| task.name == name)
    }

    /// Direct dependency names for the given purpose.
    pub fn deps_for(&self, purpose: DependencyPurpose) -> &[String] {
        match purpose {
            DependencyPurpose::Build => &self.build_deps,
            DependencyPurpose::Runtime => &self.runtime_deps,
        }
    }
}
