// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level project configuration as read from a TOML file.
///
/// ```toml
/// [project]
/// name = "demo"
/// default_exclude = [".git/**", "target/**"]
///
/// [module.api]
/// path = "services/api"
/// build = "cargo build -p api"
/// deploy = "scripts/deploy.sh api"
/// deps = ["lib"]
/// runtime_deps = ["db"]
///
/// [module.api.test.unit]
/// cmd = "cargo test -p api"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    pub project: ProjectSection,

    /// All modules from `[module.<name>]`. Keys are the module names.
    #[serde(default)]
    pub module: BTreeMap<String, ModuleConfig>,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    pub name: String,

    /// Include patterns applied to modules that do not declare their own.
    /// Empty means "every file under the module directory".
    #[serde(default)]
    pub default_include: Vec<String>,

    /// Exclude patterns applied to modules that do not declare their own.
    #[serde(default = "default_exclude")]
    pub default_exclude: Vec<String>,
}

fn default_exclude() -> Vec<String> {
    vec![
        ".git/**".to_string(),
        "target/**".to_string(),
        "node_modules/**".to_string(),
    ]
}

/// `[module.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModuleConfig {
    /// Module directory relative to the project root. Defaults to the
    /// module name.
    #[serde(default)]
    pub path: Option<String>,

    /// Shell command producing the module's build artifact. Modules without
    /// a build command still get a build task (a no-op) so that dependency
    /// ordering and versioning stay uniform.
    #[serde(default)]
    pub build: Option<String>,

    /// Shell command deploying the module; its presence makes the module a
    /// service entity.
    #[serde(default)]
    pub deploy: Option<String>,

    /// Build dependencies: modules whose build must finish first.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Runtime dependencies: modules this one talks to when deployed.
    #[serde(default)]
    pub runtime_deps: Vec<String>,

    /// Source patterns owned by this module, relative to its directory.
    /// If `None`, `project.default_include` applies.
    #[serde(default)]
    pub include: Option<Vec<String>>,

    /// If `None`, `project.default_exclude` applies.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// Named test commands from `[module.<name>.test.<name>]`.
    #[serde(default)]
    pub test: BTreeMap<String, CommandConfig>,

    /// Named aux task commands from `[module.<name>.task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, CommandConfig>,
}

impl ModuleConfig {
    pub fn effective_include(&self, defaults: &ProjectSection) -> Vec<String> {
        match &self.include {
            Some(patterns) => patterns.clone(),
            None => defaults.default_include.clone(),
        }
    }

    pub fn effective_exclude(&self, defaults: &ProjectSection) -> Vec<String> {
        match &self.exclude {
            Some(patterns) => patterns.clone(),
            None => defaults.default_exclude.clone(),
        }
    }
}

/// A single named command (test or aux task).
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub cmd: String,
}
