#![allow(dead_code)]

use std::collections::BTreeMap;

use gantry::config::{CommandConfig, ModuleConfig, ProjectFile, ProjectSection};
use gantry::config::validate::validate_config;

/// Builder for `ProjectFile` to simplify test setup.
pub struct ProjectFileBuilder {
    project: ProjectSection,
    modules: BTreeMap<String, ModuleConfig>,
}

impl ProjectFileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            project: ProjectSection {
                name: name.to_string(),
                default_include: Vec::new(),
                default_exclude: Vec::new(),
            },
            modules: BTreeMap::new(),
        }
    }

    pub fn with_module(mut self, name: &str, module: ModuleConfig) -> Self {
        self.modules.insert(name.to_string(), module);
        self
    }

    pub fn with_default_include(mut self, pattern: &str) -> Self {
        self.project.default_include.push(pattern.to_string());
        self
    }

    pub fn with_default_exclude(mut self, pattern: &str) -> Self {
        self.project.default_exclude.push(pattern.to_string());
        self
    }

    pub fn build(self) -> ProjectFile {
        let cfg = ProjectFile {
            project: self.project,
            module: self.modules,
        };
        validate_config(&cfg).expect("builder produced an invalid project file");
        cfg
    }

    /// Build without validation, for tests exercising the validator itself.
    pub fn build_unchecked(self) -> ProjectFile {
        ProjectFile {
            project: self.project,
            module: self.modules,
        }
    }
}

/// Builder for `ModuleConfig`.
pub struct ModuleConfigBuilder {
    module: ModuleConfig,
}

impl ModuleConfigBuilder {
    pub fn new() -> Self {
        Self {
            module: ModuleConfig::default(),
        }
    }

    pub fn path(mut self, path: &str) -> Self {
        self.module.path = Some(path.to_string());
        self
    }

    pub fn build_cmd(mut self, cmd: &str) -> Self {
        self.module.build = Some(cmd.to_string());
        self
    }

    pub fn deploy_cmd(mut self, cmd: &str) -> Self {
        self.module.deploy = Some(cmd.to_string());
        self
    }

    pub fn dep(mut self, name: &str) -> Self {
        self.module.deps.push(name.to_string());
        self
    }

    pub fn runtime_dep(mut self, name: &str) -> Self {
        self.module.runtime_deps.push(name.to_string());
        self
    }

    pub fn include(mut self, pattern: &str) -> Self {
        self.module
            .include
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.module
            .exclude
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn test(mut self, name: &str, cmd: &str) -> Self {
        self.module.test.insert(
            name.to_string(),
            CommandConfig {
                cmd: cmd.to_string(),
            },
        );
        self
    }

    pub fn task(mut self, name: &str, cmd: &str) -> Self {
        self.module.task.insert(
            name.to_string(),
            CommandConfig {
                cmd: cmd.to_string(),
            },
        );
        self
    }

    pub fn build(self) -> ModuleConfig {
        self.module
    }
}

impl Default for ModuleConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
