// src/project/graph.rs

//! Immutable dependency-graph snapshot built from a validated project file.
//!
//! One snapshot is built per resolution cycle; the scheduler and the watch
//! loop only ever query it, never mutate it.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use globset::Glob;
use tracing::debug;

use crate::config::model::ProjectFile;
use crate::errors::{GantryError, Result};
use crate::project::entity::{
    DependencyPurpose, EntityDescriptor, EntityKind, ModuleDescriptor, NamedCommand,
};

/// Answers the queries the scheduler, task policies and watch loop need:
/// module lookup, entity listing and (transitive) dependent sets per
/// dependency purpose.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    root: PathBuf,
    modules: BTreeMap<String, ModuleDescriptor>,
    /// purpose -> module -> direct dependents.
    dependents: HashMap<DependencyPurpose, HashMap<String, Vec<String>>>,
}

impl DependencyGraph {
    /// Build a snapshot from a validated [`ProjectFile`].
    ///
    /// `root` is the project root directory all module paths are relative
    /// to; it is canonicalized when possible so that watcher paths can be
    /// relativized against it.
    pub fn from_config(cfg: &ProjectFile, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);

        let mut modules = BTreeMap::new();

        for (name, mc) in cfg.module.iter() {
            let descriptor = ModuleDescriptor {
                name: name.clone(),
                path: PathBuf::from(mc.path.clone().unwrap_or_else(|| name.clone())),
                build_cmd: mc.build.clone(),
                deploy_cmd: mc.deploy.clone(),
                build_deps: mc.deps.clone(),
                runtime_deps: mc.runtime_deps.clone(),
                include: mc.effective_include(&cfg.project),
                exclude: mc.effective_exclude(&cfg.project),
                tests: mc
                    .test
                    .iter()
                    .map(|(test_name, cc)| NamedCommand {
                        name: test_name.clone(),
                        cmd: cc.cmd.clone(),
                    })
                    .collect(),
                tasks: mc
                    .task
                    .iter()
                    .map(|(task_name, cc)| NamedCommand {
                        name: task_name.clone(),
                        cmd: cc.cmd.clone(),
                    })
                    .collect(),
            };
            modules.insert(name.clone(), descriptor);
        }

        let mut dependents: HashMap<DependencyPurpose, HashMap<String, Vec<String>>> =
            HashMap::new();

        for purpose in [DependencyPurpose::Build, DependencyPurpose::Runtime] {
            let map = dependents.entry(purpose).or_default();
            for module in modules.values() {
                for dep in module.deps_for(purpose) {
                    map.entry(dep.clone()).or_default().push(module.name.clone());
                }
            }
            for names in map.values_mut() {
                names.sort();
            }
        }

        debug!(
            root = ?root,
            modules = modules.len(),
            "dependency graph snapshot built"
        );

        Ok(Self {
            root,
            modules,
            dependents,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// "Give me module X."
    pub fn module(&self, name: &str) -> Result<&ModuleDescriptor> {
        self.modules
            .get(name)
            .ok_or_else(|| GantryError::UnknownModule(name.to_string()))
    }

    /// "Give me all modules", in stable name order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    /// List entities, optionally filtered by kind and by a glob over the
    /// qualified entity name.
    pub fn entities(
        &self,
        kind_filter: Option<EntityKind>,
        name_filter: Option<&str>,
    ) -> Result<Vec<EntityDescriptor>> {
        let matcher = match name_filter {
            Some(pattern) => Some(
                Glob::new(pattern)
                    .map_err(|err| GantryError::Config(format!("bad name filter: {err}")))?
                    .compile_matcher(),
            ),
            None => None,
        };

        let mut out = Vec::new();
        for module in self.modules.values() {
            let mut candidates = vec![EntityDescriptor {
                kind: EntityKind::Module,
                name: module.name.clone(),
                module: module.name.clone(),
            }];
            if module.is_service() {
                candidates.push(EntityDescriptor {
                    kind: EntityKind::Service,
                    name: module.name.clone(),
                    module: module.name.clone(),
                });
            }
            for test in &module.tests {
                candidates.push(EntityDescriptor {
                    kind: EntityKind::Test,
                    name: format!("{}.{}", module.name, test.name),
                    module: module.name.clone(),
                });
            }
            for task in &module.tasks {
                candidates.push(EntityDescriptor {
                    kind: EntityKind::Task,
                    name: format!("{}.{}", module.name, task.name),
                    module: module.name.clone(),
                });
            }

            out.extend(candidates.into_iter().filter(|entity| {
                kind_filter.is_none_or(|kind| entity.kind == kind)
                    && matcher
                        .as_ref()
                        .is_none_or(|matcher| matcher.is_match(&entity.name))
            }));
        }

        Ok(out)
    }

    /// "Give me everything that depends on `name` for `purpose`", direct or
    /// transitive. The changed module itself is not included. Results are in
    /// stable name order.
    pub fn dependents(
        &self,
        purpose: DependencyPurpose,
        name: &str,
        transitive: bool,
    ) -> Vec<&ModuleDescriptor> {
        let map = match self.dependents.get(&purpose) {
            Some(map) => map,
            None => return Vec::new(),
        };

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            for dependent in map.get(current).map(Vec::as_slice).unwrap_or(&[]) {
                if seen.insert(dependent.as_str()) && transitive {
                    queue.push_back(dependent.as_str());
                }
            }
        }

        seen.iter().filter_map(|name| self.modules.get(*name)).collect()
    }
}
