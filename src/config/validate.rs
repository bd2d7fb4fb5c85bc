// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ModuleConfig, ProjectFile};
use crate::errors::{GantryError, Result};

/// Run basic semantic validation against a loaded project file.
///
/// This checks:
/// - there is at least one module
/// - all `deps` / `runtime_deps` references point at existing modules
/// - no module depends on itself
/// - both the build graph and the runtime graph are acyclic
pub fn validate_config(cfg: &ProjectFile) -> Result<()> {
    ensure_has_modules(cfg)?;
    validate_dep_refs(cfg)?;
    validate_dag(cfg, |module| &module.deps, "build")?;
    validate_dag(cfg, |module| &module.runtime_deps, "runtime")?;
    Ok(())
}

fn ensure_has_modules(cfg: &ProjectFile) -> Result<()> {
    if cfg.module.is_empty() {
        return Err(GantryError::Config(
            "project must contain at least one [module.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_dep_refs(cfg: &ProjectFile) -> Result<()> {
    for (name, module) in cfg.module.iter() {
        for dep in module.deps.iter().chain(module.runtime_deps.iter()) {
            if !cfg.module.contains_key(dep) {
                return Err(GantryError::Config(format!(
                    "module '{name}' has unknown dependency '{dep}'"
                )));
            }
            if dep == name {
                return Err(GantryError::Config(format!(
                    "module '{name}' cannot depend on itself"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag<F>(cfg: &ProjectFile, deps_of: F, purpose: &str) -> Result<()>
where
    F: Fn(&ModuleConfig) -> &Vec<String>,
{
    // Edge direction: dep -> module. A topological sort fails iff there is
    // a cycle.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.module.keys() {
        graph.add_node(name.as_str());
    }

    for (name, module) in cfg.module.iter() {
        for dep in deps_of(module) {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(GantryError::Cycle(format!(
            "{purpose} dependencies of module '{}'",
            cycle.node_id()
        ))),
    }
}
