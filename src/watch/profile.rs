// src/watch/profile.rs

//! Compiled per-module source patterns, used to map a changed path to the
//! module that owns it.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{GantryError, Result};
use crate::project::DependencyGraph;

/// Watch profile for a single module: its directory plus compiled
/// include/exclude globs (evaluated relative to the module directory).
#[derive(Clone)]
pub struct ModuleWatchProfile {
    name: String,
    /// Module directory relative to the project root.
    path: PathBuf,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for ModuleWatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleWatchProfile")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ModuleWatchProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this module owns the given path (relative to the
    /// project root).
    pub fn matches(&self, rel_path: &Path) -> bool {
        let within = match rel_path.strip_prefix(&self.path) {
            Ok(within) => within,
            Err(_) => return false,
        };
        if let Some(exclude) = &self.exclude
            && exclude.is_match(within)
        {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(within),
            None => true,
        }
    }

    /// Path depth used to break ties when nested module directories both
    /// match a path; the deeper module wins.
    fn depth(&self) -> usize {
        self.path.components().count()
    }
}

/// Compile a watch profile per module in the graph.
pub fn build_profiles(graph: &DependencyGraph) -> Result<Vec<ModuleWatchProfile>> {
    let mut profiles = Vec::new();
    for module in graph.modules() {
        profiles.push(ModuleWatchProfile {
            name: module.name.clone(),
            path: module.path.clone(),
            include: compile(&module.include)?,
            exclude: compile(&module.exclude)?,
        });
    }
    Ok(profiles)
}

/// Resolve the module owning `rel_path`, preferring the deepest matching
/// module directory.
pub fn resolve_owner<'p>(
    profiles: &'p [ModuleWatchProfile],
    rel_path: &Path,
) -> Option<&'p ModuleWatchProfile> {
    profiles
        .iter()
        .filter(|profile| profile.matches(rel_path))
        .max_by_key(|profile| profile.depth())
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|err| GantryError::Config(format!("bad glob '{pattern}': {err}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|err| GantryError::Config(format!("bad glob set: {err}")))?;
    Ok(Some(set))
}
