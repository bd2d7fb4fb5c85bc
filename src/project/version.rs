// src/project/version.rs

//! Content-addressed module versions.
//!
//! A module's version is a blake3 fingerprint over the contents of its
//! included source files plus the versions of its build dependencies, so a
//! change anywhere in the dependency chain shows up in every dependent's
//! version.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use blake3::Hasher;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use crate::errors::{GantryError, Result};
use crate::project::entity::ModuleDescriptor;
use crate::project::graph::DependencyGraph;

/// Computes and memoizes module versions for one resolution cycle.
///
/// The memo means every module tree is hashed at most once per cycle; the
/// task policies call [`VersionResolver::reset`] before deriving a new task
/// set so that the next pass observes on-disk content again.
#[derive(Debug)]
pub struct VersionResolver {
    root: PathBuf,
    memo: Mutex<HashMap<String, String>>,
}

impl VersionResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all memoized versions. Call between resolution cycles.
    pub fn reset(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.clear();
        } else {
            warn!("version memo mutex poisoned; versions may be stale");
        }
    }

    /// Content fingerprint of `name` and its resolved inputs.
    ///
    /// Dependency versions are folded in Merkle-style, so the recursion is
    /// bounded by the (validated, acyclic) build graph.
    pub fn module_version(&self, graph: &DependencyGraph, name: &str) -> Result<String> {
        if let Ok(memo) = self.memo.lock()
            && let Some(version) = memo.get(name)
        {
            return Ok(version.clone());
        }

        let module = graph.module(name)?;

        let mut dep_versions = Vec::with_capacity(module.build_deps.len());
        for dep in &module.build_deps {
            dep_versions.push(self.module_version(graph, dep)?);
        }

        let version = hash_module(&self.root, module, &dep_versions)?;
        debug!(module = %name, version = %version, "computed module version");

        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(name.to_string(), version.clone());
        }

        Ok(version)
    }
}

fn hash_module(
    root: &Path,
    module: &ModuleDescriptor,
    dep_versions: &[String],
) -> Result<String> {
    let include = build_globset(&module.include)?;
    let exclude = build_globset(&module.exclude)?;

    let module_dir = root.join(&module.path);
    let mut files = Vec::new();
    if module_dir.is_dir() {
        collect_files(&module_dir, &module_dir, include.as_ref(), exclude.as_ref(), &mut files)?;
    } else {
        debug!(module = %module.name, dir = ?module_dir, "module directory missing; hashing inputs only");
    }

    // Sort for a stable fingerprint independent of directory iteration order.
    files.sort();

    let mut hasher = Hasher::new();
    hasher.update(module.name.as_bytes());
    for version in dep_versions {
        hasher.update(version.as_bytes());
    }

    let mut buf = [0u8; 8192];
    for path in &files {
        let rel = path.strip_prefix(&module_dir).unwrap_or(path);
        hasher.update(rel.to_string_lossy().as_bytes());

        let mut file = File::open(path)
            .with_context(|| format!("opening file for hashing: {path:?}"))
            .map_err(GantryError::Other)?;
        loop {
            let n = file
                .read(&mut buf)
                .with_context(|| format!("reading file for hashing: {path:?}"))
                .map_err(GantryError::Other)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    let hex = hasher.finalize().to_hex().to_string();
    Ok(format!("v-{}", &hex[..16]))
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
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

fn collect_files(
    module_dir: &Path,
    dir: &Path,
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(module_dir).unwrap_or(&path);

        if exclude.is_some_and(|set| set.is_match(rel)) {
            continue;
        }

        if path.is_dir() {
            collect_files(module_dir, &path, include, exclude, out)?;
        } else if include.is_none_or(|set| set.is_match(rel)) {
            out.push(path);
        }
    }
    Ok(())
}
