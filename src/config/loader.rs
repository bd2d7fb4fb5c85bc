// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::ProjectFile;
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a project file from disk, parse it and run semantic validation.
pub fn load_and_validate(path: &Path) -> Result<ProjectFile> {
    debug!(?path, "loading project configuration");

    let raw = fs::read_to_string(path)?;
    let cfg: ProjectFile = toml::from_str(&raw)?;

    validate_config(&cfg)?;

    debug!(
        project = %cfg.project.name,
        modules = cfg.module.len(),
        "project configuration loaded"
    );

    Ok(cfg)
}
