// src/errors.rs

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

use crate::task::TaskKind;

#[derive(Error, Debug)]
pub enum GantryError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("no provider registered for '{0}' tasks")]
    UnknownProvider(TaskKind),

    #[error("scheduler pass started with an empty root task set")]
    EmptyRoots,

    #[error("dependency cycle detected involving '{0}'")]
    Cycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GantryError>;
