// src/watch/mod.rs

//! Watch mode: file-system events mapped to modules, and the loop that
//! serializes scheduler passes over the resulting task sets.

use std::path::PathBuf;

pub mod profile;
pub mod supervisor;
pub mod watcher;

pub use profile::{build_profiles, resolve_owner, ModuleWatchProfile};
pub use supervisor::{PassOutcome, PassReport, PassTrigger, WatchLoop, WatchLoopOptions};
pub use watcher::{spawn_watcher, WatcherHandle};

/// Events flowing into the watch loop.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A file under the project root changed.
    SourceChanged(PathBuf),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    Shutdown,
}
