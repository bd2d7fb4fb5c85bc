// src/watch/watcher.rs

use std::path::PathBuf;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::watch::WatchEvent;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive
/// for as long as needed. Dropping this handle stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a filesystem watcher that observes `root` recursively and forwards
/// every changed path as [`WatchEvent::SourceChanged`] into `events_tx`.
///
/// The notify callback runs on its own thread; events are bridged into the
/// async world through an unbounded channel so the callback never blocks.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    events_tx: mpsc::Sender<WatchEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();
    // Canonicalize once so paths relativize cleanly against the graph root.
    let root = root.canonicalize().unwrap_or(root);

    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = raw_tx.send(event) {
                    // We can't log via tracing here easily, so fall back to stderr.
                    eprintln!("gantry: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("gantry: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = ?root, "file watcher started");

    tokio::spawn(async move {
        while let Some(event) = raw_rx.recv().await {
            debug!(?event, "received notify event");
            for path in event.paths {
                if events_tx
                    .send(WatchEvent::SourceChanged(path))
                    .await
                    .is_err()
                {
                    debug!("watch event channel closed; stopping forwarder");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
