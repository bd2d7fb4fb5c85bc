// src/provider/cache.rs

//! In-memory content-addressed result cache.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tracing::warn;

use crate::task::BaseKey;

#[derive(Debug, Clone)]
struct CacheEntry {
    version: String,
    payload: Value,
}

/// Records the last successful output per base key, keyed by version.
///
/// Read-many / write-once per version: recording the same version again is
/// a no-op, so concurrent producers of one version collapse to the first
/// writer. De-duplication within a pass is the scheduler's job; this cache
/// only carries outputs *across* passes.
#[derive(Debug, Default)]
pub struct VersionCache {
    entries: Mutex<HashMap<BaseKey, CacheEntry>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded payload for `key`, if its version matches.
    pub fn lookup(&self, key: &str, version: &str) -> Option<Value> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_poisoned) => {
                warn!(key, "version cache mutex poisoned; treating as miss");
                return None;
            }
        };
        entries
            .get(key)
            .filter(|entry| entry.version == version)
            .map(|entry| entry.payload.clone())
    }

    pub fn record(&self, key: &str, version: &str, payload: &Value) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_poisoned) => {
                warn!(key, "version cache mutex poisoned; dropping record");
                return;
            }
        };
        if let Some(existing) = entries.get(key)
            && existing.version == version
        {
            return;
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                version: version.to_string(),
                payload: payload.clone(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
