// tests/common/mod.rs

#![allow(dead_code)]

pub use gantry_test_utils::init_tracing;

use std::sync::Arc;

use gantry_test_utils::fake_provider::{ExecutionLog, RecordingProvider};

use gantry::provider::ProviderRegistry;

/// Wrap a scripted provider into a registry, keeping a handle on its log.
pub fn registry(provider: RecordingProvider) -> (ProviderRegistry, Arc<ExecutionLog>) {
    let log = provider.log();
    (ProviderRegistry::with_all(Arc::new(provider)), log)
}
