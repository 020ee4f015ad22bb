//! Common test utilities for all integration tests.
//!
//! In-memory implementations of the two ports plus a config builder that
//! points every path at a temporary directory.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod fake_backend;
pub mod fake_runtime;

use std::path::Path;
use std::sync::Arc;

use gofr_bootstrap::bootstrap::{BootstrapContext, BootstrapOrchestrator};
use gofr_bootstrap::config::BootstrapConfig;
use tokio_util::sync::CancellationToken;

pub use fake_backend::FakeSecretBackend;
pub use fake_runtime::FakeRuntime;

/// Default config rooted at `dir`: local store, compose file present, fast
/// polling, and the default shared volume as the only distribution target.
pub fn test_config(dir: &Path) -> BootstrapConfig {
    let compose_file = dir.join("compose.yml");
    std::fs::write(&compose_file, "services: {}\n").expect("write compose file");

    let mut config = BootstrapConfig::default();
    config.storage.secrets_dir = dir.join("secrets");
    config.stack.compose_file = compose_file;
    config.vault.reachability_attempts = 3;
    config.vault.reachability_interval_ms = 0;
    config.health.max_attempts = 3;
    config.health.interval_seconds = 0;
    config.stack.teardown_timeout_seconds = 5;
    config
}

pub fn context(config: BootstrapConfig) -> BootstrapContext {
    BootstrapContext::new(config).expect("default stack resolves")
}

pub struct Harness {
    pub backend: Arc<FakeSecretBackend>,
    pub runtime: Arc<FakeRuntime>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new(backend: FakeSecretBackend) -> Self {
        Self { backend: Arc::new(backend), runtime: Arc::new(FakeRuntime::new()), cancel: CancellationToken::new() }
    }

    pub fn orchestrator(&self, ctx: &BootstrapContext) -> BootstrapOrchestrator {
        BootstrapOrchestrator::new(ctx, self.backend.clone(), self.runtime.clone(), self.cancel.clone())
    }
}
