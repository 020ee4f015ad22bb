//! # Structured Logging
//!
//! Subscriber setup and span helpers for the bootstrap pipeline.
//!
//! `RUST_LOG` always wins over the configured level. JSON output is meant for
//! CI logs; the human-readable formatter is the default.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{BootstrapConfig, ObservabilityConfig};

/// Create a tracing span for one orchestrator stage.
///
/// ```rust,ignore
/// let _guard = stage_span!(Stage::Unseal).entered();
/// let span = stage_span!(Stage::Credentials, service = "gofr-np");
/// ```
#[macro_export]
macro_rules! stage_span {
    ($stage:expr) => {
        tracing::info_span!("bootstrap_stage", stage = %$stage)
    };
    ($stage:expr, $($field:tt)*) => {
        tracing::info_span!("bootstrap_stage", stage = %$stage, $($field)*)
    };
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. `verbose` raises the default level to debug.
///
/// Returns `false` when a subscriber was already installed (e.g. by a test
/// harness); that is not an error.
pub fn init_logging(config: &ObservabilityConfig, verbose: bool) -> bool {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    let builder = fmt().with_env_filter(env_filter(level)).with_target(false);

    let result = if config.json_logging {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.is_ok()
}

/// Log the effective configuration at startup. Never includes secret values.
pub fn log_config_info(config: &BootstrapConfig) {
    tracing::info!(
        project = %config.project_name,
        vault_url = %config.vault.url,
        secrets_dir = %config.storage.secrets_dir.display(),
        targets = ?config.distribution.targets,
        network = %config.stack.network,
        image = %config.stack.image_tag,
        "gofr bootstrap configuration"
    );
}
