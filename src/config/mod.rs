//! # Configuration Management
//!
//! Environment-derived configuration for the bootstrap orchestrator. Read once
//! at start; there is no hot reload.

pub mod settings;

pub use settings::{
    BootstrapConfig, DistributionSettings, HealthSettings, ObservabilityConfig, StackSettings,
    StorageSettings, VaultSettings, ENV_CONFIG_FILE, ENV_PREFIX,
};
