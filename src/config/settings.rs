//! # Configuration Settings
//!
//! Defines the configuration structure for the bootstrap orchestrator. Every
//! field has a default so a bare environment produces a working local stack.

use crate::errors::{BootstrapError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix (`GOFR_NP_VAULT__URL`, ...).
pub const ENV_PREFIX: &str = "GOFR_NP";

/// Environment variable naming an optional TOML config file.
pub const ENV_CONFIG_FILE: &str = "GOFR_NP_CONFIG";

/// Main orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Compose project name; containers are named `<project>-<service>-1`
    #[validate(length(min = 1, message = "Project name cannot be empty"))]
    pub project_name: String,

    #[validate(nested)]
    pub vault: VaultSettings,

    #[validate(nested)]
    pub storage: StorageSettings,

    #[validate(nested)]
    pub distribution: DistributionSettings,

    #[validate(nested)]
    pub stack: StackSettings,

    #[validate(nested)]
    pub health: HealthSettings,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            project_name: "gofr-np".to_string(),
            vault: VaultSettings::default(),
            storage: StorageSettings::default(),
            distribution: DistributionSettings::default(),
            stack: StackSettings::default(),
            health: HealthSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl BootstrapConfig {
    /// Load configuration once at startup.
    ///
    /// Layers, lowest precedence first: built-in defaults, the optional TOML
    /// file (`path`, else `GOFR_NP_CONFIG`), then `GOFR_NP_*` environment
    /// variables using `__` between section and key.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from));

        let mut builder = config::Config::builder();
        if let Some(file) = &file {
            builder = builder.add_source(config::File::from(file.as_path()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("vault.credential_services")
                .with_list_parse_key("distribution.targets")
                .with_list_parse_key("distribution.target_dirs")
                .with_list_parse_key("stack.shared_volumes")
                .try_parsing(true),
        );

        let loaded: BootstrapConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(BootstrapError::from)?;
        self.validate_custom()
    }

    /// Cross-field rules the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        let ports = [self.stack.mcp_port, self.stack.mcpo_port, self.stack.web_port];
        for (i, port) in ports.iter().enumerate() {
            if ports[i + 1..].contains(port) {
                return Err(BootstrapError::config(format!(
                    "Service ports must be distinct (port {} is used twice)",
                    port
                )));
            }
        }

        if !self.vault.url.starts_with("http://") && !self.vault.url.starts_with("https://") {
            return Err(BootstrapError::config("Vault URL must start with 'http://' or 'https://'"));
        }

        if self.vault.key_threshold > self.vault.key_shares {
            return Err(BootstrapError::config("Unseal key threshold cannot exceed key shares"));
        }

        if self.vault.key_threshold != 1 {
            return Err(BootstrapError::config(
                "Only single-key unseal is supported (key_threshold must be 1)",
            ));
        }

        if self.distribution.targets.is_empty() && self.distribution.target_dirs.is_empty() {
            return Err(BootstrapError::config(
                "At least one distribution target (volume or directory) is required",
            ));
        }

        Ok(())
    }
}

/// Secret backend settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VaultSettings {
    /// Backend base URL as seen from the host running the bootstrap
    #[validate(length(min = 1, message = "Vault URL cannot be empty"))]
    pub url: String,

    /// Stack service that runs the backend
    #[validate(length(min = 1, message = "Vault service name cannot be empty"))]
    pub service_name: String,

    /// KV v2 mount path
    #[validate(length(min = 1, message = "KV mount cannot be empty"))]
    pub kv_mount: String,

    /// AppRole auth mount path
    #[validate(length(min = 1, message = "AppRole mount cannot be empty"))]
    pub approle_mount: String,

    /// Prefix under the KV mount that holds all project secrets
    #[validate(length(min = 1, message = "Path prefix cannot be empty"))]
    pub path_prefix: String,

    #[validate(range(min = 1, max = 10, message = "Key shares must be between 1 and 10"))]
    pub key_shares: u8,

    #[validate(range(min = 1, max = 10, message = "Key threshold must be between 1 and 10"))]
    pub key_threshold: u8,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 60, message = "Request timeout must be between 1 and 60 seconds"))]
    pub request_timeout_seconds: u64,

    /// Status polls before the backend is declared unreachable
    #[validate(range(min = 1, max = 600, message = "Reachability attempts must be between 1 and 600"))]
    pub reachability_attempts: u32,

    pub reachability_interval_ms: u64,

    /// Services that receive AppRole credentials
    #[validate(length(min = 1, message = "At least one credential service is required"))]
    pub credential_services: Vec<String>,

    pub token_ttl: String,

    pub token_max_ttl: String,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8201".to_string(),
            service_name: "vault".to_string(),
            kv_mount: "secret".to_string(),
            approle_mount: "approle".to_string(),
            path_prefix: "gofr".to_string(),
            key_shares: 1,
            key_threshold: 1,
            request_timeout_seconds: 5,
            reachability_attempts: 30,
            reachability_interval_ms: 1000,
            credential_services: vec!["gofr-np".to_string()],
            token_ttl: "1h".to_string(),
            token_max_ttl: "4h".to_string(),
        }
    }
}

impl VaultSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn reachability_interval(&self) -> Duration {
        Duration::from_millis(self.reachability_interval_ms)
    }

    /// KV path of the JWT signing secret
    pub fn jwt_secret_path(&self) -> String {
        format!("{}/config/jwt-signing-secret", self.path_prefix)
    }

    /// KV prefix of the auth token/group stores
    pub fn auth_prefix(&self) -> String {
        format!("{}/auth", self.path_prefix)
    }
}

/// Local bootstrap-only storage
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding unseal key, root token and service credentials.
    /// Never mounted into runtime containers.
    pub secrets_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { secrets_dir: PathBuf::from("./secrets") }
    }
}

/// Where runtime credentials are published
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DistributionSettings {
    /// Named container volumes
    pub targets: Vec<String>,

    /// Host directories
    pub target_dirs: Vec<PathBuf>,

    /// UID owning published files inside targets
    pub owner_uid: u32,

    /// GID owning published files inside targets
    pub owner_gid: u32,

    /// Image used to write into volumes
    #[validate(length(min = 1, message = "Helper image cannot be empty"))]
    pub helper_image: String,
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            targets: vec!["gofr-secrets".to_string()],
            target_dirs: vec![],
            owner_uid: 1000,
            owner_gid: 1000,
            helper_image: "alpine:3.20".to_string(),
        }
    }
}

/// Service stack settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StackSettings {
    /// Compose file describing the stack
    pub compose_file: PathBuf,

    /// Optional YAML stack definition; the built-in stack is used when unset
    pub stack_file: Option<PathBuf>,

    #[validate(length(min = 1, message = "Network name cannot be empty"))]
    pub network: String,

    /// Application image tag
    #[validate(length(min = 1, message = "Image tag cannot be empty"))]
    pub image_tag: String,

    pub dockerfile: PathBuf,

    pub build_context: PathBuf,

    pub force_rebuild: bool,

    /// Volumes shared across projects; created if absent, never purged
    pub shared_volumes: Vec<String>,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub mcp_port: u16,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub mcpo_port: u16,

    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub web_port: u16,

    /// Hard timeout for any single engine command, in seconds
    #[validate(range(min = 1, max = 3600, message = "Command timeout must be between 1 and 3600 seconds"))]
    pub command_timeout_seconds: u64,

    /// Upper bound for best-effort teardown, in seconds
    #[validate(range(min = 1, max = 600, message = "Teardown timeout must be between 1 and 600 seconds"))]
    pub teardown_timeout_seconds: u64,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            compose_file: PathBuf::from("docker/compose.yml"),
            stack_file: None,
            network: "gofr-net".to_string(),
            image_tag: "gofr-np-prod:latest".to_string(),
            dockerfile: PathBuf::from("docker/Dockerfile.prod"),
            build_context: PathBuf::from("."),
            force_rebuild: false,
            shared_volumes: vec!["gofr-secrets".to_string()],
            mcp_port: 8060,
            mcpo_port: 8061,
            web_port: 8062,
            command_timeout_seconds: 300,
            teardown_timeout_seconds: 60,
        }
    }
}

impl StackSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_seconds)
    }
}

/// Health polling budget
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    #[validate(range(min = 1, max = 1000, message = "Max attempts must be between 1 and 1000"))]
    pub max_attempts: u32,

    #[validate(range(min = 1, max = 300, message = "Poll interval must be between 1 and 300 seconds"))]
    pub interval_seconds: u64,

    /// Log lines captured per unhealthy service
    pub log_tail_lines: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self { max_attempts: 30, interval_seconds: 2, log_tail_lines: 50 }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}
