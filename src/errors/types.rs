//! # Error Types
//!
//! Error taxonomy for the bootstrap orchestrator using `thiserror`.

use std::path::PathBuf;

use crate::secrets::SecretsError;
use crate::stack::{RuntimeError, TimeoutReport};

/// Custom result type for bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// One distribution target that could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub message: String,
}

/// Main error type for the bootstrap orchestrator
#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    /// Backend did not answer within its retry budget
    #[error("Secret backend unreachable at {address}: {message}")]
    BackendUnreachable { address: String, message: String },

    /// Initialization attempted on an initialized backend
    #[error("Secret backend is already initialized")]
    AlreadyInitialized,

    /// Backend is sealed and no local unseal key exists
    #[error("Secret backend is sealed and no unseal key exists at {}", path.display())]
    MissingUnsealMaterial { path: PathBuf },

    /// Credentials rejected by the backend
    #[error("Credentials for service '{service}' were rejected")]
    InvalidCredentials { service: String },

    /// Policy/role sync or secret ID generation failed
    #[error("Provisioning failed for service '{service}': {reason}")]
    ProvisioningFailed { service: String, reason: String },

    /// At least one distribution target failed
    #[error(
        "Distribution failed for {} target(s): {}",
        failed.len(),
        failed.iter().map(|f| format!("{} ({})", f.target, f.message)).collect::<Vec<_>>().join(", ")
    )]
    DistributionPartialFailure { succeeded: Vec<String>, failed: Vec<TargetFailure> },

    /// A service failed to start
    #[error("Service '{service}' failed to start (health: {health})")]
    StackStartFailed { service: String, health: String, logs: String },

    /// Services did not become healthy within the poll budget
    #[error("Stack unhealthy: {}", .0.summary())]
    StackUnhealthy(Box<TimeoutReport>),

    /// A required tool or engine is not available
    #[error("Prerequisite missing: {what}")]
    PrerequisiteMissing { what: String, remedy: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other secret backend failure
    #[error("Secret backend error: {0}")]
    Backend(#[source] SecretsError),

    /// Any other container engine failure
    #[error("Container runtime error: {0}")]
    Runtime(#[source] RuntimeError),

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// External cancellation was observed
    #[error("Cancelled at stage '{stage}'")]
    Cancelled { stage: String },

    /// Timeout errors
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
}

impl BootstrapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a prerequisite error with an actionable remedy
    pub fn prerequisite<W: Into<String>, R: Into<String>>(what: W, remedy: R) -> Self {
        Self::PrerequisiteMissing { what: what.into(), remedy: remedy.into() }
    }

    /// Create a provisioning error
    pub fn provisioning<S: Into<String>, R: Into<String>>(service: S, reason: R) -> Self {
        Self::ProvisioningFailed { service: service.into(), reason: reason.into() }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Cancellation observed while `stage` was running
    pub fn cancelled<S: std::fmt::Display>(stage: S) -> Self {
        Self::Cancelled { stage: stage.to_string() }
    }

    /// One-line remedy shown to the operator
    pub fn remedy(&self) -> String {
        match self {
            BootstrapError::BackendUnreachable { address, .. } => format!(
                "Check that the vault container is running and {} is reachable from this host",
                address
            ),
            BootstrapError::AlreadyInitialized => {
                "Do not re-initialize; unseal with the persisted key instead".to_string()
            }
            BootstrapError::MissingUnsealMaterial { path } => format!(
                "Restore the unseal key to {} or recreate the vault data volume deliberately",
                path.display()
            ),
            BootstrapError::InvalidCredentials { service } => format!(
                "Re-run bootstrap to rotate credentials for '{}'",
                service
            ),
            BootstrapError::ProvisioningFailed { .. } => {
                "Check root token validity and the AppRole mount, then re-run bootstrap".to_string()
            }
            BootstrapError::DistributionPartialFailure { .. } => {
                "Check that the failed volumes exist and the helper image can be pulled".to_string()
            }
            BootstrapError::StackStartFailed { service, .. } => {
                format!("Inspect the logs of '{}' above and fix its configuration", service)
            }
            BootstrapError::StackUnhealthy(_) => {
                "Inspect the captured logs of the unhealthy services above".to_string()
            }
            BootstrapError::PrerequisiteMissing { remedy, .. } => remedy.clone(),
            BootstrapError::Config { .. } => {
                "Fix the GOFR_NP_* environment or the config file and retry".to_string()
            }
            BootstrapError::Backend(_) => {
                "Check the vault container logs for the rejected request".to_string()
            }
            BootstrapError::Runtime(_) => {
                "Check that the docker engine is healthy and the compose file is valid".to_string()
            }
            BootstrapError::Io { .. } => {
                "Check permissions on the secrets directory and distribution targets".to_string()
            }
            BootstrapError::Serialization { .. } => {
                "A stored credential file is corrupt; remove it and re-run bootstrap".to_string()
            }
            BootstrapError::Cancelled { .. } => "Re-run bootstrap when ready".to_string(),
            BootstrapError::Timeout { operation, .. } => {
                format!("Increase the timeout for '{}' or check engine load", operation)
            }
        }
    }

    /// Process exit code for the top-level command
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::PrerequisiteMissing { .. } => 2,
            BootstrapError::MissingUnsealMaterial { .. } => 3,
            BootstrapError::ProvisioningFailed { .. } => 4,
            BootstrapError::StackUnhealthy(_) => 5,
            BootstrapError::DistributionPartialFailure { .. } => 6,
            BootstrapError::Cancelled { .. } => 130,
            _ => 1,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BootstrapError::BackendUnreachable { .. } | BootstrapError::Timeout { .. }
        )
    }
}

impl From<SecretsError> for BootstrapError {
    fn from(error: SecretsError) -> Self {
        match error {
            SecretsError::Unreachable { address, message } => {
                Self::BackendUnreachable { address, message }
            }
            SecretsError::AlreadyInitialized => Self::AlreadyInitialized,
            SecretsError::IoError(source) => {
                Self::Io { source, context: "Local secret store operation failed".to_string() }
            }
            SecretsError::SerializationError(source) => Self::Serialization {
                source,
                context: "Secret payload could not be parsed".to_string(),
            },
            other => Self::Backend(other),
        }
    }
}

impl From<RuntimeError> for BootstrapError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::Timeout { command, duration_ms } => {
                Self::Timeout { operation: command, duration_ms }
            }
            other => Self::Runtime(other),
        }
    }
}

impl From<std::io::Error> for BootstrapError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for BootstrapError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for BootstrapError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        // Nested section errors are not in field_errors(); fall back to Display
        if message.is_empty() {
            Self::config(format!("Validation failed: {}", errors))
        } else {
            Self::config(format!("Validation failed: {}", message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = BootstrapError::config("bad port");
        assert!(matches!(error, BootstrapError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: bad port");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BootstrapError::prerequisite("docker", "install docker").exit_code(), 2);
        assert_eq!(
            BootstrapError::MissingUnsealMaterial { path: PathBuf::from("/s/vault_unseal_key") }
                .exit_code(),
            3
        );
        assert_eq!(BootstrapError::provisioning("gofr-np", "boom").exit_code(), 4);
        assert_eq!(
            BootstrapError::StackUnhealthy(Box::new(TimeoutReport::default())).exit_code(),
            5
        );
        assert_eq!(BootstrapError::config("x").exit_code(), 1);
    }

    #[test]
    fn test_prerequisite_remedy_is_passed_through() {
        let error = BootstrapError::prerequisite("docker CLI", "Install Docker: https://docs.docker.com/get-docker/");
        assert_eq!(error.remedy(), "Install Docker: https://docs.docker.com/get-docker/");
    }

    #[test]
    fn test_secrets_error_conversion() {
        let error: BootstrapError = SecretsError::unreachable("http://vault:8200", "refused").into();
        assert!(matches!(error, BootstrapError::BackendUnreachable { .. }));
        assert!(error.is_retryable());

        let error: BootstrapError = SecretsError::AlreadyInitialized.into();
        assert!(matches!(error, BootstrapError::AlreadyInitialized));
        assert!(!error.is_retryable());

        let error: BootstrapError = SecretsError::backend_error(400, "permission denied").into();
        assert!(matches!(error, BootstrapError::Backend(_)));
    }

    #[test]
    fn test_distribution_failure_display_lists_targets() {
        let error = BootstrapError::DistributionPartialFailure {
            succeeded: vec!["gofr-secrets".to_string()],
            failed: vec![TargetFailure {
                target: "gofr-secrets-training".to_string(),
                message: "no such volume".to_string(),
            }],
        };
        let text = error.to_string();
        assert!(text.contains("1 target(s)"));
        assert!(text.contains("gofr-secrets-training (no such volume)"));
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: BootstrapError = io_error.into();
        assert!(matches!(error, BootstrapError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: BootstrapError = json_error.into();
        assert!(matches!(error, BootstrapError::Serialization { .. }));
    }
}
