//! Port for the secret backend (a KV + AppRole capable, Vault-compatible API).
//!
//! The orchestrator and the credential provisioner depend only on
//! [`SecretBackend`]; [`super::vault::VaultHttpBackend`] is the production
//! implementation and the integration tests supply an in-memory one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{Result, SecretsError};
use super::types::{SecretString, UnsealMaterial};
use crate::transition::Transition;

/// A KV secret value: a flat JSON object.
pub type SecretValue = serde_json::Map<String, serde_json::Value>;

/// Observed initialization and seal state of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendState {
    pub initialized: bool,
    pub sealed: bool,
}

impl BackendState {
    /// KV and auth operations only succeed in this state.
    pub fn is_ready(&self) -> bool {
        self.initialized && !self.sealed
    }
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "initialized={} sealed={}", self.initialized, self.sealed)
    }
}

/// Kinds of mount the bootstrap enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// KV version 2 secrets engine.
    KvV2,
    /// AppRole auth method.
    AppRole,
}

impl std::fmt::Display for MountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountKind::KvV2 => write!(f, "kv-v2"),
            MountKind::AppRole => write!(f, "approle"),
        }
    }
}

/// AppRole role definition synced for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub policies: Vec<String>,
    pub token_ttl: String,
    pub token_max_ttl: String,
    /// "0" means secret IDs never expire.
    pub secret_id_ttl: String,
}

/// Thin API over the secret backend.
///
/// `status`, `initialize` and `unseal` are unauthenticated; every other call
/// takes the operator token explicitly so no ambient credential is held here.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Base address, used for diagnostics.
    fn address(&self) -> &str;

    /// Query initialization/seal state.
    ///
    /// Fails with [`SecretsError::Unreachable`] when the call does not complete;
    /// unreachable is never reported as sealed or unsealed.
    async fn status(&self) -> Result<BackendState>;

    /// One-time initialization. Fails with [`SecretsError::AlreadyInitialized`]
    /// when the backend is already initialized.
    async fn initialize(&self, shares: u8, threshold: u8) -> Result<UnsealMaterial>;

    /// Submit an unseal key. A no-op success when already unsealed.
    async fn unseal(&self, key: &SecretString) -> Result<Transition>;

    /// Enable a mount at `path`. "Already enabled" is a no-op success.
    async fn ensure_mount(&self, token: &SecretString, kind: MountKind, path: &str)
        -> Result<Transition>;

    /// Read a KV secret. `Ok(None)` when absent.
    async fn read_secret(&self, token: &SecretString, path: &str) -> Result<Option<SecretValue>>;

    /// Unconditionally write a KV secret.
    async fn write_secret(&self, token: &SecretString, path: &str, value: &SecretValue)
        -> Result<()>;

    /// Create or replace an ACL policy.
    async fn upsert_policy(&self, token: &SecretString, name: &str, policy: &str) -> Result<()>;

    /// Create or replace an AppRole role.
    async fn upsert_role(&self, token: &SecretString, role: &RoleSpec) -> Result<()>;

    /// Read the (stable) role ID of a role.
    async fn read_role_id(&self, token: &SecretString, role: &str) -> Result<String>;

    /// Generate a fresh secret ID for a role.
    async fn generate_secret_id(&self, token: &SecretString, role: &str) -> Result<SecretString>;

    /// AppRole login, used as a validity probe. Rejected credentials yield
    /// [`SecretsError::AuthenticationFailed`].
    async fn approle_login(&self, role_id: &str, secret_id: &SecretString) -> Result<SecretString>;
}

/// Poll [`SecretBackend::status`] until the backend answers.
///
/// Only transport failures are retried; any other error is returned at once.
pub async fn wait_until_reachable(
    backend: &dyn SecretBackend,
    attempts: u32,
    interval: Duration,
) -> Result<BackendState> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match backend.status().await {
            Ok(state) => {
                tracing::debug!(attempt, %state, "Secret backend reachable");
                return Ok(state);
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(attempt, attempts, error = %e, "Secret backend not reachable yet");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        SecretsError::unreachable(backend.address(), "no status attempt completed")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_state_readiness() {
        assert!(BackendState { initialized: true, sealed: false }.is_ready());
        assert!(!BackendState { initialized: true, sealed: true }.is_ready());
        assert!(!BackendState { initialized: false, sealed: true }.is_ready());
    }

    #[test]
    fn test_backend_state_display() {
        let state = BackendState { initialized: true, sealed: true };
        assert_eq!(state.to_string(), "initialized=true sealed=true");
    }
}
