//! Per-service AppRole credential provisioning with self-healing validation.
//!
//! ```text
//! Unknown ──load──► Absent ─────────────┐
//!            │                          ▼
//!            ├────► PresentInvalid ──► provision ──► Provisioned
//!            │
//!            └────► PresentValid (returned unchanged, no backend mutation)
//! ```
//!
//! An existing credential is rotated only after the backend definitively
//! rejects it. A transport failure during the validity probe is retried once
//! and then surfaces as `BackendUnreachable`, never as a rotation.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::backend::{RoleSpec, SecretBackend};
use super::error::SecretsError;
use super::store::BootstrapStore;
use super::types::{SecretString, ServiceCredential};
use crate::config::VaultSettings;
use crate::errors::{BootstrapError, Result, Stage};
use crate::transition::Transition;

/// Observed state of a service's stored credential before `ensure` acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Absent,
    PresentValid,
    PresentInvalid,
}

/// Result of [`CredentialProvisioner::ensure`].
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub credential: ServiceCredential,
    pub prior: CredentialStatus,
    pub transition: Transition,
}

enum Probe {
    Valid,
    Rejected,
}

pub struct CredentialProvisioner {
    backend: Arc<dyn SecretBackend>,
    store: BootstrapStore,
    kv_mount: String,
    path_prefix: String,
    token_ttl: String,
    token_max_ttl: String,
    probe_retry_delay: Duration,
    cancel: CancellationToken,
}

impl CredentialProvisioner {
    pub fn new(backend: Arc<dyn SecretBackend>, store: BootstrapStore, settings: &VaultSettings) -> Self {
        Self {
            backend,
            store,
            kv_mount: settings.kv_mount.clone(),
            path_prefix: settings.path_prefix.clone(),
            token_ttl: settings.token_ttl.clone(),
            token_max_ttl: settings.token_max_ttl.clone(),
            probe_retry_delay: settings.reachability_interval(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop issuing backend calls once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::cancelled(Stage::Credentials));
        }
        Ok(())
    }

    /// Override the pause before the single probe retry.
    pub fn with_probe_retry_delay(mut self, delay: Duration) -> Self {
        self.probe_retry_delay = delay;
        self
    }

    pub fn policy_name(service: &str) -> String {
        format!("{}-policy", service)
    }

    /// ACL granting a service read access to its own prefix.
    pub fn policy_document(&self, service: &str) -> String {
        format!(
            r#"path "{kv}/data/{prefix}/*" {{
  capabilities = ["read"]
}}

path "{kv}/metadata/{prefix}/*" {{
  capabilities = ["read", "list"]
}}

path "{kv}/data/{prefix}/services/{service}/*" {{
  capabilities = ["create", "read", "update", "delete"]
}}

path "auth/token/lookup-self" {{
  capabilities = ["read"]
}}
"#,
            kv = self.kv_mount,
            prefix = self.path_prefix,
            service = service
        )
    }

    fn role_spec(&self, service: &str) -> RoleSpec {
        RoleSpec {
            name: service.to_string(),
            policies: vec![Self::policy_name(service)],
            token_ttl: self.token_ttl.clone(),
            token_max_ttl: self.token_max_ttl.clone(),
            secret_id_ttl: "0".to_string(),
        }
    }

    /// Return a valid credential for `service`, provisioning one if needed.
    pub async fn ensure(&self, root_token: &SecretString, service: &str) -> Result<ProvisionOutcome> {
        self.checkpoint()?;
        let existing = self.store.load_credential(service)?;

        let prior = match &existing {
            None => CredentialStatus::Absent,
            Some(credential) => match self.probe(credential).await? {
                Probe::Valid => CredentialStatus::PresentValid,
                Probe::Rejected => CredentialStatus::PresentInvalid,
            },
        };

        if let (CredentialStatus::PresentValid, Some(credential)) = (prior, existing) {
            tracing::info!(service = %service, "Existing credential is valid");
            return Ok(ProvisionOutcome { credential, prior, transition: Transition::AlreadyDone });
        }

        tracing::info!(service = %service, prior = ?prior, "Provisioning credential");
        match self.provision(root_token, service).await {
            Ok(credential) => {
                self.store.save_credential(&credential)?;
                tracing::info!(service = %service, "Credential provisioned");
                Ok(ProvisionOutcome { credential, prior, transition: Transition::Performed })
            }
            Err(error) => {
                // A rejected credential must not survive to pass a later existence check
                if prior == CredentialStatus::PresentInvalid {
                    if let Err(e) = self.store.remove_credential(service) {
                        tracing::warn!(service = %service, error = %e, "Failed to remove rejected credential");
                    }
                }
                Err(error)
            }
        }
    }

    /// Check a credential with a test login. The returned token is discarded.
    async fn probe(&self, credential: &ServiceCredential) -> Result<Probe> {
        let mut attempt = 1;
        loop {
            match self.backend.approle_login(&credential.role_id, &credential.secret_id).await {
                Ok(_token) => return Ok(Probe::Valid),
                Err(SecretsError::AuthenticationFailed { message }) => {
                    tracing::warn!(
                        service = %credential.service_name,
                        reason = %message,
                        "Stored credential rejected by backend"
                    );
                    return Ok(Probe::Rejected);
                }
                Err(e) if e.is_transient() && attempt == 1 => {
                    tracing::debug!(service = %credential.service_name, error = %e, "Credential probe failed, retrying once");
                    attempt += 1;
                    tokio::time::sleep(self.probe_retry_delay).await;
                    self.checkpoint()?;
                }
                Err(e) if e.is_transient() => {
                    return Err(BootstrapError::BackendUnreachable {
                        address: self.backend.address().to_string(),
                        message: format!("credential check for '{}' failed twice: {}", credential.service_name, e),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn provision(&self, root_token: &SecretString, service: &str) -> Result<ServiceCredential> {
        let fail = |stage: &str, e: SecretsError| -> BootstrapError {
            match e {
                SecretsError::Unreachable { .. } => e.into(),
                other => BootstrapError::provisioning(service, format!("{}: {}", stage, other)),
            }
        };

        self.backend
            .upsert_policy(root_token, &Self::policy_name(service), &self.policy_document(service))
            .await
            .map_err(|e| fail("policy sync", e))?;
        self.checkpoint()?;
        self.backend
            .upsert_role(root_token, &self.role_spec(service))
            .await
            .map_err(|e| fail("role sync", e))?;
        self.checkpoint()?;

        let role_id =
            self.backend.read_role_id(root_token, service).await.map_err(|e| fail("role ID read", e))?;
        self.checkpoint()?;
        let secret_id = self
            .backend
            .generate_secret_id(root_token, service)
            .await
            .map_err(|e| fail("secret ID generation", e))?;
        self.checkpoint()?;

        let credential = ServiceCredential::new(service, role_id, secret_id);
        match self.probe(&credential).await? {
            Probe::Valid => Ok(credential),
            Probe::Rejected => Err(BootstrapError::provisioning(
                service,
                "newly generated credential was rejected by a test login",
            )),
        }
    }
}
