//! Mounts and bootstrap constants the stack expects to find in the backend.
//!
//! Everything here is write-only-if-absent: an existing signing secret or
//! group record is never overwritten, so re-running the bootstrap does not
//! invalidate tokens already issued. No further backend call is issued once
//! the cancellation token fires.

use rand::RngCore;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::VaultSettings;
use crate::errors::{BootstrapError, Result, Stage};
use crate::secrets::{MountKind, SecretBackend, SecretString, SecretValue};
use crate::transition::Transition;

/// Groups every deployment must have.
pub const RESERVED_GROUPS: [(&str, &str); 2] = [
    ("admin", "Full administrative access"),
    ("public", "Unauthenticated-equivalent access to public tools"),
];

/// 256-bit signing secret as 64 lowercase hex characters.
pub fn generate_signing_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn group_path(settings: &VaultSettings, group: &str) -> String {
    format!("{}/groups/{}", settings.auth_prefix(), group)
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BootstrapError::cancelled(Stage::MountsAndBaseSecrets));
    }
    Ok(())
}

async fn write_if_absent(
    backend: &dyn SecretBackend,
    token: &SecretString,
    path: &str,
    cancel: &CancellationToken,
    value: impl FnOnce() -> SecretValue,
) -> Result<Transition> {
    checkpoint(cancel)?;
    if backend.read_secret(token, path).await?.is_some() {
        return Ok(Transition::AlreadyDone);
    }
    checkpoint(cancel)?;
    backend.write_secret(token, path, &value()).await?;
    tracing::info!(path = %path, "Bootstrap secret created");
    Ok(Transition::Performed)
}

pub async fn ensure_mounts_and_base_secrets(
    backend: &dyn SecretBackend,
    token: &SecretString,
    settings: &VaultSettings,
    cancel: &CancellationToken,
) -> Result<Transition> {
    checkpoint(cancel)?;
    let mut outcome = backend.ensure_mount(token, MountKind::KvV2, &settings.kv_mount).await?;
    checkpoint(cancel)?;
    outcome = outcome.and(backend.ensure_mount(token, MountKind::AppRole, &settings.approle_mount).await?);

    outcome = outcome.and(
        write_if_absent(backend, token, &settings.jwt_secret_path(), cancel, || {
            let mut value = SecretValue::new();
            value.insert("value".to_string(), json!(generate_signing_secret()));
            value
        })
        .await?,
    );

    for (name, description) in RESERVED_GROUPS {
        outcome = outcome.and(
            write_if_absent(backend, token, &group_path(settings, name), cancel, || {
                let mut value = SecretValue::new();
                value.insert("name".to_string(), json!(name));
                value.insert("description".to_string(), json!(description));
                value.insert("is_reserved".to_string(), json!(true));
                value.insert("created_at".to_string(), json!(chrono::Utc::now().to_rfc3339()));
                value
            })
            .await?,
        );
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_secret_shape() {
        let secret = generate_signing_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(secret, generate_signing_secret());
    }

    #[test]
    fn test_group_path() {
        let settings = VaultSettings::default();
        assert_eq!(group_path(&settings, "admin"), "gofr/auth/groups/admin");
    }
}
