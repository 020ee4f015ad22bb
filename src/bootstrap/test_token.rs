//! Long-lived bearer tokens for local and CI test harnesses.
//!
//! The token is an HS256 JWT signed with the stack's signing secret. Its
//! metadata is recorded in the backend token store so the services accept it,
//! and the JWT itself is written to an env file as `GOFR_NP_TEST_TOKEN=<jwt>`.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::base_secrets::group_path;
use crate::config::VaultSettings;
use crate::errors::{BootstrapError, Result};
use crate::secrets::{SecretBackend, SecretString, SecretValue, SecretsError};

pub const DEFAULT_AUDIENCE: &str = "gofr-api";
pub const TOKEN_ENV_VAR: &str = "GOFR_NP_TEST_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub jti: String,
    pub sub: String,
    pub aud: String,
    pub groups: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct TestTokenRequest {
    pub name: String,
    pub groups: Vec<String>,
    pub audience: String,
    pub expires_in: Duration,
    pub env_file: PathBuf,
}

impl TestTokenRequest {
    pub fn new(env_file: impl Into<PathBuf>) -> Self {
        Self {
            name: "gofr-np-test".to_string(),
            groups: vec!["public".to_string()],
            audience: DEFAULT_AUDIENCE.to_string(),
            expires_in: Duration::days(3650),
            env_file: env_file.into(),
        }
    }
}

#[derive(Debug)]
pub struct MintedToken {
    pub jti: String,
    pub token: SecretString,
    pub claims: TokenClaims,
    pub env_file: PathBuf,
}

fn signing_key(value: &SecretValue, path: &str) -> Result<SecretString> {
    value
        .get("value")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(SecretString::new)
        .ok_or_else(|| BootstrapError::config(format!("Signing secret at '{}' has no 'value' field", path)))
}

/// Mint a token, record it in the token store, and write the env file.
pub async fn mint_test_token(
    backend: &dyn SecretBackend,
    root_token: &SecretString,
    settings: &VaultSettings,
    request: &TestTokenRequest,
) -> Result<MintedToken> {
    if request.groups.is_empty() {
        return Err(BootstrapError::config("A test token needs at least one group"));
    }

    let secret_path = settings.jwt_secret_path();
    let secret_value = backend
        .read_secret(root_token, &secret_path)
        .await?
        .ok_or_else(|| BootstrapError::from(SecretsError::not_found(&secret_path)))?;
    let key = signing_key(&secret_value, &secret_path)?;

    for group in &request.groups {
        if backend.read_secret(root_token, &group_path(settings, group)).await?.is_none() {
            return Err(BootstrapError::config(format!("Unknown group '{}'", group)));
        }
    }

    let now = Utc::now();
    let expires_at = now + request.expires_in;
    let jti = Uuid::new_v4().to_string();
    let claims = TokenClaims {
        jti: jti.clone(),
        sub: request.name.clone(),
        aud: request.audience.clone(),
        groups: request.groups.clone(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let jwt = encode(&Header::default(), &claims, &EncodingKey::from_secret(key.expose_secret().as_bytes()))
        .map_err(|e| BootstrapError::config(format!("Failed to sign test token: {}", e)))?;

    let mut record = SecretValue::new();
    record.insert("id".to_string(), json!(jti));
    record.insert("name".to_string(), json!(request.name));
    record.insert("groups".to_string(), json!(request.groups));
    record.insert("created_at".to_string(), json!(now.to_rfc3339()));
    record.insert("expires_at".to_string(), json!(expires_at.to_rfc3339()));
    record.insert("revoked".to_string(), json!(false));
    backend
        .write_secret(root_token, &format!("{}/tokens/{}", settings.auth_prefix(), jti), &record)
        .await?;

    write_env_file(&request.env_file, &jwt)?;
    tracing::info!(jti = %jti, groups = ?request.groups, out = %request.env_file.display(), "Wrote test token env file");

    Ok(MintedToken { jti, token: SecretString::new(jwt), claims, env_file: request.env_file.clone() })
}

fn write_env_file(path: &Path, jwt: &str) -> Result<()> {
    let line = format!("{}={}\n", TOKEN_ENV_VAR, jwt);
    crate::secrets::store::write_atomic(path, line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn test_signing_key_requires_value() {
        let mut value = SecretValue::new();
        assert!(signing_key(&value, "p").is_err());
        value.insert("value".to_string(), json!("abc"));
        assert_eq!(signing_key(&value, "p").unwrap().expose_secret(), "abc");
    }

    #[test]
    fn test_claims_verify_with_audience() {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            jti: "id".to_string(),
            sub: "gofr-np-test".to_string(),
            aud: DEFAULT_AUDIENCE.to_string(),
            groups: vec!["public".to_string()],
            iat: now,
            exp: now + 60,
        };
        let jwt = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap();

        let mut validation = Validation::default();
        validation.set_audience(&[DEFAULT_AUDIENCE]);
        let decoded = decode::<TokenClaims>(&jwt, &DecodingKey::from_secret(b"k"), &validation).unwrap();
        assert_eq!(decoded.claims, claims);
    }
}
