//! HashiCorp Vault implementation of [`SecretBackend`] over the HTTP API.
//!
//! Talks to the `sys/`, KV v2 and AppRole endpoints directly with `reqwest`
//! so every response status can be classified precisely:
//!
//! - transport failures and client timeouts become [`SecretsError::Unreachable`]
//! - `503` becomes [`SecretsError::Sealed`]
//! - "already initialized" / "path is already in use" are idempotent outcomes
//! - login rejections become [`SecretsError::AuthenticationFailed`]
//!
//! # Example
//!
//! ```rust,ignore
//! use gofr_bootstrap::secrets::{SecretBackend, VaultHttpBackend};
//!
//! let vault = VaultHttpBackend::new(&config.vault)?;
//! let state = vault.status().await?;
//! if !state.initialized {
//!     let material = vault.initialize(1, 1).await?;
//!     store.save_unseal_material(&material)?;
//! }
//! ```

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::backend::{BackendState, MountKind, RoleSpec, SecretBackend, SecretValue};
use super::error::{Result, SecretsError};
use super::types::{SecretString, UnsealMaterial};
use crate::config::VaultSettings;
use crate::transition::Transition;

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct SealStatusResponse {
    initialized: bool,
    sealed: bool,
}

#[derive(Deserialize)]
struct InitResponse {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    keys_base64: Vec<String>,
    root_token: String,
}

#[derive(Debug, Deserialize)]
struct UnsealResponse {
    sealed: bool,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct KvData {
    data: Option<SecretValue>,
}

#[derive(Deserialize)]
struct RoleIdData {
    role_id: String,
}

#[derive(Deserialize)]
struct SecretIdData {
    secret_id: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Vault client bound to one server address and one pair of mounts.
pub struct VaultHttpBackend {
    client: reqwest::Client,
    address: String,
    kv_mount: String,
    approle_mount: String,
}

impl VaultHttpBackend {
    /// Build a client from the vault settings section.
    pub fn new(settings: &VaultSettings) -> Result<Self> {
        Self::with_mounts(
            &settings.url,
            &settings.kv_mount,
            &settings.approle_mount,
            settings.request_timeout(),
        )
    }

    pub fn with_mounts(
        address: &str,
        kv_mount: &str,
        approle_mount: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if address.is_empty() {
            return Err(SecretsError::internal("Vault address cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SecretsError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            address: address.trim_end_matches('/').to_string(),
            kv_mount: kv_mount.trim_matches('/').to_string(),
            approle_mount: approle_mount.trim_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, token: Option<&SecretString>) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.address, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match token {
            Some(token) => builder.header(TOKEN_HEADER, token.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() || e.is_request() {
                SecretsError::unreachable(&self.address, e.to_string())
            } else {
                SecretsError::internal(format!("Vault request failed: {}", e))
            }
        })
    }

    /// Send and map any non-success status to an error.
    async fn send_ok(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self.send(builder).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                SecretsError::unreachable(&self.address, e.to_string())
            } else {
                SecretsError::internal(format!("Failed to read Vault response: {}", e))
            }
        })?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn kv_data_path(&self, path: &str) -> Result<String> {
        validate_relative(path)?;
        Ok(format!("{}/data/{}", self.kv_mount, path.trim_matches('/')))
    }

    fn role_path(&self, role: &str) -> Result<String> {
        validate_relative(role)?;
        Ok(format!("auth/{}/role/{}", self.approle_mount, role))
    }
}

async fn error_from_response(response: Response) -> SecretsError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .filter(|e| !e.errors.is_empty())
        .map(|e| e.errors.join("; "))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.trim().to_string()
            }
        });

    match status {
        StatusCode::SERVICE_UNAVAILABLE => SecretsError::Sealed,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            SecretsError::authentication_failed(message)
        }
        _ => SecretsError::backend_error(status.as_u16(), message),
    }
}

fn validate_relative(path: &str) -> Result<()> {
    if path.trim_matches('/').is_empty() {
        return Err(SecretsError::invalid_path(path, "path is empty"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(SecretsError::invalid_path(path, "path traversal is not allowed"));
    }
    Ok(())
}

fn is_already_in_use(error: &SecretsError) -> bool {
    matches!(
        error,
        SecretsError::BackendError { status: 400, message } if message.contains("already in use")
    )
}

#[async_trait]
impl SecretBackend for VaultHttpBackend {
    fn address(&self) -> &str {
        &self.address
    }

    async fn status(&self) -> Result<BackendState> {
        let response = self.send_ok(self.request(Method::GET, "sys/seal-status", None)).await?;
        let status: SealStatusResponse = self.decode(response).await?;
        Ok(BackendState { initialized: status.initialized, sealed: status.sealed })
    }

    async fn initialize(&self, shares: u8, threshold: u8) -> Result<UnsealMaterial> {
        let body = json!({ "secret_shares": shares, "secret_threshold": threshold });
        let result = self.send_ok(self.request(Method::PUT, "sys/init", None).json(&body)).await;

        let response = match result {
            Ok(response) => response,
            Err(SecretsError::BackendError { status: 400, message })
                if message.contains("already initialized") =>
            {
                return Err(SecretsError::AlreadyInitialized);
            }
            Err(e) => return Err(e),
        };

        let init: InitResponse = self.decode(response).await?;
        let unseal_key = init
            .keys_base64
            .first()
            .or_else(|| init.keys.first())
            .cloned()
            .ok_or_else(|| SecretsError::internal("Vault init returned no unseal keys"))?;

        tracing::info!(address = %self.address, shares, threshold, "Vault initialized");
        Ok(UnsealMaterial {
            unseal_key: SecretString::new(unseal_key),
            root_token: SecretString::new(init.root_token),
        })
    }

    async fn unseal(&self, key: &SecretString) -> Result<Transition> {
        let state = self.status().await?;
        if !state.sealed {
            return Ok(Transition::AlreadyDone);
        }

        let body = json!({ "key": key.expose_secret() });
        let response = self.send_ok(self.request(Method::PUT, "sys/unseal", None).json(&body)).await?;
        let result: UnsealResponse = self.decode(response).await?;

        if result.sealed {
            // Key accepted but threshold not reached
            return Err(SecretsError::Sealed);
        }
        tracing::info!(address = %self.address, "Vault unsealed");
        Ok(Transition::Performed)
    }

    async fn ensure_mount(
        &self,
        token: &SecretString,
        kind: MountKind,
        path: &str,
    ) -> Result<Transition> {
        validate_relative(path)?;
        let path = path.trim_matches('/');
        let (endpoint, body) = match kind {
            MountKind::KvV2 => {
                (format!("sys/mounts/{}", path), json!({ "type": "kv", "options": { "version": "2" } }))
            }
            MountKind::AppRole => (format!("sys/auth/{}", path), json!({ "type": "approle" })),
        };

        match self.send_ok(self.request(Method::POST, &endpoint, Some(token)).json(&body)).await {
            Ok(_) => {
                tracing::info!(kind = %kind, path = %path, "Mount enabled");
                Ok(Transition::Performed)
            }
            Err(e) if is_already_in_use(&e) => Ok(Transition::AlreadyDone),
            Err(e) => Err(e),
        }
    }

    async fn read_secret(&self, token: &SecretString, path: &str) -> Result<Option<SecretValue>> {
        let endpoint = self.kv_data_path(path)?;
        let response = self.send(self.request(Method::GET, &endpoint, Some(token))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let envelope: DataEnvelope<KvData> = self.decode(response).await?;
        Ok(envelope.data.data)
    }

    async fn write_secret(&self, token: &SecretString, path: &str, value: &SecretValue) -> Result<()> {
        let endpoint = self.kv_data_path(path)?;
        let body = json!({ "data": value });
        self.send_ok(self.request(Method::POST, &endpoint, Some(token)).json(&body)).await?;
        tracing::debug!(path = %path, "Secret written");
        Ok(())
    }

    async fn upsert_policy(&self, token: &SecretString, name: &str, policy: &str) -> Result<()> {
        validate_relative(name)?;
        let body = json!({ "policy": policy });
        self.send_ok(
            self.request(Method::PUT, &format!("sys/policies/acl/{}", name), Some(token)).json(&body),
        )
        .await?;
        tracing::debug!(policy = %name, "Policy synced");
        Ok(())
    }

    async fn upsert_role(&self, token: &SecretString, role: &RoleSpec) -> Result<()> {
        let endpoint = self.role_path(&role.name)?;
        let body = json!({
            "token_policies": role.policies,
            "token_ttl": role.token_ttl,
            "token_max_ttl": role.token_max_ttl,
            "secret_id_ttl": role.secret_id_ttl,
        });
        self.send_ok(self.request(Method::POST, &endpoint, Some(token)).json(&body)).await?;
        tracing::debug!(role = %role.name, "Role synced");
        Ok(())
    }

    async fn read_role_id(&self, token: &SecretString, role: &str) -> Result<String> {
        let endpoint = format!("{}/role-id", self.role_path(role)?);
        let response = self.send_ok(self.request(Method::GET, &endpoint, Some(token))).await?;
        let envelope: DataEnvelope<RoleIdData> = self.decode(response).await?;
        Ok(envelope.data.role_id)
    }

    async fn generate_secret_id(&self, token: &SecretString, role: &str) -> Result<SecretString> {
        let endpoint = format!("{}/secret-id", self.role_path(role)?);
        let response = self.send_ok(self.request(Method::POST, &endpoint, Some(token))).await?;
        let envelope: DataEnvelope<SecretIdData> = self.decode(response).await?;
        Ok(SecretString::new(envelope.data.secret_id))
    }

    async fn approle_login(&self, role_id: &str, secret_id: &SecretString) -> Result<SecretString> {
        let endpoint = format!("auth/{}/login", self.approle_mount);
        let body = json!({ "role_id": role_id, "secret_id": secret_id.expose_secret() });
        let response = match self.send_ok(self.request(Method::POST, &endpoint, None).json(&body)).await
        {
            Ok(response) => response,
            Err(SecretsError::BackendError { status: 400, message }) => {
                return Err(SecretsError::authentication_failed(message));
            }
            Err(e) => return Err(e),
        };
        let login: LoginResponse = self.decode(response).await?;
        Ok(SecretString::new(login.auth.client_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> VaultHttpBackend {
        VaultHttpBackend::with_mounts(&server.uri(), "secret", "approle", Duration::from_secs(2))
            .expect("client")
    }

    fn token() -> SecretString {
        SecretString::new("root-token")
    }

    #[tokio::test]
    async fn test_status_parses_seal_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/seal-status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "shamir", "initialized": true, "sealed": true, "t": 1, "n": 1
            })))
            .mount(&server)
            .await;

        let state = backend(&server).status().await.unwrap();
        assert_eq!(state, BackendState { initialized: true, sealed: true });
    }

    #[tokio::test]
    async fn test_status_unreachable_is_not_a_seal_state() {
        // Nothing listens on port 1
        let vault = VaultHttpBackend::with_mounts(
            "http://127.0.0.1:1",
            "secret",
            "approle",
            Duration::from_millis(500),
        )
        .unwrap();
        let err = vault.status().await.unwrap_err();
        assert!(matches!(err, SecretsError::Unreachable { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_initialize_returns_material() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/init"))
            .and(body_json(json!({ "secret_shares": 1, "secret_threshold": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": ["abcd"], "keys_base64": ["q80="], "root_token": "hvs.root"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let material = backend(&server).initialize(1, 1).await.unwrap();
        assert_eq!(material.unseal_key.expose_secret(), "q80=");
        assert_eq!(material.root_token.expose_secret(), "hvs.root");
    }

    #[tokio::test]
    async fn test_initialize_twice_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/init"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "errors": ["Vault is already initialized"] })),
            )
            .mount(&server)
            .await;

        let err = backend(&server).initialize(1, 1).await.unwrap_err();
        assert!(matches!(err, SecretsError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_unseal_when_already_unsealed_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/seal-status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "initialized": true, "sealed": false })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/unseal"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let vault = backend(&server);
        let key = SecretString::new("q80=");
        assert_eq!(vault.unseal(&key).await.unwrap(), Transition::AlreadyDone);
        assert_eq!(vault.unseal(&key).await.unwrap(), Transition::AlreadyDone);
    }

    #[tokio::test]
    async fn test_unseal_submits_key_when_sealed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/seal-status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "initialized": true, "sealed": true })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/unseal"))
            .and(body_json(json!({ "key": "q80=" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sealed": false })))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server).unseal(&SecretString::new("q80=")).await.unwrap();
        assert_eq!(result, Transition::Performed);
    }

    #[tokio::test]
    async fn test_ensure_mount_already_enabled_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/mounts/secret"))
            .and(header(TOKEN_HEADER, "root-token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": ["path is already in use at secret/"]
            })))
            .mount(&server)
            .await;

        let vault = backend(&server);
        let first = vault.ensure_mount(&token(), MountKind::KvV2, "secret").await.unwrap();
        let second = vault.ensure_mount(&token(), MountKind::KvV2, "secret").await.unwrap();
        assert_eq!(first, Transition::AlreadyDone);
        assert_eq!(second, Transition::AlreadyDone);
    }

    #[tokio::test]
    async fn test_ensure_approle_mount_enables_auth_method() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/auth/approle"))
            .and(body_json(json!({ "type": "approle" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server).ensure_mount(&token(), MountKind::AppRole, "approle").await;
        assert_eq!(result.unwrap(), Transition::Performed);
    }

    #[tokio::test]
    async fn test_read_secret_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/gofr/config/jwt-signing-secret"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
            .mount(&server)
            .await;

        let value = backend(&server).read_secret(&token(), "gofr/config/jwt-signing-secret").await;
        assert!(value.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_secret_returns_inner_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/gofr/config/jwt-signing-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "value": "abc" }, "metadata": { "version": 1 } }
            })))
            .mount(&server)
            .await;

        let value = backend(&server)
            .read_secret(&token(), "gofr/config/jwt-signing-secret")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value.get("value"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn test_read_secret_rejects_traversal() {
        let server = MockServer::start().await;
        let err = backend(&server).read_secret(&token(), "gofr/../../sys").await.unwrap_err();
        assert!(matches!(err, SecretsError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_sealed_backend_maps_to_sealed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/secret/data/gofr/auth/groups/admin"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({ "errors": ["Vault is sealed"] })),
            )
            .mount(&server)
            .await;

        let err = backend(&server)
            .write_secret(&token(), "gofr/auth/groups/admin", &SecretValue::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::Sealed));
    }

    #[tokio::test]
    async fn test_role_and_secret_id_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/role/gofr-np"))
            .and(body_json(json!({
                "token_policies": ["gofr-np-policy"],
                "token_ttl": "1h",
                "token_max_ttl": "4h",
                "secret_id_ttl": "0",
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/approle/role/gofr-np/role-id"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "role_id": "role-1" } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/role/gofr-np/secret-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "secret_id": "secret-1", "secret_id_accessor": "acc" }
            })))
            .mount(&server)
            .await;

        let vault = backend(&server);
        let role = RoleSpec {
            name: "gofr-np".to_string(),
            policies: vec!["gofr-np-policy".to_string()],
            token_ttl: "1h".to_string(),
            token_max_ttl: "4h".to_string(),
            secret_id_ttl: "0".to_string(),
        };
        vault.upsert_role(&token(), &role).await.unwrap();
        assert_eq!(vault.read_role_id(&token(), "gofr-np").await.unwrap(), "role-1");
        assert_eq!(
            vault.generate_secret_id(&token(), "gofr-np").await.unwrap().expose_secret(),
            "secret-1"
        );
    }

    #[tokio::test]
    async fn test_login_rejection_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": ["invalid role or secret ID"]
            })))
            .mount(&server)
            .await;

        let err = backend(&server)
            .approle_login("role-1", &SecretString::new("stale"))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::AuthenticationFailed { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_login_success_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .and(body_json(json!({ "role_id": "role-1", "secret_id": "secret-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": { "client_token": "hvs.client", "policies": ["default"] }
            })))
            .mount(&server)
            .await;

        let token = backend(&server)
            .approle_login("role-1", &SecretString::new("secret-1"))
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "hvs.client");
    }
}
