//! In-memory secret backend with Vault-like init, seal and AppRole semantics.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use gofr_bootstrap::secrets::{
    BackendState, MountKind, RoleSpec, SecretBackend, SecretString, SecretValue, SecretsError,
    UnsealMaterial,
};
use gofr_bootstrap::Transition;
use tokio_util::sync::CancellationToken;

pub const UNSEAL_KEY: &str = "fake-unseal-key";
pub const ROOT_TOKEN: &str = "fake-root-token";

#[derive(Debug, Default)]
pub struct FakeVaultState {
    pub initialized: bool,
    pub sealed: bool,
    pub mounts: BTreeMap<String, String>,
    pub kv: BTreeMap<String, SecretValue>,
    pub policies: BTreeMap<String, String>,
    pub roles: BTreeMap<String, RoleSpec>,
    pub role_ids: BTreeMap<String, String>,
    /// (role_id, secret_id) pairs that log in successfully.
    pub valid_secret_ids: BTreeSet<(String, String)>,

    /// Number of `status` calls answered with a transport error.
    pub unreachable_statuses: u32,
    /// Number of logins answered with a transport error before behaving.
    pub transient_login_failures: u32,
    /// Number of logins answered with a 502 before behaving.
    pub bad_gateway_logins: u32,
    /// Reject every secret ID generation with a permission error.
    pub fail_secret_id_generation: bool,
    /// Cancelled right after the first policy write.
    pub cancel_after_policy: Option<CancellationToken>,
    /// Every token-checked call, in order.
    pub calls: Vec<String>,

    pub initialize_calls: u32,
    pub unseal_calls: u32,
    pub login_calls: u32,
    /// Writes that change backend state.
    pub mutations: Vec<String>,
    next_id: u32,
}

impl FakeVaultState {
    fn next_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", kind, self.next_id)
    }
}

pub struct FakeSecretBackend {
    state: Mutex<FakeVaultState>,
}

impl FakeSecretBackend {
    pub fn uninitialized() -> Self {
        Self { state: Mutex::new(FakeVaultState { sealed: true, ..Default::default() }) }
    }

    /// Initialized and sealed with [`UNSEAL_KEY`] / [`ROOT_TOKEN`].
    pub fn sealed() -> Self {
        Self { state: Mutex::new(FakeVaultState { initialized: true, sealed: true, ..Default::default() }) }
    }

    pub fn unsealed() -> Self {
        Self { state: Mutex::new(FakeVaultState { initialized: true, sealed: false, ..Default::default() }) }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeVaultState> {
        self.state.lock().expect("fake backend lock")
    }

    pub fn seal(&self) {
        self.state().sealed = true;
    }

    /// Invalidate every issued secret ID, as a revocation would.
    pub fn revoke_secret_ids(&self) {
        self.state().valid_secret_ids.clear();
    }

    pub fn mutation_count(&self) -> usize {
        self.state().mutations.len()
    }

    pub fn root_token() -> SecretString {
        SecretString::new(ROOT_TOKEN)
    }

    fn ready(&self, token: &SecretString, call: &str) -> Result<MutexGuard<'_, FakeVaultState>, SecretsError> {
        let mut state = self.state();
        state.calls.push(call.to_string());
        if !state.initialized || state.sealed {
            return Err(SecretsError::Sealed);
        }
        if token.expose_secret() != ROOT_TOKEN {
            return Err(SecretsError::authentication_failed("permission denied"));
        }
        Ok(state)
    }
}

#[async_trait]
impl SecretBackend for FakeSecretBackend {
    fn address(&self) -> &str {
        "http://fake-vault:8200"
    }

    async fn status(&self) -> Result<BackendState, SecretsError> {
        let mut state = self.state();
        if state.unreachable_statuses > 0 {
            state.unreachable_statuses -= 1;
            return Err(SecretsError::unreachable("http://fake-vault:8200", "connection refused"));
        }
        Ok(BackendState { initialized: state.initialized, sealed: state.sealed })
    }

    async fn initialize(&self, _shares: u8, _threshold: u8) -> Result<UnsealMaterial, SecretsError> {
        let mut state = self.state();
        state.initialize_calls += 1;
        if state.initialized {
            return Err(SecretsError::AlreadyInitialized);
        }
        state.initialized = true;
        state.sealed = true;
        Ok(UnsealMaterial { unseal_key: SecretString::new(UNSEAL_KEY), root_token: SecretString::new(ROOT_TOKEN) })
    }

    async fn unseal(&self, key: &SecretString) -> Result<Transition, SecretsError> {
        let mut state = self.state();
        state.unseal_calls += 1;
        if !state.initialized {
            return Err(SecretsError::backend_error(400, "backend is not initialized"));
        }
        if !state.sealed {
            return Ok(Transition::AlreadyDone);
        }
        if key.expose_secret() != UNSEAL_KEY {
            return Err(SecretsError::backend_error(400, "invalid key"));
        }
        state.sealed = false;
        Ok(Transition::Performed)
    }

    async fn ensure_mount(
        &self,
        token: &SecretString,
        kind: MountKind,
        path: &str,
    ) -> Result<Transition, SecretsError> {
        let mut state = self.ready(token, "ensure_mount")?;
        if state.mounts.contains_key(path) {
            return Ok(Transition::AlreadyDone);
        }
        state.mounts.insert(path.to_string(), kind.to_string());
        state.mutations.push(format!("mount {}", path));
        Ok(Transition::Performed)
    }

    async fn read_secret(&self, token: &SecretString, path: &str) -> Result<Option<SecretValue>, SecretsError> {
        let state = self.ready(token, "read_secret")?;
        Ok(state.kv.get(path).cloned())
    }

    async fn write_secret(&self, token: &SecretString, path: &str, value: &SecretValue) -> Result<(), SecretsError> {
        let mut state = self.ready(token, "write_secret")?;
        state.kv.insert(path.to_string(), value.clone());
        state.mutations.push(format!("write {}", path));
        Ok(())
    }

    async fn upsert_policy(&self, token: &SecretString, name: &str, policy: &str) -> Result<(), SecretsError> {
        let mut state = self.ready(token, "upsert_policy")?;
        state.policies.insert(name.to_string(), policy.to_string());
        state.mutations.push(format!("policy {}", name));
        if let Some(cancel) = state.cancel_after_policy.take() {
            cancel.cancel();
        }
        Ok(())
    }

    async fn upsert_role(&self, token: &SecretString, role: &RoleSpec) -> Result<(), SecretsError> {
        let mut state = self.ready(token, "upsert_role")?;
        if !state.role_ids.contains_key(&role.name) {
            let role_id = state.next_id("role");
            state.role_ids.insert(role.name.clone(), role_id);
        }
        state.roles.insert(role.name.clone(), role.clone());
        state.mutations.push(format!("role {}", role.name));
        Ok(())
    }

    async fn read_role_id(&self, token: &SecretString, role: &str) -> Result<String, SecretsError> {
        let state = self.ready(token, "read_role_id")?;
        state.role_ids.get(role).cloned().ok_or_else(|| SecretsError::not_found(format!("role {}", role)))
    }

    async fn generate_secret_id(&self, token: &SecretString, role: &str) -> Result<SecretString, SecretsError> {
        let mut state = self.ready(token, "generate_secret_id")?;
        if state.fail_secret_id_generation {
            return Err(SecretsError::authentication_failed("permission denied on secret-id"));
        }
        let role_id =
            state.role_ids.get(role).cloned().ok_or_else(|| SecretsError::not_found(format!("role {}", role)))?;
        let secret_id = state.next_id("secret");
        state.valid_secret_ids.insert((role_id, secret_id.clone()));
        state.mutations.push(format!("secret-id {}", role));
        Ok(SecretString::new(secret_id))
    }

    async fn approle_login(&self, role_id: &str, secret_id: &SecretString) -> Result<SecretString, SecretsError> {
        let mut state = self.state();
        state.login_calls += 1;
        if state.transient_login_failures > 0 {
            state.transient_login_failures -= 1;
            return Err(SecretsError::unreachable("http://fake-vault:8200", "connection reset"));
        }
        if state.bad_gateway_logins > 0 {
            state.bad_gateway_logins -= 1;
            return Err(SecretsError::backend_error(502, "bad gateway"));
        }
        if state.sealed {
            return Err(SecretsError::Sealed);
        }
        let pair = (role_id.to_string(), secret_id.expose_secret().to_string());
        if state.valid_secret_ids.contains(&pair) {
            Ok(SecretString::new("service-token"))
        } else {
            Err(SecretsError::authentication_failed("invalid role or secret ID"))
        }
    }
}
