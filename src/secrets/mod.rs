//! Secret backend access and credential handling.
//!
//! # Architecture
//!
//! - [`SecretBackend`]: port over a KV + AppRole capable backend, implemented
//!   by [`VaultHttpBackend`]
//! - [`BootstrapStore`]: local, never-distributed store for unseal material
//!   and per-service credentials
//! - [`CredentialProvisioner`]: validate-then-regenerate AppRole credentials
//! - [`SecretDistributor`]: staged, full-replacement publication of
//!   credentials into shared targets
//!
//! # Security Considerations
//!
//! - Unseal keys, root tokens and secret IDs are held in [`SecretString`] and
//!   never logged
//! - Files holding secrets are written atomically with mode 0600
//! - Distribution targets only ever receive role/secret ID pairs

pub mod backend;
pub mod distributor;
pub mod error;
pub mod provisioner;
pub mod store;
pub mod types;
pub mod vault;

pub use backend::{wait_until_reachable, BackendState, MountKind, RoleSpec, SecretBackend, SecretValue};
pub use distributor::{CredentialBundle, DistributionTarget, PublishReport, SecretDistributor};
pub use error::{Result, SecretsError};
pub use provisioner::{CredentialProvisioner, CredentialStatus, ProvisionOutcome};
pub use store::BootstrapStore;
pub use types::{CredentialFile, SecretString, ServiceCredential, UnsealMaterial};
pub use vault::VaultHttpBackend;
