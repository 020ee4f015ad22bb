//! # GOFR-NP Bootstrap
//!
//! Brings the GOFR-NP service stack to a healthy, credentialed state: a
//! Vault-compatible secret backend is initialized or unsealed, each service
//! gets AppRole credentials that are validated before reuse, the credentials
//! are published into shared targets, and the application containers are
//! started in dependency order and polled until healthy.
//!
//! ## Architecture
//!
//! ```text
//! CLI → BootstrapOrchestrator ─┬→ SecretBackend (Vault HTTP)
//!                              ├→ CredentialProvisioner → BootstrapStore
//!                              ├→ SecretDistributor ─┐
//!                              └→ StackController ───┴→ ContainerRuntime (docker CLI)
//!                                   └→ HealthPoller
//! ```
//!
//! Every step reports a [`transition::Transition`] so re-running against an
//! already-ready environment performs no mutations.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gofr_bootstrap::bootstrap::{BootstrapContext, BootstrapOrchestrator};
//! use gofr_bootstrap::config::BootstrapConfig;
//! use gofr_bootstrap::secrets::VaultHttpBackend;
//! use gofr_bootstrap::stack::DockerCli;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = BootstrapConfig::load(None)?;
//! let mut ctx = BootstrapContext::new(config)?;
//! let backend = Arc::new(VaultHttpBackend::new(&ctx.config.vault)?);
//! let runtime = Arc::new(DockerCli::locate(
//!     ctx.config.stack.command_timeout(),
//!     ctx.config.distribution.helper_image.clone(),
//! )?);
//! let orchestrator = BootstrapOrchestrator::new(&ctx, backend, runtime, CancellationToken::new());
//! orchestrator.ensure_ready(&mut ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod stack;
pub mod transition;

// Re-export commonly used types and traits
pub use config::BootstrapConfig;
pub use errors::{BootstrapError, Result, Stage, StageError};
pub use transition::Transition;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
