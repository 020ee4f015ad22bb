//! # Bootstrap Orchestration
//!
//! Composes the secret backend, credential provisioning, distribution and the
//! service stack into the idempotent `ensure_ready` and `teardown` operations.
//!
//! ```text
//! prerequisites → network/volumes → image → teardown → backend start
//!   → init/unseal → mounts + base secrets → credentials → distribution
//!   → service start → health wait
//! ```

pub mod base_secrets;
pub mod context;
pub mod lock;
pub mod orchestrator;
pub mod test_token;

pub use base_secrets::{ensure_mounts_and_base_secrets, generate_signing_secret, RESERVED_GROUPS};
pub use context::{BootstrapContext, StepRecord};
pub use lock::BootstrapLock;
pub use orchestrator::{BootstrapOrchestrator, ReadyReport, StatusReport, STAGES};
pub use test_token::{mint_test_token, MintedToken, TestTokenRequest, TokenClaims};
