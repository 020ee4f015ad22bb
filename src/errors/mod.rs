//! # Error Handling
//!
//! Terminal failures of the bootstrap pipeline. Every failure surfaced to the
//! operator carries the stage that failed, the last observed state of the
//! affected component, and a one-line remedy.

pub mod types;

pub use types::{BootstrapError, Result, TargetFailure};

use serde::Serialize;
use std::fmt;

/// Orchestrator stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prerequisites,
    NetworkAndVolumes,
    Image,
    Teardown,
    BackendStart,
    Unseal,
    MountsAndBaseSecrets,
    Credentials,
    Distribution,
    ServiceStart,
    HealthWait,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prerequisites => "prerequisites",
            Stage::NetworkAndVolumes => "network_and_volumes",
            Stage::Image => "image",
            Stage::Teardown => "teardown",
            Stage::BackendStart => "backend_start",
            Stage::Unseal => "unseal",
            Stage::MountsAndBaseSecrets => "mounts_and_base_secrets",
            Stage::Credentials => "credentials",
            Stage::Distribution => "distribution",
            Stage::ServiceStart => "service_start",
            Stage::HealthWait => "health_wait",
        };
        write!(f, "{}", name)
    }
}

/// A [`BootstrapError`] annotated with where it happened.
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed: {error} (last observed: {observed})")]
pub struct StageError {
    pub stage: Stage,
    pub observed: String,
    #[source]
    pub error: BootstrapError,
}

impl StageError {
    pub fn new(stage: Stage, observed: impl Into<String>, error: BootstrapError) -> Self {
        Self { stage, observed: observed.into(), error }
    }

    pub fn remedy(&self) -> String {
        self.error.remedy()
    }

    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}
