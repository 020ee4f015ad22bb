//! # Service Stack
//!
//! Container-side half of the bootstrap: the [`ContainerRuntime`] port and its
//! docker CLI implementation, the declarative [`StackDefinition`], the
//! [`StackController`] lifecycle operations and the [`HealthPoller`].

pub mod controller;
pub mod definition;
pub mod docker;
pub mod health;
pub mod runtime;

pub use controller::{StackController, WaitBudget};
pub use definition::{ServiceDefinition, StackDefinition};
pub use docker::{DockerCli, DOCKER_INSTALL_HINT};
pub use health::{classify, HealthPoller, HealthRecord, HealthStatus, TimeoutReport};
pub use runtime::{
    BuildSpec, ComposeProject, ContainerRuntime, ContainerState, FileOwnership, RuntimeError,
    RuntimeResult,
};
