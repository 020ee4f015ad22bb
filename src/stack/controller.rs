//! Lifecycle of the service stack: network, volumes, image, start and stop.
//!
//! Multi-call operations check the cancellation token between engine calls;
//! `down` ignores it since it is the cleanup path.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::definition::{ServiceDefinition, StackDefinition};
use super::health::HealthPoller;
use super::runtime::{BuildSpec, ComposeProject, ContainerRuntime};
use crate::errors::{BootstrapError, Result, Stage};
use crate::transition::Transition;

/// Poll budget used while waiting for a service's dependencies.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

pub struct StackController {
    runtime: Arc<dyn ContainerRuntime>,
    project: ComposeProject,
    log_tail_lines: u32,
    cancel: CancellationToken,
}

impl StackController {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, project: ComposeProject, log_tail_lines: u32) -> Self {
        Self { runtime, project, log_tail_lines, cancel: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::cancelled(stage));
        }
        Ok(())
    }

    pub fn project(&self) -> &ComposeProject {
        &self.project
    }

    pub async fn ensure_network(&self, name: &str) -> Result<Transition> {
        if self.runtime.network_exists(name).await? {
            return Ok(Transition::AlreadyDone);
        }
        self.runtime.create_network(name).await?;
        tracing::info!(network = %name, "Network created");
        Ok(Transition::Performed)
    }

    pub async fn ensure_volume(&self, name: &str) -> Result<Transition> {
        if self.runtime.volume_exists(name).await? {
            return Ok(Transition::AlreadyDone);
        }
        self.runtime.create_volume(name).await?;
        tracing::info!(volume = %name, "Volume created");
        Ok(Transition::Performed)
    }

    /// Network plus every stack-owned and shared volume.
    pub async fn ensure_network_and_volumes(&self, stack: &StackDefinition) -> Result<Transition> {
        let mut outcome = self.ensure_network(&stack.network).await?;
        for volume in stack.volumes.iter().chain(stack.shared_volumes.iter()) {
            self.checkpoint(Stage::NetworkAndVolumes)?;
            outcome = outcome.and(self.ensure_volume(volume).await?);
        }
        Ok(outcome)
    }

    /// Build only when the tag is absent or a rebuild is forced.
    pub async fn ensure_image(&self, tag: &str, spec: &BuildSpec, force_rebuild: bool) -> Result<Transition> {
        if !force_rebuild && self.runtime.image_exists(tag).await? {
            tracing::debug!(tag = %tag, "Image present");
            return Ok(Transition::AlreadyDone);
        }
        self.checkpoint(Stage::Image)?;
        tracing::info!(tag = %tag, force_rebuild, "Building image");
        self.runtime.build_image(tag, spec).await?;
        Ok(Transition::Performed)
    }

    /// Stop and remove any running instance of the stack.
    pub async fn teardown_existing(&self, stack: &StackDefinition) -> Result<Transition> {
        let mut running = false;
        for service in &stack.services {
            self.checkpoint(Stage::Teardown)?;
            if self.runtime.inspect_container(&stack.container_name(service)).await?.is_some() {
                running = true;
                break;
            }
        }
        if !running {
            return Ok(Transition::AlreadyDone);
        }
        self.checkpoint(Stage::Teardown)?;
        self.runtime.stop_project(&self.project).await?;
        tracing::info!(project = %self.project.name, "Existing stack instance removed");
        Ok(Transition::Performed)
    }

    /// Start one service. On failure the service's logs and inspect state are
    /// logged and attached to the error.
    pub async fn start_service(&self, stack: &StackDefinition, service: &ServiceDefinition) -> Result<()> {
        tracing::info!(service = %service.name, "Starting service");
        match self.runtime.start_service(&self.project, &service.name).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let container = stack.container_name(service);
                let (health, logs) = self.diagnose(&container).await;
                tracing::error!(
                    service = %service.name,
                    error = %e,
                    health = %health,
                    "Service failed to start\n{}",
                    logs
                );
                Err(BootstrapError::StackStartFailed { service: service.name.clone(), health, logs })
            }
        }
    }

    /// Start `services` in order, waiting for each one's dependencies to be
    /// healthy before starting it.
    pub async fn start_in_order(
        &self,
        stack: &StackDefinition,
        services: &[&ServiceDefinition],
        poller: &HealthPoller,
        budget: WaitBudget,
    ) -> Result<()> {
        for service in services {
            self.checkpoint(Stage::ServiceStart)?;
            let deps: Vec<&ServiceDefinition> =
                service.depends_on.iter().filter_map(|name| stack.service(name)).collect();
            if !deps.is_empty() {
                tracing::debug!(service = %service.name, dependencies = ?service.depends_on, "Waiting for dependencies");
                poller
                    .wait_until_healthy(stack, &deps, budget.max_attempts, budget.interval)
                    .await
                    .map_err(|report| BootstrapError::StackUnhealthy(Box::new(report)))?;
                self.checkpoint(Stage::ServiceStart)?;
            }
            self.start_service(stack, service).await?;
        }
        Ok(())
    }

    /// Clean restart of the whole stack in dependency order.
    pub async fn up(&self, stack: &StackDefinition, poller: &HealthPoller, budget: WaitBudget) -> Result<()> {
        self.teardown_existing(stack).await?;
        let order = stack.topological_order()?;
        self.start_in_order(stack, &order, poller, budget).await
    }

    /// Stop and remove all containers; with `purge_volumes`, also remove the
    /// stack-owned volumes. Shared volumes are never removed. Failures are
    /// returned as warnings.
    pub async fn down(&self, stack: &StackDefinition, purge_volumes: bool) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = self.runtime.stop_project(&self.project).await {
            tracing::warn!(project = %self.project.name, error = %e, "Failed to stop stack");
            warnings.push(format!("stop {}: {}", self.project.name, e));
        }

        if purge_volumes {
            for volume in stack.volumes.iter().filter(|v| !stack.shared_volumes.contains(v)) {
                match self.runtime.volume_exists(volume).await {
                    Ok(true) => {
                        if let Err(e) = self.runtime.remove_volume(volume).await {
                            tracing::warn!(volume = %volume, error = %e, "Failed to remove volume");
                            warnings.push(format!("remove volume {}: {}", volume, e));
                        } else {
                            tracing::info!(volume = %volume, "Volume removed");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(volume = %volume, error = %e, "Failed to inspect volume");
                        warnings.push(format!("inspect volume {}: {}", volume, e));
                    }
                }
            }
        }

        warnings
    }

    /// Inspect state and log tail of a container, for error reports.
    pub async fn diagnose(&self, container: &str) -> (String, String) {
        let health = match self.runtime.inspect_container(container).await {
            Ok(Some(state)) => state.to_string(),
            Ok(None) => format!("{} missing", container),
            Err(e) => format!("inspect failed: {}", e),
        };
        let logs = match self.runtime.container_logs(container, self.log_tail_lines).await {
            Ok(logs) => logs,
            Err(e) => format!("<logs unavailable: {}>", e),
        };
        (health, logs)
    }

    /// Run a command in a container for diagnostics; errors become text.
    pub async fn exec_diagnostic(&self, container: &str, command: &[&str]) -> String {
        match self.runtime.exec(container, command).await {
            Ok(output) => output.trim().to_string(),
            Err(e) => format!("<exec failed: {}>", e),
        }
    }
}
