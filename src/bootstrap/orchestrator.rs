//! Top-level "ensure environment ready" and "tear down" sequencing.
//!
//! Stages run strictly in order and the run stops at the first failure. Each
//! failure is wrapped in a [`StageError`] naming the stage and the last
//! observed state of the component involved. Cancellation is checked before
//! every stage, between backend and engine calls inside a stage, and between
//! health polls; when it fires, anything this run started is torn down under
//! the teardown timeout.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::base_secrets::ensure_mounts_and_base_secrets;
use super::context::{BootstrapContext, StepRecord};
use super::lock::BootstrapLock;
use crate::errors::{BootstrapError, Result, Stage, StageError};
use crate::secrets::{
    wait_until_reachable, BackendState, CredentialBundle, CredentialProvisioner, ProvisionOutcome,
    SecretBackend, SecretDistributor, SecretString, SecretsError,
};
use crate::stack::{
    ContainerRuntime, HealthPoller, HealthRecord, StackController, WaitBudget, DOCKER_INSTALL_HINT,
};
use crate::transition::Transition;

/// Stages of `ensure_ready`, in execution order.
pub const STAGES: [Stage; 11] = [
    Stage::Prerequisites,
    Stage::NetworkAndVolumes,
    Stage::Image,
    Stage::Teardown,
    Stage::BackendStart,
    Stage::Unseal,
    Stage::MountsAndBaseSecrets,
    Stage::Credentials,
    Stage::Distribution,
    Stage::ServiceStart,
    Stage::HealthWait,
];

/// Successful outcome of `ensure_ready`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadyReport {
    pub steps: Vec<StepRecord>,
    pub credentials: Vec<String>,
    pub health: Vec<HealthRecord>,
}

/// Snapshot for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub backend: Option<BackendState>,
    pub backend_error: Option<String>,
    pub services: Vec<HealthRecord>,
}

pub struct BootstrapOrchestrator {
    backend: Arc<dyn SecretBackend>,
    runtime: Arc<dyn ContainerRuntime>,
    controller: StackController,
    poller: HealthPoller,
    provisioner: CredentialProvisioner,
    distributor: SecretDistributor,
    cancel: CancellationToken,
}

impl BootstrapOrchestrator {
    pub fn new(
        ctx: &BootstrapContext,
        backend: Arc<dyn SecretBackend>,
        runtime: Arc<dyn ContainerRuntime>,
        cancel: CancellationToken,
    ) -> Self {
        let log_tail = ctx.config.health.log_tail_lines;
        Self {
            controller: StackController::new(runtime.clone(), ctx.compose_project(), log_tail)
                .with_cancellation(cancel.clone()),
            poller: HealthPoller::new(runtime.clone(), log_tail).with_cancellation(cancel.clone()),
            provisioner: CredentialProvisioner::new(backend.clone(), ctx.store.clone(), &ctx.config.vault)
                .with_cancellation(cancel.clone()),
            distributor: SecretDistributor::new(runtime.clone(), ctx.ownership()).with_cancellation(cancel.clone()),
            runtime,
            backend,
            cancel,
        }
    }

    pub fn controller(&self) -> &StackController {
        &self.controller
    }

    fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::cancelled(stage));
        }
        Ok(())
    }

    fn budget(ctx: &BootstrapContext) -> WaitBudget {
        WaitBudget { max_attempts: ctx.config.health.max_attempts, interval: ctx.config.health.interval() }
    }

    /// Bring the whole stack to a healthy, credentialed state.
    pub async fn ensure_ready(&self, ctx: &mut BootstrapContext) -> std::result::Result<ReadyReport, StageError> {
        let _lock = BootstrapLock::acquire(&ctx.config.storage.secrets_dir)
            .map_err(|e| StageError::new(Stage::Prerequisites, "lock not acquired", e))?;

        for stage in STAGES {
            if self.cancel.is_cancelled() {
                return Err(self.abort(ctx, stage).await);
            }

            let outcome = self.run_stage(ctx, stage).instrument(crate::stage_span!(stage)).await;

            match outcome {
                Ok(transition) => {
                    tracing::info!(stage = %stage, outcome = %transition, "Stage complete");
                    ctx.record(stage, transition);
                }
                Err(error) if matches!(error.error, BootstrapError::Cancelled { .. }) => {
                    return Err(self.abort(ctx, stage).await);
                }
                Err(error) => {
                    tracing::error!(
                        stage = %error.stage,
                        observed = %error.observed,
                        remedy = %error.remedy(),
                        "Bootstrap failed: {}",
                        error.error
                    );
                    return Err(error);
                }
            }
        }

        Ok(ReadyReport {
            steps: ctx.steps.clone(),
            credentials: ctx.credentials.iter().map(|c| c.service_name.clone()).collect(),
            health: ctx.health.clone(),
        })
    }

    async fn run_stage(&self, ctx: &mut BootstrapContext, stage: Stage) -> std::result::Result<Transition, StageError> {
        let fail = |observed: String| move |e: BootstrapError| StageError::new(stage, observed, e);

        match stage {
            Stage::Prerequisites => self.check_prerequisites(ctx).await.map_err(fail("engine not verified".into())),
            Stage::NetworkAndVolumes => self
                .controller
                .ensure_network_and_volumes(&ctx.stack)
                .await
                .map_err(fail(format!("network={}", ctx.stack.network))),
            Stage::Image => self
                .controller
                .ensure_image(&ctx.config.stack.image_tag, &ctx.build_spec(), ctx.force_rebuild)
                .await
                .map_err(fail(format!("image={}", ctx.config.stack.image_tag))),
            Stage::Teardown => self
                .controller
                .teardown_existing(&ctx.stack)
                .await
                .map_err(fail(format!("project={}", ctx.stack.project))),
            Stage::BackendStart => self.start_backend(ctx).await,
            Stage::Unseal => {
                let result = self.ensure_unsealed(ctx).await;
                result.map_err(|e| StageError::new(stage, ctx.observed_backend(), e))
            }
            Stage::MountsAndBaseSecrets => {
                let token = root_token(ctx).map_err(fail(ctx.observed_backend()))?;
                ensure_mounts_and_base_secrets(self.backend.as_ref(), &token, &ctx.config.vault, &self.cancel)
                    .await
                    .map_err(fail(ctx.observed_backend()))
            }
            Stage::Credentials => self.provision_credentials(ctx).await,
            Stage::Distribution => {
                let bundle = CredentialBundle::from_credentials(&ctx.credentials)
                    .map_err(fail("bundle not built".into()))?;
                self.distributor
                    .publish(&bundle, &ctx.targets())
                    .await
                    .map(|_| Transition::Performed)
                    .map_err(fail(format!("{} target(s)", ctx.targets().len())))
            }
            Stage::ServiceStart => {
                ctx.started_containers = true;
                let services = ctx.stack.application_services().map_err(fail("stack invalid".into()))?;
                self.controller
                    .start_in_order(&ctx.stack, &services, &self.poller, Self::budget(ctx))
                    .await
                    .map(|_| Transition::Performed)
                    .map_err(|e| StageError::new(stage, observed_for(&e), cancelled_or(e, stage)))
            }
            Stage::HealthWait => self.wait_for_health(ctx).await,
        }
    }

    async fn check_prerequisites(&self, ctx: &BootstrapContext) -> Result<Transition> {
        let version = self.runtime.engine_version().await.map_err(|e| {
            BootstrapError::prerequisite(
                format!("container engine ({})", e),
                format!("Start the Docker daemon or {}", DOCKER_INSTALL_HINT),
            )
        })?;
        tracing::debug!(engine_version = %version, "Container engine reachable");

        let compose_file = &ctx.config.stack.compose_file;
        if !compose_file.exists() {
            return Err(BootstrapError::prerequisite(
                format!("compose file {}", compose_file.display()),
                "Set GOFR_NP_STACK__COMPOSE_FILE to the stack's compose file",
            ));
        }
        Ok(Transition::AlreadyDone)
    }

    async fn start_backend(&self, ctx: &mut BootstrapContext) -> std::result::Result<Transition, StageError> {
        let stage = Stage::BackendStart;
        let service = ctx
            .stack
            .service(&ctx.stack.backend_service)
            .cloned()
            .ok_or_else(|| StageError::new(stage, "not declared", BootstrapError::config("backend service missing")))?;

        ctx.started_containers = true;
        self.controller
            .start_service(&ctx.stack, &service)
            .await
            .map_err(|e| StageError::new(stage, observed_for(&e), e))?;

        let vault = &ctx.config.vault;
        let reachable = tokio::select! {
            result = wait_until_reachable(self.backend.as_ref(), vault.reachability_attempts, vault.reachability_interval()) => result,
            _ = self.cancel.cancelled() => {
                return Err(StageError::new(stage, "cancelled while waiting", BootstrapError::cancelled(stage)));
            }
        };

        match reachable {
            Ok(state) => {
                ctx.backend_state = Some(state);
                tracing::info!(%state, "Secret backend reachable");
                Ok(Transition::Performed)
            }
            Err(e) => {
                let diagnostics = self
                    .controller
                    .exec_diagnostic(&ctx.backend_container(), &["vault", "status"])
                    .await;
                Err(StageError::new(stage, format!("unreachable; vault status: {}", diagnostics), e.into()))
            }
        }
    }

    /// Initialize or unseal as the observed state requires.
    async fn ensure_unsealed(&self, ctx: &mut BootstrapContext) -> Result<Transition> {
        let state = match ctx.backend_state {
            Some(state) => state,
            None => self.backend.status().await?,
        };
        ctx.backend_state = Some(state);

        let transition = if !state.initialized {
            tracing::info!("Secret backend uninitialized; initializing");
            let vault = &ctx.config.vault;
            let material = self.backend.initialize(vault.key_shares, vault.key_threshold).await?;
            ctx.store.save_unseal_material(&material)?;
            self.checkpoint(Stage::Unseal)?;
            self.backend.unseal(&material.unseal_key).await?;
            Transition::Performed
        } else if state.sealed {
            let key = ctx.store.load_unseal_key()?.ok_or_else(|| BootstrapError::MissingUnsealMaterial {
                path: ctx.store.unseal_key_path(),
            })?;
            tracing::info!("Secret backend sealed; unsealing with stored key");
            self.checkpoint(Stage::Unseal)?;
            self.backend.unseal(&key).await?
        } else {
            Transition::AlreadyDone
        };

        self.checkpoint(Stage::Unseal)?;
        let state = self.backend.status().await?;
        ctx.backend_state = Some(state);
        if !state.is_ready() {
            return Err(SecretsError::Sealed.into());
        }

        let token = ctx.store.load_root_token()?.ok_or_else(|| BootstrapError::MissingUnsealMaterial {
            path: ctx.store.root_token_path(),
        })?;
        ctx.root_token = Some(token);
        Ok(transition)
    }

    async fn provision_credentials(&self, ctx: &mut BootstrapContext) -> std::result::Result<Transition, StageError> {
        let stage = Stage::Credentials;
        let token = root_token(ctx).map_err(|e| StageError::new(stage, ctx.observed_backend(), e))?;

        let mut transition = Transition::AlreadyDone;
        let mut credentials = Vec::new();
        for service in ctx.config.vault.credential_services.clone() {
            if self.cancel.is_cancelled() {
                let observed = format!("{} credential(s) ready", credentials.len());
                return Err(StageError::new(stage, observed, BootstrapError::cancelled(stage)));
            }
            let ProvisionOutcome { credential, prior, transition: step } = self
                .provisioner
                .ensure(&token, &service)
                .await
                .map_err(|e| StageError::new(stage, format!("service={} {}", service, ctx.observed_backend()), e))?;
            tracing::info!(service = %service, prior = ?prior, outcome = %step, "Credential ready");
            transition = transition.and(step);
            credentials.push(credential);
        }
        ctx.credentials = credentials;
        Ok(transition)
    }

    async fn wait_for_health(&self, ctx: &mut BootstrapContext) -> std::result::Result<Transition, StageError> {
        let stage = Stage::HealthWait;
        let services = ctx
            .stack
            .topological_order()
            .map_err(|e| StageError::new(stage, "stack invalid", e))?;
        let budget = Self::budget(ctx);

        let result =
            self.poller.wait_until_healthy(&ctx.stack, &services, budget.max_attempts, budget.interval).await;
        match result {
            Ok(records) => {
                ctx.health = records;
                Ok(Transition::AlreadyDone)
            }
            Err(report) => {
                let observed = report.summary();
                let error = if report.cancelled {
                    BootstrapError::cancelled(stage)
                } else {
                    BootstrapError::StackUnhealthy(Box::new(report))
                };
                Err(StageError::new(stage, observed, error))
            }
        }
    }

    /// Best-effort, time-bounded teardown after cancellation.
    async fn abort(&self, ctx: &BootstrapContext, stage: Stage) -> StageError {
        tracing::warn!(stage = %stage, "Bootstrap cancelled");
        if ctx.started_containers {
            let timeout = ctx.config.stack.teardown_timeout();
            match tokio::time::timeout(timeout, self.controller.down(&ctx.stack, false)).await {
                Ok(warnings) => {
                    for warning in warnings {
                        tracing::warn!(warning = %warning, "Teardown after cancellation incomplete");
                    }
                }
                Err(_) => tracing::warn!(timeout_secs = timeout.as_secs(), "Teardown after cancellation timed out"),
            }
        }
        StageError::new(stage, "cancelled", BootstrapError::cancelled(stage))
    }

    /// Stop the stack, optionally removing stack volumes and published
    /// credentials. Failures are returned as warnings.
    pub async fn teardown(
        &self,
        ctx: &BootstrapContext,
        purge_volumes: bool,
        purge_secrets: bool,
    ) -> Result<Vec<String>> {
        let _lock = BootstrapLock::acquire(&ctx.config.storage.secrets_dir)?;
        let timeout = ctx.config.stack.teardown_timeout();

        let mut warnings = match tokio::time::timeout(timeout, self.controller.down(&ctx.stack, purge_volumes)).await {
            Ok(warnings) => warnings,
            Err(_) => vec![format!("stack teardown timed out after {}s", timeout.as_secs())],
        };

        if purge_secrets {
            warnings.extend(self.distributor.purge(&ctx.targets()).await);
        }

        for warning in &warnings {
            tracing::warn!(warning = %warning, "Teardown incomplete");
        }
        Ok(warnings)
    }

    /// Backend state plus one health read of every service.
    pub async fn status(&self, ctx: &BootstrapContext) -> Result<StatusReport> {
        let (backend, backend_error) = match self.backend.status().await {
            Ok(state) => (Some(state), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let services = ctx.stack.topological_order()?;
        let records = self.poller.check(&ctx.stack, &services).await;
        Ok(StatusReport { backend, backend_error, services: records })
    }

    /// Provision one service's credential outside a full run.
    pub async fn ensure_credential(&self, ctx: &BootstrapContext, service: &str) -> Result<ProvisionOutcome> {
        let state = self.backend.status().await?;
        if !state.is_ready() {
            return Err(SecretsError::Sealed.into());
        }
        let token = ctx.store.load_root_token()?.ok_or_else(|| BootstrapError::MissingUnsealMaterial {
            path: ctx.store.root_token_path(),
        })?;
        self.provisioner.ensure(&token, service).await
    }
}

fn root_token(ctx: &BootstrapContext) -> Result<SecretString> {
    ctx.root_token
        .clone()
        .ok_or_else(|| BootstrapError::MissingUnsealMaterial { path: ctx.store.root_token_path() })
}

fn observed_for(error: &BootstrapError) -> String {
    match error {
        BootstrapError::StackStartFailed { health, .. } => health.clone(),
        BootstrapError::StackUnhealthy(report) => report.summary(),
        other => other.to_string(),
    }
}

fn cancelled_or(error: BootstrapError, stage: Stage) -> BootstrapError {
    match error {
        BootstrapError::StackUnhealthy(report) if report.cancelled => {
            BootstrapError::cancelled(stage)
        }
        other => other,
    }
}
