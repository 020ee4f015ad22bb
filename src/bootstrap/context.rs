//! Explicit state of one bootstrap run.
//!
//! Configuration, the resolved stack and the local store are fixed at start.
//! The run state (observed backend state, the operator token, provisioned
//! credentials, what was started) is filled in as stages complete and is the
//! only place the orchestrator keeps state between stages.

use serde::Serialize;

use crate::config::BootstrapConfig;
use crate::errors::{Result, Stage};
use crate::secrets::{BackendState, BootstrapStore, DistributionTarget, SecretString, ServiceCredential};
use crate::stack::{BuildSpec, ComposeProject, FileOwnership, HealthRecord, StackDefinition};
use crate::transition::Transition;

/// Outcome of one completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub stage: Stage,
    pub transition: Transition,
}

#[derive(Debug)]
pub struct BootstrapContext {
    pub config: BootstrapConfig,
    pub stack: StackDefinition,
    pub store: BootstrapStore,
    pub force_rebuild: bool,

    pub backend_state: Option<BackendState>,
    pub root_token: Option<SecretString>,
    pub credentials: Vec<ServiceCredential>,
    /// Set once this run has started any container.
    pub started_containers: bool,
    pub steps: Vec<StepRecord>,
    /// Final health read of a successful run.
    pub health: Vec<HealthRecord>,
}

impl BootstrapContext {
    pub fn new(config: BootstrapConfig) -> Result<Self> {
        let stack = StackDefinition::resolve(&config)?;
        Ok(Self::with_stack(config, stack))
    }

    pub fn with_stack(config: BootstrapConfig, stack: StackDefinition) -> Self {
        let store = BootstrapStore::new(&config.storage.secrets_dir);
        let force_rebuild = config.stack.force_rebuild;
        Self {
            config,
            stack,
            store,
            force_rebuild,
            backend_state: None,
            root_token: None,
            credentials: Vec::new(),
            started_containers: false,
            steps: Vec::new(),
            health: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, transition: Transition) {
        self.steps.push(StepRecord { stage, transition });
    }

    /// Volumes first, then host directories.
    pub fn targets(&self) -> Vec<DistributionTarget> {
        self.config
            .distribution
            .targets
            .iter()
            .cloned()
            .map(DistributionTarget::Volume)
            .chain(self.config.distribution.target_dirs.iter().cloned().map(DistributionTarget::Directory))
            .collect()
    }

    pub fn compose_project(&self) -> ComposeProject {
        let stack = &self.config.stack;
        ComposeProject {
            name: self.stack.project.clone(),
            compose_file: stack.compose_file.clone(),
            env: vec![
                ("GOFR_NP_IMAGE".to_string(), stack.image_tag.clone()),
                ("GOFR_NP_NETWORK".to_string(), self.stack.network.clone()),
                ("GOFR_NP_MCP_PORT".to_string(), stack.mcp_port.to_string()),
                ("GOFR_NP_MCPO_PORT".to_string(), stack.mcpo_port.to_string()),
                ("GOFR_NP_WEB_PORT".to_string(), stack.web_port.to_string()),
            ],
        }
    }

    pub fn build_spec(&self) -> BuildSpec {
        BuildSpec {
            dockerfile: self.config.stack.dockerfile.clone(),
            context: self.config.stack.build_context.clone(),
        }
    }

    pub fn ownership(&self) -> FileOwnership {
        FileOwnership::service(self.config.distribution.owner_uid, self.config.distribution.owner_gid)
    }

    pub fn backend_container(&self) -> String {
        match self.stack.service(&self.stack.backend_service) {
            Some(service) => self.stack.container_name(service),
            None => format!("{}-{}-1", self.stack.project, self.stack.backend_service),
        }
    }

    /// Last observed backend state, for error reports.
    pub fn observed_backend(&self) -> String {
        match &self.backend_state {
            Some(state) => state.to_string(),
            None => "backend state unknown".to_string(),
        }
    }
}
