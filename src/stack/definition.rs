//! Declarative stack definition: services, dependency edges, network and volumes.
//!
//! Loaded from YAML when `stack.stack_file` is set, otherwise derived from the
//! configuration with the default topology:
//!
//! ```text
//! vault ◄── mcp ◄── mcpo
//!            ▲
//!            └───── web
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::BootstrapConfig;
use crate::errors::{BootstrapError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    /// Image tag; `None` when the compose file pins it.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether the service declares a health check. Services without one are
    /// healthy as soon as they are running.
    #[serde(default)]
    pub healthcheck: bool,
    /// Overrides the compose-generated `<project>-<service>-1` name.
    #[serde(default)]
    pub container_name: Option<String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            depends_on: Vec::new(),
            healthcheck: true,
            container_name: None,
        }
    }

    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.push(service.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn without_healthcheck(mut self) -> Self {
        self.healthcheck = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    pub project: String,
    pub network: String,
    /// The secret backend service; started and unsealed before all others.
    pub backend_service: String,
    pub services: Vec<ServiceDefinition>,
    /// Volumes owned by this stack, removed by `down --purge-volumes`.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Cross-project volumes; created if absent, never removed.
    #[serde(default)]
    pub shared_volumes: Vec<String>,
}

impl StackDefinition {
    /// Built-in topology for the gofr-np stack.
    pub fn default_for(config: &BootstrapConfig) -> Self {
        let backend = config.vault.service_name.clone();
        let image = config.stack.image_tag.clone();
        Self {
            project: config.project_name.clone(),
            network: config.stack.network.clone(),
            backend_service: backend.clone(),
            services: vec![
                ServiceDefinition::new(&backend),
                ServiceDefinition::new("mcp").image(&image).depends_on(&backend),
                ServiceDefinition::new("mcpo").image(&image).depends_on("mcp"),
                ServiceDefinition::new("web").image(&image).depends_on("mcp"),
            ],
            volumes: vec![format!("{}-vault-data", config.project_name)],
            shared_volumes: config.stack.shared_volumes.clone(),
        }
    }

    /// The configured YAML stack file, or the built-in default.
    pub fn resolve(config: &BootstrapConfig) -> Result<Self> {
        match &config.stack.stack_file {
            Some(path) => Self::load(path),
            None => {
                let stack = Self::default_for(config);
                stack.validate()?;
                Ok(stack)
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BootstrapError::io(format!("Failed to read stack file {}", path.display()), e))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let stack: Self = serde_yaml::from_str(contents).map_err(|e| {
            BootstrapError::config_with_source("Invalid stack definition", Box::new(e))
        })?;
        stack.validate()?;
        Ok(stack)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(BootstrapError::config(format!("Duplicate service '{}'", service.name)));
            }
        }
        for service in &self.services {
            for dep in &service.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(BootstrapError::config(format!(
                        "Service '{}' depends on unknown service '{}'",
                        service.name, dep
                    )));
                }
            }
        }
        if !seen.contains(self.backend_service.as_str()) {
            return Err(BootstrapError::config(format!(
                "Backend service '{}' is not declared",
                self.backend_service
            )));
        }
        if let Some(volume) = self.volumes.iter().find(|v| self.shared_volumes.contains(v)) {
            return Err(BootstrapError::config(format!(
                "Volume '{}' cannot be both stack-owned and shared",
                volume
            )));
        }
        self.topological_order().map(|_| ())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn container_name(&self, service: &ServiceDefinition) -> String {
        service
            .container_name
            .clone()
            .unwrap_or_else(|| format!("{}-{}-1", self.project, service.name))
    }

    /// Services ordered so every dependency precedes its dependents. Ties keep
    /// declaration order. Fails on a cycle.
    pub fn topological_order(&self) -> Result<Vec<&ServiceDefinition>> {
        let mut remaining: HashMap<&str, usize> = self
            .services
            .iter()
            .map(|s| (s.name.as_str(), s.depends_on.iter().collect::<HashSet<_>>().len()))
            .collect();
        let mut ordered: Vec<&ServiceDefinition> = Vec::with_capacity(self.services.len());
        let mut placed: HashSet<&str> = HashSet::new();

        while ordered.len() < self.services.len() {
            let next = self
                .services
                .iter()
                .find(|s| !placed.contains(s.name.as_str()) && remaining.get(s.name.as_str()) == Some(&0));

            let Some(service) = next else {
                let stuck: Vec<&str> = self
                    .services
                    .iter()
                    .map(|s| s.name.as_str())
                    .filter(|name| !placed.contains(name))
                    .collect();
                return Err(BootstrapError::config(format!(
                    "Dependency cycle among services: {}",
                    stuck.join(", ")
                )));
            };

            placed.insert(service.name.as_str());
            ordered.push(service);
            for dependent in &self.services {
                if dependent.depends_on.iter().any(|d| d == &service.name) {
                    if let Some(count) = remaining.get_mut(dependent.name.as_str()) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }

        Ok(ordered)
    }

    /// Everything except the backend, in start order.
    pub fn application_services(&self) -> Result<Vec<&ServiceDefinition>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .filter(|s| s.name != self.backend_service)
            .collect())
    }
}
