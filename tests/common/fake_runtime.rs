//! In-memory container engine.
//!
//! Started services come up `running`/`healthy` unless a state is scripted for
//! them. Volume contents are modeled as a map of relative path to bytes so
//! distribution tests can assert exactly what a volume holds.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use gofr_bootstrap::stack::{
    BuildSpec, ComposeProject, ContainerRuntime, ContainerState, FileOwnership, RuntimeError, RuntimeResult,
};

pub type VolumeContents = BTreeMap<String, Vec<u8>>;

#[derive(Debug)]
pub struct RuntimeState {
    pub engine_available: bool,
    pub images: BTreeSet<String>,
    pub networks: BTreeSet<String>,
    pub volumes: BTreeMap<String, VolumeContents>,
    pub containers: BTreeMap<String, ContainerState>,
    /// Service name → state a started container takes.
    pub scripted: BTreeMap<String, (String, Option<String>)>,
    /// Services whose start command fails.
    pub failing_starts: BTreeSet<String>,
    /// Volumes whose writes fail.
    pub failing_volumes: BTreeSet<String>,
    pub logs: BTreeMap<String, String>,
    pub builds: u32,
    pub calls: Vec<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            engine_available: true,
            images: BTreeSet::new(),
            networks: BTreeSet::new(),
            volumes: BTreeMap::new(),
            containers: BTreeMap::new(),
            scripted: BTreeMap::new(),
            failing_starts: BTreeSet::new(),
            failing_volumes: BTreeSet::new(),
            logs: BTreeMap::new(),
            builds: 0,
            calls: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().expect("fake runtime lock")
    }

    /// Containers of `service` start with this engine status and health.
    pub fn script(&self, service: &str, status: &str, health: Option<&str>) {
        self.state().scripted.insert(service.to_string(), (status.to_string(), health.map(str::to_string)));
    }

    pub fn set_logs(&self, container: &str, logs: &str) {
        self.state().logs.insert(container.to_string(), logs.to_string());
    }

    pub fn volume(&self, name: &str) -> Option<VolumeContents> {
        self.state().volumes.get(name).cloned()
    }

    pub fn started(&self) -> Vec<String> {
        self.state().calls.iter().filter_map(|c| c.strip_prefix("start ").map(str::to_string)).collect()
    }

    fn record(&self, call: String) -> MutexGuard<'_, RuntimeState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

fn read_tree(root: &Path, dir: &Path, into: &mut VolumeContents) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            read_tree(root, &path, into)?;
        } else {
            let relative = path.strip_prefix(root).map_err(|e| std::io::Error::other(e.to_string()))?;
            into.insert(relative.to_string_lossy().into_owned(), std::fs::read(&path)?);
        }
    }
    Ok(())
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn engine_version(&self) -> RuntimeResult<String> {
        if self.state().engine_available {
            Ok("27.0.3".to_string())
        } else {
            Err(RuntimeError::engine_unavailable("Cannot connect to the Docker daemon"))
        }
    }

    async fn image_exists(&self, tag: &str) -> RuntimeResult<bool> {
        Ok(self.state().images.contains(tag))
    }

    async fn build_image(&self, tag: &str, _spec: &BuildSpec) -> RuntimeResult<()> {
        let mut state = self.record(format!("build {}", tag));
        state.builds += 1;
        state.images.insert(tag.to_string());
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> RuntimeResult<bool> {
        Ok(self.state().networks.contains(name))
    }

    async fn create_network(&self, name: &str) -> RuntimeResult<()> {
        self.record(format!("network {}", name)).networks.insert(name.to_string());
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> RuntimeResult<bool> {
        Ok(self.state().volumes.contains_key(name))
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<()> {
        self.record(format!("volume {}", name)).volumes.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> RuntimeResult<()> {
        self.record(format!("remove-volume {}", name)).volumes.remove(name);
        Ok(())
    }

    async fn start_service(&self, project: &ComposeProject, service: &str) -> RuntimeResult<()> {
        let mut state = self.record(format!("start {}", service));
        if state.failing_starts.contains(service) {
            return Err(RuntimeError::command_failed(
                format!("docker compose up {}", service),
                "container exited with code 1",
            ));
        }
        let name = format!("{}-{}-1", project.name, service);
        let (status, health) =
            state.scripted.get(service).cloned().unwrap_or_else(|| ("running".to_string(), Some("healthy".to_string())));
        let exit_code = if status == "exited" { Some(1) } else { None };
        state.containers.insert(name.clone(), ContainerState { name, status, health, exit_code });
        Ok(())
    }

    async fn stop_project(&self, project: &ComposeProject) -> RuntimeResult<()> {
        let prefix = format!("{}-", project.name);
        let mut state = self.record(format!("down {}", project.name));
        state.containers.retain(|name, _| !name.starts_with(&prefix));
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> RuntimeResult<Option<ContainerState>> {
        Ok(self.state().containers.get(name).cloned())
    }

    async fn container_logs(&self, name: &str, _tail: u32) -> RuntimeResult<String> {
        Ok(self.state().logs.get(name).cloned().unwrap_or_default())
    }

    async fn exec(&self, container: &str, command: &[&str]) -> RuntimeResult<String> {
        self.record(format!("exec {} {}", container, command.join(" ")));
        Ok("Sealed          false".to_string())
    }

    async fn replace_volume_contents(
        &self,
        volume: &str,
        source: &Path,
        _ownership: &FileOwnership,
    ) -> RuntimeResult<()> {
        if self.state().failing_volumes.contains(volume) {
            return Err(RuntimeError::command_failed(format!("docker run -v {}:/target", volume), "permission denied"));
        }
        let mut contents = VolumeContents::new();
        read_tree(source, source, &mut contents)?;
        self.record(format!("replace {}", volume)).volumes.insert(volume.to_string(), contents);
        Ok(())
    }

    async fn clear_volume(&self, volume: &str) -> RuntimeResult<()> {
        let mut state = self.record(format!("clear {}", volume));
        if let Some(contents) = state.volumes.get_mut(volume) {
            contents.clear();
        }
        Ok(())
    }
}
