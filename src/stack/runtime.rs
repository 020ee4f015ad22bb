//! Port for the container engine.
//!
//! [`ContainerRuntime`] is deliberately narrow: image, network and volume
//! presence, compose-driven service start/stop, container inspection, logs,
//! exec, and whole-volume content replacement. Retry and ordering policy live
//! in the controller and health poller, never here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The engine CLI or daemon is not available
    #[error("container engine unavailable: {message}")]
    EngineUnavailable { message: String },

    /// An engine command exited unsuccessfully
    #[error("command failed: {command} - {message}")]
    CommandFailed { command: String, message: String },

    /// An engine command exceeded its time budget
    #[error("command timed out: {command} after {duration_ms}ms")]
    Timeout { command: String, duration_ms: u64 },

    /// Engine output could not be interpreted
    #[error("unexpected engine output from {command}: {message}")]
    Parse { command: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed { command: command.into(), message: message.into() }
    }

    pub fn engine_unavailable(message: impl Into<String>) -> Self {
        Self::EngineUnavailable { message: message.into() }
    }
}

/// Inspect-level state of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub name: String,
    /// Engine status: created, running, restarting, paused, exited, dead.
    pub status: String,
    /// Health check status when the container declares one: starting, healthy, unhealthy.
    pub health: Option<String>,
    pub exit_code: Option<i64>,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} status={}", self.name, self.status)?;
        if let Some(health) = &self.health {
            write!(f, " health={}", health)?;
        }
        if let Some(code) = self.exit_code {
            write!(f, " exit_code={}", code)?;
        }
        Ok(())
    }
}

/// Inputs for building an image when it is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub dockerfile: PathBuf,
    pub context: PathBuf,
}

/// Ownership and modes applied to published credential material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwnership {
    pub uid: u32,
    pub gid: u32,
    pub dir_mode: u32,
    pub file_mode: u32,
}

impl FileOwnership {
    /// Owner-only rwx on directories, owner-only read on files.
    pub fn service(uid: u32, gid: u32) -> Self {
        Self { uid, gid, dir_mode: 0o700, file_mode: 0o400 }
    }
}

/// A compose project the controller drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub name: String,
    pub compose_file: PathBuf,
    /// Variables interpolated into the compose file.
    pub env: Vec<(String, String)>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Engine version string; fails when the daemon does not answer.
    async fn engine_version(&self) -> RuntimeResult<String>;

    async fn image_exists(&self, tag: &str) -> RuntimeResult<bool>;
    async fn build_image(&self, tag: &str, spec: &BuildSpec) -> RuntimeResult<()>;

    async fn network_exists(&self, name: &str) -> RuntimeResult<bool>;
    async fn create_network(&self, name: &str) -> RuntimeResult<()>;

    async fn volume_exists(&self, name: &str) -> RuntimeResult<bool>;
    async fn create_volume(&self, name: &str) -> RuntimeResult<()>;
    async fn remove_volume(&self, name: &str) -> RuntimeResult<()>;

    /// Start (or recreate) one service of the project without its dependencies.
    async fn start_service(&self, project: &ComposeProject, service: &str) -> RuntimeResult<()>;

    /// Stop and remove every container of the project.
    async fn stop_project(&self, project: &ComposeProject) -> RuntimeResult<()>;

    /// `Ok(None)` when no such container exists.
    async fn inspect_container(&self, name: &str) -> RuntimeResult<Option<ContainerState>>;

    async fn container_logs(&self, name: &str, tail: u32) -> RuntimeResult<String>;

    /// Run a command inside a running container, returning its stdout.
    async fn exec(&self, container: &str, command: &[&str]) -> RuntimeResult<String>;

    /// Replace everything inside `volume` with the contents of `source`, then
    /// apply `ownership`. Nothing previously in the volume survives.
    async fn replace_volume_contents(
        &self,
        volume: &str,
        source: &Path,
        ownership: &FileOwnership,
    ) -> RuntimeResult<()>;

    /// Remove everything inside `volume`, keeping the volume itself.
    async fn clear_volume(&self, volume: &str) -> RuntimeResult<()>;
}
