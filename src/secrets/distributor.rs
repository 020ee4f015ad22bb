//! Publishes service credentials into shared distribution targets.
//!
//! Material is staged in a private temporary directory first. Each target is
//! then fully cleared and refilled from the stage, so a target never holds a
//! mix of old and new files. Targets are processed independently; one failing
//! target does not stop the others. Host-directory work runs on the blocking
//! pool. Once cancelled, no further target is touched.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::store::{set_owner_only, CREDENTIALS_DIR};
use super::types::ServiceCredential;
use crate::errors::{BootstrapError, Result, Stage, TargetFailure};
use crate::stack::{ContainerRuntime, FileOwnership};

/// A shared location mounted by running service containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionTarget {
    /// Named container volume, written through a helper container.
    Volume(String),
    /// Host directory, written directly.
    Directory(PathBuf),
}

impl fmt::Display for DistributionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionTarget::Volume(name) => write!(f, "volume:{}", name),
            DistributionTarget::Directory(path) => write!(f, "dir:{}", path.display()),
        }
    }
}

/// Runtime-facing material, keyed by relative path.
///
/// Only constructible from [`ServiceCredential`] values, so unseal keys and
/// root tokens cannot end up in a target.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    files: BTreeMap<String, Vec<u8>>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle").field("paths", &self.files.keys().collect::<Vec<_>>()).finish()
    }
}

impl CredentialBundle {
    pub fn from_credentials<'a>(credentials: impl IntoIterator<Item = &'a ServiceCredential>) -> Result<Self> {
        let mut files = BTreeMap::new();
        for credential in credentials {
            let path = format!("{}/{}.json", CREDENTIALS_DIR, credential.service_name);
            validate_relative_path(&path)?;
            let body = serde_json::to_vec_pretty(&credential.to_file())?;
            files.insert(path, body);
        }
        Ok(Self { files })
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn stage_into(&self, root: &Path, ownership: &FileOwnership) -> Result<()> {
        for (relative, body) in &self.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, body)?;
            set_owner_only(&path, ownership.file_mode | 0o200)?;
        }
        Ok(())
    }
}

fn validate_relative_path(path: &str) -> Result<()> {
    let candidate = Path::new(path);
    let ok = !path.is_empty()
        && candidate.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(BootstrapError::config(format!(
            "Distribution path '{}' must be relative without '..'",
            path
        )))
    }
}

/// Targets written by a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub succeeded: Vec<String>,
    pub files: usize,
}

pub struct SecretDistributor {
    runtime: Arc<dyn ContainerRuntime>,
    ownership: FileOwnership,
    cancel: CancellationToken,
}

impl SecretDistributor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, ownership: FileOwnership) -> Self {
        Self { runtime, ownership, cancel: CancellationToken::new() }
    }

    /// Stop before the next target once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the contents of every target with `bundle`.
    ///
    /// Fails with `DistributionPartialFailure` if any target failed, listing
    /// the targets that did succeed.
    pub async fn publish(&self, bundle: &CredentialBundle, targets: &[DistributionTarget]) -> Result<PublishReport> {
        let stage = tempfile::Builder::new().prefix("gofr-secrets-stage-").tempdir()?;
        set_owner_only(stage.path(), 0o700)?;
        bundle.stage_into(stage.path(), &self.ownership)?;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        for target in targets {
            if self.cancel.is_cancelled() {
                tracing::warn!(target = %target, published = succeeded.len(), "Publishing cancelled");
                return Err(BootstrapError::cancelled(Stage::Distribution));
            }

            let result = match target {
                DistributionTarget::Volume(name) => self
                    .runtime
                    .replace_volume_contents(name, stage.path(), &self.ownership)
                    .await
                    .map_err(|e| e.to_string()),
                DistributionTarget::Directory(path) => {
                    let (path, source, ownership) = (path.clone(), stage.path().to_path_buf(), self.ownership);
                    run_blocking(move || replace_directory(&path, &source, &ownership)).await
                }
            };

            match result {
                Ok(()) => {
                    tracing::info!(target = %target, files = bundle.len(), "Credentials published");
                    succeeded.push(target.to_string());
                }
                Err(message) => {
                    tracing::error!(target = %target, error = %message, "Failed to publish credentials");
                    failed.push(TargetFailure { target: target.to_string(), message });
                }
            }
        }

        if failed.is_empty() {
            Ok(PublishReport { succeeded, files: bundle.len() })
        } else {
            Err(BootstrapError::DistributionPartialFailure { succeeded, failed })
        }
    }

    /// Remove all published material from every target, keeping the targets.
    pub async fn purge(&self, targets: &[DistributionTarget]) -> Vec<String> {
        let mut warnings = Vec::new();
        for target in targets {
            let result = match target {
                DistributionTarget::Volume(name) => {
                    self.runtime.clear_volume(name).await.map_err(|e| e.to_string())
                }
                DistributionTarget::Directory(path) => {
                    let path = path.clone();
                    run_blocking(move || clear_directory(&path)).await
                }
            };
            match result {
                Ok(()) => tracing::info!(target = %target, "Distributed secrets purged"),
                Err(message) => {
                    tracing::warn!(target = %target, error = %message, "Failed to purge target");
                    warnings.push(format!("purge {}: {}", target, message));
                }
            }
        }
        warnings
    }
}

async fn run_blocking<F>(task: F) -> std::result::Result<(), String>
where
    F: FnOnce() -> std::io::Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("filesystem task failed: {}", e)),
    }
}

fn clear_directory(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let destination = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir_all(&destination)?;
            copy_tree(&entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

fn replace_directory(target: &Path, stage: &Path, ownership: &FileOwnership) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    clear_directory(target)?;
    copy_tree(stage, target)?;
    apply_ownership(target, ownership)
}

/// Apply modes recursively, then ownership where this process may change it.
fn apply_ownership(root: &Path, ownership: &FileOwnership) -> std::io::Result<()> {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path.clone());
                set_owner_only(&path, ownership.dir_mode)?;
            } else {
                set_owner_only(&path, ownership.file_mode)?;
            }
            chown(&path, ownership)?;
        }
    }
    set_owner_only(root, ownership.dir_mode)?;
    chown(root, ownership)
}

#[cfg(unix)]
fn chown(path: &Path, ownership: &FileOwnership) -> std::io::Result<()> {
    use std::os::unix::fs::MetadataExt;

    let metadata = fs::symlink_metadata(path)?;
    if metadata.uid() == ownership.uid && metadata.gid() == ownership.gid {
        return Ok(());
    }
    match std::os::unix::fs::chown(path, Some(ownership.uid), Some(ownership.gid)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!(path = %path.display(), uid = ownership.uid, gid = ownership.gid, "Not permitted to change ownership");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn chown(_path: &Path, _ownership: &FileOwnership) -> std::io::Result<()> {
    Ok(())
}
