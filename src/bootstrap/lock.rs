//! Single-writer guard for a bootstrap run.
//!
//! Distribution targets are shared across invocations, so only one `up` or
//! `down` may run against a secrets directory at a time. The guard holds an
//! exclusive advisory lock on `.bootstrap.lock`; the OS releases it when the
//! handle closes, including when the process is killed.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::errors::{BootstrapError, Result};

pub const LOCK_FILE: &str = ".bootstrap.lock";

#[derive(Debug)]
pub struct BootstrapLock {
    path: PathBuf,
    file: File,
}

impl BootstrapLock {
    pub fn acquire(secrets_dir: &Path) -> Result<Self> {
        fs::create_dir_all(secrets_dir).map_err(|e| {
            BootstrapError::io(format!("Failed to create {}", secrets_dir.display()), e)
        })?;

        let path = secrets_dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| BootstrapError::io(format!("Failed to open {}", path.display()), e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                return Err(BootstrapError::prerequisite(
                    format!("exclusive bootstrap lock ({} held: {})", path.display(), holder.trim()),
                    format!("Wait for the other bootstrap run using {} to finish", path.display()),
                ));
            }
            Err(e) => {
                return Err(BootstrapError::io(format!("Failed to lock {}", path.display()), e));
            }
        }

        // Holder pid is informational only
        let _ = file
            .set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "pid={}", std::process::id()));

        tracing::debug!(path = %path.display(), "Bootstrap lock acquired");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BootstrapLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release bootstrap lock");
        }
    }
}
