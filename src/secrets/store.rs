//! Local durable store for bootstrap-only material.
//!
//! Layout under the configured secrets directory:
//!
//! ```text
//! <secrets_dir>/
//!   vault_unseal_key            single line, mode 0600
//!   vault_root_token            single line, mode 0600
//!   service_creds/<service>.json  {"role_id": "...", "secret_id": "..."}
//! ```
//!
//! Nothing in this directory is ever published to a distribution target.
//! Writes go to a temporary file in the same directory and are renamed into
//! place, so an interrupted write never leaves a file that passes an
//! existence check.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::{Result, SecretsError};
use super::types::{CredentialFile, SecretString, ServiceCredential, UnsealMaterial};

pub const UNSEAL_KEY_FILE: &str = "vault_unseal_key";
pub const ROOT_TOKEN_FILE: &str = "vault_root_token";
pub const CREDENTIALS_DIR: &str = "service_creds";

#[derive(Debug, Clone)]
pub struct BootstrapStore {
    root: PathBuf,
}

impl BootstrapStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unseal_key_path(&self) -> PathBuf {
        self.root.join(UNSEAL_KEY_FILE)
    }

    pub fn root_token_path(&self) -> PathBuf {
        self.root.join(ROOT_TOKEN_FILE)
    }

    pub fn credential_path(&self, service: &str) -> Result<PathBuf> {
        validate_service_name(service)?;
        Ok(self.root.join(CREDENTIALS_DIR).join(format!("{}.json", service)))
    }

    /// Persist freshly generated unseal material. Must complete before the
    /// backend is used for anything else.
    pub fn save_unseal_material(&self, material: &UnsealMaterial) -> Result<()> {
        write_atomic(&self.unseal_key_path(), material.unseal_key.expose_secret().as_bytes())?;
        write_atomic(&self.root_token_path(), material.root_token.expose_secret().as_bytes())?;
        tracing::info!(dir = %self.root.display(), "Unseal material persisted");
        Ok(())
    }

    pub fn load_unseal_key(&self) -> Result<Option<SecretString>> {
        read_single_line(&self.unseal_key_path())
    }

    pub fn load_root_token(&self) -> Result<Option<SecretString>> {
        read_single_line(&self.root_token_path())
    }

    pub fn load_unseal_material(&self) -> Result<Option<UnsealMaterial>> {
        match (self.load_unseal_key()?, self.load_root_token()?) {
            (Some(unseal_key), Some(root_token)) => {
                Ok(Some(UnsealMaterial { unseal_key, root_token }))
            }
            _ => Ok(None),
        }
    }

    /// Read a stored credential. A file that cannot be parsed is reported as
    /// absent so the provisioner regenerates it.
    pub fn load_credential(&self, service: &str) -> Result<Option<ServiceCredential>> {
        let path = self.credential_path(service)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<CredentialFile>(&contents) {
            Ok(file) if !file.role_id.is_empty() && !file.secret_id.is_empty() => {
                Ok(Some(ServiceCredential::from_file(service, file)))
            }
            Ok(_) => {
                tracing::warn!(service = %service, path = %path.display(), "Credential file has empty fields");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(service = %service, path = %path.display(), error = %e, "Credential file is corrupt");
                Ok(None)
            }
        }
    }

    pub fn save_credential(&self, credential: &ServiceCredential) -> Result<()> {
        let path = self.credential_path(&credential.service_name)?;
        let body = serde_json::to_vec_pretty(&credential.to_file())?;
        write_atomic(&path, &body)?;
        tracing::debug!(service = %credential.service_name, "Credential persisted");
        Ok(())
    }

    pub fn remove_credential(&self, service: &str) -> Result<bool> {
        let path = self.credential_path(service)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

pub(crate) fn validate_service_name(service: &str) -> Result<()> {
    let valid = !service.is_empty()
        && service != "."
        && service != ".."
        && service.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(SecretsError::invalid_path(service, "service names may only contain [A-Za-z0-9._-]"))
    }
}

fn read_single_line(path: &Path) -> Result<Option<SecretString>> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let value = contents.trim();
            if value.is_empty() {
                tracing::warn!(path = %path.display(), "Ignoring empty secret file");
                Ok(None)
            } else {
                Ok(Some(SecretString::new(value)))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write `contents` to `path` with owner-only permissions via temp file + rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => return Err(SecretsError::invalid_path(path.display().to_string(), "no parent directory")),
    };
    fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    set_owner_only(file.path(), 0o600)?;
    file.persist(path).map_err(|e| SecretsError::IoError(e.error))?;
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_owner_only(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_owner_only(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn material() -> UnsealMaterial {
        UnsealMaterial {
            unseal_key: SecretString::new("unseal-key"),
            root_token: SecretString::new("hvs.root"),
        }
    }

    #[test]
    fn test_unseal_material_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::new(dir.path());

        assert!(store.load_unseal_material().unwrap().is_none());
        store.save_unseal_material(&material()).unwrap();

        let loaded = store.load_unseal_material().unwrap().unwrap();
        assert_eq!(loaded, material());
        assert_eq!(fs::read_to_string(store.unseal_key_path()).unwrap(), "unseal-key");
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::new(dir.path());
        store.save_unseal_material(&material()).unwrap();
        store.save_credential(&ServiceCredential::new("gofr-np", "role", "secret")).unwrap();

        for path in [store.unseal_key_path(), store.credential_path("gofr-np").unwrap()] {
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600, "{}", path.display());
        }
    }

    #[test]
    fn test_credential_roundtrip_and_layout() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::new(dir.path());
        let credential = ServiceCredential::new("gofr-np", "role-1", "secret-1");

        store.save_credential(&credential).unwrap();

        let path = dir.path().join("service_creds").join("gofr-np.json");
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "role_id": "role-1", "secret_id": "secret-1" }));
        assert_eq!(store.load_credential("gofr-np").unwrap(), Some(credential));
    }

    #[test]
    fn test_corrupt_credential_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::new(dir.path());
        let path = store.credential_path("gofr-np").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        assert!(store.load_credential("gofr-np").unwrap().is_none());
    }

    #[test]
    fn test_empty_unseal_key_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::new(dir.path());
        fs::write(store.unseal_key_path(), "\n").unwrap();

        assert!(store.load_unseal_key().unwrap().is_none());
    }

    #[test]
    fn test_service_name_validation() {
        let store = BootstrapStore::new("/tmp/unused");
        assert!(store.credential_path("gofr-np").is_ok());
        assert!(store.credential_path("../etc/passwd").is_err());
        assert!(store.credential_path("..").is_err());
        assert!(store.credential_path("").is_err());
    }

    #[test]
    fn test_remove_credential() {
        let dir = TempDir::new().unwrap();
        let store = BootstrapStore::new(dir.path());
        store.save_credential(&ServiceCredential::new("gofr-np", "r", "s")).unwrap();

        assert!(store.remove_credential("gofr-np").unwrap());
        assert!(!store.remove_credential("gofr-np").unwrap());
    }
}
