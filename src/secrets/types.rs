//! Secret-bearing value types shared by the backend client, the local store
//! and the distributor.
//!
//! Anything that can unlock the backend (unseal keys, root tokens, secret IDs)
//! is held in a [`SecretString`], which never prints or serializes its value.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string wrapper that redacts its contents in Debug, Display, and serialization.
///
/// - Debug output shows `SecretString([REDACTED])`
/// - Display output shows `[REDACTED]`
/// - Serialization outputs `"[REDACTED]"`; call `expose_secret()` to write the real value
/// - Memory is zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    /// Creates a new SecretString from a string value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying secret value. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString(value))
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Output of a one-time backend initialization.
///
/// Produced exactly once per backend instance. Callers must persist it before
/// issuing any other operation; it cannot be recovered from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsealMaterial {
    pub unseal_key: SecretString,
    pub root_token: SecretString,
}

/// AppRole credential pair for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredential {
    pub service_name: String,
    pub role_id: String,
    pub secret_id: SecretString,
}

impl ServiceCredential {
    pub fn new(
        service_name: impl Into<String>,
        role_id: impl Into<String>,
        secret_id: impl Into<SecretString>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            role_id: role_id.into(),
            secret_id: secret_id.into(),
        }
    }

    /// On-disk / in-volume JSON representation. This is the only place the
    /// secret ID leaves its redacting wrapper.
    pub fn to_file(&self) -> CredentialFile {
        CredentialFile {
            role_id: self.role_id.clone(),
            secret_id: self.secret_id.expose_secret().to_string(),
        }
    }

    pub fn from_file(service_name: impl Into<String>, file: CredentialFile) -> Self {
        Self::new(service_name, file.role_id, file.secret_id)
    }
}

/// Wire format of a credential file: `{"role_id": "...", "secret_id": "..."}`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialFile {
    pub role_id: String,
    pub secret_id: String,
}

impl fmt::Debug for CredentialFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialFile")
            .field("role_id", &self.role_id)
            .field("secret_id", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redacts() {
        let secret = SecretString::new("hvs.root-token");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"[REDACTED]\"");
        assert_eq!(secret.expose_secret(), "hvs.root-token");
    }

    #[test]
    fn test_unseal_material_debug_is_redacted() {
        let material = UnsealMaterial {
            unseal_key: "unseal-key-b64".into(),
            root_token: "hvs.root".into(),
        };
        let debug = format!("{:?}", material);
        assert!(!debug.contains("unseal-key-b64"));
        assert!(!debug.contains("hvs.root"));
    }

    #[test]
    fn test_credential_file_round_trip_keeps_secret_id() {
        let cred = ServiceCredential::new("gofr-np", "role-123", "secret-456");
        let json = serde_json::to_string(&cred.to_file()).unwrap();
        assert_eq!(json, r#"{"role_id":"role-123","secret_id":"secret-456"}"#);

        let parsed: CredentialFile = serde_json::from_str(&json).unwrap();
        let restored = ServiceCredential::from_file("gofr-np", parsed);
        assert_eq!(restored, cred);
    }

    #[test]
    fn test_credential_file_debug_is_redacted() {
        let file = CredentialFile { role_id: "r".into(), secret_id: "very-secret".into() };
        assert!(!format!("{:?}", file).contains("very-secret"));
    }
}
