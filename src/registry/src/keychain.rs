//! Credential resolution capability.
//!
//! The engine never reads credential files or environment variables. Every
//! fetch and relocation receives a [`Keychain`] from the caller and asks it
//! for the credentials of one registry host at a time.

use std::collections::HashMap;

use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Anonymous access (no credentials).
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub(crate) fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// Resolves credentials for a registry host.
pub trait Keychain: Send + Sync {
    fn resolve(&self, registry: &str) -> RegistryAuth;
}

/// Keychain that never has credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousKeychain;

impl Keychain for AnonymousKeychain {
    fn resolve(&self, _registry: &str) -> RegistryAuth {
        RegistryAuth::anonymous()
    }
}

/// Keychain backed by an explicit host → credentials map.
#[derive(Debug, Clone, Default)]
pub struct StaticKeychain {
    entries: HashMap<String, RegistryAuth>,
}

impl StaticKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add credentials for `registry`, replacing any existing entry.
    pub fn with(mut self, registry: &str, auth: RegistryAuth) -> Self {
        self.entries.insert(normalize_registry(registry), auth);
        self
    }
}

impl Keychain for StaticKeychain {
    fn resolve(&self, registry: &str) -> RegistryAuth {
        self.entries
            .get(&normalize_registry(registry))
            .cloned()
            .unwrap_or_default()
    }
}

/// Normalize registry names (e.g., "docker.io" and "index.docker.io" → "index.docker.io").
pub fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    if r == "docker.io" || r == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        r
    }
}
