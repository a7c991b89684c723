//! Persistent credential store for container registries.
//!
//! Stores per-registry credentials at `~/.kp/auth/credentials.json` and
//! falls back to `REGISTRY_USERNAME`/`REGISTRY_PASSWORD` for registries
//! without a stored entry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use kp_core::error::{KpError, Result};
use kp_registry::keychain::normalize_registry;
use kp_registry::{Keychain, RegistryAuth};
use serde::{Deserialize, Serialize};

/// Environment variable holding the fallback registry username.
pub const USERNAME_ENV: &str = "REGISTRY_USERNAME";

/// Environment variable holding the fallback registry password.
pub const PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialEntry {
    username: String,
    password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    registries: BTreeMap<String, CredentialEntry>,
}

/// Credential store backed by a JSON file.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store at `~/.kp/auth/credentials.json`.
    pub fn default_path() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            KpError::ConfigurationError(
                "Cannot determine home directory for credential store".to_string(),
            )
        })?;
        Ok(Self {
            path: home.join(".kp").join("auth").join("credentials.json"),
        })
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store credentials for a registry, replacing any existing entry.
    pub fn store(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        let mut file = self.load()?;
        file.registries.insert(
            normalize_registry(registry),
            CredentialEntry {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        self.save(&file)
    }

    /// Get `(username, password)` for a registry.
    pub fn get(&self, registry: &str) -> Result<Option<(String, String)>> {
        let file = self.load()?;
        Ok(file
            .registries
            .get(&normalize_registry(registry))
            .map(|e| (e.username.clone(), e.password.clone())))
    }

    /// Remove credentials for a registry. Returns true if an entry existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let mut file = self.load()?;
        let removed = file
            .registries
            .remove(&normalize_registry(registry))
            .is_some();
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data).map_err(|e| {
            KpError::ConfigurationError(format!(
                "Failed to parse credential store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(file)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Keychain resolving from a [`CredentialStore`], then the environment.
pub struct StoreKeychain {
    store: CredentialStore,
    env_fallback: Option<RegistryAuth>,
}

impl StoreKeychain {
    pub fn new(store: CredentialStore) -> Self {
        let env_fallback = match (std::env::var(USERNAME_ENV), std::env::var(PASSWORD_ENV)) {
            (Ok(u), Ok(p)) if !u.is_empty() => Some(RegistryAuth::basic(u, p)),
            _ => None,
        };
        Self {
            store,
            env_fallback,
        }
    }

    #[cfg(test)]
    fn with_env_fallback(mut self, auth: Option<RegistryAuth>) -> Self {
        self.env_fallback = auth;
        self
    }
}

impl Keychain for StoreKeychain {
    fn resolve(&self, registry: &str) -> RegistryAuth {
        match self.store.get(registry) {
            Ok(Some((username, password))) => return RegistryAuth::basic(username, password),
            Ok(None) => {}
            Err(e) => tracing::warn!(registry, error = %e, "Ignoring unreadable credential store"),
        }
        self.env_fallback.clone().unwrap_or_default()
    }
}
