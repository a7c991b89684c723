//! kp configuration file.
//!
//! Stored at `~/.kp/config.json` (or `$KP_CONFIG`). Uses atomic writes
//! (write tmp, rename) like the credential store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KpError, Result};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "KP_CONFIG";

/// kp configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpConfig {
    /// Canonical repository artifacts are relocated into
    pub default_repository: Option<String>,

    /// Service account that pulls from the canonical repository
    pub default_service_account: Option<String>,

    /// Registry connection options
    pub registry: RegistryOptions,
}

/// Registry connection options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    /// PEM file with an extra CA certificate to trust
    pub ca_cert_path: Option<PathBuf>,

    /// Verify registry TLS certificates
    pub verify_certs: bool,

    /// Registries reached over plain HTTP
    pub insecure_registries: Vec<String>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            ca_cert_path: None,
            verify_certs: true,
            insecure_registries: Vec::new(),
        }
    }
}

impl KpConfig {
    /// Default config file path: `$KP_CONFIG`, else `~/.kp/config.json`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let home = dirs::home_dir().ok_or_else(|| {
            KpError::ConfigurationError("Cannot determine home directory for kp config".to_string())
        })?;
        Ok(home.join(".kp").join("config.json"))
    }

    /// Load the config from `path`. Returns defaults if the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|e| {
            KpError::ConfigurationError(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            KpError::ConfigurationError(format!(
                "Failed to parse config {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Save the config to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp_path, path)?;
        tracing::debug!(path = %path.display(), "Saved kp config");
        Ok(())
    }

    /// The canonical repository, or a configuration error telling the user how to set it.
    pub fn require_default_repository(&self) -> Result<&str> {
        match self.default_repository.as_deref() {
            Some(repo) if !repo.trim().is_empty() => Ok(repo),
            _ => Err(KpError::ConfigurationError(
                "failed to get default repository: use \"kp config default-repository\" to set"
                    .to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = KpConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, KpConfig::default());
        assert!(config.registry.verify_certs);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = KpConfig {
            default_repository: Some("kpackcr.org/somepath".to_string()),
            default_service_account: Some("kp-sa".to_string()),
            registry: RegistryOptions {
                ca_cert_path: Some(PathBuf::from("/etc/ca.pem")),
                verify_certs: false,
                insecure_registries: vec!["localhost:5000".to_string()],
            },
        };
        config.save(&path).unwrap();

        let loaded = KpConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"default_repository":"r.io/x"}"#).unwrap();

        let config = KpConfig::load(&path).unwrap();
        assert_eq!(config.default_repository.as_deref(), Some("r.io/x"));
        assert!(config.registry.verify_certs);
    }

    #[test]
    fn test_corrupt_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let err = KpConfig::load(&path).unwrap_err();
        assert!(matches!(err, KpError::ConfigurationError(_)));
    }

    #[test]
    fn test_require_default_repository() {
        let mut config = KpConfig::default();
        let err = config.require_default_repository().unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to get default repository: use \"kp config default-repository\" to set"
        );

        config.default_repository = Some("   ".to_string());
        assert!(config.require_default_repository().is_err());

        config.default_repository = Some("kpackcr.org/somepath".to_string());
        assert_eq!(
            config.require_default_repository().unwrap(),
            "kpackcr.org/somepath"
        );
    }
}
