//! SiteFlow settings and secrets
//!
//! Flat key/value settings persisted as JSON under the platform config
//! directory, plus the `SecretBox` used to keep provider API tokens and SSH
//! private keys encrypted at rest (AES-256-GCM, random nonce per value,
//! base64 transport encoding).

pub mod error;
pub mod secrets;

pub use error::{ConfigError, Result};
pub use secrets::SecretBox;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";

/// Resolve the SiteFlow config directory, creating it if needed
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("siteflow");

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

/// Resolve the settings file path
///
/// `SITEFLOW_CONFIG_PATH` overrides the default location, mirroring how the
/// daemon is pointed at per-environment settings.
pub fn settings_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SITEFLOW_CONFIG_PATH") {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join(SETTINGS_FILE))
}

/// Flat key/value settings store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    values: HashMap<String, String>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from the resolved path; missing file yields empty
    /// settings rather than an error
    pub fn load() -> Result<Self> {
        Self::load_from(settings_path()?)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                values: HashMap::new(),
                path: Some(path),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        let mut settings: Settings = serde_json::from_str(&content)?;
        settings.path = Some(path);
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => settings_path()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Fetch and decrypt a secret stored with `set_secret`
    pub fn get_secret(&self, secrets: &SecretBox, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            Some(encrypted) => Ok(Some(secrets.decrypt(encrypted)?)),
            None => Ok(None),
        }
    }

    /// Encrypt and store a secret (API tokens, SSH private keys)
    pub fn set_secret(
        &mut self,
        secrets: &SecretBox,
        key: impl Into<String>,
        value: &str,
    ) -> Result<()> {
        self.set(key, secrets.encrypt(value)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::load_from(&path).unwrap();
        settings.set("digitalocean.region_default", "nyc3");
        settings.save().unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.get("digitalocean.region_default"), Some("nyc3"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.get("anything"), None);
    }

    #[test]
    fn test_secret_round_trip_through_settings() {
        let secrets = SecretBox::from_passphrase("unit-test-passphrase");
        let mut settings = Settings::new();

        settings
            .set_secret(&secrets, "digitalocean.api_token", "dop_v1_abc123")
            .unwrap();

        // The stored value is not the plaintext
        assert_ne!(settings.get("digitalocean.api_token"), Some("dop_v1_abc123"));

        let decrypted = settings
            .get_secret(&secrets, "digitalocean.api_token")
            .unwrap();
        assert_eq!(decrypted.as_deref(), Some("dop_v1_abc123"));
    }
}
