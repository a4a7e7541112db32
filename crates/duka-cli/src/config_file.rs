//! Persistent CLI configuration.
//!
//! Values in the file are overridden by `DUKA_*` environment variables, which
//! `.env` may populate.

use std::path::{Path, PathBuf};

use duka_core::util::normalize_text_option;
use duka_core::{RemoteConfig, SyncConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const ENV_CONFIG_PATH: &str = "DUKA_CONFIG";
const ENV_DB_PATH: &str = "DUKA_DB_PATH";
const ENV_API_URL: &str = "DUKA_API_URL";
const ENV_API_TOKEN: &str = "DUKA_API_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncConfig,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    if let Some(path) = normalize_text_option(std::env::var(ENV_CONFIG_PATH).ok()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("duka").join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

impl CliConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Database path from the environment, then the file.
    pub fn db_path(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        normalize_text_option(lookup(ENV_DB_PATH))
            .map(PathBuf::from)
            .or_else(|| self.db_path.clone())
    }

    /// Server endpoint, `Ok(None)` when neither environment nor file name one.
    pub fn remote_config(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> duka_core::Result<Option<RemoteConfig>> {
        let Some(url) = normalize_text_option(lookup(ENV_API_URL)).or_else(|| self.api_url.clone())
        else {
            return Ok(None);
        };
        let token = normalize_text_option(lookup(ENV_API_TOKEN)).or_else(|| self.api_token.clone());
        RemoteConfig::new(url, token).map(Some)
    }

    /// File settings with `DUKA_SYNC_*` overrides applied, validated.
    pub fn sync_config(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> duka_core::Result<SyncConfig> {
        let mut config = self.sync.clone();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        self.api_url = normalize_text_option(self.api_url.take());
        self.api_token = normalize_text_option(self.api_token.take());
        self.db_path = self
            .db_path
            .take()
            .filter(|path| !path.as_os_str().is_empty());
    }
}

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
