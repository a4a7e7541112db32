//! Sync engine and remote API configuration.
//!
//! `SyncConfig` tunes retry, backoff and scheduling. `RemoteConfig` points
//! the HTTP client at the server. Both deserialize from JSON with every
//! field defaulted, and both accept `DUKA_*` environment overrides.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INNER_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_JITTER_MS: u64 = 250;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_AUTO_SYNC_INTERVAL_SECS: u64 = 60;

const ENV_MAX_ATTEMPTS: &str = "DUKA_SYNC_MAX_ATTEMPTS";
const ENV_INNER_RETRIES: &str = "DUKA_SYNC_INNER_RETRIES";
const ENV_BASE_DELAY_MS: &str = "DUKA_SYNC_BASE_DELAY_MS";
const ENV_MAX_DELAY_MS: &str = "DUKA_SYNC_MAX_DELAY_MS";
const ENV_JITTER_MS: &str = "DUKA_SYNC_JITTER_MS";
const ENV_REQUEST_TIMEOUT_MS: &str = "DUKA_SYNC_REQUEST_TIMEOUT_MS";
const ENV_INTERVAL_SECS: &str = "DUKA_SYNC_INTERVAL_SECS";
const ENV_API_URL: &str = "DUKA_API_URL";
const ENV_API_TOKEN: &str = "DUKA_API_TOKEN";

/// Retry, backoff and scheduling knobs for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Attempts an entry may consume across all cycles before it is discarded
    pub max_attempts: u32,
    /// Attempts per entry within a single cycle
    pub inner_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay
    pub jitter_ms: u64,
    /// Bound on every remote call
    pub request_timeout_ms: u64,
    pub auto_sync_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            inner_retries: DEFAULT_INNER_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_ms: DEFAULT_JITTER_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            auto_sync_interval_secs: DEFAULT_AUTO_SYNC_INTERVAL_SECS,
        }
    }
}

impl SyncConfig {
    /// Defaults with every `DUKA_SYNC_*` override applied, validated.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = parse_override(&lookup, ENV_MAX_ATTEMPTS)? {
            self.max_attempts = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_INNER_RETRIES)? {
            self.inner_retries = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_BASE_DELAY_MS)? {
            self.base_delay_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_MAX_DELAY_MS)? {
            self.max_delay_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_JITTER_MS)? {
            self.jitter_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_REQUEST_TIMEOUT_MS)? {
            self.request_timeout_ms = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_INTERVAL_SECS)? {
            self.auto_sync_interval_secs = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.inner_retries == 0 {
            return Err(Error::Config("inner_retries must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub const fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = normalize_text_option(lookup(key)) else {
        return Ok(None);
    };
    raw.parse()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} has invalid value '{raw}'")))
}

/// Where the server lives and how to authenticate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RemoteConfig {
    /// Build a validated configuration.
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            api_token: normalize_text_option(api_token),
        })
    }

    /// Read `DUKA_API_URL` / `DUKA_API_TOKEN`. `Ok(None)` when no URL is set.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let Some(url) = normalize_text_option(lookup(ENV_API_URL)) else {
            return Ok(None);
        };
        Self::new(url, lookup(ENV_API_TOKEN)).map(Some)
    }
}

/// Trim, require an http(s) scheme, drop trailing slashes.
pub fn normalize_base_url(raw: String) -> Result<String> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("API base URL must not be empty".into()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "API base URL must include http:// or https://".into(),
        ))
    }
}
