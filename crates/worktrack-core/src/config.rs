//! Client configuration.
//!
//! Loaded from `~/.config/worktrack/config.json` when present, with
//! environment overrides applied on top. Only connection settings live
//! here; credentials are never written to disk.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::DEFAULT_EXPIRY_SKEW_SECS;

/// Application name used for the config directory path
const APP_NAME: &str = "worktrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const ENV_API_URL: &str = "WORKTRACK_API_URL";

/// Environment variable overriding the expiry skew
pub const ENV_EXPIRY_SKEW_SECS: &str = "WORKTRACK_EXPIRY_SKEW_SECS";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a renewal call; a renewal that never settles would
/// otherwise block every queued request.
const DEFAULT_RENEWAL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub renewal_timeout_secs: u64,
    pub expiry_skew_secs: i64,
    /// Renew before sending when the stored access credential is already
    /// inside the skew window, instead of waiting for the 401.
    pub preemptive_renewal: bool,
    pub login_path: String,
    pub signup_path: String,
    pub refresh_path: String,
    pub logout_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            renewal_timeout_secs: DEFAULT_RENEWAL_TIMEOUT_SECS,
            expiry_skew_secs: DEFAULT_EXPIRY_SKEW_SECS,
            preemptive_renewal: false,
            login_path: "/api/auth/login".to_string(),
            signup_path: "/api/auth/signup".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
        }
    }
}

impl Config {
    /// Load from the config file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_json(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_EXPIRY_SKEW_SECS) {
            match raw.trim().parse::<i64>() {
                Ok(skew) if skew >= 0 => self.expiry_skew_secs = skew,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_EXPIRY_SKEW_SECS),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
