use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::logging::LogLevel;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_ENDPOINT_PREFIX: &str = "/json";

const ENV_BASE_URL: &str = "CONTRACT_BASE_URL";
const ENV_ENDPOINT_PREFIX: &str = "CONTRACT_ENDPOINT_PREFIX";
const ENV_TIMEOUT: &str = "CONTRACT_TIMEOUT";
const ENV_LOG_LEVEL: &str = "CONTRACT_LOG_LEVEL";
const ENV_PERMISSIONS: &str = "CONTRACT_PERMISSIONS";

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub base_url: Url,
    /// Endpoints outside this prefix are refused.
    pub endpoint_prefix: String,
    /// Per-request bound applied by the HTTP client; `None` waits forever.
    pub timeout: Option<Duration>,
    pub log_level: LogLevel,
    pub permissions: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL parses"),
            endpoint_prefix: DEFAULT_ENDPOINT_PREFIX.to_string(),
            timeout: None,
            log_level: LogLevel::Info,
            permissions: Vec::new(),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();
        if let Some(url) = get(ENV_BASE_URL) {
            config.set_base_url(&url)?;
        }
        if let Some(prefix) = get(ENV_ENDPOINT_PREFIX) {
            config.endpoint_prefix = prefix;
        }
        if let Some(timeout) = get(ENV_TIMEOUT) {
            config.set_timeout(&timeout)?;
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            config.log_level = level
                .parse()
                .with_context(|| format!("invalid {ENV_LOG_LEVEL}"))?;
        }
        if let Some(names) = get(ENV_PERMISSIONS) {
            config.permissions = split_names(&names);
        }
        Ok(config)
    }

    pub fn set_base_url(&mut self, raw: &str) -> Result<()> {
        let url = Url::parse(raw).with_context(|| format!("invalid base URL: {raw}"))?;
        if url.cannot_be_a_base() {
            return Err(anyhow!("base URL cannot have paths joined to it: {raw}"));
        }
        self.base_url = url;
        Ok(())
    }

    pub fn set_timeout(&mut self, raw: &str) -> Result<()> {
        let duration =
            humantime::parse_duration(raw).with_context(|| format!("invalid timeout: {raw}"))?;
        self.timeout = Some(duration);
        Ok(())
    }
}

/// Comma separated, trimmed, blanks dropped. Order and duplicates are kept
/// so that schema generation can reject the duplicates.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
