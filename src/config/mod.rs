use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::MAX_RULE_PAGE;
use crate::error::{IomError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.crowdstrike.com";

/// Top-level configuration from `.iomctl.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Rules requested per page (the backend caps this at 500).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on rules fetched across all pages.
    #[serde(default = "default_max_total")]
    pub max_total: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    MAX_RULE_PAGE
}

fn default_max_total() -> usize {
    5000
}

fn default_workers() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_total: default_max_total(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pagination.page_size == 0 || self.pagination.page_size > MAX_RULE_PAGE {
            return Err(IomError::Config(format!(
                "pagination.page_size must be between 1 and {MAX_RULE_PAGE}, got {}",
                self.pagination.page_size
            )));
        }
        if self.probe.workers == 0 {
            return Err(IomError::Config("probe.workers must be at least 1".into()));
        }
        if self.probe.max_attempts == 0 {
            return Err(IomError::Config(
                "probe.max_attempts must be at least 1".into(),
            ));
        }
        url::Url::parse(&self.api.base_url).map_err(|e| {
            IomError::Config(format!("api.base_url '{}' is invalid: {e}", self.api.base_url))
        })?;
        Ok(())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# iomctl configuration
# Credentials are read from FALCON_CLIENT_ID / FALCON_CLIENT_SECRET.

[api]
# base_url = "https://api.crowdstrike.com"
timeout_secs = 30

[pagination]
# Rules per page (maximum 500).
page_size = 500
# Maximum number of rules fetched by deploy-all / export-all.
max_total = 5000

[probe]
# Concurrent support probes.
workers = 10
# Attempts per probe, including the first (transient errors only).
max_attempts = 2
base_delay_ms = 500
"#
    }
}
