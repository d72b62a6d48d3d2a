use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::retry::RetryPolicy;

/// Retry defaults (optional `[retry]` section in config.toml). The
/// force-fail predicate is code, not config, so it is absent here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay in seconds before a timed retry (e.g. 0.5 = 500ms).
    pub break_time_secs: f64,
    /// Inclusive ceiling on retry attempts (0 = no retries).
    pub max_retry_count: u32,
    /// Whether retries may proceed while the process is backgrounded.
    #[serde(default = "default_true")]
    pub enable_background_retry: bool,
    /// Fail immediately instead of queuing when reachability is down.
    #[serde(default)]
    pub fail_when_not_reachable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            break_time_secs: 5.0,
            max_retry_count: 5,
            enable_background_retry: true,
            fail_when_not_reachable: false,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            break_time: Duration::from_secs_f64(self.break_time_secs.max(0.0)),
            max_retry_count: self.max_retry_count,
            enable_background_retry: self.enable_background_retry,
            fail_when_not_reachable: self.fail_when_not_reachable,
            fail_on_error: None,
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Base URL request paths are joined against.
    pub base_url: Url,
    /// Fixed per-call transport timeout in seconds, independent of any
    /// retry delay. A timeout classifies like any other failure.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional retry defaults; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_request_timeout_secs() -> u64 {
    20
}

impl DispatchConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout_secs: default_request_timeout_secs(),
            retry: None,
        }
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry policy from the `[retry]` section, or the built-in defaults.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }
}
