use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Public bearer token used by the web client for cookie-authenticated calls.
pub const WEB_BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Locale tag sent with every request, e.g. `en-US`.
    pub locale: String,

    /// Base URL of the GraphQL endpoints.
    pub api_url: String,

    pub bearer_token: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    pub retry: RetryConfig,

    pub rate_limit: RateLimitConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            api_url: "https://x.com/i/api/graphql".to_string(),
            bearer_token: WEB_BEARER_TOKEN.to_string(),
            timeout_secs: 30,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> ClientResult<Self> {
        toml::from_str(raw).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.locale.trim().is_empty() {
            return Err(ClientError::Config("locale must not be empty".into()));
        }
        if url::Url::parse(&self.api_url).is_err() {
            return Err(ClientError::Config(format!("invalid api_url: {}", self.api_url)));
        }
        if self.retry.max_attempts == 0 {
            return Err(ClientError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.rate_limit.max_calls == 0 {
            return Err(ClientError::Config("rate_limit.max_calls must be at least 1".into()));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ClientError::Config("rate_limit.window_secs must be at least 1".into()));
        }
        Ok(())
    }
}

/// Retry policy values for the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Backoff base; attempt `n` waits `base * 2^(n-1)` plus jitter.
    pub base_delay_ms: u64,

    pub max_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay.
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // 50 calls per 15 minutes mirrors the service's per-endpoint budget.
        Self {
            max_calls: 50,
            window_secs: 900,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}
