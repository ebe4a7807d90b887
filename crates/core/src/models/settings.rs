use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Environment variable holding the market-data API key.
pub const ENV_API_KEY: &str = "CRYPTO_PORTFOLIO_API_KEY";

/// Environment variable overriding the market-data base URL.
pub const ENV_BASE_URL: &str = "CRYPTO_PORTFOLIO_BASE_URL";

/// Engine configuration. Every field has a sensible default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Demo API key sent as `x-cg-demo-api-key`. Optional: the public tier
    /// works without one at a lower rate limit.
    pub api_key: Option<String>,

    pub base_url: String,

    /// Quote currency for all prices. Only USD is supported.
    pub vs_currency: String,

    /// Number of top-by-market-cap assets tracked
    pub per_page: u32,

    /// Interval between background catalog refreshes
    pub refresh_interval: Duration,

    /// Minimum time a background refresh stays visible before new data is
    /// swapped in
    pub min_refresh_delay: Duration,

    /// Persisted holdings untouched for longer than this are discarded
    pub expiry_window: Duration,

    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            vs_currency: "usd".to_string(),
            per_page: 100,
            refresh_interval: Duration::from_secs(30),
            min_refresh_delay: Duration::from_millis(500),
            expiry_window: Duration::from_secs(48 * 60 * 60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Defaults overlaid with `CRYPTO_PORTFOLIO_API_KEY` and
    /// `CRYPTO_PORTFOLIO_BASE_URL` when set and non-empty.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (environment, config map, ...).
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}
