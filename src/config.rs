//! Engine configuration

use crate::proxy::models::ACTIVE_THRESHOLD;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default timeout for a single probe in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of endpoints validated at once
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Default high-availability targets every candidate is probed against
pub const DEFAULT_TARGET_URLS: [&str; 3] = [
    "https://www.google.com",
    "https://www.cloudflare.com",
    "https://www.amazon.com",
];

/// Default local anonymizing relay (SOCKS)
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:9050";

const DEFAULT_RELAY_CHECK_SECS: u64 = 2;
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 15;
const DEFAULT_LOOKUP_URL: &str = "https://ipinfo.io/json";
const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Configuration passed to the engine at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeout for each probe
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    /// Number of endpoints validated concurrently
    pub concurrency: usize,
    /// URLs every candidate is probed against, in order
    pub target_urls: Vec<String>,
    /// Minimum success ratio for the active tier
    pub active_threshold: f64,
    /// Address of the local relay control port
    pub relay_addr: String,
    #[serde(rename = "relay_check_secs", with = "secs")]
    pub relay_check_timeout: Duration,
    #[serde(rename = "source_timeout_secs", with = "secs")]
    pub source_timeout: Duration,
    /// Public address lookup service
    pub lookup_url: String,
    #[serde(rename = "lookup_timeout_secs", with = "secs")]
    pub lookup_timeout: Duration,
    /// User agent sent with probes
    pub user_agent: String,
    /// Path to MMDB file for geolocation (optional)
    pub mmdb_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            target_urls: DEFAULT_TARGET_URLS.iter().map(|u| u.to_string()).collect(),
            active_threshold: ACTIVE_THRESHOLD,
            relay_addr: DEFAULT_RELAY_ADDR.to_string(),
            relay_check_timeout: Duration::from_secs(DEFAULT_RELAY_CHECK_SECS),
            source_timeout: Duration::from_secs(DEFAULT_SOURCE_TIMEOUT_SECS),
            lookup_url: DEFAULT_LOOKUP_URL.to_string(),
            lookup_timeout: Duration::from_secs(DEFAULT_LOOKUP_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            mmdb_path: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON document; missing fields fall back to defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_target_urls(mut self, urls: Vec<String>) -> Self {
        self.target_urls = urls;
        self
    }

    pub fn with_active_threshold(mut self, threshold: f64) -> Self {
        self.active_threshold = threshold;
        self
    }

    /// Re-derive the threshold from the target count as "more than half".
    ///
    /// The threshold becomes the smallest achievable ratio above one half,
    /// truncated to three decimals so that 2/3 yields 0.666.
    pub fn with_majority_threshold(mut self) -> Self {
        let n = self.target_urls.len().max(1);
        let needed = n / 2 + 1;
        self.active_threshold = ((needed as f64 / n as f64) * 1000.0).floor() / 1000.0;
        self
    }

    pub fn with_relay_addr(mut self, addr: String) -> Self {
        self.relay_addr = addr;
        self
    }

    pub fn with_lookup_url(mut self, url: String) -> Self {
        self.lookup_url = url;
        self
    }

    pub fn with_mmdb_path(mut self, path: String) -> Self {
        self.mmdb_path = Some(path);
        self
    }

    /// Concurrency clamped to at least one worker
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.target_urls.len(), 3);
        assert_eq!(config.active_threshold, 0.666);
        assert!(config.mmdb_path.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_concurrency(20)
            .with_target_urls(vec!["http://example.com".to_string()]);

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.target_urls, vec!["http://example.com"]);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let config = EngineConfig::new().with_concurrency(0);
        assert_eq!(config.effective_concurrency(), 1);
    }

    #[test]
    fn test_majority_threshold() {
        let three = EngineConfig::new().with_majority_threshold();
        assert_eq!(three.active_threshold, 0.666);

        let two = EngineConfig::new()
            .with_target_urls(vec!["http://a".into(), "http://b".into()])
            .with_majority_threshold();
        assert_eq!(two.active_threshold, 1.0);

        let five = EngineConfig::new()
            .with_target_urls((0..5).map(|i| format!("http://t{}", i)).collect())
            .with_majority_threshold();
        assert_eq!(five.active_threshold, 0.6);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"timeout_secs": 2.5, "concurrency": 8}"#).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.relay_addr, DEFAULT_RELAY_ADDR);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let parsed: std::result::Result<EngineConfig, _> =
            serde_json::from_str(r#"{"timeout_secs": -1}"#);
        assert!(parsed.is_err());
    }
}
