//! Proxy data models

use crate::error::{EndpointError, ProbeError};
use crate::proxy::geo::GeoLocation;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Success ratio at or above which an endpoint counts as active (two of three targets)
pub const ACTIVE_THRESHOLD: f64 = 0.666;

/// Proxy type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl std::str::FromStr for ProxyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            _ => Err(format!(
                "Invalid proxy type: {}. Use: http, https, socks4, socks5",
                s
            )),
        }
    }
}

/// What the listing source claimed about a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub country_code: Option<String>,
    pub country: Option<String>,
    pub anonymity: Option<String>,
    pub https: Option<bool>,
    pub last_checked: Option<String>,
}

impl Provenance {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

/// A candidate forward proxy, not yet validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEndpoint {
    pub host: String,
    pub port: u16,
    pub proxy_type: ProxyType,
    pub provenance: Provenance,
}

impl CandidateEndpoint {
    /// Create a candidate with no provenance beyond the proxy type
    pub fn new(host: impl Into<String>, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host: host.into(),
            port,
            proxy_type,
            provenance: Provenance::default(),
        }
    }

    /// Build a candidate from raw adapter fields, rejecting empty hosts and bad ports
    pub fn from_raw(
        host: &str,
        port: &str,
        proxy_type: ProxyType,
        provenance: Provenance,
    ) -> Result<Self, EndpointError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        let port = port.trim();
        let port_num: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;
        if port_num == 0 {
            return Err(EndpointError::InvalidPort(port.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port: port_num,
            proxy_type,
            provenance,
        })
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Get the proxy URL string
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.proxy_type, self.host, self.port)
    }

    /// Get the proxy string in IP:PORT format
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for CandidateEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Outcome of one probe against one target URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub target: String,
    pub success: bool,
    /// Elapsed time, only present on success
    pub latency_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error: Option<ProbeError>,
}

impl TestOutcome {
    pub fn success(target: impl Into<String>, latency_ms: u64, status_code: u16) -> Self {
        Self {
            target: target.into(),
            success: true,
            latency_ms: Some(latency_ms),
            status_code: Some(status_code),
            error: None,
        }
    }

    pub fn failure(target: impl Into<String>, error: ProbeError) -> Self {
        let status_code = match error {
            ProbeError::Http(code) => Some(code),
            _ => None,
        };
        Self {
            target: target.into(),
            success: false,
            latency_ms: None,
            status_code,
            error: Some(error),
        }
    }

    /// One of `success`, `http_error`, `proxy_error`, `timeout`, `tls_error`, `other`
    pub fn classification(&self) -> &'static str {
        match &self.error {
            None => "success",
            Some(e) => e.class(),
        }
    }
}

/// Usability tier of a scored endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Active,
    Unreliable,
    Dead,
}

impl EndpointStatus {
    /// Classify with the default two-of-three threshold
    pub fn classify(success_ratio: f64) -> Self {
        Self::classify_with(success_ratio, ACTIVE_THRESHOLD)
    }

    pub fn classify_with(success_ratio: f64, active_threshold: f64) -> Self {
        if success_ratio >= active_threshold {
            EndpointStatus::Active
        } else if success_ratio > 0.0 {
            EndpointStatus::Unreliable
        } else {
            EndpointStatus::Dead
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointStatus::Active => write!(f, "active"),
            EndpointStatus::Unreliable => write!(f, "unreliable"),
            EndpointStatus::Dead => write!(f, "dead"),
        }
    }
}

/// A candidate together with everything learned about it in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEndpoint {
    pub endpoint: CandidateEndpoint,
    pub outcomes: Vec<TestOutcome>,
    /// successes / total probes, rounded to one decimal percentage point
    pub success_ratio: f64,
    /// Mean over successful probes only; `None` when nothing succeeded
    pub mean_latency_ms: Option<f64>,
    pub status: EndpointStatus,
    /// De-duplicated failure labels joined with ", "
    pub error: String,
    pub location: Option<GeoLocation>,
    pub tested_at: DateTime<Local>,
}

impl ScoredEndpoint {
    /// Fold probe outcomes into a score
    pub fn from_outcomes(
        endpoint: CandidateEndpoint,
        outcomes: Vec<TestOutcome>,
        active_threshold: f64,
    ) -> Self {
        let total = outcomes.len();
        let latencies: Vec<u64> = outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.latency_ms)
            .collect();
        let successes = outcomes.iter().filter(|o| o.success).count();

        let success_ratio = if total == 0 {
            0.0
        } else {
            round_ratio(successes as f64 / total as f64)
        };

        let mean_latency_ms = if successes == 0 || latencies.is_empty() {
            None
        } else {
            let sum: u64 = latencies.iter().sum();
            Some(sum as f64 / latencies.len() as f64)
        };

        let mut labels: Vec<String> = Vec::new();
        for label in outcomes
            .iter()
            .filter_map(|o| o.error.as_ref())
            .map(|e| e.to_string())
        {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }

        Self {
            endpoint,
            outcomes,
            success_ratio,
            mean_latency_ms,
            status: EndpointStatus::classify_with(success_ratio, active_threshold),
            error: labels.join(", "),
            location: None,
            tested_at: Local::now(),
        }
    }

    /// Record for an endpoint whose validation could not run to completion.
    ///
    /// Every target gets an `Other` failure carrying `message`.
    pub fn faulted(endpoint: CandidateEndpoint, targets: &[String], message: impl Into<String>) -> Self {
        let message = message.into();
        let outcomes = targets
            .iter()
            .map(|target| TestOutcome::failure(target.as_str(), ProbeError::Other(message.clone())))
            .collect();
        Self {
            endpoint,
            outcomes,
            success_ratio: 0.0,
            mean_latency_ms: None,
            status: EndpointStatus::Dead,
            error: ProbeError::Other(message).to_string(),
            location: None,
            tested_at: Local::now(),
        }
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Success rate as a percentage, e.g. 66.7
    pub fn success_rate(&self) -> f64 {
        (self.success_ratio * 1000.0).round() / 10.0
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn is_active(&self) -> bool {
        self.status == EndpointStatus::Active
    }
}

/// Round to one decimal of a percentage point (three decimals of the ratio)
fn round_ratio(ratio: f64) -> f64 {
    (ratio * 1000.0).round() / 1000.0
}
