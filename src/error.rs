//! Error types for probing, sources and selection

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed probe.
///
/// Every transport failure observed by a probe maps onto exactly one of
/// these variants; none of them ever propagates past the validator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeError {
    /// The candidate refused or reset the connection
    #[error("Proxy Error")]
    Proxy,

    #[error("Timeout")]
    Timeout,

    /// Certificate or handshake failure
    #[error("SSL Error")]
    Tls,

    /// A response arrived with a non-success status code
    #[error("HTTP {0}")]
    Http(u16),

    #[error("{0}")]
    Other(String),
}

impl ProbeError {
    /// Short machine-readable class name
    pub fn class(&self) -> &'static str {
        match self {
            ProbeError::Proxy => "proxy_error",
            ProbeError::Timeout => "timeout",
            ProbeError::Tls => "tls_error",
            ProbeError::Http(_) => "http_error",
            ProbeError::Other(_) => "other",
        }
    }
}

/// Failure of a data-source adapter. Contained inside the adapter.
#[derive(Error, Debug)]
pub enum SourceFetchError {
    #[error("request to {source_name} failed: {message}")]
    Request {
        source_name: String,
        message: String,
    },

    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

/// Rejected candidate record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("candidate address is empty")]
    EmptyHost,

    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// Raised when a cycle finished without any usable endpoint
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no usable endpoint")]
pub struct NoUsableEndpoint;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display_matches_report_labels() {
        assert_eq!(ProbeError::Proxy.to_string(), "Proxy Error");
        assert_eq!(ProbeError::Timeout.to_string(), "Timeout");
        assert_eq!(ProbeError::Tls.to_string(), "SSL Error");
        assert_eq!(ProbeError::Http(503).to_string(), "HTTP 503");
        assert_eq!(ProbeError::Other("broken pipe".into()).to_string(), "broken pipe");
    }

    #[test]
    fn test_probe_error_class() {
        assert_eq!(ProbeError::Http(404).class(), "http_error");
        assert_eq!(ProbeError::Other(String::new()).class(), "other");
    }
}
