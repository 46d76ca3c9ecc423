//! Proxy Scout - proxy validation and selection
//!
//! Takes candidate forward proxies from listing sources, probes each one
//! against a set of target URLs with bounded concurrency, scores them by
//! reliability and latency, and picks the best usable endpoint.

pub mod config;
pub mod engine;
pub mod error;
pub mod netinfo;
pub mod proxy;
pub mod relay;
pub mod report;
pub mod source;

pub use config::EngineConfig;
pub use engine::ProxyEngine;
pub use error::{EndpointError, NoUsableEndpoint, ProbeError, SourceFetchError};
pub use proxy::*;
pub use report::CycleReport;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
