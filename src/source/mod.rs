//! Data-source adapters producing candidate endpoints
//!
//! Each source is polled independently; a failing source contributes an
//! empty list and never aborts the gather.

pub mod listing;

use crate::error::SourceFetchError;
use crate::proxy::models::{CandidateEndpoint, ProxyType};
use crate::proxy::parser::ProxyParser;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub use listing::{ListingConfig, ListingSource, SourceSpec};

/// Number of sources fetched at once
const GATHER_CONCURRENCY: usize = 5;

/// Capability of producing candidate records
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether fetching needs the local anonymizing relay
    fn requires_relay(&self) -> bool {
        false
    }

    /// Fetch candidates; failures are logged and yield an empty list
    async fn fetch(&self) -> Vec<CandidateEndpoint>;
}

/// Fixed list of candidates, mostly useful for tests and piping
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    candidates: Vec<CandidateEndpoint>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, candidates: Vec<CandidateEndpoint>) -> Self {
        Self {
            name: name.into(),
            candidates,
        }
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Vec<CandidateEndpoint> {
        self.candidates.clone()
    }
}

/// Plain-text list on disk, one `IP:PORT` or `scheme://IP:PORT` per line
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    proxy_type: ProxyType,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, proxy_type: ProxyType) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            proxy_type,
        }
    }

    async fn try_fetch(&self) -> Result<Vec<CandidateEndpoint>, SourceFetchError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceFetchError::Io {
                path: self.name.clone(),
                message: e.to_string(),
            })?;
        Ok(ProxyParser::parse_string(&content, self.proxy_type, &self.name))
    }
}

#[async_trait]
impl CandidateSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Vec<CandidateEndpoint> {
        match self.try_fetch().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }
}

/// Poll every source in parallel and merge, dropping duplicate host:port pairs
pub async fn gather(sources: &[Arc<dyn CandidateSource>]) -> Vec<CandidateEndpoint> {
    let batches: Vec<Vec<CandidateEndpoint>> = stream::iter(sources.iter().cloned())
        .map(|source| async move {
            let candidates = source.fetch().await;
            info!("{} candidates from {}", candidates.len(), source.name());
            candidates
        })
        .buffer_unordered(GATHER_CONCURRENCY)
        .collect()
        .await;

    let merged = ProxyParser::dedup(batches.into_iter().flatten().collect());
    info!("{} unique candidates collected", merged.len());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn candidate(host: &str, port: u16) -> CandidateEndpoint {
        CandidateEndpoint::new(host, port, ProxyType::Http)
    }

    #[tokio::test]
    async fn test_gather_merges_and_dedups() {
        let sources: Vec<Arc<dyn CandidateSource>> = vec![
            Arc::new(StaticSource::new(
                "a",
                vec![candidate("1.1.1.1", 80), candidate("2.2.2.2", 8080)],
            )),
            Arc::new(StaticSource::new(
                "b",
                vec![candidate("2.2.2.2", 8080), candidate("3.3.3.3", 3128)],
            )),
        ];

        let merged = gather(&sources).await;

        assert_eq!(merged.len(), 3);
    }

    #[tokio::test]
    async fn test_gather_with_no_sources() {
        assert!(gather(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_list() {
        let source = FileSource::new("/nonexistent/proxies.txt", ProxyType::Http);
        assert!(source.fetch().await.is_empty());
    }

    #[tokio::test]
    async fn test_file_source_parses_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# list\n10.0.0.1:3128\nsocks5://10.0.0.2:1080\ngarbage\n").unwrap();

        let source = FileSource::new(file.path(), ProxyType::Http);
        let candidates = source.fetch().await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].proxy_type, ProxyType::Socks5);
        assert_eq!(candidates[0].provenance.source, source.name());
    }
}
