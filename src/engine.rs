//! One fetch, validate and select cycle

use crate::config::EngineConfig;
use crate::netinfo::{NetworkInfo, NetworkInfoCollector};
use crate::proxy::models::{CandidateEndpoint, EndpointStatus};
use crate::proxy::probe::Probe;
use crate::proxy::scheduler::{Scheduler, SharedProgress};
use crate::proxy::validator::Validator;
use crate::relay::is_relay_available;
use crate::report::CycleReport;
use crate::source::{self, CandidateSource};
use chrono::Local;
use std::sync::Arc;
use tracing::{info, warn};

/// Validation engine configured once and reused across cycles
pub struct ProxyEngine {
    config: EngineConfig,
    scheduler: Scheduler,
    sources: Vec<Arc<dyn CandidateSource>>,
    network: NetworkInfoCollector,
    progress: SharedProgress,
}

impl ProxyEngine {
    /// Engine probing over HTTP
    pub fn new(config: EngineConfig) -> Self {
        let validator = Validator::from_config(&config);
        Self::with_validator(config, validator)
    }

    /// Engine using a caller-supplied probe
    pub fn with_probe(config: EngineConfig, probe: Arc<dyn Probe>) -> Self {
        let validator = Validator::with_probe(probe, &config);
        Self::with_validator(config, validator)
    }

    fn with_validator(config: EngineConfig, validator: Validator) -> Self {
        Self {
            scheduler: Scheduler::new(validator, config.effective_concurrency()),
            network: NetworkInfoCollector::from_config(&config),
            sources: Vec::new(),
            progress: SharedProgress::new(),
            config,
        }
    }

    pub fn with_sources(mut self, sources: Vec<Arc<dyn CandidateSource>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn CandidateSource>) {
        self.sources.push(source);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Live counters summed over every batch this engine has run
    pub fn progress(&self) -> &SharedProgress {
        &self.progress
    }

    pub async fn network_info(&self) -> NetworkInfo {
        self.network.get().await
    }

    pub async fn refresh_network_info(&self) -> NetworkInfo {
        self.network.refresh().await
    }

    /// Check the local relay, warning when it is absent
    pub async fn check_relay(&self) -> bool {
        let available =
            is_relay_available(&self.config.relay_addr, self.config.relay_check_timeout).await;
        if !available {
            let relay_sources = self.sources.iter().filter(|s| s.requires_relay()).count();
            warn!(
                "relay at {} is not running; {} source(s) may be unavailable",
                self.config.relay_addr, relay_sources
            );
        }
        available
    }

    /// Gather candidates from every configured source
    pub async fn fetch_candidates(&self) -> Vec<CandidateEndpoint> {
        source::gather(&self.sources).await
    }

    /// Validate and select over already-fetched candidates
    pub async fn run_cycle(&self, candidates: Vec<CandidateEndpoint>) -> CycleReport {
        let relay_available = self.check_relay().await;
        self.validate_and_select(candidates, relay_available).await
    }

    /// Full cycle: relay check, fetch from sources, validate, select
    pub async fn run_full_cycle(&self) -> CycleReport {
        let relay_available = self.check_relay().await;
        let candidates = self.fetch_candidates().await;
        self.validate_and_select(candidates, relay_available).await
    }

    async fn validate_and_select(
        &self,
        candidates: Vec<CandidateEndpoint>,
        relay_available: bool,
    ) -> CycleReport {
        let started_at = Local::now();
        let network = self.network.get().await;

        info!(
            "testing {} candidates against {} targets with {} workers",
            candidates.len(),
            self.config.target_urls.len(),
            self.scheduler.concurrency()
        );
        let scored = self
            .scheduler
            .run_with_progress(candidates, &self.progress)
            .await;

        let tested = scored.len();
        let unreliable = scored
            .iter()
            .filter(|s| s.status == EndpointStatus::Unreliable)
            .count();
        let report = CycleReport::new(started_at, relay_available, network, scored);
        info!(
            "cycle finished: {} tested, {} active, {} unreliable, {} dead",
            tested,
            report.active.len(),
            unreliable,
            tested - report.active.len() - unreliable
        );

        match &report.selected {
            Some(best) => info!(
                "best endpoint {} ({}% success, {:.0}ms)",
                best.endpoint.address(),
                best.success_rate(),
                best.mean_latency_ms.unwrap_or_default()
            ),
            None => warn!("no usable endpoint found"),
        }

        report
    }
}
