//! Validator running the probe battery against one candidate

use crate::config::EngineConfig;
use crate::error::ProbeError;
use crate::proxy::geo::GeoLocator;
use crate::proxy::models::{CandidateEndpoint, ScoredEndpoint, TestOutcome};
use crate::proxy::probe::{HttpProbe, Probe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs every target URL against one candidate, in order, and scores the result
#[derive(Clone)]
pub struct Validator {
    probe: Arc<dyn Probe>,
    target_urls: Arc<[String]>,
    timeout: Duration,
    active_threshold: f64,
    geo_locator: Option<GeoLocator>,
}

impl Validator {
    /// Validator probing over HTTP with the configured timeout and targets
    pub fn from_config(config: &EngineConfig) -> Self {
        let probe = HttpProbe::new(config.timeout, config.user_agent.clone());
        let geo_locator = config.mmdb_path.as_ref().and_then(|path| {
            GeoLocator::from_path(path)
                .map_err(|e| warn!("geolocation disabled, cannot open {}: {}", path, e))
                .ok()
        });

        Self::with_probe(Arc::new(probe), config).with_geo_locator(geo_locator)
    }

    /// Validator using a caller-supplied probe
    pub fn with_probe(probe: Arc<dyn Probe>, config: &EngineConfig) -> Self {
        Self {
            probe,
            target_urls: config.target_urls.clone().into(),
            timeout: config.timeout,
            active_threshold: config.active_threshold,
            geo_locator: None,
        }
    }

    pub fn with_geo_locator(mut self, geo_locator: Option<GeoLocator>) -> Self {
        self.geo_locator = geo_locator;
        self
    }

    pub fn target_urls(&self) -> &[String] {
        &self.target_urls
    }

    /// Probe every target sequentially and fold the outcomes.
    ///
    /// Each probe gets one attempt bounded by the probe timeout; a failure is
    /// recorded as-is and left for the next cycle.
    pub async fn validate(&self, endpoint: CandidateEndpoint) -> ScoredEndpoint {
        let mut outcomes = Vec::with_capacity(self.target_urls.len());

        for target in self.target_urls.iter() {
            let outcome = match tokio::time::timeout(self.timeout, self.probe.probe(&endpoint, target)).await {
                Ok(outcome) => outcome,
                Err(_) => TestOutcome::failure(target.as_str(), ProbeError::Timeout),
            };
            debug!(
                "{} -> {}: {}",
                endpoint.address(),
                target,
                outcome.classification()
            );
            outcomes.push(outcome);
        }

        let location = self
            .geo_locator
            .as_ref()
            .and_then(|geo| geo.locate(&endpoint.host));

        let scored = ScoredEndpoint::from_outcomes(endpoint, outcomes, self.active_threshold);
        match location {
            Some(location) => scored.with_location(location),
            None => scored,
        }
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("target_urls", &self.target_urls)
            .field("timeout", &self.timeout)
            .field("active_threshold", &self.active_threshold)
            .finish_non_exhaustive()
    }
}
