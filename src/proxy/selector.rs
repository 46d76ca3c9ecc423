//! Ranking of usable endpoints and selection of the best one

use crate::error::NoUsableEndpoint;
use crate::proxy::models::ScoredEndpoint;
use serde::Serialize;
use std::cmp::Ordering;

/// Endpoints classified as active in one cycle, ranked best first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActiveSet {
    endpoints: Vec<ScoredEndpoint>,
}

impl ActiveSet {
    /// Keep the active endpoints and rank them; first-seen order breaks full ties
    pub fn from_scored(scored: &[ScoredEndpoint]) -> Self {
        let mut endpoints: Vec<ScoredEndpoint> =
            scored.iter().filter(|s| s.is_active()).cloned().collect();
        rank(&mut endpoints);
        Self { endpoints }
    }

    /// Head of the ranking
    pub fn selected(&self) -> Option<&ScoredEndpoint> {
        self.endpoints.first()
    }

    /// Like [`ActiveSet::selected`] but reporting an empty set as an error
    pub fn require_selected(&self) -> Result<&ScoredEndpoint, NoUsableEndpoint> {
        self.selected().ok_or(NoUsableEndpoint)
    }

    pub fn endpoints(&self) -> &[ScoredEndpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Active endpoints ordered by mean latency alone, fastest first
    pub fn by_latency(&self) -> Vec<&ScoredEndpoint> {
        let mut sorted: Vec<&ScoredEndpoint> = self.endpoints.iter().collect();
        sorted.sort_by(|a, b| latency_key(a).total_cmp(&latency_key(b)));
        sorted
    }
}

/// Stable sort: success ratio descending, then mean latency ascending
pub fn rank(endpoints: &mut [ScoredEndpoint]) {
    endpoints.sort_by(compare);
}

/// Selection order between two scored endpoints
pub fn compare(a: &ScoredEndpoint, b: &ScoredEndpoint) -> Ordering {
    b.success_ratio
        .total_cmp(&a.success_ratio)
        .then_with(|| latency_key(a).total_cmp(&latency_key(b)))
}

/// Missing latency sorts after every measured one
fn latency_key(endpoint: &ScoredEndpoint) -> f64 {
    endpoint.mean_latency_ms.unwrap_or(f64::INFINITY)
}
