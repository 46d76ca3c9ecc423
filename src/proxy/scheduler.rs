//! Bounded-concurrency execution of the validator over many candidates

use crate::proxy::models::{CandidateEndpoint, EndpointStatus, ScoredEndpoint};
use crate::proxy::validator::Validator;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Counters describing the batches run so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub unreliable: usize,
    pub dead: usize,
}

/// Progress counters shared between a batch and its readers.
///
/// Holds counts only; each batch keeps its own results. Batches sharing one
/// `SharedProgress` all add to the same counters.
#[derive(Debug, Clone, Default)]
pub struct SharedProgress {
    counts: Arc<Mutex<ProgressSnapshot>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        *self.counts.lock().await
    }

    async fn add_pending(&self, total: usize) {
        self.counts.lock().await.total += total;
    }

    async fn record(&self, status: EndpointStatus) {
        let mut counts = self.counts.lock().await;
        counts.completed += 1;
        match status {
            EndpointStatus::Active => counts.active += 1,
            EndpointStatus::Unreliable => counts.unreliable += 1,
            EndpointStatus::Dead => counts.dead += 1,
        }
    }
}

/// Runs the validator over every candidate, at most `concurrency` at a time
#[derive(Debug, Clone)]
pub struct Scheduler {
    validator: Validator,
    concurrency: usize,
}

impl Scheduler {
    pub fn new(validator: Validator, concurrency: usize) -> Self {
        Self {
            validator,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start validating and hand results back through a channel in completion order.
    ///
    /// The channel closes once every candidate has produced a result. Dropping
    /// the receiver cancels the validations still in flight.
    pub fn run_stream(&self, candidates: Vec<CandidateEndpoint>) -> mpsc::Receiver<ScoredEndpoint> {
        let (tx, rx) = mpsc::channel(self.concurrency);
        let validator = self.validator.clone();
        let concurrency = self.concurrency;

        tokio::spawn(async move {
            let mut results = stream::iter(candidates)
                .map(|candidate| validate_contained(validator.clone(), candidate))
                .buffer_unordered(concurrency);

            loop {
                tokio::select! {
                    next = results.next() => match next {
                        Some(scored) => {
                            if tx.send(scored).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = tx.closed() => break,
                }
            }
            if tx.is_closed() {
                debug!("result receiver dropped, cancelling remaining validations");
            }
        });

        rx
    }

    /// Validate every candidate and return all scored endpoints
    pub async fn run(&self, candidates: Vec<CandidateEndpoint>) -> Vec<ScoredEndpoint> {
        self.run_with_progress(candidates, &SharedProgress::new()).await
    }

    /// Like [`Scheduler::run`], counting each completion into `progress`
    pub async fn run_with_progress(
        &self,
        candidates: Vec<CandidateEndpoint>,
        progress: &SharedProgress,
    ) -> Vec<ScoredEndpoint> {
        let mut results = Vec::with_capacity(candidates.len());
        progress.add_pending(candidates.len()).await;

        let mut rx = self.run_stream(candidates);
        while let Some(scored) = rx.recv().await {
            progress.record(scored.status).await;
            results.push(scored);
        }

        results
    }
}

/// Aborts the spawned task when dropped before completion
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Validate on a separate task so a panic becomes a dead result instead of aborting the batch
async fn validate_contained(validator: Validator, candidate: CandidateEndpoint) -> ScoredEndpoint {
    let targets = validator.target_urls().to_vec();
    let task_candidate = candidate.clone();
    let mut handle = AbortOnDrop(tokio::spawn(async move {
        validator.validate(task_candidate).await
    }));

    match (&mut handle.0).await {
        Ok(scored) => scored,
        Err(e) => {
            error!("validation of {} aborted: {}", candidate.address(), e);
            ScoredEndpoint::faulted(candidate, &targets, format!("validation task failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ProbeError;
    use crate::proxy::models::{ProxyType, TestOutcome};
    use crate::proxy::probe::Probe;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Succeeds everywhere, except hosts starting with "panic" which blow up
    /// and hosts starting with "dead" which are refused
    struct HostKeyedProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl HostKeyedProbe {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for HostKeyedProbe {
        async fn probe(&self, endpoint: &CandidateEndpoint, target: &str) -> TestOutcome {
            if endpoint.host.starts_with("panic") {
                panic!("probe fault for {}", endpoint.host);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if endpoint.host.starts_with("dead") {
                TestOutcome::failure(target, ProbeError::Proxy)
            } else {
                TestOutcome::success(target, u64::from(endpoint.port % 100), 200)
            }
        }
    }

    fn candidates(prefix: &str, n: u16) -> Vec<CandidateEndpoint> {
        (1..=n)
            .map(|i| CandidateEndpoint::new(format!("{}-{}", prefix, i), 8000 + i, ProxyType::Http))
            .collect()
    }

    fn scheduler(probe: Arc<HostKeyedProbe>, concurrency: usize) -> Scheduler {
        let config = EngineConfig::default();
        Scheduler::new(Validator::with_probe(probe, &config), concurrency)
    }

    #[tokio::test]
    async fn test_empty_input_returns_empty() {
        let results = scheduler(Arc::new(HostKeyedProbe::new()), 4).run(Vec::new()).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_every_candidate_yields_one_result() {
        let mut input = candidates("ok", 12);
        input.extend(candidates("dead", 3));

        let results = scheduler(Arc::new(HostKeyedProbe::new()), 5).run(input).await;

        assert_eq!(results.len(), 15);
        assert_eq!(results.iter().filter(|r| r.is_active()).count(), 12);
        assert_eq!(
            results.iter().filter(|r| r.status == EndpointStatus::Dead).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let probe = Arc::new(HostKeyedProbe::new());
        let results = scheduler(probe.clone(), 3).run(candidates("ok", 20)).await;

        assert_eq!(results.len(), 20);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let s = scheduler(Arc::new(HostKeyedProbe::new()), 0);
        assert_eq!(s.concurrency(), 1);
        assert_eq!(s.run(candidates("ok", 2)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_validation_does_not_abort_batch() {
        let mut input = candidates("ok", 4);
        input.insert(2, CandidateEndpoint::new("panic-host", 9999, ProxyType::Http));

        let results = scheduler(Arc::new(HostKeyedProbe::new()), 2).run(input).await;

        assert_eq!(results.len(), 5);
        let faulted = results
            .iter()
            .find(|r| r.endpoint.host == "panic-host")
            .expect("faulted endpoint recorded");
        assert_eq!(faulted.status, EndpointStatus::Dead);
        assert!(faulted.error.contains("validation task failed"));
        assert_eq!(results.iter().filter(|r| r.is_active()).count(), 4);
    }

    #[tokio::test]
    async fn test_progress_counts_match_results() {
        let mut input = candidates("ok", 6);
        input.extend(candidates("dead", 2));
        let progress = SharedProgress::new();

        let results = scheduler(Arc::new(HostKeyedProbe::new()), 4)
            .run_with_progress(input, &progress)
            .await;

        let snapshot = progress.snapshot().await;
        assert_eq!(results.len(), 8);
        assert_eq!(
            snapshot,
            ProgressSnapshot {
                total: 8,
                completed: 8,
                active: 6,
                unreliable: 0,
                dead: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_stream_closes_after_last_result() {
        let mut rx = scheduler(Arc::new(HostKeyedProbe::new()), 2).run_stream(candidates("ok", 3));
        let mut seen = 0;
        while rx.recv().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    /// Hosts starting with "slow" hang on every target; the rest answer at once
    struct HangingProbe {
        finished: AtomicUsize,
    }

    #[async_trait]
    impl Probe for HangingProbe {
        async fn probe(&self, endpoint: &CandidateEndpoint, target: &str) -> TestOutcome {
            if endpoint.host.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(300)).await;
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
            TestOutcome::success(target, 1, 200)
        }
    }

    #[tokio::test]
    async fn test_dropping_receiver_cancels_in_flight_validations() {
        let probe = Arc::new(HangingProbe {
            finished: AtomicUsize::new(0),
        });
        let config = EngineConfig::default();
        let scheduler = Scheduler::new(Validator::with_probe(probe.clone(), &config), 3);
        let mut input = candidates("fast", 1);
        input.extend(candidates("slow", 2));

        let mut rx = scheduler.run_stream(input);
        let first = rx.recv().await.expect("fast result");
        assert_eq!(first.endpoint.host, "fast-1");
        drop(rx);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(probe.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_faulted_validation_records_other_per_target() {
        let config = EngineConfig::default();
        let results = scheduler(Arc::new(HostKeyedProbe::new()), 1)
            .run(vec![CandidateEndpoint::new("panic-host", 1, ProxyType::Http)])
            .await;

        let faulted = &results[0];
        assert_eq!(faulted.outcomes.len(), config.target_urls.len());
        assert!(faulted.outcomes.iter().all(|o| o.classification() == "other"));
    }
}
