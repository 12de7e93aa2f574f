//! AVALANCHE and TSUNAMI load generation against the target server.

use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::MetricsAggregator;

/// Counters of one load run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Requests that produced a response (any status) and a latency sample.
    pub succeeded: u64,
    /// Requests that failed before a response arrived; no sample recorded.
    pub failed: u64,
    pub elapsed: Duration,
    /// The run stopped early because the done signal fired.
    pub aborted: bool,
}

impl LoadStats {
    pub fn issued(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Issues GET requests to one target URL and records their latencies.
#[derive(Clone)]
pub struct LoadGenerator {
    client: Client,
    target: Arc<str>,
    aggregator: Arc<MetricsAggregator>,
}

impl LoadGenerator {
    pub fn new(client: Client, target: &str, aggregator: Arc<MetricsAggregator>) -> Self {
        Self {
            client,
            target: Arc::from(target),
            aggregator,
        }
    }

    /// Launch `count` requests at once and wait for all of them.
    ///
    /// There is no concurrency cap: every request is in flight
    /// simultaneously. Firing `done` abandons outstanding requests.
    pub async fn avalanche(&self, count: u64, done: &CancellationToken) -> LoadStats {
        let started = Instant::now();
        let mut stats = LoadStats::default();

        let mut requests = JoinSet::new();
        for index in 0..count {
            let generator = self.clone();
            requests.spawn(async move { generator.send_request(index).await });
        }

        loop {
            tokio::select! {
                _ = done.cancelled() => {
                    info!("Avalanche aborted with {} request(s) outstanding", requests.len());
                    requests.abort_all();
                    stats.aborted = true;
                    break;
                }
                joined = requests.join_next() => match joined {
                    Some(Ok(true)) => stats.succeeded += 1,
                    Some(Ok(false)) => stats.failed += 1,
                    Some(Err(e)) => {
                        warn!("Request task failed: {e}");
                        stats.failed += 1;
                    }
                    None => break,
                },
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            "Avalanche testing completed: {} succeeded, {} failed in {:?}",
            stats.succeeded, stats.failed, stats.elapsed
        );
        stats
    }

    /// Issue `count` requests one per tick of `delay`, strictly in sequence.
    ///
    /// The first request goes out immediately, so a full run spans at least
    /// `(count - 1) * delay`. A zero delay sends back to back.
    pub async fn tsunami(&self, count: u64, delay: Duration, done: &CancellationToken) -> LoadStats {
        let started = Instant::now();
        let mut stats = LoadStats::default();

        let mut ticker = (!delay.is_zero()).then(|| {
            let mut ticker = tokio::time::interval(delay);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        for index in 1..=count {
            let tick = async {
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
            };
            tokio::select! {
                _ = done.cancelled() => {
                    info!("Tsunami aborted after {} request(s)", stats.issued());
                    stats.aborted = true;
                    break;
                }
                _ = tick => {}
            }

            if self.send_request(index).await {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }

        stats.elapsed = started.elapsed();
        info!(
            "Tsunami testing completed: {} succeeded, {} failed in {:?}",
            stats.succeeded, stats.failed, stats.elapsed
        );
        stats
    }

    /// Returns whether a latency sample was recorded.
    async fn send_request(&self, index: u64) -> bool {
        let start = Instant::now();
        match self.client.get(&*self.target).send().await {
            Ok(response) => {
                let latency = start.elapsed();
                self.aggregator.record(index, latency);
                debug!(
                    "Response status: {}, latency for request {index}: {latency:?}",
                    response.status()
                );
                true
            }
            Err(e) => {
                warn!("Error making request {index} to '{}': {e}", self.target);
                false
            }
        }
    }
}
