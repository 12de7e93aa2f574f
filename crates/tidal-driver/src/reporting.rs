//! Metrics and heartbeat producers that run alongside a load run.

use std::sync::Arc;
use std::time::Duration;
use tidal_bus::{Bus, PublishReport};
use tidal_types::{HeartbeatMessage, MetricsMessage};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::MetricsAggregator;

/// Publish the current summary every `period` until `done` fires.
///
/// The first report goes out one period after the start. Returns how many
/// reports were enqueued.
pub async fn stream_metrics(
    bus: Bus,
    node_id: String,
    test_id: String,
    aggregator: Arc<MetricsAggregator>,
    period: Duration,
    done: CancellationToken,
) -> usize {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut published = 0;

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                let message = MetricsMessage::new(&node_id, &test_id, aggregator.metrics_data());
                let report = bus.publish_one(&message).await;
                published += report.enqueued;
                debug!("Metrics produced: {:?}", message.metrics);
            }
        }
    }

    published
}

/// Publish the summary of the whole run once.
pub async fn publish_final_metrics(
    bus: &Bus,
    node_id: &str,
    test_id: &str,
    aggregator: &MetricsAggregator,
) -> PublishReport {
    let message = MetricsMessage::new(node_id, test_id, aggregator.metrics_data());
    let report = bus.publish_one(&message).await;
    if !report.is_ok() {
        warn!("Final metrics for test {test_id} could not be published");
    }
    report
}

/// Publish a heartbeat now and then every `period` until `done` fires.
pub async fn send_heartbeats(
    bus: Bus,
    node_id: String,
    period: Duration,
    done: CancellationToken,
) -> usize {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent = 0;

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                sent += bus.publish_one(&HeartbeatMessage::now(&node_id)).await.enqueued;
            }
        }
    }

    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_bus::MemoryBus;
    use tidal_types::TopicNames;

    fn bus() -> Bus {
        Bus::new(Arc::new(MemoryBus::new()), TopicNames::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_metrics_reports_each_period_until_done() {
        let bus = bus();
        let mut sub = bus.subscribe::<MetricsMessage>().await.unwrap();
        let aggregator = Arc::new(MetricsAggregator::new());
        aggregator.record(0, Duration::from_millis(5));
        let done = CancellationToken::new();

        let task = tokio::spawn(stream_metrics(
            bus.clone(),
            "n1".to_string(),
            "t1".to_string(),
            aggregator,
            Duration::from_millis(10),
            done.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(35)).await;
        done.cancel();
        let published = task.await.unwrap();
        assert_eq!(published, 3);

        let first = sub.next().await.unwrap().unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(first.test_id, "t1");
        assert_eq!(first.metrics.min_latency, "5ms");
        assert_ne!(first.report_id, second.report_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_start_immediately() {
        let bus = bus();
        let mut sub = bus.subscribe::<HeartbeatMessage>().await.unwrap();
        let done = CancellationToken::new();

        let task = tokio::spawn(send_heartbeats(
            bus.clone(),
            "n1".to_string(),
            Duration::from_secs(10),
            done.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(25)).await;
        done.cancel();
        assert_eq!(task.await.unwrap(), 3);

        let hb = sub.next().await.unwrap().unwrap();
        assert_eq!(hb.node_id, "n1");
    }

    #[tokio::test]
    async fn test_final_metrics_with_no_samples_has_empty_fields() {
        let bus = bus();
        let mut sub = bus.subscribe::<MetricsMessage>().await.unwrap();

        let report = publish_final_metrics(&bus, "n1", "t1", &MetricsAggregator::new()).await;
        assert_eq!(report.enqueued, 1);

        let msg = sub.next().await.unwrap().unwrap();
        assert!(msg.metrics.is_empty());
    }
}
