//! Latency sample store and summary statistics.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tidal_types::MetricsData;

/// Per-run latency samples keyed by request index.
///
/// Samples are never evicted; the store is bounded by the size of the run.
/// Recording the same index twice keeps the later sample.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    samples: Mutex<BTreeMap<u64, Duration>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, request_index: u64, latency: Duration) {
        self.lock().insert(request_index, latency);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every recorded sample, in request order.
    pub fn samples(&self) -> Vec<Duration> {
        self.lock().values().copied().collect()
    }

    /// Summary of the current sample set, formatted for the wire.
    pub fn metrics_data(&self) -> MetricsData {
        let mut samples = self.samples();
        match summarize(&mut samples) {
            Some(summary) => summary.into(),
            None => MetricsData::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Duration>> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Summary statistics over a non-empty sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub mean: Duration,
    pub median: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl From<LatencySummary> for MetricsData {
    fn from(summary: LatencySummary) -> Self {
        MetricsData {
            mean_latency: format_duration(summary.mean),
            median_latency: format_duration(summary.median),
            min_latency: format_duration(summary.min),
            max_latency: format_duration(summary.max),
        }
    }
}

/// Sort `samples` and compute their summary. `None` for an empty set.
///
/// The mean truncates to whole nanoseconds. The median of an even-sized set
/// is the average of the two middle samples.
pub fn summarize(samples: &mut [Duration]) -> Option<LatencySummary> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();

    let count = samples.len();
    let total: u128 = samples.iter().map(Duration::as_nanos).sum();
    let mean = nanos(total / count as u128);

    let median = if count % 2 == 0 {
        let lower = samples[count / 2 - 1].as_nanos();
        let upper = samples[count / 2].as_nanos();
        nanos((lower + upper) / 2)
    } else {
        samples[count / 2]
    };

    Some(LatencySummary {
        mean,
        median,
        min: samples[0],
        max: samples[count - 1],
    })
}

fn nanos(value: u128) -> Duration {
    Duration::from_nanos(u64::try_from(value).unwrap_or(u64::MAX))
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Render a duration the way latency strings appear on the wire.
///
/// Examples: `0s`, `850ns`, `12.5µs`, `150ms`, `1.5s`, `2m3.25s`, `1h0m0s`.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_nanos();
    if total == 0 {
        return "0s".to_string();
    }
    if total < NANOS_PER_MICRO {
        return format!("{total}ns");
    }
    if total < NANOS_PER_MILLI {
        return format!("{}µs", decimal(total, NANOS_PER_MICRO));
    }
    if total < NANOS_PER_SEC {
        return format!("{}ms", decimal(total, NANOS_PER_MILLI));
    }

    let secs = total / NANOS_PER_SEC;
    let hours = secs / 3600;
    let minutes = (secs / 60) % 60;
    let seconds = (secs % 60) * NANOS_PER_SEC + total % NANOS_PER_SEC;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&decimal(seconds, NANOS_PER_SEC));
    out.push('s');
    out
}

/// `value / unit` with the fractional part trimmed of trailing zeros.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_empty_samples_yield_empty_fields() {
        assert!(summarize(&mut []).is_none());
        let data = MetricsAggregator::new().metrics_data();
        assert_eq!(data, MetricsData::default());
        assert!(data.is_empty());
    }

    #[test]
    fn test_odd_count_median_is_middle_sample() {
        let mut samples = vec![ms(30), ms(10), ms(20)];
        let s = summarize(&mut samples).unwrap();
        assert_eq!(s.median, ms(20));
        assert_eq!(s.mean, ms(20));
        assert_eq!(s.min, ms(10));
        assert_eq!(s.max, ms(30));
    }

    #[test]
    fn test_even_count_median_averages_middle_pair() {
        let mut samples = vec![ms(40), ms(10), ms(20), ms(100)];
        let s = summarize(&mut samples).unwrap();
        assert_eq!(s.median, ms(30));
        assert_eq!(s.mean, Duration::from_micros(42_500));
    }

    #[test]
    fn test_mean_truncates_to_whole_nanoseconds() {
        let mut samples = vec![
            Duration::from_nanos(1),
            Duration::from_nanos(1),
            Duration::from_nanos(2),
        ];
        let s = summarize(&mut samples).unwrap();
        assert_eq!(s.mean, Duration::from_nanos(1));
    }

    #[test]
    fn test_summary_bounds_hold() {
        let sets: Vec<Vec<u64>> = vec![
            vec![5],
            vec![1, 1000],
            vec![3, 3, 3, 3],
            vec![7, 1, 9, 4, 4, 250, 2],
            vec![0, 0, 1],
        ];
        for set in sets {
            let mut samples: Vec<Duration> = set.iter().map(|v| Duration::from_micros(*v)).collect();
            let s = summarize(&mut samples).unwrap();
            assert!(s.min <= s.median && s.median <= s.max, "median out of range: {set:?}");
            assert!(s.min <= s.mean && s.mean <= s.max, "mean out of range: {set:?}");
        }
    }

    #[test]
    fn test_aggregator_keeps_latest_sample_per_index() {
        let agg = MetricsAggregator::new();
        agg.record(1, ms(10));
        agg.record(2, ms(20));
        agg.record(1, ms(30));
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.samples(), vec![ms(30), ms(20)]);
    }

    #[test]
    fn test_metrics_data_is_formatted() {
        let agg = MetricsAggregator::new();
        agg.record(0, ms(100));
        agg.record(1, ms(200));
        let data = agg.metrics_data();
        assert_eq!(data.min_latency, "100ms");
        assert_eq!(data.max_latency, "200ms");
        assert_eq!(data.mean_latency, "150ms");
        assert_eq!(data.median_latency, "150ms");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_nanos(850)), "850ns");
        assert_eq!(format_duration(Duration::from_nanos(12_500)), "12.5µs");
        assert_eq!(format_duration(Duration::from_micros(1)), "1µs");
        assert_eq!(format_duration(Duration::from_micros(1_234)), "1.234ms");
        assert_eq!(format_duration(ms(150)), "150ms");
        assert_eq!(format_duration(ms(1_500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(1)), "1s");
        assert_eq!(format_duration(ms(123_250)), "2m3.25s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m0s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
    }
}
