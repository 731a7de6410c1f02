use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Observations kept per histogram; older ones are evicted first.
const HISTOGRAM_WINDOW: usize = 1024;

/// Type of metric.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// Point-in-time value of one metric series.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, String>,
    pub metric_type: MetricType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<HistogramSummary>,
}

/// In-memory counter. Monotonically increasing.
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
    fn increment(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }
    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// In-memory gauge. Can go up or down.
struct Gauge {
    // f64 bits stored in an i64 so the value can be updated atomically
    value: AtomicI64,
}

impl Gauge {
    fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }
    fn set(&self, v: f64) {
        self.value.store(v.to_bits() as i64, Ordering::Relaxed);
    }
    fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed) as u64)
    }
}

/// Sliding-window histogram over the most recent observations.
struct Histogram {
    observations: Mutex<VecDeque<f64>>,
    total_count: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            observations: Mutex::new(VecDeque::with_capacity(HISTOGRAM_WINDOW)),
            total_count: AtomicU64::new(0),
        }
    }
    fn observe(&self, value: f64) {
        let mut obs = self.observations.lock();
        if obs.len() == HISTOGRAM_WINDOW {
            obs.pop_front();
        }
        obs.push_back(value);
        self.total_count.fetch_add(1, Ordering::Relaxed);
    }
    fn summary(&self) -> HistogramSummary {
        let mut sorted: Vec<f64> = self.observations.lock().iter().copied().collect();
        if sorted.is_empty() {
            return HistogramSummary::default();
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = sorted.len();
        HistogramSummary {
            count: self.total_count.load(Ordering::Relaxed),
            sum: sorted.iter().sum(),
            p50: sorted[count / 2],
            p95: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
        }
    }
}

/// Summary statistics from a histogram. `sum` and the percentiles cover the
/// retained window; `count` covers every observation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Metric key: name + labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: impl Into<String>, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.into(),
            labels: sorted,
        }
    }

    fn labels_map(&self) -> HashMap<String, String> {
        self.labels.iter().cloned().collect()
    }
}

/// Thread-safe in-memory metrics recorder.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, Counter>>,
    gauges: RwLock<HashMap<MetricKey, Gauge>>,
    histograms: RwLock<HashMap<MetricKey, Histogram>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by n.
    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = MetricKey::new(name, labels);
        let counters = self.counters.read();
        if let Some(c) = counters.get(&key) {
            c.increment(n);
            return;
        }
        drop(counters);
        let mut counters = self.counters.write();
        let c = counters.entry(key).or_insert_with(Counter::new);
        c.increment(n);
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        let gauges = self.gauges.read();
        if let Some(g) = gauges.get(&key) {
            g.set(value);
            return;
        }
        drop(gauges);
        let mut gauges = self.gauges.write();
        let g = gauges.entry(key).or_insert_with(Gauge::new);
        g.set(value);
    }

    /// Record a histogram observation.
    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        let histograms = self.histograms.read();
        if let Some(h) = histograms.get(&key) {
            h.observe(value);
            return;
        }
        drop(histograms);
        let mut histograms = self.histograms.write();
        let h = histograms.entry(key).or_insert_with(Histogram::new);
        h.observe(value);
    }

    /// Get a histogram summary.
    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        let key = MetricKey::new(name, labels);
        self.histograms
            .read()
            .get(&key)
            .map(Histogram::summary)
            .unwrap_or_default()
    }

    /// Get current value of a counter.
    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters.read().get(&key).map_or(0, Counter::get)
    }

    /// Get current value of a gauge.
    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = MetricKey::new(name, labels);
        self.gauges.read().get(&key).map_or(0.0, Gauge::get)
    }

    /// Current value of every series, sorted by name.
    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        let now = Utc::now().to_rfc3339();
        let mut out = Vec::new();

        for (key, counter) in self.counters.read().iter() {
            out.push(MetricsSnapshot {
                timestamp: now.clone(),
                name: key.name.clone(),
                value: counter.get() as f64,
                labels: key.labels_map(),
                metric_type: MetricType::Counter,
                summary: None,
            });
        }
        for (key, gauge) in self.gauges.read().iter() {
            out.push(MetricsSnapshot {
                timestamp: now.clone(),
                name: key.name.clone(),
                value: gauge.get(),
                labels: key.labels_map(),
                metric_type: MetricType::Gauge,
                summary: None,
            });
        }
        for (key, histogram) in self.histograms.read().iter() {
            let summary = histogram.summary();
            out.push(MetricsSnapshot {
                timestamp: now.clone(),
                name: key.name.clone(),
                value: summary.p50,
                labels: key.labels_map(),
                metric_type: MetricType::Histogram,
                summary: Some(summary),
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_basic() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("huddle.transitions", &[("kind", "vote")], 1);
        recorder.counter_inc("huddle.transitions", &[("kind", "vote")], 1);
        recorder.counter_inc("huddle.transitions", &[("kind", "join")], 1);

        assert_eq!(recorder.counter_get("huddle.transitions", &[("kind", "vote")]), 2);
        assert_eq!(recorder.counter_get("huddle.transitions", &[("kind", "join")]), 1);
        assert_eq!(recorder.counter_get("huddle.transitions", &[("kind", "reset")]), 0);
    }

    #[test]
    fn gauge_set_overwrites() {
        let recorder = MetricsRecorder::new();
        recorder.gauge_set("huddle.clients", &[], 10.0);
        assert_eq!(recorder.gauge_get("huddle.clients", &[]), 10.0);

        recorder.gauge_set("huddle.clients", &[], 3.0);
        assert_eq!(recorder.gauge_get("huddle.clients", &[]), 3.0);
    }

    #[test]
    fn histogram_observations() {
        let recorder = MetricsRecorder::new();
        for v in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0] {
            recorder.histogram_observe("huddle.reveal.participants", &[], v);
        }

        let summary = recorder.histogram_summary("huddle.reveal.participants", &[]);
        assert_eq!(summary.count, 10);
        assert_eq!(summary.sum, 550.0);
        assert!(summary.p50 >= 50.0 && summary.p50 <= 60.0);
        assert!(summary.p95 >= 90.0);
    }

    #[test]
    fn histogram_window_is_bounded() {
        let recorder = MetricsRecorder::new();
        for v in 0..(HISTOGRAM_WINDOW + 10) {
            recorder.histogram_observe("h", &[], v as f64);
        }
        let summary = recorder.histogram_summary("h", &[]);
        assert_eq!(summary.count, (HISTOGRAM_WINDOW + 10) as u64);
        // The first ten observations were evicted.
        let expected: f64 = (10..(HISTOGRAM_WINDOW + 10)).map(|v| v as f64).sum();
        assert_eq!(summary.sum, expected);
    }

    #[test]
    fn histogram_empty() {
        let recorder = MetricsRecorder::new();
        let summary = recorder.histogram_summary("nonexistent", &[]);
        assert_eq!(summary, HistogramSummary::default());
    }

    #[test]
    fn snapshot_lists_every_series() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("huddle.rejections", &[("reason", "invalid_vote_value")], 2);
        recorder.gauge_set("huddle.sessions", &[], 3.0);
        recorder.histogram_observe("huddle.reveal.participants", &[], 4.0);

        let snap = recorder.snapshot();
        assert_eq!(snap.len(), 3);
        let rejections = snap.iter().find(|s| s.name == "huddle.rejections").unwrap();
        assert_eq!(rejections.value, 2.0);
        assert_eq!(rejections.metric_type, MetricType::Counter);
        assert_eq!(rejections.labels["reason"], "invalid_vote_value");
        let reveal = snap
            .iter()
            .find(|s| s.name == "huddle.reveal.participants")
            .unwrap();
        assert_eq!(reveal.summary.as_ref().unwrap().count, 1);
    }

    #[test]
    fn label_ordering_independent() {
        let recorder = MetricsRecorder::new();
        recorder.counter_inc("test", &[("a", "1"), ("b", "2")], 1);
        recorder.counter_inc("test", &[("b", "2"), ("a", "1")], 1);

        assert_eq!(recorder.counter_get("test", &[("a", "1"), ("b", "2")]), 2);
        assert_eq!(recorder.counter_get("test", &[("b", "2"), ("a", "1")]), 2);
    }

    #[test]
    fn snapshot_serializes_without_empty_labels() {
        let recorder = MetricsRecorder::new();
        recorder.gauge_set("huddle.sessions", &[], 1.0);
        let json = serde_json::to_value(recorder.snapshot()).unwrap();
        assert_eq!(json[0]["metric_type"], "gauge");
        assert!(json[0].get("labels").is_none());
    }

    #[test]
    fn concurrent_counter_increments() {
        use std::sync::Arc;
        use std::thread;

        let recorder = Arc::new(MetricsRecorder::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let r = recorder.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    r.counter_inc("concurrent.test", &[], 1);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(recorder.counter_get("concurrent.test", &[]), 10_000);
    }
}
