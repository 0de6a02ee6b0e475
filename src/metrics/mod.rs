//! Metrics for the statement ledger
//!
//! Counters, gauges and latency histograms live in one in-process registry
//! keyed by dotted names (see [`metric_names`]). `/metrics` renders it as
//! Prometheus text or, with `?format=json`, as a JSON document.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::RwLock;

/// Latency bucket bounds in seconds; oracle calls can take tens of seconds.
const LATENCY_BUCKETS: [f64; 13] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

enum Series {
    Counter(AtomicU64),
    Gauge(AtomicU64),
    Latency(LatencyHistogram),
}

impl Series {
    fn kind(&self) -> &'static str {
        match self {
            Series::Counter(_) => "counter",
            Series::Gauge(_) => "gauge",
            Series::Latency(_) => "histogram",
        }
    }
}

/// Process-wide metrics registry
pub struct MetricsRegistry {
    series: RwLock<BTreeMap<String, Arc<Series>>>,
    started: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(BTreeMap::new()),
            started: Instant::now(),
        }
    }

    /// Look up a series, registering it with `make` on first use.
    ///
    /// A name keeps the kind it was first registered with; updates of a
    /// different kind are dropped.
    async fn series(&self, name: &str, make: fn() -> Series) -> Arc<Series> {
        if let Some(series) = self.series.read().await.get(name) {
            return series.clone();
        }
        self.series
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(make()))
            .clone()
    }

    pub async fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1).await;
    }

    pub async fn add_counter(&self, name: &str, value: u64) {
        if let Series::Counter(n) = &*self.series(name, || Series::Counter(AtomicU64::new(0))).await {
            n.fetch_add(value, Ordering::Relaxed);
        }
    }

    pub async fn set_gauge(&self, name: &str, value: u64) {
        if let Series::Gauge(n) = &*self.series(name, || Series::Gauge(AtomicU64::new(0))).await {
            n.store(value, Ordering::Relaxed);
        }
    }

    /// Record a latency in seconds
    pub async fn observe_latency(&self, name: &str, seconds: f64) {
        if let Series::Latency(h) = &*self.series(name, || Series::Latency(LatencyHistogram::new())).await {
            h.observe(seconds);
        }
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        match self.series.read().await.get(name).map(Arc::as_ref) {
            Some(Series::Counter(n)) => n.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub async fn get_gauge(&self, name: &str) -> u64 {
        match self.series.read().await.get(name).map(Arc::as_ref) {
            Some(Series::Gauge(n)) => n.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub async fn to_json(&self) -> Value {
        let series = self.series.read().await;

        let mut counters = serde_json::Map::new();
        let mut gauges = serde_json::Map::new();
        let mut histograms = serde_json::Map::new();
        for (name, s) in series.iter() {
            match s.as_ref() {
                Series::Counter(n) => counters.insert(name.clone(), n.load(Ordering::Relaxed).into()),
                Series::Gauge(n) => gauges.insert(name.clone(), n.load(Ordering::Relaxed).into()),
                Series::Latency(h) => histograms.insert(name.clone(), h.to_json()),
            };
        }

        json!({
            "uptime_seconds": self.uptime_seconds(),
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }

    /// Prometheus text exposition format
    pub async fn to_prometheus(&self) -> String {
        let series = self.series.read().await;
        let mut out = String::new();

        write_header(&mut out, "ledger_uptime_seconds", "gauge", Some("Time since service start"));
        let _ = writeln!(out, "ledger_uptime_seconds {}", self.uptime_seconds());

        for (name, s) in series.iter() {
            let exported = prometheus_name(name);
            write_header(&mut out, &exported, s.kind(), metric_names::describe(name));
            match s.as_ref() {
                Series::Counter(n) | Series::Gauge(n) => {
                    let _ = writeln!(out, "{exported} {}", n.load(Ordering::Relaxed));
                }
                Series::Latency(h) => h.write_prometheus(&mut out, &exported),
            }
        }

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn write_header(out: &mut String, name: &str, kind: &str, help: Option<&str>) {
    if let Some(help) = help {
        let _ = writeln!(out, "# HELP {name} {help}");
    }
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn prometheus_name(name: &str) -> String {
    name.replace(['.', '-'], "_")
}

/// Fixed-bucket latency histogram; the sum is kept in microseconds.
struct LatencyHistogram {
    counts: [AtomicU64; LATENCY_BUCKETS.len()],
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, seconds: f64) {
        let seconds = seconds.max(0.0);
        self.sum_micros
            .fetch_add((seconds * 1e6) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        if let Some(i) = LATENCY_BUCKETS.iter().position(|bound| seconds <= *bound) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sum_seconds(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1e6
    }

    fn to_json(&self) -> Value {
        let counts: Vec<u64> = self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect();
        json!({
            "buckets": LATENCY_BUCKETS,
            "counts": counts,
            "sum": self.sum_seconds(),
            "count": self.count.load(Ordering::Relaxed),
        })
    }

    fn write_prometheus(&self, out: &mut String, name: &str) {
        let mut cumulative = 0u64;
        for (bound, count) in LATENCY_BUCKETS.iter().zip(&self.counts) {
            cumulative += count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
        }
        let total = self.count.load(Ordering::Relaxed);
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {total}");
        let _ = writeln!(out, "{name}_sum {}", self.sum_seconds());
        let _ = writeln!(out, "{name}_count {total}");
    }
}

/// Metric names used across the service
pub mod metric_names {
    // Appends
    pub const ENTRIES_APPENDED: &str = "ledger.entries.appended";
    pub const APPEND_CONFLICTS: &str = "ledger.append.conflicts";
    pub const APPEND_CONFLICTS_EXHAUSTED: &str = "ledger.append.conflicts_exhausted";
    pub const APPEND_LATENCY: &str = "ledger.append.latency_seconds";

    // Verification
    pub const VERIFICATIONS_COMPLETED: &str = "ledger.verifications.completed";
    pub const VERIFICATIONS_DEGRADED: &str = "ledger.verifications.degraded";

    // Questions
    pub const ASK_REQUESTS: &str = "ledger.ask.requests";
    pub const ASK_CONFIDENCE_HIGH: &str = "ledger.ask.confidence.high";
    pub const ASK_CONFIDENCE_MEDIUM: &str = "ledger.ask.confidence.medium";
    pub const ASK_CONFIDENCE_LOW: &str = "ledger.ask.confidence.low";

    pub const ORACLE_FAILURES: &str = "ledger.oracle.failures";

    // Errors
    pub const VALIDATION_ERRORS: &str = "ledger.errors.validation";
    pub const STORE_ERRORS: &str = "ledger.errors.store";

    pub const CHAIN_HEIGHT: &str = "ledger.chain.height";

    /// Prometheus HELP text for a known metric.
    pub fn describe(name: &str) -> Option<&'static str> {
        Some(match name {
            ENTRIES_APPENDED => "Statements appended to the chain",
            APPEND_CONFLICTS => "Append attempts that lost the race for the tail",
            APPEND_CONFLICTS_EXHAUSTED => "Appends that gave up after repeated tail conflicts",
            APPEND_LATENCY => "Append latency including retries",
            VERIFICATIONS_COMPLETED => "Verification requests answered",
            VERIFICATIONS_DEGRADED => "Verifications whose oracle output could not be parsed",
            ASK_REQUESTS => "Questions received",
            ASK_CONFIDENCE_HIGH => "Answers given with high confidence",
            ASK_CONFIDENCE_MEDIUM => "Answers given with medium confidence",
            ASK_CONFIDENCE_LOW => "Answers given with low confidence",
            ORACLE_FAILURES => "Failed completion oracle calls",
            VALIDATION_ERRORS => "Requests rejected by input validation",
            STORE_ERRORS => "Failed store operations",
            CHAIN_HEIGHT => "Height of the chain tail",
            _ => return None,
        })
    }
}

/// Time an async operation into a latency histogram
pub async fn timed<F, T>(metrics: &MetricsRegistry, metric_name: &str, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    metrics
        .observe_latency(metric_name, start.elapsed().as_secs_f64())
        .await;
    result
}
