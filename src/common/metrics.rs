//! Directory metrics
//!
//! Prometheus-compatible counters for heartbeat and split traffic. Rejections
//! are counted per error kind so benign staleness can be told apart from
//! structural violations.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 9] = [0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        Self {
            buckets: (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect(),
            boundaries: boundaries.to_vec(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value_ms: f64) {
        let idx = self
            .boundaries
            .iter()
            .position(|&b| value_ms <= b)
            .unwrap_or(self.boundaries.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value_ms * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative `(upper bound, count)` pairs, ending with `+Inf`
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.buckets.len());
        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }
        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));
        result
    }

    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct EndpointMetrics {
    pub requests_total: Counter,
    pub requests_error: Counter,
    pub latency: Histogram,
}

/// Metrics for one directory instance
#[derive(Debug)]
pub struct MetricsRegistry {
    endpoints: Mutex<BTreeMap<String, Arc<EndpointMetrics>>>,
    rejections: Mutex<BTreeMap<&'static str, u64>>,

    pub heartbeats_total: Counter,
    pub heartbeats_accepted: Counter,
    pub regions_discovered: Counter,
    pub asks_total: Counter,
    pub ids_allocated: Counter,
    pub splits_committed: Counter,
    pub split_children_committed: Counter,
    pub benign_rejections: Counter,
    pub structural_rejections: Counter,
    pub regions: Gauge,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(BTreeMap::new()),
            rejections: Mutex::new(BTreeMap::new()),
            heartbeats_total: Counter::new(),
            heartbeats_accepted: Counter::new(),
            regions_discovered: Counter::new(),
            asks_total: Counter::new(),
            ids_allocated: Counter::new(),
            splits_committed: Counter::new(),
            split_children_committed: Counter::new(),
            benign_rejections: Counter::new(),
            structural_rejections: Counter::new(),
            regions: Gauge::new(),
            start_time: Instant::now(),
        }
    }

    /// Count a rejected request by its error classification.
    pub fn record_rejection(&self, err: &crate::Error) {
        *self.rejections.lock().entry(err.kind()).or_insert(0) += 1;
        if err.is_benign() {
            self.benign_rejections.inc();
        } else if err.is_structural() {
            self.structural_rejections.inc();
        }
    }

    pub fn rejections(&self, kind: &str) -> u64 {
        self.rejections.lock().get(kind).copied().unwrap_or(0)
    }

    pub fn endpoint(&self, path: &str) -> Arc<EndpointMetrics> {
        self.endpoints
            .lock()
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    pub fn record_request(&self, path: &str, duration: Duration, success: bool) {
        let endpoint = self.endpoint(path);
        endpoint.requests_total.inc();
        endpoint.latency.observe(duration.as_secs_f64() * 1000.0);
        if !success {
            endpoint.requests_error.inc();
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters = [
            ("minipd_heartbeats_total", "Region heartbeats received", &self.heartbeats_total),
            ("minipd_heartbeats_accepted_total", "Region heartbeats applied", &self.heartbeats_accepted),
            ("minipd_regions_discovered_total", "Regions learned from heartbeats", &self.regions_discovered),
            ("minipd_ask_split_total", "Split id reservations", &self.asks_total),
            ("minipd_ids_allocated_total", "Ids handed out for splits", &self.ids_allocated),
            ("minipd_splits_committed_total", "Split reports committed", &self.splits_committed),
            (
                "minipd_split_children_committed_total",
                "Child regions created by splits",
                &self.split_children_committed,
            ),
            ("minipd_benign_rejections_total", "Stale or unknown-region rejections", &self.benign_rejections),
            (
                "minipd_structural_rejections_total",
                "Range, ordering or id conflicts",
                &self.structural_rejections,
            ),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP minipd_regions Regions in the directory\n");
        out.push_str("# TYPE minipd_regions gauge\n");
        let _ = writeln!(out, "minipd_regions {}", self.regions.get());

        out.push_str("# HELP minipd_uptime_seconds Server uptime in seconds\n");
        out.push_str("# TYPE minipd_uptime_seconds gauge\n");
        let _ = writeln!(out, "minipd_uptime_seconds {}", self.uptime_seconds());

        out.push_str("# HELP minipd_rejections_total Rejected requests by kind\n");
        out.push_str("# TYPE minipd_rejections_total counter\n");
        for (kind, count) in self.rejections.lock().iter() {
            let _ = writeln!(out, "minipd_rejections_total{{kind=\"{}\"}} {}", kind, count);
        }

        let endpoints = self.endpoints.lock();
        out.push_str("# HELP minipd_endpoint_requests_total Requests per endpoint\n");
        out.push_str("# TYPE minipd_endpoint_requests_total counter\n");
        for (path, m) in endpoints.iter() {
            let _ = writeln!(
                out,
                "minipd_endpoint_requests_total{{path=\"{}\"}} {}",
                path,
                m.requests_total.get()
            );
        }
        out.push_str("# HELP minipd_request_duration_ms Request duration in milliseconds\n");
        out.push_str("# TYPE minipd_request_duration_ms histogram\n");
        for (path, m) in endpoints.iter() {
            for (le, count) in m.latency.get_buckets() {
                let le = if le.is_infinite() {
                    "+Inf".to_string()
                } else {
                    le.to_string()
                };
                let _ = writeln!(
                    out,
                    "minipd_request_duration_ms_bucket{{path=\"{}\",le=\"{}\"}} {}",
                    path, le, count
                );
            }
            let _ = writeln!(
                out,
                "minipd_request_duration_ms_sum{{path=\"{}\"}} {}",
                path,
                m.latency.sum()
            );
            let _ = writeln!(
                out,
                "minipd_request_duration_ms_count{{path=\"{}\"}} {}",
                path,
                m.latency.count()
            );
        }

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
