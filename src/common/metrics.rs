//! Coordinator metrics
//!
//! Lock-free counters and a Connect latency histogram, rendered in the
//! Prometheus text exposition format by `GET /metrics`.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in the histogram
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&b| value <= b)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Stored as microseconds
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative bucket counts, ending with +Inf
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
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
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Metrics owned by one coordinator instance
#[derive(Debug)]
pub struct ZeroMetrics {
    pub connects_accepted: Counter,
    pub connects_rejected: Counter,
    pub heartbeats: Counter,
    pub groups_created: Counter,
    pub tablet_claims: Counter,
    pub serve_ok: Counter,
    pub serve_not: Counter,
    pub serve_wrong: Counter,
    pub connect_latency: Histogram,
    start_time: Instant,
}

impl ZeroMetrics {
    pub fn new() -> Self {
        Self {
            connects_accepted: Counter::new(),
            connects_rejected: Counter::new(),
            heartbeats: Counter::new(),
            groups_created: Counter::new(),
            tablet_claims: Counter::new(),
            serve_ok: Counter::new(),
            serve_not: Counter::new(),
            serve_wrong: Counter::new(),
            connect_latency: Histogram::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters: [(&str, &str, &Counter); 5] = [
            (
                "minizero_connects_accepted_total",
                "Connect calls that registered or refreshed a member",
                &self.connects_accepted,
            ),
            (
                "minizero_connects_rejected_total",
                "Connect calls that failed",
                &self.connects_rejected,
            ),
            (
                "minizero_heartbeats_total",
                "Liveness refreshes",
                &self.heartbeats,
            ),
            (
                "minizero_groups_created_total",
                "Groups allocated",
                &self.groups_created,
            ),
            (
                "minizero_tablet_claims_total",
                "Unowned tablets claimed",
                &self.tablet_claims,
            ),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP minizero_should_serve_total ShouldServe results by status\n");
        out.push_str("# TYPE minizero_should_serve_total counter\n");
        for (status, counter) in [
            ("ok", &self.serve_ok),
            ("not", &self.serve_not),
            ("wrong", &self.serve_wrong),
        ] {
            let _ = writeln!(
                out,
                "minizero_should_serve_total{{status=\"{}\"}} {}",
                status,
                counter.get()
            );
        }

        out.push_str("# HELP minizero_connect_duration_ms Connect duration in milliseconds\n");
        out.push_str("# TYPE minizero_connect_duration_ms histogram\n");
        for (le, count) in self.connect_latency.get_buckets() {
            if le.is_infinite() {
                let _ = writeln!(
                    out,
                    "minizero_connect_duration_ms_bucket{{le=\"+Inf\"}} {}",
                    count
                );
            } else {
                let _ = writeln!(
                    out,
                    "minizero_connect_duration_ms_bucket{{le=\"{}\"}} {}",
                    le, count
                );
            }
        }
        let _ = writeln!(
            out,
            "minizero_connect_duration_ms_sum {}",
            self.connect_latency.sum()
        );
        let _ = writeln!(
            out,
            "minizero_connect_duration_ms_count {}",
            self.connect_latency.count()
        );

        out.push_str("# HELP minizero_uptime_seconds Coordinator uptime in seconds\n");
        out.push_str("# TYPE minizero_uptime_seconds gauge\n");
        let _ = writeln!(out, "minizero_uptime_seconds {}", self.uptime_seconds());

        out
    }
}

impl Default for ZeroMetrics {
    fn default() -> Self {
        Self::new()
    }
}
