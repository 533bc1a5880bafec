//! Upstream fetch latency, one sample per per-date schedule request.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Longest round trip tracked, in microseconds (10 minutes).
const MAX_TRACKED_US: u64 = 600_000_000;

/// Point-in-time view of the histogram, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

/// Written by the fetcher, read by the status API.
pub struct LatencyStats {
    micros: Mutex<Histogram<u64>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, MAX_TRACKED_US, 3).expect("valid histogram bounds");
        Self {
            micros: Mutex::new(histogram),
        }
    }

    /// Round trips beyond the tracked range are clamped to it.
    pub fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros())
            .unwrap_or(MAX_TRACKED_US)
            .clamp(1, MAX_TRACKED_US);
        if let Ok(mut h) = self.micros.lock() {
            let _ = h.record(us);
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.micros.lock() else {
            return LatencySummary::empty();
        };
        if h.len() == 0 {
            return LatencySummary::empty();
        }
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1_000.0);
        LatencySummary {
            samples: h.len(),
            p50_ms: ms(0.5),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
        }
    }
}

impl LatencySummary {
    fn empty() -> Self {
        Self {
            samples: 0,
            p50_ms: None,
            p95_ms: None,
            p99_ms: None,
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}
