//! Status and health check handlers for the reversal webhook service.
//!
//! This module provides HTTP endpoints for monitoring server health and metrics:
//! - `/status` - Dispatcher counters, latency percentiles and process memory
//! - `/health` - Simple health check for systemd/load balancers
//! - `/ready` - Readiness probe
//!
//! # Architecture
//!
//! ```text
//! Webhook handler ──records──> AppState <──reads── status_handler ──> JSON
//!                                 │
//!                                 ▼
//!                      LatencyHistogram + Counters
//! ```
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.1",
//!   "uptime_seconds": 3600,
//!   "events_received": 1024,
//!   "reversals_executed": 998,
//!   "replays_acknowledged": 20,
//!   "noops_acknowledged": 2,
//!   "events_rejected": 3,
//!   "events_failed": 1,
//!   "latency": { "p50_ms": 120.5, "p95_ms": 450.2, "p99_ms": 980.7 }
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use crate::reversal::DispatchOutcome;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for simple liveness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Detailed server status response with dispatcher counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub name: String,
    pub uptime_seconds: u64,

    /// Webhook deliveries received
    pub events_received: u64,

    /// Refunds executed against a provider
    pub reversals_executed: u64,

    /// Deliveries acknowledged as already processed or in flight
    pub replays_acknowledged: u64,

    /// Voids and unsupported actions acknowledged without a provider call
    pub noops_acknowledged: u64,

    /// Deliveries rejected with 400
    pub events_rejected: u64,

    /// Deliveries failed with 500
    pub events_failed: u64,

    pub memory: MemoryMetrics,
    pub latency: LatencyMetrics,

    /// Server status (always "running" if responding)
    pub status: String,

    /// ISO8601 timestamp of when status was generated
    pub timestamp: String,
}

/// Memory usage metrics collected from sysinfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size (bytes)
    pub rss_bytes: u64,

    /// Virtual memory size (bytes)
    pub virtual_bytes: u64,
}

/// Webhook latency percentile metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub total_requests: u64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Thread-safe latency histogram for webhook handling times.
///
/// Tracks latencies from 1 microsecond to 10 minutes with 3 significant
/// figures; provider calls are bounded by the configured timeout well
/// below that.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 600_000_000, 3).expect("static histogram bounds are valid");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a latency value in microseconds.
    ///
    /// Values outside the histogram bounds are silently ignored.
    pub fn record(&self, latency_us: u64) {
        let mut hist = self.inner.write();
        let _ = hist.record(latency_us);
    }

    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_micros() as u64);
    }

    pub fn count(&self) -> u64 {
        self.inner.read().len()
    }

    /// Percentiles converted to milliseconds.
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }

    pub fn reset(&self) {
        self.inner.write().reset();
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Counters shared between the webhook handler and the status endpoint.
///
/// All counters are atomics; the histogram sits behind an `RwLock`.
#[derive(Debug)]
pub struct AppState {
    start_time: Instant,
    events_received: AtomicU64,
    reversals_executed: AtomicU64,
    replays_acknowledged: AtomicU64,
    noops_acknowledged: AtomicU64,
    events_rejected: AtomicU64,
    events_failed: AtomicU64,
    latency_histogram: LatencyHistogram,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            events_received: AtomicU64::new(0),
            reversals_executed: AtomicU64::new(0),
            replays_acknowledged: AtomicU64::new(0),
            noops_acknowledged: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            latency_histogram: LatencyHistogram::new(),
        }
    }

    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    #[inline]
    pub fn record_event_received(&self) -> u64 {
        self.events_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count an acknowledged delivery under the matching counter.
    pub fn record_outcome(&self, outcome: &DispatchOutcome) {
        let counter = if outcome.executed() {
            &self.reversals_executed
        } else if outcome.is_replay() {
            &self.replays_acknowledged
        } else {
            &self.noops_acknowledged
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejection(&self) -> u64 {
        self.events_rejected.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn record_error(&self) -> u64 {
        self.events_failed.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn record_latency(&self, duration: Duration) {
        self.latency_histogram.record_duration(duration);
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn reversals_executed(&self) -> u64 {
        self.reversals_executed.load(Ordering::Relaxed)
    }

    pub fn replays_acknowledged(&self) -> u64 {
        self.replays_acknowledged.load(Ordering::Relaxed)
    }

    pub fn noops_acknowledged(&self) -> u64 {
        self.noops_acknowledged.load(Ordering::Relaxed)
    }

    pub fn events_rejected(&self) -> u64 {
        self.events_rejected.load(Ordering::Relaxed)
    }

    pub fn events_failed(&self) -> u64 {
        self.events_failed.load(Ordering::Relaxed)
    }

    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency_histogram.metrics()
    }

    /// Reset all metrics (useful for testing).
    pub fn reset_metrics(&self) {
        for counter in [
            &self.events_received,
            &self.reversals_executed,
            &self.replays_acknowledged,
            &self.noops_acknowledged,
            &self.events_rejected,
            &self.events_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.latency_histogram.reset();
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// System Metrics Collection
// ============================================================================

/// Memory metrics for the current process; zeros if it cannot be found.
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();

    // sysinfo 0.33 API: refresh_processes with ProcessesToUpdate
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /status`
///
/// Version, uptime, dispatcher counters, process memory and webhook
/// latency percentiles.
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: state.uptime_seconds(),
        events_received: state.events_received(),
        reversals_executed: state.reversals_executed(),
        replays_acknowledged: state.replays_acknowledged(),
        noops_acknowledged: state.noops_acknowledged(),
        events_rejected: state.events_rejected(),
        events_failed: state.events_failed(),
        memory: collect_memory_metrics(),
        latency: state.latency_metrics(),
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// `GET /ready`
#[instrument(skip_all)]
pub async fn readiness_handler() -> impl IntoResponse {
    debug!("Readiness check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Router with `/health`, `/status` and `/ready`.
pub fn status_router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ready", get(readiness_handler))
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
