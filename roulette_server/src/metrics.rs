//! Prometheus metrics for the roulette server.
//!
//! Metrics are exposed in Prometheus text format on a separate listener
//! when `METRICS_BIND` is set.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use roulette_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/v1/roulette/start", 200);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use roulette::{dispatch::Dispatcher, hub::HubHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Increment the request counter with method, path and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

pub fn websocket_connections_active(count: u64) {
    metrics::gauge!("websocket_connections_active").set(count as f64);
}

pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

// ============================================================================
// Game Metrics
// ============================================================================

pub fn rounds_started_total() {
    metrics::counter!("rounds_started_total").increment(1);
}

pub fn bets_placed_total(count: usize) {
    metrics::counter!("bets_placed_total").increment(count as u64);
}

/// Record the amount paid out when a round settles.
pub fn payouts(total: i64, winners: usize) {
    metrics::counter!("payout_bets_total").increment(winners as u64);
    metrics::histogram!("payout_amount").record(total as f64);
}

/// Count a failed round operation by error kind.
pub fn game_errors_total(kind: &str) {
    metrics::counter!("game_errors_total", "kind" => kind.to_string()).increment(1);
}

// ============================================================================
// Background Metrics
// ============================================================================

/// Periodically copy dispatcher and hub counters into gauges.
///
/// Stops when the hub is gone.
pub fn spawn_background_gauges(
    dispatcher: Dispatcher,
    hub: HubHandle,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            let jobs = dispatcher.stats();
            metrics::gauge!("dispatcher_jobs_scheduled").set(jobs.scheduled as f64);
            metrics::gauge!("dispatcher_jobs_executed").set(jobs.executed as f64);
            metrics::gauge!("dispatcher_jobs_failed").set(jobs.failed as f64);
            metrics::gauge!("dispatcher_jobs_dropped").set(jobs.dropped as f64);

            match hub.stats().await {
                Ok(stats) => {
                    metrics::gauge!("hub_channels").set(stats.channels as f64);
                    metrics::gauge!("hub_subscriptions").set(stats.subscriptions as f64);
                    metrics::gauge!("hub_frames_delivered").set(stats.delivered as f64);
                    metrics::gauge!("hub_frames_dropped").set(stats.dropped as f64);
                }
                Err(e) => {
                    log::warn!("Stopping background metrics: {}", e);
                    break;
                }
            }
        }
    })
}
