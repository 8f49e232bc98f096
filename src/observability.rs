use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "billet_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "billet_http_request_duration_seconds";

/// Counter: booking decisions. Labels: outcome (`booked` or a rejection).
pub const BOOKINGS_TOTAL: &str = "billet_bookings_total";

/// Counter: cancel calls. Labels: result (`cancelled`, `noop`).
pub const CANCELLATIONS_TOTAL: &str = "billet_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for guest-house/room locks, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "billet_lock_wait_seconds";

/// Counter: lock waits that hit the timeout and returned `Busy`.
pub const LOCK_TIMEOUTS_TOTAL: &str = "billet_lock_timeouts_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "billet_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "billet_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "billet_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "billet_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Coarse status class for the request counter, keeps label cardinality low.
pub fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
