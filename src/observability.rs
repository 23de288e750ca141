use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation requests answered. Labels: outcome (reserved, unavailable, error).
pub const RESERVATIONS_TOTAL: &str = "rental_reservations_total";

/// Histogram: select + commit latency in seconds.
pub const RESERVE_DURATION_SECONDS: &str = "rental_reserve_duration_seconds";

/// Counter: commits rejected because another reservation landed first.
pub const COMMIT_CONFLICTS_TOTAL: &str = "rental_commit_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: vehicles on record.
pub const FLEET_SIZE: &str = "rental_fleet_size";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rental_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rental_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "rental_wal_compactions_total";

/// Install a fmt subscriber for `tracing`. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
