use std::net::SocketAddr;

// ── RED metrics (mutation-driven) ───────────────────────────────

/// Counter: total mutations attempted. Labels: op, status.
pub const MUTATIONS_TOTAL: &str = "demandflow_mutations_total";

/// Histogram: mutation latency in seconds (local apply + remote persist).
/// Labels: op.
pub const MUTATION_DURATION_SECONDS: &str = "demandflow_mutation_duration_seconds";

/// Counter: optimistic mutations rolled back after a persistence failure.
/// Labels: op.
pub const ROLLBACKS_TOTAL: &str = "demandflow_rollbacks_total";

// ── Domain counters ─────────────────────────────────────────────

/// Counter: completions recorded past their SLA budget.
pub const SLA_BREACHES_TOTAL: &str = "demandflow_sla_breaches_total";

/// Gauge: demands held in the local snapshot after hydration.
pub const DEMANDS_LOADED: &str = "demandflow_demands_loaded";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Plain stderr tracing subscriber for embedders that have not installed
/// their own.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
