// src/metrics.rs
use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "trawl_candidates_total",
            "Raw results considered by the filter pipeline."
        );
        describe_counter!(
            "trawl_accepted_total",
            "Results that passed every filter and were transformed."
        );
        describe_counter!(
            "trawl_rejected_total",
            "Results rejected by the pipeline, labelled by reason."
        );
        describe_counter!(
            "trawl_custom_filter_errors_total",
            "Custom filter failures (candidate treated as rejected)."
        );
        describe_counter!("trawl_fetch_errors_total", "Source fetch failures.");
        describe_counter!("trawl_runs_total", "Completed trawl runs.");
        describe_histogram!("trawl_fetch_ms", "Source fetch time in milliseconds.");
        describe_gauge!("trawl_last_run_ts", "Unix ts when the last run finished.");
    });
}

/// Install the Prometheus recorder with its own HTTP listener on `addr`.
/// Must be called from within a Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(())
}
