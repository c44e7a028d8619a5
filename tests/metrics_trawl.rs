// tests/metrics_trawl.rs
#![cfg(feature = "strict-metrics")]
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use site_trawler::metrics::ensure_metrics_described;
use site_trawler::sources::fixture::FixtureSource;
use site_trawler::{MatchRule, Record, ReconciliationEngine, SavedState, SourceSettings};

#[tokio::test]
async fn pipeline_series_exposed_after_cycle() {
    // Install a local recorder for the test
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");
    ensure_metrics_described();

    let mut s = SourceSettings::new("metered");
    s.match_rules = vec![MatchRule::new("keep", "")];
    let src = FixtureSource::new(vec![
        Record::new(1).with("text", "keep"),
        Record::new(2).with("text", "drop"),
    ]);
    let out = ReconciliationEngine::new(s, Arc::new(src), SavedState::default())
        .unwrap()
        .reconcile()
        .await
        .unwrap();
    assert_eq!(out.results.len(), 1);

    let text = handle.render();
    for needle in [
        "trawl_candidates_total",
        "trawl_accepted_total",
        "trawl_rejected_total",
        "trawl_fetch_ms",
    ] {
        assert!(text.contains(needle), "metrics exposition missing '{needle}'\n{text}");
    }
}
