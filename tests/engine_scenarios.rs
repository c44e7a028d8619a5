// tests/engine_scenarios.rs
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use site_trawler::sources::fixture::FixtureSource;
use site_trawler::{
    CycleContext, FetchOrder, MatchRule, Record, RecordId, ReconciliationEngine, SavedState, Source,
    SourceSettings, TrawlError,
};

fn posts() -> Vec<Record> {
    vec![
        Record::new(1).with("text", "roundtrip"),
        Record::new(2).with("text", "other"),
        Record::new(3).with("text", "video"),
    ]
}

fn timeline_settings() -> SourceSettings {
    let mut s = SourceSettings::new("@SecretFlying");
    s.max_results = Some(5);
    s.match_rules = vec![MatchRule::new("roundtrip|video", "i")];
    s.record_highest_seen_id = true;
    s
}

async fn run(settings: SourceSettings, source: impl Source + 'static, prior: SavedState) -> site_trawler::CycleOutput {
    ReconciliationEngine::new(settings, Arc::new(source), prior)
        .expect("valid settings")
        .reconcile()
        .await
        .expect("cycle ok")
}

fn ids(rs: &[Record]) -> Vec<RecordId> {
    rs.iter().map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn matching_posts_are_reported_and_cursor_advances() {
    let out = run(timeline_settings(), FixtureSource::new(posts()), SavedState::default()).await;
    assert_eq!(ids(&out.results), vec![RecordId::from(1), RecordId::from(3)]);
    assert_eq!(out.delta.highest_seen_id, Some(RecordId::from(3)));
    assert_eq!(out.raw_count, 3);
}

#[tokio::test]
async fn prior_cursor_excludes_older_matches() {
    let prior = SavedState {
        highest_seen_id: Some(RecordId::from(2)),
        ..Default::default()
    };
    let out = run(timeline_settings(), FixtureSource::new(posts()), prior).await;
    assert_eq!(ids(&out.results), vec![RecordId::from(3)]);
    assert_eq!(out.delta.highest_seen_id, Some(RecordId::from(3)));
}

#[tokio::test]
async fn cursor_covers_rejected_candidates() {
    // Nothing matches, the cursor still moves past everything considered.
    let mut s = timeline_settings();
    s.match_rules = vec![MatchRule::new("no such words", "")];
    let out = run(s, FixtureSource::new(posts()), SavedState::default()).await;
    assert!(out.results.is_empty());
    assert_eq!(out.delta.highest_seen_id, Some(RecordId::from(3)));
}

#[tokio::test]
async fn newest_first_sources_are_emitted_chronologically() {
    let mut raw = posts();
    raw.reverse();
    let src = FixtureSource::new(raw).with_order(FetchOrder::NewestFirst);
    let out = run(timeline_settings(), src, SavedState::default()).await;
    assert_eq!(ids(&out.results), vec![RecordId::from(1), RecordId::from(3)]);
}

#[tokio::test]
async fn seen_ids_are_never_reemitted_and_only_grow() {
    let listings = vec![
        Record::new("https://ads.example/a").with("title", "bike"),
        Record::new("https://ads.example/b").with("title", "bike rack"),
        Record::new("https://ads.example/c").with("title", "bike helmet"),
    ];
    let mut s = SourceSettings::new("bikes");
    s.match_field = "title".into();
    s.record_all_seen_ids = true;
    let prior = SavedState {
        seen_ids: Some(vec![RecordId::from("https://ads.example/b"), RecordId::from("https://old.example/z")]),
        ..Default::default()
    };

    let out = run(s, FixtureSource::new(listings), prior.clone()).await;
    assert_eq!(
        ids(&out.results),
        vec![RecordId::from("https://ads.example/a"), RecordId::from("https://ads.example/c")]
    );
    let seen = out.delta.seen_ids.expect("seen ids recorded");
    for old in prior.seen_ids.unwrap() {
        assert!(seen.contains(&old));
    }
    assert_eq!(seen.len(), 4);
}

#[tokio::test]
async fn either_tracking_mode_can_reject_a_candidate() {
    let mut s = SourceSettings::new("both");
    s.record_highest_seen_id = true;
    s.record_all_seen_ids = true;
    let prior = SavedState {
        highest_seen_id: Some(RecordId::from(2)),
        seen_ids: Some(vec![RecordId::from(5)]),
        ..Default::default()
    };
    let raw = vec![
        Record::new(1).with("text", "one"),
        Record::new(5).with("text", "five"),
        Record::new(7).with("text", "seven"),
    ];

    // 1 is below the cursor, 5 passes the cursor but was seen before.
    let out = run(s, FixtureSource::new(raw), prior).await;
    assert_eq!(ids(&out.results), vec![RecordId::from(7)]);
    assert_eq!(out.delta.highest_seen_id, Some(RecordId::from(7)));
    assert_eq!(out.delta.seen_ids, Some(vec![RecordId::from(5), RecordId::from(7)]));
}

#[tokio::test]
async fn output_length_is_min_of_bound_and_passing_count() {
    let raw: Vec<Record> = (1..=12u64)
        .map(|n| Record::new(n).with("text", if n % 3 == 0 { "skip" } else { "keep" }))
        .collect();
    let passing = raw.iter().filter(|r| r.get_str("text") == Some("keep")).count();

    for bound in [1usize, 2, 5, 8, 20] {
        let mut s = SourceSettings::new("bounded");
        s.max_results = Some(bound);
        s.match_rules = vec![MatchRule::new("^keep$", "")];
        let out = run(s, FixtureSource::new(raw.clone()), SavedState::default()).await;
        assert_eq!(out.results.len(), bound.min(passing), "bound {bound}");
    }
}

/// Remembers which records were transformed; fails the custom filter on demand.
struct Audited {
    records: Vec<Record>,
    transformed: Mutex<Vec<RecordId>>,
}

#[async_trait]
impl Source for Audited {
    fn name(&self) -> &'static str {
        "audited"
    }

    async fn fetch_raw(&self, _ctx: &CycleContext<'_>) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }

    async fn custom_filter(&self, r: &Record, _ctx: &CycleContext<'_>) -> Result<bool> {
        match r.get_str("text") {
            Some("explode") => Err(anyhow!("lookup failed")),
            Some("nope") => Ok(false),
            _ => Ok(true),
        }
    }

    async fn transform(&self, r: Record, _ctx: &CycleContext<'_>) -> Result<Record> {
        self.transformed.lock().push(r.id.clone());
        Ok(r.with("checked", true))
    }
}

#[tokio::test]
async fn custom_filter_failure_rejects_only_that_candidate() {
    let src = Arc::new(Audited {
        records: vec![
            Record::new(1).with("text", "fine"),
            Record::new(2).with("text", "explode"),
            Record::new(3).with("text", "nope"),
            Record::new(4).with("text", "also fine"),
            Record::new(5).with("text", "past the bound"),
        ],
        transformed: Mutex::new(vec![]),
    });
    let mut s = SourceSettings::new("audited");
    s.max_results = Some(2);
    let out = ReconciliationEngine::new(s, src.clone(), SavedState::default())
        .unwrap()
        .reconcile()
        .await
        .unwrap();

    assert_eq!(ids(&out.results), vec![RecordId::from(1), RecordId::from(4)]);
    assert!(out.results.iter().all(|r| r.get("checked").is_some()));
    // Rejected candidates and those past the bound are never transformed.
    assert_eq!(*src.transformed.lock(), vec![RecordId::from(1), RecordId::from(4)]);
}

struct Down;

#[async_trait]
impl Source for Down {
    fn name(&self) -> &'static str {
        "down"
    }

    async fn fetch_raw(&self, _ctx: &CycleContext<'_>) -> Result<Vec<Record>> {
        Err(anyhow!("(503) upstream unavailable"))
    }
}

#[tokio::test]
async fn fetch_failure_names_the_source() {
    let err = ReconciliationEngine::new(timeline_settings(), Arc::new(Down), SavedState::default())
        .unwrap()
        .reconcile()
        .await
        .unwrap_err();
    assert!(matches!(err, TrawlError::Fetch { .. }));
    let msg = err.to_string();
    assert!(msg.contains("@SecretFlying"), "{msg}");
    assert!(msg.contains("503"), "{msg}");
}

#[tokio::test]
async fn bad_rules_fail_before_fetching() {
    let mut s = timeline_settings();
    s.match_rules = vec![MatchRule::new("(", "i")];
    let err = ReconciliationEngine::new(s, Arc::new(Down), SavedState::default()).err().unwrap();
    assert!(matches!(err, TrawlError::Config { .. }));
}
