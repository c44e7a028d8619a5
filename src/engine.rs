// src/engine.rs
//! # Reconciliation engine
//! One polling cycle for one source: fetch → filter → bound → state delta.
//!
//! An engine is built for a single cycle and consumed by [`ReconciliationEngine::reconcile`];
//! the next cycle needs a new engine fed with the state this one produced.
//! Nothing is shared between engines, so cycles of different sources can run
//! concurrently without locks.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, info_span, trace, Instrument};

use crate::error::TrawlError;
use crate::matcher::{MatchRule, Matcher};
use crate::pipeline::FilterPipeline;
use crate::record::Record;
use crate::source::{CycleContext, FetchOrder, Source};
use crate::state::{SavedState, SeenStateTracker, TrackingModes};

/// Per-source knobs the engine honours.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub id: String,
    /// `None` means unbounded.
    pub max_results: Option<usize>,
    pub match_rules: Vec<MatchRule>,
    /// Field tested by rules that do not name their own.
    pub match_field: String,
    pub record_highest_seen_id: bool,
    pub record_all_seen_ids: bool,
    pub save_full_results: bool,
}

impl SourceSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_results: None,
            match_rules: Vec::new(),
            match_field: "text".to_string(),
            record_highest_seen_id: false,
            record_all_seen_ids: false,
            save_full_results: false,
        }
    }

    pub fn modes(&self) -> TrackingModes {
        TrackingModes {
            record_highest_seen_id: self.record_highest_seen_id,
            record_all_seen_ids: self.record_all_seen_ids,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Loading,
    Filtering,
    Bounding,
    Done,
    Failed,
}

impl EngineState {
    fn can_move_to(self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Filtering)
                | (Loading, Failed)
                | (Filtering, Bounding)
                | (Bounding, Done)
        )
    }
}

/// What a finished cycle hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    pub source_id: String,
    /// Accepted results, chronological, at most `max_results`.
    pub results: Vec<Record>,
    /// State to merge into the saved data for the next cycle.
    pub delta: SavedState,
    pub raw_count: usize,
}

pub struct ReconciliationEngine {
    settings: SourceSettings,
    source: Arc<dyn Source>,
    prior: SavedState,
    matcher: Matcher,
    tracker: SeenStateTracker,
    state: EngineState,
}

impl ReconciliationEngine {
    /// Validate settings and compile match rules. Fails before anything is fetched.
    pub fn new(
        settings: SourceSettings,
        source: Arc<dyn Source>,
        prior: SavedState,
    ) -> Result<Self, TrawlError> {
        if settings.id.trim().is_empty() {
            return Err(TrawlError::config("<unnamed>", "source id must not be empty"));
        }
        if settings.max_results == Some(0) {
            return Err(TrawlError::config(&settings.id, "max_results must be at least 1"));
        }
        let matcher = Matcher::compile(&settings.match_rules, &settings.match_field)
            .map_err(|e| TrawlError::config(&settings.id, format!("{e:#}")))?;
        let tracker = SeenStateTracker::new(settings.modes(), &prior);

        debug!(target: "trawl", source = %settings.id, kind = source.name(), "initialized");
        Ok(Self {
            settings,
            source,
            prior,
            matcher,
            tracker,
            state: EngineState::Idle,
        })
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// Run the cycle to completion. Output is all-or-nothing.
    pub async fn reconcile(self) -> Result<CycleOutput, TrawlError> {
        let span = info_span!("cycle", source = %self.settings.id);
        self.run().instrument(span).await
    }

    async fn run(self) -> Result<CycleOutput, TrawlError> {
        let Self {
            settings,
            source,
            prior,
            matcher,
            tracker,
            mut state,
        } = self;
        let sid = settings.id.as_str();

        let ctx = CycleContext {
            source_id: sid,
            prior: &prior,
            max_results: settings.max_results,
        };

        transition(&mut state, EngineState::Loading, sid);
        let t0 = Instant::now();
        let fetched = source.fetch_raw(&ctx).await;
        histogram!("trawl_fetch_ms", "source" => sid.to_string())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        let mut raw = match fetched {
            Ok(v) => v,
            Err(cause) => {
                transition(&mut state, EngineState::Failed, sid);
                counter!("trawl_fetch_errors_total", "source" => sid.to_string()).increment(1);
                return Err(TrawlError::Fetch {
                    source_id: sid.to_string(),
                    cause,
                });
            }
        };
        let raw_count = raw.len();
        info!(target: "trawl", source = %sid, raw = raw_count, "got results");

        let order = source.order();
        if order == FetchOrder::NewestFirst {
            raw.reverse();
        }

        transition(&mut state, EngineState::Filtering, sid);
        let pipeline = FilterPipeline::new(&matcher, &tracker, source.as_ref(), ctx);
        let bound = settings.max_results;
        let mut acc = tracker.start();
        let mut pending = raw.into_iter();
        while let Some(candidate) = pending.next() {
            if bound.is_some_and(|n| acc.accepted.len() >= n) {
                // Ordered sources hand the rest to the next cycle untouched; the
                // cursor must not jump past them. Unordered sources have no such
                // guarantee, so their cursor spans every raw id.
                if order == FetchOrder::Unordered {
                    acc = tracker.observe(acc, &candidate.id);
                    for rest in pending.by_ref() {
                        acc = tracker.observe(acc, &rest.id);
                    }
                }
                debug!(target: "trawl", source = %sid, "max results reached, stopping early");
                break;
            }
            acc = pipeline.step(acc, candidate).await;
        }

        transition(&mut state, EngineState::Bounding, sid);
        if let Some(n) = bound {
            acc.accepted.truncate(n);
        }
        let snapshot = settings.save_full_results.then(|| acc.accepted.clone());
        let delta = tracker.delta(&acc, snapshot);

        transition(&mut state, EngineState::Done, sid);
        info!(
            target: "trawl",
            source = %sid,
            kept = acc.accepted.len(),
            highest_seen_id = ?delta.highest_seen_id,
            "final results"
        );

        Ok(CycleOutput {
            source_id: settings.id.clone(),
            results: acc.accepted,
            delta,
            raw_count,
        })
    }
}

fn transition(state: &mut EngineState, next: EngineState, sid: &str) {
    debug_assert!(state.can_move_to(next), "illegal transition {state:?} -> {next:?}");
    trace!(target: "trawl", source = %sid, from = ?*state, to = ?next, "engine state");
    *state = next;
}
