// src/pipeline.rs
//! Per-candidate filtering: common filter, custom filter, transformation.
//!
//! Each step takes the accumulator by value and returns the next one, so a
//! single candidate can be evaluated (and tested) in isolation.

use metrics::counter;
use tracing::{debug, error};

use crate::matcher::{MatchOutcome, Matcher};
use crate::record::Record;
use crate::source::{CycleContext, Source};
use crate::state::{Accumulator, SeenRejection, SeenStateTracker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoRuleMatched,
    Seen(SeenRejection),
    CustomFilter,
    CustomFilterError,
    TransformError,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoRuleMatched => "no_rule_matched",
            Self::Seen(SeenRejection::AtOrBelowHighWater { .. }) => "high_water",
            Self::Seen(SeenRejection::SeenBefore) => "seen_before",
            Self::CustomFilter => "custom_filter",
            Self::CustomFilterError => "custom_filter_error",
            Self::TransformError => "transform_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(Record),
    Rejected(RejectReason),
}

pub struct FilterPipeline<'a> {
    matcher: &'a Matcher,
    tracker: &'a SeenStateTracker,
    source: &'a dyn Source,
    ctx: CycleContext<'a>,
}

impl<'a> FilterPipeline<'a> {
    pub fn new(
        matcher: &'a Matcher,
        tracker: &'a SeenStateTracker,
        source: &'a dyn Source,
        ctx: CycleContext<'a>,
    ) -> Self {
        Self {
            matcher,
            tracker,
            source,
            ctx,
        }
    }

    /// Matcher test and seen-state test. Pure and synchronous.
    pub fn common_filter(&self, record: &Record) -> Result<(), RejectReason> {
        let sid = self.ctx.source_id;
        match self.matcher.evaluate(record) {
            MatchOutcome::NoMatch => {
                debug!(target: "trawl", source = %sid, id = %record.id, "skipped: no rule matched");
                return Err(RejectReason::NoRuleMatched);
            }
            MatchOutcome::Matched { rule, pattern } => {
                debug!(target: "trawl", source = %sid, id = %record.id, rule, %pattern, "matched rule");
            }
            MatchOutcome::Untestable { field } => {
                debug!(target: "trawl", source = %sid, id = %record.id, %field, "match field not testable, letting through");
            }
            MatchOutcome::Unfiltered => {}
        }

        if let Some(seen) = self.tracker.rejection(&record.id) {
            debug!(target: "trawl", source = %sid, id = %record.id, reason = ?seen, "skipped: seen before");
            return Err(RejectReason::Seen(seen));
        }
        Ok(())
    }

    /// Run the full chain on one candidate. Failures stay local to the candidate.
    pub async fn evaluate(&self, record: Record) -> Verdict {
        if let Err(reason) = self.common_filter(&record) {
            return Verdict::Rejected(reason);
        }

        let sid = self.ctx.source_id;
        match self.source.custom_filter(&record, &self.ctx).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(target: "trawl", source = %sid, id = %record.id, "skipped: custom filter");
                return Verdict::Rejected(RejectReason::CustomFilter);
            }
            Err(e) => {
                error!(target: "trawl", source = %sid, id = %record.id, error = %format!("{e:#}"), "custom filter failed");
                counter!("trawl_custom_filter_errors_total", "source" => sid.to_string()).increment(1);
                return Verdict::Rejected(RejectReason::CustomFilterError);
            }
        }

        match self.source.transform(record, &self.ctx).await {
            Ok(r) => Verdict::Accepted(r),
            Err(e) => {
                error!(target: "trawl", source = %sid, error = %format!("{e:#}"), "transformation failed, dropping candidate");
                Verdict::Rejected(RejectReason::TransformError)
            }
        }
    }

    /// Fold one candidate into the accumulator.
    pub async fn step(&self, acc: Accumulator, candidate: Record) -> Accumulator {
        let sid = self.ctx.source_id.to_string();
        counter!("trawl_candidates_total", "source" => sid.clone()).increment(1);

        let acc = self.tracker.observe(acc, &candidate.id);
        let raw_id = candidate.id.clone();
        match self.evaluate(candidate).await {
            Verdict::Accepted(record) => {
                counter!("trawl_accepted_total", "source" => sid).increment(1);
                self.tracker.accept(acc, raw_id, record)
            }
            Verdict::Rejected(reason) => {
                counter!("trawl_rejected_total", "source" => sid, "reason" => reason.label())
                    .increment(1);
                acc
            }
        }
    }
}
