// src/state.rs
//! Per-source persisted state and the de-duplication tracker built on it.
//!
//! Two tracking modes can be enabled independently:
//! - highest-seen-id: a cursor over monotonically increasing ids;
//! - all-seen-ids: an append-only set of every id ever emitted.
//!
//! The seen-id set is never pruned. It grows for the lifetime of the saved
//! data file.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::record::{Record, RecordId};

/// What a source saved at the end of its previous cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highest_seen_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_ids: Option<Vec<RecordId>>,
    /// Snapshot of the last emitted (filtered, transformed) results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Record>>,
}

impl SavedState {
    pub fn is_empty(&self) -> bool {
        self.highest_seen_id.is_none() && self.seen_ids.is_none() && self.results.is_none()
    }

    /// Last known snapshot record whose `field` equals `value`.
    pub fn find_result(&self, field: &str, value: &str) -> Option<&Record> {
        self.results
            .as_deref()?
            .iter()
            .find(|r| r.get_str(field) == Some(value))
    }
}

/// Saved data for every source, keyed by source id. Sorted for stable files.
pub type SavedDataMap = BTreeMap<String, SavedState>;

/// Overlay every non-empty delta onto `prior`. Sources absent from `deltas`
/// (failed or timed out this run) keep their previous entry untouched.
pub fn merge_deltas<'a, I>(prior: &SavedDataMap, deltas: I) -> SavedDataMap
where
    I: IntoIterator<Item = (&'a str, &'a SavedState)>,
{
    let mut out = prior.clone();
    for (source_id, delta) in deltas {
        if delta.is_empty() {
            continue;
        }
        out.insert(source_id.to_string(), delta.clone());
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingModes {
    pub record_highest_seen_id: bool,
    pub record_all_seen_ids: bool,
}

/// Why the tracker rejected a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeenRejection {
    AtOrBelowHighWater { highest: RecordId },
    SeenBefore,
}

/// Immutable fold accumulator threaded through one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    pub highest_seen_id: Option<RecordId>,
    pub new_seen_ids: Vec<RecordId>,
    pub accepted: Vec<Record>,
}

/// Read-only view of the prior state used to judge candidates and to build
/// the state delta at the end of a cycle.
#[derive(Debug, Clone)]
pub struct SeenStateTracker {
    modes: TrackingModes,
    prior_highest: Option<RecordId>,
    prior_seen: Vec<RecordId>,
    prior_seen_set: HashSet<RecordId>,
}

impl SeenStateTracker {
    pub fn new(modes: TrackingModes, prior: &SavedState) -> Self {
        let prior_highest = if modes.record_highest_seen_id {
            prior.highest_seen_id.clone()
        } else {
            None
        };
        let prior_seen = if modes.record_all_seen_ids {
            prior.seen_ids.clone().unwrap_or_default()
        } else {
            Vec::new()
        };
        let prior_seen_set = prior_seen.iter().cloned().collect();
        Self {
            modes,
            prior_highest,
            prior_seen,
            prior_seen_set,
        }
    }

    pub fn modes(&self) -> TrackingModes {
        self.modes
    }

    pub fn prior_highest(&self) -> Option<&RecordId> {
        self.prior_highest.as_ref()
    }

    /// Accumulator to start a cycle from: the cursor begins at the prior high-water mark.
    pub fn start(&self) -> Accumulator {
        Accumulator {
            highest_seen_id: self.prior_highest.clone(),
            ..Accumulator::default()
        }
    }

    /// `Some(reason)` if `id` was already reported in an earlier cycle.
    pub fn rejection(&self, id: &RecordId) -> Option<SeenRejection> {
        if let Some(highest) = &self.prior_highest {
            if id <= highest {
                return Some(SeenRejection::AtOrBelowHighWater {
                    highest: highest.clone(),
                });
            }
        }
        if self.prior_seen_set.contains(id) {
            return Some(SeenRejection::SeenBefore);
        }
        None
    }

    /// Advance the high-water mark over a considered candidate, accepted or not.
    pub fn observe(&self, acc: Accumulator, id: &RecordId) -> Accumulator {
        if !self.modes.record_highest_seen_id {
            return acc;
        }
        let highest_seen_id = match acc.highest_seen_id {
            Some(h) if &h >= id => Some(h),
            _ => Some(id.clone()),
        };
        Accumulator {
            highest_seen_id,
            ..acc
        }
    }

    /// Fold an accepted candidate (its raw id and its transformed record) into `acc`.
    pub fn accept(&self, acc: Accumulator, raw_id: RecordId, record: Record) -> Accumulator {
        let Accumulator {
            highest_seen_id,
            mut new_seen_ids,
            mut accepted,
        } = acc;
        if self.modes.record_all_seen_ids {
            new_seen_ids.push(raw_id);
        }
        accepted.push(record);
        Accumulator {
            highest_seen_id,
            new_seen_ids,
            accepted,
        }
    }

    /// State to persist for the next cycle.
    pub fn delta(&self, acc: &Accumulator, snapshot: Option<Vec<Record>>) -> SavedState {
        let highest_seen_id = if self.modes.record_highest_seen_id {
            acc.highest_seen_id.clone()
        } else {
            None
        };
        let seen_ids = if self.modes.record_all_seen_ids {
            let mut all = self.prior_seen.clone();
            all.extend(acc.new_seen_ids.iter().cloned());
            Some(all)
        } else {
            None
        };
        SavedState {
            highest_seen_id,
            seen_ids,
            results: snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIGH: TrackingModes = TrackingModes {
        record_highest_seen_id: true,
        record_all_seen_ids: false,
    };
    const ALL: TrackingModes = TrackingModes {
        record_highest_seen_id: false,
        record_all_seen_ids: true,
    };

    #[test]
    fn high_water_rejects_at_or_below() {
        let prior = SavedState {
            highest_seen_id: Some(RecordId::from(2)),
            ..Default::default()
        };
        let t = SeenStateTracker::new(HIGH, &prior);
        assert!(t.rejection(&RecordId::from(1)).is_some());
        assert!(t.rejection(&RecordId::from(2)).is_some());
        assert!(t.rejection(&RecordId::from(3)).is_none());
    }

    #[test]
    fn high_water_advances_over_rejected_candidates() {
        let t = SeenStateTracker::new(HIGH, &SavedState::default());
        let acc = t.start();
        let acc = t.observe(acc, &RecordId::from(7));
        let acc = t.observe(acc, &RecordId::from(4));
        assert_eq!(acc.highest_seen_id, Some(RecordId::from(7)));
        assert!(acc.accepted.is_empty());
        assert_eq!(t.delta(&acc, None).highest_seen_id, Some(RecordId::from(7)));
    }

    #[test]
    fn modes_off_ignore_prior_members() {
        let prior = SavedState {
            highest_seen_id: Some(RecordId::from(10)),
            seen_ids: Some(vec![RecordId::from(1)]),
            results: None,
        };
        let t = SeenStateTracker::new(TrackingModes::default(), &prior);
        assert!(t.rejection(&RecordId::from(1)).is_none());
        assert!(t.delta(&t.start(), None).is_empty());
    }

    #[test]
    fn seen_ids_are_append_only() {
        let prior = SavedState {
            seen_ids: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        let t = SeenStateTracker::new(ALL, &prior);
        assert_eq!(t.rejection(&"a".into()), Some(SeenRejection::SeenBefore));

        let acc = t.accept(t.start(), "c".into(), Record::new("c"));
        let delta = t.delta(&acc, None);
        assert_eq!(delta.seen_ids, Some(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn merge_keeps_untouched_sources() {
        let mut prior = SavedDataMap::new();
        prior.insert(
            "failed".into(),
            SavedState {
                highest_seen_id: Some(RecordId::from(5)),
                ..Default::default()
            },
        );
        let ok = SavedState {
            seen_ids: Some(vec!["x".into()]),
            ..Default::default()
        };
        let empty = SavedState::default();
        let merged = merge_deltas(&prior, [("ok", &ok), ("quiet", &empty)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["failed"].highest_seen_id, Some(RecordId::from(5)));
        assert_eq!(merged["ok"], ok);
    }

    #[test]
    fn saved_state_uses_camel_case_keys() {
        let s = SavedState {
            highest_seen_id: Some(RecordId::from(3)),
            seen_ids: Some(vec!["u".into()]),
            results: None,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v, serde_json::json!({"highestSeenId": 3, "seenIds": ["u"]}));
    }
}
