// src/source.rs
use anyhow::Result;
use async_trait::async_trait;

use crate::record::Record;
use crate::state::SavedState;

/// Order in which a source returns its raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOrder {
    /// Chronological, ascending ids. Fed to the pipeline as-is.
    #[default]
    OldestFirst,
    /// Reverse-chronological. Reversed before filtering so output stays chronological.
    NewestFirst,
    /// No ordering guarantee (e.g. a device registry).
    Unordered,
}

/// Read-only view of a cycle handed to every source hook.
#[derive(Debug, Clone, Copy)]
pub struct CycleContext<'a> {
    pub source_id: &'a str,
    pub prior: &'a SavedState,
    pub max_results: Option<usize>,
}

/// A pluggable provider of raw records plus its per-candidate hooks.
///
/// Only `fetch_raw` is required. The default custom filter accepts everything
/// and the default transformation is the identity.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &'static str;

    fn order(&self) -> FetchOrder {
        FetchOrder::OldestFirst
    }

    /// Fetch this cycle's raw records. An empty list is a success.
    async fn fetch_raw(&self, ctx: &CycleContext<'_>) -> Result<Vec<Record>>;

    /// Source-specific acceptance test. `Err` is treated as a rejection.
    async fn custom_filter(&self, _record: &Record, _ctx: &CycleContext<'_>) -> Result<bool> {
        Ok(true)
    }

    /// Applied once to each accepted record, before it is reported or saved.
    async fn transform(&self, record: Record, _ctx: &CycleContext<'_>) -> Result<Record> {
        Ok(record)
    }

    /// Human-readable rendering of a cycle's results; empty means "nothing to report".
    fn render(&self, results: &[Record]) -> String {
        results
            .iter()
            .map(|r| r.id.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
