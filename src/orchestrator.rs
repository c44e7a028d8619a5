// src/orchestrator.rs
//! Runs one cycle of every trawler concurrently and folds the results together.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::engine::{CycleOutput, ReconciliationEngine, SourceSettings};
use crate::error::TrawlError;
use crate::rollcall::RollCallConfig;
use crate::sheet::SpreadsheetConfig;
use crate::source::Source;
use crate::state::{merge_deltas, SavedDataMap};

/// A configured source plus what to do with its results.
#[derive(Clone)]
pub struct Trawler {
    pub settings: SourceSettings,
    pub source: Arc<dyn Source>,
    pub roll_call: Option<RollCallConfig>,
    pub spreadsheet: Option<SpreadsheetConfig>,
}

impl Trawler {
    pub fn new(settings: SourceSettings, source: Arc<dyn Source>) -> Self {
        Self {
            settings,
            source,
            roll_call: None,
            spreadsheet: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }
}

/// Every trawler that could be built, plus a labeled error for each one that could not.
#[derive(Default)]
pub struct Fleet {
    pub trawlers: Vec<Trawler>,
    pub setup_errors: Vec<TrawlError>,
}

#[derive(Debug)]
pub struct RunOutcome {
    /// Successful cycles, in trawler order.
    pub cycles: Vec<CycleOutput>,
    pub errors: Vec<TrawlError>,
    /// Prior saved data overlaid with every non-empty delta.
    pub saved: SavedDataMap,
    pub changed: bool,
}

/// Start every cycle at once, then collect them in trawler order. A trawler
/// that fails or times out keeps its prior saved state.
pub async fn run_all(trawlers: &[Trawler], saved: &SavedDataMap, cycle_timeout: Option<Duration>) -> RunOutcome {
    let mut errors = Vec::new();
    let mut handles: Vec<(String, JoinHandle<Result<CycleOutput, TrawlError>>)> = Vec::with_capacity(trawlers.len());

    for t in trawlers {
        let prior = saved.get(t.id()).cloned().unwrap_or_default();
        let engine = match ReconciliationEngine::new(t.settings.clone(), t.source.clone(), prior) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(target: "trawl", error = %e, "trawler not started");
                errors.push(e);
                continue;
            }
        };
        let sid = t.id().to_string();
        let handle = tokio::spawn(async move {
            let source_id = engine.id().to_string();
            match cycle_timeout {
                Some(after) => tokio::time::timeout(after, engine.reconcile())
                    .await
                    .unwrap_or(Err(TrawlError::Timeout { source_id, after })),
                None => engine.reconcile().await,
            }
        });
        handles.push((sid, handle));
    }

    let mut cycles = Vec::with_capacity(handles.len());
    for (sid, handle) in handles {
        let res = handle.await.unwrap_or_else(|join_err| {
            Err(TrawlError::Aborted {
                source_id: sid,
                message: join_err.to_string(),
            })
        });
        match res {
            Ok(out) => cycles.push(out),
            Err(e) => {
                tracing::error!(target: "trawl", source = %e.source_id(), error = %e, "cycle failed");
                errors.push(e);
            }
        }
    }

    let merged = merge_deltas(saved, cycles.iter().map(|c| (c.source_id.as_str(), &c.delta)));
    let changed = &merged != saved;
    RunOutcome {
        cycles,
        errors,
        saved: merged,
        changed,
    }
}
