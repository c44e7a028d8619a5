// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod engine;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod record;
pub mod rollcall;
pub mod source;
pub mod state;

// Concrete sources and the config that wires them up
pub mod config;
pub mod sources;

// Runs, persistence and delivery
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod sheet;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::engine::{CycleOutput, EngineState, ReconciliationEngine, SourceSettings};
pub use crate::error::TrawlError;
pub use crate::matcher::{MatchRule, Matcher};
pub use crate::notify::{NotificationEvent, NotifierMux};
pub use crate::record::{Record, RecordId};
pub use crate::rollcall::{roll_call, RollCallEntry};
pub use crate::source::{CycleContext, FetchOrder, Source};
pub use crate::state::{SavedDataMap, SavedState};
