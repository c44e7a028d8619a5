// src/runner.rs
//! One full run: load saved data, run every trawler, write rows and state, notify.
use std::path::PathBuf;

use anyhow::Result;
use metrics::{counter, gauge};

use crate::config::AppConfig;
use crate::metrics::ensure_metrics_described;
use crate::notify::{NotificationEvent, NotifierMux};
use crate::orchestrator::{run_all, Fleet};
use crate::report::{completion_body, error_body};
use crate::sheet::{roll_call_row, sheet_timestamp, RowSink};
use crate::store::{load_saved_data, save_saved_data};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub saved_data_file: PathBuf,
    /// Compute everything but write no state, no rows, send no notices.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            saved_data_file: cfg.saved_data_file.clone(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Completion notice body; empty when nothing new was found.
    pub body: String,
    pub errors: Vec<String>,
    pub rows_written: usize,
    pub state_written: bool,
}

/// Only a missing-or-corrupt saved data file aborts the run. Every other
/// failure, including trawlers that could not be configured, ends up in
/// `errors` and in the error notice.
pub async fn run_once(
    cfg: &AppConfig,
    fleet: &Fleet,
    notifier: &NotifierMux,
    sink: &dyn RowSink,
    opts: &RunOptions,
) -> Result<RunSummary> {
    ensure_metrics_described();
    let saved = load_saved_data(&opts.saved_data_file).await?;
    let trawlers = &fleet.trawlers;
    let outcome = run_all(trawlers, &saved, cfg.cycle_timeout()).await;

    let mut summary = RunSummary {
        errors: fleet
            .setup_errors
            .iter()
            .chain(&outcome.errors)
            .map(ToString::to_string)
            .collect(),
        ..RunSummary::default()
    };

    let timestamp = sheet_timestamp(chrono::Utc::now());
    let mut sections = Vec::with_capacity(outcome.cycles.len());
    for cycle in &outcome.cycles {
        let Some(t) = trawlers.iter().find(|t| t.id() == cycle.source_id) else {
            continue;
        };
        if let Some(rc) = &t.roll_call {
            let entries = rc.reconcile(&cycle.results);
            let absent = entries.iter().filter(|e| !e.is_present()).count();
            tracing::info!(target: "trawl", source = %cycle.source_id, expected = entries.len(), absent, "roll call");
            if let Some(sheet) = &t.spreadsheet {
                let row = roll_call_row(&timestamp, &entries, rc.value_field.as_deref());
                if opts.dry_run {
                    tracing::info!(target: "trawl", sheet = %sheet.id, ?row, "dry run, row not written");
                } else {
                    // Rows go out one at a time so sheets see them in trawler order.
                    match sink.append_row(sheet, row).await {
                        Ok(()) => summary.rows_written += 1,
                        Err(e) => summary
                            .errors
                            .push(format!("[{}] could not append spreadsheet row: {e:#}", cycle.source_id)),
                    }
                }
            }
        }
        if !cycle.results.is_empty() {
            sections.push((cycle.source_id.as_str(), t.source.render(&cycle.results)));
        }
    }
    summary.body = completion_body(sections);

    if outcome.changed && !opts.dry_run {
        match save_saved_data(&opts.saved_data_file, &outcome.saved).await {
            Ok(()) => summary.state_written = true,
            Err(e) => summary.errors.push(format!("could not write saved data: {e:#}")),
        }
    }

    counter!("trawl_runs_total").increment(1);
    gauge!("trawl_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    tracing::info!(
        target: "trawl",
        cycles = outcome.cycles.len(),
        errors = summary.errors.len(),
        rows = summary.rows_written,
        state_written = summary.state_written,
        "run finished"
    );

    if opts.dry_run {
        if !summary.body.is_empty() {
            tracing::info!(target: "trawl", "dry run, completion notice:\n{}", summary.body);
        }
        return Ok(summary);
    }
    if !summary.body.is_empty() {
        notifier
            .send(&NotificationEvent::completion(&cfg.app_name, summary.body.clone()))
            .await;
    }
    if !summary.errors.is_empty() {
        notifier
            .send(&NotificationEvent::failure(&cfg.app_name, error_body(&summary.errors)))
            .await;
    }
    Ok(summary)
}
