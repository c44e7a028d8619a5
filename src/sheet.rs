// src/sheet.rs
//! Spreadsheet rows built from roll calls, and the sinks that store them.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::rollcall::RollCallEntry;

pub const SHEET_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetConfig {
    pub id: String,
    #[serde(default)]
    pub sub_sheet: Option<String>,
}

pub fn sheet_timestamp<Tz>(at: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format(SHEET_TIMESTAMP_FORMAT).to_string()
}

/// `[timestamp, value of each entry...]`, in roll-call order.
///
/// Without a `value_field` each cell just says whether the name answered.
pub fn roll_call_row(timestamp: &str, entries: &[RollCallEntry], value_field: Option<&str>) -> Vec<String> {
    let mut row = Vec::with_capacity(entries.len() + 1);
    row.push(timestamp.to_string());
    for e in entries {
        let cell = match value_field {
            Some(field) => match e.get(field) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
            },
            None if e.is_present() => "present".to_string(),
            None => "absent".to_string(),
        };
        row.push(cell);
    }
    row
}

#[async_trait::async_trait]
pub trait RowSink: Send + Sync {
    /// Append one row to the given sheet.
    async fn append_row(&self, sheet: &SpreadsheetConfig, row: Vec<String>) -> Result<()>;
}

/// One tab-separated file per sheet (and sub-sheet) under `dir`.
pub struct TsvFileSink {
    dir: PathBuf,
}

impl TsvFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, sheet: &SpreadsheetConfig) -> PathBuf {
        let mut name = file_safe(&sheet.id);
        if let Some(sub) = &sheet.sub_sheet {
            name.push('-');
            name.push_str(&file_safe(sub));
        }
        self.dir.join(format!("{name}.tsv"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait::async_trait]
impl RowSink for TsvFileSink {
    async fn append_row(&self, sheet: &SpreadsheetConfig, row: Vec<String>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating sheet dir {}", self.dir.display()))?;
        let path = self.path_for(sheet);
        let line = row
            .iter()
            .map(|c| c.replace(['\t', '\n', '\r'], " "))
            .collect::<Vec<_>>()
            .join("\t");
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        f.write_all(format!("{line}\n").as_bytes())
            .await
            .with_context(|| format!("appending to {}", path.display()))?;
        f.flush().await?;
        tracing::debug!(target: "trawl", sheet = %sheet.id, path = %path.display(), "row appended");
        Ok(())
    }
}

// --- Test helper ---
pub struct MemorySink {
    pub rows: std::sync::Mutex<Vec<(SpreadsheetConfig, Vec<String>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            rows: std::sync::Mutex::new(vec![]),
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RowSink for MemorySink {
    async fn append_row(&self, sheet: &SpreadsheetConfig, row: Vec<String>) -> Result<()> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((sheet.clone(), row));
        Ok(())
    }
}
