// src/sources/fixture.rs
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::record::Record;
use crate::source::{CycleContext, FetchOrder, Source};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureSpec {
    /// JSON array of records.
    pub path: PathBuf,
    #[serde(default)]
    pub order: FetchOrder,
    /// Field printed per result in reports.
    pub render_field: Option<String>,
}

enum Records {
    Inline(Vec<Record>),
    File(PathBuf),
}

/// Static records, from memory or a JSON file re-read every cycle.
pub struct FixtureSource {
    records: Records,
    order: FetchOrder,
    render_field: String,
}

impl FixtureSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Records::Inline(records),
            order: FetchOrder::OldestFirst,
            render_field: "text".to_string(),
        }
    }

    pub fn from_spec(spec: &FixtureSpec) -> Self {
        Self {
            records: Records::File(spec.path.clone()),
            order: spec.order,
            render_field: spec.render_field.clone().unwrap_or_else(|| "text".to_string()),
        }
    }

    pub fn with_order(mut self, order: FetchOrder) -> Self {
        self.order = order;
        self
    }
}

#[async_trait]
impl Source for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn order(&self) -> FetchOrder {
        self.order
    }

    async fn fetch_raw(&self, _ctx: &CycleContext<'_>) -> Result<Vec<Record>> {
        match &self.records {
            Records::Inline(v) => Ok(v.clone()),
            Records::File(path) => {
                let s = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading fixture records from {}", path.display()))?;
                serde_json::from_str(&s)
                    .with_context(|| format!("parsing fixture records from {}", path.display()))
            }
        }
    }

    fn render(&self, results: &[Record]) -> String {
        results
            .iter()
            .map(|r| r.display_field(&self.render_field))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
