// src/sources/timeline.rs
//! Timeline of short posts with monotonically increasing numeric ids.
//!
//! The endpoint returns posts newest-first; `since_id` and `count` narrow the
//! request to what the cursor has not covered yet.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::record::Record;
use crate::source::{CycleContext, FetchOrder, Source};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineSpec {
    pub url: String,
    /// Extra query parameters, e.g. `screen_name`, `exclude_replies`.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Env var holding a bearer token.
    pub token_env: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: Option<u64>,
    id_str: Option<String>,
    text: Option<String>,
    full_text: Option<String>,
    created_at: Option<String>,
}

// Tolerate both a bare array and an API envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimelineBody {
    List(Vec<Post>),
    Wrapped { data: Vec<Post> },
}

pub struct TimelineSource {
    url: String,
    query: BTreeMap<String, String>,
    token: Option<String>,
    client: reqwest::Client,
}

impl TimelineSource {
    pub fn from_spec(spec: &TimelineSpec, client: reqwest::Client) -> Result<Self> {
        if spec.url.trim().is_empty() {
            return Err(anyhow!("timeline url must not be empty"));
        }
        Ok(Self {
            url: spec.url.clone(),
            query: spec.query.clone(),
            token: super::token_from_env(spec.token_env.as_deref())?,
            client,
        })
    }

    fn request_query(&self, ctx: &CycleContext<'_>) -> Vec<(String, String)> {
        let mut q: Vec<(String, String)> = self
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(n) = ctx.max_results {
            q.push(("count".into(), n.to_string()));
        }
        if let Some(since) = &ctx.prior.highest_seen_id {
            q.push(("since_id".into(), since.to_string()));
        }
        q
    }
}

/// Parse a timeline body into records, keeping the endpoint's (newest-first) order.
pub fn parse_timeline(body: &str) -> Result<Vec<Record>> {
    let parsed: TimelineBody = serde_json::from_str(body).context("parsing timeline json")?;
    let posts = match parsed {
        TimelineBody::List(v) => v,
        TimelineBody::Wrapped { data } => data,
    };

    let mut out = Vec::with_capacity(posts.len());
    for p in posts {
        let id = match (p.id, p.id_str.as_deref().map(str::parse::<u64>)) {
            (Some(id), _) => id,
            (None, Some(Ok(id))) => id,
            _ => {
                tracing::warn!(target: "trawl", "timeline post without a numeric id, skipping");
                continue;
            }
        };
        let text = p.full_text.or(p.text).unwrap_or_default();
        let mut r = Record::new(id).with("text", text);
        if let Some(date) = p.created_at {
            r.set("date", date);
        }
        out.push(r);
    }
    Ok(out)
}

#[async_trait]
impl Source for TimelineSource {
    fn name(&self) -> &'static str {
        "timeline"
    }

    fn order(&self) -> FetchOrder {
        FetchOrder::NewestFirst
    }

    async fn fetch_raw(&self, ctx: &CycleContext<'_>) -> Result<Vec<Record>> {
        tracing::info!(target: "trawl", source = %ctx.source_id, url = %self.url, "getting timeline");
        let mut req = self.client.get(&self.url).query(&self.request_query(ctx));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.context("timeline http get()")?;
        let status = resp.status();
        let body = resp.text().await.context("timeline http .text()")?;
        if !status.is_success() {
            return Err(anyhow!("({status}) {}", body.trim()));
        }
        parse_timeline(&body)
    }

    fn render(&self, results: &[Record]) -> String {
        results
            .iter()
            .map(|r| r.display_field("text").replace(['\n', '\r'], " "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
