// src/sources/feed.rs
//! RSS listing feed (classified ads, job boards, ...). Ids are opaque: the
//! item `guid`, or its `link` when there is none. Ad feeds may carry `price`
//! and `location` elements, plain or with the `g:` prefix.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::record::Record;
use crate::source::{CycleContext, FetchOrder, Source};

use super::normalize_text;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedSpec {
    pub url: Option<String>,
    /// Read the feed from a local file instead of HTTP.
    pub path: Option<PathBuf>,
    /// Skip items without a price; on ad sites those are promoted adverts.
    #[serde(default)]
    pub require_price: bool,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(alias = "g:price")]
    price: Option<String>,
    #[serde(alias = "g:location")]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

enum Mode {
    Fixture(String),
    File(PathBuf),
    Http { url: String, client: reqwest::Client },
}

pub struct FeedSource {
    mode: Mode,
    require_price: bool,
}

impl FeedSource {
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            require_price: false,
        }
    }

    pub fn from_url(url: &str, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
            require_price: false,
        }
    }

    pub fn from_spec(spec: &FeedSpec, client: reqwest::Client) -> Result<Self> {
        let source = match (&spec.url, &spec.path) {
            (Some(url), None) if !url.trim().is_empty() => Self::from_url(url, client),
            (None, Some(path)) => Self {
                mode: Mode::File(path.clone()),
                require_price: false,
            },
            _ => return Err(anyhow!("feed needs exactly one of `url` or `path`")),
        };
        Ok(source.with_require_price(spec.require_price))
    }

    pub fn with_require_price(mut self, require_price: bool) -> Self {
        self.require_price = require_price;
        self
    }

    pub fn parse_items_from_str(s: &str) -> Result<Vec<Record>> {
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let link = it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
            let id = match it.guid.map(|g| g.value.trim().to_string()).filter(|g| !g.is_empty()) {
                Some(guid) => guid,
                None => match &link {
                    Some(l) => l.clone(),
                    None => {
                        tracing::debug!(target: "trawl", "feed item without guid or link, skipping");
                        continue;
                    }
                },
            };

            let mut r = Record::new(id)
                .with("title", normalize_text(it.title.as_deref().unwrap_or_default()))
                .with(
                    "description",
                    normalize_text(it.description.as_deref().unwrap_or_default()),
                );
            if let Some(l) = link {
                r.set("url", l);
            }
            if let Some(ts) = it.pub_date.as_deref().and_then(parse_rfc2822_to_unix) {
                r.set("published_at", ts);
            }
            for (field, value) in [("price", it.price), ("location", it.location)] {
                let value = normalize_text(value.as_deref().unwrap_or_default());
                if !value.is_empty() {
                    r.set(field, value);
                }
            }
            out.push(r);
        }
        Ok(out)
    }
}

#[async_trait]
impl Source for FeedSource {
    fn name(&self) -> &'static str {
        "feed"
    }

    fn order(&self) -> FetchOrder {
        FetchOrder::NewestFirst
    }

    async fn fetch_raw(&self, ctx: &CycleContext<'_>) -> Result<Vec<Record>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading feed from {}", path.display()))?,
            Mode::Http { url, client } => {
                tracing::info!(target: "trawl", source = %ctx.source_id, %url, "getting listings");
                let resp = client.get(url).send().await.context("feed http get()")?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(anyhow!("unexpected response: ({status})"));
                }
                resp.text().await.context("feed http .text()")?
            }
        };
        let mut items = Self::parse_items_from_str(&body)?;
        if self.require_price {
            let before = items.len();
            items.retain(|r| r.get_str("price").is_some());
            tracing::debug!(target: "trawl", source = %ctx.source_id, skipped = before - items.len(), "unpriced listings skipped");
        }
        Ok(items)
    }

    /// Title, then location, url and price when the listing has them.
    fn render(&self, results: &[Record]) -> String {
        results
            .iter()
            .map(|r| {
                let lines: Vec<String> = ["title", "location", "url", "price"]
                    .into_iter()
                    .map(|f| r.display_field(f))
                    .filter(|v| !v.is_empty())
                    .collect();
                lines.join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&pound;", "£")
}
