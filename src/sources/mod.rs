// src/sources/mod.rs
//! Concrete sources and the config that selects them.
//!
//! Each model carries the defaults of the trawler kind it stands for: which
//! field rules test, and which tracking modes it always needs.

pub mod devices;
pub mod feed;
pub mod fixture;
pub mod timeline;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;

use crate::error::TrawlError;
use crate::source::Source;

use self::devices::{DeviceController, DeviceControllerSpec, DeviceWatcher, DeviceWatcherSpec, HttpDeviceApi};
use self::feed::{FeedSource, FeedSpec};
use self::fixture::{FixtureSource, FixtureSpec};
use self::timeline::{TimelineSource, TimelineSpec};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SourceSpec {
    Timeline(TimelineSpec),
    Feed(FeedSpec),
    Devices(DeviceWatcherSpec),
    DeviceController(DeviceControllerSpec),
    Fixture(FixtureSpec),
}

/// Tracking a model switches on regardless of the trawler's own flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelDefaults {
    pub match_field: &'static str,
    pub record_highest_seen_id: bool,
    pub record_all_seen_ids: bool,
    pub save_full_results: bool,
    /// The whole result set is needed every cycle, so `max_results` never applies.
    pub unbounded: bool,
}

impl SourceSpec {
    pub fn model(&self) -> &'static str {
        match self {
            Self::Timeline(_) => "timeline",
            Self::Feed(_) => "feed",
            Self::Devices(_) => "devices",
            Self::DeviceController(_) => "device_controller",
            Self::Fixture(_) => "fixture",
        }
    }

    pub fn defaults(&self) -> ModelDefaults {
        match self {
            Self::Timeline(_) => ModelDefaults {
                match_field: "text",
                record_highest_seen_id: true,
                ..ModelDefaults::default()
            },
            Self::Feed(_) => ModelDefaults {
                match_field: "title",
                record_all_seen_ids: true,
                ..ModelDefaults::default()
            },
            Self::Devices(_) => ModelDefaults {
                match_field: "name",
                ..ModelDefaults::default()
            },
            Self::DeviceController(_) => ModelDefaults {
                match_field: "name",
                save_full_results: true,
                unbounded: true,
                ..ModelDefaults::default()
            },
            Self::Fixture(_) => ModelDefaults {
                match_field: "text",
                ..ModelDefaults::default()
            },
        }
    }

    /// Build the source. Missing parameters or credentials are configuration errors.
    pub fn build(&self, source_id: &str, http: &reqwest::Client) -> Result<Arc<dyn Source>, TrawlError> {
        let cfg_err = |e: anyhow::Error| TrawlError::config(source_id, format!("{e:#}"));
        let source: Arc<dyn Source> = match self {
            Self::Timeline(spec) => Arc::new(TimelineSource::from_spec(spec, http.clone()).map_err(cfg_err)?),
            Self::Feed(spec) => Arc::new(FeedSource::from_spec(spec, http.clone()).map_err(cfg_err)?),
            Self::Devices(spec) => {
                let api = HttpDeviceApi::new(&spec.base_url, spec.token_env.as_deref(), http.clone())
                    .map_err(cfg_err)?;
                Arc::new(DeviceWatcher::new(api, spec.clone()))
            }
            Self::DeviceController(spec) => {
                let api = HttpDeviceApi::new(&spec.base_url, spec.token_env.as_deref(), http.clone())
                    .map_err(cfg_err)?;
                Arc::new(DeviceController::new(api, spec.clone()))
            }
            Self::Fixture(spec) => Arc::new(FixtureSource::from_spec(spec)),
        };
        Ok(source)
    }
}

/// Resolve a credential from the environment when the config names a variable.
pub(crate) fn token_from_env(var: Option<&str>) -> anyhow::Result<Option<String>> {
    match var {
        None => Ok(None),
        Some(name) => std::env::var(name)
            .map(Some)
            .map_err(|_| anyhow::anyhow!("missing {name} env var")),
    }
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (newlines included)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}
