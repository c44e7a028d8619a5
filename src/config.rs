// src/config.rs
//! Application config: global knobs plus one `[[trawlers]]` entry per source.
//!
//! Credentials never live here; sources name the env var that holds them.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::SourceSettings;
use crate::error::TrawlError;
use crate::matcher::{MatchRule, Matcher};
use crate::orchestrator::{Fleet, Trawler};
use crate::rollcall::RollCallConfig;
use crate::sheet::SpreadsheetConfig;
use crate::sources::SourceSpec;

pub const ENV_CONFIG_PATH: &str = "TRAWLER_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_saved_data_file")]
    pub saved_data_file: PathBuf,
    /// Applies to trawlers that do not set their own.
    pub max_results: Option<usize>,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    pub cycle_timeout_secs: Option<u64>,
    #[serde(default = "default_sheet_dir")]
    pub sheet_dir: PathBuf,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub trawlers: Vec<TrawlerSetup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `"trawl=debug,info"`. `RUST_LOG` wins.
    pub level: Option<String>,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrawlerSetup {
    pub id: String,
    pub max_results: Option<usize>,
    #[serde(default)]
    pub match_rules: Vec<MatchRule>,
    pub match_field: Option<String>,
    #[serde(default)]
    pub record_highest_seen_id: bool,
    #[serde(default)]
    pub record_all_seen_ids: bool,
    #[serde(default)]
    pub save_full_results: bool,
    pub roll_call: Option<RollCallConfig>,
    pub spreadsheet: Option<SpreadsheetConfig>,
    pub source: SourceSpec,
}

fn default_app_name() -> String {
    "Trawler".to_string()
}

fn default_saved_data_file() -> PathBuf {
    PathBuf::from("state/saved_data.json")
}

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_sheet_dir() -> PathBuf {
    PathBuf::from("sheets")
}

impl TrawlerSetup {
    /// Engine settings: the model's defaults OR-ed with the trawler's own flags.
    pub fn settings(&self, global_max_results: Option<usize>) -> SourceSettings {
        let d = self.source.defaults();
        SourceSettings {
            id: self.id.trim().to_string(),
            max_results: if d.unbounded {
                None
            } else {
                self.max_results.or(global_max_results)
            },
            match_rules: self.match_rules.clone(),
            match_field: self
                .match_field
                .clone()
                .unwrap_or_else(|| d.match_field.to_string()),
            record_highest_seen_id: self.record_highest_seen_id || d.record_highest_seen_id,
            record_all_seen_ids: self.record_all_seen_ids || d.record_all_seen_ids,
            save_full_results: self.save_full_results || d.save_full_results,
        }
    }
}

impl AppConfig {
    pub fn cycle_timeout(&self) -> Option<Duration> {
        self.cycle_timeout_secs.map(Duration::from_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Checks that make the whole config unusable: the global bound and trawler ids.
    pub fn validate_global(&self) -> Result<(), TrawlError> {
        if self.max_results == Some(0) {
            return Err(TrawlError::config("<global>", "max_results must be at least 1"));
        }
        let mut ids = HashSet::new();
        for t in &self.trawlers {
            let id = t.id.trim();
            if id.is_empty() {
                return Err(TrawlError::config("<unnamed>", "trawler id must not be empty"));
            }
            if !ids.insert(id) {
                return Err(TrawlError::config(id, "duplicate trawler id"));
            }
        }
        Ok(())
    }

    /// Everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), TrawlError> {
        self.validate_global()?;
        self.trawlers
            .iter()
            .try_for_each(|t| t.validate(self.max_results))
    }

    /// Build every source that validates. Credentials are resolved here. Only
    /// global problems are fatal; a broken trawler lands in `setup_errors`.
    pub fn build_trawlers(&self, http: &reqwest::Client) -> Result<Fleet, TrawlError> {
        self.validate_global()?;
        let mut fleet = Fleet::default();
        for t in &self.trawlers {
            match t.build(self.max_results, http) {
                Ok(trawler) => {
                    tracing::debug!(target: "trawl", source = %trawler.id(), model = t.source.model(), "trawler configured");
                    fleet.trawlers.push(trawler);
                }
                Err(e) => {
                    tracing::error!(target: "trawl", source = %e.source_id(), error = %e, "trawler not configured");
                    fleet.setup_errors.push(e);
                }
            }
        }
        Ok(fleet)
    }
}

impl TrawlerSetup {
    pub fn validate(&self, global_max_results: Option<usize>) -> Result<(), TrawlError> {
        let id = self.id.trim();
        if self.max_results == Some(0) {
            return Err(TrawlError::config(id, "max_results must be at least 1"));
        }
        if self.max_results.is_some() && self.source.defaults().unbounded {
            return Err(TrawlError::config(
                id,
                format!("max_results is not supported by the {} model", self.source.model()),
            ));
        }
        let settings = self.settings(global_max_results);
        Matcher::compile(&settings.match_rules, &settings.match_field)
            .map_err(|e| TrawlError::config(id, format!("{e:#}")))?;
        if let Some(rc) = &self.roll_call {
            if rc.names.is_empty() {
                return Err(TrawlError::config(id, "roll_call needs at least one name"));
            }
            if rc.attendee_field.trim().is_empty() {
                return Err(TrawlError::config(id, "roll_call needs an attendee_field"));
            }
        }
        if let Some(sheet) = &self.spreadsheet {
            if self.roll_call.is_none() {
                return Err(TrawlError::config(id, "spreadsheet output needs a roll_call"));
            }
            if sheet.id.trim().is_empty() {
                return Err(TrawlError::config(id, "spreadsheet id must not be empty"));
            }
        }
        Ok(())
    }

    fn build(&self, global_max_results: Option<usize>, http: &reqwest::Client) -> Result<Trawler, TrawlError> {
        self.validate(global_max_results)?;
        let settings = self.settings(global_max_results);
        let source = self.source.build(&settings.id, http)?;
        Ok(Trawler {
            settings,
            source,
            roll_call: self.roll_call.clone(),
            spreadsheet: self.spreadsheet.clone(),
        })
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str()).with_context(|| format!("parsing config {}", path.display()))
}

/// Resolve the config file:
/// 1) `explicit` (the `--config` flag)
/// 2) $TRAWLER_CONFIG_PATH
/// 3) config/trawler.toml
/// 4) config/trawler.json
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    for candidate in ["config/trawler.toml", "config/trawler.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(pb);
        }
    }
    Err(anyhow!(
        "no config found: pass --config, set {ENV_CONFIG_PATH}, or create config/trawler.toml"
    ))
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let path = resolve_config_path(explicit)?;
    tracing::info!(target: "trawl", path = %path.display(), "loading config");
    load_config_from(&path)
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        // No usable extension: sniff.
        _ if s.trim_start().starts_with('{') => Ok(serde_json::from_str(s)?),
        _ => Ok(toml::from_str(s)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const TOML: &str = r#"
app_name = "Flights & Bikes"
max_results = 5

[[trawlers]]
id = "@SecretFlying"
match_rules = [{ pattern = "roundtrip|video", flags = "i" }]
[trawlers.source]
model = "timeline"
url = "https://example.test/statuses.json"

[[trawlers]]
id = "bikes"
max_results = 2
record_highest_seen_id = true
[trawlers.source]
model = "feed"
path = "fixtures/bikes.xml"
"#;

    #[test]
    fn settings_merge_model_defaults_with_overrides() {
        let cfg = parse_config(TOML, "toml").unwrap();
        assert_eq!(cfg.app_name, "Flights & Bikes");
        assert_eq!(cfg.saved_data_file, PathBuf::from("state/saved_data.json"));
        cfg.validate().unwrap();

        let flights = cfg.trawlers[0].settings(cfg.max_results);
        assert_eq!(flights.max_results, Some(5));
        assert_eq!(flights.match_field, "text");
        assert!(flights.record_highest_seen_id);
        assert!(!flights.record_all_seen_ids);

        let bikes = cfg.trawlers[1].settings(cfg.max_results);
        assert_eq!(bikes.max_results, Some(2));
        assert_eq!(bikes.match_field, "title");
        assert!(bikes.record_all_seen_ids);
        assert!(bikes.record_highest_seen_id);
    }

    #[test]
    fn json_configs_parse_too() {
        let json = r#"{"trawlers": [{"id": "f", "source": {"model": "fixture", "path": "f.json"}}]}"#;
        let cfg = parse_config(json, "").unwrap();
        assert_eq!(cfg.trawlers.len(), 1);
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(10));
    }

    fn fixture_trawler(id: &str) -> String {
        format!("[[trawlers]]\nid = \"{id}\"\n[trawlers.source]\nmodel = \"fixture\"\npath = \"x.json\"\n")
    }

    #[test]
    fn validation_catches_bad_entries() {
        let dup = format!("{}{}", fixture_trawler("a"), fixture_trawler("a"));
        let err = parse_config(&dup, "toml").unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let blank = fixture_trawler("  ");
        assert!(parse_config(&blank, "toml").unwrap().validate().is_err());

        let mut cfg = parse_config(&fixture_trawler("a"), "toml").unwrap();
        cfg.trawlers[0].match_rules = vec![MatchRule::new("a", "q")];
        assert!(cfg.validate().is_err());

        let mut cfg = parse_config(&fixture_trawler("a"), "toml").unwrap();
        cfg.trawlers[0].match_rules = vec![MatchRule::new("(unclosed", "")];
        assert!(matches!(cfg.validate(), Err(TrawlError::Config { .. })));

        let mut cfg = parse_config(&fixture_trawler("a"), "toml").unwrap();
        cfg.trawlers[0].spreadsheet = Some(SpreadsheetConfig {
            id: "sheet".into(),
            sub_sheet: None,
        });
        assert!(cfg.validate().unwrap_err().to_string().contains("roll_call"));

        let zero = "max_results = 0\n".to_string() + &fixture_trawler("a");
        assert!(parse_config(&zero, "toml").unwrap().validate().is_err());
    }

    #[test]
    fn one_broken_trawler_does_not_stop_the_others() {
        let broken = r#"
[[trawlers]]
id = "needs-token"
[trawlers.source]
model = "timeline"
url = "https://example.test/t.json"
token_env = "SITE_TRAWLER_TEST_SURELY_UNSET_TOKEN"

[[trawlers]]
id = "bad-rule"
match_rules = [{ pattern = "(" }]
[trawlers.source]
model = "fixture"
path = "x.json"
"#;
        let toml = fixture_trawler("good") + broken;
        let cfg = parse_config(&toml, "toml").unwrap();
        let fleet = cfg.build_trawlers(&reqwest::Client::new()).unwrap();

        let built: Vec<&str> = fleet.trawlers.iter().map(|t| t.id()).collect();
        assert_eq!(built, vec!["good"]);
        let failed: Vec<&str> = fleet.setup_errors.iter().map(|e| e.source_id()).collect();
        assert_eq!(failed, vec!["needs-token", "bad-rule"]);
        assert!(fleet
            .setup_errors
            .iter()
            .all(|e| matches!(e, TrawlError::Config { .. })));

        // Id problems still reject the whole config.
        let dup = format!("{}{}", fixture_trawler("a"), fixture_trawler("a"));
        assert!(parse_config(&dup, "toml")
            .unwrap()
            .build_trawlers(&reqwest::Client::new())
            .is_err());
    }

    #[test]
    fn device_controller_ignores_global_bound() {
        let toml = r#"
max_results = 1

[[trawlers]]
id = "heaters"
[trawlers.source]
model = "device_controller"
base_url = "https://registry.example"
"#;
        let mut cfg = parse_config(toml, "toml").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.trawlers[0].settings(cfg.max_results).max_results, None);

        cfg.trawlers[0].max_results = Some(3);
        assert_eq!(cfg.trawlers[0].settings(cfg.max_results).max_results, None);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("device_controller"), "{err}");
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        assert!(load_config(None).is_err());

        fs::create_dir_all("config").unwrap();
        fs::write("config/trawler.toml", fixture_trawler("from-toml")).unwrap();
        assert_eq!(load_config(None).unwrap().trawlers[0].id, "from-toml");

        let p_json = tmp.path().join("other.json");
        fs::write(
            &p_json,
            r#"{"trawlers": [{"id": "from-env", "source": {"model": "fixture", "path": "x.json"}}]}"#,
        )
        .unwrap();
        env::set_var(ENV_CONFIG_PATH, p_json.display().to_string());
        assert_eq!(load_config(None).unwrap().trawlers[0].id, "from-env");

        // An explicit path beats everything.
        let explicit = tmp.path().join("config/trawler.toml");
        assert_eq!(load_config(Some(&explicit)).unwrap().trawlers[0].id, "from-toml");
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
