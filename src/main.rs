//! site-trawler: poll every configured source once (or on an interval), report what is new.
//!
//! See `config/trawler.example.toml` for the config layout.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use site_trawler::config::{load_config, LogConfig};
use site_trawler::notify::NotifierMux;
use site_trawler::runner::{run_once, RunOptions};
use site_trawler::sheet::TsvFileSink;

#[derive(Debug, Parser)]
#[command(name = "site-trawler", version, about)]
struct Cli {
    /// Config file (TOML or JSON). Defaults to $TRAWLER_CONFIG_PATH, then config/trawler.{toml,json}.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Saved data file, overriding `saved_data_file` from the config.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Run again every N seconds instead of once.
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    /// Do everything except writing state, rows and notices.
    #[arg(long)]
    dry_run: bool,

    /// Serve Prometheus metrics on this address, e.g. 127.0.0.1:9100.
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

/// `RUST_LOG` first, then `[log] level`, then `trawl=info,warn`.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(log.level.as_deref().unwrap_or("trawl=info,notify=info,warn"))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env so credentials referenced by the config resolve locally.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(&cfg.log);

    if let Some(addr) = cli.metrics_addr {
        site_trawler::metrics::install_exporter(addr)?;
    }

    let http = reqwest::Client::builder()
        .timeout(cfg.connection_timeout())
        .user_agent(concat!("site-trawler/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;
    let fleet = cfg.build_trawlers(&http)?;
    let notifier = NotifierMux::from_env();
    let sink = TsvFileSink::new(&cfg.sheet_dir);
    let mut opts = RunOptions::from_config(&cfg);
    opts.dry_run = cli.dry_run;
    if let Some(state) = cli.state {
        opts.saved_data_file = state;
    }

    let Some(every) = cli.watch else {
        let summary = run_once(&cfg, &fleet, &notifier, &sink, &opts).await?;
        if !summary.body.is_empty() {
            println!("{}", summary.body);
        }
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(every.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_once(&cfg, &fleet, &notifier, &sink, &opts).await {
                    tracing::error!(target: "trawl", error = %format!("{e:#}"), "run failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "trawl", "shutting down");
                return Ok(());
            }
        }
    }
}
