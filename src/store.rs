// src/store.rs
//! Saved data file: one JSON object keyed by source id.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::state::SavedDataMap;

/// Missing or blank file means nothing saved yet. Anything unparsable is an error,
/// never silently reset.
pub async fn load_saved_data(path: &Path) -> Result<SavedDataMap> {
    match fs::read_to_string(path).await {
        Ok(s) if s.trim().is_empty() => Ok(SavedDataMap::new()),
        Ok(s) => serde_json::from_str(&s)
            .with_context(|| format!("parsing saved data from {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(target: "trawl", path = %path.display(), "no saved data yet");
            Ok(SavedDataMap::new())
        }
        Err(e) => Err(e).with_context(|| format!("reading saved data from {}", path.display())),
    }
}

/// Write through a sibling temp file and rename, so a crash never leaves half a file.
pub async fn save_saved_data(path: &Path, data: &SavedDataMap) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = temp_path(path);
    let body = serde_json::to_vec_pretty(data).context("serializing saved data")?;
    fs::write(&tmp, body)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    tracing::debug!(target: "trawl", path = %path.display(), sources = data.len(), "saved data written");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
