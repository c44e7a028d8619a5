// src/error.rs
use std::time::Duration;

/// Source-level failures surfaced to the orchestrator.
///
/// Every variant names the source it belongs to so failures can be reported
/// next to (not instead of) the successful output of other sources. Per-candidate
/// custom filter failures never become a `TrawlError`; the pipeline recovers them.
#[derive(Debug, thiserror::Error)]
pub enum TrawlError {
    /// The source could not be fetched (unreachable, error status, unparsable body).
    #[error("[{source_id}] failed to load results: {cause:#}")]
    Fetch {
        source_id: String,
        cause: anyhow::Error,
    },

    /// Invalid or missing source parameters, detected before any fetch.
    #[error("[{source_id}] invalid configuration: {message}")]
    Config { source_id: String, message: String },

    /// The cycle did not finish within the configured time budget.
    #[error("[{source_id}] cycle timed out after {after:?}")]
    Timeout { source_id: String, after: Duration },

    /// The cycle task was cancelled or panicked.
    #[error("[{source_id}] cycle aborted: {message}")]
    Aborted { source_id: String, message: String },
}

impl TrawlError {
    pub fn config(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            Self::Fetch { source_id, .. }
            | Self::Config { source_id, .. }
            | Self::Timeout { source_id, .. }
            | Self::Aborted { source_id, .. } => source_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_is_labelled_with_source() {
        let e = TrawlError::Fetch {
            source_id: "@feed".into(),
            cause: anyhow::anyhow!("(503) unavailable").context("timeline http get"),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("[@feed] failed to load results"));
        assert!(msg.contains("503"));
        assert_eq!(e.source_id(), "@feed");
    }
}
