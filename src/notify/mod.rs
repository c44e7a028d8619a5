// src/notify/mod.rs
//! Delivery of run reports: Slack, Discord and email, fanned out by [`NotifierMux`].
pub mod discord;
pub mod email;
pub mod slack;

use anyhow::Result;
use std::sync::Arc;

pub use discord::DiscordNotifier;
pub use email::EmailSender;
pub use slack::SlackNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// New results were found.
    Completion,
    /// One or more trawlers failed.
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub kind: NoticeKind,
    pub subject: String,
    pub body: String,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl NotificationEvent {
    pub fn completion(app_name: &str, body: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Completion,
            subject: format!("{app_name} Complete"),
            body: body.into(),
            ts: chrono::Utc::now(),
        }
    }

    pub fn failure(app_name: &str, body: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Failure,
            subject: format!("{app_name} Error"),
            body: body.into(),
            ts: chrono::Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, ev: &NotificationEvent) -> Result<()>;
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        self.send_event(ev).await
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        self.send_event(ev).await
    }
}

/// Sends every event to all configured channels. With none configured the
/// event is only logged.
#[derive(Clone, Default)]
pub struct NotifierMux {
    channels: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Channels whose env vars are present: `SLACK_WEBHOOK_URL`,
    /// `DISCORD_WEBHOOK_URL`, and the `SMTP_*` / `NOTIFY_EMAIL_*` set.
    pub fn from_env() -> Self {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(s) = SlackNotifier::from_env() {
            channels.push(Arc::new(s));
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                channels.push(Arc::new(DiscordNotifier::new(url)));
            }
        }
        match EmailSender::from_env() {
            Ok(Some(e)) => channels.push(Arc::new(e)),
            Ok(None) => {}
            Err(e) => tracing::warn!(target: "notify", error = %format!("{e:#}"), "email channel disabled"),
        }
        tracing::info!(
            target: "notify",
            channels = ?channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "notification channels"
        );
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver to every channel. A failing channel does not stop the others;
    /// the number of failed channels is returned.
    pub async fn send(&self, ev: &NotificationEvent) -> usize {
        if self.channels.is_empty() {
            tracing::info!(target: "notify", kind = ?ev.kind, subject = %ev.subject, "{}", ev.body);
            return 0;
        }
        let mut failed = 0;
        for ch in &self.channels {
            if let Err(e) = ch.send(ev).await {
                failed += 1;
                tracing::warn!(target: "notify", channel = ch.name(), error = %format!("{e:#}"), "notification failed");
            }
        }
        failed
    }
}

// --- Test helper ---
pub struct RecordingNotifier {
    pub events: std::sync::Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(vec![]),
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(ev.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Broken;

    #[async_trait::async_trait]
    impl Notifier for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn send(&self, _ev: &NotificationEvent) -> Result<()> {
            Err(anyhow!("down"))
        }
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let rec = Arc::new(RecordingNotifier::new());
        let mux = NotifierMux::new(vec![Arc::new(Broken), rec.clone()]);
        let failed = mux.send(&NotificationEvent::completion("Trawler", "Trawler: @t\nhello")).await;
        assert_eq!(failed, 1);
        let got = rec.events();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].subject, "Trawler Complete");
    }

    #[tokio::test]
    async fn empty_mux_only_logs() {
        let mux = NotifierMux::default();
        assert!(mux.is_empty());
        assert_eq!(mux.send(&NotificationEvent::failure("Trawler", "x")).await, 0);
    }
}
