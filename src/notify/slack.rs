use anyhow::{Context, Result};
use reqwest::Client;

use super::{NotificationEvent, Notifier};

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    /// `None` when `SLACK_WEBHOOK_URL` is unset or blank.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("SLACK_WEBHOOK_URL").ok()?;
        if url.trim().is_empty() {
            return None;
        }
        Some(Self::new(url))
    }

    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
        }
    }
}

pub(crate) fn slack_text(ev: &NotificationEvent) -> String {
    format!("*{}*\n{}", ev.subject, ev.body)
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        let body = serde_json::json!({ "text": slack_text(ev) });

        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_has_bold_subject() {
        let ev = NotificationEvent::completion("Trawler", "Trawler: @t\nnew post");
        assert_eq!(slack_text(&ev), "*Trawler Complete*\nTrawler: @t\nnew post");
    }
}
