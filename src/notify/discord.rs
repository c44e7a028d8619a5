use super::{NoticeKind, NotificationEvent};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

// Discord rejects embed descriptions above 4096 chars.
const MAX_DESCRIPTION: usize = 4000;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub async fn send_event(&self, ev: &NotificationEvent) -> Result<()> {
        let payload = DiscordWebhookPayload::from_event(ev);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                            continue;
                        }
                        return Err(anyhow!("Discord webhook HTTP error: {e}"));
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(anyhow!("Discord webhook request failed: {e}"));
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn from_event(ev: &NotificationEvent) -> Self {
        let mut description = ev.body.clone();
        if description.chars().count() > MAX_DESCRIPTION {
            description = description.chars().take(MAX_DESCRIPTION).collect();
            description.push_str("\n...");
        }
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: ev.subject.clone(),
                description,
                color: match ev.kind {
                    NoticeKind::Completion => 0x2ecc71,
                    NoticeKind::Failure => 0xe74c3c,
                },
                timestamp: ev.ts.to_rfc3339(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_bodies_are_cut() {
        let ev = NotificationEvent::failure("Trawler", "x".repeat(5000));
        let p = DiscordWebhookPayload::from_event(&ev);
        assert_eq!(p.embeds[0].title, "Trawler Error");
        assert!(p.embeds[0].description.ends_with("\n..."));
        assert_eq!(p.embeds[0].color, 0xe74c3c);
    }
}
