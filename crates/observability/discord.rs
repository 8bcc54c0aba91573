use super::notifier::{AlertEnvelope, AlertProvider};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use url::Url;

const DISCORD_CONTENT_LIMIT: usize = 2000;

pub(crate) struct DiscordWebhookProvider {
    webhook_url: Url,
    client: Client,
}

impl DiscordWebhookProvider {
    pub(crate) fn new(webhook_url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|_| anyhow!("failed to build discord webhook client"))?;

        Ok(Self {
            webhook_url,
            client,
        })
    }
}

fn format_content(envelope: &AlertEnvelope) -> String {
    let content = format!(
        "**{}** `{}` `{}` `{}`\n`{}`\n> {}",
        envelope.service_name,
        envelope.environment,
        envelope.component,
        envelope.kind,
        envelope
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        envelope.message.trim(),
    );
    truncate_for_discord(content)
}

#[async_trait]
impl AlertProvider for DiscordWebhookProvider {
    async fn send(&self, envelope: &AlertEnvelope) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&json!({ "content": format_content(envelope) }))
            .send()
            .await
            .map_err(sanitize_reqwest_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!(
            "discord webhook returned non-success status: {}",
            response.status()
        ))
    }

    fn provider_name(&self) -> &'static str {
        "discord"
    }
}

// reqwest errors carry the URL, which carries the webhook secret.
fn sanitize_reqwest_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("discord webhook request timed out");
    }
    if error.is_connect() {
        return anyhow!("discord webhook connection failed");
    }
    anyhow!("discord webhook request failed")
}

fn truncate_for_discord(content: String) -> String {
    const SUFFIX: &str = "\n… (truncated)";

    if content.chars().count() <= DISCORD_CONTENT_LIMIT {
        return content;
    }

    let allowed = DISCORD_CONTENT_LIMIT.saturating_sub(SUFFIX.chars().count());
    let mut truncated: String = content.chars().take(allowed).collect();
    truncated.push_str(SUFFIX);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn long_messages_fit_discord_limit() {
        let envelope = AlertEnvelope {
            timestamp: Utc::now(),
            service_name: "bot-orchestrator".to_string(),
            environment: "production".to_string(),
            component: "worker".to_string(),
            kind: "partial_failure",
            message: "x".repeat(5000),
        };

        let content = format_content(&envelope);
        assert_eq!(content.chars().count(), DISCORD_CONTENT_LIMIT);
        assert!(content.ends_with("(truncated)"));
        assert!(content.contains("`partial_failure`"));
    }
}
