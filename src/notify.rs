use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use tokio::sync::OnceCell;

use crate::model::DataSourceCode;

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Delivers text to the book channel and to the administrator.
///
/// Calls may interleave; implementations must not assume one caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_to_channel(&self, text: &str) -> anyhow::Result<()>;
    async fn send_to_admin(&self, text: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct DiscordSettings {
    pub api_base: String,
    pub token: String,
    pub channel_id: String,
    pub admin_user_id: String,
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    settings: DiscordSettings,
    admin_dm_channel: OnceCell<String>,
}

impl DiscordNotifier {
    /// `timeout` caps each API request so a stalled connection cannot hold up a run.
    pub fn new(settings: DiscordSettings, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build discord http client")?;
        Ok(Self {
            client,
            settings: DiscordSettings {
                api_base: settings.api_base.trim_end_matches('/').to_string(),
                ..settings
            },
            admin_dm_channel: OnceCell::new(),
        })
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let url = format!("{}{path}", self.settings.api_base);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bot {}", self.settings.token))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = resp.status();
        let raw = resp.text().await.context("read discord response body")?;
        if !status.is_success() {
            anyhow::bail!("discord API error ({status}): {raw}");
        }
        if raw.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&raw).context("parse discord response")
    }

    async fn create_message(&self, channel_id: &str, text: &str) -> anyhow::Result<()> {
        self.post_json(
            &format!("/channels/{channel_id}/messages"),
            &serde_json::json!({ "content": text }),
        )
        .await?;
        Ok(())
    }

    async fn admin_channel(&self) -> anyhow::Result<&str> {
        let channel = self
            .admin_dm_channel
            .get_or_try_init(|| async {
                let value = self
                    .post_json(
                        "/users/@me/channels",
                        &serde_json::json!({ "recipient_id": self.settings.admin_user_id }),
                    )
                    .await
                    .context("open admin DM channel")?;
                value
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow::anyhow!("missing `id` in DM channel response"))
            })
            .await?;
        Ok(channel.as_str())
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send_to_channel(&self, text: &str) -> anyhow::Result<()> {
        self.create_message(&self.settings.channel_id, text)
            .await
            .context("send channel message")
    }

    async fn send_to_admin(&self, text: &str) -> anyhow::Result<()> {
        let channel_id = self.admin_channel().await?;
        self.create_message(channel_id, text)
            .await
            .context("send admin message")
    }
}

/// Logs messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_to_channel(&self, text: &str) -> anyhow::Result<()> {
        tracing::info!(text, "channel message (dry run)");
        Ok(())
    }

    async fn send_to_admin(&self, text: &str) -> anyhow::Result<()> {
        tracing::info!(text, "admin message (dry run)");
        Ok(())
    }
}

pub fn mention(chat_user_id: &str) -> String {
    format!("<@{chat_user_id}>")
}

/// Administrator alert texts.
pub mod alerts {
    use chrono::Utc;

    use super::DataSourceCode;

    pub fn sign_in_failed(source: DataSourceCode, err: &str) -> String {
        format!(
            "Error occurred when signing in to {}:\n {err}",
            source.display_name()
        )
    }

    pub fn user_failed(source: DataSourceCode, data_source_user_id: &str, err: &str) -> String {
        format!(
            "{} Error fetching books for {} user {data_source_user_id}\n```{err}```",
            Utc::now().format("%m/%d/%Y, %H:%M:%S"),
            source.display_name()
        )
    }

    pub fn high_error_rate(source: DataSourceCode, error_count: usize, user_count: usize) -> String {
        format!(
            "The total number of {} users with errors is greater than 80%, total errors: {error_count} out of {user_count} users",
            source.display_name()
        )
    }

    pub fn systemic_failure(source: DataSourceCode, user_count: usize) -> String {
        format!(
            "Every one of the {user_count} {} users failed this run. Requesting a restart.",
            source.display_name()
        )
    }

    pub fn zero_books(source: DataSourceCode, user_count: usize) -> String {
        format!(
            "{} scrape found 0 books across {user_count} users. The page layout may have changed.",
            source.display_name()
        )
    }

    pub fn run_aborted(err: &str) -> String {
        format!("Book scrape run aborted before processing users:\n```{err}```")
    }
}
