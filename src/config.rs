use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::fetch::{StorygraphCredentials, goodreads, storygraph};
use crate::notify::{DEFAULT_DISCORD_API_BASE, DiscordSettings};

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Endpoints and secrets read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` in dry-run mode, where messages are only logged.
    pub discord: Option<DiscordSettings>,
    pub storygraph_credentials: Option<StorygraphCredentials>,
    pub goodreads_base_url: String,
    pub storygraph_base_url: String,
    pub http_timeout: Duration,
}

impl Settings {
    pub fn from_env(dry_run: bool) -> anyhow::Result<Self> {
        Self::from_lookup(dry_run, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        dry_run: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &str| {
            optional(name).with_context(|| format!("{name} is required (or pass --dry-run)"))
        };

        let discord = if dry_run {
            None
        } else {
            let api_base = optional("DISCORD_API_BASE")
                .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_owned());
            Some(DiscordSettings {
                api_base: base_url("DISCORD_API_BASE", &api_base)?,
                token: required("DISCORD_TOKEN")?,
                channel_id: required("DISCORD_CHANNEL_ID")?,
                admin_user_id: required("DISCORD_ADMIN_USER_ID")?,
            })
        };

        let storygraph_credentials =
            match (optional("STORYGRAPH_EMAIL"), optional("STORYGRAPH_PASSWORD")) {
                (Some(email), Some(password)) => Some(StorygraphCredentials { email, password }),
                (None, None) => None,
                _ => {
                    tracing::warn!(
                        "only one of STORYGRAPH_EMAIL and STORYGRAPH_PASSWORD is set; StoryGraph sign-in will fail"
                    );
                    None
                }
            };

        let goodreads_base_url = base_url(
            "GOODREADS_BASE_URL",
            &optional("GOODREADS_BASE_URL").unwrap_or_else(|| goodreads::DEFAULT_BASE_URL.to_owned()),
        )?;
        let storygraph_base_url = base_url(
            "STORYGRAPH_BASE_URL",
            &optional("STORYGRAPH_BASE_URL")
                .unwrap_or_else(|| storygraph::DEFAULT_BASE_URL.to_owned()),
        )?;

        let http_timeout = match optional("SHELFWATCH_HTTP_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            Some(raw) => {
                let secs: u64 = raw.parse().with_context(|| {
                    format!("invalid SHELFWATCH_HTTP_TIMEOUT_SECS={raw:?}. expected whole seconds")
                })?;
                if secs == 0 {
                    anyhow::bail!("SHELFWATCH_HTTP_TIMEOUT_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
        };

        Ok(Self {
            discord,
            storygraph_credentials,
            goodreads_base_url,
            storygraph_base_url,
            http_timeout,
        })
    }
}

fn base_url(name: &str, raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw).with_context(|| format!("invalid {name}={raw:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{name} must be http or https: {raw}");
    }
    Ok(raw.trim_end_matches('/').to_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn dry_run_needs_no_discord_settings() {
        let settings = Settings::from_lookup(true, lookup(&[])).unwrap();
        assert!(settings.discord.is_none());
        assert!(settings.storygraph_credentials.is_none());
        assert_eq!(settings.goodreads_base_url, "https://www.goodreads.com");
        assert_eq!(settings.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_token_names_the_variable() {
        let err = Settings::from_lookup(
            false,
            lookup(&[("DISCORD_CHANNEL_ID", "1"), ("DISCORD_ADMIN_USER_ID", "2")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn reads_discord_and_overrides() {
        let settings = Settings::from_lookup(
            false,
            lookup(&[
                ("DISCORD_TOKEN", " secret "),
                ("DISCORD_CHANNEL_ID", "10"),
                ("DISCORD_ADMIN_USER_ID", "20"),
                ("DISCORD_API_BASE", "http://127.0.0.1:9000/api/"),
                ("STORYGRAPH_EMAIL", "me@example.com"),
                ("STORYGRAPH_PASSWORD", "hunter2"),
                ("SHELFWATCH_HTTP_TIMEOUT_SECS", "5"),
            ]),
        )
        .unwrap();
        let discord = settings.discord.unwrap();
        assert_eq!(discord.token, "secret");
        assert_eq!(discord.api_base, "http://127.0.0.1:9000/api");
        assert_eq!(settings.storygraph_credentials.unwrap().email, "me@example.com");
        assert_eq!(settings.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_urls_and_timeouts() {
        assert!(Settings::from_lookup(true, lookup(&[("GOODREADS_BASE_URL", "ftp://x")])).is_err());
        assert!(Settings::from_lookup(true, lookup(&[("STORYGRAPH_BASE_URL", "not a url")])).is_err());
        assert!(
            Settings::from_lookup(true, lookup(&[("SHELFWATCH_HTTP_TIMEOUT_SECS", "0")])).is_err()
        );
    }
}
