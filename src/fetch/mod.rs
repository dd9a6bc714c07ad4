use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};

use crate::error::FetchError;
use crate::model::{BookRef, DataSourceCode, ListKind};

pub mod goodreads;
pub mod storygraph;

pub use goodreads::GoodreadsFetcher;
pub use storygraph::{StorygraphCredentials, StorygraphFetcher};

/// Reads one user's book lists from a tracker site.
///
/// A fetcher owns one browsing session and must not be driven concurrently.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn source(&self) -> DataSourceCode;

    /// Establishes the session before any list is fetched in a run.
    async fn prepare(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// Returns the list in page order. An empty page is an empty list, not an error.
    async fn fetch_list(
        &self,
        user_external_id: &str,
        kind: ListKind,
    ) -> Result<Vec<BookRef>, FetchError>;

    fn book_url(&self, book_id: &str) -> String;
}

pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) shelfwatch/0.1";

pub(crate) fn build_http_client(timeout: Duration, cookies: bool) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .cookie_store(cookies)
        .build()
        .context("build tracker http client")
}

/// GETs an HTML page and returns its body, failing on non-2xx statuses.
pub(crate) async fn get_html(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let (_, body) = get_page(client, url).await?;
    Ok(body)
}

/// Like [`get_html`], but also returns the URL the redirects ended on.
pub(crate) async fn get_page(
    client: &reqwest::Client,
    url: &str,
) -> Result<(reqwest::Url, String), FetchError> {
    tracing::debug!(url, "fetch page");
    let response = client
        .get(url)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
        .send()
        .await
        .map_err(|err| FetchError::from_reqwest(url, err))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }

    let final_url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|err| FetchError::from_reqwest(url, err))?;
    Ok((final_url, body))
}

pub(crate) fn selector(css: &str) -> anyhow::Result<scraper::Selector> {
    scraper::Selector::parse(css).map_err(|err| anyhow::anyhow!("parse selector {css:?}: {err}"))
}

pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_owned()
}
