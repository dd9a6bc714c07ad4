use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};

use crate::error::FetchError;
use crate::fetch::{
    BROWSER_USER_AGENT, PageFetcher, build_http_client, get_html, get_page, selector, trim_base_url,
};
use crate::model::{BookRef, DataSourceCode, ListKind};

pub const DEFAULT_BASE_URL: &str = "https://app.thestorygraph.com";

const SIGN_IN_PATH: &str = "/users/sign_in";

#[derive(Debug, Clone)]
pub struct StorygraphCredentials {
    pub email: String,
    pub password: String,
}

struct PaneSelectors {
    main: Selector,
    panes_container: Selector,
    panes: Selector,
    title: Selector,
    authenticity_token: Selector,
}

impl PaneSelectors {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            main: selector("main")?,
            panes_container: selector(".read-books-panes")?,
            panes: selector(".read-books-panes > div")?,
            title: selector(".book-title-author-and-series a")?,
            authenticity_token: selector("input[name=authenticity_token]")?,
        })
    }
}

/// StoryGraph lists are only visible to a signed-in account, so this fetcher
/// keeps one cookie jar that every user of a run shares.
pub struct StorygraphFetcher {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<StorygraphCredentials>,
    selectors: PaneSelectors,
}

impl StorygraphFetcher {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Option<StorygraphCredentials>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_http_client(timeout, true)?,
            base_url: trim_base_url(base_url),
            credentials,
            selectors: PaneSelectors::new()?,
        })
    }

    fn list_url(&self, user_external_id: &str, kind: ListKind) -> String {
        let path = match kind {
            ListKind::CurrentlyReading => "currently-reading",
            ListKind::Finished => "books-read",
        };
        format!("{}/{path}/{user_external_id}", self.base_url)
    }

    fn authenticity_token(&self, sign_in_html: &str) -> Option<String> {
        let document = Html::parse_document(sign_in_html);
        document
            .select(&self.selectors.authenticity_token)
            .next()
            .and_then(|input| input.value().attr("value"))
            .map(str::to_owned)
    }
}

#[async_trait]
impl PageFetcher for StorygraphFetcher {
    fn source(&self) -> DataSourceCode {
        DataSourceCode::Storygraph
    }

    async fn prepare(&self) -> Result<(), FetchError> {
        let Some(credentials) = &self.credentials else {
            return Err(FetchError::SignIn {
                reason: "STORYGRAPH_EMAIL / STORYGRAPH_PASSWORD are not configured".to_owned(),
            });
        };

        let sign_in_url = format!("{}{SIGN_IN_PATH}", self.base_url);
        let (landed_on, sign_in_html) = get_page(&self.client, &sign_in_url).await?;
        // The cookie jar outlives a run; a live session is sent away from the form.
        if !landed_on.path().starts_with(SIGN_IN_PATH) {
            tracing::debug!(url = %landed_on, "storygraph session still signed in");
            return Ok(());
        }
        let Some(token) = self.authenticity_token(&sign_in_html) else {
            return Err(FetchError::SignIn {
                reason: "sign-in form has no authenticity token".to_owned(),
            });
        };

        let response = self
            .client
            .post(&sign_in_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .form(&[
                ("authenticity_token", token.as_str()),
                ("user[email]", credentials.email.as_str()),
                ("user[password]", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(&sign_in_url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::SignIn {
                reason: format!("sign-in returned HTTP {status}"),
            });
        }
        if response.url().path().starts_with(SIGN_IN_PATH) {
            return Err(FetchError::SignIn {
                reason: "credentials were rejected".to_owned(),
            });
        }

        tracing::info!("signed in to storygraph");
        Ok(())
    }

    async fn fetch_list(
        &self,
        user_external_id: &str,
        kind: ListKind,
    ) -> Result<Vec<BookRef>, FetchError> {
        let url = self.list_url(user_external_id, kind);
        let body = get_html(&self.client, &url).await?;
        parse_panes(&self.selectors, &url, &body)
    }

    fn book_url(&self, book_id: &str) -> String {
        format!("{}/books/{book_id}", self.base_url)
    }
}

fn parse_panes(
    selectors: &PaneSelectors,
    url: &str,
    body: &str,
) -> Result<Vec<BookRef>, FetchError> {
    let document = Html::parse_document(body);
    if document.select(&selectors.main).next().is_none() {
        return Err(FetchError::layout(url, "page has no main element"));
    }
    if document.select(&selectors.panes_container).next().is_none() {
        tracing::debug!(url, "no book panes on page");
        return Ok(Vec::new());
    }

    let mut books = Vec::new();
    for pane in document.select(&selectors.panes) {
        let Some(id) = pane.value().attr("data-book-id") else {
            continue;
        };
        let title = pane
            .select(&selectors.title)
            .next()
            .map(|link| link.text().collect::<String>().trim().to_owned())
            .unwrap_or_default();
        books.push(BookRef::new(id, title));
    }

    tracing::debug!(url, count = books.len(), "found book panes");
    Ok(books)
}
