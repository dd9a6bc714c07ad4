use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::error::FetchError;
use crate::fetch::{PageFetcher, build_http_client, get_html, selector, trim_base_url};
use crate::model::{BookRef, DataSourceCode, ListKind};

pub const DEFAULT_BASE_URL: &str = "https://www.goodreads.com";

struct ShelfSelectors {
    books_table: Selector,
    rows: Selector,
    title_link: Selector,
}

impl ShelfSelectors {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            books_table: selector("#books")?,
            rows: selector("#booksBody > tr")?,
            title_link: selector(".title > .value > a")?,
        })
    }
}

/// Reads public Goodreads shelves over plain HTTP; no session is needed.
pub struct GoodreadsFetcher {
    client: reqwest::Client,
    base_url: String,
    selectors: ShelfSelectors,
}

impl GoodreadsFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_http_client(timeout, false)?,
            base_url: trim_base_url(base_url),
            selectors: ShelfSelectors::new()?,
        })
    }

    fn shelf_url(&self, user_external_id: &str, kind: ListKind) -> String {
        let shelf = match kind {
            ListKind::CurrentlyReading => "currently-reading",
            ListKind::Finished => "read",
        };
        format!(
            "{}/review/list/{user_external_id}?shelf={shelf}",
            self.base_url
        )
    }
}

#[async_trait]
impl PageFetcher for GoodreadsFetcher {
    fn source(&self) -> DataSourceCode {
        DataSourceCode::Goodreads
    }

    async fn fetch_list(
        &self,
        user_external_id: &str,
        kind: ListKind,
    ) -> Result<Vec<BookRef>, FetchError> {
        let url = self.shelf_url(user_external_id, kind);
        let body = get_html(&self.client, &url).await?;
        parse_shelf(&self.selectors, &url, &body)
    }

    fn book_url(&self, book_id: &str) -> String {
        format!("{}/book/show/{book_id}", self.base_url)
    }
}

fn parse_shelf(
    selectors: &ShelfSelectors,
    url: &str,
    body: &str,
) -> Result<Vec<BookRef>, FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::layout(url, "empty body"));
    }

    let document = Html::parse_document(body);
    if document.select(&selectors.books_table).next().is_none() {
        return Err(FetchError::layout(
            url,
            "books table missing (is Goodreads under maintenance?)",
        ));
    }

    let mut books = Vec::new();
    for row in document.select(&selectors.rows) {
        let Some(link) = row.select(&selectors.title_link).next() else {
            tracing::error!(url, "shelf row without title link; skipping row");
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        let Some(id) = first_digit_run(href) else {
            tracing::error!(url, href, "could not parse book id from href; skipping row");
            continue;
        };
        let title = match link.value().attr("title") {
            Some(title) => title.trim().to_owned(),
            None => link.text().collect::<String>().trim().to_owned(),
        };
        books.push(BookRef::new(id, title));
    }

    Ok(books)
}

fn first_digit_run(href: &str) -> Option<&str> {
    let start = href.find(|c: char| c.is_ascii_digit())?;
    let rest = &href[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
