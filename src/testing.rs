//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{FetchError, StoreError};
use crate::fetch::PageFetcher;
use crate::model::{BookRef, DataSourceCode, ListKind, PersistedBook, RunConfig, TrackedUser};
use crate::notify::Notifier;
use crate::restart::RestartTrigger;
use crate::store::Store;

pub fn book(id: &str, title: &str) -> BookRef {
    BookRef::new(id, title)
}

pub fn persisted(user_id: i64, id: &str, title: &str) -> PersistedBook {
    PersistedBook {
        id: id.to_owned(),
        user_id,
        title: title.to_owned(),
    }
}

pub fn tracked_user(id: i64, source: DataSourceCode, is_first_lookup: bool) -> TrackedUser {
    TrackedUser {
        id,
        chat_user_id: format!("chat-{id}"),
        data_source: source,
        data_source_user_id: format!("reader-{id}"),
        is_first_lookup,
    }
}

#[derive(Debug, Clone)]
pub enum Page {
    Books(Vec<BookRef>),
    Layout,
    Timeout,
}

impl Page {
    fn into_result(self, url: &str) -> Result<Vec<BookRef>, FetchError> {
        match self {
            Page::Books(books) => Ok(books),
            Page::Layout => Err(FetchError::layout(url, "books table missing")),
            Page::Timeout => Err(FetchError::Timeout {
                url: url.to_owned(),
            }),
        }
    }
}

type PageKey = (String, ListKind);

pub struct FakeFetcher {
    source: DataSourceCode,
    sign_in_fails: bool,
    steady: HashMap<PageKey, Page>,
    queued: Mutex<HashMap<PageKey, VecDeque<Page>>>,
    pub prepare_calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(source: DataSourceCode) -> Self {
        Self {
            source,
            sign_in_fails: false,
            steady: HashMap::new(),
            queued: Mutex::new(HashMap::new()),
            prepare_calls: AtomicUsize::new(0),
        }
    }

    /// Every fetch of this list returns `books`.
    pub fn with_list(mut self, user: &str, kind: ListKind, books: Vec<BookRef>) -> Self {
        self.steady.insert((user.to_owned(), kind), Page::Books(books));
        self
    }

    /// Every fetch of both lists fails the same way.
    pub fn with_failure(mut self, user: &str, page: Page) -> Self {
        for kind in [ListKind::CurrentlyReading, ListKind::Finished] {
            self.steady.insert((user.to_owned(), kind), page.clone());
        }
        self
    }

    /// Fetches consume `pages` in order before falling back to the steady page.
    pub fn with_sequence(self, user: &str, kind: ListKind, pages: Vec<Page>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .insert((user.to_owned(), kind), pages.into());
        self
    }

    pub fn failing_sign_in(mut self) -> Self {
        self.sign_in_fails = true;
        self
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    fn source(&self) -> DataSourceCode {
        self.source
    }

    async fn prepare(&self) -> Result<(), FetchError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        if self.sign_in_fails {
            return Err(FetchError::SignIn {
                reason: "credentials were rejected".to_owned(),
            });
        }
        Ok(())
    }

    async fn fetch_list(
        &self,
        user_external_id: &str,
        kind: ListKind,
    ) -> Result<Vec<BookRef>, FetchError> {
        let key = (user_external_id.to_owned(), kind);
        let url = format!("https://fake.test/{user_external_id}/{kind}");
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        let page = queued
            .or_else(|| self.steady.get(&key).cloned())
            .unwrap_or(Page::Books(Vec::new()));
        page.into_result(&url)
    }

    fn book_url(&self, book_id: &str) -> String {
        format!("https://fake.test/book/{book_id}")
    }
}

#[derive(Default)]
struct MemoryState {
    users: Vec<TrackedUser>,
    books: Vec<PersistedBook>,
    config: Option<RunConfig>,
    commit_failure: Option<String>,
    fail_listing: bool,
}

/// Uses the trait's non-transactional `commit_pass`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn insert_user(&self, user: TrackedUser) {
        self.state.lock().unwrap().users.push(user);
    }

    pub fn insert_book(&self, user_id: i64, book: BookRef) {
        self.state.lock().unwrap().books.push(PersistedBook {
            id: book.id,
            user_id,
            title: book.title,
        });
    }

    pub fn set_config(&self, config: RunConfig) {
        self.state.lock().unwrap().config = Some(config);
    }

    pub fn fail_commits(&self) {
        self.fail_commits_with("disk I/O error");
    }

    /// Every write fails with `message`, which may be empty.
    pub fn fail_commits_with(&self, message: &str) {
        self.state.lock().unwrap().commit_failure = Some(message.to_owned());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn user(&self, id: i64) -> TrackedUser {
        self.state
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .unwrap()
    }

    pub fn book_ids(&self, user_id: i64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .books
            .iter()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.id.clone())
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_tracked_users(&self) -> Result<Vec<TrackedUser>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(StoreError::from(anyhow::anyhow!("database is locked")));
        }
        Ok(state.users.clone())
    }

    async fn find_user_books(&self, user_id: i64) -> Result<Vec<PersistedBook>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .books
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_book(&self, user_id: i64, book: &BookRef) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.commit_failure {
            return Err(StoreError::from(anyhow::anyhow!("{message}")));
        }
        if state
            .books
            .iter()
            .any(|b| b.user_id == user_id && b.id == book.id)
        {
            return Err(StoreError::from(anyhow::anyhow!(
                "UNIQUE constraint failed: books.id, books.user_id"
            )));
        }
        state.books.push(PersistedBook {
            id: book.id.clone(),
            user_id,
            title: book.title.clone(),
        });
        Ok(())
    }

    async fn delete_book(&self, user_id: i64, book_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.commit_failure {
            return Err(StoreError::from(anyhow::anyhow!("{message}")));
        }
        state
            .books
            .retain(|b| !(b.user_id == user_id && b.id == book_id));
        Ok(())
    }

    async fn set_first_lookup(&self, user_id: i64, value: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.commit_failure {
            return Err(StoreError::from(anyhow::anyhow!("{message}")));
        }
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.is_first_lookup = value;
        }
        Ok(())
    }

    async fn load_run_config(&self) -> Result<RunConfig, StoreError> {
        Ok(self.state.lock().unwrap().config.unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Channel(String),
    Admin(String),
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn channel(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Channel(text) => Some(text),
                Sent::Admin(_) => None,
            })
            .collect()
    }

    pub fn admin(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Admin(text) => Some(text),
                Sent::Channel(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_to_channel(&self, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("channel unavailable");
        }
        self.sent.lock().unwrap().push(Sent::Channel(text.to_owned()));
        Ok(())
    }

    async fn send_to_admin(&self, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("admin unavailable");
        }
        self.sent.lock().unwrap().push(Sent::Admin(text.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRestart {
    requests: AtomicUsize,
}

impl RecordingRestart {
    pub fn count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RestartTrigger for RecordingRestart {
    fn request_restart(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}
