use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, params};
use tokio::sync::oneshot;

use crate::error::StoreError;
use crate::model::{BookRef, DataSourceCode, PersistedBook, RunConfig, TrackedUser};
use crate::store::migrations::run_migrations;
use crate::store::{PassMutation, Store};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                tracing::error!(%err, "send shutdown to database thread");
            }
            if handle.join().is_err() {
                tracing::error!("database thread panicked");
            }
        }
    }
}

/// SQLite-backed store. One connection lives on a dedicated thread; async callers
/// submit closures to it and await the reply.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
    path: Arc<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database dir: {}", parent.display()))?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
        let thread_path = path.clone();

        let worker = thread::Builder::new()
            .name("shelfwatch-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&thread_path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }
                tracing::debug!("database thread shutting down");
            })
            .context("spawn database thread")?;

        ready_rx
            .recv()
            .context("database thread exited before signaling readiness")??;

        tracing::info!(path = %path.display(), "database opened");
        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub(crate) async fn execute<F, T>(&self, task: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = DbCommand::Execute(Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("send command to database thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }
}

fn open_connection(path: &Path) -> anyhow::Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("open sqlite database: {}", path.display()))?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        tracing::warn!(%err, "enable WAL mode");
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    run_migrations(&mut conn).context("run database migrations")?;
    Ok(conn)
}

pub(crate) fn user_from_columns(
    id: i64,
    chat_user_id: String,
    data_source_code: &str,
    data_source_user_id: String,
    is_first_lookup: bool,
) -> anyhow::Result<TrackedUser> {
    Ok(TrackedUser {
        id,
        chat_user_id,
        data_source: DataSourceCode::parse(data_source_code)
            .with_context(|| format!("user {id} has invalid data source"))?,
        data_source_user_id,
        is_first_lookup,
    })
}

pub(crate) fn select_users(conn: &Connection) -> anyhow::Result<Vec<TrackedUser>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_user_id, data_source_code, data_source_user_id, is_first_lookup
         FROM users ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, bool>(4)?,
        ))
    })?;

    let mut users = Vec::new();
    for row in rows {
        let (id, chat_user_id, code, source_user_id, first) = row?;
        users.push(user_from_columns(id, chat_user_id, &code, source_user_id, first)?);
    }
    Ok(users)
}

pub(crate) fn select_books(conn: &Connection, user_id: i64) -> anyhow::Result<Vec<PersistedBook>> {
    let mut stmt =
        conn.prepare("SELECT id, user_id, title FROM books WHERE user_id = ?1 ORDER BY created_at, id")?;
    let books = stmt
        .query_map(params![user_id], |row| {
            Ok(PersistedBook {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(books)
}

fn insert_book(conn: &Connection, user_id: i64, book: &BookRef) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO books (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![book.id, user_id, book.title, Utc::now().to_rfc3339()],
    )
    .with_context(|| format!("insert book {} for user {user_id}", book.id))?;
    Ok(())
}

fn remove_book(conn: &Connection, user_id: i64, book_id: &str) -> anyhow::Result<()> {
    let removed = conn
        .execute(
            "DELETE FROM books WHERE id = ?1 AND user_id = ?2",
            params![book_id, user_id],
        )
        .with_context(|| format!("delete book {book_id} for user {user_id}"))?;
    if removed == 0 {
        tracing::debug!(user_id, book_id, "book already absent");
    }
    Ok(())
}

fn update_first_lookup(conn: &Connection, user_id: i64, value: bool) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET is_first_lookup = ?1 WHERE id = ?2",
        params![value, user_id],
    )
    .with_context(|| format!("update first lookup for user {user_id}"))?;
    Ok(())
}

pub(crate) const GOODREADS_ENABLED_KEY: &str = "goodreads_enabled";
pub(crate) const STORYGRAPH_ENABLED_KEY: &str = "storygraph_enabled";

pub(crate) fn enabled_key(source: DataSourceCode) -> &'static str {
    match source {
        DataSourceCode::Goodreads => GOODREADS_ENABLED_KEY,
        DataSourceCode::Storygraph => STORYGRAPH_ENABLED_KEY,
    }
}

pub(crate) fn read_run_config(conn: &Connection) -> anyhow::Result<RunConfig> {
    let mut config = RunConfig::default();
    let mut stmt = conn.prepare("SELECT name, value FROM config")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (name, value) = row?;
        let enabled = match value.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => anyhow::bail!("config {name} has non-boolean value {other:?}"),
        };
        match name.as_str() {
            GOODREADS_ENABLED_KEY => config.goodreads_enabled = enabled,
            STORYGRAPH_ENABLED_KEY => config.storygraph_enabled = enabled,
            _ => tracing::debug!(name, "ignoring unknown config entry"),
        }
    }
    Ok(config)
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_tracked_users(&self) -> Result<Vec<TrackedUser>, StoreError> {
        Ok(self
            .execute(|conn| select_users(conn).context("list users"))
            .await?)
    }

    async fn find_user_books(&self, user_id: i64) -> Result<Vec<PersistedBook>, StoreError> {
        Ok(self
            .execute(move |conn| select_books(conn, user_id).context("list user books"))
            .await?)
    }

    async fn create_book(&self, user_id: i64, book: &BookRef) -> Result<(), StoreError> {
        let book = book.clone();
        Ok(self
            .execute(move |conn| insert_book(conn, user_id, &book))
            .await?)
    }

    async fn delete_book(&self, user_id: i64, book_id: &str) -> Result<(), StoreError> {
        let book_id = book_id.to_owned();
        Ok(self
            .execute(move |conn| remove_book(conn, user_id, &book_id))
            .await?)
    }

    async fn set_first_lookup(&self, user_id: i64, value: bool) -> Result<(), StoreError> {
        Ok(self
            .execute(move |conn| update_first_lookup(conn, user_id, value))
            .await?)
    }

    async fn load_run_config(&self) -> Result<RunConfig, StoreError> {
        Ok(self
            .execute(|conn| read_run_config(conn).context("load run config"))
            .await?)
    }

    async fn commit_pass(&self, user_id: i64, mutation: &PassMutation) -> Result<(), StoreError> {
        let mutation = mutation.clone();
        Ok(self
            .execute(move |conn| {
                let tx = conn.transaction().context("open pass transaction")?;
                for book in &mutation.created {
                    insert_book(&tx, user_id, book)?;
                }
                for book_id in &mutation.deleted {
                    remove_book(&tx, user_id, book_id)?;
                }
                if mutation.clear_first_lookup {
                    update_first_lookup(&tx, user_id, false)?;
                }
                tx.commit().context("commit pass transaction")?;
                Ok(())
            })
            .await?)
    }
}
