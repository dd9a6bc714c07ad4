//! Administrative operations on tracked users and source toggles.

use anyhow::{Context as _, bail};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::model::{DataSourceCode, PersistedBook, TrackedUser};
use crate::store::SqliteStore;
use crate::store::sqlite::{enabled_key, read_run_config, select_books, select_users, user_from_columns};

/// One user with their currently-reading books, for `user list`.
#[derive(Debug, Clone)]
pub struct UserListing {
    pub user: TrackedUser,
    pub books: Vec<PersistedBook>,
}

impl UserListing {
    pub fn render(&self) -> String {
        let mut text = format!(
            "{} - {}: \n",
            self.user.data_source_user_id, self.user.data_source
        );
        for book in &self.books {
            text.push_str(&format!("\t{}\n", book.title));
        }
        text
    }
}

fn find_by_chat_id(conn: &Connection, chat_user_id: &str) -> anyhow::Result<Option<TrackedUser>> {
    let row = conn
        .query_row(
            "SELECT id, chat_user_id, data_source_code, data_source_user_id, is_first_lookup
             FROM users WHERE chat_user_id = ?1",
            params![chat_user_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            },
        )
        .optional()
        .context("look up user")?;

    row.map(|(id, chat, code, source_user_id, first)| {
        user_from_columns(id, chat, &code, source_user_id, first)
    })
    .transpose()
}

fn require_user(conn: &Connection, chat_user_id: &str) -> anyhow::Result<TrackedUser> {
    find_by_chat_id(conn, chat_user_id)?
        .ok_or_else(|| anyhow::anyhow!("user {chat_user_id} could not be found"))
}

impl SqliteStore {
    pub async fn add_user(
        &self,
        chat_user_id: &str,
        source: DataSourceCode,
        data_source_user_id: &str,
    ) -> anyhow::Result<TrackedUser> {
        let chat_user_id = chat_user_id.to_owned();
        let data_source_user_id = data_source_user_id.to_owned();
        self.execute(move |conn| {
            if find_by_chat_id(conn, &chat_user_id)?.is_some() {
                bail!("user {chat_user_id} already exists");
            }
            conn.execute(
                "INSERT INTO users (chat_user_id, data_source_code, data_source_user_id, is_first_lookup, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![
                    chat_user_id,
                    source.as_str(),
                    data_source_user_id,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("insert user")?;
            Ok(TrackedUser {
                id: conn.last_insert_rowid(),
                chat_user_id,
                data_source: source,
                data_source_user_id,
                is_first_lookup: true,
            })
        })
        .await
    }

    /// Removes the user and, through the foreign key, their books.
    pub async fn remove_user(&self, chat_user_id: &str) -> anyhow::Result<()> {
        let chat_user_id = chat_user_id.to_owned();
        self.execute(move |conn| {
            let user = require_user(conn, &chat_user_id)?;
            conn.execute("DELETE FROM users WHERE id = ?1", params![user.id])
                .context("delete user")?;
            Ok(())
        })
        .await
    }

    /// Moves a user to another site. Their books are cleared and the next pass is
    /// treated as a first lookup.
    pub async fn change_source(
        &self,
        chat_user_id: &str,
        source: DataSourceCode,
        data_source_user_id: &str,
    ) -> anyhow::Result<()> {
        let chat_user_id = chat_user_id.to_owned();
        let data_source_user_id = data_source_user_id.to_owned();
        self.execute(move |conn| {
            let user = require_user(conn, &chat_user_id)?;
            if user.data_source == source {
                bail!("user {chat_user_id} is already using {source}");
            }
            let tx = conn.transaction().context("open change-source transaction")?;
            tx.execute(
                "UPDATE users SET data_source_code = ?1, data_source_user_id = ?2, is_first_lookup = 1
                 WHERE id = ?3",
                params![source.as_str(), data_source_user_id, user.id],
            )
            .context("update user source")?;
            tx.execute("DELETE FROM books WHERE user_id = ?1", params![user.id])
                .context("clear user books")?;
            tx.commit().context("commit change-source transaction")?;
            Ok(())
        })
        .await
    }

    /// Clears every book and marks every user as new.
    pub async fn reset_all_users(&self) -> anyhow::Result<()> {
        self.execute(|conn| {
            let tx = conn.transaction().context("open reset transaction")?;
            tx.execute("DELETE FROM books", []).context("clear books")?;
            tx.execute("UPDATE users SET is_first_lookup = 1", [])
                .context("reset first lookup")?;
            tx.commit().context("commit reset transaction")?;
            Ok(())
        })
        .await
    }

    /// Clears one user's books without touching their first-lookup flag, so the
    /// next pass announces everything they are reading.
    pub async fn reset_user_books(&self, chat_user_id: &str) -> anyhow::Result<()> {
        let chat_user_id = chat_user_id.to_owned();
        self.execute(move |conn| {
            let user = require_user(conn, &chat_user_id)?;
            conn.execute("DELETE FROM books WHERE user_id = ?1", params![user.id])
                .context("clear user books")?;
            Ok(())
        })
        .await
    }

    pub async fn list_users_with_books(&self) -> anyhow::Result<Vec<UserListing>> {
        self.execute(|conn| {
            let users = select_users(conn).context("list users")?;
            users
                .into_iter()
                .map(|user| -> anyhow::Result<UserListing> {
                    let books = select_books(conn, user.id)
                        .with_context(|| format!("list books for user {}", user.id))?;
                    Ok(UserListing { user, books })
                })
                .collect()
        })
        .await
    }

    pub async fn set_source_enabled(&self, source: DataSourceCode, enabled: bool) -> anyhow::Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO config (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![enabled_key(source), enabled.to_string()],
            )
            .context("update source toggle")?;
            Ok(())
        })
        .await
    }

    /// Flips a source's toggle and returns the new value.
    pub async fn toggle_source(&self, source: DataSourceCode) -> anyhow::Result<bool> {
        self.execute(move |conn| {
            let tx = conn.transaction().context("open toggle transaction")?;
            let enabled = !read_run_config(&tx)?.is_enabled(source);
            tx.execute(
                "INSERT INTO config (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![enabled_key(source), enabled.to_string()],
            )
            .context("update source toggle")?;
            tx.commit().context("commit toggle transaction")?;
            Ok(enabled)
        })
        .await
    }
}
