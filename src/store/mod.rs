use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{BookRef, PersistedBook, RunConfig, TrackedUser};

mod migrations;
pub mod sqlite;
mod users;

pub use sqlite::SqliteStore;
pub use users::UserListing;

/// Every mutation one reconciliation pass makes for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassMutation {
    pub created: Vec<BookRef>,
    pub deleted: Vec<String>,
    pub clear_first_lookup: bool,
}

impl PassMutation {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && !self.clear_first_lookup
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_tracked_users(&self) -> Result<Vec<TrackedUser>, StoreError>;
    async fn find_user_books(&self, user_id: i64) -> Result<Vec<PersistedBook>, StoreError>;
    async fn create_book(&self, user_id: i64, book: &BookRef) -> Result<(), StoreError>;
    async fn delete_book(&self, user_id: i64, book_id: &str) -> Result<(), StoreError>;
    async fn set_first_lookup(&self, user_id: i64, value: bool) -> Result<(), StoreError>;
    async fn load_run_config(&self) -> Result<RunConfig, StoreError>;

    /// Applies a whole pass. Stores without transactions fall back to this default,
    /// which applies creates, then deletes, then the flag; a failure part-way leaves
    /// the earlier rows in place and the next run reconciles them.
    async fn commit_pass(&self, user_id: i64, mutation: &PassMutation) -> Result<(), StoreError> {
        for book in &mutation.created {
            self.create_book(user_id, book).await?;
        }
        for book_id in &mutation.deleted {
            self.delete_book(user_id, book_id).await?;
        }
        if mutation.clear_first_lookup {
            self.set_first_lookup(user_id, false).await?;
        }
        Ok(())
    }
}
