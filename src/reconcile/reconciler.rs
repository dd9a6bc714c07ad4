use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ReconcileError;
use crate::fetch::PageFetcher;
use crate::model::{BookRef, ListKind, TrackedUser};
use crate::reconcile::diff::diff_books;
use crate::reconcile::publish::{Notification, NotificationKind, PublishAction};
use crate::reconcile::verify::observe_stable;
use crate::store::{PassMutation, Store};

/// Brings one user's persisted books in line with what their tracker shows.
pub struct Reconciler {
    store: Arc<dyn Store>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Verifies both lists, commits the diff, and returns the messages to send.
    ///
    /// Nothing is written when either list is unstable or cannot be fetched. The
    /// returned action is not run here.
    pub async fn reconcile(
        &self,
        fetcher: &dyn PageFetcher,
        user: &TrackedUser,
    ) -> Result<PublishAction, ReconcileError> {
        let external_id = user.data_source_user_id.as_str();
        let current = observe_stable(fetcher, external_id, ListKind::CurrentlyReading).await?;
        let finished_list = observe_stable(fetcher, external_id, ListKind::Finished).await?;

        let persisted = self.store.find_user_books(user.id).await?;
        let diff = diff_books(&current, &persisted);

        let mutation = PassMutation {
            created: diff.started.clone(),
            deleted: diff.finished.iter().map(|b| b.id.clone()).collect(),
            clear_first_lookup: user.is_first_lookup,
        };
        if !mutation.is_empty() {
            self.store.commit_pass(user.id, &mutation).await?;
        }

        // Same title as a book already tracked: most likely an edition switch.
        let known_titles: HashSet<&str> = persisted.iter().map(|b| b.title.as_str()).collect();
        let start = diff
            .started
            .iter()
            .filter(|book| !user.is_first_lookup && !known_titles.contains(book.title.as_str()))
            .map(|book| Notification {
                kind: NotificationKind::Started,
                chat_user_id: user.chat_user_id.clone(),
                book: book.clone(),
                url: fetcher.book_url(&book.id),
            })
            .collect::<Vec<_>>();

        // Leaving "currently reading" is not the same as finishing; only the
        // finished list confirms it.
        let confirmed: HashSet<&str> = finished_list.iter().map(|b| b.id.as_str()).collect();
        let finish = diff
            .finished
            .iter()
            .filter(|book| confirmed.contains(book.id.as_str()))
            .map(|book| Notification {
                kind: NotificationKind::Finished,
                chat_user_id: user.chat_user_id.clone(),
                book: BookRef::new(book.id.clone(), book.title.clone()),
                url: fetcher.book_url(&book.id),
            })
            .collect::<Vec<_>>();

        tracing::info!(
            user = external_id,
            source = %user.data_source,
            current = current.len(),
            started = diff.started.len(),
            finished = diff.finished.len(),
            announce_start = start.len(),
            announce_finish = finish.len(),
            first_lookup = user.is_first_lookup,
            "reconciled user"
        );

        Ok(PublishAction {
            user_id: user.id,
            book_count: current.len(),
            finish,
            start,
        })
    }
}
