use crate::model::BookRef;
use crate::notify::{Notifier, mention};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Started,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub chat_user_id: String,
    pub book: BookRef,
    pub url: String,
}

impl Notification {
    pub fn text(&self) -> String {
        let verb = match self.kind {
            NotificationKind::Started => "started",
            NotificationKind::Finished => "finished",
        };
        format!(
            "{} has {verb} **{}**!\n{}",
            mention(&self.chat_user_id),
            self.book.title,
            self.url
        )
    }
}

/// Deferred channel messages from one successful reconciliation pass.
///
/// The store has already been updated when this value exists. Each list is
/// drained when run, so running either half twice sends nothing new.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishAction {
    pub user_id: i64,
    /// Number of books observed as currently reading.
    pub book_count: usize,
    pub finish: Vec<Notification>,
    pub start: Vec<Notification>,
}

impl PublishAction {
    pub async fn run_finish(&mut self, notifier: &dyn Notifier) -> usize {
        send_all(notifier, std::mem::take(&mut self.finish)).await
    }

    pub async fn run_start(&mut self, notifier: &dyn Notifier) -> usize {
        send_all(notifier, std::mem::take(&mut self.start)).await
    }
}

async fn send_all(notifier: &dyn Notifier, notifications: Vec<Notification>) -> usize {
    let mut sent = 0;
    for notification in notifications {
        match notifier.send_to_channel(&notification.text()).await {
            Ok(()) => sent += 1,
            Err(err) => tracing::error!(
                ?err,
                book = %notification.book.id,
                kind = ?notification.kind,
                "send channel notification"
            ),
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, book};

    fn started(id: &str) -> Notification {
        Notification {
            kind: NotificationKind::Started,
            chat_user_id: "42".to_owned(),
            book: book(id, "Dune"),
            url: format!("https://books.test/{id}"),
        }
    }

    #[test]
    fn text_mentions_user_and_links_book() {
        assert_eq!(
            started("7").text(),
            "<@42> has started **Dune**!\nhttps://books.test/7"
        );
    }

    #[tokio::test]
    async fn running_twice_sends_once() {
        let notifier = RecordingNotifier::default();
        let mut action = PublishAction {
            user_id: 1,
            book_count: 1,
            finish: vec![],
            start: vec![started("7")],
        };

        assert_eq!(action.run_start(&notifier).await, 1);
        assert_eq!(action.run_start(&notifier).await, 0);
        assert_eq!(notifier.channel().len(), 1);
    }

    #[tokio::test]
    async fn failed_sends_are_not_counted() {
        let notifier = RecordingNotifier::failing();
        let mut action = PublishAction {
            user_id: 1,
            book_count: 1,
            finish: vec![started("1"), started("2")],
            start: vec![],
        };
        assert_eq!(action.run_finish(&notifier).await, 0);
    }
}
