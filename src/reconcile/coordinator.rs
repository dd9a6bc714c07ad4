use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::Instrument as _;
use uuid::Uuid;

use crate::error::{ErrorKind, ReconcileError};
use crate::fetch::PageFetcher;
use crate::model::{DataSourceCode, RunConfig, TrackedUser};
use crate::notify::{Notifier, alerts};
use crate::reconcile::publish::PublishAction;
use crate::reconcile::reconciler::Reconciler;
use crate::restart::RestartTrigger;
use crate::store::Store;

pub const ERROR_ALERT_THRESHOLD: f64 = 0.8;
pub const SYSTEMIC_FAILURE_MIN_USERS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunErrorTally {
    pub error_count: usize,
    pub user_count: usize,
}

impl RunErrorTally {
    pub fn error_rate(&self) -> f64 {
        if self.user_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.user_count as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitVerdict {
    pub high_error_rate: bool,
    pub systemic_failure: bool,
    pub zero_books: bool,
}

/// Circuit-breaker policy for one source after all its users were processed.
pub fn evaluate(tally: RunErrorTally, book_count: usize) -> CircuitVerdict {
    let has_users = tally.user_count > 0;
    CircuitVerdict {
        high_error_rate: has_users
            && tally.error_count > 0
            && tally.error_rate() >= ERROR_ALERT_THRESHOLD,
        systemic_failure: tally.user_count >= SYSTEMIC_FAILURE_MIN_USERS
            && tally.error_count == tally.user_count,
        zero_books: has_users && book_count == 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    Disabled,
    NoUsers,
    SignInFailed,
    Completed,
}

impl SourceOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::NoUsers => "no users",
            Self::SignInFailed => "sign-in failed",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: DataSourceCode,
    pub outcome: SourceOutcome,
    pub tally: RunErrorTally,
    pub skipped_users: usize,
    pub book_count: usize,
    pub notifications_sent: usize,
    pub verdict: CircuitVerdict,
}

impl SourceReport {
    fn empty(source: DataSourceCode, outcome: SourceOutcome) -> Self {
        Self {
            source,
            outcome,
            tally: RunErrorTally::default(),
            skipped_users: 0,
            book_count: 0,
            notifications_sent: 0,
            verdict: CircuitVerdict::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Another run was still in flight; nothing was done.
    pub overlapped: bool,
    pub sources: Vec<SourceReport>,
    pub restart_requested: bool,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            overlapped: false,
            sources: Vec::new(),
            restart_requested: false,
        }
    }

    pub fn source(&self, source: DataSourceCode) -> Option<&SourceReport> {
        self.sources.iter().find(|report| report.source == source)
    }
}

/// Drives one pass over every tracked user, one source at a time.
pub struct Coordinator {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    restart: Arc<dyn RestartTrigger>,
    fetchers: Vec<Arc<dyn PageFetcher>>,
    reconciler: Reconciler,
    run_lock: Mutex<()>,
}

impl Coordinator {
    /// Sources are processed in the order of `fetchers`.
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        restart: Arc<dyn RestartTrigger>,
        fetchers: Vec<Arc<dyn PageFetcher>>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(Arc::clone(&store)),
            store,
            notifier,
            restart,
            fetchers,
            run_lock: Mutex::new(()),
        }
    }

    /// Runs one full pass. Never fails: problems end up in logs, admin alerts and
    /// the returned report.
    pub async fn run_once(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::warn!(%run_id, "previous run still in progress; skipping");
            let mut report = RunReport::new(run_id);
            report.overlapped = true;
            return report;
        };

        let span = tracing::info_span!("run", %run_id);
        self.run_locked(run_id).instrument(span).await
    }

    async fn run_locked(&self, run_id: Uuid) -> RunReport {
        let mut report = RunReport::new(run_id);
        tracing::info!("starting run");

        let config = match self.store.load_run_config().await {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(?err, "load run config");
                self.alert(&alerts::run_aborted(&err.to_string())).await;
                return report;
            }
        };
        let users = match self.store.list_tracked_users().await {
            Ok(users) => users,
            Err(err) => {
                tracing::error!(?err, "load tracked users");
                self.alert(&alerts::run_aborted(&err.to_string())).await;
                return report;
            }
        };

        for fetcher in &self.fetchers {
            let source_report = self.run_source(fetcher.as_ref(), &config, &users).await;
            report.sources.push(source_report);
        }

        let systemic = report
            .sources
            .iter()
            .any(|source| source.verdict.systemic_failure);
        if systemic {
            report.restart_requested = true;
            self.restart.request_restart();
        }

        tracing::info!(
            errors = report.sources.iter().map(|s| s.tally.error_count).sum::<usize>(),
            "finished run"
        );
        report
    }

    async fn run_source(
        &self,
        fetcher: &dyn PageFetcher,
        config: &RunConfig,
        users: &[TrackedUser],
    ) -> SourceReport {
        let source = fetcher.source();
        if !config.is_enabled(source) {
            tracing::info!(%source, "source disabled; skipping");
            return SourceReport::empty(source, SourceOutcome::Disabled);
        }

        let users: Vec<&TrackedUser> = users.iter().filter(|u| u.data_source == source).collect();
        if users.is_empty() {
            tracing::debug!(%source, "no users for source");
            return SourceReport::empty(source, SourceOutcome::NoUsers);
        }

        if let Err(err) = fetcher.prepare().await {
            tracing::error!(%source, ?err, "source sign-in failed; skipping source");
            self.alert(&alerts::sign_in_failed(source, &err.to_string()))
                .await;
            return SourceReport::empty(source, SourceOutcome::SignInFailed);
        }

        let mut report = SourceReport::empty(source, SourceOutcome::Completed);
        report.tally.user_count = users.len();
        let mut actions: Vec<PublishAction> = Vec::new();

        for user in users {
            tracing::info!(%source, user = %user.data_source_user_id, "reconciling user");
            match self.reconciler.reconcile(fetcher, user).await {
                Ok(action) => actions.push(action),
                Err(err) => {
                    if err.kind() == ErrorKind::Unstable {
                        report.skipped_users += 1;
                    }
                    self.record_failure(&mut report.tally, user, &err).await;
                }
            }
        }

        report.book_count = actions.iter().map(|a| a.book_count).sum();

        // All finishes across the source go out before any start.
        for action in &mut actions {
            report.notifications_sent += action.run_finish(self.notifier.as_ref()).await;
        }
        for action in &mut actions {
            report.notifications_sent += action.run_start(self.notifier.as_ref()).await;
        }

        report.verdict = evaluate(report.tally, report.book_count);
        self.apply_verdict(source, &report).await;

        tracing::info!(
            %source,
            users = report.tally.user_count,
            errors = report.tally.error_count,
            skipped = report.skipped_users,
            books = report.book_count,
            sent = report.notifications_sent,
            "finished source"
        );
        report
    }

    async fn record_failure(&self, tally: &mut RunErrorTally, user: &TrackedUser, err: &ReconcileError) {
        let kind = err.kind();
        match kind {
            ErrorKind::Unstable => {
                tracing::warn!(user = %user.data_source_user_id, %err, "skipping user this run");
            }
            ErrorKind::Timeout => {
                tracing::warn!(user = %user.data_source_user_id, %err, "user timed out");
            }
            ErrorKind::Fetch | ErrorKind::Store => {
                tracing::error!(user = %user.data_source_user_id, ?err, "reconcile user failed");
            }
        }

        if kind.counts_toward_tally() {
            tally.error_count += 1;
        }
        if kind.is_alerted() && !err.is_blank() {
            self.alert(&alerts::user_failed(
                user.data_source,
                &user.data_source_user_id,
                &err.to_string(),
            ))
            .await;
        }
    }

    async fn apply_verdict(&self, source: DataSourceCode, report: &SourceReport) {
        let tally = report.tally;
        if report.verdict.high_error_rate {
            self.alert(&alerts::high_error_rate(source, tally.error_count, tally.user_count))
                .await;
        }
        if report.verdict.systemic_failure {
            tracing::error!(%source, users = tally.user_count, "every user failed; restart requested");
            self.alert(&alerts::systemic_failure(source, tally.user_count))
                .await;
        }
        if report.verdict.zero_books {
            tracing::warn!(%source, users = tally.user_count, "no books found for any user");
            self.alert(&alerts::zero_books(source, tally.user_count)).await;
        }
    }

    async fn alert(&self, text: &str) {
        if let Err(err) = self.notifier.send_to_admin(text).await {
            tracing::error!(?err, "send admin alert");
        }
    }
}
