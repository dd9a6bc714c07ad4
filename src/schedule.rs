use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::reconcile::Coordinator;

/// Runs the coordinator now and then every `interval` until `shutdown` resolves.
///
/// Runs are awaited inline, so a slow run delays the next tick instead of
/// overlapping it. Returns the number of runs started.
pub async fn run_every(
    coordinator: &Coordinator,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> usize {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut runs = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(runs, "shutdown requested; stopping scheduler");
                return runs;
            }
            _ = ticker.tick() => {
                runs += 1;
                let report = coordinator.run_once().await;
                tracing::debug!(run_id = %report.run_id, "scheduled run complete");
            }
        }
    }
}

/// Resolves on ctrl-c. A failure to install the handler is logged and never resolves.
pub async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
