use crate::error::ReconcileError;
use crate::fetch::PageFetcher;
use crate::model::{BookRef, ListKind};

/// Two observations agree when they list the same ids in the same order.
/// Titles are ignored; two empty lists agree.
pub fn sequences_match(first: &[BookRef], second: &[BookRef]) -> bool {
    first.len() == second.len() && first.iter().zip(second).all(|(a, b)| a.id == b.id)
}

/// Scrapes a list twice and returns the first observation only if both agree.
///
/// Pages are live and user-controlled, and a partial render looks exactly like a
/// shorter list, so one observation is never trusted on its own.
pub async fn observe_stable(
    fetcher: &dyn PageFetcher,
    user_external_id: &str,
    list: ListKind,
) -> Result<Vec<BookRef>, ReconcileError> {
    let first = fetcher
        .fetch_list(user_external_id, list)
        .await
        .map_err(|source| ReconcileError::Fetch { list, source })?;
    let second = fetcher
        .fetch_list(user_external_id, list)
        .await
        .map_err(|source| ReconcileError::Fetch { list, source })?;

    if !sequences_match(&first, &second) {
        tracing::warn!(
            user = user_external_id,
            %list,
            first = first.len(),
            second = second.len(),
            "scrapes returned different results"
        );
        return Err(ReconcileError::UnstableObservation { list });
    }

    Ok(first)
}
