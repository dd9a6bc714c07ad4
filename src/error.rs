//! Error taxonomy of the reconciliation core.
//!
//! Everything outside the core speaks `anyhow`; the core needs to tell failure
//! kinds apart for the circuit breaker, so it carries a tagged enum instead.

use thiserror::Error;

use crate::model::ListKind;

/// Failure to obtain a book list from a tracker site.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected page layout at {url}: {reason}")]
    Layout { url: String, reason: String },

    #[error("sign-in failed: {reason}")]
    SignIn { reason: String },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_owned(),
            }
        } else {
            Self::Network {
                url: url.to_owned(),
                source: err,
            }
        }
    }

    pub fn layout(url: &str, reason: impl Into<String>) -> Self {
        Self::Layout {
            url: url.to_owned(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct StoreError(#[from] anyhow::Error);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unstable,
    Fetch,
    Timeout,
    Store,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{list} observations disagreed between two scrapes")]
    UnstableObservation { list: ListKind },

    #[error("fetch {list} list: {source}")]
    Fetch {
        list: ListKind,
        #[source]
        source: FetchError,
    },

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnstableObservation { .. } => ErrorKind::Unstable,
            Self::Fetch {
                source: FetchError::Timeout { .. },
                ..
            } => ErrorKind::Timeout,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// A store failure that carries no message at all.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Store(inner) => inner.to_string().trim().is_empty(),
            _ => false,
        }
    }
}

impl ErrorKind {
    /// Whether a failure of this kind counts toward a source's error rate.
    pub fn counts_toward_tally(self) -> bool {
        matches!(self, Self::Fetch | Self::Store)
    }

    pub fn is_alerted(self) -> bool {
        !matches!(self, Self::Unstable)
    }
}
