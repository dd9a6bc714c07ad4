use std::collections::HashSet;

use crate::model::{BookRef, PersistedBook};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookDiff {
    /// Observed as currently reading but not persisted, in observation order.
    pub started: Vec<BookRef>,
    /// Persisted but no longer observed as currently reading, in persisted order.
    pub finished: Vec<PersistedBook>,
}

impl BookDiff {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.finished.is_empty()
    }
}

/// Compares by id only; a title change on its own is not a difference.
pub fn diff_books(observed_current: &[BookRef], persisted: &[PersistedBook]) -> BookDiff {
    let observed_ids: HashSet<&str> = observed_current.iter().map(|b| b.id.as_str()).collect();
    let persisted_ids: HashSet<&str> = persisted.iter().map(|b| b.id.as_str()).collect();

    let mut seen = HashSet::new();
    let started = observed_current
        .iter()
        .filter(|b| !persisted_ids.contains(b.id.as_str()))
        .filter(|b| seen.insert(b.id.as_str()))
        .cloned()
        .collect();

    let finished = persisted
        .iter()
        .filter(|b| !observed_ids.contains(b.id.as_str()))
        .cloned()
        .collect();

    BookDiff { started, finished }
}
