use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::comparison::Comparison;
use crate::models::summary::TrackSummary;

/// Lifecycle of one submission. "Empty" is the absence of the id in the
/// registry; a new upload always gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Parsed,
    Compared,
    Persisted,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub filename: String,
    /// Decoded track text, cached so compare and export never re-decode.
    pub content: String,
    pub file_hash: String,
    pub summary: TrackSummary,
    pub phase: SubmissionPhase,
    pub comparison: Option<Comparison>,
}

/// Per-submission state, keyed by the UUID issued at upload time.
/// Submissions from concurrent sessions never alias: ids are random and
/// handed out exactly once.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Submission>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, submission: Submission) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.insert(id, submission);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Submission> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Applies `apply` to the submission under the write lock. Returns false
    /// if the id is unknown.
    pub async fn update<F>(&self, id: Uuid, apply: F) -> bool
    where
        F: FnOnce(&mut Submission),
    {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(submission) => {
                apply(submission);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
