//! Fire-once completion records

use std::time::Instant;

/// Application callback resolved with a definitive boolean outcome
pub type Completion = Box<dyn FnOnce(bool) + Send + 'static>;

/// Unique identifier for a pending completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompletionId(u64);

impl CompletionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CompletionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "completion-{}", self.0)
    }
}

/// An outstanding completion waiting for its outcome
///
/// `fire` consumes the record, so a completion can run at most once. Records are
/// only handed out by [`CallbackScheduler::take_pending`](crate::CallbackScheduler::take_pending),
/// which removes them from the registry first.
pub struct PendingCompletion<K> {
    id: CompletionId,
    key: K,
    created_at: Instant,
    completion: Completion,
}

impl<K> PendingCompletion<K> {
    pub(crate) fn new(id: CompletionId, key: K, created_at: Instant, completion: Completion) -> Self {
        Self {
            id,
            key,
            created_at,
            completion,
        }
    }

    pub fn id(&self) -> CompletionId {
        self.id
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Run the completion with the given outcome
    pub fn fire(self, outcome: bool) {
        (self.completion)(outcome)
    }
}

impl<K: std::fmt::Debug> std::fmt::Debug for PendingCompletion<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCompletion")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("created_at", &self.created_at)
            .finish()
    }
}
