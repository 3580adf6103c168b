//! Timer and completion registry
//!
//! All state lives behind one `parking_lot` mutex shared by every clone of the
//! scheduler. The lock is never held while user code runs.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::pending::{Completion, CompletionId, PendingCompletion};

/// Deferred work run by [`CallbackScheduler::run_due`]
pub type Effect = Box<dyn FnOnce() + Send + 'static>;

/// Unique identifier for a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Counts of what `cancel_all` removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// Timers dropped without firing
    pub timers: usize,
    /// Pending completions resolved with `false`
    pub completions: usize,
}

struct TimerEntry<K> {
    key: K,
    effect: Effect,
}

struct Inner<K> {
    next_id: u64,
    // Ordered by due time, then by id so equal due times fire in scheduling order
    timers: BTreeMap<(Instant, TimerId), TimerEntry<K>>,
    due_index: HashMap<TimerId, Instant>,
    pending: HashMap<CompletionId, PendingCompletion<K>>,
}

impl<K> Inner<K> {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_timer(&mut self, id: TimerId) -> Option<TimerEntry<K>> {
        let due = self.due_index.remove(&id)?;
        self.timers.remove(&(due, id))
    }
}

/// Cancellation handle for a scheduled timer
///
/// Holds only a weak reference; a handle outliving its scheduler is inert.
pub struct TimerHandle<K> {
    id: TimerId,
    inner: Weak<Mutex<Inner<K>>>,
}

impl<K> TimerHandle<K> {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancel the timer
    ///
    /// Returns `true` if the timer was still scheduled. After this returns the
    /// effect is guaranteed never to run.
    pub fn cancel(&self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        // Bind the removed entry so its effect is dropped after the lock is released
        let removed = inner.lock().remove_timer(self.id);
        removed.is_some()
    }

    /// Whether the timer is still waiting to fire
    pub fn is_scheduled(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.lock().due_index.contains_key(&self.id))
            .unwrap_or(false)
    }
}

impl<K> Clone for TimerHandle<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<K> std::fmt::Debug for TimerHandle<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

/// One-shot timers plus the registry of pending completions
///
/// Generic over a key type used to tag entries (the ad format, in the SDK).
/// Cloning is cheap and every clone shares the same registry.
pub struct CallbackScheduler<K> {
    inner: Arc<Mutex<Inner<K>>>,
    clock: Arc<dyn Clock>,
}

impl<K> CallbackScheduler<K>
where
    K: Copy + Eq + Debug + Send + 'static,
{
    /// Create a scheduler driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a scheduler driven by the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                timers: BTreeMap::new(),
                due_index: HashMap::new(),
                pending: HashMap::new(),
            })),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Schedule `effect` to run once, `after` from now
    pub fn schedule<F>(&self, key: K, after: Duration, effect: F) -> TimerHandle<K>
    where
        F: FnOnce() + Send + 'static,
    {
        let due = self.clock.now() + after;
        let mut inner = self.inner.lock();
        let id = TimerId(inner.next_id());

        inner.timers.insert(
            (due, id),
            TimerEntry {
                key,
                effect: Box::new(effect),
            },
        );
        inner.due_index.insert(id, due);

        tracing::trace!("Scheduled {} for {:?} in {:?}", id, key, after);

        TimerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Cancel a timer by id
    pub fn cancel(&self, id: TimerId) -> bool {
        let removed = self.inner.lock().remove_timer(id);
        removed.is_some()
    }

    /// Fire every timer that is due
    ///
    /// The set of due timers is fixed when the call starts. Each one is removed
    /// from the registry immediately before its effect runs, so a timer cancelled
    /// by an earlier effect in the same run is skipped. Timers scheduled by an
    /// effect wait for the next call. Returns the number of effects run.
    pub fn run_due(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<TimerId> = {
            let inner = self.inner.lock();
            inner
                .timers
                .keys()
                .take_while(|(at, _)| *at <= now)
                .map(|(_, id)| *id)
                .collect()
        };

        let mut fired = 0;
        for id in due {
            let entry = self.inner.lock().remove_timer(id);
            if let Some(entry) = entry {
                tracing::trace!("Firing {} for {:?}", id, entry.key);
                (entry.effect)();
                fired += 1;
            }
        }
        fired
    }

    /// Time until the next timer is due, `Duration::ZERO` if one is overdue
    pub fn next_due(&self) -> Option<Duration> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .timers
            .keys()
            .next()
            .map(|(at, _)| at.saturating_duration_since(now))
    }

    pub fn timer_count(&self) -> usize {
        self.inner.lock().timers.len()
    }

    /// Number of scheduled timers tagged with `key`
    pub fn timers_for(&self, key: K) -> usize {
        self.inner
            .lock()
            .timers
            .values()
            .filter(|entry| entry.key == key)
            .count()
    }

    /// Record a completion that must eventually fire exactly once
    pub fn register_pending<F>(&self, key: K, completion: F) -> CompletionId
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let created_at = self.clock.now();
        let mut inner = self.inner.lock();
        let id = CompletionId::new(inner.next_id());
        let completion: Completion = Box::new(completion);

        inner
            .pending
            .insert(id, PendingCompletion::new(id, key, created_at, completion));

        tracing::trace!("Registered {} for {:?}", id, key);
        id
    }

    /// Remove a pending completion so the caller can fire it
    ///
    /// Returns `None` if it already fired or was cancelled.
    pub fn take_pending(&self, id: CompletionId) -> Option<PendingCompletion<K>> {
        self.inner.lock().pending.remove(&id)
    }

    /// Remove and fire a pending completion
    ///
    /// Returns `false` if the completion no longer exists; it is not fired again.
    pub fn complete(&self, id: CompletionId, outcome: bool) -> bool {
        match self.take_pending(id) {
            Some(pending) => {
                pending.fire(outcome);
                true
            }
            None => {
                tracing::debug!("Ignoring outcome for {}: already resolved", id);
                false
            }
        }
    }

    pub fn is_pending(&self, id: CompletionId) -> bool {
        self.inner.lock().pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Ids of pending completions tagged with `key`, oldest first
    pub fn pending_for(&self, key: K) -> Vec<CompletionId> {
        let inner = self.inner.lock();
        let mut ids: Vec<CompletionId> = inner
            .pending
            .values()
            .filter(|pending| *pending.key() == key)
            .map(|pending| pending.id())
            .collect();
        ids.sort();
        ids
    }

    /// Drop every timer and resolve every pending completion with `false`
    pub fn cancel_all(&self) -> CancelReport {
        let (timers, mut pending) = {
            let mut inner = self.inner.lock();
            inner.due_index.clear();
            let timers = std::mem::take(&mut inner.timers);
            let pending: Vec<PendingCompletion<K>> =
                inner.pending.drain().map(|(_, pending)| pending).collect();
            (timers, pending)
        };

        let report = CancelReport {
            timers: timers.len(),
            completions: pending.len(),
        };

        // Effects may own resources with drop side effects; release them unlocked
        drop(timers);

        pending.sort_by_key(|pending| pending.id());
        for pending in pending {
            tracing::debug!(
                "Cancelling {} for {:?}, resolving with false",
                pending.id(),
                pending.key()
            );
            pending.fire(false);
        }

        report
    }
}

impl<K> Clone for CallbackScheduler<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<K> Default for CallbackScheduler<K>
where
    K: Copy + Eq + Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for CallbackScheduler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CallbackScheduler")
            .field("timers", &inner.timers.len())
            .field("pending", &inner.pending.len())
            .finish()
    }
}
