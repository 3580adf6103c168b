//! Ordered subscriber list for lifecycle notifications
//!
//! Dispatch walks a snapshot of the list taken before the first callback runs.
//! Subscribers removed during a dispatch are skipped for the rest of it; those
//! added during a dispatch see the next one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use ad_provider::AdFormat;

use crate::state::AdEvent;

/// Callback invoked with each matching notification
pub type EventCallback = Arc<dyn Fn(&AdEvent) + Send + Sync + 'static>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

struct Subscriber {
    id: SubscriptionId,
    /// `None` receives every format
    format: Option<AdFormat>,
    active: AtomicBool,
    callback: EventCallback,
}

impl Subscriber {
    fn wants(&self, event: &AdEvent) -> bool {
        self.active.load(Ordering::Acquire)
            && self.format.map_or(true, |format| format == event.format)
    }
}

#[derive(Default)]
pub(crate) struct Observers {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, format: Option<AdFormat>, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.subscribers.lock().push(Arc::new(Subscriber {
            id,
            format,
            active: AtomicBool::new(true),
            callback,
        }));

        tracing::debug!("Added {} for {:?}", id, format);
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(position) = subscribers.iter().position(|s| s.id == id) else {
            return false;
        };

        // Deactivate first so an in-flight dispatch holding a snapshot skips it
        let subscriber = subscribers.remove(position);
        subscriber.active.store(false, Ordering::Release);
        tracing::debug!("Removed {}", id);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver events in order; must be called without any mediator lock held
    pub(crate) fn dispatch(&self, events: &[AdEvent]) {
        if events.is_empty() {
            return;
        }

        let snapshot: Vec<Arc<Subscriber>> = self.subscribers.lock().clone();
        for event in events {
            tracing::trace!("Dispatching {:?} for {} ({:?})", event.kind, event.format, event.state);
            for subscriber in &snapshot {
                if subscriber.wants(event) {
                    (subscriber.callback)(event);
                }
            }
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.len())
            .finish()
    }
}
