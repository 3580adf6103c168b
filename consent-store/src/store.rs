//! Consent storage and propagation
//!
//! `ConsentStore` owns the current [`ConsentFlags`] and the list of registered
//! sinks. Every setter updates the record first and then pushes the full record
//! to each sink, synchronously, before returning.

use std::sync::Arc;

use crate::error::Result;
use crate::flags::{ConsentFlags, UserLocation};

/// A downstream mirror of the consent flags, usually an ad backend
///
/// Implementations must treat `set_consent` as idempotent: the same record may
/// arrive several times, and each call carries the complete flag set.
pub trait ConsentSink: Send + Sync {
    /// Name used in diagnostics
    fn sink_name(&self) -> &str;

    /// Apply the complete flag set
    fn set_consent(&self, flags: &ConsentFlags);
}

/// Holds the process-wide consent flags and the sinks that mirror them
///
/// Generic over the sink type so callers can register their own trait objects
/// (for example `ConsentStore<dyn ProviderAdapter>`) without upcasting.
pub struct ConsentStore<S: ConsentSink + ?Sized> {
    flags: ConsentFlags,
    sinks: Vec<Arc<S>>,
    revision: u64,
}

impl<S: ConsentSink + ?Sized> ConsentStore<S> {
    /// Create a store with every flag unset and no sinks
    pub fn new() -> Self {
        Self {
            flags: ConsentFlags::default(),
            sinks: Vec::new(),
            revision: 0,
        }
    }

    /// Snapshot of the current flags
    pub fn flags(&self) -> ConsentFlags {
        self.flags
    }

    /// Number of updates applied since construction
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn set_gdpr(&mut self, granted: bool) {
        self.flags.gdpr = Some(granted);
        self.propagate("gdpr");
    }

    pub fn set_ccpa(&mut self, opt_out: bool) {
        self.flags.ccpa_opt_out = Some(opt_out);
        self.propagate("ccpa");
    }

    pub fn set_coppa(&mut self, applies: bool) {
        self.flags.coppa_applies = Some(applies);
        self.propagate("coppa");
    }

    pub fn set_age_restricted(&mut self, restricted: bool) {
        self.flags.age_restricted = Some(restricted);
        self.propagate("age_restricted");
    }

    pub fn set_user_consent(&mut self, granted: bool) {
        self.flags.user_consent = Some(granted);
        self.propagate("user_consent");
    }

    /// Set the user location
    ///
    /// Invalid coordinates leave the stored flags untouched and nothing is propagated.
    pub fn set_user_location(&mut self, latitude: f64, longitude: f64) -> Result<()> {
        let location = UserLocation::new(latitude, longitude)?;
        self.flags.location = Some(location);
        self.propagate("location");
        Ok(())
    }

    /// Register a sink and replay the current flags to it
    ///
    /// Registering the same sink twice is a no-op and returns `false`; the sink
    /// is not replayed a second time.
    pub fn register(&mut self, sink: Arc<S>) -> bool {
        if self.sinks.iter().any(|existing| same_sink(existing, &sink)) {
            tracing::debug!("Consent sink {} already registered", sink.sink_name());
            return false;
        }

        tracing::debug!(
            "Registering consent sink {} (revision {})",
            sink.sink_name(),
            self.revision
        );
        sink.set_consent(&self.flags);
        self.sinks.push(sink);
        true
    }

    /// Remove a sink, returning whether it was registered
    pub fn unregister(&mut self, sink: &Arc<S>) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|existing| !same_sink(existing, sink));
        before != self.sinks.len()
    }

    fn propagate(&mut self, flag: &'static str) {
        self.revision += 1;

        tracing::debug!(
            "Consent flag {} updated (revision {}), propagating to {} sink(s)",
            flag,
            self.revision,
            self.sinks.len()
        );

        for sink in &self.sinks {
            sink.set_consent(&self.flags);
        }
    }
}

impl<S: ConsentSink + ?Sized> Default for ConsentStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ConsentSink + ?Sized> std::fmt::Debug for ConsentStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentStore")
            .field("flags", &self.flags)
            .field("sink_count", &self.sinks.len())
            .field("revision", &self.revision)
            .finish()
    }
}

// Compare data pointers only; vtable pointers for the same object may differ.
fn same_sink<S: ?Sized>(a: &Arc<S>, b: &Arc<S>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        name: String,
        received: Mutex<Vec<ConsentFlags>>,
    }

    impl RecordingSink {
        fn named(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<ConsentFlags> {
            self.received.lock().unwrap().clone()
        }
    }

    impl ConsentSink for RecordingSink {
        fn sink_name(&self) -> &str {
            &self.name
        }

        fn set_consent(&self, flags: &ConsentFlags) {
            self.received.lock().unwrap().push(*flags);
        }
    }

    #[test]
    fn test_flag_set_before_registration_is_replayed_once() {
        let mut store: ConsentStore<RecordingSink> = ConsentStore::new();
        store.set_gdpr(true);
        store.set_coppa(false);

        let sink = RecordingSink::named("late");
        assert!(store.register(Arc::clone(&sink)));

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].gdpr, Some(true));
        assert_eq!(received[0].coppa_applies, Some(false));
    }

    #[test]
    fn test_every_sink_receives_updates() {
        let mut store: ConsentStore<RecordingSink> = ConsentStore::new();
        let a = RecordingSink::named("a");
        let b = RecordingSink::named("b");
        store.register(Arc::clone(&a));
        store.register(Arc::clone(&b));

        store.set_ccpa(true);
        store.set_age_restricted(true);

        for sink in [&a, &b] {
            let received = sink.received();
            // Replay at registration plus two updates
            assert_eq!(received.len(), 3);
            let last = received.last().unwrap();
            assert!(last.ccpa_opted_out());
            assert!(last.is_age_restricted());
        }
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let mut store: ConsentStore<RecordingSink> = ConsentStore::new();
        let sink = RecordingSink::named("dup");

        assert!(store.register(Arc::clone(&sink)));
        assert!(!store.register(Arc::clone(&sink)));
        assert_eq!(store.sink_count(), 1);
        assert_eq!(sink.received().len(), 1);

        store.set_user_consent(true);
        assert_eq!(sink.received().len(), 2);
    }

    #[test]
    fn test_unregistered_sink_stops_receiving() {
        let mut store: ConsentStore<RecordingSink> = ConsentStore::new();
        let sink = RecordingSink::named("gone");
        store.register(Arc::clone(&sink));

        assert!(store.unregister(&sink));
        assert!(!store.unregister(&sink));

        store.set_gdpr(false);
        assert_eq!(sink.received().len(), 1);
        assert_eq!(store.flags().gdpr, Some(false));
    }

    #[test]
    fn test_invalid_location_is_not_propagated() {
        let mut store: ConsentStore<RecordingSink> = ConsentStore::new();
        let sink = RecordingSink::named("geo");
        store.register(Arc::clone(&sink));

        assert!(store.set_user_location(200.0, 0.0).is_err());
        assert_eq!(sink.received().len(), 1);
        assert!(store.flags().location.is_none());
        assert_eq!(store.revision(), 0);

        store.set_user_location(48.85, 2.35).unwrap();
        let last = *sink.received().last().unwrap();
        assert_eq!(last.location.map(|l| l.latitude), Some(48.85));
    }

    #[test]
    fn test_trait_object_store() {
        let mut store: ConsentStore<dyn ConsentSink> = ConsentStore::new();
        let sink = RecordingSink::named("dyn");
        let as_dyn: Arc<dyn ConsentSink> = sink.clone();

        store.set_gdpr(true);
        assert!(store.register(Arc::clone(&as_dyn)));
        assert!(!store.register(as_dyn));
        assert_eq!(sink.received().len(), 1);
    }
}
