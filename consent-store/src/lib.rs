//! # Consent Store
//!
//! Process-wide privacy flags for ad mediation, with synchronous propagation to
//! every registered backend.
//!
//! The store is the single source of truth. Backends are downstream mirrors: each
//! one receives the full [`ConsentFlags`] record whenever any flag changes, and a
//! backend registered late gets the current record replayed at registration, so it
//! never runs with stale or default consent.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use consent_store::{ConsentFlags, ConsentSink, ConsentStore};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<ConsentFlags>>);
//!
//! impl ConsentSink for Recorder {
//!     fn sink_name(&self) -> &str {
//!         "recorder"
//!     }
//!
//!     fn set_consent(&self, flags: &ConsentFlags) {
//!         self.0.lock().unwrap().push(*flags);
//!     }
//! }
//!
//! let mut store: ConsentStore<Recorder> = ConsentStore::new();
//! store.set_gdpr(true);
//!
//! let recorder = Arc::new(Recorder::default());
//! store.register(Arc::clone(&recorder));
//!
//! let seen = recorder.0.lock().unwrap();
//! assert_eq!(seen.len(), 1);
//! assert!(seen[0].gdpr_granted());
//! ```

pub mod error;
pub mod flags;
pub mod store;

pub use error::{ConsentError, Result};
pub use flags::{ConsentFlags, UserLocation};
pub use store::{ConsentSink, ConsentStore};
