//! # Callback Scheduler
//!
//! Cancellable one-shot timers and fire-once completions, processed on the host's
//! own tick instead of background threads.
//!
//! The scheduler never sleeps or spawns. A host calls [`CallbackScheduler::run_due`]
//! from its main loop; every timer whose due time has passed fires exactly once, in
//! due-time order. Records are removed before their effect runs and no lock is held
//! while it runs, so effects can schedule or cancel further work.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//! use callback_scheduler::{CallbackScheduler, ManualClock};
//!
//! let clock = Arc::new(ManualClock::new());
//! let scheduler: CallbackScheduler<&'static str> = CallbackScheduler::with_clock(clock.clone());
//!
//! let fired = Arc::new(AtomicU32::new(0));
//! let counter = Arc::clone(&fired);
//! scheduler.schedule("load", Duration::from_millis(500), move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! assert_eq!(scheduler.run_due(), 0);
//! clock.advance(Duration::from_millis(500));
//! assert_eq!(scheduler.run_due(), 1);
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```

pub mod clock;
pub mod pending;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pending::{Completion, CompletionId, PendingCompletion};
pub use scheduler::{CallbackScheduler, CancelReport, Effect, TimerHandle, TimerId};
