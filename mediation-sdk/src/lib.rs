//! # Mediation SDK
//!
//! A sync-first ad mediation engine: one provider bound per ad format, a
//! lifecycle state machine per format, and privacy consent propagated to every
//! bound provider.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mediation_sdk::prelude::*;
//!
//! let clock = Arc::new(ManualClock::new());
//! let mediator = Mediator::with_clock(clock.clone());
//! mediator.set_coppa(false);
//!
//! let registry = ProviderRegistry::new()
//!     .with(Arc::new(SimulatedProvider::new("simulator", SimulatorConfig::default())));
//! mediator.initialize(Settings::simulated(), &registry)?;
//!
//! mediator.request_rewarded_video();
//! clock.advance(Duration::from_secs(1));
//! mediator.tick();
//!
//! assert!(mediator.is_rewarded_video_loaded());
//! mediator.show_rewarded_video(|granted| println!("reward granted: {}", granted));
//! # Ok::<(), MediationError>(())
//! ```
//!
//! ## Key Features
//!
//! - **Explicit facade**: a [`Mediator`] instance owns every piece of state; no statics
//! - **Exactly one callback per show**: misuse, missing providers and teardown all
//!   resolve the callback with `false`
//! - **Host-driven time**: backend latency is modelled with timers that fire on
//!   [`Mediator::tick`]; backend threads never mutate state directly
//! - **Consent replay**: flags set before a provider is bound reach it at bind time
//! - **Runtime provider selection** through [`Settings`] and a [`ProviderRegistry`]
//!
//! ## Architecture
//!
//! ```text
//! mediation-sdk (Mediator facade, format controllers, observers)
//!     ↓
//! ad-provider (ProviderAdapter contract, simulated backend)
//!     ↓                         ↓
//! consent-store             callback-scheduler
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod mediator;
pub mod observer;
pub mod state;

pub use config::{FormatProviders, Settings, SIMULATOR_PROVIDER};
pub use controller::LoadPolicy;
pub use error::{MediationError, Result};
pub use mediator::Mediator;
pub use observer::{EventCallback, SubscriptionId};
pub use state::{AdEvent, AdEventKind, AdState};

pub use ad_provider::{
    AdFormat, LoadId, LoadTicket, ProviderAdapter, ProviderContext, ProviderDescriptor,
    ProviderError, ProviderEvent, ProviderEventSink, ProviderRegistry, RewardOutcome,
    ShowCompletion, ShowOutcome, SimulatedProvider, SimulatorConfig,
};
pub use callback_scheduler::{Clock, ManualClock, SystemClock};
pub use consent_store::{ConsentError, ConsentFlags, ConsentSink, UserLocation};

/// Common imports for hosts
pub mod prelude {
    pub use crate::{
        AdEvent, AdEventKind, AdFormat, AdState, ManualClock, MediationError, Mediator,
        ProviderRegistry, Settings, SimulatedProvider, SimulatorConfig, SubscriptionId,
    };
}
