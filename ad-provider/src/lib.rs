//! # Ad Provider
//!
//! The capability contract every ad backend implements, plus a simulated backend.
//!
//! A backend never touches mediation state directly. It reports asynchronous
//! outcomes from any thread, and the mediator applies them on its own tick. Load
//! and show outcomes travel through single-use tokens, [`LoadTicket`] and
//! [`ShowCompletion`]: reporting consumes the token, and dropping it unreported
//! reports a failure, so an outcome is never silently lost.
//!
//! ## Implementing a backend
//!
//! ```rust,ignore
//! use ad_provider::{AdFormat, LoadTicket, ProviderAdapter, ProviderContext,
//!     ProviderDescriptor, ProviderError, ShowCompletion, ShowOutcome};
//! use consent_store::{ConsentFlags, ConsentSink};
//!
//! struct MyNetwork { descriptor: ProviderDescriptor, /* bridge handle */ }
//!
//! impl ConsentSink for MyNetwork {
//!     fn sink_name(&self) -> &str { self.descriptor.name() }
//!     fn set_consent(&self, flags: &ConsentFlags) { /* forward to the SDK */ }
//! }
//!
//! impl ProviderAdapter for MyNetwork {
//!     fn descriptor(&self) -> &ProviderDescriptor { &self.descriptor }
//!     fn initialize(&self, context: ProviderContext) -> Result<(), ProviderError> { todo!() }
//!     fn request_load(&self, ticket: LoadTicket) -> Result<(), ProviderError> { todo!() }
//!     fn show(&self, format: AdFormat, completion: ShowCompletion) { todo!() }
//!     fn hide_banner(&self) {}
//!     fn destroy_banner(&self) {}
//!     fn is_loaded(&self, format: AdFormat) -> bool { false }
//! }
//! ```

pub mod adapter;
pub mod error;
pub mod event;
pub mod registry;
pub mod simulator;
pub mod types;

pub use adapter::{ProviderAdapter, ProviderContext};
pub use error::{ProviderError, Result};
pub use event::{
    LoadId, LoadTicket, ProviderEvent, ProviderEventSink, RewardOutcome, ShowCompletion,
    ShowOutcome,
};
pub use registry::ProviderRegistry;
pub use simulator::{SimulatedProvider, SimulatorConfig};
pub use types::{AdFormat, ProviderDescriptor};

// Re-export the collaborator crates' types used in this contract
pub use callback_scheduler::{CallbackScheduler, CompletionId};
pub use consent_store::{ConsentFlags, ConsentSink};
