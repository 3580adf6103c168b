//! The backend capability contract

use consent_store::ConsentSink;
use callback_scheduler::CallbackScheduler;

use crate::error::Result;
use crate::event::{LoadTicket, ProviderEventSink, ShowCompletion};
use crate::types::{AdFormat, ProviderDescriptor};

/// Everything a backend receives at initialization
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Where asynchronous outcomes are reported
    pub sink: ProviderEventSink,

    /// The mediator's scheduler, for backends that model latency with timers
    pub scheduler: CallbackScheduler<AdFormat>,
}

impl ProviderContext {
    pub fn new(sink: ProviderEventSink, scheduler: CallbackScheduler<AdFormat>) -> Self {
        Self { sink, scheduler }
    }
}

/// Contract implemented once per ad backend
///
/// Methods take `&self`: a single adapter may be bound to several formats and is
/// shared with the consent store, so implementations keep their own state behind
/// interior mutability. Implementations must not call back into the mediator
/// synchronously; outcomes go through the [`LoadTicket`] and [`ShowCompletion`]
/// tokens.
///
/// Consent arrives through the [`ConsentSink`] supertrait: `set_consent` receives
/// the complete flag set and must be idempotent.
pub trait ProviderAdapter: ConsentSink + Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Prepare the backend
    ///
    /// Idempotent: a second call logs and returns `Ok(())` without repeating side
    /// effects. May be called before or after consent is known.
    fn initialize(&self, context: ProviderContext) -> Result<()>;

    /// Start loading an ad for `ticket.format()`
    ///
    /// The outcome is reported through `ticket`, usually later. When a load for
    /// the format is already in flight the backend keeps one load going and
    /// reports it through the newest ticket. An `Err` here means the load never
    /// started.
    fn request_load(&self, ticket: LoadTicket) -> Result<()>;

    /// Show the loaded ad for `format`
    ///
    /// Without a loaded ad the backend must fail `completion` immediately and
    /// leave its state untouched. Otherwise it finishes `completion` exactly once,
    /// usually later.
    fn show(&self, format: AdFormat, completion: ShowCompletion);

    /// Hide the banner; safe with no banner on screen
    fn hide_banner(&self);

    /// Destroy the banner; safe with no banner loaded
    fn destroy_banner(&self);

    /// Whether an ad for `format` is ready to show
    fn is_loaded(&self, format: AdFormat) -> bool;

    /// Best-effort cancellation of in-flight work at mediator teardown
    ///
    /// After teardown the backend may be initialized again.
    fn teardown(&self) {}

    fn name(&self) -> &str {
        self.descriptor().name()
    }
}
