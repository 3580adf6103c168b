//! Mediator - main entry point for the SDK
//!
//! Owns the consent store, one controller per format, the scheduler, and the
//! channel backends report through. Fully synchronous: the host drives time by
//! calling [`Mediator::tick`] from its main loop.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;

use ad_provider::{
    AdFormat, ProviderAdapter, ProviderContext, ProviderEvent, ProviderEventSink, ProviderRegistry,
    SimulatedProvider,
};
use callback_scheduler::{CallbackScheduler, Clock, PendingCompletion, SystemClock};
use consent_store::{ConsentFlags, ConsentStore};

use crate::config::{Settings, SIMULATOR_PROVIDER};
use crate::controller::{FormatController, LoadPolicy, ShowCallback, ShowDisposition};
use crate::error::{MediationError, Result};
use crate::observer::{EventCallback, Observers, SubscriptionId};
use crate::state::{AdEvent, AdState};

/// Work produced under the state lock and run after it is released
#[derive(Default)]
struct Deferred {
    completions: Vec<(PendingCompletion<AdFormat>, bool)>,
    callbacks: Vec<(ShowCallback, bool)>,
    events: Vec<AdEvent>,
}

impl Deferred {
    fn collect_events(&mut self, controller: &mut FormatController) {
        self.events.extend(controller.take_events());
    }
}

struct MediatorState {
    initialized: bool,
    controllers: HashMap<AdFormat, FormatController>,
    /// Distinct adapters bound at initialization
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl MediatorState {
    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(MediationError::NotInitialized)
        }
    }
}

/// Ad mediation engine
///
/// Construct one per application and keep it at the composition root; there is
/// no global instance. All methods take `&self` and may be called from any
/// thread. No internal lock is held while show completions or observers run, so
/// both may call back into the mediator.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use mediation_sdk::{Mediator, ProviderRegistry, Settings, SimulatedProvider, SimulatorConfig};
///
/// let mediator = Mediator::new();
/// mediator.set_gdpr(true);
///
/// let registry = ProviderRegistry::new()
///     .with(Arc::new(SimulatedProvider::new("simulator", SimulatorConfig::instant())));
/// mediator.initialize(Settings::simulated(), &registry)?;
///
/// mediator.request_interstitial();
/// mediator.tick();
/// assert!(mediator.is_interstitial_loaded());
///
/// mediator.show_interstitial(|displayed| println!("displayed: {}", displayed));
/// # Ok::<(), mediation_sdk::MediationError>(())
/// ```
pub struct Mediator {
    state: Mutex<MediatorState>,
    consent: Mutex<ConsentStore<dyn ProviderAdapter>>,
    observers: Observers,
    scheduler: CallbackScheduler<AdFormat>,
    sink: ProviderEventSink,
    events_rx: Receiver<ProviderEvent>,
    retry_rx: Receiver<AdFormat>,
}

impl Mediator {
    /// Create a mediator driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a mediator driven by the given clock
    ///
    /// Tests and hosts that manage their own time pass a
    /// [`ManualClock`](callback_scheduler::ManualClock).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let scheduler = CallbackScheduler::with_clock(clock);
        let (sink, events_rx) = ProviderEventSink::channel();
        let (retry_tx, retry_rx) = channel::unbounded();

        let controllers = AdFormat::ALL
            .into_iter()
            .map(|format| {
                (
                    format,
                    FormatController::new(format, scheduler.clone(), retry_tx.clone(), sink.clone()),
                )
            })
            .collect();

        Self {
            state: Mutex::new(MediatorState {
                initialized: false,
                controllers,
                adapters: Vec::new(),
            }),
            consent: Mutex::new(ConsentStore::new()),
            observers: Observers::new(),
            scheduler,
            sink,
            events_rx,
            retry_rx,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind providers and bring them up
    ///
    /// Each format gets the provider its settings name. Every distinct provider is
    /// initialized once and then registered with the consent store, which replays
    /// the current flags to it. On error nothing stays bound.
    ///
    /// A format bound to [`SIMULATOR_PROVIDER`] that the registry lacks gets a
    /// simulated backend configured from `settings.simulator`.
    pub fn initialize(&self, settings: Settings, registry: &ProviderRegistry) -> Result<()> {
        settings.validate()?;

        let mut state = self.state.lock();
        if state.initialized {
            return Err(MediationError::AlreadyInitialized);
        }

        let registry = with_simulator_fallback(&settings, registry);
        let mut bindings: Vec<(AdFormat, Option<Arc<dyn ProviderAdapter>>)> = Vec::new();
        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

        for format in AdFormat::ALL {
            let Some(name) = settings.providers.get(format) else {
                bindings.push((format, None));
                continue;
            };

            let adapter = registry
                .get(name)
                .ok_or_else(|| MediationError::UnknownProvider {
                    format,
                    name: name.to_string(),
                })?;

            if !adapter.descriptor().supports(format) {
                return Err(MediationError::UnsupportedFormat {
                    provider: name.to_string(),
                    format,
                });
            }

            if !adapters.iter().any(|known| same_adapter(known, &adapter)) {
                adapters.push(Arc::clone(&adapter));
            }
            bindings.push((format, Some(adapter)));
        }

        for (index, adapter) in adapters.iter().enumerate() {
            let context = ProviderContext::new(self.sink.clone(), self.scheduler.clone());
            if let Err(e) = adapter.initialize(context) {
                tracing::error!("Provider {} failed to initialize: {}", adapter.name(), e);
                for started in &adapters[..index] {
                    started.teardown();
                }
                return Err(e.into());
            }
        }

        let policy = LoadPolicy::from(&settings);
        for (format, adapter) in bindings {
            if let Some(controller) = state.controllers.get_mut(&format) {
                controller.bind(adapter, policy);
            }
        }

        {
            let mut consent = self.consent.lock();
            for adapter in &adapters {
                consent.register(Arc::clone(adapter));
            }
        }

        tracing::info!(
            "Mediator initialized with {} provider(s): {}",
            adapters.len(),
            adapters
                .iter()
                .map(|adapter| adapter.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        state.adapters = adapters;
        state.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Run one scheduling cycle
    ///
    /// Fires due timers, starts due retries, then applies every backend event
    /// queued so far. Completions and notifications produced along the way run
    /// before this returns. Returns the number of work items processed.
    pub fn tick(&self) -> usize {
        let mut processed = self.scheduler.run_due();

        let retries: Vec<AdFormat> = self.retry_rx.try_iter().collect();
        if !retries.is_empty() {
            processed += retries.len();
            let deferred = self.with_state(|state, deferred| {
                for format in retries {
                    if let Some(controller) = state.controllers.get_mut(&format) {
                        controller.on_retry_due();
                        deferred.collect_events(controller);
                    }
                }
            });
            self.finish(deferred);
        }

        let events: Vec<ProviderEvent> = self.events_rx.try_iter().collect();
        if !events.is_empty() {
            processed += events.len();
            let deferred = self.with_state(|state, deferred| {
                for event in events {
                    apply_event(state, event, deferred);
                }
            });
            self.finish(deferred);
        }

        processed
    }

    /// Shut down and return to the uninitialized state
    ///
    /// Cancels every timer, resolves every pending show with `false`, tears the
    /// providers down and unregisters them from the consent store. Backend
    /// outcomes that arrive afterwards are dropped. The mediator can be
    /// initialized again.
    pub fn teardown(&self) {
        let (adapters, events) = {
            let mut state = self.state.lock();
            if !state.initialized {
                return;
            }
            state.initialized = false;

            let mut events = Vec::new();
            for controller in state.controllers.values_mut() {
                // Report the banner leaving the screen before forgetting it
                if controller.state() == AdState::Displayed {
                    controller.hide_banner();
                    events.extend(controller.take_events());
                }
                controller.teardown();
            }
            (std::mem::take(&mut state.adapters), events)
        };

        let report = self.scheduler.cancel_all();

        for adapter in &adapters {
            adapter.teardown();
        }

        {
            let mut consent = self.consent.lock();
            for adapter in &adapters {
                consent.unregister(adapter);
            }
        }

        // Drop whatever the backends reported while going down
        let dropped = self.events_rx.try_iter().count() + self.retry_rx.try_iter().count();

        tracing::info!(
            "Mediator torn down: {} timer(s) cancelled, {} show(s) resolved, {} late event(s) dropped",
            report.timers,
            report.completions,
            dropped
        );

        self.observers.dispatch(&events);
    }

    // ========================================================================
    // Format-generic operations
    // ========================================================================

    /// Request an ad for `format`
    ///
    /// Duplicate requests while loading are ignored. A format in `Failed` stays
    /// there until [`reset_and_retry`](Self::reset_and_retry).
    pub fn request_load(&self, format: AdFormat) {
        let deferred = self.with_initialized("request_load", |state, deferred| {
            if let Some(controller) = state.controllers.get_mut(&format) {
                match controller.request_load() {
                    Ok(()) => {}
                    Err(MediationError::AlreadyInProgress(_)) => {
                        tracing::debug!("{} load already in progress", format);
                    }
                    Err(e) => tracing::warn!("{} load not started: {}", format, e),
                }
                deferred.collect_events(controller);
            }
        });
        self.finish(deferred);
    }

    /// Whether `format` has an ad ready to show
    pub fn is_loaded(&self, format: AdFormat) -> bool {
        let state = self.state.lock();
        state.initialized
            && state
                .controllers
                .get(&format)
                .map(FormatController::is_loaded)
                .unwrap_or(false)
    }

    /// Show the loaded ad for `format`
    ///
    /// `callback` runs exactly once: with `false` right away when nothing is
    /// ready, otherwise with the backend's outcome on a later [`tick`](Self::tick).
    /// A refused show on an unloaded format starts a load.
    pub fn show<F>(&self, format: AdFormat, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let mut callback: Option<ShowCallback> = Some(Box::new(callback));

        let deferred = self.with_initialized("show", |state, deferred| {
            let Some(controller) = state.controllers.get_mut(&format) else {
                return;
            };
            let Some(callback) = callback.take() else {
                return;
            };

            match controller.show(callback) {
                ShowDisposition::Started(id) => {
                    tracing::debug!("{} show pending as {}", format, id);
                }
                ShowDisposition::AlreadyDisplayed(callback) => {
                    deferred.callbacks.push((callback, true));
                }
                ShowDisposition::Rejected { callback, reason } => {
                    tracing::warn!("{} show refused: {}", format, reason);
                    deferred.callbacks.push((callback, false));
                }
            }
            deferred.collect_events(controller);
        });

        // Not initialized
        if let Some(callback) = callback {
            callback(false);
        }
        self.finish(deferred);
    }

    pub fn state(&self, format: AdFormat) -> AdState {
        self.state
            .lock()
            .controllers
            .get(&format)
            .map(FormatController::state)
            .unwrap_or_default()
    }

    /// Leave `Failed` and load again
    pub fn reset_and_retry(&self, format: AdFormat) {
        let deferred = self.with_initialized("reset_and_retry", |state, deferred| {
            if let Some(controller) = state.controllers.get_mut(&format) {
                if let Err(e) = controller.reset_and_retry() {
                    tracing::warn!("{} reset did not start a load: {}", format, e);
                }
                deferred.collect_events(controller);
            }
        });
        self.finish(deferred);
    }

    pub fn consecutive_failures(&self, format: AdFormat) -> u32 {
        self.state
            .lock()
            .controllers
            .get(&format)
            .map(FormatController::consecutive_failures)
            .unwrap_or(0)
    }

    /// Whether an automatic retry is waiting for `format`
    pub fn is_retry_scheduled(&self, format: AdFormat) -> bool {
        self.state
            .lock()
            .controllers
            .get(&format)
            .map(FormatController::has_retry_scheduled)
            .unwrap_or(false)
    }

    /// Name of the provider bound to `format`
    pub fn provider_name(&self, format: AdFormat) -> Option<String> {
        self.state
            .lock()
            .controllers
            .get(&format)
            .and_then(FormatController::provider_name)
    }

    // ========================================================================
    // Banner
    // ========================================================================

    pub fn request_banner(&self) {
        self.request_load(AdFormat::Banner);
    }

    /// Put the loaded banner on screen
    ///
    /// Returns `true` when the banner is displayed or already was. Without a
    /// loaded banner this returns `false` and starts a load.
    pub fn show_banner(&self) -> bool {
        let mut shown = false;
        let deferred = self.with_initialized("show_banner", |state, deferred| {
            let Some(controller) = state.controllers.get_mut(&AdFormat::Banner) else {
                return;
            };

            match controller.show(Box::new(|_: bool| {})) {
                ShowDisposition::Started(_) | ShowDisposition::AlreadyDisplayed(_) => shown = true,
                ShowDisposition::Rejected { reason, .. } => {
                    tracing::warn!("Banner show refused: {}", reason);
                }
            }
            deferred.collect_events(controller);
        });
        self.finish(deferred);
        shown
    }

    pub fn hide_banner(&self) {
        let deferred = self.with_initialized("hide_banner", |state, deferred| {
            if let Some(controller) = state.controllers.get_mut(&AdFormat::Banner) {
                controller.hide_banner();
                deferred.collect_events(controller);
            }
        });
        self.finish(deferred);
    }

    pub fn destroy_banner(&self) {
        let deferred = self.with_initialized("destroy_banner", |state, deferred| {
            if let Some(controller) = state.controllers.get_mut(&AdFormat::Banner) {
                if let Some(pending) = controller.destroy_banner() {
                    deferred.completions.push((pending, false));
                }
                deferred.collect_events(controller);
            }
        });
        self.finish(deferred);
    }

    // ========================================================================
    // Interstitial
    // ========================================================================

    pub fn request_interstitial(&self) {
        self.request_load(AdFormat::Interstitial);
    }

    pub fn is_interstitial_loaded(&self) -> bool {
        self.is_loaded(AdFormat::Interstitial)
    }

    /// Show the interstitial; `callback` receives whether it was displayed
    pub fn show_interstitial<F>(&self, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.show(AdFormat::Interstitial, callback);
    }

    // ========================================================================
    // Rewarded
    // ========================================================================

    pub fn request_rewarded_video(&self) {
        self.request_load(AdFormat::Rewarded);
    }

    pub fn is_rewarded_video_loaded(&self) -> bool {
        self.is_loaded(AdFormat::Rewarded)
    }

    /// Show the rewarded video; `callback` receives whether the reward was granted
    pub fn show_rewarded_video<F>(&self, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.show(AdFormat::Rewarded, callback);
    }

    // ========================================================================
    // Consent
    //
    // Usable before `initialize`; providers receive the stored flags when bound.
    // ========================================================================

    pub fn set_gdpr(&self, granted: bool) {
        self.consent.lock().set_gdpr(granted);
    }

    pub fn set_ccpa(&self, opt_out: bool) {
        self.consent.lock().set_ccpa(opt_out);
    }

    pub fn set_coppa(&self, applies: bool) {
        self.consent.lock().set_coppa(applies);
    }

    pub fn set_user_consent(&self, granted: bool) {
        self.consent.lock().set_user_consent(granted);
    }

    pub fn set_age_restricted(&self, restricted: bool) {
        self.consent.lock().set_age_restricted(restricted);
    }

    /// Record the user's location; out-of-range coordinates are ignored
    pub fn set_user_location(&self, latitude: f64, longitude: f64) {
        if let Err(e) = self.consent.lock().set_user_location(latitude, longitude) {
            tracing::warn!("Ignoring user location: {}", e);
        }
    }

    /// Current consent flags
    pub fn consent(&self) -> ConsentFlags {
        self.consent.lock().flags()
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Receive lifecycle notifications for one format
    pub fn subscribe<F>(&self, format: AdFormat, callback: F) -> SubscriptionId
    where
        F: Fn(&AdEvent) + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(callback);
        self.observers.subscribe(Some(format), callback)
    }

    /// Receive lifecycle notifications for every format
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AdEvent) + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(callback);
        self.observers.subscribe(None, callback)
    }

    /// Stop notifications; safe to call from inside a notification
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn with_state<F>(&self, f: F) -> Deferred
    where
        F: FnOnce(&mut MediatorState, &mut Deferred),
    {
        let mut deferred = Deferred::default();
        let mut state = self.state.lock();
        f(&mut state, &mut deferred);
        deferred
    }

    /// Like `with_state`, but warns and skips `f` before `initialize`
    fn with_initialized<F>(&self, operation: &str, f: F) -> Deferred
    where
        F: FnOnce(&mut MediatorState, &mut Deferred),
    {
        self.with_state(|state, deferred| match state.ensure_initialized() {
            Ok(()) => f(state, deferred),
            Err(e) => tracing::warn!("Ignoring {}: {}", operation, e),
        })
    }

    /// Run deferred work; the state lock must already be released
    fn finish(&self, deferred: Deferred) {
        for (pending, outcome) in deferred.completions {
            tracing::debug!("Resolving {} with {}", pending.id(), outcome);
            pending.fire(outcome);
        }
        for (callback, outcome) in deferred.callbacks {
            callback(outcome);
        }
        self.observers.dispatch(&deferred.events);
    }
}

fn apply_event(state: &mut MediatorState, event: ProviderEvent, deferred: &mut Deferred) {
    let format = event.format();
    let Some(controller) = state.controllers.get_mut(&format) else {
        return;
    };

    match event {
        ProviderEvent::LoadSucceeded { id, .. } => controller.on_load_succeeded(id),
        ProviderEvent::LoadFailed { id, reason, .. } => controller.on_load_failed(id, reason),
        ProviderEvent::ShowFinished { id, outcome, .. } => {
            if let Some(pending) = controller.on_show_finished(id, outcome) {
                deferred.completions.push((pending, outcome.succeeded()));
            }
        }
    }
    deferred.collect_events(controller);
}

/// Settings that name the simulator get one built from `settings.simulator`
/// when the host did not register its own
fn with_simulator_fallback(settings: &Settings, registry: &ProviderRegistry) -> ProviderRegistry {
    let mut registry = registry.clone();
    let wants_simulator = AdFormat::ALL
        .into_iter()
        .any(|format| settings.providers.get(format) == Some(SIMULATOR_PROVIDER));

    if wants_simulator && registry.get(SIMULATOR_PROVIDER).is_none() {
        tracing::info!("No {} provider registered; creating one from settings", SIMULATOR_PROVIDER);
        registry.register(Arc::new(SimulatedProvider::new(
            SIMULATOR_PROVIDER,
            settings.simulator.clone(),
        )));
    }
    registry
}

fn same_adapter(a: &Arc<dyn ProviderAdapter>, b: &Arc<dyn ProviderAdapter>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mediator {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        let mut states: Vec<(AdFormat, AdState)> = state
            .controllers
            .iter()
            .map(|(format, controller)| (*format, controller.state()))
            .collect();
        states.sort_by_key(|(format, _)| *format);
        f.debug_struct("Mediator")
            .field("initialized", &state.initialized)
            .field("providers", &state.adapters.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("states", &states)
            .field("observers", &self.observers)
            .finish()
    }
}
