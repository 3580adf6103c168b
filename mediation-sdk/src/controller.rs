//! Per-format lifecycle state machine
//!
//! A [`FormatController`] owns the [`AdState`] of one format. It is only touched
//! under the mediator's state lock; everything that must run without that lock
//! (application completions, observer notifications) is handed back to the
//! caller instead of being invoked here.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Sender;

use ad_provider::{
    AdFormat, LoadId, LoadTicket, ProviderAdapter, ProviderEventSink, ShowCompletion, ShowOutcome,
};
use callback_scheduler::{CallbackScheduler, CompletionId, PendingCompletion, TimerHandle};

use crate::config::Settings;
use crate::error::{MediationError, Result};
use crate::state::{AdEvent, AdEventKind, AdState};

/// The slice of [`Settings`] a controller acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPolicy {
    pub auto_reload: bool,
    pub failure_threshold: u32,
    pub auto_retry: bool,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl LoadPolicy {
    /// Delay before the automatic retry following `failures` consecutive failures
    ///
    /// `retry_delay * 2^(failures - 1)`, capped at `max_retry_delay`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }
}

impl From<&Settings> for LoadPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            auto_reload: settings.auto_reload,
            failure_threshold: settings.failure_threshold,
            auto_retry: settings.auto_retry,
            retry_delay: settings.retry_delay(),
            max_retry_delay: settings.max_retry_delay(),
        }
    }
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Application callback for a show request
pub(crate) type ShowCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// What became of a show request
pub(crate) enum ShowDisposition {
    /// Handed to the backend; the callback is registered as a pending completion
    Started(CompletionId),
    /// The banner is already on screen; resolve the callback with `true`
    AlreadyDisplayed(ShowCallback),
    /// Refused; resolve the callback with `false`
    Rejected {
        callback: ShowCallback,
        reason: MediationError,
    },
}

impl std::fmt::Debug for ShowDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShowDisposition::Started(id) => f.debug_tuple("Started").field(id).finish(),
            ShowDisposition::AlreadyDisplayed(_) => f.write_str("AlreadyDisplayed"),
            ShowDisposition::Rejected { reason, .. } => {
                f.debug_struct("Rejected").field("reason", reason).finish()
            }
        }
    }
}

/// Lifecycle of one ad format
pub(crate) struct FormatController {
    format: AdFormat,
    state: AdState,
    adapter: Option<Arc<dyn ProviderAdapter>>,
    policy: LoadPolicy,
    consecutive_failures: u32,
    load_attempts: u64,
    /// The load whose outcome is awaited; reports for any other id are stale
    current_load: Option<LoadId>,
    retry_timer: Option<TimerHandle<AdFormat>>,
    pending_show: Option<CompletionId>,
    scheduler: CallbackScheduler<AdFormat>,
    retry_tx: Sender<AdFormat>,
    sink: ProviderEventSink,
    events: Vec<AdEvent>,
}

impl FormatController {
    pub(crate) fn new(
        format: AdFormat,
        scheduler: CallbackScheduler<AdFormat>,
        retry_tx: Sender<AdFormat>,
        sink: ProviderEventSink,
    ) -> Self {
        Self {
            format,
            state: AdState::Unloaded,
            adapter: None,
            policy: LoadPolicy::default(),
            consecutive_failures: 0,
            load_attempts: 0,
            current_load: None,
            retry_timer: None,
            pending_show: None,
            scheduler,
            retry_tx,
            sink,
            events: Vec::new(),
        }
    }

    pub(crate) fn bind(&mut self, adapter: Option<Arc<dyn ProviderAdapter>>, policy: LoadPolicy) {
        match &adapter {
            Some(adapter) => tracing::debug!("{} bound to {}", self.format, adapter.name()),
            None => tracing::warn!("{} has no provider; calls for it will fail", self.format),
        }
        self.adapter = adapter;
        self.policy = policy;
    }

    pub(crate) fn state(&self) -> AdState {
        self.state
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn provider_name(&self) -> Option<String> {
        self.adapter.as_ref().map(|adapter| adapter.name().to_string())
    }

    pub(crate) fn has_retry_scheduled(&self) -> bool {
        self.retry_timer
            .as_ref()
            .map(TimerHandle::is_scheduled)
            .unwrap_or(false)
    }

    /// Notifications produced since the last call
    pub(crate) fn take_events(&mut self) -> Vec<AdEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.state == AdState::Loaded
            && self
                .adapter
                .as_ref()
                .map(|adapter| adapter.is_loaded(self.format))
                .unwrap_or(false)
    }

    /// Request a load
    ///
    /// `Ok` when a load started or an ad is already available. Duplicate requests
    /// while loading return `AlreadyInProgress`; a `Failed` format refuses until
    /// [`reset_and_retry`](Self::reset_and_retry).
    pub(crate) fn request_load(&mut self) -> Result<()> {
        match self.state {
            AdState::Loading => Err(MediationError::AlreadyInProgress(self.format)),
            AdState::Failed => Err(MediationError::TerminalLoadFailure {
                format: self.format,
                attempts: self.consecutive_failures,
            }),
            AdState::Loaded | AdState::Showing | AdState::Displayed => {
                tracing::debug!("{} load ignored in {:?}", self.format, self.state);
                Ok(())
            }
            AdState::Unloaded | AdState::Closed => {
                self.cancel_retry();
                self.start_load()
            }
        }
    }

    /// Clear the failure count and load again, leaving `Failed` if needed
    pub(crate) fn reset_and_retry(&mut self) -> Result<()> {
        self.cancel_retry();
        self.consecutive_failures = 0;

        match self.state {
            AdState::Failed | AdState::Unloaded | AdState::Closed => {
                tracing::info!("{} reset, loading again", self.format);
                self.state = AdState::Unloaded;
                self.start_load()
            }
            _ => {
                tracing::debug!("{} reset in {:?}, nothing to retry", self.format, self.state);
                Ok(())
            }
        }
    }

    fn start_load(&mut self) -> Result<()> {
        let Some(adapter) = self.adapter.clone() else {
            tracing::warn!("Cannot load {}: no provider bound", self.format);
            return Err(MediationError::AdapterUnavailable(self.format));
        };

        self.state = AdState::Loading;
        self.load_attempts += 1;
        let id = LoadId::new(self.load_attempts);
        self.current_load = Some(id);
        tracing::debug!("{} loading via {} ({})", self.format, adapter.name(), id);

        // The backend may still hold an ad it never reported to us
        if adapter.is_loaded(self.format) {
            self.load_succeeded();
            return Ok(());
        }

        let ticket = LoadTicket::new(id, self.format, self.sink.clone());
        match adapter.request_load(ticket) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("{} load request rejected by {}: {}", self.format, adapter.name(), e);
                self.load_failed(e.to_string());
                Err(self.failure_error(e.to_string()))
            }
        }
    }

    fn failure_error(&self, reason: String) -> MediationError {
        if self.state == AdState::Failed {
            MediationError::TerminalLoadFailure {
                format: self.format,
                attempts: self.consecutive_failures,
            }
        } else {
            MediationError::TransientLoadFailure {
                format: self.format,
                attempts: self.consecutive_failures,
                reason,
            }
        }
    }

    /// Whether a backend report for `id` answers the load in flight
    fn awaits(&self, id: LoadId) -> bool {
        self.state == AdState::Loading && self.current_load == Some(id)
    }

    pub(crate) fn on_load_succeeded(&mut self, id: LoadId) {
        if !self.awaits(id) {
            tracing::debug!("Dropping stale {} success for {} in {:?}", self.format, id, self.state);
            return;
        }
        self.load_succeeded();
    }

    pub(crate) fn on_load_failed(&mut self, id: LoadId, reason: String) {
        if !self.awaits(id) {
            tracing::debug!("Dropping stale {} failure for {} in {:?}", self.format, id, self.state);
            return;
        }
        self.load_failed(reason);
    }

    fn load_succeeded(&mut self) {
        self.current_load = None;
        self.cancel_retry();
        self.consecutive_failures = 0;
        self.state = AdState::Loaded;
        tracing::debug!("{} loaded", self.format);
        self.emit(AdEventKind::Loaded);
    }

    fn load_failed(&mut self, reason: String) {
        self.current_load = None;
        self.consecutive_failures += 1;
        let failures = self.consecutive_failures;
        let terminal = failures >= self.policy.failure_threshold;

        if terminal {
            self.cancel_retry();
            self.state = AdState::Failed;
            tracing::error!(
                "{} failed {} consecutive loads ({}); reset required",
                self.format,
                failures,
                reason
            );
        } else {
            self.state = AdState::Unloaded;
            tracing::warn!("{} load failed (attempt {}): {}", self.format, failures, reason);
            if self.policy.auto_retry {
                self.schedule_retry(failures);
            }
        }

        self.emit(AdEventKind::LoadFailed {
            reason,
            consecutive_failures: failures,
            terminal,
        });
    }

    fn schedule_retry(&mut self, failures: u32) {
        self.cancel_retry();

        let delay = self.policy.backoff(failures);
        let format = self.format;
        let retry_tx = self.retry_tx.clone();

        tracing::debug!("{} retry in {:?}", format, delay);
        self.retry_timer = Some(self.scheduler.schedule(format, delay, move || {
            // Applied on the mediator's next drain of the retry channel
            let _ = retry_tx.send(format);
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            if timer.cancel() {
                tracing::debug!("{} retry cancelled", self.format);
            }
        }
    }

    pub(crate) fn on_retry_due(&mut self) {
        self.retry_timer = None;
        if self.state != AdState::Unloaded {
            tracing::debug!("{} retry skipped in {:?}", self.format, self.state);
            return;
        }

        if let Err(e) = self.start_load() {
            tracing::debug!("{} retry did not start: {}", self.format, e);
        }
    }

    /// Start a show, or say why it cannot start
    ///
    /// A refused show leaves the state alone, except that an `Unloaded` or
    /// `Closed` format begins loading so a later show can succeed.
    pub(crate) fn show(&mut self, callback: ShowCallback) -> ShowDisposition {
        let Some(adapter) = self.adapter.clone() else {
            return ShowDisposition::Rejected {
                callback,
                reason: MediationError::AdapterUnavailable(self.format),
            };
        };

        if self.state == AdState::Displayed {
            return ShowDisposition::AlreadyDisplayed(callback);
        }

        if self.state == AdState::Loaded && !adapter.is_loaded(self.format) {
            tracing::warn!("{} lost its ad at {}, reloading", self.format, adapter.name());
            self.state = AdState::Unloaded;
        }

        if self.state != AdState::Loaded {
            let state = self.state;
            if state.accepts_load() {
                if let Err(e) = self.request_load() {
                    tracing::debug!("{} load after refused show did not start: {}", self.format, e);
                }
            }
            return ShowDisposition::Rejected {
                callback,
                reason: MediationError::NotReady {
                    format: self.format,
                    state,
                },
            };
        }

        let id = self.scheduler.register_pending(self.format, callback);
        self.pending_show = Some(id);

        if self.format.is_fullscreen() {
            self.state = AdState::Showing;
        } else {
            self.state = AdState::Displayed;
            self.emit(AdEventKind::Displayed);
        }

        tracing::debug!("{} show started ({})", self.format, id);
        adapter.show(self.format, ShowCompletion::new(id, self.format, self.sink.clone()));
        ShowDisposition::Started(id)
    }

    /// Apply a backend show outcome
    ///
    /// Returns the pending completion to fire once the caller has released its
    /// locks, or `None` when the completion was already resolved.
    pub(crate) fn on_show_finished(
        &mut self,
        id: CompletionId,
        outcome: ShowOutcome,
    ) -> Option<PendingCompletion<AdFormat>> {
        let Some(pending) = self.scheduler.take_pending(id) else {
            tracing::debug!("Dropping stale {} show outcome for {}", self.format, id);
            return None;
        };

        if self.pending_show != Some(id) {
            return Some(pending);
        }
        self.pending_show = None;

        let succeeded = outcome.succeeded();
        match (self.format.is_fullscreen(), self.state) {
            (true, AdState::Showing) => {
                // Emitted once the backend confirms the ad reached the screen,
                // whether or not a reward was granted
                if outcome.displayed() {
                    self.emit(AdEventKind::Displayed);
                }
                self.state = AdState::Closed;
                tracing::debug!("{} closed (outcome: {})", self.format, succeeded);
                self.emit(AdEventKind::Closed {
                    completed: succeeded,
                });

                if self.policy.auto_reload {
                    if let Err(e) = self.request_load() {
                        tracing::debug!("{} auto-reload did not start: {}", self.format, e);
                    }
                }
            }
            (false, AdState::Displayed) if !succeeded => {
                tracing::warn!("{} was not displayed", self.format);
                self.state = AdState::Unloaded;
                self.emit(AdEventKind::Hidden);
            }
            _ => {}
        }

        Some(pending)
    }

    pub(crate) fn hide_banner(&mut self) {
        if let Some(adapter) = &self.adapter {
            adapter.hide_banner();
        }

        if self.state == AdState::Displayed {
            self.state = AdState::Loaded;
            tracing::debug!("{} hidden", self.format);
            self.emit(AdEventKind::Hidden);
        }
    }

    /// Destroy the banner; returns the outstanding show completion, if any
    pub(crate) fn destroy_banner(&mut self) -> Option<PendingCompletion<AdFormat>> {
        if let Some(adapter) = &self.adapter {
            adapter.destroy_banner();
        }
        self.cancel_retry();

        self.current_load = None;

        let pending = self
            .pending_show
            .take()
            .and_then(|id| self.scheduler.take_pending(id));

        if self.state != AdState::Unloaded {
            self.state = AdState::Unloaded;
            tracing::debug!("{} destroyed", self.format);
            self.emit(AdEventKind::Destroyed);
        }
        pending
    }

    /// Forget the binding and return to `Unloaded`
    ///
    /// Pending completions stay in the scheduler; the mediator resolves them all
    /// with `cancel_all`.
    pub(crate) fn teardown(&mut self) {
        self.cancel_retry();
        self.pending_show = None;
        self.current_load = None;
        self.state = AdState::Unloaded;
        self.consecutive_failures = 0;
        self.adapter = None;
        self.events.clear();
    }

    fn emit(&mut self, kind: AdEventKind) {
        self.events.push(AdEvent::new(self.format, kind, self.state));
    }
}

impl std::fmt::Debug for FormatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatController")
            .field("format", &self.format)
            .field("state", &self.state)
            .field("provider", &self.provider_name())
            .field("consecutive_failures", &self.consecutive_failures)
            .field("load_attempts", &self.load_attempts)
            .field("current_load", &self.current_load)
            .field("pending_show", &self.pending_show)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ad_provider::{ProviderContext, ProviderEvent, SimulatedProvider, SimulatorConfig};
    use callback_scheduler::ManualClock;
    use crossbeam::channel::{self, Receiver};
    use parking_lot::Mutex;

    struct Harness {
        clock: Arc<ManualClock>,
        scheduler: CallbackScheduler<AdFormat>,
        events: Receiver<ProviderEvent>,
        retries: Receiver<AdFormat>,
        provider: Arc<SimulatedProvider>,
        controller: FormatController,
    }

    impl Harness {
        fn new(format: AdFormat, config: SimulatorConfig, policy: LoadPolicy) -> Self {
            let clock = Arc::new(ManualClock::new());
            let scheduler = CallbackScheduler::with_clock(clock.clone());
            let (sink, events) = ProviderEventSink::channel();
            let (retry_tx, retries) = channel::unbounded();

            let provider = Arc::new(SimulatedProvider::new("sim", config));
            provider
                .initialize(ProviderContext::new(sink.clone(), scheduler.clone()))
                .unwrap();

            let mut controller = FormatController::new(format, scheduler.clone(), retry_tx, sink);
            controller.bind(Some(provider.clone() as Arc<dyn ProviderAdapter>), policy);

            Self {
                clock,
                scheduler,
                events,
                retries,
                provider,
                controller,
            }
        }

        /// Advance time and apply whatever the backend reported
        fn advance(&mut self, ms: u64) -> Vec<bool> {
            self.clock.advance(Duration::from_millis(ms));
            self.scheduler.run_due();

            for _ in self.retries.try_iter().collect::<Vec<_>>() {
                self.controller.on_retry_due();
            }

            let mut fired = Vec::new();
            for event in self.events.try_iter().collect::<Vec<_>>() {
                match event {
                    ProviderEvent::LoadSucceeded { id, .. } => self.controller.on_load_succeeded(id),
                    ProviderEvent::LoadFailed { id, reason, .. } => {
                        self.controller.on_load_failed(id, reason)
                    }
                    ProviderEvent::ShowFinished { id, outcome, .. } => {
                        if let Some(pending) = self.controller.on_show_finished(id, outcome) {
                            pending.fire(outcome.succeeded());
                            fired.push(outcome.succeeded());
                        }
                    }
                }
            }
            fired
        }
    }

    fn policy() -> LoadPolicy {
        LoadPolicy {
            auto_retry: false,
            ..LoadPolicy::default()
        }
    }

    fn recording_callback() -> (Arc<Mutex<Vec<bool>>>, ShowCallback) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, Box::new(move |outcome: bool| sink.lock().push(outcome)))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = LoadPolicy {
            retry_delay: Duration::from_millis(2000),
            max_retry_delay: Duration::from_millis(60_000),
            ..LoadPolicy::default()
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff(6), Duration::from_millis(60_000));
        assert_eq!(policy.backoff(200), Duration::from_millis(60_000));
    }

    #[test]
    fn test_load_then_show_interstitial() {
        let mut h = Harness::new(AdFormat::Interstitial, SimulatorConfig::instant(), policy());

        h.controller.request_load().unwrap();
        assert_eq!(h.controller.state(), AdState::Loading);
        h.advance(0);
        assert!(h.controller.is_loaded());

        let (calls, callback) = recording_callback();
        assert!(matches!(h.controller.show(callback), ShowDisposition::Started(_)));
        assert_eq!(h.controller.state(), AdState::Showing);

        h.advance(0);
        assert_eq!(*calls.lock(), vec![true]);
        // Auto-reload re-entered Loading in the same step as Closed
        assert_eq!(h.controller.state(), AdState::Loading);

        let kinds: Vec<AdEventKind> = h.controller.take_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AdEventKind::Loaded,
                AdEventKind::Displayed,
                AdEventKind::Closed { completed: true }
            ]
        );
    }

    #[test]
    fn test_duplicate_request_while_loading() {
        let mut h = Harness::new(AdFormat::Rewarded, SimulatorConfig::default(), policy());

        h.controller.request_load().unwrap();
        assert_eq!(
            h.controller.request_load(),
            Err(MediationError::AlreadyInProgress(AdFormat::Rewarded))
        );
        assert_eq!(h.provider.loads_started(AdFormat::Rewarded), 1);
    }

    #[test]
    fn test_show_when_unloaded_is_rejected_and_triggers_load() {
        let mut h = Harness::new(AdFormat::Interstitial, SimulatorConfig::default(), policy());
        let (_, callback) = recording_callback();

        match h.controller.show(callback) {
            ShowDisposition::Rejected { reason, .. } => assert_eq!(
                reason,
                MediationError::NotReady {
                    format: AdFormat::Interstitial,
                    state: AdState::Unloaded
                }
            ),
            other => panic!("unexpected disposition {:?}", other),
        }
        assert_eq!(h.controller.state(), AdState::Loading);
        assert_eq!(h.scheduler.pending_count(), 0);
    }

    #[test]
    fn test_threshold_moves_to_failed_and_reset_resumes() {
        let mut h = Harness::new(AdFormat::Banner, SimulatorConfig::always_failing(), policy());

        for attempt in 1..=3 {
            h.controller.request_load().unwrap();
            h.advance(0);
            assert_eq!(h.controller.consecutive_failures(), attempt);
        }
        assert_eq!(h.controller.state(), AdState::Failed);
        assert_eq!(
            h.controller.request_load(),
            Err(MediationError::TerminalLoadFailure {
                format: AdFormat::Banner,
                attempts: 3
            })
        );
        assert_eq!(h.provider.loads_started(AdFormat::Banner), 3);

        h.controller.reset_and_retry().unwrap();
        assert_eq!(h.controller.state(), AdState::Loading);
        assert_eq!(h.controller.consecutive_failures(), 0);
    }

    #[test]
    fn test_auto_retry_fires_after_backoff() {
        let retrying = LoadPolicy {
            auto_retry: true,
            retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(1000),
            ..LoadPolicy::default()
        };
        let mut h = Harness::new(AdFormat::Interstitial, SimulatorConfig::always_failing(), retrying);

        h.controller.request_load().unwrap();
        h.advance(0);
        assert_eq!(h.controller.state(), AdState::Unloaded);
        assert!(h.controller.has_retry_scheduled());

        h.advance(99);
        assert_eq!(h.provider.loads_started(AdFormat::Interstitial), 1);

        // The retry timer fires; its load outcome arrives on the following step
        h.advance(1);
        assert_eq!(h.provider.loads_started(AdFormat::Interstitial), 2);
        assert_eq!(h.controller.state(), AdState::Loading);
    }

    #[test]
    fn test_manual_request_cancels_retry() {
        let retrying = LoadPolicy {
            auto_retry: true,
            ..LoadPolicy::default()
        };
        let mut h = Harness::new(AdFormat::Rewarded, SimulatorConfig::always_failing(), retrying);

        h.controller.request_load().unwrap();
        h.advance(0);
        assert!(h.controller.has_retry_scheduled());

        h.controller.request_load().unwrap();
        assert!(!h.controller.has_retry_scheduled());
    }

    #[test]
    fn test_banner_show_hide_destroy() {
        let mut h = Harness::new(AdFormat::Banner, SimulatorConfig::instant(), policy());
        h.controller.request_load().unwrap();
        h.advance(0);

        let (calls, callback) = recording_callback();
        assert!(matches!(h.controller.show(callback), ShowDisposition::Started(_)));
        assert_eq!(h.controller.state(), AdState::Displayed);

        let (_, again) = recording_callback();
        assert!(matches!(h.controller.show(again), ShowDisposition::AlreadyDisplayed(_)));

        h.advance(0);
        assert_eq!(*calls.lock(), vec![true]);
        assert_eq!(h.controller.state(), AdState::Displayed);

        h.controller.hide_banner();
        assert_eq!(h.controller.state(), AdState::Loaded);

        assert!(h.controller.destroy_banner().is_none());
        assert_eq!(h.controller.state(), AdState::Unloaded);
        assert!(!h.provider.is_loaded(AdFormat::Banner));
    }

    #[test]
    fn test_stale_load_outcomes_are_ignored() {
        let mut h = Harness::new(AdFormat::Interstitial, SimulatorConfig::instant(), policy());

        h.controller.on_load_succeeded(LoadId::new(1));
        h.controller.on_load_failed(LoadId::new(1), "late".to_string());

        assert_eq!(h.controller.state(), AdState::Unloaded);
        assert_eq!(h.controller.consecutive_failures(), 0);
        assert!(h.controller.take_events().is_empty());
    }

    #[test]
    fn test_outcome_for_superseded_load_is_ignored() {
        let mut h = Harness::new(AdFormat::Banner, SimulatorConfig::default(), policy());

        h.controller.request_load().unwrap();
        assert!(h.controller.destroy_banner().is_none());
        h.controller.request_load().unwrap();
        h.controller.take_events();

        // The first attempt reports late, while the second is in flight
        h.controller.on_load_failed(LoadId::new(1), "late".to_string());
        assert_eq!(h.controller.state(), AdState::Loading);
        assert_eq!(h.controller.consecutive_failures(), 0);
        assert!(h.controller.take_events().is_empty());

        h.advance(1000);
        assert!(h.controller.is_loaded());
    }

    #[test]
    fn test_declined_reward_still_reports_displayed() {
        let config = SimulatorConfig {
            reward_success_rate: 0.0,
            ..SimulatorConfig::instant()
        };
        let mut h = Harness::new(AdFormat::Rewarded, config, policy());
        h.controller.request_load().unwrap();
        h.advance(0);

        let (calls, callback) = recording_callback();
        h.controller.show(callback);
        h.advance(0);

        assert_eq!(*calls.lock(), vec![false]);
        let kinds: Vec<AdEventKind> = h.controller.take_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AdEventKind::Loaded,
                AdEventKind::Displayed,
                AdEventKind::Closed { completed: false }
            ]
        );
    }

    #[test]
    fn test_unbound_controller_reports_unavailable() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = CallbackScheduler::with_clock(clock);
        let (sink, _events) = ProviderEventSink::channel();
        let (retry_tx, _retries) = channel::unbounded();
        let mut controller = FormatController::new(AdFormat::Rewarded, scheduler, retry_tx, sink);

        assert_eq!(
            controller.request_load(),
            Err(MediationError::AdapterUnavailable(AdFormat::Rewarded))
        );
        let (_, callback) = recording_callback();
        assert!(matches!(
            controller.show(callback),
            ShowDisposition::Rejected {
                reason: MediationError::AdapterUnavailable(AdFormat::Rewarded),
                ..
            }
        ));
        assert_eq!(controller.state(), AdState::Unloaded);
    }
}
