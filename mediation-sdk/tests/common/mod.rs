//! Shared fixtures for the mediation integration tests

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use mediation_sdk::{
    AdEvent, AdFormat, ConsentFlags, ConsentSink, LoadTicket, ManualClock, Mediator,
    ProviderAdapter, ProviderContext, ProviderDescriptor, ProviderError, ProviderEventSink,
    ProviderRegistry, Settings, ShowCompletion, ShowOutcome, SimulatedProvider, SimulatorConfig,
};

/// A mediator on a manual clock with one simulated provider bound to every format
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub mediator: Arc<Mediator>,
    pub provider: Arc<SimulatedProvider>,
}

impl Fixture {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_settings(config, Settings::simulated())
    }

    pub fn with_settings(config: SimulatorConfig, settings: Settings) -> Self {
        let fixture = Self::uninitialized(config);
        fixture
            .mediator
            .initialize(settings, &fixture.registry())
            .expect("initialize mediator");
        fixture
    }

    /// Built but not initialized, for tests that act before binding
    pub fn uninitialized(config: SimulatorConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let mediator = Arc::new(Mediator::with_clock(clock.clone()));
        let provider = Arc::new(SimulatedProvider::new("simulator", config));
        Self {
            clock,
            mediator,
            provider,
        }
    }

    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::new().with(self.provider.clone())
    }

    /// Move time forward and run one tick
    pub fn advance(&self, ms: u64) -> usize {
        self.clock.advance(Duration::from_millis(ms));
        self.mediator.tick()
    }

    /// Tick until nothing is left to do at the current time
    pub fn settle(&self) -> usize {
        let mut total = 0;
        for _ in 0..32 {
            let processed = self.mediator.tick();
            if processed == 0 {
                break;
            }
            total += processed;
        }
        total
    }

    /// Request `format` and tick until the load resolves
    pub fn load(&self, format: AdFormat) {
        self.mediator.request_load(format);
        self.settle();
    }
}

/// Records every outcome passed to show callbacks built from it
#[derive(Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<bool>>>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl FnOnce(bool) + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move |outcome: bool| calls.lock().push(outcome)
    }

    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().clone()
    }
}

/// Records every lifecycle notification
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<AdEvent>>>,
}

impl EventLog {
    pub fn attach(mediator: &Mediator) -> Self {
        let log = Self::default();
        let events = Arc::clone(&log.events);
        mediator.subscribe_all(move |event: &AdEvent| events.lock().push(event.clone()));
        log
    }

    pub fn events(&self) -> Vec<AdEvent> {
        self.events.lock().clone()
    }

    pub fn for_format(&self, format: AdFormat) -> Vec<AdEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.format == format)
            .cloned()
            .collect()
    }
}

/// A backend whose SDK reports from its own threads
///
/// Loads always fill and shows always display. Call [`ThreadedProvider::join`]
/// to wait until every spawned report has been sent.
pub struct ThreadedProvider {
    descriptor: ProviderDescriptor,
    sink: Mutex<Option<ProviderEventSink>>,
    loaded: Arc<Mutex<HashSet<AdFormat>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    consent: Mutex<Vec<ConsentFlags>>,
}

impl ThreadedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: ProviderDescriptor::all_formats(name),
            sink: Mutex::new(None),
            loaded: Arc::new(Mutex::new(HashSet::new())),
            workers: Mutex::new(Vec::new()),
            consent: Mutex::new(Vec::new()),
        }
    }

    pub fn join(&self) {
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            worker.join().expect("worker thread panicked");
        }
    }

    pub fn consent_history(&self) -> Vec<ConsentFlags> {
        self.consent.lock().clone()
    }

    fn spawn(&self, work: impl FnOnce() + Send + 'static) {
        self.workers.lock().push(std::thread::spawn(work));
    }
}

impl ConsentSink for ThreadedProvider {
    fn sink_name(&self) -> &str {
        self.descriptor.name()
    }

    fn set_consent(&self, flags: &ConsentFlags) {
        self.consent.lock().push(*flags);
    }
}

impl ProviderAdapter for ThreadedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn initialize(&self, context: ProviderContext) -> Result<(), ProviderError> {
        *self.sink.lock() = Some(context.sink);
        Ok(())
    }

    fn request_load(&self, ticket: LoadTicket) -> Result<(), ProviderError> {
        if self.sink.lock().is_none() {
            return Err(ProviderError::NotInitialized(self.descriptor.name().to_string()));
        }
        let loaded = Arc::clone(&self.loaded);

        self.spawn(move || {
            loaded.lock().insert(ticket.format());
            ticket.succeed();
        });
        Ok(())
    }

    fn show(&self, format: AdFormat, completion: ShowCompletion) {
        if !self.loaded.lock().remove(&format) {
            completion.fail();
            return;
        }
        self.spawn(move || completion.finish(ShowOutcome::Displayed(true)));
    }

    fn hide_banner(&self) {}

    fn destroy_banner(&self) {
        self.loaded.lock().remove(&AdFormat::Banner);
    }

    fn is_loaded(&self, format: AdFormat) -> bool {
        self.loaded.lock().contains(&format)
    }

    fn teardown(&self) {
        self.join();
        self.loaded.lock().clear();
        *self.sink.lock() = None;
    }
}

/// A backend that reports load outcomes from a script, synchronously
///
/// Each load request pops the next outcome; an empty script fills. Reports go
/// through the load ticket, so they apply on the next tick.
pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    sink: Mutex<Option<ProviderEventSink>>,
    script: Mutex<VecDeque<bool>>,
    loaded: Mutex<HashSet<AdFormat>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            descriptor: ProviderDescriptor::all_formats(name),
            sink: Mutex::new(None),
            script: Mutex::new(script.into_iter().collect()),
            loaded: Mutex::new(HashSet::new()),
        }
    }
}

impl ConsentSink for ScriptedProvider {
    fn sink_name(&self) -> &str {
        self.descriptor.name()
    }

    fn set_consent(&self, _flags: &ConsentFlags) {}
}

impl ProviderAdapter for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn initialize(&self, context: ProviderContext) -> Result<(), ProviderError> {
        *self.sink.lock() = Some(context.sink);
        Ok(())
    }

    fn request_load(&self, ticket: LoadTicket) -> Result<(), ProviderError> {
        if self.sink.lock().is_none() {
            return Err(ProviderError::NotInitialized(self.descriptor.name().to_string()));
        }

        let fills = self.script.lock().pop_front().unwrap_or(true);
        if fills {
            self.loaded.lock().insert(ticket.format());
            ticket.succeed();
        } else {
            ticket.fail("scripted failure");
        }
        Ok(())
    }

    fn show(&self, format: AdFormat, completion: ShowCompletion) {
        if self.loaded.lock().remove(&format) {
            completion.finish(ShowOutcome::Displayed(true));
        } else {
            completion.fail();
        }
    }

    fn hide_banner(&self) {}

    fn destroy_banner(&self) {
        self.loaded.lock().remove(&AdFormat::Banner);
    }

    fn is_loaded(&self, format: AdFormat) -> bool {
        self.loaded.lock().contains(&format)
    }
}

/// A backend that holds load tickets until the test reports them
///
/// Tickets survive `teardown`, like a native SDK whose callbacks still arrive
/// after the app stopped listening.
pub struct LingeringProvider {
    descriptor: ProviderDescriptor,
    tickets: Mutex<VecDeque<LoadTicket>>,
    loaded: Mutex<HashSet<AdFormat>>,
}

impl LingeringProvider {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: ProviderDescriptor::all_formats(name),
            tickets: Mutex::new(VecDeque::new()),
            loaded: Mutex::new(HashSet::new()),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Fill the oldest outstanding load
    pub fn fill_oldest(&self) {
        let ticket = self.tickets.lock().pop_front().expect("no outstanding load");
        self.loaded.lock().insert(ticket.format());
        ticket.succeed();
    }

    /// Fail the oldest outstanding load
    pub fn fail_oldest(&self, reason: &str) {
        let ticket = self.tickets.lock().pop_front().expect("no outstanding load");
        ticket.fail(reason);
    }
}

impl ConsentSink for LingeringProvider {
    fn sink_name(&self) -> &str {
        self.descriptor.name()
    }

    fn set_consent(&self, _flags: &ConsentFlags) {}
}

impl ProviderAdapter for LingeringProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn initialize(&self, _context: ProviderContext) -> Result<(), ProviderError> {
        Ok(())
    }

    fn request_load(&self, ticket: LoadTicket) -> Result<(), ProviderError> {
        self.tickets.lock().push_back(ticket);
        Ok(())
    }

    fn show(&self, format: AdFormat, completion: ShowCompletion) {
        if self.loaded.lock().remove(&format) {
            completion.finish(ShowOutcome::Displayed(true));
        } else {
            completion.fail();
        }
    }

    fn hide_banner(&self) {}

    fn destroy_banner(&self) {
        self.loaded.lock().remove(&AdFormat::Banner);
    }

    fn is_loaded(&self, format: AdFormat) -> bool {
        self.loaded.lock().contains(&format)
    }
}
