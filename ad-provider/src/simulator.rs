//! Simulated ad backend
//!
//! Models network and display latency with scheduler timers and rolls load and
//! reward outcomes from configured probabilities. Used for tests, demos, and for
//! running an app without a real network bound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use callback_scheduler::TimerHandle;
use consent_store::{ConsentFlags, ConsentSink};

use crate::adapter::{ProviderAdapter, ProviderContext};
use crate::error::{ProviderError, Result};
use crate::event::{LoadTicket, RewardOutcome, ShowCompletion, ShowOutcome};
use crate::types::{AdFormat, ProviderDescriptor};

/// Tunables for [`SimulatedProvider`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Delay between a load request and its outcome
    /// Default: 1000 ms
    pub load_latency_ms: u64,

    /// Delay between showing a full-screen ad and its outcome
    /// Default: 2000 ms
    pub show_latency_ms: u64,

    /// Probability that a load succeeds
    /// Default: 1.0
    pub load_success_rate: f64,

    /// Probability that a rewarded show grants the reward
    /// Default: 1.0
    pub reward_success_rate: f64,

    /// Seed for reproducible outcomes; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            load_latency_ms: 1000,
            show_latency_ms: 2000,
            load_success_rate: 1.0,
            reward_success_rate: 1.0,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Zero latency and guaranteed success; outcomes arrive on the next tick
    pub fn instant() -> Self {
        Self {
            load_latency_ms: 0,
            show_latency_ms: 0,
            ..Default::default()
        }
    }

    /// Every load fails
    pub fn always_failing() -> Self {
        Self {
            load_success_rate: 0.0,
            ..Self::instant()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("load_success_rate", self.load_success_rate),
            ("reward_success_rate", self.reward_success_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ProviderError::InvalidConfiguration(format!(
                    "{} must be within [0, 1], got {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }

    pub fn load_latency(&self) -> Duration {
        Duration::from_millis(self.load_latency_ms)
    }

    pub fn show_latency(&self) -> Duration {
        Duration::from_millis(self.show_latency_ms)
    }
}

#[derive(Default)]
struct Counters {
    initialize_calls: u32,
    load_requests: HashMap<AdFormat, u32>,
    loads_started: HashMap<AdFormat, u32>,
    show_requests: HashMap<AdFormat, u32>,
    consent_updates: u32,
}

struct SimState {
    context: Option<ProviderContext>,
    rng: StdRng,
    loading: HashSet<AdFormat>,
    loaded: HashSet<AdFormat>,
    banner_visible: bool,
    consent: Option<ConsentFlags>,
    load_timers: HashMap<AdFormat, TimerHandle<AdFormat>>,
    load_tickets: HashMap<AdFormat, LoadTicket>,
    show_timers: HashMap<AdFormat, TimerHandle<AdFormat>>,
    counters: Counters,
}

/// A backend that fakes fills and rewards
pub struct SimulatedProvider {
    descriptor: ProviderDescriptor,
    config: SimulatorConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedProvider {
    /// Simulated backend serving every format
    pub fn new(name: impl Into<String>, config: SimulatorConfig) -> Self {
        Self::with_descriptor(ProviderDescriptor::all_formats(name), config)
    }

    pub fn with_descriptor(descriptor: ProviderDescriptor, config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            descriptor,
            config,
            state: Arc::new(Mutex::new(SimState {
                context: None,
                rng,
                loading: HashSet::new(),
                loaded: HashSet::new(),
                banner_visible: false,
                consent: None,
                load_timers: HashMap::new(),
                load_tickets: HashMap::new(),
                show_timers: HashMap::new(),
                counters: Counters::default(),
            })),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().context.is_some()
    }

    /// Times `initialize` ran its side effects
    pub fn initialize_count(&self) -> u32 {
        self.state.lock().counters.initialize_calls
    }

    /// Load requests received for `format`, including deduplicated ones
    pub fn load_requests(&self, format: AdFormat) -> u32 {
        self.state
            .lock()
            .counters
            .load_requests
            .get(&format)
            .copied()
            .unwrap_or(0)
    }

    /// Loads actually started for `format`
    pub fn loads_started(&self, format: AdFormat) -> u32 {
        self.state
            .lock()
            .counters
            .loads_started
            .get(&format)
            .copied()
            .unwrap_or(0)
    }

    pub fn show_requests(&self, format: AdFormat) -> u32 {
        self.state
            .lock()
            .counters
            .show_requests
            .get(&format)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_loading(&self, format: AdFormat) -> bool {
        self.state.lock().loading.contains(&format)
    }

    pub fn is_banner_visible(&self) -> bool {
        self.state.lock().banner_visible
    }

    /// Number of `set_consent` calls received
    pub fn consent_updates(&self) -> u32 {
        self.state.lock().counters.consent_updates
    }

    /// The most recent flags received, if any
    pub fn consent(&self) -> Option<ConsentFlags> {
        self.state.lock().consent
    }

    fn roll(rng: &mut StdRng, probability: f64) -> bool {
        if probability.is_nan() {
            return false;
        }
        rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    fn unsupported(&self, format: AdFormat) -> ProviderError {
        ProviderError::UnsupportedFormat {
            provider: self.descriptor.name().to_string(),
            format,
        }
    }
}

impl ConsentSink for SimulatedProvider {
    fn sink_name(&self) -> &str {
        self.descriptor.name()
    }

    fn set_consent(&self, flags: &ConsentFlags) {
        let mut state = self.state.lock();
        state.consent = Some(*flags);
        state.counters.consent_updates += 1;

        tracing::debug!(
            "{}: consent applied (personalized ads: {})",
            self.descriptor.name(),
            flags.allows_personalized_ads()
        );
    }
}

impl ProviderAdapter for SimulatedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn initialize(&self, context: ProviderContext) -> Result<()> {
        self.config.validate()?;

        let mut state = self.state.lock();
        if state.context.is_some() {
            tracing::debug!("{}: already initialized", self.descriptor.name());
            return Ok(());
        }

        state.context = Some(context);
        state.counters.initialize_calls += 1;
        tracing::info!(
            "{}: simulated backend initialized for {:?}",
            self.descriptor.name(),
            self.descriptor.formats()
        );
        Ok(())
    }

    fn request_load(&self, ticket: LoadTicket) -> Result<()> {
        let format = ticket.format();
        if !self.descriptor.supports(format) {
            return Err(self.unsupported(format));
        }

        let mut state = self.state.lock();
        let Some(context) = state.context.clone() else {
            return Err(ProviderError::NotInitialized(self.descriptor.name().to_string()));
        };

        *state.counters.load_requests.entry(format).or_insert(0) += 1;

        if state.loaded.contains(&format) {
            drop(state);
            tracing::debug!("{}: {} already loaded", self.descriptor.name(), format);
            ticket.succeed();
            return Ok(());
        }

        if state.loading.contains(&format) {
            // One load stays in flight; its outcome goes to the newest ticket
            let replaced = state.load_tickets.insert(format, ticket);
            drop(state);
            tracing::debug!("{}: {} load already in progress", self.descriptor.name(), format);
            if let Some(replaced) = replaced {
                replaced.supersede();
            }
            return Ok(());
        }

        state.loading.insert(format);
        state.load_tickets.insert(format, ticket);
        *state.counters.loads_started.entry(format).or_insert(0) += 1;

        let filled = Self::roll(&mut state.rng, self.config.load_success_rate);
        let shared = Arc::clone(&self.state);
        let name = self.descriptor.name().to_string();

        let handle = context
            .scheduler
            .schedule(format, self.config.load_latency(), move || {
                let mut state = shared.lock();
                state.load_timers.remove(&format);
                if !state.loading.remove(&format) {
                    return;
                }
                if filled {
                    state.loaded.insert(format);
                }
                let ticket = state.load_tickets.remove(&format);
                drop(state);

                let Some(ticket) = ticket else {
                    return;
                };
                if filled {
                    tracing::debug!("{}: {} filled", name, format);
                    ticket.succeed();
                } else {
                    tracing::debug!("{}: {} no fill", name, format);
                    ticket.fail("no fill");
                }
            });
        state.load_timers.insert(format, handle);

        Ok(())
    }

    fn show(&self, format: AdFormat, completion: ShowCompletion) {
        let mut state = self.state.lock();
        *state.counters.show_requests.entry(format).or_insert(0) += 1;

        let Some(context) = state.context.clone() else {
            drop(state);
            tracing::warn!("{}: show before initialize", self.descriptor.name());
            completion.fail();
            return;
        };

        if !state.loaded.contains(&format) {
            drop(state);
            tracing::debug!("{}: no {} ad loaded", self.descriptor.name(), format);
            completion.fail();
            return;
        }

        let outcome = match format {
            AdFormat::Banner => {
                // Banners stay loaded while on screen
                state.banner_visible = true;
                drop(state);
                completion.finish(ShowOutcome::Displayed(true));
                return;
            }
            AdFormat::Interstitial => ShowOutcome::Displayed(true),
            AdFormat::Rewarded => ShowOutcome::Reward(RewardOutcome {
                displayed: true,
                granted: Self::roll(&mut state.rng, self.config.reward_success_rate),
            }),
        };

        // A full-screen ad is consumed by showing it
        state.loaded.remove(&format);

        let shared = Arc::clone(&self.state);
        let handle = context
            .scheduler
            .schedule(format, self.config.show_latency(), move || {
                shared.lock().show_timers.remove(&format);
                completion.finish(outcome);
            });
        state.show_timers.insert(format, handle);
    }

    fn hide_banner(&self) {
        self.state.lock().banner_visible = false;
    }

    fn destroy_banner(&self) {
        let mut state = self.state.lock();
        state.banner_visible = false;
        state.loaded.remove(&AdFormat::Banner);
        state.loading.remove(&AdFormat::Banner);
        let timer = state.load_timers.remove(&AdFormat::Banner);
        let ticket = state.load_tickets.remove(&AdFormat::Banner);
        drop(state);

        if let Some(handle) = timer {
            handle.cancel();
        }
        // Reports an abandoned load the mediator no longer waits on
        drop(ticket);
    }

    fn is_loaded(&self, format: AdFormat) -> bool {
        self.state.lock().loaded.contains(&format)
    }

    fn teardown(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        // Dropping a cancelled show timer or an open load ticket reports a
        // failure the mediator will ignore after teardown
        let timers: Vec<TimerHandle<AdFormat>> = state
            .load_timers
            .drain()
            .chain(state.show_timers.drain())
            .map(|(_, handle)| handle)
            .collect();
        let tickets: Vec<LoadTicket> = state.load_tickets.drain().map(|(_, ticket)| ticket).collect();
        state.loading.clear();
        state.loaded.clear();
        state.banner_visible = false;
        state.context = None;
        drop(guard);

        for handle in timers {
            handle.cancel();
        }
        drop(tickets);
        tracing::debug!("{}: torn down", self.descriptor.name());
    }
}

impl std::fmt::Debug for SimulatedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedProvider")
            .field("descriptor", &self.descriptor)
            .field("config", &self.config)
            .finish()
    }
}
