//! Mediator settings
//!
//! Settings are read-only once handed to the mediator. Loading them from disk or
//! remote config is the host's job; `Settings::from_json` only parses text the
//! host already has.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ad_provider::{AdFormat, SimulatorConfig};

use crate::error::{MediationError, Result};

/// Name under which [`Settings::simulated`] expects the simulated backend
pub const SIMULATOR_PROVIDER: &str = "simulator";

/// Provider name bound to each format; `None` leaves the format unbound
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatProviders {
    pub banner: Option<String>,
    pub interstitial: Option<String>,
    pub rewarded: Option<String>,
}

impl FormatProviders {
    /// Bind every format to the same provider
    pub fn all(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            banner: Some(name.clone()),
            interstitial: Some(name.clone()),
            rewarded: Some(name),
        }
    }

    pub fn get(&self, format: AdFormat) -> Option<&str> {
        match format {
            AdFormat::Banner => self.banner.as_deref(),
            AdFormat::Interstitial => self.interstitial.as_deref(),
            AdFormat::Rewarded => self.rewarded.as_deref(),
        }
    }

    pub fn set(&mut self, format: AdFormat, name: Option<String>) {
        match format {
            AdFormat::Banner => self.banner = name,
            AdFormat::Interstitial => self.interstitial = name,
            AdFormat::Rewarded => self.rewarded = name,
        }
    }
}

/// Configuration for the [`Mediator`](crate::Mediator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Which provider serves each format
    pub providers: FormatProviders,

    /// Re-request a full-screen ad as soon as the previous one closes
    /// Default: true
    pub auto_reload: bool,

    /// Consecutive load failures before a format enters `Failed`
    /// Default: 3
    pub failure_threshold: u32,

    /// Retry transient load failures automatically
    /// Default: true
    pub auto_retry: bool,

    /// Delay before the first automatic retry; doubles per consecutive failure
    /// Default: 2000 ms
    pub retry_delay_ms: u64,

    /// Upper bound for the retry delay
    /// Default: 60000 ms
    pub max_retry_delay_ms: u64,

    /// Tunables for the simulated backend
    pub simulator: SimulatorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            providers: FormatProviders::default(),
            auto_reload: true,
            failure_threshold: 3,
            auto_retry: true,
            retry_delay_ms: 2000,
            max_retry_delay_ms: 60_000,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every format bound to the simulated backend named [`SIMULATOR_PROVIDER`]
    pub fn simulated() -> Self {
        Self {
            providers: FormatProviders::all(SIMULATOR_PROVIDER),
            ..Default::default()
        }
    }

    /// Parse settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)
            .map_err(|e| MediationError::Configuration(format!("Invalid settings JSON: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_provider(mut self, format: AdFormat, name: impl Into<String>) -> Self {
        self.providers.set(format, Some(name.into()));
        self
    }

    pub fn with_auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = enabled;
        self
    }

    pub fn with_simulator(mut self, simulator: SimulatorConfig) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Validate the settings and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(MediationError::Configuration(
                "Failure threshold must be greater than 0".to_string(),
            ));
        }

        if self.retry_delay_ms > self.max_retry_delay_ms {
            return Err(MediationError::Configuration(
                "Invalid retry delay: base must not exceed max".to_string(),
            ));
        }

        self.simulator
            .validate()
            .map_err(|e| MediationError::Configuration(e.to_string()))?;

        Ok(())
    }
}
