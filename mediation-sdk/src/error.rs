use thiserror::Error;

use ad_provider::{AdFormat, ProviderError};
use consent_store::ConsentError;

use crate::state::AdState;

/// Errors in the mediation engine
///
/// Only [`Mediator::initialize`](crate::Mediator::initialize) returns these to the
/// caller. Everywhere else they are logged and resolved through a completion
/// callback or a failure event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediationError {
    /// A call arrived before `initialize`
    #[error("Mediator is not initialized")]
    NotInitialized,

    /// `initialize` called on an initialized mediator
    #[error("Mediator is already initialized")]
    AlreadyInitialized,

    /// Duplicate load request while a load is running
    #[error("A {0} load is already in progress")]
    AlreadyInProgress(AdFormat),

    /// Show requested without a loaded ad
    #[error("{format} is not ready to show (state: {state:?})")]
    NotReady { format: AdFormat, state: AdState },

    /// Load failure below the retry threshold
    #[error("{format} load failed (attempt {attempts}): {reason}")]
    TransientLoadFailure {
        format: AdFormat,
        attempts: u32,
        reason: String,
    },

    /// Load failures reached the threshold; the format needs an explicit reset
    #[error("{format} failed {attempts} consecutive loads and needs a reset")]
    TerminalLoadFailure { format: AdFormat, attempts: u32 },

    /// No backend is bound for the format
    #[error("No provider bound for {0}")]
    AdapterUnavailable(AdFormat),

    /// Settings name a provider the registry does not have
    #[error("Unknown provider {name} configured for {format}")]
    UnknownProvider { format: AdFormat, name: String },

    /// Settings bind a provider to a format it does not serve
    #[error("Provider {provider} does not support {format}")]
    UnsupportedFormat { provider: String, format: AdFormat },

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Consent error: {0}")]
    Consent(#[from] ConsentError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type for mediation operations
pub type Result<T> = std::result::Result<T, MediationError>;
