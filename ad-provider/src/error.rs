use thiserror::Error;

use crate::types::AdFormat;

/// Synchronous errors reported by a backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// A request arrived before `initialize`
    #[error("Provider {0} is not initialized")]
    NotInitialized(String),

    /// The backend does not serve this format
    #[error("Provider {provider} does not support {format}")]
    UnsupportedFormat { provider: String, format: AdFormat },

    /// Invalid backend configuration
    #[error("Invalid provider configuration: {0}")]
    InvalidConfiguration(String),

    /// Failure inside the backend itself
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
