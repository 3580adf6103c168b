use thiserror::Error;

/// Errors raised while updating consent flags
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsentError {
    /// Coordinates outside the valid WGS84 range, or not finite
    #[error("Invalid user location: latitude {latitude}, longitude {longitude}")]
    InvalidLocation { latitude: f64, longitude: f64 },
}

/// Result type for consent operations
pub type Result<T> = std::result::Result<T, ConsentError>;
