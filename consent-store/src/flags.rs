//! Privacy flag record shared with ad backends

use serde::{Deserialize, Serialize};

use crate::error::{ConsentError, Result};

/// Approximate user location forwarded to backends that accept it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl UserLocation {
    /// Create a validated location
    ///
    /// Latitude must lie in [-90, 90] and longitude in [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if !valid {
            return Err(ConsentError::InvalidLocation {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// The full set of privacy flags
///
/// Every flag starts unset (`None`). Backends that need a plain boolean use the
/// accessor methods, which read an unset flag as `false`. The raw `Option` fields
/// stay visible so a backend can distinguish "never asked" from "declined".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentFlags {
    /// GDPR consent granted
    pub gdpr: Option<bool>,

    /// CCPA "do not sell" opt-out
    pub ccpa_opt_out: Option<bool>,

    /// Child-directed treatment (COPPA) applies
    pub coppa_applies: Option<bool>,

    /// Age-restricted user
    pub age_restricted: Option<bool>,

    /// Generic user consent for personalized ads
    pub user_consent: Option<bool>,

    /// Optional user location
    pub location: Option<UserLocation>,
}

impl ConsentFlags {
    pub fn gdpr_granted(&self) -> bool {
        self.gdpr.unwrap_or(false)
    }

    pub fn ccpa_opted_out(&self) -> bool {
        self.ccpa_opt_out.unwrap_or(false)
    }

    pub fn coppa(&self) -> bool {
        self.coppa_applies.unwrap_or(false)
    }

    pub fn is_age_restricted(&self) -> bool {
        self.age_restricted.unwrap_or(false)
    }

    pub fn user_consent_granted(&self) -> bool {
        self.user_consent.unwrap_or(false)
    }

    /// Whether any flag has been explicitly set
    pub fn is_any_set(&self) -> bool {
        self.gdpr.is_some()
            || self.ccpa_opt_out.is_some()
            || self.coppa_applies.is_some()
            || self.age_restricted.is_some()
            || self.user_consent.is_some()
            || self.location.is_some()
    }

    /// Whether backends may serve personalized ads under the current flags
    ///
    /// Child-directed or age-restricted users, a CCPA opt-out, or an explicit
    /// GDPR refusal all disable personalization.
    pub fn allows_personalized_ads(&self) -> bool {
        !self.coppa()
            && !self.is_age_restricted()
            && !self.ccpa_opted_out()
            && self.gdpr != Some(false)
            && self.user_consent != Some(false)
    }
}
