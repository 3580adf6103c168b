//! Shared identifiers for ad formats and backends

use serde::{Deserialize, Serialize};

/// The ad formats a mediator manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdFormat {
    Banner,
    Interstitial,
    Rewarded,
}

impl AdFormat {
    /// Every format, in a stable order
    pub const ALL: [AdFormat; 3] = [AdFormat::Banner, AdFormat::Interstitial, AdFormat::Rewarded];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdFormat::Banner => "banner",
            AdFormat::Interstitial => "interstitial",
            AdFormat::Rewarded => "rewarded",
        }
    }

    /// Full-screen formats finish with a close; banners stay on screen
    pub fn is_fullscreen(&self) -> bool {
        !matches!(self, AdFormat::Banner)
    }
}

impl std::fmt::Display for AdFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a backend and the formats it serves
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    name: String,
    formats: Vec<AdFormat>,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, formats: impl IntoIterator<Item = AdFormat>) -> Self {
        let mut formats: Vec<AdFormat> = formats.into_iter().collect();
        formats.sort();
        formats.dedup();

        Self {
            name: name.into(),
            formats,
        }
    }

    /// A descriptor for a backend serving every format
    pub fn all_formats(name: impl Into<String>) -> Self {
        Self::new(name, AdFormat::ALL)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formats(&self) -> &[AdFormat] {
        &self.formats
    }

    pub fn supports(&self, format: AdFormat) -> bool {
        self.formats.contains(&format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_dedups_and_sorts() {
        let descriptor = ProviderDescriptor::new(
            "net",
            [AdFormat::Rewarded, AdFormat::Banner, AdFormat::Rewarded],
        );

        assert_eq!(descriptor.name(), "net");
        assert_eq!(descriptor.formats(), &[AdFormat::Banner, AdFormat::Rewarded]);
        assert!(descriptor.supports(AdFormat::Banner));
        assert!(!descriptor.supports(AdFormat::Interstitial));
    }

    #[test]
    fn test_format_serde_names() {
        let json = serde_json::to_string(&AdFormat::Interstitial).unwrap();
        assert_eq!(json, "\"interstitial\"");

        let parsed: AdFormat = serde_json::from_str("\"rewarded\"").unwrap();
        assert_eq!(parsed, AdFormat::Rewarded);
        assert_eq!(parsed.to_string(), "rewarded");
    }
}
