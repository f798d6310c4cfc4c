//! Cloud provider value object.

use serde::{Deserialize, Serialize};

/// Hosting provider a server is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
    Azure,
    DigitalOcean,
}

impl Provider {
    pub const ALL: [Provider; 4] = [Self::Aws, Self::Gcp, Self::Azure, Self::DigitalOcean];

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::DigitalOcean => "digitalocean",
        }
    }

    /// Parse from a provider name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aws" => Some(Self::Aws),
            "gcp" => Some(Self::Gcp),
            "azure" => Some(Self::Azure),
            "digitalocean" => Some(Self::DigitalOcean),
            _ => None,
        }
    }

    /// Region used when the caller does not pick one.
    pub fn default_region(&self) -> &'static str {
        match self {
            Self::Aws => "us-east-1",
            Self::Gcp => "us-central1",
            Self::Azure => "eastus",
            Self::DigitalOcean => "nyc3",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Provider::parse("AWS"), Some(Provider::Aws));
        assert_eq!(Provider::parse("DigitalOcean"), Some(Provider::DigitalOcean));
        assert_eq!(Provider::parse("linode"), None);
    }

    #[test]
    fn test_round_trip_str() {
        for provider in Provider::ALL {
            assert_eq!(Provider::parse(provider.as_str()), Some(provider));
        }
    }
}
