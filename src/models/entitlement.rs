//! Entitlement data consumed by the route guard

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription tier, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Authorization record for a user, as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub tier: Tier,
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "active".to_string()
}

impl EntitlementRecord {
    /// Tier that actually applies; inactive records grant the lowest tier
    #[must_use]
    pub fn effective_tier(&self) -> Tier {
        if matches!(self.status.as_str(), "active" | "trialing") {
            self.tier
        } else {
            Tier::Free
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Free < Tier::Pro);
        assert!(Tier::Pro < Tier::Enterprise);
        assert_eq!(Tier::default(), Tier::Free);
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("Enterprise".parse::<Tier>(), Ok(Tier::Enterprise));
        assert_eq!(" pro ".parse::<Tier>(), Ok(Tier::Pro));
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn test_inactive_record_grants_free() {
        let record = EntitlementRecord {
            tier: Tier::Enterprise,
            status: "canceled".to_string(),
        };
        assert_eq!(record.effective_tier(), Tier::Free);

        let record = EntitlementRecord {
            tier: Tier::Pro,
            status: "trialing".to_string(),
        };
        assert_eq!(record.effective_tier(), Tier::Pro);
    }
}
