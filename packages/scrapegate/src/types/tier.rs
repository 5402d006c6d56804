//! Pricing tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// A named pricing category.
///
/// Determines both the credits granted per purchase and the credit
/// cost of a single scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Premium,
    Custom,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Basic, Tier::Premium, Tier::Custom];

    /// Credits granted when a purchase for this tier is confirmed.
    pub fn credit_grant(self) -> u64 {
        match self {
            Tier::Basic => 10,
            Tier::Premium => 100,
            Tier::Custom => 500,
        }
    }

    /// Credits charged per scrape.
    pub fn cost(self) -> u64 {
        match self {
            Tier::Basic => 1,
            Tier::Premium => 2,
            Tier::Custom => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Custom => "custom",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            "custom" => Ok(Tier::Custom),
            other => Err(GatewayError::invalid_input(format!("unknown tier: {other}"))),
        }
    }
}
