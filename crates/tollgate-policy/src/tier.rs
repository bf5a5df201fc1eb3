//! Trust tiers: named buckets derived from a numeric reputation score.

use serde::{Deserialize, Serialize};

/// Ordered trust tiers. A score maps to the highest tier whose
/// threshold it meets or exceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustTier {
    Standard,
    Building,
    Good,
    Excellent,
    Elite,
}

impl TrustTier {
    /// Minimum score required for this tier.
    pub fn threshold(self) -> u32 {
        match self {
            TrustTier::Standard => 0,
            TrustTier::Building => 400,
            TrustTier::Good => 600,
            TrustTier::Excellent => 750,
            TrustTier::Elite => 900,
        }
    }

    /// Map a score in [0, 1000] to its tier.
    pub fn for_score(score: u32) -> Self {
        match score {
            900.. => TrustTier::Elite,
            750.. => TrustTier::Excellent,
            600.. => TrustTier::Good,
            400.. => TrustTier::Building,
            _ => TrustTier::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustTier::Standard => "STANDARD",
            TrustTier::Building => "BUILDING",
            TrustTier::Good => "GOOD",
            TrustTier::Excellent => "EXCELLENT",
            TrustTier::Elite => "ELITE",
        }
    }
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
