use tollgate::{parse_amount, TollgateError, DEFAULT_ASSET_DECIMALS};

/// Client-side configuration for autonomous payment handling.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hard ceiling on any single autonomous payment, smallest units.
    /// Challenges above this are never paid, regardless of policy.
    pub max_autopay: u128,
    /// Decimals used to interpret challenge amount strings.
    pub asset_decimals: u32,
    /// When set, a confirmation hook must be installed and must approve
    /// every payment.
    pub require_confirmation: bool,
    /// Optional cap on how long a cached receipt may be reused, even if
    /// the challenge itself lives longer.
    pub receipt_lifetime_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // 1.0 of the asset by default
            max_autopay: 10u128.pow(DEFAULT_ASSET_DECIMALS),
            asset_decimals: DEFAULT_ASSET_DECIMALS,
            require_confirmation: false,
            receipt_lifetime_secs: None,
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment. Everything has a
    /// default; `TOLLGATE_MAX_AUTOPAY` is a decimal amount string.
    pub fn from_env() -> Result<Self, TollgateError> {
        let asset_decimals: u32 = std::env::var("TOLLGATE_ASSET_DECIMALS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ASSET_DECIMALS);

        let max_autopay = match std::env::var("TOLLGATE_MAX_AUTOPAY") {
            Ok(v) if !v.is_empty() => parse_amount(&v, asset_decimals)?,
            _ => 10u128.pow(asset_decimals),
        };

        let require_confirmation = std::env::var("TOLLGATE_REQUIRE_CONFIRMATION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let receipt_lifetime_secs = std::env::var("TOLLGATE_RECEIPT_LIFETIME_SECS")
            .ok()
            .and_then(|v| v.parse().ok());

        Ok(Self {
            max_autopay,
            asset_decimals,
            require_confirmation,
            receipt_lifetime_secs,
        })
    }
}
