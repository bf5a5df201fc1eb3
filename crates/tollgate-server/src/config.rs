use tollgate::{
    ChallengeIssuer, DEFAULT_ASSET, DEFAULT_ASSET_DECIMALS, DEFAULT_CHALLENGE_LIFETIME_SECS,
    DEFAULT_NETWORK,
};

/// Paywall configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct PaywallConfig {
    /// Network identifier placed into every challenge.
    pub network: String,
    /// Address payments must be sent to.
    pub receiver: String,
    /// Asset identifier placed into every challenge.
    pub asset: String,
    pub asset_decimals: u32,
    pub challenge_lifetime_secs: u64,
    /// Remote facilitator base URL, when verification is remote.
    pub facilitator_url: Option<String>,
    pub rate_limit_rpm: u64,
}

impl PaywallConfig {
    /// Read configuration from the environment. `TOLLGATE_RECEIVER` is
    /// required; everything else has defaults.
    pub fn from_env() -> Result<Self, tollgate::TollgateError> {
        let receiver = std::env::var("TOLLGATE_RECEIVER")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                tollgate::TollgateError::ConfigError(
                    "TOLLGATE_RECEIVER is required: set it to the address payments go to"
                        .to_string(),
                )
            })?;

        let network =
            std::env::var("TOLLGATE_NETWORK").unwrap_or_else(|_| DEFAULT_NETWORK.to_string());
        let asset = std::env::var("TOLLGATE_ASSET").unwrap_or_else(|_| DEFAULT_ASSET.to_string());

        let asset_decimals: u32 = std::env::var("TOLLGATE_ASSET_DECIMALS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ASSET_DECIMALS);

        let challenge_lifetime_secs: u64 = std::env::var("TOLLGATE_CHALLENGE_LIFETIME_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CHALLENGE_LIFETIME_SECS);

        let facilitator_url = std::env::var("TOLLGATE_FACILITATOR_URL")
            .ok()
            .filter(|s| !s.is_empty());

        let rate_limit_rpm: u64 = std::env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            network,
            receiver,
            asset,
            asset_decimals,
            challenge_lifetime_secs,
            facilitator_url,
            rate_limit_rpm,
        })
    }

    /// Build the challenge issuer this configuration describes.
    pub fn issuer(&self) -> ChallengeIssuer {
        ChallengeIssuer::new(&self.network, &self.receiver, &self.asset)
            .with_lifetime(self.challenge_lifetime_secs)
    }
}

impl Default for PaywallConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            receiver: String::new(),
            asset: DEFAULT_ASSET.to_string(),
            asset_decimals: DEFAULT_ASSET_DECIMALS,
            challenge_lifetime_secs: DEFAULT_CHALLENGE_LIFETIME_SECS,
            facilitator_url: None,
            rate_limit_rpm: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_carries_config() {
        let config = PaywallConfig {
            receiver: "0xRECV".to_string(),
            challenge_lifetime_secs: 120,
            ..PaywallConfig::default()
        };
        let issuer = config.issuer();
        assert_eq!(issuer.receiver, "0xRECV");
        assert_eq!(issuer.lifetime_secs, 120);
        let challenge = issuer.issue("0.10", "test");
        assert_eq!(challenge.network, DEFAULT_NETWORK);
    }
}
