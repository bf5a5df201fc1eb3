//! Trust Gate: is this recipient trustworthy enough to receive an
//! autonomous payment?
//!
//! Scores come from an external [`TrustOracle`] in [0, 1000]. Score 0
//! means "no reputation data", which is its own case, not a failure.
//! Unavailability of trust data is never implicit trust, so any
//! oracle error fails closed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::ledger::Ledger;
use crate::tier::TrustTier;

/// External trust oracle.
///
/// `get_score` returns a reputation score in [0, 1000]; absence of data
/// must be represented as score 0, not an error. Errors mean the query
/// itself failed.
pub trait TrustOracle: Send + Sync {
    fn get_score(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<u32, PolicyError>> + Send;
}

/// Operator-owned trust gate configuration. Read on every evaluation,
/// mutated only through explicit configuration updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustGateConfig {
    pub enabled: bool,
    /// Minimum absolute score in [0, 1000].
    pub min_score: u32,
    pub min_tier: TrustTier,
    /// Whether a recipient with no reputation data (score 0) may be paid.
    pub allow_unscored: bool,
    /// Addresses exempt from scoring, compared case-insensitively.
    pub exceptions: Vec<String>,
}

impl Default for TrustGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 600,
            min_tier: TrustTier::Good,
            allow_unscored: false,
            exceptions: Vec::new(),
        }
    }
}

impl TrustGateConfig {
    pub fn is_exception(&self, recipient: &str) -> bool {
        self.exceptions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(recipient))
    }
}

/// Outcome of a trust evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<TrustTier>,
    pub reason: String,
}

impl TrustDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            score: None,
            tier: None,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            score: None,
            tier: None,
            reason: reason.into(),
        }
    }
}

/// Pure decision over an oracle outcome. No I/O; the disabled and
/// exception short-circuits happen before the oracle is queried, in
/// [`TrustGate::evaluate`].
pub fn score_decision(
    score: Result<u32, PolicyError>,
    config: &TrustGateConfig,
) -> TrustDecision {
    let score = match score {
        Ok(s) => s,
        // Fail closed: an unreachable oracle is a denial, not a pass.
        Err(e) => return TrustDecision::deny(format!("trust oracle unavailable: {e}")),
    };

    if score == 0 {
        return if config.allow_unscored {
            TrustDecision {
                allowed: true,
                score: Some(0),
                tier: Some(TrustTier::Standard),
                reason: "no reputation data; unscored recipients allowed".to_string(),
            }
        } else {
            TrustDecision {
                allowed: false,
                score: Some(0),
                tier: None,
                reason: format!(
                    "no reputation data; minimum score {} required",
                    config.min_score
                ),
            }
        };
    }

    if score < config.min_score {
        return TrustDecision {
            allowed: false,
            score: Some(score),
            tier: None,
            reason: format!("score {score} below minimum {}", config.min_score),
        };
    }

    let tier = TrustTier::for_score(score);
    if tier < config.min_tier {
        return TrustDecision {
            allowed: false,
            score: Some(score),
            tier: Some(tier),
            reason: format!("tier {tier} below minimum {}", config.min_tier),
        };
    }

    TrustDecision {
        allowed: true,
        score: Some(score),
        tier: Some(tier),
        reason: format!("score {score}, tier {tier}"),
    }
}

/// Trust gate: queries the oracle, applies [`score_decision`], and
/// audits every evaluation.
pub struct TrustGate<O: TrustOracle> {
    oracle: O,
    ledger: Arc<Ledger>,
}

impl<O: TrustOracle> TrustGate<O> {
    pub fn new(oracle: O, ledger: Arc<Ledger>) -> Self {
        Self { oracle, ledger }
    }

    /// Evaluate whether `recipient` may receive an autonomous payment.
    ///
    /// Check order is fixed: disabled gate first (no-op pass-through),
    /// then the exception list (no oracle call), then the oracle score.
    pub async fn evaluate(
        &self,
        recipient: &str,
        config: &TrustGateConfig,
    ) -> Result<TrustDecision, PolicyError> {
        let decision = if !config.enabled {
            TrustDecision::allow("trust gate disabled")
        } else if config.is_exception(recipient) {
            TrustDecision::allow("exception")
        } else {
            let score = self.oracle.get_score(recipient).await;
            score_decision(score, config)
        };

        self.ledger
            .append_audit("trust", recipient, decision.allowed, &decision.reason)?;
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOracle(Result<u32, String>);

    impl TrustOracle for FixedOracle {
        async fn get_score(&self, _address: &str) -> Result<u32, PolicyError> {
            self.0.clone().map_err(PolicyError::Oracle)
        }
    }

    fn config() -> TrustGateConfig {
        TrustGateConfig {
            enabled: true,
            min_score: 600,
            min_tier: TrustTier::Good,
            allow_unscored: false,
            exceptions: vec![],
        }
    }

    fn gate(oracle: FixedOracle) -> TrustGate<FixedOracle> {
        TrustGate::new(oracle, Arc::new(Ledger::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_score_above_minimum_allows() {
        // score 650 against minScore 600 / minTier GOOD
        let g = gate(FixedOracle(Ok(650)));
        let d = g.evaluate("0xX", &config()).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.score, Some(650));
        assert_eq!(d.tier, Some(TrustTier::Good));
    }

    #[tokio::test]
    async fn test_unscored_denied_by_default() {
        // score 0 means no reputation data
        let g = gate(FixedOracle(Ok(0)));
        let d = g.evaluate("0xY", &config()).await.unwrap();
        assert!(!d.allowed);
        assert!(d.reason.contains("600"));
    }

    #[tokio::test]
    async fn test_unscored_allowed_when_configured() {
        let g = gate(FixedOracle(Ok(0)));
        let mut cfg = config();
        cfg.allow_unscored = true;
        let d = g.evaluate("0xY", &cfg).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.tier, Some(TrustTier::Standard));
    }

    #[tokio::test]
    async fn test_low_score_denied() {
        let g = gate(FixedOracle(Ok(599)));
        let d = g.evaluate("0xX", &config()).await.unwrap();
        assert!(!d.allowed);
        assert!(d.reason.contains("599"));
    }

    #[tokio::test]
    async fn test_tier_below_minimum_denied() {
        let g = gate(FixedOracle(Ok(700)));
        let mut cfg = config();
        cfg.min_score = 500;
        cfg.min_tier = TrustTier::Excellent;
        let d = g.evaluate("0xX", &cfg).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.tier, Some(TrustTier::Good));
    }

    #[tokio::test]
    async fn test_disabled_gate_allows_everything() {
        let g = gate(FixedOracle(Err("unreachable".to_string())));
        let mut cfg = config();
        cfg.enabled = false;
        let d = g.evaluate("0xX", &cfg).await.unwrap();
        assert!(d.allowed);
    }

    #[tokio::test]
    async fn test_exception_allows_even_with_dead_oracle() {
        let g = gate(FixedOracle(Err("unreachable".to_string())));
        let mut cfg = config();
        cfg.exceptions = vec!["0xTrusted".to_string()];
        let d = g.evaluate("0xtrusted", &cfg).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.reason, "exception");
    }

    #[tokio::test]
    async fn test_oracle_failure_fails_closed() {
        let g = gate(FixedOracle(Err("connection refused".to_string())));
        let d = g.evaluate("0xX", &config()).await.unwrap();
        assert!(!d.allowed);
        assert!(d.reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_every_evaluation_is_audited() {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        let g = TrustGate::new(FixedOracle(Ok(650)), ledger.clone());
        g.evaluate("0xX", &config()).await.unwrap();
        let entries = ledger.recent_audit(1).unwrap();
        assert_eq!(entries[0].gate, "trust");
        assert!(entries[0].allowed);
    }
}
