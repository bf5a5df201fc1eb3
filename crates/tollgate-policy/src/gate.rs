//! Policy Gate: the single decision point autonomous callers consult
//! before any money moves.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::ledger::Ledger;
use crate::spend::{SpendDecision, SpendingConfig, SpendingEngine};
use crate::trust::{TrustDecision, TrustGate, TrustGateConfig, TrustOracle};

/// Both sub-results, for observability. `spending` is `None` when the
/// trust gate already denied; the second step is only evaluated if
/// the first allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChecks {
    pub trust: TrustDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending: Option<SpendDecision>,
}

/// Combined allow/deny decision for a candidate payment. Transient;
/// never persisted (the audit log records that the evaluation happened,
/// the spending ledger records only completed payments).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub checks: PolicyChecks,
}

/// Composes the Trust Gate and Spending Limit Engine, and owns the
/// configuration threaded through every evaluation.
///
/// Note the decide/execute gap: both sub-checks read state that can
/// change between evaluation and execution (a concurrent payment can
/// consume the daily budget). This is an accepted risk window, not an
/// atomic reservation; callers should [`record_spending`] as soon as
/// the executor confirms to keep the window small.
///
/// [`record_spending`]: PolicyGate::record_spending
pub struct PolicyGate<O: TrustOracle> {
    trust: TrustGate<O>,
    spend: SpendingEngine,
    trust_config: TrustGateConfig,
    spending_config: SpendingConfig,
    ledger: Arc<Ledger>,
}

impl<O: TrustOracle> PolicyGate<O> {
    pub fn new(
        oracle: O,
        ledger: Arc<Ledger>,
        trust_config: TrustGateConfig,
        spending_config: SpendingConfig,
    ) -> Self {
        Self {
            trust: TrustGate::new(oracle, ledger.clone()),
            spend: SpendingEngine::new(ledger.clone()),
            trust_config,
            spending_config,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Decide whether `amount` smallest units may be paid to
    /// `recipient`. Trust first; a trust denial short-circuits and the
    /// spending engine never runs.
    ///
    /// A fully allowed result is a precondition for paying, not a
    /// reservation: the caller executes the payment and then calls
    /// [`record_spending`](Self::record_spending) explicitly, so an
    /// executor failure never pollutes the spending history.
    pub async fn authorize(
        &self,
        recipient: &str,
        amount: u128,
    ) -> Result<PolicyDecision, PolicyError> {
        let trust = self.trust.evaluate(recipient, &self.trust_config).await?;

        let decision = if !trust.allowed {
            PolicyDecision {
                allowed: false,
                reason: Some(trust.reason.clone()),
                checks: PolicyChecks {
                    trust,
                    spending: None,
                },
            }
        } else {
            let spending = self
                .spend
                .evaluate(recipient, amount, &self.spending_config)?;
            PolicyDecision {
                allowed: spending.allowed,
                reason: spending.reason.clone(),
                checks: PolicyChecks {
                    trust,
                    spending: Some(spending),
                },
            }
        };

        self.ledger.append_audit(
            "policy",
            recipient,
            decision.allowed,
            decision.reason.as_deref().unwrap_or("allowed"),
        )?;
        Ok(decision)
    }

    /// Record a completed payment. Call only after [`authorize`]
    /// allowed this exact recipient/amount pair and the executor
    /// confirmed execution.
    ///
    /// [`authorize`]: Self::authorize
    pub fn record_spending(
        &self,
        recipient: &str,
        amount: u128,
        execution_id: &str,
    ) -> Result<(), PolicyError> {
        self.ledger.record_spending(recipient, amount, execution_id)
    }

    /// Drop spending rows older than the widest limit window. Returns
    /// the number removed. Rows outside every window can never affect a
    /// decision again, so pruning after each recorded payment keeps the
    /// ledger bounded without a separate scheduler.
    pub fn prune_history(&self) -> Result<usize, PolicyError> {
        self.ledger.prune_spending(crate::ledger::MAX_WINDOW_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MAX_WINDOW_SECS;
    use crate::spend::GlobalLimits;
    use crate::tier::TrustTier;

    struct FixedOracle(Result<u32, String>);

    impl TrustOracle for FixedOracle {
        async fn get_score(&self, _address: &str) -> Result<u32, PolicyError> {
            self.0.clone().map_err(PolicyError::Oracle)
        }
    }

    fn spending_config() -> SpendingConfig {
        SpendingConfig {
            global: Some(GlobalLimits {
                max_transaction: Some(1000),
                daily: Some(5000),
                weekly: None,
                monthly: None,
            }),
            ..SpendingConfig::default()
        }
    }

    fn gate(score: Result<u32, String>) -> PolicyGate<FixedOracle> {
        PolicyGate::new(
            FixedOracle(score),
            Arc::new(Ledger::open_in_memory().unwrap()),
            TrustGateConfig::default(),
            spending_config(),
        )
    }

    #[tokio::test]
    async fn test_both_checks_allow() {
        let g = gate(Ok(800));
        let d = g.authorize("0xvendor", 500).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.checks.trust.tier, Some(TrustTier::Excellent));
        assert!(d.checks.spending.as_ref().unwrap().allowed);
    }

    #[tokio::test]
    async fn test_trust_denial_short_circuits() {
        let g = gate(Ok(100));
        let d = g.authorize("0xvendor", 500).await.unwrap();
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("below minimum"));
        // Spending engine never ran
        assert!(d.checks.spending.is_none());
    }

    #[tokio::test]
    async fn test_spending_denial_surfaces_reason() {
        let g = gate(Ok(800));
        let d = g.authorize("0xvendor", 1500).await.unwrap();
        assert!(!d.allowed);
        assert!(d.checks.trust.allowed);
        assert!(d.reason.unwrap().contains("transaction limit"));
    }

    #[tokio::test]
    async fn test_recorded_spending_feeds_later_checks() {
        let g = gate(Ok(800));
        let d = g.authorize("0xvendor", 1000).await.unwrap();
        assert!(d.allowed);
        // Caller pays, then records; five times fills the daily cap.
        for i in 0..5 {
            g.record_spending("0xvendor", 1000, &format!("tx-{i}")).unwrap();
        }
        let d = g.authorize("0xvendor", 1).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(
            d.checks.spending.unwrap().remaining.unwrap().daily,
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_authorize_audits_all_gates() {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        let g = PolicyGate::new(
            FixedOracle(Ok(800)),
            ledger.clone(),
            TrustGateConfig::default(),
            spending_config(),
        );
        g.authorize("0xvendor", 10).await.unwrap();
        let gates: Vec<String> = ledger
            .recent_audit(10)
            .unwrap()
            .into_iter()
            .map(|e| e.gate)
            .collect();
        assert_eq!(gates, vec!["policy", "spending", "trust"]);
    }

    #[tokio::test]
    async fn test_ledger_prune_accessible_through_gate() {
        let g = gate(Ok(800));
        g.record_spending("0xvendor", 10, "tx-1").unwrap();
        assert_eq!(g.ledger().prune_spending(MAX_WINDOW_SECS).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_history_drops_aged_records() {
        let g = gate(Ok(800));
        let now = tollgate::now_secs();
        g.ledger()
            .record_spending_at(now - MAX_WINDOW_SECS - 100, "0xvendor", 500, "tx-old")
            .unwrap();
        g.record_spending("0xvendor", 10, "tx-new").unwrap();
        assert_eq!(g.prune_history().unwrap(), 1);
        assert_eq!(g.ledger().window_sum(None, None).unwrap(), 10);
    }
}
