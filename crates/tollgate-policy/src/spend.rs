//! Spending Limit Engine: does this amount fit inside the operator's
//! transaction/daily/weekly/monthly/lifetime caps?
//!
//! All monetary comparisons are exact smallest-unit `u128` arithmetic.
//! Window sums come from the [`Ledger`]; the decision itself is the
//! pure [`evaluate_spending`] over those sums.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tollgate::{format_amount, now_secs, DEFAULT_ASSET_DECIMALS};

use crate::error::PolicyError;
use crate::ledger::Ledger;

const DAY_SECS: u64 = 24 * 60 * 60;
const WEEK_SECS: u64 = 7 * DAY_SECS;
const MONTH_SECS: u64 = 30 * DAY_SECS;

/// Global caps applying to all recipients combined. Smallest units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLimits {
    pub max_transaction: Option<u128>,
    pub daily: Option<u128>,
    pub weekly: Option<u128>,
    pub monthly: Option<u128>,
}

/// Caps for a single recipient. Smallest units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientLimits {
    pub max_transaction: u128,
    pub daily: Option<u128>,
    pub weekly: Option<u128>,
    pub monthly: Option<u128>,
    pub lifetime: Option<u128>,
}

/// Operator-owned spending configuration. Same ownership model as
/// [`TrustGateConfig`](crate::trust::TrustGateConfig).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingConfig {
    pub enabled: bool,
    /// Decimal places used when rendering amounts in denial reasons.
    pub decimals: u32,
    pub global: Option<GlobalLimits>,
    /// Keyed by lowercased recipient address.
    pub per_recipient: HashMap<String, RecipientLimits>,
}

impl Default for SpendingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decimals: DEFAULT_ASSET_DECIMALS,
            global: None,
            per_recipient: HashMap::new(),
        }
    }
}

impl SpendingConfig {
    pub fn recipient_limits(&self, recipient: &str) -> Option<&RecipientLimits> {
        self.per_recipient.get(&recipient.to_lowercase())
    }

    pub fn with_recipient_limits(mut self, recipient: &str, limits: RecipientLimits) -> Self {
        self.per_recipient.insert(recipient.to_lowercase(), limits);
        self
    }
}

/// Already-spent totals over the four rolling windows ending now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTotals {
    pub daily: u128,
    pub weekly: u128,
    pub monthly: u128,
    pub lifetime: u128,
}

/// Remaining headroom per global window, before the proposed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendRemaining {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<u128>,
}

/// Outcome of a spending evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<SpendRemaining>,
}

impl SpendDecision {
    fn allow(remaining: Option<SpendRemaining>) -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining,
        }
    }
}

fn cap_violation(
    label: &str,
    recipient: &str,
    spent: u128,
    proposed: u128,
    cap: u128,
    decimals: u32,
) -> String {
    format!(
        "{label} limit exceeded for {recipient}: spent {} + proposed {} > cap {}",
        format_amount(spent, decimals),
        format_amount(proposed, decimals),
        format_amount(cap, decimals),
    )
}

/// Pure spending decision over pre-computed window totals.
///
/// Check order is fixed and short-circuits on the first violation:
/// per-recipient (single-tx, daily, weekly, monthly, lifetime) when a
/// limit entry exists, then global (single-tx, daily, weekly, monthly)
/// when configured. A check fails when already-spent + proposed
/// strictly exceeds the cap, so landing exactly on the cap is allowed.
pub fn evaluate_spending(
    recipient: &str,
    amount: u128,
    config: &SpendingConfig,
    recipient_totals: &WindowTotals,
    global_totals: &WindowTotals,
) -> SpendDecision {
    if !config.enabled {
        return SpendDecision::allow(None);
    }

    let decimals = config.decimals;
    let deny = |reason: String, remaining: Option<SpendRemaining>| SpendDecision {
        allowed: false,
        reason: Some(reason),
        remaining,
    };

    // Global headroom is reported on every decision once global limits
    // exist, allowed or not, so callers can log what's left.
    let remaining = config.global.as_ref().map(|g| SpendRemaining {
        daily: g.daily.map(|cap| cap.saturating_sub(global_totals.daily)),
        weekly: g.weekly.map(|cap| cap.saturating_sub(global_totals.weekly)),
        monthly: g
            .monthly
            .map(|cap| cap.saturating_sub(global_totals.monthly)),
    });

    if let Some(limits) = config.recipient_limits(recipient) {
        if amount > limits.max_transaction {
            return deny(
                format!(
                    "transaction limit exceeded for {recipient}: proposed {} > cap {}",
                    format_amount(amount, decimals),
                    format_amount(limits.max_transaction, decimals),
                ),
                remaining,
            );
        }
        let windows = [
            ("daily", limits.daily, recipient_totals.daily),
            ("weekly", limits.weekly, recipient_totals.weekly),
            ("monthly", limits.monthly, recipient_totals.monthly),
            ("lifetime", limits.lifetime, recipient_totals.lifetime),
        ];
        for (label, cap, spent) in windows {
            if let Some(cap) = cap {
                if spent.saturating_add(amount) > cap {
                    return deny(
                        cap_violation(label, recipient, spent, amount, cap, decimals),
                        remaining,
                    );
                }
            }
        }
    }

    if let Some(global) = &config.global {
        if let Some(cap) = global.max_transaction {
            if amount > cap {
                return deny(
                    format!(
                        "global transaction limit exceeded: proposed {} > cap {}",
                        format_amount(amount, decimals),
                        format_amount(cap, decimals),
                    ),
                    remaining,
                );
            }
        }
        let windows = [
            ("global daily", global.daily, global_totals.daily),
            ("global weekly", global.weekly, global_totals.weekly),
            ("global monthly", global.monthly, global_totals.monthly),
        ];
        for (label, cap, spent) in windows {
            if let Some(cap) = cap {
                if spent.saturating_add(amount) > cap {
                    return deny(
                        cap_violation(label, "all recipients", spent, amount, cap, decimals),
                        remaining,
                    );
                }
            }
        }
    }

    SpendDecision::allow(remaining)
}

/// Spending engine: reads window totals from the ledger, applies
/// [`evaluate_spending`], and audits every evaluation.
pub struct SpendingEngine {
    ledger: Arc<Ledger>,
}

impl SpendingEngine {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    fn totals(&self, recipient: Option<&str>) -> Result<WindowTotals, PolicyError> {
        let now = now_secs();
        Ok(WindowTotals {
            daily: self
                .ledger
                .window_sum(recipient, Some(now.saturating_sub(DAY_SECS)))?,
            weekly: self
                .ledger
                .window_sum(recipient, Some(now.saturating_sub(WEEK_SECS)))?,
            monthly: self
                .ledger
                .window_sum(recipient, Some(now.saturating_sub(MONTH_SECS)))?,
            lifetime: self.ledger.window_sum(recipient, None)?,
        })
    }

    /// Evaluate a proposed payment of `amount` smallest units.
    ///
    /// Ledger read failures propagate; a spending check that cannot see
    /// its history must not silently permit the payment.
    pub fn evaluate(
        &self,
        recipient: &str,
        amount: u128,
        config: &SpendingConfig,
    ) -> Result<SpendDecision, PolicyError> {
        let decision = if !config.enabled {
            SpendDecision::allow(None)
        } else {
            let recipient_totals = if config.recipient_limits(recipient).is_some() {
                self.totals(Some(recipient))?
            } else {
                WindowTotals::default()
            };
            let global_totals = if config.global.is_some() {
                self.totals(None)?
            } else {
                WindowTotals::default()
            };
            evaluate_spending(recipient, amount, config, &recipient_totals, &global_totals)
        };

        self.ledger.append_audit(
            "spending",
            recipient,
            decision.allowed,
            decision.reason.as_deref().unwrap_or("within limits"),
        )?;
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_config() -> SpendingConfig {
        SpendingConfig {
            enabled: true,
            decimals: 6,
            global: Some(GlobalLimits {
                max_transaction: Some(1000),
                daily: Some(5000),
                weekly: Some(20_000),
                monthly: Some(50_000),
            }),
            per_recipient: HashMap::new(),
        }
    }

    #[test]
    fn test_disabled_allows_anything() {
        let cfg = SpendingConfig {
            enabled: false,
            ..global_config()
        };
        let d = evaluate_spending(
            "0xa",
            u128::MAX,
            &cfg,
            &WindowTotals::default(),
            &WindowTotals::default(),
        );
        assert!(d.allowed);
    }

    #[test]
    fn test_daily_cap_denial_reports_remaining() {
        // daily cap 5000, spent 4800, proposed 300
        let cfg = global_config();
        let global = WindowTotals {
            daily: 4800,
            weekly: 4800,
            monthly: 4800,
            lifetime: 4800,
        };
        let d = evaluate_spending("0xa", 300, &cfg, &WindowTotals::default(), &global);
        assert!(!d.allowed);
        assert_eq!(d.remaining.unwrap().daily, Some(200));
        assert!(d.reason.unwrap().contains("global daily"));
    }

    #[test]
    fn test_exactly_at_cap_is_allowed() {
        let cfg = global_config();
        let global = WindowTotals {
            daily: 4800,
            ..Default::default()
        };
        let d = evaluate_spending("0xa", 200, &cfg, &WindowTotals::default(), &global);
        assert!(d.allowed);
        // One unit over is denied
        let d = evaluate_spending("0xa", 201, &cfg, &WindowTotals::default(), &global);
        assert!(!d.allowed);
    }

    #[test]
    fn test_transaction_cap_checked_first() {
        let cfg = global_config();
        let d = evaluate_spending(
            "0xa",
            1001,
            &cfg,
            &WindowTotals::default(),
            &WindowTotals::default(),
        );
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("transaction limit"));
    }

    #[test]
    fn test_per_recipient_checked_before_global() {
        let cfg = global_config().with_recipient_limits(
            "0xVendor",
            RecipientLimits {
                max_transaction: 100,
                daily: None,
                weekly: None,
                monthly: None,
                lifetime: None,
            },
        );
        // Under the global tx cap but over the recipient's
        let d = evaluate_spending(
            "0xvendor",
            500,
            &cfg,
            &WindowTotals::default(),
            &WindowTotals::default(),
        );
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("0xvendor"));
    }

    #[test]
    fn test_recipient_lifetime_cap() {
        let mut cfg = SpendingConfig::default();
        cfg = cfg.with_recipient_limits(
            "0xVendor",
            RecipientLimits {
                max_transaction: 1000,
                daily: None,
                weekly: None,
                monthly: None,
                lifetime: Some(10_000),
            },
        );
        let totals = WindowTotals {
            lifetime: 9_800,
            ..Default::default()
        };
        let d = evaluate_spending("0xvendor", 300, &cfg, &totals, &WindowTotals::default());
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("lifetime"));
    }

    #[test]
    fn test_denial_message_is_human_readable() {
        let cfg = global_config();
        let global = WindowTotals {
            daily: 4_800_000,
            ..Default::default()
        };
        let mut cfg = cfg;
        cfg.global.as_mut().unwrap().daily = Some(5_000_000);
        cfg.global.as_mut().unwrap().max_transaction = Some(1_000_000);
        let d = evaluate_spending("0xa", 300_000, &cfg, &WindowTotals::default(), &global);
        let reason = d.reason.unwrap();
        assert!(reason.contains("4.8"), "{reason}");
        assert!(reason.contains("0.3"), "{reason}");
        assert!(reason.contains("5"), "{reason}");
    }

    #[test]
    fn test_engine_reads_ledger_history() {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        ledger.record_spending("0xa", 4800, "tx-1").unwrap();
        let engine = SpendingEngine::new(ledger.clone());

        let d = engine.evaluate("0xa", 300, &global_config()).unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining.unwrap().daily, Some(200));

        // Shrinking the proposal to fit the headroom allows it again
        let d = engine.evaluate("0xa", 200, &global_config()).unwrap();
        assert!(d.allowed);

        let entries = ledger.recent_audit(2).unwrap();
        assert!(entries.iter().all(|e| e.gate == "spending"));
    }

    #[test]
    fn test_engine_without_limits_allows() {
        let ledger = Arc::new(Ledger::open_in_memory().unwrap());
        let engine = SpendingEngine::new(ledger);
        let d = engine
            .evaluate("0xa", 1_000_000, &SpendingConfig::default())
            .unwrap();
        assert!(d.allowed);
        assert!(d.remaining.is_none());
    }
}
