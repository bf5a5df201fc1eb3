//! Price resolution strategies.
//!
//! The paywall state machine is the same for every pricing model; only
//! the answer to "what does this request cost?" differs. A strategy
//! either quotes a charge or waves the request through (active
//! subscription, free-tier headroom).

use std::sync::Arc;

use dashmap::DashMap;

use tollgate::{format_amount, now_secs, TollgateError};

/// The request facts a strategy may price on.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    /// Declared request body size in bytes.
    pub body_len: usize,
    /// Stable caller identity (header or peer address) for per-caller
    /// strategies.
    pub caller: String,
}

/// What a strategy decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceResolution {
    /// The request must be paid for.
    Charge {
        /// Decimal amount string, as quoted in the challenge.
        amount: String,
        description: String,
    },
    /// The request is served without payment.
    PassThrough { reason: String },
}

/// Price-resolution strategy interface.
pub trait PriceStrategy: Send + Sync {
    fn resolve(&self, req: &RequestInfo) -> Result<PriceResolution, TollgateError>;
}

/// Constant price per endpoint.
pub struct FixedPrice {
    amount: String,
    description: String,
}

impl FixedPrice {
    pub fn new(amount: &str, description: &str) -> Self {
        Self {
            amount: amount.to_string(),
            description: description.to_string(),
        }
    }
}

impl PriceStrategy for FixedPrice {
    fn resolve(&self, _req: &RequestInfo) -> Result<PriceResolution, TollgateError> {
        Ok(PriceResolution::Charge {
            amount: self.amount.clone(),
            description: self.description.clone(),
        })
    }
}

/// Price computed from request contents at challenge time.
pub struct DynamicPrice {
    price: Box<dyn Fn(&RequestInfo) -> u128 + Send + Sync>,
    decimals: u32,
    description: String,
}

impl DynamicPrice {
    /// `price` returns smallest units for the given request.
    pub fn new(
        decimals: u32,
        description: &str,
        price: impl Fn(&RequestInfo) -> u128 + Send + Sync + 'static,
    ) -> Self {
        Self {
            price: Box::new(price),
            decimals,
            description: description.to_string(),
        }
    }
}

impl PriceStrategy for DynamicPrice {
    fn resolve(&self, req: &RequestInfo) -> Result<PriceResolution, TollgateError> {
        let base_units = (self.price)(req);
        Ok(PriceResolution::Charge {
            amount: format_amount(base_units, self.decimals),
            description: self.description.clone(),
        })
    }
}

/// Base price plus measured units times a per-unit price.
pub struct MeteredPrice {
    base: u128,
    per_unit: u128,
    units: Box<dyn Fn(&RequestInfo) -> u64 + Send + Sync>,
    decimals: u32,
    description: String,
}

impl MeteredPrice {
    /// `base` and `per_unit` are smallest units; `units` measures the
    /// request's resource consumption.
    pub fn new(
        base: u128,
        per_unit: u128,
        decimals: u32,
        description: &str,
        units: impl Fn(&RequestInfo) -> u64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            base,
            per_unit,
            units: Box::new(units),
            decimals,
            description: description.to_string(),
        }
    }
}

impl PriceStrategy for MeteredPrice {
    fn resolve(&self, req: &RequestInfo) -> Result<PriceResolution, TollgateError> {
        let units = (self.units)(req) as u128;
        let total = self
            .per_unit
            .checked_mul(units)
            .and_then(|usage| self.base.checked_add(usage))
            .ok_or_else(|| {
                TollgateError::ConfigError(format!("metered price overflow at {units} units"))
            })?;
        Ok(PriceResolution::Charge {
            amount: format_amount(total, self.decimals),
            description: format!("{} ({units} units)", self.description),
        })
    }
}

/// Subscription record lookup.
pub trait SubscriptionStore: Send + Sync {
    /// Whether `caller` holds an active, unexpired subscription.
    fn is_active(&self, caller: &str) -> bool;
}

/// In-memory subscription table: caller → expiry (Unix seconds).
pub struct MemorySubscriptions {
    subs: DashMap<String, u64>,
}

impl MemorySubscriptions {
    pub fn new() -> Self {
        Self {
            subs: DashMap::new(),
        }
    }

    pub fn grant(&self, caller: &str, expires: u64) {
        self.subs.insert(caller.to_string(), expires);
    }
}

impl Default for MemorySubscriptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionStore for MemorySubscriptions {
    fn is_active(&self, caller: &str) -> bool {
        self.subs
            .get(caller)
            .map(|expires| *expires > now_secs())
            .unwrap_or(false)
    }
}

/// Bypasses payment for active subscribers; everyone else gets a
/// subscription-priced challenge.
pub struct SubscriptionGate {
    store: Arc<dyn SubscriptionStore>,
    amount: String,
    description: String,
}

impl SubscriptionGate {
    pub fn new(store: Arc<dyn SubscriptionStore>, amount: &str, description: &str) -> Self {
        Self {
            store,
            amount: amount.to_string(),
            description: description.to_string(),
        }
    }
}

impl PriceStrategy for SubscriptionGate {
    fn resolve(&self, req: &RequestInfo) -> Result<PriceResolution, TollgateError> {
        if self.store.is_active(&req.caller) {
            Ok(PriceResolution::PassThrough {
                reason: "active subscription".to_string(),
            })
        } else {
            Ok(PriceResolution::Charge {
                amount: self.amount.clone(),
                description: self.description.clone(),
            })
        }
    }
}

/// Free-tier-then-paid: per-caller counter reset on a fixed window.
/// Calls under the limit pass free; calls over it are charged per
/// request.
pub struct FreeTier {
    free_calls: u32,
    window_secs: u64,
    amount: String,
    description: String,
    counters: DashMap<String, (u64, u32)>,
}

impl FreeTier {
    pub fn new(free_calls: u32, window_secs: u64, amount: &str, description: &str) -> Self {
        Self {
            free_calls,
            window_secs,
            amount: amount.to_string(),
            description: description.to_string(),
            counters: DashMap::new(),
        }
    }
}

impl PriceStrategy for FreeTier {
    fn resolve(&self, req: &RequestInfo) -> Result<PriceResolution, TollgateError> {
        let now = now_secs();
        let mut entry = self
            .counters
            .entry(req.caller.clone())
            .or_insert((now, 0));

        if now.saturating_sub(entry.0) >= self.window_secs {
            // Window rolled over; counting restarts
            *entry = (now, 0);
        }

        if entry.1 < self.free_calls {
            entry.1 += 1;
            let used = entry.1;
            Ok(PriceResolution::PassThrough {
                reason: format!("free tier ({used}/{})", self.free_calls),
            })
        } else {
            Ok(PriceResolution::Charge {
                amount: self.amount.clone(),
                description: self.description.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(caller: &str, body_len: usize) -> RequestInfo {
        RequestInfo {
            method: "POST".to_string(),
            path: "/data".to_string(),
            body_len,
            caller: caller.to_string(),
        }
    }

    #[test]
    fn test_fixed_price() {
        let s = FixedPrice::new("0.10", "lookup");
        match s.resolve(&req("a", 0)).unwrap() {
            PriceResolution::Charge {
                amount,
                description,
            } => {
                assert_eq!(amount, "0.10");
                assert_eq!(description, "lookup");
            }
            other => panic!("expected charge, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_price_sees_request() {
        // 1 smallest unit per body byte
        let s = DynamicPrice::new(6, "upload", |r| r.body_len as u128);
        match s.resolve(&req("a", 250_000)).unwrap() {
            PriceResolution::Charge { amount, .. } => assert_eq!(amount, "0.25"),
            other => panic!("expected charge, got {other:?}"),
        }
    }

    #[test]
    fn test_metered_price_base_plus_units() {
        let s = MeteredPrice::new(100_000, 10_000, 6, "compute", |r| (r.body_len / 1000) as u64);
        match s.resolve(&req("a", 5000)).unwrap() {
            PriceResolution::Charge {
                amount,
                description,
            } => {
                // 0.1 base + 5 * 0.01
                assert_eq!(amount, "0.15");
                assert!(description.contains("5 units"));
            }
            other => panic!("expected charge, got {other:?}"),
        }
    }

    #[test]
    fn test_metered_price_overflow_is_error() {
        let s = MeteredPrice::new(u128::MAX, u128::MAX, 6, "compute", |_| 2);
        assert!(s.resolve(&req("a", 0)).is_err());
    }

    #[test]
    fn test_subscription_bypass() {
        let subs = Arc::new(MemorySubscriptions::new());
        subs.grant("alice", now_secs() + 3600);
        let s = SubscriptionGate::new(subs.clone(), "5.00", "monthly access");

        assert!(matches!(
            s.resolve(&req("alice", 0)).unwrap(),
            PriceResolution::PassThrough { .. }
        ));
        assert!(matches!(
            s.resolve(&req("bob", 0)).unwrap(),
            PriceResolution::Charge { .. }
        ));
    }

    #[test]
    fn test_expired_subscription_charges() {
        let subs = Arc::new(MemorySubscriptions::new());
        subs.grant("alice", now_secs().saturating_sub(1));
        let s = SubscriptionGate::new(subs, "5.00", "monthly access");
        assert!(matches!(
            s.resolve(&req("alice", 0)).unwrap(),
            PriceResolution::Charge { .. }
        ));
    }

    #[test]
    fn test_free_tier_counts_per_caller() {
        let s = FreeTier::new(2, 3600, "0.05", "api call");
        assert!(matches!(
            s.resolve(&req("alice", 0)).unwrap(),
            PriceResolution::PassThrough { .. }
        ));
        assert!(matches!(
            s.resolve(&req("alice", 0)).unwrap(),
            PriceResolution::PassThrough { .. }
        ));
        // Third call in the window is charged
        assert!(matches!(
            s.resolve(&req("alice", 0)).unwrap(),
            PriceResolution::Charge { .. }
        ));
        // Other callers have their own counter
        assert!(matches!(
            s.resolve(&req("bob", 0)).unwrap(),
            PriceResolution::PassThrough { .. }
        ));
    }

    #[test]
    fn test_free_tier_window_rollover() {
        let s = FreeTier::new(1, 0, "0.05", "api call");
        // window_secs 0 means the window resets on every call
        assert!(matches!(
            s.resolve(&req("alice", 0)).unwrap(),
            PriceResolution::PassThrough { .. }
        ));
        assert!(matches!(
            s.resolve(&req("alice", 0)).unwrap(),
            PriceResolution::PassThrough { .. }
        ));
    }
}
