//! Paywall middleware gating HTTP endpoints behind payment-required
//! challenges.
//!
//! One state machine serves every pricing model: resolve a price for
//! the request, return 402 with a fresh [`PaymentChallenge`] when no
//! proof is presented, verify the proof when one is, and let the
//! request through with the verified amount attached. The pricing
//! models (fixed, computed, metered, subscription-gated, free-tier)
//! differ only in how [`PriceStrategy::resolve`] computes the charge.
//!
//! # Modules
//!
//! - [`config`] — env-driven paywall configuration
//! - [`pricing`] — [`PriceStrategy`] and its five implementations
//! - [`middleware`] — the [`require_payment`](middleware::require_payment) gate
//! - [`challenge_store`] — issued-challenge registry (settle-once nonces)
//! - [`verify`] — pluggable/remote proof verification
//! - [`metrics`] — Prometheus counters
//!
//! [`PaymentChallenge`]: tollgate::PaymentChallenge
//! [`PriceStrategy::resolve`]: pricing::PriceStrategy::resolve

pub mod challenge_store;
pub mod config;
pub mod metrics;
pub mod middleware;
pub mod pricing;
pub mod verify;

pub use challenge_store::{ChallengeStore, Settlement};
pub use config::PaywallConfig;
pub use middleware::{require_payment, GateOutcome, PaywallState, VerifiedPayment};
pub use pricing::{
    DynamicPrice, FixedPrice, FreeTier, MeteredPrice, PriceResolution, PriceStrategy, RequestInfo,
    SubscriptionGate, SubscriptionStore,
};
pub use verify::{FnVerifier, ProofVerifier, RemoteVerifier};
