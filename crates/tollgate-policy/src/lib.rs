//! Payment policy engine for autonomous agents.
//!
//! Before an agent moves money, two questions must be answered: is the
//! recipient trustworthy enough ([`trust`]), and does the amount fit
//! inside the operator's spending caps ([`spend`])? The [`gate`] module
//! composes both into the single [`PolicyGate::authorize`] entry point
//! autonomous callers use, and [`ledger`] keeps the append-only record
//! of decisions and completed payments that the spending checks read.
//!
//! Decision logic is pure: [`trust::score_decision`] and
//! [`spend::evaluate_spending`] take their inputs explicitly and touch
//! no I/O, so the money-path logic is testable without an oracle or a
//! database. The gates own the oracle/ledger plumbing around them.
//!
//! Unavailability fails closed. An unreachable trust oracle or a broken
//! ledger is a denial, never implicit trust.
//!
//! [`PolicyGate::authorize`]: gate::PolicyGate::authorize

pub mod error;
pub mod gate;
pub mod ledger;
pub mod spend;
pub mod tier;
pub mod trust;

pub use error::PolicyError;
pub use gate::{PolicyChecks, PolicyDecision, PolicyGate};
pub use ledger::{AuditEntry, Ledger, SpendingRecord, MAX_WINDOW_SECS};
pub use spend::{
    GlobalLimits, RecipientLimits, SpendDecision, SpendRemaining, SpendingConfig, SpendingEngine,
};
pub use tier::TrustTier;
pub use trust::{TrustDecision, TrustGate, TrustGateConfig, TrustOracle};
