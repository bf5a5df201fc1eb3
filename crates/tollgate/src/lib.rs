//! Payment-required challenge/response protocol core.
//!
//! Implements the wire-level half of HTTP 402 pay-per-request: servers
//! issue a [`PaymentChallenge`] describing what must be paid, clients
//! satisfy it and present a deterministic proof token on retry.
//!
//! # Three-party model
//!
//! - **Client** ([`tollgate-client`]) — decodes challenges, pays, retries with proof
//! - **Server** ([`tollgate-server`]) — gates endpoints, returns 402 with a challenge
//! - **Policy engine** ([`tollgate-policy`]) — decides whether a payment may happen at all
//!
//! This crate holds only what both sides must agree on: the challenge
//! codec, smallest-unit amount arithmetic, proof derivation, and the
//! shared error taxonomy.
//!
//! [`tollgate-client`]: https://docs.rs/tollgate-client
//! [`tollgate-server`]: https://docs.rs/tollgate-server
//! [`tollgate-policy`]: https://docs.rs/tollgate-policy

pub mod amount;
pub mod challenge;
pub mod constants;
pub mod error;
pub mod proof;

pub use amount::{format_amount, parse_amount};
pub use challenge::{parse_challenge, ChallengeEnvelope, ChallengeIssuer, PaymentChallenge};
pub use constants::*;
pub use error::TollgateError;
pub use proof::derive_proof;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in whole seconds.
///
/// Clock skew before the epoch is treated as time zero rather than a
/// panic; challenge expiry math saturates from there.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
